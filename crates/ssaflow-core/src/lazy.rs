//! Lazy arena slots for graphs reloaded from storage.
//!
//! A program reloaded from a store starts with every slot as a placeholder.
//! The first read of a placeholder asks the [`NodeLoader`] for the real
//! instruction and memoizes it. `OnceCell::get_or_try_init` runs at most one
//! initializer per slot, so concurrent queries touching the same placeholder
//! observe a single materialization.

use once_cell::sync::OnceCell;

use crate::error::CoreError;
use crate::id::ValueId;
use crate::inst::Instruction;

/// Backing store capable of loading one node of a program by id.
pub trait NodeLoader: Send + Sync {
    fn load_node(&self, program: &str, id: ValueId) -> Result<Instruction, CoreError>;
}

pub(crate) enum Slot {
    Materialized(Instruction),
    Lazy(OnceCell<Instruction>),
}

impl Slot {
    pub(crate) fn placeholder() -> Self {
        Slot::Lazy(OnceCell::new())
    }

    /// `true` while the slot is an unresolved placeholder.
    pub(crate) fn is_pending(&self) -> bool {
        match self {
            Slot::Materialized(_) => false,
            Slot::Lazy(cell) => cell.get().is_none(),
        }
    }

    pub(crate) fn resolve(
        &self,
        program: &str,
        id: ValueId,
        loader: Option<&dyn NodeLoader>,
    ) -> Result<&Instruction, CoreError> {
        match self {
            Slot::Materialized(inst) => Ok(inst),
            Slot::Lazy(cell) => cell.get_or_try_init(|| load(program, id, loader)),
        }
    }

    /// Resolves the slot and converts it to `Materialized` so it can be
    /// mutated in place.
    pub(crate) fn resolve_mut(
        &mut self,
        program: &str,
        id: ValueId,
        loader: Option<&dyn NodeLoader>,
    ) -> Result<&mut Instruction, CoreError> {
        if let Slot::Lazy(cell) = self {
            let inst = match cell.take() {
                Some(inst) => inst,
                None => load(program, id, loader)?,
            };
            *self = Slot::Materialized(inst);
        }
        match self {
            Slot::Materialized(inst) => Ok(inst),
            Slot::Lazy(_) => Err(CoreError::LazyLoad {
                id,
                reason: "slot did not materialize".into(),
            }),
        }
    }
}

fn load(program: &str, id: ValueId, loader: Option<&dyn NodeLoader>) -> Result<Instruction, CoreError> {
    let loader = loader.ok_or_else(|| CoreError::LazyLoad {
        id,
        reason: "program has no loader".into(),
    })?;
    let inst = loader.load_node(program, id)?;
    if inst.id != id {
        return Err(CoreError::LazyLoad {
            id,
            reason: format!("store returned {} instead", inst.id),
        });
    }
    tracing::debug!(program, %id, "materialized lazy instruction");
    Ok(inst)
}
