//! Query context and value search.

use indexmap::{IndexMap, IndexSet};
use ssaflow_core::{InstKind, Program, ValueId};

use crate::error::QueryError;
use crate::matcher::{Matcher, SearchMode};
use crate::operator::{ValueHandle, ValueOperator};

/// Read-only view over finished programs, addressed by name.
///
/// A query never mutates a program, so one context can serve any number
/// of concurrent searches and traces.
#[derive(Debug, Clone, Default)]
pub struct Query<'p> {
    programs: IndexMap<String, &'p Program>,
}

impl<'p> Query<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a program, replacing any other with the same name.
    pub fn with_program(mut self, program: &'p Program) -> Self {
        self.add_program(program);
        self
    }

    pub fn add_program(&mut self, program: &'p Program) {
        self.programs.insert(program.name().to_string(), program);
    }

    pub fn program(&self, name: &str) -> Result<&'p Program, QueryError> {
        self.programs
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::ProgramNotFound {
                name: name.to_string(),
            })
    }

    /// Every program of this context as a search input.
    pub fn programs(&self) -> ValueOperator {
        ValueOperator::Programs(self.programs.keys().cloned().collect())
    }

    /// Flat, de-duplicated handles of `input`. Program sets expand to every
    /// live value they hold.
    pub fn values(&self, input: &ValueOperator) -> Result<Vec<ValueHandle>, QueryError> {
        match input {
            ValueOperator::Programs(names) => {
                let mut out = Vec::new();
                for name in names {
                    let program = self.program(name)?;
                    out.extend(
                        program
                            .ids()
                            .filter(|id| is_searchable(program, *id))
                            .map(|id| ValueHandle::new(name.clone(), id)),
                    );
                }
                Ok(out)
            }
            other => other.flatten(),
        }
    }

    /// Values of `input` matching `matcher`.
    ///
    /// With [`SearchMode::NAME`] a value matches on its name, its rendering,
    /// its constant, any variable bound to it, or (for a member) its key.
    /// With [`SearchMode::KEY`] an object contributes each member whose key
    /// matches. Results are unique and in first-seen order, so repeating a
    /// search gives the same list.
    pub fn search(
        &self,
        input: &ValueOperator,
        mode: SearchMode,
        matcher: &Matcher,
    ) -> Result<Vec<ValueHandle>, QueryError> {
        let mut found: IndexSet<ValueHandle> = IndexSet::new();
        for handle in self.values(input)? {
            let program = self.program(&handle.program)?;
            if mode.contains(SearchMode::NAME) && value_matches(program, handle.id, matcher) {
                found.insert(handle.clone());
            }
            if mode.contains(SearchMode::KEY) {
                let Some(inst) = program.lookup(handle.id) else {
                    continue;
                };
                if !inst.is_object() {
                    continue;
                }
                for (key, member) in program.members(handle.id) {
                    if value_matches(program, key, matcher) {
                        found.insert(ValueHandle::new(handle.program.clone(), member));
                    }
                }
            }
        }
        tracing::debug!(
            pattern = matcher.pattern(),
            mode = mode.bits(),
            results = found.len(),
            "search"
        );
        Ok(found.into_iter().collect())
    }
}

fn is_searchable(program: &Program, id: ValueId) -> bool {
    program
        .lookup(id)
        .is_some_and(|inst| inst.kind.is_value() && !matches!(inst.kind, InstKind::Block(_)))
}

fn value_matches(program: &Program, id: ValueId, matcher: &Matcher) -> bool {
    let Some(inst) = program.lookup(id) else {
        return false;
    };
    if !inst.name.is_empty() && matcher.is_match(&inst.name) {
        return true;
    }
    if matcher.is_match(&program.display_value(id)) {
        return true;
    }
    if let Some(value) = inst.const_value() {
        if matcher.is_match(&value.to_string()) {
            return true;
        }
    }
    if inst.variables().iter().any(|v| matcher.is_match(v)) {
        return true;
    }
    inst.key()
        .and_then(|key| program.lookup(key))
        .and_then(|key| key.const_value())
        .is_some_and(|key| matcher.is_match(&key.to_string()))
}
