//! Packages and class blueprints.
//!
//! A [`Package`] groups the named top-level functions of one namespace and
//! the class definitions declared in it. Closures are not registered by
//! name; they are reachable through their parent's `child_funcs`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::{FunctionId, ValueId};

/// Class or object-shape definition collected from a front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassBlueprint {
    pub name: String,
    /// Names of parent blueprints, in declaration order.
    pub parents: Vec<String>,
    pub methods: IndexMap<String, FunctionId>,
    pub static_members: IndexMap<String, ValueId>,
    pub normal_members: IndexMap<String, ValueId>,
}

impl ClassBlueprint {
    pub fn new(name: impl Into<String>) -> Self {
        ClassBlueprint {
            name: name.into(),
            parents: Vec::new(),
            methods: IndexMap::new(),
            static_members: IndexMap::new(),
            normal_members: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    functions: IndexMap<String, FunctionId>,
    classes: IndexMap<String, ClassBlueprint>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            functions: IndexMap::new(),
            classes: IndexMap::new(),
        }
    }

    /// Registers a named function. A later definition with the same name
    /// replaces the earlier one and is returned.
    pub fn add_function(&mut self, name: impl Into<String>, id: FunctionId) -> Option<FunctionId> {
        self.functions.insert(name.into(), id)
    }

    pub fn function(&self, name: &str) -> Option<FunctionId> {
        self.functions.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, FunctionId)> {
        self.functions.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn add_class(&mut self, class: ClassBlueprint) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn class(&self, name: &str) -> Option<&ClassBlueprint> {
        self.classes.get(name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassBlueprint> {
        self.classes.get_mut(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassBlueprint> {
        self.classes.values()
    }
}
