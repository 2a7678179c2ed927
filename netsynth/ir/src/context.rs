//! The top-level design object: a set of modules and an optional top.
use crate::Module;
use linked_hash_map::LinkedHashMap;
use netsynth_utils::Id;

/// An elaborated design: modules in insertion order, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Design {
    modules: LinkedHashMap<Id, Module>,
    /// The designated top module, if any.
    pub top: Option<Id>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, module: Module) -> Id {
        let name = module.name;
        self.modules.insert(name, module);
        name
    }

    pub fn module(&self, name: impl Into<Id>) -> Option<&Module> {
        self.modules.get(&name.into())
    }

    pub fn module_mut(&mut self, name: impl Into<Id>) -> Option<&mut Module> {
        self.modules.get_mut(&name.into())
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.iter_mut().map(|(_, v)| v)
    }

    /// Resolve the top module: the designated top, else the first module
    /// carrying a `top` attribute, else the last module in design order.
    pub fn top_module(&self) -> Option<&Module> {
        self.top
            .and_then(|name| self.modules.get(&name))
            .or_else(|| self.modules.values().find(|m| m.attributes.has("top")))
            .or_else(|| self.modules.values().last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attributes, Const};

    #[test]
    fn top_resolution_order() {
        let mut design = Design::new();
        design.add_module(Module::new("a"));
        design.add_module(Module::new("b"));
        // Last module wins when nothing is marked.
        assert_eq!(design.top_module().unwrap().name, "b");

        let mut attrs = Attributes::default();
        attrs.insert("top", Const::from_u64(1, 1));
        design.module_mut("a").unwrap().attributes = attrs;
        assert_eq!(design.top_module().unwrap().name, "a");

        design.top = Some("b".into());
        assert_eq!(design.top_module().unwrap().name, "b");
    }
}
