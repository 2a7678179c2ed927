//! Attribute maps attached to modules and wires.
use crate::Const;
use linked_hash_map::LinkedHashMap;
use netsynth_utils::Id;

/// An ordered name-to-constant attribute map. The translator consults only
/// `top` (on modules) and `init` (on wires); everything else is carried
/// through untouched.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    map: LinkedHashMap<Id, Const>,
}

impl Attributes {
    pub fn insert(&mut self, name: impl Into<Id>, value: Const) {
        self.map.insert(name.into(), value);
    }

    pub fn get(&self, name: impl Into<Id>) -> Option<&Const> {
        self.map.get(&name.into())
    }

    pub fn has(&self, name: impl Into<Id>) -> bool {
        self.map.contains_key(&name.into())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Const)> {
        self.map.iter()
    }
}
