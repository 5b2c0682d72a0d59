//! Modification expressions. A `ModifyList` is the ordered series of changes a modify
//! operation applies to the real attributes of an entry.

use std::slice;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modify {
    // This value *should* exist.
    Present(Attribute, String),
    // This value *should not* exist.
    Removed(Attribute, String),
    // This attr *should not* exist.
    Purged(Attribute),
}

pub fn m_pres(attr: Attribute, v: &str) -> Modify {
    Modify::Present(attr, v.to_string())
}

pub fn m_remove(attr: Attribute, v: &str) -> Modify {
    Modify::Removed(attr, v.to_string())
}

pub fn m_purge(attr: Attribute) -> Modify {
    Modify::Purged(attr)
}

impl Modify {
    pub fn attribute(&self) -> &Attribute {
        match self {
            Modify::Present(a, _) | Modify::Removed(a, _) | Modify::Purged(a) => a,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModifyList {
    // The order of this list matters. Each change must be done in order.
    mods: Vec<Modify>,
}

impl<'a> IntoIterator for &'a ModifyList {
    type IntoIter = slice::Iter<'a, Modify>;
    type Item = &'a Modify;

    fn into_iter(self) -> Self::IntoIter {
        self.mods.iter()
    }
}

impl ModifyList {
    pub fn new() -> Self {
        ModifyList {
            mods: Vec::with_capacity(0),
        }
    }

    pub fn new_list(mods: Vec<Modify>) -> Self {
        ModifyList { mods }
    }

    pub fn new_purge_and_set(attr: Attribute, v: &str) -> Self {
        Self::new_list(vec![m_purge(attr.clone()), m_pres(attr, v)])
    }

    pub fn new_append(attr: Attribute, v: &str) -> Self {
        Self::new_list(vec![m_pres(attr, v)])
    }

    pub fn new_remove(attr: Attribute, v: &str) -> Self {
        Self::new_list(vec![m_remove(attr, v)])
    }

    pub fn new_purge(attr: Attribute) -> Self {
        Self::new_list(vec![m_purge(attr)])
    }

    pub fn push_mod(&mut self, modify: Modify) {
        self.mods.push(modify)
    }

    pub fn iter(&self) -> slice::Iter<'_, Modify> {
        self.mods.iter()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// True if any change in the list touches `attr`.
    pub fn touches(&self, attr: &Attribute) -> bool {
        self.mods.iter().any(|m| m.attribute() == attr)
    }
}
