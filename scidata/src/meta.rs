use std::{
    borrow::Borrow,
    collections::{btree_map, BTreeMap},
    fmt::Display,
};

use crate::{
    dim::Dim,
    errors::{Error, Result},
    variable::Variable,
};

/// Coordinates, masks or attributes as seen from a dataset, data array or view.
///
/// Entries are handles on the stored variables, already sliced to the view they were obtained
/// from. Handles obtained through const access are readonly.
///
#[derive(Clone, Debug)]
pub struct MetaMap<K: Ord> {
    kind: &'static str,
    items: BTreeMap<K, Variable>,
}

/// Coordinates keyed by the dimension they label
pub type Coords = MetaMap<Dim>;

/// Masks keyed by name
pub type Masks = MetaMap<String>;

/// Dataset level attributes keyed by name
pub type Attrs = MetaMap<String>;

impl<K: Ord + Clone + Display> MetaMap<K> {
    pub(crate) fn new(kind: &'static str, items: BTreeMap<K, Variable>) -> Self {
        Self { kind, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.items.contains_key(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Result<&Variable>
    where
        K: Borrow<Q>,
        Q: Ord + Display + ?Sized,
    {
        self.items
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("Expected {key} in {}.", self.kind)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.items.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, Variable> {
        self.items.iter()
    }

    /// Independent deep copies of every entry
    ///
    pub fn copy(&self) -> Result<BTreeMap<K, Variable>> {
        self.items
            .iter()
            .map(|(key, var)| Ok((key.clone(), var.copy()?)))
            .collect()
    }
}

impl<K: Ord> PartialEq for MetaMap<K> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<'a, K: Ord> IntoIterator for &'a MetaMap<K> {
    type Item = (&'a K, &'a Variable);
    type IntoIter = btree_map::Iter<'a, K, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
