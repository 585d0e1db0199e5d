use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::{
    data_array::DataArray,
    dim::Dim,
    errors::{Error, Result},
    extents::{Extent, ExtentTable},
    meta::{Attrs, Coords, Masks, MetaMap},
    slice::Slice,
    variable::Variable,
    view::{DataArrayConstView, DataArrayView, DatasetConstView, DatasetView, ItemSource, Owner},
};

/// One named item of a dataset: its data plus the metadata private to it
///
#[derive(Clone, Debug)]
pub(crate) struct DatasetData {
    pub(crate) data: Variable,

    /// Unaligned coordinates (attributes) of this item
    pub(crate) coords: BTreeMap<Dim, Variable>,

    pub(crate) masks: BTreeMap<String, Variable>,
}

impl DatasetData {
    pub(crate) fn new(data: Variable) -> Self {
        Self {
            data,
            coords: BTreeMap::new(),
            masks: BTreeMap::new(),
        }
    }
}

/// What happens to the attributes of an item when its data is replaced. Masks of a replaced item
/// are always dropped.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrPolicy {
    Keep,
    Drop,
}

/// A named collection of data items sharing aligned coordinates.
///
/// Every insertion checks the dimensions of the inserted variable against the extents already
/// known to the dataset. Coordinates may be one longer than the data along their own dimension
/// (bin edges). Every removal recomputes the extents from what remains.
///
/// A dataset owns its metadata and data handles. Use ``copy`` for an independent dataset.
///
#[derive(Debug, Default)]
pub struct Dataset {
    extents: ExtentTable,
    coords: BTreeMap<Dim, Variable>,
    masks: BTreeMap<String, Variable>,
    attrs: BTreeMap<String, Variable>,
    items: BTreeMap<String, DatasetData>,
}

/// The dimension along which ``coord`` stored under ``key`` may hold bin edges.
///
/// That is ``key`` itself if ``coord`` has that dimension, otherwise its innermost dimension.
///
pub(crate) fn dim_of_coord(coord: &Variable, key: Dim) -> Option<Dim> {
    if coord.dims().contains(key) {
        Some(key)
    } else {
        coord.dims().inner()
    }
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from data items, aligned coordinates, masks and attributes
    ///
    pub fn from_parts<D, C, M, A>(data: D, coords: C, masks: M, attrs: A) -> Result<Self>
    where
        D: IntoIterator<Item = (String, Variable)>,
        C: IntoIterator<Item = (Dim, Variable)>,
        M: IntoIterator<Item = (String, Variable)>,
        A: IntoIterator<Item = (String, Variable)>,
    {
        let mut dataset = Self::new();
        for (dim, coord) in coords {
            dataset.set_coord(dim, coord)?;
        }
        for (name, mask) in masks {
            dataset.set_mask(name, mask)?;
        }
        for (name, attr) in attrs {
            dataset.set_attr(name, attr)?;
        }
        for (name, var) in data {
            dataset.set_data(name, var)?;
        }

        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.keys().map(String::as_str)
    }

    /// Extent of every dimension of the dataset
    ///
    pub fn dimensions(&self) -> HashMap<Dim, usize> {
        self.extents.dimensions()
    }

    /// What is known about the extent of ``dim``
    ///
    pub fn extent(&self, dim: Dim) -> Option<Extent> {
        self.extents.get(dim)
    }

    pub fn coords(&self) -> Coords {
        readonly("coords", &self.coords)
    }

    /// Coordinates as writable handles
    ///
    pub fn coords_mut(&mut self) -> Coords {
        MetaMap::new("coords", self.coords.clone())
    }

    pub fn masks(&self) -> Masks {
        readonly("masks", &self.masks)
    }

    pub fn masks_mut(&mut self) -> Masks {
        MetaMap::new("masks", self.masks.clone())
    }

    pub fn attrs(&self) -> Attrs {
        readonly("attrs", &self.attrs)
    }

    pub fn attrs_mut(&mut self) -> Attrs {
        MetaMap::new("attrs", self.attrs.clone())
    }

    pub fn get(&self, name: &str) -> Result<DataArrayConstView<'_>> {
        DataArrayConstView::new(self.item_source(name)?, vec![])
    }

    pub fn get_mut(&mut self, name: &str) -> Result<DataArrayView<'_>> {
        self.expect_item(name)?;
        DataArrayView::new(Owner::Dataset(self), name.to_string(), vec![])
    }

    pub fn view(&self) -> Result<DatasetConstView<'_>> {
        DatasetConstView::new(self)
    }

    pub fn view_mut(&mut self) -> DatasetView<'_> {
        DatasetView::new(self)
    }

    pub fn slice(&self, slice: Slice) -> Result<DatasetConstView<'_>> {
        self.view()?.slice(slice)
    }

    pub fn slice_mut(&mut self, slice: Slice) -> Result<DatasetView<'_>> {
        self.view_mut().slice(slice)
    }

    /// Set an aligned coordinate, shared by all items with its dimensions.
    ///
    /// Fails if any item has an unaligned coordinate of the same name, which the aligned one
    /// would shadow.
    ///
    pub fn set_coord(&mut self, dim: Dim, coord: Variable) -> Result<()> {
        if let Some((name, _)) = self.items.iter().find(|(_, item)| item.coords.contains_key(&dim)) {
            return Err(Error::DataArray(format!(
                "Attempt to insert dataset coord with name {dim} shadowing attribute of item \
                 {name}."
            )));
        }
        self.extents.set_dims(coord.dims(), dim_of_coord(&coord, dim))?;
        self.coords.insert(dim, coord);

        Ok(())
    }

    /// Set a mask shared by all items with its dimensions
    ///
    pub fn set_mask<S: Into<String>>(&mut self, name: S, mask: Variable) -> Result<()> {
        self.extents.set_dims(mask.dims(), None)?;
        self.masks.insert(name.into(), mask);

        Ok(())
    }

    /// Set a dataset level attribute
    ///
    pub fn set_attr<S: Into<String>>(&mut self, name: S, attr: Variable) -> Result<()> {
        self.extents.set_dims(attr.dims(), None)?;
        self.attrs.insert(name.into(), attr);

        Ok(())
    }

    /// Set an unaligned coordinate (attribute) of item ``name``.
    ///
    /// Fails if an aligned coordinate of the same name exists.
    ///
    pub fn set_item_attr(&mut self, name: &str, dim: Dim, attr: Variable) -> Result<()> {
        self.expect_item(name)?;
        if self.coords.contains_key(&dim) {
            return Err(Error::DataArray(format!(
                "Attempt to insert attribute with name {dim} shadowing dataset coord."
            )));
        }
        self.extents.set_dims(attr.dims(), dim_of_coord(&attr, dim))?;
        self.item_mut(name)?.coords.insert(dim, attr);

        Ok(())
    }

    /// Set a mask private to item ``name``
    ///
    pub fn set_item_mask<S: Into<String>>(
        &mut self,
        name: &str,
        mask_name: S,
        mask: Variable,
    ) -> Result<()> {
        self.expect_item(name)?;
        self.extents.set_dims(mask.dims(), None)?;
        self.item_mut(name)?.masks.insert(mask_name.into(), mask);

        Ok(())
    }

    /// Insert or replace the data of item ``name``, dropping attributes and masks of a replaced
    /// item.
    ///
    pub fn set_data<S: Into<String>>(&mut self, name: S, data: Variable) -> Result<()> {
        self.set_data_with_policy(name, data, AttrPolicy::Drop)
    }

    /// Insert or replace the data of item ``name``.
    ///
    /// The new data must agree with the current extents, including those contributed by the item
    /// being replaced.
    ///
    pub fn set_data_with_policy<S: Into<String>>(
        &mut self,
        name: S,
        data: Variable,
        policy: AttrPolicy,
    ) -> Result<()> {
        let name = name.into();
        self.extents.set_dims(data.dims(), None)?;

        let mut item = DatasetData::new(data);
        let replaced = self.items.remove(&name);
        let is_replacement = replaced.is_some();
        if let (Some(old), AttrPolicy::Keep) = (replaced, policy) {
            item.coords = old.coords;
        }
        self.items.insert(name, item);

        if is_replacement {
            self.rebuild_dims()?;
        }

        Ok(())
    }

    /// Insert ``array`` as item ``name``.
    ///
    /// Aligned coordinates of ``array`` missing from the dataset are added. Those already present
    /// must be equal. Attributes of ``array`` named like an aligned coordinate are dropped.
    ///
    /// On error the dataset is left unchanged.
    ///
    pub fn set_data_array<S: Into<String>>(&mut self, name: S, array: DataArray) -> Result<()> {
        let name = name.into();
        let (_, data, coords, masks, attrs) = array.into_parts();
        for (dim, coord) in &coords {
            if let Some(existing) = self.coords.get(dim) {
                if existing != coord {
                    return Err(Error::CoordMismatch(format!(
                        "Expected coords for {dim} to match when inserting item {name}."
                    )));
                }
            }
        }

        let backup = self.share();
        let result = self.insert_data_array(&name, data, coords, masks, attrs);
        if result.is_err() {
            *self = backup;
        }

        result
    }

    fn insert_data_array(
        &mut self,
        name: &str,
        data: Variable,
        coords: BTreeMap<Dim, Variable>,
        masks: BTreeMap<String, Variable>,
        attrs: BTreeMap<Dim, Variable>,
    ) -> Result<()> {
        for (dim, coord) in coords {
            if !self.coords.contains_key(&dim) {
                self.set_coord(dim, coord)?;
            }
        }
        self.set_data(name, data)?;
        for (dim, attr) in attrs {
            if !self.coords.contains_key(&dim) {
                self.set_item_attr(name, dim, attr)?;
            }
        }
        for (mask_name, mask) in masks {
            self.set_item_mask(name, mask_name, mask)?;
        }

        Ok(())
    }

    pub fn erase(&mut self, name: &str) -> Result<()> {
        self.expect_item(name)?;
        self.items.remove(name);
        debug!(name, "erased dataset item");

        self.rebuild_dims()
    }

    /// Remove item ``name`` and return it as a data array carrying copies of the aligned
    /// coordinates it depends on
    ///
    pub fn extract(&mut self, name: &str) -> Result<DataArray> {
        let coords = self.get(name)?.coords().copy()?;
        let item = self
            .items
            .remove(name)
            .ok_or_else(|| not_found("dataset", name))?;
        debug!(name, "extracted dataset item");
        self.rebuild_dims()?;

        DataArray::from_parts(name, item.data, coords, item.masks, item.coords)
    }

    pub fn erase_coord(&mut self, dim: Dim) -> Result<()> {
        self.extract_coord(dim).map(|_| ())
    }

    pub fn extract_coord(&mut self, dim: Dim) -> Result<Variable> {
        let coord = self
            .coords
            .remove(&dim)
            .ok_or_else(|| not_found("coords", dim))?;
        self.rebuild_dims()?;

        Ok(coord)
    }

    pub fn erase_mask(&mut self, name: &str) -> Result<()> {
        self.extract_mask(name).map(|_| ())
    }

    pub fn extract_mask(&mut self, name: &str) -> Result<Variable> {
        let mask = self
            .masks
            .remove(name)
            .ok_or_else(|| not_found("masks", name))?;
        self.rebuild_dims()?;

        Ok(mask)
    }

    pub fn erase_attr(&mut self, name: &str) -> Result<()> {
        self.extract_attr(name).map(|_| ())
    }

    pub fn extract_attr(&mut self, name: &str) -> Result<Variable> {
        let attr = self
            .attrs
            .remove(name)
            .ok_or_else(|| not_found("attrs", name))?;
        self.rebuild_dims()?;

        Ok(attr)
    }

    pub fn erase_item_attr(&mut self, name: &str, dim: Dim) -> Result<()> {
        self.extract_item_attr(name, dim).map(|_| ())
    }

    pub fn extract_item_attr(&mut self, name: &str, dim: Dim) -> Result<Variable> {
        let attr = self
            .item_mut(name)?
            .coords
            .remove(&dim)
            .ok_or_else(|| not_found("attrs", dim))?;
        self.rebuild_dims()?;

        Ok(attr)
    }

    pub fn erase_item_mask(&mut self, name: &str, mask_name: &str) -> Result<()> {
        self.extract_item_mask(name, mask_name).map(|_| ())
    }

    pub fn extract_item_mask(&mut self, name: &str, mask_name: &str) -> Result<Variable> {
        let mask = self
            .item_mut(name)?
            .masks
            .remove(mask_name)
            .ok_or_else(|| not_found("masks", mask_name))?;
        self.rebuild_dims()?;

        Ok(mask)
    }

    /// Remove all items, keeping coordinates, masks and attributes
    ///
    pub fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.rebuild_dims()
    }

    /// Relabel dimension ``from`` as ``to`` everywhere in the dataset
    ///
    pub fn rename(&mut self, from: Dim, to: Dim) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if self.extents.contains(to) {
            return Err(Error::Dimension(format!(
                "Cannot rename {from} to {to}: {to} already exists."
            )));
        }

        rename_all(self.coords.values_mut(), from, to)?;
        rename_all(self.masks.values_mut(), from, to)?;
        rename_all(self.attrs.values_mut(), from, to)?;
        rename_key(&mut self.coords, from, to);
        for item in self.items.values_mut() {
            rename_all(Some(&mut item.data), from, to)?;
            rename_all(item.coords.values_mut(), from, to)?;
            rename_all(item.masks.values_mut(), from, to)?;
            rename_key(&mut item.coords, from, to);
        }

        self.rebuild_dims()
    }

    /// Independent deep copy
    ///
    pub fn copy(&self) -> Result<Dataset> {
        self.view()?.copy()
    }

    /// Another dataset holding the same handles, for restoring ``self`` after a failed update
    ///
    fn share(&mut self) -> Dataset {
        Dataset {
            extents: self.extents.clone(),
            coords: self.coords.clone(),
            masks: self.masks.clone(),
            attrs: self.attrs.clone(),
            items: self.items.clone(),
        }
    }

    pub(crate) fn item_source(&self, name: &str) -> Result<ItemSource<'_>> {
        let (name, item) = self
            .items
            .get_key_value(name)
            .ok_or_else(|| not_found("dataset", name))?;

        Ok(ItemSource {
            name,
            item,
            aligned: &self.coords,
            shared_masks: Some(&self.masks),
        })
    }

    pub(crate) fn coords_map(&self) -> &BTreeMap<Dim, Variable> {
        &self.coords
    }

    pub(crate) fn masks_map(&self) -> &BTreeMap<String, Variable> {
        &self.masks
    }

    pub(crate) fn attrs_map(&self) -> &BTreeMap<String, Variable> {
        &self.attrs
    }

    pub(crate) fn item_names(&self) -> impl Iterator<Item = &String> + '_ {
        self.items.keys()
    }

    fn item_mut(&mut self, name: &str) -> Result<&mut DatasetData> {
        self.items
            .get_mut(name)
            .ok_or_else(|| not_found("dataset", name))
    }

    fn expect_item(&self, name: &str) -> Result<()> {
        if self.items.contains_key(name) {
            Ok(())
        } else {
            Err(not_found("dataset", name))
        }
    }

    /// Recompute the extent table from scratch: data first, then coordinates, masks and
    /// attributes
    ///
    fn rebuild_dims(&mut self) -> Result<()> {
        let mut extents = ExtentTable::default();
        for item in self.items.values() {
            extents.set_dims(item.data.dims(), None)?;
        }
        for (dim, coord) in &self.coords {
            extents.set_dims(coord.dims(), dim_of_coord(coord, *dim))?;
        }
        for item in self.items.values() {
            for (dim, attr) in &item.coords {
                extents.set_dims(attr.dims(), dim_of_coord(attr, *dim))?;
            }
            for mask in item.masks.values() {
                extents.set_dims(mask.dims(), None)?;
            }
        }
        for var in self.masks.values().chain(self.attrs.values()) {
            extents.set_dims(var.dims(), None)?;
        }
        self.extents = extents;
        debug!(dims = self.extents.dimensions().len(), "rebuilt dataset extents");

        Ok(())
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        match (self.view(), other.view()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialEq<DatasetConstView<'a>> for Dataset {
    fn eq(&self, other: &DatasetConstView<'a>) -> bool {
        match self.view() {
            Ok(view) => view == *other,
            Err(_) => false,
        }
    }
}

pub(crate) fn readonly<K: Ord + Clone + std::fmt::Display>(
    kind: &'static str,
    items: &BTreeMap<K, Variable>,
) -> MetaMap<K> {
    MetaMap::new(
        kind,
        items
            .iter()
            .map(|(key, var)| (key.clone(), var.as_const()))
            .collect(),
    )
}

pub(crate) fn deep_copy<K: Ord + Clone>(
    items: &BTreeMap<K, Variable>,
) -> Result<BTreeMap<K, Variable>> {
    items
        .iter()
        .map(|(key, var)| Ok((key.clone(), var.copy()?)))
        .collect()
}

pub(crate) fn not_found<K: std::fmt::Display>(kind: &str, key: K) -> Error {
    Error::NotFound(format!("Expected {key} in {kind}."))
}

pub(crate) fn rename_all<'v, I>(vars: I, from: Dim, to: Dim) -> Result<()>
where
    I: IntoIterator<Item = &'v mut Variable>,
{
    for var in vars {
        if var.dims().contains(from) {
            var.rename(from, to)?;
        }
    }

    Ok(())
}

pub(crate) fn rename_key<V>(map: &mut BTreeMap<Dim, V>, from: Dim, to: Dim) {
    if let Some(value) = map.remove(&from) {
        map.insert(to, value);
    }
}
