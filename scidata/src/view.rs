//! Slicing views over datasets and data arrays.
//!
//! A view records the slices applied so far, each together with the extent of the data along the
//! sliced dimension at the time it was applied. Data and metadata are sliced lazily from the
//! unsliced originals whenever a view is built, so metadata with one more element than the data
//! along a dimension (bin edges) can be sliced consistently.
//!
//! Coordinates move between the aligned and unaligned categories under slicing: a point slice
//! along the dimension a coordinate is bound to turns it into an attribute of the resulting item.
//! Range slices never change the category.
//!
use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::{
    data_array::DataArray,
    dataset::{not_found, AttrPolicy, Dataset, DatasetData},
    dim::Dim,
    dimensions::Dimensions,
    dtype::{DType, Element, FloatElement},
    element_array::{ElementArrayView, ElementArrayViewMut},
    errors::{Error, Result},
    meta::{Attrs, Coords, Masks, MetaMap},
    slice::Slice,
    units::Unit,
    variable::Variable,
};

/// Slices applied to a view, each with the data extent along its dimension when it was applied
pub(crate) type SliceList = Vec<(Slice, usize)>;

/// Borrowed parts of a dataset or a data array from which a data array view is built
///
#[derive(Clone, Copy, Debug)]
pub(crate) struct ItemSource<'a> {
    pub(crate) name: &'a str,
    pub(crate) item: &'a DatasetData,
    pub(crate) aligned: &'a BTreeMap<Dim, Variable>,
    pub(crate) shared_masks: Option<&'a BTreeMap<String, Variable>>,
}

/// The storage a mutable data array view writes through
///
#[derive(Debug)]
pub(crate) enum Owner<'a> {
    Dataset(&'a mut Dataset),
    Array(&'a mut DataArray),
}

impl Owner<'_> {
    fn source(&self, name: &str) -> Result<ItemSource<'_>> {
        match self {
            Owner::Dataset(dataset) => dataset.item_source(name),
            Owner::Array(array) => Ok(array.source()),
        }
    }

    fn reborrow(&mut self) -> Owner<'_> {
        match self {
            Owner::Dataset(dataset) => Owner::Dataset(&mut **dataset),
            Owner::Array(array) => Owner::Array(&mut **array),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Access {
    Readonly,
    Writable,
}

impl Access {
    fn finish(self, var: Variable) -> Variable {
        match self {
            Access::Readonly => var.as_const(),
            Access::Writable => var,
        }
    }
}

/// Apply ``slices`` to ``var``.
///
/// Slices along dimensions ``var`` lacks are skipped. Where ``var`` is one longer than the
/// recorded extent it holds bin edges: a range keeps one extra edge and a point keeps the two
/// edges bracketing the selected bin.
///
fn slice_var(var: &Variable, slices: &[(Slice, usize)]) -> Result<Variable> {
    let mut out = var.clone();
    for (slice, extent) in slices {
        let dim = slice.dim();
        let len = match out.dims().get(dim) {
            Some(len) => len,
            None => continue,
        };
        let slice = if len == *extent {
            *slice
        } else if len == extent + 1 {
            match slice.end() {
                Some(end) => Slice::range(dim, slice.begin(), end + 1),
                None => Slice::range(dim, slice.begin(), slice.begin() + 2),
            }
        } else {
            return Err(Error::Dimension(format!(
                "Cannot slice {} with extent {len} along {dim} by a slice made for extent \
                 {extent}.",
                out.dims()
            )));
        };
        out = out.slice(slice)?;
    }

    Ok(out)
}

/// Whether a point slice along ``dim`` turns coordinate ``coord`` stored under ``key`` into an
/// unaligned one.
///
/// That happens if ``coord`` depends on ``dim`` and is bound to it: either ``key`` is one of its
/// dimensions and equals ``dim``, or ``key`` is not and ``dim`` is its innermost dimension.
///
pub(crate) fn unaligned_by_dim_slice(key: Dim, coord: &Variable, dim: Dim) -> bool {
    let dims = coord.dims();
    if !dims.contains(dim) {
        return false;
    }
    if dims.contains(key) {
        key == dim
    } else {
        dims.inner() == Some(dim)
    }
}

fn unaligned_by_point_slice(key: Dim, coord: &Variable, slices: &[(Slice, usize)]) -> bool {
    slices
        .iter()
        .any(|(slice, _)| !slice.is_range() && unaligned_by_dim_slice(key, coord, slice.dim()))
}

/// Whether every dimension of ``var`` is one of ``dims``
pub(crate) fn contained(var: &Variable, dims: &Dimensions) -> bool {
    var.dims().labels().iter().all(|dim| dims.contains(*dim))
}

struct ItemParts {
    data: Variable,
    coords: Coords,
    attrs: Coords,
    masks: Masks,
}

fn item_parts(source: &ItemSource, slices: &[(Slice, usize)], access: Access) -> Result<ItemParts> {
    let dims = source.item.data.dims();
    let mut coords = BTreeMap::new();
    let mut attrs = BTreeMap::new();
    for (key, coord) in source.aligned {
        if !contained(coord, dims) {
            continue;
        }
        let sliced = access.finish(slice_var(coord, slices)?);
        if unaligned_by_point_slice(*key, coord, slices) {
            attrs.insert(*key, sliced);
        } else {
            coords.insert(*key, sliced);
        }
    }
    for (key, attr) in &source.item.coords {
        attrs.insert(*key, access.finish(slice_var(attr, slices)?));
    }

    let mut masks = BTreeMap::new();
    let shared = source.shared_masks.into_iter().flatten();
    for (name, mask) in shared.filter(|(_, mask)| contained(mask, dims)) {
        masks.insert(name.clone(), access.finish(slice_var(mask, slices)?));
    }
    for (name, mask) in &source.item.masks {
        masks.insert(name.clone(), access.finish(slice_var(mask, slices)?));
    }

    Ok(ItemParts {
        data: access.finish(slice_var(&source.item.data, slices)?),
        coords: MetaMap::new("coords", coords),
        attrs: MetaMap::new("attrs", attrs),
        masks: MetaMap::new("masks", masks),
    })
}

fn sliced_meta<K: Ord + Clone + std::fmt::Display>(
    kind: &'static str,
    items: &BTreeMap<K, Variable>,
    slices: &[(Slice, usize)],
    access: Access,
) -> Result<MetaMap<K>> {
    let sliced = items
        .iter()
        .map(|(key, var)| Ok((key.clone(), access.finish(slice_var(var, slices)?))))
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(MetaMap::new(kind, sliced))
}

fn dataset_coords(dataset: &Dataset, slices: &[(Slice, usize)], access: Access) -> Result<Coords> {
    let mut coords = BTreeMap::new();
    for (key, coord) in dataset.coords_map() {
        if !unaligned_by_point_slice(*key, coord, slices) {
            coords.insert(*key, access.finish(slice_var(coord, slices)?));
        }
    }

    Ok(MetaMap::new("coords", coords))
}

fn sliced_dimensions(dataset: &Dataset, slices: &[(Slice, usize)]) -> HashMap<Dim, usize> {
    let mut dims = dataset.dimensions();
    for (slice, _) in slices {
        match slice.end() {
            None => {
                dims.remove(&slice.dim());
            }
            Some(end) => {
                dims.insert(slice.dim(), end - slice.begin());
            }
        }
    }

    dims
}

fn expect_fits(slice: &Slice, extent: usize) -> Result<()> {
    if slice.fits(extent) {
        Ok(())
    } else {
        Err(Error::Slice(format!(
            "Expected {slice} to be in range 0..{extent} for dimension {}.",
            slice.dim()
        )))
    }
}

fn expect_unsliced(slices: &[(Slice, usize)], what: &str) -> Result<()> {
    if slices.is_empty() {
        Ok(())
    } else {
        Err(Error::Slice(format!("Cannot set {what} via slice.")))
    }
}

/// Readonly view of one data array, possibly sliced.
///
/// All variables handed out are readonly handles sharing memory with the viewed storage.
///
#[derive(Clone, Debug)]
pub struct DataArrayConstView<'a> {
    source: ItemSource<'a>,
    slices: SliceList,
    data: Variable,
    coords: Coords,
    attrs: Coords,
    masks: Masks,
}

impl<'a> DataArrayConstView<'a> {
    pub(crate) fn new(source: ItemSource<'a>, slices: SliceList) -> Result<Self> {
        let parts = item_parts(&source, &slices, Access::Readonly)?;

        Ok(Self {
            source,
            slices,
            data: parts.data,
            coords: parts.coords,
            attrs: parts.attrs,
            masks: parts.masks,
        })
    }

    pub fn name(&self) -> &'a str {
        self.source.name
    }

    pub fn dims(&self) -> &Dimensions {
        self.data.dims()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn unit(&self) -> Unit {
        self.data.unit()
    }

    pub fn has_variances(&self) -> bool {
        self.data.has_variances()
    }

    pub fn data(&self) -> &Variable {
        &self.data
    }

    pub fn values<T: Element>(&self) -> Result<ElementArrayView<'_, T>> {
        self.data.values()
    }

    pub fn variances<T: FloatElement>(&self) -> Result<ElementArrayView<'_, T>> {
        self.data.variances()
    }

    /// Aligned coordinates of the item whose dimensions are all dimensions of the data
    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    /// Unaligned coordinates: the item's own attributes and coordinates unaligned by point
    /// slices
    pub fn attrs(&self) -> &Coords {
        &self.attrs
    }

    pub fn masks(&self) -> &Masks {
        &self.masks
    }

    pub fn slices(&self) -> &[(Slice, usize)] {
        &self.slices
    }

    pub fn slice(&self, slice: Slice) -> Result<DataArrayConstView<'a>> {
        let extent = self.data.dims().at(slice.dim())?;
        expect_fits(&slice, extent)?;
        trace!(name = self.source.name, %slice, "slicing data array view");

        let mut slices = self.slices.clone();
        slices.push((slice, extent));

        DataArrayConstView::new(self.source, slices)
    }

    /// Independent data array holding deep copies of everything visible through this view
    ///
    pub fn copy(&self) -> Result<DataArray> {
        DataArray::from_parts(
            self.source.name,
            self.data.copy()?,
            self.coords.copy()?,
            self.masks.copy()?,
            self.attrs.copy()?,
        )
    }

    pub(crate) fn is_same_item(&self, item: &DatasetData) -> bool {
        std::ptr::eq(self.source.item, item)
    }
}

impl PartialEq for DataArrayConstView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.coords == other.coords
            && self.masks == other.masks
            && self.attrs == other.attrs
    }
}

/// Mutable view of one data array, possibly sliced.
///
/// Variables handed out are writable handles unless the underlying storage is readonly. Adding
/// metadata is only possible through an unsliced view.
///
#[derive(Debug)]
pub struct DataArrayView<'a> {
    owner: Owner<'a>,
    name: String,
    slices: SliceList,
    data: Variable,
    coords: Coords,
    attrs: Coords,
    masks: Masks,
}

impl<'a> DataArrayView<'a> {
    pub(crate) fn new(owner: Owner<'a>, name: String, slices: SliceList) -> Result<Self> {
        let parts = item_parts(&owner.source(&name)?, &slices, Access::Writable)?;

        Ok(Self {
            owner,
            name,
            slices,
            data: parts.data,
            coords: parts.coords,
            attrs: parts.attrs,
            masks: parts.masks,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &Dimensions {
        self.data.dims()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn unit(&self) -> Unit {
        self.data.unit()
    }

    pub fn data(&self) -> &Variable {
        &self.data
    }

    pub fn values<T: Element>(&self) -> Result<ElementArrayView<'_, T>> {
        self.data.values()
    }

    pub fn values_mut<T: Element>(&self) -> Result<ElementArrayViewMut<'_, T>> {
        self.data.values_mut()
    }

    pub fn variances<T: FloatElement>(&self) -> Result<ElementArrayView<'_, T>> {
        self.data.variances()
    }

    pub fn variances_mut<T: FloatElement>(&self) -> Result<ElementArrayViewMut<'_, T>> {
        self.data.variances_mut()
    }

    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    pub fn attrs(&self) -> &Coords {
        &self.attrs
    }

    pub fn masks(&self) -> &Masks {
        &self.masks
    }

    pub fn slices(&self) -> &[(Slice, usize)] {
        &self.slices
    }

    pub fn as_const(&self) -> Result<DataArrayConstView<'_>> {
        DataArrayConstView::new(self.owner.source(&self.name)?, self.slices.clone())
    }

    pub fn slice(self, slice: Slice) -> Result<DataArrayView<'a>> {
        let slices = self.sliced(slice)?;

        DataArrayView::new(self.owner, self.name, slices)
    }

    pub fn slice_mut(&mut self, slice: Slice) -> Result<DataArrayView<'_>> {
        let slices = self.sliced(slice)?;

        DataArrayView::new(self.owner.reborrow(), self.name.clone(), slices)
    }

    /// Copy the data of ``other`` into the viewed data.
    ///
    /// Every coordinate of ``other`` must be present and equal here. Masks are not compared.
    ///
    pub fn assign(&self, other: &DataArrayConstView) -> Result<()> {
        let source = self.owner.source(&self.name)?;
        if other.is_same_item(source.item) && other.slices() == self.slices.as_slice() {
            return Ok(());
        }
        for (dim, coord) in other.coords() {
            match self.coords.get(dim) {
                Ok(existing) if existing == coord => {}
                _ => {
                    return Err(Error::CoordMismatch(format!(
                        "Expected coords of {} to include matching {dim}.",
                        self.name
                    )))
                }
            }
        }

        self.data.assign(other.data())
    }

    /// Copy ``var`` into the viewed data, broadcasting as needed
    ///
    pub fn assign_variable(&self, var: &Variable) -> Result<()> {
        self.data.assign(var)
    }

    pub fn set_unit(&self, unit: Unit) -> Result<()> {
        self.data.set_unit(unit)
    }

    /// Replace the data, keeping attributes. Masks private to the item are dropped.
    ///
    pub fn set_data(&mut self, data: Variable) -> Result<()> {
        expect_unsliced(&self.slices, "data")?;
        match &mut self.owner {
            Owner::Dataset(dataset) => dataset.set_data_with_policy(
                self.name.as_str(),
                data,
                AttrPolicy::Keep,
            )?,
            Owner::Array(array) => array.set_data_with_policy(data, AttrPolicy::Keep)?,
        }

        self.refresh()
    }

    /// Set an aligned coordinate. Items of a dataset share the dataset's coordinates, which must
    /// be set on the dataset itself.
    ///
    pub fn set_coord(&mut self, dim: Dim, coord: Variable) -> Result<()> {
        expect_unsliced(&self.slices, "coord")?;
        match &mut self.owner {
            Owner::Dataset(_) => {
                return Err(Error::DataArray(format!(
                    "Cannot set coord {dim} through item {} of a dataset, set it on the dataset.",
                    self.name
                )))
            }
            Owner::Array(array) => array.set_coord(dim, coord)?,
        }

        self.refresh()
    }

    pub fn set_attr(&mut self, dim: Dim, attr: Variable) -> Result<()> {
        expect_unsliced(&self.slices, "attr")?;
        match &mut self.owner {
            Owner::Dataset(dataset) => dataset.set_item_attr(&self.name, dim, attr)?,
            Owner::Array(array) => array.set_attr(dim, attr)?,
        }

        self.refresh()
    }

    pub fn set_mask<S: Into<String>>(&mut self, name: S, mask: Variable) -> Result<()> {
        expect_unsliced(&self.slices, "mask")?;
        match &mut self.owner {
            Owner::Dataset(dataset) => dataset.set_item_mask(&self.name, name, mask)?,
            Owner::Array(array) => array.set_mask(name, mask)?,
        }

        self.refresh()
    }

    fn sliced(&self, slice: Slice) -> Result<SliceList> {
        let extent = self.data.dims().at(slice.dim())?;
        expect_fits(&slice, extent)?;
        trace!(name = self.name.as_str(), %slice, "slicing mutable data array view");

        let mut slices = self.slices.clone();
        slices.push((slice, extent));

        Ok(slices)
    }

    fn refresh(&mut self) -> Result<()> {
        let parts = item_parts(&self.owner.source(&self.name)?, &self.slices, Access::Writable)?;
        self.data = parts.data;
        self.coords = parts.coords;
        self.attrs = parts.attrs;
        self.masks = parts.masks;

        Ok(())
    }
}

/// Readonly view of a dataset, possibly sliced.
///
/// Slicing along a dimension drops the items that do not depend on it.
///
#[derive(Clone, Debug)]
pub struct DatasetConstView<'a> {
    dataset: &'a Dataset,
    items: Vec<DataArrayConstView<'a>>,
    slices: SliceList,
    coords: Coords,
    masks: Masks,
    attrs: Attrs,
}

impl<'a> DatasetConstView<'a> {
    pub(crate) fn new(dataset: &'a Dataset) -> Result<Self> {
        Self::with_items(dataset, dataset.item_names().map(String::as_str), vec![])
    }

    fn with_items<I>(dataset: &'a Dataset, names: I, slices: SliceList) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let items = names
            .into_iter()
            .map(|name| DataArrayConstView::new(dataset.item_source(name)?, slices.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dataset,
            items,
            coords: dataset_coords(dataset, &slices, Access::Readonly)?,
            masks: sliced_meta("masks", dataset.masks_map(), &slices, Access::Readonly)?,
            attrs: sliced_meta("attrs", dataset.attrs_map(), &slices, Access::Readonly)?,
            slices,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.items.iter().map(|item| item.name())
    }

    pub fn get(&self, name: &str) -> Result<&DataArrayConstView<'a>> {
        self.items
            .iter()
            .find(|item| item.name() == name)
            .ok_or_else(|| not_found("dataset", name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataArrayConstView<'a>> {
        self.items.iter()
    }

    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    pub fn masks(&self) -> &Masks {
        &self.masks
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn slices(&self) -> &[(Slice, usize)] {
        &self.slices
    }

    /// Extents of the dataset with the slices of this view applied
    ///
    pub fn dimensions(&self) -> HashMap<Dim, usize> {
        sliced_dimensions(self.dataset, &self.slices)
    }

    /// Slice the view along ``slice.dim()``.
    ///
    /// Only items depending on that dimension are kept. The extent the slice is checked against
    /// is the smallest extent among them, or the dataset's extent if none depends on it.
    ///
    pub fn slice(&self, slice: Slice) -> Result<DatasetConstView<'a>> {
        let (names, slices) = slice_items(self, slice)?;

        Self::with_items(self.dataset, names, slices)
    }

    /// Independent dataset holding deep copies of everything visible through this view
    ///
    pub fn copy(&self) -> Result<Dataset> {
        let mut out = Dataset::from_parts(
            std::iter::empty::<(String, Variable)>(),
            self.coords.copy()?,
            self.masks.copy()?,
            self.attrs.copy()?,
        )?;
        for item in &self.items {
            out.set_data(item.name(), item.data().copy()?)?;
            for (dim, attr) in item.attrs() {
                out.set_item_attr(item.name(), *dim, attr.copy()?)?;
            }
            for (name, mask) in item.masks() {
                if !self.masks.contains(name.as_str()) {
                    out.set_item_mask(item.name(), name.as_str(), mask.copy()?)?;
                }
            }
        }

        Ok(out)
    }
}

/// Names of the items kept when slicing ``view`` by ``slice``, and the resulting slice list
fn slice_items<'a>(view: &DatasetConstView<'a>, slice: Slice) -> Result<(Vec<&'a str>, SliceList)> {
    let dim = slice.dim();
    let retained: Vec<&DataArrayConstView<'a>> = view
        .items
        .iter()
        .filter(|item| item.dims().contains(dim))
        .collect();
    let extent = match retained.iter().filter_map(|item| item.dims().get(dim)).min() {
        Some(extent) => extent,
        None => view.dimensions().get(&dim).copied().ok_or_else(|| {
            Error::Dimension(format!("Expected dimension {dim} in dataset, cannot slice."))
        })?,
    };
    expect_fits(&slice, extent)?;
    trace!(%slice, extent, retained = retained.len(), "slicing dataset view");

    let mut slices = view.slices.clone();
    slices.push((slice, extent));

    Ok((retained.into_iter().map(|item| item.name()).collect(), slices))
}

impl PartialEq for DatasetConstView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.coords == other.coords
            && self.masks == other.masks
            && self.attrs == other.attrs
            && self
                .items
                .iter()
                .all(|item| other.get(item.name()).map_or(false, |theirs| item == theirs))
    }
}

/// Mutable view of a dataset, possibly sliced
///
#[derive(Debug)]
pub struct DatasetView<'a> {
    dataset: &'a mut Dataset,
    names: Vec<String>,
    slices: SliceList,
}

impl<'a> DatasetView<'a> {
    pub(crate) fn new(dataset: &'a mut Dataset) -> Self {
        let names = dataset.item_names().cloned().collect();

        Self {
            dataset,
            names,
            slices: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn slices(&self) -> &[(Slice, usize)] {
        &self.slices
    }

    pub fn dimensions(&self) -> HashMap<Dim, usize> {
        sliced_dimensions(self.dataset, &self.slices)
    }

    pub fn as_const(&self) -> Result<DatasetConstView<'_>> {
        DatasetConstView::with_items(
            &*self.dataset,
            self.names.iter().map(String::as_str),
            self.slices.clone(),
        )
    }

    pub fn get(&self, name: &str) -> Result<DataArrayConstView<'_>> {
        self.expect_contains(name)?;

        DataArrayConstView::new(self.dataset.item_source(name)?, self.slices.clone())
    }

    pub fn get_mut(&mut self, name: &str) -> Result<DataArrayView<'_>> {
        self.expect_contains(name)?;

        DataArrayView::new(
            Owner::Dataset(&mut *self.dataset),
            name.to_string(),
            self.slices.clone(),
        )
    }

    /// Writable handles to the aligned coordinates visible through this view
    ///
    pub fn coords(&self) -> Result<Coords> {
        dataset_coords(self.dataset, &self.slices, Access::Writable)
    }

    pub fn masks(&self) -> Result<Masks> {
        sliced_meta("masks", self.dataset.masks_map(), &self.slices, Access::Writable)
    }

    pub fn attrs(&self) -> Result<Attrs> {
        sliced_meta("attrs", self.dataset.attrs_map(), &self.slices, Access::Writable)
    }

    pub fn slice(self, slice: Slice) -> Result<DatasetView<'a>> {
        let (names, slices) = self.sliced(slice)?;

        Ok(DatasetView {
            dataset: self.dataset,
            names,
            slices,
        })
    }

    pub fn slice_mut(&mut self, slice: Slice) -> Result<DatasetView<'_>> {
        let (names, slices) = self.sliced(slice)?;

        Ok(DatasetView {
            dataset: &mut *self.dataset,
            names,
            slices,
        })
    }

    /// Assign every item of ``other`` to the item of the same name in this view
    ///
    pub fn assign(&mut self, other: &DatasetConstView) -> Result<()> {
        for item in other.iter() {
            self.get_mut(item.name())?.assign(item)?;
        }

        Ok(())
    }

    fn sliced(&self, slice: Slice) -> Result<(Vec<String>, SliceList)> {
        let view = self.as_const()?;
        let (names, slices) = slice_items(&view, slice)?;

        Ok((names.into_iter().map(String::from).collect(), slices))
    }

    fn expect_contains(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(not_found("dataset view", name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use paste::paste;

    use crate::testing::{arange, linspace, values_f64};

    /// Item "a" over x and y, item "b" over x only.
    ///
    /// Coordinates: bin edges along x, one value per element along y, and z, a two dimensional
    /// coordinate bound to its inner dimension y. Mask "m" depends on x.
    fn dataset() -> Dataset {
        let z = Variable::new(
            Dimensions::from_pairs(&[(Dim::X, 3), (Dim::Y, 2)]).unwrap(),
            vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0],
        )
        .unwrap();
        let m = Variable::new(Dimensions::one(Dim::X, 3), vec![false, true, false]).unwrap();

        Dataset::from_parts(
            [
                (String::from("a"), arange::<f64>(&[(Dim::X, 3), (Dim::Y, 2)])),
                (String::from("b"), linspace(Dim::X, 100.0, 3)),
            ],
            [
                (Dim::X, linspace(Dim::X, 0.0, 4)),
                (Dim::Y, linspace(Dim::Y, 0.0, 2)),
                (Dim::Z, z),
            ],
            [(String::from("m"), m)],
            std::iter::empty::<(String, Variable)>(),
        )
        .unwrap()
    }

    #[test]
    fn test_unaligned_by_dim_slice() {
        let x = linspace(Dim::X, 0.0, 4);
        assert!(unaligned_by_dim_slice(Dim::X, &x, Dim::X));
        assert!(!unaligned_by_dim_slice(Dim::X, &x, Dim::Y));

        let xy = arange::<f64>(&[(Dim::X, 3), (Dim::Y, 2)]);
        // Dimension coordinate: bound to its own key
        assert!(unaligned_by_dim_slice(Dim::X, &xy, Dim::X));
        assert!(!unaligned_by_dim_slice(Dim::X, &xy, Dim::Y));
        // Non-dimension coordinate: bound to the inner dimension
        assert!(unaligned_by_dim_slice(Dim::Z, &xy, Dim::Y));
        assert!(!unaligned_by_dim_slice(Dim::Z, &xy, Dim::X));
        assert!(!unaligned_by_dim_slice(Dim::Z, &xy, Dim::Z));

        let scalar = Variable::scalar(1.0);
        assert!(!unaligned_by_dim_slice(Dim::X, &scalar, Dim::X));
    }

    #[test]
    fn test_unsliced_item() -> Result<()> {
        let dataset = dataset();
        let a = dataset.get("a")?;
        assert_eq!(a.coords().keys().copied().collect::<Vec<_>>(), vec![Dim::X, Dim::Y, Dim::Z]);
        assert!(a.attrs().is_empty());
        assert!(a.masks().contains("m"));

        let b = dataset.get("b")?;
        assert_eq!(b.coords().keys().copied().collect::<Vec<_>>(), vec![Dim::X]);
        assert!(b.masks().contains("m"));

        Ok(())
    }

    #[test]
    fn test_range_slice_bin_edges() -> Result<()> {
        let dataset = dataset();
        let a = dataset.get("a")?.slice(Slice::range(Dim::X, 1, 3))?;
        assert_eq!(a.dims().shape(), &[2, 2]);
        assert_eq!(values_f64(a.coords().get(&Dim::X)?), vec![1.0, 2.0, 3.0]);
        assert_eq!(values_f64(a.coords().get(&Dim::Y)?), vec![0.0, 1.0]);
        assert_eq!(values_f64(a.coords().get(&Dim::Z)?), vec![12.0, 13.0, 14.0, 15.0]);
        assert!(a.attrs().is_empty());
        assert_eq!(a.masks().get("m")?.values::<bool>()?.to_vec(), vec![true, false]);

        Ok(())
    }

    #[test]
    fn test_point_slice_bin_edges() -> Result<()> {
        let dataset = dataset();
        let a = dataset.get("a")?.slice(Slice::point(Dim::X, 1))?;
        assert_eq!(a.dims().labels(), &[Dim::Y]);
        assert!(!a.coords().contains(&Dim::X));
        assert!(a.attrs().contains(&Dim::X));
        assert_eq!(values_f64(a.attrs().get(&Dim::X)?), vec![1.0, 2.0]);

        // y and z do not depend on x through their binding
        assert!(a.coords().contains(&Dim::Y));
        assert_eq!(values_f64(a.coords().get(&Dim::Z)?), vec![12.0, 13.0]);
        assert_eq!(a.masks().get("m")?.dims().ndim(), 0);

        Ok(())
    }

    #[test]
    fn test_point_slice_inner_dim() -> Result<()> {
        let dataset = dataset();
        let a = dataset.get("a")?.slice(Slice::point(Dim::Y, 0))?;
        assert!(a.coords().contains(&Dim::X));
        assert!(!a.coords().contains(&Dim::Y));
        assert!(!a.coords().contains(&Dim::Z));
        assert_eq!(values_f64(a.attrs().get(&Dim::Y)?), vec![0.0]);
        assert_eq!(values_f64(a.attrs().get(&Dim::Z)?), vec![10.0, 12.0, 14.0]);

        Ok(())
    }

    #[test]
    fn test_range_slice_inner_dim() -> Result<()> {
        let dataset = dataset();
        let a = dataset.get("a")?.slice(Slice::range(Dim::Y, 1, 2))?;
        assert!(a.attrs().is_empty());
        assert_eq!(a.coords().get(&Dim::Y)?.dims().shape(), &[1]);
        assert_eq!(values_f64(a.coords().get(&Dim::Z)?), vec![11.0, 13.0, 15.0]);

        Ok(())
    }

    #[test]
    fn test_chained_point_slices() -> Result<()> {
        let dataset = dataset();
        let a = dataset
            .get("a")?
            .slice(Slice::point(Dim::X, 2))?
            .slice(Slice::point(Dim::Y, 1))?;
        assert_eq!(a.dims().ndim(), 0);
        assert_eq!(values_f64(a.data()), vec![5.0]);
        assert!(a.coords().is_empty());
        assert_eq!(a.attrs().len(), 3);
        assert_eq!(values_f64(a.attrs().get(&Dim::X)?), vec![2.0, 3.0]);
        assert_eq!(values_f64(a.attrs().get(&Dim::Z)?), vec![15.0]);

        Ok(())
    }

    #[test]
    fn test_item_attrs_follow_slices() -> Result<()> {
        let mut dataset = dataset();
        dataset.set_item_attr("b", Dim::TIME, linspace(Dim::X, 7.0, 3))?;
        let b = dataset.get("b")?.slice(Slice::range(Dim::X, 0, 2))?;
        assert_eq!(values_f64(b.attrs().get(&Dim::TIME)?), vec![7.0, 8.0]);

        let b = dataset.get("b")?.slice(Slice::point(Dim::X, 2))?;
        assert_eq!(values_f64(b.attrs().get(&Dim::TIME)?), vec![9.0]);
        assert!(b.attrs().contains(&Dim::X));

        Ok(())
    }

    macro_rules! visibility_tests {
        ($($name:ident: $slice:expr => coords: [$($coord:ident),*], attrs: [$($attr:ident),*];)*) => {
            $(
                paste! {
                    #[test]
                    fn [<test_visibility_ $name>]() -> Result<()> {
                        let dataset = dataset();
                        let a = dataset.get("a")?.slice($slice)?;
                        let coords: Vec<Dim> = a.coords().keys().copied().collect();
                        let attrs: Vec<Dim> = a.attrs().keys().copied().collect();
                        assert_eq!(coords, vec![$(Dim::$coord),*]);
                        assert_eq!(attrs, Vec::<Dim>::from([$(Dim::$attr),*]));

                        Ok(())
                    }
                }
            )*
        };
    }

    visibility_tests! {
        x_point_first: Slice::point(Dim::X, 0) => coords: [Y, Z], attrs: [X];
        x_point_last: Slice::point(Dim::X, 2) => coords: [Y, Z], attrs: [X];
        x_range: Slice::range(Dim::X, 0, 2) => coords: [X, Y, Z], attrs: [];
        x_range_empty: Slice::range(Dim::X, 1, 1) => coords: [X, Y, Z], attrs: [];
        x_range_full: Slice::range(Dim::X, 0, 3) => coords: [X, Y, Z], attrs: [];
        y_point: Slice::point(Dim::Y, 1) => coords: [X], attrs: [Y, Z];
        y_range: Slice::range(Dim::Y, 0, 1) => coords: [X, Y, Z], attrs: [];
    }

    #[test]
    fn test_slice_out_of_range() -> Result<()> {
        let dataset = dataset();
        let a = dataset.get("a")?;
        assert!(matches!(a.slice(Slice::point(Dim::X, 3)), Err(Error::Slice(_))));
        assert!(matches!(a.slice(Slice::range(Dim::X, 0, 4)), Err(Error::Slice(_))));
        assert!(matches!(a.slice(Slice::point(Dim::Z, 0)), Err(Error::Dimension(_))));

        Ok(())
    }

    #[test]
    fn test_dataset_point_slice_drops_items() -> Result<()> {
        let dataset = dataset();
        let view = dataset.slice(Slice::point(Dim::Y, 0))?;
        assert_eq!(view.names().collect::<Vec<_>>(), vec!["a"]);
        assert!(view.coords().contains(&Dim::X));
        assert!(!view.coords().contains(&Dim::Y));
        assert!(!view.coords().contains(&Dim::Z));
        assert!(view.get("a")?.attrs().contains(&Dim::Z));
        assert!(matches!(view.get("b"), Err(Error::NotFound(_))));
        assert_eq!(view.dimensions().get(&Dim::Y), None);
        assert_eq!(view.dimensions().get(&Dim::X), Some(&3));

        Ok(())
    }

    #[test]
    fn test_dataset_range_slice() -> Result<()> {
        let dataset = dataset();
        let view = dataset.slice(Slice::range(Dim::X, 1, 3))?;
        assert_eq!(view.len(), 2);
        assert_eq!(values_f64(view.coords().get(&Dim::X)?), vec![1.0, 2.0, 3.0]);
        assert_eq!(values_f64(view.get("b")?.data()), vec![101.0, 102.0]);
        assert_eq!(view.masks().get("m")?.dims().shape(), &[2]);
        assert_eq!(view.dimensions().get(&Dim::X), Some(&2));

        let view = view.slice(Slice::point(Dim::X, 0))?;
        assert_eq!(values_f64(view.get("b")?.data()), vec![101.0]);
        assert_eq!(values_f64(view.get("b")?.attrs().get(&Dim::X)?), vec![1.0, 2.0]);

        Ok(())
    }

    #[test]
    fn test_dataset_slice_uses_data_extent() -> Result<()> {
        let dataset = dataset();
        // Edges have 4 elements along x but the data only 3
        let result = dataset.slice(Slice::range(Dim::X, 0, 4));
        assert!(matches!(result, Err(Error::Slice(_))));

        Ok(())
    }

    #[test]
    fn test_dataset_slice_without_items() -> Result<()> {
        let mut dataset = dataset();
        dataset.set_coord(Dim::TIME, linspace(Dim::TIME, 0.0, 5))?;

        let view = dataset.slice(Slice::point(Dim::TIME, 4))?;
        assert!(view.is_empty());
        assert!(!view.coords().contains(&Dim::TIME));

        let view = dataset.slice(Slice::range(Dim::TIME, 1, 3))?;
        assert_eq!(view.coords().get(&Dim::TIME)?.dims().shape(), &[2]);

        let result = dataset.slice(Slice::point(Dim::TIME, 5));
        assert!(matches!(result, Err(Error::Slice(_))));
        let result = dataset.slice(Slice::point(Dim::ENERGY, 0));
        assert!(matches!(result, Err(Error::Dimension(_))));

        Ok(())
    }

    #[test]
    fn test_const_views_are_readonly() -> Result<()> {
        let dataset = dataset();
        let a = dataset.get("a")?.slice(Slice::point(Dim::X, 0))?;
        assert!(matches!(a.data().values_mut::<f64>(), Err(Error::ReadOnly)));
        assert!(matches!(
            a.attrs().get(&Dim::X)?.values_mut::<f64>(),
            Err(Error::ReadOnly)
        ));

        Ok(())
    }

    #[test]
    fn test_write_through_sliced_item() -> Result<()> {
        let mut dataset = dataset();
        {
            let view = dataset.get_mut("a")?.slice(Slice::point(Dim::X, 1))?;
            view.values_mut::<f64>()?.copy_from_slice(&[-1.0, -2.0])?;
            view.attrs().get(&Dim::X)?.values_mut::<f64>()?.set(0, 0.5)?;
        }
        assert_eq!(
            values_f64(dataset.get("a")?.data()),
            vec![0.0, 1.0, -1.0, -2.0, 4.0, 5.0]
        );
        assert_eq!(
            values_f64(dataset.coords().get(&Dim::X)?),
            vec![0.0, 0.5, 2.0, 3.0]
        );

        Ok(())
    }

    #[test]
    fn test_write_through_sliced_dataset() -> Result<()> {
        let mut dataset = dataset();
        {
            let mut view = dataset.slice_mut(Slice::range(Dim::X, 2, 3))?;
            assert_eq!(view.len(), 2);
            view.get_mut("b")?.assign_variable(&Variable::scalar(0.0))?;
            let view = view.slice(Slice::point(Dim::Y, 0))?;
            assert_eq!(view.names().collect::<Vec<_>>(), vec!["a"]);
        }
        assert_eq!(values_f64(dataset.get("b")?.data()), vec![100.0, 101.0, 0.0]);

        Ok(())
    }

    #[test]
    fn test_metadata_through_views() -> Result<()> {
        let mut dataset = dataset();
        {
            let mut item = dataset.get_mut("b")?;
            item.set_attr(Dim::TIME, Variable::scalar(3.0))?;
            item.set_mask("own", Variable::new(Dimensions::one(Dim::X, 3), vec![true; 3])?)?;
            assert!(item.attrs().contains(&Dim::TIME));
            assert!(item.masks().contains("own"));

            let result = item.set_coord(Dim::ENERGY, Variable::scalar(1.0));
            assert!(matches!(result, Err(Error::DataArray(_))));

            let mut sliced = item.slice_mut(Slice::range(Dim::X, 0, 1))?;
            let result = sliced.set_attr(Dim::ENERGY, Variable::scalar(1.0));
            assert!(matches!(result, Err(Error::Slice(_))));
            let result = sliced.set_data(linspace(Dim::X, 0.0, 1));
            assert!(matches!(result, Err(Error::Slice(_))));
        }
        let b = dataset.get("b")?;
        assert!(b.attrs().contains(&Dim::TIME));
        assert!(b.masks().contains("own"));
        assert!(!dataset.get("a")?.masks().contains("own"));

        Ok(())
    }

    #[test]
    fn test_set_data_through_item_keeps_attrs() -> Result<()> {
        let mut dataset = dataset();
        dataset.set_item_attr("b", Dim::TIME, Variable::scalar(3.0))?;
        {
            let mut item = dataset.get_mut("b")?;
            item.set_data(linspace(Dim::X, -3.0, 3))?;
            assert_eq!(values_f64(item.data()), vec![-3.0, -2.0, -1.0]);
        }
        assert!(dataset.get("b")?.attrs().contains(&Dim::TIME));

        Ok(())
    }

    #[test]
    fn test_assign_checks_coords() -> Result<()> {
        let mut dataset = dataset();
        let mut source = dataset.get("b")?.copy()?;
        source.values_mut::<f64>()?.copy_from_slice(&[7.0, 8.0, 9.0])?;
        dataset.get_mut("b")?.assign(&source.view()?)?;
        assert_eq!(values_f64(dataset.get("b")?.data()), vec![7.0, 8.0, 9.0]);

        let mut other = dataset.get("b")?.copy()?;
        other.erase_coord(Dim::X)?;
        other.set_coord(Dim::X, linspace(Dim::X, 1.0, 4))?;
        let result = dataset.get_mut("b")?.assign(&other.view()?);
        assert!(matches!(result, Err(Error::CoordMismatch(_))));

        let mut missing = dataset.get("b")?.copy()?;
        missing.set_coord(Dim::ENERGY, Variable::scalar(1.0))?;
        let result = dataset.get_mut("b")?.assign(&missing.view()?);
        assert!(matches!(result, Err(Error::CoordMismatch(_))));

        Ok(())
    }

    #[test]
    fn test_self_assign() -> Result<()> {
        let mut dataset = dataset();
        let view = dataset.get_mut("a")?;
        let same = view.as_const()?;
        view.assign(&same)?;
        assert_eq!(values_f64(view.data()), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        Ok(())
    }

    #[test]
    fn test_dataset_assign() -> Result<()> {
        let mut dataset = dataset();
        let mut source = dataset.copy()?;
        source
            .get_mut("a")?
            .assign_variable(&Variable::scalar(-1.0))?;
        dataset.view_mut().assign(&source.view()?)?;
        assert_eq!(dataset, source);
        assert_eq!(values_f64(dataset.get("a")?.data()), vec![-1.0; 6]);

        Ok(())
    }

    #[test]
    fn test_view_equality_and_copy() -> Result<()> {
        let dataset = dataset();
        let copy = dataset.copy()?;
        assert_eq!(dataset.view()?, copy.view()?);

        for slice in [
            Slice::point(Dim::X, 1),
            Slice::range(Dim::X, 0, 2),
            Slice::point(Dim::Y, 0),
            Slice::range(Dim::Y, 1, 2),
        ] {
            let view = dataset.slice(slice)?;
            assert_eq!(view, copy.slice(slice)?);
            assert_eq!(view.copy()?, view);

            let a = dataset.get("a")?.slice(slice)?;
            assert_eq!(a.copy()?, a);
        }

        assert_ne!(dataset.slice(Slice::point(Dim::X, 0))?, dataset.slice(Slice::point(Dim::X, 1))?);

        Ok(())
    }

    #[test]
    fn test_data_array_views() -> Result<()> {
        let mut array = DataArray::from_parts(
            "a",
            arange::<f64>(&[(Dim::X, 3)]),
            [(Dim::X, linspace(Dim::X, 0.0, 4))],
            BTreeMap::<String, Variable>::new(),
            BTreeMap::<Dim, Variable>::new(),
        )?;

        let sliced = array.slice(Slice::point(Dim::X, 2))?;
        assert!(!sliced.coords().contains(&Dim::X));
        assert_eq!(values_f64(sliced.attrs().get(&Dim::X)?), vec![2.0, 3.0]);

        {
            let mut view = array.view_mut()?;
            view.set_coord(Dim::Y, Variable::scalar(1.0))?;
            let sliced = view.slice_mut(Slice::range(Dim::X, 1, 2))?;
            sliced.assign_variable(&Variable::scalar(9.0))?;
        }
        assert!(array.coords().contains(&Dim::Y));
        assert_eq!(values_f64(&array.data()), vec![0.0, 9.0, 2.0]);

        Ok(())
    }
}
