use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    dataset::{
        deep_copy, dim_of_coord, not_found, readonly, rename_all, rename_key, AttrPolicy,
        DatasetData,
    },
    dim::Dim,
    dimensions::Dimensions,
    dtype::{DType, Element, FloatElement},
    element_array::{ElementArrayView, ElementArrayViewMut},
    errors::{Error, Result},
    extents::ExtentTable,
    meta::{Coords, Masks, MetaMap},
    slice::Slice,
    units::Unit,
    variable::Variable,
    view::{contained, DataArrayConstView, DataArrayView, ItemSource, Owner},
};

/// Data with named coordinates, masks and attributes.
///
/// Coordinates follow the same extent rules as in a dataset: each must match the data along
/// every dimension, except that it may be one longer along the dimension it is bound to (bin
/// edges). Coordinates whose dimensions are not all dimensions of the data are kept but not
/// visible through ``coords``.
///
/// Use ``copy`` for an independent data array.
///
#[derive(Debug)]
pub struct DataArray {
    name: String,
    item: DatasetData,
    coords: BTreeMap<Dim, Variable>,
    extents: ExtentTable,
}

impl DataArray {
    /// Unnamed data array without metadata
    ///
    pub fn new(data: Variable) -> Result<Self> {
        Self::from_parts(
            "",
            data,
            BTreeMap::<Dim, Variable>::new(),
            BTreeMap::<String, Variable>::new(),
            BTreeMap::<Dim, Variable>::new(),
        )
    }

    pub fn from_parts<S, C, M, A>(name: S, data: Variable, coords: C, masks: M, attrs: A) -> Result<Self>
    where
        S: Into<String>,
        C: IntoIterator<Item = (Dim, Variable)>,
        M: IntoIterator<Item = (String, Variable)>,
        A: IntoIterator<Item = (Dim, Variable)>,
    {
        let mut extents = ExtentTable::default();
        extents.set_dims(data.dims(), None)?;
        let mut array = Self {
            name: name.into(),
            item: DatasetData::new(data),
            coords: BTreeMap::new(),
            extents,
        };
        for (dim, coord) in coords {
            array.set_coord(dim, coord)?;
        }
        for (name, mask) in masks {
            array.set_mask(name, mask)?;
        }
        for (dim, attr) in attrs {
            array.set_attr(dim, attr)?;
        }

        Ok(array)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    pub fn dims(&self) -> &Dimensions {
        self.item.data.dims()
    }

    pub fn dtype(&self) -> DType {
        self.item.data.dtype()
    }

    pub fn unit(&self) -> Unit {
        self.item.data.unit()
    }

    pub fn set_unit(&mut self, unit: Unit) -> Result<()> {
        self.item.data.set_unit(unit)
    }

    pub fn has_variances(&self) -> bool {
        self.item.data.has_variances()
    }

    /// Readonly handle to the data
    pub fn data(&self) -> Variable {
        self.item.data.as_const()
    }

    /// Handle to the data, writable unless the data was inserted readonly
    pub fn data_mut(&mut self) -> Variable {
        self.item.data.clone()
    }

    pub fn values<T: Element>(&self) -> Result<ElementArrayView<'_, T>> {
        self.item.data.values()
    }

    pub fn values_mut<T: Element>(&mut self) -> Result<ElementArrayViewMut<'_, T>> {
        self.item.data.values_mut()
    }

    pub fn variances<T: FloatElement>(&self) -> Result<ElementArrayView<'_, T>> {
        self.item.data.variances()
    }

    pub fn variances_mut<T: FloatElement>(&mut self) -> Result<ElementArrayViewMut<'_, T>> {
        self.item.data.variances_mut()
    }

    pub fn coords(&self) -> Coords {
        let dims = self.dims();
        MetaMap::new(
            "coords",
            self.coords
                .iter()
                .filter(|(_, coord)| contained(coord, dims))
                .map(|(dim, coord)| (*dim, coord.as_const()))
                .collect(),
        )
    }

    pub fn coords_mut(&mut self) -> Coords {
        let dims = self.dims();
        MetaMap::new(
            "coords",
            self.coords
                .iter()
                .filter(|(_, coord)| contained(coord, dims))
                .map(|(dim, coord)| (*dim, coord.clone()))
                .collect(),
        )
    }

    /// Unaligned coordinates
    pub fn attrs(&self) -> Coords {
        readonly("attrs", &self.item.coords)
    }

    pub fn masks(&self) -> Masks {
        readonly("masks", &self.item.masks)
    }

    /// Set an aligned coordinate. Fails if an attribute of the same name exists.
    ///
    pub fn set_coord(&mut self, dim: Dim, coord: Variable) -> Result<()> {
        if self.item.coords.contains_key(&dim) {
            return Err(Error::DataArray(format!(
                "Attempt to insert coord with name {dim} shadowing attribute."
            )));
        }
        self.extents.set_dims(coord.dims(), dim_of_coord(&coord, dim))?;
        self.coords.insert(dim, coord);

        Ok(())
    }

    /// Set an unaligned coordinate. Fails if an aligned coordinate of the same name exists.
    ///
    pub fn set_attr(&mut self, dim: Dim, attr: Variable) -> Result<()> {
        if self.coords.contains_key(&dim) {
            return Err(Error::DataArray(format!(
                "Attempt to insert attribute with name {dim} shadowing coord."
            )));
        }
        self.extents.set_dims(attr.dims(), dim_of_coord(&attr, dim))?;
        self.item.coords.insert(dim, attr);

        Ok(())
    }

    pub fn set_mask<S: Into<String>>(&mut self, name: S, mask: Variable) -> Result<()> {
        self.extents.set_dims(mask.dims(), None)?;
        self.item.masks.insert(name.into(), mask);

        Ok(())
    }

    /// Replace the data, keeping coordinates and dropping attributes and masks. The new data must
    /// agree with the existing extents.
    ///
    pub fn set_data(&mut self, data: Variable) -> Result<()> {
        self.set_data_with_policy(data, AttrPolicy::Drop)
    }

    /// Replace the data, keeping coordinates and dropping masks. Attributes are kept or dropped
    /// according to ``policy``.
    ///
    pub fn set_data_with_policy(&mut self, data: Variable, policy: AttrPolicy) -> Result<()> {
        self.extents.set_dims(data.dims(), None)?;
        self.item.data = data;
        self.item.masks.clear();
        if policy == AttrPolicy::Drop {
            self.item.coords.clear();
        }

        self.rebuild_dims()
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

    pub fn erase_attr(&mut self, dim: Dim) -> Result<()> {
        self.extract_attr(dim).map(|_| ())
    }

    pub fn extract_attr(&mut self, dim: Dim) -> Result<Variable> {
        let attr = self
            .item
            .coords
            .remove(&dim)
            .ok_or_else(|| not_found("attrs", dim))?;
        self.rebuild_dims()?;

        Ok(attr)
    }

    pub fn erase_mask(&mut self, name: &str) -> Result<()> {
        self.extract_mask(name).map(|_| ())
    }

    pub fn extract_mask(&mut self, name: &str) -> Result<Variable> {
        let mask = self
            .item
            .masks
            .remove(name)
            .ok_or_else(|| not_found("masks", name))?;
        self.rebuild_dims()?;

        Ok(mask)
    }

    pub fn view(&self) -> Result<DataArrayConstView<'_>> {
        DataArrayConstView::new(self.source(), vec![])
    }

    pub fn view_mut(&mut self) -> Result<DataArrayView<'_>> {
        let name = self.name.clone();
        DataArrayView::new(Owner::Array(self), name, vec![])
    }

    pub fn slice(&self, slice: Slice) -> Result<DataArrayConstView<'_>> {
        self.view()?.slice(slice)
    }

    pub fn slice_mut(&mut self, slice: Slice) -> Result<DataArrayView<'_>> {
        self.view_mut()?.slice(slice)
    }

    /// Relabel dimension ``from`` as ``to`` in the data and all metadata
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

        rename_all(Some(&mut self.item.data), from, to)?;
        rename_all(self.coords.values_mut(), from, to)?;
        rename_all(self.item.coords.values_mut(), from, to)?;
        rename_all(self.item.masks.values_mut(), from, to)?;
        rename_key(&mut self.coords, from, to);
        rename_key(&mut self.item.coords, from, to);

        self.rebuild_dims()
    }

    /// Independent deep copy
    ///
    pub fn copy(&self) -> Result<DataArray> {
        Ok(DataArray {
            name: self.name.clone(),
            item: DatasetData {
                data: self.item.data.copy()?,
                coords: deep_copy(&self.item.coords)?,
                masks: deep_copy(&self.item.masks)?,
            },
            coords: deep_copy(&self.coords)?,
            extents: self.extents.clone(),
        })
    }

    pub(crate) fn source(&self) -> ItemSource<'_> {
        ItemSource {
            name: &self.name,
            item: &self.item,
            aligned: &self.coords,
            shared_masks: None,
        }
    }

    /// Name, data, coordinates, masks and attributes
    #[allow(clippy::type_complexity)]
    /// Another data array holding the same handles as ``self``
    ///
    pub(crate) fn share(&mut self) -> DataArray {
        DataArray {
            name: self.name.clone(),
            item: self.item.clone(),
            coords: self.coords.clone(),
            extents: self.extents.clone(),
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        Variable,
        BTreeMap<Dim, Variable>,
        BTreeMap<String, Variable>,
        BTreeMap<Dim, Variable>,
    ) {
        (
            self.name,
            self.item.data,
            self.coords,
            self.item.masks,
            self.item.coords,
        )
    }

    fn rebuild_dims(&mut self) -> Result<()> {
        let mut extents = ExtentTable::default();
        extents.set_dims(self.item.data.dims(), None)?;
        for (dim, coord) in self.coords.iter().chain(self.item.coords.iter()) {
            extents.set_dims(coord.dims(), dim_of_coord(coord, *dim))?;
        }
        for mask in self.item.masks.values() {
            extents.set_dims(mask.dims(), None)?;
        }
        self.extents = extents;
        debug!(name = self.name.as_str(), "rebuilt data array extents");

        Ok(())
    }
}

impl PartialEq for DataArray {
    fn eq(&self, other: &Self) -> bool {
        self.item.data == other.item.data
            && self.coords() == other.coords()
            && self.masks() == other.masks()
            && self.attrs() == other.attrs()
    }
}

impl<'a> PartialEq<DataArrayConstView<'a>> for DataArray {
    fn eq(&self, other: &DataArrayConstView<'a>) -> bool {
        self.item.data == *other.data()
            && self.coords() == *other.coords()
            && self.masks() == *other.masks()
            && self.attrs() == *other.attrs()
    }
}

impl<'a> PartialEq<DataArray> for DataArrayConstView<'a> {
    fn eq(&self, other: &DataArray) -> bool {
        other == self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{arange, linspace, values_f64};

    fn histogram() -> DataArray {
        DataArray::from_parts(
            "counts",
            arange::<f64>(&[(Dim::X, 4)]),
            [(Dim::X, linspace(Dim::X, 0.0, 5))],
            [(
                String::from("bad"),
                Variable::new(Dimensions::one(Dim::X, 4), vec![false, false, true, false]).unwrap(),
            )],
            [(Dim::TEMPERATURE, Variable::scalar(273.0))],
        )
        .unwrap()
    }

    #[test]
    fn test_new() -> Result<()> {
        let array = DataArray::new(arange::<i32>(&[(Dim::X, 2), (Dim::Y, 2)]))?;
        assert_eq!(array.name(), "");
        assert_eq!(array.dims().labels(), &[Dim::X, Dim::Y]);
        assert_eq!(array.dtype(), DType::I32);
        assert!(array.coords().is_empty());
        assert!(array.attrs().is_empty());
        assert!(array.masks().is_empty());

        Ok(())
    }

    #[test]
    fn test_bin_edges() -> Result<()> {
        let array = histogram();
        assert_eq!(array.coords().get(&Dim::X)?.dims().shape(), &[5]);

        let result = DataArray::from_parts(
            "counts",
            arange::<f64>(&[(Dim::X, 4)]),
            [(Dim::X, linspace(Dim::X, 0.0, 6))],
            BTreeMap::<String, Variable>::new(),
            BTreeMap::<Dim, Variable>::new(),
        );
        assert!(matches!(result, Err(Error::Dimension(_))));

        Ok(())
    }

    #[test]
    fn test_point_slice_keeps_bracketing_edges() -> Result<()> {
        let array = histogram();
        let bin = array.slice(Slice::point(Dim::X, 2))?;
        assert!(!bin.coords().contains(&Dim::X));
        assert!(bin.attrs().contains(&Dim::X));
        assert_eq!(values_f64(bin.attrs().get(&Dim::X)?), vec![2.0, 3.0]);
        assert!(bin.attrs().contains(&Dim::TEMPERATURE));
        assert_eq!(bin.masks().get("bad")?.values::<bool>()?.to_vec(), vec![true]);

        let bins = array.slice(Slice::range(Dim::X, 1, 3))?;
        assert_eq!(values_f64(bins.coords().get(&Dim::X)?), vec![1.0, 2.0, 3.0]);
        assert!(!bins.attrs().contains(&Dim::X));

        Ok(())
    }

    #[test]
    fn test_shadowing() -> Result<()> {
        let mut array = histogram();
        let result = array.set_attr(Dim::X, linspace(Dim::X, 0.0, 4));
        assert!(matches!(result, Err(Error::DataArray(_))));
        let result = array.set_coord(Dim::TEMPERATURE, Variable::scalar(0.0));
        assert!(matches!(result, Err(Error::DataArray(_))));

        Ok(())
    }

    #[test]
    fn test_coord_outside_data_dims_is_hidden() -> Result<()> {
        let mut array = histogram();
        array.set_coord(Dim::Y, linspace(Dim::Y, 0.0, 2))?;
        assert!(!array.coords().contains(&Dim::Y));
        assert!(!array.view()?.coords().contains(&Dim::Y));
        assert_eq!(array.extract_coord(Dim::Y)?, linspace(Dim::Y, 0.0, 2));

        Ok(())
    }

    #[test]
    fn test_set_data() -> Result<()> {
        let mut array = histogram();
        array.set_data(linspace(Dim::X, 1.0, 4))?;
        assert_eq!(values_f64(&array.data()), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(array.coords().contains(&Dim::X));
        assert!(array.attrs().is_empty());
        assert!(array.masks().is_empty());

        let result = array.set_data(linspace(Dim::X, 1.0, 5));
        assert!(matches!(result, Err(Error::Dimension(_))));
        assert_eq!(array.dims().shape(), &[4]);

        let mut array = histogram();
        array.set_data_with_policy(linspace(Dim::X, 1.0, 4), AttrPolicy::Keep)?;
        assert!(array.attrs().contains(&Dim::TEMPERATURE));
        assert!(!array.masks().contains("bad"));

        Ok(())
    }

    #[test]
    fn test_erase() -> Result<()> {
        let mut array = histogram();
        array.erase_attr(Dim::TEMPERATURE)?;
        array.erase_mask("bad")?;
        let edges = array.extract_coord(Dim::X)?;
        assert_eq!(edges.dims().shape(), &[5]);
        assert!(array.coords().is_empty());
        assert!(array.attrs().is_empty());
        assert!(array.masks().is_empty());

        assert!(matches!(array.erase_coord(Dim::X), Err(Error::NotFound(_))));
        assert!(matches!(array.erase_attr(Dim::X), Err(Error::NotFound(_))));
        assert!(matches!(array.erase_mask("bad"), Err(Error::NotFound(_))));

        array.set_coord(Dim::X, linspace(Dim::X, 0.0, 4))?;
        assert!(array.coords().contains(&Dim::X));

        Ok(())
    }

    #[test]
    fn test_rename() -> Result<()> {
        let mut array = histogram();
        array.rename(Dim::X, Dim::WAVELENGTH)?;
        assert_eq!(array.dims().labels(), &[Dim::WAVELENGTH]);
        assert_eq!(
            array.coords().get(&Dim::WAVELENGTH)?.dims().labels(),
            &[Dim::WAVELENGTH]
        );
        assert_eq!(
            array.masks().get("bad")?.dims().labels(),
            &[Dim::WAVELENGTH]
        );

        array.rename(Dim::WAVELENGTH, Dim::WAVELENGTH)?;
        assert_eq!(array.dims().labels(), &[Dim::WAVELENGTH]);
        assert!(array.coords().contains(&Dim::WAVELENGTH));

        Ok(())
    }

    #[test]
    fn test_data_handles() -> Result<()> {
        let mut array = histogram();
        assert!(matches!(
            array.data().values_mut::<f64>(),
            Err(Error::ReadOnly)
        ));

        array.data_mut().values_mut::<f64>()?.set(0, 8.0)?;
        assert_eq!(array.values::<f64>()?[0], 8.0);

        array.set_unit(Unit::counts())?;
        assert_eq!(array.unit(), Unit::counts());

        Ok(())
    }

    #[test]
    fn test_copy_and_equality() -> Result<()> {
        let mut array = histogram();
        let copy = array.copy()?;
        assert_eq!(copy, array);

        let mut renamed = array.copy()?;
        renamed.set_name("other");
        assert_eq!(renamed, array);

        array.values_mut::<f64>()?.set(1, -1.0)?;
        assert_ne!(copy, array);
        assert_eq!(array, array.view()?);
        assert_eq!(array.view()?, array);

        let shared: &DataArray = &array;
        let mut detached = shared.copy()?;
        detached.values_mut::<f64>()?.set(0, 42.0)?;
        detached.coords_mut().get(&Dim::X)?.values_mut::<f64>()?.set(0, -5.0)?;
        assert_eq!(array.values::<f64>()?[0], 0.0);
        assert_eq!(array.coords().get(&Dim::X)?.values::<f64>()?[0], 0.0);

        Ok(())
    }
}
