use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    dim::Dim,
    dimensions::{self, Dimensions},
    dtype::{DType, Element, FloatElement, Values},
    element_array::{ElementArrayView, ElementArrayViewMut},
    errors::{Error, Result},
    slice::Slice,
    strides::Strides,
    units::Unit,
    view_index::ViewIndex,
};

/// Storage shared by every variable viewing the same data.
///
/// Values, variances and unit are guarded separately so the unit can be read while an element
/// accessor holds the values. Presence of variances is tracked outside the lock for the same
/// reason.
///
#[derive(Debug)]
pub struct BufferData {
    values: RwLock<Values>,
    variances: RwLock<Option<Values>>,
    has_variances: AtomicBool,
    unit: RwLock<Unit>,
    dtype: DType,
    len: usize,
}

/// A typed, strided view over a shared, reference counted buffer.
///
/// Cloning a ``Variable`` yields another handle on the same buffer, as does slicing, broadcasting,
/// folding or transposing. Writes through any handle are visible through all others. Use ``copy``
/// for an independent deep copy.
///
/// Element data and unit live in the shared buffer and are mutated through ``&self``, guarded by
/// the readonly flag of the handle. Dimension labels, strides and offset belong to the handle.
///
#[derive(Clone, Debug)]
pub struct Variable {
    dims: Dimensions,
    strides: Strides,
    offset: usize,
    buffer: Arc<BufferData>,
    readonly: bool,
}

impl Variable {
    pub fn new<T: Element>(dims: Dimensions, values: Vec<T>) -> Result<Self> {
        Self::with_unit(dims, Unit::dimensionless(), values)
    }

    pub fn with_unit<T: Element>(dims: Dimensions, unit: Unit, values: Vec<T>) -> Result<Self> {
        Self::from_parts(dims, unit, T::into_values(values), None)
    }

    pub fn with_variances<T: FloatElement>(
        dims: Dimensions,
        unit: Unit,
        values: Vec<T>,
        variances: Vec<T>,
    ) -> Result<Self> {
        Self::from_parts(
            dims,
            unit,
            T::into_values(values),
            Some(T::into_values(variances)),
        )
    }

    /// A zero-dimensional variable holding ``value``
    ///
    pub fn scalar<T: Element>(value: T) -> Self {
        let dims = Dimensions::default();
        Self {
            strides: Strides::contiguous(&dims),
            dims,
            offset: 0,
            buffer: Arc::new(BufferData {
                values: RwLock::new(T::into_values(vec![value])),
                variances: RwLock::new(None),
                has_variances: AtomicBool::new(false),
                unit: RwLock::new(Unit::dimensionless()),
                dtype: T::DTYPE,
                len: 1,
            }),
            readonly: false,
        }
    }

    pub(crate) fn from_parts(
        dims: Dimensions,
        unit: Unit,
        values: Values,
        variances: Option<Values>,
    ) -> Result<Self> {
        if values.len() != dims.volume() {
            return Err(Error::Dimension(format!(
                "Creating Variable: data size {} does not match volume given by {dims}.",
                values.len()
            )));
        }
        if let Some(variances) = &variances {
            if !values.dtype().supports_variances() {
                return Err(Error::Variances(format!(
                    "Variances not supported for dtype {}.",
                    values.dtype()
                )));
            }
            if variances.len() != values.len() || variances.dtype() != values.dtype() {
                return Err(Error::Variances(String::from(
                    "Creating Variable: variances must match values in size and dtype.",
                )));
            }
        }

        Ok(Self {
            strides: Strides::contiguous(&dims),
            dims,
            offset: 0,
            buffer: Arc::new(BufferData {
                dtype: values.dtype(),
                len: values.len(),
                values: RwLock::new(values),
                has_variances: AtomicBool::new(variances.is_some()),
                variances: RwLock::new(variances),
                unit: RwLock::new(unit),
            }),
            readonly: false,
        })
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn dtype(&self) -> DType {
        self.buffer.dtype
    }

    pub fn unit(&self) -> Unit {
        self.buffer.unit.read().clone()
    }

    pub fn has_variances(&self) -> bool {
        self.buffer.has_variances.load(Ordering::Acquire)
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether this handle sees only part of its buffer, or sees some elements more than once
    ///
    pub fn is_slice(&self) -> bool {
        self.offset != 0 || self.dims.volume() != self.buffer.len
    }

    /// Whether both handles view exactly the same elements of the same buffer
    ///
    pub fn is_same(&self, other: &Variable) -> bool {
        self.dims == other.dims
            && self.strides == other.strides
            && self.offset == other.offset
            && Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Another handle on the same data that refuses every mutation
    ///
    pub fn as_const(&self) -> Variable {
        let mut out = self.clone();
        out.readonly = true;

        out
    }

    pub fn values<T: Element>(&self) -> Result<ElementArrayView<'_, T>> {
        let guard = self.buffer.values.try_read().ok_or(Error::Borrowed)?;
        let data = RwLockReadGuard::try_map(guard, |values| T::from_values(values))
            .map_err(|_| self.type_mismatch(T::DTYPE))?;

        Ok(ElementArrayView::new(data, self.offset, self.dims, self.strides))
    }

    pub fn values_mut<T: Element>(&self) -> Result<ElementArrayViewMut<'_, T>> {
        self.expect_writable()?;
        let guard = self.buffer.values.try_write().ok_or(Error::Borrowed)?;
        let data = RwLockWriteGuard::try_map(guard, |values| T::from_values_mut(values))
            .map_err(|_| self.type_mismatch(T::DTYPE))?;

        Ok(ElementArrayViewMut::new(
            data,
            self.offset,
            self.dims,
            self.strides,
            Arc::clone(&self.buffer),
        ))
    }

    pub fn variances<T: FloatElement>(&self) -> Result<ElementArrayView<'_, T>> {
        self.expect_variances()?;
        let guard = self.buffer.variances.try_read().ok_or(Error::Borrowed)?;
        let data = RwLockReadGuard::try_map(guard, |variances| {
            variances.as_ref().and_then(T::from_values)
        })
        .map_err(|_| self.type_mismatch(T::DTYPE))?;

        Ok(ElementArrayView::new(data, self.offset, self.dims, self.strides))
    }

    pub fn variances_mut<T: FloatElement>(&self) -> Result<ElementArrayViewMut<'_, T>> {
        self.expect_writable()?;
        self.expect_variances()?;
        let guard = self.buffer.variances.try_write().ok_or(Error::Borrowed)?;
        let data = RwLockWriteGuard::try_map(guard, |variances| {
            variances.as_mut().and_then(T::from_values_mut)
        })
        .map_err(|_| self.type_mismatch(T::DTYPE))?;

        Ok(ElementArrayViewMut::new(
            data,
            self.offset,
            self.dims,
            self.strides,
            Arc::clone(&self.buffer),
        ))
    }

    /// A view of part of this variable. No data is copied.
    ///
    /// A point slice drops the dimension, a range slice keeps it with the new extent.
    ///
    pub fn slice(&self, slice: Slice) -> Result<Variable> {
        let dims = self.dims.slice(&slice)?;
        let (i, stride) = self.strides.of(&self.dims, slice.dim())?;
        let mut out = self.clone();
        if dims.volume() > 0 {
            out.offset += slice.begin() * stride;
        }
        if !slice.is_range() {
            out.strides.erase(i);
        }
        out.dims = dims;

        Ok(out)
    }

    /// A view of this variable over ``target``, which must include all current dimensions with
    /// equal extents. New dimensions reuse the same elements and the result is readonly if any
    /// are added with extent above one.
    ///
    pub fn broadcast(&self, target: &Dimensions) -> Result<Variable> {
        if !target.includes(&self.dims) {
            return Err(Error::Dimension(format!(
                "Cannot broadcast {} to {target}.",
                self.dims
            )));
        }
        let mut out = self.clone();
        out.strides = self.strides.for_iteration(&self.dims, target)?;
        out.dims = *target;
        if target.volume() != self.dims.volume() {
            out.readonly = true;
        }

        Ok(out)
    }

    /// Express dimension ``dim`` as the nested dimensions ``to``, without touching the buffer
    ///
    pub fn fold(&self, dim: Dim, to: &Dimensions) -> Result<Variable> {
        let dims = dimensions::fold(&self.dims, dim, to)?;
        let (i, stride) = self.strides.of(&self.dims, dim)?;
        let nested = Strides::contiguous(to);
        let mut strides = Vec::with_capacity(dims.ndim());
        for j in 0..self.dims.ndim() {
            if j == i {
                strides.extend(nested.as_slice().iter().map(|s| s * stride));
            } else {
                strides.push(self.strides[j]);
            }
        }

        let mut out = self.clone();
        out.strides = Strides::from_slice(&strides)?;
        out.dims = dims;

        Ok(out)
    }

    /// Reorder dimensions, without touching the buffer. An empty order reverses them.
    ///
    pub fn transpose(&self, order: &[Dim]) -> Result<Variable> {
        let dims = dimensions::transpose(&self.dims, order)?;
        let mut out = self.clone();
        out.strides = self.strides.transpose(&self.dims, &dims)?;
        out.dims = dims;

        Ok(out)
    }

    /// Merge the adjacent dimensions ``from``, in memory order, into the single dimension ``to``.
    ///
    /// Returns a view if the strides allow it and a contiguous copy otherwise. With no ``from``
    /// dimensions, a new outer dimension ``to`` of extent 1 is added.
    ///
    pub fn flatten(&self, from: &[Dim], to: Dim) -> Result<Variable> {
        if from.is_empty() {
            let mut target = Dimensions::one(to, 1);
            for (dim, extent) in self.dims.iter() {
                target.add_inner(dim, extent)?;
            }
            return self.broadcast(&target);
        }

        let start = self
            .dims
            .labels()
            .windows(from.len())
            .position(|window| window == from)
            .ok_or_else(|| {
                Error::Dimension(format!(
                    "Can only flatten a contiguous set of dimensions in the correct order, got \
                     {from:?} for {}.",
                    self.dims
                ))
            })?;

        let mut out = self.clone();
        for pair in from.windows(2) {
            let (outer, inner) = (out.strides[start], out.strides[start + 1]);
            if outer != inner * out.dims.size(start + 1) {
                return self.copy()?.flatten(from, to);
            }
            let merged = out.dims.size(start) * out.dims.size(start + 1);
            out.dims.erase(pair[0])?;
            out.strides.erase(start);
            out.dims.resize(pair[1], merged)?;
        }
        if let Some(last) = from.last() {
            out.dims.rename(*last, to)?;
        }

        Ok(out)
    }

    /// Drop extent-1 dimensions. With no ``dims`` given, all of them are dropped.
    ///
    pub fn squeeze(&self, dims: &[Dim]) -> Result<Variable> {
        let selected: Vec<Dim> = if dims.is_empty() {
            self.dims
                .iter()
                .filter(|(_, extent)| *extent == 1)
                .map(|(dim, _)| dim)
                .collect()
        } else {
            dims.to_vec()
        };

        let mut out = self.clone();
        for dim in selected {
            let extent = out.dims.at(dim)?;
            if extent != 1 {
                return Err(Error::Dimension(format!(
                    "Cannot squeeze {dim} of extent {extent}, expected extent 1."
                )));
            }
            out = out.slice(Slice::point(dim, 0))?;
        }

        Ok(out)
    }

    pub fn rename(&mut self, from: Dim, to: Dim) -> Result<()> {
        self.dims.rename(from, to)
    }

    /// Independent, contiguous, writable copy. Nested variables are copied too.
    ///
    pub fn copy(&self) -> Result<Variable> {
        let values = self.buffer_values()?.deep_gather(self.positions())?;
        let variances = self.gather_variances()?;
        let dims = self.dims;

        Ok(Self {
            strides: Strides::contiguous(&dims),
            dims,
            offset: 0,
            buffer: Arc::new(BufferData {
                dtype: self.buffer.dtype,
                len: values.len(),
                values: RwLock::new(values),
                has_variances: AtomicBool::new(variances.is_some()),
                variances: RwLock::new(variances),
                unit: RwLock::new(self.unit()),
            }),
            readonly: false,
        })
    }

    /// Change the unit of the underlying buffer.
    ///
    /// A slice cannot change the unit since that would change it for the whole buffer.
    ///
    pub fn set_unit(&self, unit: Unit) -> Result<()> {
        self.expect_writable()?;
        let mut current = self.buffer.unit.try_write().ok_or(Error::Borrowed)?;
        if *current != unit && self.is_slice() {
            return Err(Error::Unit(String::from(
                "Partial view on data of variable cannot be used to change the unit.",
            )));
        }
        *current = unit;

        Ok(())
    }

    /// Attach, replace or remove (``None``) the variances of the underlying buffer.
    ///
    /// Not possible through a slice since that would require resizing the shared buffer.
    ///
    pub fn set_variances(&self, variances: Option<&Variable>) -> Result<()> {
        self.expect_writable()?;
        if self.is_slice() {
            return Err(Error::Variances(String::from(
                "Cannot add variances via sliced view of Variable.",
            )));
        }

        let variances = match variances {
            None => None,
            Some(variances) => {
                if !self.dtype().supports_variances() {
                    return Err(Error::Variances(format!(
                        "Variances not supported for dtype {}.",
                        self.dtype()
                    )));
                }
                if variances.has_variances() {
                    return Err(Error::Variances(String::from(
                        "Cannot set variances from variable with variances.",
                    )));
                }
                expect_unit(&variances.unit(), &self.unit())?;
                expect_dtype(variances.dtype(), self.dtype())?;
                if variances.dims != self.dims {
                    return Err(Error::Dimension(format!(
                        "Expected {} to be equal to {}.",
                        variances.dims, self.dims
                    )));
                }

                let gathered = variances.gather_values()?;
                let mut out = self
                    .buffer
                    .values
                    .try_read()
                    .ok_or(Error::Borrowed)?
                    .clone();
                out.scatter(self.positions(), &gathered)?;
                Some(out)
            }
        };

        let mut target = self.buffer.variances.try_write().ok_or(Error::Borrowed)?;
        self.buffer
            .has_variances
            .store(variances.is_some(), Ordering::Release);
        *target = variances;

        Ok(())
    }

    /// Copy the elements of ``other`` into the elements viewed by this variable.
    ///
    /// ``other`` is broadcast to the dimensions of this variable. Unit, dtype and presence of
    /// variances must match. Storing a nested variable that would make this buffer reachable
    /// from itself is rejected before anything is written.
    ///
    pub fn assign(&self, other: &Variable) -> Result<()> {
        self.expect_writable()?;
        expect_unit(&other.unit(), &self.unit())?;
        expect_dtype(other.dtype(), self.dtype())?;
        if other.has_variances() != self.has_variances() {
            return Err(Error::Variances(String::from(
                "Expected both or neither operand to have variances.",
            )));
        }
        if !self.dims.includes(&other.dims) {
            return Err(Error::Dimension(format!(
                "Cannot assign {} to {}.",
                other.dims, self.dims
            )));
        }

        let source = other.over(&self.dims)?;
        let values = source.gather_values()?;
        for nested in values.nested() {
            nested.check_nesting(&self.buffer)?;
        }
        let variances = source.gather_variances()?;

        let mut target_values = self.buffer.values.try_write().ok_or(Error::Borrowed)?;
        let mut target_variances = match variances {
            Some(_) => Some(self.buffer.variances.try_write().ok_or(Error::Borrowed)?),
            None => None,
        };
        target_values.scatter(self.positions(), &values)?;
        if let (Some(variances), Some(Some(target))) =
            (variances, target_variances.as_deref_mut())
        {
            target.scatter(self.positions(), &variances)?;
        }

        Ok(())
    }

    /// Structural equality, raising ``Borrowed`` if either buffer is held by a mutable accessor
    ///
    pub fn equals(&self, other: &Variable) -> Result<bool> {
        if self.is_same(other) {
            return Ok(true);
        }
        if self.unit() != other.unit()
            || self.dims != other.dims
            || self.dtype() != other.dtype()
            || self.has_variances() != other.has_variances()
        {
            return Ok(false);
        }

        {
            let a = self.buffer.values.try_read_recursive().ok_or(Error::Borrowed)?;
            let b = other.buffer.values.try_read_recursive().ok_or(Error::Borrowed)?;
            if !a.equal_at(self.positions(), &b, other.positions()) {
                return Ok(false);
            }
        }

        let a = self.buffer.variances.try_read_recursive().ok_or(Error::Borrowed)?;
        let b = other.buffer.variances.try_read_recursive().ok_or(Error::Borrowed)?;
        Ok(match (a.as_ref(), b.as_ref()) {
            (Some(a), Some(b)) => a.equal_at(self.positions(), b, other.positions()),
            _ => true,
        })
    }

    /// Copy ``data`` into the part of this variable selected by ``slice``
    ///
    pub fn set_slice(&self, slice: Slice, data: &Variable) -> Result<()> {
        self.slice(slice)?.assign(data)
    }

    /// Whether ``buffer`` is this variable's buffer or is reachable through nested elements
    ///
    pub(crate) fn reaches(&self, buffer: &Arc<BufferData>) -> Result<bool> {
        if Arc::ptr_eq(&self.buffer, buffer) {
            return Ok(true);
        }
        if self.dtype() != DType::Variable {
            return Ok(false);
        }

        let values = self.buffer.values.try_read().ok_or(Error::Borrowed)?;
        for nested in values.nested() {
            if nested.reaches(buffer)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    #[cfg(test)]
    pub(crate) fn buffer(&self) -> &Arc<BufferData> {
        &self.buffer
    }

    pub(crate) fn buffer_values(&self) -> Result<RwLockReadGuard<'_, Values>> {
        self.buffer.values.try_read().ok_or(Error::Borrowed)
    }

    pub(crate) fn positions(&self) -> ViewIndex {
        ViewIndex::new(self.offset, &self.dims, &self.strides)
    }

    /// Elements in logical order as a new contiguous buffer
    ///
    pub(crate) fn gather_values(&self) -> Result<Values> {
        Ok(self.buffer_values()?.gather(self.positions()))
    }

    /// Elements and variances in logical order as new contiguous buffers
    ///
    pub(crate) fn gather_all(&self) -> Result<(Values, Option<Values>)> {
        Ok((self.gather_values()?, self.gather_variances()?))
    }

    fn gather_variances(&self) -> Result<Option<Values>> {
        let variances = self.buffer.variances.try_read().ok_or(Error::Borrowed)?;

        Ok(variances
            .as_ref()
            .map(|variances| variances.gather(self.positions())))
    }

    /// This variable iterated over ``dims``, broadcasting missing dimensions
    ///
    fn over(&self, dims: &Dimensions) -> Result<Variable> {
        let mut out = self.clone();
        out.strides = self.strides.for_iteration(&self.dims, dims)?;
        out.dims = *dims;

        Ok(out)
    }

    fn expect_writable(&self) -> Result<()> {
        if self.readonly {
            Err(Error::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn expect_variances(&self) -> Result<()> {
        if self.has_variances() {
            Ok(())
        } else {
            Err(Error::Variances(String::from("Variable does not have variances.")))
        }
    }

    fn type_mismatch(&self, requested: DType) -> Error {
        Error::Type(format!(
            "Expected dtype {requested}, but variable holds {}.",
            self.dtype()
        ))
    }
}

pub(crate) fn expect_unit(actual: &Unit, expected: &Unit) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Unit(format!(
            "Expected unit {expected}, got {actual}."
        )))
    }
}

pub(crate) fn expect_dtype(actual: DType, expected: DType) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Type(format!(
            "Expected dtype {expected}, got {actual}."
        )))
    }
}

/// Structural equality: unit, dimensions, dtype, presence of variances and elements in logical
/// order. Strides and offsets are not compared.
///
/// Never waits on an element accessor. Variables whose buffer is exclusively borrowed compare
/// unequal, see ``Variable::equals`` to tell that case apart.
///
impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Variable {} dtype={} unit={}{}>",
            self.dims,
            self.dtype(),
            self.unit(),
            if self.has_variances() { " with variances" } else { "" }
        )
    }
}
