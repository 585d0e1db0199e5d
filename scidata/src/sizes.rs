use std::fmt::{self, Debug, Display};

use crate::{
    dim::Dim,
    errors::{Error, Result},
    slice::Slice,
};

/// Maximum number of dimensions of any array
pub const NDIM_MAX: usize = 6;

/// A small map with a fixed capacity that remembers insertion order.
///
/// Entries live in two parallel inline arrays and are looked up by linear scan, which beats hashing
/// for the handful of keys a dimension map ever holds. Removing an entry compacts the arrays and
/// preserves the relative order of the remaining entries.
///
#[derive(Clone, Copy, Debug)]
pub struct SmallStableMap<K, V, const N: usize>
where
    K: Copy + Default + Eq + Debug + Display,
    V: Copy + Default + PartialEq + Debug,
{
    keys: [K; N],
    values: [V; N],
    size: usize,
}

impl<K, V, const N: usize> SmallStableMap<K, V, N>
where
    K: Copy + Default + Eq + Debug + Display,
    V: Copy + Default + PartialEq + Debug,
{
    pub fn new() -> Self {
        Self {
            keys: [K::default(); N],
            values: [V::default(); N],
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn keys(&self) -> &[K] {
        &self.keys[..self.size]
    }

    pub fn values(&self) -> &[V] {
        &self.values[..self.size]
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.keys().iter().copied().zip(self.values().iter().copied())
    }

    pub fn find(&self, key: K) -> Option<usize> {
        self.keys().iter().position(|k| *k == key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: K) -> Option<V> {
        self.find(key).map(|i| self.values[i])
    }

    /// Overwrite the value of an existing key
    ///
    pub fn assign(&mut self, key: K, value: V) -> Result<()> {
        let i = self.expect_index(key)?;
        self.values[i] = value;

        Ok(())
    }

    /// Insert a new key in front of all existing keys
    ///
    pub fn insert_left(&mut self, key: K, value: V) -> Result<()> {
        self.expect_insertable(key)?;
        self.keys.copy_within(0..self.size, 1);
        self.values.copy_within(0..self.size, 1);
        self.keys[0] = key;
        self.values[0] = value;
        self.size += 1;

        Ok(())
    }

    /// Insert a new key behind all existing keys
    ///
    pub fn insert_right(&mut self, key: K, value: V) -> Result<()> {
        self.expect_insertable(key)?;
        self.keys[self.size] = key;
        self.values[self.size] = value;
        self.size += 1;

        Ok(())
    }

    pub fn erase(&mut self, key: K) -> Result<()> {
        let i = self.expect_index(key)?;
        self.keys.copy_within(i + 1..self.size, i);
        self.values.copy_within(i + 1..self.size, i);
        self.size -= 1;
        self.keys[self.size] = K::default();
        self.values[self.size] = V::default();

        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Change a key in place, keeping its position and value
    ///
    pub fn replace_key(&mut self, from: K, to: K) -> Result<()> {
        let i = self.expect_index(from)?;
        if from != to && self.contains(to) {
            return Err(Error::Dimension(format!("Duplicate dimension {to}.")));
        }
        self.keys[i] = to;

        Ok(())
    }

    fn expect_index(&self, key: K) -> Result<usize> {
        self.find(key).ok_or_else(|| {
            let keys: Vec<String> = self.keys().iter().map(|k| k.to_string()).collect();
            Error::Dimension(format!(
                "Expected dimension to be in [{}], got {key}.",
                keys.join(", ")
            ))
        })
    }

    fn expect_insertable(&self, key: K) -> Result<()> {
        if self.contains(key) {
            return Err(Error::Dimension(format!("Duplicate dimension {key}.")));
        }
        if self.size == N {
            return Err(Error::Dimension(String::from(
                "Maximum number of allowed dimensions exceeded.",
            )));
        }

        Ok(())
    }
}

impl<K, V, const N: usize> Default for SmallStableMap<K, V, N>
where
    K: Copy + Default + Eq + Debug + Display,
    V: Copy + Default + PartialEq + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Equality ignores insertion order
impl<K, V, const N: usize> PartialEq for SmallStableMap<K, V, N>
where
    K: Copy + Default + Eq + Debug + Display,
    V: Copy + Default + PartialEq + Debug,
{
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.iter().all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K, V, const N: usize> Eq for SmallStableMap<K, V, N>
where
    K: Copy + Default + Eq + Debug + Display,
    V: Copy + Default + Eq + Debug,
{
}

/// Ordered mapping from dimension label to extent, outer dimension first.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sizes {
    map: SmallStableMap<Dim, usize, NDIM_MAX>,
}

impl Sizes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes holding the single dimension ``dim``
    ///
    pub fn single(dim: Dim, extent: usize) -> Self {
        let mut map = SmallStableMap::new();
        map.keys[0] = dim;
        map.values[0] = extent;
        map.size = 1;

        Self { map }
    }

    /// Build from ``(dim, extent)`` pairs given outer to inner
    ///
    pub fn from_pairs(pairs: &[(Dim, usize)]) -> Result<Self> {
        let mut sizes = Self::new();
        for (dim, extent) in pairs {
            sizes.set(*dim, *extent)?;
        }

        Ok(sizes)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn labels(&self) -> &[Dim] {
        self.map.keys()
    }

    pub fn extents(&self) -> &[usize] {
        self.map.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dim, usize)> + '_ {
        self.map.iter()
    }

    pub fn contains(&self, dim: Dim) -> bool {
        self.map.contains(dim)
    }

    pub fn get(&self, dim: Dim) -> Option<usize> {
        self.map.get(dim)
    }

    /// Extent of ``dim``, or a dimension error if it is absent
    ///
    pub fn at(&self, dim: Dim) -> Result<usize> {
        self.get(dim).ok_or_else(|| self.not_found(dim))
    }

    /// Position of ``dim`` counting from the outermost dimension
    ///
    pub fn index(&self, dim: Dim) -> Result<usize> {
        self.map.find(dim).ok_or_else(|| self.not_found(dim))
    }

    /// Insert ``dim`` as the innermost dimension, or check that its extent is unchanged
    ///
    pub fn set(&mut self, dim: Dim, extent: usize) -> Result<()> {
        match self.get(dim) {
            Some(current) if current == extent => Ok(()),
            Some(current) => Err(Error::Dimension(format!(
                "Inconsistent size for dim {dim}: {current} vs {extent} in {self}."
            ))),
            None => self.map.insert_right(dim, extent),
        }
    }

    pub fn resize(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.map.assign(dim, extent)
    }

    pub fn erase(&mut self, dim: Dim) -> Result<()> {
        self.map.erase(dim)
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub(crate) fn insert_left(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.map.insert_left(dim, extent)
    }

    pub(crate) fn insert_right(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.map.insert_right(dim, extent)
    }

    pub fn replace_key(&mut self, from: Dim, to: Dim) -> Result<()> {
        self.map.replace_key(from, to)
    }

    /// Whether every dimension of ``other`` is present here with the same extent
    ///
    pub fn includes(&self, other: &Sizes) -> bool {
        other.iter().all(|(dim, extent)| self.get(dim) == Some(extent))
    }

    /// Sizes after applying ``slice``. A point slice removes the dimension, a range resizes it.
    ///
    pub fn slice(&self, slice: &Slice) -> Result<Self> {
        let extent = self.at(slice.dim())?;
        if !slice.fits(extent) {
            return Err(Error::Slice(format!(
                "Expected {slice} to be in range 0..{extent} for dimension {}.",
                slice.dim()
            )));
        }

        let mut out = *self;
        match slice.end() {
            None => out.erase(slice.dim())?,
            Some(end) => out.resize(slice.dim(), end - slice.begin())?,
        }

        Ok(out)
    }

    fn not_found(&self, dim: Dim) -> Error {
        Error::Dimension(format!("Expected dimension to be in {self}, got {dim}."))
    }
}

impl fmt::Display for Sizes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sizes[")?;
        for (i, (dim, extent)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}:{extent}")?;
        }
        write!(f, "]")
    }
}

/// Union of ``a`` and ``b``. Shared dimensions must agree in extent.
///
pub fn merge(a: &Sizes, b: &Sizes) -> Result<Sizes> {
    let mut out = *a;
    for (dim, extent) in b.iter() {
        out.set(dim, extent)?;
    }

    Ok(out)
}

/// Sizes of ``a`` and ``b`` joined along ``dim``.
///
/// An operand without ``dim`` contributes a single slab of extent 1. All other dimensions must
/// agree.
///
pub fn concatenate(a: &Sizes, b: &Sizes, dim: Dim) -> Result<Sizes> {
    let extent = a.get(dim).unwrap_or(1) + b.get(dim).unwrap_or(1);
    let mut out = *a;
    if out.contains(dim) {
        out.resize(dim, extent)?;
    } else {
        out.insert_left(dim, extent)?;
    }
    for (other, other_extent) in b.iter() {
        if other != dim {
            out.set(other, other_extent)?;
        }
    }

    Ok(out)
}

/// Whether a coordinate of ``coord`` sizes holds bin edges along ``dim`` for data of ``data``
/// sizes.
///
/// This is the case if the coordinate is one longer than the data along ``dim`` and every other
/// dimension of the coordinate matches the data exactly. Data that lacks ``dim`` counts as having
/// extent 1 along it, so a point-sliced pair of edges still qualifies. ``Dim::INVALID`` never
/// holds edges.
///
pub fn is_edges(coord: &Sizes, data: &Sizes, dim: Dim) -> bool {
    if dim == Dim::INVALID {
        return false;
    }

    let others_match = coord
        .iter()
        .filter(|(label, _)| *label != dim)
        .all(|(label, extent)| data.get(label) == Some(extent));

    others_match && coord.get(dim) == Some(data.get(dim).unwrap_or(1) + 1)
}
