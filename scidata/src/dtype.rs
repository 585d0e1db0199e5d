use std::{fmt, fmt::Debug, mem, sync::Arc};

use num_traits::Float;

use crate::{
    errors::{Error, Result},
    variable::{BufferData, Variable},
};

/// Element type tag carried by a buffer
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F64,
    F32,
    I64,
    I32,
    Bool,
    String,
    Variable,
}

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::F64 => "float64",
            DType::F32 => "float32",
            DType::I64 => "int64",
            DType::I32 => "int32",
            DType::Bool => "bool",
            DType::String => "string",
            DType::Variable => "Variable",
        }
    }

    /// Size in bytes of one element, for types with a plain memory layout
    ///
    pub fn itemsize(&self) -> Option<usize> {
        match self {
            DType::F64 => Some(mem::size_of::<f64>()),
            DType::F32 => Some(mem::size_of::<f32>()),
            DType::I64 => Some(mem::size_of::<i64>()),
            DType::I32 => Some(mem::size_of::<i32>()),
            DType::Bool => Some(mem::size_of::<bool>()),
            DType::String | DType::Variable => None,
        }
    }

    pub fn supports_variances(&self) -> bool {
        matches!(self, DType::F64 | DType::F32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Type-erased element storage of a buffer
///
#[derive(Clone, Debug)]
pub enum Values {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    Bool(Vec<bool>),
    String(Vec<String>),
    Variable(Vec<Variable>),
}

macro_rules! map_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            Values::F64($v) => Values::F64($body),
            Values::F32($v) => Values::F32($body),
            Values::I64($v) => Values::I64($body),
            Values::I32($v) => Values::I32($body),
            Values::Bool($v) => Values::Bool($body),
            Values::String($v) => Values::String($body),
            Values::Variable($v) => Values::Variable($body),
        }
    };
}

macro_rules! zip_values {
    ($a:expr, $b:expr, ($x:ident, $y:ident) => $body:expr, _ => $otherwise:expr) => {
        match ($a, $b) {
            (Values::F64($x), Values::F64($y)) => $body,
            (Values::F32($x), Values::F32($y)) => $body,
            (Values::I64($x), Values::I64($y)) => $body,
            (Values::I32($x), Values::I32($y)) => $body,
            (Values::Bool($x), Values::Bool($y)) => $body,
            (Values::String($x), Values::String($y)) => $body,
            (Values::Variable($x), Values::Variable($y)) => $body,
            _ => $otherwise,
        }
    };
}

impl Values {
    pub fn dtype(&self) -> DType {
        match self {
            Values::F64(_) => DType::F64,
            Values::F32(_) => DType::F32,
            Values::I64(_) => DType::I64,
            Values::I32(_) => DType::I32,
            Values::Bool(_) => DType::Bool,
            Values::String(_) => DType::String,
            Values::Variable(_) => DType::Variable,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::F64(v) => v.len(),
            Values::F32(v) => v.len(),
            Values::I64(v) => v.len(),
            Values::I32(v) => v.len(),
            Values::Bool(v) => v.len(),
            Values::String(v) => v.len(),
            Values::Variable(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements at ``positions``, in order, as a new contiguous buffer. Nested variables are
    /// shared, not copied.
    ///
    pub(crate) fn gather<I>(&self, positions: I) -> Values
    where
        I: Iterator<Item = usize>,
    {
        map_values!(self, v => positions.map(|p| v[p].clone()).collect())
    }

    /// Like ``gather`` but nested variables are deep copied
    ///
    pub(crate) fn deep_gather<I>(&self, positions: I) -> Result<Values>
    where
        I: Iterator<Item = usize>,
    {
        match self {
            Values::Variable(v) => Ok(Values::Variable(
                positions.map(|p| v[p].copy()).collect::<Result<_>>()?,
            )),
            _ => Ok(self.gather(positions)),
        }
    }

    /// Write the contiguous ``source`` elements to ``positions``, in order
    ///
    pub(crate) fn scatter<I>(&mut self, positions: I, source: &Values) -> Result<()>
    where
        I: Iterator<Item = usize>,
    {
        let (target, source_dtype) = (self.dtype(), source.dtype());
        zip_values!(self, source, (dst, src) => {
            for (p, value) in positions.zip(src.iter()) {
                dst[p] = value.clone();
            }
            Ok(())
        }, _ => Err(Error::Type(format!(
            "Expected dtype {target}, got {source_dtype}."
        ))))
    }

    /// Append the elements of ``other``
    ///
    pub(crate) fn append(&mut self, other: Values) -> Result<()> {
        let (target, source_dtype) = (self.dtype(), other.dtype());
        zip_values!(self, other, (dst, src) => {
            dst.extend(src);
            Ok(())
        }, _ => Err(Error::Type(format!(
            "Expected dtype {target}, got {source_dtype}."
        ))))
    }

    /// Element-wise comparison of the elements at ``positions`` in ``self`` against those at
    /// ``other_positions`` in ``other``
    ///
    pub(crate) fn equal_at<I, J>(&self, positions: I, other: &Values, other_positions: J) -> bool
    where
        I: Iterator<Item = usize>,
        J: Iterator<Item = usize>,
    {
        zip_values!(self, other, (a, b) => {
            positions.zip(other_positions).all(|(i, j)| a[i] == b[j])
        }, _ => false)
    }

    pub(crate) fn nested(&self) -> &[Variable] {
        match self {
            Values::Variable(v) => v,
            _ => &[],
        }
    }

    /// Address of the first element
    ///
    pub(crate) fn as_ptr(&self) -> *const u8 {
        match self {
            Values::F64(v) => v.as_ptr() as *const u8,
            Values::F32(v) => v.as_ptr() as *const u8,
            Values::I64(v) => v.as_ptr() as *const u8,
            Values::I32(v) => v.as_ptr() as *const u8,
            Values::Bool(v) => v.as_ptr() as *const u8,
            Values::String(v) => v.as_ptr() as *const u8,
            Values::Variable(v) => v.as_ptr() as *const u8,
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// A type that can be stored as the elements of a ``Variable``.
///
pub trait Element: private::Sealed + Clone + PartialEq + Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn from_values(values: &Values) -> Option<&[Self]>;

    fn from_values_mut(values: &mut Values) -> Option<&mut [Self]>;

    fn into_values(values: Vec<Self>) -> Values;

    /// Fail if storing this element in ``buffer`` would make ``buffer`` reachable from itself
    ///
    fn check_nesting(&self, _buffer: &Arc<BufferData>) -> Result<()> {
        Ok(())
    }
}

/// Element types that may carry variances
pub trait FloatElement: Element + Float {}

/// Element types that are plain values, with no nested buffers
pub trait Scalar: Element {}

macro_rules! element {
    ($type:ty, $variant:ident) => {
        impl private::Sealed for $type {}

        impl Element for $type {
            const DTYPE: DType = DType::$variant;

            fn from_values(values: &Values) -> Option<&[Self]> {
                match values {
                    Values::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_values_mut(values: &mut Values) -> Option<&mut [Self]> {
                match values {
                    Values::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_values(values: Vec<Self>) -> Values {
                Values::$variant(values)
            }
        }

        impl Scalar for $type {}
    };
}

element!(f64, F64);
element!(f32, F32);
element!(i64, I64);
element!(i32, I32);
element!(bool, Bool);
element!(String, String);

impl FloatElement for f64 {}
impl FloatElement for f32 {}

impl private::Sealed for Variable {}

impl Element for Variable {
    const DTYPE: DType = DType::Variable;

    fn from_values(values: &Values) -> Option<&[Self]> {
        match values {
            Values::Variable(v) => Some(v),
            _ => None,
        }
    }

    fn from_values_mut(values: &mut Values) -> Option<&mut [Self]> {
        match values {
            Values::Variable(v) => Some(v),
            _ => None,
        }
    }

    fn into_values(values: Vec<Self>) -> Values {
        Values::Variable(values)
    }

    fn check_nesting(&self, buffer: &Arc<BufferData>) -> Result<()> {
        if self.reaches(buffer)? {
            Err(Error::Cycle)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use paste::paste;

    macro_rules! element_tests {
        ($type:ty, $variant:ident, $make:expr) => {
            paste! {
                #[test]
                fn [<test_element_ $variant:lower>]() {
                    let make = $make;
                    let data: Vec<$type> = (0..4).map(make).collect();
                    let values = <$type>::into_values(data.clone());
                    assert_eq!(values.dtype(), DType::$variant);
                    assert_eq!(values.len(), 4);
                    assert_eq!(<$type>::from_values(&values), Some(&data[..]));
                }

                #[test]
                fn [<test_gather_scatter_ $variant:lower>]() {
                    let make = $make;
                    let data: Vec<$type> = (0..4).map(make).collect();
                    let values = <$type>::into_values(data.clone());
                    let reversed = values.gather([3, 2, 1, 0].into_iter());
                    let mut target = values.clone();
                    target.scatter([0, 1, 2, 3].into_iter(), &reversed).unwrap();
                    let expected: Vec<$type> = data.iter().rev().cloned().collect();
                    assert_eq!(<$type>::from_values(&target), Some(&expected[..]));
                    assert!(target.equal_at(0..4, &values, (0..4).rev()));
                    assert!(!target.equal_at(0..4, &values, 0..4));
                }
            }
        };
    }

    element_tests!(f64, F64, |i: usize| i as f64 * 1.5);
    element_tests!(f32, F32, |i: usize| i as f32 * 0.5);
    element_tests!(i64, I64, |i: usize| i as i64 - 2);
    element_tests!(i32, I32, |i: usize| i as i32 * 7);
    element_tests!(String, String, |i: usize| format!("item{i}"));

    #[test]
    fn test_dtype_mismatch() {
        let mut a = Values::F64(vec![1.0, 2.0]);
        let b = Values::I32(vec![1, 2]);
        assert!(matches!(a.scatter(0..2, &b), Err(Error::Type(_))));
        assert!(!a.equal_at(0..2, &b, 0..2));
        assert_eq!(f64::from_values(&b), None);
    }

    #[test]
    fn test_itemsize() {
        assert_eq!(DType::F64.itemsize(), Some(8));
        assert_eq!(DType::I32.itemsize(), Some(4));
        assert_eq!(DType::Bool.itemsize(), Some(1));
        assert_eq!(DType::String.itemsize(), None);
        assert!(DType::F32.supports_variances());
        assert!(!DType::I64.supports_variances());
        assert_eq!(format!("{}", DType::F64), "float64");
    }
}
