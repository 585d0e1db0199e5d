use std::result;

use thiserror::Error as ThisError;

/// Every way an operation on dimensions, variables, datasets or their views can fail.
///
/// All errors are usage errors surfaced at the point of mutation or slice construction. Nothing is
/// retried or deferred.
///
#[derive(Debug, ThisError)]
pub enum Error {
    /// Duplicate dimension, capacity exceeded, inconsistent extent or dimension not found
    #[error("DimensionError: {0}")]
    Dimension(String),

    /// Missing named item, coordinate, mask or attribute
    #[error("NotFoundError: {0}")]
    NotFound(String),

    /// Attribute and coordinate name shadowing
    #[error("DataArrayError: {0}")]
    DataArray(String),

    /// Coordinates of two operands disagree
    #[error("CoordMismatchError: {0}")]
    CoordMismatch(String),

    #[error("UnitError: {0}")]
    Unit(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("VariancesError: {0}")]
    Variances(String),

    /// Operation forbidden through a sliced view, or slice out of range
    #[error("SliceError: {0}")]
    Slice(String),

    #[error("BinEdgeError: {0}")]
    BinEdge(String),

    #[error("VariableError: Read-only flag is set, cannot mutate data.")]
    ReadOnly,

    /// Assignment would make a variable reachable from its own elements
    #[error("Cannot assign a variable into its own elements: reference cycle")]
    Cycle,

    /// Buffer is currently held by a conflicting typed accessor
    #[error("Buffer is already borrowed by a conflicting accessor")]
    Borrowed,

    #[error("{0}")]
    Registry(String),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Dimension(String::from("Inconsistent size"));
        assert_eq!(format!("{err}"), "DimensionError: Inconsistent size");

        let err = Error::ReadOnly;
        assert!(format!("{err}").contains("Read-only flag is set"));
    }
}
