use num_traits::{cast, NumCast};

use crate::{
    dim::Dim,
    dimensions::Dimensions,
    dtype::Element,
    units::Unit,
    variable::Variable,
};

/// A variable holding ``0, 1, 2, ...`` laid out contiguously over ``pairs``
pub(crate) fn arange<T>(pairs: &[(Dim, usize)]) -> Variable
where
    T: Element + NumCast,
{
    let dims = Dimensions::from_pairs(pairs).unwrap();
    let values: Vec<T> = (0..dims.volume()).map(|i| cast(i).unwrap()).collect();

    Variable::new(dims, values).unwrap()
}

/// Like ``arange`` but with a unit attached
pub(crate) fn arange_with_unit<T>(pairs: &[(Dim, usize)], unit: &str) -> Variable
where
    T: Element + NumCast,
{
    let dims = Dimensions::from_pairs(pairs).unwrap();
    let values: Vec<T> = (0..dims.volume()).map(|i| cast(i).unwrap()).collect();

    Variable::with_unit(dims, Unit::new(unit), values).unwrap()
}

/// ``arange`` shifted by ``start``
pub(crate) fn linspace(dim: Dim, start: f64, len: usize) -> Variable {
    let values: Vec<f64> = (0..len).map(|i| start + i as f64).collect();

    Variable::new(Dimensions::one(dim, len), values).unwrap()
}

pub(crate) fn values_f64(var: &Variable) -> Vec<f64> {
    var.values::<f64>().unwrap().to_vec()
}
