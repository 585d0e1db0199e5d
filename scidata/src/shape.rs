//! Operations changing the shape of variables and data arrays
//!
use std::{collections::BTreeMap, fmt::Display};

use tracing::debug;

use crate::{
    data_array::DataArray,
    dim::Dim,
    dimensions::Dimensions,
    errors::{Error, Result},
    slice::Slice,
    variable::{expect_dtype, expect_unit, Variable},
};

/// Join ``a`` and ``b`` along ``dim``.
///
/// An operand lacking ``dim`` counts as having extent 1 along it. All other dimensions must be
/// equal. The result is a new contiguous variable with the dimension order of ``a``.
///
pub fn concatenate(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
    expect_dtype(b.dtype(), a.dtype())?;
    expect_unit(&b.unit(), &a.unit())?;
    if a.has_variances() != b.has_variances() {
        return Err(Error::Variances(String::from(
            "Cannot concatenate variables where only one has variances.",
        )));
    }

    let a = with_dim(a, dim)?;
    let b = with_dim(b, dim)?;
    let labels = a.dims().labels().to_vec();
    let order: Vec<Dim> = std::iter::once(dim)
        .chain(labels.iter().copied().filter(|label| *label != dim))
        .collect();
    let a_outer = a.transpose(&order)?;
    let b_outer = b.transpose(&order)?;
    if a_outer.dims().shape()[1..] != b_outer.dims().shape()[1..] {
        return Err(Error::Dimension(format!(
            "Cannot concatenate {} and {} along {dim}.",
            a.dims(),
            b.dims()
        )));
    }

    let mut dims = *a_outer.dims();
    dims.resize(dim, a_outer.dims().size(0) + b_outer.dims().size(0))?;
    let (mut values, mut variances) = a_outer.copy()?.gather_all()?;
    let (more_values, more_variances) = b_outer.copy()?.gather_all()?;
    values.append(more_values)?;
    if let (Some(variances), Some(more)) = (variances.as_mut(), more_variances) {
        variances.append(more)?;
    }
    debug!(%dim, volume = dims.volume(), "concatenated variables");

    Ok(Variable::from_parts(dims, a.unit(), values, variances)?
        .transpose(&labels)?
        .copy()?)
}

/// Join two bin-edge variables along ``dim``.
///
/// The last edge of ``a`` must equal the first edge of ``b`` and appears once in the result.
///
pub fn join_edges(a: &Variable, b: &Variable, dim: Dim) -> Result<Variable> {
    let (a_len, b_len) = match (a.dims().get(dim), b.dims().get(dim)) {
        (Some(a_len), Some(b_len)) if a_len > 0 && b_len > 0 => (a_len, b_len),
        _ => {
            return Err(Error::BinEdge(format!(
                "Expected bin edges along {dim} in {} and {}.",
                a.dims(),
                b.dims()
            )))
        }
    };
    if a.slice(Slice::point(dim, a_len - 1))? != b.slice(Slice::point(dim, 0))? {
        return Err(Error::BinEdge(format!(
            "Cannot join bin edges along {dim}: the last edge of the first operand differs from \
             the first edge of the second."
        )));
    }

    concatenate(a, &b.slice(Slice::range(dim, 1, b_len))?, dim)
}

impl DataArray {
    /// Express ``dim`` as the nested dimensions ``to`` in the data and all metadata depending
    /// on it. Buffers are shared with ``self``.
    ///
    /// Bin-edge metadata along ``dim`` cannot be folded.
    ///
    pub fn fold(&mut self, dim: Dim, to: &Dimensions) -> Result<DataArray> {
        let extents = [(dim, self.dims().at(dim)?)];
        let (name, data, coords, masks, attrs) = self.share().into_parts();
        let reshape = |var: &Variable| var.fold(dim, to);

        DataArray::from_parts(
            name,
            reshape(&data)?,
            reshape_meta(coords, &extents, reshape)?,
            reshape_meta(masks, &extents, reshape)?,
            reshape_meta(attrs, &extents, reshape)?,
        )
    }

    /// Merge the adjacent dimensions ``from`` into ``to`` in the data and all metadata depending
    /// on them. Buffers are shared with ``self`` where the memory layout allows it.
    ///
    /// Bin-edge metadata along any of ``from`` cannot be flattened.
    ///
    pub fn flatten(&mut self, from: &[Dim], to: Dim) -> Result<DataArray> {
        let extents = from
            .iter()
            .map(|dim| Ok((*dim, self.dims().at(*dim)?)))
            .collect::<Result<Vec<_>>>()?;
        let (name, data, coords, masks, attrs) = self.share().into_parts();
        let reshape = |var: &Variable| var.flatten(from, to);

        DataArray::from_parts(
            name,
            reshape(&data)?,
            reshape_meta(coords, &extents, reshape)?,
            reshape_meta(masks, &extents, reshape)?,
            reshape_meta(attrs, &extents, reshape)?,
        )
    }

    /// Reorder the dimensions of the data. Metadata keeps its own order.
    ///
    pub fn transpose(&mut self, order: &[Dim]) -> Result<DataArray> {
        let (name, data, coords, masks, attrs) = self.share().into_parts();

        DataArray::from_parts(name, data.transpose(order)?, coords, masks, attrs)
    }
}

fn with_dim(var: &Variable, dim: Dim) -> Result<Variable> {
    if var.dims().contains(dim) {
        Ok(var.clone())
    } else {
        var.flatten(&[], dim)
    }
}

/// Apply ``reshape`` to every entry depending on one of the dimensions in ``extents``, which
/// must match the data extent there
///
fn reshape_meta<K, F>(
    items: BTreeMap<K, Variable>,
    extents: &[(Dim, usize)],
    reshape: F,
) -> Result<BTreeMap<K, Variable>>
where
    K: Ord + Display,
    F: Fn(&Variable) -> Result<Variable>,
{
    items
        .into_iter()
        .map(|(key, var)| {
            let mut touched = false;
            for (dim, extent) in extents {
                match var.dims().get(*dim) {
                    Some(len) if len != *extent => {
                        return Err(Error::BinEdge(format!(
                            "Cannot reshape {key} along {dim}: it holds bin edges."
                        )))
                    }
                    Some(_) => touched = true,
                    None => {}
                }
            }
            let var = if touched { reshape(&var)? } else { var };

            Ok((key, var))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        testing::{arange, linspace, values_f64},
        units::Unit,
    };

    #[test]
    fn test_concatenate_1d() -> Result<()> {
        let joined = concatenate(&linspace(Dim::X, 0.0, 3), &linspace(Dim::X, 3.0, 2), Dim::X)?;
        assert_eq!(joined, linspace(Dim::X, 0.0, 5));

        Ok(())
    }

    #[test]
    fn test_concatenate_inner_dim() -> Result<()> {
        let a = arange::<f64>(&[(Dim::X, 2), (Dim::Y, 2)]);
        let b = arange::<f64>(&[(Dim::X, 2), (Dim::Y, 1)]);
        let joined = concatenate(&a, &b, Dim::Y)?;

        let expected = Variable::new(
            Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 3)])?,
            vec![0.0, 1.0, 0.0, 2.0, 3.0, 1.0],
        )?;
        assert_eq!(joined, expected);

        Ok(())
    }

    #[test]
    fn test_concatenate_adds_missing_dim() -> Result<()> {
        let a = Variable::new(Dimensions::one(Dim::Y, 2), vec![1_i64, 2])?;
        let b = Variable::new(Dimensions::one(Dim::Y, 2), vec![3_i64, 4])?;
        let joined = concatenate(&a, &b, Dim::X)?;

        let expected = Variable::new(
            Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 2)])?,
            vec![1_i64, 2, 3, 4],
        )?;
        assert_eq!(joined, expected);

        Ok(())
    }

    #[test]
    fn test_concatenate_with_variances() -> Result<()> {
        let a = Variable::with_variances(
            Dimensions::one(Dim::X, 2),
            Unit::counts(),
            vec![1.0, 2.0],
            vec![0.1, 0.2],
        )?;
        let joined = concatenate(&a, &a, Dim::X)?;
        assert_eq!(joined.variances::<f64>()?.to_vec(), vec![0.1, 0.2, 0.1, 0.2]);
        assert_eq!(joined.unit(), Unit::counts());

        Ok(())
    }

    #[test]
    fn test_concatenate_mismatch() -> Result<()> {
        let a = arange::<f64>(&[(Dim::X, 2), (Dim::Y, 2)]);
        let b = arange::<f64>(&[(Dim::X, 2), (Dim::Y, 3)]);
        assert!(matches!(concatenate(&a, &b, Dim::X), Err(Error::Dimension(_))));

        let c = linspace(Dim::Y, 0.0, 3);
        assert!(matches!(
            concatenate(&linspace(Dim::X, 0.0, 3), &c, Dim::X),
            Err(Error::Dimension(_))
        ));

        let d = arange::<i64>(&[(Dim::X, 2)]);
        assert!(matches!(
            concatenate(&linspace(Dim::X, 0.0, 3), &d, Dim::X),
            Err(Error::Type(_))
        ));

        Ok(())
    }

    #[test]
    fn test_join_edges() -> Result<()> {
        let joined = join_edges(&linspace(Dim::X, 0.0, 3), &linspace(Dim::X, 2.0, 3), Dim::X)?;
        assert_eq!(values_f64(&joined), vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        Ok(())
    }

    #[test]
    fn test_join_edges_mismatch() {
        let a = linspace(Dim::X, 0.0, 3);
        assert!(matches!(
            join_edges(&a, &linspace(Dim::X, 5.0, 2), Dim::X),
            Err(Error::BinEdge(_))
        ));
        assert!(matches!(
            join_edges(&a, &linspace(Dim::Y, 2.0, 2), Dim::X),
            Err(Error::BinEdge(_))
        ));
    }

    fn histogram() -> Result<DataArray> {
        let data = arange::<f64>(&[(Dim::X, 6)]);
        DataArray::from_parts(
            "counts",
            data,
            [(Dim::X, linspace(Dim::X, 10.0, 6))],
            [(
                String::from("even"),
                Variable::new(
                    Dimensions::one(Dim::X, 6),
                    vec![true, false, true, false, true, false],
                )?,
            )],
            [(Dim::Z, Variable::scalar(1.5))],
        )
    }

    #[test]
    fn test_fold_flatten_roundtrip() -> Result<()> {
        let mut a = histogram()?;
        let to = Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 3)])?;
        let mut folded = a.fold(Dim::X, &to)?;
        assert_eq!(*folded.dims(), to);
        assert_eq!(*folded.coords().get(&Dim::X)?.dims(), to);
        assert_eq!(*folded.masks().get("even")?.dims(), to);

        let mut flat = folded.flatten(&[Dim::X, Dim::Y], Dim::X)?;
        assert_eq!(flat, a);

        flat.values_mut::<f64>()?.set(0, 42.0)?;
        assert_eq!(a.values::<f64>()?[0], 42.0);

        Ok(())
    }

    #[test]
    fn test_fold_bin_edges() -> Result<()> {
        let mut a = DataArray::from_parts(
            "counts",
            arange::<f64>(&[(Dim::X, 6)]),
            [(Dim::X, linspace(Dim::X, 0.0, 7))],
            BTreeMap::<String, Variable>::new(),
            BTreeMap::<Dim, Variable>::new(),
        )?;
        let to = Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 3)])?;
        assert!(matches!(a.fold(Dim::X, &to), Err(Error::BinEdge(_))));
        assert!(matches!(
            a.flatten(&[Dim::X], Dim::Y),
            Err(Error::BinEdge(_))
        ));

        Ok(())
    }

    #[test]
    fn test_transpose() -> Result<()> {
        let mut a = DataArray::from_parts(
            "a",
            arange::<f64>(&[(Dim::X, 2), (Dim::Y, 3)]),
            [(Dim::Y, linspace(Dim::Y, 0.0, 3))],
            BTreeMap::<String, Variable>::new(),
            BTreeMap::<Dim, Variable>::new(),
        )?;
        let t = a.transpose(&[])?;
        assert_eq!(t.dims().labels(), &[Dim::Y, Dim::X]);
        assert_eq!(values_f64(&t.data()), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert_eq!(t.coords(), a.coords());

        Ok(())
    }
}
