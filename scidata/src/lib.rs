mod data_array;
mod dataset;
mod dim;
mod dimensions;
mod dtype;
mod element_array;
mod errors;
mod export;
mod extents;
mod meta;
mod shape;
mod sizes;
mod slice;
mod strides;
mod units;
mod variable;
mod view;
mod view_index;

#[cfg(test)]
mod testing;

pub use data_array::DataArray;

pub use dataset::AttrPolicy;
pub use dataset::Dataset;

pub use dim::{Dim, DIM_CUSTOM_START};

pub use dimensions::Dimensions;

pub use dtype::{DType, Element, FloatElement, Scalar, Values};

pub use element_array::{ElementArrayView, ElementArrayViewMut};

pub use errors::{Error, Result};

pub use export::BufferInfo;

pub use extents::Extent;

pub use meta::{Attrs, Coords, Masks, MetaMap};

pub use shape::{concatenate, join_edges};

pub use sizes::{is_edges, SmallStableMap, Sizes, NDIM_MAX};

pub use slice::Slice;

pub use strides::Strides;

pub use units::Unit;

pub use variable::Variable;

pub use view::{DataArrayConstView, DataArrayView, DatasetConstView, DatasetView};

pub mod dims {
    //! Free functions over dimension labels and extents
    pub use crate::dimensions::{fold, intersection, merge, transpose};
    pub use crate::sizes::{concatenate, merge as merge_sizes};
}
