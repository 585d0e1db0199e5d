use crate::{dimensions::Dimensions, sizes::NDIM_MAX, strides::Strides};

/// Iterator over buffer positions of a strided view, in logical order (innermost dimension
/// fastest).
///
#[derive(Clone, Debug)]
pub(crate) struct ViewIndex {
    shape: [usize; NDIM_MAX],
    strides: [usize; NDIM_MAX],
    ndim: usize,
    index: [usize; NDIM_MAX],
    position: usize,
    remaining: usize,
}

impl ViewIndex {
    pub(crate) fn new(offset: usize, dims: &Dimensions, strides: &Strides) -> Self {
        let mut shape = [0; NDIM_MAX];
        let mut steps = [0; NDIM_MAX];
        shape[..dims.ndim()].copy_from_slice(dims.shape());
        steps[..dims.ndim()].copy_from_slice(strides.as_slice());

        Self {
            shape,
            strides: steps,
            ndim: dims.ndim(),
            index: [0; NDIM_MAX],
            position: offset,
            remaining: dims.volume(),
        }
    }
}

impl Iterator for ViewIndex {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let position = self.position;
        self.remaining -= 1;
        if self.remaining > 0 {
            // Carry into outer dimensions, rewinding each exhausted one
            for i in (0..self.ndim).rev() {
                self.index[i] += 1;
                self.position += self.strides[i];
                if self.index[i] < self.shape[i] {
                    break;
                }
                self.position -= self.strides[i] * self.shape[i];
                self.index[i] = 0;
            }
        }

        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ViewIndex {}

/// Buffer position of the element at ``logical`` index (row-major over ``dims``)
///
pub(crate) fn position(offset: usize, dims: &Dimensions, strides: &Strides, logical: usize) -> usize {
    let mut rest = logical;
    let mut position = offset;
    for i in (0..dims.ndim()).rev() {
        let extent = dims.size(i);
        position += (rest % extent) * strides[i];
        rest /= extent;
    }

    position
}
