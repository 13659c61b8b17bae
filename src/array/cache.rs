use crate::error::DistResult;

use std::sync::OnceLock;

/// Lazily computed global properties of a distributed array.
///
/// Each field is computed at most once for the lifetime of the owning array. Nothing
/// is ever cleared: an operation that changes the global layout (reshape) builds a new
/// array, which starts with its own cache.
#[derive(Debug, Default)]
pub(crate) struct GlobalProps {
    shape: OnceLock<Vec<usize>>,
    size: OnceLock<usize>,
    nbytes: OnceLock<usize>,
    ndim: OnceLock<usize>,
}

impl GlobalProps {
    pub(crate) fn new() -> GlobalProps {
        Default::default()
    }

    /// A cache whose shape is already known, e.g. from the planner.
    pub(crate) fn with_shape(shape: Vec<usize>) -> GlobalProps {
        let props = GlobalProps::new();
        let _ = props.shape.set(shape);
        props
    }

    /// Return the cached shape, running `compute` only the first time.
    ///
    /// `compute` may be a collective, in which case every PE must reach this call together.
    pub(crate) fn shape<F>(&self, compute: F) -> DistResult<&[usize]>
    where
        F: FnOnce() -> DistResult<Vec<usize>>,
    {
        if let Some(shape) = self.shape.get() {
            return Ok(shape.as_slice());
        }
        let shape = compute()?;
        Ok(self.shape.get_or_init(|| shape).as_slice())
    }

    pub(crate) fn size(&self, shape: &[usize]) -> usize {
        *self.size.get_or_init(|| shape.iter().product())
    }

    pub(crate) fn nbytes(&self, shape: &[usize], elem_size: usize) -> usize {
        *self
            .nbytes
            .get_or_init(|| shape.iter().product::<usize>() * elem_size)
    }

    pub(crate) fn ndim(&self, shape: &[usize]) -> usize {
        *self.ndim.get_or_init(|| shape.len())
    }
}
