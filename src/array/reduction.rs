use crate::array::Element;
use crate::error::{DistArrayError, DistResult};

use ndarray::{ArrayD, Axis, IxDyn};

/// The element-wise combine operators available to collective reductions.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    /// The value that leaves any other value unchanged under [ReduceOp::combine].
    pub fn identity<T: Element>(&self) -> T {
        match self {
            ReduceOp::Sum => T::ZERO,
            ReduceOp::Min => T::MAX_VALUE,
            ReduceOp::Max => T::MIN_VALUE,
        }
    }

    pub fn combine<T: Element>(&self, a: T, b: T) -> T {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
            ReduceOp::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
        }
    }
}

/// Optional arguments accepted by the reduction methods of a [DistArray][crate::array::DistArray].
///
/// Only `axis` is honored, `keepdims` and an output buffer are accepted so callers translating
/// existing code get an explicit [DistArrayError::NotSupported] rather than a silently different result.
#[derive(Debug, Clone)]
pub struct ReductionParams<T> {
    pub axis: Option<isize>,
    pub keepdims: bool,
    pub out: Option<ArrayD<T>>,
}

impl<T> Default for ReductionParams<T> {
    fn default() -> Self {
        ReductionParams {
            axis: None,
            keepdims: false,
            out: None,
        }
    }
}

impl<T> ReductionParams<T> {
    pub fn new() -> ReductionParams<T> {
        Default::default()
    }

    pub fn with_axis(mut self, axis: isize) -> ReductionParams<T> {
        self.axis = Some(axis);
        self
    }

    pub fn with_keepdims(mut self, keepdims: bool) -> ReductionParams<T> {
        self.keepdims = keepdims;
        self
    }

    pub fn with_out(mut self, out: ArrayD<T>) -> ReductionParams<T> {
        self.out = Some(out);
        self
    }

    /// Validate the parameters against an array of `ndim` dimensions and return the
    /// normalized (non negative) axis.
    ///
    /// Only local, globally identical information is used so every PE reaches the same
    /// verdict before any collective is issued.
    pub(crate) fn check(&self, ndim: usize) -> DistResult<Option<usize>> {
        if self.out.is_some() {
            return Err(DistArrayError::NotSupported(
                "reduction into an output buffer (out)".to_owned(),
            ));
        }
        if self.keepdims {
            return Err(DistArrayError::NotSupported(
                "reduction with keepdims".to_owned(),
            ));
        }
        match self.axis {
            None => Ok(None),
            Some(axis) => normalize_axis(axis, ndim).map(Some),
        }
    }
}

pub(crate) fn normalize_axis(axis: isize, ndim: usize) -> DistResult<usize> {
    let normalized = if axis < 0 { axis + ndim as isize } else { axis };
    if normalized < 0 || normalized >= ndim as isize {
        return Err(DistArrayError::InvalidReductionParameter(format!(
            "axis {} is out of bounds for array of dimension {}",
            axis, ndim
        )));
    }
    Ok(normalized as usize)
}

/// Reduce a local block, either completely (`axis == None`, yielding a single element
/// array of shape `[1]`) or along one axis.
///
/// An empty block reduces to the identity of `op`.
pub(crate) fn local_reduce<T: Element>(data: &ArrayD<T>, op: ReduceOp, axis: Option<usize>) -> ArrayD<T> {
    match axis {
        None => {
            let acc = data.iter().fold(op.identity::<T>(), |acc, x| op.combine(acc, *x));
            ArrayD::from_elem(IxDyn(&[1]), acc)
        }
        Some(axis) => data.fold_axis(Axis(axis), op.identity::<T>(), |acc, x| op.combine(*acc, *x)),
    }
}

/// Shape of a replicated scalar reduction result.
pub(crate) fn scalar_shape() -> Vec<usize> {
    vec![1]
}

/// The shape left after reducing `shape` along `axis`.
pub(crate) fn reduced_shape(shape: &[usize], axis: Option<usize>) -> Vec<usize> {
    match axis {
        None => scalar_shape(),
        Some(axis) => shape
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis)
            .map(|(_, len)| *len)
            .collect(),
    }
}

/// Divisor used by mean and std: the global length of `axis`, or the global size.
pub(crate) fn divisor(global_shape: &[usize], axis: Option<usize>) -> f64 {
    match axis {
        None => global_shape.iter().product::<usize>() as f64,
        Some(axis) => global_shape[axis] as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_axes_count_from_the_end() {
        assert_eq!(normalize_axis(-1, 2).unwrap(), 1);
        assert_eq!(normalize_axis(-2, 2).unwrap(), 0);
        assert!(matches!(
            normalize_axis(2, 2),
            Err(DistArrayError::InvalidReductionParameter(_))
        ));
        assert!(normalize_axis(-3, 2).is_err());
    }

    #[test]
    fn unsupported_options_are_rejected() {
        let params = ReductionParams::<f64>::new().with_out(ArrayD::zeros(IxDyn(&[1])));
        assert!(matches!(params.check(2), Err(DistArrayError::NotSupported(_))));
        let params = ReductionParams::<f64>::new().with_keepdims(true);
        assert!(matches!(params.check(2), Err(DistArrayError::NotSupported(_))));
        let params = ReductionParams::<f64>::new().with_axis(1);
        assert_eq!(params.check(2).unwrap(), Some(1));
    }

    #[test]
    fn empty_blocks_reduce_to_the_identity() {
        let empty = ArrayD::<i32>::zeros(IxDyn(&[0, 4]));
        assert_eq!(local_reduce(&empty, ReduceOp::Sum, None)[[0]], 0);
        assert_eq!(local_reduce(&empty, ReduceOp::Min, None)[[0]], i32::MAX);
        assert_eq!(local_reduce(&empty, ReduceOp::Max, Some(0)).shape(), &[4]);
        assert_eq!(local_reduce(&empty, ReduceOp::Max, Some(0))[[2]], i32::MIN);
        assert_eq!(local_reduce(&empty, ReduceOp::Sum, Some(1)).shape(), &[0]);
    }

    #[test]
    fn local_reduction_along_axes() {
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1, 5, 3, 4, 2, 6]).unwrap();
        assert_eq!(
            local_reduce(&data, ReduceOp::Sum, Some(0)).iter().cloned().collect::<Vec<_>>(),
            vec![5, 7, 9]
        );
        assert_eq!(
            local_reduce(&data, ReduceOp::Max, Some(1)).iter().cloned().collect::<Vec<_>>(),
            vec![5, 6]
        );
        assert_eq!(local_reduce(&data, ReduceOp::Min, None)[[0]], 1);
    }
}
