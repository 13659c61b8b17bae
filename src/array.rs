//! Distributed n-dimensional arrays.
//!
//! A [DistArray] is either row-block partitioned across the PEs of a [ProcessGroup]
//! ([RowBlock]) or fully replicated on every PE ([Undistributed]). Both expose the same
//! collective operations: reductions, element access, reshape and materialization.
//!
//! Every operation that needs information from other PEs is a collective: all PEs of
//! the group must call it, in the same order, with the same arguments.
use crate::error::{DistArrayError, DistResult};
use crate::process_group::ProcessGroup;

use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;

pub(crate) mod cache;
pub mod factory;
pub use factory::DistArrayKind;
pub(crate) mod gather;
pub mod key;
pub use key::{AxisKey, IndexKey, SliceKey};
pub mod prelude;
pub mod redistribute;
pub mod reduction;
pub use reduction::{ReduceOp, ReductionParams};
pub(crate) mod row_block;
pub use row_block::RowBlock;
pub(crate) mod undistributed;
pub use undistributed::Undistributed;

/// Values produced by reductions and gathers: identical on every PE of the group.
pub type ReplicatedResult<T> = Undistributed<T>;

/// Trait representing types that can be moved between PEs
pub trait Dist:
    serde::ser::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + std::fmt::Debug + 'static
{
}
impl<T> Dist for T where
    T: serde::ser::Serialize
        + serde::de::DeserializeOwned
        + Clone
        + Send
        + Sync
        + std::fmt::Debug
        + 'static
{
}

/// Numeric element types that can be stored in a [DistArray] and reduced.
pub trait Element:
    Dist
    + Copy
    + PartialOrd
    + std::ops::Add<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;
    /// the smallest representable value, the identity of max
    const MIN_VALUE: Self;
    /// the largest representable value, the identity of min
    const MAX_VALUE: Self;
    fn as_f64(self) -> f64;
}

macro_rules! impl_int_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                const ZERO: Self = 0;
                const ONE: Self = 1;
                const MIN_VALUE: Self = <$t>::MIN;
                const MAX_VALUE: Self = <$t>::MAX;
                fn as_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                const ZERO: Self = 0.0;
                const ONE: Self = 1.0;
                const MIN_VALUE: Self = <$t>::NEG_INFINITY;
                const MAX_VALUE: Self = <$t>::INFINITY;
                fn as_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_int_element!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);
impl_float_element!(f32, f64);

/// How the elements of an array are laid out over the PEs of its group.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Distribution {
    /// contiguous blocks of rows (axis 0), one block per PE
    Block,
    /// every PE holds the whole array
    Undistributed,
}

impl Distribution {
    pub fn token(&self) -> &'static str {
        match self {
            Distribution::Block => "b",
            Distribution::Undistributed => "u",
        }
    }

    /// Parse a per-axis token sequence, only a single entry is supported.
    pub fn from_axes<S: AsRef<str>>(axes: &[S]) -> DistResult<Distribution> {
        match axes {
            [token] => token.as_ref().parse(),
            _ => Err(DistArrayError::InvalidDistribution(format!(
                "[{}]",
                axes.iter().map(|a| a.as_ref()).join(", ")
            ))),
        }
    }
}

impl std::str::FromStr for Distribution {
    type Err = DistArrayError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "b" => Ok(Distribution::Block),
            "u" => Ok(Distribution::Undistributed),
            _ => Err(DistArrayError::InvalidDistribution(token.to_owned())),
        }
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Reshape an owned array, reading its elements in logical row major order.
pub(crate) fn reshape_owned<T: Clone>(data: ArrayD<T>, shape: &[usize]) -> DistResult<ArrayD<T>> {
    from_flat(data.iter().cloned().collect(), shape)
}

pub(crate) fn from_flat<T>(flat: Vec<T>, shape: &[usize]) -> DistResult<ArrayD<T>> {
    let from = flat.len();
    ArrayD::from_shape_vec(IxDyn(shape), flat).map_err(|_| DistArrayError::ShapeMismatch {
        from,
        to: shape.to_vec(),
    })
}

/// Operations common to every distributed array.
///
/// Methods returning [DistResult] that involve other PEs are collectives.
#[enum_dispatch]
pub trait DistArray<T: Element> {
    fn distribution(&self) -> Distribution;

    /// The group this array is distributed over
    fn group(&self) -> &Arc<ProcessGroup>;

    /// The block of the array stored on this PE
    fn local_data(&self) -> &ArrayD<T>;

    /// Shape of the whole array. Computed on first access (possibly collectively) and then cached.
    fn global_shape(&self) -> DistResult<&[usize]>;
    fn global_size(&self) -> DistResult<usize>;
    fn global_nbytes(&self) -> DistResult<usize>;
    fn global_ndim(&self) -> DistResult<usize>;

    /// Read the elements selected by a global key, every PE receives the same result.
    fn get(&self, key: &IndexKey) -> DistResult<ReplicatedResult<T>>;

    fn sum_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>>;
    fn min_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>>;
    fn max_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>>;
    fn mean_with(&self, params: ReductionParams<f64>) -> DistResult<ReplicatedResult<f64>>;
    /// Population standard deviation
    fn std_with(&self, params: ReductionParams<f64>) -> DistResult<ReplicatedResult<f64>>;

    /// Materialize the whole array on every PE.
    fn collect_data(&self) -> DistResult<ReplicatedResult<T>>;

    /// A new array of `shape` with the same elements in row major order and the same distribution.
    fn reshape(&self, shape: &[usize]) -> DistResult<DistArrayKind<T>>;

    fn sum(&self, axis: Option<isize>) -> DistResult<ReplicatedResult<T>> {
        self.sum_with(ReductionParams {
            axis,
            ..Default::default()
        })
    }
    fn min(&self, axis: Option<isize>) -> DistResult<ReplicatedResult<T>> {
        self.min_with(ReductionParams {
            axis,
            ..Default::default()
        })
    }
    fn max(&self, axis: Option<isize>) -> DistResult<ReplicatedResult<T>> {
        self.max_with(ReductionParams {
            axis,
            ..Default::default()
        })
    }
    fn mean(&self, axis: Option<isize>) -> DistResult<ReplicatedResult<f64>> {
        self.mean_with(ReductionParams {
            axis,
            ..Default::default()
        })
    }
    fn std(&self, axis: Option<isize>) -> DistResult<ReplicatedResult<f64>> {
        self.std_with(ReductionParams {
            axis,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_tokens() {
        assert_eq!("b".parse::<Distribution>().unwrap(), Distribution::Block);
        assert_eq!("u".parse::<Distribution>().unwrap(), Distribution::Undistributed);
        assert_eq!(
            "bananas".parse::<Distribution>(),
            Err(DistArrayError::InvalidDistribution("bananas".to_owned()))
        );
        assert_eq!(Distribution::from_axes(&["u"]).unwrap(), Distribution::Undistributed);
        assert!(matches!(
            Distribution::from_axes(&["*", "b"]),
            Err(DistArrayError::InvalidDistribution(token)) if token == "[*, b]"
        ));
        assert!(Distribution::from_axes(&["b", "b"]).is_err());
        assert!(Distribution::from_axes::<&str>(&[]).is_err());
        assert_eq!(Distribution::Block.to_string(), "b");
    }

    #[test]
    fn element_identities() {
        assert_eq!(<u8 as Element>::MAX_VALUE, 255);
        assert_eq!(<i32 as Element>::MIN_VALUE, i32::MIN);
        assert_eq!(<f64 as Element>::MAX_VALUE, f64::INFINITY);
        assert_eq!(<f32 as Element>::ONE.as_f64(), 1.0);
    }

    #[test]
    fn reshape_reads_logical_order() {
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3]), (0..6).collect()).unwrap();
        let transposed = data.reversed_axes();
        let flat = reshape_owned(transposed, &[6]).unwrap();
        assert_eq!(flat.iter().cloned().collect::<Vec<i32>>(), vec![0, 3, 1, 4, 2, 5]);
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3]), (0..6).collect::<Vec<i32>>()).unwrap();
        assert!(matches!(
            reshape_owned(data, &[4]),
            Err(DistArrayError::ShapeMismatch { from: 6, .. })
        ));
    }
}
