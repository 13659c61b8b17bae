pub use crate::array::factory::{array, empty, full, ones, zeros};
pub use crate::array::{
    AxisKey, Dist, DistArray, DistArrayKind, Distribution, Element, IndexKey, ReduceOp,
    ReductionParams, ReplicatedResult, RowBlock, SliceKey, Undistributed,
};
pub use crate::comm::Backend;
pub use crate::error::{CommError, DistArrayError, DistResult};
pub use crate::process_group::ProcessGroup;
pub use crate::world::{DistWorld, DistWorldBuilder};
