//! distarray provides n-dimensional arrays that are partitioned across a fixed group of
//! cooperating processing elements (PEs), while reductions, indexing and reshaping behave
//! as though they operate on one logical whole.
//!
//! Arrays are distributed by contiguous blocks of rows (axis 0), one block per PE, or fully
//! replicated on every PE. All coordination between PEs happens through collective
//! operations on a [ProcessGroup]: every PE of the group must issue the same collectives,
//! in the same order.
//!
//! PEs communicate through a [Backend]. Currently two exist, one used for single PE
//! execution ("local") and one that runs every PE on its own thread within the current
//! process and moves serialized data between them over channels ("channel").
//!
//! EXAMPLES
//! --------
//!
//! # Reducing a row-block distributed array
//! ```
//! use distarray::array::prelude::*;
//! use ndarray::{ArrayD, IxDyn};
//!
//! let sums = distarray::launch(3, |world| {
//!     let data = (world.my_pe() == 0)
//!         .then(|| ArrayD::from_shape_vec(IxDyn(&[5, 4]), (0..20).collect::<Vec<i64>>()).unwrap());
//!     let array = array(world.group(), data, 0, "b").unwrap();
//!     array.sum(Some(1)).unwrap().to_vec()
//! });
//! assert_eq!(sums[2], vec![6, 22, 38, 54, 70]);
//! ```
//!
//! # Environment Variables
//!
//! The defaults of [DistWorldBuilder] and a few runtime knobs are read from `DISTARRAY_*`
//! environment variables, see [env_var::Config].

pub mod arch;
pub mod array;
mod barrier;
mod comm;
pub mod env_var;
pub mod error;
pub mod process_group;
mod warnings;
pub mod world;

pub use crate::comm::Backend;
pub use crate::env_var::config;
pub use crate::error::{CommError, CommResult, DistArrayError, DistResult};
pub use crate::process_group::ProcessGroup;
pub use crate::world::{DistWorld, DistWorldBuilder};

/// Run `f` on `num_pes` PEs and return their results in rank order.
///
/// More than one PE always uses the channel backend.
pub fn launch<F, R>(num_pes: usize, f: F) -> Vec<R>
where
    F: Fn(DistWorld) -> R + Sync,
    R: Send,
{
    DistWorldBuilder::new()
        .with_backend(if num_pes > 1 {
            Backend::Channel
        } else {
            Backend::Local
        })
        .with_num_pes(num_pes)
        .launch(f)
}
