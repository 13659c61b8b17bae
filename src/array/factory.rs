//! Collective constructors for distributed arrays.
//!
//! Every function here is a collective operation over `group`. Only the root PE needs
//! to supply data or a shape; the distribution token must be identical on every PE.
use crate::arch::{block_row_counts, distribute_shape};
use crate::array::key::IndexKey;
use crate::array::reduction::ReductionParams;
use crate::array::{
    from_flat, DistArray, Distribution, Element, ReplicatedResult, RowBlock, Undistributed,
};
use crate::error::{DistArrayError, DistResult};
use crate::process_group::ProcessGroup;

use enum_dispatch::enum_dispatch;
use ndarray::ArrayD;
use std::sync::Arc;

/// A distributed array of any supported distribution.
#[enum_dispatch(DistArray<T>)]
#[derive(Debug)]
pub enum DistArrayKind<T: Element> {
    RowBlock(RowBlock<T>),
    Undistributed(Undistributed<T>),
}

impl<T: Element> DistArrayKind<T> {
    pub fn as_row_block(&self) -> Option<&RowBlock<T>> {
        match self {
            DistArrayKind::RowBlock(array) => Some(array),
            DistArrayKind::Undistributed(_) => None,
        }
    }
}

/// Learn the root's shape on every PE, failing everywhere if the root had none.
fn broadcast_shape(
    group: &ProcessGroup,
    shape: Option<Vec<usize>>,
    root: usize,
) -> DistResult<Vec<usize>> {
    group
        .broadcast(&shape, root)?
        .ok_or(DistArrayError::MissingRootData(root))
}

/// Distribute `data`, held by `root`, over `group` according to the token `dist`
/// (`"b"` for row blocks, `"u"` for a full copy on every PE).
///
/// `data` is ignored on every PE but `root`.
#[tracing::instrument(skip_all)]
pub fn array<T: Element>(
    group: &Arc<ProcessGroup>,
    data: Option<ArrayD<T>>,
    root: usize,
    dist: &str,
) -> DistResult<DistArrayKind<T>> {
    let distribution: Distribution = dist.parse()?;
    let is_root = group.my_pe() == root;
    let data = if is_root { data } else { None };
    let shape = broadcast_shape(group, data.as_ref().map(|d| d.shape().to_vec()), root)?;
    let flat: Vec<T> = data.map(|d| d.iter().cloned().collect()).unwrap_or_default();
    match distribution {
        Distribution::Block => {
            let plan = distribute_shape(&shape, distribution, group.num_pes(), group.my_pe())?;
            let row_size: usize = shape[1..].iter().product();
            let counts: Vec<usize> = block_row_counts(shape[0], group.num_pes())
                .into_iter()
                .map(|rows| rows * row_size)
                .collect();
            let local = group.scatter_v(&flat, &counts, root)?;
            let local = from_flat(local, &plan.local_shape)?;
            tracing::debug!(pe = group.my_pe(), local_shape = ?plan.local_shape, "scattered rows");
            Ok(RowBlock::from_plan(group.clone(), local, plan, shape)?.into())
        }
        Distribution::Undistributed => {
            let flat = group.broadcast(&flat, root)?;
            Ok(Undistributed::from_parts(group.clone(), from_flat(flat, &shape)?).into())
        }
    }
}

/// An array of the shape given by `root`, every element set to `value`.
#[tracing::instrument(skip_all)]
pub fn full<T: Element>(
    group: &Arc<ProcessGroup>,
    shape: Option<&[usize]>,
    root: usize,
    dist: &str,
    value: T,
) -> DistResult<DistArrayKind<T>> {
    let distribution: Distribution = dist.parse()?;
    let shape = broadcast_shape(group, shape.map(|s| s.to_vec()), root)?;
    let plan = distribute_shape(&shape, distribution, group.num_pes(), group.my_pe())?;
    let local = ArrayD::from_elem(plan.local_shape.clone(), value);
    match distribution {
        Distribution::Block => Ok(RowBlock::from_plan(group.clone(), local, plan, shape)?.into()),
        Distribution::Undistributed => Ok(Undistributed::from_parts(group.clone(), local).into()),
    }
}

/// Allocate without meaningful contents, the elements are zero.
pub fn empty<T: Element>(
    group: &Arc<ProcessGroup>,
    shape: Option<&[usize]>,
    root: usize,
    dist: &str,
) -> DistResult<DistArrayKind<T>> {
    full(group, shape, root, dist, T::ZERO)
}

pub fn zeros<T: Element>(
    group: &Arc<ProcessGroup>,
    shape: Option<&[usize]>,
    root: usize,
    dist: &str,
) -> DistResult<DistArrayKind<T>> {
    full(group, shape, root, dist, T::ZERO)
}

pub fn ones<T: Element>(
    group: &Arc<ProcessGroup>,
    shape: Option<&[usize]>,
    root: usize,
    dist: &str,
) -> DistResult<DistArrayKind<T>> {
    full(group, shape, root, dist, T::ONE)
}
