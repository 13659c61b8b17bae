use crate::array::{from_flat, Dist, ReduceOp};
use crate::error::DistResult;
use crate::process_group::ProcessGroup;

use ndarray::{ArrayD, Axis};

/// Concatenate every PE's block in rank order into an identical array of `global_shape` on every PE.
///
/// This is a collective operation.
pub(crate) fn gather_with_shape<T: Dist>(
    group: &ProcessGroup,
    local: &ArrayD<T>,
    global_shape: &[usize],
) -> DistResult<ArrayD<T>> {
    let flat: Vec<T> = local.iter().cloned().collect();
    let displ = group.exscan_sum(flat.len())?;
    let total = group.all_reduce_scalar(flat.len(), ReduceOp::Sum)?;
    let gathered = group.all_gather_v(&flat, displ, total)?;
    tracing::debug!(pe = group.my_pe(), displ, total, "gathered blocks");
    from_flat(gathered, global_shape)
}

/// Shape of the concatenation along axis 0 of blocks with the given shapes.
///
/// Trailing dimensions are taken from the first non-empty block.
pub(crate) fn concatenated_shape(shapes: &[Vec<usize>]) -> Vec<usize> {
    let rows = shapes.iter().map(|shape| shape.first().copied().unwrap_or(0)).sum();
    let trailing = shapes
        .iter()
        .find(|shape| shape.iter().product::<usize>() > 0)
        .or_else(|| shapes.first())
        .map(|shape| shape.iter().skip(1).copied().collect::<Vec<_>>())
        .unwrap_or_default();
    std::iter::once(rows).chain(trailing).collect()
}

/// Gather blocks whose global shape is not known ahead of time (e.g. indexing results),
/// the shape is derived from the blocks themselves.
///
/// With `reverse_blocks` the blocks are concatenated in descending rank order.
/// This is a collective operation.
pub(crate) fn gather_unknown_shape<T: Dist>(
    group: &ProcessGroup,
    local: &ArrayD<T>,
    reverse_blocks: bool,
) -> DistResult<ArrayD<T>> {
    let shapes = group.all_gather(&local.shape().to_vec())?;
    let global_shape = concatenated_shape(&shapes);
    let gathered = gather_with_shape(group, local, &global_shape)?;
    if !reverse_blocks {
        return Ok(gathered);
    }
    let mut offset = 0;
    let blocks: Vec<_> = shapes
        .iter()
        .map(|shape| {
            let rows = shape.first().copied().unwrap_or(0);
            offset += rows;
            (offset - rows)..offset
        })
        .collect();
    let order: Vec<usize> = blocks.into_iter().rev().flatten().collect();
    Ok(gathered.select(Axis(0), &order))
}
