use crate::arch::{block_row_counts, distribute_shape, LocalToGlobal, PartitionPlan, ProcessGrid};
use crate::array::cache::GlobalProps;
use crate::array::gather::{gather_unknown_shape, gather_with_shape};
use crate::array::key::{apply_local_key, format_indexed_result, global_to_local_key, IndexKey};
use crate::array::redistribute::{redistribution_counts, uneven_redistribution_counts};
use crate::array::reduction::{divisor, local_reduce, reduced_shape, ReduceOp, ReductionParams};
use crate::array::{
    from_flat, DistArray, DistArrayKind, Distribution, Element, ReplicatedResult, Undistributed,
};
use crate::error::{DistArrayError, DistResult};
use crate::process_group::ProcessGroup;

use ndarray::{ArrayD, Axis};
use std::sync::Arc;

/// An array partitioned into contiguous blocks of rows, one block per PE of its group.
///
/// Only axis 0 is split: every other axis is held in full by every PE. The partition is
/// fixed for the lifetime of the array, [RowBlock::reshape] produces a new array.
pub struct RowBlock<T: Element> {
    local: ArrayD<T>,
    group: Arc<ProcessGroup>,
    grid: ProcessGrid,
    local_to_global: LocalToGlobal,
    row_counts: Vec<usize>,
    props: GlobalProps,
}

impl<T: Element> std::fmt::Debug for RowBlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowBlock")
            .field("pe", &self.group.my_pe())
            .field("grid", &self.grid)
            .field("local_to_global", &self.local_to_global)
            .field("local", &self.local)
            .finish()
    }
}

impl<T: Element> RowBlock<T> {
    /// Wrap a local block laid out according to `plan`, the global shape is known up front.
    pub(crate) fn from_plan(
        group: Arc<ProcessGroup>,
        local: ArrayD<T>,
        plan: PartitionPlan,
        global_shape: Vec<usize>,
    ) -> DistResult<RowBlock<T>> {
        let (grid, local_to_global) = match (plan.grid, plan.local_to_global) {
            (Some(grid), Some(ltg)) => (grid, ltg),
            _ => {
                return Err(DistArrayError::InvalidDistribution(
                    Distribution::Undistributed.to_string(),
                ))
            }
        };
        if local.shape() != plan.local_shape.as_slice() {
            return Err(DistArrayError::ShapeMismatch {
                from: local.len(),
                to: plan.local_shape,
            });
        }
        let row_counts = block_row_counts(global_shape[0], group.num_pes());
        Ok(RowBlock {
            local,
            group,
            grid,
            local_to_global,
            row_counts,
            props: GlobalProps::with_shape(global_shape),
        })
    }

    /// Build a row-block array from blocks already resident on each PE.
    ///
    /// PE `i`'s rows follow the rows of PEs `0..i`, blocks may have any number of rows but
    /// must agree on the trailing dimensions. The global shape is computed on first use.
    /// This is a collective operation.
    #[tracing::instrument(skip_all)]
    pub fn from_local(group: Arc<ProcessGroup>, local: ArrayD<T>) -> DistResult<RowBlock<T>> {
        if local.ndim() == 0 {
            return Err(DistArrayError::InvalidDistribution(format!(
                "{} (a zero dimensional array cannot be row block distributed)",
                Distribution::Block
            )));
        }
        let row_counts = group.all_gather(&local.shape()[0])?;
        let offset: usize = row_counts[..group.my_pe()].iter().sum();
        let local_to_global = local
            .shape()
            .iter()
            .enumerate()
            .map(|(axis, len)| if axis == 0 { (offset, offset + len) } else { (0, *len) })
            .collect();
        tracing::debug!(pe = group.my_pe(), offset, rows = local.shape()[0], "from_local");
        Ok(RowBlock {
            grid: ProcessGrid {
                dims: vec![group.num_pes()],
                coord: vec![group.my_pe()],
            },
            local,
            group,
            local_to_global,
            row_counts,
            props: GlobalProps::new(),
        })
    }

    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// Global `[start, end)` index range of the local block along every axis
    pub fn local_to_global(&self) -> &LocalToGlobal {
        &self.local_to_global
    }

    /// Number of rows held by every PE, in rank order
    pub fn row_counts(&self) -> &[usize] {
        &self.row_counts
    }

    fn compute_global_shape(&self) -> DistResult<Vec<usize>> {
        let trailing: Vec<usize> = self.local.shape()[1..].to_vec();
        let trailing = self.group.all_reduce(&trailing, ReduceOp::Max)?;
        let rows = self.row_counts.iter().sum();
        Ok(std::iter::once(rows).chain(trailing).collect())
    }

    /// Combine per-PE partial reductions into the replicated result.
    ///
    /// Reducing everything or along the partitioned axis leaves equally shaped partials that
    /// are combined element-wise. Along any other axis each PE's partial covers its own rows,
    /// so the partials are concatenated in rank order instead.
    fn combine_partials<U: Element>(
        &self,
        partial: ArrayD<U>,
        op: ReduceOp,
        axis: Option<usize>,
        global_shape: &[usize],
    ) -> DistResult<ArrayD<U>> {
        let shape = reduced_shape(global_shape, axis);
        match axis {
            None | Some(0) => {
                let flat: Vec<U> = partial.iter().cloned().collect();
                from_flat(self.group.all_reduce(&flat, op)?, &shape)
            }
            Some(_) => gather_with_shape(&self.group, &partial, &shape),
        }
    }

    fn reduce(&self, op: ReduceOp, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        // local ndim equals the global ndim, so this needs no collective
        let axis = params.check(self.local.ndim())?;
        let global_shape = self.global_shape()?.to_vec();
        let partial = local_reduce(&self.local, op, axis);
        let reduced = self.combine_partials(partial, op, axis, &global_shape)?;
        tracing::debug!(pe = self.group.my_pe(), ?op, ?axis, "reduced");
        Ok(Undistributed::from_parts(self.group.clone(), reduced))
    }

    fn global_mean(
        &self,
        data: &ArrayD<f64>,
        axis: Option<usize>,
        global_shape: &[usize],
    ) -> DistResult<ArrayD<f64>> {
        let partial = local_reduce(data, ReduceOp::Sum, axis);
        let count = divisor(global_shape, axis);
        Ok(self
            .combine_partials(partial, ReduceOp::Sum, axis, global_shape)?
            .mapv(|s| s / count))
    }

    /// Move the data into a row-block layout of `shape`, which must hold the same number of elements.
    ///
    /// This is a collective operation.
    #[tracing::instrument(skip_all)]
    pub fn reshape(&self, shape: &[usize]) -> DistResult<RowBlock<T>> {
        let old_shape = self.global_shape()?.to_vec();
        let size: usize = old_shape.iter().product();
        if shape.iter().product::<usize>() != size {
            return Err(DistArrayError::ShapeMismatch {
                from: size,
                to: shape.to_vec(),
            });
        }
        let num_pes = self.group.num_pes();
        let my_pe = self.group.my_pe();
        let plan = distribute_shape(shape, Distribution::Block, num_pes, my_pe)?;
        let (send_counts, recv_counts) = if self.row_counts == block_row_counts(old_shape[0], num_pes) {
            redistribution_counts(&old_shape, shape, num_pes, my_pe)
        } else {
            // blocks from from_local need not follow the planner
            uneven_redistribution_counts(&self.row_counts, &old_shape, shape, my_pe)
        };
        let send: Vec<T> = self.local.iter().cloned().collect();
        let received = self.group.all_to_all_v(&send, &send_counts, &recv_counts)?;
        tracing::debug!(pe = my_pe, ?send_counts, ?recv_counts, "redistributed");
        let local = from_flat(received, &plan.local_shape)?;
        RowBlock::from_plan(self.group.clone(), local, plan, shape.to_vec())
    }
}

impl<T: Element> DistArray<T> for RowBlock<T> {
    fn distribution(&self) -> Distribution {
        Distribution::Block
    }

    fn group(&self) -> &Arc<ProcessGroup> {
        &self.group
    }

    fn local_data(&self) -> &ArrayD<T> {
        &self.local
    }

    fn global_shape(&self) -> DistResult<&[usize]> {
        self.props.shape(|| self.compute_global_shape())
    }

    fn global_size(&self) -> DistResult<usize> {
        let shape = self.global_shape()?;
        Ok(self.props.size(shape))
    }

    fn global_nbytes(&self) -> DistResult<usize> {
        let shape = self.global_shape()?;
        Ok(self.props.nbytes(shape, std::mem::size_of::<T>()))
    }

    fn global_ndim(&self) -> DistResult<usize> {
        let shape = self.global_shape()?;
        Ok(self.props.ndim(shape))
    }

    #[tracing::instrument(skip_all)]
    fn get(&self, key: &IndexKey) -> DistResult<ReplicatedResult<T>> {
        let global_shape = self.global_shape()?.to_vec();
        let local_key = global_to_local_key(key, &global_shape, Some(&self.local_to_global))?;
        let selected = apply_local_key(&self.local, &local_key);
        let selected = format_indexed_result(key, global_shape.len(), selected)?;
        let gathered = gather_unknown_shape(&self.group, &selected, key.reverses_rows())?;
        Ok(Undistributed::from_parts(self.group.clone(), gathered))
    }

    #[tracing::instrument(skip_all)]
    fn sum_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        self.reduce(ReduceOp::Sum, params)
    }

    #[tracing::instrument(skip_all)]
    fn min_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        self.reduce(ReduceOp::Min, params)
    }

    #[tracing::instrument(skip_all)]
    fn max_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        self.reduce(ReduceOp::Max, params)
    }

    #[tracing::instrument(skip_all)]
    fn mean_with(&self, params: ReductionParams<f64>) -> DistResult<ReplicatedResult<f64>> {
        let axis = params.check(self.local.ndim())?;
        let global_shape = self.global_shape()?.to_vec();
        let data = self.local.mapv(Element::as_f64);
        let mean = self.global_mean(&data, axis, &global_shape)?;
        Ok(Undistributed::from_parts(self.group.clone(), mean))
    }

    #[tracing::instrument(skip_all)]
    fn std_with(&self, params: ReductionParams<f64>) -> DistResult<ReplicatedResult<f64>> {
        let axis = params.check(self.local.ndim())?;
        let global_shape = self.global_shape()?.to_vec();
        let data = self.local.mapv(Element::as_f64);
        let mean = self.global_mean(&data, axis, &global_shape)?;
        let centered = match axis {
            None => {
                let mean = mean.iter().copied().next().unwrap_or(0.0);
                data.mapv(|x| x - mean)
            }
            Some(0) => &data - &mean,
            Some(k) => {
                // the replicated mean covers every row, keep only the rows held here
                let (start, end) = self.local_to_global[0];
                let rows: Vec<usize> = (start..end).collect();
                let local_mean = mean.select(Axis(0), &rows).insert_axis(Axis(k));
                &data - &local_mean
            }
        };
        let squares = centered.mapv(|d| d * d);
        let partial = local_reduce(&squares, ReduceOp::Sum, axis);
        let count = divisor(&global_shape, axis);
        let std = self
            .combine_partials(partial, ReduceOp::Sum, axis, &global_shape)?
            .mapv(|ss| (ss / count).sqrt());
        Ok(Undistributed::from_parts(self.group.clone(), std))
    }

    #[tracing::instrument(skip_all)]
    fn collect_data(&self) -> DistResult<ReplicatedResult<T>> {
        let global_shape = self.global_shape()?.to_vec();
        let data = gather_with_shape(&self.group, &self.local, &global_shape)?;
        Ok(Undistributed::from_parts(self.group.clone(), data))
    }

    fn reshape(&self, shape: &[usize]) -> DistResult<DistArrayKind<T>> {
        RowBlock::reshape(self, shape).map(DistArrayKind::from)
    }
}
