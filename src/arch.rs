//! Partition planning: how a global shape is laid out over the PEs of a group.
//!
//! Only axis 0 is ever partitioned. PEs are arranged in a one dimensional cartesian
//! grid and each receives one contiguous block of rows, sized as evenly as possible
//! (the first `len % num_pes` PEs hold one extra row).

use crate::array::Distribution;
use crate::error::{DistArrayError, DistResult};

/// Arrangement of PEs in a cartesian grid, and the calling PE's position in it.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessGrid {
    pub dims: Vec<usize>,
    pub coord: Vec<usize>,
}

/// Half open global index range `[start, end)` covered by the local block, per axis.
pub type LocalToGlobal = Vec<(usize, usize)>;

/// Everything a PE needs to know about its share of an array with a given global shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub local_shape: Vec<usize>,
    pub grid: Option<ProcessGrid>,
    pub local_to_global: Option<LocalToGlobal>,
}

/// Grid dimensions used for `distribution` over `num_pes` PEs, `None` when nothing is partitioned.
pub fn compute_grid(num_pes: usize, distribution: Distribution) -> Option<Vec<usize>> {
    match distribution {
        Distribution::Block => Some(vec![num_pes]),
        Distribution::Undistributed => None,
    }
}

/// Coordinates of `rank` in a grid of `dims` (row major mixed radix decomposition).
pub fn assign_coord(dims: &[usize], num_pes: usize, rank: usize) -> Vec<usize> {
    let mut coord = Vec::with_capacity(dims.len());
    let mut rem_pes = num_pes;
    let mut rank = rank;
    for dim in dims {
        rem_pes /= dim;
        coord.push(rank / rem_pes);
        rank %= rem_pes;
    }
    coord
}

/// The `[start, end)` index range along an axis of `axis_len` elements held by the PE at
/// `axis_coord` out of `axis_pes` PEs along that axis.
pub fn block_range(axis_len: usize, axis_pes: usize, axis_coord: usize) -> (usize, usize) {
    let per_pe = axis_len / axis_pes;
    let rem = axis_len % axis_pes;
    let (start, len) = if axis_coord < rem {
        (axis_coord * (per_pe + 1), per_pe + 1)
    } else {
        (rem * (per_pe + 1) + (axis_coord - rem) * per_pe, per_pe)
    };
    (start, start + len)
}

/// The grid, coordinate, local shape and local-to-global map for `my_pe`.
pub fn distribute_shape(
    global_shape: &[usize],
    distribution: Distribution,
    num_pes: usize,
    my_pe: usize,
) -> DistResult<PartitionPlan> {
    let dims = match compute_grid(num_pes, distribution) {
        Some(dims) => dims,
        None => {
            return Ok(PartitionPlan {
                local_shape: global_shape.to_vec(),
                grid: None,
                local_to_global: None,
            })
        }
    };
    if global_shape.is_empty() {
        return Err(DistArrayError::InvalidDistribution(format!(
            "{} (a zero dimensional array cannot be row block distributed)",
            distribution
        )));
    }
    let coord = assign_coord(&dims, num_pes, my_pe);
    let mut local_shape = Vec::with_capacity(global_shape.len());
    let mut local_to_global = Vec::with_capacity(global_shape.len());
    for (axis, axis_len) in global_shape.iter().enumerate() {
        let range = if axis == 0 {
            block_range(*axis_len, dims[0], coord[0])
        } else {
            (0, *axis_len)
        };
        local_shape.push(range.1 - range.0);
        local_to_global.push(range);
    }
    Ok(PartitionPlan {
        local_shape,
        grid: Some(ProcessGrid { dims, coord }),
        local_to_global: Some(local_to_global),
    })
}

/// Rows of every PE for an axis of `axis_len` rows, in rank order.
pub(crate) fn block_row_counts(axis_len: usize, num_pes: usize) -> Vec<usize> {
    (0..num_pes)
        .map(|pe| {
            let (start, end) = block_range(axis_len, num_pes, pe);
            end - start
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ranges_cover_the_axis() {
        for len in 0..40 {
            for pes in 1..9 {
                let mut expected_start = 0;
                for coord in 0..pes {
                    let (start, end) = block_range(len, pes, coord);
                    assert_eq!(start, expected_start, "len {} pes {} coord {}", len, pes, coord);
                    assert!(end >= start);
                    let size = end - start;
                    assert!(size == len / pes || size == len / pes + 1);
                    expected_start = end;
                }
                assert_eq!(expected_start, len);
            }
        }
    }

    #[test]
    fn five_rows_over_three_pes() {
        let ranges: Vec<_> = (0..3).map(|c| block_range(5, 3, c)).collect();
        assert_eq!(ranges, vec![(0, 2), (2, 4), (4, 5)]);
        assert_eq!(block_row_counts(5, 3), vec![2, 2, 1]);
    }

    #[test]
    fn coords_follow_mixed_radix_order() {
        assert_eq!(assign_coord(&[4], 4, 3), vec![3]);
        assert_eq!(assign_coord(&[2, 3], 6, 4), vec![1, 1]);
        assert_eq!(assign_coord(&[2, 3], 6, 5), vec![1, 2]);
        assert_eq!(assign_coord(&[3, 2], 6, 3), vec![1, 1]);
    }

    #[test]
    fn plans_only_partition_rows() {
        let plan = distribute_shape(&[5, 4], Distribution::Block, 3, 1).unwrap();
        assert_eq!(plan.local_shape, vec![2, 4]);
        assert_eq!(plan.local_to_global, Some(vec![(2, 4), (0, 4)]));
        assert_eq!(
            plan.grid,
            Some(ProcessGrid {
                dims: vec![3],
                coord: vec![1]
            })
        );

        let plan = distribute_shape(&[5, 4], Distribution::Undistributed, 3, 1).unwrap();
        assert_eq!(plan.local_shape, vec![5, 4]);
        assert_eq!(plan.grid, None);
        assert_eq!(plan.local_to_global, None);
    }

    #[test]
    fn more_pes_than_rows_leaves_empty_blocks() {
        let plan = distribute_shape(&[2, 3], Distribution::Block, 4, 3).unwrap();
        assert_eq!(plan.local_shape, vec![0, 3]);
        assert_eq!(plan.local_to_global, Some(vec![(2, 2), (0, 3)]));
    }

    #[test]
    fn zero_dimensional_block_is_rejected() {
        assert!(matches!(
            distribute_shape(&[], Distribution::Block, 2, 0),
            Err(DistArrayError::InvalidDistribution(_))
        ));
    }
}
