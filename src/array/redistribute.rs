//! Message counts for moving a row-block array into a new row-block layout.
//!
//! In row major order the block held by each PE is a single contiguous interval of the
//! flattened array, so the number of elements PE `i` sends to PE `j` is the length of
//! the overlap between `i`'s old interval and `j`'s new interval.

use crate::arch::block_row_counts;

/// `[start, end)` flattened intervals of blocks with the given row counts, in rank order.
pub(crate) fn flat_intervals(row_counts: &[usize], row_size: usize) -> Vec<(usize, usize)> {
    let mut start = 0;
    row_counts
        .iter()
        .map(|rows| {
            let interval = (start, start + rows * row_size);
            start = interval.1;
            interval
        })
        .collect()
}

/// Planned flattened intervals of every PE for an array of `shape`.
pub(crate) fn planned_intervals(shape: &[usize], num_pes: usize) -> Vec<(usize, usize)> {
    match shape.split_first() {
        Some((rows, trailing)) => {
            flat_intervals(&block_row_counts(*rows, num_pes), trailing.iter().product())
        }
        None => vec![(0, 0); num_pes],
    }
}

fn overlap(a: (usize, usize), b: (usize, usize)) -> usize {
    a.1.min(b.1).saturating_sub(a.0.max(b.0))
}

/// `(send_counts, recv_counts)` for `my_pe` when data laid out in `old` intervals moves to `new` intervals.
pub(crate) fn overlap_counts(
    old: &[(usize, usize)],
    new: &[(usize, usize)],
    my_pe: usize,
) -> (Vec<usize>, Vec<usize>) {
    let send_counts = new.iter().map(|n| overlap(old[my_pe], *n)).collect();
    let recv_counts = old.iter().map(|o| overlap(*o, new[my_pe])).collect();
    (send_counts, recv_counts)
}

/// Send and receive counts of `my_pe` for moving an array of `old_shape` whose blocks hold
/// `row_counts` rows into the planned layout of `new_shape`.
pub(crate) fn uneven_redistribution_counts(
    row_counts: &[usize],
    old_shape: &[usize],
    new_shape: &[usize],
    my_pe: usize,
) -> (Vec<usize>, Vec<usize>) {
    let row_size: usize = old_shape.iter().skip(1).product();
    overlap_counts(
        &flat_intervals(row_counts, row_size),
        &planned_intervals(new_shape, row_counts.len()),
        my_pe,
    )
}

/// Send and receive counts of `my_pe` for reshaping a planned row-block array of
/// `old_shape` into `new_shape`.
///
/// This is a pure function of the two global shapes, every PE computes the whole
/// exchange pattern without communicating.
pub fn redistribution_counts(
    old_shape: &[usize],
    new_shape: &[usize],
    num_pes: usize,
    my_pe: usize,
) -> (Vec<usize>, Vec<usize>) {
    overlap_counts(
        &planned_intervals(old_shape, num_pes),
        &planned_intervals(new_shape, num_pes),
        my_pe,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_follow_row_counts() {
        assert_eq!(flat_intervals(&[2, 2, 1], 4), vec![(0, 8), (8, 16), (16, 20)]);
        assert_eq!(planned_intervals(&[20], 3), vec![(0, 7), (7, 14), (14, 20)]);
        assert_eq!(planned_intervals(&[2, 0], 2), vec![(0, 0), (0, 0)]);
    }

    #[test]
    fn reshape_5x4_to_flat_over_three() {
        // old blocks: [0,8) [8,16) [16,20), new blocks: [0,7) [7,14) [14,20)
        assert_eq!(
            redistribution_counts(&[5, 4], &[20], 3, 0),
            (vec![7, 1, 0], vec![7, 0, 0])
        );
        assert_eq!(
            redistribution_counts(&[5, 4], &[20], 3, 1),
            (vec![0, 6, 2], vec![1, 6, 0])
        );
        assert_eq!(
            redistribution_counts(&[5, 4], &[20], 3, 2),
            (vec![0, 0, 4], vec![0, 2, 4])
        );
    }

    #[test]
    fn uneven_blocks_move_into_the_plan() {
        // rows [0, 1, 2, 3] of a (6, 2) array, flattened [0,0) [0,2) [2,6) [6,12)
        // planned (12,) over 4: [0,3) [3,6) [6,9) [9,12)
        assert_eq!(
            uneven_redistribution_counts(&[0, 1, 2, 3], &[6, 2], &[12], 2),
            (vec![1, 3, 0, 0], vec![0, 0, 0, 3])
        );
        assert_eq!(
            uneven_redistribution_counts(&[2, 2, 1], &[5, 4], &[20], 1),
            redistribution_counts(&[5, 4], &[20], 3, 1)
        );
    }

    #[test]
    fn counts_are_pairwise_consistent() {
        let shapes: [&[usize]; 5] = [&[12, 5], &[60], &[3, 4, 5], &[5, 12], &[2, 30]];
        for num_pes in 1..=7 {
            for old in shapes.iter() {
                for new in shapes.iter() {
                    let counts: Vec<_> = (0..num_pes)
                        .map(|pe| redistribution_counts(old, new, num_pes, pe))
                        .collect();
                    for i in 0..num_pes {
                        assert_eq!(counts[i].0.iter().sum::<usize>(), {
                            let (s, e) = planned_intervals(old, num_pes)[i];
                            e - s
                        });
                        for j in 0..num_pes {
                            assert_eq!(counts[i].0[j], counts[j].1[i]);
                        }
                    }
                }
            }
        }
    }
}
