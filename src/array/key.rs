//! Translation of global index keys into keys on a PE's local block.
//!
//! A key is validated purely against the global shape, so every PE accepts or rejects
//! it identically no matter which PE owns the selected elements. PEs that own nothing
//! of the selection get a key that selects nothing rather than an error.

use crate::arch::LocalToGlobal;
use crate::array::{reshape_owned, Dist};
use crate::error::{DistArrayError, DistResult};

use ndarray::{ArrayD, Axis};
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// A `start:stop:step` selection along one axis, with the usual defaults for missing parts.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SliceKey {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: Option<isize>,
}

impl SliceKey {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> SliceKey {
        SliceKey { start, stop, step }
    }

    /// The unrestricted slice (`:`).
    pub fn full() -> SliceKey {
        Default::default()
    }

    pub fn with_step(mut self, step: isize) -> SliceKey {
        self.step = Some(step);
        self
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.step.is_none()
    }

    /// Resolve against an axis of `len` elements into concrete `(start, stop, step)`,
    /// clamping out of range bounds the way sequence slicing does.
    pub fn indices(&self, len: usize) -> DistResult<(isize, isize, isize)> {
        let len = len as isize;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(DistArrayError::NotSupported("slice step of zero".to_owned()));
        }
        let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let resolve = |bound: Option<isize>, default: isize| match bound {
            None => default,
            Some(b) if b < 0 => (b + len).max(lower),
            Some(b) => b.min(upper),
        };
        let (start_default, stop_default) = if step > 0 { (0, len) } else { (len - 1, -1) };
        Ok((
            resolve(self.start, start_default),
            resolve(self.stop, stop_default),
            step,
        ))
    }
}

impl From<Range<isize>> for SliceKey {
    fn from(range: Range<isize>) -> Self {
        SliceKey::new(Some(range.start), Some(range.end), None)
    }
}

impl From<RangeFrom<isize>> for SliceKey {
    fn from(range: RangeFrom<isize>) -> Self {
        SliceKey::new(Some(range.start), None, None)
    }
}

impl From<RangeTo<isize>> for SliceKey {
    fn from(range: RangeTo<isize>) -> Self {
        SliceKey::new(None, Some(range.end), None)
    }
}

impl From<RangeFull> for SliceKey {
    fn from(_: RangeFull) -> Self {
        SliceKey::full()
    }
}

/// One component of a tuple key.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKey {
    Index(isize),
    Slice(SliceKey),
}

impl From<isize> for AxisKey {
    fn from(index: isize) -> Self {
        AxisKey::Index(index)
    }
}

impl From<SliceKey> for AxisKey {
    fn from(slice: SliceKey) -> Self {
        AxisKey::Slice(slice)
    }
}

impl From<Range<isize>> for AxisKey {
    fn from(range: Range<isize>) -> Self {
        AxisKey::Slice(range.into())
    }
}

impl From<RangeFrom<isize>> for AxisKey {
    fn from(range: RangeFrom<isize>) -> Self {
        AxisKey::Slice(range.into())
    }
}

impl From<RangeTo<isize>> for AxisKey {
    fn from(range: RangeTo<isize>) -> Self {
        AxisKey::Slice(range.into())
    }
}

impl From<RangeFull> for AxisKey {
    fn from(_: RangeFull) -> Self {
        AxisKey::Slice(SliceKey::full())
    }
}

/// A global element key: a single index, a slice of the first axis, or a tuple of
/// indices and slices applied to the leading axes.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Index(isize),
    Slice(SliceKey),
    Tuple(Vec<AxisKey>),
}

impl IndexKey {
    fn num_components(&self) -> usize {
        match self {
            IndexKey::Index(_) | IndexKey::Slice(_) => 1,
            IndexKey::Tuple(keys) => keys.len(),
        }
    }

    /// True when the rows of the result come out in descending global order
    /// (a negative step slice on axis 0).
    pub(crate) fn reverses_rows(&self) -> bool {
        let first = match self {
            IndexKey::Index(_) => None,
            IndexKey::Slice(slice) => Some(slice),
            IndexKey::Tuple(keys) => match keys.first() {
                Some(AxisKey::Slice(slice)) => Some(slice),
                _ => None,
            },
        };
        first.and_then(|slice| slice.step).map_or(false, |step| step < 0)
    }

    fn num_indices(&self) -> usize {
        match self {
            IndexKey::Index(_) => 1,
            IndexKey::Slice(_) => 0,
            IndexKey::Tuple(keys) => keys
                .iter()
                .filter(|key| matches!(key, AxisKey::Index(_)))
                .count(),
        }
    }
}

impl From<isize> for IndexKey {
    fn from(index: isize) -> Self {
        IndexKey::Index(index)
    }
}

impl From<SliceKey> for IndexKey {
    fn from(slice: SliceKey) -> Self {
        IndexKey::Slice(slice)
    }
}

impl From<Range<isize>> for IndexKey {
    fn from(range: Range<isize>) -> Self {
        IndexKey::Slice(range.into())
    }
}

impl From<RangeFull> for IndexKey {
    fn from(_: RangeFull) -> Self {
        IndexKey::Slice(SliceKey::full())
    }
}

impl From<Vec<AxisKey>> for IndexKey {
    fn from(keys: Vec<AxisKey>) -> Self {
        IndexKey::Tuple(keys)
    }
}

/// A key in the coordinates of one PE's local block.
///
/// `Slice` bounds are absolute local positions: negative values lie before the block and
/// are never wrapped around from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAxisKey {
    Index(usize),
    Slice { start: isize, stop: isize, step: isize },
    Full,
}

impl LocalAxisKey {
    /// The key a PE uses for an index it does not own.
    pub fn nothing() -> LocalAxisKey {
        LocalAxisKey::Slice {
            start: 0,
            stop: 0,
            step: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalKey(pub Vec<LocalAxisKey>);

fn local_range(local_to_global: Option<&LocalToGlobal>, axis: usize) -> Option<(usize, usize)> {
    local_to_global.and_then(|ltg| ltg.get(axis).copied())
}

fn index_to_local(
    index: isize,
    global_shape: &[usize],
    local_to_global: Option<&LocalToGlobal>,
    axis: usize,
) -> DistResult<LocalAxisKey> {
    let len = global_shape[axis];
    let global = if index < 0 { index + len as isize } else { index };
    if global < 0 || global >= len as isize {
        return Err(DistArrayError::IndexOutOfBounds { index, axis, len });
    }
    let global = global as usize;
    match local_range(local_to_global, axis) {
        None => Ok(LocalAxisKey::Index(global)),
        Some((min, max)) if global >= min && global < max => Ok(LocalAxisKey::Index(global - min)),
        Some(_) => Ok(LocalAxisKey::nothing()),
    }
}

fn slice_to_local(
    slice: &SliceKey,
    global_shape: &[usize],
    local_to_global: Option<&LocalToGlobal>,
    axis: usize,
) -> DistResult<LocalAxisKey> {
    if slice.is_full() {
        return Ok(LocalAxisKey::Full);
    }
    let (start, stop, step) = slice.indices(global_shape[axis])?;
    let min = local_range(local_to_global, axis).map_or(0, |(min, _)| min as isize);
    Ok(LocalAxisKey::Slice {
        start: start - min,
        stop: stop - min,
        step,
    })
}

/// Translate a global key into the key selecting the same elements from this PE's block.
///
/// `local_to_global` is `None` for arrays that are not partitioned.
pub fn global_to_local_key(
    key: &IndexKey,
    global_shape: &[usize],
    local_to_global: Option<&LocalToGlobal>,
) -> DistResult<LocalKey> {
    if key.num_components() > global_shape.len() {
        return Err(DistArrayError::TooManyIndices {
            given: key.num_components(),
            shape: global_shape.to_vec(),
        });
    }
    let local = match key {
        IndexKey::Index(index) => vec![index_to_local(*index, global_shape, local_to_global, 0)?],
        IndexKey::Slice(slice) => vec![slice_to_local(slice, global_shape, local_to_global, 0)?],
        IndexKey::Tuple(keys) => keys
            .iter()
            .enumerate()
            .map(|(axis, key)| match key {
                AxisKey::Index(index) => {
                    index_to_local(*index, global_shape, local_to_global, axis)
                }
                AxisKey::Slice(slice) => {
                    slice_to_local(slice, global_shape, local_to_global, axis)
                }
            })
            .collect::<DistResult<Vec<_>>>()?,
    };
    Ok(LocalKey(local))
}

/// Positions `start, start + step, ...` before `stop` that fall inside `[0, len)`.
///
/// The lattice is anchored at `start` even when `start` lies outside the block, so a
/// strided selection continues across block boundaries with the same alignment.
fn lattice_indices(len: usize, start: isize, stop: isize, step: isize) -> Vec<usize> {
    let len = len as isize;
    let mut indices = Vec::new();
    if step > 0 {
        let mut first = start;
        if first < 0 {
            first += ((-first + step - 1) / step) * step;
        }
        let end = stop.min(len);
        let mut i = first;
        while i < end {
            indices.push(i as usize);
            i += step;
        }
    } else {
        let mut first = start;
        if first > len - 1 {
            first += ((first - (len - 1) - step - 1) / -step) * step;
        }
        let end = stop.max(-1);
        let mut i = first;
        while i > end {
            indices.push(i as usize);
            i += step;
        }
    }
    indices
}

/// Select the elements addressed by `key` from a local block.
pub fn apply_local_key<T: Dist>(data: &ArrayD<T>, key: &LocalKey) -> ArrayD<T> {
    let mut result = data.clone();
    let mut axis = 0;
    for axis_key in &key.0 {
        match axis_key {
            LocalAxisKey::Index(index) => {
                result = result.index_axis_move(Axis(axis), *index);
            }
            LocalAxisKey::Full => axis += 1,
            LocalAxisKey::Slice { start, stop, step } => {
                let indices = lattice_indices(result.shape()[axis], *start, *stop, *step);
                result = result.select(Axis(axis), &indices);
                axis += 1;
            }
        }
    }
    result
}

/// Give an indexing result a shape every PE can agree on before it is gathered.
///
/// A zero dimensional result becomes a one element array. An empty result becomes
/// all-zero dimensions of the key's implied rank, `max(1, ndim - #integer components)`.
pub fn format_indexed_result<T: Dist>(
    key: &IndexKey,
    global_ndim: usize,
    result: ArrayD<T>,
) -> DistResult<ArrayD<T>> {
    if result.ndim() == 0 {
        return reshape_owned(result, &[1]);
    }
    if result.is_empty() {
        let rank = global_ndim.saturating_sub(key.num_indices()).max(1);
        return reshape_owned(result, &vec![0; rank]);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::distribute_shape;
    use crate::array::Distribution;
    use ndarray::IxDyn;

    fn global_5x4() -> ArrayD<i64> {
        ArrayD::from_shape_vec(IxDyn(&[5, 4]), (0..20).collect()).unwrap()
    }

    fn local_block(global: &ArrayD<i64>, num_pes: usize, pe: usize) -> (ArrayD<i64>, LocalToGlobal) {
        let plan = distribute_shape(global.shape(), Distribution::Block, num_pes, pe).unwrap();
        let ltg = plan.local_to_global.unwrap();
        let (start, end) = ltg[0];
        let rows: Vec<usize> = (start..end).collect();
        (global.select(Axis(0), &rows), ltg)
    }

    #[test]
    fn slice_indices_follow_sequence_rules() {
        assert_eq!(SliceKey::full().indices(5).unwrap(), (0, 5, 1));
        assert_eq!(SliceKey::from(1..4).indices(5).unwrap(), (1, 4, 1));
        assert_eq!(SliceKey::from(-3..10).indices(5).unwrap(), (2, 5, 1));
        assert_eq!(SliceKey::full().with_step(-1).indices(5).unwrap(), (4, -1, -1));
        assert_eq!(SliceKey::new(Some(10), Some(-10), Some(-2)).indices(5).unwrap(), (4, -1, -2));
        assert!(SliceKey::full().with_step(0).indices(5).is_err());
    }

    #[test]
    fn integer_keys_round_trip_on_the_owner() {
        let global = global_5x4();
        for num_pes in 1..=5 {
            for index in -5..5isize {
                let row = if index < 0 { index + 5 } else { index } as usize;
                let mut owners = 0;
                for pe in 0..num_pes {
                    let (block, ltg) = local_block(&global, num_pes, pe);
                    let key = IndexKey::Index(index);
                    let local = global_to_local_key(&key, &[5, 4], Some(&ltg)).unwrap();
                    let selected = apply_local_key(&block, &local);
                    if row >= ltg[0].0 && row < ltg[0].1 {
                        owners += 1;
                        assert_eq!(selected, global.index_axis(Axis(0), row).to_owned());
                    } else {
                        assert_eq!(selected.len(), 0);
                        let formatted = format_indexed_result(&key, 2, selected).unwrap();
                        assert_eq!(formatted.shape(), &[0]);
                    }
                }
                assert_eq!(owners, 1);
            }
        }
    }

    #[test]
    fn out_of_bounds_is_rejected_on_every_pe() {
        let global = global_5x4();
        for pe in 0..3 {
            let (_, ltg) = local_block(&global, 3, pe);
            for index in [5isize, -6, 100] {
                let err = global_to_local_key(&IndexKey::Index(index), &[5, 4], Some(&ltg));
                assert!(matches!(err, Err(DistArrayError::IndexOutOfBounds { .. })));
            }
            let key = IndexKey::Tuple(vec![0.into(), 1.into(), 2.into()]);
            assert!(matches!(
                global_to_local_key(&key, &[5, 4], Some(&ltg)),
                Err(DistArrayError::TooManyIndices { given: 3, .. })
            ));
            let key = IndexKey::Tuple(vec![0.into(), 4.into()]);
            assert!(matches!(
                global_to_local_key(&key, &[5, 4], Some(&ltg)),
                Err(DistArrayError::IndexOutOfBounds { axis: 1, .. })
            ));
        }
    }

    fn gathered_rows(key: &IndexKey, num_pes: usize) -> Vec<i64> {
        let global = global_5x4();
        let mut values = Vec::new();
        for pe in 0..num_pes {
            let (block, ltg) = local_block(&global, num_pes, pe);
            let local = global_to_local_key(key, &[5, 4], Some(&ltg)).unwrap();
            values.extend(apply_local_key(&block, &local).iter().cloned());
        }
        values
    }

    #[test]
    fn slices_select_the_same_rows_across_blocks() {
        for num_pes in 1..=5 {
            assert_eq!(
                gathered_rows(&IndexKey::from(1..4), num_pes),
                (4..16).collect::<Vec<_>>()
            );
            assert_eq!(
                gathered_rows(&IndexKey::from(..), num_pes),
                (0..20).collect::<Vec<_>>()
            );
            let stepped = IndexKey::Slice(SliceKey::new(Some(0), None, Some(2)));
            let expected: Vec<i64> = [0, 2, 4]
                .iter()
                .flat_map(|r| (r * 4)..(r * 4 + 4))
                .collect();
            assert_eq!(gathered_rows(&stepped, num_pes), expected);
            let column = IndexKey::Tuple(vec![(..).into(), (-1).into()]);
            assert_eq!(gathered_rows(&column, num_pes), vec![3, 7, 11, 15, 19]);
        }
    }

    #[test]
    fn negative_steps_stay_on_the_lattice() {
        assert_eq!(lattice_indices(2, 3, -1, -1), vec![1, 0]);
        assert_eq!(lattice_indices(2, 5, -1, -2), vec![1]);
        assert_eq!(lattice_indices(3, -1, 3, 2), vec![1]);
        assert_eq!(lattice_indices(3, 0, 0, 1), Vec::<usize>::new());
    }

    #[test]
    fn scalars_and_empty_results_are_normalized() {
        let scalar = ArrayD::from_elem(IxDyn(&[]), 7i64);
        let formatted = format_indexed_result(&IndexKey::Index(0), 1, scalar).unwrap();
        assert_eq!(formatted.shape(), &[1]);

        let empty = ArrayD::<i64>::from_shape_vec(IxDyn(&[0, 4]), vec![]).unwrap();
        let formatted = format_indexed_result(&IndexKey::from(1..3), 2, empty).unwrap();
        assert_eq!(formatted.shape(), &[0, 0]);

        let empty = ArrayD::<i64>::from_shape_vec(IxDyn(&[0, 4]), vec![]).unwrap();
        let key = IndexKey::Tuple(vec![1.into(), (..).into()]);
        let formatted = format_indexed_result(&key, 2, empty).unwrap();
        assert_eq!(formatted.shape(), &[0]);
    }
}
