use crate::array::key::{apply_local_key, format_indexed_result, global_to_local_key, IndexKey};
use crate::array::reduction::{divisor, local_reduce, ReduceOp, ReductionParams};
use crate::array::{
    reshape_owned, Dist, DistArray, DistArrayKind, Distribution, Element, ReplicatedResult,
};
use crate::error::{DistArrayError, DistResult};
use crate::process_group::ProcessGroup;

use ndarray::{ArrayD, Axis};
use std::sync::Arc;

/// An array of which every PE of the group holds an identical full copy.
///
/// Besides being a distribution in its own right, this is the type of every reduction
/// and gather result. Operations on it never communicate.
#[derive(Clone)]
pub struct Undistributed<T: Dist> {
    data: ArrayD<T>,
    group: Arc<ProcessGroup>,
}

impl<T: Dist> std::fmt::Debug for Undistributed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.data)
    }
}

impl<T: Dist> Undistributed<T> {
    /// `data` must already be identical on every PE of `group`.
    pub(crate) fn from_parts(group: Arc<ProcessGroup>, data: ArrayD<T>) -> Undistributed<T> {
        Undistributed { data, group }
    }

    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn into_data(self) -> ArrayD<T> {
        self.data
    }

    /// Elements in row major order
    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// The single element of a one element array (e.g. a reduction over all axes).
    pub fn item(&self) -> DistResult<T> {
        match self.data.len() {
            1 => Ok(self.to_vec().remove(0)),
            len => Err(DistArrayError::NotSupported(format!(
                "item() on an array of {} elements",
                len
            ))),
        }
    }
}

impl<T: Element> Undistributed<T> {
    pub fn reshape(&self, shape: &[usize]) -> DistResult<Undistributed<T>> {
        Ok(Undistributed::from_parts(
            self.group.clone(),
            reshape_owned(self.data.clone(), shape)?,
        ))
    }

    fn reduce(&self, op: ReduceOp, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        let axis = params.check(self.data.ndim())?;
        Ok(Undistributed::from_parts(
            self.group.clone(),
            local_reduce(&self.data, op, axis),
        ))
    }

    fn mean_f64(&self, data: &ArrayD<f64>, axis: Option<usize>) -> ArrayD<f64> {
        let count = divisor(self.data.shape(), axis);
        local_reduce(data, ReduceOp::Sum, axis).mapv(|s| s / count)
    }
}

impl<T: Element> DistArray<T> for Undistributed<T> {
    fn distribution(&self) -> Distribution {
        Distribution::Undistributed
    }

    fn group(&self) -> &Arc<ProcessGroup> {
        &self.group
    }

    fn local_data(&self) -> &ArrayD<T> {
        &self.data
    }

    fn global_shape(&self) -> DistResult<&[usize]> {
        Ok(self.data.shape())
    }

    fn global_size(&self) -> DistResult<usize> {
        Ok(self.data.len())
    }

    fn global_nbytes(&self) -> DistResult<usize> {
        Ok(self.data.len() * std::mem::size_of::<T>())
    }

    fn global_ndim(&self) -> DistResult<usize> {
        Ok(self.data.ndim())
    }

    fn get(&self, key: &IndexKey) -> DistResult<ReplicatedResult<T>> {
        let local_key = global_to_local_key(key, self.data.shape(), None)?;
        let selected = apply_local_key(&self.data, &local_key);
        Ok(Undistributed::from_parts(
            self.group.clone(),
            format_indexed_result(key, self.data.ndim(), selected)?,
        ))
    }

    fn sum_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        self.reduce(ReduceOp::Sum, params)
    }

    fn min_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        self.reduce(ReduceOp::Min, params)
    }

    fn max_with(&self, params: ReductionParams<T>) -> DistResult<ReplicatedResult<T>> {
        self.reduce(ReduceOp::Max, params)
    }

    fn mean_with(&self, params: ReductionParams<f64>) -> DistResult<ReplicatedResult<f64>> {
        let axis = params.check(self.data.ndim())?;
        let data = self.data.mapv(Element::as_f64);
        Ok(Undistributed::from_parts(
            self.group.clone(),
            self.mean_f64(&data, axis),
        ))
    }

    fn std_with(&self, params: ReductionParams<f64>) -> DistResult<ReplicatedResult<f64>> {
        let axis = params.check(self.data.ndim())?;
        let data = self.data.mapv(Element::as_f64);
        let mean = self.mean_f64(&data, axis);
        let centered = match axis {
            None => {
                let mean = mean.iter().copied().next().unwrap_or(0.0);
                data.mapv(|x| x - mean)
            }
            Some(k) => &data - &mean.insert_axis(Axis(k)),
        };
        let count = divisor(self.data.shape(), axis);
        let std = local_reduce(&centered.mapv(|d| d * d), ReduceOp::Sum, axis)
            .mapv(|ss| (ss / count).sqrt());
        Ok(Undistributed::from_parts(self.group.clone(), std))
    }

    fn collect_data(&self) -> DistResult<ReplicatedResult<T>> {
        Ok(self.clone())
    }

    fn reshape(&self, shape: &[usize]) -> DistResult<DistArrayKind<T>> {
        Undistributed::reshape(self, shape).map(DistArrayKind::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::key::AxisKey;
    use crate::comm::{Backend, Comm};
    use ndarray::IxDyn;

    fn replicated(data: Vec<f64>, shape: &[usize]) -> Undistributed<f64> {
        let mut comms = Comm::create_group(Backend::Local, 1);
        let group = Arc::new(ProcessGroup::new(comms.remove(0)));
        Undistributed::from_parts(group, ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
    }

    #[test]
    fn reductions_are_local() {
        let array = replicated(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(array.sum(None).unwrap().item().unwrap(), 21.0);
        assert_eq!(array.sum(Some(0)).unwrap().to_vec(), vec![5.0, 7.0, 9.0]);
        assert_eq!(array.max(Some(1)).unwrap().to_vec(), vec![3.0, 6.0]);
        assert_eq!(array.mean(Some(1)).unwrap().to_vec(), vec![2.0, 5.0]);
        assert_eq!(array.std(Some(0)).unwrap().to_vec(), vec![1.5, 1.5, 1.5]);
        assert!(matches!(
            array.sum(Some(2)),
            Err(DistArrayError::InvalidReductionParameter(_))
        ));
    }

    #[test]
    fn indexing_and_reshape() {
        let array = replicated((0..6).map(|x| x as f64).collect(), &[2, 3]);
        let row = array.get(&IndexKey::Index(-1)).unwrap();
        assert_eq!(row.to_vec(), vec![3.0, 4.0, 5.0]);
        let elem = array
            .get(&IndexKey::Tuple(vec![AxisKey::Index(1), AxisKey::Index(2)]))
            .unwrap();
        assert_eq!(elem.shape(), &[1]);
        assert_eq!(elem.item().unwrap(), 5.0);
        let reshaped = array.reshape(&[3, 2]).unwrap();
        assert_eq!(reshaped.global_shape().unwrap(), &[3, 2]);
        assert!(array.reshape(&[4]).is_err());
        assert!(array.item().is_err());
    }
}
