use distarray::array::prelude::*;
use ndarray::{ArrayD, Axis, IxDyn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serial_test::serial;
use std::sync::Arc;

fn random_f64(shape: &[usize], seed: u64) -> ArrayD<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayD::from_shape_fn(IxDyn(shape), |_| rng.gen_range(-100.0..100.0))
}

fn random_i64(shape: &[usize], seed: u64) -> ArrayD<i64> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayD::from_shape_fn(IxDyn(shape), |_| rng.gen_range(-1000..1000))
}

fn assert_close(result: &ReplicatedResult<f64>, expected: &ArrayD<f64>) {
    assert_eq!(result.shape(), expected.shape());
    for (r, e) in result.data().iter().zip(expected.iter()) {
        assert!(
            (r - e).abs() <= 1e-9 * e.abs().max(1.0),
            "{} != {} (result {:?}, expected {:?})",
            r,
            e,
            result,
            expected
        );
    }
}

fn scalar<T: Clone>(value: T) -> ArrayD<T> {
    ArrayD::from_elem(IxDyn(&[1]), value)
}

fn check_float_reductions(num_pes: usize, shape: &[usize]) {
    let expected = random_f64(shape, 42);
    let results = distarray::launch(num_pes, |world| {
        let data = (world.my_pe() == 0).then(|| expected.clone());
        let array = array(world.group(), data, 0, "b").unwrap();

        assert_close(&array.sum(None).unwrap(), &scalar(expected.sum()));
        assert_close(&array.mean(None).unwrap(), &scalar(expected.mean().unwrap()));
        let mean = expected.mean().unwrap();
        let variance = expected.mapv(|x| (x - mean) * (x - mean)).sum() / expected.len() as f64;
        assert_close(&array.std(None).unwrap(), &scalar(variance.sqrt()));
        let min = expected.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = expected.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(array.min(None).unwrap().item().unwrap(), min);
        assert_eq!(array.max(None).unwrap().item().unwrap(), max);

        let mut values = vec![];
        for axis in 0..shape.len() {
            let ax = Axis(axis);
            let sum = array.sum(Some(axis as isize)).unwrap();
            assert_close(&sum, &expected.sum_axis(ax));
            assert_close(&array.mean(Some(axis as isize)).unwrap(), &expected.mean_axis(ax).unwrap());
            assert_close(&array.std(Some(axis as isize)).unwrap(), &expected.std_axis(ax, 0.0));
            let min = array.min(Some(axis as isize)).unwrap();
            assert_eq!(min.data(), &expected.fold_axis(ax, f64::INFINITY, |a, b| a.min(*b)));
            let max = array.max(Some(axis as isize)).unwrap();
            assert_eq!(max.data(), &expected.fold_axis(ax, f64::NEG_INFINITY, |a, b| a.max(*b)));
            values.extend(sum.to_vec());
        }
        let last = array.sum(Some(-1)).unwrap();
        assert_close(&last, &expected.sum_axis(Axis(shape.len() - 1)));
        values
    });
    // every pe folds the contributions in the same order
    for result in &results {
        assert_eq!(result, &results[0]);
    }
}

fn check_int_reductions(num_pes: usize, shape: &[usize]) {
    let expected = random_i64(shape, 7);
    distarray::launch(num_pes, |world| {
        let data = (world.my_pe() == 0).then(|| expected.clone());
        let array = array(world.group(), data, 0, "b").unwrap();
        assert_eq!(array.sum(None).unwrap().item().unwrap(), expected.sum());
        for axis in 0..shape.len() {
            let ax = Axis(axis);
            assert_eq!(array.sum(Some(axis as isize)).unwrap().data(), &expected.sum_axis(ax));
            assert_eq!(
                array.min(Some(axis as isize)).unwrap().data(),
                &expected.fold_axis(ax, i64::MAX, |a, b| *a.min(b))
            );
            assert_eq!(
                array.max(Some(axis as isize)).unwrap().data(),
                &expected.fold_axis(ax, i64::MIN, |a, b| *a.max(b))
            );
        }
    });
}

macro_rules! reduction_tests {
    ($num_pes:literal, $rows:literal, $cols:literal) => {
        paste::paste! {
            #[test]
            #[serial]
            fn [<f64_reductions_ $num_pes _pes_ $rows x $cols>]() {
                check_float_reductions($num_pes, &[$rows, $cols]);
            }

            #[test]
            #[serial]
            fn [<i64_reductions_ $num_pes _pes_ $rows x $cols>]() {
                check_int_reductions($num_pes, &[$rows, $cols]);
            }
        }
    };
}

reduction_tests!(1, 5, 4);
reduction_tests!(2, 5, 4);
reduction_tests!(3, 5, 4);
reduction_tests!(4, 5, 4);
reduction_tests!(5, 5, 4);
reduction_tests!(3, 17, 3);
reduction_tests!(4, 2, 6);
reduction_tests!(5, 3, 1);

#[test]
#[serial]
fn reductions_over_rank_three() {
    for num_pes in 1..=4 {
        check_float_reductions(num_pes, &[6, 3, 2]);
        check_int_reductions(num_pes, &[5, 2, 3]);
    }
}

#[test]
#[serial]
fn one_dimensional_arrays() {
    for num_pes in 1..=5 {
        check_float_reductions(num_pes, &[11]);
    }
}

#[test]
#[serial]
fn invalid_parameters_fail_on_every_pe() {
    let errors = distarray::launch(3, |world| {
        let array = ones::<f64>(world.group(), Some(&[5, 4][..]), 0, "b").unwrap();
        let out = array.sum_with(ReductionParams::new().with_out(ArrayD::zeros(IxDyn(&[4]))));
        assert!(matches!(out, Err(DistArrayError::NotSupported(_))));
        let keepdims = array.max_with(ReductionParams::new().with_axis(0).with_keepdims(true));
        assert!(matches!(keepdims, Err(DistArrayError::NotSupported(_))));
        let axis = array.mean(Some(2));
        assert!(matches!(axis, Err(DistArrayError::InvalidReductionParameter(_))));
        // the group is still usable afterwards
        array.sum(Some(-2)).unwrap().to_vec()
    });
    for result in errors {
        assert_eq!(result, vec![5.0; 4]);
    }
}

#[test]
#[serial]
fn rejected_parameters_issue_no_collective() {
    // from_local arrays compute their global shape lazily, with a collective
    let results = distarray::launch(2, |world| {
        let my_pe = world.my_pe();
        let local = ArrayD::from_elem(IxDyn(&[2, 3]), my_pe as i64 + 1);
        let array = RowBlock::from_local(Arc::clone(world.group()), local).unwrap();
        if my_pe == 0 {
            let out = array.sum_with(ReductionParams::new().with_out(ArrayD::zeros(IxDyn(&[3]))));
            assert!(matches!(out, Err(DistArrayError::NotSupported(_))));
            let keepdims = array.mean_with(ReductionParams::new().with_keepdims(true));
            assert!(matches!(keepdims, Err(DistArrayError::NotSupported(_))));
            let axis = array.std_with(ReductionParams::new().with_axis(-3));
            assert!(matches!(axis, Err(DistArrayError::InvalidReductionParameter(_))));
        }
        let gathered = world.group().all_gather(&(my_pe + 100)).unwrap();
        assert_eq!(gathered, vec![100, 101]);
        (array.sum(Some(0)).unwrap().to_vec(), array.global_shape().unwrap().to_vec())
    });
    for (sums, shape) in results {
        assert_eq!(sums, vec![6, 6, 6]);
        assert_eq!(shape, vec![4, 3]);
    }
}
