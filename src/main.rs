use distarray::array::prelude::*;
use distarray::config;

use anyhow::Context;
use ndarray::{ArrayD, IxDyn};
use tracing_subscriber::EnvFilter;

const ROWS: usize = 5;
const COLS: usize = 4;

fn run(world: DistWorld) -> anyhow::Result<()> {
    let my_pe = world.my_pe();
    let data = (my_pe == 0).then(|| {
        ArrayD::from_shape_fn(IxDyn(&[ROWS, COLS]), |idx| (idx[0] * COLS + idx[1]) as f64)
    });
    let array = array(world.group(), data, 0, &config().distribution)
        .context("failed to distribute the input")?;
    if let Some(block) = array.as_row_block() {
        tracing::info!(
            pe = my_pe,
            local_to_global = ?block.local_to_global(),
            row_counts = ?block.row_counts(),
            "local block"
        );
    }

    let column_sums = array.sum(Some(0))?;
    let row_sums = array.sum(Some(1))?;
    let mean = array.mean(None)?.item()?;
    let std = array.std(Some(0))?;
    let last_row = array.get(&IndexKey::Index(-1))?;
    let flat = array.reshape(&[ROWS * COLS])?;
    let collected = flat.collect_data()?;
    let flat_shape = flat.global_shape()?.to_vec();
    world.barrier()?;

    if my_pe == 0 {
        tracing::info!(sums = ?column_sums.to_vec(), "sum(axis=0)");
        tracing::info!(sums = ?row_sums.to_vec(), "sum(axis=1)");
        tracing::info!(mean, std = ?std.to_vec(), "statistics");
        tracing::info!(row = ?last_row.to_vec(), "a[-1]");
        tracing::info!(shape = ?flat_shape, data = ?collected.to_vec(), "reshaped");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_names(true)
        .init();

    let num_pes = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<usize>())
        .transpose()
        .context("the first argument must be the number of pes")?
        .unwrap_or(3);

    let results = DistWorldBuilder::new()
        .with_backend(Backend::Channel)
        .with_num_pes(num_pes)
        .launch(run);
    for (pe, result) in results.into_iter().enumerate() {
        result.with_context(|| format!("pe {} failed", pe))?;
    }
    Ok(())
}
