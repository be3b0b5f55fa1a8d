use crate::settings::{IndexerSettings, Settings};
use anyhow::Context;
use block_etl_logic::{
    provider::{ChainDataProvider, RpcChainDataProvider},
    sink::{drain_buffer, EntitySink, JsonLinesSink},
    BlockRange, JobRunner, Scheduler,
};
use std::sync::Arc;

/// Index the configured block range into json lines files.
pub async fn run(settings: Settings) -> Result<(), anyhow::Error> {
    let provider = Arc::new(RpcChainDataProvider::new(settings.rpc.url.clone()));
    let sink = JsonLinesSink::new(&settings.output.directory)
        .await
        .context("output directory initialization failed")?;
    run_with_provider(settings, provider, &sink).await
}

pub async fn run_with_provider(
    settings: Settings,
    provider: Arc<dyn ChainDataProvider>,
    sink: &dyn EntitySink,
) -> Result<(), anyhow::Error> {
    let passes = passes(&settings.indexer)?;
    let scheduler = Scheduler::new(settings.pipeline.clone())?;
    let mut runner = scheduler.build_runner(provider).await?;

    let result = index(&mut runner, passes, sink).await;
    runner.context().executor.shutdown();
    result
}

fn passes(settings: &IndexerSettings) -> Result<Vec<BlockRange>, anyhow::Error> {
    if settings.start_block > settings.end_block {
        anyhow::bail!(
            "start block {} is greater than end block {}",
            settings.start_block,
            settings.end_block
        );
    }
    if settings.blocks_per_pass == 0 {
        anyhow::bail!("blocks per pass must be positive");
    }
    let blocks_per_pass = usize::try_from(settings.blocks_per_pass).unwrap_or(usize::MAX);
    Ok(BlockRange::new(settings.start_block, settings.end_block).chunks(blocks_per_pass))
}

async fn index(
    runner: &mut JobRunner,
    passes: Vec<BlockRange>,
    sink: &dyn EntitySink,
) -> Result<(), anyhow::Error> {
    tracing::info!(
        jobs = ?runner.pipeline().job_names(),
        passes = passes.len(),
        "starting indexer"
    );
    for range in passes {
        let report = runner.run(range.start, range.end).await?;
        let written = drain_buffer(
            runner.context().buffer.as_ref(),
            &runner.pipeline().output_types,
            sink,
        )
        .await?;
        tracing::info!(
            start_block = range.start,
            end_block = range.end,
            written = ?written,
            "pass finished"
        );
        if !report.is_complete() {
            anyhow::bail!(
                "jobs {:?} ran out of retries on blocks {}",
                report.exhausted_jobs,
                range
            );
        }
    }
    tracing::info!("indexing finished");
    Ok(())
}
