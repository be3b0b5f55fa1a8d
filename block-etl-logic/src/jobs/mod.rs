//! Extraction jobs compiled into the crate.

mod address_stats;
mod contracts;
mod export_blocks;
mod export_logs;
mod export_traces;
mod token_transfers;
mod tokens;

pub use address_stats::AddressStatsJob;
pub use contracts::ExtractContractsJob;
pub use export_blocks::ExportBlocksJob;
pub use export_logs::ExportLogsJob;
pub use export_traces::ExportTracesJob;
pub use token_transfers::ExtractTokenTransfersJob;
pub use tokens::ExtractTokensJob;

use crate::job::JobDescriptor;

/// Manifest of the default jobs, in registration order.
pub fn all_jobs() -> Vec<JobDescriptor> {
    vec![
        JobDescriptor::of::<ExportBlocksJob>(),
        JobDescriptor::of::<ExportLogsJob>(),
        JobDescriptor::of::<ExportTracesJob>(),
        JobDescriptor::of::<ExtractContractsJob>(),
        JobDescriptor::of::<ExtractTokenTransfersJob>(),
        JobDescriptor::of::<ExtractTokensJob>(),
        JobDescriptor::of::<AddressStatsJob>(),
    ]
}

