mod indexer;
mod settings;

pub use indexer::{run, run_with_provider};
pub use settings::{IndexerSettings, OutputSettings, RpcSettings, Settings};
