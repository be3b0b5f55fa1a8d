use blockscout_service_launcher::{
    launcher::ConfigSettings,
    tracing::{JaegerSettings, TracingSettings},
};
use block_etl_logic::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub rpc: RpcSettings,
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "BLOCK_ETL";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RpcSettings {
    pub url: Url,
}

/// Blocks to index, both ends inclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IndexerSettings {
    pub start_block: u64,
    pub end_block: u64,
    #[serde(default = "default_blocks_per_pass")]
    pub blocks_per_pass: u64,
}

fn default_blocks_per_pass() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

impl Settings {
    pub fn default(rpc_url: Url, start_block: u64, end_block: u64) -> Self {
        Self {
            rpc: RpcSettings { url: rpc_url },
            indexer: IndexerSettings {
                start_block,
                end_block,
                blocks_per_pass: default_blocks_per_pass(),
            },
            pipeline: Default::default(),
            output: Default::default(),
            tracing: Default::default(),
            jaeger: Default::default(),
        }
    }
}
