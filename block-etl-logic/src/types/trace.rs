use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_with::{formats::CommaSeparator, serde_as, StringWithSeparator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceType {
    #[default]
    Call,
    Create,
    Suicide,
    Reward,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub block_number: u64,
    pub transaction_hash: Option<B256>,
    pub transaction_index: Option<u64>,
    #[serde_as(as = "StringWithSeparator::<CommaSeparator, u64>")]
    pub trace_address: Vec<u64>,
    pub trace_type: TraceType,
    pub from: Option<Address>,
    /// Callee for calls, created address for creations.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub output: Bytes,
    pub error: Option<String>,
}

impl Trace {
    pub fn is_successful_create(&self) -> bool {
        self.trace_type == TraceType::Create && self.error.is_none() && self.to.is_some()
    }
}
