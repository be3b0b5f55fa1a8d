use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_with::{formats::CommaSeparator, serde_as, StringWithSeparator};

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub log_index: u64,
    pub address: Address,
    // flat representation keeps the record usable as a csv row
    #[serde_as(as = "StringWithSeparator::<CommaSeparator, B256>")]
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl Log {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}
