use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStats {
    pub address: Address,
    pub transactions_sent: u64,
    pub transactions_received: u64,
    pub token_transfers_in: u64,
    pub token_transfers_out: u64,
    pub last_block_number: u64,
}
