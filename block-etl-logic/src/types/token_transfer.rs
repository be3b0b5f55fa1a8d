use super::{Log, TokenType};
use alloy::primitives::{b256, Address, B256, U256};
use serde::{Deserialize, Serialize};

/// `Transfer(address,address,uint256)`, shared by ERC-20 and ERC-721.
pub const TRANSFER_EVENT_TOPIC: B256 =
    b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    /// Amount for ERC-20, token id for ERC-721.
    pub value: U256,
    pub token_type: TokenType,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

fn topic_address(topic: &B256) -> Address {
    Address::from_word(*topic)
}

impl TokenTransfer {
    /// Decode a `Transfer` log. ERC-20 keeps the amount in data,
    /// ERC-721 indexes the token id as the fourth topic.
    pub fn from_log(log: &Log) -> Option<Self> {
        if log.topic0() != Some(&TRANSFER_EVENT_TOPIC) {
            return None;
        }
        let (token_type, value) = match log.topics.len() {
            3 if log.data.len() == 32 => (TokenType::Erc20, U256::from_be_slice(&log.data)),
            4 if log.data.is_empty() => (TokenType::Erc721, U256::from_be_bytes(log.topics[3].0)),
            _ => return None,
        };
        Some(Self {
            token_address: log.address,
            from: topic_address(&log.topics[1]),
            to: topic_address(&log.topics[2]),
            value,
            token_type,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes};

    fn transfer_log(topics: Vec<B256>, data: Vec<u8>) -> Log {
        Log {
            block_number: 10,
            log_index: 3,
            address: address!("0x00000000000000000000000000000000000000aa"),
            topics,
            data: Bytes::from(data),
            ..Default::default()
        }
    }

    fn address_topic(address: Address) -> B256 {
        address.into_word()
    }

    #[test]
    fn decodes_erc20_transfer() {
        let from = address!("0x00000000000000000000000000000000000000b1");
        let to = address!("0x00000000000000000000000000000000000000b2");
        let log = transfer_log(
            vec![TRANSFER_EVENT_TOPIC, address_topic(from), address_topic(to)],
            U256::from(1234).to_be_bytes_vec(),
        );

        let transfer = TokenTransfer::from_log(&log).unwrap();
        assert_eq!(transfer.token_type, TokenType::Erc20);
        assert_eq!(transfer.from, from);
        assert_eq!(transfer.to, to);
        assert_eq!(transfer.value, U256::from(1234));
        assert_eq!(transfer.log_index, 3);
    }

    #[test]
    fn decodes_erc721_transfer() {
        let log = transfer_log(
            vec![
                TRANSFER_EVENT_TOPIC,
                B256::ZERO,
                address_topic(address!("0x00000000000000000000000000000000000000b2")),
                B256::from(U256::from(77)),
            ],
            vec![],
        );

        let transfer = TokenTransfer::from_log(&log).unwrap();
        assert_eq!(transfer.token_type, TokenType::Erc721);
        assert_eq!(transfer.from, Address::ZERO);
        assert_eq!(transfer.value, U256::from(77));
    }

    #[test]
    fn skips_other_events() {
        let log = transfer_log(vec![B256::repeat_byte(1)], vec![]);
        assert!(TokenTransfer::from_log(&log).is_none());

        let malformed = transfer_log(vec![TRANSFER_EVENT_TOPIC], vec![0; 32]);
        assert!(TokenTransfer::from_log(&malformed).is_none());
    }
}
