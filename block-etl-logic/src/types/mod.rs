mod address_stats;
mod block;
mod contract;
mod log;
mod token;
mod token_transfer;
mod trace;
mod transaction;

pub use address_stats::AddressStats;
pub use block::Block;
pub use contract::Contract;
pub use log::Log;
pub use token::{Token, TokenType};
pub use token_transfer::{TokenTransfer, TRANSFER_EVENT_TOPIC};
pub use trace::{Trace, TraceType};
pub use transaction::Transaction;

use crate::entity_type::{self, EntityType};
use serde::{Deserialize, Serialize};

/// Typed record that can be stored in the shared buffer.
pub trait EntityRecord: Sized + Into<Entity> {
    const ENTITY_TYPE: EntityType;

    fn from_entity(entity: Entity) -> Option<Self>;
}

macro_rules! entities {
    ($($variant:ident => $entity_type:path),+ $(,)?) => {
        /// Any record produced or consumed by jobs.
        ///
        /// Serialized with an explicit `kind` tag, so the representation
        /// is self-describing in the distributed buffer and in sinks.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(tag = "kind", rename_all = "snake_case")]
        pub enum Entity {
            $($variant($variant),)+
        }

        impl Entity {
            pub fn entity_type(&self) -> EntityType {
                match self {
                    $(Entity::$variant(_) => $entity_type,)+
                }
            }

            /// Decode a csv row as the record of `entity_type`.
            ///
            /// `None` when the type has no record representation.
            pub fn from_csv_record(
                entity_type: &EntityType,
                record: &csv::StringRecord,
                headers: &csv::StringRecord,
            ) -> Option<Result<Entity, csv::Error>> {
                $(
                    if *entity_type == $entity_type {
                        return Some(
                            record
                                .deserialize::<$variant>(Some(headers))
                                .map(Entity::from),
                        );
                    }
                )+
                None
            }
        }

        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Entity::$variant(value)
                }
            }

            impl EntityRecord for $variant {
                const ENTITY_TYPE: EntityType = $entity_type;

                fn from_entity(entity: Entity) -> Option<Self> {
                    match entity {
                        Entity::$variant(value) => Some(value),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )+
    };
}

entities!(
    Block => entity_type::BLOCK,
    Transaction => entity_type::TRANSACTION,
    Log => entity_type::LOG,
    Trace => entity_type::TRACE,
    Contract => entity_type::CONTRACT,
    TokenTransfer => entity_type::TOKEN_TRANSFER,
    Token => entity_type::TOKEN,
    AddressStats => entity_type::ADDRESS_STATS,
);

impl Entity {
    /// Block the record belongs to, used to select rows of a pass range.
    pub fn block_number(&self) -> u64 {
        match self {
            Entity::Block(b) => b.number,
            Entity::Transaction(t) => t.block_number,
            Entity::Log(l) => l.block_number,
            Entity::Trace(t) => t.block_number,
            Entity::Contract(c) => c.block_number,
            Entity::TokenTransfer(t) => t.block_number,
            Entity::Token(t) => t.block_number,
            Entity::AddressStats(s) => s.last_block_number,
        }
    }
}
