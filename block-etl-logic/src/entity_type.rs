use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{borrow::Cow, fmt};

/// Name of a kind of derived record (e.g. `contract`, `token_transfer`).
///
/// Used as a key of the shared buffer and of the registry indices.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    pub const fn new_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Serialize for EntityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(known(&name).unwrap_or_else(|| EntityType::new(name)))
    }
}

pub const BLOCK: EntityType = EntityType::new_static("block");
pub const TRANSACTION: EntityType = EntityType::new_static("transaction");
pub const LOG: EntityType = EntityType::new_static("log");
pub const TRACE: EntityType = EntityType::new_static("trace");
pub const CONTRACT: EntityType = EntityType::new_static("contract");
pub const TOKEN_TRANSFER: EntityType = EntityType::new_static("token_transfer");
pub const TOKEN: EntityType = EntityType::new_static("token");
pub const ADDRESS_STATS: EntityType = EntityType::new_static("address_stats");

/// How the persistence layer writes rows of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    InsertOnly,
    /// Update the existing row when the predicate holds for it.
    UpdateOnConflict { predicate: &'static str },
}

pub struct EntityTypeInfo {
    pub entity_type: EntityType,
    pub conflict_policy: ConflictPolicy,
}

pub static CATALOG: &[EntityTypeInfo] = &[
    EntityTypeInfo {
        entity_type: BLOCK,
        conflict_policy: ConflictPolicy::UpdateOnConflict {
            predicate: "EXCLUDED.hash <> blocks.hash",
        },
    },
    EntityTypeInfo {
        entity_type: TRANSACTION,
        conflict_policy: ConflictPolicy::UpdateOnConflict {
            predicate: "EXCLUDED.block_number <> transactions.block_number",
        },
    },
    EntityTypeInfo {
        entity_type: LOG,
        conflict_policy: ConflictPolicy::InsertOnly,
    },
    EntityTypeInfo {
        entity_type: TRACE,
        conflict_policy: ConflictPolicy::InsertOnly,
    },
    EntityTypeInfo {
        entity_type: CONTRACT,
        conflict_policy: ConflictPolicy::UpdateOnConflict {
            predicate: "EXCLUDED.block_number > contracts.block_number",
        },
    },
    EntityTypeInfo {
        entity_type: TOKEN_TRANSFER,
        conflict_policy: ConflictPolicy::InsertOnly,
    },
    EntityTypeInfo {
        entity_type: TOKEN,
        conflict_policy: ConflictPolicy::UpdateOnConflict {
            predicate: "tokens.decimals IS NULL OR tokens.symbol IS NULL",
        },
    },
    EntityTypeInfo {
        entity_type: ADDRESS_STATS,
        conflict_policy: ConflictPolicy::UpdateOnConflict {
            predicate: "EXCLUDED.last_block_number >= address_stats.last_block_number",
        },
    },
];

/// Look up one of the entity types the crate knows about.
pub fn known(name: &str) -> Option<EntityType> {
    CATALOG
        .iter()
        .find(|info| info.entity_type.name() == name)
        .map(|info| info.entity_type.clone())
}

pub fn conflict_policy(entity_type: &EntityType) -> ConflictPolicy {
    CATALOG
        .iter()
        .find(|info| &info.entity_type == entity_type)
        .map(|info| info.conflict_policy)
        .unwrap_or(ConflictPolicy::InsertOnly)
}
