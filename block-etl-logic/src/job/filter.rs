use alloy::primitives::{Address, B256};
use std::collections::BTreeSet;

/// Declarative narrowing of raw data.
///
/// `None` means "everything" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFilter {
    pub addresses: Option<BTreeSet<Address>>,
    pub topics: Option<BTreeSet<B256>>,
}

impl DataFilter {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn with_topics(topics: impl IntoIterator<Item = B256>) -> Self {
        Self {
            addresses: None,
            topics: Some(topics.into_iter().collect()),
        }
    }

    pub fn with_addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            addresses: Some(addresses.into_iter().collect()),
            topics: None,
        }
    }

    /// Union of two filters: data matching either of them passes.
    pub fn merge(self, other: DataFilter) -> DataFilter {
        fn union<T: Ord>(a: Option<BTreeSet<T>>, b: Option<BTreeSet<T>>) -> Option<BTreeSet<T>> {
            match (a, b) {
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Some(a)
                }
                _ => None,
            }
        }
        DataFilter {
            addresses: union(self.addresses, other.addresses),
            topics: union(self.topics, other.topics),
        }
    }

    pub fn matches_address(&self, address: &Address) -> bool {
        self.addresses
            .as_ref()
            .is_none_or(|addresses| addresses.contains(address))
    }

    pub fn matches_log(&self, address: &Address, topic0: Option<&B256>) -> bool {
        let topic_matches = match (&self.topics, topic0) {
            (None, _) => true,
            (Some(topics), Some(topic0)) => topics.contains(topic0),
            (Some(_), None) => false,
        };
        topic_matches && self.matches_address(address)
    }

    pub fn is_everything(&self) -> bool {
        self.addresses.is_none() && self.topics.is_none()
    }
}
