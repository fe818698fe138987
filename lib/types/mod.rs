//! Identifiers shared by the market, the collateral token and the position
//! ledger

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Bitmask over outcome slots; bit `i` selects outcome `i`
pub type IndexSet = u128;

/// Account or contract identity (20 bytes)
#[derive(
    BorshDeserialize,
    BorshSerialize,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Address(#[serde(with = "hex::serde")] pub [u8; 20]);

impl Address {
    pub const fn new(data: [u8; 20]) -> Self {
        Self(data)
    }

    /// Deterministic address derived from an arbitrary seed
    pub fn from_seed(seed: &[u8]) -> Self {
        let hash = blake3::hash(seed);
        let mut data = [0u8; 20];
        data.copy_from_slice(&hash.as_bytes()[..20]);
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            BorshDeserialize,
            BorshSerialize,
            Clone,
            Copy,
            Debug,
            Default,
            Deserialize,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            Serialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(#[serde(with = "hex::serde")] pub [u8; 32]);

        impl $name {
            pub const fn new(data: [u8; 32]) -> Self {
                Self(data)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl From<blake3::Hash> for $name {
            fn from(hash: blake3::Hash) -> Self {
                Self(*hash.as_bytes())
            }
        }
    };
}

hash_id!(
    /// Question posed to the oracle
    QuestionId
);
hash_id!(
    /// A prepared condition: oracle, question and outcome slot count
    ConditionId
);
hash_id!(
    /// Outcome collection under a condition
    CollectionId
);
hash_id!(
    /// Position: an outcome collection backed by one collateral token
    PositionId
);

impl QuestionId {
    pub fn from_label(label: &str) -> Self {
        blake3::hash(label.as_bytes()).into()
    }
}

impl CollectionId {
    /// The empty collection, i.e. positions backed directly by collateral
    pub const ROOT: Self = Self([0u8; 32]);
}

/// Index set selecting a single outcome
pub const fn index_set(outcome: usize) -> IndexSet {
    1 << outcome
}

/// Index set selecting every one of `outcome_count` outcomes
pub const fn full_index_set(outcome_count: usize) -> IndexSet {
    if outcome_count >= IndexSet::BITS as usize {
        IndexSet::MAX
    } else {
        (1 << outcome_count) - 1
    }
}

/// One singleton index set per outcome: `[1, 2, 4, ...]`
pub fn basic_partition(outcome_count: usize) -> Vec<IndexSet> {
    (0..outcome_count).map(index_set).collect()
}

pub fn condition_id(
    oracle: Address,
    question_id: QuestionId,
    outcome_slot_count: usize,
) -> ConditionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"condition");
    hasher.update(oracle.as_bytes());
    hasher.update(question_id.as_bytes());
    hasher.update(&(outcome_slot_count as u64).to_le_bytes());
    hasher.finalize().into()
}

pub fn collection_id(
    parent: CollectionId,
    condition_id: ConditionId,
    index_set: IndexSet,
) -> CollectionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"collection");
    hasher.update(parent.as_bytes());
    hasher.update(condition_id.as_bytes());
    hasher.update(&index_set.to_le_bytes());
    hasher.finalize().into()
}

pub fn position_id(collateral: Address, collection_id: CollectionId) -> PositionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"position");
    hasher.update(collateral.as_bytes());
    hasher.update(collection_id.as_bytes());
    hasher.finalize().into()
}
