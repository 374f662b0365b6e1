use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(RecordIndex);

/// Wallet account handed out by an identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account(pub Address);

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creator of a record. The ledger marks deleted or placeholder records with
/// the zero address, which is classified as `Absent` once at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum Creator {
    Present(Address),
    Absent,
}

impl Creator {
    pub fn from_address(address: Address) -> Self {
        if address == Address::ZERO {
            Self::Absent
        } else {
            Self::Present(address)
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn address(&self) -> Address {
        match self {
            Self::Present(address) => *address,
            Self::Absent => Address::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub index: RecordIndex,
    pub id: U256,
    pub creator: Creator,
    pub title: String,
    pub body: String,
    /// Amount in 18-decimal base units.
    pub reward: U256,
    /// Unix seconds; zero when the ledger recorded no expiration.
    pub expires_at: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Expiration,
    Reward,
}

impl SortKey {
    pub fn value_of<'a>(&self, record: &'a Record) -> &'a U256 {
        match self {
            Self::Expiration => &record.expires_at,
            Self::Reward => &record.reward,
        }
    }
}
