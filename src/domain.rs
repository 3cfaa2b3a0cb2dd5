use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GalleryError;

/// Placeholder identity for tokens and collections whose creator could not
/// be resolved from either data source.
pub const UNKNOWN_CREATOR: &str = "N/A";

/// Originated contract address (`KT1...`) identifying a collection on chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContractAddress {
    type Err = GalleryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = normalized.starts_with("KT1")
            && normalized.len() == 36
            && normalized.chars().all(is_base58);
        if !is_valid {
            return Err(GalleryError::InvalidContractAddress(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

fn is_base58(ch: char) -> bool {
    ch.is_ascii_alphanumeric() && !matches!(ch, '0' | 'O' | 'I' | 'l')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub address: String,
    pub alias: Option<String>,
}

impl Creator {
    pub fn unknown() -> Self {
        Self {
            address: UNKNOWN_CREATOR.to_string(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCreator {
    pub address: String,
    pub alias: Option<String>,
    pub twitter: Option<String>,
}

impl CollectionCreator {
    pub fn unknown() -> Self {
        Self {
            address: UNKNOWN_CREATOR.to_string(),
            alias: None,
            twitter: None,
        }
    }
}

/// One token of a collection, normalized from either provider.
///
/// `image_candidates` and `display_candidates` are ordered gateway URL lists;
/// a token is only produced with a non-empty `image_candidates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nft {
    pub id: i64,
    pub token_id: String,
    pub name: String,
    pub image_candidates: Vec<String>,
    pub display_candidates: Vec<String>,
    pub mime: Option<String>,
    pub contract_address: String,
    pub creator: Creator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    pub address: String,
    pub alias: String,
    pub description: Option<String>,
    pub timestamp: Option<String>,
    pub creator: CollectionCreator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistProfile {
    pub address: String,
    pub alias: String,
    pub avatar_url: String,
    pub objkt_url: String,
    pub twitter: Option<String>,
    pub instagram: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSearchResult {
    pub address: String,
    pub name: String,
    pub description: Option<String>,
    pub logo_candidates: Option<Vec<String>>,
}
