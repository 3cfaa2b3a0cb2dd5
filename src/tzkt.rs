use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::warn;

use crate::domain::{
    CollectionCreator, ContractAddress, ContractInfo, Creator, Nft, UNKNOWN_CREATOR,
};
use crate::error::GalleryError;
use crate::ipfs::normalize_uri;

pub const DEFAULT_ENDPOINT: &str = "https://api.tzkt.io/v1";
pub const COLLECTION_TOKEN_LIMIT: u32 = 500;

/// TzKT indexes on-chain state only, so collection descriptions are not
/// available through it.
const TZKT_DESCRIPTION: &str = "Description not available via TzKT. Try searching on objkt.com.";

#[derive(Debug, Deserialize)]
pub struct ContractRecord {
    pub alias: Option<String>,
    pub creator: Option<AccountRef>,
}

#[derive(Debug, Deserialize)]
pub struct AccountRef {
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountRecord {
    pub address: Option<String>,
    pub alias: Option<String>,
    pub domain: Option<DomainRef>,
}

#[derive(Debug, Deserialize)]
pub struct DomainRef {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRecord {
    pub id: i64,
    pub contract: ContractRef,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    pub metadata: Option<TokenMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct ContractRef {
    pub address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub display_uri: Option<String>,
    pub artifact_uri: Option<String>,
    pub thumbnail_uri: Option<String>,
    pub creators: Option<Vec<String>>,
}

fn pick_uri<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|uri| *uri)
        .find(|uri| !uri.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn account_display_alias(account: AccountRecord) -> Option<String> {
    non_empty(account.alias).or_else(|| account.domain.and_then(|domain| non_empty(domain.name)))
}

/// Builds the alias lookup from a batch account response, keyed by address.
pub fn alias_map_from_accounts(accounts: Vec<AccountRecord>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for account in accounts {
        let Some(address) = account.address.clone() else {
            continue;
        };
        if let Some(alias) = account_display_alias(account) {
            map.insert(address, alias);
        }
    }
    map
}

/// Normalizes a TzKT token page: tokens without a metadata name are dropped,
/// creator aliases come from the pre-resolved batch map, and tokens without a
/// displayable image candidate are dropped last.
pub fn nfts_from_records(
    records: Vec<TokenRecord>,
    aliases: &HashMap<String, String>,
) -> Vec<Nft> {
    records
        .into_iter()
        .filter_map(|token| {
            let metadata = token.metadata?;
            let name = non_empty(metadata.name)?;
            let image_candidates = normalize_uri(pick_uri(&[
                metadata.thumbnail_uri.as_deref(),
                metadata.display_uri.as_deref(),
                metadata.artifact_uri.as_deref(),
            ]))?;
            let display_candidates = normalize_uri(pick_uri(&[
                metadata.display_uri.as_deref(),
                metadata.artifact_uri.as_deref(),
            ]))
            .unwrap_or_default();
            let creator_address = metadata
                .creators
                .as_ref()
                .and_then(|creators| creators.first())
                .filter(|address| !address.is_empty())
                .cloned();
            let creator = match creator_address {
                Some(address) => Creator {
                    alias: aliases.get(&address).cloned(),
                    address,
                },
                None => Creator::unknown(),
            };
            Some(Nft {
                id: token.id,
                token_id: token.token_id,
                name,
                image_candidates,
                display_candidates,
                mime: None,
                contract_address: token.contract.address,
                creator,
            })
        })
        .collect()
}

/// First creator address of every named token, de-duplicated in first-seen
/// order, ready for one batch account lookup.
pub fn creator_addresses(records: &[TokenRecord]) -> Vec<String> {
    let mut addresses: Vec<String> = Vec::new();
    for token in records {
        let Some(metadata) = token.metadata.as_ref() else {
            continue;
        };
        if non_empty(metadata.name.clone()).is_none() {
            continue;
        }
        let Some(address) = metadata
            .creators
            .as_ref()
            .and_then(|creators| creators.first())
            .filter(|address| !address.is_empty())
        else {
            continue;
        };
        if !addresses.contains(address) {
            addresses.push(address.clone());
        }
    }
    addresses
}

/// Builds the canonical contract record from the raw contract entry and the
/// optional creator account lookup.
pub fn contract_info_from_records(
    address: &ContractAddress,
    contract: ContractRecord,
    account: Option<AccountRecord>,
) -> ContractInfo {
    let alias =
        non_empty(contract.alias).unwrap_or_else(|| "Unnamed Collection".to_string());
    let creator_address = contract
        .creator
        .and_then(|creator| non_empty(creator.address));
    match creator_address {
        Some(creator_address) => ContractInfo {
            address: address.to_string(),
            alias,
            description: Some(TZKT_DESCRIPTION.to_string()),
            timestamp: None,
            creator: CollectionCreator {
                address: creator_address,
                alias: account.and_then(account_display_alias),
                twitter: None,
            },
        },
        None => ContractInfo {
            address: address.to_string(),
            alias,
            description: None,
            timestamp: None,
            creator: CollectionCreator {
                address: UNKNOWN_CREATOR.to_string(),
                alias: None,
                twitter: None,
            },
        },
    }
}

/// Secondary metadata source: the TzKT chain indexer.
pub trait TzktClient: Send + Sync {
    fn contract_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError>;
    fn tokens(&self, address: &ContractAddress, limit: u32) -> Result<Vec<Nft>, GalleryError>;
}

impl<C: TzktClient + ?Sized> TzktClient for std::sync::Arc<C> {
    fn contract_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError> {
        (**self).contract_info(address)
    }

    fn tokens(&self, address: &ContractAddress, limit: u32) -> Result<Vec<Nft>, GalleryError> {
        (**self).tokens(address, limit)
    }
}

#[derive(Clone)]
pub struct TzktHttpClient {
    client: Client,
    base_url: String,
}

impl TzktHttpClient {
    pub fn new() -> Result<Self, GalleryError> {
        Self::with_base_url(DEFAULT_ENDPOINT)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, GalleryError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("newtro-gallery/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GalleryError::TzktHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| GalleryError::TzktHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GalleryError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| GalleryError::TzktHttp(err.to_string()))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, GalleryError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "tzkt request failed".to_string());
        Err(GalleryError::TzktStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, GalleryError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(GalleryError::TzktHttp(err.to_string()));
                }
            }
        }
    }
}

impl TzktClient for TzktHttpClient {
    fn contract_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError> {
        let contract: ContractRecord =
            self.get_json(&format!("{}/contracts/{}", self.base_url, address))?;
        let creator_address = contract
            .creator
            .as_ref()
            .and_then(|creator| creator.address.as_deref())
            .filter(|creator| !creator.is_empty())
            .map(str::to_string);
        let account = match creator_address {
            Some(creator_address) => {
                // A failed account lookup degrades to an aliasless creator.
                match self.get_json::<AccountRecord>(&format!(
                    "{}/accounts/{}",
                    self.base_url, creator_address
                )) {
                    Ok(account) => Some(account),
                    Err(err) => {
                        warn!(creator = %creator_address, error = %err, "creator account lookup failed");
                        Some(AccountRecord::default())
                    }
                }
            }
            None => None,
        };
        Ok(contract_info_from_records(address, contract, account))
    }

    fn tokens(&self, address: &ContractAddress, limit: u32) -> Result<Vec<Nft>, GalleryError> {
        let records: Vec<TokenRecord> = self.get_json(&format!(
            "{}/tokens?contract={}&limit={}&sort.desc=id",
            self.base_url, address, limit
        ))?;
        let addresses = creator_addresses(&records);
        let aliases = if addresses.is_empty() {
            HashMap::new()
        } else {
            let url = format!(
                "{}/accounts?address.in={}&select=address,alias,domain",
                self.base_url,
                addresses.join(",")
            );
            match self.get_json::<Vec<AccountRecord>>(&url) {
                Ok(accounts) => alias_map_from_accounts(accounts),
                Err(err) => {
                    // Aliases are cosmetic, the token list is not.
                    warn!(error = %err, "creator alias batch lookup failed");
                    HashMap::new()
                }
            }
        };
        Ok(nfts_from_records(records, &aliases))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
