use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use crate::domain::{
    ArtistProfile, CollectionCreator, CollectionSearchResult, ContractAddress, ContractInfo,
    Creator, Nft,
};
use crate::error::GalleryError;
use crate::ipfs::normalize_uri;

pub const DEFAULT_ENDPOINT: &str = "https://data.objkt.com/v3/graphql";

/// Hasura reports a missing root field with this fragment; it is the only
/// error that triggers the legacy-schema retry.
const SCHEMA_MISMATCH_MARKER: &str = "not found in type: 'query_root'";

/// The provider has renamed its collection root field over time: `collection`
/// on current deployments, `fa` on legacy ones. Same logical query, different
/// root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    Current,
    Legacy,
}

const COLLECTION_INFO_QUERY_CURRENT: &str = r#"
query GalleryCollectionInfo($address: String!) {
  collection(where: {address: {_eq: $address}}, limit: 1) {
    name
    description
    timestamp
    creator { address tzdomain alias twitter }
    tokens(limit: 1, order_by: {token_id: asc}) {
      creators { holder { address tzdomain alias twitter } }
    }
  }
}
"#;

const COLLECTION_INFO_QUERY_LEGACY: &str = r#"
query GalleryCollectionInfoLegacy($address: String!) {
  fa(where: {contract: {_eq: $address}}, limit: 1) {
    name
    description
    timestamp
    creator { address tzdomain alias twitter }
    tokens(limit: 1, order_by: {token_id: asc}) {
      creators { holder { address tzdomain alias twitter } }
    }
  }
}
"#;

const COLLECTION_TOKENS_QUERY_CURRENT: &str = r#"
query CollectionTokens($address: String!) {
  collection(where: {address: {_eq: $address}}, limit: 1) {
    tokens(limit: 500, order_by: {pk: desc}) {
      pk token_id name display_uri thumbnail_uri
      creators(limit: 1) { holder { address tzdomain alias } }
    }
  }
}
"#;

const COLLECTION_TOKENS_QUERY_LEGACY: &str = r#"
query CollectionTokensLegacy($address: String!) {
  fa(where: {contract: {_eq: $address}}, limit: 1) {
    tokens(limit: 500, order_by: {pk: desc}) {
      pk token_id name display_uri thumbnail_uri
      creators(limit: 1) { holder { address tzdomain alias } }
    }
  }
}
"#;

const ARTIST_PROFILES_QUERY: &str = r#"
query ArtistProfiles($addresses: [String!]) {
  holder(where: {address: {_in: $addresses}}) {
    address
    tzdomain
    alias
    twitter
    instagram
  }
}
"#;

const ARTIST_CREATIONS_QUERY: &str = r#"
query ArtistCreations($address: String!, $offset: Int!) {
  token(
    where: {
      creators: { holder: { address: { _eq: $address } } },
      supply: { _gt: 0 }
    },
    order_by: { pk: desc },
    limit: 8,
    offset: $offset
  ) {
    pk
    token_id
    name
    display_uri
    artifact_uri
    thumbnail_uri
    mime
    fa { contract }
    creators(limit: 1) { holder { address tzdomain alias } }
  }
}
"#;

const SEARCH_COLLECTIONS_QUERY_CURRENT: &str = r#"
query SearchCollections($search: String!) {
  collection(
    where: {
      _or: [
        { name: { _ilike: $search } },
        { description: { _ilike: $search } }
      ]
    },
    limit: 20,
    order_by: { tokens_aggregate: { count: desc } }
  ) {
    address
    name
    description
    logo
  }
}
"#;

const SEARCH_COLLECTIONS_QUERY_LEGACY: &str = r#"
query SearchCollectionsLegacy($search: String!) {
  fa(
    where: {
      _or: [
        { name: { _ilike: $search } },
        { description: { _ilike: $search } }
      ],
      tokens_aggregate: {count: {predicate: {_gt: 0}}}
    },
    limit: 20,
    order_by: { tokens_aggregate: { count: desc } }
  ) {
    contract
    name
    description
    logo
  }
}
"#;

#[derive(Debug, Deserialize)]
pub struct GqlError {
    pub message: String,
}

/// Raw GraphQL response envelope. `errors` may be populated alongside `data`;
/// the caller decides which errors are recoverable.
#[derive(Debug, Deserialize)]
pub struct GqlEnvelope<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GqlError>>,
}

pub fn is_schema_mismatch(errors: &[GqlError]) -> bool {
    errors
        .iter()
        .any(|err| err.message.contains(SCHEMA_MISMATCH_MARKER))
}

/// Runs a query against the current schema, retrying exactly once against the
/// legacy shape when the response carries the root-field-not-found signature.
/// Every other reported error is fatal and surfaces the first upstream
/// message.
pub fn query_with_schema_fallback<T, F>(mut run: F) -> Result<T, GalleryError>
where
    F: FnMut(SchemaVersion) -> Result<GqlEnvelope<T>, GalleryError>,
{
    let mut envelope = run(SchemaVersion::Current)?;
    if envelope
        .errors
        .as_deref()
        .is_some_and(is_schema_mismatch)
    {
        warn!("objkt root field missing under current schema, retrying with legacy shape");
        envelope = run(SchemaVersion::Legacy)?;
    }
    if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
        return Err(GalleryError::ObjktGraphql(errors[0].message.clone()));
    }
    envelope
        .data
        .ok_or_else(|| GalleryError::ObjktGraphql("response contained no data".to_string()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolderData {
    pub address: String,
    pub tzdomain: Option<String>,
    pub alias: Option<String>,
    pub twitter: Option<String>,
    pub instagram: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenCreator {
    pub holder: HolderData,
}

#[derive(Debug, Deserialize)]
pub struct CollectionData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub timestamp: Option<String>,
    pub creator: Option<HolderData>,
    #[serde(default)]
    pub tokens: Vec<CollectionTokenCreators>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionTokenCreators {
    #[serde(default)]
    pub creators: Vec<TokenCreator>,
}

/// Root of a collection-info response under either schema generation.
#[derive(Debug, Deserialize)]
pub struct CollectionRoot {
    pub collection: Option<Vec<CollectionData>>,
    pub fa: Option<Vec<CollectionData>>,
}

impl CollectionRoot {
    fn into_first(self) -> Option<CollectionData> {
        self.collection
            .into_iter()
            .flatten()
            .chain(self.fa.into_iter().flatten())
            .next()
    }
}

#[derive(Debug, Deserialize)]
pub struct GqlToken {
    pub pk: i64,
    pub token_id: String,
    pub name: Option<String>,
    pub display_uri: Option<String>,
    pub thumbnail_uri: Option<String>,
    pub artifact_uri: Option<String>,
    pub mime: Option<String>,
    pub fa: Option<FaRef>,
    #[serde(default)]
    pub creators: Vec<TokenCreator>,
}

#[derive(Debug, Deserialize)]
pub struct FaRef {
    pub contract: String,
}

#[derive(Debug, Deserialize)]
pub struct CollectionTokens {
    #[serde(default)]
    pub tokens: Vec<GqlToken>,
}

#[derive(Debug, Deserialize)]
pub struct TokensRoot {
    pub collection: Option<Vec<CollectionTokens>>,
    pub fa: Option<Vec<CollectionTokens>>,
}

#[derive(Debug, Deserialize)]
pub struct HolderRoot {
    #[serde(default)]
    pub holder: Vec<HolderData>,
}

#[derive(Debug, Deserialize)]
pub struct CreationsRoot {
    #[serde(default)]
    pub token: Vec<GqlToken>,
}

#[derive(Debug, Deserialize)]
pub struct SearchCollectionCurrent {
    pub address: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchCollectionLegacy {
    pub contract: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRoot {
    pub collection: Option<Vec<SearchCollectionCurrent>>,
    pub fa: Option<Vec<SearchCollectionLegacy>>,
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

/// Normalizes a collection-info response into the canonical record. Creator
/// identity prefers the first token's first creator (the artist) over the
/// collection-level creator (typically the gallery wallet).
pub fn collection_info_from_response(
    address: &ContractAddress,
    root: CollectionRoot,
) -> Result<ContractInfo, GalleryError> {
    let collection = root
        .into_first()
        .ok_or_else(|| GalleryError::CollectionNotFound(address.to_string()))?;

    let artist = collection
        .tokens
        .first()
        .and_then(|token| token.creators.first())
        .map(|creator| creator.holder.clone());
    let creator = artist.or(collection.creator);

    Ok(ContractInfo {
        address: address.to_string(),
        alias: non_empty(collection.name).unwrap_or_else(|| "Unnamed Collection".to_string()),
        description: collection.description,
        timestamp: collection.timestamp,
        creator: match creator {
            Some(holder) => CollectionCreator {
                address: holder.address,
                alias: non_empty(holder.tzdomain).or(non_empty(holder.alias)),
                twitter: holder.twitter,
            },
            None => CollectionCreator::unknown(),
        },
    })
}

/// Normalizes a collection token page, dropping tokens without a displayable
/// image candidate.
pub fn tokens_from_response(address: &ContractAddress, root: TokensRoot) -> Vec<Nft> {
    let Some(tokens) = root
        .collection
        .into_iter()
        .flatten()
        .chain(root.fa.into_iter().flatten())
        .next()
        .map(|data| data.tokens)
    else {
        warn!(address = %address, "no tokens under either objkt schema");
        return Vec::new();
    };

    tokens
        .into_iter()
        .filter_map(|token| {
            let image_candidates = normalize_uri(pick_uri(&[
                token.thumbnail_uri.as_deref(),
                token.display_uri.as_deref(),
            ]))?;
            let display_candidates =
                normalize_uri(token.display_uri.as_deref()).unwrap_or_default();
            let creator = token.creators.into_iter().next().map(|creator| creator.holder);
            Some(Nft {
                id: token.pk,
                token_id: token.token_id,
                name: token.name.unwrap_or_default(),
                image_candidates,
                display_candidates,
                mime: None,
                contract_address: address.to_string(),
                creator: creator_from_holder(creator),
            })
        })
        .collect()
}

/// Normalizes an artist-creations page. The grid prefers thumbnails while the
/// modal display prefers the full artifact, so the two candidate lists use
/// opposite priorities.
pub fn creations_from_response(root: CreationsRoot) -> Vec<Nft> {
    root.token
        .into_iter()
        .filter_map(|token| {
            let image_candidates = normalize_uri(pick_uri(&[
                token.thumbnail_uri.as_deref(),
                token.display_uri.as_deref(),
                token.artifact_uri.as_deref(),
            ]))?;
            let display_candidates = normalize_uri(pick_uri(&[
                token.artifact_uri.as_deref(),
                token.display_uri.as_deref(),
                token.thumbnail_uri.as_deref(),
            ]))
            .unwrap_or_default();
            let contract_address = token.fa.map(|fa| fa.contract).unwrap_or_default();
            let creator = token.creators.into_iter().next().map(|creator| creator.holder);
            Some(Nft {
                id: token.pk,
                token_id: token.token_id,
                name: token.name.unwrap_or_default(),
                image_candidates,
                display_candidates,
                mime: token.mime,
                contract_address,
                creator: creator_from_holder(creator),
            })
        })
        .collect()
}

fn creator_from_holder(holder: Option<HolderData>) -> Creator {
    match holder {
        Some(holder) => Creator {
            address: holder.address,
            alias: non_empty(holder.tzdomain).or(non_empty(holder.alias)),
        },
        None => Creator::unknown(),
    }
}

/// Builds artist profiles from a holder batch. Alias preference is domain
/// name, then raw alias, then a truncated address.
pub fn artist_profiles_from_response(root: HolderRoot) -> Vec<ArtistProfile> {
    root.holder
        .into_iter()
        .map(|holder| {
            let alias = non_empty(holder.tzdomain.clone())
                .or(non_empty(holder.alias.clone()))
                .unwrap_or_else(|| truncated_address(&holder.address));
            let profile_handle = non_empty(holder.tzdomain.clone())
                .unwrap_or_else(|| holder.address.clone());
            ArtistProfile {
                avatar_url: avatar_url(holder.twitter.as_deref(), &holder.address),
                objkt_url: format!("https://objkt.com/profile/{profile_handle}"),
                address: holder.address,
                alias,
                twitter: holder.twitter,
                instagram: holder.instagram,
            }
        })
        .collect()
}

fn truncated_address(address: &str) -> String {
    let prefix: String = address.chars().take(8).collect();
    format!("{prefix}...")
}

/// Deterministic avatar URL: the Twitter/X handle when one can be extracted
/// from the profile link, otherwise an address-derived identicon with the
/// no-fallback-image flag set.
pub fn avatar_url(twitter: Option<&str>, address: &str) -> String {
    if let Some(profile_url) = twitter {
        let pattern = Regex::new(r"(?:twitter\.com|x\.com)/([A-Za-z0-9_]+)").unwrap();
        if let Some(captures) = pattern.captures(profile_url) {
            return format!("https://unavatar.io/twitter/{}", &captures[1]);
        }
    }
    format!("https://unavatar.io/tezos/{address}?fallback=false")
}

pub fn search_results_from_response(root: SearchRoot) -> Vec<CollectionSearchResult> {
    let current: Vec<CollectionSearchResult> = root
        .collection
        .into_iter()
        .flatten()
        .map(|collection| CollectionSearchResult {
            address: collection.address,
            name: collection.name.unwrap_or_default(),
            description: collection.description,
            logo_candidates: normalize_uri(collection.logo.as_deref()),
        })
        .collect();
    if !current.is_empty() {
        return current;
    }
    root.fa
        .into_iter()
        .flatten()
        .map(|collection| CollectionSearchResult {
            address: collection.contract,
            name: collection.name.unwrap_or_default(),
            description: collection.description,
            logo_candidates: normalize_uri(collection.logo.as_deref()),
        })
        .collect()
}

/// Primary metadata source: the objkt.com indexer.
pub trait ObjktClient: Send + Sync {
    fn collection_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError>;
    fn collection_tokens(&self, address: &ContractAddress) -> Result<Vec<Nft>, GalleryError>;
    fn artist_profiles(&self, addresses: &[String]) -> Result<Vec<ArtistProfile>, GalleryError>;
    fn artist_creations(&self, address: &str, offset: u32) -> Result<Vec<Nft>, GalleryError>;
    fn search_collections(&self, term: &str) -> Result<Vec<CollectionSearchResult>, GalleryError>;
}

impl<C: ObjktClient + ?Sized> ObjktClient for std::sync::Arc<C> {
    fn collection_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError> {
        (**self).collection_info(address)
    }

    fn collection_tokens(&self, address: &ContractAddress) -> Result<Vec<Nft>, GalleryError> {
        (**self).collection_tokens(address)
    }

    fn artist_profiles(&self, addresses: &[String]) -> Result<Vec<ArtistProfile>, GalleryError> {
        (**self).artist_profiles(addresses)
    }

    fn artist_creations(&self, address: &str, offset: u32) -> Result<Vec<Nft>, GalleryError> {
        (**self).artist_creations(address, offset)
    }

    fn search_collections(&self, term: &str) -> Result<Vec<CollectionSearchResult>, GalleryError> {
        (**self).search_collections(term)
    }
}

#[derive(Clone)]
pub struct ObjktHttpClient {
    client: Client,
    endpoint: String,
}

impl ObjktHttpClient {
    pub fn new() -> Result<Self, GalleryError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, GalleryError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("newtro-gallery/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GalleryError::ObjktHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| GalleryError::ObjktHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<GqlEnvelope<T>, GalleryError> {
        let body = json!({ "query": query, "variables": variables });
        let response = self.send_with_retries(|| self.client.post(&self.endpoint).json(&body))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| GalleryError::ObjktHttp(err.to_string()))
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
            .unwrap_or_else(|_| "objkt request failed".to_string());
        Err(GalleryError::ObjktStatus { status, message })
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
                    return Err(GalleryError::ObjktHttp(err.to_string()));
                }
            }
        }
    }
}

impl ObjktClient for ObjktHttpClient {
    fn collection_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError> {
        let root = query_with_schema_fallback(|schema| {
            let query = match schema {
                SchemaVersion::Current => COLLECTION_INFO_QUERY_CURRENT,
                SchemaVersion::Legacy => COLLECTION_INFO_QUERY_LEGACY,
            };
            self.execute::<CollectionRoot>(query, json!({ "address": address.as_str() }))
        })?;
        collection_info_from_response(address, root)
    }

    fn collection_tokens(&self, address: &ContractAddress) -> Result<Vec<Nft>, GalleryError> {
        let root = query_with_schema_fallback(|schema| {
            let query = match schema {
                SchemaVersion::Current => COLLECTION_TOKENS_QUERY_CURRENT,
                SchemaVersion::Legacy => COLLECTION_TOKENS_QUERY_LEGACY,
            };
            self.execute::<TokensRoot>(query, json!({ "address": address.as_str() }))
        })?;
        Ok(tokens_from_response(address, root))
    }

    fn artist_profiles(&self, addresses: &[String]) -> Result<Vec<ArtistProfile>, GalleryError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let envelope = self
            .execute::<HolderRoot>(ARTIST_PROFILES_QUERY, json!({ "addresses": addresses }))?;
        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            return Err(GalleryError::ObjktGraphql(errors[0].message.clone()));
        }
        Ok(envelope
            .data
            .map(artist_profiles_from_response)
            .unwrap_or_default())
    }

    fn artist_creations(&self, address: &str, offset: u32) -> Result<Vec<Nft>, GalleryError> {
        let envelope = self.execute::<CreationsRoot>(
            ARTIST_CREATIONS_QUERY,
            json!({ "address": address, "offset": offset }),
        )?;
        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            return Err(GalleryError::ObjktGraphql(errors[0].message.clone()));
        }
        Ok(envelope
            .data
            .map(creations_from_response)
            .unwrap_or_default())
    }

    fn search_collections(
        &self,
        term: &str,
    ) -> Result<Vec<CollectionSearchResult>, GalleryError> {
        let variables = json!({ "search": format!("%{term}%") });
        let root = query_with_schema_fallback(|schema| {
            let query = match schema {
                SchemaVersion::Current => SEARCH_COLLECTIONS_QUERY_CURRENT,
                SchemaVersion::Legacy => SEARCH_COLLECTIONS_QUERY_LEGACY,
            };
            self.execute::<SearchRoot>(query, variables.clone())
        })?;
        Ok(search_results_from_response(root))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
