use std::thread;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{
    ArtistProfile, CollectionSearchResult, ContractAddress, ContractInfo, Nft, UNKNOWN_CREATOR,
};
use crate::error::GalleryError;
use crate::objkt::ObjktClient;
use crate::tzkt::{COLLECTION_TOKEN_LIMIT, TzktClient};

/// The gallery's featured collections. Config may override this list.
pub const CURATED_CONTRACTS: [&str; 9] = [
    "KT1SnjkFfEjcJDAHXrj8GoLq174ZNjyKbXgG",
    "KT1Muk6E8Ma2nkZJjseFzp172aoCHr9frsjh",
    "KT1C2rNotE5J4Db59CttRVim3JNR8jG5D9Jg",
    "KT1WiA72WSP5pCzVjEqhW2GRhBU3q5yRcHQf",
    "KT1Ro7fyAmAiLmLignzzCeT9Q25UMgh9pWkf",
    "KT1J8M5XSf7neu3efyuQ9aywPXDuChWnMNLX",
    "KT1QAty51CrHwSPQMs1fafHdYGLHK3Z7bsSG",
    "KT1CngY7393gtBsE4Ynk3cGm1Mov55Z2aNo9",
    "KT1VBCWocKcFbQEgtN9ioN5AwyWXGgdwsjDt",
];

pub fn default_curated_contracts() -> Vec<ContractAddress> {
    CURATED_CONTRACTS
        .iter()
        .filter_map(|address| address.parse().ok())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub info: ContractInfo,
    pub nfts: Vec<Nft>,
}

/// Orchestrates the two metadata sources: objkt first for rich metadata,
/// TzKT as the on-chain fallback when objkt fails or does not list the
/// collection.
#[derive(Clone)]
pub struct Gallery<O: ObjktClient, T: TzktClient> {
    objkt: O,
    tzkt: T,
    curated: Vec<ContractAddress>,
}

impl<O: ObjktClient, T: TzktClient> Gallery<O, T> {
    pub fn new(objkt: O, tzkt: T) -> Self {
        Self::with_curated(objkt, tzkt, default_curated_contracts())
    }

    pub fn with_curated(objkt: O, tzkt: T, curated: Vec<ContractAddress>) -> Self {
        Self {
            objkt,
            tzkt,
            curated,
        }
    }

    pub fn curated(&self) -> &[ContractAddress] {
        &self.curated
    }

    /// Collection metadata with fallback. If both sources fail, the TzKT
    /// error is the one surfaced.
    pub fn collection_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError> {
        match self.objkt.collection_info(address) {
            Ok(info) => Ok(info),
            Err(err) => {
                warn!(%address, error = %err, "objkt collection info failed, falling back to tzkt");
                self.tzkt.contract_info(address)
            }
        }
    }

    /// Token list with fallback, same policy as `collection_info`.
    pub fn tokens(&self, address: &ContractAddress) -> Result<Vec<Nft>, GalleryError> {
        match self.objkt.collection_tokens(address) {
            Ok(nfts) => Ok(nfts),
            Err(err) => {
                warn!(%address, error = %err, "objkt token fetch failed, falling back to tzkt");
                self.tzkt.tokens(address, COLLECTION_TOKEN_LIMIT)
            }
        }
    }

    /// Info and tokens fetched concurrently. Both halves are needed to render
    /// a collection, so either sub-fetch failing fails the whole operation
    /// even though each has its own internal fallback.
    pub fn collection(&self, address: &ContractAddress) -> Result<Collection, GalleryError> {
        thread::scope(|scope| {
            let info_handle = scope.spawn(|| self.collection_info(address));
            let nfts_handle = scope.spawn(|| self.tokens(address));
            let info = join_worker(info_handle)?;
            let nfts = join_worker(nfts_handle)?;
            Ok(Collection { info, nfts })
        })
    }

    /// Aggregates artist profiles across the curated contracts. Token lists
    /// are fetched in parallel; a contract that fails to fetch contributes
    /// nothing instead of aborting the batch. Profiles come back sorted by
    /// alias.
    pub fn curated_artist_profiles(&self) -> Result<Vec<ArtistProfile>, GalleryError> {
        let token_lists: Vec<Vec<Nft>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .curated
                .iter()
                .map(|address| {
                    scope.spawn(move || match self.tokens(address) {
                        Ok(nfts) => nfts,
                        Err(err) => {
                            warn!(%address, error = %err, "skipping contract in artist aggregation");
                            Vec::new()
                        }
                    })
                })
                .collect();
            handles.into_iter().map(join_worker_value).collect()
        });

        let mut addresses: Vec<String> = Vec::new();
        for nft in token_lists.iter().flatten() {
            let address = &nft.creator.address;
            if address.is_empty() || address == UNKNOWN_CREATOR || addresses.contains(address) {
                continue;
            }
            addresses.push(address.clone());
        }
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let mut profiles = self.objkt.artist_profiles(&addresses)?;
        profiles.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(profiles)
    }

    pub fn artist_creations(&self, address: &str, offset: u32) -> Result<Vec<Nft>, GalleryError> {
        self.objkt.artist_creations(address, offset)
    }

    pub fn search(&self, term: &str) -> Result<Vec<CollectionSearchResult>, GalleryError> {
        self.objkt.search_collections(term)
    }
}

fn join_worker<R>(
    handle: thread::ScopedJoinHandle<'_, Result<R, GalleryError>>,
) -> Result<R, GalleryError> {
    match handle.join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn join_worker_value<R>(handle: thread::ScopedJoinHandle<'_, R>) -> R {
    match handle.join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
