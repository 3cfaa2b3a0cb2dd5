use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;

use newtro_gallery::domain::{
    ArtistProfile, CollectionCreator, CollectionSearchResult, ContractAddress, ContractInfo,
    Creator, Nft,
};
use newtro_gallery::error::GalleryError;
use newtro_gallery::gallery::Gallery;
use newtro_gallery::objkt::{ObjktClient, avatar_url};
use newtro_gallery::tzkt::TzktClient;

fn address() -> ContractAddress {
    "KT1SnjkFfEjcJDAHXrj8GoLq174ZNjyKbXgG".parse().unwrap()
}

fn curated(addresses: &[&str]) -> Vec<ContractAddress> {
    addresses.iter().map(|a| a.parse().unwrap()).collect()
}

fn sample_info(address: &ContractAddress, source: &str) -> ContractInfo {
    ContractInfo {
        address: address.to_string(),
        alias: format!("{source} collection"),
        description: None,
        timestamp: None,
        creator: CollectionCreator {
            address: "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb".to_string(),
            alias: None,
            twitter: None,
        },
    }
}

fn sample_nft(id: i64, creator_address: &str, alias: Option<&str>) -> Nft {
    Nft {
        id,
        token_id: id.to_string(),
        name: format!("token {id}"),
        image_candidates: vec![format!("https://example.com/{id}.png")],
        display_candidates: Vec::new(),
        mime: None,
        contract_address: "KT1SnjkFfEjcJDAHXrj8GoLq174ZNjyKbXgG".to_string(),
        creator: Creator {
            address: creator_address.to_string(),
            alias: alias.map(str::to_string),
        },
    }
}

/// Objkt mock: fails for addresses listed in `fail_for` (or all of them when
/// the list contains "*"), counting every call.
#[derive(Default)]
struct ScriptedObjkt {
    fail_for: Vec<String>,
    info_calls: Mutex<usize>,
    tokens_calls: Mutex<usize>,
    profile_requests: Mutex<Vec<Vec<String>>>,
}

impl ScriptedObjkt {
    fn failing_all() -> Self {
        Self {
            fail_for: vec!["*".to_string()],
            ..Self::default()
        }
    }

    fn fails(&self, address: &str) -> bool {
        self.fail_for.iter().any(|a| a == "*" || a == address)
    }
}

impl ObjktClient for ScriptedObjkt {
    fn collection_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError> {
        *self.info_calls.lock().unwrap() += 1;
        if self.fails(address.as_str()) {
            return Err(GalleryError::ObjktGraphql("primary down".to_string()));
        }
        Ok(sample_info(address, "objkt"))
    }

    fn collection_tokens(&self, address: &ContractAddress) -> Result<Vec<Nft>, GalleryError> {
        *self.tokens_calls.lock().unwrap() += 1;
        if self.fails(address.as_str()) {
            return Err(GalleryError::ObjktGraphql("primary down".to_string()));
        }
        Ok(vec![
            sample_nft(1, "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb", Some("moth")),
            sample_nft(2, "N/A", None),
            sample_nft(3, "tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn", None),
        ])
    }

    fn artist_profiles(&self, addresses: &[String]) -> Result<Vec<ArtistProfile>, GalleryError> {
        self.profile_requests
            .lock()
            .unwrap()
            .push(addresses.to_vec());
        Ok(addresses
            .iter()
            .map(|address| ArtistProfile {
                address: address.clone(),
                alias: address.clone(),
                avatar_url: avatar_url(None, address),
                objkt_url: format!("https://objkt.com/profile/{address}"),
                twitter: None,
                instagram: None,
            })
            .collect())
    }

    fn artist_creations(&self, _address: &str, _offset: u32) -> Result<Vec<Nft>, GalleryError> {
        Ok(Vec::new())
    }

    fn search_collections(
        &self,
        _term: &str,
    ) -> Result<Vec<CollectionSearchResult>, GalleryError> {
        Ok(Vec::new())
    }
}

/// TzKT mock: counts calls, optionally failing everything.
#[derive(Default)]
struct ScriptedTzkt {
    fail: bool,
    info_calls: Mutex<usize>,
    tokens_calls: Mutex<usize>,
}

impl TzktClient for ScriptedTzkt {
    fn contract_info(&self, address: &ContractAddress) -> Result<ContractInfo, GalleryError> {
        *self.info_calls.lock().unwrap() += 1;
        if self.fail {
            return Err(GalleryError::TzktHttp("secondary down".to_string()));
        }
        Ok(sample_info(address, "tzkt"))
    }

    fn tokens(&self, _address: &ContractAddress, _limit: u32) -> Result<Vec<Nft>, GalleryError> {
        *self.tokens_calls.lock().unwrap() += 1;
        if self.fail {
            return Err(GalleryError::TzktHttp("secondary down".to_string()));
        }
        Ok(vec![sample_nft(
            9,
            "tz1QheGsHLHeC2qjt7FiDbTmPHxbLWkHxEpj",
            None,
        )])
    }
}

fn scripted_gallery(
    objkt: ScriptedObjkt,
    tzkt: ScriptedTzkt,
) -> (
    Gallery<Arc<ScriptedObjkt>, Arc<ScriptedTzkt>>,
    Arc<ScriptedObjkt>,
    Arc<ScriptedTzkt>,
) {
    let objkt = Arc::new(objkt);
    let tzkt = Arc::new(tzkt);
    (
        Gallery::new(Arc::clone(&objkt), Arc::clone(&tzkt)),
        objkt,
        tzkt,
    )
}

#[test]
fn secondary_is_not_consulted_when_primary_succeeds() {
    let (gallery, objkt, tzkt) = scripted_gallery(ScriptedObjkt::default(), ScriptedTzkt::default());

    let info = gallery.collection_info(&address()).unwrap();
    assert_eq!(info.alias, "objkt collection");
    gallery.tokens(&address()).unwrap();

    assert_eq!(*objkt.info_calls.lock().unwrap(), 1);
    assert_eq!(*objkt.tokens_calls.lock().unwrap(), 1);
    assert_eq!(*tzkt.info_calls.lock().unwrap(), 0);
    assert_eq!(*tzkt.tokens_calls.lock().unwrap(), 0);
}

#[test]
fn primary_failure_invokes_secondary_exactly_once() {
    let (gallery, _objkt, tzkt) =
        scripted_gallery(ScriptedObjkt::failing_all(), ScriptedTzkt::default());

    let info = gallery.collection_info(&address()).unwrap();
    assert_eq!(info.alias, "tzkt collection");
    assert_eq!(*tzkt.info_calls.lock().unwrap(), 1);

    let nfts = gallery.tokens(&address()).unwrap();
    assert_eq!(nfts.len(), 1);
    assert_eq!(*tzkt.tokens_calls.lock().unwrap(), 1);
}

#[test]
fn when_both_sources_fail_the_secondary_error_surfaces() {
    let (gallery, _objkt, tzkt) = scripted_gallery(
        ScriptedObjkt::failing_all(),
        ScriptedTzkt {
            fail: true,
            ..ScriptedTzkt::default()
        },
    );

    let err = gallery.collection_info(&address()).unwrap_err();
    assert_matches!(err, GalleryError::TzktHttp(message) if message == "secondary down");
    assert_eq!(*tzkt.info_calls.lock().unwrap(), 1);

    let err = gallery.tokens(&address()).unwrap_err();
    assert_matches!(err, GalleryError::TzktHttp(_));
}

#[test]
fn combined_fetch_returns_both_halves() {
    let (gallery, _objkt, _tzkt) =
        scripted_gallery(ScriptedObjkt::default(), ScriptedTzkt::default());

    let collection = gallery.collection(&address()).unwrap();
    assert_eq!(collection.info.alias, "objkt collection");
    assert_eq!(collection.nfts.len(), 3);
}

#[test]
fn combined_fetch_fails_when_either_half_fails() {
    // both sources down: info and tokens each exhaust their fallback chain,
    // so the combined fetch fails as a whole
    let (gallery, _objkt, _tzkt) = scripted_gallery(
        ScriptedObjkt::failing_all(),
        ScriptedTzkt {
            fail: true,
            ..ScriptedTzkt::default()
        },
    );

    let err = gallery.collection(&address()).unwrap_err();
    assert_matches!(err, GalleryError::TzktHttp(_));
}

#[test]
fn curated_aggregation_isolates_a_failing_contract() {
    let failing = "KT1Muk6E8Ma2nkZJjseFzp172aoCHr9frsjh";
    let objkt = Arc::new(ScriptedObjkt {
        fail_for: vec![failing.to_string()],
        ..ScriptedObjkt::default()
    });
    // secondary down as well, so the failing contract contributes nothing
    let tzkt = Arc::new(ScriptedTzkt {
        fail: true,
        ..ScriptedTzkt::default()
    });
    let gallery = Gallery::with_curated(
        Arc::clone(&objkt),
        tzkt,
        curated(&[
            "KT1SnjkFfEjcJDAHXrj8GoLq174ZNjyKbXgG",
            failing,
            "KT1C2rNotE5J4Db59CttRVim3JNR8jG5D9Jg",
        ]),
    );

    let profiles = gallery.curated_artist_profiles().unwrap();

    // creators are de-duplicated across the two healthy contracts and the
    // N/A placeholder is excluded
    assert_eq!(profiles.len(), 2);
    let addresses: Vec<&str> = profiles.iter().map(|p| p.address.as_str()).collect();
    assert!(addresses.contains(&"tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"));
    assert!(addresses.contains(&"tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn"));

    // one bulk profile lookup for the whole batch
    assert_eq!(objkt.profile_requests.lock().unwrap().len(), 1);
}

#[test]
fn curated_aggregation_sorts_profiles_by_alias() {
    let gallery = Gallery::with_curated(
        Arc::new(ScriptedObjkt::default()),
        Arc::new(ScriptedTzkt::default()),
        curated(&["KT1SnjkFfEjcJDAHXrj8GoLq174ZNjyKbXgG"]),
    );
    let profiles = gallery.curated_artist_profiles().unwrap();
    let mut sorted = profiles.clone();
    sorted.sort_by(|a, b| a.alias.cmp(&b.alias));
    assert_eq!(
        profiles.iter().map(|p| &p.alias).collect::<Vec<_>>(),
        sorted.iter().map(|p| &p.alias).collect::<Vec<_>>()
    );
}

#[test]
fn curated_aggregation_with_no_creators_returns_empty() {
    // every contract fails on both sources
    let (gallery, objkt, _tzkt) = scripted_gallery(
        ScriptedObjkt::failing_all(),
        ScriptedTzkt {
            fail: true,
            ..ScriptedTzkt::default()
        },
    );
    let profiles = gallery.curated_artist_profiles().unwrap();
    assert!(profiles.is_empty());
    // no creators means no bulk lookup at all
    assert!(objkt.profile_requests.lock().unwrap().is_empty());
}
