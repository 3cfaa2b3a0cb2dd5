use std::collections::HashMap;
use std::fs;

use serde_json::json;

use newtro_gallery::domain::ContractAddress;
use newtro_gallery::ipfs::IPFS_GATEWAYS;
use newtro_gallery::tzkt::{
    AccountRecord, ContractRecord, TokenRecord, alias_map_from_accounts,
    contract_info_from_records, creator_addresses, nfts_from_records,
};

fn address() -> ContractAddress {
    "KT1SnjkFfEjcJDAHXrj8GoLq174ZNjyKbXgG".parse().unwrap()
}

fn load_tokens() -> Vec<TokenRecord> {
    let raw = fs::read_to_string("tests/fixtures/tzkt_tokens.json").unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn creator_addresses_are_unique_and_skip_unnamed_tokens() {
    let records = load_tokens();
    let addresses = creator_addresses(&records);
    // two named tokens share a creator, one has a distinct one, the unnamed
    // and metadata-less tokens contribute nothing
    assert_eq!(
        addresses,
        vec![
            "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb".to_string(),
            "tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn".to_string(),
        ]
    );
}

#[test]
fn alias_map_prefers_alias_over_domain_name() {
    let accounts: Vec<AccountRecord> = serde_json::from_value(json!([
        { "address": "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb", "alias": "moth", "domain": { "name": "moth.tez" } },
        { "address": "tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn", "domain": { "name": "sandra.tez" } },
        { "address": "tz1Unresolved111111111111111111111111" }
    ]))
    .unwrap();

    let map = alias_map_from_accounts(accounts);
    assert_eq!(
        map.get("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb").map(String::as_str),
        Some("moth")
    );
    assert_eq!(
        map.get("tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn").map(String::as_str),
        Some("sandra.tez")
    );
    assert!(!map.contains_key("tz1Unresolved111111111111111111111111"));
}

#[test]
fn tokens_are_filtered_and_aliases_attached() {
    let records = load_tokens();
    let mut aliases = HashMap::new();
    aliases.insert(
        "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb".to_string(),
        "moth".to_string(),
    );

    let nfts = nfts_from_records(records, &aliases);

    // five records: one unnamed, one without metadata, one without any uri
    assert_eq!(nfts.len(), 2);

    assert_eq!(nfts[0].id, 9001);
    assert_eq!(nfts[0].name, "Solar Field");
    // thumbnail beats display for the grid candidates
    assert_eq!(nfts[0].image_candidates.len(), IPFS_GATEWAYS.len());
    assert!(nfts[0].image_candidates[0].ends_with("QmSolarThumb"));
    assert!(nfts[0].display_candidates[0].ends_with("QmSolarDisplay"));
    assert_eq!(nfts[0].creator.alias.as_deref(), Some("moth"));

    // artifact is the last-resort image candidate
    assert_eq!(nfts[1].id, 9000);
    assert!(nfts[1].image_candidates[0].ends_with("QmLunarArtifact"));
    assert!(nfts[1].creator.alias.is_none());
    assert_eq!(
        nfts[1].creator.address,
        "tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn"
    );
}

#[test]
fn contract_info_resolves_creator_alias_from_account() {
    let contract: ContractRecord = serde_json::from_value(json!({
        "alias": "Newtro Drops",
        "creator": { "address": "tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn" }
    }))
    .unwrap();
    let account: AccountRecord = serde_json::from_value(json!({
        "address": "tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn",
        "domain": { "name": "sandra.tez" }
    }))
    .unwrap();

    let info = contract_info_from_records(&address(), contract, Some(account));
    assert_eq!(info.alias, "Newtro Drops");
    assert_eq!(info.creator.address, "tz1fJGhWfgnYtVUBvLDyr54ench5NNiqsiQn");
    assert_eq!(info.creator.alias.as_deref(), Some("sandra.tez"));
    assert!(info.description.is_some());
}

#[test]
fn contract_info_without_creator_degrades_to_unknown() {
    let contract: ContractRecord = serde_json::from_value(json!({ "alias": null })).unwrap();
    let info = contract_info_from_records(&address(), contract, None);
    assert_eq!(info.alias, "Unnamed Collection");
    assert_eq!(info.creator.address, "N/A");
    assert!(info.creator.alias.is_none());
    assert!(info.description.is_none());
}
