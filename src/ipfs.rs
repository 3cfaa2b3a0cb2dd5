/// Public HTTP gateways tried in preference order when rewriting `ipfs://`
/// references. The first entry is the first candidate a caller should probe.
pub const IPFS_GATEWAYS: [&str; 3] = [
    "https://dweb.link/ipfs/",
    "https://gateway.pinata.cloud/ipfs/",
    "https://cloudflare-ipfs.com/ipfs/",
];

/// Rewrites a token media URI into an ordered list of fetchable URL
/// candidates.
///
/// `ipfs://<hash>` yields one URL per configured gateway, in gateway order.
/// Plain HTTP(S) URLs pass through as a single candidate. Anything else
/// (absent, empty, unsupported scheme) yields `None` - absence, not an error.
pub fn normalize_uri(uri: Option<&str>) -> Option<Vec<String>> {
    let uri = uri?;
    if uri.is_empty() {
        return None;
    }
    if let Some(hash) = uri.strip_prefix("ipfs://") {
        return Some(
            IPFS_GATEWAYS
                .iter()
                .map(|gateway| format!("{gateway}{hash}"))
                .collect(),
        );
    }
    if uri.starts_with("http") {
        return Some(vec![uri.to_string()]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipfs_uri_expands_to_one_url_per_gateway() {
        let candidates = normalize_uri(Some("ipfs://QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"))
            .unwrap();
        assert_eq!(candidates.len(), IPFS_GATEWAYS.len());
        for (candidate, gateway) in candidates.iter().zip(IPFS_GATEWAYS) {
            assert_eq!(
                candidate,
                &format!("{gateway}QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG")
            );
        }
    }

    #[test]
    fn http_uri_passes_through_unchanged() {
        let candidates = normalize_uri(Some("https://example.com/art.png")).unwrap();
        assert_eq!(candidates, vec!["https://example.com/art.png".to_string()]);
    }

    #[test]
    fn absent_and_empty_input_yield_none() {
        assert!(normalize_uri(None).is_none());
        assert!(normalize_uri(Some("")).is_none());
    }

    #[test]
    fn unsupported_scheme_yields_none() {
        assert!(normalize_uri(Some("ar://abcdef")).is_none());
    }
}
