use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ContractAddress;
use crate::error::GalleryError;
use crate::gallery::default_curated_contracts;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub curated_contracts: Vec<CuratedEntry>,
    #[serde(default)]
    pub cache_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CuratedEntry {
    Shorthand(String),
    Detailed(CuratedEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CuratedEntryObject {
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Endpoints {
    #[serde(default)]
    pub objkt: Option<String>,
    #[serde(default)]
    pub tzkt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CuratedContract {
    pub address: ContractAddress,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub curated_contracts: Vec<CuratedContract>,
    pub cache_ttl: Duration,
    pub endpoints: Endpoints,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `newtro-gallery.json` from the working directory, or the given
    /// path. An absent default file means built-in defaults, not an error;
    /// an explicitly given path must exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GalleryError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("newtro-gallery.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GalleryError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GalleryError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GalleryError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let curated_contracts = if config.curated_contracts.is_empty() {
            default_curated_contracts()
                .into_iter()
                .map(|address| CuratedContract {
                    address,
                    label: None,
                })
                .collect()
        } else {
            config
                .curated_contracts
                .into_iter()
                .map(|entry| match entry {
                    CuratedEntry::Shorthand(value) => Ok(CuratedContract {
                        address: value.parse()?,
                        label: None,
                    }),
                    CuratedEntry::Detailed(obj) => Ok(CuratedContract {
                        address: obj.address.parse()?,
                        label: obj.label,
                    }),
                })
                .collect::<Result<Vec<_>, GalleryError>>()?
        };

        Ok(ResolvedConfig {
            schema_version,
            curated_contracts,
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds.unwrap_or(3600)),
            endpoints: config.endpoints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_resolves_to_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.cache_ttl, Duration::from_secs(3600));
        assert_eq!(
            resolved.curated_contracts.len(),
            crate::gallery::CURATED_CONTRACTS.len()
        );
    }
}
