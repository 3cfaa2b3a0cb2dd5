use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{ArtistProfile, CollectionSearchResult, ContractInfo, Nft};
use crate::gallery::Collection;
use crate::media::MediaReport;

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_collection(result: &Collection) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &ContractInfo) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tokens(result: &[Nft]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_profiles(result: &[ArtistProfile]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_search(result: &[CollectionSearchResult]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_media(result: &[MediaReport]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
