use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GalleryError {
    #[error("invalid contract address: {0}")]
    InvalidContractAddress(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("objkt request failed: {0}")]
    ObjktHttp(String),

    #[error("objkt returned status {status}: {message}")]
    ObjktStatus { status: u16, message: String },

    #[error("objkt query failed: {0}")]
    ObjktGraphql(String),

    #[error("collection {0} not found on objkt")]
    CollectionNotFound(String),

    #[error("tzkt request failed: {0}")]
    TzktHttp(String),

    #[error("tzkt returned status {status}: {message}")]
    TzktStatus { status: u16, message: String },

    #[error("media probe failed: {0}")]
    MediaProbe(String),

    #[error("no media sources for token {0}")]
    NoMediaSources(i64),

    #[error("all media sources failed for token {0}")]
    MediaExhausted(i64),

    #[error("media resolution superseded for token {0}")]
    MediaSuperseded(i64),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
