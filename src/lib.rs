pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod gallery;
pub mod ipfs;
pub mod media;
pub mod objkt;
pub mod output;
pub mod tzkt;
