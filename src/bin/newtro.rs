use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use newtro_gallery::cache::CacheStore;
use newtro_gallery::config::{ConfigLoader, ResolvedConfig};
use newtro_gallery::domain::ContractAddress;
use newtro_gallery::error::GalleryError;
use newtro_gallery::gallery::Gallery;
use newtro_gallery::media::{HttpMediaProbe, MEDIA_TIMEOUT, MediaReport, MediaResolver};
use newtro_gallery::objkt::ObjktHttpClient;
use newtro_gallery::output::{ClearResult, JsonOutput};
use newtro_gallery::tzkt::TzktHttpClient;

#[derive(Parser)]
#[command(name = "newtro")]
#[command(about = "Tezos NFT collection fetcher with objkt -> TzKT fallback")]
#[command(version, author)]
struct Cli {
    /// Path to a newtro-gallery.json config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch collection info and token list")]
    Collection(CollectionArgs),
    #[command(about = "Fetch only the token list")]
    Tokens(AddressArgs),
    #[command(about = "Aggregate artist profiles across the curated contracts")]
    Artists(ArtistsArgs),
    #[command(about = "Search collections by name or description")]
    Search(SearchArgs),
    #[command(about = "Probe media candidates for a collection's tokens")]
    Media(MediaArgs),
    #[command(about = "Cache maintenance")]
    Cache(CacheCmdArgs),
}

#[derive(Args)]
struct CollectionArgs {
    address: String,

    #[arg(long)]
    refresh: bool,

    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct AddressArgs {
    address: String,
}

#[derive(Args)]
struct ArtistsArgs {
    #[arg(long)]
    refresh: bool,

    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct SearchArgs {
    term: String,
}

#[derive(Args)]
struct MediaArgs {
    address: String,

    /// How many tokens to probe, newest first
    #[arg(long, default_value_t = 4)]
    limit: usize,

    /// Probe without the per-candidate wall-clock budget
    #[arg(long)]
    no_timeout: bool,
}

#[derive(Args)]
struct CacheCmdArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Remove every cached entry")]
    Clear,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(gallery) = report.downcast_ref::<GalleryError>() {
            return ExitCode::from(map_exit_code(gallery));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GalleryError) -> u8 {
    match error {
        GalleryError::InvalidContractAddress(_)
        | GalleryError::CollectionNotFound(_)
        | GalleryError::ConfigRead(_)
        | GalleryError::ConfigParse(_) => 2,
        GalleryError::ObjktHttp(_)
        | GalleryError::ObjktStatus { .. }
        | GalleryError::ObjktGraphql(_)
        | GalleryError::TzktHttp(_)
        | GalleryError::TzktStatus { .. }
        | GalleryError::MediaProbe(_)
        | GalleryError::NoMediaSources(_)
        | GalleryError::MediaExhausted(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;

    match cli.command {
        Commands::Collection(args) => run_collection(args, &config),
        Commands::Tokens(args) => run_tokens(args, &config),
        Commands::Artists(args) => run_artists(args, &config),
        Commands::Search(args) => run_search(args, &config),
        Commands::Media(args) => run_media(args, &config),
        Commands::Cache(args) => run_cache(args),
    }
}

fn build_gallery(
    config: &ResolvedConfig,
) -> miette::Result<Gallery<ObjktHttpClient, TzktHttpClient>> {
    let objkt = match &config.endpoints.objkt {
        Some(endpoint) => ObjktHttpClient::with_endpoint(endpoint.clone()),
        None => ObjktHttpClient::new(),
    }
    .into_diagnostic()?;
    let tzkt = match &config.endpoints.tzkt {
        Some(endpoint) => TzktHttpClient::with_base_url(endpoint.clone()),
        None => TzktHttpClient::new(),
    }
    .into_diagnostic()?;
    let curated = config
        .curated_contracts
        .iter()
        .map(|contract| contract.address.clone())
        .collect();
    Ok(Gallery::with_curated(objkt, tzkt, curated))
}

fn run_collection(args: CollectionArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let address: ContractAddress = args.address.parse().into_diagnostic()?;
    let gallery = build_gallery(config)?;
    let store = CacheStore::new().into_diagnostic()?;
    let key = format!("collection:{address}");
    let collection = fetch_cached(
        &store,
        &key,
        config.cache_ttl,
        args.refresh,
        args.no_cache,
        || gallery.collection(&address),
    )
    .into_diagnostic()?;
    JsonOutput::print_collection(&collection).into_diagnostic()
}

fn run_tokens(args: AddressArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let address: ContractAddress = args.address.parse().into_diagnostic()?;
    let gallery = build_gallery(config)?;
    let nfts = gallery.tokens(&address).into_diagnostic()?;
    JsonOutput::print_tokens(&nfts).into_diagnostic()
}

fn run_artists(args: ArtistsArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let gallery = build_gallery(config)?;
    let store = CacheStore::new().into_diagnostic()?;
    let profiles = fetch_cached(
        &store,
        "curated-artist-profiles",
        config.cache_ttl,
        args.refresh,
        args.no_cache,
        || gallery.curated_artist_profiles(),
    )
    .into_diagnostic()?;
    JsonOutput::print_profiles(&profiles).into_diagnostic()
}

fn run_search(args: SearchArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let gallery = build_gallery(config)?;
    let results = gallery.search(&args.term).into_diagnostic()?;
    JsonOutput::print_search(&results).into_diagnostic()
}

fn run_media(args: MediaArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let address: ContractAddress = args.address.parse().into_diagnostic()?;
    let gallery = build_gallery(config)?;
    let probe = if args.no_timeout {
        HttpMediaProbe::new()
    } else {
        HttpMediaProbe::with_timeout(MEDIA_TIMEOUT)
    }
    .into_diagnostic()?;
    let resolver = MediaResolver::new(probe);

    let nfts = gallery.tokens(&address).into_diagnostic()?;
    let reports: Vec<MediaReport> = nfts
        .iter()
        .take(args.limit)
        .map(|nft| match resolver.resolve(nft) {
            Ok(resolved) => MediaReport {
                token_id: nft.token_id.clone(),
                name: nft.name.clone(),
                resolved: Some(resolved),
                error: None,
            },
            Err(err) => MediaReport {
                token_id: nft.token_id.clone(),
                name: nft.name.clone(),
                resolved: None,
                error: Some(err.to_string()),
            },
        })
        .collect();
    JsonOutput::print_media(&reports).into_diagnostic()
}

fn run_cache(args: CacheCmdArgs) -> miette::Result<()> {
    match args.command {
        CacheCommand::Clear => {
            let store = CacheStore::new().into_diagnostic()?;
            store.clear().into_diagnostic()?;
            JsonOutput::print_clear(&ClearResult { cleared: true }).into_diagnostic()
        }
    }
}

/// Read-through cache policy: fresh entries are served as-is; stale entries
/// trigger a refetch and are only served if the refetch fails.
fn fetch_cached<T, F>(
    store: &CacheStore,
    key: &str,
    ttl: Duration,
    refresh: bool,
    no_cache: bool,
    fetch: F,
) -> Result<T, GalleryError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, GalleryError>,
{
    if !refresh {
        let cached = store.get::<T>(key);
        if let Some(value) = cached.value {
            if !cached.is_stale {
                return Ok(value);
            }
            return match fetch() {
                Ok(fresh) => {
                    if !no_cache {
                        store.set(key, &fresh, ttl);
                    }
                    Ok(fresh)
                }
                Err(err) => {
                    warn!(key, error = %err, "refresh failed, serving stale cache entry");
                    Ok(value)
                }
            };
        }
    }
    let fresh = fetch()?;
    if !no_cache {
        store.set(key, &fresh, ttl);
    }
    Ok(fresh)
}
