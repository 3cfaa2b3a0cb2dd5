use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::warn;

use crate::domain::Nft;
use crate::error::GalleryError;

/// Wall-clock budget per candidate when resolving for inline display.
pub const MEDIA_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_mime(mime: Option<&str>) -> Self {
        if mime.is_some_and(|mime| mime.starts_with("video/")) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

/// Combined candidate list for a token: display URLs first, then image URLs,
/// de-duplicated with order preserved.
pub fn candidate_sources(nft: &Nft) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for url in nft
        .display_candidates
        .iter()
        .chain(nft.image_candidates.iter())
    {
        if !sources.contains(url) {
            sources.push(url.clone());
        }
    }
    sources
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMedia {
    pub url: String,
    pub kind: MediaKind,
    pub attempts: usize,
}

/// Per-token media report for CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct MediaReport {
    pub token_id: String,
    pub name: String,
    pub resolved: Option<ResolvedMedia>,
    pub error: Option<String>,
}

/// Seam between the candidate walk and the actual load attempt, so the walk
/// is testable without a network.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, url: &str, kind: MediaKind) -> Result<(), GalleryError>;
}

/// Probes a candidate by fetching it: success is a 2xx response whose content
/// type is consistent with the MIME hint. A text/html 200 from a misbehaving
/// gateway counts as a failure.
pub struct HttpMediaProbe {
    client: Client,
}

impl HttpMediaProbe {
    /// Untimed probe, for ahead-of-time preloading.
    pub fn new() -> Result<Self, GalleryError> {
        Self::build(None)
    }

    /// Probe with a wall-clock budget per attempt, for inline display paths.
    pub fn with_timeout(timeout: Duration) -> Result<Self, GalleryError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, GalleryError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("newtro-gallery/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GalleryError::MediaProbe(err.to_string()))?,
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| GalleryError::MediaProbe(err.to_string()))?;
        Ok(Self { client })
    }
}

impl MediaProbe for HttpMediaProbe {
    fn probe(&self, url: &str, kind: MediaKind) -> Result<(), GalleryError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GalleryError::MediaProbe(err.to_string()))?;
        if !response.status().is_success() {
            return Err(GalleryError::MediaProbe(format!(
                "status {} for {url}",
                response.status().as_u16()
            )));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type_matches(&content_type, kind) {
            Ok(())
        } else {
            Err(GalleryError::MediaProbe(format!(
                "unexpected content type {content_type} for {url}"
            )))
        }
    }
}

fn content_type_matches(content_type: &str, kind: MediaKind) -> bool {
    if content_type.is_empty() || content_type.starts_with("application/octet-stream") {
        return true;
    }
    match kind {
        MediaKind::Video => content_type.starts_with("video/"),
        MediaKind::Image => !content_type.starts_with("text/"),
    }
}

/// A ticket identifies one resolution attempt for one token. Beginning a new
/// resolution invalidates all earlier tickets.
#[derive(Debug, Clone)]
pub struct ResolveTicket {
    entity: i64,
    generation: u64,
}

impl ResolveTicket {
    pub fn entity(&self) -> i64 {
        self.entity
    }
}

/// Walks a token's candidate URLs in preference order until one loads.
///
/// State per attempt: `Loading(candidate_i)` either succeeds (terminal) or
/// advances to `candidate_{i+1}`; running out of candidates is the terminal
/// exhaustion error. Cancellation is cooperative: a resolution whose ticket
/// has been superseded stops at the next attempt boundary and reports
/// supersession, so a late result can never be attributed to the old token.
pub struct MediaResolver<P: MediaProbe> {
    probe: P,
    generation: AtomicU64,
}

impl<P: MediaProbe> MediaResolver<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            generation: AtomicU64::new(0),
        }
    }

    /// Starts a resolution session for `entity`, invalidating any in-flight
    /// session.
    pub fn begin(&self, entity: i64) -> ResolveTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        ResolveTicket { entity, generation }
    }

    pub fn is_current(&self, ticket: &ResolveTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    pub fn resolve(&self, nft: &Nft) -> Result<ResolvedMedia, GalleryError> {
        let ticket = self.begin(nft.id);
        self.resolve_with_ticket(&ticket, nft)
    }

    pub fn resolve_with_ticket(
        &self,
        ticket: &ResolveTicket,
        nft: &Nft,
    ) -> Result<ResolvedMedia, GalleryError> {
        let sources = candidate_sources(nft);
        if sources.is_empty() {
            return Err(GalleryError::NoMediaSources(nft.id));
        }
        let kind = MediaKind::from_mime(nft.mime.as_deref());
        let mut attempts = 0usize;
        for url in &sources {
            if !self.is_current(ticket) {
                return Err(GalleryError::MediaSuperseded(ticket.entity));
            }
            attempts += 1;
            match self.probe.probe(url, kind) {
                Ok(()) => {
                    if !self.is_current(ticket) {
                        return Err(GalleryError::MediaSuperseded(ticket.entity));
                    }
                    return Ok(ResolvedMedia {
                        url: url.clone(),
                        kind,
                        attempts,
                    });
                }
                Err(err) => {
                    warn!(url, error = %err, "media candidate failed");
                }
            }
        }
        Err(GalleryError::MediaExhausted(nft.id))
    }
}
