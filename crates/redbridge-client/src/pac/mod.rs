//! PAC (Proxy Auto-Configuration) script support.
//!
//! A PAC script is a small piece of ECMAScript defining
//! `FindProxyForURL(url, host)`, which returns directives like `DIRECT` or
//! `PROXY host:port` to select a network path per request. [`PacEngine`]
//! fetches the configured script once, compiles it inside a sandboxed
//! evaluator, and answers directive queries for target URLs.
//!
//! The evaluator exposes the standard PAC primitives and nothing else: the
//! script has no filesystem, network, or process access. Several primitives
//! are deliberately simplified (`isResolvable` is always `true`, `isInNet`
//! always `false`, `dnsResolve` returns its input, the time-range predicates
//! always match); real-world PAC files rarely depend on more.
//!
//! Failure is never fatal here: an unreachable PAC URL, a script that does
//! not compile, or an evaluation-time exception all collapse to "no
//! directive", and the resolver falls back to the fixed proxy or a direct
//! connection. A failed load is not cached, so every call retries the fetch
//! while the script stays unreachable.

mod evaluator;

use log::{debug, info, warn};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

use evaluator::PacEvaluator;

/// Errors raised while fetching, compiling, or evaluating a PAC script.
///
/// These never escape [`PacEngine::resolve`]; they exist for diagnostics and
/// for the engine's internal control flow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PacError {
    /// The PAC script could not be fetched.
    #[error("PAC fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The PAC endpoint answered with a non-success status.
    #[error("PAC endpoint returned HTTP {0}")]
    Status(StatusCode),

    /// The script failed to compile or threw during evaluation.
    #[error("PAC script error: {0}")]
    Script(String),

    /// The evaluator thread could not be spawned.
    #[error("failed to spawn PAC evaluator thread: {0}")]
    EvaluatorSpawn(#[source] std::io::Error),

    /// The evaluator thread terminated and can no longer answer queries.
    #[error("PAC evaluator is gone")]
    EvaluatorGone,
}

/// Fetches, caches, and evaluates a PAC script.
///
/// The script is fetched and compiled at most once per process, on first
/// use; the compiled evaluator is cached for all subsequent calls. The
/// engine context backing the evaluator is not `Send`, so it lives on a
/// dedicated thread and queries cross over via channels; concurrent callers
/// simply queue.
pub struct PacEngine {
    pac_url: Option<Url>,
    http: reqwest::Client,
    evaluator: OnceCell<PacEvaluator>,
}

impl PacEngine {
    /// Creates an engine for the given PAC URL.
    ///
    /// With `None` the engine is inert: [`resolve`](Self::resolve) answers
    /// `None` without touching the network.
    pub fn new(pac_url: Option<Url>, http: reqwest::Client) -> Self {
        Self {
            pac_url,
            http,
            evaluator: OnceCell::new(),
        }
    }

    /// Evaluates `FindProxyForURL(target_url, target_host)`.
    ///
    /// Returns the raw directive string (e.g. `"PROXY proxy:3128; DIRECT"`),
    /// or `None` when no PAC URL is configured, the script is unavailable,
    /// or evaluation throws. An evaluation-time exception is confined to the
    /// failing call and does not invalidate the cached evaluator.
    pub async fn resolve(&self, target_url: &str, target_host: &str) -> Option<String> {
        let pac_url = self.pac_url.as_ref()?;

        let evaluator = match self
            .evaluator
            .get_or_try_init(|| self.load(pac_url))
            .await
        {
            Ok(evaluator) => evaluator,
            Err(err) => {
                warn!("PAC unavailable: {err}");
                return None;
            }
        };

        match evaluator.find_proxy(target_url, target_host).await {
            Ok(directive) => Some(directive),
            Err(err) => {
                warn!("PAC evaluation failed for {target_url}: {err}");
                None
            }
        }
    }

    async fn load(&self, pac_url: &Url) -> Result<PacEvaluator, PacError> {
        info!("loading PAC script from {pac_url}");
        let response = self.http.get(pac_url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PacError::Status(status));
        }

        let script = response.text().await?;
        debug!("PAC script fetched ({} bytes)", script.len());

        let evaluator = PacEvaluator::spawn(script).await?;
        info!("PAC script compiled");
        Ok(evaluator)
    }
}
