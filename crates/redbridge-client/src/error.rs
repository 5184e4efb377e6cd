//! Error types for the client library.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced to callers of [`RedmineClient`](crate::RedmineClient).
///
/// Recoverable failures inside the network layer (an unreachable PAC script,
/// a proxy transport that cannot be constructed) are handled internally and
/// never appear here; the request is still attempted with fewer guarantees.
/// What does surface is either a transport-level failure or a response that
/// demonstrably never reached the API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network-level failure during the HTTP call.
    ///
    /// DNS resolution, connection, or protocol errors from the underlying
    /// transport, passed through unmodified.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response carrying an HTML body.
    ///
    /// Distinguishes "the API returned an error payload" (returned as a
    /// normal response for the caller to interpret) from "the request never
    /// reached the API and hit a login or gateway page".
    #[error("expected JSON but received HTML (HTTP {status}). URL: {url}. Response body: {snippet}")]
    HtmlResponse {
        /// The failing HTTP status.
        status: StatusCode,
        /// The fully resolved request URL.
        url: String,
        /// The first 200 characters of the response body.
        snippet: String,
    },

    /// A configured value could not be encoded as an HTTP header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl ClientError {
    /// Check whether this is the HTML-instead-of-JSON failure class.
    pub const fn is_html_response(&self) -> bool {
        matches!(self, Self::HtmlResponse { .. })
    }

    /// The HTTP status associated with this error, when one exists.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HtmlResponse { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}
