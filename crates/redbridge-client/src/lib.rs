//! # redbridge-client
//!
//! The network-access layer of the redbridge Redmine API bridge.
//!
//! For every outbound call this crate decides *which* network path to use
//! (direct, a fixed proxy, or a proxy chosen dynamically by a Proxy
//! Auto-Configuration (PAC) script) and *how* to authenticate (API key,
//! optional HTTP Basic credentials, optional proxy credentials), then
//! executes the call and classifies the response.
//!
//! The pieces compose as:
//!
//! ```text
//! caller → RedmineClient → ProxyResolver → (PacEngine | fixed proxy)
//!        → HTTP transport → response classification → caller
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use redbridge_client::RedmineClient;
//! use redbridge_common::Settings;
//! use url::Url;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::new(
//!     Url::parse("https://redmine.example.com")?,
//!     "0123456789abcdef",
//! );
//!
//! let client = RedmineClient::new(settings)?;
//! let response = client.get("/issues.json?limit=5").await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure behavior
//!
//! PAC problems (unreachable script, compile error, an exception thrown by
//! `FindProxyForURL`) and proxy-transport construction failures degrade
//! toward "request still attempted, without that guarantee" and are only
//! logged. The caller sees an error in exactly two cases: the transport
//! itself failed, or a non-2xx response carried HTML, the signature of a
//! login or gateway page sitting in front of the API.

pub mod client;
pub mod error;
pub mod pac;
pub mod proxy;

pub use client::{RedmineClient, RequestOptions};
pub use error::ClientError;
pub use pac::{PacEngine, PacError};
pub use proxy::ProxyResolver;
