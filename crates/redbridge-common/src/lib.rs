//! # redbridge-common
//!
//! Shared configuration types for the redbridge Redmine API bridge.
//!
//! This crate holds the immutable [`Settings`] snapshot that the rest of the
//! workspace reads its connection parameters from: the Redmine base URL, the
//! API key, optional HTTP Basic credentials, and the proxy configuration
//! (fixed proxy URL, PAC URL, proxy credentials).
//!
//! ## Example
//!
//! ```
//! use redbridge_common::Settings;
//! use url::Url;
//!
//! # fn example() -> Result<(), url::ParseError> {
//! let settings = Settings::new(
//!     Url::parse("https://redmine.example.com")?,
//!     "0123456789abcdef",
//! )
//! .with_basic_auth("alice", "s3cret")
//! .with_proxy_url(Url::parse("http://proxy.example.com:3128")?);
//! # Ok(())
//! # }
//! ```
//!
//! In a deployed bridge the snapshot is loaded once at startup with
//! [`Settings::from_env`]; a missing or malformed required variable is a
//! fatal [`ConfigError`].

pub mod config;

pub use config::{ConfigError, Settings};
