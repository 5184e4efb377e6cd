//! Fetches a handful of issues from a live Redmine instance.
//!
//! Configuration comes from the environment:
//!
//! ```sh
//! REDMINE_URL=https://redmine.example.com \
//! REDMINE_API_KEY=... \
//! cargo run --example list_issues
//! ```
//!
//! Optional: `REDMINE_PROXY_URL`, `REDMINE_PAC_URL`, Basic-auth and
//! proxy-auth variables. Run with `RUST_LOG=debug` to watch proxy
//! resolution.

use redbridge_client::RedmineClient;
use redbridge_common::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = Settings::from_env()?;
    let client = RedmineClient::new(settings)?;

    let response = client.get("/issues.json?limit=5").await?;
    println!("status: {}", response.status());
    println!("{}", response.text().await?);

    Ok(())
}
