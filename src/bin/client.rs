//! Relay Cache client binary
//!
//! Usage: `relay_client <host> <port> <request...>`
//!
//! The remaining arguments are joined with spaces into the request line.
//! Set `READ_TO_END=1` when talking to a single-value server.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_cache::{client, config::parse_port, ReadMode};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_cache=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("usage: relay_client <host> <port> <request...>");
    }

    let host = &args[0];
    let port = parse_port(&args[1])?;
    let request = args[2..].join(" ");
    let mode = match env::var("READ_TO_END").as_deref() {
        Ok("1") | Ok("true") => ReadMode::ToEnd,
        _ => ReadMode::Line,
    };

    let response = client::send_with_timeout(host, port, &request, mode, CONNECT_TIMEOUT)
        .await
        .with_context(|| format!("request to {host}:{port} failed"))?;
    println!("{response}");
    Ok(())
}
