#![forbid(unsafe_code)]

mod config;
mod error;
mod http;
mod path_lock;
mod path_resolver;
mod storage;
mod stream_io;
mod zipstream;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("OFFCLOUD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config::Config::from_env().context("loading configuration")?;
    tokio::fs::create_dir_all(&config.data_root)
        .await
        .with_context(|| format!("creating data root '{}'", config.data_root.display()))?;

    tracing::info!(
        root = %config.data_root.display(),
        addr = %config.listen_addr,
        "starting offcloud",
    );

    let storage = Arc::new(Storage::new(config.data_root.clone()));
    let state = http::AppState { storage };
    let app = http::build_router(state);

    axum::Server::bind(&config.listen_addr)
        .serve(app.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}
