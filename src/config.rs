use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Process configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    pub listen_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let raw_root = std::env::var("OFFCLOUD_DATAROOT").unwrap_or_else(|_| "/tmp".to_string());
        let data_root = absolutize(&raw_root)?;

        let raw_addr =
            std::env::var("OFFCLOUD_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
        let listen_addr = raw_addr
            .parse()
            .with_context(|| format!("invalid OFFCLOUD_LISTEN_ADDR '{raw_addr}'"))?;

        Ok(Config {
            data_root,
            listen_addr,
        })
    }
}

fn absolutize(path: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = std::env::current_dir().context("reading current directory")?;
        Ok(cwd.join(path))
    }
}
