use anyhow::{Context, Result};
use clap::Parser;
use fieldledger_core::ShapePolicy;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
#[command(name = "fieldledger")]
#[command(about = "Operations and finance records server backed by a single JSON file")]
pub struct Cli {
    /// JSON data file; relative paths resolve against the working directory
    #[arg(long, env = "FIELDLEDGER_DATA_FILE", default_value = "data/db.json")]
    pub data_file: PathBuf,

    /// Listen address
    #[arg(short, long, env = "FIELDLEDGER_ADDR", default_value = "127.0.0.1:3000")]
    pub addr: SocketAddr,

    /// Fail loads on collections that are not arrays instead of resetting them
    #[arg(long, env = "FIELDLEDGER_STRICT_COLLECTIONS")]
    pub strict_collections: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_file: PathBuf,
    pub addr: SocketAddr,
    pub policy: ShapePolicy,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        Ok(Self {
            data_file: resolve_data_file(&cli.data_file, &cwd),
            addr: cli.addr,
            policy: if cli.strict_collections {
                ShapePolicy::Strict
            } else {
                ShapePolicy::Lenient
            },
        })
    }
}

pub fn resolve_data_file(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
