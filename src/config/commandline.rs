use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use url::Url;

use crate::config::primitives::LogFormat;

pub(super) struct Output {
    pub(super) config_file: Option<PathBuf>,
    pub(super) overrides: Overrides,
    pub(super) save_to: Option<PathBuf>,
}

pub(super) fn parse() -> Output {
    Args::parse().into_output()
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Video upload and processing service")]
struct Args {
    /// Path to the vidstash configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Format of logs printed to stdout
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Log levels to print to stdout, respects RUST_LOG syntax
    #[arg(long)]
    log_targets: Option<String>,

    /// The address and port the server binds to
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// The address and port to serve prometheus metrics from
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Reject uploads whose body exceeds this many bytes
    #[arg(long)]
    media_max_upload_bytes: Option<u64>,

    /// Directory uploads are staged in while being processed
    #[arg(long)]
    media_staging_root: Option<PathBuf>,

    /// Base url published video urls are joined onto
    #[arg(long)]
    media_public_base_url: Option<Url>,

    /// Write the resolved configuration to this path as toml, then run
    #[arg(long)]
    save_to: Option<PathBuf>,
}

impl Args {
    fn into_output(self) -> Output {
        let Args {
            config_file,
            log_format,
            log_targets,
            address,
            metrics_address,
            media_max_upload_bytes,
            media_staging_root,
            media_public_base_url,
            save_to,
        } = self;

        Output {
            config_file,
            overrides: Overrides {
                server: ServerOverrides {
                    address,
                    metrics_address,
                },
                tracing: TracingOverrides {
                    format: log_format,
                    targets: log_targets,
                },
                media: MediaOverrides {
                    max_upload_bytes: media_max_upload_bytes,
                    staging_root: media_staging_root,
                    public_base_url: media_public_base_url,
                },
            },
            save_to,
        }
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct Overrides {
    server: ServerOverrides,
    tracing: TracingOverrides,
    media: MediaOverrides,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct ServerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<SocketAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_address: Option<SocketAddr>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct TracingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<LogFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<String>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct MediaOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_upload_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    staging_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    public_base_url: Option<Url>,
}
