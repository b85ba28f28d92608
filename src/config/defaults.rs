use std::{net::SocketAddr, path::PathBuf};

use url::Url;

use crate::config::primitives::LogFormat;

#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct Defaults {
    server: ServerDefaults,
    tracing: TracingDefaults,
    media: MediaDefaults,
    repo: RepoDefaults,
    store: StoreDefaults,
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct ServerDefaults {
    address: SocketAddr,
    identity_header: String,
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct TracingDefaults {
    format: LogFormat,
    targets: String,
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct MediaDefaults {
    max_upload_bytes: u64,
    accepted_media_types: Vec<String>,
    staging_root: PathBuf,
    public_base_url: Url,
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
enum RepoDefaults {
    Sled(SledDefaults),
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct SledDefaults {
    path: PathBuf,
    cache_capacity: u64,
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
enum StoreDefaults {
    Filesystem(FilesystemDefaults),
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct FilesystemDefaults {
    path: PathBuf,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        ServerDefaults {
            address: "0.0.0.0:8080".parse().expect("Valid address string"),
            identity_header: String::from("x-vidstash-user"),
        }
    }
}

impl Default for TracingDefaults {
    fn default() -> Self {
        TracingDefaults {
            format: LogFormat::Normal,
            targets: String::from("info"),
        }
    }
}

impl Default for MediaDefaults {
    fn default() -> Self {
        MediaDefaults {
            max_upload_bytes: 1024 * 1024 * 1024,
            accepted_media_types: vec![String::from("video/mp4")],
            staging_root: std::env::temp_dir(),
            public_base_url: "http://localhost:9000/vidstash/"
                .parse()
                .expect("Valid url string"),
        }
    }
}

impl Default for RepoDefaults {
    fn default() -> Self {
        Self::Sled(SledDefaults {
            path: PathBuf::from(String::from("/var/lib/vidstash/sled-repo")),
            cache_capacity: 1024 * 1024 * 64,
        })
    }
}

impl Default for StoreDefaults {
    fn default() -> Self {
        Self::Filesystem(FilesystemDefaults {
            path: PathBuf::from(String::from("/var/lib/vidstash/media")),
        })
    }
}
