use super::Connector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::net::UnixStream;

/// Connects to a peer listening on a Unix socket path
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
    peer: &'static str,
}

impl UnixConnector {
    pub fn new_control(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            peer: "ship-control",
        }
    }

    pub fn new_nav(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            peer: "ship-nav",
        }
    }
}

#[async_trait]
impl Connector for UnixConnector {
    type Stream = UnixStream;

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.path)
            .await
            .with_context(|| format!("dial {} at {}", self.peer, self.path.display()))
    }

    fn peer(&self) -> &str {
        self.peer
    }
}
