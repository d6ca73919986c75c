//! Dialing the local peers
//!
//! A [`PeerLink`](crate::peer::PeerLink) asks its connector for a fresh byte
//! stream on every (re)connect and never looks at the socket type.

#[cfg(test)]
pub mod memory;
mod unix;

pub use unix::UnixConnector;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a new stream to the peer
    async fn connect(&self) -> Result<Self::Stream>;

    /// Peer name for log messages
    fn peer(&self) -> &str;
}
