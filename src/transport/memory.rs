//! In-process peer built on `tokio::io::duplex`

use super::Connector;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ship_bridge_shared::limits;
use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;

/// Hands the far end of every connection to a [`MemoryListener`]
pub struct MemoryConnector {
    peer: &'static str,
    incoming: mpsc::UnboundedSender<DuplexStream>,
}

pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

/// A connected connector/listener pair; dropping the listener refuses new connections
pub fn pair(peer: &'static str) -> (MemoryConnector, MemoryListener) {
    let (incoming_tx, incoming) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            peer,
            incoming: incoming_tx,
        },
        MemoryListener { incoming },
    )
}

impl MemoryListener {
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.incoming.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<DuplexStream> {
        let (local, remote) = duplex(limits::PEER_REPLY_MAX_BYTES);
        self.incoming
            .send(remote)
            .map_err(|_| anyhow!("{} is not listening", self.peer))?;
        Ok(local)
    }

    fn peer(&self) -> &str {
        self.peer
    }
}
