//! Persistent request/reply link to a local peer socket
//!
//! One item is in flight at a time: write it, wait for a single reply of at
//! most [`limits::PEER_REPLY_MAX_BYTES`], hand the reply to the dispatcher,
//! then take the next item.

use crate::command::DispatcherHandle;
use crate::transport::Connector;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use ship_bridge_shared::limits;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Timing for a peer link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Time allowed for the peer to reply to one item
    pub reply_timeout: Duration,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Sending side of a peer link's command queue
#[derive(Clone)]
pub struct PeerQueue {
    tag: &'static str,
    tx: mpsc::Sender<Bytes>,
}

impl PeerQueue {
    /// Queue an item without waiting, dropping it if the queue is full
    pub fn push(&self, item: Bytes) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("[{}] queue full, dropping request", self.tag);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("[{}] link stopped, dropping request", self.tag);
            }
        }
    }
}

/// Why a connected session ended
enum SessionEnd {
    /// Every queue sender is gone and the queue is empty
    QueueClosed,
    Shutdown,
}

/// Connection loop for one peer
pub struct PeerLink<T: Connector> {
    tag: &'static str,
    connector: T,
    config: LinkConfig,
    queue: mpsc::Receiver<Bytes>,
    dispatcher: DispatcherHandle,
}

impl<T: Connector> PeerLink<T> {
    /// Create a link and the queue feeding it
    pub fn new(
        tag: &'static str,
        connector: T,
        config: LinkConfig,
        capacity: usize,
        dispatcher: DispatcherHandle,
    ) -> (PeerQueue, Self) {
        let (tx, queue) = mpsc::channel(capacity.max(1));
        let link = Self {
            tag,
            connector,
            config,
            queue,
            dispatcher,
        };
        (PeerQueue { tag, tx }, link)
    }

    /// Run until shutdown, or until the queue is closed and drained
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("[{}] starting, peer {}", self.tag, self.connector.peer());
        let mut reconnect_delay = self.config.reconnect_delay;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let connect = tokio::select! {
                result = self.connector.connect() => result,
                _ = shutdown.changed() => break,
            };

            match connect {
                Ok(mut stream) => {
                    info!("[{}] connected to {}", self.tag, self.connector.peer());
                    reconnect_delay = self.config.reconnect_delay;

                    let end = self.session(&mut stream, &mut shutdown).await;
                    let _ = stream.shutdown().await;

                    match end {
                        Ok(SessionEnd::QueueClosed) => {
                            debug!("[{}] queue closed", self.tag);
                            break;
                        }
                        Ok(SessionEnd::Shutdown) => break,
                        Err(e) => {
                            error!("[{}] connection to {} lost: {}", self.tag, self.connector.peer(), e);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "[{}] connect failed: {:#}, retrying in {:?}",
                        self.tag, e, reconnect_delay
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }

            // Exponential backoff
            reconnect_delay = std::cmp::min(reconnect_delay * 2, self.config.max_reconnect_delay);
        }

        let dropped = self.queue.len();
        if dropped > 0 {
            warn!("[{}] stopping with {} undelivered requests", self.tag, dropped);
        }
        info!("[{}] stopped", self.tag);
    }

    async fn session(
        &mut self,
        stream: &mut T::Stream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        let mut read_buf = vec![0u8; limits::PEER_REPLY_MAX_BYTES];

        loop {
            let item = tokio::select! {
                item = self.queue.recv() => match item {
                    Some(item) => item,
                    None => return Ok(SessionEnd::QueueClosed),
                },
                _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
            };

            stream.write_all(&item).await?;
            stream.flush().await?;

            match timeout(self.config.reply_timeout, stream.read(&mut read_buf)).await {
                Ok(Ok(0)) => return Err(anyhow!("peer closed connection")),
                Ok(Ok(n)) => {
                    debug!("[{}] reply of {} bytes", self.tag, n);
                    self.dispatcher
                        .handle_response(Bytes::copy_from_slice(&read_buf[..n]));
                }
                Ok(Err(e)) => return Err(anyhow!("read error: {}", e)),
                Err(_) => {
                    warn!(
                        "[{}] no reply within {:?}",
                        self.tag, self.config.reply_timeout
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Dispatcher, DispatcherInbox};
    use crate::transport::memory::{self, MemoryListener};
    use crate::transport::UnixConnector;
    use ship_bridge_shared::FieldFailurePolicy;
    use tokio::io::{AsyncRead, AsyncWrite};
    use tokio::net::UnixListener;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            reply_timeout: Duration::from_millis(200),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(50),
        }
    }

    type MemoryLink = (
        PeerQueue,
        PeerLink<memory::MemoryConnector>,
        MemoryListener,
        DispatcherInbox,
    );

    fn memory_link(capacity: usize) -> MemoryLink {
        let (handle, inbox) = Dispatcher::channel(10, FieldFailurePolicy::KeepDegraded);
        let (connector, listener) = memory::pair("test-peer");
        let (queue, link) = PeerLink::new("TEST", connector, fast_config(), capacity, handle);
        (queue, link, listener, inbox)
    }

    /// Answer every request with `ack:<request>` until the link hangs up
    async fn ack_all<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S) -> Vec<Vec<u8>> {
        let mut seen = Vec::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            seen.push(buf[..n].to_vec());
            let mut reply = b"ack:".to_vec();
            reply.extend_from_slice(&buf[..n]);
            stream.write_all(&reply).await.unwrap();
        }
        seen
    }

    async fn next_response(inbox: &mut DispatcherInbox) -> Bytes {
        timeout(Duration::from_secs(2), inbox.recv_response())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_item_written_and_reply_forwarded() {
        let (queue, link, mut listener, mut inbox) = memory_link(10);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(link.run(stop_rx));
        let peer = tokio::spawn(async move { ack_all(listener.accept().await.unwrap()).await });

        queue.push(Bytes::from_static(b"one"));
        assert_eq!(next_response(&mut inbox).await, Bytes::from_static(b"ack:one"));
        queue.push(Bytes::from_static(b"two"));
        assert_eq!(next_response(&mut inbox).await, Bytes::from_static(b"ack:two"));

        // dropping the last queue sender ends the link and closes the stream
        drop(queue);
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();

        let seen = peer.await.unwrap();
        assert_eq!(seen, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn test_reply_timeout_moves_on() {
        let (queue, link, mut listener, mut inbox) = memory_link(10);

        // answers only the second request
        let peer = tokio::spawn(async move {
            let mut stream = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"first");
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"second");
            stream.write_all(b"answer").await.unwrap();
            let _ = stream.read(&mut buf).await;
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(link.run(stop_rx));

        queue.push(Bytes::from_static(b"first"));
        queue.push(Bytes::from_static(b"second"));
        assert_eq!(next_response(&mut inbox).await, Bytes::from_static(b"answer"));

        stop_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_hangup_reconnects() {
        let (queue, link, mut listener, mut inbox) = memory_link(10);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(link.run(stop_rx));

        // first connection reads one item and hangs up without replying
        let mut first = listener.accept().await.unwrap();
        queue.push(Bytes::from_static(b"lost"));
        let mut buf = vec![0u8; 64];
        let n = first.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"lost");
        drop(first);

        let second = timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let peer = tokio::spawn(ack_all(second));

        queue.push(Bytes::from_static(b"after"));
        assert_eq!(next_response(&mut inbox).await, Bytes::from_static(b"ack:after"));

        stop_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert_eq!(peer.await.unwrap(), vec![b"after".to_vec()]);
    }

    #[tokio::test]
    async fn test_reconnects_until_unix_peer_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.sock");

        let (handle, mut inbox) = Dispatcher::channel(10, FieldFailurePolicy::KeepDegraded);
        let (queue, link) = PeerLink::new(
            "TEST",
            UnixConnector::new_control(&path),
            fast_config(),
            10,
            handle,
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(link.run(stop_rx));

        // queued while the peer is not listening yet
        queue.push(Bytes::from_static(b"early"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let listener = UnixListener::bind(&path).unwrap();
        let _peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            ack_all(stream).await
        });

        assert_eq!(next_response(&mut inbox).await, Bytes::from_static(b"ack:early"));

        stop_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_item() {
        let (queue, link, _listener, _inbox) = memory_link(1);

        queue.push(Bytes::from_static(b"kept"));
        queue.push(Bytes::from_static(b"dropped"));
        assert_eq!(link.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_disconnected() {
        let (_queue, link, listener, _inbox) = memory_link(10);
        // nobody is listening, so every connect fails
        drop(listener);

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(link.run(stop_rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        stop_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
