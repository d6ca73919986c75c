//! ship-control adapter

use super::PeerQueue;
use crate::command::ControlPeer;
use bytes::Bytes;

pub(super) const TAG: &str = "CONTROL";

/// Forwards direct-control requests unchanged to ship-control
pub struct ShipControl {
    queue: PeerQueue,
}

impl ShipControl {
    pub fn new(queue: PeerQueue) -> Self {
        Self { queue }
    }
}

impl ControlPeer for ShipControl {
    fn send_raw_command(&self, raw: Bytes) {
        self.queue.push(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Dispatcher;
    use crate::peer::{LinkConfig, PeerLink};
    use crate::transport::UnixConnector;
    use ship_bridge_shared::FieldFailurePolicy;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;
    use tokio::sync::watch;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_raw_command_reaches_socket_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"{\"ok\":true}").await.unwrap();
            buf.truncate(n);
            buf
        });

        let (handle, mut inbox) = Dispatcher::channel(10, FieldFailurePolicy::KeepDegraded);
        let (queue, link) = PeerLink::new(
            TAG,
            UnixConnector::new_control(&path),
            LinkConfig::default(),
            10,
            handle,
        );
        let control = ShipControl::new(queue);
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(link.run(stop_rx));

        let raw = Bytes::from_static(br#"{"type":"cmd","cmd":"set_speed","speed":0.4}"#);
        control.send_raw_command(raw.clone());

        let reply = timeout(Duration::from_secs(2), inbox.recv_response())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"{\"ok\":true}"));
        assert_eq!(peer.await.unwrap(), raw.to_vec());
    }
}
