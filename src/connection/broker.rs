//! MQTT broker session
//!
//! [`MqttBroker`] is the dispatcher-facing side: it only queues. The
//! [`BrokerSession`] task owns the `rumqttc` client and publishes, while a
//! second task polls the event loop and reports [`BrokerEvent`]s back.

use super::tls;
use super::url::BrokerUrl;
use crate::command::{Broker, DispatcherHandle};
use crate::config::MqttConfig;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration,
    Transport,
};
use ship_bridge_shared::{limits, topics};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Work queued for the broker session
#[derive(Debug)]
enum Outbound {
    Response(Bytes),
    Announce,
}

/// Events emitted by the event-loop task
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Broker acknowledged the connection
    Connected,
    /// Connection lost, the event loop will retry
    Disconnected { reason: String },
    /// A QoS 2 publish left with this packet id
    Sent { pkid: u16 },
    /// The broker completed the QoS 2 exchange for this packet id
    Completed { pkid: u16 },
}

/// Dispatcher-facing broker adapter
pub struct MqttBroker {
    tx: mpsc::Sender<Outbound>,
}

impl MqttBroker {
    fn push(&self, item: Outbound) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                warn!("[MQTT] outbound queue full, dropping {:?}", item);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("[MQTT] session stopped, dropping outbound message");
            }
        }
    }
}

impl Broker for MqttBroker {
    fn send_response(&self, response: Bytes) {
        self.push(Outbound::Response(response));
    }

    fn announce(&self) {
        self.push(Outbound::Announce);
    }
}

/// Tracks announces until the broker completes their delivery
///
/// Publishes leave the client in the order they were queued, so each
/// `Sent` event is matched to the oldest queued publish.
#[derive(Debug, Default)]
struct DeliveryTracker {
    /// Queued publishes, `Some(deadline)` for announces
    queued: VecDeque<Option<Instant>>,
    /// Announces on the wire, by packet id
    in_flight: HashMap<u16, Instant>,
    /// Packet ids of responses on the wire
    responses: HashSet<u16>,
    /// Expired announces the client may still replay, until their PUBCOMP
    expired: HashSet<u16>,
}

impl DeliveryTracker {
    fn queue_response(&mut self) {
        self.queued.push_back(None);
    }

    fn queue_announce(&mut self, deadline: Instant) {
        self.queued.push_back(Some(deadline));
    }

    fn sent(&mut self, pkid: u16) {
        // retransmission after reconnect
        if self.in_flight.contains_key(&pkid)
            || self.responses.contains(&pkid)
            || self.expired.contains(&pkid)
        {
            return;
        }

        match self.queued.pop_front() {
            Some(Some(deadline)) => {
                self.in_flight.insert(pkid, deadline);
            }
            Some(None) => {
                self.responses.insert(pkid);
            }
            None => debug!("[MQTT] untracked publish {}", pkid),
        }
    }

    /// Returns true when `pkid` was an announce
    fn completed(&mut self, pkid: u16) -> bool {
        self.responses.remove(&pkid);
        self.expired.remove(&pkid);
        self.in_flight.remove(&pkid).is_some()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.queued
            .iter()
            .flatten()
            .chain(self.in_flight.values())
            .min()
            .copied()
    }

    /// Forget every announce whose deadline has passed, returning how many
    fn expire(&mut self, now: Instant) -> usize {
        let before = self.in_flight.len();
        let tombstones = &mut self.expired;
        self.in_flight.retain(|pkid, deadline| {
            if *deadline > now {
                return true;
            }
            tombstones.insert(*pkid);
            false
        });
        let mut expired = before - self.in_flight.len();

        for slot in self.queued.iter_mut() {
            if matches!(slot, Some(deadline) if *deadline <= now) {
                // keeps queue positions aligned with outgoing publishes
                *slot = None;
                expired += 1;
            }
        }

        expired
    }
}

/// The broker session task
pub struct BrokerSession {
    url: BrokerUrl,
    config: MqttConfig,
    outbound: mpsc::Receiver<Outbound>,
    dispatcher: DispatcherHandle,
    request_topic: String,
    response_topic: String,
}

/// Build the broker adapter and its session task
pub fn mqtt_broker(
    config: &MqttConfig,
    dispatcher: DispatcherHandle,
) -> Result<(MqttBroker, BrokerSession)> {
    let url: BrokerUrl = config
        .broker
        .parse()
        .with_context(|| format!("invalid broker url {:?}", config.broker))?;

    let (tx, outbound) = mpsc::channel(limits::BROKER_QUEUE_CAPACITY);
    let session = BrokerSession {
        url,
        request_topic: topics::request(&config.ship_id),
        response_topic: topics::response(&config.ship_id),
        config: config.clone(),
        outbound,
        dispatcher,
    };

    Ok((MqttBroker { tx }, session))
}

impl BrokerSession {
    fn options(&self) -> Result<MqttOptions> {
        let mut options = MqttOptions::new(&self.config.ship_id, &self.url.host, self.url.port);
        options.set_clean_session(true);
        options.set_keep_alive(KEEP_ALIVE);

        if let Some((username, password)) = self.config.credentials() {
            options.set_credentials(username, password);
        }

        if self.url.tls {
            let tls_config = tls::client_config(self.config.cert_check)?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                tls_config,
            )));
        }

        Ok(options)
    }

    /// Run until shutdown
    ///
    /// Fails only when the first connection is not acknowledged within
    /// `connTimeout`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("[MQTT] starting, broker {}", self.url);

        let (client, eventloop) = AsyncClient::new(self.options()?, limits::BROKER_QUEUE_CAPACITY);
        let (event_tx, mut events) = mpsc::channel(limits::BROKER_QUEUE_CAPACITY);
        let poller = tokio::spawn(poll_events(
            eventloop,
            client.clone(),
            self.request_topic.clone(),
            self.dispatcher.clone(),
            event_tx,
        ));

        let connected = tokio::select! {
            result = timeout(self.config.conn_timeout(), wait_connected(&mut events)) => result,
            _ = shutdown.changed() => {
                poller.abort();
                info!("[MQTT] stopped before connecting");
                return Ok(());
            }
        };
        match connected {
            Ok(true) => info!("[MQTT] connected to {}", self.url),
            _ => {
                poller.abort();
                return Err(anyhow!(
                    "broker {} did not accept the connection within {:?}",
                    self.url,
                    self.config.conn_timeout()
                ));
            }
        }

        let mut tracker = DeliveryTracker::default();

        loop {
            let deadline = tracker.next_deadline();

            tokio::select! {
                _ = shutdown.changed() => break,
                Some(item) = self.outbound.recv() => {
                    self.publish(&client, &mut tracker, item);
                }
                Some(event) = events.recv() => match event {
                    BrokerEvent::Connected => info!("[MQTT] reconnected to {}", self.url),
                    BrokerEvent::Disconnected { reason } => {
                        warn!("[MQTT] connection lost: {}", reason);
                    }
                    BrokerEvent::Sent { pkid } => tracker.sent(pkid),
                    BrokerEvent::Completed { pkid } => {
                        if tracker.completed(pkid) {
                            debug!("[MQTT] announce delivered");
                        }
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for _ in 0..tracker.expire(Instant::now()) {
                        error!(
                            "[MQTT] announce not delivered within {:?}",
                            self.config.announce_timeout()
                        );
                        self.dispatcher.net_loss();
                    }
                }
            }
        }

        self.disconnect(&client, &mut tracker, poller).await;
        info!("[MQTT] stopped");
        Ok(())
    }

    fn publish(&self, client: &AsyncClient, tracker: &mut DeliveryTracker, item: Outbound) {
        match item {
            Outbound::Response(payload) => {
                match client.try_publish(&self.response_topic, QoS::ExactlyOnce, false, payload) {
                    Ok(()) => tracker.queue_response(),
                    Err(e) => error!("[MQTT] failed to publish response: {}", e),
                }
            }
            Outbound::Announce => {
                debug!("[MQTT] announce");
                match client.try_publish(
                    &self.config.announce_topic,
                    QoS::ExactlyOnce,
                    false,
                    self.config.ship_id.clone(),
                ) {
                    Ok(()) => {
                        tracker.queue_announce(Instant::now() + self.config.announce_timeout())
                    }
                    Err(e) => {
                        error!("[MQTT] failed to publish announce: {}", e);
                        self.dispatcher.net_loss();
                    }
                }
            }
        }
    }

    /// Flush queued responses, then disconnect within `disconnectTimeout`
    async fn disconnect(
        &mut self,
        client: &AsyncClient,
        tracker: &mut DeliveryTracker,
        mut poller: tokio::task::JoinHandle<()>,
    ) {
        while let Ok(item) = self.outbound.try_recv() {
            if let Outbound::Response(_) = item {
                self.publish(client, tracker, item);
            }
        }

        if let Err(e) = client.try_disconnect() {
            warn!("[MQTT] failed to queue disconnect: {}", e);
            poller.abort();
            return;
        }

        match timeout(self.config.disconnect_timeout(), &mut poller).await {
            Ok(_) => debug!("[MQTT] disconnected"),
            Err(_) => {
                warn!(
                    "[MQTT] disconnect not sent within {:?}",
                    self.config.disconnect_timeout()
                );
                poller.abort();
            }
        }
    }
}

/// Wait for the first connection acknowledgement
async fn wait_connected(events: &mut mpsc::Receiver<BrokerEvent>) -> bool {
    while let Some(event) = events.recv().await {
        match event {
            BrokerEvent::Connected => return true,
            BrokerEvent::Disconnected { reason } => {
                warn!("[MQTT] connect failed: {}", reason);
            }
            _ => {}
        }
    }
    false
}

/// Drive the `rumqttc` event loop until the disconnect is sent
async fn poll_events(
    mut eventloop: EventLoop,
    client: AsyncClient,
    request_topic: String,
    dispatcher: DispatcherHandle,
    event_tx: mpsc::Sender<BrokerEvent>,
) {
    let mut reconnect_delay = RECONNECT_DELAY;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                reconnect_delay = RECONNECT_DELAY;
                if let Err(e) = client.try_subscribe(&request_topic, QoS::ExactlyOnce) {
                    error!("[MQTT] failed to subscribe to {}: {}", request_topic, e);
                }
                BrokerEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic == request_topic {
                    debug!("[MQTT] received request: {}", String::from_utf8_lossy(&publish.payload));
                    dispatcher.handle_request(publish.payload);
                }
                continue;
            }
            Ok(Event::Incoming(Packet::PubComp(pubcomp))) => {
                BrokerEvent::Completed { pkid: pubcomp.pkid }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => BrokerEvent::Sent { pkid },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => continue,
            Err(e) => {
                let reason = e.to_string();
                if event_tx
                    .send(BrokerEvent::Disconnected { reason })
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(reconnect_delay).await;
                // Exponential backoff
                reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
                continue;
            }
        };

        if event_tx.send(event).await.is_err() {
            break;
        }
    }

    debug!("[MQTT] event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Dispatcher;
    use ship_bridge_shared::FieldFailurePolicy;

    #[test]
    fn test_tracker_matches_announce_completion() {
        let now = Instant::now();
        let mut tracker = DeliveryTracker::default();

        tracker.queue_response();
        tracker.queue_announce(now + Duration::from_secs(3));
        assert_eq!(tracker.next_deadline(), Some(now + Duration::from_secs(3)));

        tracker.sent(1);
        tracker.sent(2);

        // the response completing is not an announce delivery
        assert!(!tracker.completed(1));
        assert!(tracker.completed(2));
        assert_eq!(tracker.next_deadline(), None);
        assert_eq!(tracker.expire(now + Duration::from_secs(10)), 0);
    }

    #[test]
    fn test_tracker_expires_undelivered_announces() {
        let now = Instant::now();
        let mut tracker = DeliveryTracker::default();

        tracker.queue_announce(now + Duration::from_secs(1));
        tracker.sent(7);
        tracker.queue_announce(now + Duration::from_secs(2));
        tracker.queue_announce(now + Duration::from_secs(5));

        assert_eq!(tracker.expire(now + Duration::from_millis(2500)), 2);
        assert_eq!(tracker.next_deadline(), Some(now + Duration::from_secs(5)));

        // the expired queued slot still pairs with its outgoing publish
        tracker.sent(8);
        tracker.sent(9);
        assert!(!tracker.completed(8));
        assert!(tracker.completed(9));
        assert!(!tracker.completed(7));
    }

    #[test]
    fn test_tracker_ignores_retransmission() {
        let now = Instant::now();
        let mut tracker = DeliveryTracker::default();

        tracker.queue_announce(now + Duration::from_secs(3));
        tracker.queue_response();
        tracker.sent(1);
        tracker.sent(1);
        tracker.sent(2);

        assert!(tracker.queued.is_empty());
        assert!(tracker.completed(1));
        assert!(!tracker.completed(2));
    }

    #[test]
    fn test_tracker_replayed_expired_announce_keeps_queue_aligned() {
        let now = Instant::now();
        let mut tracker = DeliveryTracker::default();

        tracker.queue_announce(now + Duration::from_secs(1));
        tracker.sent(7);
        assert_eq!(tracker.expire(now + Duration::from_secs(2)), 1);

        tracker.queue_response();
        tracker.queue_announce(now + Duration::from_secs(5));

        // replay of 7 after reconnect must not take the response's slot
        tracker.sent(7);
        tracker.sent(8);
        tracker.sent(9);
        assert!(tracker.queued.is_empty());

        assert!(!tracker.completed(8));
        assert!(tracker.completed(9));

        // PUBCOMP for the replay clears it, so 7 can be reused
        assert!(!tracker.completed(7));
        tracker.queue_announce(now + Duration::from_secs(9));
        tracker.sent(7);
        assert!(tracker.completed(7));
    }

    #[tokio::test]
    async fn test_broker_queues_until_full() {
        let (handle, _inbox) = Dispatcher::channel(10, FieldFailurePolicy::KeepDegraded);
        let (broker, mut session) = mqtt_broker(&MqttConfig::default(), handle).unwrap();

        broker.announce();
        broker.send_response(Bytes::from_static(b"{\"speed\":1}"));

        assert!(matches!(session.outbound.try_recv(), Ok(Outbound::Announce)));
        match session.outbound.try_recv() {
            Ok(Outbound::Response(payload)) => assert_eq!(payload, Bytes::from_static(b"{\"speed\":1}")),
            other => panic!("unexpected {:?}", other),
        }

        for _ in 0..limits::BROKER_QUEUE_CAPACITY + 5 {
            broker.announce();
        }
        let mut queued = 0;
        while session.outbound.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, limits::BROKER_QUEUE_CAPACITY);
    }

    #[test]
    fn test_session_topics_and_url() {
        let (handle, _inbox) = Dispatcher::channel(10, FieldFailurePolicy::KeepDegraded);
        let config = MqttConfig {
            broker: "mqtt://broker.local".into(),
            ship_id: "ship-9".into(),
            ..Default::default()
        };
        let (_broker, session) = mqtt_broker(&config, handle).unwrap();

        assert_eq!(session.request_topic, "ship/ship-9/request");
        assert_eq!(session.response_topic, "ship/ship-9/response");
        assert_eq!(session.url.port, 1883);
        assert!(session.options().is_ok());
    }

    #[test]
    fn test_invalid_broker_url_rejected() {
        let (handle, _inbox) = Dispatcher::channel(10, FieldFailurePolicy::KeepDegraded);
        let config = MqttConfig {
            broker: "ws://broker.local".into(),
            ..Default::default()
        };
        assert!(mqtt_broker(&config, handle).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_broker_times_out() {
        let (handle, _inbox) = Dispatcher::channel(10, FieldFailurePolicy::KeepDegraded);
        let config = MqttConfig {
            // reserved TEST-NET address, never answers
            broker: "tcp://192.0.2.1:1883".into(),
            conn_timeout: 200,
            ..Default::default()
        };
        let (_broker, session) = mqtt_broker(&config, handle).unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);

        assert!(session.run(stop_rx).await.is_err());
    }
}
