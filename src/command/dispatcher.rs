//! Dispatcher - the single arbitration point of the bridge
//!
//! Producers (broker adapter, peer adapters) only ever hold a
//! [`DispatcherHandle`] and enqueue onto bounded channels. One task runs
//! [`Dispatcher::run`], which owns the `auto_nav` flag and makes every
//! collaborator call, one event at a time.

use super::handlers::{self, HandlerContext};
use super::peers::{Broker, ControlPeer, NavPeer};
use bytes::Bytes;
use ship_bridge_shared::{CommandCategory, FieldFailurePolicy, Request, RequestType};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of handling one request
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Request turned into a peer call
    Dispatched { message: String },
    /// Request rejected, no peer call made
    Rejected { message: String },
}

/// Producer side of the dispatcher queues
#[derive(Clone)]
pub struct DispatcherHandle {
    requests: mpsc::Sender<Request>,
    responses: mpsc::Sender<Bytes>,
    net_loss: mpsc::Sender<()>,
    policy: FieldFailurePolicy,
}

impl DispatcherHandle {
    /// Decode an inbound request and queue it for dispatch
    ///
    /// Undecodable messages are logged and dropped here, they never reach
    /// the dispatch loop.
    pub fn handle_request(&self, msg: Bytes) {
        let request = match Request::decode(msg, self.policy) {
            Ok(request) => request,
            Err(e) => {
                error!("[CORE] failed to decode request: {}", e);
                return;
            }
        };

        enqueue(&self.requests, request, "request");
    }

    /// Queue a peer response for forwarding to the broker
    pub fn handle_response(&self, resp: Bytes) {
        enqueue(&self.responses, resp, "response");
    }

    /// Signal that the remote link was lost
    pub fn net_loss(&self) {
        enqueue(&self.net_loss, (), "net-loss");
    }
}

fn enqueue<T>(tx: &mpsc::Sender<T>, item: T, what: &str) {
    match tx.try_send(item) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("[CORE] {} queue full, dropping {}", what, what);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("[CORE] dispatcher stopped, dropping {}", what);
        }
    }
}

/// Consumer side of the dispatcher queues
pub struct DispatcherInbox {
    requests: mpsc::Receiver<Request>,
    responses: mpsc::Receiver<Bytes>,
    net_loss: mpsc::Receiver<()>,
}

#[cfg(test)]
impl DispatcherInbox {
    pub(crate) async fn recv_response(&mut self) -> Option<Bytes> {
        self.responses.recv().await
    }

    pub(crate) async fn recv_net_loss(&mut self) -> Option<()> {
        self.net_loss.recv().await
    }

    pub(crate) fn try_recv_request(&mut self) -> Option<Request> {
        self.requests.try_recv().ok()
    }
}

/// The command dispatcher
pub struct Dispatcher<C, N, B> {
    control: C,
    nav: N,
    broker: B,
    announce_interval: Duration,
    auto_nav: bool,
    inbox: DispatcherInbox,
}

impl Dispatcher<(), (), ()> {
    /// Create the dispatcher queues
    ///
    /// The handle can be cloned into collaborators before the dispatcher
    /// itself is assembled with [`Dispatcher::new`].
    pub fn channel(
        capacity: usize,
        policy: FieldFailurePolicy,
    ) -> (DispatcherHandle, DispatcherInbox) {
        let capacity = capacity.max(1);
        let (requests_tx, requests_rx) = mpsc::channel(capacity);
        let (responses_tx, responses_rx) = mpsc::channel(capacity);
        let (net_loss_tx, net_loss_rx) = mpsc::channel(capacity);

        let handle = DispatcherHandle {
            requests: requests_tx,
            responses: responses_tx,
            net_loss: net_loss_tx,
            policy,
        };
        let inbox = DispatcherInbox {
            requests: requests_rx,
            responses: responses_rx,
            net_loss: net_loss_rx,
        };

        (handle, inbox)
    }
}

impl<C, N, B> Dispatcher<C, N, B>
where
    C: ControlPeer,
    N: NavPeer,
    B: Broker,
{
    /// Assemble the dispatcher around its collaborators
    pub fn new(
        inbox: DispatcherInbox,
        control: C,
        nav: N,
        broker: B,
        announce_interval: Duration,
    ) -> Self {
        Self {
            control,
            nav,
            broker,
            announce_interval: announce_interval.max(Duration::from_millis(1)),
            auto_nav: false,
            inbox,
        }
    }

    /// Whether autonomous navigation is engaged
    pub fn auto_nav(&self) -> bool {
        self.auto_nav
    }

    /// Run the dispatch loop until the shutdown signal flips
    ///
    /// Everything queued when the signal arrives is still processed before
    /// returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!("[CORE] starting");

        let mut announce = interval_at(
            Instant::now() + self.announce_interval,
            self.announce_interval,
        );
        announce.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(request) = self.inbox.requests.recv() => {
                    self.handle_request(request);
                }
                Some(resp) = self.inbox.responses.recv() => {
                    self.broker.send_response(resp);
                }
                _ = announce.tick() => {
                    debug!("[CORE] announce");
                    self.broker.announce();
                }
                Some(()) = self.inbox.net_loss.recv() => {
                    warn!("[CORE] net loss reported, notifying ship-nav");
                    self.nav.net_loss();
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        self.drain();
        info!("[CORE] stopped, autonav {}", self.auto_nav());
    }

    fn drain(&mut self) {
        let mut drained = 0usize;

        while let Ok(request) = self.inbox.requests.try_recv() {
            self.handle_request(request);
            drained += 1;
        }
        while let Ok(()) = self.inbox.net_loss.try_recv() {
            self.nav.net_loss();
            drained += 1;
        }
        while let Ok(resp) = self.inbox.responses.try_recv() {
            self.broker.send_response(resp);
            drained += 1;
        }

        if drained > 0 {
            info!("[CORE] drained {} queued events on stop", drained);
        }
    }

    /// Classify one request and make at most one peer call for it
    pub fn handle_request(&mut self, request: Request) -> CommandResult {
        let mut ctx = HandlerContext {
            control: &self.control,
            nav: &self.nav,
            auto_nav: &mut self.auto_nav,
        };

        let result = match request.request_type() {
            Some(RequestType::Query) => handlers::handle_query(&mut ctx),
            Some(RequestType::Cmd) => match request.command() {
                Some(cmd) => match cmd.category() {
                    CommandCategory::DirectControl => {
                        handlers::handle_direct_control(&mut ctx, cmd, &request)
                    }
                    CommandCategory::NavigationStart => handlers::handle_nav_start(&mut ctx),
                    CommandCategory::NavigationStop => handlers::handle_nav_stop(&mut ctx),
                    CommandCategory::WaypointMutation => {
                        handlers::handle_waypoint_mutation(&mut ctx, cmd, request)
                    }
                    CommandCategory::Calibration => handlers::handle_calibration(&mut ctx, cmd),
                },
                None => CommandResult::Rejected {
                    message: format!("unknown command: {}", request.cmd_name()),
                },
            },
            None => CommandResult::Rejected {
                message: format!("unknown request type: {}", request.type_name()),
            },
        };

        match &result {
            CommandResult::Dispatched { message } => debug!("[CORE] {}", message),
            CommandResult::Rejected { message } => error!("[CORE] {}", message),
        }

        result
    }
}
