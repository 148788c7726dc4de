//! Live subscriptions.
//!
//! A SUBSCRIBE request turns its connection into a push channel. The
//! connection task owns the writer and drains a bounded queue of outbound
//! frames; a separate task owns the reader and watches for the matching
//! UNSUBSCRIBE. Resources arrive in the queue from two sources:
//!
//! - local PUBLISH/SHARE, via [`SubscriptionHub::notify`]
//! - relay tasks holding persistent SUBSCRIBE connections to peers
//!
//! Every participant observes the same [`SubscriptionState`]. Once it is
//! `Stopped` nothing more is forwarded, relay tasks send UNSUBSCRIBE to
//! their peers and exit, and the subscription is dropped from the hub.

use crate::context::{Mode, ServerContext};
use dashmap::DashMap;
use serde_json::Value;
use sharemesh_types::{PeerAddress, Resource};
use sharemesh_wire::{
    open_persistent, Command, FrameReader, FrameWriter, Reply, Response, ResultSize, Transport,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Frames a subscriber may fall behind by before it is stopped.
const OUTBOUND_CAPACITY: usize = 256;

/// Lifecycle of a subscription. Only ever moves from `Running` to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Running,
    Stopped,
}

#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(String),
    Unsubscribe,
}

/// A validated SUBSCRIBE request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeRequest {
    pub id: String,
    pub template: Resource,
    pub relay: bool,
}

/// One live subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    pub template: Resource,
    pub relay: bool,
    pub mode: Mode,
    state: watch::Sender<SubscriptionState>,
    result_count: AtomicU64,
    outbound: mpsc::Sender<Outbound>,
}

impl Subscription {
    pub(crate) fn new(
        request: SubscribeRequest,
        mode: Mode,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (state, _) = watch::channel(SubscriptionState::Running);
        let sub = Arc::new(Self {
            id: request.id,
            template: request.template,
            relay: request.relay,
            mode,
            state,
            result_count: AtomicU64::new(0),
            outbound,
        });
        (sub, rx)
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SubscriptionState::Running
    }

    /// Move to `Stopped`. Returns `true` if this call made the transition.
    pub fn stop(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SubscriptionState::Running {
                *state = SubscriptionState::Stopped;
                true
            } else {
                false
            }
        })
    }

    /// Number of resource frames delivered to the subscriber so far.
    pub fn result_count(&self) -> u64 {
        self.result_count.load(Ordering::Relaxed)
    }

    fn watch(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Queue a resource frame for the subscriber. A full or closed queue
    /// stops the subscription.
    pub fn forward(&self, frame: String) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.outbound.try_send(Outbound::Frame(frame)) {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %self.id, error = %e, "Subscriber not accepting updates, stopping");
                self.stop();
                false
            }
        }
    }

    /// Offer a locally registered resource. Forwards it, anonymized, if
    /// it matches this subscription's template.
    pub fn offer(&self, resource: &Resource) -> bool {
        if !self.is_running() || !self.template.matches_update(resource) {
            return false;
        }
        match serde_json::to_string(&resource.anonymized()) {
            Ok(text) => self.forward(text),
            Err(_) => false,
        }
    }
}

/// All active subscriptions on this server, across both modes.
#[derive(Debug, Default)]
pub struct SubscriptionHub {
    next_key: AtomicU64,
    active: DashMap<u64, Arc<Subscription>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sub: Arc<Subscription>) -> u64 {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.active.insert(key, sub);
        key
    }

    pub fn unregister(&self, key: u64) {
        self.active.remove(&key);
    }

    /// Offer a newly stored resource to every running subscription.
    /// Returns how many subscriptions accepted it.
    pub fn notify(&self, resource: &Resource) -> usize {
        self.active
            .iter()
            .filter(|entry| entry.value().offer(resource))
            .count()
    }

    /// Running, relay-enabled subscriptions opened in `mode`.
    pub fn relaying(&self, mode: Mode) -> Vec<Arc<Subscription>> {
        self.active
            .iter()
            .filter(|entry| {
                let sub = entry.value();
                sub.relay && sub.mode == mode && sub.is_running()
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Start relaying every relay-enabled subscription in `mode` to a newly
/// discovered peer.
pub fn relay_to_new_peer(ctx: &ServerContext, mode: Mode, peer: &PeerAddress) {
    let Some(transport) = ctx.transport(mode) else {
        return;
    };
    for sub in ctx.subscriptions.relaying(mode) {
        spawn_relay(sub, peer.clone(), Arc::clone(&transport));
    }
}

/// Serve an accepted SUBSCRIBE on its connection until the subscription
/// stops.
pub async fn serve(
    ctx: Arc<ServerContext>,
    mode: Mode,
    request: SubscribeRequest,
    mut reader: FrameReader,
    mut writer: FrameWriter,
) {
    let ack = Response::subscribed(request.id.clone());
    let (sub, mut outbound) = Subscription::new(request, mode);
    let key = ctx.subscriptions.register(Arc::clone(&sub));

    if let Err(e) = writer.write_json(&ack).await {
        debug!(id = %sub.id, error = %e, "Failed to acknowledge subscription");
        sub.stop();
        ctx.subscriptions.unregister(key);
        return;
    }
    debug!(id = %sub.id, "SENT: {}", ack.to_frame());
    info!(id = %sub.id, mode = %mode, relay = sub.relay, "Subscription started");

    reader.set_timeout(None);
    let listener = tokio::spawn(listen_for_unsubscribe(
        reader,
        Arc::clone(&sub),
        sub.outbound.clone(),
    ));

    if sub.relay {
        if let Some(transport) = ctx.transport(mode) {
            for peer in ctx.directory(mode).others() {
                spawn_relay(Arc::clone(&sub), peer, Arc::clone(&transport));
            }
        }
    }

    let mut state = sub.watch();
    loop {
        tokio::select! {
            biased;
            message = outbound.recv() => match message {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = writer.write_frame(&text).await {
                        debug!(id = %sub.id, error = %e, "Subscriber connection lost");
                        break;
                    }
                    sub.result_count.fetch_add(1, Ordering::Relaxed);
                    debug!(id = %sub.id, "SENT: {}", text);
                }
                Some(Outbound::Unsubscribe) => {
                    let trailer = ResultSize::new(sub.result_count());
                    let _ = writer.write_json(&trailer).await;
                    debug!(id = %sub.id, "SENT: {}", trailer.to_frame());
                    break;
                }
                None => break,
            },
            _ = stopped(&mut state) => break,
        }
    }

    sub.stop();
    ctx.subscriptions.unregister(key);
    listener.abort();
    let _ = writer.shutdown().await;
    info!(id = %sub.id, results = sub.result_count(), "Subscription ended");
}

async fn stopped(state: &mut watch::Receiver<SubscriptionState>) {
    let _ = state.wait_for(|s| *s == SubscriptionState::Stopped).await;
}

async fn listen_for_unsubscribe(
    mut reader: FrameReader,
    sub: Arc<Subscription>,
    outbound: mpsc::Sender<Outbound>,
) {
    loop {
        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(id = %sub.id, error = %e, "Subscriber stopped sending");
                sub.stop();
                return;
            }
        };
        debug!(id = %sub.id, "RECEIVED: {}", frame);

        let value: Value = match serde_json::from_str(&frame) {
            Ok(value) => value,
            Err(_) => {
                sub.stop();
                return;
            }
        };
        let is_unsubscribe = value.get("command").and_then(Value::as_str) == Some("UNSUBSCRIBE")
            && value.get("id").and_then(Value::as_str) == Some(sub.id.as_str());
        if is_unsubscribe {
            if outbound.send(Outbound::Unsubscribe).await.is_err() {
                sub.stop();
            }
            return;
        }
    }
}

/// Hold a persistent subscription on `peer` on behalf of `sub`, forwarding
/// every resource it pushes until `sub` stops or the peer goes away.
pub fn spawn_relay(
    sub: Arc<Subscription>,
    peer: PeerAddress,
    transport: Arc<dyn Transport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !sub.is_running() {
            return;
        }
        let command = Command::Subscribe {
            resource_template: sub.template.clone(),
            relay: false,
            id: sub.id.clone(),
        };
        let opened = open_persistent(transport.as_ref(), &peer, &command).await;
        let (mut reader, mut writer) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                debug!(id = %sub.id, peer = %peer, error = %e, "Relay connection failed");
                return;
            }
        };
        debug!(id = %sub.id, peer = %peer, "Relay started");

        let mut state = sub.watch();
        loop {
            tokio::select! {
                _ = stopped(&mut state) => {
                    let unsubscribe = Command::Unsubscribe { id: sub.id.clone() };
                    if writer.write_json(&unsubscribe).await.is_ok() {
                        debug!(id = %sub.id, peer = %peer, "SENT: UNSUBSCRIBE");
                    }
                    break;
                }
                frame = reader.read_frame() => {
                    let frame = match frame {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!(id = %sub.id, peer = %peer, error = %e, "Relay closed");
                            break;
                        }
                    };
                    debug!(id = %sub.id, peer = %peer, "RECEIVED: {}", frame);
                    match Reply::parse(&frame) {
                        Ok(Reply::Resource(_)) => {
                            if !sub.forward(frame) {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            }
        }
        let _ = writer.shutdown().await;
        debug!(id = %sub.id, peer = %peer, "Relay ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, tags: &[&str], relay: bool) -> SubscribeRequest {
        SubscribeRequest {
            id: id.to_string(),
            template: Resource {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            },
            relay,
        }
    }

    fn tagged(uri: &str, owner: &str, tags: &[&str]) -> Resource {
        Resource {
            uri: uri.to_string(),
            owner: owner.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_offer_forwards_matching_anonymized() {
        let (sub, mut rx) =
            Subscription::new(request("s1", &["Music", "video"], false), Mode::Plain);

        assert!(sub.offer(&tagged("http://a/1", "alice", &["music"])));
        assert!(!sub.offer(&tagged("http://a/2", "alice", &["text"])));

        match rx.recv().await {
            Some(Outbound::Frame(text)) => {
                let r: Resource = serde_json::from_str(&text).unwrap();
                assert_eq!(r.uri, "http://a/1");
                assert_eq!(r.owner, "*");
            }
            other => panic!("Expected frame, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_transitions_once() {
        let (sub, _rx) = Subscription::new(request("s1", &[], false), Mode::Plain);
        let mut watcher = sub.watch();
        assert!(sub.is_running());
        assert!(sub.stop());
        assert!(!sub.stop());
        assert_eq!(sub.state(), SubscriptionState::Stopped);
        watcher
            .wait_for(|s| *s == SubscriptionState::Stopped)
            .await
            .unwrap();
        assert!(!sub.forward("{}".to_string()));
    }

    #[tokio::test]
    async fn test_full_queue_stops_subscription() {
        let (sub, _rx) = Subscription::new(request("s1", &[], false), Mode::Plain);
        for _ in 0..OUTBOUND_CAPACITY {
            assert!(sub.forward("{}".to_string()));
        }
        assert!(!sub.forward("{}".to_string()));
        assert_eq!(sub.state(), SubscriptionState::Stopped);
    }

    #[tokio::test]
    async fn test_hub_notify_and_relaying() {
        let hub = SubscriptionHub::new();
        let (plain, _rx1) = Subscription::new(request("a", &["x"], true), Mode::Plain);
        let (secure, _rx2) = Subscription::new(request("b", &["x"], true), Mode::Secure);
        let (quiet, _rx3) = Subscription::new(request("c", &["y"], false), Mode::Plain);
        let key = hub.register(Arc::clone(&plain));
        hub.register(Arc::clone(&secure));
        hub.register(Arc::clone(&quiet));

        assert_eq!(hub.notify(&tagged("http://a/1", "", &["x"])), 2);

        let relaying: Vec<_> = hub.relaying(Mode::Plain).iter().map(|s| s.id.clone()).collect();
        assert_eq!(relaying, vec!["a".to_string()]);

        plain.stop();
        assert!(hub.relaying(Mode::Plain).is_empty());
        hub.unregister(key);
        assert_eq!(hub.len(), 2);
    }
}
