use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use serde_json::Value;

use crate::host::HostError;
use crate::runtime::{MessageHandler, WebWindow};

/// Prefix content puts in front of every event it raises.
pub const CONTENT_PREFIX: &str = "ipc:";

pub type IpcCallback = Arc<dyn Fn(&[Value]) + Send + Sync + 'static>;

/// One named event with its JSON arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct IpcMessage {
    pub event: String,
    pub args: Vec<Value>,
}

impl IpcMessage {
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Reads `ipc:{event} {json array}` as raised by content. Anything else is not an event.
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix(CONTENT_PREFIX)?;
        let (event, args) = body.split_once(' ')?;
        if event.is_empty() {
            return None;
        }
        let args: Vec<Value> = serde_json::from_str(args).ok()?;
        Some(Self::new(event, args))
    }

    /// Writes `{event}:{json array}`, the form content splits on its first colon.
    pub fn encode(&self) -> String {
        let args = serde_json::to_string(&self.args).unwrap_or_else(|_| "[]".to_owned());
        format!("{}:{args}", self.event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    callback: IpcCallback,
    once: bool,
}

#[derive(Default)]
struct Registry {
    events: Mutex<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn subscribe(&self, event: &str, callback: IpcCallback, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.events
            .lock()
            .entry(event.to_owned())
            .or_default()
            .push(Subscription { id, callback, once });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut events = self.events.lock();
        let mut removed = false;
        events.retain(|_, subscriptions| {
            let before = subscriptions.len();
            subscriptions.retain(|subscription| subscription.id != id);
            removed |= subscriptions.len() != before;
            !subscriptions.is_empty()
        });
        removed
    }

    /// Calls a snapshot of the subscribers outside the lock, so callbacks may subscribe
    /// and unsubscribe freely. One-shot subscribers are removed before they run.
    fn dispatch(&self, message: &IpcMessage) -> usize {
        let callbacks: Vec<IpcCallback> = {
            let mut events = self.events.lock();
            let Some(subscriptions) = events.get_mut(&message.event) else {
                trace!("no subscribers for ipc event {:?}", message.event);
                return 0;
            };
            let callbacks = subscriptions
                .iter()
                .map(|subscription| Arc::clone(&subscription.callback))
                .collect();
            subscriptions.retain(|subscription| !subscription.once);
            if subscriptions.is_empty() {
                events.remove(&message.event);
            }
            callbacks
        };

        for callback in &callbacks {
            callback(&message.args);
        }
        callbacks.len()
    }
}

/// Named events between the host and content, layered over a window's message channel.
///
/// Subscribers run on a dedicated worker thread in arrival order, never on the UI thread,
/// so they may call back into the window and wait for the result.
#[derive(Clone)]
pub struct Ipc {
    window: WebWindow,
    registry: Arc<Registry>,
    inbox: mpsc::Sender<IpcMessage>,
}

impl Ipc {
    pub fn new(window: WebWindow) -> Result<Self, HostError> {
        let registry = Arc::new(Registry::default());
        let (inbox, messages) = mpsc::channel::<IpcMessage>();
        let worker_registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("webwindow-ipc".to_owned())
            .spawn(move || {
                for message in messages {
                    worker_registry.dispatch(&message);
                }
                debug!("ipc worker finished");
            })
            .map_err(HostError::Worker)?;

        Ok(Self {
            window,
            registry,
            inbox,
        })
    }

    /// Creates the bridge and installs it as the window's message handler.
    pub fn attach(window: WebWindow) -> Result<Self, HostError> {
        let ipc = Self::new(window.clone())?;
        window.set_message_handler(Some(ipc.message_handler()))?;
        Ok(ipc)
    }

    pub fn on(
        &self,
        event: &str,
        callback: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.registry.subscribe(event, Arc::new(callback), false)
    }

    pub fn once(
        &self,
        event: &str,
        callback: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.registry.subscribe(event, Arc::new(callback), true)
    }

    pub fn off(&self, subscription: SubscriptionId) -> bool {
        self.registry.unsubscribe(subscription)
    }

    pub fn send(&self, event: &str, args: Vec<Value>) -> Result<(), HostError> {
        self.window
            .send_message(&IpcMessage::new(event, args).encode())
    }

    /// Decodes a raw content message and queues it for the subscribers.
    pub fn receive(&self, raw: &str) -> bool {
        let Some(message) = IpcMessage::parse(raw) else {
            trace!("ignoring non-ipc message: {raw:?}");
            return false;
        };
        if self.inbox.send(message).is_err() {
            warn!("ipc worker is gone; dropping message");
            return false;
        }
        true
    }

    /// A handler suitable for [`WebWindow::set_message_handler`].
    pub fn message_handler(&self) -> MessageHandler {
        let ipc = self.clone();
        Box::new(move |raw: &str| {
            ipc.receive(raw);
        })
    }
}
