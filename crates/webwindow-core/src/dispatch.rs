use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use log::{trace, warn};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::completion::completion;
use crate::domain::UiDomain;
use crate::geometry::{Position, Size};
use crate::ids::{RawSurface, WindowId};
use crate::platform::{MessageKind, Platform};

pub type Job = Box<dyn FnOnce() + Send + 'static>;
pub type LocalJob = Box<dyn FnOnce() + 'static>;
pub type Command<P> = Box<dyn FnOnce(&mut UiDomain<P>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("the UI thread is no longer receiving events")]
    Disconnected,
    #[error("blocking call issued from the UI thread itself")]
    OnUiThread,
}

/// Completion flag plus wake-up primitive for one cross-thread invocation.
#[derive(Debug, Default)]
pub struct PendingInvocation {
    completed: Mutex<bool>,
    signal: Condvar,
}

impl PendingInvocation {
    pub fn is_completed(&self) -> bool {
        *self.completed.lock()
    }

    fn mark_completed(&self) {
        let mut completed = self.completed.lock();
        *completed = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut completed = self.completed.lock();
        while !*completed {
            self.signal.wait(&mut completed);
        }
    }
}

/// Travels with a posted invocation and signals it when dropped, which happens right after the
/// job ran or when the event is discarded by a queue that shut down.
pub struct InvocationGuard(Arc<PendingInvocation>);

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        self.0.mark_completed();
    }
}

pub enum UiEvent<P: Platform> {
    Invoke {
        job: Job,
        guard: Option<InvocationGuard>,
    },
    Command {
        command: Command<P>,
        guard: Option<InvocationGuard>,
    },
    Resized {
        surface: RawSurface,
        size: Size,
    },
    Moved {
        surface: RawSurface,
        position: Position,
    },
    Closed {
        surface: RawSurface,
    },
    ShowMessage {
        window: WindowId,
        title: String,
        body: String,
        kind: MessageKind,
    },
}

pub(crate) struct Envelope<P: Platform> {
    sequence: u64,
    event: UiEvent<P>,
}

/// Thread-safe entry point into one UI thread's event queue.
pub struct UiHandle<P: Platform> {
    sender: Sender<Envelope<P>>,
    sequence: Arc<AtomicU64>,
    ui_thread: ThreadId,
}

impl<P: Platform> Clone for UiHandle<P> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            sequence: Arc::clone(&self.sequence),
            ui_thread: self.ui_thread,
        }
    }
}

impl<P: Platform> UiHandle<P> {
    pub fn ui_thread(&self) -> ThreadId {
        self.ui_thread
    }

    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.ui_thread
    }

    pub fn send(&self, event: UiEvent<P>) -> Result<(), DispatchError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.sender
            .send(Envelope { sequence, event })
            .map_err(|_| DispatchError::Disconnected)
    }

    /// Runs `job` on the UI thread and returns once it has finished. On the UI thread itself the
    /// job runs inline. Return values and panics are not carried back to the caller.
    pub fn invoke(&self, job: impl FnOnce() + Send + 'static) {
        if self.is_ui_thread() {
            job();
            return;
        }

        let pending = Arc::new(PendingInvocation::default());
        let event = UiEvent::Invoke {
            job: Box::new(job),
            guard: Some(InvocationGuard(Arc::clone(&pending))),
        };
        if self.send(event).is_err() {
            warn!("invoke dropped: UI thread {:?} has shut down", self.ui_thread);
            return;
        }
        pending.wait();
    }

    /// Queues `job` without waiting for it.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<(), DispatchError> {
        self.send(UiEvent::Invoke {
            job: Box::new(job),
            guard: None,
        })
    }

    pub fn post_command(
        &self,
        command: impl FnOnce(&mut UiDomain<P>) + Send + 'static,
    ) -> Result<(), DispatchError> {
        self.send(UiEvent::Command {
            command: Box::new(command),
            guard: None,
        })
    }

    /// Runs `command` against the domain on the UI thread and hands its result back. Only valid
    /// off the UI thread.
    pub fn call<R: Send + 'static>(
        &self,
        command: impl FnOnce(&mut UiDomain<P>) -> R + Send + 'static,
    ) -> Result<R, DispatchError> {
        if self.is_ui_thread() {
            return Err(DispatchError::OnUiThread);
        }
        let (completer, completion) = completion();
        self.post_command(move |domain| completer.complete(command(domain)))?;
        completion.wait().map_err(|_| DispatchError::Disconnected)
    }

    /// Fire-and-post: the caller never waits for the box to be dismissed.
    pub fn show_message(
        &self,
        window: WindowId,
        title: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<(), DispatchError> {
        self.send(UiEvent::ShowMessage {
            window,
            title: title.to_owned(),
            body: body.to_owned(),
            kind,
        })
    }
}

/// UI-thread-only poster for engine callbacks, which may capture non-`Send` state.
#[derive(Clone)]
pub struct LocalPoster {
    queue: Rc<RefCell<VecDeque<(u64, LocalJob)>>>,
    sequence: Arc<AtomicU64>,
}

impl LocalPoster {
    pub fn post(&self, job: impl FnOnce() + 'static) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.queue.borrow_mut().push_back((sequence, Box::new(job)));
    }
}

pub enum Dequeued<P: Platform> {
    Event(UiEvent<P>),
    Local(LocalJob),
}

/// Merges cross-thread events and local jobs by the order they were posted in.
struct EventQueue<P: Platform> {
    receiver: Receiver<Envelope<P>>,
    remote: VecDeque<Envelope<P>>,
    local: Rc<RefCell<VecDeque<(u64, LocalJob)>>>,
}

/// Read end of one UI thread's queue. Clones share the queue, so a loop can dequeue without
/// holding the domain that owns it.
pub struct EventSource<P: Platform> {
    queue: Rc<RefCell<EventQueue<P>>>,
}

impl<P: Platform> Clone for EventSource<P> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<P: Platform> EventSource<P> {
    /// Takes the oldest pending item. With `block` set, waits for one unless every sender is
    /// gone. Nothing is run here; the caller decides how.
    pub fn next(&self, block: bool) -> Option<Dequeued<P>> {
        self.queue.borrow_mut().next(block)
    }
}

pub(crate) fn event_queue<P: Platform>() -> (UiHandle<P>, LocalPoster, EventSource<P>) {
    let (sender, receiver) = mpsc::channel();
    let sequence = Arc::new(AtomicU64::new(0));
    let local = Rc::new(RefCell::new(VecDeque::new()));
    let handle = UiHandle {
        sender,
        sequence: Arc::clone(&sequence),
        ui_thread: thread::current().id(),
    };
    let poster = LocalPoster {
        queue: Rc::clone(&local),
        sequence,
    };
    let queue = EventQueue {
        receiver,
        remote: VecDeque::new(),
        local,
    };
    let source = EventSource {
        queue: Rc::new(RefCell::new(queue)),
    };
    (handle, poster, source)
}

impl<P: Platform> EventQueue<P> {
    fn next(&mut self, block: bool) -> Option<Dequeued<P>> {
        loop {
            while let Ok(envelope) = self.receiver.try_recv() {
                self.remote.push_back(envelope);
            }

            let local_front = self.local.borrow().front().map(|(sequence, _)| *sequence);
            let remote_front = self.remote.front().map(|envelope| envelope.sequence);
            let take_local = match (local_front, remote_front) {
                (Some(local), Some(remote)) => local < remote,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => {
                    if !block {
                        return None;
                    }
                    match self.receiver.recv() {
                        Ok(envelope) => {
                            self.remote.push_back(envelope);
                            continue;
                        }
                        Err(_) => return None,
                    }
                }
            };

            if take_local {
                let next = self.local.borrow_mut().pop_front();
                if let Some((sequence, job)) = next {
                    trace!("dequeued local job #{sequence}");
                    return Some(Dequeued::Local(job));
                }
            } else if let Some(envelope) = self.remote.pop_front() {
                trace!("dequeued event #{}", envelope.sequence);
                return Some(Dequeued::Event(envelope.event));
            }
        }
    }
}
