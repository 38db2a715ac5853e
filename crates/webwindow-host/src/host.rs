use std::cell::RefCell;

use log::{debug, error, warn};
use thiserror::Error;
use webwindow_core::{
    settle_send, AttachmentState, Dequeued, DispatchError, DomainError, EventSource,
    HeadlessConfig, HeadlessPlatform, Pump, ShowStep, UiDomain, UiHandle, WindowId,
};

use crate::config::{self, ConfigError, HostConfig};

/// Platform the host drives on every UI thread.
pub type DefaultPlatform = HeadlessPlatform;
pub type Domain = UiDomain<DefaultPlatform>;
pub type Handle = UiHandle<DefaultPlatform>;

thread_local! {
    static DOMAIN: RefCell<Option<Domain>> = const { RefCell::new(None) };
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("the UI domain is busy on this thread; the call cannot complete re-entrantly")]
    DomainBusy,
    #[error("parent window belongs to another UI thread")]
    ForeignParent,
    #[error("no UI domain exists on this thread")]
    NoDomain,
    #[error("the event loop can only run on the window's UI thread")]
    NotUiThread,
    #[error("cannot turn {0:?} into a file URL")]
    InvalidLocalPath(String),
    #[error("failed to start worker thread: {0}")]
    Worker(#[source] std::io::Error),
}

pub(crate) enum Access<R> {
    Ran(R),
    Busy,
    Missing,
}

impl<R> Access<R> {
    pub(crate) fn into_result(self) -> Result<R, HostError> {
        match self {
            Access::Ran(value) => Ok(value),
            Access::Busy => Err(HostError::DomainBusy),
            Access::Missing => Err(HostError::NoDomain),
        }
    }
}

/// Makes the calling thread a UI thread, creating its domain the first time.
pub(crate) fn ensure_domain() -> Result<Handle, HostError> {
    let config = config::global();
    match with_domain(|domain| domain.handle()) {
        Access::Ran(handle) => Ok(handle),
        Access::Busy => Err(HostError::DomainBusy),
        Access::Missing => Ok(install_domain(new_domain(config))),
    }
}

pub(crate) fn with_domain<R>(f: impl FnOnce(&mut Domain) -> R) -> Access<R> {
    DOMAIN.with(|slot| match slot.try_borrow_mut() {
        Ok(mut guard) => match guard.as_mut() {
            Some(domain) => Access::Ran(f(domain)),
            None => Access::Missing,
        },
        Err(_) => Access::Busy,
    })
}

/// True while this thread's domain is borrowed by an event being handled.
pub(crate) fn is_busy() -> bool {
    DOMAIN.with(|slot| slot.try_borrow_mut().is_err())
}

/// Replaces this thread's domain. Windows owned by a previous domain are dropped with it.
pub fn install_domain(domain: Domain) -> Handle {
    let handle = domain.handle();
    DOMAIN.with(|slot| {
        *slot.borrow_mut() = Some(domain);
    });
    debug!("UI domain installed on {:?}", handle.ui_thread());
    handle
}

/// Drives this thread's queue, borrowing the domain for one event at a time. Jobs and callbacks
/// run with the domain released, so they can call back into any window.
pub(crate) struct HostPump {
    events: EventSource<DefaultPlatform>,
}

impl HostPump {
    pub(crate) fn new() -> Result<Self, HostError> {
        let events = with_domain(|domain| domain.events()).into_result()?;
        Ok(Self { events })
    }

    /// Handles one queued item. Returns false when nothing could be dequeued.
    pub(crate) fn dispatch(&mut self, block: bool) -> bool {
        let Some(next) = self.events.next(block) else {
            return false;
        };
        match next {
            Dequeued::Local(job) => job(),
            Dequeued::Event(event) => match with_domain(move |domain| domain.handle_event(event)) {
                Access::Ran(Some(followup)) => followup(),
                Access::Ran(None) => {}
                Access::Busy => error!("event dropped: UI domain is busy"),
                Access::Missing => warn!("event dropped: UI domain is gone"),
            },
        }
        true
    }
}

impl Pump for HostPump {
    fn pump_once(&mut self) {
        self.dispatch(true);
    }
}

/// Runs this thread's event loop until `root` closes.
pub(crate) fn run_loop(root: WindowId) -> Result<(), HostError> {
    let mut pump = HostPump::new()?;
    let frame = with_domain(|domain| domain.enter_loop(root)).into_result()??;
    while let Access::Ran(false) = with_domain(|domain| domain.loop_finished()) {
        if !pump.dispatch(true) {
            warn!("event loop for {root} ended: queue disconnected");
            break;
        }
    }
    with_domain(move |domain| domain.leave_loop(frame)).into_result()
}

/// Shows `window`. A first show attaches the browser with the domain released between engine
/// steps.
pub(crate) fn show(window: WindowId) -> Result<AttachmentState, HostError> {
    match with_domain(|domain| domain.begin_show(window)).into_result()?? {
        ShowStep::Shown(state) => Ok(state),
        ShowStep::Attach(pending) => {
            debug!("attaching a browser to {}", pending.window());
            let attached = pending.run(&mut HostPump::new()?);
            Ok(with_domain(move |domain| domain.finish_show(attached)).into_result()??)
        }
    }
}

/// Sends `message` to content, pumping with the domain released until the engine accepts it.
pub(crate) fn send_message(window: WindowId, message: &str) -> Result<(), HostError> {
    let outbound = with_domain(|domain| domain.begin_send_message(window, message))
        .into_result()??;
    Ok(settle_send(outbound, &mut HostPump::new()?)?)
}

fn new_domain(config: &HostConfig) -> Domain {
    let mut platform_config = HeadlessConfig::default();
    if let Some(size) = config.default_size {
        platform_config.default_size = size;
    }
    let mut domain = UiDomain::new(HeadlessPlatform::new(platform_config));
    domain.set_view_settings(config.view_settings());
    domain
}
