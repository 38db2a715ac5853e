use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::channel::{bootstrap_script, InboundChannel};
use crate::completion::Pump;
use crate::engine::{
    AttachContext, EngineEnvironment, EngineFactory, EngineKind, EngineStatus, EngineView,
    ViewSettings,
};
use crate::scheme::{ResourceBridge, SchemeTable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttachmentState {
    #[default]
    Unattached,
    Attaching(EngineKind),
    Attached(EngineKind),
    Failed(EngineStatus),
}

impl AttachmentState {
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Attached(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("no embedded browser engine could be attached (last status {0})")]
    Exhausted(EngineStatus),
}

impl AttachError {
    pub fn status(&self) -> EngineStatus {
        match self {
            Self::Exhausted(status) => *status,
        }
    }
}

/// The browser bound to one window. Environment and view are released together on drop.
#[derive(Default)]
pub struct BrowserAttachment {
    state: AttachmentState,
    environment: Option<Box<dyn EngineEnvironment>>,
    view: Option<Box<dyn EngineView>>,
}

impl BrowserAttachment {
    pub fn state(&self) -> AttachmentState {
        self.state
    }

    pub fn view(&self) -> Option<&(dyn EngineView + 'static)> {
        self.view.as_deref()
    }

    pub fn view_mut(&mut self) -> Option<&mut (dyn EngineView + 'static)> {
        self.view.as_deref_mut()
    }

    pub fn has_environment(&self) -> bool {
        self.environment.is_some()
    }

    fn enter(&mut self, kind: EngineKind) {
        debug!("attachment: {:?} -> Attaching({kind})", self.state);
        self.state = AttachmentState::Attaching(kind);
    }

    fn complete(
        &mut self,
        kind: EngineKind,
        environment: Box<dyn EngineEnvironment>,
        view: Box<dyn EngineView>,
    ) {
        debug!("attachment: {:?} -> Attached({kind})", self.state);
        self.environment = Some(environment);
        self.view = Some(view);
        self.state = AttachmentState::Attached(kind);
    }

    fn fail(&mut self, status: EngineStatus) {
        debug!("attachment: {:?} -> Failed({status})", self.state);
        self.state = AttachmentState::Failed(status);
    }
}

/// Window-owned pieces a freshly created view is connected to.
pub struct Wiring {
    pub settings: ViewSettings,
    pub schemes: Rc<RefCell<SchemeTable>>,
    pub inbound: Rc<InboundChannel>,
}

/// Walks `chain` in order until one engine yields a view. Each asynchronous step is awaited with
/// `pump`, so the UI queue keeps running; no `RefCell` borrow is held across a pump.
pub fn attach(
    attachment: &RefCell<BrowserAttachment>,
    chain: Vec<Box<dyn EngineFactory>>,
    context: &AttachContext,
    wiring: &Wiring,
    pump: &mut dyn Pump,
) -> Result<EngineKind, AttachError> {
    let mut last_status = EngineStatus::RUNTIME_MISSING;

    for mut factory in chain {
        let kind = factory.kind();
        attachment.borrow_mut().enter(kind);

        match attach_engine(factory.as_mut(), context, wiring, pump) {
            Ok((environment, view)) => {
                attachment.borrow_mut().complete(kind, environment, view);
                info!("{} attached to {kind}", context.surface);
                return Ok(kind);
            }
            Err(status) => {
                warn!("{kind} unavailable for {} ({status}), trying next engine", context.surface);
                last_status = status;
            }
        }
    }

    attachment.borrow_mut().fail(last_status);
    error!("{}: every embedded browser engine failed, last status {last_status}", context.surface);
    Err(AttachError::Exhausted(last_status))
}

fn attach_engine(
    factory: &mut dyn EngineFactory,
    context: &AttachContext,
    wiring: &Wiring,
    pump: &mut dyn Pump,
) -> Result<(Box<dyn EngineEnvironment>, Box<dyn EngineView>), EngineStatus> {
    let mut environment = factory
        .create_environment(context)?
        .block_on(pump)
        .unwrap_or(Err(EngineStatus::ABORTED))?;
    let mut view = environment
        .create_view(context.surface)
        .block_on(pump)
        .unwrap_or(Err(EngineStatus::ABORTED))?;
    wire(view.as_mut(), wiring);
    Ok((environment, view))
}

/// Enables scripting and messaging, installs the content bootstrap, and connects the resource
/// bridge and message channel.
pub fn wire(view: &mut dyn EngineView, wiring: &Wiring) {
    let settings = ViewSettings {
        script_enabled: true,
        default_script_dialogs: true,
        web_message_enabled: true,
        ..wiring.settings
    };
    view.apply_settings(&settings);
    view.add_script_on_document_created(&bootstrap_script(&view.transport()));

    let inbound = Rc::clone(&wiring.inbound);
    view.set_message_handler(Rc::new(move |message: &str| {
        inbound.deliver(message);
    }));

    let bridge = ResourceBridge::new(Rc::clone(&wiring.schemes));
    view.set_request_interceptor(Rc::new(move |uri: &str| bridge.intercept(uri)));

    let schemes = wiring.schemes.borrow().schemes();
    for scheme in schemes {
        view.register_scheme(&scheme);
    }
}
