use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use log::{debug, info, trace, warn};
use slotmap::SlotMap;
use thiserror::Error;

use crate::attach::{self, AttachError, AttachmentState, BrowserAttachment, Wiring};
use crate::channel::{self, Outbound, WebMessageCallback};
use crate::completion::Pump;
use crate::dispatch::{event_queue, Dequeued, DispatchError, EventSource, LocalPoster, UiEvent, UiHandle};
use crate::engine::{AttachContext, EngineFactory, EngineKind, EngineStatus, EngineView, ViewSettings};
use crate::geometry::{Monitor, Position, Size};
use crate::ids::{RawSurface, WindowId};
use crate::platform::{MessageKind, Platform, PlatformError, Surface, SurfaceEvents, SurfaceRequest};
use crate::scheme::SchemeHandler;
use crate::window::{normalize_title, MovedCallback, ResizedCallback, Window, WindowOptions};

pub const ATTACH_FAILURE_TITLE: &str = "Error";

/// Host code an event leaves behind to run once the domain is no longer borrowed.
pub type Followup = Box<dyn FnOnce()>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{0} does not exist")]
    UnknownWindow(WindowId),
    #[error("{0} has no attached browser")]
    NotAttached(WindowId),
    #[error(transparent)]
    Attach(#[from] AttachError),
    #[error("engine call failed with status {0}")]
    Engine(EngineStatus),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Everything owned by one UI thread: the platform, its windows, and the event queue they share.
pub struct UiDomain<P: Platform> {
    platform: P,
    windows: SlotMap<WindowId, Window<P::Surface>>,
    registry: HashMap<RawSurface, WindowId>,
    handle: UiHandle<P>,
    poster: LocalPoster,
    events: EventSource<P>,
    settings: ViewSettings,
    loop_root: Option<WindowId>,
    quit: bool,
}

impl<P: Platform> UiDomain<P> {
    /// Binds a new domain to the calling thread.
    pub fn new(platform: P) -> Self {
        let (handle, poster, events) = event_queue();
        Self {
            platform,
            windows: SlotMap::with_key(),
            registry: HashMap::new(),
            handle,
            poster,
            events,
            settings: ViewSettings::default(),
            loop_root: None,
            quit: false,
        }
    }

    pub fn handle(&self) -> UiHandle<P> {
        self.handle.clone()
    }

    pub fn poster(&self) -> LocalPoster {
        self.poster.clone()
    }

    /// Shared read end of this domain's queue.
    pub fn events(&self) -> EventSource<P> {
        self.events.clone()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn view_settings(&self) -> ViewSettings {
        self.settings
    }

    /// Applies to browsers attached from now on.
    pub fn set_view_settings(&mut self, settings: ViewSettings) {
        self.settings = settings;
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.windows.contains_key(window)
    }

    pub fn window(&self, window: WindowId) -> Option<&Window<P::Surface>> {
        self.windows.get(window)
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn window_for_surface(&self, surface: RawSurface) -> Option<WindowId> {
        self.registry.get(&surface).copied()
    }

    pub fn loop_root(&self) -> Option<WindowId> {
        self.loop_root
    }

    pub fn create_window(&mut self, options: WindowOptions) -> Result<WindowId, DomainError> {
        let parent_surface = match options.parent {
            Some(parent) => Some(self.window_ref(parent)?.surface().raw()),
            None => None,
        };
        let title = normalize_title(&options.title);
        let request = SurfaceRequest {
            title: &title,
            parent: parent_surface,
            size: options.size,
        };
        let surface = self
            .platform
            .create_surface(&request, SurfaceEvents::new(self.handle.clone()))?;
        let raw = surface.raw();

        let id = self
            .windows
            .insert(Window::new(surface, title, options.parent, options.on_message));
        self.registry.insert(raw, id);
        info!("created {id} on {raw}");
        Ok(id)
    }

    /// Tears the window down right away. Ends the event loop when it is the loop root.
    pub fn destroy_window(&mut self, window: WindowId) -> bool {
        let Some(mut removed) = self.windows.remove(window) else {
            return false;
        };
        self.registry.remove(&removed.surface().raw());
        removed.surface_mut().close();
        info!("destroyed {window}");
        if self.loop_root == Some(window) {
            self.quit = true;
        }
        true
    }

    /// Asks the native surface to close; teardown follows when the close event arrives.
    pub fn close_window(&mut self, window: WindowId) -> Result<(), DomainError> {
        self.window_mut(window)?.surface_mut().close();
        Ok(())
    }

    /// Shows the window and, the first time, attaches a browser. Later calls only show it.
    pub fn show(&mut self, window: WindowId) -> Result<AttachmentState, DomainError> {
        match self.begin_show(window)? {
            ShowStep::Shown(state) => Ok(state),
            ShowStep::Attach(pending) => {
                let attached = pending.run(self);
                self.finish_show(attached)
            }
        }
    }

    /// First half of [`UiDomain::show`]: makes the window visible and, when no browser was
    /// attached yet, hands back the attachment to run with any pump.
    pub fn begin_show(&mut self, window: WindowId) -> Result<ShowStep, DomainError> {
        let settings = self.settings;
        let poster = self.poster.clone();
        let target = self.window_mut(window)?;
        target.surface_mut().show();
        let state = target.attachment_state();
        if state != AttachmentState::Unattached {
            return Ok(ShowStep::Shown(state));
        }

        let attachment = Rc::clone(target.attachment());
        let wiring = target.wiring(settings);
        let context = AttachContext {
            surface: target.surface().raw(),
            poster,
        };
        let chain = self.platform.engine_chain();
        Ok(ShowStep::Attach(PendingAttach {
            window,
            attachment,
            chain,
            context,
            wiring,
        }))
    }

    /// Second half of [`UiDomain::show`]: fits the new view, or reports the failure in a
    /// message box on the window.
    pub fn finish_show(&mut self, attached: AttachOutcome) -> Result<AttachmentState, DomainError> {
        let AttachOutcome {
            window,
            attachment,
            result,
        } = attached;
        match result {
            Ok(_) => {
                // Closed while attaching: the attachment is dropped with the last Rc.
                if let Some(target) = self.windows.get(window) {
                    target.refit_content();
                }
                Ok(attachment.borrow().state())
            }
            Err(error) => {
                if let Some(target) = self.windows.get_mut(window) {
                    target.surface_mut().show_message(
                        ATTACH_FAILURE_TITLE,
                        &format!("Error: {}", error.status()),
                        MessageKind::Error,
                    );
                }
                Err(error.into())
            }
        }
    }

    pub fn attachment_state(&self, window: WindowId) -> Option<AttachmentState> {
        self.windows.get(window).map(Window::attachment_state)
    }

    /// Runs the event loop on this thread until `root` closes. Closing other windows keeps it going.
    pub fn wait_for_exit(&mut self, root: WindowId) {
        let frame = match self.enter_loop(root) {
            Ok(frame) => frame,
            Err(error) => {
                warn!("wait_for_exit: {error}");
                return;
            }
        };
        while !self.loop_finished() {
            if !self.dispatch_next(true) {
                warn!("event loop for {root} ended: queue disconnected");
                break;
            }
        }
        self.leave_loop(frame);
    }

    /// Makes `root` the window whose close ends the loop being entered. Loops nest; pass the
    /// frame back to [`UiDomain::leave_loop`] to restore the outer one.
    pub fn enter_loop(&mut self, root: WindowId) -> Result<LoopFrame, DomainError> {
        self.window_ref(root)?;
        let frame = LoopFrame {
            root,
            outer_root: self.loop_root.replace(root),
        };
        self.quit = false;
        debug!("event loop started for {root}");
        Ok(frame)
    }

    pub fn loop_finished(&self) -> bool {
        self.quit
    }

    pub fn leave_loop(&mut self, frame: LoopFrame) {
        debug!("event loop for {} finished", frame.root);
        self.quit = false;
        self.loop_root = frame.outer_root;
    }

    /// Processes queued events without blocking. Returns how many were handled.
    pub fn run_pending(&mut self) -> usize {
        let mut handled = 0;
        while self.dispatch_next(false) {
            handled += 1;
        }
        handled
    }

    /// Queues a native message box; the caller never waits for it.
    pub fn show_message(&mut self, window: WindowId, title: &str, body: &str, kind: MessageKind) {
        if let Err(error) = self.handle.show_message(window, title, body, kind) {
            warn!("show_message for {window} dropped: {error}");
        }
    }

    pub fn set_title(&mut self, window: WindowId, title: &str) -> Result<(), DomainError> {
        self.window_mut(window)?.set_title(normalize_title(title));
        Ok(())
    }

    pub fn set_message_callback(
        &mut self,
        window: WindowId,
        callback: Option<WebMessageCallback>,
    ) -> Result<(), DomainError> {
        self.window_ref(window)?.inbound().set_callback(callback);
        Ok(())
    }

    pub fn navigate_to_url(&mut self, window: WindowId, url: &str) -> Result<(), DomainError> {
        self.with_view(window, |view| view.navigate(url))
    }

    pub fn navigate_to_string(&mut self, window: WindowId, html: &str) -> Result<(), DomainError> {
        self.with_view(window, |view| view.navigate_to_string(html))
    }

    /// Delivers `message` to content. Script-evaluating engines block here, pumping the queue,
    /// until the engine reports that the dispatch script finished.
    pub fn send_message(&mut self, window: WindowId, message: &str) -> Result<(), DomainError> {
        let outbound = self.begin_send_message(window, message)?;
        settle_send(outbound, self)
    }

    /// Hands `message` to the engine without waiting. Settle the result with [`settle_send`].
    pub fn begin_send_message(
        &mut self,
        window: WindowId,
        message: &str,
    ) -> Result<Outbound, DomainError> {
        self.with_view(window, |view| channel::begin_send(view, message))
    }

    /// Registers `handler` for `scheme`. Works before and after the browser is attached.
    pub fn add_custom_scheme(
        &mut self,
        window: WindowId,
        scheme: &str,
        handler: SchemeHandler,
    ) -> Result<(), DomainError> {
        let target = self.window_ref(window)?;
        let scheme = target.schemes().borrow_mut().insert(scheme, handler);
        if let Some(view) = target.attachment().borrow_mut().view_mut() {
            view.register_scheme(&scheme);
        }
        Ok(())
    }

    pub fn size(&self, window: WindowId) -> Result<Size, DomainError> {
        Ok(self.window_ref(window)?.surface().size())
    }

    pub fn set_size(&mut self, window: WindowId, size: Size) -> Result<(), DomainError> {
        self.window_mut(window)?.surface_mut().set_size(size);
        Ok(())
    }

    pub fn position(&self, window: WindowId) -> Result<Position, DomainError> {
        Ok(self.window_ref(window)?.surface().position())
    }

    pub fn set_position(&mut self, window: WindowId, position: Position) -> Result<(), DomainError> {
        self.window_mut(window)?.surface_mut().set_position(position);
        Ok(())
    }

    pub fn set_resizable(&mut self, window: WindowId, resizable: bool) -> Result<(), DomainError> {
        self.window_mut(window)?.set_resizable(resizable);
        Ok(())
    }

    pub fn set_topmost(&mut self, window: WindowId, topmost: bool) -> Result<(), DomainError> {
        self.window_mut(window)?.set_topmost(topmost);
        Ok(())
    }

    pub fn set_icon_file(&mut self, window: WindowId, path: &Path) -> Result<(), DomainError> {
        self.window_mut(window)?.surface_mut().set_icon_file(path)?;
        Ok(())
    }

    pub fn screen_dpi(&self, window: WindowId) -> Result<u32, DomainError> {
        Ok(self.window_ref(window)?.surface().screen_dpi())
    }

    pub fn monitors(&self, window: WindowId) -> Result<Vec<Monitor>, DomainError> {
        Ok(self.window_ref(window)?.surface().monitors())
    }

    pub fn set_resized_callback(
        &mut self,
        window: WindowId,
        callback: Option<ResizedCallback>,
    ) -> Result<(), DomainError> {
        self.window_mut(window)?.on_resized = callback.map(RefCell::new).map(Rc::new);
        Ok(())
    }

    pub fn set_moved_callback(
        &mut self,
        window: WindowId,
        callback: Option<MovedCallback>,
    ) -> Result<(), DomainError> {
        self.window_mut(window)?.on_moved = callback.map(RefCell::new).map(Rc::new);
        Ok(())
    }

    fn window_ref(&self, window: WindowId) -> Result<&Window<P::Surface>, DomainError> {
        self.windows
            .get(window)
            .ok_or(DomainError::UnknownWindow(window))
    }

    fn window_mut(&mut self, window: WindowId) -> Result<&mut Window<P::Surface>, DomainError> {
        self.windows
            .get_mut(window)
            .ok_or(DomainError::UnknownWindow(window))
    }

    fn with_view<R>(
        &self,
        window: WindowId,
        action: impl FnOnce(&mut dyn EngineView) -> R,
    ) -> Result<R, DomainError> {
        let target = self.window_ref(window)?;
        let mut attachment = target.attachment().borrow_mut();
        let view = attachment
            .view_mut()
            .ok_or(DomainError::NotAttached(window))?;
        Ok(action(view))
    }

    fn dispatch_next(&mut self, block: bool) -> bool {
        match self.events.next(block) {
            Some(Dequeued::Local(job)) => {
                job();
                true
            }
            Some(Dequeued::Event(event)) => {
                if let Some(followup) = self.handle_event(event) {
                    followup();
                }
                true
            }
            None => false,
        }
    }

    /// Applies one dequeued event to the domain. Host code the event carries (invoked jobs,
    /// resize and move callbacks) comes back as a followup, so a caller that keeps the domain
    /// behind a borrow can release it before running that code.
    pub fn handle_event(&mut self, event: UiEvent<P>) -> Option<Followup> {
        match event {
            UiEvent::Invoke { job, guard } => Some(Box::new(move || {
                job();
                drop(guard);
            })),
            UiEvent::Command { command, guard } => {
                command(self);
                drop(guard);
                None
            }
            UiEvent::Resized { surface, size } => self.on_resized(surface, size),
            UiEvent::Moved { surface, position } => self.on_moved(surface, position),
            UiEvent::Closed { surface } => {
                self.on_closed(surface);
                None
            }
            UiEvent::ShowMessage {
                window,
                title,
                body,
                kind,
            } => {
                match self.windows.get_mut(window) {
                    Some(target) => target.surface_mut().show_message(&title, &body, kind),
                    None => trace!("message box for closed {window} skipped"),
                }
                None
            }
        }
    }

    fn on_resized(&mut self, surface: RawSurface, reported: Size) -> Option<Followup> {
        let Some(target) = self.window_for_surface(surface).and_then(|id| self.windows.get(id))
        else {
            trace!("resize of unknown {surface} ignored");
            return None;
        };
        target.refit_content();
        let size = target.surface().size();
        trace!("{surface} resized to {size} (reported {reported})");
        let callback = Rc::clone(target.on_resized.as_ref()?);
        Some(Box::new(move || match callback.try_borrow_mut() {
            Ok(mut callback) => callback(size),
            Err(_) => warn!("resize to {size} not reported: resize callback re-entered"),
        }))
    }

    fn on_moved(&mut self, surface: RawSurface, reported: Position) -> Option<Followup> {
        let Some(target) = self.window_for_surface(surface).and_then(|id| self.windows.get(id))
        else {
            trace!("move of unknown {surface} ignored");
            return None;
        };
        let position = target.surface().position();
        trace!("{surface} moved to {position:?} (reported {reported:?})");
        let callback = Rc::clone(target.on_moved.as_ref()?);
        Some(Box::new(move || match callback.try_borrow_mut() {
            Ok(mut callback) => callback(position),
            Err(_) => warn!("move to {position:?} not reported: move callback re-entered"),
        }))
    }

    fn on_closed(&mut self, surface: RawSurface) {
        let Some(window) = self.registry.remove(&surface) else {
            trace!("close of unknown {surface} ignored");
            return;
        };
        self.windows.remove(window);
        info!("{window} closed");
        if self.loop_root == Some(window) {
            debug!("loop root {window} closed, stopping event loop");
            self.quit = true;
        }
    }
}

impl<P: Platform> Pump for UiDomain<P> {
    fn pump_once(&mut self) {
        self.dispatch_next(true);
    }
}

/// Handed out by [`UiDomain::enter_loop`]; restores the enclosing loop when left.
#[must_use]
pub struct LoopFrame {
    root: WindowId,
    outer_root: Option<WindowId>,
}

pub enum ShowStep {
    /// Already attached, or attaching further up the stack.
    Shown(AttachmentState),
    Attach(PendingAttach),
}

/// Browser attachment for a first show, detached from the domain so it can be pumped by
/// whoever owns the event loop.
pub struct PendingAttach {
    window: WindowId,
    attachment: Rc<RefCell<BrowserAttachment>>,
    chain: Vec<Box<dyn EngineFactory>>,
    context: AttachContext,
    wiring: Wiring,
}

impl PendingAttach {
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Walks the engine chain, pumping between asynchronous steps.
    pub fn run(self, pump: &mut dyn Pump) -> AttachOutcome {
        let result = attach::attach(
            &self.attachment,
            self.chain,
            &self.context,
            &self.wiring,
            pump,
        );
        AttachOutcome {
            window: self.window,
            attachment: self.attachment,
            result,
        }
    }
}

#[must_use]
pub struct AttachOutcome {
    window: WindowId,
    attachment: Rc<RefCell<BrowserAttachment>>,
    result: Result<EngineKind, AttachError>,
}

/// Waits for a message handed to the engine by [`UiDomain::begin_send_message`].
pub fn settle_send(outbound: Outbound, pump: &mut dyn Pump) -> Result<(), DomainError> {
    match outbound {
        Outbound::Posted => Ok(()),
        Outbound::Evaluating(completion) => completion
            .block_on(pump)
            .unwrap_or(Err(EngineStatus::ABORTED))
            .map_err(DomainError::Engine),
    }
}
