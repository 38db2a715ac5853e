//! In-process platform without native widgets. Surfaces and engines behave like their native
//! counterparts as far as the UI queue can observe: geometry changes and closes arrive as queued
//! events, engine creation and script evaluation complete asynchronously, and a scriptable content
//! side answers through `window.external`.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, trace};

use crate::channel::{parse_dispatch_expression, DISPATCH_FUNCTION};
use crate::completion::{completion, Completion};
use crate::dispatch::LocalPoster;
use crate::engine::{
    AttachContext, EngineEnvironment, EngineFactory, EngineKind, EngineProfile, EngineResult,
    EngineStatus, EngineView, InterceptionMode, MessageHandler, MessageTransport,
    RequestInterceptor, ViewSettings, ENGINE_PRIORITY,
};
use crate::geometry::{Monitor, Position, Rect, Size};
use crate::ids::RawSurface;
use crate::platform::{MessageKind, Platform, PlatformError, Surface, SurfaceEvents, SurfaceRequest};
use crate::scheme::{normalize_scheme, scheme_of, ResourceResponse};

pub const DEFAULT_SIZE: Size = Size::new(900, 600);
pub const DEFAULT_DPI: u32 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Environment creation is refused synchronously.
    NotInstalled(EngineStatus),
    /// Environment creation reports failure through its completion.
    MissingRuntime(EngineStatus),
    ViewCreationFails(EngineStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessEngineConfig {
    pub profile: EngineProfile,
    pub availability: Availability,
}

impl HeadlessEngineConfig {
    pub fn available(profile: EngineProfile) -> Self {
        Self {
            profile,
            availability: Availability::Available,
        }
    }

    pub fn missing(profile: EngineProfile) -> Self {
        Self {
            profile,
            availability: Availability::MissingRuntime(EngineStatus::RUNTIME_MISSING),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub engines: Vec<HeadlessEngineConfig>,
    pub default_size: Size,
    pub screen_dpi: u32,
    pub monitors: Vec<Monitor>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            engines: ENGINE_PRIORITY
                .iter()
                .copied()
                .map(HeadlessEngineConfig::available)
                .collect(),
            default_size: DEFAULT_SIZE,
            screen_dpi: DEFAULT_DPI,
            monitors: vec![Monitor {
                area: Rect::new(0, 0, 1920, 1080),
                work_area: Rect::new(0, 0, 1920, 1040),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBoxRecord {
    pub surface: RawSurface,
    pub title: String,
    pub body: String,
    pub kind: MessageKind,
}

/// Content-side script: receives each message delivered to the page.
pub type ContentScript = Rc<dyn Fn(&str, &ContentPort)>;

#[derive(Default)]
struct World {
    config: HeadlessConfig,
    next_surface: u64,
    pages: Vec<HeadlessPage>,
    message_boxes: Vec<MessageBoxRecord>,
    content: Option<ContentScript>,
}

#[derive(Clone, Default)]
pub struct HeadlessPlatform {
    world: Rc<RefCell<World>>,
}

impl HeadlessPlatform {
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            world: Rc::new(RefCell::new(World {
                config,
                ..World::default()
            })),
        }
    }

    /// Installs the script every page created from now on runs for delivered messages.
    pub fn with_content(self, script: impl Fn(&str, &ContentPort) + 'static) -> Self {
        self.set_content(script);
        self
    }

    /// Same as [`HeadlessPlatform::with_content`], through any clone of a shared platform.
    pub fn set_content(&self, script: impl Fn(&str, &ContentPort) + 'static) {
        self.world.borrow_mut().content = Some(Rc::new(script));
    }

    pub fn set_engines(&self, engines: Vec<HeadlessEngineConfig>) {
        self.world.borrow_mut().config.engines = engines;
    }

    pub fn pages(&self) -> Vec<HeadlessPage> {
        self.world.borrow().pages.clone()
    }

    pub fn page_for(&self, surface: RawSurface) -> Option<HeadlessPage> {
        self.world
            .borrow()
            .pages
            .iter()
            .rev()
            .find(|page| page.surface() == surface)
            .cloned()
    }

    pub fn message_boxes(&self) -> Vec<MessageBoxRecord> {
        self.world.borrow().message_boxes.clone()
    }
}

impl Platform for HeadlessPlatform {
    type Surface = HeadlessSurface;

    fn create_surface(
        &mut self,
        request: &SurfaceRequest<'_>,
        events: SurfaceEvents<Self>,
    ) -> Result<HeadlessSurface, PlatformError> {
        let mut world = self.world.borrow_mut();
        world.next_surface += 1;
        let raw = RawSurface(world.next_surface);
        debug!("headless surface {raw} for {:?}", request.title);
        Ok(HeadlessSurface {
            raw,
            parent: request.parent,
            title: request.title.to_owned(),
            visible: false,
            size: request.size.unwrap_or(world.config.default_size),
            position: Position::default(),
            resizable: true,
            topmost: false,
            icon: None,
            closed: false,
            events,
            world: Rc::clone(&self.world),
        })
    }

    fn engine_chain(&mut self) -> Vec<Box<dyn EngineFactory>> {
        let engines = self.world.borrow().config.engines.clone();
        engines
            .into_iter()
            .map(|setup| {
                Box::new(HeadlessEngine {
                    setup,
                    world: Rc::clone(&self.world),
                }) as Box<dyn EngineFactory>
            })
            .collect()
    }
}

pub struct HeadlessSurface {
    raw: RawSurface,
    parent: Option<RawSurface>,
    title: String,
    visible: bool,
    size: Size,
    position: Position,
    resizable: bool,
    topmost: bool,
    icon: Option<PathBuf>,
    closed: bool,
    events: SurfaceEvents<HeadlessPlatform>,
    world: Rc<RefCell<World>>,
}

impl HeadlessSurface {
    pub fn parent(&self) -> Option<RawSurface> {
        self.parent
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    pub fn is_topmost(&self) -> bool {
        self.topmost
    }

    pub fn icon(&self) -> Option<&Path> {
        self.icon.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Surface for HeadlessSurface {
    fn raw(&self) -> RawSurface {
        self.raw
    }

    fn show(&mut self) {
        self.visible = true;
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_owned();
    }

    fn size(&self) -> Size {
        self.size
    }

    fn set_size(&mut self, size: Size) {
        self.size = size;
        self.events.resized(self.raw, size);
    }

    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
        self.events.moved(self.raw, position);
    }

    fn client_bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    fn set_resizable(&mut self, resizable: bool) {
        self.resizable = resizable;
    }

    fn set_topmost(&mut self, topmost: bool) {
        self.topmost = topmost;
    }

    fn set_icon_file(&mut self, path: &Path) -> Result<(), PlatformError> {
        if !path.is_file() {
            return Err(PlatformError::Icon {
                path: path.to_path_buf(),
                reason: "no such file".to_owned(),
            });
        }
        self.icon = Some(path.to_path_buf());
        Ok(())
    }

    fn screen_dpi(&self) -> u32 {
        self.world.borrow().config.screen_dpi
    }

    fn monitors(&self) -> Vec<Monitor> {
        self.world.borrow().config.monitors.clone()
    }

    fn show_message(&mut self, title: &str, body: &str, kind: MessageKind) {
        self.world.borrow_mut().message_boxes.push(MessageBoxRecord {
            surface: self.raw,
            title: title.to_owned(),
            body: body.to_owned(),
            kind,
        });
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.visible = false;
        self.events.closed(self.raw);
    }
}

struct HeadlessEngine {
    setup: HeadlessEngineConfig,
    world: Rc<RefCell<World>>,
}

impl EngineFactory for HeadlessEngine {
    fn kind(&self) -> EngineKind {
        self.setup.profile.kind
    }

    fn create_environment(
        &mut self,
        context: &AttachContext,
    ) -> EngineResult<Completion<EngineResult<Box<dyn EngineEnvironment>>>> {
        let outcome: EngineResult<Box<dyn EngineEnvironment>> = match self.setup.availability {
            Availability::NotInstalled(status) => return Err(status),
            Availability::MissingRuntime(status) => Err(status),
            Availability::Available | Availability::ViewCreationFails(_) => {
                Ok(Box::new(HeadlessEnvironment {
                    setup: self.setup,
                    world: Rc::clone(&self.world),
                    poster: context.poster.clone(),
                }))
            }
        };
        let (completer, completion) = completion();
        context.poster.post(move || completer.complete(outcome));
        Ok(completion)
    }
}

struct HeadlessEnvironment {
    setup: HeadlessEngineConfig,
    world: Rc<RefCell<World>>,
    poster: LocalPoster,
}

impl EngineEnvironment for HeadlessEnvironment {
    fn create_view(&mut self, surface: RawSurface) -> Completion<EngineResult<Box<dyn EngineView>>> {
        let outcome: EngineResult<Box<dyn EngineView>> = match self.setup.availability {
            Availability::ViewCreationFails(status) => Err(status),
            _ => {
                let content = self.world.borrow().content.clone();
                let page = HeadlessPage::new(surface, self.setup.profile, self.poster.clone(), content);
                self.world.borrow_mut().pages.push(page.clone());
                Ok(Box::new(HeadlessView { page }))
            }
        };
        let (completer, completion) = completion();
        self.poster.post(move || completer.complete(outcome));
        completion
    }
}

struct PageState {
    surface: RawSurface,
    profile: EngineProfile,
    poster: LocalPoster,
    content: Option<ContentScript>,
    settings: Option<ViewSettings>,
    document_scripts: Vec<String>,
    bounds: Rect,
    url: Option<String>,
    html: Option<String>,
    loaded: Option<ResourceResponse>,
    schemes: BTreeSet<String>,
    message_handler: Option<MessageHandler>,
    interceptor: Option<RequestInterceptor>,
    received: Vec<String>,
    evaluated: Vec<String>,
}

impl PageState {
    fn has_bootstrap(&self) -> bool {
        self.document_scripts
            .iter()
            .any(|script| script.contains("window.external = {"))
    }

    fn defines_dispatch(&self) -> bool {
        let definition = format!("window.{DISPATCH_FUNCTION} = function");
        self.document_scripts
            .iter()
            .any(|script| script.contains(&definition))
    }

    fn web_messages_enabled(&self) -> bool {
        self.settings
            .map(|settings| settings.web_message_enabled)
            .unwrap_or(false)
    }
}

/// Inspection and content-side handle on one headless browser view.
#[derive(Clone)]
pub struct HeadlessPage {
    state: Rc<RefCell<PageState>>,
}

impl HeadlessPage {
    fn new(
        surface: RawSurface,
        profile: EngineProfile,
        poster: LocalPoster,
        content: Option<ContentScript>,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(PageState {
                surface,
                profile,
                poster,
                content,
                settings: None,
                document_scripts: Vec::new(),
                bounds: Rect::default(),
                url: None,
                html: None,
                loaded: None,
                schemes: BTreeSet::new(),
                message_handler: None,
                interceptor: None,
                received: Vec::new(),
                evaluated: Vec::new(),
            })),
        }
    }

    pub fn surface(&self) -> RawSurface {
        self.state.borrow().surface
    }

    pub fn kind(&self) -> EngineKind {
        self.state.borrow().profile.kind
    }

    pub fn transport(&self) -> MessageTransport {
        self.state.borrow().profile.transport
    }

    pub fn bounds(&self) -> Rect {
        self.state.borrow().bounds
    }

    pub fn url(&self) -> Option<String> {
        self.state.borrow().url.clone()
    }

    pub fn html(&self) -> Option<String> {
        self.state.borrow().html.clone()
    }

    pub fn settings(&self) -> Option<ViewSettings> {
        self.state.borrow().settings
    }

    pub fn document_scripts(&self) -> Vec<String> {
        self.state.borrow().document_scripts.clone()
    }

    pub fn has_bootstrap(&self) -> bool {
        self.state.borrow().has_bootstrap()
    }

    pub fn registered_schemes(&self) -> Vec<String> {
        self.state.borrow().schemes.iter().cloned().collect()
    }

    /// Messages content has received from the host, oldest first.
    pub fn received(&self) -> Vec<String> {
        self.state.borrow().received.clone()
    }

    pub fn evaluated_scripts(&self) -> Vec<String> {
        self.state.borrow().evaluated.clone()
    }

    /// Status and content type of the last navigation that was answered by the interceptor.
    pub fn loaded(&self) -> Option<(u16, Option<String>, Vec<u8>)> {
        self.state.borrow().loaded.as_ref().map(|response| {
            (
                response.status,
                response.content_type().map(str::to_owned),
                response.body.as_slice().to_vec(),
            )
        })
    }

    /// Content calling `window.external.sendMessage(message)`.
    pub fn send_from_content(&self, message: &str) -> bool {
        let handler = {
            let state = self.state.borrow();
            if !state.has_bootstrap() || !state.web_messages_enabled() {
                trace!("content message dropped: window.external is not installed");
                return false;
            }
            state.message_handler.clone()
        };
        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }

    /// Issues a resource request the way the engine would for `uri`.
    pub fn fetch(&self, uri: &str) -> Option<ResourceResponse> {
        let interceptor = {
            let state = self.state.borrow();
            let intercepted = match state.profile.interception {
                InterceptionMode::AllRequests => true,
                InterceptionMode::RegisteredSchemes => scheme_of(uri)
                    .map(|scheme| state.schemes.contains(&normalize_scheme(scheme)))
                    .unwrap_or(false),
            };
            if !intercepted {
                return None;
            }
            state.interceptor.clone()
        };
        interceptor.and_then(|interceptor| interceptor(uri))
    }

    fn poster(&self) -> LocalPoster {
        self.state.borrow().poster.clone()
    }

    fn deliver_to_content(&self, message: String) {
        let content = {
            let mut state = self.state.borrow_mut();
            state.received.push(message.clone());
            state.content.clone()
        };
        if let Some(content) = content {
            content(&message, &ContentPort { page: self.clone() });
        }
    }

    fn load(&self, url: &str) {
        let response = self.fetch(url);
        self.state.borrow_mut().loaded = response;
    }
}

/// What a content script can do in response to a message.
pub struct ContentPort {
    page: HeadlessPage,
}

impl ContentPort {
    /// `window.external.sendMessage`, raised to the host as a later engine event.
    pub fn send(&self, message: &str) {
        let page = self.page.clone();
        let message = message.to_owned();
        self.page.poster().post(move || {
            page.send_from_content(&message);
        });
    }
}

struct HeadlessView {
    page: HeadlessPage,
}

impl EngineView for HeadlessView {
    fn kind(&self) -> EngineKind {
        self.page.kind()
    }

    fn transport(&self) -> MessageTransport {
        self.page.transport()
    }

    fn apply_settings(&mut self, settings: &ViewSettings) {
        self.page.state.borrow_mut().settings = Some(*settings);
    }

    fn add_script_on_document_created(&mut self, script: &str) {
        self.page
            .state
            .borrow_mut()
            .document_scripts
            .push(script.to_owned());
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        self.page.state.borrow_mut().message_handler = Some(handler);
    }

    fn set_request_interceptor(&mut self, interceptor: RequestInterceptor) {
        self.page.state.borrow_mut().interceptor = Some(interceptor);
    }

    fn register_scheme(&mut self, scheme: &str) {
        self.page
            .state
            .borrow_mut()
            .schemes
            .insert(normalize_scheme(scheme));
    }

    fn set_bounds(&mut self, bounds: Rect) {
        self.page.state.borrow_mut().bounds = bounds;
    }

    fn navigate(&mut self, url: &str) {
        {
            let mut state = self.page.state.borrow_mut();
            state.url = Some(url.to_owned());
            state.html = None;
            state.loaded = None;
        }
        let page = self.page.clone();
        let url = url.to_owned();
        self.page.poster().post(move || page.load(&url));
    }

    fn navigate_to_string(&mut self, html: &str) {
        let mut state = self.page.state.borrow_mut();
        state.url = None;
        state.loaded = None;
        state.html = Some(html.to_owned());
    }

    fn post_web_message(&mut self, message: &str) {
        if !self.page.state.borrow().web_messages_enabled() {
            trace!("web message dropped: web messages are disabled");
            return;
        }
        let page = self.page.clone();
        let message = message.to_owned();
        self.page.poster().post(move || page.deliver_to_content(message));
    }

    fn evaluate_script(&mut self, script: &str) -> Completion<EngineResult<()>> {
        self.page
            .state
            .borrow_mut()
            .evaluated
            .push(script.to_owned());
        let dispatched = parse_dispatch_expression(script);
        let page = self.page.clone();
        let (completer, completion) = completion();
        self.page.poster().post(move || {
            if let Some(message) = dispatched {
                if page.state.borrow().defines_dispatch() {
                    page.deliver_to_content(message);
                } else {
                    trace!("{DISPATCH_FUNCTION} is not defined in this document");
                }
            }
            completer.complete(Ok(()));
        });
        completion
    }
}
