use std::cell::RefCell;
use std::rc::Rc;

use crate::attach::{AttachmentState, BrowserAttachment, Wiring};
use crate::channel::{InboundChannel, WebMessageCallback};
use crate::engine::ViewSettings;
use crate::geometry::{Position, Size};
use crate::ids::WindowId;
use crate::platform::Surface;
use crate::scheme::SchemeTable;

pub type ResizedCallback = Box<dyn FnMut(Size)>;
pub type MovedCallback = Box<dyn FnMut(Position)>;

pub const UNTITLED: &str = "Untitled window";

#[cfg(target_os = "linux")]
const TITLE_LIMIT: Option<usize> = Some(31);
#[cfg(not(target_os = "linux"))]
const TITLE_LIMIT: Option<usize> = None;

pub fn normalize_title(title: &str) -> String {
    if title.is_empty() {
        return UNTITLED.to_owned();
    }
    match TITLE_LIMIT {
        Some(limit) => title.chars().take(limit).collect(),
        None => title.to_owned(),
    }
}

#[derive(Default)]
pub struct WindowOptions {
    pub title: String,
    pub parent: Option<WindowId>,
    pub size: Option<Size>,
    pub on_message: Option<WebMessageCallback>,
}

impl WindowOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: WindowId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_message_handler(mut self, handler: impl FnMut(&str) + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }
}

pub struct Window<S: Surface> {
    surface: S,
    title: String,
    parent: Option<WindowId>,
    resizable: bool,
    topmost: bool,
    attachment: Rc<RefCell<BrowserAttachment>>,
    schemes: Rc<RefCell<SchemeTable>>,
    inbound: Rc<InboundChannel>,
    pub(crate) on_resized: Option<Rc<RefCell<ResizedCallback>>>,
    pub(crate) on_moved: Option<Rc<RefCell<MovedCallback>>>,
}

impl<S: Surface> Window<S> {
    pub(crate) fn new(
        surface: S,
        title: String,
        parent: Option<WindowId>,
        on_message: Option<WebMessageCallback>,
    ) -> Self {
        Self {
            surface,
            title,
            parent,
            resizable: true,
            topmost: false,
            attachment: Rc::default(),
            schemes: Rc::default(),
            inbound: Rc::new(InboundChannel::new(on_message)),
            on_resized: None,
            on_moved: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    pub fn is_topmost(&self) -> bool {
        self.topmost
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn attachment_state(&self) -> AttachmentState {
        self.attachment.borrow().state()
    }

    pub fn inbound(&self) -> &InboundChannel {
        &self.inbound
    }

    pub(crate) fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.surface.set_title(&title);
        self.title = title;
    }

    pub(crate) fn set_resizable(&mut self, resizable: bool) {
        self.surface.set_resizable(resizable);
        self.resizable = resizable;
    }

    pub(crate) fn set_topmost(&mut self, topmost: bool) {
        self.surface.set_topmost(topmost);
        self.topmost = topmost;
    }

    pub(crate) fn attachment(&self) -> &Rc<RefCell<BrowserAttachment>> {
        &self.attachment
    }

    pub(crate) fn schemes(&self) -> &Rc<RefCell<SchemeTable>> {
        &self.schemes
    }

    pub(crate) fn wiring(&self, settings: ViewSettings) -> Wiring {
        Wiring {
            settings,
            schemes: Rc::clone(&self.schemes),
            inbound: Rc::clone(&self.inbound),
        }
    }

    /// Fits the browser view to the client area; no-op until a view is attached.
    pub(crate) fn refit_content(&self) {
        let bounds = self.surface.client_bounds();
        if let Some(view) = self.attachment.borrow_mut().view_mut() {
            view.set_bounds(bounds);
        }
    }
}
