use std::path::{Path, PathBuf};

use log::trace;
use thiserror::Error;

use crate::dispatch::{UiEvent, UiHandle};
use crate::engine::EngineFactory;
use crate::geometry::{Monitor, Position, Rect, Size};
use crate::ids::RawSurface;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MessageKind {
    #[default]
    Info,
    Warning,
    Error,
    Question,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("failed to create native window: {0}")]
    SurfaceCreation(String),
    #[error("failed to load window icon {}: {reason}", path.display())]
    Icon { path: PathBuf, reason: String },
}

pub struct SurfaceRequest<'a> {
    pub title: &'a str,
    pub parent: Option<RawSurface>,
    pub size: Option<Size>,
}

/// Lets a native surface report what happened to it through the UI queue, in arrival order.
pub struct SurfaceEvents<P: Platform> {
    ui: UiHandle<P>,
}

impl<P: Platform> Clone for SurfaceEvents<P> {
    fn clone(&self) -> Self {
        Self {
            ui: self.ui.clone(),
        }
    }
}

impl<P: Platform> SurfaceEvents<P> {
    pub(crate) fn new(ui: UiHandle<P>) -> Self {
        Self { ui }
    }

    pub fn resized(&self, surface: RawSurface, size: Size) {
        self.emit(UiEvent::Resized { surface, size });
    }

    pub fn moved(&self, surface: RawSurface, position: Position) {
        self.emit(UiEvent::Moved { surface, position });
    }

    pub fn closed(&self, surface: RawSurface) {
        self.emit(UiEvent::Closed { surface });
    }

    fn emit(&self, event: UiEvent<P>) {
        if self.ui.send(event).is_err() {
            trace!("surface event dropped: UI queue is gone");
        }
    }
}

/// One native top-level window. Every method is called on the UI thread.
pub trait Surface {
    fn raw(&self) -> RawSurface;

    fn show(&mut self);

    fn set_title(&mut self, title: &str);

    fn size(&self) -> Size;

    fn set_size(&mut self, size: Size);

    fn position(&self) -> Position;

    fn set_position(&mut self, position: Position);

    /// Area available to the embedded view, relative to the surface.
    fn client_bounds(&self) -> Rect;

    fn set_resizable(&mut self, resizable: bool);

    fn set_topmost(&mut self, topmost: bool);

    fn set_icon_file(&mut self, path: &Path) -> Result<(), PlatformError>;

    fn screen_dpi(&self) -> u32;

    fn monitors(&self) -> Vec<Monitor>;

    fn show_message(&mut self, title: &str, body: &str, kind: MessageKind);

    /// Asks the surface to close; it reports back through [`SurfaceEvents::closed`].
    fn close(&mut self);
}

pub trait Platform: Sized + 'static {
    type Surface: Surface;

    fn create_surface(
        &mut self,
        request: &SurfaceRequest<'_>,
        events: SurfaceEvents<Self>,
    ) -> Result<Self::Surface, PlatformError>;

    /// Fresh engine factories in attachment priority order.
    fn engine_chain(&mut self) -> Vec<Box<dyn EngineFactory>>;
}
