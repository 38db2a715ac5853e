pub mod attach;
pub mod buffer;
pub mod channel;
pub mod completion;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod geometry;
pub mod headless;
pub mod ids;
pub mod platform;
pub mod scheme;
pub mod window;

pub use attach::{AttachError, AttachmentState, BrowserAttachment};
pub use buffer::ResourceBuffer;
pub use channel::{bootstrap_script, dispatch_expression, InboundChannel};
pub use completion::{completion, Abandoned, Completer, Completion, Pump};
pub use dispatch::{
    Dequeued, DispatchError, EventSource, LocalPoster, PendingInvocation, UiEvent, UiHandle,
};
pub use domain::{
    settle_send, AttachOutcome, DomainError, Followup, LoopFrame, PendingAttach, ShowStep, UiDomain,
};
pub use engine::{
    EngineFactory, EngineKind, EngineProfile, EngineStatus, EngineView, InterceptionMode,
    MessageTransport, ViewSettings, ENGINE_PRIORITY,
};
pub use geometry::{Monitor, Position, Rect, Size};
pub use headless::{
    Availability, HeadlessConfig, HeadlessEngineConfig, HeadlessPage, HeadlessPlatform,
};
pub use ids::{RawSurface, WindowId};
pub use platform::{MessageKind, Platform, PlatformError, Surface, SurfaceEvents, SurfaceRequest};
pub use scheme::{
    scheme_of, ResourceBridge, ResourceResponse, SchemeHandler, SchemeReply, SchemeTable,
};
pub use window::{normalize_title, Window, WindowOptions};
