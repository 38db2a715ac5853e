use std::fmt::{Display, Formatter, Result as FmtResult};
use std::rc::Rc;

use crate::completion::Completion;
use crate::dispatch::LocalPoster;
use crate::geometry::Rect;
use crate::ids::RawSurface;
use crate::scheme::ResourceResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    WebView2,
    EdgeHtml,
    WebKitGtk,
    WkWebView,
}

impl Display for EngineKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::WebView2 => "WebView2",
            Self::EdgeHtml => "EdgeHTML",
            Self::WebKitGtk => "WebKitGTK",
            Self::WkWebView => "WKWebView",
        };
        f.write_str(name)
    }
}

/// Native status code reported by an engine, formatted the way native hosts print them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineStatus(pub u32);

impl EngineStatus {
    pub const RUNTIME_MISSING: Self = Self(0x8007_0002);
    pub const ABORTED: Self = Self(0x8000_4004);
    pub const UNEXPECTED: Self = Self(0x8000_ffff);
}

impl Display for EngineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "0x{:08x}", self.0)
    }
}

pub type EngineResult<T> = Result<T, EngineStatus>;

/// How content and host exchange text messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTransport {
    /// Native web messages in both directions (`chrome.webview`).
    WebMessage,
    /// Named script message handler inbound, script evaluation outbound.
    ScriptHandler { name: &'static str },
    /// `window.external.notify` inbound, script evaluation outbound.
    ScriptNotify,
}

impl MessageTransport {
    pub fn posts_natively(&self) -> bool {
        matches!(self, Self::WebMessage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptionMode {
    /// Every request passes through the interceptor.
    AllRequests,
    /// Only schemes registered with [`EngineView::register_scheme`] are intercepted.
    RegisteredSchemes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineProfile {
    pub kind: EngineKind,
    pub transport: MessageTransport,
    pub interception: InterceptionMode,
}

impl EngineProfile {
    pub const WEBVIEW2: Self = Self {
        kind: EngineKind::WebView2,
        transport: MessageTransport::WebMessage,
        interception: InterceptionMode::AllRequests,
    };
    pub const EDGE_HTML: Self = Self {
        kind: EngineKind::EdgeHtml,
        transport: MessageTransport::ScriptNotify,
        interception: InterceptionMode::RegisteredSchemes,
    };
    pub const WEBKIT_GTK: Self = Self {
        kind: EngineKind::WebKitGtk,
        transport: MessageTransport::ScriptHandler {
            name: "webwindowinterop",
        },
        interception: InterceptionMode::RegisteredSchemes,
    };
    pub const WK_WEBVIEW: Self = Self {
        kind: EngineKind::WkWebView,
        transport: MessageTransport::ScriptHandler {
            name: "webwindowinterop",
        },
        interception: InterceptionMode::RegisteredSchemes,
    };
}

#[cfg(target_os = "windows")]
pub const ENGINE_PRIORITY: &[EngineProfile] = &[EngineProfile::WEBVIEW2, EngineProfile::EDGE_HTML];
#[cfg(target_os = "macos")]
pub const ENGINE_PRIORITY: &[EngineProfile] = &[EngineProfile::WK_WEBVIEW];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const ENGINE_PRIORITY: &[EngineProfile] = &[EngineProfile::WEBKIT_GTK];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    pub script_enabled: bool,
    pub default_script_dialogs: bool,
    pub web_message_enabled: bool,
    pub devtools: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            script_enabled: true,
            default_script_dialogs: true,
            web_message_enabled: true,
            devtools: false,
        }
    }
}

pub struct AttachContext {
    pub surface: RawSurface,
    pub poster: LocalPoster,
}

pub type MessageHandler = Rc<dyn Fn(&str)>;
pub type RequestInterceptor = Rc<dyn Fn(&str) -> Option<ResourceResponse>>;

pub trait EngineFactory {
    fn kind(&self) -> EngineKind;

    /// Starts environment creation. An immediate error means the engine is not installed.
    fn create_environment(
        &mut self,
        context: &AttachContext,
    ) -> EngineResult<Completion<EngineResult<Box<dyn EngineEnvironment>>>>;
}

pub trait EngineEnvironment {
    fn create_view(&mut self, surface: RawSurface) -> Completion<EngineResult<Box<dyn EngineView>>>;
}

/// One embedded browser instance. Called on the UI thread only.
pub trait EngineView {
    fn kind(&self) -> EngineKind;

    fn transport(&self) -> MessageTransport;

    fn apply_settings(&mut self, settings: &ViewSettings);

    fn add_script_on_document_created(&mut self, script: &str);

    fn set_message_handler(&mut self, handler: MessageHandler);

    fn set_request_interceptor(&mut self, interceptor: RequestInterceptor);

    /// Engines with per-scheme registration hook `scheme` into the interceptor.
    fn register_scheme(&mut self, _scheme: &str) {}

    fn set_bounds(&mut self, bounds: Rect);

    fn navigate(&mut self, url: &str);

    fn navigate_to_string(&mut self, html: &str);

    fn post_web_message(&mut self, message: &str);

    fn evaluate_script(&mut self, script: &str) -> Completion<EngineResult<()>>;
}
