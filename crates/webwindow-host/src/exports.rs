#![allow(non_snake_case)]

use std::os::raw::{c_int, c_uint};
use std::ptr;

use log::{error, warn};
use webwindow_core::channel::WebMessageCallback;
use webwindow_core::{MessageKind, Monitor, Position, Rect, SchemeReply, Size};
use webwindow_sys as sys;
use webwindow_sys::{auto_string_to_owned, copy_host_bytes, with_auto_string, AutoString};

use crate::config;
use crate::host::HostError;
use crate::runtime::{MovedHandler, ResizedHandler, WebWindow};

/// Loads configuration and starts logging. Safe to call more than once.
#[no_mangle]
pub extern "C" fn WebWindow_register() {
    config::global();
}

/// # Safety
/// `title` must be null or a NUL-terminated platform string. `parent` must be null or a
/// pointer returned by `WebWindow_ctor` that has not been destroyed.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_ctor(
    title: AutoString,
    parent: *mut WebWindow,
    on_message: Option<sys::WebMessageReceivedCallback>,
) -> *mut WebWindow {
    config::global();
    let title = auto_string_to_owned(title).unwrap_or_default();
    let on_message = on_message.map(|callback| {
        Box::new(move |message: &str| with_auto_string(message, |raw| callback(raw)))
            as WebMessageCallback
    });

    match WebWindow::new(&title, parent.as_ref(), on_message) {
        Ok(window) => Box::into_raw(Box::new(window)),
        Err(error) => {
            error!("WebWindow_ctor failed: {error}");
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`; it is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_dtor(instance: *mut WebWindow) {
    if instance.is_null() {
        return;
    }
    let window = Box::from_raw(instance);
    report("WebWindow_dtor", window.destroy());
}

/// # Safety
/// `instance` must be null or live; `title` must be null or a NUL-terminated platform string.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetTitle(instance: *mut WebWindow, title: AutoString) {
    if let Some(window) = window(instance, "WebWindow_SetTitle") {
        let title = auto_string_to_owned(title).unwrap_or_default();
        report("WebWindow_SetTitle", window.set_title(&title));
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_Show(instance: *mut WebWindow) {
    if let Some(window) = window(instance, "WebWindow_Show") {
        report("WebWindow_Show", window.show());
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_WaitForExit(instance: *mut WebWindow) {
    if let Some(window) = window(instance, "WebWindow_WaitForExit") {
        report("WebWindow_WaitForExit", window.wait_for_exit());
    }
}

/// # Safety
/// `instance` must be null or live; strings must be null or NUL-terminated platform strings.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_ShowMessage(
    instance: *mut WebWindow,
    title: AutoString,
    body: AutoString,
    flags: c_uint,
) {
    if let Some(window) = window(instance, "WebWindow_ShowMessage") {
        let title = auto_string_to_owned(title).unwrap_or_default();
        let body = auto_string_to_owned(body).unwrap_or_default();
        report(
            "WebWindow_ShowMessage",
            window.show_message(&title, &body, message_kind(flags)),
        );
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_Invoke(instance: *mut WebWindow, callback: Option<sys::ACTION>) {
    let (Some(window), Some(callback)) = (window(instance, "WebWindow_Invoke"), callback) else {
        return;
    };
    window.invoke(move || callback());
}

/// # Safety
/// `instance` must be null or live; `content` must be null or a NUL-terminated platform string.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_NavigateToString(instance: *mut WebWindow, content: AutoString) {
    if let Some(window) = window(instance, "WebWindow_NavigateToString") {
        let content = auto_string_to_owned(content).unwrap_or_default();
        report("WebWindow_NavigateToString", window.navigate_to_string(&content));
    }
}

/// # Safety
/// `instance` must be null or live; `url` must be null or a NUL-terminated platform string.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_NavigateToUrl(instance: *mut WebWindow, url: AutoString) {
    if let Some(window) = window(instance, "WebWindow_NavigateToUrl") {
        let url = auto_string_to_owned(url).unwrap_or_default();
        report("WebWindow_NavigateToUrl", window.navigate_to_url(&url));
    }
}

/// # Safety
/// `instance` must be null or live; `message` must be null or a NUL-terminated platform string.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SendMessage(instance: *mut WebWindow, message: AutoString) {
    if let Some(window) = window(instance, "WebWindow_SendMessage") {
        let message = auto_string_to_owned(message).unwrap_or_default();
        report("WebWindow_SendMessage", window.send_message(&message));
    }
}

/// Routes every request for `scheme` to `handler`. The handler returns a pointer to the body
/// and fills in its length and a content type. Both buffers are copied before this call
/// returns to the engine and stay owned by the caller. A null body or content type leaves the
/// request unhandled.
///
/// # Safety
/// `instance` must be null or live; `scheme` must be null or a NUL-terminated platform string.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_AddCustomScheme(
    instance: *mut WebWindow,
    scheme: AutoString,
    handler: Option<sys::WebResourceRequestedCallback>,
) {
    let (Some(window), Some(handler)) = (window(instance, "WebWindow_AddCustomScheme"), handler)
    else {
        return;
    };
    let Some(scheme) = auto_string_to_owned(scheme) else {
        warn!("WebWindow_AddCustomScheme: null scheme");
        return;
    };

    report(
        "WebWindow_AddCustomScheme",
        window.add_custom_scheme(&scheme, scheme_handler(handler)),
    );
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetResizable(instance: *mut WebWindow, resizable: c_int) {
    if let Some(window) = window(instance, "WebWindow_SetResizable") {
        report("WebWindow_SetResizable", window.set_resizable(resizable != 0));
    }
}

/// # Safety
/// `instance` must be null or live; `width` and `height` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_GetSize(
    instance: *mut WebWindow,
    width: *mut c_int,
    height: *mut c_int,
) {
    let Some(window) = window(instance, "WebWindow_GetSize") else {
        return;
    };
    match window.size() {
        Ok(size) => {
            write_out(width, size.width);
            write_out(height, size.height);
        }
        Err(error) => error!("WebWindow_GetSize failed: {error}"),
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetSize(instance: *mut WebWindow, width: c_int, height: c_int) {
    if let Some(window) = window(instance, "WebWindow_SetSize") {
        report("WebWindow_SetSize", window.set_size(Size::new(width, height)));
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetResizedCallback(
    instance: *mut WebWindow,
    callback: Option<sys::ResizedCallback>,
) {
    if let Some(window) = window(instance, "WebWindow_SetResizedCallback") {
        let handler = callback.map(|callback| {
            Box::new(move |size: Size| callback(size.width, size.height)) as ResizedHandler
        });
        report("WebWindow_SetResizedCallback", window.on_resized(handler));
    }
}

/// Reports each monitor in turn until the callback returns 0.
///
/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_GetAllMonitors(
    instance: *mut WebWindow,
    callback: Option<sys::GetAllMonitorsCallback>,
) {
    let (Some(window), Some(callback)) = (window(instance, "WebWindow_GetAllMonitors"), callback)
    else {
        return;
    };
    match window.monitors() {
        Ok(monitors) => {
            for monitor in &monitors {
                let native = native_monitor(monitor);
                if callback(&native) == 0 {
                    break;
                }
            }
        }
        Err(error) => error!("WebWindow_GetAllMonitors failed: {error}"),
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_GetScreenDpi(instance: *mut WebWindow) -> c_uint {
    let Some(window) = window(instance, "WebWindow_GetScreenDpi") else {
        return 0;
    };
    window.screen_dpi().unwrap_or_else(|error| {
        error!("WebWindow_GetScreenDpi failed: {error}");
        0
    })
}

/// # Safety
/// `instance` must be null or live; `x` and `y` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_GetPosition(instance: *mut WebWindow, x: *mut c_int, y: *mut c_int) {
    let Some(window) = window(instance, "WebWindow_GetPosition") else {
        return;
    };
    match window.position() {
        Ok(position) => {
            write_out(x, position.x);
            write_out(y, position.y);
        }
        Err(error) => error!("WebWindow_GetPosition failed: {error}"),
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetPosition(instance: *mut WebWindow, x: c_int, y: c_int) {
    if let Some(window) = window(instance, "WebWindow_SetPosition") {
        report("WebWindow_SetPosition", window.set_position(Position::new(x, y)));
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetMovedCallback(
    instance: *mut WebWindow,
    callback: Option<sys::MovedCallback>,
) {
    if let Some(window) = window(instance, "WebWindow_SetMovedCallback") {
        let handler = callback.map(|callback| {
            Box::new(move |position: Position| callback(position.x, position.y)) as MovedHandler
        });
        report("WebWindow_SetMovedCallback", window.on_moved(handler));
    }
}

/// # Safety
/// `instance` must be null or a live pointer from `WebWindow_ctor`.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetTopmost(instance: *mut WebWindow, topmost: c_int) {
    if let Some(window) = window(instance, "WebWindow_SetTopmost") {
        report("WebWindow_SetTopmost", window.set_topmost(topmost != 0));
    }
}

/// # Safety
/// `instance` must be null or live; `filename` must be null or a NUL-terminated platform string.
#[no_mangle]
pub unsafe extern "C" fn WebWindow_SetIconFile(instance: *mut WebWindow, filename: AutoString) {
    let Some(window) = window(instance, "WebWindow_SetIconFile") else {
        return;
    };
    match auto_string_to_owned(filename) {
        Some(filename) => report("WebWindow_SetIconFile", window.set_icon_file(filename)),
        None => warn!("WebWindow_SetIconFile: null filename"),
    }
}

unsafe fn window<'a>(instance: *mut WebWindow, call: &str) -> Option<&'a WebWindow> {
    let window = instance.as_ref();
    if window.is_none() {
        warn!("{call}: null window");
    }
    window
}

unsafe fn write_out(target: *mut c_int, value: c_int) {
    if let Some(target) = target.as_mut() {
        *target = value;
    }
}

fn report(call: &str, result: Result<(), HostError>) {
    if let Err(error) = result {
        error!("{call} failed: {error}");
    }
}

fn scheme_handler(
    handler: sys::WebResourceRequestedCallback,
) -> impl FnMut(&str) -> Option<SchemeReply> + Send + 'static {
    move |uri: &str| {
        with_auto_string(uri, |raw_uri| {
            let mut length: c_int = 0;
            let mut content_type: AutoString = ptr::null_mut();
            let body = handler(raw_uri, &mut length, &mut content_type);
            if body.is_null() || content_type.is_null() {
                return None;
            }
            // SAFETY: the handler hands out `length` readable bytes and a NUL-terminated string,
            // both valid until it is called again.
            let (bytes, content_type) = unsafe {
                (
                    copy_host_bytes(body.cast::<u8>(), usize::try_from(length).unwrap_or(0)),
                    auto_string_to_owned(content_type),
                )
            };
            content_type.map(|content_type| SchemeReply::new(bytes, content_type))
        })
    }
}

fn message_kind(flags: c_uint) -> MessageKind {
    match flags & sys::MB_ICONMASK {
        sys::MB_ICONERROR => MessageKind::Error,
        sys::MB_ICONWARNING => MessageKind::Warning,
        sys::MB_ICONQUESTION => MessageKind::Question,
        _ => MessageKind::Info,
    }
}

fn native_rect(rect: Rect) -> sys::NativeRect {
    sys::NativeRect {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

fn native_monitor(monitor: &Monitor) -> sys::NativeMonitor {
    sys::NativeMonitor {
        monitor: native_rect(monitor.area),
        work: native_rect(monitor.work_area),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicUsize, Ordering};
    use std::thread;

    use parking_lot::Mutex;
    use webwindow_core::{HeadlessConfig, HeadlessPage, Surface};
    use webwindow_sys::AutoChar;

    use super::*;
    use crate::host::testing::{domain, fresh_domain};

    fn leaked_auto_string(value: &str) -> AutoString {
        #[cfg(windows)]
        let units: Vec<AutoChar> = value.encode_utf16().chain(Some(0)).collect();
        #[cfg(not(windows))]
        let units: Vec<AutoChar> = value
            .bytes()
            .map(|byte| byte as AutoChar)
            .chain(Some(0))
            .collect();
        Box::leak(units.into_boxed_slice()).as_mut_ptr()
    }

    fn new_window(title: &str) -> *mut WebWindow {
        let instance = unsafe { WebWindow_ctor(leaked_auto_string(title), ptr::null_mut(), None) };
        assert!(!instance.is_null(), "constructor should return a window");
        instance
    }

    fn page_of(instance: *mut WebWindow) -> HeadlessPage {
        let id = unsafe { &*instance }.id();
        domain(|domain| {
            let surface = domain.window(id).expect("window should exist").surface().raw();
            domain.platform().page_for(surface).expect("page should exist")
        })
    }

    #[test]
    fn flags_map_to_message_kinds() {
        assert_eq!(message_kind(0), MessageKind::Info);
        assert_eq!(message_kind(sys::MB_ICONINFORMATION), MessageKind::Info);
        assert_eq!(message_kind(sys::MB_ICONERROR | 0x1), MessageKind::Error);
        assert_eq!(message_kind(sys::MB_ICONWARNING), MessageKind::Warning);
        assert_eq!(message_kind(sys::MB_ICONQUESTION), MessageKind::Question);
    }

    #[test]
    fn null_instances_are_ignored() {
        let mut width: c_int = -1;
        unsafe {
            WebWindow_SetTitle(ptr::null_mut(), ptr::null_mut());
            WebWindow_Show(ptr::null_mut());
            WebWindow_GetSize(ptr::null_mut(), &mut width, ptr::null_mut());
            WebWindow_dtor(ptr::null_mut());
            assert_eq!(WebWindow_GetScreenDpi(ptr::null_mut()), 0);
        }
        assert_eq!(width, -1);
    }

    #[test]
    fn geometry_round_trips_through_the_abi() {
        fresh_domain(HeadlessConfig::default());
        let instance = new_window("geometry");
        let (mut width, mut height, mut x, mut y) = (0, 0, 0, 0);

        unsafe {
            WebWindow_SetSize(instance, 800, 600);
            WebWindow_SetPosition(instance, 40, 30);
            WebWindow_GetSize(instance, &mut width, &mut height);
            WebWindow_GetPosition(instance, &mut x, &mut y);
            assert_eq!(WebWindow_GetScreenDpi(instance), 96);
            WebWindow_dtor(instance);
        }

        assert_eq!((width, height), (800, 600));
        assert_eq!((x, y), (40, 30));
    }

    static RESIZES: Mutex<Vec<(c_int, c_int)>> = Mutex::new(Vec::new());

    extern "C" fn record_resize(width: c_int, height: c_int) {
        RESIZES.lock().push((width, height));
    }

    #[test]
    fn resize_callbacks_receive_the_new_size() {
        fresh_domain(HeadlessConfig::default());
        let instance = new_window("resize");

        unsafe {
            WebWindow_SetResizedCallback(instance, Some(record_resize));
            WebWindow_SetSize(instance, 800, 600);
        }
        domain(|domain| domain.run_pending());

        assert_eq!(*RESIZES.lock(), vec![(800, 600)]);
        unsafe { WebWindow_dtor(instance) };
    }

    static MESSAGES: Mutex<Vec<String>> = Mutex::new(Vec::new());

    extern "C" fn record_message(message: AutoString) {
        let message = unsafe { auto_string_to_owned(message) }.unwrap_or_default();
        MESSAGES.lock().push(message);
    }

    #[test]
    fn content_messages_reach_the_native_callback() {
        fresh_domain(HeadlessConfig::default());
        let instance = unsafe {
            WebWindow_ctor(leaked_auto_string("messages"), ptr::null_mut(), Some(record_message))
        };
        unsafe { WebWindow_Show(instance) };

        assert!(page_of(instance).send_from_content("héllo \"host\""));

        assert_eq!(*MESSAGES.lock(), vec!["héllo \"host\"".to_owned()]);
        unsafe { WebWindow_dtor(instance) };
    }

    extern "C" fn serve_scheme(
        url: AutoString,
        length: *mut c_int,
        content_type: *mut AutoString,
    ) -> *mut c_void {
        let url = unsafe { auto_string_to_owned(url) }.unwrap_or_default();
        if url.ends_with("missing.html") {
            return ptr::null_mut();
        }
        static BODY: &[u8] = b"<h1>served</h1>";
        unsafe {
            *length = BODY.len() as c_int;
            *content_type = leaked_auto_string("text/html");
        }
        BODY.as_ptr() as *mut c_void
    }

    #[test]
    fn scheme_handlers_answer_navigations() {
        fresh_domain(HeadlessConfig::default());
        let instance = new_window("schemes");
        unsafe {
            WebWindow_AddCustomScheme(instance, leaked_auto_string("app"), Some(serve_scheme));
            WebWindow_Show(instance);
            WebWindow_NavigateToUrl(instance, leaked_auto_string("app://index.html"));
        }
        domain(|domain| domain.run_pending());

        let page = page_of(instance);
        let (status, content_type, body) = page.loaded().expect("navigation should be answered");
        assert_eq!(status, 200);
        assert_eq!(content_type.as_deref(), Some("text/html"));
        assert_eq!(body, b"<h1>served</h1>".to_vec());
        assert!(page.fetch("app://missing.html").is_none());
        unsafe { WebWindow_dtor(instance) };
    }

    static MONITORS: Mutex<Vec<sys::NativeMonitor>> = Mutex::new(Vec::new());

    extern "C" fn first_monitor_only(monitor: *const sys::NativeMonitor) -> c_int {
        if let Some(monitor) = unsafe { monitor.as_ref() } {
            MONITORS.lock().push(*monitor);
        }
        0
    }

    #[test]
    fn monitor_enumeration_stops_when_asked() {
        let mut config = HeadlessConfig::default();
        config.monitors.push(Monitor {
            area: Rect::new(1920, 0, 1280, 1024),
            work_area: Rect::new(1920, 0, 1280, 984),
        });
        fresh_domain(config);
        let instance = new_window("monitors");

        unsafe { WebWindow_GetAllMonitors(instance, Some(first_monitor_only)) };

        let monitors = MONITORS.lock().clone();
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].monitor.width, 1920);
        assert_eq!(monitors[0].work.height, 1040);
        unsafe { WebWindow_dtor(instance) };
    }

    static INVOKED: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn count_invoke() {
        INVOKED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn invoke_on_the_ui_thread_runs_inline() {
        fresh_domain(HeadlessConfig::default());
        let instance = new_window("invoke");

        unsafe { WebWindow_Invoke(instance, Some(count_invoke)) };

        assert_eq!(INVOKED.load(Ordering::SeqCst), 1);
        unsafe { WebWindow_dtor(instance) };
    }

    static LOOP_ROOT: AtomicPtr<WebWindow> = AtomicPtr::new(ptr::null_mut());
    static MEASURED: Mutex<Option<(c_int, c_int)>> = Mutex::new(None);
    static OPENED_CHILD: AtomicPtr<WebWindow> = AtomicPtr::new(ptr::null_mut());

    extern "C" fn measure_and_open_child() {
        let root = LOOP_ROOT.load(Ordering::SeqCst);
        let (mut width, mut height) = (-1, -1);
        unsafe { WebWindow_GetSize(root, &mut width, &mut height) };
        *MEASURED.lock() = Some((width, height));
        let child = unsafe { WebWindow_ctor(leaked_auto_string("child"), root, None) };
        OPENED_CHILD.store(child, Ordering::SeqCst);
    }

    #[test]
    fn invoked_callbacks_can_query_and_construct_during_wait_for_exit() {
        fresh_domain(HeadlessConfig::default());
        let root = new_window("loop");
        LOOP_ROOT.store(root, Ordering::SeqCst);

        let address = root as usize;
        let worker = thread::spawn(move || {
            let root = address as *mut WebWindow;
            unsafe { WebWindow_Invoke(root, Some(measure_and_open_child)) };
            unsafe { &*root }.close().expect("close should reach the UI thread");
        });
        unsafe { WebWindow_WaitForExit(root) };
        worker.join().expect("worker should finish");

        assert_eq!(*MEASURED.lock(), Some((900, 600)));
        let child = OPENED_CHILD.load(Ordering::SeqCst);
        assert!(!child.is_null(), "constructor inside the loop should return a window");
        unsafe {
            WebWindow_dtor(child);
            WebWindow_dtor(root);
        }
    }

    static MOVES: AtomicI32 = AtomicI32::new(0);

    extern "C" fn record_move(x: c_int, y: c_int) {
        MOVES.store(x * 1000 + y, Ordering::SeqCst);
    }

    #[test]
    fn message_boxes_and_moves_are_queued() {
        fresh_domain(HeadlessConfig::default());
        let instance = new_window("queued");

        unsafe {
            WebWindow_SetMovedCallback(instance, Some(record_move));
            WebWindow_SetPosition(instance, 12, 34);
            WebWindow_ShowMessage(
                instance,
                leaked_auto_string("Careful"),
                leaked_auto_string("disk almost full"),
                sys::MB_ICONWARNING,
            );
        }
        let boxes_before = domain(|domain| domain.platform().message_boxes().len());
        domain(|domain| domain.run_pending());

        assert_eq!(boxes_before, 0);
        assert_eq!(MOVES.load(Ordering::SeqCst), 12 * 1000 + 34);
        let boxes = domain(|domain| domain.platform().message_boxes());
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].title, "Careful");
        assert_eq!(boxes[0].body, "disk almost full");
        assert_eq!(boxes[0].kind, MessageKind::Warning);
        unsafe { WebWindow_dtor(instance) };
    }
}
