use std::path::{Path, PathBuf};

use log::{debug, warn};
use url::Url;
use webwindow_core::channel::WebMessageCallback;
use webwindow_core::window::{MovedCallback, ResizedCallback};
use webwindow_core::{
    completion, AttachmentState, DispatchError, DomainError, MessageKind, Monitor, Position,
    SchemeReply, Size, WindowId, WindowOptions,
};

use crate::host::{self, Domain, Handle, HostError};

pub type MessageHandler = Box<dyn FnMut(&str) + Send + 'static>;
pub type ResizedHandler = Box<dyn FnMut(Size) + Send + 'static>;
pub type MovedHandler = Box<dyn FnMut(Position) + Send + 'static>;

/// A window living on one UI thread, usable from any thread.
///
/// On the UI thread calls run straight against the domain, including from invoked jobs and
/// window callbacks. Calls made while an event still holds the domain are queued behind that
/// event instead. Other threads marshal every call onto the UI thread and wait for it to finish.
#[derive(Clone)]
pub struct WebWindow {
    id: WindowId,
    ui: Handle,
}

impl WebWindow {
    /// Creates the window on the calling thread, which becomes its UI thread.
    pub fn new(
        title: &str,
        parent: Option<&WebWindow>,
        on_message: Option<WebMessageCallback>,
    ) -> Result<Self, HostError> {
        let ui = host::ensure_domain()?;
        let mut options = WindowOptions::new(title);
        if let Some(parent) = parent {
            if parent.ui.ui_thread() != ui.ui_thread() {
                return Err(HostError::ForeignParent);
            }
            options = options.with_parent(parent.id);
        }
        options.on_message = on_message;

        let id = host::with_domain(move |domain| domain.create_window(options)).into_result()??;
        Ok(Self { id, ui })
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn is_ui_thread(&self) -> bool {
        self.ui.is_ui_thread()
    }

    /// Shows the window, attaching a browser the first time.
    pub fn show(&self) -> Result<(), HostError> {
        let id = self.id;
        self.perform(
            "show",
            move |domain| domain.show(id).map(drop),
            move |_| {
                let state = host::show(id)?;
                debug!("{id} shown: {state:?}");
                Ok(())
            },
        )
    }

    /// Runs the event loop until this window closes. Only valid on the UI thread.
    pub fn wait_for_exit(&self) -> Result<(), HostError> {
        if !self.ui.is_ui_thread() {
            return Err(HostError::NotUiThread);
        }
        host::run_loop(self.id)
    }

    /// Runs `job` on the UI thread and waits for it to finish.
    pub fn invoke(&self, job: impl FnOnce() + Send + 'static) {
        self.ui.invoke(job);
    }

    /// Queues a native message box and returns without waiting for it.
    pub fn show_message(
        &self,
        title: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<(), HostError> {
        Ok(self.ui.show_message(self.id, title, body, kind)?)
    }

    /// Asks the window to close. The window is torn down once the close is processed.
    pub fn close(&self) -> Result<(), HostError> {
        let id = self.id;
        self.apply("close", move |domain| domain.close_window(id))
    }

    /// Tears the window down immediately.
    pub fn destroy(&self) -> Result<(), HostError> {
        let id = self.id;
        self.apply("destroy", move |domain| {
            domain.destroy_window(id);
            Ok(())
        })
    }

    pub fn attachment_state(&self) -> Result<Option<AttachmentState>, HostError> {
        let id = self.id;
        self.query(move |domain| Ok(domain.attachment_state(id)))
    }

    pub fn title(&self) -> Result<String, HostError> {
        let id = self.id;
        self.query(move |domain| {
            domain
                .window(id)
                .map(|window| window.title().to_owned())
                .ok_or(DomainError::UnknownWindow(id))
        })
    }

    pub fn set_title(&self, title: &str) -> Result<(), HostError> {
        let id = self.id;
        let title = title.to_owned();
        self.apply("set_title", move |domain| domain.set_title(id, &title))
    }

    pub fn navigate_to_url(&self, url: &str) -> Result<(), HostError> {
        let id = self.id;
        let url = url.to_owned();
        self.apply("navigate_to_url", move |domain| domain.navigate_to_url(id, &url))
    }

    /// Navigates to a file on disk. Relative paths resolve against the working directory.
    pub fn navigate_to_local_file(&self, path: impl AsRef<Path>) -> Result<(), HostError> {
        let url = file_url(path.as_ref())?;
        self.navigate_to_url(url.as_str())
    }

    pub fn navigate_to_string(&self, html: &str) -> Result<(), HostError> {
        let id = self.id;
        let html = html.to_owned();
        self.apply("navigate_to_string", move |domain| {
            domain.navigate_to_string(id, &html)
        })
    }

    pub fn send_message(&self, message: &str) -> Result<(), HostError> {
        let id = self.id;
        let message = message.to_owned();
        let deferred = message.clone();
        self.perform(
            "send_message",
            move |domain| domain.send_message(id, &deferred),
            move |_| host::send_message(id, &message),
        )
    }

    /// Serves every request for `scheme` from `handler`. Registration can happen before or
    /// after the window is shown.
    pub fn add_custom_scheme(
        &self,
        scheme: &str,
        handler: impl FnMut(&str) -> Option<SchemeReply> + Send + 'static,
    ) -> Result<(), HostError> {
        let id = self.id;
        let scheme = scheme.to_owned();
        self.apply("add_custom_scheme", move |domain| {
            domain.add_custom_scheme(id, &scheme, Box::new(handler))
        })
    }

    /// Replaces the handler for messages sent by content. `None` drops incoming messages.
    pub fn set_message_handler(&self, handler: Option<MessageHandler>) -> Result<(), HostError> {
        let id = self.id;
        self.apply("set_message_handler", move |domain| {
            domain.set_message_callback(id, handler.map(|handler| handler as WebMessageCallback))
        })
    }

    pub fn size(&self) -> Result<Size, HostError> {
        let id = self.id;
        self.query(move |domain| domain.size(id))
    }

    pub fn set_size(&self, size: Size) -> Result<(), HostError> {
        let id = self.id;
        self.apply("set_size", move |domain| domain.set_size(id, size))
    }

    pub fn position(&self) -> Result<Position, HostError> {
        let id = self.id;
        self.query(move |domain| domain.position(id))
    }

    pub fn set_position(&self, position: Position) -> Result<(), HostError> {
        let id = self.id;
        self.apply("set_position", move |domain| domain.set_position(id, position))
    }

    pub fn set_resizable(&self, resizable: bool) -> Result<(), HostError> {
        let id = self.id;
        self.apply("set_resizable", move |domain| domain.set_resizable(id, resizable))
    }

    pub fn set_topmost(&self, topmost: bool) -> Result<(), HostError> {
        let id = self.id;
        self.apply("set_topmost", move |domain| domain.set_topmost(id, topmost))
    }

    pub fn set_icon_file(&self, path: impl Into<PathBuf>) -> Result<(), HostError> {
        let id = self.id;
        let path = path.into();
        self.apply("set_icon_file", move |domain| domain.set_icon_file(id, &path))
    }

    pub fn screen_dpi(&self) -> Result<u32, HostError> {
        let id = self.id;
        self.query(move |domain| domain.screen_dpi(id))
    }

    pub fn monitors(&self) -> Result<Vec<Monitor>, HostError> {
        let id = self.id;
        self.query(move |domain| domain.monitors(id))
    }

    pub fn on_resized(&self, handler: Option<ResizedHandler>) -> Result<(), HostError> {
        let id = self.id;
        self.apply("on_resized", move |domain| {
            domain.set_resized_callback(id, handler.map(|handler| handler as ResizedCallback))
        })
    }

    pub fn on_moved(&self, handler: Option<MovedHandler>) -> Result<(), HostError> {
        let id = self.id;
        self.apply("on_moved", move |domain| {
            domain.set_moved_callback(id, handler.map(|handler| handler as MovedCallback))
        })
    }

    /// Runs `job` on the UI thread and hands its result back. Off the UI thread the job is
    /// queued like an invoke, so it too runs with the domain released.
    fn on_ui<R: Send + 'static>(
        &self,
        job: impl FnOnce() -> Result<R, HostError> + Send + 'static,
    ) -> Result<R, HostError> {
        if self.ui.is_ui_thread() {
            return job();
        }
        let (completer, completion) = completion();
        self.ui.post(move || completer.complete(job()))?;
        completion
            .wait()
            .map_err(|_| HostError::Dispatch(DispatchError::Disconnected))?
    }

    /// Runs a command that produces a value. Fails with `DomainBusy` while an event holds the
    /// domain.
    fn query<R: Send + 'static>(
        &self,
        command: impl FnOnce(&mut Domain) -> Result<R, DomainError> + Send + 'static,
    ) -> Result<R, HostError> {
        self.on_ui(move || Ok(host::with_domain(command).into_result()??))
    }

    /// Runs a command without a result.
    fn apply(
        &self,
        name: &'static str,
        command: impl FnOnce(&mut Domain) -> Result<(), DomainError> + Send + 'static,
    ) -> Result<(), HostError> {
        self.perform(name, command, |command| {
            Ok(host::with_domain(command).into_result()??)
        })
    }

    /// Runs `released` on the UI thread when the domain is free. While an event holds the
    /// domain, `command` is queued behind it instead and its errors are only logged.
    fn perform<C, F>(&self, name: &'static str, command: C, released: F) -> Result<(), HostError>
    where
        C: FnOnce(&mut Domain) -> Result<(), DomainError> + Send + 'static,
        F: FnOnce(C) -> Result<(), HostError> + Send + 'static,
    {
        let id = self.id;
        let ui = self.ui.clone();
        self.on_ui(move || {
            if !host::is_busy() {
                return released(command);
            }
            debug!("{name} on {id} deferred: domain busy");
            ui.post_command(move |domain| {
                if let Err(error) = command(domain) {
                    warn!("deferred {name} on {id} failed: {error}");
                }
            })?;
            Ok(())
        })
    }
}

fn file_url(path: &Path) -> Result<Url, HostError> {
    let invalid = || HostError::InvalidLocalPath(path.display().to_string());
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_err(|_| invalid())?.join(path)
    };
    Url::from_file_path(&absolute).map_err(|()| invalid())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    use webwindow_core::{
        DispatchError, EngineKind, EngineProfile, HeadlessConfig, HeadlessEngineConfig, HeadlessPage,
        MessageTransport, Surface, ENGINE_PRIORITY,
    };

    use super::*;
    use crate::host::testing::{domain, fresh_domain, pump_pending};

    fn page_of(window: &WebWindow) -> HeadlessPage {
        let id = window.id();
        domain(|domain| {
            let surface = domain
                .window(id)
                .expect("window should exist")
                .surface()
                .raw();
            domain
                .platform()
                .page_for(surface)
                .expect("window should have a page")
        })
    }

    fn shown_window(title: &str) -> WebWindow {
        let window = WebWindow::new(title, None, None).expect("window should be created");
        window.show().expect("window should show");
        window
    }

    #[test]
    fn show_attaches_the_first_engine() {
        fresh_domain(HeadlessConfig::default());

        let window = shown_window("first");

        assert_eq!(
            window.attachment_state().expect("state should be readable"),
            Some(AttachmentState::Attached(ENGINE_PRIORITY[0].kind))
        );
        assert!(page_of(&window).has_bootstrap());
    }

    #[test]
    fn show_falls_back_when_the_first_engine_is_missing() {
        let mut config = HeadlessConfig::default();
        config.engines = vec![
            HeadlessEngineConfig::missing(ENGINE_PRIORITY[0]),
            HeadlessEngineConfig::available(EngineProfile::WEBKIT_GTK),
        ];
        fresh_domain(config);

        let window = shown_window("fallback");

        assert_eq!(
            window.attachment_state().expect("state should be readable"),
            Some(AttachmentState::Attached(EngineKind::WebKitGtk))
        );
    }

    #[test]
    fn calls_from_other_threads_run_on_the_loop() {
        fresh_domain(HeadlessConfig::default());
        let window = shown_window("remote");
        let (sizes, observed) = mpsc::channel();

        let remote = window.clone();
        let worker = thread::spawn(move || {
            remote
                .set_title("renamed remotely")
                .expect("remote set_title should succeed");
            remote
                .set_size(Size::new(800, 600))
                .expect("remote set_size should succeed");
            let title = remote.title().expect("remote title should be readable");
            sizes.send((title, remote.size().ok())).expect("report should send");
            remote.close().expect("remote close should succeed");
        });

        window.wait_for_exit().expect("loop should run");
        worker.join().expect("worker should finish");

        let (title, size) = observed.recv().expect("worker should report");
        assert_eq!(title, "renamed remotely");
        assert_eq!(size, Some(Size::new(800, 600)));
        assert_eq!(
            window.attachment_state().expect("state should be readable"),
            None
        );
    }

    #[test]
    fn invoke_from_many_threads_runs_every_job() {
        fresh_domain(HeadlessConfig::default());
        let window = shown_window("counter");
        let (done, finished) = mpsc::channel();
        let counter = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let window = window.clone();
                let counter = Arc::clone(&counter);
                let done = done.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        let counter = Arc::clone(&counter);
                        window.invoke(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                    done.send(()).expect("done signal should send");
                })
            })
            .collect();
        drop(done);

        let closer = window.clone();
        let waiter = thread::spawn(move || {
            for _ in finished.iter() {}
            closer.close().expect("close should succeed");
        });

        window.wait_for_exit().expect("loop should run");
        for worker in workers {
            worker.join().expect("worker should finish");
        }
        waiter.join().expect("waiter should finish");

        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn calls_made_while_an_event_holds_the_domain_are_deferred() {
        fresh_domain(HeadlessConfig::default());
        let window = shown_window("before");
        let target = window.clone();
        window
            .set_message_handler(Some(Box::new(move |message: &str| {
                target
                    .set_title(message)
                    .expect("deferred set_title should queue");
            })))
            .expect("handler should install");
        let page = page_of(&window);

        domain(|_| assert!(page.send_from_content("after")));
        assert_eq!(window.title().expect("title should read"), "before");

        domain(|domain| domain.run_pending());
        assert_eq!(window.title().expect("title should read"), "after");
    }

    #[test]
    fn message_handlers_can_query_and_open_windows() {
        fresh_domain(HeadlessConfig::default());
        domain(|domain| domain.platform().set_content(|message, port| port.send(message)));
        let window = shown_window("queried");
        let (seen, observed) = mpsc::channel();
        let target = window.clone();
        window
            .set_message_handler(Some(Box::new(move |_: &str| {
                let size = target.size().ok();
                let child = WebWindow::new("child", Some(&target), None).ok();
                seen.send((size, child.map(|child| child.id())))
                    .expect("observation should send");
            })))
            .expect("handler should install");

        window.send_message("hello").expect("send should succeed");
        pump_pending();

        let (size, child) = observed.try_recv().expect("echo should reach the handler");
        assert_eq!(size, Some(Size::new(900, 600)));
        let child = child.expect("child window should be created");
        assert!(domain(|domain| domain.contains(child)));
        assert!(observed.try_recv().is_err());
    }

    #[test]
    fn resize_handlers_can_read_the_window_back() {
        fresh_domain(HeadlessConfig::default());
        let window = shown_window("resized");
        let (sizes, observed) = mpsc::channel();
        let target = window.clone();
        window
            .on_resized(Some(Box::new(move |size: Size| {
                sizes
                    .send((size, target.size().ok()))
                    .expect("observation should send");
            })))
            .expect("handler should install");

        window.set_size(Size::new(640, 480)).expect("resize should apply");
        pump_pending();

        assert_eq!(
            observed.try_recv().expect("resize should be reported"),
            (Size::new(640, 480), Some(Size::new(640, 480)))
        );
    }

    #[test]
    fn invoked_jobs_can_show_and_query_windows_while_the_loop_runs() {
        fresh_domain(HeadlessConfig::default());
        let root = WebWindow::new("root", None, None).expect("window should be created");
        let (report, reported) = mpsc::channel();

        let remote = root.clone();
        let worker = thread::spawn(move || {
            let target = remote.clone();
            remote.invoke(move || {
                let shown = target.show().is_ok();
                let state = target.attachment_state().ok().flatten();
                report.send((shown, state)).expect("report should send");
            });
            remote.close().expect("remote close should succeed");
        });

        root.wait_for_exit().expect("loop should run");
        worker.join().expect("worker should finish");

        let (shown, state) = reported.recv().expect("job should report");
        assert!(shown);
        assert_eq!(state, Some(AttachmentState::Attached(ENGINE_PRIORITY[0].kind)));
    }

    #[test]
    fn messages_round_trip_through_echo_content() {
        fresh_domain(HeadlessConfig::default());
        domain(|domain| domain.platform().set_content(|message, port| port.send(message)));
        let (replies, received) = mpsc::channel();
        let window = WebWindow::new(
            "echo",
            None,
            Some(Box::new(move |message: &str| {
                replies.send(message.to_owned()).expect("reply should send");
            })),
        )
        .expect("window should be created");
        window.show().expect("window should show");

        window
            .send_message("quote \" backslash \\ newline \n done")
            .expect("send should succeed");
        pump_pending();

        assert_eq!(
            received.try_recv().expect("echo should arrive"),
            "quote \" backslash \\ newline \n done"
        );
    }

    #[test]
    fn custom_schemes_serve_navigations() {
        fresh_domain(HeadlessConfig::default());
        let window = WebWindow::new("schemes", None, None).expect("window should be created");
        window
            .add_custom_scheme("app", |uri: &str| {
                Some(SchemeReply::new(format!("<p>{uri}</p>"), "text/html"))
            })
            .expect("scheme should register");
        window.show().expect("window should show");

        window
            .navigate_to_url("app://index.html")
            .expect("navigation should succeed");
        pump_pending();

        let (status, content_type, body) = page_of(&window).loaded().expect("page should load");
        assert_eq!(status, 200);
        assert_eq!(content_type.as_deref(), Some("text/html"));
        assert_eq!(body, b"<p>app://index.html</p>".to_vec());
    }

    #[test]
    fn local_files_navigate_by_file_url() {
        fresh_domain(HeadlessConfig::default());
        let window = shown_window("files");

        window
            .navigate_to_local_file("site/index.html")
            .expect("local navigation should succeed");
        pump_pending();

        let url = page_of(&window).url().expect("page should have a url");
        assert!(url.starts_with("file://"), "unexpected url {url}");
        assert!(url.ends_with("/site/index.html"), "unexpected url {url}");
    }

    #[test]
    fn parents_must_share_the_ui_thread() {
        fresh_domain(HeadlessConfig::default());
        let foreign = thread::spawn(|| {
            fresh_domain(HeadlessConfig::default());
            WebWindow::new("elsewhere", None, None).expect("foreign window should be created")
        })
        .join()
        .expect("foreign thread should finish");

        let error = WebWindow::new("child", Some(&foreign), None)
            .err()
            .expect("foreign parent should be rejected");

        assert!(matches!(error, HostError::ForeignParent));
    }

    #[test]
    fn the_loop_only_runs_on_the_ui_thread() {
        fresh_domain(HeadlessConfig::default());
        let window = WebWindow::new("loop", None, None).expect("window should be created");

        let error = thread::spawn(move || window.wait_for_exit())
            .join()
            .expect("worker thread should finish")
            .expect_err("loop should be refused off the UI thread");

        assert!(matches!(error, HostError::NotUiThread));
    }

    #[test]
    fn calls_after_the_ui_thread_exits_report_disconnected() {
        let orphan = thread::spawn(|| {
            fresh_domain(HeadlessConfig::default());
            WebWindow::new("orphan", None, None).expect("window should be created")
        })
        .join()
        .expect("ui thread should finish");

        let error = orphan
            .set_title("nobody listens")
            .expect_err("dead UI thread should be reported");

        assert!(matches!(
            error,
            HostError::Dispatch(DispatchError::Disconnected)
        ));
    }

    #[test]
    fn message_handlers_follow_the_engine_transport() {
        fresh_domain(HeadlessConfig::default());
        let window = shown_window("transport");

        let transport = page_of(&window).transport();

        assert_eq!(transport, ENGINE_PRIORITY[0].transport);
        assert!(matches!(
            transport,
            MessageTransport::WebMessage
                | MessageTransport::ScriptHandler { .. }
                | MessageTransport::ScriptNotify
        ));
    }
}
