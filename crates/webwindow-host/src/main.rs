use std::thread;
use std::time::Duration;

use log::{info, warn};
use webwindow_core::{MessageKind, SchemeReply};
use webwindow_host::{config, HostError, Ipc, WebWindow};

const INDEX_HTML: &str = r#"<!doctype html>
<html>
  <head><title>WebWindow</title></head>
  <body>
    <h1>Hello from WebWindow</h1>
    <script>
      window.external.receiveMessage(message => console.log("host said", message));
      window.external.sendMessage('ipc:ping ["hello"]');
    </script>
  </body>
</html>
"#;

const DEMO_SECONDS: u64 = 2;

fn main() {
    config::global();
    if let Err(error) = run() {
        eprintln!("webwindow-demo: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), HostError> {
    let window = WebWindow::new("WebWindow demo", None, None)?;
    window.add_custom_scheme("app", |uri: &str| {
        let path = uri.trim_start_matches("app://localhost");
        match path {
            "/" | "/index.html" => Some(SchemeReply::new(INDEX_HTML, "text/html")),
            _ => None,
        }
    })?;

    let ipc = Ipc::attach(window.clone())?;
    let replies = ipc.clone();
    ipc.on("ping", move |args| {
        info!("ping from content: {args:?}");
        if let Err(error) = replies.send("pong", args.to_vec()) {
            warn!("pong failed: {error}");
        }
    });

    window.show()?;
    window.navigate_to_url("app://localhost/index.html")?;
    let size = window.size()?;
    info!("demo window is {size} at {:?}", window.position()?);

    let closer = window.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(DEMO_SECONDS));
        if let Err(error) = closer.show_message("WebWindow", "Closing the demo", MessageKind::Info) {
            warn!("message box failed: {error}");
        }
        if let Err(error) = closer.close() {
            warn!("close failed: {error}");
        }
    });

    window.wait_for_exit()
}
