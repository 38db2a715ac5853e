use std::cell::RefCell;

use log::{trace, warn};

use crate::completion::Completion;
use crate::engine::{EngineResult, EngineView, MessageTransport};

pub const DISPATCH_FUNCTION: &str = "__dispatchMessageCallback";

/// Receives every message content sends with `window.external.sendMessage`.
pub type WebMessageCallback = Box<dyn FnMut(&str)>;

const WEB_MESSAGE_BOOTSTRAP: &str = r#"(function () {
    var webview = window.chrome.webview;
    window.external = {
        sendMessage: function (message) {
            webview.postMessage(message);
        },
        receiveMessage: function (callback) {
            webview.addEventListener('message', function (event) {
                callback(event.data);
            });
        }
    };
})();"#;

/// Content-side API installed at document creation for the given transport.
pub fn bootstrap_script(transport: &MessageTransport) -> String {
    match transport {
        MessageTransport::WebMessage => WEB_MESSAGE_BOOTSTRAP.to_owned(),
        MessageTransport::ScriptHandler { name } => script_dispatch_bootstrap(&format!(
            "function (message) {{ window.webkit.messageHandlers.{name}.postMessage(message); }}"
        )),
        MessageTransport::ScriptNotify => {
            script_dispatch_bootstrap("window.external.notify.bind(window.external)")
        }
    }
}

fn script_dispatch_bootstrap(post: &str) -> String {
    format!(
        r#"(function () {{
    var callbacks = [];
    var post = {post};
    window.__receiveMessageCallbacks = callbacks;
    window.{DISPATCH_FUNCTION} = function (message) {{
        callbacks.forEach(function (callback) {{
            callback(message);
        }});
    }};
    window.external = {{
        sendMessage: function (message) {{
            post(message);
        }},
        receiveMessage: function (callback) {{
            callbacks.push(callback);
        }}
    }};
}})();"#
    )
}

/// Script that hands `message` to every content-side receive callback.
pub fn dispatch_expression(message: &str) -> String {
    let literal = serde_json::Value::String(message.to_owned());
    format!("{DISPATCH_FUNCTION}({literal})")
}

/// Inverse of [`dispatch_expression`]; `None` for any other script.
pub fn parse_dispatch_expression(script: &str) -> Option<String> {
    let argument = script
        .trim()
        .strip_prefix(DISPATCH_FUNCTION)?
        .strip_prefix('(')?
        .strip_suffix(')')?;
    serde_json::from_str::<String>(argument).ok()
}

pub enum Outbound {
    /// Handed to the engine's native post primitive.
    Posted,
    /// Dispatch script is running; settles once the engine reports evaluation finished.
    Evaluating(Completion<EngineResult<()>>),
}

pub fn begin_send(view: &mut dyn EngineView, message: &str) -> Outbound {
    if view.transport().posts_natively() {
        view.post_web_message(message);
        Outbound::Posted
    } else {
        Outbound::Evaluating(view.evaluate_script(&dispatch_expression(message)))
    }
}

/// Content-to-host half of the channel for one window.
#[derive(Default)]
pub struct InboundChannel {
    callback: RefCell<Option<WebMessageCallback>>,
}

impl InboundChannel {
    pub fn new(callback: Option<WebMessageCallback>) -> Self {
        Self {
            callback: RefCell::new(callback),
        }
    }

    pub fn set_callback(&self, callback: Option<WebMessageCallback>) {
        match self.callback.try_borrow_mut() {
            Ok(mut slot) => *slot = callback,
            Err(_) => warn!("message callback cannot be replaced from inside itself"),
        }
    }

    /// Forwards `message` verbatim. Returns whether a callback received it.
    pub fn deliver(&self, message: &str) -> bool {
        let Ok(mut slot) = self.callback.try_borrow_mut() else {
            warn!("web message dropped: message callback re-entered");
            return false;
        };
        match slot.as_mut() {
            Some(callback) => {
                callback(message);
                true
            }
            None => {
                trace!("web message dropped: no callback registered");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::engine::MessageTransport;

    use super::{
        bootstrap_script, dispatch_expression, parse_dispatch_expression, InboundChannel,
        DISPATCH_FUNCTION,
    };

    #[test]
    fn dispatch_expression_escapes_quotes_backslashes_and_controls() {
        let message = "say \"hi\" \\ path\\to\nnext\tline\u{0001}\u{2028}</script>";
        let script = dispatch_expression(message);

        assert!(script.starts_with("__dispatchMessageCallback(\""));
        assert!(!script.contains('\n'));
        assert!(!script.contains('\u{0001}'));
        assert_eq!(parse_dispatch_expression(&script).as_deref(), Some(message));
    }

    #[test]
    fn unrelated_scripts_are_not_dispatches() {
        assert_eq!(parse_dispatch_expression("alert(1)"), None);
        assert_eq!(parse_dispatch_expression("__dispatchMessageCallback(notjson)"), None);
    }

    #[test]
    fn web_message_bootstrap_uses_native_posting() {
        let script = bootstrap_script(&MessageTransport::WebMessage);
        assert!(script.contains("window.external"));
        assert!(script.contains("postMessage(message)"));
        assert!(script.contains("addEventListener('message'"));
        assert!(!script.contains(DISPATCH_FUNCTION));
    }

    #[test]
    fn script_handler_bootstrap_defines_dispatch_function() {
        let script = bootstrap_script(&MessageTransport::ScriptHandler {
            name: "webwindowinterop",
        });
        assert!(script.contains("window.__dispatchMessageCallback = function"));
        assert!(script.contains("window.webkit.messageHandlers.webwindowinterop.postMessage"));
        assert!(script.contains("receiveMessage"));
    }

    #[test]
    fn inbound_messages_reach_callback_verbatim() {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let channel = InboundChannel::new(Some(Box::new(move |message: &str| {
            sink.borrow_mut().push(message.to_owned());
        })));

        assert!(channel.deliver("first"));
        assert!(channel.deliver("second \"quoted\""));
        assert_eq!(*received.borrow(), vec!["first", "second \"quoted\""]);
    }

    #[test]
    fn messages_without_callback_are_dropped() {
        let channel = InboundChannel::default();
        assert!(!channel.deliver("nobody listening"));
    }
}
