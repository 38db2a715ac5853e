use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, trace};

use crate::buffer::ResourceBuffer;

pub const CONTENT_TYPE: &str = "Content-Type";

/// What a scheme handler hands back for one request.
#[derive(Debug, PartialEq, Eq)]
pub struct SchemeReply {
    pub body: ResourceBuffer,
    pub content_type: String,
}

impl SchemeReply {
    pub fn new(body: impl Into<ResourceBuffer>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }
}

/// Called with the full request URI. `None` leaves the request to the engine.
pub type SchemeHandler = Box<dyn FnMut(&str) -> Option<SchemeReply>>;

type SharedHandler = Rc<RefCell<SchemeHandler>>;

#[derive(Default)]
pub struct SchemeTable {
    handlers: BTreeMap<String, SharedHandler>,
}

impl SchemeTable {
    /// Registers or replaces the handler for `scheme`; returns the normalized scheme name.
    pub fn insert(&mut self, scheme: &str, handler: SchemeHandler) -> String {
        let scheme = normalize_scheme(scheme);
        let replaced = self
            .handlers
            .insert(scheme.clone(), Rc::new(RefCell::new(handler)))
            .is_some();
        debug!("scheme {scheme}: handler {}", if replaced { "replaced" } else { "registered" });
        scheme
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.handlers.contains_key(&normalize_scheme(scheme))
    }

    pub fn schemes(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn handler(&self, scheme: &str) -> Option<SharedHandler> {
        self.handlers.get(&normalize_scheme(scheme)).cloned()
    }
}

pub fn normalize_scheme(scheme: &str) -> String {
    scheme.trim().to_ascii_lowercase()
}

/// Text before the first `:`. URIs without a colon, or starting with one, have no scheme.
pub fn scheme_of(uri: &str) -> Option<&str> {
    match uri.find(':') {
        Some(index) if index > 0 => Some(&uri[..index]),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: ResourceBuffer,
}

impl ResourceResponse {
    pub fn ok(reply: SchemeReply) -> Self {
        Self {
            status: 200,
            reason: "OK",
            headers: vec![(CONTENT_TYPE.to_owned(), reply.content_type)],
            body: reply.body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    /// Headers in the `Name: value` line form native response constructors take.
    pub fn header_block(&self) -> String {
        self.headers
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

/// Answers engine resource requests from the live scheme table of one window.
#[derive(Clone)]
pub struct ResourceBridge {
    table: Rc<RefCell<SchemeTable>>,
}

impl ResourceBridge {
    pub fn new(table: Rc<RefCell<SchemeTable>>) -> Self {
        Self { table }
    }

    pub fn intercept(&self, uri: &str) -> Option<ResourceResponse> {
        let Some(scheme) = scheme_of(uri) else {
            trace!("no scheme in {uri:?}, leaving to engine");
            return None;
        };
        // The table borrow ends here so handlers may register schemes themselves.
        let handler = self.table.borrow().handler(scheme);
        let Some(handler) = handler else {
            trace!("no handler for scheme {scheme:?}");
            return None;
        };

        let reply = match handler.try_borrow_mut() {
            Ok(mut handler) => (*handler)(uri),
            Err(_) => {
                debug!("handler for {scheme:?} re-entered while running, leaving {uri:?} to engine");
                None
            }
        };
        match reply {
            Some(reply) => {
                trace!("{uri} -> 200 {} ({} bytes)", reply.content_type, reply.body.len());
                Some(ResourceResponse::ok(reply))
            }
            None => {
                trace!("handler for {scheme:?} declined {uri}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{scheme_of, ResourceBridge, SchemeReply, SchemeTable};

    fn bridge_with(table: SchemeTable) -> (Rc<RefCell<SchemeTable>>, ResourceBridge) {
        let table = Rc::new(RefCell::new(table));
        let bridge = ResourceBridge::new(Rc::clone(&table));
        (table, bridge)
    }

    fn tagging_handler(tag: &'static str) -> super::SchemeHandler {
        Box::new(move |uri: &str| Some(SchemeReply::new(format!("{tag}:{uri}"), "text/plain")))
    }

    #[test]
    fn scheme_is_text_before_first_colon() {
        assert_eq!(scheme_of("app://index.html"), Some("app"));
        assert_eq!(scheme_of("data:text/plain,a:b"), Some("data"));
        assert_eq!(scheme_of("no-colon-here"), None);
        assert_eq!(scheme_of(":leading"), None);
    }

    #[test]
    fn requests_route_to_exactly_their_scheme_handler() {
        let mut table = SchemeTable::default();
        table.insert("app", tagging_handler("app"));
        table.insert("assets", tagging_handler("assets"));
        let (_table, bridge) = bridge_with(table);

        let response = bridge
            .intercept("app://index.html")
            .expect("registered scheme should be answered");
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.body.as_slice(), b"app:app://index.html");

        let response = bridge
            .intercept("assets:logo.png")
            .expect("second scheme should be answered");
        assert_eq!(response.body.as_slice(), b"assets:assets:logo.png");

        assert!(bridge.intercept("https://example.com").is_none());
        assert!(bridge.intercept("apps://index.html").is_none());
        assert!(bridge.intercept("relative/path").is_none());
    }

    #[test]
    fn scheme_lookup_ignores_case_and_last_registration_wins() {
        let mut table = SchemeTable::default();
        table.insert("App", tagging_handler("first"));
        table.insert("APP", tagging_handler("second"));
        let (table, bridge) = bridge_with(table);

        assert_eq!(table.borrow().schemes(), vec!["app".to_owned()]);
        let response = bridge
            .intercept("aPp://x")
            .expect("case-insensitive scheme should be answered");
        assert_eq!(response.body.as_slice(), b"second:aPp://x");
    }

    #[test]
    fn declined_requests_are_left_to_the_engine() {
        let mut table = SchemeTable::default();
        table.insert("app", Box::new(|_uri: &str| None));
        let (_table, bridge) = bridge_with(table);

        assert!(bridge.intercept("app://missing").is_none());
    }

    #[test]
    fn registrations_after_bridge_creation_apply() {
        let (table, bridge) = bridge_with(SchemeTable::default());
        assert!(bridge.intercept("late://x").is_none());

        table.borrow_mut().insert("late", tagging_handler("late"));
        assert!(bridge.intercept("late://x").is_some());
    }

    #[test]
    fn handler_may_register_schemes_while_running() {
        let (table, bridge) = bridge_with(SchemeTable::default());
        let inner = Rc::clone(&table);
        table.borrow_mut().insert(
            "boot",
            Box::new(move |_uri: &str| {
                inner
                    .borrow_mut()
                    .insert("extra", Box::new(|_uri: &str| Some(SchemeReply::new("x", "text/plain"))));
                Some(SchemeReply::new("booted", "text/plain"))
            }),
        );

        assert!(bridge.intercept("boot://").is_some());
        assert!(table.borrow().contains("extra"));
    }

    #[test]
    fn header_block_lists_content_type() {
        let mut table = SchemeTable::default();
        table.insert("app", Box::new(|_uri: &str| Some(SchemeReply::new("<p/>", "text/html"))));
        let (_table, bridge) = bridge_with(table);

        let response = bridge.intercept("app://page").expect("page should be served");
        assert_eq!(response.header_block(), "Content-Type: text/html");
    }
}
