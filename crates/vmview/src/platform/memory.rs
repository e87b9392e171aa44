//! In-memory transport and platform.
//!
//! Used off the browser: the CLI replays saved responses with it and the
//! tests script backends and inspect history through it.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use futures_channel::oneshot;
use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};
use serde_json::Value;

use super::{Platform, Transport};
use crate::error::NetworkError;
use crate::view_model::{HistoryEntry, NavigationRequest};

enum Reply {
    Ready(Result<Value, NetworkError>),
    Deferred(oneshot::Receiver<Result<Value, NetworkError>>),
}

/// Scripted backend.
///
/// Queued replies are consumed first, in order. Without a queued reply the
/// response registered for the requested reference is returned.
#[derive(Default)]
pub struct MemoryTransport {
    queue: RefCell<VecDeque<Reply>>,
    routes: RefCell<HashMap<String, Value>>,
    requests: RefCell<Vec<NavigationRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every request for `reference` with `response`.
    pub fn route(&self, reference: &str, response: Value) {
        self.routes.borrow_mut().insert(reference.to_owned(), response);
    }

    /// Answers the next request with `response`.
    pub fn respond(&self, response: Value) {
        self.queue.borrow_mut().push_back(Reply::Ready(Ok(response)));
    }

    /// Fails the next request.
    pub fn fail(&self, message: &str) {
        self.queue
            .borrow_mut()
            .push_back(Reply::Ready(Err(NetworkError(message.to_owned()))));
    }

    /// Answers the next request once the returned sender is used.
    pub fn defer(&self) -> oneshot::Sender<Result<Value, NetworkError>> {
        let (sender, receiver) = oneshot::channel();
        self.queue.borrow_mut().push_back(Reply::Deferred(receiver));
        sender
    }

    pub fn requests(&self) -> Vec<NavigationRequest> {
        self.requests.borrow().clone()
    }

    pub fn last_request(&self) -> Option<NavigationRequest> {
        self.requests.borrow().last().cloned()
    }
}

impl Transport for MemoryTransport {
    fn post(&self, request: &NavigationRequest) -> LocalBoxFuture<'static, Result<Value, NetworkError>> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self.queue.borrow_mut().pop_front();
        match reply {
            Some(Reply::Ready(result)) => future::ready(result).boxed_local(),
            Some(Reply::Deferred(receiver)) => receiver
                .map(|reply| reply.unwrap_or_else(|_| Err(NetworkError("request was dropped".to_owned()))))
                .boxed_local(),
            None => {
                let routed = self.routes.borrow().get(&request.reference).cloned();
                let result = routed.ok_or_else(|| NetworkError(format!("no route for `{}`", request.reference)));
                future::ready(result).boxed_local()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOp {
    Push,
    Replace,
    Back,
    Listen,
    Unlisten,
}

/// Document metadata as last written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub class: Option<String>,
    pub icon: Option<String>,
    pub stylesheet: Option<String>,
    /// Number of metadata writes so far.
    pub writes: usize,
}

/// Session history and document kept in memory.
///
/// Starts like a fresh browser tab: one entry with a `null` state and the
/// pop-state listener registered.
pub struct MemoryPlatform {
    entries: RefCell<Vec<Value>>,
    index: Cell<usize>,
    ops: RefCell<Vec<HistoryOp>>,
    listening: Cell<bool>,
    missed_pops: Cell<usize>,
    document: RefCell<Document>,
    errors: RefCell<Vec<String>>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self {
            entries: RefCell::new(vec![Value::Null]),
            index: Cell::new(0),
            ops: RefCell::default(),
            listening: Cell::new(true),
            missed_pops: Cell::new(0),
            document: RefCell::default(),
            errors: RefCell::default(),
        }
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// All history entries, oldest first.
    pub fn entries(&self) -> Vec<Value> {
        self.entries.borrow().clone()
    }

    pub fn current_entry(&self) -> Value {
        self.entries
            .borrow()
            .get(self.index.get())
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn index(&self) -> usize {
        self.index.get()
    }

    pub fn ops(&self) -> Vec<HistoryOp> {
        self.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn is_listening(&self) -> bool {
        self.listening.get()
    }

    /// Programmatic back steps taken while the listener was registered.
    /// Each one would have re-entered the coordinator.
    pub fn missed_pops(&self) -> usize {
        self.missed_pops.get()
    }

    pub fn document(&self) -> Document {
        self.document.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    /// Simulates the user pressing back. Returns the state the pop-state
    /// listener receives, or `None` when there is nowhere to go or nobody
    /// listens.
    pub fn go_back(&self) -> Option<Value> {
        let index = self.index.get().checked_sub(1)?;
        self.index.set(index);
        self.listening.get().then(|| self.current_entry())
    }

    /// Simulates the user pressing forward.
    pub fn go_forward(&self) -> Option<Value> {
        let index = self.index.get() + 1;
        if index >= self.entries.borrow().len() {
            return None;
        }
        self.index.set(index);
        self.listening.get().then(|| self.current_entry())
    }

    fn write_document(&self, write: impl FnOnce(&mut Document)) {
        let mut document = self.document.borrow_mut();
        write(&mut document);
        document.writes += 1;
    }
}

impl Platform for MemoryPlatform {
    fn push_state(&self, entry: &HistoryEntry) {
        let mut entries = self.entries.borrow_mut();
        let index = self.index.get() + 1;
        entries.truncate(index);
        entries.push(entry.to_state());
        self.index.set(index);
        self.ops.borrow_mut().push(HistoryOp::Push);
    }

    fn replace_state(&self, entry: &HistoryEntry) {
        let mut entries = self.entries.borrow_mut();
        if let Some(current) = entries.get_mut(self.index.get()) {
            *current = entry.to_state();
        }
        self.ops.borrow_mut().push(HistoryOp::Replace);
    }

    fn back(&self) {
        if let Some(index) = self.index.get().checked_sub(1) {
            self.index.set(index);
            if self.listening.get() {
                self.missed_pops.set(self.missed_pops.get() + 1);
            }
        }
        self.ops.borrow_mut().push(HistoryOp::Back);
    }

    fn listen(&self) {
        self.listening.set(true);
        self.ops.borrow_mut().push(HistoryOp::Listen);
    }

    fn unlisten(&self) {
        self.listening.set(false);
        self.ops.borrow_mut().push(HistoryOp::Unlisten);
    }

    fn set_title(&self, title: &str) {
        self.write_document(|document| document.title = Some(title.to_owned()));
    }

    fn set_description(&self, description: &str) {
        self.write_document(|document| document.description = Some(description.to_owned()));
    }

    fn set_language(&self, language: &str) {
        self.write_document(|document| document.language = Some(language.to_owned()));
    }

    fn set_theme_class(&self, class: &str) {
        self.write_document(|document| document.class = Some(class.to_owned()));
    }

    fn set_icon(&self, href: &str) {
        self.write_document(|document| document.icon = Some(href.to_owned()));
    }

    fn set_stylesheet(&self, href: &str) {
        self.write_document(|document| document.stylesheet = Some(href.to_owned()));
    }

    fn notify_error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(reference: &str) -> HistoryEntry {
        HistoryEntry {
            reference: Some(reference.to_owned()),
            descriptors: json!([{"head": {"component": reference}}]),
        }
    }

    #[test]
    fn push_truncates_forward_entries() {
        let platform = MemoryPlatform::new();
        platform.push_state(&entry("a"));
        platform.push_state(&entry("b"));
        assert!(platform.go_back().is_some());
        platform.push_state(&entry("c"));

        assert_eq!(platform.entries().len(), 3);
        assert_eq!(platform.index(), 2);
        assert_eq!(platform.current_entry()["ref"], json!("c"));
        assert!(platform.go_forward().is_none());
    }

    #[test]
    fn back_without_listener_is_not_delivered() {
        let platform = MemoryPlatform::new();
        platform.push_state(&entry("a"));
        platform.unlisten();
        platform.back();
        platform.listen();

        assert_eq!(platform.missed_pops(), 0);
        assert_eq!(platform.index(), 0);
        assert_eq!(
            platform.ops(),
            [HistoryOp::Push, HistoryOp::Unlisten, HistoryOp::Back, HistoryOp::Listen]
        );
    }

    #[tokio::test]
    async fn transport_prefers_queued_replies_over_routes() {
        let transport = MemoryTransport::new();
        transport.route("@default", json!([{"head": {"component": "home"}}]));
        transport.respond(json!({"error": "boom"}));
        let request = NavigationRequest::new("@default", None);

        assert_eq!(transport.post(&request).await.unwrap(), json!({"error": "boom"}));
        assert_eq!(transport.post(&request).await.unwrap()[0]["head"]["component"], json!("home"));
        assert!(transport.post(&NavigationRequest::new("nowhere", None)).await.is_err());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn deferred_reply_resolves_when_sent() {
        let transport = MemoryTransport::new();
        let sender = transport.defer();
        let pending = transport.post(&NavigationRequest::new("books", None));
        sender.send(Ok(json!([]))).unwrap();

        assert_eq!(pending.await.unwrap(), json!([]));
    }
}
