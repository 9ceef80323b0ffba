//! Virtual network backing `fetch`.
//!
//! Requests never leave the process: each URL resolves against a route
//! table. A matched route produces a `Response`; an unknown URL rejects the
//! promise with `TypeError("Failed to fetch")`. Settlement is queued as a
//! task, so it is observed on a later turn of the event loop.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Completion;
use crate::event_loop::{Job, Settlement};
use crate::object::{ObjectKind, ResponseData};
use crate::realm::Realm;
use crate::value::{HostValue, ObjectId};

/// A canned response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct Network {
    routes: HashMap<String, Route>,
    requests: Vec<String>,
}

impl Network {
    /// Register a response for an absolute URL.
    pub fn route(&mut self, url: impl Into<String>, status: u16, body: impl Into<String>) {
        self.routes.insert(
            url.into(),
            Route {
                status,
                body: body.into(),
            },
        );
    }

    pub fn lookup(&self, url: &str) -> Option<&Route> {
        self.routes.get(url)
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

impl Realm {
    /// Resolve a URL against the configured origin.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") {
            url.to_string()
        } else if let Some(path) = url.strip_prefix('/') {
            format!("{}/{}", self.config().origin.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.config().origin.trim_end_matches('/'), url)
        }
    }

    /// `window.fetch(url)`: returns a pending promise settled by a task.
    pub fn fetch(&mut self, url: &str) -> ObjectId {
        let url = self.resolve_url(url);
        let promise = self.new_promise();
        self.network_mut().requests.push(url.clone());
        let (settlement, value) = match self.network().lookup(&url).cloned() {
            Some(route) => {
                debug!(%url, status = route.status, "fetch");
                let response = self.alloc(ObjectKind::Response(ResponseData {
                    url,
                    status: route.status,
                    body: route.body,
                    body_used: false,
                }));
                (Settlement::Fulfilled, HostValue::Object(response))
            }
            None => {
                debug!(%url, "fetch: no route");
                let err = self.type_error("Failed to fetch");
                (Settlement::Rejected, err.into_value())
            }
        };
        self.event_loop_mut().queue_task(Job::Settle {
            promise,
            settlement,
            value,
        });
        promise
    }

    pub fn response(&self, id: ObjectId) -> Option<&ResponseData> {
        match &self.object(id).kind {
            ObjectKind::Response(data) => Some(data),
            _ => None,
        }
    }

    /// Take the body of a response; a second read is an error.
    fn consume_body(&mut self, id: ObjectId) -> Completion<String> {
        let used = match &mut self.object_mut(id).kind {
            ObjectKind::Response(data) if !data.body_used => {
                data.body_used = true;
                return Ok(data.body.clone());
            }
            ObjectKind::Response(_) => true,
            _ => false,
        };
        if used {
            Err(self.type_error("Body has already been consumed."))
        } else {
            Err(self.type_error("Illegal invocation"))
        }
    }

    /// `response.text()`: a promise of the body text.
    pub fn response_text(&mut self, id: ObjectId) -> ObjectId {
        match self.consume_body(id) {
            Ok(body) => self.promise_resolve(HostValue::String(body)),
            Err(thrown) => self.promise_reject(thrown.into_value()),
        }
    }

    /// `response.json()`: a promise of the parsed body.
    pub fn response_json(&mut self, id: ObjectId) -> ObjectId {
        let parsed = self
            .consume_body(id)
            .and_then(|body| self.json_parse(&body));
        match parsed {
            Ok(value) => self.promise_resolve(value),
            Err(thrown) => self.promise_reject(thrown.into_value()),
        }
    }
}
