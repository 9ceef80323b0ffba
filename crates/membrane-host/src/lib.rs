//! Host environment model for the membrane boundary.
//!
//! A [`Realm`] is a small, deterministic stand-in for a browser: an object
//! arena with a `window`, a `document` (`<html><body>`), DOM nodes with
//! attributes and listeners, promises, web storage, a virtual network for
//! `fetch`, and a cooperative [`EventLoop`] on a virtual clock.
//!
//! Host operations that can throw return [`Completion<T>`]; a throw carries
//! the thrown [`HostValue`] (usually an error object such as `TypeError` or
//! a `DOMException` like `NotFoundError`).
//!
//! Nothing in this crate calls module code. Callbacks are function objects
//! ([`FunctionKind::Closure`]) whose invocation is queued as [`Job`]s and
//! performed by the boundary.

pub mod config;
pub mod console;
mod dom;
pub mod error;
pub mod event_loop;
mod json;
pub mod network;
pub mod object;
pub mod promise;
pub mod realm;
mod render;
mod storage;
pub mod value;

pub use config::RealmConfig;
pub use console::{Console, ConsoleEntry, ConsoleLevel};
pub use error::{Completion, Thrown};
pub use event_loop::{EventLoop, Job, Settlement, Timer};
pub use network::{Network, Route};
pub use object::{ClosureKey, FunctionKind, Interface, Listener, ObjectKind};
pub use promise::PromiseState;
pub use realm::Realm;
pub use value::{format_number, HostValue, ObjectId};
