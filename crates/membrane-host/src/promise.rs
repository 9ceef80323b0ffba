//! Promises.
//!
//! Settling a promise never runs callbacks directly; every reaction is
//! queued as a microtask and run by the boundary's scheduler.

use tracing::debug;

use crate::event_loop::{Job, Settlement};
use crate::object::ObjectKind;
use crate::realm::Realm;
use crate::value::{HostValue, ObjectId};

/// A `then` registration waiting for settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub on_fulfilled: Option<ObjectId>,
    pub on_rejected: Option<ObjectId>,
    /// Promise returned by `then`.
    pub derived: ObjectId,
}

impl Reaction {
    /// The handler to run for a settlement, if any.
    pub fn handler(&self, settlement: Settlement) -> Option<ObjectId> {
        match settlement {
            Settlement::Fulfilled => self.on_fulfilled,
            Settlement::Rejected => self.on_rejected,
        }
    }

    /// Both handlers, for releasing once the reaction has run.
    pub fn handlers(&self) -> impl Iterator<Item = ObjectId> {
        self.on_fulfilled.into_iter().chain(self.on_rejected)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending {
        reactions: Vec<Reaction>,
        /// Resolved with another promise and following it.
        locked: bool,
    },
    Fulfilled(HostValue),
    Rejected(HostValue),
}

impl Default for PromiseState {
    fn default() -> Self {
        Self::Pending {
            reactions: Vec::new(),
            locked: false,
        }
    }
}

impl PromiseState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

impl Realm {
    pub fn new_promise(&mut self) -> ObjectId {
        self.alloc(ObjectKind::Promise(PromiseState::default()))
    }

    pub fn promise_state(&self, id: ObjectId) -> Option<&PromiseState> {
        match &self.object(id).kind {
            ObjectKind::Promise(state) => Some(state),
            _ => None,
        }
    }

    fn is_promise(&self, value: &HostValue) -> Option<ObjectId> {
        let id = value.as_object()?;
        self.promise_state(id).map(|_| id)
    }

    /// Resolve a promise with a value. A promise value is adopted; resolving
    /// a promise with itself rejects it with a `TypeError`. Resolving an
    /// already-resolved promise does nothing.
    pub fn resolve_promise(&mut self, promise: ObjectId, value: HostValue) {
        match self.promise_state(promise) {
            Some(PromiseState::Pending { locked: false, .. }) => {}
            _ => return,
        }
        if let Some(inner) = self.is_promise(&value) {
            if inner == promise {
                let err = self.type_error("Chaining cycle detected for promise");
                self.settle(promise, Settlement::Rejected, err.into_value());
                return;
            }
            if let ObjectKind::Promise(PromiseState::Pending { locked, .. }) =
                &mut self.object_mut(promise).kind
            {
                *locked = true;
            }
            self.add_reaction(
                inner,
                Reaction {
                    on_fulfilled: None,
                    on_rejected: None,
                    derived: promise,
                },
            );
            return;
        }
        self.settle(promise, Settlement::Fulfilled, value);
    }

    /// Reject a promise. Rejecting an already-resolved promise does nothing.
    pub fn reject_promise(&mut self, promise: ObjectId, reason: HostValue) {
        if let Some(PromiseState::Pending { locked: false, .. }) = self.promise_state(promise) {
            self.settle(promise, Settlement::Rejected, reason);
        }
    }

    /// Settle a promise that may be following another one. Used by reaction
    /// jobs, which own the derived promise's outcome.
    pub fn settle_derived(&mut self, promise: ObjectId, settlement: Settlement, value: HostValue) {
        if let ObjectKind::Promise(PromiseState::Pending { locked, .. }) =
            &mut self.object_mut(promise).kind
        {
            *locked = false;
        }
        match settlement {
            Settlement::Fulfilled => self.resolve_promise(promise, value),
            Settlement::Rejected => self.reject_promise(promise, value),
        }
    }

    fn settle(&mut self, promise: ObjectId, settlement: Settlement, value: HostValue) {
        let new_state = match settlement {
            Settlement::Fulfilled => PromiseState::Fulfilled(value.clone()),
            Settlement::Rejected => PromiseState::Rejected(value.clone()),
        };
        let ObjectKind::Promise(state) = &mut self.object_mut(promise).kind else {
            return;
        };
        let old = std::mem::replace(state, new_state);
        debug!(%promise, ?settlement, "settle promise");
        if let PromiseState::Pending { reactions, .. } = old {
            for reaction in reactions {
                self.queue_reaction(reaction, settlement, value.clone());
            }
        }
    }

    fn queue_reaction(&mut self, reaction: Reaction, settlement: Settlement, argument: HostValue) {
        self.event_loop_mut().queue_microtask(Job::Reaction {
            reaction,
            settlement,
            argument,
        });
    }

    fn add_reaction(&mut self, promise: ObjectId, reaction: Reaction) {
        let settled = match &mut self.object_mut(promise).kind {
            ObjectKind::Promise(PromiseState::Pending { reactions, .. }) => {
                reactions.push(reaction);
                return;
            }
            ObjectKind::Promise(PromiseState::Fulfilled(v)) => (Settlement::Fulfilled, v.clone()),
            ObjectKind::Promise(PromiseState::Rejected(v)) => (Settlement::Rejected, v.clone()),
            _ => return,
        };
        self.queue_reaction(reaction, settled.0, settled.1);
    }

    /// `promise.then(on_fulfilled, on_rejected)`; returns the derived promise.
    /// Non-function handlers are ignored.
    pub fn promise_then(
        &mut self,
        promise: ObjectId,
        on_fulfilled: Option<ObjectId>,
        on_rejected: Option<ObjectId>,
    ) -> ObjectId {
        let callable = |realm: &Realm, f: Option<ObjectId>| {
            f.filter(|id| realm.is_function(&HostValue::Object(*id)))
        };
        let reaction = Reaction {
            on_fulfilled: callable(self, on_fulfilled),
            on_rejected: callable(self, on_rejected),
            derived: self.new_promise(),
        };
        let derived = reaction.derived;
        self.add_reaction(promise, reaction);
        derived
    }

    /// `Promise.resolve(value)`: a promise value is returned unchanged.
    pub fn promise_resolve(&mut self, value: HostValue) -> ObjectId {
        if let Some(id) = self.is_promise(&value) {
            return id;
        }
        let promise = self.new_promise();
        self.resolve_promise(promise, value);
        promise
    }

    /// `Promise.reject(reason)`.
    pub fn promise_reject(&mut self, reason: HostValue) -> ObjectId {
        let promise = self.new_promise();
        self.reject_promise(promise, reason);
        promise
    }
}
