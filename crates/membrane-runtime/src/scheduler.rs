//! Draining the host event loop.
//!
//! The realm only queues work; running it may call module code, so it
//! happens here. Microtasks run at checkpoints: after each task, timer and
//! animation frame, and when the outermost module call returns. A
//! checkpoint reached while module code is still on the stack does nothing.

use membrane_host::{HostValue, Job, ObjectId, Settlement};
use tracing::trace;

use crate::context::BoundaryCx;
use crate::error::{BoundaryError, BoundaryResult};
use crate::invoke::{self, call_function};

/// Run queued microtasks unless module code is on the stack.
pub fn microtask_checkpoint<C: BoundaryCx>(cx: &mut C) -> BoundaryResult<()> {
    if cx.boundary().depth > 0 {
        return Ok(());
    }
    run_microtasks(cx)
}

/// Run microtasks until the queue is empty, including ones queued meanwhile.
pub fn run_microtasks<C: BoundaryCx>(cx: &mut C) -> BoundaryResult<()> {
    while let Some(job) = cx.boundary_mut().realm.event_loop_mut().pop_microtask() {
        run_job(cx, job)?;
    }
    Ok(())
}

fn run_job<C: BoundaryCx>(cx: &mut C, job: Job) -> BoundaryResult<()> {
    trace!(?job, "run job");
    match job {
        Job::Call { callback, argument } => {
            if let Err(thrown) = call_function(cx, &HostValue::Object(callback), argument)? {
                invoke::report_exception(cx, &thrown);
            }
        }
        Job::Reaction {
            reaction,
            settlement,
            argument,
        } => {
            let (settlement, value) = match reaction.handler(settlement) {
                Some(handler) => match call_function(cx, &HostValue::Object(handler), argument)? {
                    Ok(value) => (Settlement::Fulfilled, value),
                    Err(thrown) => (Settlement::Rejected, thrown.into_value()),
                },
                None => (settlement, argument),
            };
            cx.boundary_mut()
                .realm
                .settle_derived(reaction.derived, settlement, value);
            for handler in reaction.handlers() {
                invoke::release_callback(cx, handler)?;
            }
        }
        Job::Settle {
            promise,
            settlement,
            value,
        } => {
            let realm = &mut cx.boundary_mut().realm;
            match settlement {
                Settlement::Fulfilled => realm.resolve_promise(promise, value),
                Settlement::Rejected => realm.reject_promise(promise, value),
            }
        }
    }
    Ok(())
}

/// Run microtasks and tasks until both queues are empty. Timers and
/// animation frames are not touched and the clock does not move.
pub fn run_until_idle<C: BoundaryCx>(cx: &mut C) -> BoundaryResult<()> {
    loop {
        run_microtasks(cx)?;
        match cx.boundary_mut().realm.event_loop_mut().pop_task() {
            Some(job) => run_job(cx, job)?,
            None => return Ok(()),
        }
    }
}

/// Move the clock forward by `ms`, firing every timer that falls due, in
/// deadline order. Each timer callback is followed by a checkpoint.
pub fn advance_time<C: BoundaryCx>(cx: &mut C, ms: u64) -> BoundaryResult<()> {
    let until = cx.boundary().realm.event_loop().now() + ms;
    while let Some(timer) = cx.boundary_mut().realm.event_loop_mut().next_due_timer(until) {
        trace!(id = timer.id, due = timer.due, "fire timer");
        fire(cx, timer.callback, HostValue::Undefined)?;
    }
    cx.boundary_mut().realm.event_loop_mut().set_now(until);
    Ok(())
}

/// Run the animation frame callbacks registered so far with `timestamp`.
pub fn animation_frame<C: BoundaryCx>(cx: &mut C, timestamp: f64) -> BoundaryResult<()> {
    let frames = cx.boundary_mut().realm.event_loop_mut().take_animation_frames();
    for (id, callback) in frames {
        trace!(id, "run animation frame");
        fire(cx, callback, HostValue::Number(timestamp))?;
    }
    Ok(())
}

/// Call a one-shot callback the host retained, then drop that reference.
fn fire<C: BoundaryCx>(cx: &mut C, callback: ObjectId, argument: HostValue) -> BoundaryResult<()> {
    let result = call_function(cx, &HostValue::Object(callback), argument)?;
    invoke::release_callback(cx, callback)?;
    if let Err(thrown) = result {
        invoke::report_exception(cx, &thrown);
    }
    microtask_checkpoint(cx)
}

/// Dispatch a new bubbling, cancelable event of `event_type` at `target`.
/// Returns `false` when a listener prevented the default action.
pub fn dispatch_event<C: BoundaryCx>(
    cx: &mut C,
    target: ObjectId,
    event_type: &str,
) -> BoundaryResult<bool> {
    let event = cx
        .boundary_mut()
        .realm
        .create_event(event_type, true, true);
    let not_cancelled = match invoke::dispatch(cx, event, target)? {
        Ok(not_cancelled) => not_cancelled,
        Err(thrown) => {
            let message = cx.boundary().realm.display_string(thrown.value());
            return Err(BoundaryError::UncaughtException { message });
        }
    };
    microtask_checkpoint(cx)?;
    Ok(not_cancelled)
}
