#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Synchronous publish/subscribe transport for noise stimuli.
//!
//! The [`StimulusBus`] is a pure transport: it hands every event to every
//! live subscriber, in subscription order, inside the [`StimulusBus::emit`]
//! call. It keeps no queue and no history. Range and room filtering belong to
//! the listeners.
//!
//! Subscriptions are RAII guards. Dropping a [`Subscription`] removes the
//! listener, so an agent that owns its guard can never leave a dangling
//! handler behind.

use std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use thiserror::Error;
use tracing::{debug, warn};
use warden_core::StimulusEvent;

mod bark;

pub use bark::{BarkEmitter, BarkEmitterConfig};

/// Failure reported by a listener while handling a stimulus.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ListenerError {
    /// The listener could not process the event.
    #[error("listener rejected stimulus: {0}")]
    Rejected(String),
}

/// Receiver of stimulus events.
pub trait StimulusListener {
    /// Handles one event. Errors and panics are logged by the bus and do not
    /// stop delivery to other listeners.
    fn hear(&mut self, event: &StimulusEvent) -> Result<(), ListenerError>;
}

/// Adapts a closure into a [`StimulusListener`].
#[derive(Debug)]
pub struct ListenerFn<F>(pub F);

impl<F> StimulusListener for ListenerFn<F>
where
    F: FnMut(&StimulusEvent) -> Result<(), ListenerError>,
{
    fn hear(&mut self, event: &StimulusEvent) -> Result<(), ListenerError> {
        (self.0)(event)
    }
}

/// Identifier handed out for each subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Outcome of a single [`StimulusBus::emit`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Listeners that handled the event successfully.
    pub delivered: usize,
    /// Listeners that returned an error, panicked, or were busy handling
    /// another event.
    pub failed: usize,
    /// Subscriptions whose listener had already been dropped.
    pub pruned: usize,
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    listener: Weak<RefCell<dyn StimulusListener>>,
}

#[derive(Debug, Default)]
struct BusState {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Fan-out channel shared by stimulus producers and listening agents.
#[derive(Debug, Default)]
pub struct StimulusBus {
    state: RefCell<BusState>,
}

impl StimulusBus {
    /// Creates an empty bus ready to be shared.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registers `listener` and returns the guard that keeps it registered.
    ///
    /// The bus only holds a weak reference; the caller keeps the listener
    /// alive.
    pub fn subscribe<L>(self: &Rc<Self>, listener: &Rc<RefCell<L>>) -> Subscription
    where
        L: StimulusListener + 'static,
    {
        let listener: Rc<RefCell<dyn StimulusListener>> = listener.clone();
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next_id);
        state.next_id = state.next_id.wrapping_add(1);
        state.subscribers.push(Subscriber {
            id,
            listener: Rc::downgrade(&listener),
        });
        debug!(subscription = id.get(), "stimulus listener subscribed");

        Subscription {
            id,
            bus: Rc::downgrade(self),
        }
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.subscribers.len();
        state.subscribers.retain(|subscriber| subscriber.id != id);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!(subscription = id.get(), "stimulus listener unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every current subscriber before returning.
    ///
    /// A listener that returns an error or panics is counted as failed and
    /// the remaining listeners still hear the event. Panics are only caught
    /// when the build unwinds.
    ///
    /// Listeners subscribed or unsubscribed by a handler during the call take
    /// effect from the next emission.
    pub fn emit(&self, event: &StimulusEvent) -> EmitReport {
        let recipients: Vec<(SubscriptionId, Weak<RefCell<dyn StimulusListener>>)> = self
            .state
            .borrow()
            .subscribers
            .iter()
            .map(|subscriber| (subscriber.id, subscriber.listener.clone()))
            .collect();

        debug!(
            kind = ?event.kind,
            position = ?event.position,
            room = event.room.as_ref().map(|room| room.as_str()),
            recipients = recipients.len(),
            "emitting stimulus"
        );

        let mut report = EmitReport::default();
        let mut stale = Vec::new();
        for (id, weak) in recipients {
            let Some(listener) = weak.upgrade() else {
                stale.push(id);
                continue;
            };

            let Ok(mut listener) = listener.try_borrow_mut() else {
                warn!(
                    subscription = id.get(),
                    "listener busy during re-entrant emission; skipped"
                );
                report.failed += 1;
                continue;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| listener.hear(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    warn!(subscription = id.get(), %error, "stimulus listener failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(subscription = id.get(), "stimulus listener panicked");
                    report.failed += 1;
                }
            }
        }

        if !stale.is_empty() {
            report.pruned = stale.len();
            self.state
                .borrow_mut()
                .subscribers
                .retain(|subscriber| !stale.contains(&subscriber.id));
        }

        report
    }

    /// Number of registered subscriptions, including ones whose listener has
    /// been dropped but not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }
}

/// Guard that keeps a listener subscribed for as long as it lives.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    id: SubscriptionId,
    bus: Weak<StimulusBus>,
}

impl Subscription {
    /// Identifier of the subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let _ = bus.unsubscribe(self.id);
        }
    }
}
