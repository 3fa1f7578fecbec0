use crate::core::ProxyId;
use std::collections::VecDeque;

/// Types of body lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEventType {
    /// A proxy's native body was built and joined the simulation
    Attached,

    /// A proxy was detached and its native body destroyed
    Detached,

    /// The native body was reconstructed after a mass or shape change
    Rebuilt,
}

/// An event related to a single proxy, stamped with the tick it happened on
///
/// The tick stamp lets callers without a blocking "wait for rebuild" API
/// correlate completions with `SimulationSpace::get_tick`.
#[derive(Debug, Clone)]
pub struct BodyEvent {
    /// The type of body event
    pub event_type: BodyEventType,

    /// The proxy the event refers to
    pub proxy: ProxyId,

    /// The simulation tick the event was emitted on
    pub tick: u64,
}

/// A queue of body lifecycle events
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<BodyEvent>,
}

impl EventQueue {
    /// Creates a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event
    pub fn push(&mut self, event: BodyEvent) {
        self.events.push_back(event);
    }

    /// Removes and returns all queued events, oldest first
    pub fn drain(&mut self) -> Vec<BodyEvent> {
        self.events.drain(..).collect()
    }

    /// Returns the number of queued events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clears all queued events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
