use crate::bodies::RigidBodyProxy;
use crate::core::task_queue::Task;
use crate::math::Vector3;
use std::sync::Weak;

/// Which backend operation a continuous effect maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// A sustained force, optionally applied at a point
    Force,

    /// A sustained torque
    Torque,
}

/// A sustained force or torque, reapplied every simulation tick while
/// active
///
/// While active, one instance of the corresponding task is always either
/// running or enqueued. Deactivating does not cancel an already-enqueued
/// instance; it prevents the next re-enqueue, so the effect stops after
/// at most one further application.
#[derive(Debug, Clone)]
pub struct ContinuousEffect {
    /// The force or torque vector
    vector: Vector3,

    /// World-space application point; center of mass if `None`
    application_point: Option<Vector3>,

    /// Whether the effect keeps rescheduling itself
    active: bool,

    /// Whether a task instance is currently running or enqueued; keeps
    /// the "at most one instance" invariant across disable/re-enable
    task_in_flight: bool,
}

impl ContinuousEffect {
    /// Creates an inactive effect with a zero vector
    pub fn new() -> Self {
        Self {
            vector: Vector3::zero(),
            application_point: None,
            active: false,
            task_in_flight: false,
        }
    }

    /// Returns the effect vector
    pub fn get_vector(&self) -> Vector3 {
        self.vector
    }

    /// Sets the effect vector
    pub fn set_vector(&mut self, vector: Vector3) {
        self.vector = vector;
    }

    /// Returns the application point, if any
    pub fn get_application_point(&self) -> Option<Vector3> {
        self.application_point
    }

    /// Sets the application point
    pub fn set_application_point(&mut self, point: Option<Vector3>) {
        self.application_point = point;
    }

    /// Returns whether the effect is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enables or disables the effect
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn has_task_in_flight(&self) -> bool {
        self.task_in_flight
    }

    pub(crate) fn set_task_in_flight(&mut self, in_flight: bool) {
        self.task_in_flight = in_flight;
    }
}

impl Default for ContinuousEffect {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the self-requeuing task for a proxy's continuous effect
///
/// The task holds only a weak reference: once the proxy is dropped or
/// destroyed, the task expires silently and the reschedule loop starves.
pub(crate) fn effect_task(target: Weak<RigidBodyProxy>, kind: EffectKind) -> Task {
    Box::new(move |ctx| {
        let proxy = match target.upgrade() {
            Some(proxy) => proxy,
            None => {
                log::debug!("continuous {:?} expired: target proxy is gone", kind);
                return Ok(());
            }
        };
        proxy.apply_and_requeue(kind, ctx)
    })
}
