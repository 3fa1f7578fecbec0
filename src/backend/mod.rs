pub mod native;

pub use self::native::NativeWorld;

use crate::bodies::RigidBodyDescriptor;
use crate::math::{Transform, Vector3};
use crate::Result;
use std::any::Any;

/// A unique identifier for a native body owned by a simulation backend
///
/// The handle itself carries no capability: every operation on it goes
/// through a `PhysicsBackend`, which is only reachable from the simulation
/// thread's task-execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) u32);

impl BodyHandle {
    /// Creates a handle from a raw backend id; for `PhysicsBackend`
    /// implementations outside this crate
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw backend id
    pub fn into_raw(self) -> u32 {
        self.0
    }
}

/// The wrapped simulation backend
///
/// Collision detection, constraint solving and integration accuracy are the
/// backend's business; this crate only requires the operation set below.
/// All calls are same-thread and may block.
pub trait PhysicsBackend: Send {
    /// Constructs a native body from a descriptor at the given transform
    ///
    /// The body starts outside the simulation; use `add_to_simulation` to
    /// make it a live member.
    fn create_body(
        &mut self,
        descriptor: &RigidBodyDescriptor,
        transform: Transform,
    ) -> Result<BodyHandle>;

    /// Destroys a native body, releasing its resources
    fn destroy_body(&mut self, handle: BodyHandle) -> Result<()>;

    /// Adds a body to the stepped simulation
    fn add_to_simulation(&mut self, handle: BodyHandle) -> Result<()>;

    /// Removes a body from the stepped simulation without destroying it
    fn remove_from_simulation(&mut self, handle: BodyHandle) -> Result<()>;

    /// Returns whether the body is currently a live member of the simulation
    fn is_in_simulation(&self, handle: BodyHandle) -> bool;

    /// Advances the simulation by the given time step
    fn step(&mut self, dt: f32) -> Result<()>;

    /// Returns the body's world transform
    fn get_world_transform(&self, handle: BodyHandle) -> Result<Transform>;

    /// Sets the body's world transform
    fn set_world_transform(&mut self, handle: BodyHandle, transform: Transform) -> Result<()>;

    /// Applies a force, optionally at a world-space point (center of mass if `None`)
    fn apply_force(
        &mut self,
        handle: BodyHandle,
        force: Vector3,
        point: Option<Vector3>,
    ) -> Result<()>;

    /// Applies a torque
    fn apply_torque(&mut self, handle: BodyHandle, torque: Vector3) -> Result<()>;

    /// Applies an impulse, optionally at a world-space point
    fn apply_impulse(
        &mut self,
        handle: BodyHandle,
        impulse: Vector3,
        point: Option<Vector3>,
    ) -> Result<()>;

    /// Applies a torque impulse
    fn apply_torque_impulse(&mut self, handle: BodyHandle, impulse: Vector3) -> Result<()>;

    /// Sets the body's linear velocity
    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vector3) -> Result<()>;

    /// Sets the body's angular velocity
    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vector3) -> Result<()>;

    /// Returns the body's linear velocity
    fn get_linear_velocity(&self, handle: BodyHandle) -> Result<Vector3>;

    /// Returns the body's angular velocity
    fn get_angular_velocity(&self, handle: BodyHandle) -> Result<Vector3>;

    /// Sets the body's friction coefficient
    fn set_friction(&mut self, handle: BodyHandle, friction: f32) -> Result<()>;

    /// Sets the body's linear and angular damping
    fn set_damping(&mut self, handle: BodyHandle, linear: f32, angular: f32) -> Result<()>;

    /// Sets the body's restitution
    fn set_restitution(&mut self, handle: BodyHandle, restitution: f32) -> Result<()>;

    /// Sets the velocity thresholds below which the body may fall asleep
    fn set_sleep_thresholds(&mut self, handle: BodyHandle, linear: f32, angular: f32)
        -> Result<()>;

    /// Sets the local scale applied to the body's collision shape
    fn set_local_scale(&mut self, handle: BodyHandle, scale: Vector3) -> Result<()>;

    /// Wakes the body if it was deactivated
    fn activate(&mut self, handle: BodyHandle) -> Result<()>;

    /// Returns whether the body is awake and simulated (false for sleeping
    /// or static bodies, or bodies outside the simulation)
    fn is_active(&self, handle: BodyHandle) -> bool;

    /// Returns a dynamic reference to any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Returns a dynamic mutable reference to any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
