use crate::backend::{BodyHandle, PhysicsBackend};
use crate::bodies::RigidBodyDescriptor;
use crate::error::SyncError;
use crate::math::{Transform, Vector3};
use crate::Result;

use bitflags::bitflags;
use std::any::Any;
use std::collections::HashMap;

bitflags! {
    /// Runtime state flags of a native body
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BodyFlags: u8 {
        /// The body is deactivated and skipped by integration
        const SLEEPING = 1 << 0;

        /// The body may be deactivated when it barely moves
        const CAN_SLEEP = 1 << 1;

        /// The body is a live member of the stepped simulation
        const IN_SIMULATION = 1 << 2;
    }
}

/// A rigid body owned by the native world
#[derive(Debug)]
struct NativeBody {
    /// The body's transform in world space
    transform: Transform,

    /// The body's linear velocity
    linear_velocity: Vector3,

    /// The body's angular velocity
    angular_velocity: Vector3,

    /// Forces accumulated since the last step
    force: Vector3,

    /// Torques accumulated since the last step
    torque: Vector3,

    /// The body's mass (0 means static)
    mass: f32,

    /// Inverse of the body's mass
    inv_mass: f32,

    /// Inverse of the diagonal inertia, local axes
    inv_inertia: Vector3,

    friction: f32,
    linear_damping: f32,
    angular_damping: f32,
    restitution: f32,
    linear_sleep_threshold: f32,
    angular_sleep_threshold: f32,

    /// Scale applied to the collision shape
    local_scale: Vector3,

    /// The declarative shape the body was built from
    shape: crate::bodies::CollisionShape,

    /// Runtime flags
    flags: BodyFlags,

    /// How long the body has been below its sleep thresholds
    sleeping_time: f32,
}

impl NativeBody {
    fn from_descriptor(descriptor: &RigidBodyDescriptor, transform: Transform) -> Self {
        let mut body = Self {
            transform,
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            force: Vector3::zero(),
            torque: Vector3::zero(),
            mass: descriptor.mass,
            inv_mass: 0.0,
            inv_inertia: Vector3::zero(),
            friction: descriptor.friction,
            linear_damping: descriptor.linear_damping,
            angular_damping: descriptor.angular_damping,
            restitution: descriptor.restitution,
            linear_sleep_threshold: descriptor.linear_sleep_threshold,
            angular_sleep_threshold: descriptor.angular_sleep_threshold,
            local_scale: descriptor.local_scale,
            shape: descriptor.shape.clone(),
            flags: BodyFlags::CAN_SLEEP,
            sleeping_time: 0.0,
        };
        body.update_mass_properties();
        body
    }

    fn is_static(&self) -> bool {
        self.mass == 0.0
    }

    fn is_sleeping(&self) -> bool {
        self.flags.contains(BodyFlags::SLEEPING)
    }

    fn wake_up(&mut self) {
        self.flags.remove(BodyFlags::SLEEPING);
        self.sleeping_time = 0.0;
    }

    fn put_to_sleep(&mut self) {
        if !self.is_static() && !self.is_sleeping() {
            self.flags.insert(BodyFlags::SLEEPING);
            self.linear_velocity = Vector3::zero();
            self.angular_velocity = Vector3::zero();
            self.force = Vector3::zero();
            self.torque = Vector3::zero();
        }
    }

    /// Recomputes inverse mass and inertia from mass, shape and scale
    fn update_mass_properties(&mut self) {
        if self.is_static() {
            self.inv_mass = 0.0;
            self.inv_inertia = Vector3::zero();
            return;
        }

        self.inv_mass = 1.0 / self.mass;

        let inertia = self.shape.inertia_diagonal(self.mass, self.local_scale);
        self.inv_inertia = Vector3::new(
            if inertia.x > crate::math::EPSILON { 1.0 / inertia.x } else { 0.0 },
            if inertia.y > crate::math::EPSILON { 1.0 / inertia.y } else { 0.0 },
            if inertia.z > crate::math::EPSILON { 1.0 / inertia.z } else { 0.0 },
        );
    }

    fn apply_force(&mut self, force: Vector3, point: Option<Vector3>) {
        if self.is_static() {
            return;
        }
        self.wake_up();
        self.force += force;
        if let Some(point) = point {
            let r = point - self.transform.translation;
            self.torque += r.cross(&force);
        }
    }

    fn apply_torque(&mut self, torque: Vector3) {
        if self.is_static() {
            return;
        }
        self.wake_up();
        self.torque += torque;
    }

    fn apply_impulse(&mut self, impulse: Vector3, point: Option<Vector3>) {
        if self.is_static() {
            return;
        }
        self.wake_up();
        self.linear_velocity += impulse * self.inv_mass;
        if let Some(point) = point {
            let r = point - self.transform.translation;
            let angular = r.cross(&impulse);
            self.angular_velocity += angular.scale(&self.inv_inertia);
        }
    }

    fn apply_torque_impulse(&mut self, impulse: Vector3) {
        if self.is_static() {
            return;
        }
        self.wake_up();
        self.angular_velocity += impulse.scale(&self.inv_inertia);
    }

    /// Integrates forces and velocities over one fixed step
    fn integrate(&mut self, dt: f32, gravity: Vector3, sleep_time_threshold: f32) {
        if self.is_static() || self.is_sleeping() {
            return;
        }

        // Semi-implicit Euler: velocities first, then positions
        let total_force = self.force + gravity * self.mass;
        self.linear_velocity += total_force * self.inv_mass * dt;
        self.angular_velocity += self.torque.scale(&self.inv_inertia) * dt;

        let linear_factor = 1.0 - self.linear_damping.clamp(0.0, 1.0);
        let angular_factor = 1.0 - self.angular_damping.clamp(0.0, 1.0);
        self.linear_velocity *= linear_factor;
        self.angular_velocity *= angular_factor;

        self.transform.translation += self.linear_velocity * dt;
        self.transform.rotation = self.transform.rotation.integrate(self.angular_velocity, dt);

        self.force = Vector3::zero();
        self.torque = Vector3::zero();

        if self.flags.contains(BodyFlags::CAN_SLEEP) {
            let below_linear =
                self.linear_velocity.length_squared() < self.linear_sleep_threshold.powi(2);
            let below_angular =
                self.angular_velocity.length_squared() < self.angular_sleep_threshold.powi(2);

            if below_linear && below_angular {
                self.sleeping_time += dt;
                if self.sleeping_time >= sleep_time_threshold {
                    self.put_to_sleep();
                }
            } else {
                self.sleeping_time = 0.0;
            }
        }
    }
}

/// The built-in reference backend
///
/// A minimal stepped world: gravity, damping, sleeping and force/impulse
/// response, without collision detection or constraint solving. Serves as
/// the default `PhysicsBackend` for tests, demos and engines that bring
/// their own collision layer.
pub struct NativeWorld {
    /// All bodies, live or not
    bodies: HashMap<BodyHandle, NativeBody>,

    /// The next handle id to hand out
    next_id: u32,

    /// Constant gravity applied to live dynamic bodies
    gravity: Vector3,

    /// The time a body must stay below its sleep thresholds before sleeping
    sleep_time_threshold: f32,

    /// The total elapsed simulation time
    time: f32,
}

impl NativeWorld {
    /// Creates a new world with default gravity (-9.81 in y)
    pub fn new() -> Self {
        Self::with_gravity(Vector3::new(0.0, -9.81, 0.0))
    }

    /// Creates a new world with the given gravity
    pub fn with_gravity(gravity: Vector3) -> Self {
        Self {
            bodies: HashMap::new(),
            next_id: 1, // Start at 1, so 0 can represent invalid handle
            gravity,
            sleep_time_threshold: 0.5,
            time: 0.0,
        }
    }

    /// Returns the current simulation time
    pub fn get_time(&self) -> f32 {
        self.time
    }

    /// Returns the number of bodies in the world
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Puts a body to sleep immediately
    pub fn put_to_sleep(&mut self, handle: BodyHandle) -> Result<()> {
        self.body_mut(handle)?.put_to_sleep();
        Ok(())
    }

    /// Returns a body's friction coefficient
    pub fn get_friction(&self, handle: BodyHandle) -> Result<f32> {
        Ok(self.body(handle)?.friction)
    }

    /// Returns a body's restitution
    pub fn get_restitution(&self, handle: BodyHandle) -> Result<f32> {
        Ok(self.body(handle)?.restitution)
    }

    /// Returns a body's mass
    pub fn get_mass(&self, handle: BodyHandle) -> Result<f32> {
        Ok(self.body(handle)?.mass)
    }

    fn body(&self, handle: BodyHandle) -> Result<&NativeBody> {
        self.bodies
            .get(&handle)
            .ok_or_else(|| SyncError::Backend(format!("body {:?} not found", handle)))
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut NativeBody> {
        self.bodies
            .get_mut(&handle)
            .ok_or_else(|| SyncError::Backend(format!("body {:?} not found", handle)))
    }
}

impl Default for NativeWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsBackend for NativeWorld {
    fn create_body(
        &mut self,
        descriptor: &RigidBodyDescriptor,
        transform: Transform,
    ) -> Result<BodyHandle> {
        descriptor.validate()?;

        let handle = BodyHandle(self.next_id);
        self.next_id += 1;
        self.bodies
            .insert(handle, NativeBody::from_descriptor(descriptor, transform));
        Ok(handle)
    }

    fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        self.bodies
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| SyncError::Backend(format!("body {:?} not found", handle)))
    }

    fn add_to_simulation(&mut self, handle: BodyHandle) -> Result<()> {
        self.body_mut(handle)?.flags.insert(BodyFlags::IN_SIMULATION);
        Ok(())
    }

    fn remove_from_simulation(&mut self, handle: BodyHandle) -> Result<()> {
        self.body_mut(handle)?.flags.remove(BodyFlags::IN_SIMULATION);
        Ok(())
    }

    fn is_in_simulation(&self, handle: BodyHandle) -> bool {
        self.bodies
            .get(&handle)
            .map(|body| body.flags.contains(BodyFlags::IN_SIMULATION))
            .unwrap_or(false)
    }

    fn step(&mut self, dt: f32) -> Result<()> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SyncError::Backend(format!("invalid time step {}", dt)));
        }

        let gravity = self.gravity;
        let sleep_time_threshold = self.sleep_time_threshold;
        for body in self.bodies.values_mut() {
            if body.flags.contains(BodyFlags::IN_SIMULATION) {
                body.integrate(dt, gravity, sleep_time_threshold);
            }
        }
        self.time += dt;
        Ok(())
    }

    fn get_world_transform(&self, handle: BodyHandle) -> Result<Transform> {
        Ok(self.body(handle)?.transform)
    }

    fn set_world_transform(&mut self, handle: BodyHandle, transform: Transform) -> Result<()> {
        self.body_mut(handle)?.transform = transform;
        Ok(())
    }

    fn apply_force(
        &mut self,
        handle: BodyHandle,
        force: Vector3,
        point: Option<Vector3>,
    ) -> Result<()> {
        self.body_mut(handle)?.apply_force(force, point);
        Ok(())
    }

    fn apply_torque(&mut self, handle: BodyHandle, torque: Vector3) -> Result<()> {
        self.body_mut(handle)?.apply_torque(torque);
        Ok(())
    }

    fn apply_impulse(
        &mut self,
        handle: BodyHandle,
        impulse: Vector3,
        point: Option<Vector3>,
    ) -> Result<()> {
        self.body_mut(handle)?.apply_impulse(impulse, point);
        Ok(())
    }

    fn apply_torque_impulse(&mut self, handle: BodyHandle, impulse: Vector3) -> Result<()> {
        self.body_mut(handle)?.apply_torque_impulse(impulse);
        Ok(())
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vector3) -> Result<()> {
        let body = self.body_mut(handle)?;
        if !body.is_static() {
            body.linear_velocity = velocity;
            body.wake_up();
        }
        Ok(())
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vector3) -> Result<()> {
        let body = self.body_mut(handle)?;
        if !body.is_static() {
            body.angular_velocity = velocity;
            body.wake_up();
        }
        Ok(())
    }

    fn get_linear_velocity(&self, handle: BodyHandle) -> Result<Vector3> {
        Ok(self.body(handle)?.linear_velocity)
    }

    fn get_angular_velocity(&self, handle: BodyHandle) -> Result<Vector3> {
        Ok(self.body(handle)?.angular_velocity)
    }

    fn set_friction(&mut self, handle: BodyHandle, friction: f32) -> Result<()> {
        self.body_mut(handle)?.friction = friction;
        Ok(())
    }

    fn set_damping(&mut self, handle: BodyHandle, linear: f32, angular: f32) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.linear_damping = linear;
        body.angular_damping = angular;
        Ok(())
    }

    fn set_restitution(&mut self, handle: BodyHandle, restitution: f32) -> Result<()> {
        self.body_mut(handle)?.restitution = restitution;
        Ok(())
    }

    fn set_sleep_thresholds(
        &mut self,
        handle: BodyHandle,
        linear: f32,
        angular: f32,
    ) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.linear_sleep_threshold = linear;
        body.angular_sleep_threshold = angular;
        Ok(())
    }

    fn set_local_scale(&mut self, handle: BodyHandle, scale: Vector3) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.local_scale = scale;
        body.update_mass_properties();
        Ok(())
    }

    fn activate(&mut self, handle: BodyHandle) -> Result<()> {
        self.body_mut(handle)?.wake_up();
        Ok(())
    }

    fn is_active(&self, handle: BodyHandle) -> bool {
        self.bodies
            .get(&handle)
            .map(|body| {
                body.flags.contains(BodyFlags::IN_SIMULATION)
                    && !body.is_static()
                    && !body.is_sleeping()
            })
            .unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::{CollisionShape, RigidBodyDescriptor};
    use approx::assert_relative_eq;

    fn dynamic_descriptor() -> RigidBodyDescriptor {
        RigidBodyDescriptor {
            mass: 2.0,
            ..RigidBodyDescriptor::default()
        }
    }

    fn spawn(world: &mut NativeWorld, descriptor: &RigidBodyDescriptor) -> BodyHandle {
        let handle = world
            .create_body(descriptor, Transform::identity())
            .unwrap();
        world.add_to_simulation(handle).unwrap();
        handle
    }

    #[test]
    fn gravity_accelerates_dynamic_bodies() {
        let mut world = NativeWorld::new();
        let handle = spawn(&mut world, &dynamic_descriptor());

        for _ in 0..60 {
            world.step(1.0 / 60.0).unwrap();
        }

        let transform = world.get_world_transform(handle).unwrap();
        assert!(transform.translation.y < -4.0);
        assert!(world.get_linear_velocity(handle).unwrap().y < -9.0);
    }

    #[test]
    fn static_bodies_ignore_forces() {
        let mut world = NativeWorld::new();
        let descriptor = RigidBodyDescriptor {
            mass: 0.0,
            ..RigidBodyDescriptor::default()
        };
        let handle = spawn(&mut world, &descriptor);

        world
            .apply_force(handle, Vector3::new(0.0, 100.0, 0.0), None)
            .unwrap();
        for _ in 0..10 {
            world.step(1.0 / 60.0).unwrap();
        }

        let transform = world.get_world_transform(handle).unwrap();
        assert_relative_eq!(transform.translation.y, 0.0);
        assert!(!world.is_active(handle));
    }

    #[test]
    fn impulse_changes_velocity_immediately() {
        let mut world = NativeWorld::with_gravity(Vector3::zero());
        let handle = spawn(&mut world, &dynamic_descriptor());

        world
            .apply_impulse(handle, Vector3::new(4.0, 0.0, 0.0), None)
            .unwrap();

        let velocity = world.get_linear_velocity(handle).unwrap();
        assert_relative_eq!(velocity.x, 2.0); // impulse / mass
    }

    #[test]
    fn idle_bodies_fall_asleep_and_activate_wakes_them() {
        let mut world = NativeWorld::with_gravity(Vector3::zero());
        let handle = spawn(&mut world, &dynamic_descriptor());

        // Below the default sleep thresholds from the start
        for _ in 0..60 {
            world.step(1.0 / 60.0).unwrap();
        }
        assert!(!world.is_active(handle));

        world.activate(handle).unwrap();
        assert!(world.is_active(handle));
    }

    #[test]
    fn membership_toggles_do_not_destroy_the_body() {
        let mut world = NativeWorld::new();
        let handle = spawn(&mut world, &dynamic_descriptor());
        assert!(world.is_in_simulation(handle));

        world.remove_from_simulation(handle).unwrap();
        assert!(!world.is_in_simulation(handle));
        assert!(world.get_world_transform(handle).is_ok());

        world.add_to_simulation(handle).unwrap();
        assert!(world.is_in_simulation(handle));
    }

    #[test]
    fn property_setters_update_stored_values() {
        let mut world = NativeWorld::new();
        let handle = spawn(&mut world, &dynamic_descriptor());

        world.set_friction(handle, 0.25).unwrap();
        world.set_restitution(handle, 0.75).unwrap();
        world.set_damping(handle, 0.1, 0.2).unwrap();
        world.set_sleep_thresholds(handle, 0.3, 0.4).unwrap();

        let body = world.body(handle).unwrap();
        assert_relative_eq!(body.friction, 0.25);
        assert_relative_eq!(body.restitution, 0.75);
        assert_relative_eq!(body.linear_damping, 0.1);
        assert_relative_eq!(body.angular_damping, 0.2);
        assert_relative_eq!(body.linear_sleep_threshold, 0.3);
        assert_relative_eq!(body.angular_sleep_threshold, 0.4);
    }

    #[test]
    fn rejects_invalid_descriptors() {
        let mut world = NativeWorld::new();
        let descriptor = RigidBodyDescriptor {
            mass: -1.0,
            ..RigidBodyDescriptor::default()
        };
        assert!(world
            .create_body(&descriptor, Transform::identity())
            .is_err());

        let descriptor = RigidBodyDescriptor {
            shape: CollisionShape::Sphere { radius: 0.0 },
            ..RigidBodyDescriptor::default()
        };
        assert!(world
            .create_body(&descriptor, Transform::identity())
            .is_err());
    }
}
