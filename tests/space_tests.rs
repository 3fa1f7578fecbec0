use phys_bridge::backend::{BodyHandle, PhysicsBackend};
use phys_bridge::core::BodyEventType;
use phys_bridge::error::SyncError;
use phys_bridge::math::{Transform, Vector3};
use phys_bridge::{
    BodyLifecycle, RigidBodyDescriptor, SimulationSpace, SpaceConfig, SpaceRunner,
};

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const DT: f32 = 1.0 / 60.0;

/// A body as the recording backend sees it
#[derive(Debug, Clone)]
struct RecordedBody {
    descriptor: RigidBodyDescriptor,
    transform: Transform,
    linear_velocity: Vector3,
    angular_velocity: Vector3,
    in_simulation: bool,
    awake: bool,
}

#[derive(Debug, Default)]
struct RecorderState {
    bodies: HashMap<u32, RecordedBody>,
    next_id: u32,
    spawn_asleep: bool,
    fail_next_step: bool,

    created: usize,
    destroyed: usize,
    added: usize,
    removed: usize,
    steps: usize,
    force_applications: usize,
    torque_applications: usize,
    impulse_applications: usize,
    activations: usize,
    property_pushes: usize,
    scene_transform_pushes: usize,
}

/// Shared probe handle kept by the test after the backend is boxed
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<RecorderState>>);

impl Recorder {
    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.0.lock().unwrap()
    }

    fn single_body(&self) -> RecordedBody {
        let state = self.lock();
        assert_eq!(state.bodies.len(), 1, "expected exactly one body");
        state.bodies.values().next().unwrap().clone()
    }

    fn set_fail_next_step(&self) {
        self.lock().fail_next_step = true;
    }
}

/// A `PhysicsBackend` that records every call, used as the membership and
/// application probe
struct RecordingBackend {
    recorder: Recorder,
}

impl RecordingBackend {
    fn new(spawn_asleep: bool) -> (Box<dyn PhysicsBackend>, Recorder) {
        let recorder = Recorder::default();
        recorder.lock().spawn_asleep = spawn_asleep;
        (
            Box::new(Self {
                recorder: recorder.clone(),
            }),
            recorder,
        )
    }
}

impl RecordingBackend {
    fn body_mut<'a>(
        state: &'a mut RecorderState,
        handle: BodyHandle,
    ) -> phys_bridge::Result<&'a mut RecordedBody> {
        state
            .bodies
            .get_mut(&handle.into_raw())
            .ok_or_else(|| SyncError::Backend(format!("no body {:?}", handle)))
    }
}

impl PhysicsBackend for RecordingBackend {
    fn create_body(
        &mut self,
        descriptor: &RigidBodyDescriptor,
        transform: Transform,
    ) -> phys_bridge::Result<BodyHandle> {
        descriptor.validate()?;
        let mut state = self.recorder.lock();
        state.next_id += 1;
        let id = state.next_id;
        let awake = descriptor.mass > 0.0 && !state.spawn_asleep;
        state.bodies.insert(
            id,
            RecordedBody {
                descriptor: descriptor.clone(),
                transform,
                linear_velocity: Vector3::zero(),
                angular_velocity: Vector3::zero(),
                in_simulation: false,
                awake,
            },
        );
        state.created += 1;
        Ok(BodyHandle::from_raw(id))
    }

    fn destroy_body(&mut self, handle: BodyHandle) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        state
            .bodies
            .remove(&handle.into_raw())
            .ok_or_else(|| SyncError::Backend(format!("no body {:?}", handle)))?;
        state.destroyed += 1;
        Ok(())
    }

    fn add_to_simulation(&mut self, handle: BodyHandle) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.in_simulation = true;
        state.added += 1;
        Ok(())
    }

    fn remove_from_simulation(&mut self, handle: BodyHandle) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.in_simulation = false;
        state.removed += 1;
        Ok(())
    }

    fn is_in_simulation(&self, handle: BodyHandle) -> bool {
        self.recorder
            .lock()
            .bodies
            .get(&handle.into_raw())
            .map(|body| body.in_simulation)
            .unwrap_or(false)
    }

    fn step(&mut self, _dt: f32) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        if state.fail_next_step {
            state.fail_next_step = false;
            return Err(SyncError::Backend("deliberate step failure".into()));
        }
        for body in state.bodies.values_mut() {
            if body.in_simulation && body.awake && body.descriptor.mass > 0.0 {
                body.transform.translation += Vector3::unit_x();
            }
        }
        state.steps += 1;
        Ok(())
    }

    fn get_world_transform(&self, handle: BodyHandle) -> phys_bridge::Result<Transform> {
        self.recorder
            .lock()
            .bodies
            .get(&handle.into_raw())
            .map(|body| body.transform)
            .ok_or_else(|| SyncError::Backend(format!("no body {:?}", handle)))
    }

    fn set_world_transform(
        &mut self,
        handle: BodyHandle,
        transform: Transform,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.transform = transform;
        state.scene_transform_pushes += 1;
        Ok(())
    }

    fn apply_force(
        &mut self,
        handle: BodyHandle,
        _force: Vector3,
        _point: Option<Vector3>,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?;
        state.force_applications += 1;
        Ok(())
    }

    fn apply_torque(&mut self, handle: BodyHandle, _torque: Vector3) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?;
        state.torque_applications += 1;
        Ok(())
    }

    fn apply_impulse(
        &mut self,
        handle: BodyHandle,
        _impulse: Vector3,
        _point: Option<Vector3>,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?;
        state.impulse_applications += 1;
        Ok(())
    }

    fn apply_torque_impulse(
        &mut self,
        handle: BodyHandle,
        _impulse: Vector3,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?;
        state.impulse_applications += 1;
        Ok(())
    }

    fn set_linear_velocity(
        &mut self,
        handle: BodyHandle,
        velocity: Vector3,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.linear_velocity = velocity;
        Ok(())
    }

    fn set_angular_velocity(
        &mut self,
        handle: BodyHandle,
        velocity: Vector3,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.angular_velocity = velocity;
        Ok(())
    }

    fn get_linear_velocity(&self, handle: BodyHandle) -> phys_bridge::Result<Vector3> {
        self.recorder
            .lock()
            .bodies
            .get(&handle.into_raw())
            .map(|body| body.linear_velocity)
            .ok_or_else(|| SyncError::Backend(format!("no body {:?}", handle)))
    }

    fn get_angular_velocity(&self, handle: BodyHandle) -> phys_bridge::Result<Vector3> {
        self.recorder
            .lock()
            .bodies
            .get(&handle.into_raw())
            .map(|body| body.angular_velocity)
            .ok_or_else(|| SyncError::Backend(format!("no body {:?}", handle)))
    }

    fn set_friction(&mut self, handle: BodyHandle, friction: f32) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.descriptor.friction = friction;
        state.property_pushes += 1;
        Ok(())
    }

    fn set_damping(
        &mut self,
        handle: BodyHandle,
        linear: f32,
        angular: f32,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        let body = Self::body_mut(&mut state, handle)?;
        body.descriptor.linear_damping = linear;
        body.descriptor.angular_damping = angular;
        Ok(())
    }

    fn set_restitution(&mut self, handle: BodyHandle, restitution: f32) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.descriptor.restitution = restitution;
        Ok(())
    }

    fn set_sleep_thresholds(
        &mut self,
        handle: BodyHandle,
        linear: f32,
        angular: f32,
    ) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        let body = Self::body_mut(&mut state, handle)?;
        body.descriptor.linear_sleep_threshold = linear;
        body.descriptor.angular_sleep_threshold = angular;
        Ok(())
    }

    fn set_local_scale(&mut self, handle: BodyHandle, scale: Vector3) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.descriptor.local_scale = scale;
        Ok(())
    }

    fn activate(&mut self, handle: BodyHandle) -> phys_bridge::Result<()> {
        let mut state = self.recorder.lock();
        Self::body_mut(&mut state, handle)?.awake = true;
        state.activations += 1;
        Ok(())
    }

    fn is_active(&self, handle: BodyHandle) -> bool {
        self.recorder
            .lock()
            .bodies
            .get(&handle.into_raw())
            .map(|body| body.in_simulation && body.awake && body.descriptor.mass > 0.0)
            .unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn make_space() -> (Arc<SimulationSpace>, Recorder) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (backend, recorder) = RecordingBackend::new(false);
    (
        SimulationSpace::with_backend(backend, SpaceConfig::default()),
        recorder,
    )
}

fn make_space_with_asleep_bodies() -> (Arc<SimulationSpace>, Recorder) {
    let (backend, recorder) = RecordingBackend::new(true);
    (
        SimulationSpace::with_backend(backend, SpaceConfig::default()),
        recorder,
    )
}

#[test]
fn attach_builds_and_joins_on_the_next_tick() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();

    // Nothing happens until the simulation tick drains the queue
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Unbuilt);
    assert_eq!(recorder.lock().created, 0);

    space.step(DT);

    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Built);
    assert!(space.is_in_simulation(&proxy));
    assert_eq!(recorder.lock().created, 1);
    assert_eq!(recorder.lock().added, 1);

    let events = space.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, BodyEventType::Attached);
    assert_eq!(events[0].tick, 1);
}

#[test]
fn mass_change_rebuilds_as_static_and_preserves_membership() {
    let (space, recorder) = make_space();
    let descriptor = RigidBodyDescriptor {
        mass: 1.0,
        friction: 0.5,
        shape: phys_bridge::CollisionShape::new_box(0.5, 0.5, 0.5),
        ..RigidBodyDescriptor::default()
    };
    let proxy = space.attach(descriptor).unwrap();
    space.step(DT);
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Built);
    space.drain_events();

    proxy.set_mass(0.0).unwrap();
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::PendingRebuild);

    space.step(DT);

    // Removed, destroyed, rebuilt static, re-added
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Built);
    {
        let state = recorder.lock();
        assert_eq!(state.removed, 1);
        assert_eq!(state.destroyed, 1);
        assert_eq!(state.created, 2);
        assert_eq!(state.added, 2);
    }
    assert!(space.is_in_simulation(&proxy));
    let body = recorder.single_body();
    assert_eq!(body.descriptor.mass, 0.0);

    let events = space.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, BodyEventType::Rebuilt);

    // Forces on the static body pass through to the backend and move
    // nothing; not a proxy-level error
    let x_before = recorder.single_body().transform.translation.x;
    proxy.apply_force(Vector3::new(0.0, 50.0, 0.0), None);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 1);
    assert_eq!(recorder.single_body().transform.translation.x, x_before);
}

#[test]
fn rebuild_of_a_non_live_body_does_not_rejoin() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);

    space.remove(&proxy);
    space.step(DT);
    assert!(!space.is_in_simulation(&proxy));
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Built);

    proxy.set_mass(5.0).unwrap();
    space.step(DT);

    // Rebuilt, but membership state is preserved: still not live
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Built);
    assert_eq!(recorder.lock().created, 2);
    assert!(!space.is_in_simulation(&proxy));
    assert_eq!(recorder.lock().added, 1);

    space.add(&proxy);
    space.step(DT);
    assert!(space.is_in_simulation(&proxy));
}

#[test]
fn continuous_force_wakes_reapplies_and_eventually_deactivates() {
    let (space, recorder) = make_space_with_asleep_bodies();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);
    assert!(!recorder.single_body().awake);

    // Tick 0: enable; the task runs on the next tick
    proxy.apply_continuous_force(true, Some(Vector3::new(0.0, 10.0, 0.0)));
    assert_eq!(recorder.lock().force_applications, 0);

    // Tick 1: applied once and the sleeping body is woken
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 1);
    assert!(recorder.single_body().awake);

    // Ticks 2, 3: reapplied every tick
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 2);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 3);

    // Disable: the already-enqueued instance fires exactly once more
    proxy.apply_continuous_force(false, None);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 4);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 4);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 4);
}

#[test]
fn disable_then_reenable_keeps_a_single_task_chain() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);

    proxy.apply_continuous_force(true, Some(Vector3::unit_y()));
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 1);

    // Toggling within one tick window must not spawn a second chain
    proxy.apply_continuous_force(false, None);
    proxy.apply_continuous_force(true, None);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 2);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 3);
}

#[test]
fn continuous_torque_follows_the_same_requeue_cycle() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);

    proxy.apply_continuous_torque(true, Some(Vector3::unit_z()));
    space.step(DT);
    space.step(DT);
    assert_eq!(recorder.lock().torque_applications, 2);

    proxy.apply_continuous_torque(false, None);
    space.step(DT);
    space.step(DT);
    assert_eq!(recorder.lock().torque_applications, 3);
}

#[test]
fn property_push_is_idempotent_across_unchanged_drains() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);

    proxy.set_friction(0.25).unwrap();
    space.step(DT);
    assert_eq!(recorder.lock().property_pushes, 1);
    assert_eq!(recorder.single_body().descriptor.friction, 0.25);

    // No descriptor change, no further backend traffic
    space.step(DT);
    space.step(DT);
    assert_eq!(recorder.lock().property_pushes, 1);

    // A fresh change pushes once more, without any rebuild
    proxy.set_restitution(0.5).unwrap();
    space.step(DT);
    assert_eq!(recorder.lock().property_pushes, 2);
    assert_eq!(recorder.lock().created, 1);
    assert_eq!(recorder.single_body().descriptor.restitution, 0.5);
}

#[test]
fn scene_authored_transform_is_pushed_once_and_wakes_the_body() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);
    let activations_before = recorder.lock().activations;

    proxy
        .get_shared_transform()
        .write(
            Transform::from_translation(Vector3::new(5.0, 0.0, 0.0)),
            phys_bridge::TransformOrigin::Scene,
        );

    space.step(DT);
    {
        let state = recorder.lock();
        assert_eq!(state.scene_transform_pushes, 1);
        assert!(state.activations > activations_before);
    }
    // The step after the push advanced the body from the new position
    assert!(recorder.single_body().transform.translation.x >= 5.0);

    // The consumed value is not pushed again
    space.step(DT);
    assert_eq!(recorder.lock().scene_transform_pushes, 1);
}

#[test]
fn detach_destroys_and_expires_stale_operations() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);
    space.drain_events();

    space.detach(&proxy);
    // Enqueued after the detach: must expire silently
    proxy.apply_force(Vector3::unit_y(), None);
    space.step(DT);

    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Destroyed);
    assert_eq!(space.proxy_count(), 0);
    {
        let state = recorder.lock();
        assert_eq!(state.destroyed, 1);
        assert_eq!(state.force_applications, 0);
        assert!(state.bodies.is_empty());
    }

    let events = space.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, BodyEventType::Detached);

    // Late property sets are ignored, not errors
    assert!(proxy.set_mass(3.0).is_ok());
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Destroyed);
}

#[test]
fn continuous_effect_starves_after_detach() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);

    proxy.apply_continuous_force(true, Some(Vector3::unit_y()));
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, 1);

    space.detach(&proxy);
    // This tick still drains the requeued effect before the detach task
    space.step(DT);
    let after_detach_tick = recorder.lock().force_applications;
    assert!(after_detach_tick <= 2);

    // The chain is starved: no further applications, ever
    space.step(DT);
    space.step(DT);
    assert_eq!(recorder.lock().force_applications, after_detach_tick);
}

#[test]
fn failed_backend_step_publishes_no_transforms() {
    let (space, recorder) = make_space();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();
    space.step(DT);
    space.step(DT);

    let published_before = proxy.get_world_transform();
    let time_before = space.get_time();

    recorder.set_fail_next_step();
    space.step(DT);

    // No-op tick: nothing published, time not advanced
    assert_eq!(proxy.get_world_transform(), published_before);
    assert_eq!(space.get_time(), time_before);

    // The next tick recovers
    space.step(DT);
    assert!(proxy.get_world_transform().translation.x > published_before.translation.x);
}

#[test]
fn a_failing_task_does_not_abort_the_tick() {
    let (space, recorder) = make_space();
    space.enqueue(Box::new(|_ctx| {
        Err(SyncError::Backend("deliberate task failure".into()))
    }));
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();

    space.step(DT);

    // The failing task ran first and the attach still completed
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Built);
    assert_eq!(recorder.lock().steps, 1);
}

#[test]
fn update_accumulates_fixed_steps_and_drops_backlog() {
    let (space, recorder) = make_space();

    space.update(3.5 * DT);
    assert_eq!(recorder.lock().steps, 3);

    // Far more backlog than max_substeps allows is dropped
    space.update(100.0 * DT);
    assert_eq!(recorder.lock().steps, 3 + 4);

    // The dropped backlog does not leak into later updates
    space.update(0.5 * DT);
    assert_eq!(recorder.lock().steps, 7);
    space.update(0.5 * DT);
    assert_eq!(recorder.lock().steps, 8);
}

#[test]
fn runner_drives_the_space_from_its_own_thread() {
    let space = SimulationSpace::new();
    let proxy = space.attach(RigidBodyDescriptor::default()).unwrap();

    let runner = SpaceRunner::start(Arc::clone(&space)).unwrap();
    assert!(runner.is_running());
    std::thread::sleep(Duration::from_millis(100));
    runner.stop();

    assert!(space.get_tick() > 0);
    assert_eq!(proxy.get_lifecycle(), BodyLifecycle::Built);
}
