use crate::backend::{NativeWorld, PhysicsBackend};
use crate::bodies::{RigidBodyDescriptor, RigidBodyProxy};
use crate::core::events::{BodyEvent, BodyEventType, EventQueue};
use crate::core::task_queue::{Task, TaskQueue};
use crate::core::{ProxyId, SpaceConfig};
use crate::math::Transform;
use crate::Result;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The simulation-thread execution context handed to drained tasks
///
/// Constructed only inside `SimulationSpace::step`, so holding one proves
/// the code runs on the simulation thread. All native-world access flows
/// through it; a `BodyHandle` is inert without one.
pub struct SpaceContext<'a> {
    world: &'a mut (dyn PhysicsBackend + 'a),
    queue: &'a TaskQueue,
    proxies: &'a mut Vec<Arc<RigidBodyProxy>>,
    events: &'a mut EventQueue,
    tick: u64,
}

impl<'a> SpaceContext<'a> {
    /// Returns the native world
    pub fn world(&self) -> &dyn PhysicsBackend {
        &*self.world
    }

    /// Returns the native world mutably
    pub fn world_mut(&mut self) -> &mut dyn PhysicsBackend {
        &mut *self.world
    }

    /// Requeues a task for the next tick
    pub fn requeue(&self, task: Task) {
        self.queue.requeue(task);
    }

    /// Returns the tick currently being executed
    pub fn get_tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn insert_proxy(&mut self, proxy: Arc<RigidBodyProxy>) {
        self.proxies.push(proxy);
    }

    pub(crate) fn remove_proxy(&mut self, id: ProxyId) {
        self.proxies.retain(|proxy| proxy.get_id() != id);
    }

    pub(crate) fn notify(&mut self, event_type: BodyEventType, proxy: ProxyId) {
        self.events.push(BodyEvent {
            event_type,
            proxy,
            tick: self.tick,
        });
    }

    pub(crate) fn notify_rebuilt(&mut self, proxy: ProxyId) {
        self.notify(BodyEventType::Rebuilt, proxy);
    }
}

struct SpaceInner {
    /// The wrapped native world
    world: Box<dyn PhysicsBackend>,

    /// Every attached proxy, live or not
    proxies: Vec<Arc<RigidBodyProxy>>,

    /// Lifecycle events awaiting collection
    events: EventQueue,

    /// Unsimulated time carried between `update` calls
    accumulator: f32,

    /// The total elapsed simulation time
    time: f32,
}

/// Owner of the native simulation world and the fixed-tick step loop
///
/// Shared as `Arc<SimulationSpace>`. Mutating operations invoked from
/// other threads go through the task queue and never block; `step` and
/// `update` belong to the simulation thread (see `SpaceRunner`).
pub struct SimulationSpace {
    /// Deferred operations drained once per tick
    queue: TaskQueue,

    /// Stepping parameters
    config: SpaceConfig,

    /// World, roster and events, locked once per tick
    inner: Mutex<SpaceInner>,

    /// The number of completed and in-progress ticks
    tick: AtomicU64,

    /// Source of proxy identities
    next_proxy_id: AtomicU64,
}

impl SimulationSpace {
    /// Creates a space around the built-in backend with default settings
    pub fn new() -> Arc<Self> {
        Self::with_backend(Box::new(NativeWorld::new()), SpaceConfig::default())
    }

    /// Creates a space around the given backend
    pub fn with_backend(world: Box<dyn PhysicsBackend>, config: SpaceConfig) -> Arc<Self> {
        Arc::new(Self {
            queue: TaskQueue::new(),
            config,
            inner: Mutex::new(SpaceInner {
                world,
                proxies: Vec::new(),
                events: EventQueue::new(),
                accumulator: 0.0,
                time: 0.0,
            }),
            tick: AtomicU64::new(0),
            next_proxy_id: AtomicU64::new(0),
        })
    }

    /// Returns the stepping configuration
    pub fn get_config(&self) -> &SpaceConfig {
        &self.config
    }

    /// Returns the number of started ticks
    pub fn get_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Returns the total elapsed simulation time
    pub fn get_time(&self) -> f32 {
        self.inner.lock().unwrap().time
    }

    /// Returns the number of attached proxies
    pub fn proxy_count(&self) -> usize {
        self.inner.lock().unwrap().proxies.len()
    }

    /// Returns the number of queued tasks
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Creates a proxy for the descriptor and schedules construction of
    /// its native body at the identity transform
    pub fn attach(self: &Arc<Self>, descriptor: RigidBodyDescriptor) -> Result<Arc<RigidBodyProxy>> {
        self.attach_at(descriptor, Transform::identity())
    }

    /// Creates a proxy for the descriptor and schedules construction of
    /// its native body at the given transform
    ///
    /// The body is built and added on the next tick; until then the
    /// lifecycle reads `Unbuilt`.
    pub fn attach_at(
        self: &Arc<Self>,
        descriptor: RigidBodyDescriptor,
        transform: Transform,
    ) -> Result<Arc<RigidBodyProxy>> {
        descriptor.validate()?;
        let id = ProxyId(self.next_proxy_id.fetch_add(1, Ordering::Relaxed) + 1);
        let proxy = RigidBodyProxy::new(id, descriptor, transform, Arc::downgrade(self));

        let task_proxy = Arc::clone(&proxy);
        self.queue.enqueue(Box::new(move |ctx| {
            // Join the roster first so a failed build is retried by the
            // per-tick sync instead of being lost
            ctx.insert_proxy(Arc::clone(&task_proxy));
            task_proxy.build(ctx)?;
            ctx.notify(BodyEventType::Attached, task_proxy.get_id());
            Ok(())
        }));
        Ok(proxy)
    }

    /// Schedules destruction of the proxy's native body; the lifecycle
    /// becomes `Destroyed` when the task runs
    pub fn detach(&self, proxy: &Arc<RigidBodyProxy>) {
        let target = Arc::clone(proxy);
        self.queue.enqueue(Box::new(move |ctx| {
            let result = target.teardown(ctx);
            ctx.remove_proxy(target.get_id());
            ctx.notify(BodyEventType::Detached, target.get_id());
            result
        }));
    }

    /// Schedules re-adding a built body to the stepped simulation
    pub fn add(&self, proxy: &Arc<RigidBodyProxy>) {
        let target = Arc::clone(proxy);
        self.queue
            .enqueue(Box::new(move |ctx| target.set_membership(ctx, true)));
    }

    /// Schedules removing a built body from the stepped simulation
    /// without destroying it
    pub fn remove(&self, proxy: &Arc<RigidBodyProxy>) {
        let target = Arc::clone(proxy);
        self.queue
            .enqueue(Box::new(move |ctx| target.set_membership(ctx, false)));
    }

    /// Enqueues a task for the next tick; callable from any thread
    pub fn enqueue(&self, task: Task) {
        self.queue.enqueue(task);
    }

    /// Requeues a task for the next tick; callable from any thread
    pub fn requeue(&self, task: Task) {
        self.queue.requeue(task);
    }

    /// Advances the simulation by one fixed tick: drains the task queue,
    /// runs per-proxy simulation-side sync, steps the backend and
    /// publishes the resulting transforms
    ///
    /// Simulation thread only. Individual task failures are logged and
    /// never abort the tick; a failing backend step turns the tick into a
    /// no-op step that publishes nothing.
    pub fn step(&self, dt: f32) {
        let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let mut ctx = SpaceContext {
            world: inner.world.as_mut(),
            queue: &self.queue,
            proxies: &mut inner.proxies,
            events: &mut inner.events,
            tick,
        };

        for task in self.queue.drain() {
            if let Err(err) = task(&mut ctx) {
                log::error!("deferred task failed at tick {}: {}", tick, err);
            }
        }

        let roster: Vec<Arc<RigidBodyProxy>> = ctx.proxies.clone();
        for proxy in &roster {
            if let Err(err) = proxy.sync_physics_tick(&mut ctx) {
                log::error!(
                    "simulation-side sync failed for proxy {:?}: {}",
                    proxy.get_id(),
                    err
                );
            }
        }

        if let Err(err) = ctx.world_mut().step(dt) {
            log::error!("backend step failed at tick {}, treating as no-op: {}", tick, err);
            return;
        }

        for proxy in &roster {
            if let Err(err) = proxy.publish_simulation_transform(&mut ctx) {
                log::warn!(
                    "transform publish failed for proxy {:?}: {}",
                    proxy.get_id(),
                    err
                );
            }
        }

        inner.time += dt;
    }

    /// Advances the simulation by wall-clock time using the fixed time
    /// step, taking at most `max_substeps` ticks and dropping any excess
    /// backlog
    pub fn update(&self, elapsed: f32) {
        let time_step = self.config.time_step;
        let mut steps = 0;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.accumulator += elapsed.max(0.0);
            while inner.accumulator >= time_step && steps < self.config.max_substeps {
                inner.accumulator -= time_step;
                steps += 1;
            }
            if inner.accumulator >= time_step {
                log::debug!(
                    "simulation falling behind, dropping {:.3}s of backlog",
                    inner.accumulator
                );
                inner.accumulator = 0.0;
            }
        }
        for _ in 0..steps {
            self.step(time_step);
        }
    }

    /// Removes and returns all queued lifecycle events
    pub fn drain_events(&self) -> Vec<BodyEvent> {
        self.inner.lock().unwrap().events.drain()
    }

    /// Returns whether the proxy's body is currently a live member of the
    /// simulation
    pub fn is_in_simulation(&self, proxy: &RigidBodyProxy) -> bool {
        let inner = self.inner.lock().unwrap();
        proxy
            .native_handle()
            .map(|handle| inner.world.is_in_simulation(handle))
            .unwrap_or(false)
    }

    /// Runs a closure against the native world while holding the space
    /// lock; intended for tooling and tests, not for the logic loop
    pub fn with_world<R>(&self, f: impl FnOnce(&mut dyn PhysicsBackend) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(inner.world.as_mut())
    }
}
