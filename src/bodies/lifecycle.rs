use crate::backend::BodyHandle;

/// The lifecycle of a proxy's native body
///
/// `Unbuilt → Built → PendingRebuild → Removing → Rebuilding → Built`
/// with `Destroyed` as the terminal state entered on detach. The
/// `Removing`/`Rebuilding` states only ever exist on the simulation
/// thread, inside the rebuild sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLifecycle {
    /// No native body has been constructed yet
    Unbuilt,

    /// A native body exists and matches the descriptor
    Built,

    /// The descriptor changed in a way that requires reconstruction
    PendingRebuild,

    /// The body is being removed from the simulation prior to rebuild
    Removing,

    /// The native body is being destroyed and reconstructed
    Rebuilding,

    /// The proxy was detached; no operation may target it anymore
    Destroyed,
}

impl BodyLifecycle {
    /// Returns whether a force, torque or property may be applied
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built)
    }

    /// Returns whether the lifecycle has reached its terminal state
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

/// The simulation-side state of a proxy's native body
///
/// Guarded by a single mutex on the proxy; both threads read the
/// lifecycle, only the simulation thread touches the handle.
#[derive(Debug)]
pub(crate) struct BodyState {
    /// Where the body is in its build/rebuild/destroy lifecycle
    pub lifecycle: BodyLifecycle,

    /// The native handle, present from first build until destruction
    pub handle: Option<BodyHandle>,

    /// Whether the body is currently a live member of the simulation
    pub in_space: bool,

    /// Whether the body should be (re)added to the simulation once the
    /// next build/rebuild completes; survives failed rebuild attempts so
    /// membership is not lost across retries
    pub rejoin_on_rebuild: bool,
}

impl BodyState {
    pub fn new() -> Self {
        Self {
            lifecycle: BodyLifecycle::Unbuilt,
            handle: None,
            in_space: false,
            rejoin_on_rebuild: false,
        }
    }
}
