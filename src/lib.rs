pub mod math;
pub mod backend;
pub mod bodies;
pub mod sync;
pub mod forces;
pub mod core;

/// Re-export common types for easier usage
pub use crate::core::{SimulationSpace, SpaceConfig, SpaceRunner, TaskQueue, ProxyId};
pub use crate::bodies::{RigidBodyProxy, RigidBodyDescriptor, CollisionShape, BodyLifecycle};
pub use crate::sync::{SharedTransform, TransformOrigin, SceneNode};
pub use crate::backend::{PhysicsBackend, BodyHandle};
pub use crate::math::{Vector3, Quaternion, Transform};

/// Error types for the synchronization engine
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum SyncError {
        #[error("Invalid descriptor: {0}")]
        InvalidDescriptor(String),

        #[error("Stale proxy reference: {0}")]
        StaleProxy(String),

        #[error("Backend operation failed: {0}")]
        Backend(String),

        #[error("Simulation thread error: {0}")]
        Thread(String),
    }
}

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, error::SyncError>;

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
