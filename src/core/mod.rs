pub mod config;
pub mod events;
pub mod runner;
pub mod space;
pub mod task_queue;

pub use self::config::SpaceConfig;
pub use self::events::{BodyEvent, BodyEventType, EventQueue};
pub use self::runner::SpaceRunner;
pub use self::space::{SimulationSpace, SpaceContext};
pub use self::task_queue::{Task, TaskQueue, TaskResult};

/// A unique identifier for a proxy within a simulation space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub(crate) u64);
