#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Configuration parameters for a simulation space
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SpaceConfig {
    /// The fixed time step the simulation advances by each tick
    pub time_step: f32,

    /// The maximum number of fixed steps a single `update` call may take
    /// before dropping backlog
    pub max_substeps: u32,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            max_substeps: 4,
        }
    }
}
