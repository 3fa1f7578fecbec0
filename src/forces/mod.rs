mod continuous;

pub use self::continuous::{ContinuousEffect, EffectKind};
pub(crate) use self::continuous::effect_task;
