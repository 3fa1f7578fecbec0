mod scene;
mod shared_transform;

pub use self::scene::SceneNode;
pub use self::shared_transform::{SharedTransform, TransformOrigin};
