mod descriptor;
mod lifecycle;
mod proxy;
mod shape;

pub use self::descriptor::RigidBodyDescriptor;
pub use self::lifecycle::BodyLifecycle;
pub use self::proxy::RigidBodyProxy;
pub use self::shape::CollisionShape;
