use crate::math::Transform;
use std::sync::Mutex;

/// Marker identifying which side last wrote a shared transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOrigin {
    /// The logic/render thread moved the scene node
    Scene,

    /// The simulation stepped the body
    Simulation,
}

#[derive(Debug)]
struct TransformCell {
    value: Transform,
    origin: TransformOrigin,
    consumed_by_scene: bool,
    consumed_by_simulation: bool,
}

/// A thread-safe cell holding a world transform, tagged with the side
/// that authored it
///
/// Shared by exactly one `RigidBodyProxy` and its paired scene node. Each
/// side reads at most once per publication, never observes its own
/// writes, and an untouched value is never recopied. If both sides write
/// within the same tick before either reads, the later writer wins; the
/// tie-break is call order.
#[derive(Debug)]
pub struct SharedTransform {
    cell: Mutex<TransformCell>,
}

impl SharedTransform {
    /// Creates a cell seeded with the given transform; nothing is
    /// exchanged until a side writes
    pub fn new(initial: Transform) -> Self {
        Self {
            cell: Mutex::new(TransformCell {
                value: initial,
                origin: TransformOrigin::Scene,
                consumed_by_scene: true,
                consumed_by_simulation: true,
            }),
        }
    }

    /// Overwrites the value and origin, making the value visible to both
    /// sides again
    pub fn write(&self, value: Transform, origin: TransformOrigin) {
        let mut cell = self.cell.lock().unwrap();
        cell.value = value;
        cell.origin = origin;
        cell.consumed_by_scene = false;
        cell.consumed_by_simulation = false;
    }

    /// Reads the value for the given side, consuming it for that side
    ///
    /// Returns `None` if the side already consumed the current value, or
    /// if the side authored it itself (a side never re-applies its own
    /// write).
    pub fn try_read(&self, side: TransformOrigin) -> Option<Transform> {
        let mut guard = self.cell.lock().unwrap();
        let cell = &mut *guard;
        if cell.origin == side {
            return None;
        }
        let consumed = match side {
            TransformOrigin::Scene => &mut cell.consumed_by_scene,
            TransformOrigin::Simulation => &mut cell.consumed_by_simulation,
        };
        if *consumed {
            return None;
        }
        *consumed = true;
        Some(cell.value)
    }

    /// Returns the current value without consuming it
    pub fn peek(&self) -> Transform {
        self.cell.lock().unwrap().value
    }

    /// Returns which side authored the current value
    pub fn get_origin(&self) -> TransformOrigin {
        self.cell.lock().unwrap().origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;

    fn at(x: f32) -> Transform {
        Transform::from_translation(Vector3::new(x, 0.0, 0.0))
    }

    #[test]
    fn initial_value_is_not_exchanged() {
        let shared = SharedTransform::new(at(1.0));
        assert!(shared.try_read(TransformOrigin::Scene).is_none());
        assert!(shared.try_read(TransformOrigin::Simulation).is_none());
        assert_eq!(shared.peek(), at(1.0));
    }

    #[test]
    fn a_side_never_reads_its_own_write() {
        let shared = SharedTransform::new(at(0.0));
        shared.write(at(2.0), TransformOrigin::Scene);
        assert!(shared.try_read(TransformOrigin::Scene).is_none());
        assert_eq!(
            shared.try_read(TransformOrigin::Simulation),
            Some(at(2.0))
        );
    }

    #[test]
    fn a_value_is_consumed_at_most_once_per_side() {
        let shared = SharedTransform::new(at(0.0));
        shared.write(at(3.0), TransformOrigin::Simulation);
        assert_eq!(shared.try_read(TransformOrigin::Scene), Some(at(3.0)));
        assert!(shared.try_read(TransformOrigin::Scene).is_none());

        // A new publication makes the value readable again
        shared.write(at(4.0), TransformOrigin::Simulation);
        assert_eq!(shared.try_read(TransformOrigin::Scene), Some(at(4.0)));
    }

    #[test]
    fn peek_does_not_consume() {
        let shared = SharedTransform::new(at(0.0));
        shared.write(at(5.0), TransformOrigin::Simulation);
        assert_eq!(shared.peek(), at(5.0));
        assert_eq!(shared.try_read(TransformOrigin::Scene), Some(at(5.0)));
    }

    #[test]
    fn last_writer_wins_on_same_tick_conflict() {
        let shared = SharedTransform::new(at(0.0));

        shared.write(at(1.0), TransformOrigin::Scene);
        shared.write(at(2.0), TransformOrigin::Simulation);
        assert_eq!(shared.get_origin(), TransformOrigin::Simulation);
        assert_eq!(shared.try_read(TransformOrigin::Scene), Some(at(2.0)));
        assert!(shared.try_read(TransformOrigin::Simulation).is_none());

        // Reversed write order flips the winner
        shared.write(at(3.0), TransformOrigin::Simulation);
        shared.write(at(4.0), TransformOrigin::Scene);
        assert_eq!(shared.get_origin(), TransformOrigin::Scene);
        assert_eq!(
            shared.try_read(TransformOrigin::Simulation),
            Some(at(4.0))
        );
        assert!(shared.try_read(TransformOrigin::Scene).is_none());
    }
}
