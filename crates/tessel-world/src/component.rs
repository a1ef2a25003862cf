use serde::{Deserialize, Serialize};
use tessel_core::ComponentKind;

/// Kind key for [`Transform`].
pub const TRANSFORM: ComponentKind = ComponentKind::from_static("Transform");
/// Kind key for [`Velocity`].
pub const VELOCITY: ComponentKind = ComponentKind::from_static("Velocity");
/// Kind key for [`Health`].
pub const HEALTH: ComponentKind = ComponentKind::from_static("Health");
/// Kind key for [`Sprite`].
pub const SPRITE: ComponentKind = ComponentKind::from_static("Sprite");

/// A component value as stored in the world.
///
/// Each variant is a plain record with no behavior. Kinds the core does
/// not know about travel as [`Component::Data`] so higher layers can attach
/// their own shapes without touching this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Component {
    /// World-space placement.
    Transform(Transform),
    /// Per-second displacement.
    Velocity(Velocity),
    /// Hit points.
    Health(Health),
    /// Drawable reference.
    Sprite(Sprite),
    /// Free-form record for kinds defined outside the core.
    Data(serde_json::Value),
}

impl Component {
    /// The point this value places its entity at, if it carries one.
    ///
    /// A [`Component::Data`] object counts as positioned when it has
    /// numeric `x` and `y` fields.
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            Self::Transform(t) => Some((t.x, t.y)),
            Self::Data(value) => {
                let x = value.get("x")?.as_f64()?;
                let y = value.get("y")?.as_f64()?;
                Some((x, y))
            }
            _ => None,
        }
    }

    /// The transform, if this is one.
    pub fn as_transform(&self) -> Option<&Transform> {
        match self {
            Self::Transform(t) => Some(t),
            _ => None,
        }
    }

    /// Mutable transform, if this is one.
    pub fn as_transform_mut(&mut self) -> Option<&mut Transform> {
        match self {
            Self::Transform(t) => Some(t),
            _ => None,
        }
    }

    /// The velocity, if this is one.
    pub fn as_velocity(&self) -> Option<&Velocity> {
        match self {
            Self::Velocity(v) => Some(v),
            _ => None,
        }
    }

    /// The health record, if this is one.
    pub fn as_health(&self) -> Option<&Health> {
        match self {
            Self::Health(h) => Some(h),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Placement in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    /// Radians.
    #[serde(default)]
    pub rotation: f64,
}

impl Transform {
    /// A transform at `(x, y)` with no rotation.
    pub fn at(x: f64, y: f64) -> Self {
        Self { x, y, rotation: 0.0 }
    }
}

/// Displacement per simulated second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
}

/// Hit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Health {
    /// Full health.
    pub fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Whether hit points have run out.
    pub fn is_depleted(&self) -> bool {
        self.current == 0
    }
}

/// Frame of a sprite sheet to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprite {
    pub sheet: String,
    #[serde(default)]
    pub frame: u32,
}

impl From<Transform> for Component {
    fn from(value: Transform) -> Self {
        Self::Transform(value)
    }
}

impl From<Velocity> for Component {
    fn from(value: Velocity) -> Self {
        Self::Velocity(value)
    }
}

impl From<Health> for Component {
    fn from(value: Health) -> Self {
        Self::Health(value)
    }
}

impl From<Sprite> for Component {
    fn from(value: Sprite) -> Self {
        Self::Sprite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transform_carries_a_position() {
        let c = Component::from(Transform::at(3.0, 4.0));
        assert_eq!(c.position(), Some((3.0, 4.0)));
        assert!(Component::from(Velocity { dx: 1.0, dy: 0.0 }).position().is_none());
    }

    #[test]
    fn data_with_coordinates_is_positioned() {
        assert_eq!(Component::Data(json!({ "x": 1.5, "y": 2 })).position(), Some((1.5, 2.0)));
        assert!(Component::Data(json!({ "x": 1.5 })).position().is_none());
        assert!(Component::Data(json!("label")).position().is_none());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let value = serde_json::to_value(Component::from(Health::full(10))).unwrap();
        assert_eq!(value, json!({ "kind": "Health", "data": { "current": 10, "max": 10 } }));
        let back: Component = serde_json::from_value(value).unwrap();
        assert_eq!(back.as_health(), Some(&Health::full(10)));
    }

    #[test]
    fn kind_constants_match_variant_names() {
        assert_eq!(TRANSFORM.as_str(), "Transform");
        assert_eq!(VELOCITY.as_str(), "Velocity");
        assert_eq!(HEALTH.as_str(), "Health");
        assert_eq!(SPRITE.as_str(), "Sprite");
    }
}
