use std::borrow::{Borrow, Cow};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key naming a component table, e.g. `"Transform"` or `"Health"`.
///
/// Well-known kinds can be declared as constants with
/// [`from_static`](Self::from_static); lookups accept plain `&str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKind(Cow<'static, str>);

impl ComponentKind {
    /// Create a kind from a static name without allocating.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create a kind from any string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The kind's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ComponentKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ComponentKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for ComponentKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ComponentKind {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn static_and_owned_kinds_compare_equal() {
        const HEALTH: ComponentKind = ComponentKind::from_static("Health");
        assert_eq!(HEALTH, ComponentKind::new("Health".to_string()));
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(ComponentKind::from("Transform"), 1);
        assert_eq!(map.get("Transform"), Some(&1));
        assert_eq!(map.get("Velocity"), None);
    }
}
