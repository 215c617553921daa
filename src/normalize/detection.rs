//! Schema-family detection by confidence scoring.
//!
//! Every adapter inspects the top-level JSON object and reports how sure it
//! is that it can extract components from it. The highest score at or above
//! [`FormatConfidence::LOW`] wins.

use serde_json::{Map, Value};

/// Confidence level for schema detection
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct FormatConfidence(f32);

impl FormatConfidence {
    /// Definitely not this schema
    pub const NONE: Self = Self(0.0);
    /// Might be this schema
    pub const LOW: Self = Self(0.25);
    /// Likely this schema
    pub const MEDIUM: Self = Self(0.5);
    /// Almost certainly this schema
    pub const HIGH: Self = Self(0.75);
    pub const CERTAIN: Self = Self(1.0);

    #[must_use]
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    #[must_use]
    pub const fn value(&self) -> f32 {
        self.0
    }

    /// Whether an adapter should attempt extraction at this confidence.
    #[must_use]
    pub fn can_extract(&self) -> bool {
        self.0 >= Self::LOW.0
    }
}

/// Whether `key` holds a JSON array in `doc`.
pub(crate) fn has_array(doc: &Map<String, Value>, key: &str) -> bool {
    doc.get(key).is_some_and(Value::is_array)
}

/// String value of `key`, if present.
pub(crate) fn str_field<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(FormatConfidence::new(3.0).value(), 1.0);
        assert_eq!(FormatConfidence::new(-1.0).value(), 0.0);
        assert!(FormatConfidence::LOW.can_extract());
        assert!(!FormatConfidence::NONE.can_extract());
    }
}
