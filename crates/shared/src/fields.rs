//! Serde adapters for optional text fields.
//!
//! The dashboard form posts empty strings for fields the user left blank;
//! the roster stores those as NULL.

/// `Option<String>` where a blank string reads as `None`.
pub mod blank_string {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        value.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<String>::deserialize(d)?.filter(|v| !v.trim().is_empty()))
    }
}

/// `Option<Option<String>>` for partial updates: absent keeps, `null` or a
/// blank string clears, a value sets. Pair with `#[serde(default)]`.
pub mod patch_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Option<String>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(Some(v)) => s.serialize_str(v),
            _ => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
        Ok(Some(Option::<String>::deserialize(d)?.filter(|v| !v.trim().is_empty())))
    }
}
