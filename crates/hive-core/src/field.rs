//! Three-state wrapper fields.
//!
//! Inbound wrappers distinguish a key that is missing from the JSON object,
//! a key explicitly set to `null`, and a key carrying a value. Declare the
//! struct field with `#[serde(default, skip_serializing_if = "Field::is_absent")]`
//! so that a missing key deserializes to [`Field::Absent`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A partial-update field: absent, present with null, or present with a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Key not present; leaves the target unchanged.
    Absent,
    /// Key present with `null`; clears the target.
    Null,
    /// Key present with a value; replaces the target.
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> Field<T> {
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Present-with-null or present-with-value.
    pub const fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// Convert a stored optional value into a present field.
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }

    /// Apply this field to `target`.
    pub fn apply(self, target: &mut Option<T>) {
        match self {
            Self::Absent => {}
            Self::Null => *target = None,
            Self::Value(v) => *target = Some(v),
        }
    }

    /// The carried value, if any.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Absent | Self::Null => None,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Self::from_option)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Value(v) => serializer.serialize_some(v),
            Self::Absent | Self::Null => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, Serialize)]
    struct Patch {
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        status: Field<String>,
    }

    #[test]
    fn missing_key_is_absent() {
        let p: Patch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.status, Field::Absent);
    }

    #[test]
    fn explicit_null_is_null() {
        let p: Patch = serde_json::from_value(json!({ "status": null })).unwrap();
        assert_eq!(p.status, Field::Null);
    }

    #[test]
    fn value_is_value() {
        let p: Patch = serde_json::from_value(json!({ "status": "done" })).unwrap();
        assert_eq!(p.status, Field::Value("done".to_string()));
    }

    #[test]
    fn apply_follows_three_state_rules() {
        let mut target = Some("old".to_string());
        Field::Absent.apply(&mut target);
        assert_eq!(target.as_deref(), Some("old"));

        Field::Value("new".to_string()).apply(&mut target);
        assert_eq!(target.as_deref(), Some("new"));

        Field::Null.apply(&mut target);
        assert_eq!(target, None);
    }

    #[test]
    fn serialization_preserves_null_and_skips_absent() {
        let absent = serde_json::to_value(Patch::default()).unwrap();
        assert_eq!(absent, json!({}));

        let null = serde_json::to_value(Patch {
            status: Field::Null,
        })
        .unwrap();
        assert_eq!(null, json!({ "status": null }));
    }
}
