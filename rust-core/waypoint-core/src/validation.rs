//! # Validation Errors
//!
//! Field-level validation failures raised by request validators and carried
//! through the dispatcher as [`Error::ValidationFailed`](crate::Error::ValidationFailed).
//!
//! The routing core never validates bodies itself; this type only gives
//! application validators a common shape the classifier understands.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Mapping from field name to the messages reported for it
///
/// Fields are kept sorted so rendered messages are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Create an empty error collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    /// Builder-style variant of [`add`](Self::add)
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.add(field, message);
        self
    }

    /// Messages recorded for `field`
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    /// Iterate `(field, messages)` pairs in field order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Check if there are any errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of fields with at least one error
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Turn a non-empty collection into `Err(Error::ValidationFailed)`
    ///
    /// # Errors
    ///
    /// Returns the collection wrapped in an error if any field failed.
    pub fn into_result(self) -> crate::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::ValidationFailed(self))
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut errors = Self::new();
        for (field, message) in iter {
            errors.add(field, message);
        }
        errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Validation failed");
        }
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "Validation failed for field '{field}', error: {message}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add("email", "is required");
        errors.add("email", "must contain @");
        errors.add("name", "too short");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.field("email").map(<[String]>::len), Some(2));
        assert!(errors.field("age").is_none());
    }

    #[test]
    fn test_display_joins_messages() {
        let errors: ValidationErrors = [("name", "too short"), ("age", "not a number")]
            .into_iter()
            .collect();
        assert_eq!(
            errors.to_string(),
            "Validation failed for field 'age', error: not a number; \
             Validation failed for field 'name', error: too short"
        );
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let err = ValidationErrors::new()
            .with("email", "is required")
            .into_result()
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_serializes_as_field_map() {
        let errors = ValidationErrors::new().with("email", "is required");
        let json = serde_json::to_string(&errors).unwrap();
        assert_eq!(json, r#"{"errors":{"email":["is required"]}}"#);
    }
}
