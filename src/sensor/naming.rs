//! Metric identity and the identifier grammar it must satisfy.
//!
//! A fully-qualified metric name is `namespace_subsystem_name`, with empty
//! grouping prefixes skipped. Every component may only contain ASCII letters,
//! digits and underscores, and the composite must not start with a digit.

use std::fmt;

use super::SensorError;

/// The three name parts that make up a metric's fully-qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricIdentity {
    pub namespace: String,
    pub subsystem: String,
    pub name: String,
}

impl MetricIdentity {
    /// Create an identity from its three parts.
    pub fn new(
        namespace: impl Into<String>,
        subsystem: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            name: name.into(),
        }
    }

    /// Join the non-empty parts with `_`.
    pub fn fq_name(&self) -> String {
        [&self.namespace, &self.subsystem, &self.name]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Check this identity against the identifier grammar.
    pub fn validate(&self) -> Result<(), SensorError> {
        validate_identity(&self.namespace, &self.subsystem, &self.name)
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fq_name())
    }
}

/// Validate the composite identity formed by the three name parts.
///
/// # Errors
/// Returns [`SensorError::InvalidName`] naming the first offending field.
pub fn validate_identity(namespace: &str, subsystem: &str, name: &str) -> Result<(), SensorError> {
    if name.is_empty() {
        return Err(SensorError::InvalidName {
            field: "name",
            value: String::new(),
            reason: "must not be empty".to_string(),
        });
    }

    let parts = [
        ("namespace", namespace),
        ("subsystem", subsystem),
        ("name", name),
    ];

    for (field, value) in parts {
        if let Some((pos, ch)) = value.char_indices().find(|(_, c)| !is_identifier_char(*c)) {
            return Err(SensorError::InvalidName {
                field,
                value: value.to_string(),
                reason: format!(
                    "contains invalid character {ch:?} at position {pos}; only ASCII letters, digits and '_' are allowed"
                ),
            });
        }
    }

    // The leading non-empty part decides what the composite starts with.
    let leading = parts.into_iter().find(|(_, v)| !v.is_empty());
    if let Some((field, value)) = leading.filter(|(_, v)| v.starts_with(|c: char| c.is_ascii_digit())) {
        return Err(SensorError::InvalidName {
            field,
            value: value.to_string(),
            reason: "metric name must not start with a digit".to_string(),
        });
    }

    Ok(())
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fq_name_skips_empty_parts() {
        assert_eq!(
            MetricIdentity::new("ns", "sub", "requests").fq_name(),
            "ns_sub_requests"
        );
        assert_eq!(MetricIdentity::new("", "sub", "requests").fq_name(), "sub_requests");
        assert_eq!(MetricIdentity::new("ns", "", "requests").fq_name(), "ns_requests");
        assert_eq!(MetricIdentity::new("", "", "requests").fq_name(), "requests");
    }

    #[test]
    fn test_valid_identities() {
        assert!(validate_identity("namespace_text", "subsystem_text", "sensor_counter").is_ok());
        assert!(validate_identity("", "", "_private").is_ok());
        assert!(validate_identity("app", "", "Latency99").is_ok());
        // A digit is fine once something precedes it in the composite.
        assert!(validate_identity("app", "2xx", "responses").is_ok());
    }

    #[test]
    fn test_dot_in_name_rejected() {
        let err = validate_identity("namespace_text", "subsystem_text", "sensor.bad.type")
            .unwrap_err();
        assert_eq!(err.field(), "name");
        let msg = err.to_string();
        assert!(msg.contains("sensor.bad.type"));
        assert!(msg.contains("'.'"));
        assert!(msg.contains("position 6"));
    }

    #[test]
    fn test_separator_in_prefix_rejected() {
        let err = validate_identity("name-space", "", "ok").unwrap_err();
        assert_eq!(err.field(), "namespace");

        let err = validate_identity("", "sub system", "ok").unwrap_err();
        assert_eq!(err.field(), "subsystem");
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = validate_identity("ns", "sub", "").unwrap_err();
        assert_eq!(err.field(), "name");
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_leading_digit_rejected() {
        let err = validate_identity("", "", "9lives").unwrap_err();
        assert_eq!(err.field(), "name");
        assert!(err.to_string().contains("start with a digit"));

        let err = validate_identity("1ns", "sub", "ok").unwrap_err();
        assert_eq!(err.field(), "namespace");
    }

    #[test]
    fn test_non_ascii_rejected() {
        let err = validate_identity("", "", "temp\u{00e9}rature").unwrap_err();
        assert_eq!(err.field(), "name");
    }
}
