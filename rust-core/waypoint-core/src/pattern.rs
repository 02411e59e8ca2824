//! # Pattern Compiler
//!
//! Turns a URI template such as `/users/{id}/posts/{post}` into an anchored
//! regular expression with one named capture group per placeholder.
//!
//! Each placeholder uses the constraint registered for it, or
//! [`DEFAULT_PARAM_PATTERN`] (one or more non-slash characters). Literal
//! segments are escaped, so `/feed.xml` only matches a literal dot.
//!
//! Constraint patterns are not validated when they are registered; a
//! malformed one surfaces as [`Error::InvalidRoutePattern`] the first time
//! the route is compiled for matching.

use crate::error::{Error, Result};
use crate::route::{Constraints, RouteParams};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Pattern used for placeholders without a constraint
pub const DEFAULT_PARAM_PATTERN: &str = "[^/]+";

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex is valid"))
}

/// A template compiled against a constraint set
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    names: Vec<String>,
    /// Full-value validators for constrained placeholders
    validators: Vec<(String, Regex)>,
}

impl CompiledPattern {
    /// Compile `template` using `constraints` for its placeholders
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if a constraint is not a valid
    /// regular expression or a placeholder name is repeated.
    pub fn compile(template: &str, constraints: &Constraints) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidRoutePattern {
            pattern: template.to_string(),
            reason,
        };

        let mut source = String::with_capacity(template.len() + 16);
        source.push('^');
        let mut names = Vec::new();
        let mut validators = Vec::new();
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str();

            source.push_str(&regex::escape(&template[last..whole.start()]));
            let pattern = match constraints.get(name) {
                Some(constraint) => {
                    let validator = Regex::new(&format!("^(?:{constraint})$"))
                        .map_err(|e| invalid(e.to_string()))?;
                    validators.push((name.to_string(), validator));
                    constraint.as_str()
                }
                None => DEFAULT_PARAM_PATTERN,
            };
            let _ = write!(source, "(?P<{name}>{pattern})");

            names.push(name.to_string());
            last = whole.end();
        }

        source.push_str(&regex::escape(&template[last..]));
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            regex,
            names,
            validators,
        })
    }

    /// The generated regular expression
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Placeholder names in template order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether `path` matches the whole pattern
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and extract its parameters in template order
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<RouteParams> {
        let caps = self.regex.captures(path)?;
        Some(
            self.names
                .iter()
                .filter_map(|name| caps.name(name).map(|m| (name.clone(), m.as_str().to_string())))
                .collect(),
        )
    }

    /// Check every constrained parameter against its full constraint
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` naming the first parameter that fails.
    pub fn validate(&self, params: &RouteParams) -> Result<()> {
        for (name, validator) in &self.validators {
            if let Some(value) = params.get(name) {
                if !validator.is_match(value) {
                    return Err(Error::BadRequest {
                        message: format!(
                            "Parameter [{name}] does not match the required constraint."
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(pairs: &[(&str, &str)]) -> Constraints {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_literal_template() {
        let p = CompiledPattern::compile("/users", &Constraints::new()).unwrap();
        assert_eq!(p.as_str(), "^/users$");
        assert!(p.is_match("/users"));
        assert!(!p.is_match("/users/1"));
        assert!(!p.is_match("/api/users"));
        assert!(p.names().is_empty());
    }

    #[test]
    fn test_default_placeholder_stops_at_slash() {
        let p = CompiledPattern::compile("/users/{id}", &Constraints::new()).unwrap();
        assert_eq!(p.as_str(), "^/users/(?P<id>[^/]+)$");
        assert!(p.is_match("/users/abc"));
        assert!(!p.is_match("/users/a/b"));
        assert!(!p.is_match("/users/"));
    }

    #[test]
    fn test_captures_in_template_order() {
        let p = CompiledPattern::compile("/u/{user}/p/{post}", &Constraints::new()).unwrap();
        let params = p.captures("/u/ada/p/42").unwrap();
        let values: Vec<&str> = params.values().collect();
        assert_eq!(values, vec!["ada", "42"]);
        assert_eq!(params.get("post"), Some("42"));
    }

    #[test]
    fn test_constraint_is_substituted() {
        let p = CompiledPattern::compile("/users/{id}", &constraints(&[("id", "[0-9]+")])).unwrap();
        assert!(p.is_match("/users/42"));
        assert!(!p.is_match("/users/abc"));
    }

    #[test]
    fn test_constraint_with_groups_does_not_shift_params() {
        let p = CompiledPattern::compile(
            "/files/{kind}/{name}",
            &constraints(&[("kind", "(img|doc)")]),
        )
        .unwrap();
        let params = p.captures("/files/doc/readme").unwrap();
        assert_eq!(params.get("kind"), Some("doc"));
        assert_eq!(params.get("name"), Some("readme"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let p = CompiledPattern::compile("/feed.xml", &Constraints::new()).unwrap();
        assert!(p.is_match("/feed.xml"));
        assert!(!p.is_match("/feedaxml"));
    }

    #[test]
    fn test_malformed_constraint_is_configuration_error() {
        let err = CompiledPattern::compile("/users/{id}", &constraints(&[("id", "[0-9")]))
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(err, Error::InvalidRoutePattern { .. }));
    }

    #[test]
    fn test_validate_reports_parameter() {
        let p = CompiledPattern::compile("/users/{id}", &constraints(&[("id", "[0-9]+")])).unwrap();
        let good: RouteParams = [("id", "42")].into_iter().collect();
        assert!(p.validate(&good).is_ok());

        let bad: RouteParams = [("id", "4a")].into_iter().collect();
        let err = p.validate(&bad).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("[id]"));
    }

    #[test]
    fn test_names_in_template_order() {
        let pattern = CompiledPattern::compile("/a/{x}/b/{y}", &Constraints::new()).unwrap();
        assert_eq!(pattern.names(), ["x", "y"]);
        let plain = CompiledPattern::compile("/plain", &Constraints::new()).unwrap();
        assert!(plain.names().is_empty());
    }
}
