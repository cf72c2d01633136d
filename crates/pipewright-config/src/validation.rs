//! Configuration document validation
//!
//! Validation is a pure function over full or partial document trees. The
//! rule set is a closed list of tagged kinds; production scope enables the
//! stricter rules.

use regex::Regex;
use serde_json::Value;

use crate::types::{Environment, ValidationReport};

const SEMVER_PATTERN: &str =
    r"^\d+\.\d+\.\d+(-[0-9A-Za-z][0-9A-Za-z.-]*)?(\+[0-9A-Za-z][0-9A-Za-z.-]*)?$";

/// A validation rule kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidationRule {
    /// `name` fields must be non-empty strings
    NonEmptyName,
    /// `version` fields must match a semantic-version pattern
    SemverVersion,
    /// Production scope: no `debug=true`, no empty `url` fields
    ProductionHardening,
}

impl ValidationRule {
    fn active_rules(environment: Option<Environment>) -> Vec<ValidationRule> {
        let mut rules = vec![ValidationRule::NonEmptyName, ValidationRule::SemverVersion];
        if environment == Some(Environment::Production) {
            rules.push(ValidationRule::ProductionHardening);
        }
        rules
    }

    fn check(&self, path: &str, field: &str, value: &Value, errors: &mut Vec<String>) {
        match self {
            ValidationRule::NonEmptyName => {
                if field == "name" {
                    let empty = match value {
                        Value::String(s) => s.trim().is_empty(),
                        Value::Null => true,
                        _ => false,
                    };
                    if empty {
                        errors.push(format!("{path}: name must not be empty"));
                    }
                }
            }
            ValidationRule::SemverVersion => {
                if field == "version" {
                    if let Value::String(s) = value {
                        if let Ok(re) = Regex::new(SEMVER_PATTERN) {
                            if !re.is_match(s) {
                                errors.push(format!(
                                    "{path}: version '{s}' is not a valid semantic version"
                                ));
                            }
                        }
                    }
                }
            }
            ValidationRule::ProductionHardening => {
                if field == "debug" && value == &Value::Bool(true) {
                    errors.push(format!("{path}: debug must not be enabled in production"));
                }
                if field == "url" {
                    if let Value::String(s) = value {
                        if s.trim().is_empty() {
                            errors.push(format!("{path}: url must not be empty in production"));
                        }
                    }
                }
            }
        }
    }
}

/// Validate a full or partial configuration document
///
/// Never mutates state; returns every violation found.
pub fn validate_document(document: &Value, environment: Option<Environment>) -> ValidationReport {
    let rules = ValidationRule::active_rules(environment);
    let mut errors = Vec::new();
    walk(document, "", &rules, &mut errors);
    ValidationReport::with_errors(errors)
}

/// Validate a single value at its dot-path position in the document
///
/// Builds the partial document the value would occupy and validates that.
pub fn validate_value(
    key: &str,
    value: &Value,
    environment: Option<Environment>,
) -> ValidationReport {
    let mut partial = Value::Object(serde_json::Map::new());
    crate::store::insert_path(&mut partial, key, value.clone());
    validate_document(&partial, environment)
}

fn walk(value: &Value, path: &str, rules: &[ValidationRule], errors: &mut Vec<String>) {
    if let Value::Object(map) = value {
        for (field, child) in map {
            let child_path = if path.is_empty() {
                field.clone()
            } else {
                format!("{path}.{field}")
            };
            for rule in rules {
                rule.check(&child_path, field, child, errors);
            }
            walk(child, &child_path, rules, errors);
        }
    }
}
