//! Validation of structured research results
//!
//! The research collaborator is an unreliable source of YAML. Before a result
//! is accepted its category token and entry text are checked here; any
//! failure turns the result into an unresolved report instead of a published
//! entry.

use mcpscout_utils::error::ValidationError;
use mcpscout_utils::types::ResearchResult;
use regex::Regex;
use serde_yaml::Value;
use std::sync::LazyLock;

/// Lowercase letters, digits and underscore
static CATEGORY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("static regex"));

/// Every entry starts with this marker
pub const ENTRY_MARKER: &str = "- id:";

/// The fields an entry must name, and no others
pub const REQUIRED_FIELDS: [&str; 4] = ["id", "name", "provider", "description"];

/// Validator for research results
pub struct ResultValidator;

impl ResultValidator {
    /// Validate `result` as the research outcome for `item_key`
    ///
    /// Unresolved results only have their category checked when one is given.
    pub fn validate(result: &ResearchResult, item_key: &str) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if (result.is_found || !result.category.is_empty())
            && !is_category_token(&result.category)
        {
            errors.push(ValidationError::InvalidCategory {
                category: result.category.clone(),
            });
        }

        if result.is_found
            && let Err(err) = Self::validate_entry(&result.formatted_entry, item_key)
        {
            errors.push(err);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Check a formatted entry: marker, YAML shape, field set and id echo
    pub fn validate_entry(entry: &str, item_key: &str) -> Result<(), ValidationError> {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingEntry);
        }
        if !trimmed.starts_with(ENTRY_MARKER) {
            return Err(ValidationError::EntryPrefix {
                found: trimmed.chars().take(20).collect(),
            });
        }

        let parsed: Value = serde_yaml::from_str(trimmed).map_err(|e| {
            ValidationError::MalformedEntry {
                reason: e.to_string(),
            }
        })?;

        let Value::Sequence(items) = parsed else {
            return Err(shape("entry is not a list item"));
        };
        let [Value::Mapping(fields)] = items.as_slice() else {
            return Err(shape(format!("expected exactly one mapping, found {} items", items.len())));
        };

        let mut names = Vec::with_capacity(fields.len());
        for key in fields.keys() {
            let Some(name) = key.as_str() else {
                return Err(shape("field names must be strings"));
            };
            names.push(name);
        }

        if let Some(extra) = names.iter().find(|n| !REQUIRED_FIELDS.contains(*n)) {
            return Err(shape(format!("unexpected field '{extra}'")));
        }
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !names.contains(*f)) {
            return Err(shape(format!("missing field '{missing}'")));
        }

        let id = fields.get("id").and_then(scalar_text).unwrap_or_default();
        if id != item_key {
            return Err(ValidationError::IdMismatch {
                expected: item_key.to_string(),
                found: id,
            });
        }

        Ok(())
    }
}

/// Whether `category` is a valid category token
#[must_use]
pub fn is_category_token(category: &str) -> bool {
    CATEGORY_TOKEN.is_match(category)
}

/// Render validation failures as the diagnostic body of an unresolved report
#[must_use]
pub fn describe_failures(item_key: &str, errors: &[ValidationError]) -> String {
    let mut report = format!("### {item_key}\n\nResearch result rejected:\n");
    for error in errors {
        report.push_str(&format!("- {error}\n"));
    }
    report
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn shape(reason: impl Into<String>) -> ValidationError {
    ValidationError::EntryShape {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(id: &str) -> String {
        format!(
            "- id: {id}\n  name: Brave Search\n  provider: Brave\n  description: Web search over the Brave index\n"
        )
    }

    fn found(category: &str, formatted_entry: String) -> ResearchResult {
        ResearchResult {
            is_found: true,
            category: category.to_string(),
            category_description: None,
            formatted_entry,
            unresolved_report: String::new(),
        }
    }

    #[test]
    fn test_valid_result_passes() {
        let result = found("search", entry("brave-search-mcp"));
        assert!(ResultValidator::validate(&result, "brave-search-mcp").is_ok());
    }

    #[test]
    fn test_uppercase_or_space_category_is_rejected() {
        for category in ["Search", "web search", "", "search-tools"] {
            let result = found(category, entry("brave"));
            let errors = ResultValidator::validate(&result, "brave").unwrap_err();
            assert!(
                matches!(errors[0], ValidationError::InvalidCategory { .. }),
                "category {category:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let text = "- id: brave\n  name: Brave\n  description: Search\n";
        let err = ResultValidator::validate_entry(text, "brave").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::EntryShape { ref reason } if reason.contains("provider")
        ));
    }

    #[test]
    fn test_extra_field_is_rejected() {
        let text = format!("{}  url: https://brave.example/sse\n", entry("brave"));
        let err = ResultValidator::validate_entry(&text, "brave").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::EntryShape { ref reason } if reason.contains("url")
        ));
    }

    #[test]
    fn test_id_must_echo_item_key() {
        let err = ResultValidator::validate_entry(&entry("brave-search"), "brave").unwrap_err();
        assert_eq!(
            err,
            ValidationError::IdMismatch {
                expected: "brave".into(),
                found: "brave-search".into()
            }
        );
    }

    #[test]
    fn test_marker_and_yaml_checks() {
        assert_eq!(
            ResultValidator::validate_entry("   ", "x"),
            Err(ValidationError::MissingEntry)
        );
        assert!(matches!(
            ResultValidator::validate_entry("id: x\nname: y", "x"),
            Err(ValidationError::EntryPrefix { .. })
        ));
        assert!(matches!(
            ResultValidator::validate_entry("- id: x\n  name: [unclosed", "x"),
            Err(ValidationError::MalformedEntry { .. })
        ));
        assert!(matches!(
            ResultValidator::validate_entry(&format!("{}{}", entry("x"), entry("x")), "x"),
            Err(ValidationError::EntryShape { .. })
        ));
    }

    #[test]
    fn test_unresolved_result_without_category_passes() {
        let result = ResearchResult {
            is_found: false,
            unresolved_report: "No public documentation".into(),
            ..ResearchResult::default()
        };
        assert!(ResultValidator::validate(&result, "mystery").is_ok());
    }

    #[test]
    fn test_describe_failures_lists_every_error() {
        let report = describe_failures(
            "brave",
            &[
                ValidationError::MissingEntry,
                ValidationError::InvalidCategory {
                    category: "Web".into(),
                },
            ],
        );
        assert!(report.starts_with("### brave"));
        assert_eq!(report.matches("\n- ").count(), 2);
    }

    proptest! {
        #[test]
        fn prop_category_with_uppercase_never_validates(
            prefix in "[a-z0-9_]{0,8}",
            upper in "[A-Z ]",
            suffix in "[a-z0-9_]{0,8}",
        ) {
            let category = format!("{prefix}{upper}{suffix}");
            let result = found(&category, entry("item"));
            prop_assert!(ResultValidator::validate(&result, "item").is_err());
        }
    }
}
