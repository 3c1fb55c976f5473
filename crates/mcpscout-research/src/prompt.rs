//! Prompt construction and response envelope parsing

use mcpscout_utils::error::ResearchError;
use mcpscout_utils::types::{CategoryHint, ResearchResult};

use crate::types::ResearchRequest;

const ENVELOPE_INSTRUCTIONS: &str = r#"Reply with a single JSON object and nothing else:
{
  "is_found": true | false,
  "category": "<lowercase_snake_case category key>",
  "category_description": "<one sentence, only when asked to propose a category>",
  "formatted_entry": "<YAML list item starting with '- id:' naming exactly id, name, provider, description>",
  "unresolved_report": "<markdown explaining what could not be determined, when is_found is false>"
}"#;

/// System prompt: the caller's rules followed by the envelope contract
#[must_use]
pub fn system_prompt(rules_text: &str) -> String {
    let rules = rules_text.trim();
    if rules.is_empty() {
        ENVELOPE_INSTRUCTIONS.to_string()
    } else {
        format!("{rules}\n\n{ENVELOPE_INSTRUCTIONS}")
    }
}

/// User prompt describing the item and what is expected of the category
#[must_use]
pub fn user_prompt(request: &ResearchRequest) -> String {
    let descriptor = &request.descriptor;
    let mut prompt = format!(
        "Research the MCP server `{}`.\n\nEndpoint: {}\nTransport: {}\n",
        request.item_key, descriptor.url, descriptor.transport
    );

    match &request.category_hint {
        CategoryHint::Known(info) => {
            prompt.push_str(&format!(
                "\nThe category is already known: `{}` ({}). Use it as is.\n",
                info.category, info.description
            ));
        }
        CategoryHint::NewPrefix { prefix } => {
            prompt.push_str(&format!(
                "\nThe prefix `{prefix}` has no category yet. Propose a category key and a one sentence category_description.\n"
            ));
            if !request.known_categories.is_empty() {
                prompt.push_str(&format!(
                    "Reuse one of these keys if it fits: {}\n",
                    request.known_categories.join(", ")
                ));
            }
        }
    }

    prompt.push_str(&format!(
        "\nThe entry id must be exactly `{}`.\n",
        request.item_key
    ));
    prompt
}

/// Extract the JSON envelope from model text.
///
/// Accepts a bare object, an object inside a fenced code block, or an object
/// surrounded by prose.
///
/// # Errors
///
/// Returns [`ResearchError::MalformedEnvelope`] when no object can be parsed.
pub fn parse_envelope(text: &str) -> Result<ResearchResult, ResearchError> {
    let candidate = fenced_block(text).unwrap_or(text);
    let start = candidate.find('{');
    let end = candidate.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ResearchError::MalformedEnvelope(
            "response contains no JSON object".to_string(),
        ));
    };
    if end < start {
        return Err(ResearchError::MalformedEnvelope(
            "response contains no JSON object".to_string(),
        ));
    }

    serde_json::from_str(&candidate[start..=end])
        .map_err(|e| ResearchError::MalformedEnvelope(e.to_string()))
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpscout_utils::types::{CategoryInfo, ItemDescriptor};

    fn request(hint: CategoryHint) -> ResearchRequest {
        ResearchRequest::new(
            "brave-search-mcp",
            ItemDescriptor::new("https://brave.example/sse"),
            "Be concise.",
            hint,
        )
    }

    #[test]
    fn test_known_category_is_stated() {
        let prompt = user_prompt(&request(CategoryHint::Known(CategoryInfo {
            category: "search".into(),
            description: "Web search".into(),
        })));
        assert!(prompt.contains("`search`"));
        assert!(prompt.contains("exactly `brave-search-mcp`"));
    }

    #[test]
    fn test_new_prefix_asks_for_category() {
        let prompt = user_prompt(
            &request(CategoryHint::NewPrefix {
                prefix: "brave".into(),
            })
            .with_known_categories(vec!["search".into(), "storage".into()]),
        );
        assert!(prompt.contains("prefix `brave`"));
        assert!(prompt.contains("search, storage"));
    }

    #[test]
    fn test_system_prompt_keeps_rules_first() {
        let prompt = system_prompt("Rule one.\n");
        assert!(prompt.starts_with("Rule one.\n\nReply with"));
        assert!(system_prompt("  ").starts_with("Reply with"));
    }

    #[test]
    fn test_parse_bare_and_fenced_envelopes() {
        let bare = r#"{"is_found": false, "unresolved_report": "nothing public"}"#;
        assert_eq!(
            parse_envelope(bare).unwrap().unresolved_report,
            "nothing public"
        );

        let fenced = "Here you go:\n```json\n{\"is_found\": true, \"category\": \"search\", \"formatted_entry\": \"- id: x\"}\n```\nDone.";
        let result = parse_envelope(fenced).unwrap();
        assert!(result.is_found);
        assert_eq!(result.category, "search");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_envelope("I could not find anything."),
            Err(ResearchError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            parse_envelope("{ not json }"),
            Err(ResearchError::MalformedEnvelope(_))
        ));
        assert!(parse_envelope("} backwards {").is_err());
    }
}
