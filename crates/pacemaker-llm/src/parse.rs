use std::collections::HashSet;

use serde::Deserialize;

use pacemaker_core::types::LlmDecision;

use crate::error::LlmError;

#[derive(Debug, Deserialize)]
struct ReplyShape {
    messages: Vec<String>,
    thinking: String,
    #[serde(default)]
    mentions: Option<HashSet<String>>,
}

#[derive(Debug, Deserialize)]
struct NoReplyShape {
    reason: String,
    thinking: String,
}

/// Strip a leading/trailing Markdown code-fence (```` ``` ```` or ```` ```json ````)
/// if present, as spec §4.2 step 3 requires before attempting JSON decode.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Attempt to parse model output into an [`LlmDecision`]. Tries the reply
/// shape first, then the no-reply shape, in line with the two shapes the
/// prompt instructs the model to use.
pub fn parse_decision(text: &str) -> Result<LlmDecision, LlmError> {
    let stripped = strip_code_fence(text);

    if let Ok(reply) = serde_json::from_str::<ReplyShape>(stripped) {
        if reply.messages.is_empty() {
            return Err(LlmError::ParseError("reply shape with empty messages".into()));
        }
        return Ok(LlmDecision::Reply {
            messages: reply.messages,
            thinking: reply.thinking,
            mentions: reply.mentions,
        });
    }

    if let Ok(no_reply) = serde_json::from_str::<NoReplyShape>(stripped) {
        return Ok(LlmDecision::NoReply {
            reason: no_reply.reason,
            thinking: no_reply.thinking,
        });
    }

    Err(LlmError::ParseError(format!(
        "response matched neither the reply nor no-reply shape: {stripped}"
    )))
}

/// Raw-text fallback (spec §4.2 step 3): when even the reformat retry fails
/// to parse, treat the raw text as a single reply message.
pub fn fallback_decision(raw_text: &str) -> LlmDecision {
    LlmDecision::Reply {
        messages: vec![raw_text.trim().to_string()],
        thinking: "format fallback".to_string(),
        mentions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_code_fence() {
        let text = "```json\n{\"reason\":\"x\",\"thinking\":\"y\"}\n```";
        assert_eq!(strip_code_fence(text), "{\"reason\":\"x\",\"thinking\":\"y\"}");
    }

    #[test]
    fn strips_bare_code_fence() {
        let text = "```\n{\"reason\":\"x\",\"thinking\":\"y\"}\n```";
        assert_eq!(strip_code_fence(text), "{\"reason\":\"x\",\"thinking\":\"y\"}");
    }

    #[test]
    fn parses_reply_shape() {
        let text = r#"{"messages": ["hi"], "thinking": "because"}"#;
        let decision = parse_decision(text).unwrap();
        assert!(matches!(decision, LlmDecision::Reply { .. }));
    }

    #[test]
    fn parses_no_reply_shape() {
        let text = r#"{"reason": "nothing to add", "thinking": "because"}"#;
        let decision = parse_decision(text).unwrap();
        assert!(matches!(decision, LlmDecision::NoReply { .. }));
    }

    #[test]
    fn empty_messages_is_a_parse_error() {
        let text = r#"{"messages": [], "thinking": "because"}"#;
        assert!(parse_decision(text).is_err());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_decision("not json at all").is_err());
    }

    #[test]
    fn fallback_wraps_raw_text_as_single_message() {
        let decision = fallback_decision("  plain text reply  ");
        match decision {
            LlmDecision::Reply { messages, thinking, .. } => {
                assert_eq!(messages, vec!["plain text reply".to_string()]);
                assert_eq!(thinking, "format fallback");
            }
            _ => panic!("expected Reply"),
        }
    }
}
