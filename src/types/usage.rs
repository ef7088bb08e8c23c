use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Token accounting reported by the service.
///
/// Usage is informational: it is attached to a finished turn but never
/// changes the conversation itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// The number of tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,

    /// The number of tokens in the completion.
    #[serde(default)]
    pub completion_tokens: u32,

    /// The total number of tokens.
    #[serde(default)]
    pub total_tokens: u32,

    /// Per-category breakdown of the prompt tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<BTreeMap<String, u32>>,
}

impl Usage {
    /// Create a new `Usage` with the given prompt and completion tokens.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            prompt_tokens_details: None,
        }
    }

    /// Set the prompt token breakdown.
    pub fn with_prompt_tokens_details(mut self, details: BTreeMap<String, u32>) -> Self {
        self.prompt_tokens_details = Some(details);
        self
    }

    /// Add another turn's counts to this running total.
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn usage_minimal() {
        let usage = Usage::new(114, 514);
        assert_eq!(
            to_value(&usage).unwrap(),
            json!({
                "prompt_tokens": 114,
                "completion_tokens": 514,
                "total_tokens": 628
            })
        );
    }

    #[test]
    fn usage_defaults_missing_counts() {
        let usage: Usage = serde_json::from_value(json!({"total_tokens": 7})).unwrap();
        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_tokens, 7);
        assert!(usage.prompt_tokens_details.is_none());
    }

    #[test]
    fn usage_details() {
        let usage: Usage = serde_json::from_value(json!({
            "prompt_tokens": 10,
            "completion_tokens": 5,
            "total_tokens": 15,
            "prompt_tokens_details": {"cached_tokens": 4}
        }))
        .unwrap();
        assert_eq!(
            usage.prompt_tokens_details.unwrap().get("cached_tokens"),
            Some(&4)
        );
    }

    #[test]
    fn accumulate_sums_counts() {
        let mut total = Usage::default();
        total.accumulate(&Usage::new(10, 5));
        total.accumulate(&Usage::new(1, 2));
        assert_eq!(total.prompt_tokens, 11);
        assert_eq!(total.completion_tokens, 7);
        assert_eq!(total.total_tokens, 18);
    }
}
