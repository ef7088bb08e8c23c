use serde::{Deserialize, Serialize};

use crate::types::Message;
use crate::{Error, Result};

/// A user's rating of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rating {
    /// Overall score from 1 to 10.
    pub overall_rating: u8,

    /// Optional free-text comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Rating {
    /// Create a new `Rating`, rejecting scores outside 1..=10.
    pub fn new(overall_rating: u8, comment: Option<String>) -> Result<Self> {
        if !(1..=10).contains(&overall_rating) {
            return Err(Error::validation(
                format!("overall rating must be between 1 and 10, got {overall_rating}"),
                Some("overall_rating".to_string()),
            ));
        }
        let comment = comment.filter(|c| !c.trim().is_empty());
        Ok(Self {
            overall_rating,
            comment,
        })
    }
}

/// Feedback about a conversation, sent to the telemetry endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRequest {
    /// Opaque id of the person giving feedback.
    pub user_id: String,

    /// The rating.
    pub rating: Rating,

    /// The transcript being rated.
    pub messages: Vec<Message>,
}

impl FeedbackRequest {
    /// Create a new validated `FeedbackRequest`.
    pub fn new(user_id: impl Into<String>, rating: Rating, messages: Vec<Message>) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(Error::validation(
                "user id must not be empty",
                Some("user_id".to_string()),
            ));
        }
        if messages.is_empty() {
            return Err(Error::validation(
                "feedback needs at least one message",
                Some("messages".to_string()),
            ));
        }
        Ok(Self {
            user_id,
            rating,
            messages,
        })
    }
}

/// Acknowledgement from the telemetry endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackResponse {
    /// `"ok"` when the feedback was stored.
    pub result: String,
}

impl FeedbackResponse {
    /// Returns true if the service accepted the feedback.
    pub fn is_ok(&self) -> bool {
        self.result == "ok"
    }
}
