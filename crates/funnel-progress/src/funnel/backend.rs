//! The hosted persistence service behind the funnel pages.
//!
//! The service is a black box: each call either returns a record carrying
//! an identifier or fails. Implementations live outside this crate.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::steps::QuestionKey;

/// Errors reported by a [`FunnelBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The service could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The service rejected the request.
    #[error("backend rejected request: {0}")]
    Rejected(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A newly created chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Session identifier.
    pub id: String,
}

/// A recorded answer to one chat question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    /// Session the answer belongs to.
    pub session_id: String,
    /// Which question was answered.
    pub question_key: QuestionKey,
    /// Prompt as shown to the visitor.
    pub question_text: String,
    /// Trimmed answer text.
    pub answer_text: String,
}

/// A submitted registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration identifier.
    pub id: String,
}

/// Fields submitted with a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Registration the booking follows, if one was recorded.
    pub registration_id: Option<String>,
    /// Chosen calendar day.
    pub date: NaiveDate,
    /// Chosen time slot, if the calendar offered one.
    pub time: Option<NaiveTime>,
    /// Visitor's timezone.
    pub timezone: String,
}

/// A confirmed booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier.
    pub id: String,
}

/// The latest project outline generated for a registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectOutline {
    /// Registration the outline was generated for.
    pub registration_id: String,
    /// Outline revision; higher is newer.
    pub version: u32,
    /// Outline body as produced by the service.
    pub content: serde_json::Value,
}

/// Remote persistence used by the funnel pages.
#[async_trait::async_trait]
pub trait FunnelBackend: Send + Sync {
    /// Start a new chat session.
    async fn create_chat_session(&self) -> BackendResult<ChatSession>;

    /// Store an answer, replacing any earlier answer to the same question
    /// in the same session.
    async fn submit_chat_answer(&self, answer: ChatAnswer) -> BackendResult<()>;

    /// Mark a chat session as completed.
    async fn complete_chat_session(&self, session_id: &str) -> BackendResult<()>;

    /// Submit the registration form.
    async fn submit_registration(
        &self,
        session_id: Option<&str>,
        idea_description: &str,
        additional_expectations: Option<&str>,
    ) -> BackendResult<Registration>;

    /// Book a calendar slot.
    async fn create_booking(&self, request: BookingRequest) -> BackendResult<Booking>;

    /// Fetch the newest outline for a registration.
    async fn project_outline(&self, registration_id: &str) -> BackendResult<ProjectOutline>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        assert_eq!(
            BackendError::Unavailable("timeout".to_string()).to_string(),
            "backend unavailable: timeout"
        );
        assert!(BackendError::Rejected("bad".to_string())
            .to_string()
            .contains("rejected"));
        assert!(BackendError::NotFound("outline".to_string())
            .to_string()
            .contains("outline"));
    }

    #[test]
    fn test_chat_answer_serializes_question_key() {
        let answer = ChatAnswer {
            session_id: "s1".to_string(),
            question_key: QuestionKey::TargetUser,
            question_text: QuestionKey::TargetUser.prompt().to_string(),
            answer_text: "Founders".to_string(),
        };
        let json = serde_json::to_string(&answer).unwrap();
        assert!(json.contains(r#""question_key":"target_user""#));
    }
}
