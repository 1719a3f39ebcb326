//! Funnel step handlers.
//!
//! Each handler reads the identifiers earlier steps recorded, calls the
//! backend, and records its own identifier on success. Backend and storage
//! failures are logged and swallowed: the visitor always moves on to the
//! next step, with or without persistence. Only malformed form input is
//! returned as an error.

use chrono::{Local, NaiveDate, NaiveTime};
use tracing::{debug, warn};

use super::backend::{BookingRequest, ChatAnswer, FunnelBackend, ProjectOutline};
use super::steps::{FunnelStep, QuestionKey};
use crate::error::{Error, Result};
use crate::state::FunnelField;
use crate::store::FunnelStore;

/// What a step handler achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// The step that ran.
    pub step: FunnelStep,
    /// Identifier newly written to the store, if any.
    pub recorded: Option<String>,
    /// Whether the backend accepted the submission.
    pub persisted: bool,
    /// Where the visitor goes next.
    pub next: FunnelStep,
}

/// Drives the funnel steps against a store and a backend.
#[derive(Debug)]
pub struct FunnelFlow<B> {
    store: FunnelStore,
    backend: B,
    timezone: String,
}

impl<B: FunnelBackend> FunnelFlow<B> {
    /// Create a flow recording into `store`, using the local UTC offset as
    /// the booking timezone.
    #[must_use]
    pub fn new(store: FunnelStore, backend: B) -> Self {
        let timezone = Local::now().offset().to_string();
        Self {
            store,
            backend,
            timezone,
        }
    }

    /// Override the timezone sent with bookings.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// The store this flow records into.
    #[must_use]
    pub fn store(&self) -> &FunnelStore {
        &self.store
    }

    /// The backend this flow submits to.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer one chat question.
    ///
    /// Creates the chat session on the first answer and records its id;
    /// later answers reuse the recorded session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the answer is blank.
    pub async fn record_answer(&self, question: QuestionKey, answer: &str) -> Result<StepOutcome> {
        let answer = non_blank("answer", answer)?;
        let mut outcome = StepOutcome {
            step: FunnelStep::ChatRoom,
            recorded: None,
            persisted: false,
            next: FunnelStep::ChatRoom,
        };

        let session_id = if let Some(id) = self.store.session_id() {
            id
        } else {
            match self.backend.create_chat_session().await {
                Ok(session) => {
                    outcome.recorded = self.record(FunnelField::Session, &session.id);
                    session.id
                }
                Err(err) => {
                    warn!("Could not create chat session: {}", err);
                    return Ok(outcome);
                }
            }
        };

        let submission = ChatAnswer {
            session_id,
            question_key: question,
            question_text: question.prompt().to_string(),
            answer_text: answer.to_string(),
        };
        match self.backend.submit_chat_answer(submission).await {
            Ok(()) => {
                debug!("Stored answer to {}", question);
                outcome.persisted = true;
            }
            Err(err) => warn!("Could not store answer to {}: {}", question, err),
        }
        Ok(outcome)
    }

    /// Leave the chat questionnaire, marking the session completed.
    pub async fn finish_chat(&self) -> StepOutcome {
        let mut persisted = false;
        if let Some(session_id) = self.store.session_id() {
            match self.backend.complete_chat_session(&session_id).await {
                Ok(()) => persisted = true,
                Err(err) => warn!("Could not complete chat session {}: {}", session_id, err),
            }
        }
        StepOutcome {
            step: FunnelStep::ChatRoom,
            recorded: None,
            persisted,
            next: FunnelStep::Register,
        }
    }

    /// Submit the registration form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the idea description is blank.
    pub async fn register(
        &self,
        idea_description: &str,
        additional_expectations: Option<&str>,
    ) -> Result<StepOutcome> {
        let idea = non_blank("idea_description", idea_description)?;
        let expectations = additional_expectations
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let session_id = self.store.session_id();

        let mut outcome = StepOutcome {
            step: FunnelStep::Register,
            recorded: None,
            persisted: false,
            next: FunnelStep::Schedule,
        };
        match self
            .backend
            .submit_registration(session_id.as_deref(), idea, expectations)
            .await
        {
            Ok(registration) => {
                outcome.persisted = true;
                outcome.recorded = self.record(FunnelField::Registration, &registration.id);
            }
            Err(err) => warn!("Could not submit registration: {}", err),
        }
        Ok(outcome)
    }

    /// Book `date` (and optionally a time slot), judged against today's
    /// local date.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `date` is in the past.
    pub async fn schedule(&self, date: NaiveDate, time: Option<NaiveTime>) -> Result<StepOutcome> {
        self.schedule_from(Local::now().date_naive(), date, time).await
    }

    /// Book `date` as seen from `today`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `date` is before `today`.
    pub async fn schedule_from(
        &self,
        today: NaiveDate,
        date: NaiveDate,
        time: Option<NaiveTime>,
    ) -> Result<StepOutcome> {
        if date < today {
            return Err(Error::invalid_input(
                "booking_date",
                format!("{date} is before {today}"),
            ));
        }

        let request = BookingRequest {
            registration_id: self.store.registration_id(),
            date,
            time,
            timezone: self.timezone.clone(),
        };

        let mut outcome = StepOutcome {
            step: FunnelStep::Schedule,
            recorded: None,
            persisted: false,
            next: FunnelStep::ProjectOutline,
        };
        match self.backend.create_booking(request).await {
            Ok(booking) => {
                outcome.persisted = true;
                outcome.recorded = self.record(FunnelField::Booking, &booking.id);
            }
            Err(err) => warn!("Could not create booking for {}: {}", date, err),
        }
        Ok(outcome)
    }

    /// Fetch the outline for the recorded registration, if there is one.
    pub async fn outline(&self) -> Option<ProjectOutline> {
        let registration_id = self.store.registration_id()?;
        match self.backend.project_outline(&registration_id).await {
            Ok(outline) => Some(outline),
            Err(err) => {
                warn!("No outline for registration {}: {}", registration_id, err);
                None
            }
        }
    }

    fn record(&self, field: FunnelField, id: &str) -> Option<String> {
        // The store already logs the failure; the visitor carries on.
        self.store.set(field, id).ok().map(|()| id.to_string())
    }
}

fn non_blank<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::invalid_input(field, "must not be empty"))
    } else {
        Ok(trimmed)
    }
}
