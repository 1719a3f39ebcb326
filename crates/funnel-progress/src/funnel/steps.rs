//! The ordered funnel steps and the chat questionnaire.

use serde::{Deserialize, Serialize};

use crate::state::{FunnelField, FunnelState};

/// One page of the lead-qualification funnel, in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStep {
    /// Marketing landing page.
    Landing,
    /// AI-workshop chat questionnaire.
    ChatRoom,
    /// Idea-description registration form.
    Register,
    /// Calendar booking.
    Schedule,
    /// Generated project outline.
    ProjectOutline,
    /// Booking confirmation.
    Booked,
}

impl FunnelStep {
    /// All steps in visiting order.
    pub const ALL: [Self; 6] = [
        Self::Landing,
        Self::ChatRoom,
        Self::Register,
        Self::Schedule,
        Self::ProjectOutline,
        Self::Booked,
    ];

    /// Route path of the step's page.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::ChatRoom => "/chat-room",
            Self::Register => "/register",
            Self::Schedule => "/schedule",
            Self::ProjectOutline => "/project-outline-2",
            Self::Booked => "/booked",
        }
    }

    /// Look a step up by its route path.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.path() == path)
    }

    /// The step that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let index = Self::ALL.iter().position(|step| *step == self)?;
        Self::ALL.get(index + 1).copied()
    }

    /// The identifier this step consumes from earlier steps.
    #[must_use]
    pub fn reads(self) -> Option<FunnelField> {
        match self {
            Self::Register => Some(FunnelField::Session),
            Self::Schedule | Self::ProjectOutline => Some(FunnelField::Registration),
            Self::Landing | Self::ChatRoom | Self::Booked => None,
        }
    }

    /// The identifier this step records once it succeeds.
    #[must_use]
    pub fn produces(self) -> Option<FunnelField> {
        match self {
            Self::ChatRoom => Some(FunnelField::Session),
            Self::Register => Some(FunnelField::Registration),
            Self::Schedule => Some(FunnelField::Booking),
            Self::Landing | Self::ProjectOutline | Self::Booked => None,
        }
    }

    /// The latest step whose identifier is recorded in `state`.
    ///
    /// Fields are independent, so a booking alone still reports
    /// [`FunnelStep::Schedule`].
    #[must_use]
    pub fn furthest_recorded(state: &FunnelState) -> Option<Self> {
        Self::ALL
            .into_iter()
            .rev()
            .find(|step| step.produces().is_some_and(|field| state.get(field).is_some()))
    }
}

impl std::fmt::Display for FunnelStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Landing => "landing",
            Self::ChatRoom => "chat-room",
            Self::Register => "register",
            Self::Schedule => "schedule",
            Self::ProjectOutline => "project-outline",
            Self::Booked => "booked",
        };
        f.write_str(name)
    }
}

/// A question in the chat questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKey {
    /// The problem being solved.
    Problem,
    /// The intended user.
    TargetUser,
    /// Must-have features for a first release.
    MvpFeatures,
    /// Launch timeline.
    Timeline,
}

impl QuestionKey {
    /// All questions in display order.
    pub const ALL: [Self; 4] = [
        Self::Problem,
        Self::TargetUser,
        Self::MvpFeatures,
        Self::Timeline,
    ];

    /// Stable key used when persisting answers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Problem => "problem",
            Self::TargetUser => "target_user",
            Self::MvpFeatures => "mvp_features",
            Self::Timeline => "timeline",
        }
    }

    /// Prompt shown to the visitor.
    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Problem => "What problem are you solving?",
            Self::TargetUser => "Who is your target user?",
            Self::MvpFeatures => "What features are essential for MVP?",
            Self::Timeline => "What is your launch timeline?",
        }
    }
}

impl std::fmt::Display for QuestionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
