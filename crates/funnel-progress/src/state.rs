//! Core funnel state types.
//!
//! A [`FunnelState`] carries the three identifiers produced by successive
//! funnel steps. Each field is independently optional: a visitor may land
//! directly on a later step without having completed the earlier ones.

use serde::{Deserialize, Serialize};

/// One of the identifiers tracked by the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelField {
    /// Chat questionnaire session.
    Session,
    /// Submitted registration form.
    Registration,
    /// Confirmed calendar booking.
    Booking,
}

impl FunnelField {
    /// All fields in funnel order.
    pub const ALL: [Self; 3] = [Self::Session, Self::Registration, Self::Booking];
}

impl std::fmt::Display for FunnelField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Registration => write!(f, "registration"),
            Self::Booking => write!(f, "booking"),
        }
    }
}

/// Progress recorded so far in the funnel.
///
/// Serialized as `{"sessionId": .., "registrationId": .., "bookingId": ..}`
/// with `null` for unset fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelState {
    /// Set once a chat session has been created.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Set once the registration form has been submitted.
    #[serde(default)]
    pub registration_id: Option<String>,
    /// Set once a booking has been confirmed.
    #[serde(default)]
    pub booking_id: Option<String>,
}

impl FunnelState {
    /// Get the identifier stored for `field`, if any.
    #[must_use]
    pub fn get(&self, field: FunnelField) -> Option<&str> {
        match field {
            FunnelField::Session => self.session_id.as_deref(),
            FunnelField::Registration => self.registration_id.as_deref(),
            FunnelField::Booking => self.booking_id.as_deref(),
        }
    }

    /// Return a copy of this state with `field` set to `id`.
    ///
    /// No other field is touched.
    #[must_use]
    pub fn with(&self, field: FunnelField, id: impl Into<String>) -> Self {
        let mut next = self.clone();
        let slot = match field {
            FunnelField::Session => &mut next.session_id,
            FunnelField::Registration => &mut next.registration_id,
            FunnelField::Booking => &mut next.booking_id,
        };
        *slot = Some(id.into());
        next
    }

    /// Check if no identifier has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        FunnelField::ALL.iter().all(|field| self.get(*field).is_none())
    }

    /// Parse a persisted payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object of the expected shape.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        // Derived deserialization would also fill the fields from an array.
        match serde_json::from_str::<serde_json::Value>(raw)? {
            value @ serde_json::Value::Object(_) => Ok(serde_json::from_value(value)?),
            _ => Err(crate::Error::invalid_input(
                "payload",
                "expected a JSON object",
            )),
        }
    }

    /// Serialize to the persisted payload format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        let state = FunnelState::default();
        assert!(state.is_empty());
        for field in FunnelField::ALL {
            assert!(state.get(field).is_none());
        }
    }

    #[test]
    fn test_with_sets_only_target_field() {
        let state = FunnelState::default().with(FunnelField::Registration, "r1");
        assert_eq!(state.get(FunnelField::Registration), Some("r1"));
        assert!(state.session_id.is_none());
        assert!(state.booking_id.is_none());
        assert!(!state.is_empty());
    }

    #[test]
    fn test_with_overwrites_existing_value() {
        let state = FunnelState::default()
            .with(FunnelField::Session, "s1")
            .with(FunnelField::Session, "s2");
        assert_eq!(state.session_id.as_deref(), Some("s2"));
    }

    #[test]
    fn test_json_uses_camel_case_and_nulls() {
        let state = FunnelState::default().with(FunnelField::Session, "s1");
        let json = state.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"sessionId":"s1","registrationId":null,"bookingId":null}"#
        );
    }

    #[test]
    fn test_from_json_tolerates_missing_fields() {
        let state = FunnelState::from_json(r#"{"bookingId":"b9"}"#).unwrap();
        assert_eq!(state.booking_id.as_deref(), Some("b9"));
        assert!(state.session_id.is_none());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(FunnelState::from_json("{not json").is_err());
        assert!(FunnelState::from_json("[1,2,3]").is_err());
        assert!(FunnelState::from_json(r#"{"sessionId":42}"#).is_err());
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(FunnelState::from_json(r#"["s1",null,null]"#).is_err());
        assert!(FunnelState::from_json(r#"["s1",null,"b1"]"#).is_err());
        assert!(FunnelState::from_json("null").is_err());
        assert!(FunnelState::from_json(r#""s1""#).is_err());
    }

    #[test]
    fn test_field_display() {
        assert_eq!(FunnelField::Session.to_string(), "session");
        assert_eq!(FunnelField::Registration.to_string(), "registration");
        assert_eq!(FunnelField::Booking.to_string(), "booking");
    }
}
