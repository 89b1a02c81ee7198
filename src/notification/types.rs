use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain event handed to [`publish`](super::NotificationOrchestrator::publish).
///
/// `id` and `triggered_at` are optional on the way in; they are filled with a
/// fresh UUID and the current time when the event is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Caller-supplied identifier, reused on re-delivery to keep publish idempotent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// When the domain change happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    /// Event type and payload
    #[serde(flatten)]
    pub kind: EventKind,
}

impl NotificationEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: None,
            triggered_at: None,
            kind,
        }
    }

    /// Set the event ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the trigger timestamp
    pub fn triggered_at(mut self, at: DateTime<Utc>) -> Self {
        self.triggered_at = Some(at);
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Fill in the id and timestamp
    pub(crate) fn normalize(self) -> PublishedEvent {
        PublishedEvent {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            triggered_at: self.triggered_at.unwrap_or_else(Utc::now),
            kind: self.kind,
        }
    }
}

impl From<EventKind> for NotificationEvent {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

/// An event after normalization; immutable from here on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEvent {
    pub id: String,
    pub triggered_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl PublishedEvent {
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// The event payload as JSON, as sent in webhook envelopes
    pub fn data(&self) -> serde_json::Value {
        self.kind.data()
    }
}

/// Every event type the engine understands, with its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventKind {
    #[serde(rename = "beneficiary.created")]
    BeneficiaryCreated(BeneficiaryCreated),
    #[serde(rename = "enrollment.created")]
    EnrollmentCreated(EnrollmentCreated),
    #[serde(rename = "enrollment.status_changed")]
    EnrollmentStatusChanged(EnrollmentStatusChanged),
    #[serde(rename = "consent.updated")]
    ConsentUpdated(ConsentUpdated),
    #[serde(rename = "action_item.due_soon")]
    ActionItemDueSoon(ActionItemDueSoon),
    #[serde(rename = "action_item.overdue")]
    ActionItemOverdue(ActionItemOverdue),
    #[serde(rename = "auth.password_reset_requested")]
    PasswordResetRequested(PasswordResetRequested),
    #[serde(rename = "form_submission.created")]
    FormSubmissionCreated(FormSubmissionCreated),
}

impl EventKind {
    /// Wire name of the event type (e.g. "enrollment.created")
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::BeneficiaryCreated(_) => "beneficiary.created",
            EventKind::EnrollmentCreated(_) => "enrollment.created",
            EventKind::EnrollmentStatusChanged(_) => "enrollment.status_changed",
            EventKind::ConsentUpdated(_) => "consent.updated",
            EventKind::ActionItemDueSoon(_) => "action_item.due_soon",
            EventKind::ActionItemOverdue(_) => "action_item.overdue",
            EventKind::PasswordResetRequested(_) => "auth.password_reset_requested",
            EventKind::FormSubmissionCreated(_) => "form_submission.created",
        }
    }

    /// Payload only, without the type tag
    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut tagged| tagged.get_mut("data").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeneficiaryCreated {
    pub beneficiary_id: String,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentCreated {
    pub enrollment_id: String,
    pub beneficiary_id: String,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    pub program_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentStatusChanged {
    pub enrollment_id: String,
    pub beneficiary_id: String,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    pub program_name: String,
    pub previous_status: String,
    pub new_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentUpdated {
    pub beneficiary_id: String,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    /// Consent purpose, e.g. "image_use" or "data_sharing"
    pub consent_type: String,
    pub granted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemDueSoon {
    pub action_item_id: String,
    pub title: String,
    pub beneficiary_id: String,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemOverdue {
    pub action_item_id: String,
    pub title: String,
    pub beneficiary_id: String,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    pub due_at: DateTime<Utc>,
    pub overdue_by_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequested {
    pub user_id: String,
    /// The only address this event may be sent to
    pub email: String,
    pub reset_url: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionCreated {
    pub submission_id: String,
    pub form_id: String,
    #[serde(default)]
    pub beneficiary_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn overdue() -> EventKind {
        EventKind::ActionItemOverdue(ActionItemOverdue {
            action_item_id: "ai-1".to_string(),
            title: "Visita domiciliar".to_string(),
            beneficiary_id: "b-42".to_string(),
            beneficiary_name: None,
            due_at: Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap(),
            overdue_by_days: 4,
        })
    }

    #[test]
    fn test_normalize_fills_missing_fields() {
        let before = Utc::now();
        let published = NotificationEvent::new(overdue()).normalize();

        assert!(Uuid::parse_str(&published.id).is_ok());
        assert!(published.triggered_at >= before);
        assert_eq!(published.event_type(), "action_item.overdue");
    }

    #[test]
    fn test_normalize_keeps_caller_fields() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let published = NotificationEvent::new(overdue())
            .with_id("evt-7")
            .triggered_at(at)
            .normalize();

        assert_eq!(published.id, "evt-7");
        assert_eq!(published.triggered_at, at);

        // Blank ids are treated as absent
        let published = NotificationEvent::new(overdue()).with_id("  ").normalize();
        assert_ne!(published.id, "  ");
    }

    #[test]
    fn test_deserialize_wire_shape() {
        let event: NotificationEvent = serde_json::from_value(json!({
            "id": "evt-1",
            "type": "action_item.overdue",
            "data": {
                "actionItemId": "ai-1",
                "title": "Visita domiciliar",
                "beneficiaryId": "b-42",
                "beneficiaryName": null,
                "dueAt": "2026-05-10T00:00:00Z",
                "overdueByDays": 4
            }
        }))
        .unwrap();

        assert_eq!(event.id.as_deref(), Some("evt-1"));
        assert_eq!(event.triggered_at, None);
        assert_eq!(event.kind, overdue());
    }

    #[test]
    fn test_data_strips_type_tag() {
        let data = overdue().data();
        assert_eq!(data["overdueByDays"], 4);
        assert_eq!(data["beneficiaryName"], serde_json::Value::Null);
        assert!(data.get("type").is_none());
    }
}
