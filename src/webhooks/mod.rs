//! Webhook subscription registry.
//!
//! An in-memory directory from event type to subscriber endpoints. The
//! registry lives on the orchestrator instance; subscriptions stay until
//! explicitly removed and are lost on restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::RegistryError;

/// Event type that matches every event
pub const WILDCARD_EVENT: &str = "*";

/// A subscriber endpoint for one event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub event_type: String,
    pub url: String,
    /// Signing secret; overrides the process-wide default when set
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WebhookSubscription {
    pub fn matches(&self, event_type: &str) -> bool {
        self.event_type == WILDCARD_EVENT || self.event_type == event_type
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<Uuid, WebhookSubscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. `url` must be an absolute http(s) URL.
    pub fn register(
        &self,
        event_type: impl Into<String>,
        url: impl Into<String>,
        secret: Option<String>,
    ) -> Result<WebhookSubscription, RegistryError> {
        let event_type = event_type.into().trim().to_string();
        if event_type.is_empty() {
            return Err(RegistryError::EmptyEventType);
        }

        let url = url.into();
        let parsed = reqwest::Url::parse(&url).map_err(|e| RegistryError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUrl {
                url,
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let subscription = WebhookSubscription {
            id: Uuid::new_v4(),
            event_type,
            url,
            secret: secret.filter(|s| !s.is_empty()),
            created_at: Utc::now(),
        };
        self.subscriptions
            .insert(subscription.id, subscription.clone());

        tracing::info!(
            subscription_id = %subscription.id,
            event_type = %subscription.event_type,
            url = %subscription.url,
            signed = subscription.has_secret(),
            "Webhook subscription registered"
        );

        Ok(subscription)
    }

    /// Remove a subscription; returns false if it did not exist
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.subscriptions.remove(&id).is_some();
        if removed {
            tracing::info!(subscription_id = %id, "Webhook subscription removed");
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<WebhookSubscription> {
        self.subscriptions.get(&id).map(|s| s.clone())
    }

    /// All subscriptions, oldest first
    pub fn list(&self) -> Vec<WebhookSubscription> {
        let mut subscriptions: Vec<_> = self
            .subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sort_by_age(&mut subscriptions);
        subscriptions
    }

    /// Subscriptions that should receive `event_type`, oldest first
    pub fn for_event(&self, event_type: &str) -> Vec<WebhookSubscription> {
        let mut subscriptions: Vec<_> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.matches(event_type))
            .map(|entry| entry.value().clone())
            .collect();
        sort_by_age(&mut subscriptions);
        subscriptions
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

fn sort_by_age(subscriptions: &mut [WebhookSubscription]) {
    subscriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = SubscriptionRegistry::new();
        let sub = registry
            .register("enrollment.created", "https://crm.example.org/hooks", Some("k".into()))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(sub.id), Some(sub.clone()));
        assert_eq!(registry.for_event("enrollment.created"), vec![sub]);
        assert!(registry.for_event("consent.updated").is_empty());
    }

    #[test]
    fn test_wildcard_matches_everything() {
        let registry = SubscriptionRegistry::new();
        registry
            .register(WILDCARD_EVENT, "https://audit.example.org/all", None)
            .unwrap();
        registry
            .register("consent.updated", "https://crm.example.org/consent", None)
            .unwrap();

        assert_eq!(registry.for_event("consent.updated").len(), 2);
        assert_eq!(registry.for_event("enrollment.created").len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = SubscriptionRegistry::new();
        let sub = registry
            .register("enrollment.created", "http://localhost:9000/hook", None)
            .unwrap();

        assert!(registry.remove(sub.id));
        assert!(!registry.remove(sub.id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rejects_invalid_input() {
        let registry = SubscriptionRegistry::new();

        assert_eq!(
            registry.register("  ", "https://x.org", None),
            Err(RegistryError::EmptyEventType)
        );
        assert!(matches!(
            registry.register("a.b", "not a url", None),
            Err(RegistryError::InvalidUrl { .. })
        ));
        assert!(matches!(
            registry.register("a.b", "ftp://files.example.org", None),
            Err(RegistryError::InvalidUrl { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_secret_treated_as_none() {
        let registry = SubscriptionRegistry::new();
        let sub = registry
            .register("a.b", "https://x.org/hook", Some(String::new()))
            .unwrap();
        assert!(!sub.has_secret());

        let json = serde_json::to_value(&sub).unwrap();
        assert!(json.get("secret").is_none());
        assert_eq!(json["eventType"], "a.b");
    }
}
