mod settings;

pub use settings::{
    NotificationConfig, OtelConfig, QueueConfig, Settings, ShutdownSettings, SubscriptionConfig,
    WebhookConfig,
};
