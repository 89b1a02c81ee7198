// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Delivery engine
pub mod channels;
pub mod notification;
pub mod queue;
pub mod webhooks;

// Supporting modules
pub mod shutdown;
