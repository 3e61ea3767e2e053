mod health;
mod metrics;
mod notifications;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use notifications::notifications_handler;
