mod ai;
mod health;
mod metrics;
mod performance;

pub use ai::{ai_health_handler, code_suggestions_handler, criteria_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use performance::{reset_stats_handler, stats_handler, track_performance};
