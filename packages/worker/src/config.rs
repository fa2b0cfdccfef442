use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

pub const DEFAULT_CHANGE_EVENT_ACTION: &str = "action-create-event@1.0.0";

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Fan-out bound for trigger enqueue, marker propagation and
    /// type-trigger re-registration.
    pub reaction_concurrency: usize,
    /// `slug@version` of the action that records change events.
    pub change_event_action: String,
    pub tick_interval: Duration,
    pub poll_interval: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();

        Ok(Self {
            worker_id: env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            reaction_concurrency: match env::var("WORKER_REACTION_CONCURRENCY") {
                Ok(raw) => raw
                    .parse::<usize>()
                    .context("WORKER_REACTION_CONCURRENCY must be a valid number")?
                    .max(1),
                Err(_) => defaults.reaction_concurrency,
            },
            change_event_action: env::var("WORKER_CHANGE_EVENT_ACTION")
                .unwrap_or(defaults.change_event_action),
            tick_interval: match env::var("WORKER_TICK_INTERVAL_SECS") {
                Ok(raw) => Duration::from_secs(
                    raw.parse()
                        .context("WORKER_TICK_INTERVAL_SECS must be a valid number")?,
                ),
                Err(_) => defaults.tick_interval,
            },
            poll_interval: match env::var("WORKER_POLL_INTERVAL_MS") {
                Ok(raw) => Duration::from_millis(
                    raw.parse()
                        .context("WORKER_POLL_INTERVAL_MS must be a valid number")?,
                ),
                Err(_) => defaults.poll_interval,
            },
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            reaction_concurrency: 3,
            change_event_action: DEFAULT_CHANGE_EVENT_ACTION.to_string(),
            tick_interval: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
        }
    }
}
