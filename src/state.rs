use std::sync::Arc;
use tracing::error;

use crate::ai::AiService;
use crate::config::{Args, LimiterScope};
use crate::error::{GateError, Result};
use crate::metrics::{MetricsRecorder, RATE_LIMIT_KEYS};
use crate::rate_limit::RateLimiter;
use crate::upstream::RetryingClient;

// The three independent limiters, built once at startup
pub struct Limiters {
    pub general: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
    pub ai: Arc<RateLimiter>,
}

impl Limiters {
    pub fn from_args(args: &Args) -> Result<Self> {
        Ok(Self {
            general: Arc::new(RateLimiter::new("general", args.general_policy()?)),
            auth: Arc::new(RateLimiter::new("auth", args.auth_policy()?)),
            ai: Arc::new(RateLimiter::new("ai", args.ai_policy()?)),
        })
    }

    fn all(&self) -> [&Arc<RateLimiter>; 3] {
        [&self.general, &self.auth, &self.ai]
    }

    pub fn tracked_keys(&self) -> usize {
        self.all().iter().map(|l| l.tracked_keys()).sum()
    }

    pub fn publish_key_count(&self) {
        RATE_LIMIT_KEYS.set(self.tracked_keys() as f64);
    }

    // Drops idle keys everywhere and refreshes the key gauge
    pub fn sweep(&self) -> usize {
        let removed = self.all().iter().map(|l| l.evict_idle()).sum();
        self.publish_key_count();
        removed
    }
}

// app's shared state
pub struct AppState {
    pub limiters: Limiters,
    pub scope: LimiterScope,
    pub recorder: Arc<MetricsRecorder>,
    // None when no API key was configured
    pub ai: Option<Arc<AiService>>,
}

impl AppState {
    pub fn from_args(args: &Args) -> Result<Self> {
        let limiters = Limiters::from_args(args)?;
        let recorder = Arc::new(MetricsRecorder::new());

        let ai = match RetryingClient::from_env_key(
            args.gemini_api_key.clone(),
            &args.gemini_base_url,
            args.retry_policy()?,
        ) {
            Ok(client) => Some(Arc::new(AiService::new(
                client.with_recorder(recorder.clone()),
                &args.flash_model,
                &args.pro_model,
            ))),
            Err(GateError::ConfigurationMissing(name)) => {
                error!("{name} is not set, AI endpoints will answer 503");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            limiters,
            scope: args.limiter_scope,
            recorder,
            ai,
        })
    }

    pub fn ai(&self) -> Result<&AiService> {
        self.ai
            .as_deref()
            .ok_or(GateError::ConfigurationMissing("GEMINI_API_KEY"))
    }
}
