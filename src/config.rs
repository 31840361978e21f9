use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::error::{GateError, Result};
use crate::rate_limit::WindowPolicy;
use crate::upstream::RetryPolicy;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// Which limiters gate which routes
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimiterScope {
    // general limiter everywhere, AI and auth limiters on their own routes
    #[default]
    PerRoute,
    // AI limiter on every route
    Global,
}

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "taskboard-gate")]
#[command(about = "Admission control and upstream resilience for the task board API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8001)]
    pub port: u16,

    // General API limiter
    #[arg(long, env = "GENERAL_RATE_LIMIT", default_value_t = 100)]
    pub general_max_requests: u32,
    #[arg(long, env = "GENERAL_RATE_WINDOW", default_value_t = 60)]
    pub general_window_secs: u64,

    // Authentication endpoints limiter
    #[arg(long, env = "AUTH_RATE_LIMIT", default_value_t = 20)]
    pub auth_max_requests: u32,
    #[arg(long, env = "AUTH_RATE_WINDOW", default_value_t = 300)]
    pub auth_window_secs: u64,

    // AI endpoints limiter
    #[arg(long, env = "AI_RATE_LIMIT", default_value_t = 10)]
    pub ai_max_requests: u32,
    #[arg(long, env = "AI_RATE_WINDOW", default_value_t = 60)]
    pub ai_window_secs: u64,

    #[arg(long, env = "LIMITER_SCOPE", value_enum, default_value_t = LimiterScope::PerRoute)]
    pub limiter_scope: LimiterScope,

    // Idle key sweep interval, 0 disables it
    #[arg(long, env = "RATE_LIMIT_SWEEP_INTERVAL", default_value_t = 0)]
    pub sweep_interval_secs: u64,

    // Upstream retry policy
    #[arg(long, env = "AI_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,
    #[arg(long, env = "AI_RETRY_DELAY_MS", default_value_t = 1000)]
    pub base_delay_ms: u64,
    #[arg(long, env = "AI_CONNECT_TIMEOUT", default_value_t = 5)]
    pub connect_timeout_secs: u64,
    #[arg(long, env = "AI_TOTAL_TIMEOUT", default_value_t = 10)]
    pub total_timeout_secs: u64,

    // Upstream endpoint
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    pub gemini_base_url: String,
    #[arg(long, env = "GEMINI_FLASH_MODEL", default_value = "gemini-2.0-flash")]
    pub flash_model: String,
    #[arg(long, env = "GEMINI_PRO_MODEL", default_value = "gemini-2.0-pro")]
    pub pro_model: String,

    // Fallback log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn general_policy(&self) -> Result<WindowPolicy> {
        policy("general", self.general_max_requests, self.general_window_secs)
    }

    pub fn auth_policy(&self) -> Result<WindowPolicy> {
        policy("auth", self.auth_max_requests, self.auth_window_secs)
    }

    pub fn ai_policy(&self) -> Result<WindowPolicy> {
        policy("ai", self.ai_max_requests, self.ai_window_secs)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        if self.max_attempts == 0 {
            return Err(GateError::Config("max attempts must be at least 1".into()));
        }
        if self.base_delay_ms == 0 {
            return Err(GateError::Config("retry base delay must be positive".into()));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            total_timeout: Duration::from_secs(self.total_timeout_secs),
        })
    }
}

fn policy(name: &str, max_requests: u32, window_secs: u64) -> Result<WindowPolicy> {
    WindowPolicy::new(max_requests, Duration::from_secs(window_secs))
        .ok_or_else(|| GateError::Config(format!("{name} limiter needs max requests and window above zero")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policies() {
        let args = Args::parse_from(["taskboard-gate"]);
        assert_eq!(args.general_policy().unwrap().max_requests(), 100);
        assert_eq!(args.auth_policy().unwrap().window(), Duration::from_secs(300));
        assert_eq!(args.ai_policy().unwrap().max_requests(), 10);
        assert_eq!(args.limiter_scope, LimiterScope::PerRoute);

        let retry = args.retry_policy().unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert_eq!(retry.connect_timeout, Duration::from_secs(5));
        assert_eq!(retry.total_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_window_is_rejected() {
        let args = Args::parse_from(["taskboard-gate", "--ai-window-secs", "0"]);
        assert!(matches!(args.ai_policy(), Err(GateError::Config(_))));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let args = Args::parse_from(["taskboard-gate", "--max-attempts", "0"]);
        assert!(args.retry_policy().is_err());
    }

    #[test]
    fn global_scope_parses() {
        let args = Args::parse_from(["taskboard-gate", "--limiter-scope", "global"]);
        assert_eq!(args.limiter_scope, LimiterScope::Global);
    }
}
