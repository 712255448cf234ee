use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::coerce::AffordanceDefaults;
use crate::limiter::RateLimitSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub generation_timeout_secs: u64,
    pub global_rate_limit_requests: u32,
    pub global_rate_limit_window_secs: u64,
    pub generate_rate_limit_requests: u32,
    pub generate_rate_limit_window_secs: u64,
    pub rate_limit_max_keys: usize,
    pub trust_proxy_headers: bool,
    pub empty_label_padding: String,
    pub empty_label_border: String,
    pub empty_label_background: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源构建配置，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        // 显式设置为空表示关闭该项，未设置才使用默认值
        let toggle = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Config {
            openai_api_key,
            openai_model: text("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: text("OPENAI_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            server_host: text("SERVER_HOST", "0.0.0.0"),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            generation_timeout_secs: parse_or(&lookup, "GENERATION_TIMEOUT_SECS", 10)?,
            global_rate_limit_requests: parse_or(&lookup, "GLOBAL_RATE_LIMIT_REQUESTS", 60)?,
            global_rate_limit_window_secs: parse_or(&lookup, "GLOBAL_RATE_LIMIT_WINDOW_SECS", 60)?,
            generate_rate_limit_requests: parse_or(&lookup, "GENERATE_RATE_LIMIT_REQUESTS", 20)?,
            generate_rate_limit_window_secs: parse_or(
                &lookup,
                "GENERATE_RATE_LIMIT_WINDOW_SECS",
                60,
            )?,
            rate_limit_max_keys: parse_or(&lookup, "RATE_LIMIT_MAX_KEYS", 50_000)?,
            trust_proxy_headers: parse_or(&lookup, "TRUST_PROXY_HEADERS", false)?,
            empty_label_padding: toggle("EMPTY_LABEL_PADDING", "10px 16px"),
            empty_label_border: toggle("EMPTY_LABEL_BORDER", "1px solid #ccc"),
            empty_label_background: toggle("EMPTY_LABEL_BACKGROUND", "#f7f7f7"),
        })
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn global_rate_limit(&self) -> RateLimitSettings {
        RateLimitSettings {
            capacity: self.global_rate_limit_requests,
            window: Duration::from_secs(self.global_rate_limit_window_secs),
            max_keys: self.rate_limit_max_keys,
        }
    }

    pub fn generate_rate_limit(&self) -> RateLimitSettings {
        RateLimitSettings {
            capacity: self.generate_rate_limit_requests,
            window: Duration::from_secs(self.generate_rate_limit_window_secs),
            max_keys: self.rate_limit_max_keys,
        }
    }

    pub fn affordance(&self) -> AffordanceDefaults {
        AffordanceDefaults {
            padding: self.empty_label_padding.clone(),
            border: self.empty_label_border.clone(),
            background: self.empty_label_background.clone(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}
