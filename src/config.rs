use std::path::PathBuf;
use std::time::Duration;

/// 运行配置，全部来自环境变量，带可用的默认值。
/// 非法值按缺省处理并告警，配置错误不应阻止启动。
#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub db_path: PathBuf,
    /// 0 = 禁用定时刷新（只响应 POST /refresh）
    pub refresh_interval: Duration,
    /// 单渠道抓取超时
    pub http_timeout: Duration,
    /// 单 provider 整体预算
    pub provider_budget: Duration,
}

impl Settings {
    pub fn load() -> Self {
        let port = env_parse("ATLAS_PORT", 6060);
        let refresh_minutes: u64 = env_parse("ATLAS_REFRESH_INTERVAL_MINUTES", 60);
        let http_timeout_secs: u64 = env_parse("ATLAS_HTTP_TIMEOUT_SECS", 30);
        let provider_budget_secs: u64 = env_parse("ATLAS_PROVIDER_BUDGET_SECS", 45);

        let db_path = std::env::var("ATLAS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());

        Self {
            port,
            db_path,
            refresh_interval: Duration::from_secs(refresh_minutes * 60),
            http_timeout: Duration::from_secs(http_timeout_secs),
            provider_budget: Duration::from_secs(provider_budget_secs),
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("invalid {}={:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("model-atlas")
        .join("catalog.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::load();
        assert!(s.port > 0);
        assert!(s.http_timeout.as_secs() > 0);
        assert!(s.db_path.to_string_lossy().contains("catalog.db"));
    }

    #[test]
    fn invalid_env_value_falls_back_to_default() {
        std::env::set_var("ATLAS_TEST_BOGUS_PORT", "not-a-number");
        let port: u16 = env_parse("ATLAS_TEST_BOGUS_PORT", 6060);
        assert_eq!(port, 6060);
        std::env::remove_var("ATLAS_TEST_BOGUS_PORT");
    }
}
