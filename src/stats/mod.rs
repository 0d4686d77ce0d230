use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::Provider;
use crate::source::SourceChannel;

/// 单个渠道在一次刷新周期里的结果
#[derive(Clone, Debug, Serialize)]
pub struct ChannelStatus {
    pub channel: SourceChannel,
    pub ok: bool,
    /// 失败原因（成功时为 None）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 该渠道贡献的条目数
    pub entries: usize,
}

impl ChannelStatus {
    pub fn ok(channel: SourceChannel, entries: usize) -> Self {
        Self {
            channel,
            ok: true,
            error: None,
            entries,
        }
    }

    pub fn failed(channel: SourceChannel, error: String) -> Self {
        Self {
            channel,
            ok: false,
            error: Some(error),
            entries: 0,
        }
    }
}

/// 单个 provider 在一次刷新周期里的结果
#[derive(Clone, Debug, Serialize)]
pub struct ProviderStatus {
    pub provider: Provider,
    pub channels: Vec<ChannelStatus>,
    /// 合并后归属该 provider 的记录数
    pub records: usize,
    /// 所有在线渠道都失败，只剩兜底数据
    pub degraded: bool,
}

impl ProviderStatus {
    /// degraded = 没有任何在线渠道成功（兜底渠道不算在线）
    pub fn assess(provider: Provider, channels: Vec<ChannelStatus>, records: usize) -> Self {
        let degraded = !channels
            .iter()
            .any(|c| c.ok && c.channel != SourceChannel::Fallback);
        Self {
            provider,
            channels,
            records,
            degraded,
        }
    }
}

/// 一次完整刷新周期的统计
#[derive(Clone, Debug, Serialize)]
pub struct RefreshStats {
    /// 本次发布的快照版本
    pub version: u64,
    pub records_total: usize,
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub providers: Vec<ProviderStatus>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl RefreshStats {
    pub fn degraded_providers(&self) -> usize {
        self.providers.iter().filter(|p| p.degraded).count()
    }
}

impl fmt::Display for RefreshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "refresh v{}: {} records in {}ms ({} providers, {} degraded)",
            self.version,
            self.records_total,
            self.duration.as_millis(),
            self.providers.len(),
            self.degraded_providers()
        )
    }
}

/// /health 响应体
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: u64,
    pub fingerprint: String,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProviderHealth {
    pub provider: Provider,
    pub records: usize,
    pub degraded: bool,
    /// 最近一次刷新周期里各渠道的结果（还没刷新过则为空）
    pub channels: Vec<ChannelStatus>,
}
