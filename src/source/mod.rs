pub mod fallback;
pub mod normalize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::Provider;

/// 采集渠道，同时定义合并优先级。
/// rank 越小越权威：live API > 文档页 > 价格页 > 硬编码兜底。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChannel {
    Api,
    Docs,
    Pricing,
    Fallback,
}

impl SourceChannel {
    pub fn rank(self) -> u8 {
        match self {
            SourceChannel::Api => 0,
            SourceChannel::Docs => 1,
            SourceChannel::Pricing => 2,
            SourceChannel::Fallback => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceChannel::Api => "api",
            SourceChannel::Docs => "docs",
            SourceChannel::Pricing => "pricing",
            SourceChannel::Fallback => "fallback",
        }
    }

    /// 各 provider 实际存在的在线渠道（兜底渠道不走网络，不在此列）。
    /// OpenAI 有独立的文档页抓取；Anthropic / Google 只有 API + 价格页。
    pub fn live_channels(provider: Provider) -> &'static [SourceChannel] {
        match provider {
            Provider::OpenAi => &[SourceChannel::Api, SourceChannel::Docs, SourceChannel::Pricing],
            Provider::Anthropic | Provider::Google => {
                &[SourceChannel::Api, SourceChannel::Pricing]
            }
        }
    }
}

/// 采集失败的分类。单渠道失败只影响该渠道，由 merge 降级吸收。
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("channel disabled")]
    Disabled,
    #[error("fetch timed out")]
    Timeout,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// 一个渠道返回的原始载荷（尚未规范化）。
/// 约定 body 为该渠道的结构化 JSON：API 渠道是上游原始响应体，
/// docs / pricing 渠道是抓取器预提取出的 id -> 字段 映射。
#[derive(Clone, Debug)]
pub struct RawPayload {
    pub provider: Provider,
    pub channel: SourceChannel,
    pub body: serde_json::Value,
}

/// 采集边界：真正的网络客户端由部署方注入，核心只依赖这个 trait。
#[async_trait]
pub trait SourceFetch: Send + Sync {
    async fn fetch(
        &self,
        provider: Provider,
        channel: SourceChannel,
    ) -> Result<RawPayload, AcquisitionError>;
}

/// 离线 fetcher：所有在线渠道都报告 Disabled。
/// 独立运行（未注入任何客户端）时服务完全依赖兜底数据 + 持久化快照。
pub struct OfflineFetcher;

#[async_trait]
impl SourceFetch for OfflineFetcher {
    async fn fetch(
        &self,
        _provider: Provider,
        _channel: SourceChannel,
    ) -> Result<RawPayload, AcquisitionError> {
        Err(AcquisitionError::Disabled)
    }
}
