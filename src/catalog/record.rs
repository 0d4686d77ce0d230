use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceChannel;

/// 支持的上游提供方
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    /// 固定枚举顺序：刷新周期按此顺序拼接各 provider 的记录
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Google];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// 三态能力标记。Unknown 表示没有任何数据源给出判断，
/// 与 false（明确不支持）严格区分，过滤逻辑因此是全函数。
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum TriState {
    #[serde(rename = "true")]
    Yes,
    #[serde(rename = "false")]
    No,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl TriState {
    pub fn from_bool(v: bool) -> Self {
        if v {
            TriState::Yes
        } else {
            TriState::No
        }
    }

    /// 合并语义：自身已知则保留，否则取右侧（高优先级在左）
    pub fn or(self, fallback: TriState) -> Self {
        match self {
            TriState::Unknown => fallback,
            known => known,
        }
    }

    /// 过滤语义：Unknown 不匹配任何明确的查询条件
    pub fn matches(self, want: bool) -> bool {
        match self {
            TriState::Yes => want,
            TriState::No => !want,
            TriState::Unknown => false,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, TriState::Unknown)
    }
}

/// 模型能力位图（全部三态）
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub vision: TriState,
    pub reasoning: TriState,
    pub function_calling: TriState,
    pub structured_output: TriState,
    pub streaming: TriState,
    pub fine_tuning: TriState,
}

impl Capabilities {
    /// 逐字段合并：self 为高优先级，fallback 补洞
    pub fn or(self, fallback: Capabilities) -> Capabilities {
        Capabilities {
            vision: self.vision.or(fallback.vision),
            reasoning: self.reasoning.or(fallback.reasoning),
            function_calling: self.function_calling.or(fallback.function_calling),
            structured_output: self.structured_output.or(fallback.structured_output),
            streaming: self.streaming.or(fallback.streaming),
            fine_tuning: self.fine_tuning.or(fallback.fine_tuning),
        }
    }
}

/// 目录中的一条模型记录。
///
/// 记录一旦进入 Snapshot 即不可变：更新只会出现在下一个 Snapshot 里，
/// 绝不原地修改（快照隔离的前提）。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub provider: Provider,
    pub name: String,
    pub family: String,
    #[serde(default)]
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deprecated: bool,
    pub context_window: Option<u64>,
    pub max_output_tokens: Option<u64>,
    /// 单位：USD / 1M tokens
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    #[serde(default)]
    pub capabilities: Capabilities,
    /// 溯源：哪些采集渠道对该记录有贡献（按优先级排列）
    #[serde(default)]
    pub sources: Vec<SourceChannel>,
}

impl ModelRecord {
    /// 该记录是否只来自硬编码兜底数据（所有在线渠道都没提到它）
    pub fn fallback_only(&self) -> bool {
        self.sources.iter().all(|c| *c == SourceChannel::Fallback)
    }

    /// 内容摘要：对稳定序列化后的字节做 xxh3。
    /// 相同内容必得相同摘要，任何一个字段变化都会改变它。
    pub fn digest(&self) -> u64 {
        let bytes = bincode::serialize(self).expect("ModelRecord serialization is infallible");
        xxhash_rust::xxh3::xxh3_64(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ModelRecord {
        ModelRecord {
            id: id.to_string(),
            provider: Provider::OpenAi,
            name: id.to_string(),
            family: "gpt-5".to_string(),
            description: String::new(),
            created_at: None,
            deprecated: false,
            context_window: Some(128_000),
            max_output_tokens: None,
            input_price: Some(1.25),
            output_price: Some(10.0),
            capabilities: Capabilities::default(),
            sources: vec![SourceChannel::Api],
        }
    }

    #[test]
    fn tristate_merge_keeps_known_value() {
        assert_eq!(TriState::Yes.or(TriState::No), TriState::Yes);
        assert_eq!(TriState::No.or(TriState::Yes), TriState::No);
        assert_eq!(TriState::Unknown.or(TriState::Yes), TriState::Yes);
        assert_eq!(TriState::Unknown.or(TriState::Unknown), TriState::Unknown);
    }

    #[test]
    fn tristate_filter_excludes_unknown() {
        assert!(TriState::Yes.matches(true));
        assert!(TriState::No.matches(false));
        assert!(!TriState::Unknown.matches(true));
        assert!(!TriState::Unknown.matches(false));
    }

    #[test]
    fn digest_changes_with_any_field() {
        let a = record("gpt-5");
        let mut b = a.clone();
        assert_eq!(a.digest(), b.digest());

        b.input_price = Some(1.30);
        assert_ne!(a.digest(), b.digest());

        let mut c = a.clone();
        c.capabilities.vision = TriState::Yes;
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn fallback_only_provenance() {
        let mut r = record("gpt-5");
        assert!(!r.fallback_only());
        r.sources = vec![SourceChannel::Fallback];
        assert!(r.fallback_only());
    }

    #[test]
    fn provider_roundtrip() {
        for p in Provider::ALL {
            assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
        }
        assert!("azure".parse::<Provider>().is_err());
    }
}
