//! 硬编码兜底目录。
//!
//! 最后一级数据源：所有在线渠道都失败时，目录依然非空。
//! 数据人工核对，宁缺毋滥；能力标记给出明确的 Yes/No（这份表是
//! 人工整理的，"不支持"也是已知信息）。

use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::{Capabilities, Provider, TriState};
use crate::merge::{PartialModel, SourcePayload};
use crate::source::SourceChannel;

/// 由 model id 推断 family（兜底与在线来源都没给 family 时使用）
pub fn infer_family(model_id: &str) -> String {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            (r"^gpt-5\.2", "gpt-5.2"),
            (r"^gpt-5\.1", "gpt-5.1"),
            (r"^gpt-5", "gpt-5"),
            (r"^gpt-4\.1", "gpt-4.1"),
            (r"^gpt-4o", "gpt-4o"),
            (r"^gpt-4", "gpt-4"),
            (r"^gpt-3\.5", "gpt-3.5"),
            (r"^gpt-oss", "gpt-oss"),
            (r"^o4", "o4"),
            (r"^o3", "o3"),
            (r"^o1", "o1"),
            (r"^claude-opus", "claude-opus"),
            (r"^claude-sonnet", "claude-sonnet"),
            (r"^claude-haiku", "claude-haiku"),
            (r"^claude-3", "claude-3"),
            (r"^gemini-2\.5", "gemini-2.5"),
            (r"^gemini-2\.0", "gemini-2.0"),
            (r"^gemini", "gemini"),
            (r"^text-embedding", "text-embedding"),
        ]
        .into_iter()
        .map(|(p, f)| (Regex::new(p).expect("static family pattern"), f))
        .collect()
    });

    for (pattern, family) in patterns {
        if pattern.is_match(model_id) {
            return (*family).to_string();
        }
    }
    String::new()
}

struct Known {
    id: &'static str,
    name: &'static str,
    family: &'static str,
    context_window: u64,
    max_output_tokens: Option<u64>,
    input_price: f64,
    output_price: f64,
    deprecated: bool,
    // vision, reasoning, function_calling, structured_output, streaming, fine_tuning
    caps: [bool; 6],
}

const fn known(
    id: &'static str,
    name: &'static str,
    family: &'static str,
    context_window: u64,
    max_output_tokens: Option<u64>,
    input_price: f64,
    output_price: f64,
    caps: [bool; 6],
) -> Known {
    Known {
        id,
        name,
        family,
        context_window,
        max_output_tokens,
        input_price,
        output_price,
        deprecated: false,
        caps,
    }
}

#[rustfmt::skip]
static KNOWN_OPENAI: &[Known] = &[
    known("gpt-5.2", "GPT-5.2", "gpt-5.2", 400_000, Some(128_000), 1.75, 14.00, [true, true, true, true, true, false]),
    known("gpt-5.2-pro", "GPT-5.2 Pro", "gpt-5.2", 400_000, Some(128_000), 21.00, 168.00, [true, true, true, true, true, false]),
    known("gpt-5.1", "GPT-5.1", "gpt-5.1", 400_000, Some(128_000), 1.25, 10.00, [false, false, true, true, true, false]),
    known("gpt-5", "GPT-5", "gpt-5", 400_000, Some(128_000), 1.25, 10.00, [false, false, true, true, true, false]),
    known("gpt-5-mini", "GPT-5 Mini", "gpt-5", 400_000, Some(128_000), 0.25, 2.00, [false, false, true, true, true, false]),
    known("gpt-5-nano", "GPT-5 Nano", "gpt-5", 400_000, Some(128_000), 0.05, 0.40, [false, false, true, true, true, false]),
    known("gpt-4.1", "GPT-4.1", "gpt-4.1", 1_047_576, Some(32_768), 2.00, 8.00, [true, false, true, true, true, true]),
    known("o4-mini", "o4-mini", "o4", 200_000, Some(100_000), 1.10, 4.40, [true, true, true, true, true, true]),
    known("o3", "o3", "o3", 200_000, Some(100_000), 2.00, 8.00, [true, true, true, true, true, false]),
    known("gpt-4o", "GPT-4o", "gpt-4o", 128_000, Some(16_000), 2.50, 10.00, [true, false, true, true, true, true]),
    known("gpt-4o-mini", "GPT-4o Mini", "gpt-4o", 128_000, Some(16_000), 0.15, 0.60, [true, false, true, true, true, true]),
    known("gpt-4-turbo", "GPT-4 Turbo", "gpt-4", 128_000, Some(4_000), 10.00, 30.00, [true, false, true, true, true, false]),
    Known { deprecated: true, ..known("gpt-3.5-turbo", "GPT-3.5 Turbo", "gpt-3.5", 16_000, Some(4_000), 0.50, 1.50, [false, false, true, false, true, true]) },
];

#[rustfmt::skip]
static KNOWN_ANTHROPIC: &[Known] = &[
    known("claude-opus-4-1", "Claude Opus 4.1", "claude-opus", 200_000, Some(32_000), 15.00, 75.00, [true, true, true, true, true, false]),
    known("claude-sonnet-4-5", "Claude Sonnet 4.5", "claude-sonnet", 200_000, Some(64_000), 3.00, 15.00, [true, true, true, true, true, false]),
    known("claude-haiku-4-5", "Claude Haiku 4.5", "claude-haiku", 200_000, Some(64_000), 1.00, 5.00, [true, true, true, true, true, false]),
    Known { deprecated: true, ..known("claude-3-5-haiku-20241022", "Claude Haiku 3.5", "claude-3", 200_000, Some(8_192), 0.80, 4.00, [true, false, true, true, true, false]) },
];

#[rustfmt::skip]
static KNOWN_GOOGLE: &[Known] = &[
    known("gemini-2.5-pro", "Gemini 2.5 Pro", "gemini-2.5", 1_048_576, Some(65_536), 1.25, 10.00, [true, true, true, true, true, false]),
    known("gemini-2.5-flash", "Gemini 2.5 Flash", "gemini-2.5", 1_048_576, Some(65_536), 0.30, 2.50, [true, true, true, true, true, true]),
    known("gemini-2.5-flash-lite", "Gemini 2.5 Flash-Lite", "gemini-2.5", 1_048_576, Some(65_536), 0.10, 0.40, [true, false, true, true, true, true]),
    Known { deprecated: true, ..known("gemini-2.0-flash", "Gemini 2.0 Flash", "gemini-2.0", 1_048_576, Some(8_192), 0.10, 0.40, [true, false, true, true, true, true]) },
];

fn table(provider: Provider) -> &'static [Known] {
    match provider {
        Provider::OpenAi => KNOWN_OPENAI,
        Provider::Anthropic => KNOWN_ANTHROPIC,
        Provider::Google => KNOWN_GOOGLE,
    }
}

/// 生成某 provider 的兜底载荷（优先级最低，永不失败）
pub fn builtin_payload(provider: Provider) -> SourcePayload {
    let mut payload = SourcePayload::new(provider, SourceChannel::Fallback);
    for k in table(provider) {
        let [vision, reasoning, function_calling, structured_output, streaming, fine_tuning] =
            k.caps;
        payload.entries.insert(
            k.id.to_string(),
            PartialModel {
                name: Some(k.name.to_string()),
                family: Some(k.family.to_string()),
                description: None,
                created_at: None,
                deprecated: Some(k.deprecated),
                context_window: Some(k.context_window),
                max_output_tokens: k.max_output_tokens,
                input_price: Some(k.input_price),
                output_price: Some(k.output_price),
                capabilities: Capabilities {
                    vision: TriState::from_bool(vision),
                    reasoning: TriState::from_bool(reasoning),
                    function_calling: TriState::from_bool(function_calling),
                    structured_output: TriState::from_bool(structured_output),
                    streaming: TriState::from_bool(streaming),
                    fine_tuning: TriState::from_bool(fine_tuning),
                },
            },
        );
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_patterns_match_longest_prefix_first() {
        assert_eq!(infer_family("gpt-5.2-pro"), "gpt-5.2");
        assert_eq!(infer_family("gpt-5-mini"), "gpt-5");
        assert_eq!(infer_family("gpt-4o-mini"), "gpt-4o");
        assert_eq!(infer_family("o3-mini"), "o3");
        assert_eq!(infer_family("claude-sonnet-4-5"), "claude-sonnet");
        assert_eq!(infer_family("gemini-2.5-flash"), "gemini-2.5");
        assert_eq!(infer_family("mystery-model"), "");
    }

    #[test]
    fn every_provider_has_builtin_models() {
        for p in Provider::ALL {
            let payload = builtin_payload(p);
            assert!(!payload.entries.is_empty(), "no fallback data for {p}");
            assert_eq!(payload.channel, SourceChannel::Fallback);
        }
    }

    #[test]
    fn builtin_families_agree_with_inference() {
        // 表中的 family 与正则推断一致，避免两套口径漂移
        for p in Provider::ALL {
            for (id, m) in builtin_payload(p).entries {
                let inferred = infer_family(&id);
                if !inferred.is_empty() {
                    assert_eq!(m.family.as_deref(), Some(inferred.as_str()), "id={id}");
                }
            }
        }
    }
}
