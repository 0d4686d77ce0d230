//! Record Normalizer：把各渠道的原始 JSON 载荷转成规范的部分字段集。
//!
//! 每个 provider 的 API 响应形状不同（OpenAI `data[]`、Anthropic `data[]`、
//! Gemini `models[]` 且 id 带 `models/` 前缀）；docs / pricing 渠道约定为
//! 抓取器预提取的 `id -> 字段` 映射。这里只做形状转换，不做合并。

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::catalog::Provider;
use crate::merge::{PartialModel, SourcePayload};
use crate::source::{AcquisitionError, RawPayload, SourceChannel};

/// 规范化入口：按 (provider, channel) 分派
pub fn normalize(raw: &RawPayload) -> Result<SourcePayload, AcquisitionError> {
    match raw.channel {
        SourceChannel::Api => normalize_api(raw),
        SourceChannel::Docs => normalize_docs(raw),
        SourceChannel::Pricing => normalize_pricing(raw),
        SourceChannel::Fallback => Err(AcquisitionError::Malformed(
            "fallback channel carries no raw payload".to_string(),
        )),
    }
}

fn normalize_api(raw: &RawPayload) -> Result<SourcePayload, AcquisitionError> {
    let mut payload = SourcePayload::new(raw.provider, raw.channel);

    let (list_key, items) = match raw.provider {
        Provider::OpenAi | Provider::Anthropic => ("data", raw.body.get("data")),
        Provider::Google => ("models", raw.body.get("models")),
    };
    let items = items
        .and_then(Value::as_array)
        .ok_or_else(|| AcquisitionError::Malformed(format!("missing `{list_key}` array")))?;

    for item in items {
        let (id, partial) = match raw.provider {
            Provider::OpenAi => {
                let Some(id) = str_field(item, "id") else { continue };
                let created_at = item
                    .get("created")
                    .and_then(Value::as_i64)
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
                (
                    id,
                    PartialModel {
                        created_at,
                        ..PartialModel::default()
                    },
                )
            }
            Provider::Anthropic => {
                let Some(id) = str_field(item, "id") else { continue };
                (
                    id,
                    PartialModel {
                        name: str_field(item, "display_name"),
                        created_at: str_field(item, "created_at")
                            .and_then(|s| parse_rfc3339(&s)),
                        ..PartialModel::default()
                    },
                )
            }
            Provider::Google => {
                // Gemini 返回 "models/gemini-2.5-pro"，去掉前缀
                let Some(name) = str_field(item, "name") else { continue };
                let id = name.strip_prefix("models/").unwrap_or(&name).to_string();
                if id.is_empty() {
                    continue;
                }
                (
                    id,
                    PartialModel {
                        name: str_field(item, "displayName"),
                        description: str_field(item, "description"),
                        context_window: u64_field(item, "inputTokenLimit"),
                        max_output_tokens: u64_field(item, "outputTokenLimit"),
                        ..PartialModel::default()
                    },
                )
            }
        };
        payload.entries.insert(id, partial);
    }

    Ok(payload)
}

/// docs 渠道：id -> {name, description, context_window, max_output_tokens, deprecated}
fn normalize_docs(raw: &RawPayload) -> Result<SourcePayload, AcquisitionError> {
    let map = raw
        .body
        .as_object()
        .ok_or_else(|| AcquisitionError::Malformed("docs payload is not an object".to_string()))?;

    let mut payload = SourcePayload::new(raw.provider, raw.channel);
    for (id, fields) in map {
        payload.entries.insert(
            id.clone(),
            PartialModel {
                name: str_field(fields, "name"),
                description: str_field(fields, "description"),
                context_window: u64_field(fields, "context_window"),
                max_output_tokens: u64_field(fields, "max_output_tokens"),
                deprecated: fields.get("deprecated").and_then(Value::as_bool),
                ..PartialModel::default()
            },
        );
    }
    Ok(payload)
}

/// pricing 渠道：id -> {input_price_per_1m, output_price_per_1m}
fn normalize_pricing(raw: &RawPayload) -> Result<SourcePayload, AcquisitionError> {
    let map = raw.body.as_object().ok_or_else(|| {
        AcquisitionError::Malformed("pricing payload is not an object".to_string())
    })?;

    let mut payload = SourcePayload::new(raw.provider, raw.channel);
    for (id, fields) in map {
        payload.entries.insert(
            id.clone(),
            PartialModel {
                input_price: fields.get("input_price_per_1m").and_then(Value::as_f64),
                output_price: fields.get("output_price_per_1m").and_then(Value::as_f64),
                ..PartialModel::default()
            },
        );
    }
    Ok(payload)
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn u64_field(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(Value::as_u64)
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(provider: Provider, channel: SourceChannel, body: Value) -> RawPayload {
        RawPayload {
            provider,
            channel,
            body,
        }
    }

    #[test]
    fn openai_api_payload_extracts_created() {
        let body = json!({"data": [
            {"id": "gpt-5", "created": 1_715_000_000, "owned_by": "openai"},
            {"id": "", "created": 1},
            {"created": 2},
        ]});
        let p = normalize(&raw(Provider::OpenAi, SourceChannel::Api, body)).unwrap();
        assert_eq!(p.entries.len(), 1);
        let m = &p.entries["gpt-5"];
        assert!(m.created_at.is_some());
        assert!(m.name.is_none());
    }

    #[test]
    fn anthropic_api_payload_extracts_display_name() {
        let body = json!({"data": [
            {"id": "claude-sonnet-4-5", "display_name": "Claude Sonnet 4.5",
             "created_at": "2025-09-29T00:00:00Z"},
        ], "has_more": false});
        let p = normalize(&raw(Provider::Anthropic, SourceChannel::Api, body)).unwrap();
        let m = &p.entries["claude-sonnet-4-5"];
        assert_eq!(m.name.as_deref(), Some("Claude Sonnet 4.5"));
        assert!(m.created_at.is_some());
    }

    #[test]
    fn gemini_api_payload_strips_models_prefix() {
        let body = json!({"models": [
            {"name": "models/gemini-2.5-pro", "displayName": "Gemini 2.5 Pro",
             "inputTokenLimit": 1_048_576, "outputTokenLimit": 65_536},
        ]});
        let p = normalize(&raw(Provider::Google, SourceChannel::Api, body)).unwrap();
        let m = &p.entries["gemini-2.5-pro"];
        assert_eq!(m.context_window, Some(1_048_576));
        assert_eq!(m.max_output_tokens, Some(65_536));
    }

    #[test]
    fn pricing_payload_maps_prices() {
        let body = json!({"gpt-5": {"input_price_per_1m": 1.25, "output_price_per_1m": 10.0}});
        let p = normalize(&raw(Provider::OpenAi, SourceChannel::Pricing, body)).unwrap();
        let m = &p.entries["gpt-5"];
        assert_eq!(m.input_price, Some(1.25));
        assert_eq!(m.output_price, Some(10.0));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let err = normalize(&raw(Provider::OpenAi, SourceChannel::Api, json!([]))).unwrap_err();
        assert!(matches!(err, AcquisitionError::Malformed(_)));
        let err =
            normalize(&raw(Provider::OpenAi, SourceChannel::Pricing, json!("x"))).unwrap_err();
        assert!(matches!(err, AcquisitionError::Malformed(_)));
    }
}
