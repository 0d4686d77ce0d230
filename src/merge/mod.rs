//! 多源合并引擎。
//!
//! 输入：单个 provider 的若干 SourcePayload（各自带渠道优先级）。
//! 输出：该 provider 的权威记录集，按 id 升序排列。
//!
//! 合并是逐字段的：每个字段取优先级最高且非空的来源；
//! 低优先级来源可以补上高优先级来源缺失的字段。
//! 同优先级重复载荷按到达顺序决胜（先到先赢），保证确定性。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::catalog::{Capabilities, ModelRecord, Provider};
use crate::source::fallback::infer_family;
use crate::source::SourceChannel;

/// 一个来源对单个模型给出的部分字段集。
/// 所有字段可缺省；能力标记用 TriState 表达"未给出"。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialModel {
    pub name: Option<String>,
    pub family: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub deprecated: Option<bool>,
    pub context_window: Option<u64>,
    pub max_output_tokens: Option<u64>,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub capabilities: Capabilities,
}

/// 一个渠道规范化之后的完整载荷：model id -> 部分字段集
#[derive(Clone, Debug)]
pub struct SourcePayload {
    pub provider: Provider,
    pub channel: SourceChannel,
    pub entries: BTreeMap<String, PartialModel>,
}

impl SourcePayload {
    pub fn new(provider: Provider, channel: SourceChannel) -> Self {
        Self {
            provider,
            channel,
            entries: BTreeMap::new(),
        }
    }
}

/// 合并一个 provider 的全部载荷。
///
/// - id 集合是所有来源的并集（只出现在兜底里的模型同样收录）；
/// - 逐字段按优先级取第一个非空值；
/// - 价格为负视为来源数据不一致，置空并告警，绝不让整条记录失败。
pub fn merge_provider(provider: Provider, mut payloads: Vec<SourcePayload>) -> Vec<ModelRecord> {
    // 稳定排序：同 rank 载荷保持到达顺序，折叠时先到者先供值。
    payloads.sort_by_key(|p| p.channel.rank());

    let mut ids: BTreeMap<String, ()> = BTreeMap::new();
    for p in &payloads {
        for id in p.entries.keys() {
            ids.entry(id.clone()).or_insert(());
        }
    }

    let mut out = Vec::with_capacity(ids.len());
    for id in ids.into_keys() {
        let contributing: Vec<(&SourcePayload, &PartialModel)> = payloads
            .iter()
            .filter_map(|p| p.entries.get(&id).map(|m| (p, m)))
            .collect();
        out.push(resolve_record(provider, &id, &contributing));
    }
    out
}

/// 逐字段折叠：contributing 已按优先级（同级按到达序）排列。
fn resolve_record(
    provider: Provider,
    id: &str,
    contributing: &[(&SourcePayload, &PartialModel)],
) -> ModelRecord {
    let mut name: Option<String> = None;
    let mut family: Option<String> = None;
    let mut description: Option<String> = None;
    let mut created_at: Option<DateTime<Utc>> = None;
    let mut deprecated: Option<bool> = None;
    let mut context_window: Option<u64> = None;
    let mut max_output_tokens: Option<u64> = None;
    let mut input_price: Option<f64> = None;
    let mut output_price: Option<f64> = None;
    let mut capabilities = Capabilities::default();

    let mut sources: Vec<SourceChannel> = Vec::new();
    for (payload, partial) in contributing {
        if !sources.contains(&payload.channel) {
            sources.push(payload.channel);
        }
        take_first(&mut name, &partial.name);
        take_first(&mut family, &partial.family);
        take_first(&mut description, &partial.description);
        take_first(&mut created_at, &partial.created_at);
        take_first(&mut deprecated, &partial.deprecated);
        take_first(&mut context_window, &partial.context_window);
        take_first(&mut max_output_tokens, &partial.max_output_tokens);
        take_first(&mut input_price, &partial.input_price);
        take_first(&mut output_price, &partial.output_price);
        capabilities = capabilities.or(partial.capabilities);
    }

    ModelRecord {
        id: id.to_string(),
        provider,
        name: name.unwrap_or_else(|| id.to_string()),
        family: family.unwrap_or_else(|| infer_family(id)),
        description: description.unwrap_or_default(),
        created_at,
        deprecated: deprecated.unwrap_or(false),
        context_window,
        max_output_tokens,
        input_price: sanitize_price(id, "input_price", input_price),
        output_price: sanitize_price(id, "output_price", output_price),
        capabilities,
        sources,
    }
}

fn take_first<T: Clone>(slot: &mut Option<T>, candidate: &Option<T>) {
    if slot.is_none() {
        if let Some(v) = candidate {
            *slot = Some(v.clone());
        }
    }
}

/// 不一致数据（负价格）降级为空而不是让记录失败
fn sanitize_price(id: &str, field: &str, value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => {
            tracing::warn!("dropping inconsistent {} for {}: {}", field, id, v);
            None
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TriState;

    fn payload(channel: SourceChannel, entries: Vec<(&str, PartialModel)>) -> SourcePayload {
        let mut p = SourcePayload::new(Provider::OpenAi, channel);
        for (id, m) in entries {
            p.entries.insert(id.to_string(), m);
        }
        p
    }

    fn with_price(input: f64) -> PartialModel {
        PartialModel {
            input_price: Some(input),
            ..PartialModel::default()
        }
    }

    #[test]
    fn output_is_union_of_ids_sorted() {
        let api = payload(SourceChannel::Api, vec![("b", PartialModel::default())]);
        let fb = payload(
            SourceChannel::Fallback,
            vec![("a", PartialModel::default()), ("c", PartialModel::default())],
        );
        let merged = merge_provider(Provider::OpenAi, vec![api, fb]);
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn per_field_priority_wins() {
        // API 给价格，docs 给上下文窗口，兜底给价格 + 名字。
        let api = payload(SourceChannel::Api, vec![("m1", with_price(2.0))]);
        let docs = payload(
            SourceChannel::Docs,
            vec![(
                "m1",
                PartialModel {
                    context_window: Some(128_000),
                    ..PartialModel::default()
                },
            )],
        );
        let fb = payload(
            SourceChannel::Fallback,
            vec![(
                "m1",
                PartialModel {
                    input_price: Some(1.5),
                    name: Some("M One".to_string()),
                    ..PartialModel::default()
                },
            )],
        );

        let merged = merge_provider(Provider::OpenAi, vec![docs, fb, api]);
        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert_eq!(m.input_price, Some(2.0));
        assert_eq!(m.context_window, Some(128_000));
        assert_eq!(m.name, "M One");
        assert_eq!(
            m.sources,
            vec![SourceChannel::Api, SourceChannel::Docs, SourceChannel::Fallback]
        );
    }

    #[test]
    fn arrival_order_does_not_change_result() {
        let api = payload(SourceChannel::Api, vec![("m1", with_price(2.0))]);
        let pricing = payload(SourceChannel::Pricing, vec![("m1", with_price(0.9))]);
        let fb = payload(SourceChannel::Fallback, vec![("m1", with_price(1.5))]);

        let orders = [
            vec![api.clone(), pricing.clone(), fb.clone()],
            vec![fb.clone(), pricing.clone(), api.clone()],
            vec![pricing.clone(), fb.clone(), api.clone()],
            vec![pricing, api, fb],
        ];
        let mut results = orders
            .into_iter()
            .map(|o| merge_provider(Provider::OpenAi, o));
        let first = results.next().unwrap();
        for r in results {
            assert_eq!(r, first);
        }
        assert_eq!(first[0].input_price, Some(2.0));
    }

    #[test]
    fn same_rank_ties_resolved_by_arrival() {
        let first = payload(SourceChannel::Pricing, vec![("m1", with_price(1.0))]);
        let second = payload(SourceChannel::Pricing, vec![("m1", with_price(9.0))]);
        let merged = merge_provider(Provider::OpenAi, vec![first, second]);
        assert_eq!(merged[0].input_price, Some(1.0));
    }

    #[test]
    fn fallback_only_model_is_included_and_marked() {
        let api = payload(SourceChannel::Api, vec![("live", PartialModel::default())]);
        let fb = payload(
            SourceChannel::Fallback,
            vec![("legacy", with_price(0.5)), ("live", PartialModel::default())],
        );
        let merged = merge_provider(Provider::OpenAi, vec![api, fb]);

        let legacy = merged.iter().find(|r| r.id == "legacy").unwrap();
        assert!(legacy.fallback_only());
        let live = merged.iter().find(|r| r.id == "live").unwrap();
        assert!(!live.fallback_only());
    }

    #[test]
    fn capability_flags_merge_per_flag() {
        let api = payload(
            SourceChannel::Api,
            vec![(
                "m",
                PartialModel {
                    capabilities: Capabilities {
                        vision: TriState::No,
                        ..Capabilities::default()
                    },
                    ..PartialModel::default()
                },
            )],
        );
        let fb = payload(
            SourceChannel::Fallback,
            vec![(
                "m",
                PartialModel {
                    capabilities: Capabilities {
                        vision: TriState::Yes,
                        streaming: TriState::Yes,
                        ..Capabilities::default()
                    },
                    ..PartialModel::default()
                },
            )],
        );
        let merged = merge_provider(Provider::OpenAi, vec![fb, api]);
        let caps = merged[0].capabilities;
        // vision：API 明确说 No，胜过兜底的 Yes
        assert_eq!(caps.vision, TriState::No);
        // streaming：只有兜底给出
        assert_eq!(caps.streaming, TriState::Yes);
        // 没人给出的保持 Unknown
        assert_eq!(caps.reasoning, TriState::Unknown);
    }

    #[test]
    fn negative_price_dropped_to_null() {
        let api = payload(SourceChannel::Api, vec![("m", with_price(-3.0))]);
        let merged = merge_provider(Provider::OpenAi, vec![api]);
        assert_eq!(merged[0].input_price, None);
    }

    #[test]
    fn name_defaults_to_id_family_inferred() {
        let api = payload(SourceChannel::Api, vec![("gpt-5-mini", PartialModel::default())]);
        let merged = merge_provider(Provider::OpenAi, vec![api]);
        assert_eq!(merged[0].name, "gpt-5-mini");
        assert_eq!(merged[0].family, "gpt-5");
    }

    #[test]
    fn empty_payload_set_yields_empty_output() {
        assert!(merge_provider(Provider::Google, Vec::new()).is_empty());
    }
}
