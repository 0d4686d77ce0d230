//! 快照上的查询执行：过滤链 -> 排序 -> 响应 ETag。
//!
//! 查询只读单个快照，执行期间目录刷新不影响结果。
//! 所有过滤条件取合取；能力过滤走三态语义（Unknown 不匹配
//! 任何明确条件）。排序空值恒排末尾，与方向无关，id 升序决胜。

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::catalog::{ModelRecord, Provider, Snapshot};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    #[default]
    Name,
    #[serde(rename = "created_at")]
    Created,
    ContextWindow,
    InputPrice,
    OutputPrice,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// GET /models 的全部查询参数。未给出的条件不参与过滤。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub provider: Option<Provider>,
    /// 精确匹配（family 是归一化后的枚举值，不做模糊）
    pub family: Option<String>,
    /// 子串搜索：id / name / provider，大小写不敏感
    pub q: Option<String>,
    pub vision: Option<bool>,
    pub reasoning: Option<bool>,
    pub function_calling: Option<bool>,
    pub structured_output: Option<bool>,
    pub streaming: Option<bool>,
    pub fine_tuning: Option<bool>,
    pub include_deprecated: bool,
    pub min_context: Option<u64>,
    pub max_input_price: Option<f64>,
    pub max_output_price: Option<f64>,
    pub sort: SortField,
    pub order: SortOrder,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{field} must be a non-negative finite number")]
    InvalidPrice { field: &'static str },
}

impl QueryParams {
    pub fn validate(&self) -> Result<(), QueryError> {
        for (field, value) in [
            ("max_input_price", self.max_input_price),
            ("max_output_price", self.max_output_price),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(QueryError::InvalidPrice { field });
                }
            }
        }
        Ok(())
    }

    fn matches(&self, r: &ModelRecord) -> bool {
        if let Some(p) = self.provider {
            if r.provider != p {
                return false;
            }
        }
        if let Some(family) = &self.family {
            if &r.family != family {
                return false;
            }
        }
        if !self.include_deprecated && r.deprecated {
            return false;
        }
        if let Some(min) = self.min_context {
            if !r.context_window.is_some_and(|c| c >= min) {
                return false;
            }
        }
        // 价格上限：价格未知的记录不匹配（不能假设它便宜）
        if let Some(max) = self.max_input_price {
            if !r.input_price.is_some_and(|p| p <= max) {
                return false;
            }
        }
        if let Some(max) = self.max_output_price {
            if !r.output_price.is_some_and(|p| p <= max) {
                return false;
            }
        }

        let caps = &r.capabilities;
        for (want, state) in [
            (self.vision, caps.vision),
            (self.reasoning, caps.reasoning),
            (self.function_calling, caps.function_calling),
            (self.structured_output, caps.structured_output),
            (self.streaming, caps.streaming),
            (self.fine_tuning, caps.fine_tuning),
        ] {
            if let Some(want) = want {
                if !state.matches(want) {
                    return false;
                }
            }
        }

        if let Some(q) = &self.q {
            let needle = q.to_lowercase();
            let hit = r.id.to_lowercase().contains(&needle)
                || r.name.to_lowercase().contains(&needle)
                || r.provider.as_str().contains(&needle);
            if !hit {
                return false;
            }
        }

        true
    }
}

/// 执行查询：在给定快照上过滤并排序
pub fn run(snapshot: &Snapshot, params: &QueryParams) -> Result<Vec<Arc<ModelRecord>>, QueryError> {
    params.validate()?;

    let mut hits: Vec<Arc<ModelRecord>> = snapshot
        .records
        .iter()
        .filter(|r| params.matches(r))
        .cloned()
        .collect();

    hits.sort_by(|a, b| compare(a, b, params.sort, params.order));
    Ok(hits)
}

/// 排序比较器。空值恒排末尾（升降序都一样），同键值按 id 升序决胜，
/// 保证同一快照同一参数下输出字节级稳定。
fn compare(a: &ModelRecord, b: &ModelRecord, sort: SortField, order: SortOrder) -> Ordering {
    let primary = match sort {
        SortField::Id => directed(a.id.cmp(&b.id), order),
        SortField::Name => directed(a.name.cmp(&b.name), order),
        SortField::Created => nulls_last(&a.created_at, &b.created_at, order, Ord::cmp),
        SortField::ContextWindow => {
            nulls_last(&a.context_window, &b.context_window, order, Ord::cmp)
        }
        SortField::InputPrice => nulls_last(&a.input_price, &b.input_price, order, cmp_f64),
        SortField::OutputPrice => nulls_last(&a.output_price, &b.output_price, order, cmp_f64),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn directed(ord: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

fn nulls_last<T>(
    a: &Option<T>,
    b: &Option<T>,
    order: SortOrder,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(cmp(a, b), order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// 响应 ETag：快照内容指纹 + 规范化查询参数。
/// 快照不变、参数相同 -> ETag 相同；任一变化 -> ETag 变化。
pub fn response_etag(fingerprint: &str, params: &QueryParams) -> String {
    let mut hasher = Xxh3::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(&[0u8]);
    // QueryParams 字段序固定，serde_json 输出因此稳定
    if let Ok(bytes) = serde_json::to_vec(params) {
        hasher.update(&bytes);
    }
    format!("\"{:032x}\"", hasher.digest128())
}
