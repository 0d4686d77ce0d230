use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use xxhash_rust::xxh3::Xxh3;

use crate::catalog::record::{ModelRecord, Provider};

/// 不可变的版本化快照：记录序列 + 构建期一次性算好的派生索引。
///
/// 发布之后绝不修改；读路径拿到引用后在整个请求期间看到的都是
/// 同一份数据（快照隔离）。被替换的快照在最后一个读者释放后由
/// Arc 回收。
pub struct Snapshot {
    /// 发布序号，每次 publish 严格 +1（仅用于观测，不参与冲突解决）
    pub version: u64,
    /// 插入顺序 = 抓取顺序（provider 固定枚举序，provider 内按 id 升序）
    pub records: Vec<Arc<ModelRecord>>,
    by_id: HashMap<String, usize>,
    pub by_provider: HashMap<Provider, Vec<String>>,
    pub by_family: HashMap<String, Vec<String>>,
    pub built_at: DateTime<Utc>,
    /// 内容指纹（ETag 的底座）：只由 records 内容决定
    pub fingerprint: String,
}

impl Snapshot {
    /// 空快照：服务启动瞬间的占位，version 0
    pub fn empty() -> Self {
        Self::build(0, Vec::new())
    }

    /// 由合并产物构建快照。重复 id 违反唯一性不变量：保留先到者并告警。
    pub fn build(version: u64, records: Vec<ModelRecord>) -> Self {
        let mut kept: Vec<Arc<ModelRecord>> = Vec::with_capacity(records.len());
        let mut by_id: HashMap<String, usize> = HashMap::with_capacity(records.len());
        for record in records {
            if by_id.contains_key(&record.id) {
                tracing::warn!("duplicate model id across providers, keeping first: {}", record.id);
                continue;
            }
            by_id.insert(record.id.clone(), kept.len());
            kept.push(Arc::new(record));
        }

        let mut by_provider: HashMap<Provider, Vec<String>> = HashMap::new();
        let mut by_family: HashMap<String, Vec<String>> = HashMap::new();
        for record in &kept {
            by_provider
                .entry(record.provider)
                .or_default()
                .push(record.id.clone());
            if !record.family.is_empty() {
                by_family
                    .entry(record.family.clone())
                    .or_default()
                    .push(record.id.clone());
            }
        }

        let fingerprint = fingerprint_records(&kept);
        Self {
            version,
            records: kept,
            by_id,
            by_provider,
            by_family,
            built_at: Utc::now(),
            fingerprint,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ModelRecord>> {
        self.by_id.get(id).map(|i| &self.records[*i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 内容指纹：对按 id 排序的 (id, 记录摘要) 序列做 xxh3-128。
/// 与网络到达时序无关：相同记录内容必得相同指纹。
fn fingerprint_records(records: &[Arc<ModelRecord>]) -> String {
    let mut pairs: Vec<(&str, u64)> = records
        .iter()
        .map(|r| (r.id.as_str(), r.digest()))
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Xxh3::new();
    for (id, digest) in pairs {
        hasher.update(id.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(&digest.to_le_bytes());
    }
    format!("{:032x}", hasher.digest128())
}
