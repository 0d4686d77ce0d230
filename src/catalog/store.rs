use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::catalog::record::ModelRecord;
use crate::catalog::snapshot::Snapshot;

/// Copy-on-write 目录存储。
///
/// 读路径：一次原子 load 拿到当前快照引用，无锁、不阻塞写者；
/// 写路径：Refresh Scheduler（唯一写者）整体替换快照引用。
/// 旧快照对已持有引用的读者继续有效，最终由 Arc 回收。
pub struct CatalogStore {
    current: ArcSwap<Snapshot>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// 当前快照（非阻塞，读者之间、读者与写者互不等待）
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// 单条查找（走当前快照的 by_id 索引）
    pub fn get(&self, id: &str) -> Option<Arc<ModelRecord>> {
        self.current().get(id).cloned()
    }

    /// 原子发布新快照。串行化由调用方（调度器）保证，
    /// 存储本身不在读路径引入任何锁。
    pub fn publish(&self, snapshot: Arc<Snapshot>) {
        let old = self.current.swap(snapshot);
        let new = self.current.load();
        if new.version != old.version + 1 && old.version != 0 {
            tracing::warn!(
                "snapshot version jumped: {} -> {}",
                old.version,
                new.version
            );
        }
        tracing::info!(
            "snapshot published: version={} records={} fingerprint={}",
            new.version,
            new.len(),
            new.fingerprint
        );
    }

    /// 下一个发布序号（单写者前提下无竞争）
    pub fn next_version(&self) -> u64 {
        self.current.load().version + 1
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}
