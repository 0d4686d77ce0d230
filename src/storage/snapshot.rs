use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use xxhash_rust::xxh3::xxh3_64;

use crate::catalog::{ModelRecord, Snapshot};

/// 目录文件 Header
const MAGIC: u32 = 0xA71A_5001;
const FORMAT_VERSION: u32 = 1;
const STATE_COMMITTED: u32 = 0x0000_0001;
#[cfg(test)]
const STATE_INCOMPLETE: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 4 + 4 + 8 + 8; // magic + version + state + data_len + checksum

/// 落盘形态：恢复一个快照所需的全部状态，
/// 重启后无需任何网络调用即可重建目录。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedCatalog {
    pub version: u64,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub records: Vec<ModelRecord>,
}

impl PersistedCatalog {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            version: snapshot.version,
            fingerprint: snapshot.fingerprint.clone(),
            built_at: snapshot.built_at,
            records: snapshot.records.iter().map(|r| (**r).clone()).collect(),
        }
    }

    /// 重建快照。记录本身是权威：指纹以重算结果为准，
    /// 与落盘值不一致只告警（文件级损坏由 header 校验兜住）。
    pub fn into_snapshot(self) -> Snapshot {
        let stored = self.fingerprint;
        let snapshot = Snapshot::build(self.version, self.records);
        if snapshot.fingerprint != stored {
            tracing::warn!(
                "persisted fingerprint mismatch (stored={}, recomputed={})",
                stored,
                snapshot.fingerprint
            );
        }
        snapshot
    }
}

/// 目录快照的原子落盘（atomic replacement）
///
/// 写入流程（目录只有几百条记录，整体序列化，无需流式写）：
/// 1) 内存中序列化 body，算好 checksum / data_len
/// 2) 写 catalog.db.tmp：COMMITTED header + body
/// 3) fsync(tmpfile) — 确保数据落盘
/// 4) rename(tmp, target) — 原子替换（POSIX 保证）
/// 5) fsync(dir) — 确保目录项更新落盘
///
/// 任一步骤前崩溃，target 要么不存在要么还是旧的完整快照；
/// 加载时校验 magic + version + state + data_len + checksum，
/// 任何不一致都拒绝该文件。
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载上一次持久化的目录。损坏返回 None 而不是错误：
    /// 持久化是 best-effort，恢复失败等同于没有缓存。
    pub async fn load_if_valid(&self) -> anyhow::Result<Option<PersistedCatalog>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read(&self.path).await?;
        if data.len() < HEADER_SIZE {
            tracing::warn!("catalog file too small, ignoring");
            return Ok(None);
        }

        let magic = u32::from_le_bytes(data[0..4].try_into()?);
        let format = u32::from_le_bytes(data[4..8].try_into()?);
        let state = u32::from_le_bytes(data[8..12].try_into()?);
        let data_len = u64::from_le_bytes(data[12..20].try_into()?) as usize;
        let stored_checksum = u64::from_le_bytes(data[20..28].try_into()?);

        if magic != MAGIC {
            tracing::warn!("catalog magic mismatch: {:#x} != {:#x}", magic, MAGIC);
            return Ok(None);
        }
        if format != FORMAT_VERSION {
            tracing::warn!("catalog format mismatch: {} != {}", format, FORMAT_VERSION);
            return Ok(None);
        }
        if state != STATE_COMMITTED {
            tracing::warn!("catalog file not committed, ignoring");
            return Ok(None);
        }

        let body = &data[HEADER_SIZE..];
        if body.len() != data_len {
            tracing::warn!(
                "catalog data length mismatch: {} != {}",
                body.len(),
                data_len
            );
            return Ok(None);
        }

        let computed = xxh3_64(body);
        if computed != stored_checksum {
            tracing::warn!(
                "catalog checksum mismatch: {:#x} != {:#x}",
                computed,
                stored_checksum
            );
            return Ok(None);
        }

        match bincode::deserialize::<PersistedCatalog>(body) {
            Ok(catalog) => {
                tracing::info!(
                    "catalog loaded from disk: version={} records={}",
                    catalog.version,
                    catalog.records.len()
                );
                Ok(Some(catalog))
            }
            Err(e) => {
                tracing::warn!("catalog deserialize failed: {}", e);
                Ok(None)
            }
        }
    }

    /// 恢复为可发布的快照
    pub async fn load_snapshot(&self) -> anyhow::Result<Option<Arc<Snapshot>>> {
        Ok(self
            .load_if_valid()
            .await?
            .map(|c| Arc::new(c.into_snapshot())))
    }

    /// 原子写入（tmp + rename + fsync）
    pub async fn write_atomic(&self, catalog: &PersistedCatalog) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let body = bincode::serialize(catalog)?;
        let checksum = xxh3_64(&body);

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&STATE_COMMITTED.to_le_bytes());
        header[12..20].copy_from_slice(&(body.len() as u64).to_le_bytes());
        header[20..28].copy_from_slice(&checksum.to_le_bytes());

        let tmp_path = self.path.with_extension("db.tmp");
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&header)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        tracing::info!(
            "catalog persisted: version={} records={} bytes={}",
            catalog.version,
            catalog.records.len(),
            HEADER_SIZE + body.len()
        );
        Ok(())
    }
}
