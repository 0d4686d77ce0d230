//! Refresh Scheduler：目录的唯一写者。
//!
//! 每个刷新周期并发抓取所有 provider 的所有在线渠道，单渠道超时、
//! 单 provider 预算超支都只降级不失败；合并产物整体构建成新快照后
//! 一次性发布。并发触发合流：后来者等待进行中的周期并共享其结果，
//! 一次合流操作只产生一个新版本。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::catalog::{CatalogStore, ModelRecord, Provider, Snapshot};
use crate::merge::{merge_provider, SourcePayload};
use crate::source::fallback::builtin_payload;
use crate::source::{normalize, AcquisitionError, SourceChannel, SourceFetch};
use crate::stats::{
    ChannelStatus, HealthReport, ProviderHealth, ProviderStatus, RefreshStats,
};
use crate::storage::{PersistedCatalog, SnapshotFile};

/// trigger 的返回：stats 为本次（或合流到的那次）周期的统计
#[derive(Clone, Debug)]
pub struct RefreshOutcome {
    pub stats: RefreshStats,
    /// true = 没有自己跑周期，合流到了进行中的那次
    pub coalesced: bool,
}

pub struct RefreshScheduler {
    store: Arc<CatalogStore>,
    persist: Arc<SnapshotFile>,
    fetcher: Arc<dyn SourceFetch>,
    interval: Duration,
    channel_timeout: Duration,
    provider_budget: Duration,
    /// 进行中周期的合流点：Some = 有周期在跑，加入者订阅其结果
    cycle: Mutex<Option<watch::Receiver<Option<RefreshStats>>>>,
    last: Mutex<Option<RefreshStats>>,
    started_at: Instant,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<CatalogStore>,
        persist: Arc<SnapshotFile>,
        fetcher: Arc<dyn SourceFetch>,
        interval: Duration,
        channel_timeout: Duration,
        provider_budget: Duration,
    ) -> Self {
        Self {
            store,
            persist,
            fetcher,
            interval,
            channel_timeout,
            provider_budget,
            cycle: Mutex::new(None),
            last: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    /// 启动序列：先恢复持久化快照（无需网络），再做一次全量刷新。
    /// 两步都失败也能服务：刷新周期最终至少有兜底数据。
    pub async fn bootstrap(&self) {
        match self.persist.load_snapshot().await {
            Ok(Some(restored)) => {
                tracing::info!(
                    "bootstrap: restored persisted catalog version={} records={}",
                    restored.version,
                    restored.len()
                );
                self.store.publish(restored);
            }
            Ok(None) => {
                tracing::info!("bootstrap: no persisted catalog, starting cold");
            }
            Err(e) => {
                tracing::warn!("bootstrap: failed to read persisted catalog: {}", e);
            }
        }

        let outcome = self.trigger().await;
        tracing::info!("bootstrap refresh done: {}", outcome.stats);
    }

    /// 触发一次刷新。已有周期在跑则合流：等它完成并返回它的结果。
    pub async fn trigger(&self) -> RefreshOutcome {
        enum Role {
            Lead(watch::Sender<Option<RefreshStats>>),
            Join(watch::Receiver<Option<RefreshStats>>),
        }

        loop {
            let role = {
                let mut slot = self.cycle.lock();
                if let Some(rx) = slot.as_ref() {
                    Role::Join(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Role::Lead(tx)
                }
            };

            match role {
                Role::Lead(tx) => {
                    // 槽位由守卫清理：run_cycle 途中本 future 被丢弃
                    // （HTTP 客户端断连）也能释放，后续触发重新拿主导权
                    let _slot_guard = CycleSlotGuard { slot: &self.cycle };
                    let stats = self.run_cycle().await;
                    let _ = tx.send(Some(stats.clone()));
                    return RefreshOutcome {
                        stats,
                        coalesced: false,
                    };
                }
                Role::Join(mut rx) => match rx
                    .wait_for(|v| v.is_some())
                    .await
                    .map(|guard| guard.clone())
                {
                    Ok(stats) => {
                        let stats = stats.expect("waited for Some");
                        return RefreshOutcome {
                            stats,
                            coalesced: true,
                        };
                    }
                    // 运行者中途被丢弃（sender 没了）：清掉残留槽位再重试，
                    // 只清自己等的那个 channel，不动新周期的槽位
                    Err(_) => {
                        let mut slot = self.cycle.lock();
                        if slot.as_ref().is_some_and(|cur| cur.same_channel(&rx)) {
                            *slot = None;
                        }
                        continue;
                    }
                },
            }
        }
    }

    /// 定时循环。interval 为 0 表示禁用定时刷新（只响应手动触发）。
    pub async fn run(self: Arc<Self>) {
        if self.interval.is_zero() {
            tracing::info!("periodic refresh disabled");
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 第一次 tick 立即完成，bootstrap 已经刷过，跳过
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let outcome = self.trigger().await;
            tracing::info!("periodic {}", outcome.stats);
        }
    }

    /// 一个完整周期：并发抓取 -> 合并 -> 构建 -> 持久化 -> 发布
    async fn run_cycle(&self) -> RefreshStats {
        let started_at = Utc::now();
        let t0 = Instant::now();
        let version = self.store.next_version();

        let mut handles = Vec::with_capacity(Provider::ALL.len());
        for provider in Provider::ALL {
            let fetcher = self.fetcher.clone();
            let channel_timeout = self.channel_timeout;
            handles.push((
                provider,
                tokio::spawn(acquire_provider(fetcher, provider, channel_timeout)),
            ));
        }

        let mut records: Vec<ModelRecord> = Vec::new();
        let mut providers: Vec<ProviderStatus> = Vec::with_capacity(handles.len());
        for (provider, mut handle) in handles {
            let (mut payloads, mut channels) = match timeout(self.provider_budget, &mut handle)
                .await
            {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::warn!("acquisition task for {} failed: {}", provider, e);
                    budget_exhausted(provider)
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(
                        "provider {} exceeded budget of {:?}, degrading",
                        provider,
                        self.provider_budget
                    );
                    budget_exhausted(provider)
                }
            };

            // 兜底渠道永远参与，保证 provider 级非空
            let builtin = builtin_payload(provider);
            channels.push(ChannelStatus::ok(
                SourceChannel::Fallback,
                builtin.entries.len(),
            ));
            payloads.push(builtin);

            let merged = merge_provider(provider, payloads);
            let status = ProviderStatus::assess(provider, channels, merged.len());
            if status.degraded {
                tracing::warn!("provider {} degraded to fallback data only", provider);
            }
            providers.push(status);
            records.extend(merged);
        }

        let snapshot = Arc::new(Snapshot::build(version, records));
        if let Err(e) = self
            .persist
            .write_atomic(&PersistedCatalog::from_snapshot(&snapshot))
            .await
        {
            // 持久化是 best-effort，失败不阻止发布
            tracing::warn!("catalog persistence failed: {}", e);
        }
        let records_total = snapshot.len();
        self.store.publish(snapshot);

        let stats = RefreshStats {
            version,
            records_total,
            duration: t0.elapsed(),
            started_at,
            providers,
        };
        *self.last.lock() = Some(stats.clone());
        stats
    }

    pub fn last_refresh(&self) -> Option<RefreshStats> {
        self.last.lock().clone()
    }

    pub fn health(&self) -> HealthReport {
        let snapshot = self.store.current();
        let last = self.last.lock().clone();

        let providers = Provider::ALL
            .into_iter()
            .map(|p| {
                let cycle = last
                    .as_ref()
                    .and_then(|s| s.providers.iter().find(|ps| ps.provider == p));
                ProviderHealth {
                    provider: p,
                    records: snapshot.by_provider.get(&p).map_or(0, Vec::len),
                    degraded: cycle.is_some_and(|ps| ps.degraded),
                    channels: cycle.map(|ps| ps.channels.clone()).unwrap_or_default(),
                }
            })
            .collect();

        HealthReport {
            status: "ok",
            version: snapshot.version,
            fingerprint: snapshot.fingerprint.clone(),
            record_count: snapshot.len(),
            last_refresh_at: last.map(|s| s.started_at),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            providers,
        }
    }
}

/// 抓取单个 provider 的全部在线渠道。渠道串行、各自限时；
/// 任何失败都只记入该渠道的状态。
async fn acquire_provider(
    fetcher: Arc<dyn SourceFetch>,
    provider: Provider,
    channel_timeout: Duration,
) -> (Vec<SourcePayload>, Vec<ChannelStatus>) {
    let mut payloads = Vec::new();
    let mut channels = Vec::new();

    for &channel in SourceChannel::live_channels(provider) {
        let result = match timeout(channel_timeout, fetcher.fetch(provider, channel)).await {
            Ok(Ok(raw)) => normalize::normalize(&raw),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AcquisitionError::Timeout),
        };
        match result {
            Ok(payload) => {
                tracing::debug!(
                    "fetched {}/{}: {} entries",
                    provider,
                    channel.as_str(),
                    payload.entries.len()
                );
                channels.push(ChannelStatus::ok(channel, payload.entries.len()));
                payloads.push(payload);
            }
            Err(e) => {
                tracing::warn!("fetch {}/{} failed: {}", provider, channel.as_str(), e);
                channels.push(ChannelStatus::failed(channel, e.to_string()));
            }
        }
    }

    (payloads, channels)
}

/// 主导者退出（正常返回或被取消）时释放合流槽位
struct CycleSlotGuard<'a> {
    slot: &'a Mutex<Option<watch::Receiver<Option<RefreshStats>>>>,
}

impl Drop for CycleSlotGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

fn budget_exhausted(provider: Provider) -> (Vec<SourcePayload>, Vec<ChannelStatus>) {
    let channels = SourceChannel::live_channels(provider)
        .iter()
        .map(|&c| ChannelStatus::failed(c, "provider budget exceeded".to_string()))
        .collect();
    (Vec::new(), channels)
}
