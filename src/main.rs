use std::sync::Arc;

use tracing::info;

use model_atlas::api::ApiServer;
use model_atlas::catalog::CatalogStore;
use model_atlas::config::Settings;
use model_atlas::refresh::RefreshScheduler;
use model_atlas::source::OfflineFetcher;
use model_atlas::storage::SnapshotFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::load();
    info!("starting model-atlas: {:?}", settings);

    let store = Arc::new(CatalogStore::new());
    let persist = Arc::new(SnapshotFile::new(settings.db_path.clone()));

    // 独立运行时不注入网络客户端：目录来自持久化快照 + 兜底数据。
    // 部署方可以换成真正的抓取器实现。
    let fetcher = Arc::new(OfflineFetcher);

    let scheduler = Arc::new(RefreshScheduler::new(
        store.clone(),
        persist,
        fetcher,
        settings.refresh_interval,
        settings.http_timeout,
        settings.provider_budget,
    ));

    // 启动序列：恢复落盘目录 -> 全量刷新一次
    scheduler.bootstrap().await;

    tokio::spawn(scheduler.clone().run());

    let api = ApiServer::new(store, scheduler);
    tokio::spawn(api.run(settings.port));

    info!(
        "model-atlas ready. Query via: http://localhost:{}/models",
        settings.port
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    Ok(())
}
