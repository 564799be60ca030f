//! # chirp-app
//!
//! Chirp 클라이언트 바이너리 진입점.
//! 로그인, 어댑터 조립(DI), 세션 시작/종료, 버스 이벤트 로깅.

mod lifecycle;
mod notifier;

use anyhow::{anyhow, Context, Result};
use chirp_core::config_manager::ConfigManager;
use chirp_engine::event_bus::BusEvent;
use chirp_engine::scheduler::TokioScheduledTask;
use chirp_engine::store::{FileCheckpointStore, FilePreferenceStore};
use chirp_engine::{Session, SessionDeps};
use chirp_network::auth::AuthClient;
use chirp_network::http_client::HttpSocialApi;
use chirp_network::ws_client::WsTransport;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::LifecycleManager;
use crate::notifier::ConsoleNotifier;

/// 비밀번호 환경 변수
const PASSWORD_ENV: &str = "CHIRP_PASSWORD";

/// Chirp 메신저 클라이언트
///
/// 실시간 프레즌스와 알림을 수신한다.
#[derive(Parser, Debug)]
#[command(name = "chirp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 로그인 식별자 (이메일 또는 사용자명)
    #[arg(long, short = 'u')]
    identifier: String,

    /// 비밀번호 (생략 시 CHIRP_PASSWORD 환경 변수)
    #[arg(long)]
    password: Option<String>,

    /// 서버 URL 지정 (설정 파일 값보다 우선)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 데이터 저장 경로 (체크포인트, 알림 설정)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 백그라운드 상태로 시작 (로컬 알림 대신 푸시 위임)
    #[arg(long)]
    background: bool,
}

/// 버스 이벤트 로깅 루프
async fn log_bus_events(mut rx: broadcast::Receiver<BusEvent>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(BusEvent::ConnectionChanged(state)) => info!("연결 상태: {state}"),
                Ok(BusEvent::PresenceChanged(update)) => info!(
                    "프레즌스: {} {}",
                    update.peer_id,
                    if update.is_online { "온라인" } else { "오프라인" }
                ),
                Ok(BusEvent::UnreadCountChanged { total }) => info!("읽지 않은 알림: {total}"),
                Ok(BusEvent::NotificationEvent(record)) => {
                    debug!("이벤트 {} → {:?}", record.event.id, record.decision.decision)
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("버스 이벤트 {n}건 누락"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "chirp={lvl},chirp_app={lvl},chirp_core={lvl},chirp_network={lvl},chirp_engine={lvl}",
        lvl = args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    info!("Chirp 클라이언트 시작");

    // 설정 로드
    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .map_err(|e| anyhow!("설정 로드 실패: {e}"))?;
    info!("설정 파일: {}", config_manager.config_path().display());
    let mut config = config_manager.get();
    if let Some(server) = &args.server {
        config.server.base_url = server.clone();
    }
    config
        .validate()
        .map_err(|e| anyhow!("설정 검증 실패: {e}"))?;
    info!("서버: {}", config.server.base_url);

    let data_dir = match args.data_dir.clone() {
        Some(dir) => dir,
        None => ConfigManager::data_dir().map_err(|e| anyhow!("{e}"))?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("데이터 디렉토리 생성 실패: {}", data_dir.display()))?;

    // 로그인
    let password = match args.password.clone() {
        Some(password) => password,
        None => std::env::var(PASSWORD_ENV)
            .with_context(|| format!("--password 또는 {PASSWORD_ENV} 필요"))?,
    };
    let timeout = config.server.request_timeout();
    let auth = AuthClient::new(&config.server.base_url, timeout)
        .map_err(|e| anyhow!("{e}"))?;
    let credentials = auth
        .login(&args.identifier, &password)
        .await
        .map_err(|e| anyhow!("로그인 실패: {e}"))?;
    info!("로그인 완료: {}", credentials.user_id);

    // 어댑터 조립
    let deps = SessionDeps {
        transport: Arc::new(WsTransport::new(
            &config.server.base_url,
            &config.server.ws_path,
        )),
        api: Arc::new(
            HttpSocialApi::new(&config.server.base_url, credentials.clone(), timeout)
                .map_err(|e| anyhow!("{e}"))?,
        ),
        notifier: Arc::new(ConsoleNotifier),
        checkpoints: Arc::new(FileCheckpointStore::in_dir(&data_dir)),
        preferences: Arc::new(FilePreferenceStore::in_dir(&data_dir)),
        scheduler: Arc::new(TokioScheduledTask::new()),
    };

    let session = Session::start(credentials, deps, &config)
        .await
        .map_err(|e| anyhow!("세션 시작 실패: {e}"))?;
    if args.background {
        session.set_foreground(false);
    }

    let lifecycle = LifecycleManager::new();
    let logger = tokio::spawn(log_bus_events(
        session.bus().subscribe_channel(),
        lifecycle.subscribe(),
    ));

    lifecycle
        .wait_for_signal()
        .await
        .context("시그널 핸들러 등록 실패")?;

    session.shutdown().await;
    if let Err(e) = logger.await {
        debug!("버스 로거 종료 에러: {e}");
    }

    info!("Chirp 클라이언트 종료");
    Ok(())
}
