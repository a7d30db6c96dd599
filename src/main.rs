// region:    --- Imports
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::bus::{KafkaIntentPublisher, KafkaManager, INTENT_TOPIC};
use crate::config::Config;
use crate::engine::BidEngine;
use crate::handlers::AppState;
use crate::hub::Hub;
use crate::registry::AuctionRegistry;
use crate::worker::FinalizationWorker;
// endregion: --- Imports

// region:    --- Modules
mod auth;
mod bus;
mod config;
mod domain;
mod engine;
mod error;
mod handlers;
mod hub;
mod lifecycle;
mod notify;
mod registry;
mod worker;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 구성 로드
    let config = Config::from_env();

    // 레지스트리 생성
    let registry = Arc::new(AuctionRegistry::new().await);

    // 스키마 초기화 (DB_RECREATE=1 이면 전체 재생성)
    let recreate = std::env::var("DB_RECREATE").map(|v| v == "1").unwrap_or(false);
    if let Err(e) = registry.initialize_database(recreate).await {
        error!("{:<12} --> 스키마 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 스키마 초기화 성공", "Main");

    // 세션 허브 시작
    let hub = Hub::new(Arc::clone(&config));
    Arc::clone(&hub).start().await;

    // Kafka 버스 연결 (구성된 경우에만)
    if let Some(brokers) = config.kafka_brokers.clone() {
        let kafka_manager = KafkaManager::new(&brokers);
        if let Err(e) = kafka_manager.create_topic(INTENT_TOPIC, 5, 1).await {
            // 버스는 가속기일 뿐, 실패해도 로컬 방송으로 계속 간다
            error!("{:<12} --> Kafka 초기화 실패: {}", "Main", e);
        }

        let instance_id = format!("engine-{}", std::process::id());
        hub.set_publisher(KafkaIntentPublisher::new(
            kafka_manager.get_producer(),
            instance_id.clone(),
        ))
        .await;

        let consumer = kafka_manager.get_consumer();
        let consumer_hub = Arc::clone(&hub);
        tokio::spawn(async move {
            consumer.consume_intents(consumer_hub, instance_id).await;
        });
        info!("{:<12} --> Kafka 버스 연결 성공", "Main");
    }

    // 입찰 승인 엔진
    let engine = BidEngine::new(registry.get_pool(), Arc::clone(&config), Arc::clone(&hub));

    // 마감 워커 시작
    let finalization_worker =
        FinalizationWorker::new(registry.get_pool(), Arc::clone(&config), Arc::clone(&hub));
    finalization_worker.start().await;

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        pool: registry.get_pool(),
        config: Arc::clone(&config),
        hub: Arc::clone(&hub),
        engine,
    };

    // 라우터 설정
    let routes_all = Router::new()
        .route(
            "/auctions",
            post(handlers::handle_create_auction).get(handlers::handle_list_auctions),
        )
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route(
            "/auctions/:id/activate",
            post(handlers::handle_activate_auction),
        )
        .route(
            "/auctions/:id/cancel",
            post(handlers::handle_cancel_auction),
        )
        .route(
            "/auctions/:id/bids",
            post(handlers::handle_place_bid).get(handlers::handle_get_bid_history),
        )
        .route("/auctions/:id/my-bids", get(handlers::handle_get_own_bids))
        .route("/auctions/:id/buy-now", post(handlers::handle_buy_it_now))
        .route("/auctions/:id/results", get(handlers::handle_get_results))
        .route(
            "/auctions/:id/histogram",
            get(handlers::handle_get_histogram),
        )
        .route(
            "/admin/blacklist",
            post(handlers::handle_blacklist_add).get(handlers::handle_blacklist_list),
        )
        .route(
            "/admin/blacklist/:user_id",
            delete(handlers::handle_blacklist_remove),
        )
        .route(
            "/admin/auctions/:id/finalize",
            post(handlers::handle_admin_finalize),
        )
        .route(
            "/admin/auctions/:id/history",
            get(handlers::handle_admin_status_history),
        )
        .route(
            "/admin/auctions/:id/notifications",
            get(handlers::handle_admin_notifications),
        )
        .route(
            "/admin/bids/:bid_id",
            delete(handlers::handle_admin_delete_bid),
        )
        .route("/ws/auctions/:id", get(handlers::handle_ws_attach))
        .route("/ws/stats", get(handlers::handle_get_hub_stats))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state);

    // 리스너 생성
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 종료 신호를 받으면 신규 세션을 막고 10초 드레인 후 내린다
    let shutdown_hub = Arc::clone(&hub);
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("{:<12} --> 종료 신호 수신", "Main");
        shutdown_hub
            .shutdown(tokio::time::Duration::from_secs(10))
            .await;
    };

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
