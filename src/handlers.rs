/// HTTP 커맨드 / 쿼리 핸들러
/// 바깥 라우팅 계층이 부르는 표면. 비즈니스 오류는 EngineError 로,
/// 입찰 판정은 BidOutcome 유니온 그대로 내려간다.
// region:    --- Imports
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::auth::Principal;
use crate::config::Config;
use crate::domain::{Auction, AuctionStatus, Bid};
use crate::engine::{fingerprint, BidEngine, SubmitBid};
use crate::error::EngineError;
use crate::hub::{session, Hub};
use crate::lifecycle::{self, CreateAuction};
use crate::registry;
use crate::worker;

// endregion: --- Imports

// region:    --- AppState
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<PgPool>,
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub engine: Arc<BidEngine>,
}
// endregion: --- AppState

// region:    --- Request Shapes
/// 경매 생성 요청 (금액은 최소 화폐 단위)
#[derive(Debug, Deserialize)]
pub struct CreateAuctionRequest {
    pub listing_id: i64,
    pub auction_type: String,
    pub allowed_min_bid: i64,
    pub allowed_max_bid: i64,
    pub reserve_price: Option<i64>,
    pub min_increment: Option<i64>,
    pub buy_it_now: Option<i64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default = "default_anonymous")]
    pub is_anonymous: bool,
}

fn default_anonymous() -> bool {
    true
}

/// 입찰 요청
#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: i64,
    pub client_seq: i64,
}

/// 즉시 구매 요청
#[derive(Debug, Deserialize)]
pub struct BuyItNowRequest {
    pub client_seq: i64,
}

/// 블랙리스트 등록 요청
#[derive(Debug, Deserialize)]
pub struct BlacklistRequest {
    pub user_id: i64,
    pub reason: Option<String>,
}

fn client_fingerprints(headers: &HeaderMap) -> ([u8; 32], [u8; 32]) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let ua = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    (fingerprint(ip), fingerprint(ua))
}
// endregion: --- Request Shapes

// region:    --- Command Handlers
/// 경매 생성
pub async fn handle_create_auction(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateAuctionRequest>,
) -> Result<Response, EngineError> {
    info!(
        "{:<12} --> 경매 생성 요청: listing={}, seller={}",
        "Command", req.listing_id, principal.user_id
    );

    let auction = lifecycle::create_auction(
        &state.pool,
        &state.config,
        &principal,
        CreateAuction {
            listing_id: req.listing_id,
            auction_type: req.auction_type,
            allowed_min_bid: req.allowed_min_bid,
            allowed_max_bid: req.allowed_max_bid,
            reserve_price: req.reserve_price,
            min_increment: req.min_increment,
            buy_it_now: req.buy_it_now,
            start_at: req.start_at,
            end_at: req.end_at,
            is_anonymous: req.is_anonymous,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": auction })),
    )
        .into_response())
}

/// 경매 활성화
pub async fn handle_activate_auction(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    info!(
        "{:<12} --> 경매 활성화 요청: auction={}, user={}",
        "Command", auction_id, principal.user_id
    );
    let auction =
        lifecycle::activate_auction(&state.pool, &state.hub, auction_id, &principal).await?;
    Ok(Json(serde_json::json!({
        "status_code": auction.status_code,
        "start_at": auction.start_at,
        "end_at": auction.end_at,
    }))
    .into_response())
}

/// 경매 취소
pub async fn handle_cancel_auction(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    info!(
        "{:<12} --> 경매 취소 요청: auction={}, user={}",
        "Command", auction_id, principal.user_id
    );
    let auction = lifecycle::cancel_auction(&state.pool, &state.hub, auction_id, &principal).await?;
    Ok(Json(serde_json::json!({ "status_code": auction.status_code })).into_response())
}

/// 입찰 제출
pub async fn handle_place_bid(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<PlaceBidRequest>,
) -> Result<Response, EngineError> {
    let (ip_hash, ua_hash) = client_fingerprints(&headers);

    let outcome = state
        .engine
        .submit_bid(SubmitBid {
            auction_id,
            bidder_id: principal.user_id,
            amount: req.amount,
            client_seq: req.client_seq,
            source_ip_hash: ip_hash,
            user_agent_hash: ua_hash,
        })
        .await?;

    Ok(Json(outcome).into_response())
}

/// 즉시 구매
pub async fn handle_buy_it_now(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<BuyItNowRequest>,
) -> Result<Response, EngineError> {
    let (ip_hash, ua_hash) = client_fingerprints(&headers);

    let outcome = state
        .engine
        .buy_it_now(auction_id, principal.user_id, req.client_seq, ip_hash, ua_hash)
        .await?;

    Ok(Json(outcome).into_response())
}
// endregion: --- Command Handlers

// region:    --- Query Handlers
/// 경매 목록 조회 (?status= 필터)
pub async fn handle_list_auctions(
    State(state): State<AppState>,
    axum::extract::Query(params): axum::extract::Query<HashMap<String, String>>,
) -> Result<Response, EngineError> {
    let status = params.get("status").map(|s| s.as_str());
    let auctions = registry::list_auctions(&state.pool, status, 100).await?;

    let mut views = Vec::with_capacity(auctions.len());
    for auction in &auctions {
        views.push(auction_view(auction, None));
    }
    Ok(Json(serde_json::json!({ "data": views })).into_response())
}

/// 경매 조회 (익명 경매에서는 최고 입찰자 신원을 별칭으로 가린다)
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    let auction = registry::load_auction(&state.pool, auction_id).await?;

    let highest_alias = match (auction.is_anonymous, auction.highest_bidder_id) {
        (true, Some(bidder)) => registry::find_alias(&state.pool, auction_id, bidder)
            .await?
            .map(|a| a.alias_label),
        _ => None,
    };

    Ok(Json(serde_json::json!({ "data": auction_view(&auction, highest_alias) })).into_response())
}

/// 입찰 이력 조회 (노출 가능분만, 신원은 별칭으로)
pub async fn handle_get_bid_history(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    let auction = registry::load_auction(&state.pool, auction_id).await?;
    let bids = registry::list_visible_bids(&state.pool, auction_id).await?;
    let aliases = alias_map(&state.pool, auction_id).await?;

    let views: Vec<serde_json::Value> = bids
        .iter()
        .map(|b| bid_view(b, &aliases, auction.is_anonymous))
        .collect();
    Ok(Json(serde_json::json!({ "data": views })).into_response())
}

/// 본인 입찰 이력 조회
pub async fn handle_get_own_bids(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    let bids = registry::list_own_bids(&state.pool, auction_id, principal.user_id).await?;
    Ok(Json(serde_json::json!({ "data": bids })).into_response())
}

/// 결과 조회 (종료 후에만)
pub async fn handle_get_results(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    let auction = registry::load_auction(&state.pool, auction_id).await?;
    if auction.status() != AuctionStatus::Ended {
        return Err(EngineError::InvalidState(
            "results are available after the auction ends".to_string(),
        ));
    }

    let bids = registry::list_ranked_bids(&state.pool, auction_id).await?;
    let aliases = alias_map(&state.pool, auction_id).await?;
    let views: Vec<serde_json::Value> = bids
        .iter()
        .map(|b| bid_view(b, &aliases, auction.is_anonymous))
        .collect();

    Ok(Json(serde_json::json!({
        "data": {
            "auction_id": auction_id,
            "total_bids": views.len(),
            "rankings": views,
        }
    }))
    .into_response())
}

/// 입찰 분포 조회 (k-익명 버킷만)
pub async fn handle_get_histogram(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    registry::load_auction(&state.pool, auction_id).await?;
    let buckets = registry::list_histogram_buckets(
        &state.pool,
        auction_id,
        state.config.histogram_min_bucket_count,
    )
    .await?;
    Ok(Json(serde_json::json!({ "data": buckets })).into_response())
}

/// 허브 통계 조회
pub async fn handle_get_hub_stats(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({ "data": state.hub.stats().await })).into_response()
}
// endregion: --- Query Handlers

// region:    --- Admin Handlers
/// 블랙리스트 등록
pub async fn handle_blacklist_add(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<BlacklistRequest>,
) -> Result<Response, EngineError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }

    registry::upsert_blacklist(
        &state.pool,
        req.user_id,
        true,
        req.reason.as_deref(),
        principal.user_id,
    )
    .await?;

    info!(
        "{:<12} --> 블랙리스트 등록: user={}, staff={}",
        "Admin", req.user_id, principal.user_id
    );
    Ok(Json(serde_json::json!({ "user_id": req.user_id, "is_active": true })).into_response())
}

/// 블랙리스트 해제
pub async fn handle_blacklist_remove(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<i64>,
) -> Result<Response, EngineError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }

    registry::upsert_blacklist(&state.pool, user_id, false, None, principal.user_id).await?;

    info!(
        "{:<12} --> 블랙리스트 해제: user={}, staff={}",
        "Admin", user_id, principal.user_id
    );
    Ok(Json(serde_json::json!({ "user_id": user_id, "is_active": false })).into_response())
}

/// 활성 블랙리스트 목록
pub async fn handle_blacklist_list(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, EngineError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }
    let entries = registry::list_blacklist(&state.pool).await?;
    Ok(Json(serde_json::json!({ "data": entries })).into_response())
}

/// 경매 상태 전이 이력 (관리자)
pub async fn handle_admin_status_history(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }
    registry::load_auction(&state.pool, auction_id).await?;
    let history = registry::list_status_history(&state.pool, auction_id).await?;
    Ok(Json(serde_json::json!({ "data": history })).into_response())
}

/// 경매 통지 기록 (관리자)
pub async fn handle_admin_notifications(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }
    registry::load_auction(&state.pool, auction_id).await?;
    let notifications = registry::list_notifications(&state.pool, auction_id).await?;
    Ok(Json(serde_json::json!({ "data": notifications })).into_response())
}

/// 관리자 수동 마감
pub async fn handle_admin_finalize(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
) -> Result<Response, EngineError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }

    let finalized = worker::finalize_and_notify(
        &state.pool,
        &state.config,
        &state.hub,
        auction_id,
        "Finalized by admin",
        Some(principal.user_id),
    )
    .await?;

    if !finalized {
        return Err(EngineError::AuctionClosed);
    }
    Ok(Json(serde_json::json!({ "auction_id": auction_id, "status_code": "ended" })).into_response())
}

/// 관리자 입찰 제거 (소프트 삭제)
pub async fn handle_admin_delete_bid(
    State(state): State<AppState>,
    principal: Principal,
    Path(bid_id): Path<i64>,
) -> Result<Response, EngineError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }

    let affected = registry::soft_delete_bid(&state.pool, bid_id, principal.user_id).await?;
    if affected == 0 {
        return Err(EngineError::NotFound("bid"));
    }

    info!(
        "{:<12} --> 입찰 소프트 삭제: bid={}, staff={}",
        "Admin", bid_id, principal.user_id
    );
    Ok(Json(serde_json::json!({ "bid_id": bid_id, "deleted": true })).into_response())
}
// endregion: --- Admin Handlers

// region:    --- Session Attach
/// WebSocket 세션 업그레이드
/// 인증 주체 확인 후 세션 런루프로 넘긴다. 존재/종결 검증은 세션 쪽에서 한다.
pub async fn handle_ws_attach(
    State(state): State<AppState>,
    principal: Principal,
    Path(auction_id): Path<i64>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let (ip_hash, ua_hash) = client_fingerprints(&headers);
    info!(
        "{:<12} --> 세션 업그레이드: auction={}, user={}",
        "Session", auction_id, principal.user_id
    );

    ws.on_upgrade(move |socket| {
        session::run_session(state, socket, auction_id, principal, ip_hash, ua_hash)
    })
}
// endregion: --- Session Attach

// region:    --- Views
/// 경매 응답 뷰: 익명 경매는 최고 입찰자 원시 id 를 내보내지 않는다
fn auction_view(auction: &Auction, highest_alias: Option<String>) -> serde_json::Value {
    let mut v = serde_json::to_value(auction).unwrap_or_default();
    v["effective_end"] = serde_json::json!(auction.effective_end());

    if auction.is_anonymous {
        if let Some(obj) = v.as_object_mut() {
            obj.remove("highest_bidder_id");
            obj.insert(
                "highest_bidder_alias".to_string(),
                serde_json::json!(highest_alias),
            );
        }
    }
    v
}

/// 입찰 응답 뷰: 익명 경매는 신원을 별칭으로만 노출한다
fn bid_view(bid: &Bid, aliases: &HashMap<i64, String>, anonymous: bool) -> serde_json::Value {
    let bidder = if anonymous {
        serde_json::json!(aliases.get(&bid.bidder_id))
    } else {
        serde_json::json!(bid.bidder_id)
    };

    serde_json::json!({
        "bid_id": bid.bid_id,
        "amount": bid.amount,
        "bidder": bidder,
        "is_winning": bid.is_winning,
        "final_rank": bid.final_rank,
        "created_at": bid.created_at,
    })
}

async fn alias_map(pool: &PgPool, auction_id: i64) -> Result<HashMap<i64, String>, EngineError> {
    let aliases = registry::list_aliases(pool, auction_id).await?;
    Ok(aliases
        .into_iter()
        .map(|a| (a.bidder_id, a.alias_label))
        .collect())
}
// endregion: --- Views

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn auction(anonymous: bool) -> Auction {
        let now = Utc::now();
        Auction {
            auction_id: 1,
            listing_id: 1,
            seller_id: 9,
            auction_type: "english".to_string(),
            status_code: "active".to_string(),
            allowed_min_bid: 1000_00,
            allowed_max_bid: 10000_00,
            reserve_price: None,
            min_increment: 100_00,
            buy_it_now: None,
            current_price: Some(1500_00),
            highest_bidder_id: Some(42),
            reserve_met: false,
            soft_close_trigger_sec: 180,
            soft_close_extend_sec: 60,
            start_at: now,
            end_at: now + Duration::days(7),
            extended_until: None,
            extension_count: 0,
            is_anonymous: anonymous,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_auction_view_hides_identity_when_anonymous() {
        let v = auction_view(&auction(true), Some("Bidder #3".to_string()));
        assert!(v.get("highest_bidder_id").is_none());
        assert_eq!(v["highest_bidder_alias"], "Bidder #3");
        assert_eq!(v["current_price"], 150000);
    }

    #[test]
    fn test_auction_view_keeps_identity_when_public() {
        let v = auction_view(&auction(false), None);
        assert_eq!(v["highest_bidder_id"], 42);
        assert!(v.get("highest_bidder_alias").is_none());
    }

    #[test]
    fn test_bid_view_anonymizes_bidder() {
        let now = Utc::now();
        let bid = Bid {
            bid_id: 3,
            auction_id: 1,
            bidder_id: 42,
            amount: 1500_00,
            client_seq: 1,
            source_ip_hash: None,
            user_agent_hash: None,
            accepted: true,
            reject_reason: None,
            final_rank: Some(1),
            max_proxy_amount: None,
            is_winning: true,
            is_visible: true,
            created_at: now,
            deleted_at: None,
            deleted_by: None,
        };

        let mut aliases = HashMap::new();
        aliases.insert(42i64, "Bidder #7".to_string());

        let v = bid_view(&bid, &aliases, true);
        assert_eq!(v["bidder"], "Bidder #7");
        assert!(v.get("bidder_id").is_none());

        let v = bid_view(&bid, &aliases, false);
        assert_eq!(v["bidder"], 42);
    }
}
// endregion: --- Tests
