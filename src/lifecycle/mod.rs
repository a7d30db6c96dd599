/// 경매 수명주기 전이
/// draft -> active -> (extended)* -> ended | cancelled
/// 모든 판정은 서버 UTC 벽시계 기준이고, 전이마다 이력 행과 이벤트를 남긴다.
// region:    --- Imports
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::auth::Principal;
use crate::config::Config;
use crate::domain::{rank_order, Auction, AuctionStatus, AuctionType, Bid, EventType};
use crate::error::EngineError;
use crate::hub::messages::{MessageKind, OutboundMessage};
use crate::hub::Hub;
use crate::registry;

// endregion: --- Imports

// region:    --- Create
/// 경매 생성 파라미터 (금액은 최소 화폐 단위)
#[derive(Debug, Clone)]
pub struct CreateAuction {
    pub listing_id: i64,
    pub auction_type: String,
    pub allowed_min_bid: i64,
    pub allowed_max_bid: i64,
    pub reserve_price: Option<i64>,
    pub min_increment: Option<i64>,
    pub buy_it_now: Option<i64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_anonymous: bool,
}

/// 생성 전 검증 (상태 변경 없음)
pub fn validate_create(params: &CreateAuction, config: &Config, now: DateTime<Utc>) -> Result<AuctionType, EngineError> {
    let kind = AuctionType::parse(&params.auction_type).ok_or(EngineError::InvalidAuctionId)?;

    if params.allowed_min_bid < 0 || params.allowed_max_bid <= params.allowed_min_bid {
        return Err(EngineError::InvalidRange);
    }

    let duration = params.end_at - params.start_at;
    if duration < Duration::days(config.min_duration_days)
        || duration > Duration::days(config.max_duration_days)
    {
        return Err(EngineError::DurationExceeded {
            min_days: config.min_duration_days,
            max_days: config.max_duration_days,
        });
    }

    if params.start_at < now {
        return Err(EngineError::StartInPast);
    }

    if kind == AuctionType::English {
        if let Some(inc) = params.min_increment {
            if inc <= 0 {
                return Err(EngineError::InvalidAmount);
            }
        }
        if let Some(reserve) = params.reserve_price {
            if reserve < params.allowed_min_bid {
                return Err(EngineError::InvalidAmount);
            }
        }
        if let Some(buy_now) = params.buy_it_now {
            if buy_now <= params.allowed_min_bid {
                return Err(EngineError::InvalidAmount);
            }
        }
    }

    Ok(kind)
}

/// 경매 생성 (draft 상태)
pub async fn create_auction(
    pool: &PgPool,
    config: &Config,
    principal: &Principal,
    params: CreateAuction,
) -> Result<Auction, EngineError> {
    let kind = validate_create(&params, config, Utc::now())?;

    // 영국식 기본 최소 증분
    let min_increment = match kind {
        AuctionType::English => params.min_increment.unwrap_or(100_00),
        _ => 0,
    };

    let auction = registry::insert_auction(
        pool,
        params.listing_id,
        principal.user_id,
        kind.as_str(),
        params.allowed_min_bid,
        params.allowed_max_bid,
        params.reserve_price,
        min_increment,
        params.buy_it_now,
        config.soft_close_trigger_sec as i32,
        config.soft_close_extend_sec as i32,
        params.start_at,
        params.end_at,
        params.is_anonymous,
    )
    .await?;

    info!(
        "{:<12} --> 경매 생성: auction={}, type={}, seller={}",
        "Lifecycle", auction.auction_id, auction.auction_type, principal.user_id
    );
    Ok(auction)
}
// endregion: --- Create

// region:    --- Activate / Cancel
/// draft -> active 전이 (잠금 하). 수행자 검증은 호출측 책임.
pub async fn activate_transition(
    pool: &PgPool,
    auction_id: i64,
    reason: &str,
    operator_id: Option<i64>,
) -> Result<(Auction, i64), EngineError> {
    let mut tx = pool.begin().await?;
    let mut auction = registry::load_auction_for_update(&mut tx, auction_id).await?;

    if auction.status() != AuctionStatus::Draft {
        tx.rollback().await?;
        return Err(EngineError::InvalidState(
            "only draft auctions can be activated".to_string(),
        ));
    }

    let from = auction.status_code.clone();
    auction.status_code = AuctionStatus::Active.as_str().to_string();
    registry::save_auction(&mut tx, &auction).await?;
    registry::record_status_transition(&mut tx, auction_id, &from, &auction.status_code, reason, operator_id)
        .await?;

    let event_id = registry::append_event(
        &mut tx,
        auction_id,
        EventType::Open,
        operator_id,
        Some(serde_json::json!({
            "status_code": auction.status_code,
            "start_at": auction.start_at,
            "end_at": auction.end_at,
        })),
    )
    .await?;

    tx.commit().await?;
    info!(
        "{:<12} --> 경매 활성화: auction={}, reason={}",
        "Lifecycle", auction_id, reason
    );
    Ok((auction, event_id))
}

/// 판매자 주도 활성화
pub async fn activate_auction(
    pool: &PgPool,
    hub: &Hub,
    auction_id: i64,
    principal: &Principal,
) -> Result<Auction, EngineError> {
    let auction = registry::load_auction(pool, auction_id).await?;
    if auction.seller_id != principal.user_id && !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }

    let (auction, event_id) =
        activate_transition(pool, auction_id, "Activated by seller", Some(principal.user_id))
            .await?;

    broadcast_state(hub, &auction, event_id).await;
    Ok(auction)
}

/// 취소 전이: draft | active | extended -> cancelled
/// 취소 경로는 결과 통지를 만들지 않는다.
pub async fn cancel_auction(
    pool: &PgPool,
    hub: &Hub,
    auction_id: i64,
    principal: &Principal,
) -> Result<Auction, EngineError> {
    let existing = registry::load_auction(pool, auction_id).await?;
    if existing.seller_id != principal.user_id && !principal.is_admin() {
        return Err(EngineError::Forbidden);
    }

    let mut tx = pool.begin().await?;
    let mut auction = registry::load_auction_for_update(&mut tx, auction_id).await?;

    if auction.status().is_terminal() {
        tx.rollback().await?;
        return Err(EngineError::InvalidState(
            "cannot cancel ended or already cancelled auction".to_string(),
        ));
    }

    let reason = if principal.is_admin() && auction.seller_id != principal.user_id {
        "Cancelled by admin"
    } else {
        "Cancelled by seller"
    };

    let from = auction.status_code.clone();
    auction.status_code = AuctionStatus::Cancelled.as_str().to_string();
    registry::save_auction(&mut tx, &auction).await?;
    registry::record_status_transition(
        &mut tx,
        auction_id,
        &from,
        &auction.status_code,
        reason,
        Some(principal.user_id),
    )
    .await?;

    let event_id = registry::append_event(
        &mut tx,
        auction_id,
        EventType::Closed,
        Some(principal.user_id),
        Some(serde_json::json!({ "reason": "cancelled", "detail": reason })),
    )
    .await?;

    tx.commit().await?;
    info!(
        "{:<12} --> 경매 취소: auction={}, reason={}",
        "Lifecycle", auction_id, reason
    );

    let message = OutboundMessage::new(
        MessageKind::Closed,
        serde_json::json!({ "status_code": auction.status_code, "reason": reason }),
    )
    .with_event_id(event_id);
    hub.broadcast_room(auction_id, message, None).await;

    Ok(auction)
}

/// 상태 방송
pub async fn broadcast_state(hub: &Hub, auction: &Auction, event_id: i64) {
    let message = OutboundMessage::new(
        MessageKind::State,
        serde_json::json!({
            "status_code": auction.status_code,
            "start_at": auction.start_at,
            "end_at": auction.end_at,
            "effective_end": auction.effective_end(),
        }),
    )
    .with_event_id(event_id);
    hub.broadcast_room(auction.auction_id, message, None).await;
}
// endregion: --- Activate / Cancel

// region:    --- Finalize
/// 마감 결과 요약
#[derive(Debug, Clone)]
pub struct FinalizeSummary {
    pub auction: Auction,
    pub ranked_bids: Vec<Bid>,
    pub event_id: i64,
    pub ended_at: DateTime<Utc>,
}

/// 마감 전이: active | extended -> ended
/// 결정적 순위(금액 내림차순, created_at 오름차순, bid_id 오름차순)를 기록한다.
/// 이미 종결된 경매면 None (멱등).
pub async fn finalize_auction(
    pool: &PgPool,
    auction_id: i64,
    reason: &str,
    operator_id: Option<i64>,
) -> Result<Option<FinalizeSummary>, EngineError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut auction = registry::load_auction_for_update(&mut tx, auction_id).await?;

    // 잠금 하 재확인: 두 번째 패스는 그냥 지나간다
    if auction.status().is_terminal() {
        tx.rollback().await?;
        info!(
            "{:<12} --> 이미 종결됨, 건너뜀: auction={}, status={}",
            "Lifecycle", auction_id, auction.status_code
        );
        return Ok(None);
    }

    let mut bids = registry::list_bids_for_finalize(&mut tx, auction_id).await?;
    bids.sort_by(rank_order);

    for (i, bid) in bids.iter_mut().enumerate() {
        let rank = (i + 1) as i32;
        registry::set_final_rank(&mut tx, bid.bid_id, rank).await?;
        bid.final_rank = Some(rank);
    }

    // 밀봉 입찰은 마감 시점에 공개된다
    if auction.kind() == AuctionType::Sealed {
        registry::reveal_bids(&mut tx, auction_id).await?;
    }

    let from = auction.status_code.clone();
    auction.status_code = AuctionStatus::Ended.as_str().to_string();
    registry::save_auction(&mut tx, &auction).await?;
    registry::record_status_transition(&mut tx, auction_id, &from, &auction.status_code, reason, operator_id)
        .await?;

    let winner_rank: i32 = if bids.is_empty() { 0 } else { 1 };
    let event_id = registry::append_event(
        &mut tx,
        auction_id,
        EventType::Closed,
        operator_id,
        Some(serde_json::json!({
            "ended_at": now,
            "winner_rank": winner_rank,
            "total_bids": bids.len(),
        })),
    )
    .await?;

    tx.commit().await?;
    info!(
        "{:<12} --> 경매 마감: auction={}, bids={}, event={}",
        "Lifecycle",
        auction_id,
        bids.len(),
        event_id
    );

    Ok(Some(FinalizeSummary {
        auction,
        ranked_bids: bids,
        event_id,
        ended_at: now,
    }))
}
// endregion: --- Finalize

// endregion: --- Tests
