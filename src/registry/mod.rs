/// 경매 레지스트리
/// 모든 핵심 엔티티의 영속 저장과 조회를 담당한다.
/// 경매 단위 상호 배제는 저장소 행 잠금(SELECT ... FOR UPDATE)으로 구현한다.
// region:    --- Imports
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::sync::Arc;

use crate::domain::{
    alias_label, Auction, AuctionEvent, AuctionStatus, Bid, BidderAlias, BlacklistEntry, EventType,
    HistogramBucket, NotificationKind, NotificationLog, StatusHistory, StreamOffset,
};
use crate::error::EngineError;

pub mod queries;

// endregion: --- Imports

// region:    --- AuctionRegistry
pub struct AuctionRegistry {
    pub pool: Arc<PgPool>,
}

impl AuctionRegistry {
    /// 레지스트리 생성
    pub async fn new() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("Failed to create pool");
        Self {
            pool: Arc::new(pool),
        }
    }

    /// 풀 가져오기
    pub fn get_pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    /// 스키마 초기화. recreate 는 기존 테이블을 전부 버린다 (개발용).
    pub async fn initialize_database(&self, recreate: bool) -> Result<(), sqlx::Error> {
        if recreate {
            let recreate_db_sql = include_str!("../sql/00-recreate-db.sql");
            self.execute_multi_query(recreate_db_sql).await?;
        }

        let create_schema_sql = include_str!("../sql/01-create-schema.sql");
        self.execute_multi_query(create_schema_sql).await?;

        Ok(())
    }

    /// 여러 쿼리 실행
    async fn execute_multi_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        for query in sql.split(';') {
            let query = query.trim();
            if !query.is_empty() {
                sqlx::query(query).execute(&*self.pool).await?;
            }
        }
        Ok(())
    }
}
// endregion: --- AuctionRegistry

// region:    --- Auction Ops
/// 경매 조회
pub async fn load_auction(pool: &PgPool, auction_id: i64) -> Result<Auction, EngineError> {
    sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
        .bind(auction_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::NotFound("auction"))
}

/// 경매 조회 (행 잠금, 트랜잭션 내)
pub async fn load_auction_for_update(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
) -> Result<Auction, EngineError> {
    sqlx::query_as::<_, Auction>(queries::GET_AUCTION_FOR_UPDATE)
        .bind(auction_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(EngineError::NotFound("auction"))
}

/// 경매 생성
#[allow(clippy::too_many_arguments)]
pub async fn insert_auction(
    pool: &PgPool,
    listing_id: i64,
    seller_id: i64,
    auction_type: &str,
    allowed_min_bid: i64,
    allowed_max_bid: i64,
    reserve_price: Option<i64>,
    min_increment: i64,
    buy_it_now: Option<i64>,
    soft_close_trigger_sec: i32,
    soft_close_extend_sec: i32,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    is_anonymous: bool,
) -> Result<Auction, EngineError> {
    let auction = sqlx::query_as::<_, Auction>(queries::INSERT_AUCTION)
        .bind(listing_id)
        .bind(seller_id)
        .bind(auction_type)
        .bind(AuctionStatus::Draft.as_str())
        .bind(allowed_min_bid)
        .bind(allowed_max_bid)
        .bind(reserve_price)
        .bind(min_increment)
        .bind(buy_it_now)
        .bind(soft_close_trigger_sec)
        .bind(soft_close_extend_sec)
        .bind(start_at)
        .bind(end_at)
        .bind(is_anonymous)
        .fetch_one(pool)
        .await?;
    Ok(auction)
}

/// 경매 가변 필드 저장 (트랜잭션 내)
pub async fn save_auction(
    tx: &mut Transaction<'_, Postgres>,
    auction: &Auction,
) -> Result<(), EngineError> {
    sqlx::query(queries::UPDATE_AUCTION)
        .bind(auction.auction_id)
        .bind(&auction.status_code)
        .bind(auction.current_price)
        .bind(auction.highest_bidder_id)
        .bind(auction.reserve_met)
        .bind(auction.extended_until)
        .bind(auction.extension_count)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// 마감 예정 경매 목록
pub async fn list_due_active(
    pool: &PgPool,
    before: DateTime<Utc>,
) -> Result<Vec<Auction>, EngineError> {
    let auctions = sqlx::query_as::<_, Auction>(queries::LIST_DUE_ACTIVE)
        .bind(before)
        .fetch_all(pool)
        .await?;
    Ok(auctions)
}

/// 시작 시간이 지난 draft 목록
pub async fn list_due_draft(
    pool: &PgPool,
    before: DateTime<Utc>,
) -> Result<Vec<Auction>, EngineError> {
    let auctions = sqlx::query_as::<_, Auction>(queries::LIST_DUE_DRAFT)
        .bind(before)
        .fetch_all(pool)
        .await?;
    Ok(auctions)
}

/// 진행 중 경매 목록
pub async fn list_open_auctions(pool: &PgPool) -> Result<Vec<Auction>, EngineError> {
    let auctions = sqlx::query_as::<_, Auction>(queries::LIST_OPEN_AUCTIONS)
        .fetch_all(pool)
        .await?;
    Ok(auctions)
}

/// 경매 목록 (선택적 상태 필터, 최신순)
pub async fn list_auctions(
    pool: &PgPool,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<Auction>, EngineError> {
    let auctions = match status {
        Some(status) => {
            sqlx::query_as::<_, Auction>(queries::LIST_AUCTIONS_BY_STATUS)
                .bind(status)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as::<_, Auction>(queries::LIST_AUCTIONS)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(auctions)
}
// endregion: --- Auction Ops

// region:    --- Bid Ops
/// 입찰 기록 생성 (트랜잭션 내)
#[allow(clippy::too_many_arguments)]
pub async fn insert_bid(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
    bidder_id: i64,
    amount: i64,
    client_seq: i64,
    source_ip_hash: &[u8],
    user_agent_hash: &[u8],
    accepted: bool,
    reject_reason: Option<&str>,
    max_proxy_amount: Option<i64>,
    is_winning: bool,
    is_visible: bool,
) -> Result<Bid, EngineError> {
    let bid = sqlx::query_as::<_, Bid>(queries::INSERT_BID)
        .bind(auction_id)
        .bind(bidder_id)
        .bind(amount)
        .bind(client_seq)
        .bind(source_ip_hash)
        .bind(user_agent_hash)
        .bind(accepted)
        .bind(reject_reason)
        .bind(max_proxy_amount)
        .bind(is_winning)
        .bind(is_visible)
        .fetch_one(&mut **tx)
        .await?;
    Ok(bid)
}

/// 멱등성 조회 (잠금 없이). 커밋된 이전 결과는 불변이라 그대로 재생해도 된다.
pub async fn find_prior_bid(
    pool: &PgPool,
    auction_id: i64,
    bidder_id: i64,
    client_seq: i64,
) -> Result<Option<Bid>, EngineError> {
    let bid = sqlx::query_as::<_, Bid>(queries::GET_BID_BY_CLIENT_SEQ)
        .bind(auction_id)
        .bind(bidder_id)
        .bind(client_seq)
        .fetch_optional(pool)
        .await?;
    Ok(bid)
}

/// 멱등성 조회 (트랜잭션 내)
pub async fn find_bid_by_client_seq(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
    bidder_id: i64,
    client_seq: i64,
) -> Result<Option<Bid>, EngineError> {
    let bid = sqlx::query_as::<_, Bid>(queries::GET_BID_BY_CLIENT_SEQ)
        .bind(auction_id)
        .bind(bidder_id)
        .bind(client_seq)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(bid)
}

/// 최근 입찰 존재 여부 (빈도 제한, 잠금 없이)
pub async fn has_recent_bid(
    pool: &PgPool,
    auction_id: i64,
    bidder_id: i64,
    since: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let present = sqlx::query_scalar::<_, bool>(queries::HAS_RECENT_BID)
        .bind(auction_id)
        .bind(bidder_id)
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(present)
}

/// 영국식: 기존 최고 입찰 플래그 해제 (트랜잭션 내)
pub async fn clear_winning_flags(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
) -> Result<(), EngineError> {
    sqlx::query(queries::CLEAR_WINNING_FLAGS)
        .bind(auction_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// 마감 순위 계산 대상 입찰 (트랜잭션 내)
pub async fn list_bids_for_finalize(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
) -> Result<Vec<Bid>, EngineError> {
    let bids = sqlx::query_as::<_, Bid>(queries::LIST_BIDS_FOR_FINALIZE)
        .bind(auction_id)
        .fetch_all(&mut **tx)
        .await?;
    Ok(bids)
}

/// 마감 순위 기록 (트랜잭션 내)
pub async fn set_final_rank(
    tx: &mut Transaction<'_, Postgres>,
    bid_id: i64,
    rank: i32,
) -> Result<(), EngineError> {
    sqlx::query(queries::SET_FINAL_RANK)
        .bind(bid_id)
        .bind(rank)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// 유효 입찰 전체 (수락 + 미삭제, 히스토그램 계산용)
pub async fn list_valid_bids(pool: &PgPool, auction_id: i64) -> Result<Vec<Bid>, EngineError> {
    let bids = sqlx::query_as::<_, Bid>(queries::LIST_BIDS_FOR_FINALIZE)
        .bind(auction_id)
        .fetch_all(pool)
        .await?;
    Ok(bids)
}

/// 타인에게 보이는 입찰 이력
pub async fn list_visible_bids(pool: &PgPool, auction_id: i64) -> Result<Vec<Bid>, EngineError> {
    let bids = sqlx::query_as::<_, Bid>(queries::LIST_VISIBLE_BIDS)
        .bind(auction_id)
        .fetch_all(pool)
        .await?;
    Ok(bids)
}

/// 본인 입찰 이력
pub async fn list_own_bids(
    pool: &PgPool,
    auction_id: i64,
    bidder_id: i64,
) -> Result<Vec<Bid>, EngineError> {
    let bids = sqlx::query_as::<_, Bid>(queries::LIST_OWN_BIDS)
        .bind(auction_id)
        .bind(bidder_id)
        .fetch_all(pool)
        .await?;
    Ok(bids)
}

/// 종료 후 결과 (순위 확정분)
pub async fn list_ranked_bids(pool: &PgPool, auction_id: i64) -> Result<Vec<Bid>, EngineError> {
    let bids = sqlx::query_as::<_, Bid>(queries::LIST_RANKED_BIDS)
        .bind(auction_id)
        .fetch_all(pool)
        .await?;
    Ok(bids)
}

/// 입찰 소프트 삭제. 삭제된 행 수 반환.
pub async fn soft_delete_bid(
    pool: &PgPool,
    bid_id: i64,
    operator_id: i64,
) -> Result<u64, EngineError> {
    let result = sqlx::query(queries::SOFT_DELETE_BID)
        .bind(bid_id)
        .bind(operator_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
// endregion: --- Bid Ops

// region:    --- Alias Ops
/// 별칭 조회
pub async fn find_alias(
    pool: &PgPool,
    auction_id: i64,
    bidder_id: i64,
) -> Result<Option<BidderAlias>, EngineError> {
    let alias = sqlx::query_as::<_, BidderAlias>(queries::GET_ALIAS)
        .bind(auction_id)
        .bind(bidder_id)
        .fetch_optional(pool)
        .await?;
    Ok(alias)
}

/// 경매의 별칭 전체
pub async fn list_aliases(pool: &PgPool, auction_id: i64) -> Result<Vec<BidderAlias>, EngineError> {
    let aliases = sqlx::query_as::<_, BidderAlias>(queries::LIST_ALIASES)
        .bind(auction_id)
        .fetch_all(pool)
        .await?;
    Ok(aliases)
}

/// 마감 시 밀봉 입찰 공개 (트랜잭션 내)
pub async fn reveal_bids(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
) -> Result<(), EngineError> {
    sqlx::query(queries::REVEAL_BIDS)
        .bind(auction_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// 별칭 확보 (없으면 max+1 번호로 할당, 트랜잭션 내)
pub async fn upsert_alias(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
    bidder_id: i64,
) -> Result<BidderAlias, EngineError> {
    if let Some(existing) = sqlx::query_as::<_, BidderAlias>(queries::GET_ALIAS)
        .bind(auction_id)
        .bind(bidder_id)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(existing);
    }

    let next: i32 = sqlx::query_scalar(queries::NEXT_ALIAS_NUM)
        .bind(auction_id)
        .fetch_one(&mut **tx)
        .await?;

    let alias = sqlx::query_as::<_, BidderAlias>(queries::INSERT_ALIAS)
        .bind(auction_id)
        .bind(bidder_id)
        .bind(next)
        .bind(alias_label(next))
        .fetch_one(&mut **tx)
        .await?;
    Ok(alias)
}
// endregion: --- Alias Ops

// region:    --- History / Event Ops
/// 상태 전이 이력 기록 (트랜잭션 내)
pub async fn record_status_transition(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
    from_status: &str,
    to_status: &str,
    reason: &str,
    operator_id: Option<i64>,
) -> Result<(), EngineError> {
    sqlx::query(queries::INSERT_STATUS_HISTORY)
        .bind(auction_id)
        .bind(from_status)
        .bind(to_status)
        .bind(reason)
        .bind(operator_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// 상태 전이 이력 조회
pub async fn list_status_history(
    pool: &PgPool,
    auction_id: i64,
) -> Result<Vec<StatusHistory>, EngineError> {
    let rows = sqlx::query_as::<_, StatusHistory>(queries::LIST_STATUS_HISTORY)
        .bind(auction_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// 이벤트 추가, 할당된 event_id 반환 (트랜잭션 내)
pub async fn append_event(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
    event_type: EventType,
    actor_user_id: Option<i64>,
    payload: Option<serde_json::Value>,
) -> Result<i64, EngineError> {
    let event_id: i64 = sqlx::query_scalar(queries::INSERT_EVENT)
        .bind(auction_id)
        .bind(event_type.as_str())
        .bind(actor_user_id)
        .bind(payload)
        .fetch_one(&mut **tx)
        .await?;
    Ok(event_id)
}

/// 재접속 리플레이 대상 이벤트
pub async fn list_events_after(
    pool: &PgPool,
    auction_id: i64,
    last_event_id: i64,
    cap: i64,
) -> Result<Vec<AuctionEvent>, EngineError> {
    let events = sqlx::query_as::<_, AuctionEvent>(queries::LIST_EVENTS_AFTER)
        .bind(auction_id)
        .bind(last_event_id)
        .bind(cap)
        .fetch_all(pool)
        .await?;
    Ok(events)
}

/// 보존 구간 시작 이벤트 (없으면 None)
pub async fn oldest_event_id(pool: &PgPool, auction_id: i64) -> Result<Option<i64>, EngineError> {
    let oldest: Option<i64> = sqlx::query_scalar(queries::OLDEST_EVENT_ID)
        .bind(auction_id)
        .fetch_one(pool)
        .await?;
    Ok(oldest)
}

/// 사용자의 저장된 재접속 오프셋
pub async fn get_stream_offset(
    pool: &PgPool,
    auction_id: i64,
    user_id: i64,
) -> Result<Option<StreamOffset>, EngineError> {
    let offset = sqlx::query_as::<_, StreamOffset>(queries::GET_STREAM_OFFSET)
        .bind(auction_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(offset)
}

/// 재접속 오프셋 upsert
pub async fn upsert_stream_offset(
    pool: &PgPool,
    auction_id: i64,
    user_id: i64,
    last_event_id: i64,
) -> Result<(), EngineError> {
    sqlx::query(queries::UPSERT_STREAM_OFFSET)
        .bind(auction_id)
        .bind(user_id)
        .bind(last_event_id)
        .execute(pool)
        .await?;
    Ok(())
}
// endregion: --- History / Event Ops

// region:    --- Blacklist / Notification / Histogram Ops
/// 블랙리스트 활성 여부
pub async fn is_blacklisted(pool: &PgPool, user_id: i64) -> Result<bool, EngineError> {
    let present = sqlx::query_scalar::<_, bool>(queries::IS_BLACKLISTED)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(present)
}

/// 블랙리스트 upsert
pub async fn upsert_blacklist(
    pool: &PgPool,
    user_id: i64,
    is_active: bool,
    reason: Option<&str>,
    staff_id: i64,
) -> Result<(), EngineError> {
    sqlx::query(queries::UPSERT_BLACKLIST)
        .bind(user_id)
        .bind(is_active)
        .bind(reason)
        .bind(staff_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// 활성 블랙리스트 목록
pub async fn list_blacklist(pool: &PgPool) -> Result<Vec<BlacklistEntry>, EngineError> {
    let entries = sqlx::query_as::<_, BlacklistEntry>(queries::LIST_BLACKLIST)
        .fetch_all(pool)
        .await?;
    Ok(entries)
}

/// 경매의 통지 기록
pub async fn list_notifications(
    pool: &PgPool,
    auction_id: i64,
) -> Result<Vec<NotificationLog>, EngineError> {
    let rows = sqlx::query_as::<_, NotificationLog>(queries::LIST_NOTIFICATIONS)
        .bind(auction_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// 통지 기록 생성. 이미 존재하면 false (at-most-once).
pub async fn insert_notification(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
    user_id: i64,
    kind: NotificationKind,
    meta: serde_json::Value,
) -> Result<bool, EngineError> {
    let inserted: Option<i64> = sqlx::query_scalar(queries::INSERT_NOTIFICATION)
        .bind(auction_id)
        .bind(user_id)
        .bind(kind.as_str())
        .bind("email")
        .bind(meta)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(inserted.is_some())
}

/// 히스토그램 버킷 저장
pub async fn insert_histogram_bucket(
    pool: &PgPool,
    auction_id: i64,
    bucket_low: i64,
    bucket_high: i64,
    computed_at: DateTime<Utc>,
    bid_count: i32,
) -> Result<(), EngineError> {
    sqlx::query(queries::INSERT_HISTOGRAM_BUCKET)
        .bind(auction_id)
        .bind(bucket_low)
        .bind(bucket_high)
        .bind(computed_at)
        .bind(bid_count)
        .execute(pool)
        .await?;
    Ok(())
}

/// 최신 스냅샷의 k-익명 버킷 조회
pub async fn list_histogram_buckets(
    pool: &PgPool,
    auction_id: i64,
    min_count: i64,
) -> Result<Vec<HistogramBucket>, EngineError> {
    let buckets = sqlx::query_as::<_, HistogramBucket>(queries::LIST_HISTOGRAM_BUCKETS)
        .bind(auction_id)
        .bind(min_count)
        .fetch_all(pool)
        .await?;
    Ok(buckets)
}
// endregion: --- Blacklist / Notification / Histogram Ops
