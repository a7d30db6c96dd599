/// 마감 워커
/// 주기적으로 시작 시간이 지난 draft 를 활성화하고, 유효 종료 시각이 지난
/// 경매를 마감해 순위를 확정하고 통지를 적재한다. 경매 단위로 독립 처리하며
/// 개별 실패는 기록 후 다음으로 넘어간다. 전이는 트랜잭션이고 통지는 유니크
/// 키로 중복이 막혀 있어 재실행에 안전하다.
// region:    --- Imports
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::domain::Bid;
use crate::error::EngineError;
use crate::hub::messages::{MessageKind, OutboundMessage};
use crate::hub::Hub;
use crate::lifecycle;
use crate::notify;
use crate::registry;

// endregion: --- Imports

// region:    --- FinalizationWorker
pub struct FinalizationWorker {
    pool: Arc<PgPool>,
    config: Arc<Config>,
    hub: Arc<Hub>,
}

impl FinalizationWorker {
    pub fn new(pool: Arc<PgPool>, config: Arc<Config>, hub: Arc<Hub>) -> Self {
        Self { pool, config, hub }
    }

    /// 워커 시작
    pub async fn start(&self) {
        let pool = Arc::clone(&self.pool);
        let config = Arc::clone(&self.config);
        let hub = Arc::clone(&self.hub);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(config.finalization_interval_sec));
            loop {
                ticker.tick().await;
                if let Err(e) = Self::tick(&pool, &config, &hub).await {
                    error!("{:<12} --> 워커 틱 오류: {:?}", "Worker", e);
                }
            }
        });
    }

    /// 한 주기: 자동 활성화 -> 마감 -> 히스토그램 갱신
    async fn tick(pool: &PgPool, config: &Config, hub: &Hub) -> Result<(), EngineError> {
        let now = Utc::now();

        // 1. 시작 시간이 지난 draft 활성화
        let due_drafts = registry::list_due_draft(pool, now).await?;
        for auction in due_drafts {
            match lifecycle::activate_transition(
                pool,
                auction.auction_id,
                "Auto-activated (start time reached)",
                None,
            )
            .await
            {
                Ok((activated, event_id)) => {
                    lifecycle::broadcast_state(hub, &activated, event_id).await;
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 자동 활성화 실패: auction={}, {:?}",
                        "Worker", auction.auction_id, e
                    );
                }
            }
        }

        // 2. 유효 종료 시각이 지난 경매 마감
        let due = registry::list_due_active(pool, now).await?;
        if !due.is_empty() {
            info!("{:<12} --> 마감 대상 {}건", "Worker", due.len());
        }

        for auction in due {
            if let Err(e) = finalize_and_notify(
                pool,
                config,
                hub,
                auction.auction_id,
                "Finalized by system job",
                None,
            )
            .await
            {
                error!(
                    "{:<12} --> 마감 실패: auction={}, {:?}",
                    "Worker", auction.auction_id, e
                );
            }
        }

        // 3. 진행 중 경매의 입찰 분포 스냅샷 갱신
        if let Err(e) = Self::refresh_histograms(pool).await {
            error!("{:<12} --> 히스토그램 갱신 실패: {:?}", "Worker", e);
        }

        debug!("{:<12} --> 주기 처리 완료", "Worker");
        Ok(())
    }

    /// 진행 중 경매별 히스토그램 스냅샷 기록
    async fn refresh_histograms(pool: &PgPool) -> Result<(), EngineError> {
        let open = registry::list_open_auctions(pool).await?;
        let computed_at = Utc::now();

        for auction in open {
            let bids = registry::list_valid_bids(pool, auction.auction_id).await?;
            let buckets = compute_buckets(
                auction.allowed_min_bid,
                auction.allowed_max_bid,
                &bids,
                HISTOGRAM_BUCKETS,
            );

            for (low, high, count) in buckets {
                registry::insert_histogram_bucket(
                    pool,
                    auction.auction_id,
                    low,
                    high,
                    computed_at,
                    count,
                )
                .await?;
            }
        }
        Ok(())
    }
}

/// 마감 한 사이클: 전이 -> 마감 공지 -> 통지 적재
/// 워커와 관리자 수동 마감이 같은 경로를 쓴다. 이미 종결된 경매면 false.
pub async fn finalize_and_notify(
    pool: &PgPool,
    config: &Config,
    hub: &Hub,
    auction_id: i64,
    reason: &str,
    operator_id: Option<i64>,
) -> Result<bool, EngineError> {
    let summary = match lifecycle::finalize_auction(pool, auction_id, reason, operator_id).await? {
        Some(summary) => summary,
        None => return Ok(false),
    };

    let message = OutboundMessage::new(
        MessageKind::Closed,
        serde_json::json!({
            "ended_at": summary.ended_at,
            "winner_rank": if summary.ranked_bids.is_empty() { 0 } else { 1 },
            "total_bids": summary.ranked_bids.len(),
        }),
    )
    .with_event_id(summary.event_id);
    hub.broadcast_room(auction_id, message, None).await;

    // 통지는 유니크 키로 멱등이라 재실행에 안전하다
    if let Err(e) = notify::enqueue_auction_end(
        pool,
        &summary.auction,
        &summary.ranked_bids,
        config.notification_top_k,
    )
    .await
    {
        error!(
            "{:<12} --> 통지 적재 실패: auction={}, {:?}",
            "Worker", auction_id, e
        );
    }

    Ok(true)
}
// endregion: --- FinalizationWorker

// region:    --- Histogram
const HISTOGRAM_BUCKETS: i64 = 10;

/// 허용 범위를 균등 버킷으로 나눠 입찰 수를 센다
pub fn compute_buckets(
    min: i64,
    max: i64,
    bids: &[Bid],
    bucket_count: i64,
) -> Vec<(i64, i64, i32)> {
    if max <= min || bucket_count <= 0 {
        return Vec::new();
    }

    let range = max - min;
    let bucket_size = std::cmp::max(1, range / bucket_count);
    let mut counts = vec![0i32; bucket_count as usize];

    for bid in bids {
        if bid.amount < min || bid.amount > max {
            continue;
        }
        let mut idx = ((bid.amount - min) / bucket_size) as usize;
        if idx >= bucket_count as usize {
            idx = bucket_count as usize - 1;
        }
        counts[idx] += 1;
    }

    (0..bucket_count)
        .map(|i| {
            let low = min + i * bucket_size;
            let high = if i == bucket_count - 1 {
                max
            } else {
                low + bucket_size
            };
            (low, high, counts[i as usize])
        })
        .collect()
}
// endregion: --- Histogram

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bid(amount: i64) -> Bid {
        Bid {
            bid_id: 1,
            auction_id: 1,
            bidder_id: 1,
            amount,
            client_seq: 1,
            source_ip_hash: None,
            user_agent_hash: None,
            accepted: true,
            reject_reason: None,
            final_rank: None,
            max_proxy_amount: None,
            is_winning: false,
            is_visible: false,
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_compute_buckets_counts() {
        let bids: Vec<Bid> = vec![
            bid(1000), bid(1001), bid(1500), bid(5500), bid(10000),
        ];
        let buckets = compute_buckets(1000, 10000, &bids, 10);
        assert_eq!(buckets.len(), 10);

        // 첫 버킷 [1000, 1900): 1000, 1001, 1500
        assert_eq!(buckets[0], (1000, 1900, 3));
        // 상한 금액은 마지막 버킷으로
        let last = buckets.last().unwrap();
        assert_eq!(last.1, 10000);
        assert_eq!(last.2, 1);

        let total: i32 = buckets.iter().map(|b| b.2).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_compute_buckets_ignores_out_of_range() {
        let bids = vec![bid(500), bid(20000), bid(1500)];
        let buckets = compute_buckets(1000, 10000, &bids, 10);
        let total: i32 = buckets.iter().map(|b| b.2).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_compute_buckets_degenerate_range() {
        assert!(compute_buckets(1000, 1000, &[], 10).is_empty());
        assert!(compute_buckets(2000, 1000, &[], 10).is_empty());
    }
}
// endregion: --- Tests
