/// 종료 통지 적재
/// (auction, user, kind) 유니크 키로 최대 1회만 기록된다. 실제 발송은
/// 다운스트림 프로세스 몫이고 엔진은 queued 상태로만 남긴다.
// region:    --- Imports
use sqlx::PgPool;
use tracing::{error, info};

use crate::domain::{Auction, Bid, EventType, NotificationKind};
use crate::error::EngineError;
use crate::registry;

// endregion: --- Imports

// region:    --- Enqueue
/// 순위 -> 통지 유형 매핑: 1위 winner, 2..K top7, 그 밖은 participant_end
pub fn kind_for_rank(rank: i32, top_k: i64) -> NotificationKind {
    if rank == 1 {
        NotificationKind::Winner
    } else if (rank as i64) <= top_k {
        NotificationKind::Top7
    } else {
        NotificationKind::ParticipantEnd
    }
}

fn meta_for_kind(kind: NotificationKind, auction_id: i64, rank: Option<i32>) -> serde_json::Value {
    let (title, message) = match kind {
        NotificationKind::Winner => ("낙찰 안내", "축하합니다. 낙찰되었습니다."),
        NotificationKind::Top7 => ("경매 결과 안내", "상위 입찰자로 마감되었습니다."),
        NotificationKind::ParticipantEnd => ("경매 종료 안내", "참여해 주셔서 감사합니다."),
        NotificationKind::SellerResult => ("경매 종료 안내", "등록하신 경매가 종료되었습니다."),
    };
    serde_json::json!({
        "auction_id": auction_id,
        "kind": kind.as_str(),
        "rank": rank,
        "title": title,
        "message": message,
    })
}

/// 단건 적재 + notified 이벤트. 이미 있으면 조용히 지나간다.
async fn queue_notification(
    pool: &PgPool,
    auction_id: i64,
    user_id: i64,
    kind: NotificationKind,
    rank: Option<i32>,
) -> Result<(), EngineError> {
    let mut tx = pool.begin().await?;

    let inserted = registry::insert_notification(
        &mut tx,
        auction_id,
        user_id,
        kind,
        meta_for_kind(kind, auction_id, rank),
    )
    .await?;

    if inserted {
        registry::append_event(
            &mut tx,
            auction_id,
            EventType::Notified,
            Some(user_id),
            Some(serde_json::json!({ "notification_kind": kind.as_str(), "user_id": user_id })),
        )
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// 마감된 경매의 결과 통지 일괄 적재
/// ranked_bids 는 final_rank 확정분이어야 한다. 개별 실패는 기록 후 계속 간다.
pub async fn enqueue_auction_end(
    pool: &PgPool,
    auction: &Auction,
    ranked_bids: &[Bid],
    top_k: i64,
) -> Result<(), EngineError> {
    info!(
        "{:<12} --> 종료 통지 적재 시작: auction={}, bids={}",
        "Notify",
        auction.auction_id,
        ranked_bids.len()
    );

    // 판매자 통지
    if let Err(e) = queue_notification(
        pool,
        auction.auction_id,
        auction.seller_id,
        NotificationKind::SellerResult,
        None,
    )
    .await
    {
        error!("{:<12} --> 판매자 통지 적재 실패: {:?}", "Notify", e);
    }

    // 입찰자 통지 (순위별)
    for bid in ranked_bids {
        let Some(rank) = bid.final_rank else { continue };
        let kind = kind_for_rank(rank, top_k);
        if let Err(e) =
            queue_notification(pool, auction.auction_id, bid.bidder_id, kind, Some(rank)).await
        {
            error!(
                "{:<12} --> 통지 적재 실패: auction={}, user={}, kind={}, {:?}",
                "Notify",
                auction.auction_id,
                bid.bidder_id,
                kind.as_str(),
                e
            );
        }
    }

    info!(
        "{:<12} --> 종료 통지 적재 완료: auction={}",
        "Notify", auction.auction_id
    );
    Ok(())
}
// endregion: --- Enqueue

// endregion: --- Tests
