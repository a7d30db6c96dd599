/// 입찰 승인 엔진
/// 경매 행 잠금(SELECT ... FOR UPDATE) 아래에서 검증 캐스케이드를 실행하고,
/// 커밋 후에만 세션 허브로 방송을 넘긴다. 8~11단계 사이의 실패는 전부 롤백된다.
// region:    --- Imports
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{Auction, AuctionStatus, Bid, EventType};
use crate::error::EngineError;
use crate::hub::messages::{BroadcastIntent, MessageKind, OutboundMessage};
use crate::hub::Hub;
use crate::registry;

pub mod outcome;

use outcome::{BidOutcome, EnglishState, PriorOutcome, RejectHints, RejectReason, SoftCloseInfo};

// endregion: --- Imports

// region:    --- Types
/// 승인 소프트 데드라인
const ADMISSION_DEADLINE: std::time::Duration = std::time::Duration::from_secs(2);

/// 입찰 제출 요청
#[derive(Debug, Clone)]
pub struct SubmitBid {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub client_seq: i64,
    pub source_ip_hash: [u8; 32],
    pub user_agent_hash: [u8; 32],
}

/// 감사용 32바이트 다이제스트 (원문은 저장하지 않는다)
pub fn fingerprint(input: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize().into()
}

impl From<Bid> for PriorOutcome {
    fn from(bid: Bid) -> Self {
        PriorOutcome {
            bid_id: bid.bid_id,
            accepted: bid.accepted,
            reject_reason: bid.reject_reason,
            created_at: bid.created_at,
        }
    }
}
// endregion: --- Types

// region:    --- BidEngine
pub struct BidEngine {
    pool: Arc<PgPool>,
    config: Arc<Config>,
    hub: Arc<Hub>,
}

impl BidEngine {
    pub fn new(pool: Arc<PgPool>, config: Arc<Config>, hub: Arc<Hub>) -> Arc<Self> {
        Arc::new(Self { pool, config, hub })
    }

    /// 입찰 제출
    pub async fn submit_bid(&self, req: SubmitBid) -> Result<BidOutcome, EngineError> {
        info!(
            "{:<12} --> 입찰 요청: auction={}, bidder={}, amount={}, seq={}",
            "Engine", req.auction_id, req.bidder_id, req.amount, req.client_seq
        );
        let now = Utc::now();

        if req.amount < 0 {
            return Ok(BidOutcome::Rejected {
                reason: RejectReason::InvalidAmount,
                server_time: now,
                hints: None,
            });
        }

        // 재시도 재생은 빈도 제한보다 먼저 본다. 커밋된 이전 결과는 불변이다.
        if let Some(prior) =
            registry::find_prior_bid(&self.pool, req.auction_id, req.bidder_id, req.client_seq)
                .await?
        {
            return Ok(BidOutcome::DuplicateReplay {
                prior_outcome: prior.into(),
                server_time: now,
            });
        }

        // 강하 단계 4: 신규 입찰은 받지 않는다. 재시도 가능한 busy 로 응답하고,
        // 이미 커밋된 입찰의 재전송은 위의 멱등 재생으로 계속 통과한다.
        if self.hub.degradation.current_level() >= 4 {
            warn!(
                "{:<12} --> 과부하, 신규 입찰 거부: auction={}, bidder={}",
                "Engine", req.auction_id, req.bidder_id
            );
            return Err(EngineError::RateLimited);
        }

        // 1. 잠금 전 검사: 블랙리스트, 입찰 빈도
        if registry::is_blacklisted(&self.pool, req.bidder_id).await? {
            return Ok(BidOutcome::Rejected {
                reason: RejectReason::Blacklisted,
                server_time: now,
                hints: None,
            });
        }

        let cooldown = self.config.bid_rate_limit_seconds;
        let since = now - Duration::seconds(cooldown);
        if registry::has_recent_bid(&self.pool, req.auction_id, req.bidder_id, since).await? {
            return Ok(BidOutcome::Rejected {
                reason: RejectReason::TooFrequent,
                server_time: now,
                hints: Some(RejectHints {
                    cooldown_seconds: Some(cooldown),
                    ..Default::default()
                }),
            });
        }

        // 2~12. 행 잠금 구간은 소프트 데드라인 아래에서 실행
        // 스토리지 오류는 데드라인 내에서 1회 재시도 후 service_unavailable 로 표면화.
        // 첫 시도가 커밋까지 갔다면 재시도는 멱등 재생으로 끝난다.
        let locked = timeout(ADMISSION_DEADLINE, async {
            match self.submit_bid_locked(&req, now).await {
                Err(EngineError::StorageUnavailable(detail)) => {
                    warn!(
                        "{:<12} --> 스토리지 오류, 재시도: auction={}, {}",
                        "Engine", req.auction_id, detail
                    );
                    self.submit_bid_locked(&req, now).await.map_err(|e| match e {
                        EngineError::StorageUnavailable(_) => EngineError::ServiceUnavailable,
                        other => other,
                    })
                }
                other => other,
            }
        })
        .await;

        let (outcome, dispatches) = match locked {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "{:<12} --> 승인 데드라인 초과: auction={}",
                    "Engine", req.auction_id
                );
                return Err(EngineError::StorageUnavailable(
                    "admission deadline exceeded".to_string(),
                ));
            }
        };

        // 커밋 이후에만 방송
        for intent in dispatches {
            self.hub.publish(intent).await;
        }

        Ok(outcome)
    }

    /// 잠금 구간: 재로드, 멱등성, 상태/기한/범위 검증, 연장, 기록
    async fn submit_bid_locked(
        &self,
        req: &SubmitBid,
        now: DateTime<Utc>,
    ) -> Result<(BidOutcome, Vec<BroadcastIntent>), EngineError> {
        let mut tx = self.pool.begin().await?;

        // 3. 잠금 하 재로드
        let mut auction = registry::load_auction_for_update(&mut tx, req.auction_id).await?;

        // 4. 멱등성: 동일 (auction, bidder, client_seq) 는 이전 결과 그대로
        if let Some(prior) =
            registry::find_bid_by_client_seq(&mut tx, req.auction_id, req.bidder_id, req.client_seq)
                .await?
        {
            tx.rollback().await?;
            info!(
                "{:<12} --> 멱등 재생: auction={}, bidder={}, seq={}",
                "Engine", req.auction_id, req.bidder_id, req.client_seq
            );
            return Ok((
                BidOutcome::DuplicateReplay {
                    prior_outcome: prior.into(),
                    server_time: now,
                },
                Vec::new(),
            ));
        }

        // 5. 상태 / 기한 검사
        if !auction.is_open() {
            tx.rollback().await?;
            return Ok((
                BidOutcome::Rejected {
                    reason: RejectReason::AuctionNotActive,
                    server_time: now,
                    hints: None,
                },
                Vec::new(),
            ));
        }
        if now > auction.effective_end() {
            tx.rollback().await?;
            return Ok((
                BidOutcome::Rejected {
                    reason: RejectReason::TooLate,
                    server_time: now,
                    hints: None,
                },
                Vec::new(),
            ));
        }

        // 6. 허용 범위 검사
        if !auction.amount_in_range(req.amount) {
            return self
                .reject_with_audit(
                    tx,
                    req,
                    now,
                    RejectReason::OutOfRange,
                    RejectHints {
                        allowed_min_bid: Some(auction.allowed_min_bid),
                        allowed_max_bid: Some(auction.allowed_max_bid),
                        ..Default::default()
                    },
                )
                .await;
        }

        // 7. 영국식 최소 다음 입찰가 검사
        if auction.is_english() {
            let min_next = auction.min_next_bid();
            if req.amount < min_next {
                return self
                    .reject_with_audit(
                        tx,
                        req,
                        now,
                        RejectReason::UnderMinimum,
                        RejectHints {
                            min_next_bid: Some(min_next),
                            ..Default::default()
                        },
                    )
                    .await;
            }
        }

        // 8. 소프트 클로즈 평가
        let prev_status = auction.status();
        let soft_closed = auction.apply_soft_close(now);

        // 9. 영국식: 최고 입찰 이관 + 현재가 갱신
        let prev_highest = auction.highest_bidder_id;
        let was_reserve_met = auction.reserve_met;
        if auction.is_english() {
            registry::clear_winning_flags(&mut tx, req.auction_id).await?;
            auction.update_current_price(req.amount, req.bidder_id);
        }

        registry::save_auction(&mut tx, &auction).await?;
        if soft_closed && prev_status == AuctionStatus::Active {
            registry::record_status_transition(
                &mut tx,
                req.auction_id,
                AuctionStatus::Active.as_str(),
                AuctionStatus::Extended.as_str(),
                "Extended due to bid in soft-close window",
                None,
            )
            .await?;
        }

        let bid = registry::insert_bid(
            &mut tx,
            req.auction_id,
            req.bidder_id,
            req.amount,
            req.client_seq,
            &req.source_ip_hash,
            &req.user_agent_hash,
            true,
            None,
            None,
            auction.is_english(),
            auction.is_english(),
        )
        .await?;

        // 10. 익명 경매 별칭 확보
        let alias = if auction.is_anonymous {
            Some(registry::upsert_alias(&mut tx, req.auction_id, req.bidder_id).await?)
        } else {
            None
        };
        let alias_label = alias.as_ref().map(|a| a.alias_label.clone());

        // 11. 이벤트 기록: bid_accepted, 연장 시 extended
        // 밀봉 경매의 수락 이벤트 페이로드에는 금액/신원을 싣지 않는다 (리플레이 경로 보호)
        let accepted_payload = if auction.is_english() {
            serde_json::json!({
                "current_price": auction.current_price,
                "min_next_bid": auction.min_next_bid(),
                "reserve_met": auction.reserve_met,
                "highest_bidder_alias": alias_label,
            })
        } else {
            serde_json::json!({})
        };
        let event_id = registry::append_event(
            &mut tx,
            req.auction_id,
            EventType::BidAccepted,
            Some(req.bidder_id),
            Some(accepted_payload),
        )
        .await?;

        let mut extend_event_id = None;
        if soft_closed {
            let id = registry::append_event(
                &mut tx,
                req.auction_id,
                EventType::Extended,
                None,
                Some(serde_json::json!({
                    "extended_until": auction.extended_until,
                    "extension_count": auction.extension_count,
                })),
            )
            .await?;
            extend_event_id = Some(id);
        }

        // 12. 커밋
        tx.commit().await?;

        let english_state = if auction.is_english() {
            Some(EnglishState {
                current_price: auction.current_price.unwrap_or(req.amount),
                min_next_bid: auction.min_next_bid(),
                reserve_met: auction.reserve_met,
            })
        } else {
            None
        };

        let outcome = BidOutcome::Accepted {
            bid_id: bid.bid_id,
            event_id,
            server_time: now,
            soft_close_extended: soft_closed.then(|| SoftCloseInfo {
                new_end: auction.effective_end(),
                extension_count: auction.extension_count,
            }),
            english_state,
        };

        let dispatches = accept_dispatches(
            &auction,
            req.bidder_id,
            &outcome,
            alias_label.as_deref(),
            prev_highest,
            was_reserve_met,
            event_id,
            extend_event_id,
        );

        info!(
            "{:<12} --> 입찰 수락: auction={}, bid={}, event={}",
            "Engine", req.auction_id, bid.bid_id, event_id
        );
        Ok((outcome, dispatches))
    }

    /// 잠금 하 검증 거절: accepted=false 행과 비공개 bid_rejected 이벤트를 남기고 커밋
    async fn reject_with_audit(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Postgres>,
        req: &SubmitBid,
        now: DateTime<Utc>,
        reason: RejectReason,
        hints: RejectHints,
    ) -> Result<(BidOutcome, Vec<BroadcastIntent>), EngineError> {
        registry::insert_bid(
            &mut tx,
            req.auction_id,
            req.bidder_id,
            req.amount,
            req.client_seq,
            &req.source_ip_hash,
            &req.user_agent_hash,
            false,
            Some(reason.as_str()),
            None,
            false,
            false,
        )
        .await?;

        registry::append_event(
            &mut tx,
            req.auction_id,
            EventType::BidRejected,
            Some(req.bidder_id),
            Some(serde_json::json!({ "reason": reason.as_str(), "amount": req.amount })),
        )
        .await?;

        tx.commit().await?;

        // 거절은 방송하지 않는다. 호출 경로의 직접 응답이 본인 통지이고,
        // 리플레이는 본인 세션에만 bid_rejected 를 되돌려 준다.
        let outcome = BidOutcome::Rejected {
            reason,
            server_time: now,
            hints: Some(hints),
        };

        info!(
            "{:<12} --> 입찰 거절: auction={}, bidder={}, reason={}",
            "Engine",
            req.auction_id,
            req.bidder_id,
            reason.as_str()
        );
        Ok((outcome, Vec::new()))
    }

    /// 즉시 구매 (영국식 전용)
    pub async fn buy_it_now(
        &self,
        auction_id: i64,
        buyer_id: i64,
        client_seq: i64,
        source_ip_hash: [u8; 32],
        user_agent_hash: [u8; 32],
    ) -> Result<BidOutcome, EngineError> {
        info!(
            "{:<12} --> 즉시 구매 요청: auction={}, buyer={}",
            "Engine", auction_id, buyer_id
        );
        let now = Utc::now();

        if let Some(prior) =
            registry::find_prior_bid(&self.pool, auction_id, buyer_id, client_seq).await?
        {
            return Ok(BidOutcome::DuplicateReplay {
                prior_outcome: prior.into(),
                server_time: now,
            });
        }

        // 단계 4 과부하에서는 직구도 신규 입찰과 같이 거부한다
        if self.hub.degradation.current_level() >= 4 {
            warn!(
                "{:<12} --> 과부하, 즉시 구매 거부: auction={}, buyer={}",
                "Engine", auction_id, buyer_id
            );
            return Err(EngineError::RateLimited);
        }

        if registry::is_blacklisted(&self.pool, buyer_id).await? {
            return Ok(BidOutcome::Rejected {
                reason: RejectReason::Blacklisted,
                server_time: now,
                hints: None,
            });
        }

        let since = now - Duration::seconds(self.config.bid_rate_limit_seconds);
        if registry::has_recent_bid(&self.pool, auction_id, buyer_id, since).await? {
            return Ok(BidOutcome::Rejected {
                reason: RejectReason::TooFrequent,
                server_time: now,
                hints: Some(RejectHints {
                    cooldown_seconds: Some(self.config.bid_rate_limit_seconds),
                    ..Default::default()
                }),
            });
        }

        let locked = timeout(ADMISSION_DEADLINE, async {
            match self
                .buy_it_now_locked(auction_id, buyer_id, client_seq, source_ip_hash, user_agent_hash, now)
                .await
            {
                Err(EngineError::StorageUnavailable(detail)) => {
                    warn!(
                        "{:<12} --> 스토리지 오류, 재시도: auction={}, {}",
                        "Engine", auction_id, detail
                    );
                    self.buy_it_now_locked(
                        auction_id,
                        buyer_id,
                        client_seq,
                        source_ip_hash,
                        user_agent_hash,
                        now,
                    )
                    .await
                    .map_err(|e| match e {
                        EngineError::StorageUnavailable(_) => EngineError::ServiceUnavailable,
                        other => other,
                    })
                }
                other => other,
            }
        })
        .await;

        let (outcome, dispatches) = match locked {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::StorageUnavailable(
                    "admission deadline exceeded".to_string(),
                ))
            }
        };

        for intent in dispatches {
            self.hub.publish(intent).await;
        }
        Ok(outcome)
    }

    async fn buy_it_now_locked(
        &self,
        auction_id: i64,
        buyer_id: i64,
        client_seq: i64,
        source_ip_hash: [u8; 32],
        user_agent_hash: [u8; 32],
        now: DateTime<Utc>,
    ) -> Result<(BidOutcome, Vec<BroadcastIntent>), EngineError> {
        let mut tx = self.pool.begin().await?;
        let mut auction = registry::load_auction_for_update(&mut tx, auction_id).await?;

        if let Some(prior) =
            registry::find_bid_by_client_seq(&mut tx, auction_id, buyer_id, client_seq).await?
        {
            tx.rollback().await?;
            return Ok((
                BidOutcome::DuplicateReplay {
                    prior_outcome: prior.into(),
                    server_time: now,
                },
                Vec::new(),
            ));
        }

        if !auction.can_buy_it_now() {
            tx.rollback().await?;
            return Err(EngineError::BuyItNowNotAvailable);
        }
        if now > auction.effective_end() {
            tx.rollback().await?;
            return Err(EngineError::TooLate);
        }

        let prev_status = auction.status();
        let final_price = auction.buy_it_now.unwrap_or(auction.allowed_max_bid);
        if !auction.execute_buy_it_now(buyer_id) {
            tx.rollback().await?;
            return Err(EngineError::BuyItNowNotAvailable);
        }

        registry::clear_winning_flags(&mut tx, auction_id).await?;
        registry::save_auction(&mut tx, &auction).await?;
        registry::record_status_transition(
            &mut tx,
            auction_id,
            prev_status.as_str(),
            AuctionStatus::Ended.as_str(),
            "Buy it now executed",
            Some(buyer_id),
        )
        .await?;

        let bid = registry::insert_bid(
            &mut tx,
            auction_id,
            buyer_id,
            final_price,
            client_seq,
            &source_ip_hash,
            &user_agent_hash,
            true,
            None,
            None,
            true,
            true,
        )
        .await?;

        let event_id = registry::append_event(
            &mut tx,
            auction_id,
            EventType::Closed,
            Some(buyer_id),
            Some(serde_json::json!({
                "reason": "buy_it_now",
                "final_price": final_price,
                "ended_at": now,
            })),
        )
        .await?;

        tx.commit().await?;

        let outcome = BidOutcome::Accepted {
            bid_id: bid.bid_id,
            event_id,
            server_time: now,
            soft_close_extended: None,
            english_state: Some(EnglishState {
                current_price: final_price,
                min_next_bid: final_price + auction.min_increment,
                reserve_met: true,
            }),
        };

        let message = OutboundMessage::new(
            MessageKind::Closed,
            serde_json::json!({
                "reason": "buy_it_now",
                "final_price": final_price,
                "ended_at": now,
            }),
        )
        .with_event_id(event_id);
        let dispatches = vec![BroadcastIntent::to_room(auction_id, message)];

        info!(
            "{:<12} --> 즉시 구매 완료: auction={}, price={}",
            "Engine", auction_id, final_price
        );
        Ok((outcome, dispatches))
    }
}
// endregion: --- BidEngine

// region:    --- Dispatch Construction
/// 수락 후 방송 의도 구성
/// 밀봉 경매: 공개 방송은 extended 만. 수락 통지는 입찰자 본인에게만 간다.
/// 영국식: price_changed 는 공개, 신원은 별칭으로만 노출한다.
#[allow(clippy::too_many_arguments)]
fn accept_dispatches(
    auction: &Auction,
    bidder_id: i64,
    outcome: &BidOutcome,
    alias_label: Option<&str>,
    prev_highest: Option<i64>,
    was_reserve_met: bool,
    event_id: i64,
    extend_event_id: Option<i64>,
) -> Vec<BroadcastIntent> {
    let mut dispatches = Vec::new();

    // 본인에게 전체 결과
    let private = OutboundMessage::new(
        MessageKind::BidAccepted,
        serde_json::to_value(outcome).unwrap_or_default(),
    )
    .with_event_id(event_id);
    dispatches.push(BroadcastIntent::to_user(
        auction.auction_id,
        bidder_id,
        private,
    ));

    // 소프트 클로즈 연장은 방 전체 공지
    if let Some(extend_id) = extend_event_id {
        let message = OutboundMessage::new(
            MessageKind::Extended,
            serde_json::json!({
                "extended_until": auction.extended_until,
                "extension_count": auction.extension_count,
            }),
        )
        .with_event_id(extend_id);
        dispatches.push(BroadcastIntent::to_room(auction.auction_id, message));
    }

    if auction.is_english() {
        // 가격 변경 공지: 익명이면 별칭만 노출
        let highest_bidder = match (auction.is_anonymous, alias_label) {
            (true, Some(label)) => serde_json::json!(label),
            (true, None) => serde_json::Value::Null,
            (false, _) => serde_json::json!(auction.highest_bidder_id),
        };
        let message = OutboundMessage::new(
            MessageKind::PriceChanged,
            serde_json::json!({
                "current_price": auction.current_price,
                "min_next_bid": auction.min_next_bid(),
                "reserve_met": auction.reserve_met,
                "highest_bidder": highest_bidder,
            }),
        )
        .with_event_id(event_id);
        dispatches.push(BroadcastIntent::to_room(auction.auction_id, message));

        // 처음으로 보류가에 도달한 경우
        if auction.reserve_met && !was_reserve_met {
            let message = OutboundMessage::new(
                MessageKind::ReserveMet,
                serde_json::json!({
                    "reserve_price": auction.reserve_price,
                    "current_price": auction.current_price,
                }),
            )
            .with_event_id(event_id);
            dispatches.push(BroadcastIntent::to_room(auction.auction_id, message));
        }

        // 밀려난 직전 최고 입찰자에게 비공개 통지
        if let Some(prev) = prev_highest {
            if prev != bidder_id {
                let message = OutboundMessage::new(
                    MessageKind::Outbid,
                    serde_json::json!({
                        "current_price": auction.current_price,
                        "min_next_bid": auction.min_next_bid(),
                    }),
                )
                .with_event_id(event_id);
                dispatches.push(BroadcastIntent::to_user(auction.auction_id, prev, message));
            }
        }
    }

    dispatches
}
// endregion: --- Dispatch Construction

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn auction(kind: &str) -> Auction {
        let now = Utc::now();
        Auction {
            auction_id: 1,
            listing_id: 1,
            seller_id: 9,
            auction_type: kind.to_string(),
            status_code: "active".to_string(),
            allowed_min_bid: 1000_00,
            allowed_max_bid: 10000_00,
            reserve_price: Some(3000_00),
            min_increment: 100_00,
            buy_it_now: None,
            current_price: Some(1600_00),
            highest_bidder_id: Some(22),
            reserve_met: false,
            soft_close_trigger_sec: 180,
            soft_close_extend_sec: 60,
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            extended_until: None,
            extension_count: 0,
            is_anonymous: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn accepted_outcome() -> BidOutcome {
        BidOutcome::Accepted {
            bid_id: 5,
            event_id: 77,
            server_time: Utc::now(),
            soft_close_extended: None,
            english_state: None,
        }
    }

    #[test]
    fn test_fingerprint_is_stable_32_bytes() {
        let a = fingerprint("192.168.0.1");
        let b = fingerprint("192.168.0.1");
        let c = fingerprint("192.168.0.2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_sealed_accept_never_broadcasts_publicly() {
        let a = auction("sealed");
        let dispatches =
            accept_dispatches(&a, 7, &accepted_outcome(), Some("Bidder #1"), None, false, 77, None);

        // 본인 대상 비공개 통지 하나뿐
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].target_users, Some(vec![7]));
        assert_eq!(dispatches[0].message.kind, MessageKind::BidAccepted);
    }

    #[test]
    fn test_sealed_soft_close_broadcasts_extended_only() {
        let mut a = auction("sealed");
        a.extended_until = Some(a.end_at + Duration::seconds(60));
        a.extension_count = 1;

        let dispatches =
            accept_dispatches(&a, 7, &accepted_outcome(), None, None, false, 77, Some(78));

        assert_eq!(dispatches.len(), 2);
        // 공개되는 것은 extended 뿐
        let public: Vec<_> = dispatches
            .iter()
            .filter(|d| d.target_users.is_none())
            .collect();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].message.kind, MessageKind::Extended);
        assert_eq!(public[0].message.event_id, Some(78));
    }

    #[test]
    fn test_english_accept_broadcasts_price_and_outbids_previous() {
        let mut a = auction("english");
        a.update_current_price(1700_00, 7);

        let dispatches = accept_dispatches(
            &a,
            7,
            &accepted_outcome(),
            Some("Bidder #2"),
            Some(22),
            false,
            77,
            None,
        );

        let kinds: Vec<MessageKind> = dispatches.iter().map(|d| d.message.kind).collect();
        assert!(kinds.contains(&MessageKind::PriceChanged));
        assert!(kinds.contains(&MessageKind::Outbid));

        // 밀려난 입찰자에게만 outbid
        let outbid = dispatches
            .iter()
            .find(|d| d.message.kind == MessageKind::Outbid)
            .unwrap();
        assert_eq!(outbid.target_users, Some(vec![22]));

        // price_changed 는 별칭만 노출
        let price = dispatches
            .iter()
            .find(|d| d.message.kind == MessageKind::PriceChanged)
            .unwrap();
        assert_eq!(price.message.data["highest_bidder"], "Bidder #2");
    }

    #[test]
    fn test_english_reserve_met_announced_once() {
        let mut a = auction("english");
        a.update_current_price(3000_00, 7);
        assert!(a.reserve_met);

        // 직전까지 보류가 미달이었다면 reserve_met 공지
        let dispatches =
            accept_dispatches(&a, 7, &accepted_outcome(), None, Some(22), false, 77, None);
        assert!(dispatches
            .iter()
            .any(|d| d.message.kind == MessageKind::ReserveMet));

        // 이미 도달한 상태였다면 공지 없음
        let dispatches =
            accept_dispatches(&a, 7, &accepted_outcome(), None, Some(22), true, 77, None);
        assert!(!dispatches
            .iter()
            .any(|d| d.message.kind == MessageKind::ReserveMet));
    }

    #[test]
    fn test_non_anonymous_english_exposes_bidder_id() {
        let mut a = auction("english");
        a.is_anonymous = false;
        a.update_current_price(1700_00, 7);

        let dispatches =
            accept_dispatches(&a, 7, &accepted_outcome(), None, None, false, 77, None);
        let price = dispatches
            .iter()
            .find(|d| d.message.kind == MessageKind::PriceChanged)
            .unwrap();
        assert_eq!(price.message.data["highest_bidder"], 7);
    }
}
// endregion: --- Tests
