/// 입찰 판정 결과
/// 태그드 유니온으로 모델링해 호출자가 모든 거절 사유를 처리하도록 강제한다.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- RejectReason
/// 거절 사유 (안정 코드)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    OutOfRange,
    TooLate,
    AuctionNotActive,
    Blacklisted,
    TooFrequent,
    UnderMinimum,
    InvalidAmount,
    DuplicateClientSeq,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::OutOfRange => "out_of_range",
            RejectReason::TooLate => "too_late",
            RejectReason::AuctionNotActive => "auction_not_active",
            RejectReason::Blacklisted => "blacklisted",
            RejectReason::TooFrequent => "too_frequent",
            RejectReason::UnderMinimum => "under_minimum",
            RejectReason::InvalidAmount => "invalid_amount",
            RejectReason::DuplicateClientSeq => "duplicate_client_seq",
        }
    }
}
// endregion: --- RejectReason

// region:    --- BidOutcome
/// 거절 힌트 (허용 범위, 쿨다운, 최소 다음 입찰가)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RejectHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_min_bid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_max_bid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_next_bid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<i64>,
}

/// 소프트 클로즈 연장 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftCloseInfo {
    pub new_end: DateTime<Utc>,
    pub extension_count: i32,
}

/// 영국식 경매의 수락 후 상태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnglishState {
    pub current_price: i64,
    pub min_next_bid: i64,
    pub reserve_met: bool,
}

/// 이전에 저장된 결과 (멱등 재생용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorOutcome {
    pub bid_id: i64,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 입찰 판정 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BidOutcome {
    Accepted {
        bid_id: i64,
        event_id: i64,
        server_time: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        soft_close_extended: Option<SoftCloseInfo>,
        #[serde(skip_serializing_if = "Option::is_none")]
        english_state: Option<EnglishState>,
    },
    Rejected {
        reason: RejectReason,
        server_time: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        hints: Option<RejectHints>,
    },
    DuplicateReplay {
        prior_outcome: PriorOutcome,
        server_time: DateTime<Utc>,
    },
}

impl BidOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BidOutcome::Accepted { .. })
    }
}
// endregion: --- BidOutcome

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(RejectReason::OutOfRange.as_str(), "out_of_range");
        assert_eq!(RejectReason::UnderMinimum.as_str(), "under_minimum");
        assert_eq!(
            RejectReason::DuplicateClientSeq.as_str(),
            "duplicate_client_seq"
        );
    }

    #[test]
    fn test_rejected_serializes_with_hints() {
        let outcome = BidOutcome::Rejected {
            reason: RejectReason::OutOfRange,
            server_time: Utc::now(),
            hints: Some(RejectHints {
                allowed_min_bid: Some(1000_00),
                allowed_max_bid: Some(2000_00),
                ..Default::default()
            }),
        };

        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["result"], "rejected");
        assert_eq!(v["reason"], "out_of_range");
        assert_eq!(v["hints"]["allowed_min_bid"], 100000);
        assert_eq!(v["hints"]["allowed_max_bid"], 200000);
        // 비어 있는 힌트 필드는 직렬화하지 않는다
        assert!(v["hints"].get("min_next_bid").is_none());
    }

    #[test]
    fn test_accepted_omits_absent_sections() {
        let outcome = BidOutcome::Accepted {
            bid_id: 7,
            event_id: 31,
            server_time: Utc::now(),
            soft_close_extended: None,
            english_state: None,
        };

        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["result"], "accepted");
        assert_eq!(v["bid_id"], 7);
        assert!(v.get("soft_close_extended").is_none());
        assert!(v.get("english_state").is_none());
    }
}
// endregion: --- Tests
