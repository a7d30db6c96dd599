/// 도메인 모델
/// 금액은 최소 화폐 단위(소수점 둘째 자리 고정)의 i64 로 저장한다.
/// 판정 경로에 부동소수점 비교는 없다.
// region:    --- Imports
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Enums
/// 경매 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionType {
    Sealed,
    English,
    Dutch,
}

impl AuctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionType::Sealed => "sealed",
            AuctionType::English => "english",
            AuctionType::Dutch => "dutch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sealed" => Some(AuctionType::Sealed),
            "english" => Some(AuctionType::English),
            "dutch" => Some(AuctionType::Dutch),
            _ => None,
        }
    }
}

/// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Draft,
    Active,
    Extended,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Draft => "draft",
            AuctionStatus::Active => "active",
            AuctionStatus::Extended => "extended",
            AuctionStatus::Ended => "ended",
            AuctionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(AuctionStatus::Draft),
            "active" => Some(AuctionStatus::Active),
            "extended" => Some(AuctionStatus::Extended),
            "ended" => Some(AuctionStatus::Ended),
            "cancelled" => Some(AuctionStatus::Cancelled),
            _ => None,
        }
    }

    /// 입찰을 받을 수 있는 상태인지
    pub fn is_open(&self) -> bool {
        matches!(self, AuctionStatus::Active | AuctionStatus::Extended)
    }

    /// 종결 상태인지
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Ended | AuctionStatus::Cancelled)
    }
}

/// 이벤트 로그 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Open,
    BidAccepted,
    BidRejected,
    Extended,
    Closed,
    Notified,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Open => "open",
            EventType::BidAccepted => "bid_accepted",
            EventType::BidRejected => "bid_rejected",
            EventType::Extended => "extended",
            EventType::Closed => "closed",
            EventType::Notified => "notified",
            EventType::Error => "error",
        }
    }
}

/// 종료 통지 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Winner,
    SellerResult,
    Top7,
    ParticipantEnd,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Winner => "winner",
            NotificationKind::SellerResult => "seller_result",
            NotificationKind::Top7 => "top7",
            NotificationKind::ParticipantEnd => "participant_end",
        }
    }
}
// endregion: --- Enums

// region:    --- Auction
/// 경매 본테이블 행
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub auction_id: i64,
    pub listing_id: i64,
    pub seller_id: i64,
    pub auction_type: String,
    pub status_code: String,
    pub allowed_min_bid: i64,
    pub allowed_max_bid: i64,
    pub reserve_price: Option<i64>,
    pub min_increment: i64,
    pub buy_it_now: Option<i64>,
    pub current_price: Option<i64>,
    pub highest_bidder_id: Option<i64>,
    pub reserve_met: bool,
    pub soft_close_trigger_sec: i32,
    pub soft_close_extend_sec: i32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub extended_until: Option<DateTime<Utc>>,
    pub extension_count: i32,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auction {
    pub fn status(&self) -> AuctionStatus {
        AuctionStatus::parse(&self.status_code).unwrap_or(AuctionStatus::Draft)
    }

    pub fn kind(&self) -> AuctionType {
        AuctionType::parse(&self.auction_type).unwrap_or(AuctionType::Sealed)
    }

    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }

    pub fn is_english(&self) -> bool {
        self.kind() == AuctionType::English
    }

    /// 유효 종료 시각 = max(end_at, extended_until)
    pub fn effective_end(&self) -> DateTime<Utc> {
        match self.extended_until {
            Some(ext) if ext > self.end_at => ext,
            _ => self.end_at,
        }
    }

    /// 소프트 클로즈 윈도우 내인지
    pub fn in_soft_close_window(&self, now: DateTime<Utc>) -> bool {
        if !self.is_open() {
            return false;
        }
        let trigger = self.effective_end() - Duration::seconds(self.soft_close_trigger_sec as i64);
        now >= trigger && now <= self.effective_end()
    }

    /// 소프트 클로즈 연장 적용
    /// 유효 종료 시각에 extend_sec 을 더하고, active 면 extended 로 전이한다.
    /// 연장이 일어나면 true.
    pub fn apply_soft_close(&mut self, now: DateTime<Utc>) -> bool {
        if !self.in_soft_close_window(now) {
            return false;
        }
        let new_end = self.effective_end() + Duration::seconds(self.soft_close_extend_sec as i64);
        self.extended_until = Some(new_end);
        self.extension_count += 1;
        if self.status() == AuctionStatus::Active {
            self.status_code = AuctionStatus::Extended.as_str().to_string();
        }
        true
    }

    /// 허용 범위 검사
    pub fn amount_in_range(&self, amount: i64) -> bool {
        amount >= self.allowed_min_bid && amount <= self.allowed_max_bid
    }

    /// 영국식 최소 다음 입찰가
    /// 현재가가 있으면 현재가 + 최소 증분, 없으면 max(보류가, 최소 허용가).
    pub fn min_next_bid(&self) -> i64 {
        if !self.is_english() {
            return self.allowed_min_bid;
        }
        if let Some(current) = self.current_price {
            return current + self.min_increment;
        }
        match self.reserve_price {
            Some(reserve) if reserve > self.allowed_min_bid => reserve,
            _ => self.allowed_min_bid,
        }
    }

    /// 영국식 현재가 갱신 (수락된 입찰에 한해 트랜잭션 내에서 호출)
    pub fn update_current_price(&mut self, amount: i64, bidder_id: i64) {
        if !self.is_english() {
            return;
        }
        self.current_price = Some(amount);
        self.highest_bidder_id = Some(bidder_id);
        if let Some(reserve) = self.reserve_price {
            if amount >= reserve {
                self.reserve_met = true;
            }
        }
    }

    pub fn can_buy_it_now(&self) -> bool {
        self.is_english() && self.buy_it_now.is_some() && self.is_open()
    }

    /// 즉시 구매 실행: 현재가를 직구가로, 상태를 ended 로
    pub fn execute_buy_it_now(&mut self, buyer_id: i64) -> bool {
        if !self.can_buy_it_now() {
            return false;
        }
        self.current_price = self.buy_it_now;
        self.highest_bidder_id = Some(buyer_id);
        self.status_code = AuctionStatus::Ended.as_str().to_string();
        self.reserve_met = true;
        true
    }
}
// endregion: --- Auction

// region:    --- Bid
/// 입찰 행
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub bid_id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub client_seq: i64,
    #[serde(skip_serializing)]
    pub source_ip_hash: Option<Vec<u8>>,
    #[serde(skip_serializing)]
    pub user_agent_hash: Option<Vec<u8>>,
    pub accepted: bool,
    pub reject_reason: Option<String>,
    pub final_rank: Option<i32>,
    pub max_proxy_amount: Option<i64>,
    pub is_winning: bool,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
}

impl Bid {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// 수락되었고 삭제되지 않은 유효 입찰인지
    pub fn is_valid(&self) -> bool {
        self.accepted && !self.is_deleted()
    }

    /// 타인에게 노출 가능한지
    pub fn is_visible_to_others(&self) -> bool {
        self.is_visible && self.is_valid()
    }
}

/// 마감 순위 정렬 키: 금액 내림차순, created_at 오름차순, bid_id 오름차순
pub fn rank_order(a: &Bid, b: &Bid) -> std::cmp::Ordering {
    b.amount
        .cmp(&a.amount)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.bid_id.cmp(&b.bid_id))
}
// endregion: --- Bid

// region:    --- Supporting Rows
/// 익명 별칭 (경매 내 고정)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BidderAlias {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub alias_num: i32,
    pub alias_label: String,
    pub created_at: DateTime<Utc>,
}

/// 별칭 라벨 형식
pub fn alias_label(alias_num: i32) -> String {
    format!("Bidder #{}", alias_num)
}

/// 상태 전이 이력 행 (append-only)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusHistory {
    pub id: i64,
    pub auction_id: i64,
    pub from_status: String,
    pub to_status: String,
    pub reason: Option<String>,
    pub operator_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// 이벤트 로그 행 (event_id 는 전역 단조 증가, 재접속 커서)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuctionEvent {
    pub event_id: i64,
    pub auction_id: i64,
    pub event_type: String,
    pub actor_user_id: Option<i64>,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// 사용자별 재접속 오프셋
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StreamOffset {
    pub auction_id: i64,
    pub user_id: i64,
    pub last_event_id: i64,
    pub updated_at: DateTime<Utc>,
}

/// 전역 블랙리스트 행
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlacklistEntry {
    pub user_id: i64,
    pub is_active: bool,
    pub reason: Option<String>,
    pub staff_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 통지 로그 행 ((auction, user, kind) 당 최대 1건)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationLog {
    pub id: i64,
    pub auction_id: i64,
    pub user_id: i64,
    pub kind: String,
    pub channel: String,
    pub status: String,
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// 입찰 분포 스냅샷 버킷
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistogramBucket {
    pub auction_id: i64,
    pub bucket_low: i64,
    pub bucket_high: i64,
    pub computed_at: DateTime<Utc>,
    pub bid_count: i32,
}
// endregion: --- Supporting Rows

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    fn base_auction() -> Auction {
        let now = Utc::now();
        Auction {
            auction_id: 1,
            listing_id: 10,
            seller_id: 100,
            auction_type: "sealed".to_string(),
            status_code: "active".to_string(),
            allowed_min_bid: 1000_00,
            allowed_max_bid: 5000_00,
            reserve_price: None,
            min_increment: 0,
            buy_it_now: None,
            current_price: None,
            highest_bidder_id: None,
            reserve_met: false,
            soft_close_trigger_sec: 180,
            soft_close_extend_sec: 60,
            start_at: now - Duration::hours(1),
            end_at: now + Duration::seconds(300),
            extended_until: None,
            extension_count: 0,
            is_anonymous: true,
            created_at: now - Duration::hours(2),
            updated_at: now - Duration::hours(1),
        }
    }

    #[test]
    fn test_effective_end_prefers_later_extension() {
        let mut a = base_auction();
        assert_eq!(a.effective_end(), a.end_at);

        a.extended_until = Some(a.end_at + Duration::seconds(60));
        assert_eq!(a.effective_end(), a.end_at + Duration::seconds(60));

        // 과거 연장값은 무시
        a.extended_until = Some(a.end_at - Duration::seconds(60));
        assert_eq!(a.effective_end(), a.end_at);
    }

    #[test]
    fn test_soft_close_chain() {
        // 종료 300초 전, 트리거 180초: 150초 남은 시점의 입찰이 연장을 일으킨다
        let mut a = base_auction();
        let t0 = a.end_at - Duration::seconds(300);

        let first_bid_at = t0 + Duration::seconds(150);
        assert!(a.in_soft_close_window(first_bid_at));
        assert!(a.apply_soft_close(first_bid_at));
        assert_eq!(a.extended_until, Some(t0 + Duration::seconds(360)));
        assert_eq!(a.extension_count, 1);
        assert_eq!(a.status(), AuctionStatus::Extended);

        // 두 번째 연장은 유효 종료 기준으로 다시 60초
        let second_bid_at = t0 + Duration::seconds(359);
        assert!(a.apply_soft_close(second_bid_at));
        assert_eq!(a.extended_until, Some(t0 + Duration::seconds(420)));
        assert_eq!(a.extension_count, 2);
    }

    #[test]
    fn test_soft_close_outside_window_is_noop() {
        let mut a = base_auction();
        let early = a.end_at - Duration::seconds(200);
        assert!(!a.apply_soft_close(early));
        assert_eq!(a.extension_count, 0);
        assert!(a.extended_until.is_none());
        assert_eq!(a.status(), AuctionStatus::Active);
    }

    #[test]
    fn test_min_next_bid_english() {
        let mut a = base_auction();
        a.auction_type = "english".to_string();
        a.min_increment = 100_00;
        a.reserve_price = Some(3000_00);

        // 현재가 없음: 보류가가 하한
        assert_eq!(a.min_next_bid(), 3000_00);

        // 현재가 있으면 현재가 + 증분
        a.current_price = Some(1500_00);
        assert_eq!(a.min_next_bid(), 1600_00);
    }

    #[test]
    fn test_min_next_bid_without_reserve() {
        let mut a = base_auction();
        a.auction_type = "english".to_string();
        a.min_increment = 100_00;
        assert_eq!(a.min_next_bid(), a.allowed_min_bid);
    }

    #[test]
    fn test_update_current_price_sets_reserve_met() {
        let mut a = base_auction();
        a.auction_type = "english".to_string();
        a.reserve_price = Some(3000_00);

        a.update_current_price(1500_00, 7);
        assert_eq!(a.current_price, Some(1500_00));
        assert!(!a.reserve_met);

        a.update_current_price(3000_00, 8);
        assert!(a.reserve_met);
        assert_eq!(a.highest_bidder_id, Some(8));
    }

    #[test]
    fn test_buy_it_now_transitions_to_ended() {
        let mut a = base_auction();
        a.auction_type = "english".to_string();
        a.buy_it_now = Some(4500_00);

        assert!(a.execute_buy_it_now(55));
        assert_eq!(a.status(), AuctionStatus::Ended);
        assert_eq!(a.current_price, Some(4500_00));
        assert!(a.reserve_met);

        // 종결 상태에서는 불가
        assert!(!a.execute_buy_it_now(56));
    }

    #[test]
    fn test_rank_order_deterministic() {
        let now = Utc::now();
        let mk = |bid_id, amount, offset_secs| Bid {
            bid_id,
            auction_id: 1,
            bidder_id: bid_id,
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
            created_at: now + Duration::seconds(offset_secs),
            deleted_at: None,
            deleted_by: None,
        };

        let mut bids = vec![
            mk(3, 2000_00, 30),
            mk(1, 3000_00, 10),
            mk(4, 2000_00, 20),
            mk(2, 2000_00, 20),
        ];
        bids.sort_by(rank_order);

        // 금액 내림차순, 동액은 시각 오름차순, 그다음 bid_id 오름차순
        let ids: Vec<i64> = bids.iter().map(|b| b.bid_id).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_bid_visibility_rules() {
        let now = Utc::now();
        let mut bid = Bid {
            bid_id: 1,
            auction_id: 1,
            bidder_id: 1,
            amount: 1500_00,
            client_seq: 1,
            source_ip_hash: None,
            user_agent_hash: None,
            accepted: true,
            reject_reason: None,
            final_rank: None,
            max_proxy_amount: None,
            is_winning: false,
            is_visible: true,
            created_at: now,
            deleted_at: None,
            deleted_by: None,
        };
        assert!(bid.is_valid());
        assert!(bid.is_visible_to_others());

        // 밀봉: 종료 전에는 타인에게 보이지 않는다
        bid.is_visible = false;
        assert!(bid.is_valid());
        assert!(!bid.is_visible_to_others());

        // 소프트 삭제되면 무효
        bid.deleted_at = Some(now);
        bid.deleted_by = Some(99);
        assert!(bid.is_deleted());
        assert!(!bid.is_valid());
    }

    #[test]
    fn test_alias_label_format() {
        assert_eq!(alias_label(1), "Bidder #1");
        assert_eq!(alias_label(23), "Bidder #23");
    }

    #[test]
    fn test_status_parse_round_trip() {
        for s in ["draft", "active", "extended", "ended", "cancelled"] {
            assert_eq!(AuctionStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(AuctionStatus::parse("unknown").is_none());
        assert!(AuctionStatus::parse("extended").unwrap().is_open());
        assert!(AuctionStatus::parse("cancelled").unwrap().is_terminal());
    }
}
// endregion: --- Tests
