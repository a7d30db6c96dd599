/// 경매 조회
pub const GET_AUCTION: &str = "SELECT * FROM auctions WHERE auction_id = $1";

/// 경매 조회 (행 잠금)
/// 경매 단위 상호 배제의 기준 구현: 같은 경매에 대한 입찰 승인은 이 잠금으로 직렬화된다.
pub const GET_AUCTION_FOR_UPDATE: &str =
    "SELECT * FROM auctions WHERE auction_id = $1 FOR UPDATE";

/// 경매 생성
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (listing_id, seller_id, auction_type, status_code,
        allowed_min_bid, allowed_max_bid, reserve_price, min_increment, buy_it_now,
        soft_close_trigger_sec, soft_close_extend_sec, start_at, end_at, is_anonymous)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    RETURNING *
"#;

/// 경매 가변 필드 저장
pub const UPDATE_AUCTION: &str = r#"
    UPDATE auctions
    SET status_code = $2, current_price = $3, highest_bidder_id = $4, reserve_met = $5,
        extended_until = $6, extension_count = $7, updated_at = NOW()
    WHERE auction_id = $1
"#;

/// 상태별 마감 예정 경매 조회
pub const LIST_DUE_ACTIVE: &str = r#"
    SELECT * FROM auctions
    WHERE status_code IN ('active', 'extended')
      AND GREATEST(end_at, COALESCE(extended_until, end_at)) <= $1
    ORDER BY end_at
"#;

/// 시작 시간이 지난 draft 경매 조회
pub const LIST_DUE_DRAFT: &str =
    "SELECT * FROM auctions WHERE status_code = 'draft' AND start_at <= $1 ORDER BY start_at";

/// 진행 중 경매 조회 (히스토그램 갱신 대상)
pub const LIST_OPEN_AUCTIONS: &str =
    "SELECT * FROM auctions WHERE status_code IN ('active', 'extended')";

/// 경매 목록 (최신순)
pub const LIST_AUCTIONS: &str =
    "SELECT * FROM auctions ORDER BY created_at DESC LIMIT $1";

/// 상태별 경매 목록 (최신순)
pub const LIST_AUCTIONS_BY_STATUS: &str =
    "SELECT * FROM auctions WHERE status_code = $1 ORDER BY created_at DESC LIMIT $2";

/// 입찰 기록 생성
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, amount, client_seq,
        source_ip_hash, user_agent_hash, accepted, reject_reason,
        max_proxy_amount, is_winning, is_visible)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    RETURNING *
"#;

/// 멱등성 조회: 동일 (auction, bidder, client_seq)
pub const GET_BID_BY_CLIENT_SEQ: &str =
    "SELECT * FROM bids WHERE auction_id = $1 AND bidder_id = $2 AND client_seq = $3";

/// 최근 수락 입찰 존재 여부 (빈도 제한)
pub const HAS_RECENT_BID: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM bids
        WHERE auction_id = $1 AND bidder_id = $2 AND accepted = TRUE AND created_at > $3
    ) AS present
"#;

/// 영국식: 기존 최고 입찰 플래그 해제
pub const CLEAR_WINNING_FLAGS: &str =
    "UPDATE bids SET is_winning = FALSE WHERE auction_id = $1 AND is_winning = TRUE";

/// 마감 순위 계산 대상 입찰 (수락 + 미삭제)
pub const LIST_BIDS_FOR_FINALIZE: &str = r#"
    SELECT * FROM bids
    WHERE auction_id = $1 AND accepted = TRUE AND deleted_at IS NULL
    ORDER BY amount DESC, created_at ASC, bid_id ASC
"#;

/// 마감 순위 기록
pub const SET_FINAL_RANK: &str = "UPDATE bids SET final_rank = $2 WHERE bid_id = $1";

/// 타인에게 보이는 입찰 이력
pub const LIST_VISIBLE_BIDS: &str = r#"
    SELECT * FROM bids
    WHERE auction_id = $1 AND accepted = TRUE AND deleted_at IS NULL AND is_visible = TRUE
    ORDER BY created_at DESC
"#;

/// 본인 입찰 이력
pub const LIST_OWN_BIDS: &str = r#"
    SELECT * FROM bids
    WHERE auction_id = $1 AND bidder_id = $2 AND deleted_at IS NULL
    ORDER BY created_at DESC
"#;

/// 종료 후 결과 (순위 확정분)
pub const LIST_RANKED_BIDS: &str = r#"
    SELECT * FROM bids
    WHERE auction_id = $1 AND accepted = TRUE AND deleted_at IS NULL AND final_rank IS NOT NULL
    ORDER BY final_rank ASC
"#;

/// 입찰 소프트 삭제
pub const SOFT_DELETE_BID: &str =
    "UPDATE bids SET deleted_at = NOW(), deleted_by = $2 WHERE bid_id = $1 AND deleted_at IS NULL";

/// 경매의 별칭 전체
pub const LIST_ALIASES: &str =
    "SELECT * FROM auction_bidder_aliases WHERE auction_id = $1 ORDER BY alias_num";

/// 마감 시 밀봉 입찰 공개
pub const REVEAL_BIDS: &str = r#"
    UPDATE bids SET is_visible = TRUE
    WHERE auction_id = $1 AND accepted = TRUE AND deleted_at IS NULL
"#;

/// 별칭 조회
pub const GET_ALIAS: &str =
    "SELECT * FROM auction_bidder_aliases WHERE auction_id = $1 AND bidder_id = $2";

/// 별칭 번호 할당 (경매 내 최대값 + 1)
pub const NEXT_ALIAS_NUM: &str =
    "SELECT COALESCE(MAX(alias_num), 0) + 1 AS next FROM auction_bidder_aliases WHERE auction_id = $1";

/// 별칭 생성
pub const INSERT_ALIAS: &str = r#"
    INSERT INTO auction_bidder_aliases (auction_id, bidder_id, alias_num, alias_label)
    VALUES ($1, $2, $3, $4)
    RETURNING *
"#;

/// 상태 전이 이력 기록 (append-only)
pub const INSERT_STATUS_HISTORY: &str = r#"
    INSERT INTO auction_status_history (auction_id, from_status, to_status, reason, operator_id)
    VALUES ($1, $2, $3, $4, $5)
"#;

/// 상태 전이 이력 조회
pub const LIST_STATUS_HISTORY: &str = r#"
    SELECT * FROM auction_status_history
    WHERE auction_id = $1
    ORDER BY created_at ASC, id ASC
"#;

/// 이벤트 추가 (event_id 는 전역 시퀀스)
pub const INSERT_EVENT: &str = r#"
    INSERT INTO auction_events (auction_id, event_type, actor_user_id, payload)
    VALUES ($1, $2, $3, $4)
    RETURNING event_id
"#;

/// 재접속 리플레이: last_event_id 초과분을 순서대로
pub const LIST_EVENTS_AFTER: &str = r#"
    SELECT * FROM auction_events
    WHERE auction_id = $1 AND event_id > $2
    ORDER BY event_id ASC
    LIMIT $3
"#;

/// 보존 구간 시작 이벤트
pub const OLDEST_EVENT_ID: &str =
    "SELECT MIN(event_id) AS oldest FROM auction_events WHERE auction_id = $1";

/// 재접속 오프셋 upsert
pub const UPSERT_STREAM_OFFSET: &str = r#"
    INSERT INTO auction_stream_offsets (auction_id, user_id, last_event_id, updated_at)
    VALUES ($1, $2, $3, NOW())
    ON CONFLICT (auction_id, user_id)
    DO UPDATE SET last_event_id = EXCLUDED.last_event_id, updated_at = NOW()
"#;

/// 블랙리스트 활성 여부
pub const IS_BLACKLISTED: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM user_blacklist WHERE user_id = $1 AND is_active = TRUE
    ) AS present
"#;

/// 활성 블랙리스트 목록
pub const LIST_BLACKLIST: &str =
    "SELECT * FROM user_blacklist WHERE is_active = TRUE ORDER BY updated_at DESC";

/// 사용자의 저장된 재접속 오프셋
pub const GET_STREAM_OFFSET: &str =
    "SELECT * FROM auction_stream_offsets WHERE auction_id = $1 AND user_id = $2";

/// 경매의 통지 기록
pub const LIST_NOTIFICATIONS: &str = r#"
    SELECT * FROM auction_notification_log
    WHERE auction_id = $1
    ORDER BY id ASC
"#;

/// 블랙리스트 upsert
pub const UPSERT_BLACKLIST: &str = r#"
    INSERT INTO user_blacklist (user_id, is_active, reason, staff_id)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (user_id)
    DO UPDATE SET is_active = EXCLUDED.is_active, reason = EXCLUDED.reason,
        staff_id = EXCLUDED.staff_id, updated_at = NOW()
"#;

/// 통지 기록 (kind 당 최대 1건: 유니크 제약으로 중복 차단)
pub const INSERT_NOTIFICATION: &str = r#"
    INSERT INTO auction_notification_log (auction_id, user_id, kind, channel, status, meta)
    VALUES ($1, $2, $3, $4, 'queued', $5)
    ON CONFLICT (auction_id, user_id, kind) DO NOTHING
    RETURNING id
"#;

/// 히스토그램 버킷 저장
pub const INSERT_HISTOGRAM_BUCKET: &str = r#"
    INSERT INTO auction_bid_histograms (auction_id, bucket_low, bucket_high, computed_at, bid_count)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (auction_id, bucket_low, bucket_high, computed_at) DO NOTHING
"#;

/// 최신 스냅샷의 k-익명 버킷 조회
pub const LIST_HISTOGRAM_BUCKETS: &str = r#"
    SELECT * FROM auction_bid_histograms
    WHERE auction_id = $1
      AND computed_at = (
        SELECT MAX(computed_at) FROM auction_bid_histograms WHERE auction_id = $1
      )
      AND bid_count >= $2
    ORDER BY bucket_low
"#;
