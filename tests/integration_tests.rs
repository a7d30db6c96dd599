/// 엔드 투 엔드 시나리오
/// 실행 중인 인스턴스가 필요하다. AUCTION_TEST_BASE_URL 이 없으면 건너뛴다.
///   AUCTION_TEST_BASE_URL=http://127.0.0.1:3000 cargo test -- --test-threads=1
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

/// 대상 인스턴스 주소. 없으면 테스트를 건너뛴다.
fn base_url() -> Option<String> {
    std::env::var("AUCTION_TEST_BASE_URL").ok()
}

#[derive(Serialize)]
struct TestClaims {
    user_id: i64,
    role: String,
    iss: String,
    exp: usize,
}

/// 테스트 토큰 발급 (서버와 같은 공유 시크릿)
fn make_token(user_id: i64, role: &str) -> String {
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| "auction-engine".into());
    let claims = TestClaims {
        user_id,
        role: role.to_string(),
        iss: issuer,
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("토큰 발급 실패")
}

/// 경매 생성 + 활성화 후 auction_id 반환
async fn create_active_auction(client: &Client, base: &str, body: Value) -> i64 {
    let seller = make_token(9000, "user");

    let res = client
        .post(format!("{}/auctions", base))
        .bearer_auth(&seller)
        .json(&body)
        .send()
        .await
        .expect("생성 요청 실패");
    assert_eq!(res.status(), 201, "경매 생성 실패");
    let created: Value = res.json().await.unwrap();
    let auction_id = created["data"]["auction_id"].as_i64().unwrap();

    let res = client
        .post(format!("{}/auctions/{}/activate", base, auction_id))
        .bearer_auth(&seller)
        .send()
        .await
        .expect("활성화 요청 실패");
    assert!(res.status().is_success(), "활성화 실패");

    auction_id
}

fn sealed_auction_body() -> Value {
    let start = Utc::now() + Duration::hours(1);
    json!({
        "listing_id": 1,
        "auction_type": "sealed",
        "allowed_min_bid": 100000,
        "allowed_max_bid": 500000,
        "start_at": start,
        "end_at": start + Duration::days(7),
        "is_anonymous": true,
    })
}

async fn place_bid(
    client: &Client,
    base: &str,
    auction_id: i64,
    user_id: i64,
    amount: i64,
    client_seq: i64,
) -> Value {
    let res = client
        .post(format!("{}/auctions/{}/bids", base, auction_id))
        .bearer_auth(make_token(user_id, "user"))
        .json(&json!({ "amount": amount, "client_seq": client_seq }))
        .send()
        .await
        .expect("입찰 요청 실패");
    assert!(res.status().is_success(), "입찰 전송 실패");
    res.json().await.unwrap()
}

/// 밀봉 경매 해피 패스: 입찰 -> 관리자 마감 -> 순위 확인
#[tokio::test]
async fn test_sealed_happy_path() {
    let Some(base) = base_url() else { return };
    let client = Client::new();
    let auction_id = create_active_auction(&client, &base, sealed_auction_body()).await;

    let outcome = place_bid(&client, &base, auction_id, 101, 200000, 1).await;
    assert_eq!(outcome["result"], "accepted");
    let first_event = outcome["event_id"].as_i64().unwrap();

    let outcome = place_bid(&client, &base, auction_id, 102, 300000, 1).await;
    assert_eq!(outcome["result"], "accepted");
    assert!(outcome["event_id"].as_i64().unwrap() > first_event);

    // 종료 전에는 결과 조회 불가
    let res = client
        .get(format!("{}/auctions/{}/results", base, auction_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 409);

    // 관리자 수동 마감
    let res = client
        .post(format!("{}/admin/auctions/{}/finalize", base, auction_id))
        .bearer_auth(make_token(1, "admin"))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success(), "관리자 마감 실패");

    // 금액 내림차순 순위: 300000 이 1위
    let res = client
        .get(format!("{}/auctions/{}/results", base, auction_id))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let results: Value = res.json().await.unwrap();
    let rankings = results["data"]["rankings"].as_array().unwrap();
    assert_eq!(rankings.len(), 2);
    assert_eq!(rankings[0]["final_rank"], 1);
    assert_eq!(rankings[0]["amount"], 300000);
    assert_eq!(rankings[1]["final_rank"], 2);
    assert_eq!(rankings[1]["amount"], 200000);

    // 익명 경매: 결과에도 원시 신원은 없다
    assert!(rankings[0]["bidder"].is_string());

    // 통지 적재: 1위 winner, 2위 top7, 판매자 seller_result (kind 당 최대 1건)
    let res = client
        .get(format!("{}/admin/auctions/{}/notifications", base, auction_id))
        .bearer_auth(make_token(1, "admin"))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let body: Value = res.json().await.unwrap();
    let notifications = body["data"].as_array().unwrap();
    let kinds: Vec<&str> = notifications
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"winner"));
    assert!(kinds.contains(&"top7"));
    assert!(kinds.contains(&"seller_result"));
    assert_eq!(notifications.len(), 3);
    assert!(notifications.iter().all(|n| n["status"] == "queued"));

    // 재마감 시도는 멱등: 이미 종결 상태라 auction_closed
    let res = client
        .post(format!("{}/admin/auctions/{}/finalize", base, auction_id))
        .bearer_auth(make_token(1, "admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 409);
}

/// 멱등 재생: 같은 (auction, bidder, client_seq) 는 같은 결과
#[tokio::test]
async fn test_idempotent_replay() {
    let Some(base) = base_url() else { return };
    let client = Client::new();
    let auction_id = create_active_auction(&client, &base, sealed_auction_body()).await;

    let first = place_bid(&client, &base, auction_id, 201, 150000, 42).await;
    assert_eq!(first["result"], "accepted");
    let bid_id = first["bid_id"].as_i64().unwrap();

    // 네트워크 재시도 시뮬레이션: 같은 client_seq
    let replay = place_bid(&client, &base, auction_id, 201, 150000, 42).await;
    assert_eq!(replay["result"], "duplicate_replay");
    assert_eq!(replay["prior_outcome"]["bid_id"].as_i64().unwrap(), bid_id);
    assert_eq!(replay["prior_outcome"]["accepted"], true);
}

/// 범위 밖 거절: 힌트에 허용 범위가 실린다
#[tokio::test]
async fn test_out_of_range_rejection() {
    let Some(base) = base_url() else { return };
    let client = Client::new();
    let auction_id = create_active_auction(&client, &base, sealed_auction_body()).await;

    let outcome = place_bid(&client, &base, auction_id, 301, 900000, 1).await;
    assert_eq!(outcome["result"], "rejected");
    assert_eq!(outcome["reason"], "out_of_range");
    assert_eq!(outcome["hints"]["allowed_min_bid"], 100000);
    assert_eq!(outcome["hints"]["allowed_max_bid"], 500000);
}

/// 입찰 빈도 제한: 5초 내 재입찰은 too_frequent
#[tokio::test]
async fn test_rate_limit_cooldown() {
    let Some(base) = base_url() else { return };
    let client = Client::new();
    let auction_id = create_active_auction(&client, &base, sealed_auction_body()).await;

    let first = place_bid(&client, &base, auction_id, 401, 150000, 1).await;
    assert_eq!(first["result"], "accepted");

    let second = place_bid(&client, &base, auction_id, 401, 160000, 2).await;
    assert_eq!(second["result"], "rejected");
    assert_eq!(second["reason"], "too_frequent");
    assert_eq!(second["hints"]["cooldown_seconds"], 5);
}

/// 블랙리스트: 등록된 사용자의 입찰은 상태를 건드리지 않고 거절
#[tokio::test]
async fn test_blacklist_rejection() {
    let Some(base) = base_url() else { return };
    let client = Client::new();
    let auction_id = create_active_auction(&client, &base, sealed_auction_body()).await;

    let res = client
        .post(format!("{}/admin/blacklist", base))
        .bearer_auth(make_token(1, "admin"))
        .json(&json!({ "user_id": 501, "reason": "fraud" }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let outcome = place_bid(&client, &base, auction_id, 501, 150000, 1).await;
    assert_eq!(outcome["result"], "rejected");
    assert_eq!(outcome["reason"], "blacklisted");

    // 해제하면 다시 입찰 가능
    let res = client
        .delete(format!("{}/admin/blacklist/501", base))
        .bearer_auth(make_token(1, "admin"))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let outcome = place_bid(&client, &base, auction_id, 501, 150000, 2).await;
    assert_eq!(outcome["result"], "accepted");
}

/// 영국식: 증분 미달 거절, 최고 입찰 이관, 보류가 도달
#[tokio::test]
async fn test_english_outbid_and_reserve() {
    let Some(base) = base_url() else { return };
    let client = Client::new();

    let start = Utc::now() + Duration::hours(1);
    let auction_id = create_active_auction(
        &client,
        &base,
        json!({
            "listing_id": 2,
            "auction_type": "english",
            "allowed_min_bid": 100000,
            "allowed_max_bid": 1000000,
            "min_increment": 10000,
            "reserve_price": 300000,
            "start_at": start,
            "end_at": start + Duration::days(7),
            "is_anonymous": true,
        }),
    )
    .await;

    // 첫 입찰: 보류가 미달이지만 수락, reserve_met=false
    let outcome = place_bid(&client, &base, auction_id, 601, 150000, 1).await;
    assert_eq!(outcome["result"], "rejected");
    assert_eq!(outcome["reason"], "under_minimum");
    assert_eq!(outcome["hints"]["min_next_bid"], 300000);

    // 보류가 이상: 수락 + reserve_met
    let outcome = place_bid(&client, &base, auction_id, 601, 300000, 2).await;
    assert_eq!(outcome["result"], "accepted");
    assert_eq!(outcome["english_state"]["current_price"], 300000);
    assert_eq!(outcome["english_state"]["reserve_met"], true);
    assert_eq!(outcome["english_state"]["min_next_bid"], 310000);

    // 증분 미달: 거절 + 최소 다음 입찰가 힌트
    let outcome = place_bid(&client, &base, auction_id, 602, 305000, 1).await;
    assert_eq!(outcome["result"], "rejected");
    assert_eq!(outcome["reason"], "under_minimum");
    assert_eq!(outcome["hints"]["min_next_bid"], 310000);

    // 정상 증분: 최고 입찰 이관
    let outcome = place_bid(&client, &base, auction_id, 602, 320000, 2).await;
    assert_eq!(outcome["result"], "accepted");
    assert_eq!(outcome["english_state"]["current_price"], 320000);

    // 경매 조회: 익명이라 원시 신원 대신 별칭
    let res = client
        .get(format!("{}/auctions/{}", base, auction_id))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["current_price"], 320000);
    assert!(body["data"].get("highest_bidder_id").is_none());
    assert!(body["data"]["highest_bidder_alias"].is_string());
}

/// 판매자 아닌 사용자의 활성화 / 취소는 forbidden
#[tokio::test]
async fn test_forbidden_lifecycle_operations() {
    let Some(base) = base_url() else { return };
    let client = Client::new();

    let res = client
        .post(format!("{}/auctions", base))
        .bearer_auth(make_token(9000, "user"))
        .json(&sealed_auction_body())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let created: Value = res.json().await.unwrap();
    let auction_id = created["data"]["auction_id"].as_i64().unwrap();

    let res = client
        .post(format!("{}/auctions/{}/activate", base, auction_id))
        .bearer_auth(make_token(7777, "user"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = client
        .post(format!("{}/auctions/{}/cancel", base, auction_id))
        .bearer_auth(make_token(7777, "user"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}

/// 발급자가 다른 토큰은 거부된다
#[tokio::test]
async fn test_issuer_mismatch_rejected() {
    let Some(base) = base_url() else { return };
    let client = Client::new();

    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let claims = TestClaims {
        user_id: 1,
        role: "user".to_string(),
        iss: "someone-else".to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();

    let res = client
        .post(format!("{}/auctions", base))
        .bearer_auth(token)
        .json(&sealed_auction_body())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}
