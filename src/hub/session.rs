/// 클라이언트 세션
/// (auction, user) 에 묶인 지속 양방향 채널. 읽기/쓰기 펌프를 분리해 돌리고,
/// ~54초 간격 핑에 60초 내 퐁이 없으면 끊는다. 입찰/재개/퐁 메시지를 처리한다.
// region:    --- Imports
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::auth::Principal;
use crate::engine::SubmitBid;
use crate::handlers::AppState;
use crate::registry;

use super::messages::{replay_message, ClientMessage, MessageKind, OutboundMessage};

// endregion: --- Imports

// region:    --- Attach
/// 세션 수명 전체를 담당한다. 업그레이드 직후 호출된다.
pub async fn run_session(
    state: AppState,
    socket: WebSocket,
    auction_id: i64,
    principal: Principal,
    ip_hash: [u8; 32],
    ua_hash: [u8; 32],
) {
    let user_id = principal.user_id;
    let (mut ws_tx, mut ws_rx) = socket.split();

    // 경매 존재 / 비종결 검증
    let auction = match registry::load_auction(&state.pool, auction_id).await {
        Ok(a) if !a.status().is_terminal() => a,
        Ok(_) => {
            send_error_and_close(&mut ws_tx, "auction_closed", "Auction is already closed").await;
            return;
        }
        Err(_) => {
            send_error_and_close(&mut ws_tx, "auction_not_found", "Auction not found").await;
            return;
        }
    };

    // 허브 등록 (동시 세션 상한 검사 포함)
    let (session_id, tx, mut rx) = match state.hub.register(auction_id, user_id).await {
        Ok(registered) => registered,
        Err(e) => {
            send_error_and_close(&mut ws_tx, e.code(), &e.to_string()).await;
            return;
        }
    };

    let last_pong = Arc::new(AtomicI64::new(Utc::now().timestamp()));

    // 쓰기 펌프: 세션 큐 -> 소켓, 주기 핑과 퐁 시한 검사
    let ping_interval = state.config.session_ping_interval_sec;
    let pong_timeout = state.config.session_pong_timeout_sec as i64;
    let pong_watch = Arc::clone(&last_pong);
    let write_pump = tokio::spawn(async move {
        let mut ping_ticker = interval(Duration::from_secs(ping_interval));
        ping_ticker.tick().await; // 첫 틱은 즉시 발화한다

        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(payload) => {
                            if ws_tx.send(Message::Text(payload)).await.is_err() {
                                break;
                            }
                        }
                        None => break, // 허브가 핸들을 제거함
                    }
                }
                _ = ping_ticker.tick() => {
                    let age = Utc::now().timestamp() - pong_watch.load(Ordering::Relaxed);
                    if age > pong_timeout {
                        warn!("{:<12} --> 퐁 시한 초과, 세션 종료", "Session");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // 접속 인사
    send_hello(&state, &tx, &auction, user_id).await;

    info!(
        "{:<12} --> 세션 시작: auction={}, user={}, session={}",
        "Session", auction_id, user_id, session_id
    );

    // 읽기 펌프 (현재 태스크)
    while let Some(frame) = ws_rx.next().await {
        let message = match frame {
            Ok(m) => m,
            Err(_) => break,
        };

        match message {
            Message::Text(text) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("{:<12} --> 잘못된 클라이언트 메시지: {:?}", "Session", e);
                        continue;
                    }
                };
                if let ClientMessage::Pong = client_msg {
                    last_pong.store(Utc::now().timestamp(), Ordering::Relaxed);
                    continue;
                }
                handle_client_message(&state, &tx, auction_id, user_id, ip_hash, ua_hash, client_msg)
                    .await;
            }
            Message::Pong(_) => {
                last_pong.store(Utc::now().timestamp(), Ordering::Relaxed);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // 해제
    state.hub.unregister(auction_id, session_id).await;
    write_pump.abort();
    info!(
        "{:<12} --> 세션 종료: auction={}, user={}, session={}",
        "Session", auction_id, user_id, session_id
    );
}

/// 등록 전 오류 통지 후 종료
async fn send_error_and_close(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: &str,
    message: &str,
) {
    let out = OutboundMessage::new(
        MessageKind::Error,
        serde_json::json!({ "code": code, "message": message }),
    );
    if let Ok(payload) = serde_json::to_string(&out) {
        let _ = ws_tx.send(Message::Text(payload)).await;
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}
// endregion: --- Attach

// region:    --- Hello
/// 접속 인사: 상태, 유효 종료, 별칭, 입찰 가능 여부, 강하 단계
async fn send_hello(
    state: &AppState,
    tx: &mpsc::Sender<String>,
    auction: &crate::domain::Auction,
    user_id: i64,
) {
    let blacklisted = registry::is_blacklisted(&state.pool, user_id)
        .await
        .unwrap_or(true);
    let alias = registry::find_alias(&state.pool, auction.auction_id, user_id)
        .await
        .ok()
        .flatten();

    let mut data = serde_json::json!({
        "status_code": auction.status_code,
        "effective_end": auction.effective_end(),
        "can_bid": !blacklisted && auction.is_open(),
        "degraded_level": state.hub.degradation.current_level(),
        "has_bid": alias.is_some(),
    });
    if let Some(alias) = alias {
        data["alias_label"] = serde_json::json!(alias.alias_label);
    }

    let mut message = OutboundMessage::new(MessageKind::Hello, data);
    message.degraded_level = state.hub.degradation.current_level();

    deliver(tx, &message).await;
}
// endregion: --- Hello

// region:    --- Client Messages
async fn handle_client_message(
    state: &AppState,
    tx: &mpsc::Sender<String>,
    auction_id: i64,
    user_id: i64,
    ip_hash: [u8; 32],
    ua_hash: [u8; 32],
    message: ClientMessage,
) {
    match message {
        ClientMessage::PlaceBid { amount, client_seq } => {
            let req = SubmitBid {
                auction_id,
                bidder_id: user_id,
                amount,
                client_seq,
                source_ip_hash: ip_hash,
                user_agent_hash: ua_hash,
            };

            match state.engine.submit_bid(req).await {
                Ok(outcome) => {
                    // 수락 결과는 엔진이 본인 세션들로 bid_accepted 를 보내므로
                    // 여기서는 거절/재생 결과만 직접 돌려준다
                    if !outcome.is_accepted() {
                        let kind = MessageKind::BidRejected;
                        let out = OutboundMessage::new(
                            kind,
                            serde_json::to_value(&outcome).unwrap_or_default(),
                        );
                        deliver(tx, &out).await;
                    }
                }
                Err(e) => {
                    let out = OutboundMessage::new(
                        MessageKind::Error,
                        serde_json::json!({ "code": e.code(), "message": e.to_string() }),
                    );
                    deliver(tx, &out).await;
                }
            }
        }
        ClientMessage::Resume { last_event_id } => {
            handle_resume(state, tx, auction_id, user_id, last_event_id).await;
        }
        // 퐁은 읽기 루프가 처리한다
        ClientMessage::Pong => {}
    }
}

/// 끊긴 구간 리플레이
/// last_event_id 초과분을 상한까지 순서대로 보낸 뒤 resume_ok 를 보낸다.
/// 커서가 보존 구간보다 앞이면 잘림 신호를 보내고 클라이언트가 상태를 다시 읽는다.
async fn handle_resume(
    state: &AppState,
    tx: &mpsc::Sender<String>,
    auction_id: i64,
    user_id: i64,
    last_event_id: i64,
) {
    let auction = match registry::load_auction(&state.pool, auction_id).await {
        Ok(a) => a,
        Err(_) => return,
    };

    // 커서를 안 가져온 클라이언트는 서버가 기억하는 고수위에서 이어 준다
    let last_event_id = if last_event_id == 0 {
        registry::get_stream_offset(&state.pool, auction_id, user_id)
            .await
            .ok()
            .flatten()
            .map(|o| o.last_event_id)
            .unwrap_or(0)
    } else {
        last_event_id
    };

    // 잘림 검사: 실제 이벤트를 받아 본 커서인데 보존 시작점보다 앞서면 복구 불가
    if last_event_id > 0 {
        if let Ok(Some(oldest)) = registry::oldest_event_id(&state.pool, auction_id).await {
            if last_event_id < oldest - 1 {
                let out = OutboundMessage::new(
                    MessageKind::Error,
                    serde_json::json!({
                        "code": "resume_truncated",
                        "message": "Requested cursor is older than retained events",
                        "oldest_event_id": oldest,
                    }),
                );
                deliver(tx, &out).await;
                return;
            }
        }
    }

    let events = match registry::list_events_after(
        &state.pool,
        auction_id,
        last_event_id,
        state.config.resume_replay_cap,
    )
    .await
    {
        Ok(events) => events,
        Err(e) => {
            warn!("{:<12} --> 리플레이 조회 실패: {:?}", "Session", e);
            return;
        }
    };

    let mut replayed_until = last_event_id;
    for event in &events {
        replayed_until = event.event_id;
        if let Some(message) = replay_message(event, auction.kind(), auction.is_anonymous, user_id)
        {
            deliver(tx, &message).await;
        }
    }

    let out = OutboundMessage::new(
        MessageKind::ResumeOk,
        serde_json::json!({
            "replayed": events.len(),
            "last_event_id": replayed_until,
        }),
    );
    deliver(tx, &out).await;

    // 고수위 갱신
    if let Err(e) =
        registry::upsert_stream_offset(&state.pool, auction_id, user_id, replayed_until).await
    {
        warn!("{:<12} --> 오프셋 갱신 실패: {:?}", "Session", e);
    }

    info!(
        "{:<12} --> 리플레이 완료: auction={}, user={}, from={}, count={}",
        "Session",
        auction_id,
        user_id,
        last_event_id,
        events.len()
    );
}

/// 세션 큐로 직렬화 전송. 큐가 가득 차면 버린다 (백프레셔는 허브가 집행).
async fn deliver(tx: &mpsc::Sender<String>, message: &OutboundMessage) {
    if let Ok(payload) = serde_json::to_string(message) {
        let _ = tx.try_send(payload);
    }
}
// endregion: --- Client Messages
