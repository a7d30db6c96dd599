/// 세션 프로토콜 메시지
/// 모든 발신 메시지는 server_time 을, 상태 변경 메시지는 event_id 를 포함한다.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AuctionEvent, AuctionType};

// endregion: --- Imports

// region:    --- Message Kinds
/// 서버 -> 클라이언트 메시지 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Hello,
    State,
    BidAccepted,
    BidRejected,
    Extended,
    Closed,
    ResumeOk,
    PriceChanged,
    ReserveMet,
    Outbid,
    Error,
}

impl MessageKind {
    /// 스로틀을 우회하는 고우선 메시지인지
    pub fn is_high_priority(&self) -> bool {
        matches!(
            self,
            MessageKind::Extended | MessageKind::Closed | MessageKind::Error
        )
    }
}
// endregion: --- Message Kinds

// region:    --- Outbound
/// 발신 메시지 포맷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    pub server_time: DateTime<Utc>,
    pub degraded_level: u8,
}

impl OutboundMessage {
    pub fn new(kind: MessageKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            event_id: None,
            server_time: Utc::now(),
            degraded_level: 0,
        }
    }

    pub fn with_event_id(mut self, event_id: i64) -> Self {
        self.event_id = Some(event_id);
        self
    }
}

/// 방송 의도: 엔진이 발행하고 허브가 라우팅한다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastIntent {
    pub auction_id: i64,
    pub message: OutboundMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_user: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_users: Option<Vec<i64>>,
}

impl BroadcastIntent {
    /// 방 전체 방송
    pub fn to_room(auction_id: i64, message: OutboundMessage) -> Self {
        Self {
            auction_id,
            message,
            exclude_user: None,
            target_users: None,
        }
    }

    /// 특정 사용자에게만
    pub fn to_user(auction_id: i64, user_id: i64, message: OutboundMessage) -> Self {
        Self {
            auction_id,
            message,
            exclude_user: None,
            target_users: Some(vec![user_id]),
        }
    }
}
// endregion: --- Outbound

// region:    --- Inbound
/// 클라이언트 -> 서버 메시지
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    PlaceBid { amount: i64, client_seq: i64 },
    Resume { last_event_id: i64 },
    Pong,
}
// endregion: --- Inbound

// region:    --- Replay
/// 이벤트 로그 행을 세션 메시지로 재구성
/// 프로토콜에 없는 유형(notified)은 재전송하지 않는다.
/// 라이브 방송과 같은 정책을 리플레이에도 적용한다: 밀봉 경매의 수락 이벤트는
/// 입찰자 본인에게만 돌아가고, 익명 경매에서는 타인의 행위자 정보를 싣지 않는다.
pub fn replay_message(
    event: &AuctionEvent,
    auction_kind: AuctionType,
    anonymous: bool,
    for_user: i64,
) -> Option<OutboundMessage> {
    let own = event.actor_user_id == Some(for_user);
    let kind = match event.event_type.as_str() {
        "open" => MessageKind::State,
        "bid_accepted" => {
            // 밀봉 경매: 타인의 수락 이벤트는 공개 대상이 아니다
            if auction_kind == AuctionType::Sealed && !own {
                return None;
            }
            MessageKind::BidAccepted
        }
        "bid_rejected" => {
            // 거절은 본인에게만 의미가 있다
            if !own {
                return None;
            }
            MessageKind::BidRejected
        }
        "extended" => MessageKind::Extended,
        "closed" => MessageKind::Closed,
        "error" => MessageKind::Error,
        _ => return None,
    };

    let mut data = event.payload.clone().unwrap_or_else(|| serde_json::json!({}));
    if kind == MessageKind::BidAccepted && (!anonymous || own) {
        if let Some(actor) = event.actor_user_id {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("actor_user_id".to_string(), serde_json::json!(actor));
            }
        }
    }

    Some(OutboundMessage {
        kind,
        data,
        event_id: Some(event.event_id),
        server_time: Utc::now(),
        degraded_level: 0,
    })
}
// endregion: --- Replay

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, actor: Option<i64>, payload: serde_json::Value) -> AuctionEvent {
        AuctionEvent {
            event_id: 12,
            auction_id: 1,
            event_type: event_type.to_string(),
            actor_user_id: actor,
            payload: Some(payload),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_outbound_wire_shape() {
        let msg = OutboundMessage::new(
            MessageKind::Extended,
            serde_json::json!({"extension_count": 2}),
        )
        .with_event_id(99);

        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "extended");
        assert_eq!(v["event_id"], 99);
        assert_eq!(v["data"]["extension_count"], 2);
        assert!(v.get("server_time").is_some());
    }

    #[test]
    fn test_client_message_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"place_bid","amount":150000,"client_seq":42}"#)
                .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::PlaceBid {
                amount: 150000,
                client_seq: 42
            }
        ));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"resume","last_event_id":50}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Resume { last_event_id: 50 }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Pong));
    }

    #[test]
    fn test_high_priority_kinds() {
        assert!(MessageKind::Extended.is_high_priority());
        assert!(MessageKind::Closed.is_high_priority());
        assert!(MessageKind::Error.is_high_priority());
        assert!(!MessageKind::PriceChanged.is_high_priority());
        assert!(!MessageKind::BidAccepted.is_high_priority());
    }

    #[test]
    fn test_replay_skips_foreign_rejections() {
        let e = event("bid_rejected", Some(7), serde_json::json!({"reason": "out_of_range"}));
        assert!(replay_message(&e, AuctionType::Sealed, true, 7).is_some());
        assert!(replay_message(&e, AuctionType::Sealed, true, 8).is_none());
    }

    #[test]
    fn test_replay_sealed_accept_only_to_bidder() {
        let e = event("bid_accepted", Some(7), serde_json::json!({}));

        // 밀봉 경매: 익명 여부와 무관하게 타인은 수락 이벤트를 받지 못한다
        assert!(replay_message(&e, AuctionType::Sealed, true, 8).is_none());
        assert!(replay_message(&e, AuctionType::Sealed, false, 8).is_none());

        // 본인에게는 돌아간다
        let own = replay_message(&e, AuctionType::Sealed, false, 7).unwrap();
        assert_eq!(own.kind, MessageKind::BidAccepted);
        assert_eq!(own.data["actor_user_id"], 7);
    }

    #[test]
    fn test_replay_redacts_actor_for_anonymous() {
        let e = event("bid_accepted", Some(7), serde_json::json!({}));

        // 익명 영국식 경매에서 타인에게는 행위자 없이 전달
        let other = replay_message(&e, AuctionType::English, true, 8).unwrap();
        assert!(other.data.get("actor_user_id").is_none());

        // 본인에게는 포함
        let own = replay_message(&e, AuctionType::English, true, 7).unwrap();
        assert_eq!(own.data["actor_user_id"], 7);
    }

    #[test]
    fn test_replay_maps_open_to_state() {
        let e = event("open", None, serde_json::json!({"status_code": "active"}));
        let msg = replay_message(&e, AuctionType::Sealed, false, 1).unwrap();
        assert_eq!(msg.kind, MessageKind::State);
        assert_eq!(msg.event_id, Some(12));
    }

    #[test]
    fn test_replay_drops_notified() {
        let e = event("notified", Some(3), serde_json::json!({"kind": "winner"}));
        assert!(replay_message(&e, AuctionType::Sealed, false, 3).is_none());
    }
}
// endregion: --- Tests
