/// 세션 허브
/// 경매별 라이브 세션 집합을 유지하고, 방송 의도를 방 멤버십과 라우팅 조건으로
/// 걸러 세션별 유한 큐에 적재한다. 큐가 가득 찬 세션은 기다리지 않고 끊는다.
/// 방 상태 변경은 단일 디스패처 태스크가 직렬화한다.
// region:    --- Imports
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::EngineError;

pub mod degradation;
pub mod messages;
pub mod session;

use degradation::{level_for_connections, DegradationController};
use messages::{BroadcastIntent, MessageKind, OutboundMessage};

// endregion: --- Imports

// region:    --- Hub
/// 방에 등록된 세션 핸들
struct SessionHandle {
    session_id: u64,
    user_id: i64,
    tx: mpsc::Sender<String>,
}

/// 허브 통계
#[derive(Debug, Clone, serde::Serialize)]
pub struct HubStats {
    pub total_connections: usize,
    pub auction_room_count: usize,
    pub degraded_level: u8,
    pub last_updated: chrono::DateTime<Utc>,
}

/// 다른 인스턴스로 의도를 중계하는 발행자 (버스가 없으면 None)
#[async_trait::async_trait]
pub trait IntentPublisher: Send + Sync {
    async fn publish_intent(&self, intent: &BroadcastIntent) -> Result<(), EngineError>;
}

/// 세션별 발신 큐 용량
const SESSION_QUEUE_CAPACITY: usize = 256;
/// 일반 / 고우선 의도 큐 용량
const INTENT_QUEUE_CAPACITY: usize = 10_000;
const PRIORITY_QUEUE_CAPACITY: usize = 1_000;

pub struct Hub {
    config: Arc<Config>,
    rooms: RwLock<HashMap<i64, Vec<SessionHandle>>>,
    next_session_id: AtomicU64,
    accepting: AtomicBool,
    pub degradation: DegradationController,

    normal_tx: mpsc::Sender<BroadcastIntent>,
    priority_tx: mpsc::Sender<BroadcastIntent>,
    normal_rx: Mutex<Option<mpsc::Receiver<BroadcastIntent>>>,
    priority_rx: Mutex<Option<mpsc::Receiver<BroadcastIntent>>>,

    publisher: RwLock<Option<Arc<dyn IntentPublisher>>>,
}

impl Hub {
    /// 허브 생성
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let (normal_tx, normal_rx) = mpsc::channel(INTENT_QUEUE_CAPACITY);
        let (priority_tx, priority_rx) = mpsc::channel(PRIORITY_QUEUE_CAPACITY);

        Arc::new(Self {
            config,
            rooms: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            degradation: DegradationController::new(),
            normal_tx,
            priority_tx,
            normal_rx: Mutex::new(Some(normal_rx)),
            priority_rx: Mutex::new(Some(priority_rx)),
            publisher: RwLock::new(None),
        })
    }

    /// 인스턴스 간 중계 발행자 연결
    pub async fn set_publisher(&self, publisher: Arc<dyn IntentPublisher>) {
        *self.publisher.write().await = Some(publisher);
    }

    /// 허브 태스크 시작: 디스패처, 강하 모니터, 리미터 청소
    pub async fn start(self: Arc<Self>) {
        let normal_rx = self.normal_rx.lock().await.take();
        let priority_rx = self.priority_rx.lock().await.take();
        let (mut normal_rx, mut priority_rx) = match (normal_rx, priority_rx) {
            (Some(n), Some(p)) => (n, p),
            _ => return, // 이미 시작됨
        };

        // 디스패처: 고우선 큐를 먼저 비운다
        let hub = Arc::clone(&self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    Some(intent) = priority_rx.recv() => hub.dispatch_local(intent).await,
                    Some(intent) = normal_rx.recv() => hub.dispatch_local(intent).await,
                    else => break,
                }
            }
            info!("{:<12} --> 디스패처 종료", "Hub");
        });

        // 강하 단계 모니터 (15초)
        let hub = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(15));
            loop {
                ticker.tick().await;
                let total = hub.total_connections().await;
                let level = level_for_connections(total);
                if hub.degradation.update_level(level) {
                    hub.broadcast_level_change(level).await;
                }
            }
        });

        // 유휴 리미터 청소 (5분)
        let hub = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                hub.degradation.cleanup_limiters(Utc::now());
            }
        });
    }

    /// 세션 등록. (auction, user)당 동시 세션 상한을 넘으면 거부.
    /// 반환된 송신단은 세션 직접 전송(hello, 리플레이)용이다.
    pub async fn register(
        &self,
        auction_id: i64,
        user_id: i64,
    ) -> Result<(u64, mpsc::Sender<String>, mpsc::Receiver<String>), EngineError> {
        if !self.accepting.load(Ordering::Relaxed) {
            return Err(EngineError::ServiceUnavailable);
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(auction_id).or_default();

        let user_sessions = room.iter().filter(|s| s.user_id == user_id).count();
        if user_sessions >= self.config.max_sessions_per_user_per_auction {
            warn!(
                "{:<12} --> 세션 상한 초과: auction={}, user={}",
                "Hub", auction_id, user_id
            );
            return Err(EngineError::ConnectionLimit);
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        room.push(SessionHandle {
            session_id,
            user_id,
            tx: tx.clone(),
        });

        info!(
            "{:<12} --> 세션 등록: auction={}, user={}, session={}",
            "Hub", auction_id, user_id, session_id
        );
        Ok((session_id, tx, rx))
    }

    /// 세션 제거. 방이 비면 방도 제거.
    pub async fn unregister(&self, auction_id: i64, session_id: u64) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(&auction_id) {
            room.retain(|s| s.session_id != session_id);
            if room.is_empty() {
                rooms.remove(&auction_id);
            }
        }
        info!(
            "{:<12} --> 세션 해제: auction={}, session={}",
            "Hub", auction_id, session_id
        );
    }

    /// 방송 의도 발행: 로컬 큐 적재 + 버스 중계
    pub async fn publish(&self, intent: BroadcastIntent) {
        if let Some(publisher) = self.publisher.read().await.clone() {
            if let Err(e) = publisher.publish_intent(&intent).await {
                // 버스는 가속기일 뿐이다. 로컬 경로는 계속 간다.
                warn!("{:<12} --> 버스 중계 실패: {:?}", "Hub", e);
            }
        }
        self.queue_intent(intent);
    }

    /// 로컬 의도 큐 적재 (버스 수신 경로는 재중계 없이 이쪽만 탄다)
    pub fn queue_intent(&self, intent: BroadcastIntent) {
        let (queue, label) = if intent.message.kind.is_high_priority() {
            (&self.priority_tx, "priority")
        } else {
            (&self.normal_tx, "normal")
        };

        if queue.try_send(intent).is_err() {
            warn!("{:<12} --> {} 큐 가득참, 메시지 폐기", "Hub", label);
        }
    }

    /// 방 전체 방송 (선택적 제외 사용자)
    pub async fn broadcast_room(
        &self,
        auction_id: i64,
        message: OutboundMessage,
        exclude_user: Option<i64>,
    ) {
        self.publish(BroadcastIntent {
            auction_id,
            message,
            exclude_user,
            target_users: None,
        })
        .await;
    }

    /// 특정 사용자에게만 전달
    pub async fn send_user(&self, auction_id: i64, user_id: i64, message: OutboundMessage) {
        self.publish(BroadcastIntent::to_user(auction_id, user_id, message))
            .await;
    }

    /// 의도를 방 멤버십으로 걸러 세션 큐에 적재
    /// 큐가 가득 찬 세션은 닫는다 (클라이언트가 재접속 후 리플레이).
    async fn dispatch_local(&self, intent: BroadcastIntent) {
        let now = Utc::now();
        let mut message = intent.message;
        message.degraded_level = self.degradation.current_level();

        let payload = match serde_json::to_string(&message) {
            Ok(p) => p,
            Err(e) => {
                warn!("{:<12} --> 메시지 직렬화 실패: {:?}", "Hub", e);
                return;
            }
        };

        let mut dead: Vec<u64> = Vec::new();
        {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(&intent.auction_id) else {
                return;
            };

            for handle in room {
                if intent.exclude_user == Some(handle.user_id) {
                    continue;
                }
                if let Some(targets) = &intent.target_users {
                    if !targets.contains(&handle.user_id) {
                        continue;
                    }
                }
                if self
                    .degradation
                    .should_throttle(handle.user_id, message.kind, now)
                {
                    continue;
                }

                if handle.tx.try_send(payload.clone()).is_err() {
                    warn!(
                        "{:<12} --> 세션 큐 가득참, 세션 종료: session={}",
                        "Hub", handle.session_id
                    );
                    dead.push(handle.session_id);
                }
            }
        }

        for session_id in dead {
            self.unregister(intent.auction_id, session_id).await;
        }
    }

    /// 단계 변경을 모든 방에 공지
    async fn broadcast_level_change(&self, level: u8) {
        let auction_ids: Vec<i64> = self.rooms.read().await.keys().copied().collect();
        for auction_id in auction_ids {
            let message = OutboundMessage::new(
                MessageKind::State,
                serde_json::json!({ "degraded_level": level }),
            );
            self.queue_intent(BroadcastIntent::to_room(auction_id, message));
        }
    }

    /// 전체 연결 수
    pub async fn total_connections(&self) -> usize {
        self.rooms.read().await.values().map(|r| r.len()).sum()
    }

    /// 통계 스냅샷
    pub async fn stats(&self) -> HubStats {
        let rooms = self.rooms.read().await;
        HubStats {
            total_connections: rooms.values().map(|r| r.len()).sum(),
            auction_room_count: rooms.len(),
            degraded_level: self.degradation.current_level(),
            last_updated: Utc::now(),
        }
    }

    /// 종료 절차: 신규 세션 거부, 큐 드레인 유예 후 전체 세션 종료
    pub async fn shutdown(&self, grace: Duration) {
        info!("{:<12} --> 종료 시작, 드레인 유예 {:?}", "Hub", grace);
        self.accepting.store(false, Ordering::Relaxed);
        tokio::time::sleep(grace).await;

        let mut rooms = self.rooms.write().await;
        // 핸들을 드랍하면 세션 쓰기 펌프가 끝난다
        rooms.clear();
        info!("{:<12} --> 전체 세션 종료", "Hub");
    }
}
// endregion: --- Hub

// endregion: --- Tests
