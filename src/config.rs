/// 엔진 구성
/// 모든 값은 환경 변수에서 읽고, 없으면 기본값을 사용한다.
// region:    --- Imports
use std::env;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Config
#[derive(Debug, Clone)]
pub struct Config {
    /// 서버 바인드 주소
    pub bind_addr: String,

    /// Kafka 브로커 (없으면 버스 비활성화)
    pub kafka_brokers: Option<String>,

    /// JWT 공유 시크릿 / 발급자
    pub jwt_secret: String,
    pub jwt_issuer: String,

    /// 소프트 클로즈 기본값 (초)
    pub soft_close_trigger_sec: i64,
    pub soft_close_extend_sec: i64,

    /// 경매 기간 제한 (일)
    pub min_duration_days: i64,
    pub max_duration_days: i64,

    /// 입찰 빈도 제한 (초)
    pub bid_rate_limit_seconds: i64,

    /// 세션 하트비트 (초)
    pub session_ping_interval_sec: u64,
    pub session_pong_timeout_sec: u64,

    /// (경매, 사용자)당 최대 동시 세션 수
    pub max_sessions_per_user_per_auction: usize,

    /// 재접속 시 이벤트 재전송 상한
    pub resume_replay_cap: i64,

    /// 종료 통지 상위 K명
    pub notification_top_k: i64,

    /// 마감 워커 주기 (초)
    pub finalization_interval_sec: u64,

    /// 히스토그램 k-익명성 하한
    pub histogram_min_bucket_count: i64,
}

impl Config {
    /// 환경 변수에서 구성 로드
    pub fn from_env() -> Arc<Self> {
        let cfg = Config {
            bind_addr: get_env("BIND_ADDR", "0.0.0.0:3000"),
            kafka_brokers: env::var("KAFKA_BROKERS").ok().filter(|s| !s.is_empty()),
            jwt_secret: get_env("JWT_SECRET", "dev-secret-change-me"),
            jwt_issuer: get_env("JWT_ISSUER", "auction-engine"),
            soft_close_trigger_sec: get_env_i64("SOFT_CLOSE_TRIGGER_SEC", 180),
            soft_close_extend_sec: get_env_i64("SOFT_CLOSE_EXTEND_SEC", 60),
            min_duration_days: get_env_i64("MIN_DURATION_DAYS", 1),
            max_duration_days: get_env_i64("MAX_DURATION_DAYS", 61),
            bid_rate_limit_seconds: get_env_i64("BID_RATE_LIMIT_SECONDS", 5),
            session_ping_interval_sec: get_env_i64("SESSION_PING_INTERVAL_SEC", 54) as u64,
            session_pong_timeout_sec: get_env_i64("SESSION_PONG_TIMEOUT_SEC", 60) as u64,
            max_sessions_per_user_per_auction: get_env_i64("MAX_SESSIONS_PER_USER_PER_AUCTION", 3)
                as usize,
            resume_replay_cap: get_env_i64("RESUME_REPLAY_CAP", 500),
            notification_top_k: get_env_i64("NOTIFICATION_TOP_K", 7),
            finalization_interval_sec: get_env_i64("FINALIZATION_INTERVAL_SEC", 60) as u64,
            histogram_min_bucket_count: get_env_i64("HISTOGRAM_MIN_BUCKET_COUNT", 5),
        };

        info!(
            "{:<12} --> 구성 로드 완료: bind={}, bus={}",
            "Config",
            cfg.bind_addr,
            cfg.kafka_brokers.as_deref().unwrap_or("(비활성)")
        );

        Arc::new(cfg)
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
// endregion: --- Config

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_env();
        assert_eq!(cfg.soft_close_trigger_sec, 180);
        assert_eq!(cfg.soft_close_extend_sec, 60);
        assert_eq!(cfg.max_duration_days, 61);
        assert_eq!(cfg.bid_rate_limit_seconds, 5);
        assert_eq!(cfg.max_sessions_per_user_per_auction, 3);
        assert_eq!(cfg.resume_replay_cap, 500);
        assert_eq!(cfg.notification_top_k, 7);
    }
}
// endregion: --- Tests
