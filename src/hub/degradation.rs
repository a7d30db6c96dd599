/// 부하 강하 제어기
/// 관측 부하에서 0~4 단계를 계산해 공표하고, 사용자별 메시지 스로틀을 집행한다.
/// 단계는 제어 흐름이 아니라 데이터로 전파된다 (발신 메시지의 degraded_level 필드).
// region:    --- Imports
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use tracing::info;

use super::messages::MessageKind;

// endregion: --- Imports

// region:    --- Policy
/// 단계별 분당 최대 메시지 수: 60/30/15/5/1
pub fn max_messages_per_window(level: u8) -> u32 {
    match level {
        0 => 60,
        1 => 30,
        2 => 15,
        3 => 5,
        _ => 1,
    }
}

/// 단계별 최소 메시지 간격: 100ms/500ms/2s/5s/30s
pub fn min_message_interval(level: u8) -> Duration {
    match level {
        0 => Duration::milliseconds(100),
        1 => Duration::milliseconds(500),
        2 => Duration::seconds(2),
        3 => Duration::seconds(5),
        _ => Duration::seconds(30),
    }
}

/// 연결 수 기반 단계 계산
pub fn level_for_connections(total_connections: usize) -> u8 {
    if total_connections > 1000 {
        4
    } else if total_connections > 500 {
        3
    } else if total_connections > 200 {
        2
    } else if total_connections > 100 {
        1
    } else {
        0
    }
}
// endregion: --- Policy

// region:    --- DegradationController
/// 사용자별 슬라이딩 윈도우 (1분)
struct UserRateLimiter {
    last_message: DateTime<Utc>,
    message_count: u32,
    window_start: DateTime<Utc>,
}

pub struct DegradationController {
    level: AtomicU8,
    limiters: Mutex<HashMap<i64, UserRateLimiter>>,
}

impl Default for DegradationController {
    fn default() -> Self {
        Self::new()
    }
}

impl DegradationController {
    pub fn new() -> Self {
        Self {
            level: AtomicU8::new(0),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn current_level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }

    /// 단계 갱신. 변경 시 true.
    pub fn update_level(&self, new_level: u8) -> bool {
        let old = self.level.swap(new_level, Ordering::Relaxed);
        if old != new_level {
            info!(
                "{:<12} --> 강하 단계 변경: {} -> {}",
                "Degrade", old, new_level
            );
            // 고부하에서는 한 번에 창을 비운다
            if new_level >= 3 {
                self.limiters.lock().unwrap().clear();
            }
            return true;
        }
        false
    }

    /// 메시지 스로틀 여부
    /// Extended / Closed / Error 는 고우선 경로로 우회한다.
    pub fn should_throttle(&self, user_id: i64, kind: MessageKind, now: DateTime<Utc>) -> bool {
        if kind.is_high_priority() {
            return false;
        }

        let level = self.current_level();
        let mut limiters = self.limiters.lock().unwrap();
        let limiter = limiters.entry(user_id).or_insert_with(|| UserRateLimiter {
            last_message: now,
            message_count: 0,
            window_start: now,
        });

        // 1분 창 초기화
        if now - limiter.window_start > Duration::minutes(1) {
            limiter.message_count = 1;
            limiter.window_start = now;
            limiter.last_message = now;
            return false;
        }

        // 최초 메시지
        if limiter.message_count == 0 {
            limiter.message_count = 1;
            limiter.last_message = now;
            return false;
        }

        // 최소 간격 검사
        if now - limiter.last_message < min_message_interval(level) {
            return true;
        }

        // 창 내 개수 검사
        if limiter.message_count >= max_messages_per_window(level) {
            return true;
        }

        limiter.message_count += 1;
        limiter.last_message = now;
        false
    }

    /// 5분 이상 유휴 상태인 리미터 제거
    pub fn cleanup_limiters(&self, now: DateTime<Utc>) {
        let mut limiters = self.limiters.lock().unwrap();
        limiters.retain(|_, l| now - l.last_message <= Duration::minutes(5));
    }

    #[cfg(test)]
    fn limiter_count(&self) -> usize {
        self.limiters.lock().unwrap().len()
    }
}
// endregion: --- DegradationController

// endregion: --- Tests
