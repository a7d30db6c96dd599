/// 엔진 오류 분류
/// 검증/자격/경합/용량/인프라/종료 상태 오류를 안정적인 코드로 구분한다.
// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

// endregion: --- Imports

// region:    --- EngineError
#[derive(Debug, Error)]
pub enum EngineError {
    // 검증 오류 (호출자 잘못, 상태 변경 없음)
    #[error("invalid auction id")]
    InvalidAuctionId,
    #[error("maximum bid must be greater than minimum bid")]
    InvalidRange,
    #[error("auction duration must be between {min_days} and {max_days} days")]
    DurationExceeded { min_days: i64, max_days: i64 },
    #[error("start time cannot be in the past")]
    StartInPast,
    #[error("invalid amount")]
    InvalidAmount,

    // 자격 오류
    #[error("user is blacklisted")]
    Blacklisted,
    #[error("operation not permitted for this principal")]
    Forbidden,
    #[error("auction is not active")]
    AuctionNotActive,
    #[error("auction has ended")]
    TooLate,
    #[error("buy it now is not available for this auction")]
    BuyItNowNotAvailable,

    // 경합 오류
    #[error("bidding too frequently")]
    TooFrequent { cooldown_seconds: i64 },
    #[error("too many concurrent sessions")]
    ConnectionLimit,

    // 용량 오류 (재시도 가능)
    #[error("rate limited")]
    RateLimited,
    #[error("service temporarily unavailable")]
    ServiceUnavailable,

    // 종료 상태 오류
    #[error("auction already closed")]
    AuctionClosed,
    #[error("invalid state for this operation: {0}")]
    InvalidState(String),

    // 리소스 없음
    #[error("{0} not found")]
    NotFound(&'static str),

    // 인증 오류
    #[error("authentication required")]
    Unauthorized,
    #[error("principal issuer mismatch")]
    IssuerMismatch,

    // 인프라 오류 (롤백 후 표면화, 클라이언트 재시도 안전)
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("event bus unavailable: {0}")]
    BusUnavailable(String),
}

impl EngineError {
    /// 클라이언트에 노출되는 안정 코드
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidAuctionId => "invalid_auction_id",
            EngineError::InvalidRange => "invalid_range",
            EngineError::DurationExceeded { .. } => "duration_exceeded",
            EngineError::StartInPast => "start_in_past",
            EngineError::InvalidAmount => "invalid_amount",
            EngineError::Blacklisted => "blacklisted",
            EngineError::Forbidden => "forbidden",
            EngineError::AuctionNotActive => "auction_not_active",
            EngineError::TooLate => "too_late",
            EngineError::BuyItNowNotAvailable => "buy_it_now_not_available",
            EngineError::TooFrequent { .. } => "too_frequent",
            EngineError::ConnectionLimit => "connection_limit",
            EngineError::RateLimited => "rate_limited",
            EngineError::ServiceUnavailable => "service_unavailable",
            EngineError::AuctionClosed => "auction_closed",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::NotFound(_) => "not_found",
            EngineError::Unauthorized => "unauthorized",
            EngineError::IssuerMismatch => "issuer_mismatch",
            EngineError::StorageUnavailable(_) => "storage_unavailable",
            EngineError::BusUnavailable(_) => "bus_unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EngineError::InvalidAuctionId
            | EngineError::InvalidAmount => StatusCode::BAD_REQUEST,
            EngineError::InvalidRange
            | EngineError::DurationExceeded { .. }
            | EngineError::StartInPast => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Blacklisted | EngineError::Forbidden => StatusCode::FORBIDDEN,
            EngineError::AuctionNotActive
            | EngineError::TooLate
            | EngineError::BuyItNowNotAvailable
            | EngineError::TooFrequent { .. }
            | EngineError::AuctionClosed
            | EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::ConnectionLimit | EngineError::RateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Unauthorized | EngineError::IssuerMismatch => StatusCode::UNAUTHORIZED,
            EngineError::ServiceUnavailable
            | EngineError::StorageUnavailable(_)
            | EngineError::BusUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// 오류 응답 본문
#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cooldown_seconds: Option<i64>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        if let EngineError::StorageUnavailable(detail) = &self {
            error!("{:<12} --> 스토리지 오류: {}", "Error", detail);
        }

        let cooldown = match &self {
            EngineError::TooFrequent { cooldown_seconds } => Some(*cooldown_seconds),
            _ => None,
        };

        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            cooldown_seconds: cooldown,
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EngineError::NotFound("record"),
            other => EngineError::StorageUnavailable(other.to_string()),
        }
    }
}
// endregion: --- EngineError

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(EngineError::Blacklisted.code(), "blacklisted");
        assert_eq!(
            EngineError::TooFrequent {
                cooldown_seconds: 5
            }
            .code(),
            "too_frequent"
        );
        assert_eq!(
            EngineError::StorageUnavailable("down".into()).code(),
            "storage_unavailable"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            EngineError::TooLate.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::ConnectionLimit.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            EngineError::StorageUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
// endregion: --- Tests
