/// 인증 컨트랙트 (소비 전용)
/// 토큰 발급/갱신은 외부 서비스 책임이고, 엔진은 공유 시크릿으로 검증만 한다.
/// 발급자(issuer)가 구성값과 다르면 요청을 거부한다.
// region:    --- Imports
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::handlers::AppState;

// endregion: --- Imports

// region:    --- Principal
/// 인증된 주체
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub role: String,
    pub email: Option<String>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// JWT 클레임
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    pub iss: String,
    pub exp: usize,
}

/// 토큰 검증 후 주체 반환
pub fn verify_token(token: &str, secret: &str, issuer: &str) -> Result<Principal, EngineError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[issuer]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => EngineError::IssuerMismatch,
        _ => EngineError::Unauthorized,
    })?;

    // 발급자 재확인
    if data.claims.iss != issuer {
        return Err(EngineError::IssuerMismatch);
    }

    Ok(Principal {
        user_id: data.claims.user_id,
        role: data.claims.role,
        email: data.claims.email,
    })
}

/// Authorization 헤더 또는 쿼리 파라미터에서 토큰 추출
/// (WebSocket 업그레이드 요청은 헤더를 못 싣는 클라이언트가 있어 ?token= 도 허용)
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    parts.uri.query().and_then(|q| {
        q.split('&')
            .find_map(|pair| pair.strip_prefix("token="))
            .map(|t| t.to_string())
    })
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = EngineError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts).ok_or(EngineError::Unauthorized)?;
        verify_token(&token, &state.config.jwt_secret, &state.config.jwt_issuer)
    }
}
// endregion: --- Principal

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        user_id: i64,
        role: String,
        iss: String,
        exp: usize,
    }

    fn make_token(user_id: i64, role: &str, iss: &str, secret: &str) -> String {
        let claims = TestClaims {
            user_id,
            role: role.to_string(),
            iss: iss.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_round_trip() {
        let token = make_token(42, "user", "auction-engine", "s3cret");
        let principal = verify_token(&token, "s3cret", "auction-engine").unwrap();
        assert_eq!(principal.user_id, 42);
        assert!(!principal.is_admin());
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let token = make_token(42, "user", "someone-else", "s3cret");
        let err = verify_token(&token, "s3cret", "auction-engine").unwrap_err();
        assert_eq!(err.code(), "issuer_mismatch");
    }

    #[test]
    fn test_bad_secret_rejected() {
        let token = make_token(42, "admin", "auction-engine", "wrong");
        let err = verify_token(&token, "s3cret", "auction-engine").unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}
// endregion: --- Tests
