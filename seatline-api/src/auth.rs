use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::{Claims, ROLE_ADMIN, ROLE_CUSTOMER};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TokenRequest {
    user_id: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/token", post(issue_token))
}

/// Development identity stub: any caller may obtain a token for any user id.
async fn issue_token(State(state): State<AppState>, Json(req): Json<TokenRequest>) -> Result<Json<AuthResponse>, AppError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id must not be empty".to_string()));
    }
    let role = req.role.unwrap_or_else(|| ROLE_CUSTOMER.to_string());
    if role != ROLE_CUSTOMER && role != ROLE_ADMIN {
        return Err(AppError::Validation(format!("unknown role {}", role)));
    }

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(state.auth.secret.as_bytes()))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("token encoding failed: {}", e)))?;

    Ok(Json(AuthResponse {
        token,
        expires_in: state.auth.expiration,
    }))
}
