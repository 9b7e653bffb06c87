use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};

use reunite_types::api::Claims;

use crate::AppState;

/// Extract and validate the bearer token, leaving Claims in the request
/// extensions. Token issuance lives in the external auth service; this layer
/// only verifies and hands the engines a resolved identity.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode_claims(token, &state.jwt_secret).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    fn token_for(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_valid_claims() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "asha".into(),
            is_staff: true,
            exp: (chrono_now() + 3600) as usize,
        };
        let token = token_for(&claims, "secret");
        let decoded = decode_claims(&token, "secret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert!(decoded.is_staff);
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "asha".into(),
            is_staff: false,
            exp: (chrono_now() + 3600) as usize,
        };
        let token = token_for(&claims, "secret");
        assert!(decode_claims(&token, "other-secret").is_none());
        assert!(decode_claims("not-a-token", "secret").is_none());
    }

    fn chrono_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }
}
