//! Bearer-token extractor resolving the caller through the user directory.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use storefront_types::domain::caller::Caller;
use storefront_types::ports::StoreRepository;

use super::server::AppState;
use crate::auth::{AuthError, JwtAuth};
use crate::errors::AppError;

/// The authenticated caller of a handler.
#[derive(Debug, Clone)]
pub struct AuthCaller(pub Caller);

impl<R: StoreRepository> FromRequestParts<AppState<R>> for AuthCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<R>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<AuthCaller>() {
            return Ok(caller.clone());
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = JwtAuth::extract_from_header(header).ok_or(AuthError::MissingToken)?;

        let user_id = state.auth.verify(token).map_err(|e| {
            tracing::warn!(uri = %parts.uri, error = %e, "bearer token rejected");
            e
        })?;
        let profile = state
            .repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(format!("unknown user {user_id}")))?;

        let caller = AuthCaller(Caller::from(profile));
        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}
