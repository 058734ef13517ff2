//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use booking::CallerIdentity;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl CallerIdentity for Caller {
    fn subject(&self) -> UserId {
        self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;

        let user_id = value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<UserId>().ok())
            .ok_or_else(|| ApiError::Unauthenticated(format!("invalid {USER_ID_HEADER} header")))?;

        Ok(Caller(user_id))
    }
}
