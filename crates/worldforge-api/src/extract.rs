//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;
use worldforge_core::error::DomainError;

use crate::error::ApiError;

/// Header naming the calling user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The calling user, taken from the `x-user-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| {
                DomainError::Validation(format!("missing {USER_ID_HEADER} header"))
            })?
            .to_str()
            .map_err(|_| DomainError::Validation(format!("{USER_ID_HEADER} is not valid text")))?;

        let user_id = Uuid::parse_str(value.trim())
            .map_err(|_| DomainError::Validation(format!("{USER_ID_HEADER} must be a UUID")))?;
        Ok(Self(user_id))
    }
}
