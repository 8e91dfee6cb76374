//! Request extractors that reject with the bilingual error envelope.

use axum::body::Bytes;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body whose rejections are reported as `400` validation errors.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(data))
    }
}

/// JSON body that may be left out entirely.
///
/// An empty body yields `None`; anything else must parse.
pub struct OptionalJson<T>(pub Option<T>);

impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        parse_optional(&bytes).map(Self)
    }
}

fn parse_optional<T: DeserializeOwned>(bytes: &[u8]) -> Result<Option<T>, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reason {
        reason: String,
    }

    #[test]
    fn test_empty_body_is_none() {
        assert_eq!(parse_optional::<Reason>(b"").unwrap(), None);
        assert_eq!(parse_optional::<Reason>(b"  \n").unwrap(), None);
    }

    #[test]
    fn test_body_is_parsed() {
        let parsed = parse_optional::<Reason>(br#"{"reason":"changed mind"}"#).unwrap();
        assert_eq!(
            parsed,
            Some(Reason {
                reason: "changed mind".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        let err = parse_optional::<Reason>(b"{oops").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
