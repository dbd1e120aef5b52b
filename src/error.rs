// error.rs
// 对外的 HTTP 错误分类，每一种对应一个状态码
use actix_web::http::header::{ContentType, WWW_AUTHENTICATE};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::scaling::scaling_error::ScalingError;

pub const BASIC_AUTH_REALM: &str = "Basic realm=\"Restricted\"";

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ProviderUnavailable(String),

    #[error("{0}")]
    FunctionUnavailable(String),

    #[error("{0}")]
    ScaleFailed(String),

    #[error("{0}")]
    UpstreamTimeout(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    QueueFull(String),

    #[error("{0}")]
    Internal(String),
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ProviderUnavailable(_) | GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            GatewayError::FunctionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ScaleFailed(_) | GatewayError::QueueFull(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut resp = HttpResponse::build(self.status_code());
        resp.insert_header(ContentType::plaintext());
        if let GatewayError::Unauthorized = self {
            resp.insert_header((WWW_AUTHENTICATE, BASIC_AUTH_REALM));
        }
        resp.body(self.to_string())
    }
}

impl From<ScalingError> for GatewayError {
    fn from(err: ScalingError) -> Self {
        match err {
            ScalingError::NotFound(_) => GatewayError::NotFound(err.to_string()),
            ScalingError::HttpError(..) | ScalingError::Transport(_) | ScalingError::JsonError(_) => {
                GatewayError::ProviderUnavailable(err.to_string())
            }
            ScalingError::ScaleFailed { .. }
            | ScalingError::PollTimeout { .. }
            | ScalingError::Abandoned(_) => GatewayError::ScaleFailed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::UpstreamTimeout("x".into()).status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            GatewayError::FunctionUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(GatewayError::QueueFull("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_scaling_errors_are_classified() {
        let not_found: GatewayError = ScalingError::NotFound("figlet.openfaas-fn".into()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let down: GatewayError = ScalingError::Transport("connection refused".into()).into();
        assert_eq!(down.status_code(), StatusCode::BAD_GATEWAY);

        let failed: GatewayError = ScalingError::ScaleFailed {
            function: "figlet".into(),
            reason: "quota".into(),
        }
        .into();
        assert_eq!(failed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(failed.to_string().contains("figlet"));
    }

    #[actix_rt::test]
    async fn test_unauthorized_carries_challenge() {
        let resp = GatewayError::Unauthorized.error_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers().get(WWW_AUTHENTICATE).unwrap(), BASIC_AUTH_REALM);

        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, "invalid credentials");
    }
}
