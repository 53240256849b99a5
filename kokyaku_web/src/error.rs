use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kokyaku::domain::{customer::ServiceError, DataAccessError};
use serde_json::json;
use tracing::error;

/// ハンドラのエラー
///
/// 5xx はログに残してから `{"error": message}` を返す。
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("リクエスト処理エラー: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DataAccessError> for AppError {
    fn from(value: DataAccessError) -> Self {
        Self::internal(value.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        Self::internal(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use kokyaku::domain::customer::CustomerError;

    use super::*;

    #[test]
    fn test_status() {
        assert_eq!(AppError::bad_request("x").status, StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(ServiceError::from(CustomerError::FirstCharNotUppercase)).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(DataAccessError::ConnectionError("down".into())).message,
            "Database connection error: down"
        );
    }
}
