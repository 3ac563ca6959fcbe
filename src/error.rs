use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::vote::VoteError;

/// Errors returned to dashboard clients. Messages are shown to visitors as-is,
/// so they are written in Korean like the rest of the page.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("데이터를 불러올 수 없습니다. 잠시 후 다시 시도해주세요. ({0})")]
    FeedUnavailable(String),

    #[error("현재 진행 중인 설문이 없습니다.")]
    PollNotActive,

    #[error("잘못된 요청입니다. ({0})")]
    InvalidRequest(String),

    #[error("{}", vote_message(.0))]
    Vote(#[from] VoteError),
}

fn vote_message(error: &VoteError) -> String {
    match error {
        VoteError::InvalidChoice { choice, .. } => format!("선택할 수 없는 항목입니다: {choice}"),
        VoteError::InFlight(_) => "투표를 처리하고 있습니다. 잠시만 기다려주세요.".to_string(),
        VoteError::BackendUnavailable(_) => {
            "투표를 저장하지 못했습니다. 잠시 후 다시 시도해주세요.".to_string()
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::FeedUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::PollNotActive => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Vote(VoteError::InvalidChoice { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Vote(VoteError::InFlight(_)) => StatusCode::CONFLICT,
            ApiError::Vote(VoteError::BackendUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if let ApiError::Vote(e) = &self {
            debug!(error = %e, %status, "Vote request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
