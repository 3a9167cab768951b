use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::classifier::MSG_NOT_A_LEAF;
use crate::models::ErrorResponse;
use crate::preprocess::Rejection;

pub const MSG_NOT_AN_IMAGE: &str = "Please upload an image file.";
pub const MSG_UNDECODABLE: &str = "Could not process the image. Please upload a valid image file.";
pub const MSG_NO_FILE: &str = "No file uploaded. Please attach an image in the 'file' field.";
pub const MSG_BAD_MULTIPART: &str = "Invalid multipart upload.";

/// Everything `/predict` can answer with besides a prediction.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", MSG_NOT_AN_IMAGE)]
    NotAnImage,
    #[error("{}", MSG_NO_FILE)]
    MissingFile,
    #[error("Image is too large. Maximum upload size is {limit} bytes.")]
    TooLarge { limit: usize },
    #[error("{}", MSG_BAD_MULTIPART)]
    Multipart(#[from] actix_multipart::MultipartError),
    #[error("{}", MSG_UNDECODABLE)]
    Undecodable,
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("{}", MSG_NOT_A_LEAF)]
    LowConfidence,
    #[error("Internal server error.")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_bad_request() {
        for err in [
            ApiError::NotAnImage,
            ApiError::MissingFile,
            ApiError::TooLarge { limit: 10 },
            ApiError::Undecodable,
            ApiError::Rejected(Rejection::TooDark),
            ApiError::LowConfidence,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let err = ApiError::Internal("tract exploded".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error.");
    }

    #[test]
    fn rejection_message_passes_through() {
        let err = ApiError::from(Rejection::TooBright);
        assert_eq!(err.to_string(), crate::preprocess::MSG_TOO_BRIGHT);
    }
}
