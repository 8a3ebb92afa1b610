use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use payment_engine::PaymentFlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    PaymentFlow(#[from] PaymentFlowError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
                AuthError::TokenIssueError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::PaymentFlow(e) => payment_flow_status_code(e),
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// The HTTP status for each payment-flow failure.
///
/// Gateway rejections of an otherwise valid request answer 402, so clients can distinguish "you
/// asked for something invalid" from "the provider said no".
fn payment_flow_status_code(e: &PaymentFlowError) -> StatusCode {
    match e {
        PaymentFlowError::UserNotFound(_) => StatusCode::NOT_FOUND,
        PaymentFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        PaymentFlowError::StoreNotFound(_) => StatusCode::NOT_FOUND,
        PaymentFlowError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        PaymentFlowError::OrderOwnershipMismatch => StatusCode::FORBIDDEN,
        PaymentFlowError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
        PaymentFlowError::OrderNotPayable(_) => StatusCode::BAD_REQUEST,
        PaymentFlowError::NotCancelable(_) => StatusCode::BAD_REQUEST,
        PaymentFlowError::OperationInFlight => StatusCode::CONFLICT,
        PaymentFlowError::ApprovalFailed(_) => StatusCode::PAYMENT_REQUIRED,
        PaymentFlowError::CancelFailed(_) => StatusCode::PAYMENT_REQUIRED,
        PaymentFlowError::CollaboratorUnavailable { .. } => StatusCode::BAD_GATEWAY,
        PaymentFlowError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PaymentFlowError::SnapshotError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("Access token signature is invalid. {0}")]
    ValidationError(String),
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Could not issue access token. {0}")]
    TokenIssueError(String),
}
