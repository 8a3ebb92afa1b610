mod errors;
mod payment_flow_api;
mod payment_objects;

pub use errors::{PaymentFlowError, WebhookError};
pub use payment_flow_api::PaymentFlowApi;
pub use payment_objects::{ConfirmRequest, WebhookFailure, WebhookNotification, WebhookOutcome};
