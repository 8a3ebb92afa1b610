//! Payment Engine
//!
//! The payment engine holds the core logic of the marketplace's payment authorization and
//! reconciliation service. It is transport-agnostic: the HTTP surface lives in the server crate
//! and drives everything through [`PaymentFlowApi`].
//!
//! The library is divided into three main sections:
//! 1. Storage ([`mod@sqlite`] behind the `sqlite` feature, with the backend contract in
//!    [`mod@traits`]). The payment ledger, the append-only history table and the idempotency
//!    store live here. You should never need to access the database directly; use the flow API.
//!    The row types in [`mod@db_types`] are public.
//! 2. The flow API ([`PaymentFlowApi`]): confirmation, cancellation, webhook reconciliation and
//!    the read paths, together with the collaborator contracts (gateway, order service, user
//!    and store directories) that concrete HTTP clients implement.
//! 3. Events ([`mod@events`]): after a payment transition is durably recorded, a matching event
//!    is published to any subscribed hooks over a small mpsc-based pub-sub layer.

pub mod db_types;
pub mod events;
pub mod helpers;

mod flow_api;
mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePaymentStore;

pub use flow_api::{
    ConfirmRequest,
    PaymentFlowApi,
    PaymentFlowError,
    WebhookError,
    WebhookFailure,
    WebhookNotification,
    WebhookOutcome,
};
pub use traits::{
    CollaboratorError,
    GatewayApproval,
    GatewayCancellation,
    GatewayError,
    IdempotencyClaim,
    OrderService,
    OrderSummary,
    PaymentProviderClient,
    PaymentStore,
    PaymentStoreError,
    StatusUpdate,
    StoreDirectory,
    UserDirectory,
};
