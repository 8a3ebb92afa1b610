mod collaborators;
mod payment_store;

pub use collaborators::{
    CollaboratorError,
    GatewayApproval,
    GatewayCancellation,
    GatewayError,
    OrderService,
    OrderSummary,
    PaymentProviderClient,
    StoreDirectory,
    UserDirectory,
};
pub use payment_store::{IdempotencyClaim, PaymentStore, PaymentStoreError, StatusUpdate};
