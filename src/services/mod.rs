pub mod payment_initiator;
pub mod reconciliation;

pub use payment_initiator::{Initiation, InitiationError, InitiationResponse, PaymentInitiator};
pub use reconciliation::{Acknowledgment, CallbackResult, Reconciler, Reconciliation};

// Status codes shared with the gateway's vocabulary.
pub const SUCCESS_CODE: &str = "0";
pub const FAILURE_CODE: &str = "1";
pub const GENERIC_FAILURE_CODE: &str = "999";
