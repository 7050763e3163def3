//! Storefront error types.

use domain::{CartError, CheckoutError};
use local_store::StorageError;
use thiserror::Error;

/// Errors reported by remote collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The access token was missing, expired or refused.
    #[error("Unauthorized")]
    Unauthorized,

    /// The requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request was understood but refused; the message is user-facing.
    #[error("{0}")]
    Rejected(String),

    /// The collaborator could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The collaborator failed while handling the request.
    #[error("Server error: {0}")]
    Server(String),
}

impl ServiceError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ServiceError::Unauthorized)
    }

    /// User-facing message of a remote refusal, if this is one.
    pub fn rejection_message(&self) -> Option<&str> {
        match self {
            ServiceError::NotFound(message) | ServiceError::Rejected(message) => Some(message),
            _ => None,
        }
    }
}

/// Errors that can occur in storefront operations.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Remote collaborator error.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Local state could not be read or written.
    #[error("Local storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cart invariant violated.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout validation or transition error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// The operation needs a signed-in shopper.
    #[error("Not signed in")]
    NotAuthenticated,

    /// The session could not be refreshed and was ended.
    #[error("Session expired, please sign in again")]
    SessionExpired,

    /// Writing the merged cart failed; the guest cart is kept for a retry.
    #[error("Could not merge your cart, please try again: {0}")]
    MergeFailed(#[source] ServiceError),

    /// The guest cart has not been merged into the account cart yet.
    #[error("Cart merge has not completed yet")]
    MergePending,

    /// Nothing to check out.
    #[error("Cart is empty")]
    EmptyCart,

    /// An order submission is already running.
    #[error("An order submission is already in progress")]
    SubmissionInFlight,

    /// No saved address has this id.
    #[error("Saved address not found: {0}")]
    AddressNotFound(u64),
}

impl StorefrontError {
    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorefrontError::MergeFailed(_)
                | StorefrontError::MergePending
                | StorefrontError::Service(ServiceError::Network(_) | ServiceError::Server(_))
        )
    }
}

/// Convenience type alias for storefront results.
pub type Result<T> = std::result::Result<T, StorefrontError>;
