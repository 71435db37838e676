//! Boundary to the external commerce backend.
//!
//! The backend is the source of truth for carts. The synchronizer only needs
//! the narrow surface of [`CartBackend`]; any transport (HTTP storefront API,
//! in-process fake, recorded fixture) can sit behind it.

pub mod memory;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ErrorCode;
use crate::model::line::{CartId, LineId, MerchandiseId};
use crate::model::snapshot::CartSnapshot;
use crate::timing;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// How the synchronizer must react to a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Safe to retry on the next shopper action.
    Transient,
    /// The cart id is invalid or expired; mint a new cart and replay once.
    ExpiredCart,
    /// The backend refused this particular request.
    Rejected,
    /// The response could not be understood.
    Malformed,
}

/// Errors reported by a [`CartBackend`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend unavailable (status {status})")]
    Unavailable { status: u16 },

    #[error("cart {0} not found")]
    CartNotFound(CartId),

    #[error("cart line {0} not found")]
    LineNotFound(LineId),

    #[error("merchandise {0} is not available")]
    MerchandiseUnknown(MerchandiseId),

    #[error("invalid quantity {0}")]
    InvalidQuantity(u32),

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Network(_) | Self::Timeout | Self::Unavailable { .. } => FailureClass::Transient,
            Self::CartNotFound(_) => FailureClass::ExpiredCart,
            Self::LineNotFound(_) | Self::MerchandiseUnknown(_) | Self::InvalidQuantity(_) => {
                FailureClass::Rejected
            }
            Self::Malformed(_) => FailureClass::Malformed,
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Network(_) | Self::Timeout | Self::Unavailable { .. } => ErrorCode::TransientBackend,
            Self::CartNotFound(_) => ErrorCode::CartNotFound,
            Self::LineNotFound(_) => ErrorCode::LineNotFound,
            Self::MerchandiseUnknown(_) => ErrorCode::MerchandiseUnknown,
            Self::InvalidQuantity(_) => ErrorCode::InvalidQuantity,
            Self::Malformed(_) => ErrorCode::MalformedResponse,
        }
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// A prepared line operation, computed synchronously when a mutation is
/// submitted and executed later by whoever drives I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BackendCall {
    AddLine {
        merchandise_id: MerchandiseId,
        quantity: u32,
    },
    UpdateLine {
        line_id: LineId,
        merchandise_id: MerchandiseId,
        quantity: u32,
    },
    RemoveLine {
        line_id: LineId,
        merchandise_id: MerchandiseId,
    },
}

impl BackendCall {
    #[must_use]
    pub const fn merchandise_id(&self) -> &MerchandiseId {
        match self {
            Self::AddLine { merchandise_id, .. }
            | Self::UpdateLine { merchandise_id, .. }
            | Self::RemoveLine { merchandise_id, .. } => merchandise_id,
        }
    }

    /// Short operation name used for logs and timing samples.
    #[must_use]
    pub const fn op_name(&self) -> &'static str {
        match self {
            Self::AddLine { .. } => "backend.add_line",
            Self::UpdateLine { .. } => "backend.update_line",
            Self::RemoveLine { .. } => "backend.remove_line",
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// The commerce backend's cart API.
pub trait CartBackend {
    /// Create an empty cart and return its id.
    fn create_cart(&mut self) -> Result<CartId, BackendError>;

    /// Fetch the authoritative cart.
    fn fetch_cart(&mut self, cart_id: &CartId) -> Result<CartSnapshot, BackendError>;

    /// Add `quantity` of a variant; existing lines are incremented.
    fn add_line(
        &mut self,
        cart_id: &CartId,
        merchandise_id: &MerchandiseId,
        quantity: u32,
    ) -> Result<CartSnapshot, BackendError>;

    /// Set the absolute quantity of a line.
    fn update_line_quantity(
        &mut self,
        cart_id: &CartId,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<CartSnapshot, BackendError>;

    /// Delete a line.
    fn remove_line(&mut self, cart_id: &CartId, line_id: &LineId) -> Result<CartSnapshot, BackendError>;

    /// Hosted checkout location for the cart.
    fn checkout_url(&mut self, cart_id: &CartId) -> Result<Url, BackendError>;

    /// Run a prepared call.
    fn execute(&mut self, cart_id: &CartId, call: &BackendCall) -> Result<CartSnapshot, BackendError> {
        timing::timed(call.op_name(), || match call {
            BackendCall::AddLine {
                merchandise_id,
                quantity,
            } => self.add_line(cart_id, merchandise_id, *quantity),
            BackendCall::UpdateLine {
                line_id, quantity, ..
            } => self.update_line_quantity(cart_id, line_id, *quantity),
            BackendCall::RemoveLine { line_id, .. } => self.remove_line(cart_id, line_id),
        })
    }
}

impl<T: CartBackend + ?Sized> CartBackend for &mut T {
    fn create_cart(&mut self) -> Result<CartId, BackendError> {
        (**self).create_cart()
    }

    fn fetch_cart(&mut self, cart_id: &CartId) -> Result<CartSnapshot, BackendError> {
        (**self).fetch_cart(cart_id)
    }

    fn add_line(
        &mut self,
        cart_id: &CartId,
        merchandise_id: &MerchandiseId,
        quantity: u32,
    ) -> Result<CartSnapshot, BackendError> {
        (**self).add_line(cart_id, merchandise_id, quantity)
    }

    fn update_line_quantity(
        &mut self,
        cart_id: &CartId,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<CartSnapshot, BackendError> {
        (**self).update_line_quantity(cart_id, line_id, quantity)
    }

    fn remove_line(&mut self, cart_id: &CartId, line_id: &LineId) -> Result<CartSnapshot, BackendError> {
        (**self).remove_line(cart_id, line_id)
    }

    fn checkout_url(&mut self, cart_id: &CartId) -> Result<Url, BackendError> {
        (**self).checkout_url(cart_id)
    }
}
