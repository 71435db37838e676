//! Single-writer cart view store.
//!
//! [`CartPublisher`] is the only handle that can change the published view
//! and is owned by the synchronizer. Any number of [`CartReader`]s observe
//! it. Each publication bumps `version`, so readers can tell whether they
//! have seen the latest view.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::backend::BackendError;
use crate::error::ErrorCode;
use crate::model::snapshot::CartSnapshot;

/// Error banner requested by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartNotice {
    pub code: ErrorCode,
    pub message: String,
    /// Whether repeating the shopper's action may succeed.
    pub recoverable: bool,
}

impl CartNotice {
    #[must_use]
    pub fn new(code: ErrorCode, recoverable: bool) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            recoverable,
        }
    }

    #[must_use]
    pub fn from_backend(err: &BackendError) -> Self {
        use crate::backend::FailureClass;
        let recoverable = matches!(err.class(), FailureClass::Transient | FailureClass::ExpiredCart);
        Self::new(err.code(), recoverable)
    }
}

/// Everything a UI surface needs to render the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    /// Last authoritative snapshot.
    pub confirmed: CartSnapshot,
    /// What the shopper sees: `confirmed` plus pending mutations.
    pub provisional: CartSnapshot,
    pub pending: usize,
    pub notice: Option<CartNotice>,
    /// Set when lines were merged from out-of-order responses and a full
    /// fetch would tidy up totals.
    pub needs_refresh: bool,
    /// True once a stored cart has been loaded or a new one created.
    pub hydrated: bool,
    pub version: u64,
}

impl CartView {
    fn initial(snapshot: CartSnapshot) -> Self {
        Self {
            confirmed: snapshot.clone(),
            provisional: snapshot,
            pending: 0,
            notice: None,
            needs_refresh: false,
            hydrated: false,
            version: 0,
        }
    }

    #[must_use]
    pub const fn total_quantity(&self) -> u32 {
        self.provisional.total_quantity
    }

    #[must_use]
    pub fn badge_label(&self) -> String {
        self.provisional.badge_label()
    }

    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.pending == 0
    }
}

/// Quantity transition caused by one publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub version: u64,
    pub previous_quantity: u32,
    pub current_quantity: u32,
}

impl Publication {
    #[must_use]
    pub const fn quantity_increased(&self) -> bool {
        self.current_quantity > self.previous_quantity
    }
}

/// Writer half of the store.
#[derive(Debug)]
pub struct CartPublisher {
    shared: Arc<RwLock<CartView>>,
}

impl CartPublisher {
    #[must_use]
    pub fn new(initial: CartSnapshot) -> Self {
        Self {
            shared: Arc::new(RwLock::new(CartView::initial(initial))),
        }
    }

    #[must_use]
    pub fn reader(&self) -> CartReader {
        CartReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Replace the view with `next`, stamping a new version.
    pub fn publish(&mut self, mut next: CartView) -> Publication {
        let mut guard = self.shared.write().unwrap_or_else(PoisonError::into_inner);
        next.version = guard.version.saturating_add(1);
        next.hydrated |= guard.hydrated;
        let publication = Publication {
            version: next.version,
            previous_quantity: guard.provisional.total_quantity,
            current_quantity: next.provisional.total_quantity,
        };
        *guard = next;
        publication
    }

    /// Current view, as last published.
    #[must_use]
    pub fn current(&self) -> CartView {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Read-only handle to the published view. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CartReader {
    shared: Arc<RwLock<CartView>>,
}

impl CartReader {
    #[must_use]
    pub fn view(&self) -> CartView {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.read().unwrap_or_else(PoisonError::into_inner).version
    }

    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .total_quantity()
    }

    #[must_use]
    pub fn badge_label(&self) -> String {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .badge_label()
    }

    #[must_use]
    pub fn notice(&self) -> Option<CartNotice> {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .notice
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::money::CurrencyCode;

    fn empty() -> CartSnapshot {
        CartSnapshot::empty(&CurrencyCode::new("USD").expect("code"))
    }

    #[test]
    fn readers_see_published_views() {
        let mut publisher = CartPublisher::new(empty());
        let reader = publisher.reader();
        let other = reader.clone();
        assert_eq!(reader.version(), 0);

        let mut next = publisher.current();
        next.provisional.total_quantity = 2;
        let publication = publisher.publish(next);

        assert_eq!(publication.version, 1);
        assert!(publication.quantity_increased());
        assert_eq!(other.total_quantity(), 2);
        assert_eq!(other.badge_label(), "BAG [2]");
    }

    #[test]
    fn versions_increase_and_hydration_sticks() {
        let mut publisher = CartPublisher::new(empty());
        let mut next = publisher.current();
        next.hydrated = true;
        publisher.publish(next);

        let again = publisher.current();
        let publication = publisher.publish(CartView {
            hydrated: false,
            ..again
        });
        assert_eq!(publication.version, 2);
        assert!(!publication.quantity_increased());
        assert!(publisher.reader().view().hydrated);
    }

    #[test]
    fn notices_carry_code_message() {
        let notice = CartNotice::from_backend(&BackendError::Timeout);
        assert_eq!(notice.code, ErrorCode::TransientBackend);
        assert_eq!(notice.message, "Could not update cart");
        assert!(notice.recoverable);

        let rejected = CartNotice::from_backend(&BackendError::InvalidQuantity(0));
        assert!(!rejected.recoverable);
    }
}
