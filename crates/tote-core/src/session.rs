//! Composition root for one shopper session.
//!
//! [`CartSession`] threads the synchronizer, the visibility controller and
//! the layout inputs together explicitly. UI surfaces take a
//! [`CartReader`](crate::store::CartReader) from it; only the session
//! writes.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{BackendError, CartBackend};
use crate::error::ErrorCode;
use crate::layout::{LayoutConfig, LayoutGeometry, Viewport, derive_layout};
use crate::model::line::{CartId, MerchandiseId};
use crate::model::snapshot::CartSnapshot;
use crate::mutation::{LineDraft, MutationRequest};
use crate::storage::CartIdStore;
use crate::store::{CartNotice, CartReader, CartView};
use crate::sync::{CartSynchronizer, Resolution, SyncError, Ticket};
use crate::visibility::{CartVisibility, VisibilityChange, VisibilityState};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a checkout redirect to {0} is already in progress")]
    CheckoutPending(Url),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl SessionError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CheckoutPending(_) => ErrorCode::CheckoutPending,
            Self::Sync(err) => err.code(),
        }
    }
}

/// One-shot navigation to the hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    pub cart_id: CartId,
    pub url: Url,
}

#[derive(Debug)]
pub struct CartSession<B, S> {
    sync: CartSynchronizer<B, S>,
    visibility: CartVisibility,
    layout: LayoutConfig,
    viewport: Viewport,
    checkout: Option<CheckoutRedirect>,
}

impl<B: CartBackend, S: CartIdStore> CartSession<B, S> {
    #[must_use]
    pub fn new(sync: CartSynchronizer<B, S>, layout: LayoutConfig, viewport: Viewport) -> Self {
        let mut visibility = CartVisibility::new();
        visibility.observe(sync.view().total_quantity());
        Self {
            sync,
            visibility,
            layout,
            viewport,
            checkout: None,
        }
    }

    /// Resume the stored cart, if any.
    ///
    /// Loading an existing cart is not add-to-cart feedback, so the
    /// visibility baseline is reset to the loaded quantity.
    ///
    /// # Errors
    ///
    /// See [`CartSynchronizer::resume`].
    pub fn start(&mut self) -> Result<Option<CartId>, SyncError> {
        let resumed = self.sync.resume()?;
        self.rebaseline();
        Ok(resumed)
    }

    #[must_use]
    pub fn reader(&self) -> CartReader {
        self.sync.reader()
    }

    #[must_use]
    pub fn view(&self) -> CartView {
        self.sync.view()
    }

    /// What the shopper currently sees.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.sync.view().provisional
    }

    #[must_use]
    pub const fn visibility(&self) -> VisibilityState {
        self.visibility.state()
    }

    #[must_use]
    pub const fn synchronizer(&self) -> &CartSynchronizer<B, S> {
        &self.sync
    }

    pub fn synchronizer_mut(&mut self) -> &mut CartSynchronizer<B, S> {
        &mut self.sync
    }

    /// # Errors
    ///
    /// See [`CartSynchronizer::submit`].
    pub fn add_to_cart(
        &mut self,
        merchandise_id: MerchandiseId,
        quantity: u32,
        draft: Option<LineDraft>,
    ) -> Result<Resolution, SyncError> {
        self.run(MutationRequest::Add {
            merchandise_id,
            quantity,
            draft,
        })
    }

    /// Increase a line by one. `Ok(None)` when the line is not in the cart.
    ///
    /// # Errors
    ///
    /// See [`CartSynchronizer::submit`].
    pub fn increment(&mut self, merchandise_id: MerchandiseId) -> Result<Option<Resolution>, SyncError> {
        quiet_noop(self.run(MutationRequest::Increment { merchandise_id }))
    }

    /// Decrease a line by one, removing it at quantity one.
    ///
    /// # Errors
    ///
    /// See [`CartSynchronizer::submit`].
    pub fn decrement(&mut self, merchandise_id: MerchandiseId) -> Result<Option<Resolution>, SyncError> {
        quiet_noop(self.run(MutationRequest::Decrement { merchandise_id }))
    }

    /// # Errors
    ///
    /// See [`CartSynchronizer::submit`].
    pub fn remove(&mut self, merchandise_id: MerchandiseId) -> Result<Option<Resolution>, SyncError> {
        quiet_noop(self.run(MutationRequest::Remove { merchandise_id }))
    }

    /// Phase one for callers that drive backend I/O themselves.
    ///
    /// # Errors
    ///
    /// See [`CartSynchronizer::submit`].
    pub fn submit(&mut self, request: MutationRequest) -> Result<Ticket, SyncError> {
        let submitted = self.sync.submit(request);
        self.observe();
        submitted
    }

    /// Phase two for callers that drive backend I/O themselves.
    pub fn resolve(
        &mut self,
        ticket: Ticket,
        outcome: Result<CartSnapshot, BackendError>,
    ) -> Resolution {
        let resolution = self.sync.resolve(ticket, outcome);
        self.settle();
        self.observe();
        resolution
    }

    /// # Errors
    ///
    /// See [`CartSynchronizer::refresh`].
    pub fn refresh(&mut self) -> Result<bool, SyncError> {
        let refreshed = self.sync.refresh()?;
        self.observe();
        Ok(refreshed)
    }

    pub fn open_cart(&mut self) -> Option<VisibilityChange> {
        self.visibility.open()
    }

    pub fn close_cart(&mut self) -> Option<VisibilityChange> {
        self.visibility.close()
    }

    pub fn outside_click(&mut self) -> Option<VisibilityChange> {
        self.visibility.outside_click()
    }

    /// A link was followed while the panel may be open.
    pub fn navigate(&mut self) -> Option<VisibilityChange> {
        self.visibility.navigate()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    #[must_use]
    pub fn layout(&self) -> LayoutGeometry {
        derive_layout(self.visibility.state(), self.viewport, &self.layout)
    }

    /// Start the checkout redirect. Only one may be outstanding.
    ///
    /// # Errors
    ///
    /// [`SessionError::CheckoutPending`] while a redirect is in progress,
    /// otherwise see [`CartSynchronizer::checkout_url`].
    pub fn checkout(&mut self) -> Result<CheckoutRedirect, SessionError> {
        if let Some(outstanding) = &self.checkout {
            return Err(SessionError::CheckoutPending(outstanding.url.clone()));
        }
        let url = self.sync.checkout_url()?;
        let cart_id = self.sync.cart_id().cloned().ok_or(SyncError::NoCart)?;
        info!(cart = %cart_id, %url, "redirecting to checkout");
        let redirect = CheckoutRedirect { cart_id, url };
        self.checkout = Some(redirect.clone());
        Ok(redirect)
    }

    /// The redirect finished or was abandoned.
    pub fn checkout_finished(&mut self) -> Option<CheckoutRedirect> {
        self.checkout.take()
    }

    /// Forget the cart entirely.
    ///
    /// # Errors
    ///
    /// See [`CartSynchronizer::reset`].
    pub fn reset(&mut self) -> Result<(), SyncError> {
        self.sync.reset()?;
        self.checkout = None;
        self.visibility.close();
        self.rebaseline();
        Ok(())
    }

    fn run(&mut self, request: MutationRequest) -> Result<Resolution, SyncError> {
        let ticket = self.submit(request)?;
        let outcome = self.sync.dispatch(&ticket);
        Ok(self.resolve(ticket, outcome))
    }

    /// Re-fetch once the last response is in if the confirmed cart is only
    /// an estimate.
    fn settle(&mut self) {
        if self.sync.pending_len() > 0 || !self.sync.view().needs_refresh {
            return;
        }
        match self.sync.refresh() {
            Ok(replaced) => debug!(replaced, "refreshed cart after settling"),
            Err(err) => {
                warn!("refresh after settling failed: {err}");
                self.sync.post_notice(CartNotice::new(err.code(), true));
            }
        }
    }

    fn observe(&mut self) {
        let quantity = self.sync.view().total_quantity();
        if let Some(change) = self.visibility.observe(quantity) {
            debug!(?change, quantity, "cart panel auto-opened");
        }
    }

    fn rebaseline(&mut self) {
        let state = self.visibility.state();
        let mut fresh = CartVisibility::new();
        if state.is_open() {
            fresh.open();
        }
        fresh.observe(self.sync.view().total_quantity());
        self.visibility = fresh;
    }
}

fn quiet_noop(result: Result<Resolution, SyncError>) -> Result<Option<Resolution>, SyncError> {
    match result {
        Ok(resolution) => Ok(Some(resolution)),
        Err(SyncError::NoSuchLine(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
