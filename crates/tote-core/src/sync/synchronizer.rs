//! The cart synchronizer: optimistic publish, backend round-trip,
//! reconciliation.
//!
//! Mutations run in two phases so that the caller decides when (and in what
//! interleaving) backend I/O happens:
//!
//! 1. [`CartSynchronizer::submit`] stamps the request, publishes the
//!    optimistic view and prepares a [`BackendCall`].
//! 2. [`CartSynchronizer::resolve`] reconciles the backend's answer.
//!
//! [`CartSynchronizer::mutate`] runs both phases back to back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{BackendCall, BackendError, CartBackend, FailureClass};
use crate::error::ErrorCode;
use crate::model::line::{CartId, MerchandiseId};
use crate::model::money::{CurrencyCode, Money, MoneyError};
use crate::model::snapshot::{CartSnapshot, CartTotals};
use crate::mutation::{IssuedAt, MutationKind, MutationRequest, PendingMutation};
use crate::reducer;
use crate::storage::{CartIdStore, StorageError};
use crate::store::{CartNotice, CartPublisher, CartReader, CartView, Publication};
use crate::sync::ordering::{Admission, LineWatermarks};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("cart backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no line for {0} in the cart")]
    NoSuchLine(MerchandiseId),

    #[error("line for {0} is not confirmed by the backend yet")]
    LineNotConfirmed(MerchandiseId),

    #[error("invalid quantity {0}")]
    InvalidQuantity(u32),

    #[error("no cart has been created yet")]
    NoCart,
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Backend(err) => err.code(),
            Self::Storage(err) => err.code(),
            Self::NoSuchLine(_) | Self::LineNotConfirmed(_) => ErrorCode::LineNotFound,
            Self::InvalidQuantity(_) => ErrorCode::InvalidQuantity,
            Self::NoCart => ErrorCode::CartNotFound,
        }
    }
}

/// Handle for a submitted mutation whose backend call is outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    issued_at: IssuedAt,
    cart_id: CartId,
    call: BackendCall,
}

impl Ticket {
    #[must_use]
    pub const fn issued_at(&self) -> IssuedAt {
        self.issued_at
    }

    #[must_use]
    pub const fn cart_id(&self) -> &CartId {
        &self.cart_id
    }

    #[must_use]
    pub const fn call(&self) -> &BackendCall {
        &self.call
    }
}

/// What happened to a mutation once its response was reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// Newest response so far; replaced the authoritative snapshot.
    Confirmed,
    /// Accepted, but a later response had already landed; only this
    /// mutation's line was taken.
    Merged,
    /// A newer response already covers this line. Discarded.
    Superseded,
    /// The optimistic change was undone and a notice published.
    RolledBack { notice: CartNotice },
    /// The cart had expired; the mutation was replayed on a new cart.
    Replayed { cart_id: CartId },
    /// The ticket was unknown, e.g. issued before a reset.
    Orphaned,
}

impl Resolution {
    /// Whether the mutation's effect is now part of the authoritative cart.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Merged | Self::Replayed { .. })
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    mutation: PendingMutation,
    replayed: bool,
}

/// Single writer of the cart view.
#[derive(Debug)]
pub struct CartSynchronizer<B, S> {
    backend: B,
    ids: S,
    publisher: CartPublisher,
    currency: CurrencyCode,
    confirmed: CartSnapshot,
    pending: BTreeMap<IssuedAt, InFlight>,
    clock: IssuedAt,
    watermarks: LineWatermarks,
    needs_refresh: bool,
    notice: Option<CartNotice>,
    hydrated: bool,
}

impl<B: CartBackend, S: CartIdStore> CartSynchronizer<B, S> {
    #[must_use]
    pub fn new(backend: B, ids: S, currency: CurrencyCode) -> Self {
        let confirmed = CartSnapshot::empty(&currency);
        Self {
            backend,
            ids,
            publisher: CartPublisher::new(confirmed.clone()),
            currency,
            confirmed,
            pending: BTreeMap::new(),
            clock: IssuedAt::ZERO,
            watermarks: LineWatermarks::new(),
            needs_refresh: false,
            notice: None,
            hydrated: false,
        }
    }

    #[must_use]
    pub fn reader(&self) -> CartReader {
        self.publisher.reader()
    }

    #[must_use]
    pub fn view(&self) -> CartView {
        self.publisher.current()
    }

    /// Last authoritative snapshot.
    #[must_use]
    pub const fn confirmed(&self) -> &CartSnapshot {
        &self.confirmed
    }

    #[must_use]
    pub const fn cart_id(&self) -> Option<&CartId> {
        self.confirmed.id.as_ref()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[must_use]
    pub const fn id_store(&self) -> &S {
        &self.ids
    }

    /// Make sure a backend cart exists and return its id.
    ///
    /// Uses the in-memory id, then the stored id, and only then creates a
    /// new cart. Calling it again never creates a second cart.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Backend`] when cart creation fails.
    pub fn ensure_cart(&mut self) -> Result<CartId, SyncError> {
        if let Some(id) = &self.confirmed.id {
            return Ok(id.clone());
        }

        match self.ids.load() {
            Ok(Some(id)) => {
                debug!(cart = %id, "adopting stored cart id");
                self.adopt(CartSnapshot::created(id.clone(), &self.currency));
                return Ok(id);
            }
            Ok(None) => {}
            Err(err) => warn!("could not read stored cart id: {err}"),
        }

        let id = self.backend.create_cart()?;
        info!(cart = %id, "created cart");
        if let Err(err) = self.ids.save(&id) {
            warn!(cart = %id, "could not persist cart id: {err}");
        }
        self.adopt(CartSnapshot::created(id.clone(), &self.currency));
        Ok(id)
    }

    /// Load the stored cart at startup. Runs its fetch at most once.
    ///
    /// Returns the resumed id, or `None` when nothing usable was stored.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be read, or the fetch fails for a reason
    /// other than the cart being gone. The call can then be retried.
    pub fn resume(&mut self) -> Result<Option<CartId>, SyncError> {
        if self.hydrated {
            return Ok(self.confirmed.id.clone());
        }

        let Some(id) = self.ids.load()? else {
            self.hydrated = true;
            self.publish();
            return Ok(None);
        };

        match self.backend.fetch_cart(&id) {
            Ok(snapshot) => {
                snapshot
                    .validate_authoritative()
                    .map_err(|violation| BackendError::Malformed(violation.to_string()))?;
                info!(cart = %id, lines = snapshot.lines.len(), "resumed stored cart");
                self.adopt(snapshot);
                Ok(Some(id))
            }
            Err(BackendError::CartNotFound(_)) => {
                info!(cart = %id, "stored cart is gone, starting fresh");
                self.forget_cart();
                self.hydrated = true;
                self.publish();
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Phase one: apply the request optimistically and prepare its call.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NoSuchLine`] when the request targets a line the cart
    ///   does not have; nothing is published.
    /// - [`SyncError::LineNotConfirmed`] when the line exists only
    ///   provisionally and cannot be addressed yet.
    /// - [`SyncError::Backend`] when no cart could be created; the
    ///   optimistic change is rolled back.
    pub fn submit(&mut self, request: MutationRequest) -> Result<Ticket, SyncError> {
        if let MutationRequest::Add { quantity: 0, .. } = request {
            return Err(SyncError::InvalidQuantity(0));
        }

        let before = self.provisional();
        let issued_at = self.clock.next();
        self.clock = issued_at;
        let mutation = request.issue(issued_at);

        let call = match self.prepare_call(&before, &mutation) {
            Ok(call) => call,
            Err(SyncError::NoSuchLine(target)) => {
                debug!(%issued_at, merchandise = %target, "mutation on absent line ignored");
                return Err(SyncError::NoSuchLine(target));
            }
            Err(err) => {
                warn!(%issued_at, "refusing mutation: {err}");
                self.notice = Some(CartNotice::new(err.code(), true));
                self.publish();
                return Err(err);
            }
        };

        self.notice = None;
        self.pending.insert(
            issued_at,
            InFlight {
                mutation,
                replayed: false,
            },
        );
        self.publish();

        let cart_id = match self.ensure_cart() {
            Ok(id) => id,
            Err(err) => {
                warn!(%issued_at, "no cart available, rolling back: {err}");
                self.pending.remove(&issued_at);
                self.notice = Some(CartNotice::new(err.code(), true));
                self.publish();
                return Err(err);
            }
        };

        debug!(%issued_at, cart = %cart_id, op = call.op_name(), "mutation submitted");
        Ok(Ticket {
            issued_at,
            cart_id,
            call,
        })
    }

    /// Execute a ticket's call against the owned backend.
    ///
    /// # Errors
    ///
    /// Whatever the backend reports; pass it on to [`Self::resolve`].
    pub fn dispatch(&mut self, ticket: &Ticket) -> Result<CartSnapshot, BackendError> {
        self.backend.execute(&ticket.cart_id, &ticket.call)
    }

    /// Phase two: reconcile a backend response and publish the result.
    pub fn resolve(
        &mut self,
        ticket: Ticket,
        outcome: Result<CartSnapshot, BackendError>,
    ) -> Resolution {
        let Ticket {
            issued_at, cart_id, ..
        } = ticket;
        let Some(in_flight) = self.pending.remove(&issued_at) else {
            debug!(%issued_at, "response for unknown ticket dropped");
            return Resolution::Orphaned;
        };

        let resolution = match outcome {
            Ok(snapshot) => self.accept(issued_at, &cart_id, in_flight, snapshot),
            Err(err) => self.fail(issued_at, &cart_id, in_flight, &err),
        };
        self.publish();
        resolution
    }

    /// Submit, execute and resolve in one go.
    ///
    /// # Errors
    ///
    /// Errors from [`Self::submit`]; backend failures are reported through
    /// the returned [`Resolution`] instead.
    pub fn mutate(&mut self, request: MutationRequest) -> Result<Resolution, SyncError> {
        let ticket = self.submit(request)?;
        let outcome = self.dispatch(&ticket);
        Ok(self.resolve(ticket, outcome))
    }

    /// Re-fetch the cart when nothing is in flight.
    ///
    /// Returns whether the authoritative snapshot was replaced.
    ///
    /// # Errors
    ///
    /// Transient or malformed fetch failures.
    pub fn refresh(&mut self) -> Result<bool, SyncError> {
        if !self.pending.is_empty() {
            debug!(pending = self.pending.len(), "refresh deferred while mutations are in flight");
            return Ok(false);
        }
        let Some(id) = self.confirmed.id.clone() else {
            return Ok(false);
        };

        match self.backend.fetch_cart(&id) {
            Ok(snapshot) => {
                snapshot
                    .validate_authoritative()
                    .map_err(|violation| BackendError::Malformed(violation.to_string()))?;
                self.confirmed = snapshot;
                self.needs_refresh = false;
                self.publish();
                Ok(true)
            }
            Err(BackendError::CartNotFound(_)) => {
                info!(cart = %id, "cart expired during refresh");
                self.forget_cart();
                self.publish();
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Publish a notice raised outside a mutation, e.g. a failed refresh.
    pub fn post_notice(&mut self, notice: CartNotice) {
        self.notice = Some(notice);
        self.publish();
    }

    /// Hosted checkout location for the current cart.
    ///
    /// # Errors
    ///
    /// [`SyncError::NoCart`] before any cart exists, or a backend failure.
    pub fn checkout_url(&mut self) -> Result<Url, SyncError> {
        let id = self.confirmed.id.clone().ok_or(SyncError::NoCart)?;
        if let Some(url) = &self.confirmed.checkout_url {
            return Ok(url.clone());
        }
        Ok(self.backend.checkout_url(&id)?)
    }

    /// Drop the cart: clear the stored id, pending work and the view.
    ///
    /// # Errors
    ///
    /// Fails when the stored id cannot be cleared.
    pub fn reset(&mut self) -> Result<(), SyncError> {
        self.pending.clear();
        self.confirmed = CartSnapshot::empty(&self.currency);
        self.watermarks.reset();
        self.needs_refresh = false;
        self.notice = None;
        self.ids.clear()?;
        self.publish();
        Ok(())
    }

    /// Confirmed snapshot plus every still-relevant pending mutation, in
    /// issue order.
    #[must_use]
    pub fn provisional(&self) -> CartSnapshot {
        reducer::apply_all(
            &self.confirmed,
            self.pending
                .values()
                .map(|in_flight| &in_flight.mutation)
                .filter(|mutation| !self.watermarks.is_stale(&mutation.target, mutation.issued_at)),
        )
    }

    fn prepare_call(
        &self,
        before: &CartSnapshot,
        mutation: &PendingMutation,
    ) -> Result<BackendCall, SyncError> {
        let target = &mutation.target;
        let merchandise_id = target.clone();
        let line_id = self.confirmed.line(target).and_then(|line| line.id.clone());
        let add_pending = self.pending.values().any(|in_flight| {
            in_flight.mutation.kind == MutationKind::Add
                && &in_flight.mutation.target == target
                && in_flight.mutation.issued_at < mutation.issued_at
        });

        if mutation.kind == MutationKind::Add {
            let quantity = u32::try_from(mutation.delta).unwrap_or(1).max(1);
            return Ok(BackendCall::AddLine {
                merchandise_id,
                quantity,
            });
        }
        if before.quantity_of(target) == 0 {
            return Err(SyncError::NoSuchLine(merchandise_id));
        }

        let quantity = reducer::apply(before, mutation).quantity_of(target);
        match (mutation.kind, line_id) {
            (MutationKind::IncrementQuantity, Some(line_id)) => Ok(BackendCall::UpdateLine {
                line_id,
                merchandise_id,
                quantity,
            }),
            (MutationKind::IncrementQuantity, None) if add_pending => Ok(BackendCall::AddLine {
                merchandise_id,
                quantity: 1,
            }),
            (MutationKind::DecrementQuantity, Some(line_id)) if quantity > 0 => {
                Ok(BackendCall::UpdateLine {
                    line_id,
                    merchandise_id,
                    quantity,
                })
            }
            (MutationKind::DecrementQuantity | MutationKind::Remove, Some(line_id)) => {
                Ok(BackendCall::RemoveLine {
                    line_id,
                    merchandise_id,
                })
            }
            (_, None) if add_pending => Err(SyncError::LineNotConfirmed(merchandise_id)),
            _ => Err(SyncError::NoSuchLine(merchandise_id)),
        }
    }

    fn accept(
        &mut self,
        issued_at: IssuedAt,
        cart_id: &CartId,
        in_flight: InFlight,
        snapshot: CartSnapshot,
    ) -> Resolution {
        if let Err(violation) = snapshot.validate_authoritative() {
            warn!(%issued_at, code = violation.code().code(), "discarding malformed cart response: {violation}");
            self.needs_refresh = true;
            return self.roll_back(CartNotice::new(violation.code(), false));
        }
        if snapshot.id != self.confirmed.id {
            debug!(%issued_at, cart = %cart_id, "response belongs to a replaced cart");
            return self.replay(issued_at, in_flight);
        }

        let target = in_flight.mutation.target;
        match self.watermarks.admit(&target, issued_at) {
            Admission::Stale => {
                debug!(
                    %issued_at,
                    merchandise = %target,
                    watermark = %self.watermarks.line(&target),
                    "stale response superseded"
                );
                Resolution::Superseded
            }
            Admission::Newest => {
                self.watermarks.record(&target, issued_at);
                let (next, diverged) = self.adopt_newest(snapshot, &target);
                if diverged {
                    debug!(%issued_at, merchandise = %target, "newest response disagrees on other lines");
                }
                self.confirmed = next;
                self.needs_refresh |= diverged;
                Resolution::Confirmed
            }
            Admission::Older => {
                self.watermarks.record(&target, issued_at);
                match merge_line(&self.confirmed, &snapshot, &target) {
                    Ok(merged) => self.confirmed = merged,
                    Err(err) => warn!(%issued_at, "could not merge line from response: {err}"),
                }
                self.needs_refresh = true;
                debug!(%issued_at, merchandise = %target, "merged line from out-of-order response");
                Resolution::Merged
            }
        }
    }

    fn fail(
        &mut self,
        issued_at: IssuedAt,
        cart_id: &CartId,
        in_flight: InFlight,
        err: &BackendError,
    ) -> Resolution {
        match err.class() {
            FailureClass::ExpiredCart => {
                if in_flight.replayed {
                    warn!(%issued_at, "replayed mutation failed again: {err}");
                    return self.roll_back(CartNotice::new(ErrorCode::TransientBackend, true));
                }
                if self.confirmed.id.as_ref() == Some(cart_id) {
                    info!(stale = %cart_id, "cart expired, minting a replacement");
                    self.forget_cart();
                }
                self.replay(issued_at, in_flight)
            }
            FailureClass::Malformed => {
                warn!(%issued_at, "malformed backend response, rolling back: {err}");
                self.needs_refresh = true;
                self.roll_back(CartNotice::from_backend(err))
            }
            FailureClass::Transient => {
                warn!(%issued_at, "backend call failed, rolling back: {err}");
                self.needs_refresh = true;
                self.roll_back(CartNotice::from_backend(err))
            }
            FailureClass::Rejected => {
                warn!(%issued_at, "backend rejected mutation, rolling back: {err}");
                self.roll_back(CartNotice::from_backend(err))
            }
        }
    }

    fn replay(&mut self, issued_at: IssuedAt, in_flight: InFlight) -> Resolution {
        if in_flight.replayed {
            return self.roll_back(CartNotice::new(ErrorCode::TransientBackend, true));
        }

        let cart_id = match self.ensure_cart() {
            Ok(id) => id,
            Err(err) => {
                warn!(%issued_at, "could not create replacement cart: {err}");
                return self.roll_back(CartNotice::new(err.code(), true));
            }
        };

        let before = self.provisional();
        let call = match self.prepare_call(&before, &in_flight.mutation) {
            Ok(call) => call,
            Err(err) => {
                warn!(%issued_at, "mutation cannot be replayed: {err}");
                return self.roll_back(CartNotice::new(err.code(), true));
            }
        };

        info!(%issued_at, cart = %cart_id, op = call.op_name(), "replaying mutation");
        self.pending.insert(
            issued_at,
            InFlight {
                mutation: in_flight.mutation,
                replayed: true,
            },
        );
        let ticket = Ticket {
            issued_at,
            cart_id: cart_id.clone(),
            call,
        };
        let outcome = self.dispatch(&ticket);
        match self.resolve(ticket, outcome) {
            Resolution::Confirmed | Resolution::Merged => Resolution::Replayed { cart_id },
            other => other,
        }
    }

    /// Take the newest response, keeping confirmed lines it disagrees on.
    ///
    /// Returns the snapshot and whether any line was kept.
    fn adopt_newest(&self, response: CartSnapshot, target: &MerchandiseId) -> (CartSnapshot, bool) {
        let mut next = response;
        let mut diverged = false;
        for tracked in self.watermarks.tracked() {
            if tracked == target || self.confirmed.line(tracked) == next.line(tracked) {
                continue;
            }
            diverged = true;
            match merge_line(&next, &self.confirmed, tracked) {
                Ok(merged) => next = merged,
                Err(err) => warn!(merchandise = %tracked, "could not keep confirmed line: {err}"),
            }
        }
        (next, diverged)
    }

    fn roll_back(&mut self, notice: CartNotice) -> Resolution {
        self.notice = Some(notice.clone());
        Resolution::RolledBack { notice }
    }

    fn adopt(&mut self, snapshot: CartSnapshot) {
        self.confirmed = snapshot;
        self.watermarks.reset();
        self.needs_refresh = false;
        self.hydrated = true;
        self.publish();
    }

    fn forget_cart(&mut self) {
        if let Err(err) = self.ids.clear() {
            warn!("could not clear stored cart id: {err}");
        }
        self.confirmed = CartSnapshot::empty(&self.currency);
        self.watermarks.reset();
        self.needs_refresh = false;
    }

    fn publish(&mut self) -> Publication {
        let view = CartView {
            confirmed: self.confirmed.clone(),
            provisional: self.provisional(),
            pending: self.pending.len(),
            notice: self.notice.clone(),
            needs_refresh: self.needs_refresh,
            hydrated: self.hydrated,
            version: 0,
        };
        let publication = self.publisher.publish(view);
        debug!(
            version = publication.version,
            quantity = publication.current_quantity,
            pending = self.pending.len(),
            "published cart view"
        );
        publication
    }
}

/// Take `target`'s line from `response` into `base`, keeping `base`'s tax.
fn merge_line(
    base: &CartSnapshot,
    response: &CartSnapshot,
    target: &MerchandiseId,
) -> Result<CartSnapshot, MoneyError> {
    let mut next = base.clone();
    let incoming = response.line(target).cloned();
    let position = next
        .lines
        .iter()
        .position(|line| &line.merchandise_id == target);

    match (position, incoming) {
        (Some(idx), Some(line)) => next.lines[idx] = line,
        (Some(idx), None) => {
            next.lines.remove(idx);
        }
        (None, Some(line)) => next.lines.push(line),
        (None, None) => {}
    }

    next.total_quantity = next
        .lines
        .iter()
        .fold(0_u32, |acc, line| acc.saturating_add(line.quantity));
    let subtotal = Money::sum(next.currency(), next.lines.iter().map(|line| &line.line_cost))?;
    let shipping = next.totals.shipping.take();
    next.totals = CartTotals {
        shipping,
        ..CartTotals::from_parts(subtotal, next.totals.tax.clone())?
    };
    if next.checkout_url.is_none() {
        next.checkout_url.clone_from(&response.checkout_url);
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{CatalogEntry, MemoryBackend};
    use crate::model::line::ProductDisplay;
    use crate::mutation::LineDraft;
    use crate::storage::MemoryCartIdStore;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").expect("code")
    }

    fn backend() -> MemoryBackend {
        let product = |title: &str| ProductDisplay {
            handle: title.to_lowercase(),
            title: title.to_string(),
            variant_title: "Default Title".to_string(),
            image: None,
            selected_options: Vec::new(),
        };
        MemoryBackend::new(usd(), 0)
            .with_product(
                "a",
                CatalogEntry {
                    unit_cost: Money::from_minor(500, usd()),
                    product: product("Apron"),
                },
            )
            .with_product(
                "b",
                CatalogEntry {
                    unit_cost: Money::from_minor(700, usd()),
                    product: product("Bowl"),
                },
            )
    }

    fn sync() -> CartSynchronizer<MemoryBackend, MemoryCartIdStore> {
        CartSynchronizer::new(backend(), MemoryCartIdStore::new(), usd())
    }

    fn add(merch: &str) -> MutationRequest {
        let backend = backend();
        let entry = &backend.catalog()[&MerchandiseId::new(merch)];
        MutationRequest::Add {
            merchandise_id: MerchandiseId::new(merch),
            quantity: 1,
            draft: Some(LineDraft {
                unit_cost: entry.unit_cost.clone(),
                product: entry.product.clone(),
            }),
        }
    }

    #[test]
    fn add_zero_is_refused() {
        let mut sync = sync();
        let err = sync
            .submit(MutationRequest::Add {
                merchandise_id: MerchandiseId::new("a"),
                quantity: 0,
                draft: None,
            })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuantity);
        assert_eq!(sync.backend().calls().create, 0);
    }

    #[test]
    fn increment_on_absent_line_is_a_quiet_noop() {
        let mut sync = sync();
        let version = sync.reader().version();
        let err = sync
            .submit(MutationRequest::Increment {
                merchandise_id: MerchandiseId::new("a"),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::NoSuchLine(_)));
        assert_eq!(sync.reader().version(), version);
    }

    #[test]
    fn increment_before_add_confirms_uses_relative_add() {
        let mut sync = sync();
        let first = sync.submit(add("a")).expect("submit add");
        let second = sync
            .submit(MutationRequest::Increment {
                merchandise_id: MerchandiseId::new("a"),
            })
            .expect("submit increment");
        assert!(matches!(second.call(), BackendCall::AddLine { quantity: 1, .. }));

        let first_outcome = sync.dispatch(&first);
        let second_outcome = sync.dispatch(&second);
        assert_eq!(sync.resolve(second, second_outcome), Resolution::Confirmed);
        assert_eq!(sync.resolve(first, first_outcome), Resolution::Superseded);
        assert_eq!(sync.view().provisional.quantity_of(&MerchandiseId::new("a")), 2);
    }

    #[test]
    fn decrement_before_add_confirms_is_refused_with_notice() {
        let mut sync = sync();
        let _ticket = sync.submit(add("a")).expect("submit add");
        let err = sync
            .submit(MutationRequest::Decrement {
                merchandise_id: MerchandiseId::new("a"),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::LineNotConfirmed(_)));
        assert_eq!(
            sync.view().notice.map(|notice| notice.code),
            Some(ErrorCode::LineNotFound)
        );
    }

    #[test]
    fn unknown_ticket_is_orphaned() {
        let mut sync = sync();
        let ticket = sync.submit(add("a")).expect("submit");
        let outcome = sync.dispatch(&ticket);
        sync.reset().expect("reset");
        assert_eq!(sync.resolve(ticket, outcome), Resolution::Orphaned);
        assert!(sync.view().provisional.is_empty());
    }

    #[test]
    fn older_response_merges_its_line_only() {
        let mut sync = sync();
        let a = sync.submit(add("a")).expect("a");
        let b = sync.submit(add("b")).expect("b");
        let a_out = sync.dispatch(&a);
        let b_out = sync.dispatch(&b);

        assert_eq!(sync.resolve(b, b_out), Resolution::Confirmed);
        assert_eq!(sync.resolve(a, a_out), Resolution::Merged);

        let view = sync.view();
        assert!(view.needs_refresh);
        assert_eq!(view.confirmed.total_quantity, 2);
        assert!(view.confirmed.validate_authoritative().is_ok());

        assert!(sync.refresh().expect("refresh"));
        assert!(!sync.view().needs_refresh);
    }

    #[test]
    fn checkout_url_requires_a_cart() {
        let mut sync = sync();
        assert!(matches!(sync.checkout_url(), Err(SyncError::NoCart)));
        sync.mutate(add("a")).expect("mutate");
        let url = sync.checkout_url().expect("url");
        assert!(url.as_str().ends_with("/checkouts/cart-1"));
    }
}
