//! In-process commerce backend.
//!
//! Keeps carts in memory, prices lines from a fixed catalog and applies a
//! flat tax rate. Faults can be queued to exercise the synchronizer's
//! failure paths: transport errors, expired carts and malformed responses.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::backend::{BackendError, CartBackend};
use crate::model::line::{CartId, LineId, LineItem, MerchandiseId, ProductDisplay};
use crate::model::money::{CurrencyCode, Money};
use crate::model::snapshot::{CartSnapshot, CartTotals};

/// One sellable variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub unit_cost: Money,
    pub product: ProductDisplay,
}

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCounts {
    pub create: usize,
    pub fetch: usize,
    pub add: usize,
    pub update: usize,
    pub remove: usize,
    pub checkout: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct StoredCart {
    lines: Vec<(LineId, MerchandiseId, u32)>,
}

/// Deterministic in-memory implementation of [`CartBackend`].
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    currency: CurrencyCode,
    tax_rate_bps: i64,
    checkout_base: String,
    catalog: BTreeMap<MerchandiseId, CatalogEntry>,
    carts: BTreeMap<CartId, StoredCart>,
    next_cart: u64,
    next_line: u64,
    queued_faults: VecDeque<BackendError>,
    create_faults: VecDeque<BackendError>,
    corrupt_next: bool,
    calls: CallCounts,
}

impl MemoryBackend {
    /// Create a backend pricing in `currency` with a tax rate in basis points.
    #[must_use]
    pub fn new(currency: CurrencyCode, tax_rate_bps: u32) -> Self {
        Self {
            currency,
            tax_rate_bps: i64::from(tax_rate_bps),
            checkout_base: "https://shop.example.com".to_string(),
            catalog: BTreeMap::new(),
            carts: BTreeMap::new(),
            next_cart: 1,
            next_line: 1,
            queued_faults: VecDeque::new(),
            create_faults: VecDeque::new(),
            corrupt_next: false,
            calls: CallCounts::default(),
        }
    }

    /// Register a sellable variant.
    #[must_use]
    pub fn with_product(mut self, merchandise_id: impl Into<MerchandiseId>, entry: CatalogEntry) -> Self {
        self.catalog.insert(merchandise_id.into(), entry);
        self
    }

    /// Origin the hosted checkout lives under, e.g. `https://shop.example.com`.
    #[must_use]
    pub fn with_checkout_base(mut self, base: impl Into<String>) -> Self {
        self.checkout_base = base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub const fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    #[must_use]
    pub fn catalog(&self) -> &BTreeMap<MerchandiseId, CatalogEntry> {
        &self.catalog
    }

    #[must_use]
    pub const fn calls(&self) -> CallCounts {
        self.calls
    }

    /// Fail the next fetch or line operation with `err`. Faults queue up.
    pub fn fail_next(&mut self, err: BackendError) {
        self.queued_faults.push_back(err);
    }

    /// Fail the next `create_cart` with `err`.
    pub fn fail_next_create(&mut self, err: BackendError) {
        self.create_faults.push_back(err);
    }

    /// Answer the next line operation with a snapshot whose grand total is wrong.
    pub fn corrupt_next_response(&mut self) {
        self.corrupt_next = true;
    }

    /// Forget a cart so that later calls report it as not found.
    pub fn expire(&mut self, cart_id: &CartId) -> bool {
        self.carts.remove(cart_id).is_some()
    }

    #[must_use]
    pub fn cart_exists(&self, cart_id: &CartId) -> bool {
        self.carts.contains_key(cart_id)
    }

    /// Authoritative view without counting a call or consuming faults.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::CartNotFound`] for unknown ids.
    pub fn peek(&self, cart_id: &CartId) -> Result<CartSnapshot, BackendError> {
        let cart = self
            .carts
            .get(cart_id)
            .ok_or_else(|| BackendError::CartNotFound(cart_id.clone()))?;
        self.render(cart_id, cart)
    }

    fn checkout_location(&self, cart_id: &CartId) -> Result<Url, BackendError> {
        Url::parse(&format!("{}/checkouts/{cart_id}", self.checkout_base))
            .map_err(|err| BackendError::Malformed(err.to_string()))
    }

    fn take_fault(&mut self) -> Result<(), BackendError> {
        self.queued_faults.pop_front().map_or(Ok(()), Err)
    }

    fn cart_mut(&mut self, cart_id: &CartId) -> Result<&mut StoredCart, BackendError> {
        self.carts
            .get_mut(cart_id)
            .ok_or_else(|| BackendError::CartNotFound(cart_id.clone()))
    }

    fn respond(&mut self, cart_id: &CartId) -> Result<CartSnapshot, BackendError> {
        let mut snapshot = self.peek(cart_id)?;
        if std::mem::take(&mut self.corrupt_next) {
            snapshot.totals.total = Money::from_minor(
                snapshot.totals.total.minor().saturating_add(1),
                self.currency.clone(),
            );
        }
        Ok(snapshot)
    }

    fn render(&self, cart_id: &CartId, cart: &StoredCart) -> Result<CartSnapshot, BackendError> {
        let malformed = |err: crate::model::money::MoneyError| BackendError::Malformed(err.to_string());

        let mut lines = Vec::with_capacity(cart.lines.len());
        for (line_id, merchandise_id, quantity) in &cart.lines {
            let entry = self
                .catalog
                .get(merchandise_id)
                .ok_or_else(|| BackendError::MerchandiseUnknown(merchandise_id.clone()))?;
            lines.push(
                LineItem::priced(
                    Some(line_id.clone()),
                    merchandise_id.clone(),
                    *quantity,
                    entry.unit_cost.clone(),
                    entry.product.clone(),
                )
                .map_err(malformed)?,
            );
        }

        let subtotal = Money::sum(&self.currency, lines.iter().map(|line| &line.line_cost))
            .map_err(malformed)?;
        let tax = subtotal.scaled(self.tax_rate_bps, 10_000);
        let totals = CartTotals::from_parts(subtotal, tax).map_err(malformed)?;
        let total_quantity = lines.iter().map(|line| line.quantity).sum();
        let checkout_url = self.checkout_location(cart_id)?;

        Ok(CartSnapshot {
            id: Some(cart_id.clone()),
            lines,
            totals,
            total_quantity,
            checkout_url: Some(checkout_url),
        })
    }
}

impl CartBackend for MemoryBackend {
    fn create_cart(&mut self) -> Result<CartId, BackendError> {
        self.calls.create += 1;
        if let Some(err) = self.create_faults.pop_front() {
            return Err(err);
        }
        let id = CartId::new(format!("cart-{}", self.next_cart));
        self.next_cart += 1;
        self.carts.insert(id.clone(), StoredCart::default());
        debug!(cart = %id, "memory backend created cart");
        Ok(id)
    }

    fn fetch_cart(&mut self, cart_id: &CartId) -> Result<CartSnapshot, BackendError> {
        self.calls.fetch += 1;
        self.take_fault()?;
        self.peek(cart_id)
    }

    fn add_line(
        &mut self,
        cart_id: &CartId,
        merchandise_id: &MerchandiseId,
        quantity: u32,
    ) -> Result<CartSnapshot, BackendError> {
        self.calls.add += 1;
        self.take_fault()?;
        if quantity == 0 {
            return Err(BackendError::InvalidQuantity(quantity));
        }
        if !self.catalog.contains_key(merchandise_id) {
            return Err(BackendError::MerchandiseUnknown(merchandise_id.clone()));
        }

        let fresh_line = LineId::new(format!("line-{}", self.next_line));
        let cart = self
            .carts
            .get_mut(cart_id)
            .ok_or_else(|| BackendError::CartNotFound(cart_id.clone()))?;
        if let Some(existing) = cart.lines.iter_mut().find(|(_, merch, _)| merch == merchandise_id) {
            existing.2 = existing.2.saturating_add(quantity);
        } else {
            cart.lines.push((fresh_line, merchandise_id.clone(), quantity));
            self.next_line += 1;
        }
        self.respond(cart_id)
    }

    fn update_line_quantity(
        &mut self,
        cart_id: &CartId,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<CartSnapshot, BackendError> {
        self.calls.update += 1;
        self.take_fault()?;
        let cart = self.cart_mut(cart_id)?;
        let idx = cart
            .lines
            .iter()
            .position(|(id, _, _)| id == line_id)
            .ok_or_else(|| BackendError::LineNotFound(line_id.clone()))?;
        if quantity == 0 {
            cart.lines.remove(idx);
        } else {
            cart.lines[idx].2 = quantity;
        }
        self.respond(cart_id)
    }

    fn remove_line(&mut self, cart_id: &CartId, line_id: &LineId) -> Result<CartSnapshot, BackendError> {
        self.calls.remove += 1;
        self.take_fault()?;
        let cart = self.cart_mut(cart_id)?;
        let before = cart.lines.len();
        cart.lines.retain(|(id, _, _)| id != line_id);
        if cart.lines.len() == before {
            return Err(BackendError::LineNotFound(line_id.clone()));
        }
        self.respond(cart_id)
    }

    fn checkout_url(&mut self, cart_id: &CartId) -> Result<Url, BackendError> {
        self.calls.checkout += 1;
        if !self.carts.contains_key(cart_id) {
            return Err(BackendError::CartNotFound(cart_id.clone()));
        }
        self.checkout_location(cart_id)
    }
}
