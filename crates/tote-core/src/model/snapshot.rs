//! Cart snapshots: the authoritative-or-provisional view of one cart.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ErrorCode;
use crate::model::line::{CartId, LineItem, MerchandiseId, ProductDisplay};
use crate::model::money::{CurrencyCode, Money, MoneyError};

/// Aggregate monetary figures of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: Money,
    pub tax: Money,
    /// Placeholder: shipping is calculated at checkout, so usually `None`.
    #[serde(default)]
    pub shipping: Option<Money>,
    pub total: Money,
}

impl CartTotals {
    #[must_use]
    pub fn zero(currency: &CurrencyCode) -> Self {
        Self {
            subtotal: Money::zero(currency.clone()),
            tax: Money::zero(currency.clone()),
            shipping: None,
            total: Money::zero(currency.clone()),
        }
    }

    /// Build totals with `total = subtotal + tax`.
    ///
    /// # Errors
    ///
    /// Fails on currency mismatch or overflow.
    pub fn from_parts(subtotal: Money, tax: Money) -> Result<Self, MoneyError> {
        let total = subtotal.checked_add(&tax)?;
        Ok(Self {
            subtotal,
            tax,
            shipping: None,
            total,
        })
    }

    #[must_use]
    pub const fn currency(&self) -> &CurrencyCode {
        self.total.currency()
    }

    /// Label for the shipping row.
    #[must_use]
    pub fn shipping_label(&self) -> String {
        self.shipping
            .as_ref()
            .map_or_else(|| "Calculated at checkout".to_string(), Money::format_price)
    }
}

/// Reasons a backend snapshot cannot be accepted as authoritative.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotViolation {
    #[error("authoritative snapshot has no cart id")]
    MissingId,

    #[error("line {merchandise_id} has quantity 0")]
    ZeroQuantity { merchandise_id: MerchandiseId },

    #[error("line {merchandise_id} appears more than once")]
    DuplicateLine { merchandise_id: MerchandiseId },

    #[error("line {merchandise_id} has no backend line id")]
    MissingLineId { merchandise_id: MerchandiseId },

    #[error("line {merchandise_id} cost does not equal unit cost times quantity")]
    LineCost { merchandise_id: MerchandiseId },

    #[error("total quantity {reported} does not match line sum {actual}")]
    TotalQuantity { reported: u32, actual: u32 },

    #[error("grand total does not equal subtotal plus tax")]
    GrandTotal,

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl SnapshotViolation {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Money(err) => err.code(),
            _ => ErrorCode::MalformedResponse,
        }
    }
}

/// Current known state of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Absent until the first backend round-trip completes.
    #[serde(default)]
    pub id: Option<CartId>,
    pub lines: Vec<LineItem>,
    pub totals: CartTotals,
    pub total_quantity: u32,
    #[serde(default)]
    pub checkout_url: Option<Url>,
}

impl CartSnapshot {
    /// Session-start cart: no id, no lines, zero totals.
    #[must_use]
    pub fn empty(currency: &CurrencyCode) -> Self {
        Self {
            id: None,
            lines: Vec::new(),
            totals: CartTotals::zero(currency),
            total_quantity: 0,
            checkout_url: None,
        }
    }

    /// Freshly created backend cart with no lines.
    #[must_use]
    pub fn created(id: CartId, currency: &CurrencyCode) -> Self {
        Self {
            id: Some(id),
            ..Self::empty(currency)
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn currency(&self) -> &CurrencyCode {
        self.totals.currency()
    }

    #[must_use]
    pub fn line(&self, merchandise_id: &MerchandiseId) -> Option<&LineItem> {
        self.lines
            .iter()
            .find(|line| &line.merchandise_id == merchandise_id)
    }

    #[must_use]
    pub fn quantity_of(&self, merchandise_id: &MerchandiseId) -> u32 {
        self.line(merchandise_id).map_or(0, |line| line.quantity)
    }

    /// Lines in display order: stable sort by product title.
    #[must_use]
    pub fn display_lines(&self) -> Vec<&LineItem> {
        let mut lines: Vec<&LineItem> = self.lines.iter().collect();
        lines.sort_by(|a, b| a.product.title.cmp(&b.product.title));
        lines
    }

    /// Display records handed to image and gallery renderers.
    #[must_use]
    pub fn product_displays(&self) -> Vec<&ProductDisplay> {
        self.display_lines()
            .into_iter()
            .map(|line| &line.product)
            .collect()
    }

    /// Navbar badge text, e.g. `BAG [3]`.
    #[must_use]
    pub fn badge_label(&self) -> String {
        format!("BAG [{}]", self.total_quantity)
    }

    /// Recompute `total_quantity` and best-effort totals from the lines.
    ///
    /// The previous effective tax rate is applied to the new subtotal. This
    /// is a display estimate only; confirmed backend totals replace it.
    ///
    /// # Errors
    ///
    /// Fails on currency mismatch or overflow.
    pub fn reestimate(mut self) -> Result<Self, MoneyError> {
        let currency = self.currency().clone();
        self.total_quantity = self
            .lines
            .iter()
            .fold(0_u32, |acc, line| acc.saturating_add(line.quantity));
        let subtotal = Money::sum(&currency, self.lines.iter().map(|line| &line.line_cost))?;
        let tax = self
            .totals
            .tax
            .scaled(subtotal.minor(), self.totals.subtotal.minor());
        let shipping = self.totals.shipping.take();
        self.totals = CartTotals {
            shipping,
            ..CartTotals::from_parts(subtotal, tax)?
        };
        Ok(self)
    }

    /// Check the invariants every backend-confirmed snapshot must satisfy.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate_authoritative(&self) -> Result<(), SnapshotViolation> {
        if self.id.is_none() {
            return Err(SnapshotViolation::MissingId);
        }

        let currency = self.currency();
        let mut seen = std::collections::HashSet::new();
        let mut quantity = 0_u32;
        for line in &self.lines {
            let merchandise_id = line.merchandise_id.clone();
            if line.quantity == 0 {
                return Err(SnapshotViolation::ZeroQuantity { merchandise_id });
            }
            if line.id.is_none() {
                return Err(SnapshotViolation::MissingLineId { merchandise_id });
            }
            if !seen.insert(&line.merchandise_id) {
                return Err(SnapshotViolation::DuplicateLine { merchandise_id });
            }
            if line.line_cost.currency() != currency || line.unit_cost.currency() != currency {
                return Err(SnapshotViolation::Money(MoneyError::CurrencyMismatch {
                    left: currency.clone(),
                    right: line.line_cost.currency().clone(),
                }));
            }
            if !line.cost_is_consistent() {
                return Err(SnapshotViolation::LineCost { merchandise_id });
            }
            quantity = quantity.saturating_add(line.quantity);
        }

        if quantity != self.total_quantity {
            return Err(SnapshotViolation::TotalQuantity {
                reported: self.total_quantity,
                actual: quantity,
            });
        }

        let expected = self.totals.subtotal.checked_add(&self.totals.tax)?;
        if expected != self.totals.total {
            return Err(SnapshotViolation::GrandTotal);
        }

        Ok(())
    }
}
