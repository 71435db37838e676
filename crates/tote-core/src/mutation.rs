//! Pending optimistic mutations and the logical clock that orders them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::line::{LineItem, MerchandiseId, ProductDisplay};
use crate::model::money::{Money, MoneyError};

/// Logical issuance token. Strictly increasing per synchronizer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IssuedAt(pub u64);

impl IssuedAt {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for IssuedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Add,
    IncrementQuantity,
    DecrementQuantity,
    Remove,
}

/// Best-effort display data for a line the cart does not contain yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDraft {
    pub unit_cost: Money,
    pub product: ProductDisplay,
}

impl LineDraft {
    /// Materialize a provisional line (no backend line id yet).
    ///
    /// # Errors
    ///
    /// Fails if the line cost overflows.
    pub fn to_line(&self, merchandise_id: MerchandiseId, quantity: u32) -> Result<LineItem, MoneyError> {
        LineItem::priced(
            None,
            merchandise_id,
            quantity,
            self.unit_cost.clone(),
            self.product.clone(),
        )
    }
}

/// A shopper action before it has been assigned an issuance token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MutationRequest {
    Add {
        merchandise_id: MerchandiseId,
        quantity: u32,
        draft: Option<LineDraft>,
    },
    Increment {
        merchandise_id: MerchandiseId,
    },
    Decrement {
        merchandise_id: MerchandiseId,
    },
    Remove {
        merchandise_id: MerchandiseId,
    },
}

impl MutationRequest {
    #[must_use]
    pub const fn merchandise_id(&self) -> &MerchandiseId {
        match self {
            Self::Add { merchandise_id, .. }
            | Self::Increment { merchandise_id }
            | Self::Decrement { merchandise_id }
            | Self::Remove { merchandise_id } => merchandise_id,
        }
    }

    /// Stamp the request with its issuance token.
    #[must_use]
    pub fn issue(self, issued_at: IssuedAt) -> PendingMutation {
        match self {
            Self::Add {
                merchandise_id,
                quantity,
                draft,
            } => PendingMutation {
                kind: MutationKind::Add,
                target: merchandise_id,
                delta: i32::try_from(quantity).unwrap_or(i32::MAX),
                issued_at,
                draft,
            },
            Self::Increment { merchandise_id } => {
                PendingMutation::adjust(MutationKind::IncrementQuantity, merchandise_id, 1, issued_at)
            }
            Self::Decrement { merchandise_id } => {
                PendingMutation::adjust(MutationKind::DecrementQuantity, merchandise_id, -1, issued_at)
            }
            Self::Remove { merchandise_id } => {
                PendingMutation::adjust(MutationKind::Remove, merchandise_id, 0, issued_at)
            }
        }
    }
}

/// An in-flight optimistic operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub kind: MutationKind,
    pub target: MerchandiseId,
    /// Signed quantity change. `0` for [`MutationKind::Remove`].
    pub delta: i32,
    pub issued_at: IssuedAt,
    #[serde(default)]
    pub draft: Option<LineDraft>,
}

impl PendingMutation {
    fn adjust(kind: MutationKind, target: MerchandiseId, delta: i32, issued_at: IssuedAt) -> Self {
        Self {
            kind,
            target,
            delta,
            issued_at,
            draft: None,
        }
    }

    /// Whether applying this mutation can raise the cart's total quantity.
    #[must_use]
    pub const fn is_increase(&self) -> bool {
        matches!(self.kind, MutationKind::Add | MutationKind::IncrementQuantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuance_tokens_order_numerically() {
        let a = IssuedAt(5);
        assert!(a.next() > a);
        assert_eq!(IssuedAt(u64::MAX).next(), IssuedAt(u64::MAX));
        assert_eq!(a.to_string(), "#5");
    }

    #[test]
    fn issue_maps_requests_to_signed_deltas() {
        let merch = MerchandiseId::new("m1");
        let add = MutationRequest::Add {
            merchandise_id: merch.clone(),
            quantity: 3,
            draft: None,
        }
        .issue(IssuedAt(1));
        assert_eq!((add.kind, add.delta), (MutationKind::Add, 3));
        assert!(add.is_increase());

        let dec = MutationRequest::Decrement {
            merchandise_id: merch.clone(),
        }
        .issue(IssuedAt(2));
        assert_eq!((dec.kind, dec.delta), (MutationKind::DecrementQuantity, -1));
        assert!(!dec.is_increase());

        let remove = MutationRequest::Remove { merchandise_id: merch }.issue(IssuedAt(3));
        assert_eq!(remove.delta, 0);
        assert_eq!(remove.issued_at, IssuedAt(3));
    }

    #[test]
    fn requests_serialize_with_action_tag() {
        let req = MutationRequest::Increment {
            merchandise_id: MerchandiseId::new("m9"),
        };
        let json = serde_json::to_string(&req).expect("serialize");
        assert_eq!(json, r#"{"action":"increment","merchandise_id":"m9"}"#);
    }
}
