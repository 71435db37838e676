//! Issuance-order admission of backend responses.
//!
//! Every cart line keeps a watermark: the highest issuance token whose
//! response has been applied to it. A response below its line's watermark is
//! stale and must never overwrite the newer state.
//!
//! # Admission
//!
//! Given a response for line `L` issued at `t`:
//!
//! 1. `t < watermark(L)`: **stale**. Discard.
//! 2. `t > global`: **newest**. The response becomes the authoritative
//!    snapshot, except for lines with their own watermark whose confirmed
//!    state disagrees with it. Requests on different lines may commit in any
//!    order, so such a line keeps its confirmed value and the cart is flagged
//!    for a refresh.
//! 3. Otherwise: **older**. Another line's response already landed, so only
//!    `L` is taken from the response.
//!
//! Tokens are unique (the synchronizer owns the only counter), so ties
//! between distinct mutations cannot happen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::line::MerchandiseId;
use crate::mutation::IssuedAt;

/// Outcome of [`LineWatermarks::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Stale,
    Newest,
    Older,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineWatermarks {
    lines: BTreeMap<MerchandiseId, IssuedAt>,
    global: IssuedAt,
}

impl LineWatermarks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest applied token for a line, [`IssuedAt::ZERO`] if none.
    #[must_use]
    pub fn line(&self, target: &MerchandiseId) -> IssuedAt {
        self.lines.get(target).copied().unwrap_or(IssuedAt::ZERO)
    }

    /// Highest applied token across all lines.
    #[must_use]
    pub const fn global(&self) -> IssuedAt {
        self.global
    }

    /// Lines that have had a response applied.
    pub fn tracked(&self) -> impl Iterator<Item = &MerchandiseId> {
        self.lines.keys()
    }

    /// Whether a mutation for `target` issued at `issued_at` is already
    /// covered by a newer applied response.
    #[must_use]
    pub fn is_stale(&self, target: &MerchandiseId, issued_at: IssuedAt) -> bool {
        issued_at < self.line(target)
    }

    #[must_use]
    pub fn admit(&self, target: &MerchandiseId, issued_at: IssuedAt) -> Admission {
        if self.is_stale(target, issued_at) {
            Admission::Stale
        } else if issued_at > self.global {
            Admission::Newest
        } else {
            Admission::Older
        }
    }

    /// Record an applied response. Watermarks only move forward.
    pub fn record(&mut self, target: &MerchandiseId, issued_at: IssuedAt) {
        let entry = self.lines.entry(target.clone()).or_insert(IssuedAt::ZERO);
        *entry = (*entry).max(issued_at);
        self.global = self.global.max(issued_at);
    }

    /// Forget everything; used when the cart itself is replaced.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.global = IssuedAt::ZERO;
    }
}
