//! Invariant checks over a finished simulation run.
//!
//! # Invariants checked
//!
//! 1. **Single cart** (`check_cart_creation`): one backend cart per cart
//!    lifetime; only an expiry may mint another.
//! 2. **Convergence** (`check_convergence`): once every response has been
//!    delivered and the cart refreshed, the client matches the backend.
//! 3. **Stale responses** (`check_stale_responses`): a superseded response
//!    never changes the confirmed snapshot.
//! 4. **Quantity floor** (`check_views`): no published line holds quantity
//!    0 and `total_quantity` is the sum of the lines.
//! 5. **Auto-open** (`check_visibility`): the panel opens when the quantity
//!    rises while closed, and cart traffic never closes it.
//! 6. **Layout** (`check_layout`): geometry matches the visibility state and
//!    viewport class.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tote_core::layout::{LayoutConfig, PanelMode, derive_layout};
use tote_core::{CartSnapshot, CartView, IssuedAt, MerchandiseId, VisibilityState};

use crate::{DeliveryRecord, Observation, ResolutionKind, SimulationResult, Trigger};

/// Oracle result for one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Accumulate another result.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// Diagnostic for a single failed invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    ExtraCart {
        creates: usize,
        expiries: usize,
    },
    Divergence {
        client: Box<CartSnapshot>,
        backend: Option<Box<CartSnapshot>>,
    },
    Unsettled {
        pending: usize,
    },
    StaleApplied {
        round: u64,
        issued_at: IssuedAt,
    },
    ZeroQuantity {
        round: u64,
        merchandise_id: MerchandiseId,
    },
    DuplicateLine {
        round: u64,
        merchandise_id: MerchandiseId,
    },
    QuantityMismatch {
        round: u64,
        declared: u32,
        summed: u32,
    },
    MissedAutoOpen {
        round: u64,
        from: u32,
        to: u32,
    },
    SpuriousTransition {
        round: u64,
        trigger: Trigger,
        before: VisibilityState,
        after: VisibilityState,
    },
    Layout {
        round: u64,
        reason: String,
    },
    CheckoutNotOneShot {
        round: u64,
    },
}

impl InvariantViolation {
    /// One-line human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::ExtraCart { creates, expiries } => {
                format!("ExtraCart: {creates} carts created with only {expiries} expiries")
            }
            Self::Divergence { client, backend } => format!(
                "Divergence: client has {} items, backend {}",
                client.total_quantity,
                backend
                    .as_ref()
                    .map_or_else(|| "has no cart".to_string(), |snap| format!("has {} items", snap.total_quantity))
            ),
            Self::Unsettled { pending } => format!("Unsettled: {pending} mutations still pending after drain"),
            Self::StaleApplied { round, issued_at } => {
                format!("StaleApplied: superseded response {issued_at} changed the cart in round {round}")
            }
            Self::ZeroQuantity {
                round,
                merchandise_id,
            } => format!("ZeroQuantity: line {merchandise_id} published at quantity 0 in round {round}"),
            Self::DuplicateLine {
                round,
                merchandise_id,
            } => format!("DuplicateLine: {merchandise_id} appears twice in round {round}"),
            Self::QuantityMismatch {
                round,
                declared,
                summed,
            } => format!("QuantityMismatch: total {declared} but lines sum to {summed} in round {round}"),
            Self::MissedAutoOpen { round, from, to } => {
                format!("MissedAutoOpen: quantity rose {from} -> {to} in round {round} but the panel stayed closed")
            }
            Self::SpuriousTransition {
                round,
                trigger,
                before,
                after,
            } => format!("SpuriousTransition: {trigger:?} moved the panel {before:?} -> {after:?} in round {round}"),
            Self::Layout { round, reason } => format!("Layout: {reason} in round {round}"),
            Self::CheckoutNotOneShot { round } => {
                format!("CheckoutNotOneShot: a second checkout was allowed in round {round}")
            }
        }
    }
}

pub struct CartOracle;

impl CartOracle {
    /// Every creation beyond the first must be explained by an expiry.
    #[must_use]
    pub fn check_cart_creation(creates: usize, expiries: usize) -> OracleResult {
        if creates <= expiries.saturating_add(1) {
            OracleResult::pass()
        } else {
            OracleResult::from_violations(vec![InvariantViolation::ExtraCart { creates, expiries }])
        }
    }

    /// After the final drain and refresh, the client mirrors the backend.
    #[must_use]
    pub fn check_convergence(settled: &CartView, backend: Option<&CartSnapshot>) -> OracleResult {
        let mut violations = Vec::new();
        if settled.pending > 0 {
            violations.push(InvariantViolation::Unsettled {
                pending: settled.pending,
            });
        }

        let agrees = match backend {
            Some(authoritative) => {
                settled.confirmed == *authoritative && settled.provisional == *authoritative
            }
            None => settled.confirmed.id.is_none() && settled.provisional.is_empty(),
        };
        if !agrees {
            violations.push(InvariantViolation::Divergence {
                client: Box::new(settled.provisional.clone()),
                backend: backend.cloned().map(Box::new),
            });
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_stale_responses(deliveries: &[DeliveryRecord]) -> OracleResult {
        let violations = deliveries
            .iter()
            .filter(|record| {
                matches!(record.resolution, ResolutionKind::Superseded | ResolutionKind::Orphaned)
                    && record.confirmed_changed
                    && !record.refreshed
            })
            .map(|record| InvariantViolation::StaleApplied {
                round: record.round,
                issued_at: record.issued_at,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Quantity floor and bookkeeping on every sampled view.
    #[must_use]
    pub fn check_views<'a>(samples: impl IntoIterator<Item = (u64, &'a CartView)>) -> OracleResult {
        let mut violations = Vec::new();
        for (round, view) in samples {
            for snapshot in [&view.confirmed, &view.provisional] {
                check_snapshot(round, snapshot, &mut violations);
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_visibility(observations: &[Observation]) -> OracleResult {
        let mut violations = Vec::new();
        for obs in observations {
            let rose = obs.after_quantity > obs.before_quantity;
            let cart_traffic = matches!(obs.trigger, Trigger::Submit | Trigger::Resolve | Trigger::Refresh);
            let expected = match obs.trigger {
                Trigger::OpenCart => VisibilityState::Open,
                Trigger::CloseCart | Trigger::OutsideClick | Trigger::Navigate => VisibilityState::Closed,
                Trigger::Submit | Trigger::Resolve | Trigger::Refresh if rose => VisibilityState::Open,
                _ => obs.before_state,
            };
            if expected == obs.after_state {
                continue;
            }

            if cart_traffic && rose {
                violations.push(InvariantViolation::MissedAutoOpen {
                    round: obs.round,
                    from: obs.before_quantity,
                    to: obs.after_quantity,
                });
            } else {
                violations.push(InvariantViolation::SpuriousTransition {
                    round: obs.round,
                    trigger: obs.trigger,
                    before: obs.before_state,
                    after: obs.after_state,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_layout(observations: &[Observation], config: &LayoutConfig) -> OracleResult {
        let mut violations = Vec::new();
        for obs in observations {
            let geo = &obs.layout;
            let mut fail = |reason: String| {
                violations.push(InvariantViolation::Layout {
                    round: obs.round,
                    reason,
                });
            };

            if *geo != derive_layout(obs.after_state, obs.viewport, config) {
                fail("recorded geometry is not the derived geometry".to_string());
            }
            match (obs.after_state, geo.panel.mode) {
                (VisibilityState::Closed, PanelMode::Hidden) => {
                    if geo.content.width_px != obs.viewport.width {
                        fail(format!("closed content is {}px wide", geo.content.width_px));
                    }
                }
                (VisibilityState::Open, PanelMode::Split) => {
                    if geo.content.width_px + geo.panel.width_px != obs.viewport.width {
                        fail(format!(
                            "split {} + {} does not fill {}",
                            geo.content.width_px, geo.panel.width_px, obs.viewport.width
                        ));
                    }
                    if geo.navbar.search_visible || geo.navbar.trigger_visible {
                        fail("navbar controls visible beside the open panel".to_string());
                    }
                }
                (VisibilityState::Open, PanelMode::Overlay) => {
                    if !geo.page_scroll_locked || !geo.panel.backdrop {
                        fail("mobile overlay without scroll lock and backdrop".to_string());
                    }
                }
                (state, mode) => fail(format!("panel {mode:?} while {state:?}")),
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Run every check against a finished run.
    #[must_use]
    pub fn check_all(result: &SimulationResult, layout: &LayoutConfig) -> OracleResult {
        let checkout = OracleResult::from_violations(
            result
                .checkout_reentries
                .iter()
                .map(|round| InvariantViolation::CheckoutNotOneShot { round: *round })
                .collect(),
        );

        Self::check_cart_creation(result.calls.create, result.expiries)
            .merge(Self::check_convergence(&result.settled, result.authoritative.as_ref()))
            .merge(Self::check_stale_responses(&result.deliveries))
            .merge(Self::check_views(result.samples.iter().map(|(round, view)| (*round, view))))
            .merge(Self::check_visibility(&result.observations))
            .merge(Self::check_layout(&result.observations, layout))
            .merge(checkout)
    }
}

fn check_snapshot(round: u64, snapshot: &CartSnapshot, violations: &mut Vec<InvariantViolation>) {
    let mut seen = HashSet::new();
    let mut summed = 0_u32;
    for line in &snapshot.lines {
        if line.quantity == 0 {
            violations.push(InvariantViolation::ZeroQuantity {
                round,
                merchandise_id: line.merchandise_id.clone(),
            });
        }
        if !seen.insert(&line.merchandise_id) {
            violations.push(InvariantViolation::DuplicateLine {
                round,
                merchandise_id: line.merchandise_id.clone(),
            });
        }
        summed = summed.saturating_add(line.quantity);
    }
    if summed != snapshot.total_quantity {
        violations.push(InvariantViolation::QuantityMismatch {
            round,
            declared: snapshot.total_quantity,
            summed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tote_core::layout::Viewport;
    use tote_core::{CartId, CurrencyCode};

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").expect("code")
    }

    fn observation(
        trigger: Trigger,
        before: (VisibilityState, u32),
        after: (VisibilityState, u32),
    ) -> Observation {
        let viewport = Viewport::new(1280, 800);
        Observation {
            round: 1,
            trigger,
            before_state: before.0,
            after_state: after.0,
            before_quantity: before.1,
            after_quantity: after.1,
            viewport,
            layout: derive_layout(after.0, viewport, &LayoutConfig::default()),
        }
    }

    #[test]
    fn creation_allows_one_cart_per_expiry() {
        assert!(CartOracle::check_cart_creation(1, 0).passed);
        assert!(CartOracle::check_cart_creation(3, 2).passed);
        let result = CartOracle::check_cart_creation(2, 0);
        assert!(!result.passed);
        assert!(result.violations[0].describe().starts_with("ExtraCart"));
    }

    #[test]
    fn closed_panel_must_open_on_increase() {
        let missed = observation(
            Trigger::Resolve,
            (VisibilityState::Closed, 1),
            (VisibilityState::Closed, 2),
        );
        let result = CartOracle::check_visibility(&[missed]);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::MissedAutoOpen { from: 1, to: 2, .. }]
        ));

        let fine = observation(
            Trigger::Submit,
            (VisibilityState::Closed, 1),
            (VisibilityState::Open, 2),
        );
        assert!(CartOracle::check_visibility(&[fine]).passed);
    }

    #[test]
    fn cart_traffic_never_closes_or_opens_without_increase() {
        let closed_by_sync = observation(
            Trigger::Resolve,
            (VisibilityState::Open, 3),
            (VisibilityState::Closed, 2),
        );
        let opened_on_decrease = observation(
            Trigger::Submit,
            (VisibilityState::Closed, 3),
            (VisibilityState::Open, 2),
        );
        let result = CartOracle::check_visibility(&[closed_by_sync, opened_on_decrease]);
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn zero_lines_and_bad_totals_are_reported() {
        let mut view_snapshot = CartSnapshot::created(CartId::new("c"), &usd());
        view_snapshot.total_quantity = 4;
        let view = CartView {
            confirmed: CartSnapshot::empty(&usd()),
            provisional: view_snapshot,
            pending: 0,
            notice: None,
            needs_refresh: false,
            hydrated: true,
            version: 1,
        };
        let result = CartOracle::check_views([(2, &view)]);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::QuantityMismatch { declared: 4, summed: 0, .. }]
        ));
    }

    #[test]
    fn superseded_delivery_must_not_change_confirmed() {
        let record = DeliveryRecord {
            round: 3,
            issued_at: IssuedAt(2),
            resolution: ResolutionKind::Superseded,
            confirmed_changed: true,
            refreshed: false,
        };
        assert!(!CartOracle::check_stale_responses(std::slice::from_ref(&record)).passed);

        let settled_by_refresh = DeliveryRecord {
            refreshed: true,
            ..record
        };
        assert!(CartOracle::check_stale_responses(&[settled_by_refresh]).passed);
    }

    #[test]
    fn layout_must_match_derivation() {
        let mut obs = observation(
            Trigger::OpenCart,
            (VisibilityState::Closed, 0),
            (VisibilityState::Open, 0),
        );
        assert!(CartOracle::check_layout(std::slice::from_ref(&obs), &LayoutConfig::default()).passed);
        obs.layout.panel.mode = PanelMode::Hidden;
        assert!(!CartOracle::check_layout(&[obs], &LayoutConfig::default()).passed);
    }
}
