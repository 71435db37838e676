//! Optimistic mutation reducer.
//!
//! [`apply`] is a pure function from a snapshot and a pending mutation to a
//! provisional snapshot. It never touches its input, so the caller can keep
//! showing the last confirmed state if the optimistic branch is rolled back.
//!
//! # Rules
//!
//! - **Add**: bump an existing line by `delta`, or append a provisional line
//!   built from the mutation's draft.
//! - **Increment / Decrement**: adjust by one. A line never holds quantity 0:
//!   decrementing a single-quantity line removes it.
//! - **Remove**: drop the line whatever its quantity.
//!
//! Totals are re-estimated from line costs afterwards. The estimate ignores
//! backend tax rules beyond carrying over the previous effective rate.

use tracing::{debug, warn};

use crate::model::money::MoneyError;
use crate::model::snapshot::CartSnapshot;
use crate::mutation::{MutationKind, PendingMutation};

/// Apply one optimistic mutation and return the provisional snapshot.
#[must_use]
pub fn apply(snapshot: &CartSnapshot, mutation: &PendingMutation) -> CartSnapshot {
    match try_apply(snapshot, mutation) {
        Ok(next) => next,
        Err(err) => {
            warn!(
                issued_at = %mutation.issued_at,
                merchandise = %mutation.target,
                "optimistic estimate failed, keeping previous view: {err}"
            );
            snapshot.clone()
        }
    }
}

/// Apply a sequence of mutations in order.
#[must_use]
pub fn apply_all<'a>(
    snapshot: &CartSnapshot,
    mutations: impl IntoIterator<Item = &'a PendingMutation>,
) -> CartSnapshot {
    mutations
        .into_iter()
        .fold(snapshot.clone(), |acc, mutation| apply(&acc, mutation))
}

fn try_apply(snapshot: &CartSnapshot, mutation: &PendingMutation) -> Result<CartSnapshot, MoneyError> {
    let mut next = snapshot.clone();
    let position = next
        .lines
        .iter()
        .position(|line| line.merchandise_id == mutation.target);

    match (mutation.kind, position) {
        (MutationKind::Add, Some(idx)) => {
            let step = u32::try_from(mutation.delta.max(1)).unwrap_or(1);
            let quantity = next.lines[idx].quantity.saturating_add(step);
            next.lines[idx] = next.lines[idx].with_quantity(quantity)?;
        }
        (MutationKind::Add, None) => {
            let Some(draft) = &mutation.draft else {
                debug!(merchandise = %mutation.target, "add without display draft, no provisional line");
                return Ok(next);
            };
            let quantity = u32::try_from(mutation.delta.max(1)).unwrap_or(1);
            next.lines.push(draft.to_line(mutation.target.clone(), quantity)?);
        }
        (MutationKind::IncrementQuantity, Some(idx)) => {
            let quantity = next.lines[idx].quantity.saturating_add(1);
            next.lines[idx] = next.lines[idx].with_quantity(quantity)?;
        }
        (MutationKind::DecrementQuantity, Some(idx)) => {
            let quantity = next.lines[idx].quantity.saturating_sub(1);
            if quantity == 0 {
                next.lines.remove(idx);
            } else {
                next.lines[idx] = next.lines[idx].with_quantity(quantity)?;
            }
        }
        (MutationKind::Remove, Some(idx)) => {
            next.lines.remove(idx);
        }
        (_, None) => {
            debug!(
                merchandise = %mutation.target,
                kind = ?mutation.kind,
                "mutation targets a line that is not in the cart"
            );
            return Ok(next);
        }
    }

    next.reestimate()
}
