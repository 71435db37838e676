//! Open/closed state of the cart panel.
//!
//! The panel opens on explicit request or, as add-to-cart feedback, when
//! the cart's total quantity strictly increases while it is closed. It
//! closes on request, on a click outside the panel and on navigation.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityState {
    #[default]
    Closed,
    Open,
}

impl VisibilityState {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Why the panel changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityCause {
    OpenButton,
    QuantityIncreased,
    CloseButton,
    OutsideClick,
    Navigation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChange {
    pub from: VisibilityState,
    pub to: VisibilityState,
    pub cause: VisibilityCause,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartVisibility {
    state: VisibilityState,
    /// Total quantity of the last observed snapshot.
    last_quantity: Option<u32>,
}

impl CartVisibility {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> VisibilityState {
        self.state
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn open(&mut self) -> Option<VisibilityChange> {
        self.transition(VisibilityState::Open, VisibilityCause::OpenButton)
    }

    pub fn close(&mut self) -> Option<VisibilityChange> {
        self.transition(VisibilityState::Closed, VisibilityCause::CloseButton)
    }

    pub fn outside_click(&mut self) -> Option<VisibilityChange> {
        self.transition(VisibilityState::Closed, VisibilityCause::OutsideClick)
    }

    pub fn navigate(&mut self) -> Option<VisibilityChange> {
        self.transition(VisibilityState::Closed, VisibilityCause::Navigation)
    }

    /// Feed the total quantity of a newly published snapshot.
    ///
    /// The first observation only sets the baseline.
    pub fn observe(&mut self, total_quantity: u32) -> Option<VisibilityChange> {
        let previous = self.last_quantity.replace(total_quantity);
        match previous {
            Some(previous) if total_quantity > previous => {
                self.transition(VisibilityState::Open, VisibilityCause::QuantityIncreased)
            }
            _ => None,
        }
    }

    fn transition(&mut self, to: VisibilityState, cause: VisibilityCause) -> Option<VisibilityChange> {
        if self.state == to {
            return None;
        }
        let change = VisibilityChange {
            from: self.state,
            to,
            cause,
        };
        self.state = to;
        debug!(?cause, ?to, "cart visibility changed");
        Some(change)
    }
}
