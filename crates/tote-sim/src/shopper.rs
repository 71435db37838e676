//! Scripted shopper that clicks around the storefront.

use serde::{Deserialize, Serialize};
use tote_core::layout::Viewport;
use tote_core::{CartSnapshot, MerchandiseId};

use crate::rng::DeterministicRng;

/// Viewports the shopper resizes between: phone, tablet, laptop, desktop.
pub const VIEWPORTS: [Viewport; 4] = [
    Viewport::new(390, 844),
    Viewport::new(768, 1024),
    Viewport::new(1280, 800),
    Viewport::new(1920, 1080),
];

/// One thing a shopper can do in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ShopperAction {
    Add {
        merchandise_id: MerchandiseId,
        quantity: u32,
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
    OpenCart,
    CloseCart,
    OutsideClick,
    Navigate,
    Resize {
        viewport: Viewport,
    },
    Refresh,
    Checkout,
}

impl ShopperAction {
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Add { .. } | Self::Increment { .. } | Self::Decrement { .. } | Self::Remove { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopperConfig {
    /// Upper bound on actions per round; each round takes 1..=this many.
    pub max_actions_per_round: u32,
    pub max_add_quantity: u32,
    /// Chance that a line action targets something already in the cart.
    pub focus_cart_percent: u8,
}

impl Default for ShopperConfig {
    fn default() -> Self {
        Self {
            max_actions_per_round: 3,
            max_add_quantity: 3,
            focus_cart_percent: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shopper {
    catalog: Vec<MerchandiseId>,
    config: ShopperConfig,
}

impl Shopper {
    #[must_use]
    pub const fn new(catalog: Vec<MerchandiseId>, config: ShopperConfig) -> Self {
        Self { catalog, config }
    }

    /// Actions for one round, chosen against what the shopper currently sees.
    #[must_use]
    pub fn plan_round(&self, rng: &mut DeterministicRng, visible: &CartSnapshot) -> Vec<ShopperAction> {
        let count = rng.next_between(1, self.config.max_actions_per_round.max(1));
        (0..count).filter_map(|_| self.next_action(rng, visible)).collect()
    }

    fn next_action(&self, rng: &mut DeterministicRng, visible: &CartSnapshot) -> Option<ShopperAction> {
        let roll = rng.next_bounded(100);
        let action = match roll {
            0..=29 => ShopperAction::Add {
                merchandise_id: rng.pick(&self.catalog)?.clone(),
                quantity: rng.next_between(1, self.config.max_add_quantity.max(1)),
            },
            30..=49 => ShopperAction::Increment {
                merchandise_id: self.line_target(rng, visible)?,
            },
            50..=69 => ShopperAction::Decrement {
                merchandise_id: self.line_target(rng, visible)?,
            },
            70..=77 => ShopperAction::Remove {
                merchandise_id: self.line_target(rng, visible)?,
            },
            78..=84 => ShopperAction::Refresh,
            85..=87 => ShopperAction::OpenCart,
            88..=90 => ShopperAction::CloseCart,
            91..=93 => ShopperAction::OutsideClick,
            94..=96 => ShopperAction::Navigate,
            97..=98 => ShopperAction::Resize {
                viewport: *rng.pick(&VIEWPORTS)?,
            },
            _ => ShopperAction::Checkout,
        };
        Some(action)
    }

    fn line_target(&self, rng: &mut DeterministicRng, visible: &CartSnapshot) -> Option<MerchandiseId> {
        if !visible.lines.is_empty() && rng.hit_rate_percent(self.config.focus_cart_percent) {
            return rng.pick(&visible.lines).map(|line| line.merchandise_id.clone());
        }
        rng.pick(&self.catalog).cloned()
    }
}
