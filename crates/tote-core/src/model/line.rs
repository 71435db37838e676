//! Cart lines and the read-only product display data attached to them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::money::{Money, MoneyError};

/// Option value the backend uses for single-variant products.
pub const DEFAULT_OPTION: &str = "Default Title";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }
    };
}

string_id!(
    /// Opaque cart identifier assigned by the backend.
    CartId
);
string_id!(
    /// A purchasable variant: product plus selected options.
    MerchandiseId
);
string_id!(
    /// Backend identifier of one cart line.
    LineId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub url: String,
    pub alt_text: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Denormalized display data. Sourced from the backend, never edited locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDisplay {
    pub handle: String,
    pub title: String,
    /// Variant title, `"Default Title"` for single-variant products.
    pub variant_title: String,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
}

impl ProductDisplay {
    /// Storefront path for this variant: `/product/<handle>` plus non-default
    /// options as a query string (`?color=red&size=m`).
    #[must_use]
    pub fn merchandise_path(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        let mut any = false;
        for option in &self.selected_options {
            if option.value != DEFAULT_OPTION {
                query.append_pair(&option.name.to_lowercase(), &option.value);
                any = true;
            }
        }

        let base = format!("/product/{}", self.handle);
        if any {
            format!("{base}?{}", query.finish())
        } else {
            base
        }
    }

    /// Variant subtitle to render under the product title, if any.
    #[must_use]
    pub fn variant_label(&self) -> Option<&str> {
        (self.variant_title != DEFAULT_OPTION).then_some(self.variant_title.as_str())
    }

    /// Alt text for the line thumbnail, falling back to the product title.
    #[must_use]
    pub fn image_alt(&self) -> &str {
        self.image
            .as_ref()
            .and_then(|image| image.alt_text.as_deref())
            .unwrap_or(&self.title)
    }
}

/// One merchandise entry in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// `None` while the line only exists provisionally.
    #[serde(default)]
    pub id: Option<LineId>,
    pub merchandise_id: MerchandiseId,
    pub quantity: u32,
    pub unit_cost: Money,
    pub line_cost: Money,
    pub product: ProductDisplay,
}

impl LineItem {
    /// Build a line with `line_cost = unit_cost * quantity`.
    ///
    /// # Errors
    ///
    /// Fails if the product overflows.
    pub fn priced(
        id: Option<LineId>,
        merchandise_id: MerchandiseId,
        quantity: u32,
        unit_cost: Money,
        product: ProductDisplay,
    ) -> Result<Self, MoneyError> {
        let line_cost = unit_cost.checked_mul(quantity)?;
        Ok(Self {
            id,
            merchandise_id,
            quantity,
            unit_cost,
            line_cost,
            product,
        })
    }

    /// Return a copy with a new quantity and a recomputed line cost.
    ///
    /// # Errors
    ///
    /// Fails if the product overflows.
    pub fn with_quantity(&self, quantity: u32) -> Result<Self, MoneyError> {
        Ok(Self {
            quantity,
            line_cost: self.unit_cost.checked_mul(quantity)?,
            ..self.clone()
        })
    }

    /// Whether `line_cost == unit_cost * quantity`.
    #[must_use]
    pub fn cost_is_consistent(&self) -> bool {
        self.unit_cost
            .checked_mul(self.quantity)
            .is_ok_and(|expected| expected == self.line_cost)
    }
}
