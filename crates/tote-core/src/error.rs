use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    ConfigParseError,
    CartNotFound,
    LineNotFound,
    InvalidQuantity,
    MerchandiseUnknown,
    MalformedResponse,
    CurrencyMismatch,
    TransientBackend,
    CartIdStorage,
    CheckoutPending,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::CartNotFound => "E2001",
            Self::LineNotFound => "E2002",
            Self::InvalidQuantity => "E2003",
            Self::MerchandiseUnknown => "E2004",
            Self::MalformedResponse => "E3001",
            Self::CurrencyMismatch => "E3002",
            Self::TransientBackend => "E4001",
            Self::CartIdStorage => "E4002",
            Self::CheckoutPending => "E4003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and banners.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::CartNotFound => "Cart not found",
            Self::LineNotFound => "Cart line not found",
            Self::InvalidQuantity => "Invalid line quantity",
            Self::MerchandiseUnknown => "Merchandise not available",
            Self::MalformedResponse => "Unexpected cart response",
            Self::CurrencyMismatch => "Currency mismatch",
            Self::TransientBackend => "Could not update cart",
            Self::CartIdStorage => "Cart id storage failed",
            Self::CheckoutPending => "Checkout already in progress",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and shoppers.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .tote/config.toml and retry."),
            Self::CartNotFound => Some("A fresh cart is created automatically on the next action."),
            Self::LineNotFound => None,
            Self::InvalidQuantity => Some("Quantities must be at least 1."),
            Self::MerchandiseUnknown => Some("Pick another variant; this one cannot be sold."),
            Self::MalformedResponse => Some("Retry once. If persistent, report the backend response."),
            Self::CurrencyMismatch => Some("All lines of a cart must share one currency."),
            Self::TransientBackend => Some("Try the same action again."),
            Self::CartIdStorage => Some("Check permissions on the cart cookie jar."),
            Self::CheckoutPending => Some("Wait for the current checkout redirect to finish."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
