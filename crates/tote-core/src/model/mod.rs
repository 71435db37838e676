pub mod line;
pub mod money;
pub mod snapshot;

pub use line::{CartId, LineId, LineItem, MerchandiseId, ProductDisplay};
pub use money::{CurrencyCode, Money};
pub use snapshot::{CartSnapshot, CartTotals};
