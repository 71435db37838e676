//! tote-core library.
//!
//! Client-side cart state: a shared cart view, optimistic mutations
//! reconciled against a remote commerce backend, panel visibility and the
//! responsive layout derived from it.
//!
//! # Conventions
//!
//! - **Errors**: module error enums derive `thiserror::Error` and map to a
//!   stable [`error::ErrorCode`]; config loading uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod backend;
pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod mutation;
pub mod reducer;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;
pub mod timing;
pub mod visibility;

pub use backend::{BackendCall, BackendError, CartBackend, FailureClass};
pub use error::ErrorCode;
pub use layout::{LayoutConfig, LayoutGeometry, Viewport, ViewportClass, derive_layout};
pub use model::{CartId, CartSnapshot, CartTotals, CurrencyCode, LineId, LineItem, MerchandiseId, Money, ProductDisplay};
pub use mutation::{IssuedAt, LineDraft, MutationKind, MutationRequest, PendingMutation};
pub use session::{CartSession, CheckoutRedirect, SessionError};
pub use storage::{CartIdStore, FileCartIdStore, MemoryCartIdStore, StorageError};
pub use store::{CartNotice, CartReader, CartView};
pub use sync::{CartSynchronizer, Resolution, SyncError, Ticket};
pub use visibility::{CartVisibility, VisibilityCause, VisibilityChange, VisibilityState};
