//! Reconciling optimistic cart mutations with the commerce backend.

pub mod ordering;
pub mod synchronizer;

pub use ordering::{Admission, LineWatermarks};
pub use synchronizer::{CartSynchronizer, Resolution, SyncError, Ticket};
