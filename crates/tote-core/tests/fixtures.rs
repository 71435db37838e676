//! Shared catalog and constructors for integration tests.
#![allow(dead_code)]

use tote_core::backend::memory::{CatalogEntry, MemoryBackend};
use tote_core::layout::{LayoutConfig, Viewport};
use tote_core::{
    CartSession, CartSynchronizer, CurrencyCode, LineDraft, MemoryCartIdStore, MerchandiseId,
    Money, MutationRequest, ProductDisplay,
};

pub const TAX_BPS: u32 = 800;

pub fn usd() -> CurrencyCode {
    CurrencyCode::new("USD").expect("valid code")
}

pub fn merch(id: &str) -> MerchandiseId {
    MerchandiseId::new(id)
}

pub fn product(handle: &str, title: &str) -> ProductDisplay {
    ProductDisplay {
        handle: handle.to_string(),
        title: title.to_string(),
        variant_title: "Default Title".to_string(),
        image: None,
        selected_options: Vec::new(),
    }
}

/// `x` costs $10.00, `y` $4.50, `z` $25.00; 8% tax.
pub fn backend() -> MemoryBackend {
    let entry = |minor: i64, handle: &str, title: &str| CatalogEntry {
        unit_cost: Money::from_minor(minor, usd()),
        product: product(handle, title),
    };
    MemoryBackend::new(usd(), TAX_BPS)
        .with_product("x", entry(1000, "linen-shirt", "Linen Shirt"))
        .with_product("y", entry(450, "canvas-tote", "Canvas Tote"))
        .with_product("z", entry(2500, "wool-scarf", "Wool Scarf"))
}

pub fn draft(backend: &MemoryBackend, id: &str) -> Option<LineDraft> {
    backend.catalog().get(&merch(id)).map(|entry| LineDraft {
        unit_cost: entry.unit_cost.clone(),
        product: entry.product.clone(),
    })
}

pub fn add(id: &str, quantity: u32) -> MutationRequest {
    MutationRequest::Add {
        merchandise_id: merch(id),
        quantity,
        draft: draft(&backend(), id),
    }
}

pub fn increment(id: &str) -> MutationRequest {
    MutationRequest::Increment {
        merchandise_id: merch(id),
    }
}

pub fn decrement(id: &str) -> MutationRequest {
    MutationRequest::Decrement {
        merchandise_id: merch(id),
    }
}

pub fn remove(id: &str) -> MutationRequest {
    MutationRequest::Remove {
        merchandise_id: merch(id),
    }
}

pub fn synchronizer() -> CartSynchronizer<MemoryBackend, MemoryCartIdStore> {
    CartSynchronizer::new(backend(), MemoryCartIdStore::new(), usd())
}

pub fn session() -> CartSession<MemoryBackend, MemoryCartIdStore> {
    CartSession::new(
        synchronizer(),
        LayoutConfig::default(),
        Viewport::new(1280, 800),
    )
}
