//! End-to-end shopper scenarios against the in-memory backend.

#[path = "fixtures.rs"]
mod fixtures;
use fixtures::*;

use tote_core::backend::memory::MemoryBackend;
use tote_core::layout::{LayoutConfig, PanelMode, Viewport};
use tote_core::{
    BackendError, CartBackend, CartId, CartSession, CartSynchronizer, ErrorCode,
    FileCartIdStore, MemoryCartIdStore, Resolution, SessionError, VisibilityState,
};

#[test]
fn add_to_empty_cart_opens_panel_then_confirms_backend_totals() {
    let mut session = session();
    let reader = session.reader();

    let ticket = session.submit(add("x", 1)).expect("submit");
    let provisional = reader.view().provisional;
    assert_eq!(provisional.lines.len(), 1);
    assert_eq!(provisional.total_quantity, 1);
    assert_eq!(reader.badge_label(), "BAG [1]");
    assert_eq!(session.visibility(), VisibilityState::Open);

    let outcome = session.synchronizer_mut().dispatch(&ticket);
    assert_eq!(session.resolve(ticket, outcome), Resolution::Confirmed);

    let confirmed = reader.view().confirmed;
    assert_eq!(confirmed.lines[0].line_cost.format_price(), "$10.00 USD");
    assert_eq!(confirmed.totals.subtotal.amount(), "10.00");
    assert_eq!(confirmed.totals.tax.amount(), "0.80");
    assert_eq!(confirmed.totals.total.amount(), "10.80");
    assert_eq!(confirmed.totals.shipping_label(), "Calculated at checkout");
    assert!(confirmed.lines[0].id.is_some());
    assert_eq!(reader.view().provisional, confirmed);
}

#[test]
fn rapid_decrements_resolve_newest_first() {
    let mut sync = synchronizer();
    sync.mutate(add("x", 2)).expect("seed");

    let first = sync.submit(decrement("x")).expect("first");
    let second = sync.submit(decrement("x")).expect("second");
    assert!(sync.view().provisional.line(&merch("x")).is_none());

    let first_out = sync.dispatch(&first);
    let second_out = sync.dispatch(&second);
    assert_eq!(
        first_out.as_ref().map(|snap| snap.quantity_of(&merch("x"))),
        Ok(1)
    );

    assert_eq!(sync.resolve(second, second_out), Resolution::Confirmed);
    assert_eq!(sync.resolve(first, first_out), Resolution::Superseded);

    let view = sync.view();
    assert!(view.confirmed.line(&merch("x")).is_none());
    assert_eq!(view.provisional, view.confirmed);
    assert_eq!(view.pending, 0);
}

#[test]
fn timeout_rolls_back_and_surfaces_notice() {
    let mut session = session();
    session.add_to_cart(merch("y"), 1, draft(&backend(), "y")).expect("seed");
    let before = session.view().confirmed;

    session
        .synchronizer_mut()
        .backend_mut()
        .fail_next(BackendError::Timeout);
    let resolution = session
        .add_to_cart(merch("x"), 1, draft(&backend(), "x"))
        .expect("submit");

    let Resolution::RolledBack { notice } = resolution else {
        panic!("expected rollback, got {resolution:?}");
    };
    assert_eq!(notice.code, ErrorCode::TransientBackend);
    assert_eq!(notice.message, "Could not update cart");
    assert!(notice.recoverable);

    let view = session.view();
    assert_eq!(view.provisional, before);
    assert_eq!(view.provisional.total_quantity, 1);
    assert_eq!(view.notice, Some(notice));

    session
        .add_to_cart(merch("x"), 1, draft(&backend(), "x"))
        .expect("retry");
    assert_eq!(session.view().notice, None);
    assert_eq!(session.view().confirmed.total_quantity, 2);
}

#[test]
fn stored_cart_not_found_is_replaced_and_mutation_replayed() {
    let stale = CartId::new("cart-from-last-week");
    let sync = CartSynchronizer::new(backend(), MemoryCartIdStore::with_id(stale.clone()), usd());
    let mut session = CartSession::new(sync, LayoutConfig::default(), Viewport::new(1280, 800));

    let resolution = session
        .add_to_cart(merch("x"), 1, draft(&backend(), "x"))
        .expect("submit");

    let Resolution::Replayed { cart_id } = resolution else {
        panic!("expected replay, got {resolution:?}");
    };
    assert_ne!(cart_id, stale);
    let sync = session.synchronizer();
    assert_eq!(sync.backend().calls().create, 1);
    assert_eq!(sync.backend().calls().add, 2);
    assert_eq!(sync.id_store().current(), Some(&cart_id));
    assert_eq!(sync.view().confirmed.quantity_of(&merch("x")), 1);
    assert_eq!(sync.view().notice, None);
}

#[test]
fn replay_failure_is_surfaced_as_transient() {
    let mut sync = synchronizer();
    sync.mutate(add("x", 1)).expect("seed");
    let expired = sync.cart_id().cloned().expect("cart");
    sync.backend_mut()
        .fail_next(BackendError::CartNotFound(expired.clone()));
    sync.backend_mut()
        .fail_next(BackendError::CartNotFound(expired.clone()));

    // Both the original call and its replay on the new cart report not-found.
    let resolution = sync.mutate(add("y", 1)).expect("submit");
    let Resolution::RolledBack { notice } = resolution else {
        panic!("expected rollback, got {resolution:?}");
    };
    assert_eq!(notice.code, ErrorCode::TransientBackend);
    assert!(notice.recoverable);
    assert_eq!(sync.backend().calls().create, 2);
    assert_ne!(sync.cart_id(), Some(&expired));
    assert!(sync.view().provisional.is_empty());
}

#[test]
fn resume_fetches_stored_cart_once() {
    let mut backend = backend();
    let id = backend.create_cart().expect("create");
    backend.add_line(&id, &merch("z"), 2).expect("add");

    let mut sync = CartSynchronizer::new(&mut backend, MemoryCartIdStore::with_id(id.clone()), usd());
    assert_eq!(sync.resume().expect("resume"), Some(id.clone()));
    assert_eq!(sync.resume().expect("resume again"), Some(id));
    assert!(sync.view().hydrated);
    assert_eq!(sync.view().provisional.quantity_of(&merch("z")), 2);
    drop(sync);
    assert_eq!(backend.calls().fetch, 1);
}

#[test]
fn resume_clears_a_stored_id_the_backend_forgot() {
    let mut sync = CartSynchronizer::new(
        backend(),
        MemoryCartIdStore::with_id(CartId::new("gone")),
        usd(),
    );
    assert_eq!(sync.resume().expect("resume"), None);
    assert_eq!(sync.id_store().current(), None);
    assert!(sync.view().confirmed.id.is_none());
}

#[test]
fn cart_survives_a_new_session_through_the_cookie_jar() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("cookies.json");
    let mut backend: MemoryBackend = backend();

    {
        let sync = CartSynchronizer::new(&mut backend, FileCartIdStore::new(&jar), usd());
        let mut session = CartSession::new(sync, LayoutConfig::default(), Viewport::new(390, 844));
        session.start().expect("start");
        session.add_to_cart(merch("x"), 3, None).expect("add");
        assert_eq!(session.visibility(), VisibilityState::Open, "opened by the confirmed quantity");
        assert_eq!(session.view().confirmed.total_quantity, 3);
    }

    let sync = CartSynchronizer::new(&mut backend, FileCartIdStore::new(&jar), usd());
    let mut session = CartSession::new(sync, LayoutConfig::default(), Viewport::new(390, 844));
    assert!(session.start().expect("start").is_some());
    assert_eq!(session.reader().badge_label(), "BAG [3]");
    assert_eq!(session.visibility(), VisibilityState::Closed);
    drop(session);
    assert_eq!(backend.calls().create, 1);
}

#[test]
fn malformed_response_is_discarded() {
    let mut sync = synchronizer();
    sync.mutate(add("x", 1)).expect("seed");
    let before = sync.view().confirmed;

    sync.backend_mut().corrupt_next_response();
    let resolution = sync.mutate(increment("x")).expect("submit");
    let Resolution::RolledBack { notice } = resolution else {
        panic!("expected rollback, got {resolution:?}");
    };
    assert_eq!(notice.code, ErrorCode::MalformedResponse);
    assert!(!notice.recoverable);
    assert_eq!(sync.view().confirmed, before);
    assert_eq!(sync.view().provisional, before);
}

#[test]
fn rejected_merchandise_rolls_back() {
    let mut sync = synchronizer();
    let resolution = sync
        .mutate(tote_core::MutationRequest::Add {
            merchandise_id: merch("ghost"),
            quantity: 1,
            draft: draft(&backend(), "x"),
        })
        .expect("submit");
    assert!(matches!(
        resolution,
        Resolution::RolledBack { ref notice } if notice.code == ErrorCode::MerchandiseUnknown
    ));
    assert!(sync.view().provisional.is_empty());
}

#[test]
fn layout_follows_visibility_and_viewport() {
    let mut session = session();
    assert_eq!(session.layout().panel.mode, PanelMode::Hidden);

    session.add_to_cart(merch("x"), 1, draft(&backend(), "x")).expect("add");
    assert_eq!(session.layout().panel.mode, PanelMode::Split);

    session.set_viewport(Viewport::new(390, 844));
    let mobile = session.layout();
    assert_eq!(mobile.panel.mode, PanelMode::Overlay);
    assert!(mobile.page_scroll_locked);
    assert_eq!(session.view().confirmed.total_quantity, 1);

    session.outside_click();
    assert!(!session.layout().page_scroll_locked);
    session.open_cart();
    session.navigate();
    assert_eq!(session.visibility(), VisibilityState::Closed);
}

#[test]
fn checkout_redirect_is_one_shot() {
    let mut session = session();
    assert!(matches!(
        session.checkout(),
        Err(SessionError::Sync(tote_core::SyncError::NoCart))
    ));

    session.add_to_cart(merch("z"), 1, draft(&backend(), "z")).expect("add");
    let redirect = session.checkout().expect("checkout");
    assert!(redirect.url.as_str().contains("/checkouts/"));

    let err = session.checkout().unwrap_err();
    assert_eq!(err.code(), ErrorCode::CheckoutPending);

    assert_eq!(session.checkout_finished(), Some(redirect));
    assert!(session.checkout().is_ok());
}

#[test]
fn reset_forgets_everything() {
    let mut session = session();
    session.add_to_cart(merch("x"), 1, draft(&backend(), "x")).expect("add");
    session.reset().expect("reset");

    let view = session.view();
    assert!(view.provisional.is_empty());
    assert!(view.confirmed.id.is_none());
    assert_eq!(session.synchronizer().id_store().current(), None);
    assert_eq!(session.visibility(), VisibilityState::Closed);

    session.add_to_cart(merch("x"), 1, draft(&backend(), "x")).expect("add");
    assert_eq!(session.synchronizer().backend().calls().create, 2);
    assert_eq!(session.visibility(), VisibilityState::Open);
}

#[test]
fn cross_line_commits_out_of_issue_order_keep_both_effects() {
    let mut sync = synchronizer();
    sync.mutate(add("x", 1)).expect("seed x");
    sync.mutate(add("y", 1)).expect("seed y");

    let first = sync.submit(increment("x")).expect("increment x");
    let second = sync.submit(increment("y")).expect("increment y");
    // The backend commits the later request first.
    let second_out = sync.dispatch(&second);
    let first_out = sync.dispatch(&first);

    assert_eq!(sync.resolve(first, first_out), Resolution::Confirmed);
    assert_eq!(sync.resolve(second, second_out), Resolution::Confirmed);

    let view = sync.view();
    assert_eq!(view.pending, 0);
    assert_eq!(view.confirmed.quantity_of(&merch("x")), 2);
    assert_eq!(view.confirmed.quantity_of(&merch("y")), 2);
    assert!(view.needs_refresh);
    assert!(view.confirmed.validate_authoritative().is_ok());

    assert!(sync.refresh().expect("refresh"));
    let id = sync.cart_id().cloned().expect("cart");
    assert_eq!(sync.view().confirmed, sync.backend().peek(&id).expect("peek"));
    assert!(!sync.view().needs_refresh);
}

#[test]
fn cross_line_commits_out_of_issue_order_resolved_newest_first() {
    let mut sync = synchronizer();
    sync.mutate(add("x", 1)).expect("seed x");
    sync.mutate(add("y", 1)).expect("seed y");

    let first = sync.submit(increment("x")).expect("increment x");
    let second = sync.submit(increment("y")).expect("increment y");
    let second_out = sync.dispatch(&second);
    let first_out = sync.dispatch(&first);

    assert_eq!(sync.resolve(second, second_out), Resolution::Confirmed);
    assert_eq!(sync.resolve(first, first_out), Resolution::Merged);

    let view = sync.view();
    assert_eq!(view.confirmed.quantity_of(&merch("x")), 2);
    assert_eq!(view.confirmed.quantity_of(&merch("y")), 2);
    assert_eq!(view.provisional, view.confirmed);
}

#[test]
fn session_refreshes_once_merged_responses_settle() {
    let mut session = session();
    let x = session.submit(add("x", 1)).expect("add x");
    let z = session.submit(add("z", 1)).expect("add z");
    let x_out = session.synchronizer_mut().dispatch(&x);
    let z_out = session.synchronizer_mut().dispatch(&z);

    assert_eq!(session.resolve(z, z_out), Resolution::Confirmed);
    assert_eq!(session.synchronizer().backend().calls().fetch, 0);
    assert_eq!(session.resolve(x, x_out), Resolution::Merged);

    let sync = session.synchronizer();
    assert_eq!(sync.backend().calls().fetch, 1);
    let view = sync.view();
    assert!(!view.needs_refresh);
    assert_eq!(view.pending, 0);
    let id = sync.cart_id().cloned().expect("cart");
    assert_eq!(view.confirmed, sync.backend().peek(&id).expect("peek"));
}

#[test]
fn failed_settling_refresh_posts_a_notice() {
    let mut session = session();
    let x = session.submit(add("x", 1)).expect("add x");
    let z = session.submit(add("z", 1)).expect("add z");
    let x_out = session.synchronizer_mut().dispatch(&x);
    let z_out = session.synchronizer_mut().dispatch(&z);
    session
        .synchronizer_mut()
        .backend_mut()
        .fail_next(BackendError::Timeout);

    assert_eq!(session.resolve(z, z_out), Resolution::Confirmed);
    assert_eq!(session.resolve(x, x_out), Resolution::Merged);

    let view = session.view();
    assert!(view.needs_refresh);
    let notice = view.notice.expect("notice");
    assert_eq!(notice.code, ErrorCode::TransientBackend);
    assert!(notice.recoverable);
    assert_eq!(view.confirmed.total_quantity, 2);
}
