//! tote-sim library.
//!
//! Drives a real [`CartSession`] with a scripted shopper against the
//! in-memory backend. Requests reach the backend through a
//! [`SimulatedNetwork`] that holds them back so that different lines commit
//! out of issue order; their responses come back through the same network,
//! which delays, reorders and fails them. Every run is reproducible from its seed.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod campaign;
pub mod network;
pub mod oracle;
pub mod rng;
pub mod shopper;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tote_core::backend::memory::{CallCounts, CatalogEntry, MemoryBackend};
use tote_core::layout::{LayoutConfig, LayoutGeometry, Viewport};
use tote_core::{
    BackendError, CartId, CartSession, CartSnapshot, CartSynchronizer, CartView, CurrencyCode,
    ErrorCode, IssuedAt, LineDraft, MemoryCartIdStore, MerchandiseId, Money, MutationRequest,
    ProductDisplay, Resolution, VisibilityState,
};

use crate::network::{FaultConfig, Request, RequestFault, Response, SimulatedNetwork};
use crate::rng::DeterministicRng;
use crate::shopper::{Shopper, ShopperAction, ShopperConfig, VIEWPORTS};

/// Parameters of one simulated shopping session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub rounds: u64,
    pub currency: String,
    pub tax_rate_bps: u32,
    pub shopper: ShopperConfig,
    pub fault: FaultConfig,
    pub layout: LayoutConfig,
    pub viewport: Viewport,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 40,
            currency: "USD".to_string(),
            tax_rate_bps: 800,
            shopper: ShopperConfig::default(),
            fault: FaultConfig::default(),
            layout: LayoutConfig::default(),
            viewport: VIEWPORTS[2],
        }
    }
}

/// What set off a recorded observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Submit,
    Resolve,
    Refresh,
    OpenCart,
    CloseCart,
    OutsideClick,
    Navigate,
    Resize,
    Checkout,
}

/// Panel state and quantity around one session call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub round: u64,
    pub trigger: Trigger,
    pub before_state: VisibilityState,
    pub after_state: VisibilityState,
    pub before_quantity: u32,
    pub after_quantity: u32,
    pub viewport: Viewport,
    pub layout: LayoutGeometry,
}

/// Serializable summary of a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionKind {
    Confirmed,
    Merged,
    Superseded,
    RolledBack { code: ErrorCode },
    Replayed,
    Orphaned,
}

impl ResolutionKind {
    /// Outcomes that only happen when responses race or carts expire.
    #[must_use]
    pub const fn is_interesting(self) -> bool {
        matches!(self, Self::Merged | Self::Superseded | Self::Replayed)
    }
}

impl From<&Resolution> for ResolutionKind {
    fn from(resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Confirmed => Self::Confirmed,
            Resolution::Merged => Self::Merged,
            Resolution::Superseded => Self::Superseded,
            Resolution::RolledBack { notice } => Self::RolledBack { code: notice.code },
            Resolution::Replayed { .. } => Self::Replayed,
            Resolution::Orphaned => Self::Orphaned,
        }
    }
}

/// One delivered response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub round: u64,
    pub issued_at: IssuedAt,
    pub resolution: ResolutionKind,
    pub confirmed_changed: bool,
    /// The session re-fetched the cart while settling this delivery.
    pub refreshed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEventKind {
    Action {
        action: ShopperAction,
    },
    Submitted {
        issued_at: IssuedAt,
        op: String,
        fault: Option<RequestFault>,
        commit_delay_rounds: u8,
    },
    Committed {
        issued_at: IssuedAt,
        delay_rounds: u8,
    },
    Skipped {
        code: ErrorCode,
    },
    Delivered {
        issued_at: IssuedAt,
        resolution: ResolutionKind,
    },
    CommitsReordered {
        count: usize,
    },
    Reordered {
        count: usize,
    },
    Expired {
        cart_id: CartId,
    },
    Refreshed {
        replaced: bool,
    },
    RefreshFailed {
        code: ErrorCode,
    },
    CheckoutStarted {
        url: String,
    },
    CheckoutRefused {
        code: ErrorCode,
    },
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub observations: Vec<Observation>,
    pub deliveries: Vec<DeliveryRecord>,
    /// View after every step, with the round it was taken in.
    #[serde(skip)]
    pub samples: Vec<(u64, CartView)>,
    /// Client view after the final drain and refresh.
    pub settled: CartView,
    /// Backend copy of the client's cart, if the backend still has it.
    pub authoritative: Option<CartSnapshot>,
    pub calls: CallCounts,
    pub expiries: usize,
    /// Rounds in which a second checkout was let through.
    pub checkout_reentries: Vec<u64>,
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// True when client and backend agree after settling.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.settled.pending == 0
            && self.authoritative.as_ref().map_or_else(
                || self.settled.confirmed.id.is_none(),
                |snapshot| *snapshot == self.settled.confirmed,
            )
    }
}

type SimSession = CartSession<MemoryBackend, MemoryCartIdStore>;

/// Fixed storefront catalog used by every run.
#[must_use]
pub fn catalog(currency: &CurrencyCode) -> Vec<(MerchandiseId, CatalogEntry)> {
    [
        ("tee-black-m", "Box Tee", "Black / M", 3_200),
        ("tee-white-l", "Box Tee", "White / L", 3_200),
        ("cap-olive", "Field Cap", "Olive", 2_450),
        ("tote-natural", "Market Tote", "Natural", 1_800),
        ("socks-3pk", "Rib Socks", "3 Pack", 1_299),
    ]
    .into_iter()
    .map(|(id, title, variant, minor)| {
        let entry = CatalogEntry {
            unit_cost: Money::from_minor(minor, currency.clone()),
            product: ProductDisplay {
                handle: title.to_lowercase().replace(' ', "-"),
                title: title.to_string(),
                variant_title: variant.to_string(),
                image: None,
                selected_options: Vec::new(),
            },
        };
        (MerchandiseId::new(id), entry)
    })
    .collect()
}

/// Deterministic simulator for one shopper session.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    network: SimulatedNetwork,
    shopper: Shopper,
    session: SimSession,
    viewport: Viewport,
    trace: Vec<TraceEvent>,
    observations: Vec<Observation>,
    deliveries: Vec<DeliveryRecord>,
    samples: Vec<(u64, CartView)>,
    expiries: usize,
    checkout_reentries: Vec<u64>,
    interesting: bool,
}

impl Simulator {
    /// # Errors
    ///
    /// Fails on an invalid currency code or zero rounds.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }
        let currency = CurrencyCode::new(&config.currency)
            .with_context(|| format!("invalid simulation currency {:?}", config.currency))?;

        let entries = catalog(&currency);
        let ids = entries.iter().map(|(id, _)| id.clone()).collect();
        let backend = entries
            .into_iter()
            .fold(MemoryBackend::new(currency.clone(), config.tax_rate_bps), |backend, (id, entry)| {
                backend.with_product(id, entry)
            });

        let sync = CartSynchronizer::new(backend, MemoryCartIdStore::new(), currency);
        let session = CartSession::new(sync, config.layout.clone(), config.viewport);

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            network: SimulatedNetwork::new(config.fault),
            shopper: Shopper::new(ids, config.shopper),
            session,
            viewport: config.viewport,
            config,
            trace: Vec::new(),
            observations: Vec::new(),
            deliveries: Vec::new(),
            samples: Vec::new(),
            expiries: 0,
            checkout_reentries: Vec::new(),
            interesting: false,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run every round, deliver what is still in flight, then refresh.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot start or the final refresh fails.
    pub fn run(&mut self) -> Result<SimulationResult> {
        self.session.start().context("starting shopper session")?;

        for round in 0..self.config.rounds {
            self.maybe_expire(round);
            let visible = self.session.snapshot();
            for action in self.shopper.plan_round(&mut self.rng, &visible) {
                self.perform(round, action);
            }
            let commits = self.network.commit_ready(round, &mut self.rng);
            if commits.reordered {
                self.push(round, TraceEventKind::CommitsReordered {
                    count: commits.committed.len(),
                });
            }
            for request in commits.committed {
                self.commit(round, request);
            }
            let outcome = self.network.deliver_ready(round, &mut self.rng);
            if outcome.reordered {
                self.push(round, TraceEventKind::Reordered {
                    count: outcome.delivered.len(),
                });
            }
            for response in outcome.delivered {
                self.deliver(round, response);
            }
            debug!(
                round,
                outbound = self.network.outbound_len(),
                pending = self.network.pending_len(),
                "round complete"
            );
        }

        let last = self.config.rounds;
        for request in self.network.drain_requests() {
            self.commit(last, request);
        }
        for response in self.network.drain() {
            self.deliver(last, response);
        }
        self.refresh(last);
        if let Some(TraceEvent {
            kind: TraceEventKind::RefreshFailed { code },
            ..
        }) = self.trace.last()
        {
            bail!("final refresh failed with {}", code.code());
        }

        let settled = self.session.view();
        let authoritative = settled
            .confirmed
            .id
            .as_ref()
            .and_then(|id| self.session.synchronizer().backend().peek(id).ok());
        let calls = self.session.synchronizer().backend().calls();

        info!(
            seed = self.config.seed,
            events = self.trace.len(),
            expiries = self.expiries,
            interesting = self.interesting,
            "simulation complete"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            trace: std::mem::take(&mut self.trace),
            observations: std::mem::take(&mut self.observations),
            deliveries: std::mem::take(&mut self.deliveries),
            samples: std::mem::take(&mut self.samples),
            settled,
            authoritative,
            calls,
            expiries: self.expiries,
            checkout_reentries: std::mem::take(&mut self.checkout_reentries),
            interesting_state_reached: self.interesting,
        })
    }

    fn maybe_expire(&mut self, round: u64) {
        if !self.rng.hit_rate_percent(self.config.fault.expiry_rate_percent) {
            return;
        }
        let Some(cart_id) = self.session.synchronizer().cart_id().cloned() else {
            return;
        };
        if self.session.synchronizer_mut().backend_mut().expire(&cart_id) {
            self.expiries += 1;
            self.interesting = true;
            self.push(round, TraceEventKind::Expired { cart_id });
        }
    }

    fn perform(&mut self, round: u64, action: ShopperAction) {
        self.push(round, TraceEventKind::Action {
            action: action.clone(),
        });

        match action {
            ShopperAction::Add {
                merchandise_id,
                quantity,
            } => {
                let draft = self.draft(&merchandise_id);
                self.mutate(round, MutationRequest::Add {
                    merchandise_id,
                    quantity,
                    draft,
                });
            }
            ShopperAction::Increment { merchandise_id } => {
                self.mutate(round, MutationRequest::Increment { merchandise_id });
            }
            ShopperAction::Decrement { merchandise_id } => {
                self.mutate(round, MutationRequest::Decrement { merchandise_id });
            }
            ShopperAction::Remove { merchandise_id } => {
                self.mutate(round, MutationRequest::Remove { merchandise_id });
            }
            ShopperAction::OpenCart => self.ui(round, Trigger::OpenCart, |session| {
                session.open_cart();
            }),
            ShopperAction::CloseCart => self.ui(round, Trigger::CloseCart, |session| {
                session.close_cart();
            }),
            ShopperAction::OutsideClick => self.ui(round, Trigger::OutsideClick, |session| {
                session.outside_click();
            }),
            ShopperAction::Navigate => self.ui(round, Trigger::Navigate, |session| {
                session.navigate();
            }),
            ShopperAction::Resize { viewport } => {
                self.viewport = viewport;
                self.ui(round, Trigger::Resize, |session| session.set_viewport(viewport));
            }
            ShopperAction::Refresh => self.refresh(round),
            ShopperAction::Checkout => self.checkout(round),
        }
    }

    fn mutate(&mut self, round: u64, request: MutationRequest) {
        let before = self.capture();
        let submitted = self.session.submit(request);
        self.record(round, Trigger::Submit, before);

        let ticket = match submitted {
            Ok(ticket) => ticket,
            Err(err) => {
                debug!(round, "mutation skipped: {err}");
                self.push(round, TraceEventKind::Skipped { code: err.code() });
                return;
            }
        };

        let fault = self.config.fault.roll_request_fault(&mut self.rng);
        let issued_at = ticket.issued_at();
        let op = ticket.call().op_name().to_string();
        let commit_delay_rounds = self.network.submit(Request { ticket, fault }, round, &mut self.rng);
        self.push(round, TraceEventKind::Submitted {
            issued_at,
            op,
            fault,
            commit_delay_rounds,
        });
    }

    /// The backend commits a request; its response starts travelling back.
    fn commit(&mut self, round: u64, request: Request) {
        let Request { ticket, fault } = request;
        let backend = self.session.synchronizer_mut().backend_mut();
        match fault {
            Some(RequestFault::Unavailable) => backend.fail_next(BackendError::Unavailable { status: 503 }),
            Some(RequestFault::Corrupt) => backend.corrupt_next_response(),
            Some(RequestFault::LostResponse) | None => {}
        }

        let mut outcome = self.session.synchronizer_mut().dispatch(&ticket);
        if fault == Some(RequestFault::LostResponse) && outcome.is_ok() {
            outcome = Err(BackendError::Timeout);
        }

        let issued_at = ticket.issued_at();
        let delay_rounds = self.network.send(Response { ticket, outcome }, round, &mut self.rng);
        self.push(round, TraceEventKind::Committed {
            issued_at,
            delay_rounds,
        });
    }

    fn deliver(&mut self, round: u64, response: Response) {
        let Response { ticket, outcome } = response;
        let issued_at = ticket.issued_at();
        let before = self.capture();
        let confirmed_before = self.session.view().confirmed;
        let fetches_before = self.session.synchronizer().backend().calls().fetch;

        let resolution = ResolutionKind::from(&self.session.resolve(ticket, outcome));
        let confirmed_changed = self.session.view().confirmed != confirmed_before;
        let refreshed = self.session.synchronizer().backend().calls().fetch > fetches_before;
        self.record(round, Trigger::Resolve, before);

        self.interesting |= resolution.is_interesting();
        self.deliveries.push(DeliveryRecord {
            round,
            issued_at,
            resolution,
            confirmed_changed,
            refreshed,
        });
        self.push(round, TraceEventKind::Delivered {
            issued_at,
            resolution,
        });
    }

    fn refresh(&mut self, round: u64) {
        let before = self.capture();
        let event = match self.session.refresh() {
            Ok(replaced) => TraceEventKind::Refreshed { replaced },
            Err(err) => TraceEventKind::RefreshFailed { code: err.code() },
        };
        self.record(round, Trigger::Refresh, before);
        self.push(round, event);
    }

    fn checkout(&mut self, round: u64) {
        let before = self.capture();
        match self.session.checkout() {
            Ok(redirect) => {
                if self.session.checkout().is_ok() {
                    self.checkout_reentries.push(round);
                }
                self.session.checkout_finished();
                self.push(round, TraceEventKind::CheckoutStarted {
                    url: redirect.url.to_string(),
                });
            }
            Err(err) => self.push(round, TraceEventKind::CheckoutRefused { code: err.code() }),
        }
        self.record(round, Trigger::Checkout, before);
    }

    fn ui(&mut self, round: u64, trigger: Trigger, act: impl FnOnce(&mut SimSession)) {
        let before = self.capture();
        act(&mut self.session);
        self.record(round, trigger, before);
    }

    fn draft(&self, merchandise_id: &MerchandiseId) -> Option<LineDraft> {
        self.session
            .synchronizer()
            .backend()
            .catalog()
            .get(merchandise_id)
            .map(|entry| LineDraft {
                unit_cost: entry.unit_cost.clone(),
                product: entry.product.clone(),
            })
    }

    fn capture(&self) -> (VisibilityState, u32) {
        (self.session.visibility(), self.session.view().total_quantity())
    }

    fn record(&mut self, round: u64, trigger: Trigger, before: (VisibilityState, u32)) {
        let view = self.session.view();
        self.observations.push(Observation {
            round,
            trigger,
            before_state: before.0,
            after_state: self.session.visibility(),
            before_quantity: before.1,
            after_quantity: view.total_quantity(),
            viewport: self.viewport,
            layout: self.session.layout(),
        });
        self.samples.push((round, view));
    }

    fn push(&mut self, round: u64, kind: TraceEventKind) {
        self.trace.push(TraceEvent { round, kind });
    }
}
