//! Simulated transport between the shopper's client and the backend.
//!
//! Requests wait in an outbound queue before the backend commits them.
//! Requests for different lines can overtake each other there; requests for
//! the same line always commit in issue order. Responses then travel back
//! through a second queue, where they can be delayed, reordered or replaced
//! by a transport failure.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tote_core::{BackendError, CartSnapshot, MerchandiseId, Ticket};

use crate::rng::DeterministicRng;

/// Fault injection configuration for simulated delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum rounds a request waits before the backend commits it.
    pub max_commit_delay_rounds: u8,
    /// Maximum response delay in rounds.
    pub max_delay_rounds: u8,
    /// Chance of reversing the requests, or the responses, that become ready
    /// in one round.
    pub reorder_rate_percent: u8,
    /// Requests refused before the backend applies them (503).
    pub unavailable_rate_percent: u8,
    /// Requests the backend applies whose response never arrives.
    pub lost_response_rate_percent: u8,
    /// Responses whose totals are tampered with.
    pub corrupt_rate_percent: u8,
    /// Chance per round that the backend forgets the current cart.
    pub expiry_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_commit_delay_rounds: 2,
            max_delay_rounds: 3,
            reorder_rate_percent: 20,
            unavailable_rate_percent: 4,
            lost_response_rate_percent: 3,
            corrupt_rate_percent: 2,
            expiry_rate_percent: 2,
        }
    }
}

impl FaultConfig {
    /// Delays and reordering only; every request succeeds.
    #[must_use]
    pub const fn reorder_only() -> Self {
        Self {
            max_commit_delay_rounds: 2,
            max_delay_rounds: 3,
            reorder_rate_percent: 30,
            unavailable_rate_percent: 0,
            lost_response_rate_percent: 0,
            corrupt_rate_percent: 0,
            expiry_rate_percent: 0,
        }
    }

    /// Pick at most one fault for the next request.
    #[must_use]
    pub fn roll_request_fault(&self, rng: &mut DeterministicRng) -> Option<RequestFault> {
        if rng.hit_rate_percent(self.unavailable_rate_percent) {
            Some(RequestFault::Unavailable)
        } else if rng.hit_rate_percent(self.lost_response_rate_percent) {
            Some(RequestFault::LostResponse)
        } else if rng.hit_rate_percent(self.corrupt_rate_percent) {
            Some(RequestFault::Corrupt)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestFault {
    Unavailable,
    LostResponse,
    Corrupt,
}

/// A submitted request on its way to the backend, with the fault it will hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub ticket: Ticket,
    pub fault: Option<RequestFault>,
}

impl Request {
    fn line(&self) -> &MerchandiseId {
        self.ticket.call().merchandise_id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Outbound {
    commit_at_round: u64,
    request: Request,
}

/// Requests the backend commits this round, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub committed: Vec<Request>,
    pub reordered: bool,
}

/// A backend answer on its way back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub ticket: Ticket,
    pub outcome: Result<CartSnapshot, BackendError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Queued {
    deliver_at_round: u64,
    response: Response,
}

/// Result of delivering all ready responses for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    pub delivered: Vec<Response>,
    pub reordered: bool,
}

/// Deterministic, fault-injecting response queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNetwork {
    outbound: Vec<Outbound>,
    pending: Vec<Queued>,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            outbound: Vec::new(),
            pending: Vec::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Responses still in flight.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Requests not yet committed by the backend.
    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Queue a request for the backend; returns the delay it was given.
    pub fn submit(&mut self, request: Request, round: u64, rng: &mut DeterministicRng) -> u8 {
        let delay = roll_delay(self.fault.max_commit_delay_rounds, rng);
        self.outbound.push(Outbound {
            commit_at_round: round.saturating_add(u64::from(delay)),
            request,
        });
        delay
    }

    /// Release every due request whose line has no earlier request waiting.
    #[must_use]
    pub fn commit_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> CommitOutcome {
        let mut held_lines = HashSet::new();
        let mut committed = Vec::new();
        let mut waiting = Vec::new();
        for queued in self.outbound.drain(..) {
            let line = queued.request.line().clone();
            if queued.commit_at_round <= round && !held_lines.contains(&line) {
                committed.push(queued.request);
            } else {
                held_lines.insert(line);
                waiting.push(queued);
            }
        }
        self.outbound = waiting;

        let reordered = committed.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        if reordered {
            committed.reverse();
            keep_line_order(&mut committed);
        }
        CommitOutcome {
            committed,
            reordered,
        }
    }

    /// Every request still waiting, in issue order.
    #[must_use]
    pub fn drain_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.outbound)
            .into_iter()
            .map(|queued| queued.request)
            .collect()
    }

    /// Queue a response; returns the delay it was given.
    pub fn send(&mut self, response: Response, round: u64, rng: &mut DeterministicRng) -> u8 {
        let delay = roll_delay(self.fault.max_delay_rounds, rng);
        self.pending.push(Queued {
            deliver_at_round: round.saturating_add(u64::from(delay)),
            response,
        });
        delay
    }

    /// Deliver every response whose round has arrived.
    #[must_use]
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|queued| queued.deliver_at_round <= round);
        self.pending = future;

        let mut delivered: Vec<Response> = ready.into_iter().map(|queued| queued.response).collect();
        let reordered = delivered.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        if reordered {
            delivered.reverse();
        }

        DeliverOutcome {
            delivered,
            reordered,
        }
    }

    /// Deliver everything still queued, oldest deadline first.
    #[must_use]
    pub fn drain(&mut self) -> Vec<Response> {
        let mut rest = std::mem::take(&mut self.pending);
        rest.sort_by_key(|queued| queued.deliver_at_round);
        rest.into_iter().map(|queued| queued.response).collect()
    }
}

fn roll_delay(max: u8, rng: &mut DeterministicRng) -> u8 {
    let bound = u64::from(max).saturating_add(1);
    u8::try_from(rng.next_bounded(bound)).unwrap_or(max)
}

/// Put requests for the same line back into issue order, leaving the slots
/// each line occupies where they are.
fn keep_line_order(requests: &mut [Request]) {
    let mut slots: BTreeMap<MerchandiseId, Vec<usize>> = BTreeMap::new();
    for (idx, request) in requests.iter().enumerate() {
        slots.entry(request.line().clone()).or_default().push(idx);
    }
    for positions in slots.values().filter(|positions| positions.len() > 1) {
        let mut group: Vec<Request> = positions.iter().map(|&idx| requests[idx].clone()).collect();
        group.sort_by_key(|request| request.ticket.issued_at());
        for (&idx, request) in positions.iter().zip(group) {
            requests[idx] = request;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tote_core::{CartSynchronizer, MemoryCartIdStore, MutationRequest};
    use tote_core::backend::memory::MemoryBackend;
    use tote_core::CurrencyCode;

    fn ticket() -> Ticket {
        let usd = CurrencyCode::new("USD").expect("code");
        let mut sync = CartSynchronizer::new(
            MemoryBackend::new(usd.clone(), 0),
            MemoryCartIdStore::new(),
            usd,
        );
        sync.submit(MutationRequest::Add {
            merchandise_id: "sku".into(),
            quantity: 1,
            draft: None,
        })
        .expect("submit")
    }

    fn response() -> Response {
        Response {
            ticket: ticket(),
            outcome: Err(BackendError::Timeout),
        }
    }

    #[test]
    fn zero_delay_delivers_same_round() {
        let mut net = SimulatedNetwork::new(FaultConfig {
            max_delay_rounds: 0,
            ..FaultConfig::reorder_only()
        });
        let mut rng = DeterministicRng::new(1);
        assert_eq!(net.send(response(), 4, &mut rng), 0);
        assert_eq!(net.deliver_ready(4, &mut rng).delivered.len(), 1);
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn delayed_responses_wait() {
        let mut net = SimulatedNetwork::new(FaultConfig::reorder_only());
        let mut rng = DeterministicRng::new(9);
        let mut delays = Vec::new();
        for _ in 0..16 {
            delays.push(net.send(response(), 0, &mut rng));
        }
        assert!(delays.iter().all(|delay| *delay <= 3));

        let now = net.deliver_ready(0, &mut rng).delivered.len();
        let zero = delays.iter().filter(|delay| **delay == 0).count();
        assert_eq!(now, zero);
        assert_eq!(net.drain().len(), 16 - zero);
        assert_eq!(net.pending_len(), 0);
    }

    fn tickets(lines: &[&str]) -> Vec<Ticket> {
        let usd = CurrencyCode::new("USD").expect("code");
        let mut sync = CartSynchronizer::new(
            MemoryBackend::new(usd.clone(), 0),
            MemoryCartIdStore::new(),
            usd,
        );
        lines
            .iter()
            .map(|line| {
                sync.submit(MutationRequest::Add {
                    merchandise_id: (*line).into(),
                    quantity: 1,
                    draft: None,
                })
                .expect("submit")
            })
            .collect()
    }

    fn queue(net: &mut SimulatedNetwork, ticket: Ticket, commit_at_round: u64) {
        net.outbound.push(Outbound {
            commit_at_round,
            request: Request { ticket, fault: None },
        });
    }

    fn lines_of(requests: &[Request]) -> Vec<(String, u64)> {
        requests
            .iter()
            .map(|request| (request.line().to_string(), request.ticket.issued_at().0))
            .collect()
    }

    #[test]
    fn commits_across_lines_can_be_reversed() {
        let mut net = SimulatedNetwork::new(FaultConfig {
            reorder_rate_percent: 100,
            ..FaultConfig::reorder_only()
        });
        for ticket in tickets(&["a", "b", "c"]) {
            queue(&mut net, ticket, 0);
        }
        let outcome = net.commit_ready(0, &mut DeterministicRng::new(5));
        assert!(outcome.reordered);
        assert_eq!(
            lines_of(&outcome.committed),
            vec![("c".to_string(), 3), ("b".to_string(), 2), ("a".to_string(), 1)]
        );
        assert_eq!(net.outbound_len(), 0);
    }

    #[test]
    fn same_line_commits_keep_issue_order_when_reversed() {
        let mut net = SimulatedNetwork::new(FaultConfig {
            reorder_rate_percent: 100,
            ..FaultConfig::reorder_only()
        });
        for ticket in tickets(&["a", "a", "b"]) {
            queue(&mut net, ticket, 0);
        }
        let outcome = net.commit_ready(0, &mut DeterministicRng::new(5));
        assert_eq!(
            lines_of(&outcome.committed),
            vec![("b".to_string(), 3), ("a".to_string(), 1), ("a".to_string(), 2)]
        );
    }

    #[test]
    fn waiting_request_holds_back_its_line_only() {
        let mut net = SimulatedNetwork::new(FaultConfig::reorder_only());
        let mut rng = DeterministicRng::new(3);
        let mut issued = tickets(&["a", "a", "b"]).into_iter();
        queue(&mut net, issued.next().expect("a1"), 2);
        queue(&mut net, issued.next().expect("a2"), 0);
        queue(&mut net, issued.next().expect("b3"), 0);

        let now = net.commit_ready(0, &mut rng);
        assert_eq!(lines_of(&now.committed), vec![("b".to_string(), 3)]);
        assert_eq!(net.outbound_len(), 2);

        assert!(net.commit_ready(1, &mut rng).committed.is_empty());
        let later = net.commit_ready(2, &mut rng);
        let mut order = lines_of(&later.committed);
        order.sort_by_key(|(_, issued_at)| *issued_at);
        assert_eq!(order, vec![("a".to_string(), 1), ("a".to_string(), 2)]);
        assert!(net.drain_requests().is_empty());
    }

    #[test]
    fn submitted_requests_wait_their_delay() {
        let mut net = SimulatedNetwork::new(FaultConfig::reorder_only());
        let mut rng = DeterministicRng::new(11);
        let delays: Vec<u8> = tickets(&["a", "b", "c", "d", "e", "f"])
            .into_iter()
            .map(|ticket| net.submit(Request { ticket, fault: None }, 0, &mut rng))
            .collect();
        assert!(delays.iter().all(|delay| *delay <= 2));
        let drained = net.drain_requests();
        assert_eq!(drained.len(), 6);
        assert!(drained.windows(2).all(|pair| pair[0].ticket.issued_at() < pair[1].ticket.issued_at()));
    }

    #[test]
    fn no_faults_when_rates_are_zero() {
        let fault = FaultConfig::reorder_only();
        let mut rng = DeterministicRng::new(2);
        assert!((0..200).all(|_| fault.roll_request_fault(&mut rng).is_none()));
    }
}
