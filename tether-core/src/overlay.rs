//! Speculative overlay: the single apply / commit / rollback primitive.
//!
//! Every optimistic mutation in Tether (reaction toggles, votes, comment
//! appends) goes through an [`Overlay`]. The overlay keeps the last
//! confirmed value plus a ledger of still-pending speculative mutations;
//! the visible state is always the confirmed value with the pending
//! mutations replayed in issue order. The caller:
//!
//! 1. calls [`Overlay::apply`] with the local guess of the backend's rule,
//!    receiving a [`Ticket`] for the pending entry;
//! 2. issues the backend call;
//! 3. on success calls [`Overlay::on_success`] with the authoritative
//!    value, which becomes the new confirmed baseline (the local guess is
//!    discarded even if it matches);
//! 4. on failure calls [`Overlay::on_failure`], which removes exactly that
//!    ticket's mutation from the ledger and recomputes the visible state.
//!
//! Rolling back by removal, not by snapshot restore, is what keeps
//! overlapping mutations independent: when every pending call fails, the
//! ledger empties and the visible state is the untouched baseline again,
//! with no ghost of any failed guess.
//!
//! Outcomes settle in arrival order, not issue order. A success also
//! discards every older pending entry (the authoritative value subsumes
//! them); once it has settled, an older call's late outcome is reported as
//! [`Settled::Superseded`] and must be discarded by the caller (logged,
//! never surfaced).

use std::fmt;

/// One pending speculative mutation, replayable on recompute.
type Mutation<T> = Box<dyn Fn(&T) -> T + Send>;

/// A speculative overlay over one authoritative value.
pub struct Overlay<T> {
    confirmed: T,
    visible: T,
    pending: Vec<(u64, Mutation<T>)>,
    next_seq: u64,
    last_success_seq: u64,
}

/// Receipt for one speculative application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    seq: u64,
}

impl Ticket {
    /// The issue sequence number of this application.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// How an arriving outcome was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The outcome was applied to the visible state.
    Applied,
    /// A newer success already settled; this outcome was discarded.
    Superseded,
}

impl<T: Clone> Overlay<T> {
    /// Create an overlay with the given confirmed baseline.
    pub fn new(baseline: T) -> Self {
        Self {
            confirmed: baseline.clone(),
            visible: baseline,
            pending: Vec::new(),
            next_seq: 0,
            last_success_seq: 0,
        }
    }

    /// The currently visible (possibly speculative) state.
    pub fn visible(&self) -> &T {
        &self.visible
    }

    /// Number of backend calls issued but not yet settled.
    pub fn in_flight(&self) -> u32 {
        self.pending.len() as u32
    }

    /// Record `mutate` as a pending speculative mutation, apply it to the
    /// visible state, and return its ticket. A second `apply` before the
    /// first settles builds on the current speculative state, so
    /// overlapping toggles compose.
    pub fn apply(&mut self, mutate: impl Fn(&T) -> T + Send + 'static) -> Ticket {
        self.next_seq += 1;
        self.visible = mutate(&self.visible);
        self.pending.push((self.next_seq, Box::new(mutate)));
        Ticket { seq: self.next_seq }
    }

    /// Settle a successful backend response for the given ticket.
    ///
    /// The authoritative value becomes the confirmed baseline and every
    /// pending entry up to and including this ticket is discarded (their
    /// effects, applied or not, are subsumed by the server's answer);
    /// newer pending guesses are replayed on top.
    pub fn on_success(&mut self, ticket: &Ticket, authoritative: T) -> Settled {
        if ticket.seq < self.last_success_seq {
            return Settled::Superseded;
        }
        self.pending.retain(|(seq, _)| *seq > ticket.seq);
        self.confirmed = authoritative;
        self.last_success_seq = ticket.seq;
        self.recompute();
        Settled::Applied
    }

    /// Settle a failed backend response, removing exactly that ticket's
    /// mutation from the ledger. Other pending guesses stay visible.
    pub fn on_failure(&mut self, ticket: Ticket) -> Settled {
        if ticket.seq < self.last_success_seq {
            return Settled::Superseded;
        }
        self.pending.retain(|(seq, _)| *seq != ticket.seq);
        self.recompute();
        Settled::Applied
    }

    /// Replace the baseline with a poll-delivered authoritative value.
    ///
    /// Skipped while a mutation is in flight: the speculative state stays
    /// visible until the mutation settles through its own ticket. Returns
    /// whether the value was applied.
    pub fn reconcile(&mut self, authoritative: T) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        self.confirmed = authoritative.clone();
        self.visible = authoritative;
        true
    }

    fn recompute(&mut self) {
        self.visible = self
            .pending
            .iter()
            .fold(self.confirmed.clone(), |state, (_, mutate)| mutate(&state));
    }
}

impl<T: fmt::Debug> fmt::Debug for Overlay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("confirmed", &self.confirmed)
            .field("visible", &self.visible)
            .field("in_flight", &self.pending.len())
            .finish()
    }
}
