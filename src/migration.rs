//! Asynchronous island migration.
//!
//! Each process keeps at most one outstanding emigration and one
//! outstanding immigration. The single-slot policy bounds in-flight state:
//! an emigration tick that finds the previous boat still in flight is a
//! silent no-op, and a receive stays posted until a boat lands. Neither
//! side ever blocks the evolutionary pipeline; progress is made by later
//! ticks testing the posted requests. A peer that never completes leaks
//! its slot until teardown and nothing more.
//!
//! The transport is abstract: the engine assumes only non-blocking send,
//! non-blocking receive, and a test-for-completion primitive.
//! [`ChannelTransport`] is the in-process reference implementation.

use crate::population::{Gene, Population};
use log::debug;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

/// Opaque handle to a posted transfer. Freed by the transport once `test`
/// reports it complete.
pub type RequestId = u64;

/// A completed inbound transfer.
pub struct Arrival {
    pub genes: Vec<Gene>,
    /// Sender's rank.
    pub source: usize,
    pub tag: u32,
}

/// Observable state of a posted request.
pub enum Progress {
    Pending,
    /// Receives complete with an [`Arrival`]; sends with `None`.
    Complete(Option<Arrival>),
}

/// Non-blocking message passing between islands.
pub trait Transport: Send {
    /// This process's rank in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of participating processes.
    fn size(&self) -> usize;

    fn post_send(&mut self, genes: Vec<Gene>, dest: usize, tag: u32) -> RequestId;

    /// Posts a receive from any source, any tag, for up to `max_genes`.
    fn post_recv(&mut self, max_genes: usize) -> RequestId;

    fn test(&mut self, req: RequestId) -> Progress;
}

/// Single-slot send/receive state machines over a [`Transport`].
pub struct Migration<T: Transport> {
    transport: T,
    boat_genes: usize,
    inbound: Option<RequestId>,
    outbound: Option<RequestId>,
    rng: Pcg64,
    boats_sent: usize,
    boats_received: usize,
    dropped_ticks: usize,
}

impl<T: Transport> Migration<T> {
    /// `boat_genes` is the boat capacity: migrants-per-boat times genome
    /// length. `seed` drives destination selection.
    pub fn new(transport: T, boat_genes: usize, seed: u64) -> Self {
        Self {
            transport,
            boat_genes,
            inbound: None,
            outbound: None,
            rng: Pcg64::seed_from_u64(seed),
            boats_sent: 0,
            boats_received: 0,
            dropped_ticks: 0,
        }
    }

    pub fn boats_sent(&self) -> usize {
        self.boats_sent
    }

    pub fn boats_received(&self) -> usize {
        self.boats_received
    }

    /// Emigration ticks skipped because the previous boat was in flight.
    pub fn dropped_ticks(&self) -> usize {
        self.dropped_ticks
    }

    /// Keeps one receive posted and invokes `on_arrival` exactly once per
    /// completed transfer. Never blocks.
    pub fn immigration_tick(&mut self, on_arrival: impl FnOnce(&Arrival)) {
        let req = match self.inbound {
            Some(req) => req,
            None => {
                let req = self.transport.post_recv(self.boat_genes);
                self.inbound = Some(req);
                req
            }
        };
        match self.transport.test(req) {
            Progress::Pending => {}
            Progress::Complete(Some(arrival)) => {
                debug!(
                    "rank {}: boat received, {} genes from rank {}",
                    self.transport.rank(),
                    arrival.genes.len(),
                    arrival.source
                );
                on_arrival(&arrival);
                self.boats_received += 1;
                self.inbound = None;
            }
            Progress::Complete(None) => {
                self.inbound = None;
            }
        }
    }

    /// Posts one boat to a uniformly random peer, filling it through
    /// `fill`. While the previous send is in flight the tick is a no-op
    /// and this cadence's boat is dropped. Never blocks.
    pub fn emigration_tick(&mut self, fill: impl FnOnce(&mut Vec<Gene>)) {
        if self.transport.size() < 2 {
            return;
        }
        if let Some(req) = self.outbound {
            match self.transport.test(req) {
                Progress::Pending => {
                    self.dropped_ticks += 1;
                    return;
                }
                Progress::Complete(_) => self.outbound = None,
            }
        }

        let dest = self.pick_destination();
        let mut boat = Vec::with_capacity(self.boat_genes);
        fill(&mut boat);
        boat.truncate(self.boat_genes);

        debug!(
            "rank {}: boat departing, {} genes to rank {}",
            self.transport.rank(),
            boat.len(),
            dest
        );
        let tag = self.transport.rank() as u32;
        let req = self.transport.post_send(boat, dest, tag);
        self.outbound = Some(req);
        self.boats_sent += 1;
    }

    fn pick_destination(&mut self) -> usize {
        let n = self.transport.size();
        let me = self.transport.rank();
        loop {
            let dest = self.rng.random_range(0..n);
            if dest != me {
                return dest;
            }
        }
    }
}

/// Fills the outbound boat from the local population.
pub trait EmigrationPolicy: Send {
    fn depart(&mut self, pop: &Population, migrants: usize, boat: &mut Vec<Gene>);
}

/// Integrates a just-received boat into the local population.
pub trait ImmigrationPolicy: Send {
    fn arrive(&mut self, pop: &mut Population, arrival: &Arrival);
}

/// Copies the best-scoring `migrants` genomes into the boat.
pub struct SendBest;

impl EmigrationPolicy for SendBest {
    fn depart(&mut self, pop: &Population, migrants: usize, boat: &mut Vec<Gene>) {
        for i in rank_by_score(pop.score(), false).into_iter().take(migrants) {
            boat.extend_from_slice(pop.genome(i));
        }
    }
}

/// Overwrites the worst-scoring genomes with the boat's contents.
pub struct ReplaceWorst;

impl ImmigrationPolicy for ReplaceWorst {
    fn arrive(&mut self, pop: &mut Population, arrival: &Arrival) {
        let len = pop.genome_len();
        let incoming = (arrival.genes.len() / len).min(pop.size());
        let order = rank_by_score(pop.score(), true);
        for (slot, idx) in order.into_iter().take(incoming).enumerate() {
            pop.genome_mut(idx)
                .copy_from_slice(&arrival.genes[slot * len..(slot + 1) * len]);
        }
    }
}

fn rank_by_score(score: &[f32], ascending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..score.len()).collect();
    order.sort_by(|&a, &b| {
        let ord = score[a]
            .partial_cmp(&score[b])
            .unwrap_or(std::cmp::Ordering::Equal);
        if ascending {
            ord
        } else {
            ord.reverse()
        }
    });
    order
}

struct Boat {
    genes: Vec<Gene>,
    source: usize,
    tag: u32,
}

/// In-process reference transport: a fully connected mesh of channels.
/// Sends complete on post; receives complete once a boat is queued. An
/// inbox whose peers are all gone simply stays pending.
pub struct ChannelTransport {
    rank: usize,
    peers: Vec<Sender<Boat>>,
    inbox: Receiver<Boat>,
    next_req: RequestId,
    pending_recvs: HashMap<RequestId, usize>,
}

/// Builds a mesh of `n` connected endpoints, one per rank.
pub fn mesh(n: usize) -> Vec<ChannelTransport> {
    let (senders, inboxes): (Vec<_>, Vec<_>) = (0..n).map(|_| channel()).unzip();
    inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ChannelTransport {
            rank,
            peers: senders.clone(),
            inbox,
            next_req: 0,
            pending_recvs: HashMap::new(),
        })
        .collect()
}

impl ChannelTransport {
    fn fresh(&mut self) -> RequestId {
        self.next_req += 1;
        self.next_req
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn post_send(&mut self, genes: Vec<Gene>, dest: usize, tag: u32) -> RequestId {
        // A gone peer swallows the boat; local evolution is unaffected.
        let _ = self.peers[dest].send(Boat { genes, source: self.rank, tag });
        self.fresh()
    }

    fn post_recv(&mut self, max_genes: usize) -> RequestId {
        let req = self.fresh();
        self.pending_recvs.insert(req, max_genes);
        req
    }

    fn test(&mut self, req: RequestId) -> Progress {
        let Some(&max_genes) = self.pending_recvs.get(&req) else {
            // Sends complete on post.
            return Progress::Complete(None);
        };
        match self.inbox.try_recv() {
            Ok(boat) => {
                self.pending_recvs.remove(&req);
                let mut genes = boat.genes;
                genes.truncate(max_genes);
                Progress::Complete(Some(Arrival { genes, source: boat.source, tag: boat.tag }))
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Progress::Pending,
        }
    }
}
