use archipelago::{
    mesh, Arrival, EmigrationPolicy, Engine, EngineConfig, Gene, ImmigrationPolicy, Init,
    IslandRunner, Migration, Progress, ReplaceWorst, RequestId, SendBest, Transport,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

// --- Mock Infrastructure ---

/// Transport whose completion behavior the test scripts by hand.
#[derive(Default)]
struct ScriptedState {
    complete_sends: bool,
    /// (dest, tag, genes) per posted send.
    posted_sends: Vec<(usize, u32, usize)>,
    inbox: VecDeque<(Vec<Gene>, usize, u32)>,
}

struct ScriptedTransport {
    rank: usize,
    world: usize,
    state: Arc<Mutex<ScriptedState>>,
    next_req: RequestId,
    recvs: HashMap<RequestId, usize>,
    sends: HashSet<RequestId>,
}

impl ScriptedTransport {
    fn new(rank: usize, world: usize) -> (Self, Arc<Mutex<ScriptedState>>) {
        let state = Arc::new(Mutex::new(ScriptedState::default()));
        let transport = Self {
            rank,
            world,
            state: state.clone(),
            next_req: 0,
            recvs: HashMap::new(),
            sends: HashSet::new(),
        };
        (transport, state)
    }

    fn fresh(&mut self) -> RequestId {
        self.next_req += 1;
        self.next_req
    }
}

impl Transport for ScriptedTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world
    }

    fn post_send(&mut self, genes: Vec<Gene>, dest: usize, tag: u32) -> RequestId {
        self.state.lock().unwrap().posted_sends.push((dest, tag, genes.len()));
        let req = self.fresh();
        self.sends.insert(req);
        req
    }

    fn post_recv(&mut self, max_genes: usize) -> RequestId {
        let req = self.fresh();
        self.recvs.insert(req, max_genes);
        req
    }

    fn test(&mut self, req: RequestId) -> Progress {
        if self.sends.contains(&req) {
            if self.state.lock().unwrap().complete_sends {
                self.sends.remove(&req);
                return Progress::Complete(None);
            }
            return Progress::Pending;
        }
        let Some(&max_genes) = self.recvs.get(&req) else {
            return Progress::Complete(None);
        };
        match self.state.lock().unwrap().inbox.pop_front() {
            Some((mut genes, source, tag)) => {
                self.recvs.remove(&req);
                genes.truncate(max_genes);
                Progress::Complete(Some(Arrival { genes, source, tag }))
            }
            None => Progress::Pending,
        }
    }
}

fn engine(seed: u64) -> Engine {
    Engine::new(EngineConfig { seed: Some(seed), ..Default::default() })
        .expect("engine construction should succeed")
}

fn sum_objective(genome: &[Gene]) -> f32 {
    genome.iter().sum()
}

// ============================================================================
// Single-slot emigration: drop-if-busy
// ============================================================================

#[test]
fn test_pending_emigration_blocks_further_sends() {
    let (transport, state) = ScriptedTransport::new(0, 2);
    let mut migration = Migration::new(transport, 8, 42);

    migration.emigration_tick(|boat| boat.extend_from_slice(&[1.0; 8]));
    assert_eq!(state.lock().unwrap().posted_sends.len(), 1);
    assert_eq!(migration.boats_sent(), 1);

    // Previous boat still in flight: the tick must not post another send.
    migration.emigration_tick(|boat| boat.extend_from_slice(&[2.0; 8]));
    migration.emigration_tick(|boat| boat.extend_from_slice(&[3.0; 8]));
    assert_eq!(
        state.lock().unwrap().posted_sends.len(),
        1,
        "a busy outbound slot must drop the tick"
    );
    assert_eq!(migration.boats_sent(), 1);
    assert_eq!(migration.dropped_ticks(), 2);

    // Completion frees the slot; the next tick posts again.
    state.lock().unwrap().complete_sends = true;
    migration.emigration_tick(|boat| boat.extend_from_slice(&[4.0; 8]));
    assert_eq!(state.lock().unwrap().posted_sends.len(), 2);
    assert_eq!(migration.boats_sent(), 2);
}

#[test]
fn test_emigration_is_noop_without_peers() {
    let (transport, state) = ScriptedTransport::new(0, 1);
    let mut migration = Migration::new(transport, 8, 42);

    migration.emigration_tick(|boat| boat.extend_from_slice(&[1.0; 8]));
    assert!(state.lock().unwrap().posted_sends.is_empty());
    assert_eq!(migration.boats_sent(), 0);
}

#[test]
fn test_emigration_never_targets_self() {
    let (transport, state) = ScriptedTransport::new(1, 4);
    state.lock().unwrap().complete_sends = true;
    let mut migration = Migration::new(transport, 4, 42);

    for _ in 0..50 {
        migration.emigration_tick(|boat| boat.extend_from_slice(&[0.0; 4]));
    }
    let state = state.lock().unwrap();
    assert_eq!(state.posted_sends.len(), 50);
    for &(dest, tag, _) in &state.posted_sends {
        assert_ne!(dest, 1, "a boat must never be sent to the local rank");
        assert_eq!(tag, 1, "boats carry the sender rank as tag");
    }
}

#[test]
fn test_boat_is_truncated_to_capacity() {
    let (transport, state) = ScriptedTransport::new(0, 2);
    let mut migration = Migration::new(transport, 8, 42);

    migration.emigration_tick(|boat| boat.extend_from_slice(&[1.0; 20]));
    assert_eq!(state.lock().unwrap().posted_sends[0].2, 8);
}

// ============================================================================
// Immigration: one integration per completed receive
// ============================================================================

#[test]
fn test_immigration_integrates_exactly_once_per_receive() {
    let (transport, state) = ScriptedTransport::new(0, 2);
    let mut migration = Migration::new(transport, 8, 42);
    let mut integrations = 0;

    state.lock().unwrap().inbox.push_back((vec![1.0; 8], 1, 1));
    migration.immigration_tick(|_| integrations += 1);
    assert_eq!(integrations, 1);
    assert_eq!(migration.boats_received(), 1);

    // Nothing in flight: the re-posted receive stays pending.
    migration.immigration_tick(|_| integrations += 1);
    migration.immigration_tick(|_| integrations += 1);
    assert_eq!(integrations, 1, "a pending receive must not re-integrate");

    state.lock().unwrap().inbox.push_back((vec![2.0; 8], 1, 1));
    migration.immigration_tick(|_| integrations += 1);
    assert_eq!(integrations, 2);
    assert_eq!(migration.boats_received(), 2);
}

// ============================================================================
// Host-side policies
// ============================================================================

#[test]
fn test_send_best_copies_top_scoring_genomes() {
    let mut engine = engine(42);
    engine.set_objective(|g: &[Gene]| g[0]);
    let id = engine.create_population(6, 4, Init::Random).unwrap();
    engine.run(0, None).unwrap(); // evaluation only

    let pop = engine.population(id);
    let mut order: Vec<usize> = (0..6).collect();
    order.sort_by(|&a, &b| pop.score()[b].partial_cmp(&pop.score()[a]).unwrap());

    let mut boat = Vec::new();
    SendBest.depart(pop, 2, &mut boat);
    assert_eq!(boat.len(), 2 * 4);
    assert_eq!(&boat[0..4], pop.genome(order[0]));
    assert_eq!(&boat[4..8], pop.genome(order[1]));
}

#[test]
fn test_replace_worst_overwrites_lowest_scoring_genomes() {
    let mut engine = engine(42);
    engine.set_objective(|g: &[Gene]| g[0]);
    let id = engine.create_population(6, 4, Init::Random).unwrap();
    engine.run(0, None).unwrap();

    let pop = engine.population(id);
    let mut order: Vec<usize> = (0..6).collect();
    order.sort_by(|&a, &b| pop.score()[a].partial_cmp(&pop.score()[b]).unwrap());
    let (worst, second_worst) = (order[0], order[1]);

    let arrival = Arrival { genes: vec![9.0, 9.0, 9.0, 9.0, 8.0, 8.0, 8.0, 8.0], source: 1, tag: 1 };
    ReplaceWorst.arrive(engine.population_mut(id), &arrival);

    let pop = engine.population(id);
    assert_eq!(pop.genome(worst), &[9.0; 4]);
    assert_eq!(pop.genome(second_worst), &[8.0; 4]);
}

// ============================================================================
// Channel mesh transport
// ============================================================================

#[test]
fn test_mesh_delivers_boats_with_source_and_tag() {
    let mut transports = mesh(2);
    let mut t1 = transports.pop().unwrap();
    let mut t0 = transports.pop().unwrap();

    let send_req = t0.post_send(vec![1.0, 2.0, 3.0, 4.0], 1, 0);
    assert!(matches!(t0.test(send_req), Progress::Complete(None)));

    let recv_req = t1.post_recv(4);
    match t1.test(recv_req) {
        Progress::Complete(Some(arrival)) => {
            assert_eq!(arrival.genes, vec![1.0, 2.0, 3.0, 4.0]);
            assert_eq!(arrival.source, 0);
            assert_eq!(arrival.tag, 0);
        }
        _ => panic!("boat should have been delivered"),
    }

    // A fresh receive with nothing queued stays pending.
    let empty_req = t1.post_recv(4);
    assert!(matches!(t1.test(empty_req), Progress::Pending));
}

#[test]
fn test_mesh_receive_truncates_oversized_boats() {
    let mut transports = mesh(2);
    let mut t1 = transports.pop().unwrap();
    let mut t0 = transports.pop().unwrap();

    t0.post_send(vec![7.0; 12], 1, 0);
    let req = t1.post_recv(8);
    match t1.test(req) {
        Progress::Complete(Some(arrival)) => assert_eq!(arrival.genes.len(), 8),
        _ => panic!("boat should have been delivered"),
    }
}

// ============================================================================
// End-to-end island exchange
// ============================================================================

#[test]
fn test_two_islands_both_send_and_receive() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut transports = mesh(2);
    let t1 = transports.pop().unwrap();
    let t0 = transports.pop().unwrap();

    let mut e0 = engine(1);
    e0.set_objective(sum_objective);
    e0.create_population(30, 8, Init::Random).unwrap();
    let mut e1 = engine(2);
    e1.set_objective(sum_objective);
    e1.create_population(30, 8, Init::Random).unwrap();

    let mut r0 = IslandRunner::new(&mut e0, t0, 3, 30.0).unwrap();
    let mut r1 = IslandRunner::new(&mut e1, t1, 3, 30.0).unwrap();

    for _ in 0..20 {
        r0.tick(&mut e0).unwrap();
        r1.tick(&mut e1).unwrap();
    }

    for (name, runner) in [("island 0", &r0), ("island 1", &r1)] {
        assert!(runner.boats_sent() >= 1, "{} posted no boat", name);
        assert!(runner.boats_received() >= 1, "{} received no boat", name);
    }
    assert_eq!(r0.generation(), 20);
}

/// Records the source rank of every integrated boat.
#[derive(Clone)]
struct RecordSources {
    seen: Arc<Mutex<HashSet<usize>>>,
}

impl ImmigrationPolicy for RecordSources {
    fn arrive(&mut self, _pop: &mut archipelago::Population, arrival: &Arrival) {
        assert_eq!(arrival.tag as usize, arrival.source, "tag must carry the sender rank");
        self.seen.lock().unwrap().insert(arrival.source);
    }
}

#[test]
fn test_four_islands_every_sender_reaches_every_receiver() {
    let transports = mesh(4);
    let mut engines = Vec::new();
    let mut runners = Vec::new();
    let mut seen = Vec::new();

    for (rank, transport) in transports.into_iter().enumerate() {
        let mut e = engine(100 + rank as u64);
        e.set_objective(sum_objective);
        e.create_population(20, 8, Init::Random).unwrap();
        let recorder = RecordSources { seen: Arc::new(Mutex::new(HashSet::new())) };
        seen.push(recorder.seen.clone());
        e.set_immigration(recorder);
        runners.push(IslandRunner::new(&mut e, transport, 1, 25.0).unwrap());
        engines.push(e);
    }

    for _ in 0..100 {
        for (runner, engine) in runners.iter_mut().zip(engines.iter_mut()) {
            runner.tick(engine).unwrap();
        }
    }

    for (rank, sources) in seen.iter().enumerate() {
        let sources = sources.lock().unwrap();
        for sender in 0..4 {
            if sender == rank {
                assert!(!sources.contains(&sender), "an island must not receive from itself");
            } else {
                assert!(
                    sources.contains(&sender),
                    "island {} never heard from island {}",
                    rank,
                    sender
                );
            }
        }
    }
}
