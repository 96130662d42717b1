// src/search/driver.rs
//! Search driver: owns the worker threads, the shared tree and the
//! per-search state.
//!
//! The UCI thread acts as the controller: it mutates positions, prunes the
//! tree and expands the root only while every worker is parked at the
//! barrier, then releases a work generation. The primary worker carries
//! the periodic duties (time control, PV printing) from there, so the
//! controller stays responsive for `stop`.

use crate::config::EngineConfig;
use crate::position::{Position, PositionError};
use crate::predictor::{predict_batch_uniform, EncodedPosition, Predictor, PredictorError};
use crate::search::cache::PredictionCache;
use crate::search::coordinator::WorkCoordinator;
use crate::search::game::{ExpandOutcome, SelfPlayGame};
use crate::search::node::{Node, NodeRef, Tree};
use crate::search::time::TimeControl;
use crate::search::worker::{best_child_by_scan, SelfPlayWorker};
use crate::syzygy::SyzygyTablebase;
use crate::uci::MoveCodec;
use chess::ChessMove;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Predictor(#[from] PredictorError),
}

/// State shared by all workers for one search. Atomic fields are touched
/// by everyone; the mutex-guarded fields are written only by the
/// controller while workers are parked.
pub struct SearchState {
    pub tree: Tree,
    pub position: Mutex<Position>,
    pub search_moves: Mutex<Vec<u16>>,
    pub search_start: Mutex<Instant>,
    pub time_control: Mutex<TimeControl>,
    pub node_count: AtomicI64,
    pub failed_node_count: AtomicI64,
    pub tablebase_hit_count: AtomicI64,
    max_selection_depth: AtomicU32,
    pub debug: AtomicBool,
    pub principle_variation_changed: AtomicBool,
}

impl SearchState {
    pub fn new() -> Self {
        let tree = Tree::new();
        tree.reset();
        Self {
            tree,
            position: Mutex::new(Position::startpos()),
            search_moves: Mutex::new(Vec::new()),
            search_start: Mutex::new(Instant::now()),
            time_control: Mutex::new(TimeControl::default()),
            node_count: AtomicI64::new(0),
            failed_node_count: AtomicI64::new(0),
            tablebase_hit_count: AtomicI64::new(0),
            max_selection_depth: AtomicU32::new(0),
            debug: AtomicBool::new(false),
            principle_variation_changed: AtomicBool::new(false),
        }
    }

    /// Controller-only, workers parked: arm the state for a new `go`.
    pub fn reset(&self, time_control: TimeControl) {
        self.node_count.store(0, Ordering::Relaxed);
        self.failed_node_count.store(0, Ordering::Relaxed);
        self.tablebase_hit_count.store(0, Ordering::Relaxed);
        self.max_selection_depth.store(0, Ordering::Relaxed);
        self.principle_variation_changed.store(false, Ordering::Relaxed);
        *self.time_control.lock() = time_control;
        *self.search_start.lock() = Instant::now();
    }

    #[inline]
    pub fn observe_depth(&self, depth: u32) {
        self.max_selection_depth.fetch_max(depth, Ordering::Relaxed);
    }

    #[inline]
    pub fn max_selection_depth(&self) -> u32 {
        self.max_selection_depth.load(Ordering::Relaxed)
    }
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

enum WorkerMode {
    Search,
    SelfPlay,
}

/// Spawns and owns the worker threads plus everything they share.
pub struct WorkerGroup {
    config: Arc<EngineConfig>,
    coordinator: Arc<WorkCoordinator>,
    search_state: Arc<SearchState>,
    cache: Arc<PredictionCache>,
    predictor: Arc<dyn Predictor>,
    tablebase: Option<SyzygyTablebase>,
    threads: Vec<JoinHandle<()>>,
    /// Base FEN (None = startpos) and the moves applied on top, kept to
    /// detect position extensions for tree reuse.
    applied: Mutex<(Option<String>, Vec<ChessMove>)>,
}

impl WorkerGroup {
    pub fn new(config: EngineConfig, predictor: Arc<dyn Predictor>) -> Self {
        let cache = Arc::new(PredictionCache::new(
            config.prediction_cache_request_gibibytes,
            config.prediction_cache_min_gibibytes,
        ));
        Self::spawn(config, predictor, cache, WorkerMode::Search)
    }

    /// Search group over a caller-supplied prediction cache, so the cache
    /// can outlive the group.
    pub fn with_cache(
        config: EngineConfig,
        predictor: Arc<dyn Predictor>,
        cache: Arc<PredictionCache>,
    ) -> Self {
        Self::spawn(config, predictor, cache, WorkerMode::Search)
    }

    /// Self-play group: `num_workers` threads each driving
    /// `search_parallelism` games until [`WorkerGroup::stop`].
    pub fn new_self_play(config: EngineConfig, predictor: Arc<dyn Predictor>) -> Self {
        let cache = Arc::new(PredictionCache::new(
            config.prediction_cache_request_gibibytes,
            config.prediction_cache_min_gibibytes,
        ));
        let group = Self::spawn(config, predictor, cache, WorkerMode::SelfPlay);
        group
            .coordinator
            .generate_work(group.config.num_workers);
        group
    }

    fn spawn(
        config: EngineConfig,
        predictor: Arc<dyn Predictor>,
        cache: Arc<PredictionCache>,
        mode: WorkerMode,
    ) -> Self {
        if let Err(e) = predictor.warm_up() {
            tracing::warn!(error = %e, "predictor warm-up failed");
        }
        let tablebase = config.syzygy_path.as_ref().and_then(|path| {
            match SyzygyTablebase::new(path) {
                Ok(tb) => Some(tb),
                Err(e) => {
                    tracing::warn!(error = %e, "tablebase probing disabled");
                    None
                }
            }
        });

        let config = Arc::new(config);
        let coordinator = Arc::new(WorkCoordinator::new());
        let search_state = Arc::new(SearchState::new());

        let worker_count = match mode {
            WorkerMode::Search => config.search_threads,
            WorkerMode::SelfPlay => config.num_workers,
        };
        let mut threads = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let mut worker = SelfPlayWorker::new(
                Arc::clone(&config),
                Arc::clone(&search_state),
                Arc::clone(&cache),
                i == 0,
                0xD1E7_C437 ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
            );
            let coordinator = Arc::clone(&coordinator);
            let predictor = Arc::clone(&predictor);
            let play = matches!(mode, WorkerMode::SelfPlay);
            let handle = std::thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || {
                    if play {
                        worker.play_loop(&coordinator, predictor.as_ref());
                    } else {
                        worker.search_loop(&coordinator, predictor.as_ref());
                    }
                })
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }

        Self {
            config,
            coordinator,
            search_state,
            cache,
            predictor,
            tablebase,
            threads,
            applied: Mutex::new((None, Vec::new())),
        }
    }

    #[inline]
    pub fn search_state(&self) -> &SearchState {
        &self.search_state
    }

    #[inline]
    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop any running search and wait until the workers are parked, so
    /// controller mutations never race the tree.
    fn interrupt(&self) {
        self.coordinator.request_stop();
        self.coordinator.wait_for_workers();
    }

    /// `ucinewgame`: drop the tree and reset the cache (throttled).
    pub fn new_game(&self) {
        self.interrupt();
        self.search_state.tree.reset();
        self.cache.clear();
        *self.search_state.position.lock() = Position::startpos();
        *self.applied.lock() = (None, Vec::new());
    }

    /// Apply a UCI position. When the new position extends the previous
    /// one, the chosen subtrees are reused move by move instead of
    /// rebuilding the tree.
    pub fn set_position(&self, fen: Option<&str>, moves: &[&str]) -> Result<(), SearchError> {
        self.interrupt();
        let mut applied = self.applied.lock();

        let same_base = applied.0.as_deref() == fen;
        let is_extension = same_base
            && moves.len() >= applied.1.len()
            && applied
                .1
                .iter()
                .zip(moves.iter())
                .all(|(prev, text)| prev.to_string() == *text);

        if is_extension {
            let mut position = self.search_state.position.lock().clone();
            let start = applied.1.len();
            for text in &moves[start..] {
                let mv = position.apply_uci_move(text)?;
                self.search_state
                    .tree
                    .prune_except(MoveCodec::move_to_token(&mv));
                applied.1.push(mv);
            }
            *self.search_state.position.lock() = position;
            return Ok(());
        }

        let mut position = match fen {
            Some(fen) => Position::from_fen(fen)?,
            None => Position::startpos(),
        };
        let mut parsed = Vec::with_capacity(moves.len());
        for text in moves {
            parsed.push(position.apply_uci_move(text)?);
        }
        self.search_state.tree.reset();
        *self.search_state.position.lock() = position;
        *applied = (fen.map(str::to_string), parsed);
        Ok(())
    }

    /// `go`: reset shared state, prepare the root, release the barrier.
    /// Returns immediately; the primary worker prints info lines and the
    /// final bestmove.
    pub fn go(&self, time_control: TimeControl, search_moves: &[&str]) -> Result<(), SearchError> {
        self.interrupt();
        self.coordinator.clear_stop();
        self.search_state.reset(time_control);
        self.prepare_root(search_moves)?;
        self.coordinator.generate_work(self.config.search_threads);
        Ok(())
    }

    /// Expand the root on the controller before workers start, so the
    /// first tick never races on the root expansion; then apply the
    /// searchmoves filter and tablebase bounds to the fresh children.
    fn prepare_root(&self, search_moves: &[&str]) -> Result<(), SearchError> {
        if self.search_state.tree.root().is_none() {
            self.search_state.tree.reset();
        }
        let root = match self.search_state.tree.root() {
            Some(root) => root,
            None => return Ok(()),
        };
        let position = self.search_state.position.lock().clone();

        let tokens: Vec<u16> = search_moves
            .iter()
            .filter_map(|text| {
                let mv = ChessMove::from_str(text).ok()?;
                position.board().legal(mv).then(|| MoveCodec::move_to_token(&mv))
            })
            .collect();
        *self.search_state.search_moves.lock() = tokens.clone();

        let mut game = SelfPlayGame::new(position.clone(), NodeRef::new(root), true);
        if !root.is_expanded() && !root.terminal_value().is_terminal() {
            let scratch = position.clone();
            let mut image = EncodedPosition::default();
            let mut rng = ChaCha8Rng::from_entropy();
            if let ExpandOutcome::Suspended = game.expand_and_evaluate(
                root,
                &scratch,
                true,
                &self.cache,
                &mut image,
                &self.config,
                &mut rng,
            ) {
                let predictions = match self.predictor.predict(std::slice::from_ref(&image)) {
                    Ok(p) if p.len() == 1 => p,
                    Ok(p) => {
                        return Err(PredictorError::BadShape {
                            expected: 1,
                            got: p.len(),
                        }
                        .into())
                    }
                    Err(PredictorError::Unavailable(message)) => {
                        tracing::warn!(%message, "predictor unavailable for root expansion");
                        self.search_state
                            .failed_node_count
                            .fetch_add(1, Ordering::Relaxed);
                        predict_batch_uniform(1)
                    }
                    Err(e) => return Err(e.into()),
                };
                game.finish_expanding(
                    root,
                    predictions[0].value,
                    &predictions[0].policy_logits,
                    true,
                    &self.cache,
                    &self.config,
                    &mut rng,
                );
            }
        }
        if !tokens.is_empty() {
            game.filter_root_moves(&tokens);
        }
        self.probe_root_tablebase(&position, root);
        Ok(())
    }

    /// Bound the root children with WDL probes where tables cover the
    /// position. Probe failure is soft: no information, no bound.
    fn probe_root_tablebase(&self, position: &Position, root: &Node) {
        let Some(tablebase) = &self.tablebase else {
            return;
        };
        if !tablebase.can_probe(position.board()) {
            return;
        }
        for child in root.children() {
            let Some(mv) = MoveCodec::token_to_move(child.mv(), position.board()) else {
                continue;
            };
            let after = position.board().make_move_new(mv);
            if let Some(wdl) = tablebase.probe_wdl(&after) {
                let ours = wdl.negate();
                let (score, bound) = ours.value_bound();
                child.set_tablebase_score_bound(ours.rank(), score, bound);
                self.search_state
                    .tablebase_hit_count
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Flip the stop flag; workers finish their current simulations and
    /// park, the primary prints bestmove on the way out.
    pub fn stop(&self) {
        self.coordinator.request_stop();
    }

    /// Block until every worker is parked.
    pub fn wait(&self) {
        self.coordinator.wait_for_workers();
    }

    pub fn set_debug(&self, debug: bool) {
        self.search_state.debug.store(debug, Ordering::Relaxed);
    }

    /// Best root move by the final move-quality ordering; valid once
    /// workers are parked.
    pub fn best_root_move(&self) -> Option<ChessMove> {
        let root = self.search_state.tree.root()?;
        let position = self.search_state.position.lock().clone();
        best_child_by_scan(root)
            .and_then(|child| MoveCodec::token_to_move(child.mv(), position.board()))
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        self.coordinator.shut_down();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.search_state.tree.prune_all();
    }
}
