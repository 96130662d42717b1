// src/search/worker.rs
//! Search workers.
//!
//! A worker owns `parallelism` in-flight games and advances each by one
//! MCTS step per tick. A game whose leaf needs evaluation suspends into
//! `WaitingForPrediction`; once every runnable game has either finished
//! its step or suspended, the worker issues one batched predictor call,
//! distributes the results and resumes the suspended games. The primary
//! worker additionally carries the controller duties: time-control checks,
//! PV printing and flipping the stop flag.

use crate::config::EngineConfig;
use crate::position::Position;
use crate::predictor::{
    predict_batch_uniform, EncodedPosition, Predictor, PredictorError,
};
use crate::search::cache::PredictionCache;
use crate::search::coordinator::WorkCoordinator;
use crate::search::driver::SearchState;
use crate::search::game::{ExpandOutcome, SelfPlayGame};
use crate::search::node::{Expansion, Node, NodeRef, TerminalValue, Tree};
use crate::search::puct::{backprop_value_gate, PuctContext};
use crate::search::time::TimeControl;
use crate::search::{flip_value, VALUE_DRAW};
use crate::uci::MoveCodec;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfPlayState {
    Working,
    WaitingForPrediction,
    Finished,
}

struct PathStep {
    node: NodeRef,
    weight: i32,
}

/// One in-flight game plus its per-simulation scratch state.
struct GameSlot {
    game: SelfPlayGame,
    scratch: Position,
    state: SelfPlayState,
    search_path: Vec<PathStep>,
    image: EncodedPosition,
    simulation: i32,
    /// Self-play only: the slot owns its own tree.
    tree: Option<Tree>,
}

impl GameSlot {
    fn new(game: SelfPlayGame, tree: Option<Tree>) -> Self {
        let scratch = game.spawn_scratch();
        Self {
            game,
            scratch,
            state: SelfPlayState::Working,
            search_path: Vec::with_capacity(64),
            image: EncodedPosition::default(),
            simulation: 0,
            tree,
        }
    }
}

pub struct SelfPlayWorker {
    config: Arc<EngineConfig>,
    search_state: Arc<SearchState>,
    cache: Arc<PredictionCache>,
    slots: Vec<GameSlot>,
    rng: ChaCha8Rng,
    primary: bool,
    time_control: TimeControl,
    budget_ms: Option<i64>,
    search_start: Instant,
    last_print_nodes: i64,
    predictor_warned: bool,
}

impl SelfPlayWorker {
    pub fn new(
        config: Arc<EngineConfig>,
        search_state: Arc<SearchState>,
        cache: Arc<PredictionCache>,
        primary: bool,
        seed: u64,
    ) -> Self {
        Self {
            config,
            search_state,
            cache,
            slots: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            primary,
            time_control: TimeControl::default(),
            budget_ms: None,
            search_start: Instant::now(),
            last_print_nodes: 0,
            predictor_warned: false,
        }
    }

    /// UCI search: park at the barrier, run rounds until shutdown.
    pub fn search_loop(&mut self, coordinator: &WorkCoordinator, predictor: &dyn Predictor) {
        let mut generation = 0u64;
        while coordinator.wait_for_work_items(&mut generation) {
            self.initialize_search_games();
            if let Err(e) = self.run_search(coordinator, predictor) {
                tracing::error!(error = %e, "search aborted by predictor failure");
                coordinator.request_stop();
            }
            self.abandon_stalled_simulations();
            if self.primary {
                self.on_search_finished();
            }
            self.slots.clear();
            coordinator.on_work_item_completed();
        }
    }

    /// Self-play: every slot plays whole games until the stop flag flips.
    pub fn play_loop(&mut self, coordinator: &WorkCoordinator, predictor: &dyn Predictor) {
        let mut generation = 0u64;
        while coordinator.wait_for_work_items(&mut generation) {
            self.initialize_play_games();
            while !coordinator.should_stop() {
                let mut progressed = false;
                for index in 0..self.slots.len() {
                    if self.slots[index].state != SelfPlayState::Working {
                        continue;
                    }
                    if self.slots[index].simulation >= self.config.num_simulations {
                        self.play_move(index);
                        progressed = true;
                        continue;
                    }
                    progressed |= self.run_mcts(index);
                }
                if self.has_waiting_games() {
                    if self.predict_batch(predictor).is_err() {
                        break;
                    }
                    progressed = true;
                }
                if !progressed {
                    std::thread::yield_now();
                }
            }
            let _ = self.predict_batch(predictor);
            self.abandon_stalled_simulations();
            self.slots.clear();
            coordinator.on_work_item_completed();
        }
    }

    /// Simulations stalled on another worker's in-flight expansion cannot
    /// finish once the round ends; undo their virtual losses so the tree
    /// is quiescent at the barrier.
    fn abandon_stalled_simulations(&mut self) {
        let search_state = Arc::clone(&self.search_state);
        for slot in &mut self.slots {
            if !slot.search_path.is_empty() {
                fail_node(&search_state, slot);
            }
        }
    }

    fn initialize_search_games(&mut self) {
        let root = match self.search_state.tree.root() {
            Some(root) => NodeRef::new(root),
            None => return,
        };
        let position = self.search_state.position.lock().clone();
        self.time_control = *self.search_state.time_control.lock();
        self.search_start = *self.search_state.search_start.lock();
        self.budget_ms = self.time_control.budget_ms(
            position.side_to_move(),
            self.config.time_control_fraction_of_remaining,
            self.config.time_control_safety_buffer_milliseconds,
        );
        self.last_print_nodes = 0;
        self.slots = (0..self.config.search_parallelism)
            .map(|_| GameSlot::new(SelfPlayGame::new(position.clone(), root, true), None))
            .collect();
    }

    fn initialize_play_games(&mut self) {
        self.slots = (0..self.config.search_parallelism)
            .map(|_| Self::fresh_play_slot())
            .collect();
    }

    fn fresh_play_slot() -> GameSlot {
        let tree = Tree::new();
        tree.reset();
        let root = NodeRef::new(tree.root().expect("freshly reset tree has a root"));
        let game = SelfPlayGame::new(Position::startpos(), root, false);
        GameSlot::new(game, Some(tree))
    }

    fn run_search(
        &mut self,
        coordinator: &WorkCoordinator,
        predictor: &dyn Predictor,
    ) -> Result<(), PredictorError> {
        if self.slots.is_empty() {
            return Ok(());
        }
        while !coordinator.should_stop() {
            let mut progressed = false;
            for index in 0..self.slots.len() {
                if self.slots[index].state == SelfPlayState::Working {
                    progressed |= self.run_mcts(index);
                }
            }
            if self.primary {
                self.check_time_control(coordinator);
                self.check_update_gui(false);
            }
            if self.has_waiting_games() {
                self.predict_batch(predictor)?;
                progressed = true;
            }
            if !progressed {
                std::thread::yield_now();
            }
        }
        // Drain suspended games so every virtual loss is restored before
        // parking at the barrier.
        self.predict_batch(predictor)
    }

    fn has_waiting_games(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.state == SelfPlayState::WaitingForPrediction)
    }

    /// One MCTS step for one game: descend with virtual loss to a leaf,
    /// then expand-and-evaluate it. Returns whether any progress was made
    /// (an expansion race in another worker stalls the step).
    fn run_mcts(&mut self, index: usize) -> bool {
        let config = Arc::clone(&self.config);
        let search_state = Arc::clone(&self.search_state);
        let cache = Arc::clone(&self.cache);
        let slot = &mut self.slots[index];
        let rng = &mut self.rng;

        if slot.search_path.is_empty() {
            let root = slot.game.root();
            slot.scratch = slot.game.spawn_scratch();
            root.apply_virtual_loss();
            slot.search_path.push(PathStep {
                node: NodeRef::new(root),
                weight: 1,
            });
        }

        loop {
            let node: &Node = slot.search_path.last().unwrap().node.get();
            let known = node.terminal_value();
            if known.is_terminal() {
                complete_simulation(&config, &search_state, slot, known.immediate_value());
                return true;
            }

            if !node.is_expanded() {
                if node.expansion() == Expansion::Expanding {
                    // Another worker owns the expansion; wait-then-retry.
                    return false;
                }
                let is_root = slot.search_path.len() == 1;
                match slot.game.expand_and_evaluate(
                    node,
                    &slot.scratch,
                    is_root,
                    &cache,
                    &mut slot.image,
                    &config,
                    rng,
                ) {
                    ExpandOutcome::Suspended => {
                        slot.state = SelfPlayState::WaitingForPrediction;
                        return true;
                    }
                    ExpandOutcome::Value(value) => {
                        complete_simulation(&config, &search_state, slot, value);
                        return true;
                    }
                }
            }

            let depth = slot.search_path.len();
            let elimination_floor = if depth == 1 && slot.game.try_hard() {
                root_elimination_floor(&self.time_control, node)
            } else {
                None
            };
            let context = PuctContext::new(&config, node, elimination_floor);
            let selected = context.select_child();
            selected.node.apply_virtual_loss();

            let mv = match MoveCodec::token_to_move(selected.node.mv(), slot.scratch.board()) {
                Some(mv) => mv,
                None => {
                    // Contract break between tree and position collaborator.
                    debug_assert!(false, "undecodable move token during descent");
                    selected.node.revert_virtual_loss();
                    fail_node(&search_state, slot);
                    return true;
                }
            };
            slot.search_path.push(PathStep {
                node: NodeRef::new(selected.node),
                weight: selected.weight,
            });
            slot.scratch.apply_move(mv);
            search_state.observe_depth(slot.search_path.len() as u32 - 1);

            if slot.game.is_draw_by_twofold(&slot.scratch) {
                complete_simulation(&config, &search_state, slot, VALUE_DRAW);
                return true;
            }
        }
    }

    /// Batched predictor round-trip: re-check the cache for every waiting
    /// game (another worker may have published the position meanwhile),
    /// predict the remaining misses in one call, then resume and complete
    /// those simulations.
    fn predict_batch(&mut self, predictor: &dyn Predictor) -> Result<(), PredictorError> {
        let config = Arc::clone(&self.config);
        let search_state = Arc::clone(&self.search_state);
        let cache = Arc::clone(&self.cache);

        let waiting: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].state == SelfPlayState::WaitingForPrediction)
            .collect();
        if waiting.is_empty() {
            return Ok(());
        }

        let mut misses = Vec::with_capacity(waiting.len());
        for &index in &waiting {
            let hit = cache.lookup(self.slots[index].game.pending_fingerprint());
            let slot = &mut self.slots[index];
            let node = slot.search_path.last().unwrap().node;
            let is_root = slot.search_path.len() == 1;
            match hit {
                Some((value, priors)) => {
                    match slot.game.finish_expanding_cached(
                        node.get(),
                        value,
                        priors,
                        is_root,
                        &config,
                        &mut self.rng,
                    ) {
                        Some(value) => {
                            complete_simulation(&config, &search_state, slot, value);
                            slot.state = SelfPlayState::Working;
                        }
                        None => misses.push(index),
                    }
                }
                None => misses.push(index),
            }
        }
        if misses.is_empty() {
            return Ok(());
        }

        let inputs: Vec<EncodedPosition> = misses
            .iter()
            .map(|&i| self.slots[i].image.clone())
            .collect();
        let predictions = match predictor.predict(&inputs) {
            Ok(predictions) => {
                if predictions.len() != inputs.len() {
                    let e = PredictorError::BadShape {
                        expected: inputs.len(),
                        got: predictions.len(),
                    };
                    for &index in &misses {
                        fail_node(&search_state, &mut self.slots[index]);
                    }
                    return Err(e);
                }
                predictions
            }
            Err(PredictorError::Unavailable(message)) => {
                if !self.predictor_warned {
                    tracing::warn!(%message, "predictor unavailable, using uniform fallback");
                    self.predictor_warned = true;
                }
                search_state
                    .failed_node_count
                    .fetch_add(misses.len() as i64, std::sync::atomic::Ordering::Relaxed);
                predict_batch_uniform(inputs.len())
            }
            Err(e) => {
                for &index in &misses {
                    fail_node(&search_state, &mut self.slots[index]);
                }
                return Err(e);
            }
        };

        for (&index, prediction) in misses.iter().zip(predictions.iter()) {
            let slot = &mut self.slots[index];
            let node = slot.search_path.last().unwrap().node;
            let is_root = slot.search_path.len() == 1;
            let value = slot.game.finish_expanding(
                node.get(),
                prediction.value,
                &prediction.policy_logits,
                is_root,
                &cache,
                &config,
                &mut self.rng,
            );
            complete_simulation(&config, &search_state, slot, value);
            slot.state = SelfPlayState::Working;
        }
        Ok(())
    }

    /// Self-play: the slot reached its simulation budget, commit a move.
    fn play_move(&mut self, index: usize) {
        let config = Arc::clone(&self.config);
        let slot = &mut self.slots[index];

        let allow_diversity =
            slot.game.position.ply() < config.num_sampling_moves;
        let selected =
            select_move(&slot.game, allow_diversity, &mut self.rng).map(|c| c.mv());
        let Some(token) = selected else {
            slot.state = SelfPlayState::Finished;
            return;
        };
        let Some(mv) = MoveCodec::token_to_move(token, slot.game.position.board()) else {
            slot.state = SelfPlayState::Finished;
            return;
        };

        let tree = slot.tree.as_ref().expect("self-play slot owns its tree");
        tree.prune_except(token);
        let new_root = NodeRef::new(tree.root().expect("tree keeps a root after pruning"));
        slot.game.apply_move_with_root(mv, new_root);
        slot.simulation = 0;

        let finished = slot.game.position.terminal()
            != crate::position::TerminalClass::Ongoing
            || slot.game.position.ply() >= config.max_moves;
        if finished {
            let result = slot.game.complete();
            tracing::info!(
                result,
                plies = slot.game.ply_count(),
                "self-play game complete"
            );
            *slot = Self::fresh_play_slot();
        } else if slot.game.root().is_expanded() {
            slot.game.add_exploration_noise(&config, &mut self.rng);
        }
    }

    /// Primary-worker duty: compare the clocks and budgets against the
    /// search state and flip the stop flag once any budget is exhausted.
    /// The flag stays flipped until the next `go`.
    fn check_time_control(&mut self, coordinator: &WorkCoordinator) {
        let root = match self.search_state.tree.root() {
            Some(root) => root,
            None => return,
        };
        let tc = &self.time_control;

        // A root whose outcome is already decided has nothing to search.
        if root.terminal_value().is_immediate() {
            coordinator.request_stop();
            return;
        }
        if tc.mate > 0 {
            if let Some(n) = root.terminal_value().mate_n() {
                if i32::from(n) <= tc.mate {
                    coordinator.request_stop();
                    return;
                }
            }
        }
        let nodes = self
            .search_state
            .node_count
            .load(std::sync::atomic::Ordering::Relaxed);
        if tc.nodes > 0 && nodes >= tc.nodes {
            coordinator.request_stop();
            return;
        }
        if let Some(budget) = self.budget_ms {
            if self.search_start.elapsed().as_millis() as i64 >= budget {
                coordinator.request_stop();
                return;
            }
        }
        // Elimination: stop once no trailing root child can still catch
        // the leader within the remaining budget fraction.
        if tc.elimination_fraction > 0.0
            && root.visit_count() >= tc.elimination_root_visit_count
        {
            let mut best = 0i64;
            let mut second = 0i64;
            for child in root.children() {
                let visits = child.visit_count() as i64;
                if visits > best {
                    second = best;
                    best = visits;
                } else if visits > second {
                    second = visits;
                }
            }
            let reachable =
                second + (tc.elimination_fraction * root.visit_count() as f32) as i64;
            if best > 0 && reachable < best {
                coordinator.request_stop();
            }
        }
    }

    /// Primary-worker duty: print a PV line when the best move changed or
    /// enough nodes have passed since the last line.
    fn check_update_gui(&mut self, force: bool) {
        let nodes = self
            .search_state
            .node_count
            .load(std::sync::atomic::Ordering::Relaxed);
        let pv_changed = self
            .search_state
            .principle_variation_changed
            .swap(false, std::sync::atomic::Ordering::Relaxed);
        if !force
            && !pv_changed
            && nodes - self.last_print_nodes < self.config.search_gui_update_interval_nodes
        {
            return;
        }
        self.last_print_nodes = nodes;
        self.print_principal_variation();
    }

    /// Walk the advisory best-child chain, re-validating the root link by
    /// scanning, and print one UCI-shaped info line.
    fn print_principal_variation(&self) {
        let root = match self.search_state.tree.root() {
            Some(root) => root,
            None => return,
        };
        let mut position = self.search_state.position.lock().clone();
        let mut line = Vec::new();
        let mut node = root;
        loop {
            let next = if line.is_empty() {
                best_child_by_scan(node)
            } else {
                node.best_child()
            };
            let Some(next) = next else { break };
            let Some(mv) = MoveCodec::token_to_move(next.mv(), position.board()) else {
                break;
            };
            line.push(mv.to_string());
            position.apply_move(mv);
            node = next;
            if line.len() >= 32 {
                break;
            }
        }

        let nodes = self
            .search_state
            .node_count
            .load(std::sync::atomic::Ordering::Relaxed);
        let elapsed_ms = self.search_start.elapsed().as_millis().max(1) as i64;
        let nps = nodes * 1000 / elapsed_ms;
        let seldepth = self.search_state.max_selection_depth();
        let score = match root.terminal_value() {
            TerminalValue::MateIn(n) => format!("mate {}", n),
            TerminalValue::OpponentMateIn(n) => format!("mate -{}", n.max(1)),
            _ => format!("cp {}", value_to_centipawns(root.value())),
        };
        println!(
            "info depth {} seldepth {} multipv 1 nodes {} nps {} score {} pv {}",
            line.len().max(1),
            seldepth.max(line.len() as u32),
            nodes,
            nps,
            score,
            line.join(" ")
        );
    }

    /// Primary-worker duty once the stop flag is observed: final PV line
    /// plus the bestmove.
    fn on_search_finished(&mut self) {
        self.check_update_gui(true);
        let Some(root) = self.search_state.tree.root() else {
            println!("bestmove (none)");
            return;
        };
        let position = self.search_state.position.lock().clone();
        let best = best_child_by_scan(root)
            .and_then(|child| MoveCodec::token_to_move(child.mv(), position.board()));
        match best {
            Some(mv) => println!("bestmove {}", mv),
            None => println!("bestmove (none)"),
        }
    }
}

/// Visit accounting plus the weighted value samples for one finished
/// simulation, walking the recorded path leaf-to-root. Values alternate
/// perspective every ply; each node is credited from the point of view of
/// the player who moved into it (the root from its own side to move).
fn complete_simulation(
    config: &EngineConfig,
    search_state: &SearchState,
    slot: &mut GameSlot,
    leaf_value: f32,
) {
    let path = &slot.search_path;
    debug_assert!(!path.is_empty());
    let weight = path.last().unwrap().weight;
    let leaf_parity = (path.len() - 1) % 2;
    let threshold = config.backpropagation_puct_threshold;

    for i in (0..path.len()).rev() {
        let node = path[i].node.get();
        let pov = if i == 0 { 0 } else { i - 1 };
        let sample = if pov % 2 == leaf_parity {
            leaf_value
        } else {
            flip_value(leaf_value)
        };
        let credit = threshold <= 0.0
            || i == 0
            || backprop_value_gate(config, path[i - 1].node.get(), node, threshold);
        if credit {
            node.sample_value(
                config.moving_average_build,
                config.moving_average_cap,
                sample,
                weight,
            );
        }
        node.record_visit(weight);
    }

    if path.last().unwrap().node.get().terminal_value().is_terminal() {
        backpropagate_mate(path);
    }
    update_principal_variation(search_state, path);

    search_state
        .node_count
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    slot.search_path.clear();
    slot.simulation += 1;
}

/// Undo virtual losses along an aborted simulation without crediting any
/// value, leaving the tree consistent.
fn fail_node(search_state: &SearchState, slot: &mut GameSlot) {
    for step in &slot.search_path {
        step.node.get().revert_virtual_loss();
    }
    slot.search_path.clear();
    slot.game.abort_expansion();
    slot.state = SelfPlayState::Working;
    search_state
        .failed_node_count
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
}

/// Propagate proven mates up the path: a child that is opponent-mate-in-k
/// proves the parent mates in k+1 through it; when every reply is an own
/// mate for the opponent, the parent is opponent-mated one move later than
/// the longest defense.
fn backpropagate_mate(path: &[PathStep]) {
    for i in (0..path.len().saturating_sub(1)).rev() {
        let parent = path[i].node.get();
        let children = parent.children();
        if children.is_empty() {
            break;
        }
        let mut best_win: Option<(&Node, u8)> = None;
        let mut all_losing = true;
        let mut longest_loss = 0u8;
        for child in children {
            match child.terminal_value() {
                TerminalValue::OpponentMateIn(k) => {
                    if best_win.map_or(true, |(_, best)| k < best) {
                        best_win = Some((child, k));
                    }
                    all_losing = false;
                }
                TerminalValue::MateIn(n) => longest_loss = longest_loss.max(n),
                _ => all_losing = false,
            }
        }
        let promoted = if let Some((child, k)) = best_win {
            let promoted =
                parent.set_terminal_value(TerminalValue::MateIn(k.saturating_add(1)));
            if promoted {
                parent.set_best_child(child);
            }
            promoted
        } else if all_losing {
            parent.set_terminal_value(TerminalValue::OpponentMateIn(
                longest_loss.saturating_add(1),
            ))
        } else {
            false
        };
        if !promoted {
            break;
        }
    }
}

/// Refresh the advisory best-child pointers along the path; flags the
/// shared state when the root's best move changed.
fn update_principal_variation(search_state: &SearchState, path: &[PathStep]) {
    for i in (0..path.len().saturating_sub(1)).rev() {
        let parent = path[i].node.get();
        let child = path[i + 1].node.get();
        let replace = match parent.best_child() {
            None => true,
            Some(current) => {
                !std::ptr::eq(current as *const Node, child as *const Node)
                    && worse_than(current, child)
            }
        };
        if replace {
            parent.set_best_child(child);
            if i == 0 {
                search_state
                    .principle_variation_changed
                    .store(true, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
}

/// Move-quality ordering used for the PV and final move selection: proven
/// wins first (shorter mate first), proven losses last (longer defense
/// first), then tablebase rank, visit count and value.
pub fn worse_than(lhs: &Node, rhs: &Node) -> bool {
    fn class(node: &Node) -> i32 {
        match node.terminal_value() {
            TerminalValue::OpponentMateIn(_) => 2,
            TerminalValue::MateIn(_) => 0,
            _ => 1,
        }
    }
    let (lc, rc) = (class(lhs), class(rhs));
    if lc != rc {
        return lc < rc;
    }
    match (lhs.terminal_value(), rhs.terminal_value()) {
        (TerminalValue::OpponentMateIn(a), TerminalValue::OpponentMateIn(b)) if a != b => {
            return a > b;
        }
        (TerminalValue::MateIn(a), TerminalValue::MateIn(b)) if a != b => {
            return a < b;
        }
        _ => {}
    }
    if lhs.tablebase_rank() != rhs.tablebase_rank() {
        return lhs.tablebase_rank() < rhs.tablebase_rank();
    }
    if lhs.visit_count() != rhs.visit_count() {
        return lhs.visit_count() < rhs.visit_count();
    }
    lhs.value() < rhs.value()
}

/// Best root child by a full scan, bypassing the advisory pointer.
pub fn best_child_by_scan(parent: &Node) -> Option<&Node> {
    let children = parent.children();
    let mut best: Option<&Node> = None;
    for child in children {
        match best {
            None => best = Some(child),
            Some(current) if worse_than(current, child) => best = Some(child),
            _ => {}
        }
    }
    best
}

/// Pick the move to commit: visit-count argmax, or visit-proportional
/// sampling for early self-play diversity.
pub fn select_move<'a, R: Rng>(
    game: &'a SelfPlayGame,
    allow_diversity: bool,
    rng: &mut R,
) -> Option<&'a Node> {
    let children = game.root().children();
    if children.is_empty() {
        return None;
    }
    if allow_diversity {
        let total: i64 = children.iter().map(|c| c.visit_count() as i64).sum();
        if total > 0 {
            let mut pick = rng.gen_range(0..total);
            for child in children {
                pick -= child.visit_count() as i64;
                if pick < 0 {
                    return Some(child);
                }
            }
        }
    }
    best_child_by_scan(game.root())
}

/// Minimum visit count a root child needs to remain selectable once the
/// elimination budget is in effect.
fn root_elimination_floor(tc: &TimeControl, root: &Node) -> Option<i32> {
    if tc.elimination_fraction <= 0.0 {
        return None;
    }
    let root_visits = root.visit_count();
    if root_visits < tc.elimination_root_visit_count {
        return None;
    }
    let best = root
        .children()
        .iter()
        .map(Node::visit_count)
        .max()
        .unwrap_or(0);
    let floor = best - (tc.elimination_fraction * root_visits as f32) as i32;
    (floor > 0).then_some(floor)
}

/// Lc0-style mapping from an expected score in [0, 1] to centipawns.
pub fn value_to_centipawns(value: f32) -> i32 {
    let q = (2.0 * value - 1.0).clamp(-0.999, 0.999);
    (90.0 * (1.5637 * q).tan()).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centipawn_mapping_is_symmetric() {
        assert_eq!(value_to_centipawns(0.5), 0);
        assert_eq!(
            value_to_centipawns(0.7),
            -value_to_centipawns(0.3)
        );
        assert!(value_to_centipawns(0.95) > 300);
    }

    #[test]
    fn worse_than_prefers_wins_and_short_mates() {
        let a = Node::new_child(1, 0.5, 0.5);
        let b = Node::new_child(2, 0.5, 0.5);
        a.set_terminal_value(TerminalValue::OpponentMateIn(3));
        b.set_terminal_value(TerminalValue::OpponentMateIn(1));
        assert!(worse_than(&a, &b));
        assert!(!worse_than(&b, &a));

        let c = Node::new_child(3, 0.5, 0.5);
        c.record_visit(100);
        assert!(worse_than(&c, &a));
    }

    #[test]
    fn worse_than_prefers_longer_defense() {
        let a = Node::new_child(1, 0.5, 0.5);
        let b = Node::new_child(2, 0.5, 0.5);
        a.set_terminal_value(TerminalValue::MateIn(1));
        b.set_terminal_value(TerminalValue::MateIn(5));
        assert!(worse_than(&a, &b));
    }
}
