// src/search/game.rs
//! One in-flight game: a root pointer into the shared tree, a scratch
//! position advanced along the current simulation path, and the suspension
//! state needed to resume an expansion after a predictor round-trip.
//!
//! The only suspension point in a simulation is `expand_and_evaluate` on a
//! cache miss: the pre-computed legal moves, the fingerprint and the
//! reserved cache slot are parked on the game, the worker records the
//! encoded input in its batch slot, and `finish_expanding` picks the work
//! back up once the batch returns.

use crate::config::EngineConfig;
use crate::position::{Position, TerminalClass};
use crate::predictor::EncodedPosition;
use crate::search::cache::{CacheStore, PredictionCache, MAX_CACHED_PRIORS};
use crate::search::node::{allocate_children, Node, NodeRef, TerminalValue};
use crate::search::{VALUE_DRAW, VALUE_LOSE, VALUE_WIN};
use crate::uci::MoveCodec;
use chess::{ChessMove, Color};
use rand::Rng;
use rand_distr::{Distribution, Gamma};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandPhase {
    Fresh,
    AwaitingPrediction,
}

pub enum ExpandOutcome {
    /// Expansion finished (or the node was terminal); backpropagate this.
    Value(f32),
    /// Cache miss: the input is in the batch slot, resume after predicting.
    Suspended,
}

pub struct SelfPlayGame {
    root: NodeRef,
    pub position: Position,
    search_root_ply: u32,
    try_hard: bool,
    phase: ExpandPhase,
    pending_fingerprint: u64,
    pending_moves: Vec<ChessMove>,
    cache_store: Option<CacheStore>,
    mcts_values: Vec<f32>,
    moves_played: Vec<ChessMove>,
    result: f32,
}

impl SelfPlayGame {
    pub fn new(position: Position, root: NodeRef, try_hard: bool) -> Self {
        let search_root_ply = position.ply();
        Self {
            root,
            position,
            search_root_ply,
            try_hard,
            phase: ExpandPhase::Fresh,
            pending_fingerprint: 0,
            pending_moves: Vec::new(),
            cache_store: None,
            mcts_values: Vec::new(),
            moves_played: Vec::new(),
            result: -1.0,
        }
    }

    #[inline]
    pub fn root(&self) -> &Node {
        self.root.get()
    }

    pub fn set_root(&mut self, root: NodeRef) {
        self.root = root;
        self.search_root_ply = self.position.ply();
    }

    #[inline]
    pub fn try_hard(&self) -> bool {
        self.try_hard
    }

    #[inline]
    pub fn phase(&self) -> ExpandPhase {
        self.phase
    }

    #[inline]
    pub fn pending_fingerprint(&self) -> u64 {
        self.pending_fingerprint
    }

    /// Fresh scratch position for one simulation descent. Scratch games
    /// never alter shared storage.
    pub fn spawn_scratch(&self) -> Position {
        self.position.clone()
    }

    /// Expand a leaf, evaluating it through cache or predictor.
    ///
    /// Terminal positions set their terminal value and return immediately;
    /// no children are created. A cache hit completes the expansion
    /// inline. A miss parks the suspension state and returns `Suspended`
    /// after writing the encoded input into `image_slot`.
    #[allow(clippy::too_many_arguments)]
    pub fn expand_and_evaluate<R: Rng>(
        &mut self,
        node: &Node,
        scratch: &Position,
        is_root: bool,
        cache: &PredictionCache,
        image_slot: &mut EncodedPosition,
        config: &EngineConfig,
        rng: &mut R,
    ) -> ExpandOutcome {
        debug_assert_eq!(self.phase, ExpandPhase::Fresh);

        let known = node.terminal_value();
        if known.is_terminal() {
            return ExpandOutcome::Value(known.immediate_value());
        }
        if node.is_expanded() {
            // Another worker finished the whole expansion since selection.
            return ExpandOutcome::Value(node.value());
        }

        match scratch.terminal() {
            TerminalClass::Checkmate => {
                node.set_terminal_value(TerminalValue::OpponentMateIn(0));
                return ExpandOutcome::Value(VALUE_LOSE);
            }
            TerminalClass::Stalemate | TerminalClass::DrawByRule => {
                node.set_terminal_value(TerminalValue::Draw);
                return ExpandOutcome::Value(VALUE_DRAW);
            }
            TerminalClass::Ongoing => {}
        }

        let fingerprint = scratch.fingerprint();
        let legal_moves = scratch.legal_moves();
        let ply_from_root = scratch.ply().saturating_sub(self.search_root_ply);
        let use_cache = ply_from_root <= config.prediction_cache_max_ply
            && legal_moves.len() <= MAX_CACHED_PRIORS;

        if use_cache {
            if let Some((value, priors)) = cache.lookup(fingerprint) {
                if priors.len() == legal_moves.len() {
                    let value = self.finish_expansion(
                        node,
                        &legal_moves,
                        priors,
                        value,
                        is_root,
                        config,
                        rng,
                    );
                    return ExpandOutcome::Value(value);
                }
            }
        }

        self.pending_fingerprint = fingerprint;
        self.pending_moves = legal_moves;
        self.cache_store = if use_cache {
            cache.reserve(fingerprint)
        } else {
            None
        };
        image_slot.tokens.clear();
        image_slot
            .tokens
            .extend_from_slice(scratch.token_history());
        self.phase = ExpandPhase::AwaitingPrediction;
        ExpandOutcome::Suspended
    }

    /// Resume after the predictor batch returned: renormalize priors over
    /// the legal moves recorded before suspension, publish into the
    /// reserved cache slot, and finish the expansion.
    pub fn finish_expanding<R: Rng>(
        &mut self,
        node: &Node,
        value: f32,
        policy_logits: &[f32],
        is_root: bool,
        cache: &PredictionCache,
        config: &EngineConfig,
        rng: &mut R,
    ) -> f32 {
        debug_assert_eq!(self.phase, ExpandPhase::AwaitingPrediction);
        let priors = softmax_over_legal(&self.pending_moves, policy_logits);
        if let Some(handle) = self.cache_store.take() {
            cache.store(handle, value, &priors);
        }
        let moves = std::mem::take(&mut self.pending_moves);
        self.phase = ExpandPhase::Fresh;
        self.finish_expansion(node, &moves, priors, value, is_root, config, rng)
    }

    /// Resume from a cache hit observed at batch time: the priors are
    /// already renormalized over this position's legal moves. `None` when
    /// the cached entry does not match the pending move count.
    pub fn finish_expanding_cached<R: Rng>(
        &mut self,
        node: &Node,
        value: f32,
        priors: Vec<f32>,
        is_root: bool,
        config: &EngineConfig,
        rng: &mut R,
    ) -> Option<f32> {
        debug_assert_eq!(self.phase, ExpandPhase::AwaitingPrediction);
        if priors.len() != self.pending_moves.len() {
            return None;
        }
        self.cache_store = None;
        let moves = std::mem::take(&mut self.pending_moves);
        self.phase = ExpandPhase::Fresh;
        Some(self.finish_expansion(node, &moves, priors, value, is_root, config, rng))
    }

    /// Drop any parked suspension state after an aborted simulation.
    pub fn abort_expansion(&mut self) {
        self.phase = ExpandPhase::Fresh;
        self.pending_moves.clear();
        self.cache_store = None;
    }

    /// Take expansion ownership and publish the child array. Losing the
    /// ownership race discards the local priors and keeps the evaluated
    /// value; the winner's children appear shortly.
    fn finish_expansion<R: Rng>(
        &mut self,
        node: &Node,
        moves: &[ChessMove],
        mut priors: Vec<f32>,
        value: f32,
        is_root: bool,
        config: &EngineConfig,
        rng: &mut R,
    ) -> f32 {
        if !node.try_begin_expansion() {
            return value;
        }
        if is_root {
            mix_exploration_noise(
                &mut priors,
                config.root_dirichlet_alpha,
                config.root_exploration_fraction,
                rng,
            );
        }
        let entries: Vec<(u16, f32)> = moves
            .iter()
            .zip(priors)
            .map(|(mv, p)| (MoveCodec::move_to_token(mv), p))
            .collect();
        let (children, count) = allocate_children(&entries, value);
        node.publish_children(children, count);
        value
    }

    /// Twofold repetition relative to the search root: scored as a draw
    /// for this simulation without marking the node, since the verdict
    /// depends on the path that reached it.
    pub fn is_draw_by_twofold(&self, scratch: &Position) -> bool {
        scratch.is_draw_by_twofold(self.search_root_ply)
    }

    /// Re-mix Dirichlet noise into an already-expanded root, used when a
    /// self-play game advances and reuses the chosen subtree as its next
    /// root.
    pub fn add_exploration_noise<R: Rng>(&self, config: &EngineConfig, rng: &mut R) {
        let children = self.root().children();
        if children.is_empty() {
            return;
        }
        let mut priors: Vec<f32> = children.iter().map(Node::prior).collect();
        mix_exploration_noise(
            &mut priors,
            config.root_dirichlet_alpha,
            config.root_exploration_fraction,
            rng,
        );
        for (child, prior) in children.iter().zip(priors) {
            child.set_prior(prior);
        }
    }

    /// `go searchmoves`: zero priors of unlisted root moves and
    /// renormalize. Ignored when it would zero everything.
    pub fn filter_root_moves(&self, search_moves: &[u16]) {
        if search_moves.is_empty() {
            return;
        }
        let children = self.root().children();
        let kept_mass: f32 = children
            .iter()
            .filter(|c| search_moves.contains(&c.mv()))
            .map(|c| c.prior())
            .sum();
        let kept_count = children
            .iter()
            .filter(|c| search_moves.contains(&c.mv()))
            .count();
        if kept_count == 0 {
            return;
        }
        for child in children {
            if !search_moves.contains(&child.mv()) {
                child.set_prior(0.0);
            } else if kept_mass > 0.0 {
                child.set_prior(child.prior() / kept_mass);
            } else {
                child.set_prior(1.0 / kept_count as f32);
            }
        }
    }

    /// Advance the game to the position after `mv`, reusing `new_root`'s
    /// subtree as the next search root.
    pub fn apply_move_with_root(&mut self, mv: ChessMove, new_root: NodeRef) {
        self.mcts_values.push(self.root().value());
        self.moves_played.push(mv);
        self.position.apply_move(mv);
        self.set_root(new_root);
    }

    #[inline]
    pub fn ply_count(&self) -> usize {
        self.moves_played.len()
    }

    /// Final game result from white's perspective; call once the position
    /// is terminal or the move cap is hit.
    pub fn complete(&mut self) -> f32 {
        self.result = match self.position.terminal() {
            TerminalClass::Checkmate => {
                if self.position.side_to_move() == Color::White {
                    VALUE_LOSE
                } else {
                    VALUE_WIN
                }
            }
            _ => VALUE_DRAW,
        };
        self.result
    }

    #[inline]
    pub fn result(&self) -> f32 {
        self.result
    }
}

/// Softmax of the predictor's logits restricted to the legal moves, in
/// legal-move order. Degenerate logits fall back to uniform.
pub fn softmax_over_legal(moves: &[ChessMove], logits: &[f32]) -> Vec<f32> {
    let gathered: Vec<f32> = moves
        .iter()
        .map(|mv| {
            logits
                .get(MoveCodec::move_to_token(mv) as usize)
                .copied()
                .unwrap_or(0.0)
        })
        .collect();
    let max = gathered
        .iter()
        .copied()
        .filter(|l| l.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![1.0 / moves.len().max(1) as f32; moves.len()];
    }
    let mut out: Vec<f32> = gathered.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = out.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return vec![1.0 / moves.len().max(1) as f32; moves.len()];
    }
    for p in &mut out {
        *p /= sum;
    }
    out
}

/// Mix Dirichlet(alpha) noise into `priors` with the given fraction.
fn mix_exploration_noise<R: Rng>(priors: &mut [f32], alpha: f32, fraction: f32, rng: &mut R) {
    if priors.is_empty()
        || !(alpha.is_finite() && alpha > 0.0)
        || !(0.0..=1.0).contains(&fraction)
        || fraction == 0.0
    {
        return;
    }
    let gamma = match Gamma::new(alpha as f64, 1.0) {
        Ok(gamma) => gamma,
        Err(_) => return,
    };
    let samples: Vec<f64> = priors.iter().map(|_| gamma.sample(rng)).collect();
    let sum: f64 = samples.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return;
    }
    for (prior, sample) in priors.iter_mut().zip(samples) {
        *prior = (1.0 - fraction) * *prior + fraction * (sample / sum) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::node::Tree;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn softmax_is_normalized_over_legal_moves() {
        let position = Position::startpos();
        let moves = position.legal_moves();
        let mut logits = vec![0.0f32; crate::predictor::POLICY_SIZE];
        logits[MoveCodec::move_to_token(&moves[0]) as usize] = 2.0;
        let priors = softmax_over_legal(&moves, &logits);
        assert_eq!(priors.len(), moves.len());
        let sum: f32 = priors.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(priors[0] > priors[1]);
    }

    #[test]
    fn terminal_expansion_creates_no_children() {
        let tree = Tree::new();
        tree.reset();
        let root = tree.root().unwrap();
        let position = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        let cache = PredictionCache::with_chunks(4);
        let config = EngineConfig::default();
        let mut game =
            SelfPlayGame::new(position.clone(), NodeRef::new(root), true);
        let mut image = EncodedPosition::default();
        let outcome = game.expand_and_evaluate(
            root,
            &position,
            true,
            &cache,
            &mut image,
            &config,
            &mut rng(),
        );
        match outcome {
            ExpandOutcome::Value(v) => assert!((v - VALUE_DRAW).abs() < f32::EPSILON),
            ExpandOutcome::Suspended => panic!("terminal position must not suspend"),
        }
        assert_eq!(root.terminal_value(), TerminalValue::Draw);
        assert!(root.children().is_empty());
    }

    #[test]
    fn cache_miss_suspends_and_resume_expands() {
        let tree = Tree::new();
        tree.reset();
        let root = tree.root().unwrap();
        let position = Position::startpos();
        let cache = PredictionCache::with_chunks(4);
        let config = EngineConfig::default();
        let mut game = SelfPlayGame::new(position.clone(), NodeRef::new(root), true);
        let mut image = EncodedPosition::default();
        let mut rng = rng();

        let outcome = game.expand_and_evaluate(
            root, &position, false, &cache, &mut image, &config, &mut rng,
        );
        assert!(matches!(outcome, ExpandOutcome::Suspended));
        assert_eq!(game.phase(), ExpandPhase::AwaitingPrediction);

        let logits = vec![0.0f32; crate::predictor::POLICY_SIZE];
        let value =
            game.finish_expanding(root, 0.5, &logits, false, &cache, &config, &mut rng);
        assert!((value - 0.5).abs() < f32::EPSILON);
        assert_eq!(root.children().len(), 20);
        let prior_sum: f32 = root.children().iter().map(Node::prior).sum();
        assert!((prior_sum - 1.0).abs() < 1e-5);

        // The reserved slot was published: a second lookup hits.
        assert!(cache.lookup(position.fingerprint()).is_some());
    }

    #[test]
    fn search_moves_filter_renormalizes() {
        let tree = Tree::new();
        tree.reset();
        let root = tree.root().unwrap();
        let position = Position::startpos();
        let cache = PredictionCache::with_chunks(4);
        let config = EngineConfig::default();
        let mut game = SelfPlayGame::new(position.clone(), NodeRef::new(root), true);
        let mut image = EncodedPosition::default();
        let mut rng = rng();
        let outcome = game.expand_and_evaluate(
            root, &position, false, &cache, &mut image, &config, &mut rng,
        );
        assert!(matches!(outcome, ExpandOutcome::Suspended));
        let logits = vec![0.0f32; crate::predictor::POLICY_SIZE];
        game.finish_expanding(root, 0.5, &logits, false, &cache, &config, &mut rng);

        let kept = root.children()[3].mv();
        game.filter_root_moves(&[kept]);
        let sum: f32 = root.children().iter().map(Node::prior).sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(root.children()[3].prior() > 0.99);
    }
}
