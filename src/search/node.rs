// src/search/node.rs
//! Tree nodes and tree memory.
//!
//! Nodes are 64 bytes, 64-byte aligned, and mutated exclusively through
//! atomics so any number of workers can traverse and update the tree
//! concurrently. A node's children live in one contiguous heap array owned
//! by the parent; the array is fully written before `expansion` is
//! release-stored to `Expanded`, and readers pair that with an acquire load
//! before touching the pointer. Structural mutation (pruning, root
//! replacement) happens only while every worker is parked at the barrier.

use crate::search::{VALUE_DRAW, VALUE_LOSE, VALUE_WIN};
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU16, AtomicU32, AtomicU8, Ordering};

/// Lock-free f32 over a 32-bit atomic, updated by compare-and-swap.
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// CAS loop applying `f` to the current value; returns the new value.
    #[inline]
    pub fn update(&self, f: impl Fn(f32) -> f32) -> f32 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let new = f(f32::from_bits(current));
            match self.bits.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return new,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Game-theoretic value of a node, once known.
///
/// Mate distances are in fullmoves of the side to move at the node. A
/// checkmated node is `OpponentMateIn(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalValue {
    NonTerminal,
    Draw,
    MateIn(u8),
    OpponentMateIn(u8),
}

impl TerminalValue {
    const TAG_NONE: u16 = 0x0000;
    const TAG_DRAW: u16 = 0x0100;
    const TAG_MATE: u16 = 0x0200;
    const TAG_OPPONENT_MATE: u16 = 0x0300;

    #[inline]
    pub fn to_bits(self) -> u16 {
        match self {
            TerminalValue::NonTerminal => Self::TAG_NONE,
            TerminalValue::Draw => Self::TAG_DRAW,
            TerminalValue::MateIn(n) => Self::TAG_MATE | n as u16,
            TerminalValue::OpponentMateIn(n) => Self::TAG_OPPONENT_MATE | n as u16,
        }
    }

    #[inline]
    pub fn from_bits(bits: u16) -> Self {
        let n = (bits & 0x00FF) as u8;
        match bits & 0xFF00 {
            Self::TAG_DRAW => TerminalValue::Draw,
            Self::TAG_MATE => TerminalValue::MateIn(n),
            Self::TAG_OPPONENT_MATE => TerminalValue::OpponentMateIn(n),
            _ => TerminalValue::NonTerminal,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, TerminalValue::NonTerminal)
    }

    /// Draws and already-delivered mates end a simulation on the spot.
    #[inline]
    pub fn is_immediate(self) -> bool {
        matches!(self, TerminalValue::Draw | TerminalValue::OpponentMateIn(0))
    }

    pub fn mate_n(self) -> Option<u8> {
        match self {
            TerminalValue::MateIn(n) => Some(n),
            _ => None,
        }
    }

    pub fn opponent_mate_n(self) -> Option<u8> {
        match self {
            TerminalValue::OpponentMateIn(n) => Some(n),
            _ => None,
        }
    }

    /// Backpropagation sample for a node whose outcome is known, from the
    /// perspective of the side to move at the node.
    #[inline]
    pub fn immediate_value(self) -> f32 {
        match self {
            TerminalValue::Draw => VALUE_DRAW,
            TerminalValue::MateIn(_) => VALUE_WIN,
            TerminalValue::OpponentMateIn(_) => VALUE_LOSE,
            TerminalValue::NonTerminal => VALUE_DRAW,
        }
    }

    /// Selection score for a proven outcome: any own mate beats every
    /// non-terminal value, shorter mates beat longer ones, and the margin
    /// scales with the exploration rate so mate ordering survives the
    /// exploration bonus.
    pub fn mate_score(self, exploration_rate: f32) -> f32 {
        match self {
            TerminalValue::MateIn(n) => VALUE_WIN + exploration_rate / n.max(1) as f32,
            TerminalValue::OpponentMateIn(n) => {
                VALUE_LOSE - exploration_rate / (n as f32 + 1.0)
            }
            _ => VALUE_DRAW,
        }
    }

    /// Whether `incoming` is allowed to replace `self`: mates only ever get
    /// shorter once proven, opponent mates only ever get delayed, and no
    /// terminal value reverts to non-terminal.
    fn accepts(self, incoming: TerminalValue) -> bool {
        match (self, incoming) {
            (_, TerminalValue::NonTerminal) => false,
            (TerminalValue::NonTerminal, _) => true,
            (TerminalValue::Draw, _) => false,
            (TerminalValue::MateIn(k), TerminalValue::MateIn(j)) => j < k,
            (TerminalValue::MateIn(_), _) => false,
            (TerminalValue::OpponentMateIn(_), TerminalValue::MateIn(_)) => true,
            (TerminalValue::OpponentMateIn(k), TerminalValue::OpponentMateIn(j)) => j > k,
            (TerminalValue::OpponentMateIn(_), TerminalValue::Draw) => false,
        }
    }
}

/// Expansion protocol state; the None → Expanding transition is a CAS so
/// exactly one worker allocates children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Expansion {
    None = 0,
    Expanding = 1,
    Expanded = 2,
}

/// Tablebase bound on a node's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    None = 0,
    Lower = 1,
    Upper = 2,
    Exact = 3,
}

impl Bound {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Bound::Lower,
            2 => Bound::Upper,
            3 => Bound::Exact,
            _ => Bound::None,
        }
    }
}

#[repr(C, align(64))]
pub struct Node {
    /// Owning pointer to a contiguous array of `child_count` children;
    /// published with `expansion`.
    children: AtomicPtr<Node>,
    /// Advisory most-promising child, used to build the principal
    /// variation without rescanning; re-validated by the PV printer.
    best_child: AtomicPtr<Node>,
    /// Completed simulations through this node.
    visit_count: AtomicI32,
    value_average: AtomicF32,
    value_weight: AtomicI32,
    /// Cumulative weight this subtree has contributed upward.
    up_weight: AtomicI32,
    child_count: AtomicU32,
    tablebase_rank: AtomicI32,
    tablebase_score: AtomicF32,
    prior: AtomicF32,
    /// Encoded move leading from the parent to this node.
    mv: u16,
    /// Simulations currently traversing this node (virtual loss).
    visiting_count: AtomicU16,
    terminal_value: AtomicU16,
    expansion: AtomicU8,
    tablebase_bound: AtomicU8,
}

const _: () = assert!(std::mem::size_of::<Node>() == 64);
const _: () = assert!(std::mem::align_of::<Node>() == 64);

impl Node {
    pub fn new_root() -> Self {
        Self::new_child(0, 1.0, VALUE_DRAW)
    }

    pub fn new_child(mv: u16, prior: f32, first_play_urgency: f32) -> Self {
        Self {
            children: AtomicPtr::new(ptr::null_mut()),
            best_child: AtomicPtr::new(ptr::null_mut()),
            visit_count: AtomicI32::new(0),
            value_average: AtomicF32::new(first_play_urgency),
            value_weight: AtomicI32::new(0),
            up_weight: AtomicI32::new(0),
            child_count: AtomicU32::new(0),
            tablebase_rank: AtomicI32::new(0),
            tablebase_score: AtomicF32::new(0.0),
            prior: AtomicF32::new(prior),
            mv,
            visiting_count: AtomicU16::new(0),
            terminal_value: AtomicU16::new(TerminalValue::NonTerminal.to_bits()),
            expansion: AtomicU8::new(Expansion::None as u8),
            tablebase_bound: AtomicU8::new(Bound::None as u8),
        }
    }

    /// Move out of `source` for root replacement: the children array (and
    /// the advisory best-child pointer into it) transfers to the new node,
    /// leaving `source` childless so a subsequent prune skips it.
    pub fn detach(source: &Node) -> Self {
        let children = source.children.swap(ptr::null_mut(), Ordering::AcqRel);
        Self {
            children: AtomicPtr::new(children),
            best_child: AtomicPtr::new(source.best_child.load(Ordering::Relaxed)),
            visit_count: AtomicI32::new(source.visit_count.load(Ordering::Relaxed)),
            value_average: AtomicF32::new(source.value_average.load()),
            value_weight: AtomicI32::new(source.value_weight.load(Ordering::Relaxed)),
            up_weight: AtomicI32::new(source.up_weight.load(Ordering::Relaxed)),
            child_count: AtomicU32::new(source.child_count.load(Ordering::Relaxed)),
            tablebase_rank: AtomicI32::new(source.tablebase_rank.load(Ordering::Relaxed)),
            tablebase_score: AtomicF32::new(source.tablebase_score.load()),
            prior: AtomicF32::new(source.prior.load()),
            mv: source.mv,
            visiting_count: AtomicU16::new(0),
            terminal_value: AtomicU16::new(source.terminal_value.load(Ordering::Relaxed)),
            expansion: AtomicU8::new(source.expansion.load(Ordering::Acquire)),
            tablebase_bound: AtomicU8::new(source.tablebase_bound.load(Ordering::Relaxed)),
        }
    }

    #[inline]
    pub fn mv(&self) -> u16 {
        self.mv
    }

    #[inline]
    pub fn prior(&self) -> f32 {
        self.prior.load()
    }

    /// Priors are rewritten only while workers are parked (root noise,
    /// searchmoves filtering).
    #[inline]
    pub fn set_prior(&self, prior: f32) {
        self.prior.store(prior);
    }

    #[inline]
    pub fn visit_count(&self) -> i32 {
        self.visit_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn visiting_count(&self) -> u16 {
        self.visiting_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn value_weight(&self) -> i32 {
        self.value_weight.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn up_weight(&self) -> i32 {
        self.up_weight.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value_average.load()
    }

    /// Mean value adjusted by virtual loss, so concurrent simulations
    /// disperse instead of piling onto the same child.
    pub fn value_with_virtual_loss(&self, virtual_loss_coefficient: f32) -> f32 {
        let visiting = self.visiting_count() as f32;
        let weight = self.value_weight() as f32;
        let value = self.value_average.load();
        let denominator = weight + visiting;
        if denominator <= 0.0 {
            return value;
        }
        (value * weight - virtual_loss_coefficient * visiting) / denominator
    }

    /// Clamp a value into the tablebase bound interval, if any.
    pub fn tablebase_bounded_value(&self, value: f32) -> f32 {
        let score = self.tablebase_score.load();
        match Bound::from_bits(self.tablebase_bound.load(Ordering::Relaxed)) {
            Bound::None => value,
            Bound::Lower => value.max(score),
            Bound::Upper => value.min(score),
            Bound::Exact => score,
        }
    }

    pub fn set_tablebase_score_bound(&self, rank: i32, score: f32, bound: Bound) {
        self.tablebase_rank.store(rank, Ordering::Relaxed);
        self.tablebase_score.store(score);
        self.tablebase_bound.store(bound as u8, Ordering::Relaxed);
    }

    #[inline]
    pub fn tablebase_rank(&self) -> i32 {
        self.tablebase_rank.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn terminal_value(&self) -> TerminalValue {
        TerminalValue::from_bits(self.terminal_value.load(Ordering::Relaxed))
    }

    /// Install a terminal value, keeping mate distances monotone: own mates
    /// only shorten, opponent mates only lengthen, nothing reverts.
    pub fn set_terminal_value(&self, value: TerminalValue) -> bool {
        self.terminal_value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                TerminalValue::from_bits(bits)
                    .accepts(value)
                    .then_some(value.to_bits())
            })
            .is_ok()
    }

    #[inline]
    pub fn expansion(&self) -> Expansion {
        match self.expansion.load(Ordering::Acquire) {
            1 => Expansion::Expanding,
            2 => Expansion::Expanded,
            _ => Expansion::None,
        }
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.expansion.load(Ordering::Acquire) == Expansion::Expanded as u8
    }

    /// CAS None → Expanding; the winner allocates children, losers use the
    /// winner's published result.
    #[inline]
    pub fn try_begin_expansion(&self) -> bool {
        self.expansion
            .compare_exchange(
                Expansion::None as u8,
                Expansion::Expanding as u8,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Publish a fully written child array. Release pairs with the acquire
    /// in `children()`.
    pub fn publish_children(&self, children: *mut Node, count: u32) {
        self.children.store(children, Ordering::Relaxed);
        self.child_count.store(count, Ordering::Relaxed);
        self.expansion
            .store(Expansion::Expanded as u8, Ordering::Release);
    }

    pub fn children(&self) -> &[Node] {
        if !self.is_expanded() {
            return &[];
        }
        let ptr = self.children.load(Ordering::Relaxed);
        if ptr.is_null() {
            return &[];
        }
        let count = self.child_count.load(Ordering::Relaxed) as usize;
        // SAFETY: the array was fully initialized before the release store
        // observed by is_expanded(), and is only freed while workers are
        // parked.
        unsafe { std::slice::from_raw_parts(ptr, count) }
    }

    pub fn child_by_move(&self, mv: u16) -> Option<&Node> {
        self.children().iter().find(|c| c.mv == mv)
    }

    #[inline]
    pub fn best_child(&self) -> Option<&Node> {
        // SAFETY: best_child always points into this node's live child
        // array (or is null).
        unsafe { self.best_child.load(Ordering::Relaxed).as_ref() }
    }

    #[inline]
    pub fn set_best_child(&self, child: &Node) {
        self.best_child
            .store(child as *const Node as *mut Node, Ordering::Relaxed);
    }

    #[inline]
    pub fn apply_virtual_loss(&self) {
        self.visiting_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn revert_virtual_loss(&self) {
        let _ = self
            .visiting_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Fold one weighted sample into the capped running mean. The weight
    /// grows by `weight × build` per sample until `cap`, after which old
    /// samples decay exponentially. The two atomics are updated
    /// independently; the aggregate is eventually consistent.
    pub fn sample_value(&self, build: f32, cap: f32, value: f32, weight: i32) -> f32 {
        let step = (weight as f32 * build).max(1.0);
        let previous = self
            .value_weight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |w| {
                Some(((w as f32 + step).min(cap)) as i32)
            })
            .unwrap_or(0);
        let new_weight = ((previous as f32 + step).min(cap)).max(step);
        self.value_average
            .update(|old| old + step * (value - old) / new_weight)
    }

    /// Credit a completed simulation: visit accounting plus virtual-loss
    /// release. The value itself goes through `sample_value`.
    pub fn record_visit(&self, weight: i32) {
        self.visit_count.fetch_add(weight, Ordering::Relaxed);
        self.up_weight.fetch_add(weight, Ordering::Relaxed);
        self.revert_virtual_loss();
    }
}

/// Free every child array under `node`, depth-first. The node itself is
/// not freed; it may be an element of its parent's array.
///
/// # Safety
/// No worker may hold references into the subtree; callers run this only
/// while all workers are parked.
pub unsafe fn free_children(node: &Node) {
    let ptr = node.children.swap(ptr::null_mut(), Ordering::AcqRel);
    if ptr.is_null() {
        return;
    }
    let count = node.child_count.load(Ordering::Relaxed) as usize;
    let slice = std::slice::from_raw_parts_mut(ptr, count);
    for child in slice.iter() {
        free_children(child);
    }
    drop(Box::from_raw(slice as *mut [Node]));
}

/// Allocate the contiguous child array for one expansion. Each entry is
/// (encoded move, prior); children start with the parent's evaluated value
/// as first-play urgency.
pub fn allocate_children(entries: &[(u16, f32)], first_play_urgency: f32) -> (*mut Node, u32) {
    let children: Vec<Node> = entries
        .iter()
        .map(|&(mv, prior)| Node::new_child(mv, prior, first_play_urgency))
        .collect();
    let boxed: Box<[Node]> = children.into_boxed_slice();
    let count = boxed.len() as u32;
    (Box::into_raw(boxed) as *mut Node, count)
}

/// Shared-pointer wrapper for recording search paths across worker state.
#[derive(Clone, Copy)]
pub struct NodeRef(*const Node);

// SAFETY: Node is Sync; the pointer stays valid because pruning only
// happens while workers are parked.
unsafe impl Send for NodeRef {}

impl NodeRef {
    #[inline]
    pub fn new(node: &Node) -> Self {
        Self(node as *const Node)
    }

    #[inline]
    pub fn get<'a>(self) -> &'a Node {
        // SAFETY: see the Send justification above.
        unsafe { &*self.0 }
    }

    #[inline]
    pub fn ptr_eq(self, other: &Node) -> bool {
        std::ptr::eq(self.0, other as *const Node)
    }
}

/// Owner of the search tree. Structural operations (reset, pruning, root
/// replacement) are controller-only and require all workers parked.
pub struct Tree {
    root: AtomicPtr<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            root: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Drop the whole tree and install a fresh unexpanded root.
    pub fn reset(&self) {
        self.prune_all();
        self.root.store(
            Box::into_raw(Box::new(Node::new_root())),
            Ordering::Release,
        );
    }

    pub fn root(&self) -> Option<&Node> {
        // SAFETY: the root pointer is either null or owned by this tree.
        unsafe { self.root.load(Ordering::Acquire).as_ref() }
    }

    /// Tree reuse: make the child reached by `mv` the new root, releasing
    /// every sibling subtree. Falls back to a fresh root when the move has
    /// no expanded child.
    pub fn prune_except(&self, mv: u16) -> bool {
        let root_ptr = self.root.load(Ordering::Acquire);
        let root = match unsafe { root_ptr.as_ref() } {
            Some(root) if root.is_expanded() => root,
            _ => {
                self.reset();
                return false;
            }
        };
        let keep = match root.child_by_move(mv) {
            Some(keep) => keep,
            None => {
                self.reset();
                return false;
            }
        };
        let new_root = Box::into_raw(Box::new(Node::detach(keep)));
        // SAFETY: workers are parked; `keep`'s subtree was detached above,
        // so freeing the old root only releases the siblings.
        unsafe {
            free_children(root);
            drop(Box::from_raw(root_ptr));
        }
        self.root.store(new_root, Ordering::Release);
        true
    }

    /// Empty the tree entirely.
    pub fn prune_all(&self) {
        let root_ptr = self.root.swap(ptr::null_mut(), Ordering::AcqRel);
        if root_ptr.is_null() {
            return;
        }
        // SAFETY: workers are parked and the pointer was owned by this tree.
        unsafe {
            free_children(&*root_ptr);
            drop(Box::from_raw(root_ptr));
        }
    }

    /// Number of live nodes, root included. Walks the tree; test support.
    pub fn live_node_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            1 + node.children().iter().map(count).sum::<usize>()
        }
        self.root().map(count).unwrap_or(0)
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        self.prune_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_is_one_cache_line() {
        assert_eq!(std::mem::size_of::<Node>(), 64);
        assert_eq!(std::mem::align_of::<Node>(), 64);
    }

    #[test]
    fn terminal_value_bit_round_trip() {
        for value in [
            TerminalValue::NonTerminal,
            TerminalValue::Draw,
            TerminalValue::MateIn(1),
            TerminalValue::MateIn(17),
            TerminalValue::OpponentMateIn(0),
            TerminalValue::OpponentMateIn(9),
        ] {
            assert_eq!(TerminalValue::from_bits(value.to_bits()), value);
        }
    }

    #[test]
    fn mate_distances_are_monotone() {
        let node = Node::new_root();
        assert!(node.set_terminal_value(TerminalValue::MateIn(5)));
        assert!(!node.set_terminal_value(TerminalValue::MateIn(7)));
        assert!(node.set_terminal_value(TerminalValue::MateIn(3)));
        assert!(!node.set_terminal_value(TerminalValue::NonTerminal));
        assert!(!node.set_terminal_value(TerminalValue::OpponentMateIn(2)));
        assert_eq!(node.terminal_value(), TerminalValue::MateIn(3));
    }

    #[test]
    fn opponent_mates_prefer_delay_and_yield_to_own_mates() {
        let node = Node::new_root();
        assert!(node.set_terminal_value(TerminalValue::OpponentMateIn(2)));
        assert!(!node.set_terminal_value(TerminalValue::OpponentMateIn(1)));
        assert!(node.set_terminal_value(TerminalValue::OpponentMateIn(4)));
        assert!(node.set_terminal_value(TerminalValue::MateIn(6)));
        assert_eq!(node.terminal_value(), TerminalValue::MateIn(6));
    }

    #[test]
    fn mate_score_dominates_and_orders() {
        let rate = 1.25;
        let mate2 = TerminalValue::MateIn(2).mate_score(rate);
        let mate5 = TerminalValue::MateIn(5).mate_score(rate);
        let opp1 = TerminalValue::OpponentMateIn(1).mate_score(rate);
        let opp6 = TerminalValue::OpponentMateIn(6).mate_score(rate);
        assert!(mate2 > mate5);
        assert!(mate5 > VALUE_WIN);
        assert!(opp6 > opp1);
        assert!(opp1 < VALUE_LOSE);
    }

    #[test]
    fn capped_running_mean_converges() {
        let node = Node::new_child(0, 1.0, 0.5);
        for _ in 0..100 {
            node.sample_value(1.0, 50.0, 1.0, 1);
        }
        assert!(node.value() > 0.9);
        assert_eq!(node.value_weight(), 50);
        for _ in 0..400 {
            node.sample_value(1.0, 50.0, 0.0, 1);
        }
        assert!(node.value() < 0.1);
    }

    #[test]
    fn virtual_loss_depresses_value() {
        let node = Node::new_child(0, 1.0, 0.5);
        node.sample_value(1.0, 100.0, 0.8, 1);
        let clean = node.value_with_virtual_loss(1.0);
        node.apply_virtual_loss();
        let pressured = node.value_with_virtual_loss(1.0);
        assert!(pressured < clean);
        node.revert_virtual_loss();
        assert_eq!(node.visiting_count(), 0);
        node.revert_virtual_loss();
        assert_eq!(node.visiting_count(), 0);
    }

    #[test]
    fn expansion_single_writer() {
        let node = Node::new_root();
        assert!(node.try_begin_expansion());
        assert!(!node.try_begin_expansion());
        let (children, count) = allocate_children(&[(1, 0.5), (2, 0.5)], 0.5);
        node.publish_children(children, count);
        assert!(node.is_expanded());
        assert_eq!(node.children().len(), 2);
        // SAFETY: single-threaded test owns the node.
        unsafe { free_children(&node) };
    }

    #[test]
    fn tablebase_bounds_clamp() {
        let node = Node::new_child(0, 1.0, 0.5);
        node.set_tablebase_score_bound(4, 1.0, Bound::Lower);
        assert_eq!(node.tablebase_bounded_value(0.3), 1.0);
        node.set_tablebase_score_bound(2, 0.5, Bound::Exact);
        assert_eq!(node.tablebase_bounded_value(0.9), 0.5);
        node.set_tablebase_score_bound(0, 0.0, Bound::Upper);
        assert_eq!(node.tablebase_bounded_value(0.9), 0.0);
    }

    #[test]
    fn tree_reset_and_prune() {
        let tree = Tree::new();
        tree.reset();
        let root = tree.root().unwrap();
        assert!(root.try_begin_expansion());
        let (children, count) = allocate_children(&[(7, 0.6), (9, 0.4)], 0.5);
        root.publish_children(children, count);
        assert_eq!(tree.live_node_count(), 3);
        tree.prune_all();
        assert_eq!(tree.live_node_count(), 0);
    }
}
