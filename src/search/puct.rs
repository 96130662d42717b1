// src/search/puct.rs
//! PUCT child selection.
//!
//! A `PuctContext` is built per parent per descent step: it caches the
//! parent's virtual-exploration sum and the exploration numerator, then
//! scores every child into a thread-local scratch vector and returns the
//! best. Two scoring modes share the machinery: classic AZ-PUCT, and
//! SBLE-PUCT which adds a linear term spreading visits more uniformly in
//! the low-visit regime.

use crate::config::EngineConfig;
use crate::search::flip_value;
use crate::search::node::{Node, TerminalValue};
use std::cell::RefCell;

/// A selected child plus its backpropagation weight. Weight 1 for normal
/// moves; terminal children absorb their pending virtual visits so a
/// converged subtree is credited without being re-descended.
pub struct WeightedNode<'a> {
    pub node: &'a Node,
    pub index: usize,
    pub weight: i32,
}

struct ScoredNode {
    index: usize,
    score: f32,
}

thread_local! {
    static SCORED_NODES: RefCell<Vec<ScoredNode>> = RefCell::new(Vec::new());
}

#[inline]
fn virtual_exploration(node: &Node) -> f32 {
    node.visit_count() as f32 + node.visiting_count() as f32
}

pub struct PuctContext<'a> {
    parent: &'a Node,
    parent_virtual_exploration: f32,
    exploration_numerator: f32,
    virtual_loss_coefficient: f32,
    exploration_rate_init: f32,
    use_sble: bool,
    linear_exploration_rate: f32,
    linear_exploration_base: f32,
    /// Root-only: children below this visit count can no longer catch up
    /// within the remaining budget and are skipped.
    elimination_floor: Option<i32>,
}

impl<'a> PuctContext<'a> {
    pub fn new(
        config: &EngineConfig,
        parent: &'a Node,
        elimination_floor: Option<i32>,
    ) -> Self {
        let parent_virtual_exploration: f32 = parent
            .children()
            .iter()
            .map(virtual_exploration)
            .sum();
        let exploration_numerator = ((parent_virtual_exploration
            + config.exploration_rate_base
            + 1.0)
            / config.exploration_rate_base)
            .ln()
            + config.exploration_rate_init;
        Self {
            parent,
            parent_virtual_exploration,
            exploration_numerator,
            virtual_loss_coefficient: config.virtual_loss_coefficient,
            exploration_rate_init: config.exploration_rate_init,
            use_sble: config.use_sble_puct,
            linear_exploration_rate: config.linear_exploration_rate,
            linear_exploration_base: config.linear_exploration_base,
            elimination_floor,
        }
    }

    /// Score one child from the parent's perspective. Proven outcomes use
    /// their mate score (flipped into the parent's view); everything else
    /// uses the virtual-loss-adjusted mean clamped by tablebase bounds.
    pub fn score(&self, child: &Node) -> f32 {
        let child_virtual_exploration = virtual_exploration(child);
        let terminal = child.terminal_value();
        let value = if terminal.is_terminal() {
            flip_value(terminal.mate_score(self.exploration_rate_init))
        } else {
            child.tablebase_bounded_value(
                child.value_with_virtual_loss(self.virtual_loss_coefficient),
            )
        };
        // Floor the parent factor at 1 so a freshly expanded parent still
        // orders its unvisited children by prior.
        let parent_factor = self.parent_virtual_exploration.sqrt().max(1.0);
        let mut score = value
            + self.exploration_numerator * child.prior() * parent_factor
                / (1.0 + child_virtual_exploration);
        if self.use_sble && self.parent_virtual_exploration > 0.0 {
            score += self.linear_exploration_rate
                * (self.linear_exploration_base
                    - child_virtual_exploration / self.parent_virtual_exploration);
        }
        score
    }

    /// Pick the best child; ties break toward the lower index.
    pub fn select_child(&self) -> WeightedNode<'a> {
        let children = self.parent.children();
        debug_assert!(!children.is_empty());

        // Proven mates dominate scoring outright: take the fastest win, or
        // when every reply loses, the longest defense.
        let mut best_win: Option<(usize, u8)> = None;
        let mut worst_loss: Option<(usize, u8)> = None;
        let mut all_losing = true;
        for (index, child) in children.iter().enumerate() {
            match child.terminal_value() {
                TerminalValue::OpponentMateIn(k) => {
                    if best_win.map_or(true, |(_, best)| k < best) {
                        best_win = Some((index, k));
                    }
                    all_losing = false;
                }
                TerminalValue::MateIn(n) => {
                    if worst_loss.map_or(true, |(_, worst)| n > worst) {
                        worst_loss = Some((index, n));
                    }
                }
                _ => all_losing = false,
            }
        }
        if let Some((index, _)) = best_win {
            return self.weighted(index);
        }
        if all_losing {
            if let Some((index, _)) = worst_loss {
                return self.weighted(index);
            }
        }

        SCORED_NODES.with(|scratch| {
            let mut scored = scratch.borrow_mut();
            scored.clear();
            for (index, child) in children.iter().enumerate() {
                if let Some(floor) = self.elimination_floor {
                    if child.visit_count() < floor {
                        continue;
                    }
                }
                scored.push(ScoredNode {
                    index,
                    score: self.score(child),
                });
            }
            let mut best_index = scored.first().map(|s| s.index).unwrap_or(0);
            let mut best_score = f32::NEG_INFINITY;
            for entry in scored.iter() {
                if entry.score > best_score {
                    best_score = entry.score;
                    best_index = entry.index;
                }
            }
            self.weighted(best_index)
        })
    }

    fn weighted(&self, index: usize) -> WeightedNode<'a> {
        let node = &self.parent.children()[index];
        let weight = if node.terminal_value().is_terminal() {
            1 + node.visiting_count() as i32
        } else {
            1
        };
        WeightedNode {
            node,
            index,
            weight,
        }
    }
}

/// Whether a backpropagated value sample should credit `child`: it must
/// still score within `threshold` of the parent's best child. Visit counts
/// are updated regardless; only the value sample is gated.
pub fn backprop_value_gate(
    config: &EngineConfig,
    parent: &Node,
    child: &Node,
    threshold: f32,
) -> bool {
    if threshold <= 0.0 {
        return true;
    }
    let context = PuctContext::new(config, parent, None);
    let child_score = context.score(child);
    let best_score = parent
        .children()
        .iter()
        .map(|c| context.score(c))
        .fold(f32::NEG_INFINITY, f32::max);
    child_score >= best_score - threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::node::{allocate_children, free_children};

    fn expanded_parent(priors: &[f32]) -> Node {
        let parent = Node::new_root();
        assert!(parent.try_begin_expansion());
        let entries: Vec<(u16, f32)> = priors
            .iter()
            .enumerate()
            .map(|(i, &p)| (i as u16 + 1, p))
            .collect();
        let (children, count) = allocate_children(&entries, 0.5);
        parent.publish_children(children, count);
        parent
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn prior_drives_first_selection() {
        let parent = expanded_parent(&[0.1, 0.7, 0.2]);
        let context = PuctContext::new(&config(), &parent, None);
        let selected = context.select_child();
        assert_eq!(selected.index, 1);
        assert_eq!(selected.weight, 1);
        unsafe { free_children(&parent) };
    }

    #[test]
    fn virtual_loss_disperses_selection() {
        let parent = expanded_parent(&[0.5, 0.3, 0.2]);
        let cfg = config();
        let mut picked = std::collections::HashSet::new();
        for _ in 0..3 {
            let context = PuctContext::new(&cfg, &parent, None);
            let selected = context.select_child();
            selected.node.apply_virtual_loss();
            picked.insert(selected.index);
        }
        assert!(picked.len() > 1);
        unsafe { free_children(&parent) };
    }

    #[test]
    fn proven_win_dominates() {
        let parent = expanded_parent(&[0.9, 0.05, 0.05]);
        let children = parent.children();
        children[2].set_terminal_value(TerminalValue::OpponentMateIn(2));
        children[1].set_terminal_value(TerminalValue::OpponentMateIn(4));
        let context = PuctContext::new(&config(), &parent, None);
        assert_eq!(context.select_child().index, 2);
        unsafe { free_children(&parent) };
    }

    #[test]
    fn all_losing_prefers_longest_defense() {
        let parent = expanded_parent(&[0.4, 0.3, 0.3]);
        let children = parent.children();
        children[0].set_terminal_value(TerminalValue::MateIn(1));
        children[1].set_terminal_value(TerminalValue::MateIn(6));
        children[2].set_terminal_value(TerminalValue::MateIn(3));
        let context = PuctContext::new(&config(), &parent, None);
        assert_eq!(context.select_child().index, 1);
        unsafe { free_children(&parent) };
    }

    #[test]
    fn sble_term_spreads_low_visit_children() {
        let parent = expanded_parent(&[0.6, 0.4]);
        let mut cfg = config();
        cfg.use_sble_puct = true;
        cfg.linear_exploration_rate = 0.5;
        // Pump visits into the first child; the linear term must pull the
        // score of the starved sibling upward relative to plain AZ.
        for _ in 0..50 {
            parent.children()[0].record_visit(1);
            parent.children()[0].sample_value(1.0, 100.0, 0.6, 1);
        }
        let sble = PuctContext::new(&cfg, &parent, None);
        cfg.use_sble_puct = false;
        let az = PuctContext::new(&cfg, &parent, None);
        let starved = &parent.children()[1];
        assert!(sble.score(starved) > az.score(starved));
        unsafe { free_children(&parent) };
    }

    #[test]
    fn elimination_floor_skips_buried_children() {
        let parent = expanded_parent(&[0.05, 0.95]);
        for _ in 0..100 {
            parent.children()[0].record_visit(1);
            parent.children()[0].sample_value(1.0, 100.0, 0.9, 1);
        }
        let context = PuctContext::new(&config(), &parent, Some(50));
        assert_eq!(context.select_child().index, 0);
        unsafe { free_children(&parent) };
    }

    #[test]
    fn gate_passes_when_disabled() {
        let parent = expanded_parent(&[0.5, 0.5]);
        let cfg = config();
        assert!(backprop_value_gate(
            &cfg,
            &parent,
            &parent.children()[0],
            0.0
        ));
        unsafe { free_children(&parent) };
    }
}
