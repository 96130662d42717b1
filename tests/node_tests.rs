//! Tree-memory properties: root replacement, pruning, and concurrent
//! value updates.

use lodestar::search::node::{allocate_children, Node, TerminalValue, Tree};
use std::sync::Arc;

fn expand(node: &Node, entries: &[(u16, f32)], fpu: f32) {
    assert!(node.try_begin_expansion());
    let (children, count) = allocate_children(entries, fpu);
    node.publish_children(children, count);
}

#[test]
fn prune_except_transfers_the_kept_subtree() {
    let tree = Tree::new();
    tree.reset();
    let root = tree.root().unwrap();
    expand(root, &[(10, 0.5), (20, 0.3), (30, 0.2)], 0.5);

    let kept = root.child_by_move(20).unwrap();
    expand(kept, &[(40, 0.6), (50, 0.4)], 0.4);
    for _ in 0..7 {
        kept.record_visit(1);
        kept.sample_value(1.0, 100.0, 0.8, 1);
    }
    kept.set_terminal_value(TerminalValue::MateIn(4));
    let kept_value = kept.value();
    let kept_weight = kept.value_weight();

    assert!(tree.prune_except(20));

    let new_root = tree.root().unwrap();
    assert_eq!(new_root.mv(), 20);
    assert_eq!(new_root.visit_count(), 7);
    assert_eq!(new_root.value_weight(), kept_weight);
    assert!((new_root.value() - kept_value).abs() < f32::EPSILON);
    assert_eq!(new_root.terminal_value(), TerminalValue::MateIn(4));
    assert_eq!(new_root.children().len(), 2);
    assert_eq!(new_root.child_by_move(40).unwrap().prior(), 0.6);
    // Old root and both siblings are gone; the kept pair of children stays.
    assert_eq!(tree.live_node_count(), 3);
}

#[test]
fn prune_except_without_matching_child_resets() {
    let tree = Tree::new();
    tree.reset();
    let root = tree.root().unwrap();
    expand(root, &[(1, 1.0)], 0.5);
    assert!(!tree.prune_except(99));
    let root = tree.root().unwrap();
    assert!(!root.is_expanded());
    assert_eq!(tree.live_node_count(), 1);
}

#[test]
fn prune_all_empties_the_tree() {
    let tree = Tree::new();
    tree.reset();
    let root = tree.root().unwrap();
    expand(root, &[(1, 0.5), (2, 0.5)], 0.5);
    expand(root.child_by_move(1).unwrap(), &[(3, 1.0)], 0.5);
    assert_eq!(tree.live_node_count(), 4);
    tree.prune_all();
    assert_eq!(tree.live_node_count(), 0);
    assert!(tree.root().is_none());
}

#[test]
fn concurrent_samples_stay_in_bounds() {
    let node = Arc::new(Node::new_child(0, 1.0, 0.5));
    let mut handles = Vec::new();
    for t in 0..4 {
        let node = Arc::clone(&node);
        handles.push(std::thread::spawn(move || {
            let sample = if t % 2 == 0 { 1.0 } else { 0.0 };
            for _ in 0..10_000 {
                node.apply_virtual_loss();
                node.sample_value(1.0, 500.0, sample, 1);
                node.record_visit(1);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(node.visit_count(), 40_000);
    assert_eq!(node.up_weight(), 40_000);
    assert_eq!(node.visiting_count(), 0);
    assert!(node.value() >= 0.0 && node.value() <= 1.0);
    assert!(node.value_weight() <= 500);
}

#[test]
fn expansion_race_has_a_single_winner() {
    let node = Arc::new(Node::new_root());
    let winners: Vec<bool> = (0..8)
        .map(|_| {
            let node = Arc::clone(&node);
            std::thread::spawn(move || node.try_begin_expansion())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();
    assert_eq!(winners.iter().filter(|&&w| w).count(), 1);
}
