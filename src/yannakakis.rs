//! Yannakakis Transform
//!
//! Rewrites an acyclic join tree into semijoin-reduced form: a bottom-up
//! pass of semijoin reductions into each parent, a top-down pass of
//! semijoin reductions into each child (with flipped column pairs), and a
//! final bottom-up pass of the actual joins. The result is equivalent to
//! the naive full join under set semantics while keeping intermediate
//! results bounded by the output.
//!
//! The passes must run in sequence; within a pass, siblings may be visited
//! in any order.

use tracing::debug;

use crate::hypergraph::Tree;
use crate::relation::{flip_join_on, JoinOn, RelationArena, RelId};

/// A join tree: nodes are relations, each child edge carries the column
/// pairs joining that child to its parent.
pub type JoinTree = Tree<RelId, JoinOn>;

/// Rewrite the join tree, returning the root relation of the reduced plan.
/// New nodes are allocated in the given arena.
pub fn yannakakis(arena: &mut RelationArena, mut tree: JoinTree) -> RelId {
    debug!(nodes = tree.size(), "yannakakis_rewrite");
    reduce_bottom_up(arena, &mut tree);
    reduce_top_down(arena, &mut tree);
    join_bottom_up(arena, &mut tree);
    tree.element
}

/// First pass: each fully-reduced child semijoin-filters its parent.
fn reduce_bottom_up(arena: &mut RelationArena, node: &mut JoinTree) {
    for (child, on) in &mut node.children {
        reduce_bottom_up(arena, child);
        node.element = arena.semijoin(node.element, child.element, on.clone());
    }
}

/// Second pass: each parent semijoin-filters its children, root downward.
fn reduce_top_down(arena: &mut RelationArena, node: &mut JoinTree) {
    for i in 0..node.children.len() {
        let on = flip_join_on(&node.children[i].1);
        let parent = node.element;
        let child = &mut node.children[i].0;
        child.element = arena.semijoin(child.element, parent, on);
        reduce_top_down(arena, child);
    }
}

/// Third pass: the actual joins, child results folding into each parent.
fn join_bottom_up(arena: &mut RelationArena, node: &mut JoinTree) {
    for (child, on) in &mut node.children {
        join_bottom_up(arena, child);
        node.element = arena.join(node.element, child.element, on.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::PredicateArena;
    use crate::relation::join_on;

    #[test]
    fn test_single_node_is_unchanged() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let rewritten = yannakakis(&mut arena, Tree::leaf(r));
        assert_eq!(rewritten, r);
    }

    #[test]
    fn test_two_node_chain_shape() {
        let mut arena = RelationArena::new();
        let preds = PredicateArena::new();
        let a = arena.reference("A", 2);
        let b = arena.reference("B", 2);
        let tree = Tree::node(a, vec![(Tree::leaf(b), join_on([(1, 0)]))]);

        let rewritten = yannakakis(&mut arena, tree);
        assert_eq!(
            arena.display(rewritten, &preds).unwrap(),
            "Join([(1, 0)], Semijoin([(1, 0)], A, B), \
             Semijoin([(0, 1)], B, Semijoin([(1, 0)], A, B)))"
        );
    }

    #[test]
    fn test_star_rewrite_keeps_arity() {
        let mut arena = RelationArena::new();
        let a = arena.reference("A", 2);
        let b = arena.reference("B", 2);
        let c = arena.reference("C", 2);
        let tree = Tree::node(
            a,
            vec![
                (Tree::leaf(b), join_on([(0, 0)])),
                (Tree::leaf(c), join_on([(1, 0)])),
            ],
        );

        let rewritten = yannakakis(&mut arena, tree);
        // A(2) joins B(2) dropping one column, then C(2) dropping one
        assert_eq!(arena.arity(rewritten).unwrap(), 4);
    }
}
