//! Fractional Hypertree Decomposition Planner
//!
//! Reduces "find a fractional hypertree decomposition of minimum width" to
//! a mixed boolean/linear-real optimization over a total vertex order:
//!
//! - booleans `ostar(i, j)` model a strict total order on vertices
//!   (antisymmetry is structural: only `i < j` variables exist, the other
//!   direction is the negated literal; transitivity is asserted),
//! - booleans `a[i][j]` model later-in-order adjacency after elimination,
//!   closed under the chordal-completion triangle rule,
//! - reals `w[i][e] in [0, 1]` fractionally cover each vertex's bag, and
//! - the real `m >= 1` bounds every row's total weight and is minimized.
//!
//! Decoding recovers the vertex order from the model, forms each vertex's
//! bag, hangs every vertex under the earliest other vertex of its bag, and
//! verifies the running-intersection property before returning.

use std::fmt::Debug;
use std::hash::Hash;

use tracing::debug;

use crate::config::PlannerConfig;
use crate::error::{Error, Result};
use crate::hypergraph::{
    digraph_to_tree, verify_running_intersection, Bag, Digraph, EdgeId, Hypergraph, Tree,
};
use crate::solve::{BranchBoundSolver, ClauseAtom, LinExpr, Lit, SolveStatus, Solver};

/// A fractional hypertree decomposition: its width and its tree of bags.
#[derive(Debug, Clone)]
pub struct Fhd<V> {
    pub width: f64,
    pub tree: Tree<Bag<V>, ()>,
}

/// Compute a minimum-width FHD with the default planner budget.
pub fn compute_fhd<V>(hypergraph: &Hypergraph<V>) -> Result<Fhd<V>>
where
    V: Clone + Eq + Hash + Ord + Debug,
{
    compute_fhd_with(hypergraph, &PlannerConfig::default())
}

/// Compute a minimum-width FHD under an explicit planner configuration.
pub fn compute_fhd_with<V>(hypergraph: &Hypergraph<V>, config: &PlannerConfig) -> Result<Fhd<V>>
where
    V: Clone + Eq + Hash + Ord + Debug,
{
    for vertex in hypergraph.all_vertices() {
        let isolated = hypergraph
            .edges_of(&vertex)
            .map_or(true, |edges| edges.is_empty());
        if isolated {
            return Err(Error::precondition(
                "detected vertex with no covering edges",
            ));
        }
    }

    let mut vertices: Vec<V> = hypergraph.all_vertices();
    vertices.sort();
    let mut edges: Vec<EdgeId> = hypergraph.all_edges();
    edges.sort();

    let num_vertices = vertices.len();
    let num_edges = edges.len();
    debug!(num_vertices, num_edges, "fhd_encoding_start");

    let vertex_index = |v: &V| -> usize {
        vertices
            .binary_search(v)
            .expect("every hypergraph vertex is in the sorted list")
    };
    let edge_contains = |e: usize, i: usize| -> bool {
        hypergraph
            .vertices_of(edges[e])
            .map_or(false, |vs| vs.contains(&vertices[i]))
    };

    let mut solver = BranchBoundSolver::with_budget(config.solver_budget());

    let width_var = solver.declare_real("m");
    solver.assert_clause(vec![ClauseAtom::ge(
        LinExpr::new().term(1.0, width_var),
        1.0,
    )]);

    // ostar variables exist only for i < j; the reverse direction is the
    // negated literal.
    let mut o_star = vec![vec![None; num_vertices]; num_vertices];
    for i in 0..num_vertices {
        for j in (i + 1)..num_vertices {
            o_star[i][j] = Some(solver.declare_bool(&format!("ostar_{i}_{j}")));
        }
    }
    let ostar_lit = |o_star: &Vec<Vec<Option<crate::solve::BoolVar>>>, i: usize, j: usize| -> Lit {
        if i < j {
            Lit::pos(o_star[i][j].expect("declared for i < j"))
        } else {
            Lit::neg(o_star[j][i].expect("declared for j < i"))
        }
    };

    let mut adjacency = vec![vec![]; num_vertices];
    for i in 0..num_vertices {
        adjacency[i] = (0..num_vertices)
            .map(|j| solver.declare_bool(&format!("a_{i}_{j}")))
            .collect();
    }

    let mut weight = vec![vec![]; num_vertices];
    for i in 0..num_vertices {
        for e in 0..num_edges {
            let var = solver.declare_real(&format!("w_{i}_{e}"));
            solver.assert_clause(vec![ClauseAtom::ge(LinExpr::new().term(1.0, var), 0.0)]);
            solver.assert_clause(vec![ClauseAtom::le(LinExpr::new().term(1.0, var), 1.0)]);
            weight[i].push(var);
        }
    }

    // transitivity of the order
    for i in 0..num_vertices {
        for j in 0..num_vertices {
            for k in 0..num_vertices {
                if i == j || i == k || j == k {
                    continue;
                }
                let mut not_ij = ostar_lit(&o_star, i, j);
                not_ij.negated = !not_ij.negated;
                let mut not_jk = ostar_lit(&o_star, j, k);
                not_jk.negated = !not_jk.negated;
                solver.assert_clause(vec![
                    ClauseAtom::Bool(not_ij),
                    ClauseAtom::Bool(not_jk),
                    ClauseAtom::Bool(ostar_lit(&o_star, i, k)),
                ]);
            }
        }
    }

    // endpoints of every hyperedge are adjacent in elimination order
    for e in 0..num_edges {
        let vs = hypergraph
            .vertices_of(edges[e])
            .ok_or_else(|| Error::internal("edge vanished during encoding"))?;
        for x in vs {
            for y in vs {
                let i = vertex_index(x);
                let j = vertex_index(y);
                if i >= j {
                    continue;
                }
                solver.assert_clause(vec![
                    ClauseAtom::Bool(ostar_lit(&o_star, j, i)),
                    ClauseAtom::Bool(Lit::pos(adjacency[i][j])),
                ]);
                solver.assert_clause(vec![
                    ClauseAtom::Bool(ostar_lit(&o_star, i, j)),
                    ClauseAtom::Bool(Lit::pos(adjacency[j][i])),
                ]);
            }
        }
    }

    // triangle closure for the chordal completion
    for i in 0..num_vertices {
        for j in 0..num_vertices {
            for k in 0..num_vertices {
                if i == j || i == k || j >= k {
                    continue;
                }
                let premise = [
                    ClauseAtom::Bool(Lit::neg(adjacency[i][j])),
                    ClauseAtom::Bool(Lit::neg(adjacency[i][k])),
                ];
                solver.assert_clause(
                    premise
                        .iter()
                        .cloned()
                        .chain([
                            ClauseAtom::Bool(ostar_lit(&o_star, k, j)),
                            ClauseAtom::Bool(Lit::pos(adjacency[j][k])),
                        ])
                        .collect(),
                );
                solver.assert_clause(
                    premise
                        .iter()
                        .cloned()
                        .chain([
                            ClauseAtom::Bool(ostar_lit(&o_star, j, k)),
                            ClauseAtom::Bool(Lit::pos(adjacency[k][j])),
                        ])
                        .collect(),
                );
                solver.assert_clause(
                    premise
                        .iter()
                        .cloned()
                        .chain([
                            ClauseAtom::Bool(Lit::pos(adjacency[j][k])),
                            ClauseAtom::Bool(Lit::pos(adjacency[k][j])),
                        ])
                        .collect(),
                );
            }
        }
    }

    // no self-adjacency
    for i in 0..num_vertices {
        solver.assert_clause(vec![ClauseAtom::Bool(Lit::neg(adjacency[i][i]))]);
    }

    // adjacency implies the row fractionally covers the neighbor
    for i in 0..num_vertices {
        for j in 0..num_vertices {
            if i == j {
                continue;
            }
            let covering = LinExpr::sum(
                (0..num_edges)
                    .filter(|e| edge_contains(*e, j))
                    .map(|e| weight[i][e]),
            );
            solver.assert_clause(vec![
                ClauseAtom::Bool(Lit::neg(adjacency[i][j])),
                ClauseAtom::ge(covering, 1.0),
            ]);
        }
    }

    // every row covers its own vertex
    for i in 0..num_vertices {
        let covering = LinExpr::sum(
            (0..num_edges)
                .filter(|e| edge_contains(*e, i))
                .map(|e| weight[i][e]),
        );
        solver.assert_clause(vec![ClauseAtom::ge(covering, 1.0)]);
    }

    // every row's total weight stays within the width
    for i in 0..num_vertices {
        let mut total = LinExpr::sum(weight[i].iter().copied());
        total = total.term(-1.0, width_var);
        solver.assert_clause(vec![ClauseAtom::le(total, 0.0)]);
    }

    solver.minimize(width_var);

    match solver.check() {
        SolveStatus::Unsatisfiable => {
            return Err(Error::Unsatisfiable(
                "solver returned unsat; the trivial cover makes this impossible".to_string(),
            ));
        }
        SolveStatus::Unknown => {
            return Err(Error::DeadlineExceeded(
                "solver returned unknown; it ran out of time or memory".to_string(),
            ));
        }
        SolveStatus::Satisfied => {}
    }

    let width = solver.real_value(width_var);
    debug!(width, "fhd_model_found");

    // Recover the vertex order: insert each vertex at the unique position
    // consistent with the ostar model values.
    let ostar_value = |i: usize, j: usize| -> bool {
        if i < j {
            solver.bool_value(o_star[i][j].expect("declared"))
        } else {
            !solver.bool_value(o_star[j][i].expect("declared"))
        }
    };
    let mut ordering: Vec<usize> = Vec::with_capacity(num_vertices);
    for i in 0..num_vertices {
        let mut pos = 0;
        for &j in &ordering {
            if ostar_value(j, i) {
                pos += 1;
            } else {
                break;
            }
        }
        ordering.insert(pos, i);
    }

    let mut tree_graph: Digraph<Bag<V>> = Digraph::new();
    for _ in &vertices {
        // node ids and vertex indices coincide from here on
        tree_graph.add_vertex(Bag::new());
    }

    for i in 0..num_vertices {
        for e in 0..num_edges {
            tree_graph
                .value_mut(i)
                .relations
                .insert(edges[e], solver.real_value(weight[i][e]));
        }
    }

    let smallest = |ordering: &[usize], wanted: &std::collections::HashSet<V>| -> Option<usize> {
        ordering
            .iter()
            .copied()
            .find(|v| wanted.contains(&vertices[*v]))
    };

    // every hyperedge's vertex set lands in the bag of its earliest vertex
    for e in 0..num_edges {
        let vs = hypergraph
            .vertices_of(edges[e])
            .ok_or_else(|| Error::internal("edge vanished during decoding"))?;
        let owner = smallest(&ordering, vs)
            .ok_or_else(|| Error::internal("hyperedge with no ordered vertex"))?;
        for vertex in vs {
            tree_graph.value_mut(owner).attributes.insert(vertex.clone());
        }
    }

    // later vertices inherit the remainder of each bag; each vertex hangs
    // under the earliest other vertex of its bag
    for &v in &ordering.clone() {
        let mut rest = tree_graph.value(v).attributes.clone();
        if rest.len() > 1 {
            rest.remove(&vertices[v]);
            let next = smallest(&ordering, &rest)
                .ok_or_else(|| Error::internal("bag remainder with no ordered vertex"))?;
            tree_graph.value_mut(next).attributes.extend(rest);
            tree_graph.add_edge(next, v);
        }
    }

    if !verify_running_intersection(&tree_graph) {
        return Err(Error::internal(
            "result failed to satisfy the running intersection property",
        ));
    }

    let tree = digraph_to_tree(&tree_graph)
        .ok_or_else(|| Error::internal("decomposition digraph is not a tree"))?;

    debug!(width, nodes = tree.size(), "fhd_done");
    Ok(Fhd { width, tree })
}
