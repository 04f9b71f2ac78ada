//! # MatView
//!
//! A compiler for reactive relational data structures. Given a
//! relational-algebra expression over named base tables, it synthesizes a
//! data structure whose public surface is one insert/delete mutator pair
//! per base table plus storage exposing the materialized result of every
//! sub-expression. Each mutation incrementally updates every dependent
//! view, so reads never recompute.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Relation term (arena)         Join hypergraph
//!     ↓                             ↓
//! [Type environment]           [FHD planner]     → width + tree of bags
//!     ↓                             ↓
//!     ↓                        [Yannakakis]      → semijoin-reduced term
//!     ↓                             ↓
//! [Incremental code generator] ←────┘
//!     ↓
//! Action-IR data structure ──→ [render] (C++ text back-end)
//!     ↓
//! [runtime] in-process instance ⇄ [interp] reference oracle
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use matview::{
//!     generate_structure, FreshNameSource, Instance, RelationArena,
//!     Type, TypeEnv,
//! };
//! use matview::relation::join_on;
//!
//! let mut relations = RelationArena::new();
//! let r = relations.reference("R", 3);
//! let s = relations.reference("S", 2);
//! let view = relations.semijoin(r, s, join_on([(2, 0)]));
//!
//! let mut types = TypeEnv::new();
//! for id in [r, s, view] {
//!     types.insert(id, Type::int_row(relations.arity(id).unwrap()));
//! }
//!
//! let mut source = FreshNameSource::new();
//! let structure =
//!     generate_structure("Example", &relations, &types, &mut source, view).unwrap();
//!
//! let mut instance = Instance::new(&structure).unwrap();
//! instance.insert_row("R", &[501, 2241, 1001]).unwrap();
//! instance.insert_row("S", &[1001, 501]).unwrap();
//! assert_eq!(
//!     instance.rows_of("fresh0").unwrap(),
//!     [vec![501, 2241, 1001]].into()
//! );
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `attr` | Column indices and (partial) permutations |
//! | `predicate` | Predicate IR + evaluation |
//! | `relation` | Relation IR, arity checking, canonical text |
//! | `text` | Re-parsers for the canonical textual forms |
//! | `types` | Type language + identity-keyed type environment |
//! | `hypergraph` | Hypergraphs, decomposition trees, RIP validation |
//! | `union_find` | Disjoint sets with merged values |
//! | `solve` | Solver interface + built-in branch-and-bound backend |
//! | `fhd` | Fractional hypertree decomposition planner |
//! | `yannakakis` | Acyclic join-tree rewrite |
//! | `action` | Action IR: the imperative target language |
//! | `codegen` | Incremental code generator |
//! | `interp` | Reference interpreter (semantic oracle) |
//! | `runtime` | In-process evaluator for synthesized structures |
//! | `render` | C++ text back-end |
//! | `config` | Layered configuration |

pub mod action;
pub mod attr;
pub mod codegen;
pub mod config;
pub mod error;
pub mod fhd;
pub mod hypergraph;
pub mod interp;
pub mod predicate;
pub mod relation;
pub mod render;
pub mod runtime;
pub mod solve;
pub mod text;
pub mod types;
pub mod union_find;
pub mod yannakakis;

// Re-export the public surface
pub use action::{
    Action, ContainerKind, ContainerOp, DataStructure, FreshNameSource, Member, Method, VarName,
};
pub use attr::{Attr, AttrPartialPermutation, AttrPermutation};
pub use codegen::{generate_configured_structure, generate_structure, Codegen};
pub use config::{CodegenConfig, Config, PlannerConfig};
pub use error::{Error, Result};
pub use fhd::{compute_fhd, compute_fhd_with, Fhd};
pub use hypergraph::{
    digraph_to_tree, parse_hypergraph, verify_running_intersection, Bag, Digraph, EdgeId,
    Hypergraph, NodeId, Tree,
};
pub use interp::{Interpreter, Table};
pub use predicate::{Predicate, PredicateArena, PredId};
pub use relation::{
    flip_join_on, JoinOn, RelName, Relation, RelationArena, RelId, ScalarFn,
};
pub use runtime::{Instance, Val};
pub use solve::{BranchBoundSolver, SolveStatus, Solver};
pub use text::{parse_predicate, parse_relation, TableCatalog};
pub use types::{Type, TypeEnv};
pub use union_find::UnionFindMap;
pub use yannakakis::{yannakakis, JoinTree};
