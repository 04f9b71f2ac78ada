//! Oracle-Equality Tests
//!
//! The same mutation sequence is applied to a synthesized structure (via
//! the runtime evaluator) and to the reference interpreter; the storage set
//! of every checked node must equal the interpreter's result set.

use std::collections::{BTreeMap, HashSet};

use matview::relation::join_on;
use matview::{
    Codegen, FreshNameSource, Instance, Interpreter, PredicateArena, RelId, RelationArena,
    RelName, Table, Type, TypeEnv,
};

/// Give every node in the arena an all-integer row type.
fn int_types(arena: &RelationArena) -> TypeEnv {
    let mut env = TypeEnv::new();
    for id in arena.ids() {
        env.insert(id, Type::int_row(arena.arity(id).unwrap()));
    }
    env
}

type Mutation = (bool, String, Vec<i32>);

struct Harness<'a> {
    arena: &'a RelationArena,
    root: RelId,
    root_member: String,
    structure: matview::DataStructure,
    tables: BTreeMap<String, Vec<Vec<i32>>>,
    widths: BTreeMap<String, usize>,
}

impl<'a> Harness<'a> {
    fn new(arena: &'a RelationArena, root: RelId, widths: &[(&str, usize)]) -> Self {
        let types = int_types(arena);
        let mut source = FreshNameSource::new();
        let mut codegen = Codegen::new("Example", arena, &types, &mut source);
        codegen.process(root).unwrap();
        let root_member = codegen.storage_name(root).unwrap().as_str().to_string();
        let structure = codegen.finish();
        Harness {
            arena,
            root,
            root_member,
            structure,
            tables: widths.iter().map(|(n, _)| ((*n).to_string(), Vec::new())).collect(),
            widths: widths.iter().map(|(n, w)| ((*n).to_string(), *w)).collect(),
        }
    }

    /// Replay the mutation log on a fresh instance.
    fn materialize(&self, log: &[Mutation]) -> HashSet<Vec<i32>> {
        let mut instance = Instance::new(&self.structure).unwrap();
        for (insert, table, row) in log {
            if *insert {
                instance.insert_row(table, row).unwrap();
            } else {
                instance.delete_row(table, row).unwrap();
            }
        }
        instance.rows_of(&self.root_member).unwrap()
    }

    /// Replay the mutation log on plain tables and interpret the term.
    fn interpret(&self, log: &[Mutation]) -> HashSet<Vec<i32>> {
        let mut contents = self.tables.clone();
        for (insert, table, row) in log {
            let rows = contents.get_mut(table).unwrap();
            if *insert {
                if !rows.contains(row) {
                    rows.push(row.clone());
                }
            } else {
                rows.retain(|r| r != row);
            }
        }

        let mut variables = BTreeMap::new();
        for (name, rows) in &contents {
            let width = self.widths[name];
            variables.insert(
                RelName::new(name.clone()),
                Table::from_rows(width, rows.iter().cloned()).unwrap(),
            );
        }
        let predicates = PredicateArena::new();
        let mut interp = Interpreter::new(variables);
        interp.interpret(self.arena, &predicates, self.root).unwrap();
        interp.lookup(self.root).unwrap().row_set()
    }

    /// Both sides agree on the mutation log.
    fn check(&self, log: &[Mutation]) -> HashSet<Vec<i32>> {
        let materialized = self.materialize(log);
        let interpreted = self.interpret(log);
        assert_eq!(materialized, interpreted, "materialized != oracle");
        materialized
    }
}

fn ins(table: &str, row: &[i32]) -> Mutation {
    (true, table.to_string(), row.to_vec())
}

fn del(table: &str, row: &[i32]) -> Mutation {
    (false, table.to_string(), row.to_vec())
}

fn seed_r() -> Vec<Mutation> {
    vec![
        ins("R", &[500, 3415, 1000]),
        ins("R", &[501, 2241, 1001]),
        ins("R", &[502, 3401, 1000]),
        ins("R", &[503, 2202, 1002]),
    ]
}

#[test]
fn test_semijoin_materializes_matching_tuples() {
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 3);
    let s = arena.reference("S", 2);
    let semijoin = arena.semijoin(r, s, join_on([(2, 0)]));

    let harness = Harness::new(&arena, semijoin, &[("R", 3), ("S", 2)]);
    let mut log = seed_r();
    log.push(ins("S", &[1001, 501]));
    log.push(ins("S", &[1002, 503]));

    let result = harness.check(&log);
    let expected: HashSet<Vec<i32>> =
        [vec![501, 2241, 1001], vec![503, 2202, 1002]].into();
    assert_eq!(result, expected);
}

#[test]
fn test_semijoin_insert_order_does_not_matter() {
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 3);
    let s = arena.reference("S", 2);
    let semijoin = arena.semijoin(r, s, join_on([(2, 0)]));

    let harness = Harness::new(&arena, semijoin, &[("R", 3), ("S", 2)]);
    let mut log = vec![ins("S", &[1001, 501]), ins("S", &[1002, 503])];
    log.extend(seed_r());

    let expected: HashSet<Vec<i32>> =
        [vec![501, 2241, 1001], vec![503, 2202, 1002]].into();
    assert_eq!(harness.check(&log), expected);
}

#[test]
fn test_join_materializes_combined_tuples() {
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 3);
    let s = arena.reference("S", 2);
    let join = arena.join(r, s, join_on([(2, 0)]));

    let harness = Harness::new(&arena, join, &[("R", 3), ("S", 2)]);
    let mut log = seed_r();
    log.push(ins("S", &[1001, 501]));
    log.push(ins("S", &[1002, 503]));
    log.push(ins("S", &[1002, 504]));

    let result = harness.check(&log);
    let expected: HashSet<Vec<i32>> = [
        vec![501, 2241, 1001, 501],
        vec![503, 2202, 1002, 503],
        vec![503, 2202, 1002, 504],
    ]
    .into();
    assert_eq!(result, expected);
}

#[test]
fn test_join_deletion_retracts_combined_tuples() {
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 3);
    let s = arena.reference("S", 2);
    let join = arena.join(r, s, join_on([(2, 0)]));

    let harness = Harness::new(&arena, join, &[("R", 3), ("S", 2)]);
    let mut log = seed_r();
    log.push(ins("S", &[1001, 501]));
    log.push(ins("S", &[1002, 503]));
    log.push(ins("S", &[1002, 504]));
    log.push(del("S", &[1002, 504]));
    log.push(del("R", &[501, 2241, 1001]));

    let result = harness.check(&log);
    let expected: HashSet<Vec<i32>> = [vec![503, 2202, 1002, 503]].into();
    assert_eq!(result, expected);
}

/// The difference-under-deletion scenario: `R - Semijoin(R, S, {(1, 0)})`.
fn difference_harness(arena: &mut RelationArena) -> (RelId, Vec<Mutation>) {
    let r = arena.reference("R", 2);
    let s = arena.reference("S", 1);
    let semijoin = arena.semijoin(r, s, join_on([(1, 0)]));
    let difference = arena.difference(r, semijoin);

    let log = vec![
        ins("R", &[0, 0]),
        ins("R", &[0, 1]),
        ins("R", &[5, 1]),
        ins("R", &[0, 2]),
        ins("R", &[0, 3]),
        ins("R", &[6, 3]),
        ins("S", &[1]),
        ins("S", &[3]),
    ];
    (difference, log)
}

#[test]
fn test_difference_after_inserts() {
    let mut arena = RelationArena::new();
    let (difference, log) = difference_harness(&mut arena);
    let harness = Harness::new(&arena, difference, &[("R", 2), ("S", 1)]);

    let expected: HashSet<Vec<i32>> = [vec![0, 0], vec![0, 2]].into();
    assert_eq!(harness.check(&log), expected);
}

#[test]
fn test_difference_unchanged_by_lhs_delete() {
    let mut arena = RelationArena::new();
    let (difference, mut log) = difference_harness(&mut arena);
    let harness = Harness::new(&arena, difference, &[("R", 2), ("S", 1)]);

    log.push(del("R", &[5, 1]));
    let expected: HashSet<Vec<i32>> = [vec![0, 0], vec![0, 2]].into();
    assert_eq!(harness.check(&log), expected);
}

#[test]
fn test_difference_grows_on_rhs_delete() {
    let mut arena = RelationArena::new();
    let (difference, mut log) = difference_harness(&mut arena);
    let harness = Harness::new(&arena, difference, &[("R", 2), ("S", 1)]);

    log.push(del("S", &[1]));
    let expected: HashSet<Vec<i32>> =
        [vec![0, 0], vec![0, 2], vec![0, 1], vec![5, 1]].into();
    assert_eq!(harness.check(&log), expected);
}

#[test]
fn test_union_with_contained_view_is_identity() {
    // Union(R, Semijoin(R, S, {(1, 0)})) equals R whatever S holds
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 2);
    let s = arena.reference("S", 1);
    let semijoin = arena.semijoin(r, s, join_on([(1, 0)]));
    let union = arena.union(r, semijoin);

    let harness = Harness::new(&arena, union, &[("R", 2), ("S", 1)]);

    for s_rows in [vec![], vec![vec![0]], vec![vec![0], vec![7]]] {
        let mut log = vec![ins("R", &[0, 0])];
        for row in &s_rows {
            log.push(ins("S", row));
        }
        let expected: HashSet<Vec<i32>> = [vec![0, 0]].into();
        assert_eq!(harness.check(&log), expected);
    }
}

#[test]
fn test_double_insert_is_idempotent() {
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 3);
    let s = arena.reference("S", 2);
    let semijoin = arena.semijoin(r, s, join_on([(2, 0)]));

    let harness = Harness::new(&arena, semijoin, &[("R", 3), ("S", 2)]);

    let mut once = seed_r();
    once.push(ins("S", &[1001, 501]));
    let mut twice = once.clone();
    twice.push(ins("R", &[501, 2241, 1001]));
    twice.push(ins("S", &[1001, 501]));

    assert_eq!(harness.check(&once), harness.check(&twice));
}

#[test]
fn test_view_permutes_materialized_tuples() {
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 3);
    let s = arena.reference("S", 2);
    let semijoin = arena.semijoin(r, s, join_on([(2, 0)]));
    let view = arena.view(vec![Some(1), None, Some(0)], semijoin);

    let harness = Harness::new(&arena, view, &[("R", 3), ("S", 2)]);
    let mut log = seed_r();
    log.push(ins("S", &[1001, 501]));
    log.push(ins("S", &[1002, 503]));

    let result = harness.check(&log);
    // (501, 2241, 1001) lands as (1001, 501); the middle column is dropped
    let expected: HashSet<Vec<i32>> = [vec![1001, 501], vec![1002, 503]].into();
    assert_eq!(result, expected);

    // deleting the underlying tuple retracts the viewed one
    log.push(del("R", &[501, 2241, 1001]));
    let expected: HashSet<Vec<i32>> = [vec![1002, 503]].into();
    assert_eq!(harness.check(&log), expected);
}

#[test]
fn test_shared_subterm_feeds_two_parents() {
    // both union operands are the same semijoin node
    let mut arena = RelationArena::new();
    let r = arena.reference("R", 2);
    let s = arena.reference("S", 1);
    let semijoin = arena.semijoin(r, s, join_on([(1, 0)]));
    let union = arena.union(semijoin, semijoin);

    let harness = Harness::new(&arena, union, &[("R", 2), ("S", 1)]);
    let log = vec![
        ins("R", &[1, 2]),
        ins("R", &[3, 4]),
        ins("S", &[2]),
    ];
    let expected: HashSet<Vec<i32>> = [vec![1, 2]].into();
    assert_eq!(harness.check(&log), expected);
}
