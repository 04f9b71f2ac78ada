//! Property-based oracle equivalence (proptest).
//!
//! Randomized mutation sequences are applied to a synthesized structure
//! and to the reference interpreter; the materialized root storage must
//! equal the interpreter's result set.

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;

use matview::relation::join_on;
use matview::{
    Codegen, FreshNameSource, Instance, Interpreter, PredicateArena, RelId, RelationArena,
    RelName, Table, Type, TypeEnv,
};

fn int_types(arena: &RelationArena) -> TypeEnv {
    let mut env = TypeEnv::new();
    for id in arena.ids() {
        env.insert(id, Type::int_row(arena.arity(id).unwrap()));
    }
    env
}

/// Materialize the root under the mutation log through the generated
/// structure, and independently through the interpreter.
fn both_sides(
    arena: &RelationArena,
    root: RelId,
    r_log: &[(bool, Vec<i32>)],
    s_log: &[(bool, Vec<i32>)],
    s_width: usize,
    interleave: bool,
) -> (HashSet<Vec<i32>>, HashSet<Vec<i32>>) {
    let types = int_types(arena);
    let mut source = FreshNameSource::new();
    let mut codegen = Codegen::new("Example", arena, &types, &mut source);
    codegen.process(root).unwrap();
    let member = codegen.storage_name(root).unwrap().as_str().to_string();
    let structure = codegen.finish();

    let mut instance = Instance::new(&structure).unwrap();
    if interleave {
        let mut r_iter = r_log.iter();
        let mut s_iter = s_log.iter();
        loop {
            match (r_iter.next(), s_iter.next()) {
                (None, None) => break,
                (r, s) => {
                    if let Some(m) = r {
                        apply(&mut instance, "R", m);
                    }
                    if let Some(m) = s {
                        apply(&mut instance, "S", m);
                    }
                }
            }
        }
    } else {
        for m in r_log {
            apply(&mut instance, "R", m);
        }
        for m in s_log {
            apply(&mut instance, "S", m);
        }
    }
    let materialized = instance.rows_of(&member).unwrap();

    let replay = |log: &[(bool, Vec<i32>)]| {
        let mut rows: Vec<Vec<i32>> = Vec::new();
        for (insert, row) in log {
            if *insert {
                if !rows.contains(row) {
                    rows.push(row.clone());
                }
            } else {
                rows.retain(|r| r != row);
            }
        }
        rows
    };
    let mut variables = BTreeMap::new();
    variables.insert(
        RelName::new("R"),
        Table::from_rows(2, replay(r_log)).unwrap(),
    );
    variables.insert(
        RelName::new("S"),
        Table::from_rows(s_width, replay(s_log)).unwrap(),
    );
    let predicates = PredicateArena::new();
    let mut interp = Interpreter::new(variables);
    interp.interpret(arena, &predicates, root).unwrap();
    let interpreted = interp.lookup(root).unwrap().row_set();

    (materialized, interpreted)
}

fn apply(instance: &mut Instance<'_>, table: &str, mutation: &(bool, Vec<i32>)) {
    let (insert, row) = mutation;
    if *insert {
        instance.insert_row(table, row).unwrap();
    } else {
        instance.delete_row(table, row).unwrap();
    }
}

fn mutation(width: usize) -> impl Strategy<Value = (bool, Vec<i32>)> {
    (
        prop::bool::weighted(0.7),
        prop::collection::vec(0..4i32, width),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Semijoin keyed on the whole right row is maintained exactly under
    /// arbitrary interleaved inserts and deletes.
    #[test]
    fn prop_semijoin_tracks_oracle(
        r_log in prop::collection::vec(mutation(2), 0..24),
        s_log in prop::collection::vec(mutation(1), 0..24),
    ) {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let s = arena.reference("S", 1);
        let root = arena.semijoin(r, s, join_on([(1, 0)]));

        let (materialized, interpreted) =
            both_sides(&arena, root, &r_log, &s_log, 1, true);
        prop_assert_eq!(materialized, interpreted);
    }

    /// Join keyed on the whole right row is maintained exactly under
    /// arbitrary interleaved inserts and deletes.
    #[test]
    fn prop_join_tracks_oracle(
        r_log in prop::collection::vec(mutation(2), 0..16),
        s_log in prop::collection::vec(mutation(1), 0..16),
    ) {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let s = arena.reference("S", 1);
        let root = arena.join(r, s, join_on([(1, 0)]));

        let (materialized, interpreted) =
            both_sides(&arena, root, &r_log, &s_log, 1, true);
        prop_assert_eq!(materialized, interpreted);
    }

    /// The difference-of-semijoin pipeline agrees with the oracle when all
    /// lhs rows arrive before the rhs rows, inserts only.
    #[test]
    fn prop_difference_tracks_oracle_on_inserts(
        r_rows in prop::collection::vec(prop::collection::vec(0..4i32, 2), 0..16),
        s_rows in prop::collection::vec(prop::collection::vec(0..4i32, 1), 0..8),
    ) {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let s = arena.reference("S", 1);
        let semijoin = arena.semijoin(r, s, join_on([(1, 0)]));
        let root = arena.difference(r, semijoin);

        let r_log: Vec<(bool, Vec<i32>)> =
            r_rows.into_iter().map(|row| (true, row)).collect();
        let s_log: Vec<(bool, Vec<i32>)> =
            s_rows.into_iter().map(|row| (true, row)).collect();
        let (materialized, interpreted) =
            both_sides(&arena, root, &r_log, &s_log, 1, false);
        prop_assert_eq!(materialized, interpreted);
    }

    /// Union of a relation with a semijoin of itself agrees with the
    /// oracle, inserts only.
    #[test]
    fn prop_union_tracks_oracle_on_inserts(
        r_rows in prop::collection::vec(prop::collection::vec(0..4i32, 2), 0..16),
        s_rows in prop::collection::vec(prop::collection::vec(0..4i32, 1), 0..8),
    ) {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let s = arena.reference("S", 1);
        let semijoin = arena.semijoin(r, s, join_on([(1, 0)]));
        let root = arena.union(r, semijoin);

        let r_log: Vec<(bool, Vec<i32>)> =
            r_rows.into_iter().map(|row| (true, row)).collect();
        let s_log: Vec<(bool, Vec<i32>)> =
            s_rows.into_iter().map(|row| (true, row)).collect();
        let (materialized, interpreted) =
            both_sides(&arena, root, &r_log, &s_log, 1, false);
        prop_assert_eq!(materialized, interpreted);
    }
}
