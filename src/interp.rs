//! Reference Interpreter
//!
//! Executes relation terms directly against in-memory tables. This is the
//! semantic oracle the generated structures are tested against: run the
//! same mutations through both, then compare result sets.
//!
//! Supports references, join, semijoin, union, difference, select, and
//! view. `Map` needs scalar-function evaluation, which is out of scope, and
//! top-level negation has no finite table; both report errors. Results are
//! memoized by node identity so shared sub-terms are computed once.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::attr::Attr;
use crate::error::{Error, Result};
use crate::predicate::PredicateArena;
use crate::relation::{Relation, RelationArena, RelId, RelName};

/// A table value: integer columns.
pub type Value = i32;

/// One row of a table.
pub type Row = Vec<Value>;

/// A row-major table with a declared width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    width: usize,
    values: Vec<Value>,
}

impl Table {
    pub fn new(width: usize) -> Self {
        Table {
            width,
            values: Vec::new(),
        }
    }

    /// Build a table from explicit rows.
    pub fn from_rows(width: usize, rows: impl IntoIterator<Item = Row>) -> Result<Self> {
        let mut table = Table::new(width);
        for row in rows {
            table.insert_tuple(&row)?;
        }
        Ok(table)
    }

    pub fn tuple(&self, index: usize) -> Row {
        self.values[index * self.width..(index + 1) * self.width].to_vec()
    }

    pub fn insert_tuple(&mut self, tuple: &[Value]) -> Result<()> {
        if tuple.len() != self.width {
            return Err(Error::internal(
                "given tuple does not match table width",
            ));
        }
        self.values.extend_from_slice(tuple);
        Ok(())
    }

    pub fn len(&self) -> usize {
        if self.width == 0 {
            return 0;
        }
        self.values.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.len()).map(|i| self.tuple(i))
    }

    /// The table's contents as a set, for order-insensitive comparison.
    pub fn row_set(&self) -> HashSet<Row> {
        self.rows().collect()
    }
}

/// Interpreter over a fixed base-table environment.
pub struct Interpreter {
    variables: BTreeMap<RelName, Table>,
    context: HashMap<RelId, Table>,
}

impl Interpreter {
    pub fn new(variables: BTreeMap<RelName, Table>) -> Self {
        Interpreter {
            variables,
            context: HashMap::new(),
        }
    }

    /// Evaluate the term and every sub-term, memoizing by node identity.
    pub fn interpret(
        &mut self,
        arena: &RelationArena,
        predicates: &PredicateArena,
        input: RelId,
    ) -> Result<()> {
        if self.context.contains_key(&input) {
            return Ok(());
        }

        let result = match arena.get(input)?.clone() {
            Relation::Ref { name, .. } => self
                .variables
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::precondition(format!("no table bound for {name}")))?,
            Relation::Join { lhs, rhs, on } => {
                self.interpret(arena, predicates, lhs)?;
                self.interpret(arena, predicates, rhs)?;
                let width = arena.arity(input)?;
                let lhs_table = &self.context[&lhs];
                let rhs_table = &self.context[&rhs];

                let dropped: HashSet<Attr> = on.iter().map(|(_, r)| *r).collect();
                let mut result = Table::new(width);
                for lhs_tuple in lhs_table.rows() {
                    for rhs_tuple in rhs_table.rows() {
                        let matches = on
                            .iter()
                            .all(|(x, y)| lhs_tuple[*x] == rhs_tuple[*y]);
                        if !matches {
                            continue;
                        }
                        let mut row = lhs_tuple.clone();
                        for (k, value) in rhs_tuple.iter().enumerate() {
                            if !dropped.contains(&k) {
                                row.push(*value);
                            }
                        }
                        result.insert_tuple(&row)?;
                    }
                }
                result
            }
            Relation::Semijoin { lhs, rhs, on } => {
                self.interpret(arena, predicates, lhs)?;
                self.interpret(arena, predicates, rhs)?;
                let width = arena.arity(input)?;
                let lhs_table = &self.context[&lhs];
                let rhs_table = &self.context[&rhs];

                let mut restricted_rhs: HashSet<Row> = HashSet::new();
                for tuple in rhs_table.rows() {
                    restricted_rhs.insert(on.iter().map(|(_, y)| tuple[*y]).collect());
                }

                let mut result = Table::new(width);
                for tuple in lhs_table.rows() {
                    let restricted: Row = on.iter().map(|(x, _)| tuple[*x]).collect();
                    if restricted_rhs.contains(&restricted) {
                        result.insert_tuple(&tuple)?;
                    }
                }
                result
            }
            Relation::Union { lhs, rhs } => {
                self.interpret(arena, predicates, lhs)?;
                self.interpret(arena, predicates, rhs)?;
                let width = arena.arity(input)?;
                let mut result = Table::new(width);
                for tuple in self.context[&lhs].rows() {
                    result.insert_tuple(&tuple)?;
                }
                for tuple in self.context[&rhs].rows() {
                    result.insert_tuple(&tuple)?;
                }
                result
            }
            Relation::Difference { lhs, rhs } => {
                self.interpret(arena, predicates, lhs)?;
                self.interpret(arena, predicates, rhs)?;
                let width = arena.arity(input)?;
                let excluded = self.context[&rhs].row_set();
                let mut result = Table::new(width);
                for tuple in self.context[&lhs].rows() {
                    if !excluded.contains(&tuple) {
                        result.insert_tuple(&tuple)?;
                    }
                }
                result
            }
            Relation::Select { predicate, rel } => {
                self.interpret(arena, predicates, rel)?;
                let width = arena.arity(input)?;
                let source = self.context[&rel].clone();
                let mut result = Table::new(width);
                for tuple in source.rows() {
                    if predicates.eval(predicate, &tuple)? {
                        result.insert_tuple(&tuple)?;
                    }
                }
                result
            }
            Relation::Map { .. } => {
                return Err(Error::not_implemented("interpreter cannot support Map"));
            }
            Relation::Not(_) => {
                return Err(Error::not_implemented(
                    "interpreter cannot support top-level negation",
                ));
            }
            Relation::View { perm, rel } => {
                self.interpret(arena, predicates, rel)?;
                let width = arena.arity(input)?;
                let source = &self.context[&rel];
                let mut result = Table::new(width);
                for tuple in source.rows() {
                    let mut row = vec![Value::default(); width];
                    for (j, target) in perm.iter().enumerate() {
                        if let Some(target) = target {
                            row[*target] = tuple[j];
                        }
                    }
                    result.insert_tuple(&row)?;
                }
                result
            }
        };

        self.context.insert(input, result);
        Ok(())
    }

    /// The materialized result of a previously interpreted term.
    pub fn lookup(&self, input: RelId) -> Option<&Table> {
        self.context.get(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::join_on;

    fn base_tables() -> (RelationArena, BTreeMap<RelName, Table>, RelId, RelId) {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 3);
        let s = arena.reference("S", 2);

        let r_table = Table::from_rows(
            3,
            vec![
                vec![500, 3415, 1000],
                vec![501, 2241, 1001],
                vec![502, 3401, 1000],
                vec![503, 2202, 1002],
            ],
        )
        .unwrap();
        let s_table =
            Table::from_rows(2, vec![vec![1001, 501], vec![1002, 503]]).unwrap();

        let mut variables = BTreeMap::new();
        variables.insert(RelName::new("R"), r_table);
        variables.insert(RelName::new("S"), s_table);
        (arena, variables, r, s)
    }

    #[test]
    fn test_semijoin_keeps_matching_lhs_tuples() {
        let (mut arena, variables, r, s) = base_tables();
        let predicates = PredicateArena::new();
        let semijoin = arena.semijoin(r, s, join_on([(2, 0)]));

        let mut interp = Interpreter::new(variables);
        interp.interpret(&arena, &predicates, semijoin).unwrap();

        let result = interp.lookup(semijoin).unwrap().row_set();
        let expected: HashSet<Row> =
            [vec![501, 2241, 1001], vec![503, 2202, 1002]].into();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_join_drops_right_on_columns() {
        let (mut arena, mut variables, r, s) = base_tables();
        let predicates = PredicateArena::new();
        variables
            .get_mut(&RelName::new("S"))
            .unwrap()
            .insert_tuple(&[1002, 504])
            .unwrap();
        let join = arena.join(r, s, join_on([(2, 0)]));

        let mut interp = Interpreter::new(variables);
        interp.interpret(&arena, &predicates, join).unwrap();

        let result = interp.lookup(join).unwrap().row_set();
        let expected: HashSet<Row> = [
            vec![501, 2241, 1001, 501],
            vec![503, 2202, 1002, 503],
            vec![503, 2202, 1002, 504],
        ]
        .into();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_union_and_difference() {
        let mut arena = RelationArena::new();
        let predicates = PredicateArena::new();
        let a = arena.reference("A", 1);
        let b = arena.reference("B", 1);
        let union = arena.union(a, b);
        let difference = arena.difference(a, b);

        let mut variables = BTreeMap::new();
        variables.insert(
            RelName::new("A"),
            Table::from_rows(1, vec![vec![1], vec![2]]).unwrap(),
        );
        variables.insert(
            RelName::new("B"),
            Table::from_rows(1, vec![vec![2], vec![3]]).unwrap(),
        );

        let mut interp = Interpreter::new(variables);
        interp.interpret(&arena, &predicates, union).unwrap();
        interp.interpret(&arena, &predicates, difference).unwrap();

        let union_set = interp.lookup(union).unwrap().row_set();
        assert_eq!(union_set, [vec![1], vec![2], vec![3]].into());
        let difference_set = interp.lookup(difference).unwrap().row_set();
        assert_eq!(difference_set, [vec![1]].into());
    }

    #[test]
    fn test_select_filters_rows() {
        let mut arena = RelationArena::new();
        let mut predicates = PredicateArena::new();
        let a = arena.reference("A", 2);
        let pred = predicates.less_than(1, 10);
        let select = arena.select(pred, a);

        let mut variables = BTreeMap::new();
        variables.insert(
            RelName::new("A"),
            Table::from_rows(2, vec![vec![1, 5], vec![2, 50], vec![3, 9]]).unwrap(),
        );

        let mut interp = Interpreter::new(variables);
        interp.interpret(&arena, &predicates, select).unwrap();
        let result = interp.lookup(select).unwrap().row_set();
        assert_eq!(result, [vec![1, 5], vec![3, 9]].into());
    }

    #[test]
    fn test_view_permutes_and_drops_columns() {
        let mut arena = RelationArena::new();
        let predicates = PredicateArena::new();
        let a = arena.reference("A", 3);
        let view = arena.view(vec![Some(1), None, Some(0)], a);

        let mut variables = BTreeMap::new();
        variables.insert(
            RelName::new("A"),
            Table::from_rows(3, vec![vec![1, 2, 3]]).unwrap(),
        );

        let mut interp = Interpreter::new(variables);
        interp.interpret(&arena, &predicates, view).unwrap();
        let result = interp.lookup(view).unwrap().row_set();
        // column 0 lands in slot 1, column 2 in slot 0, column 1 dropped
        assert_eq!(result, [vec![3, 1]].into());
    }

    #[test]
    fn test_map_is_unsupported() {
        let mut arena = RelationArena::new();
        let predicates = PredicateArena::new();
        let a = arena.reference("A", 1);
        let mapped = arena.map(
            crate::relation::ScalarFn {
                name: "f".to_string(),
                arguments: 1,
                results: 1,
            },
            a,
        );

        let mut variables = BTreeMap::new();
        variables.insert(RelName::new("A"), Table::new(1));
        let mut interp = Interpreter::new(variables);
        assert!(matches!(
            interp.interpret(&arena, &predicates, mapped),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_shared_subterm_memoized() {
        let (mut arena, variables, r, s) = base_tables();
        let predicates = PredicateArena::new();
        let semijoin = arena.semijoin(r, s, join_on([(2, 0)]));
        let union = arena.union(semijoin, semijoin);

        let mut interp = Interpreter::new(variables);
        interp.interpret(&arena, &predicates, union).unwrap();
        assert_eq!(
            interp.lookup(union).unwrap().row_set(),
            interp.lookup(semijoin).unwrap().row_set()
        );
    }
}
