//! Relation IR
//!
//! The algebraic term language: table references, joins, semijoins, union,
//! difference, selection, scalar map, column views, and unary negation.
//! Nodes are owned by a [`RelationArena`] which hands out copyable
//! [`RelId`]s. Downstream passes (type environment, code generator,
//! interpreter) key maps on node identity, so a sub-term shared between two
//! parents is stored once and referenced twice — the code generator relies
//! on this to materialize shared views only once.
//!
//! `arity()` enforces the per-variant shape invariants. A violation means a
//! type error slipped past the typechecker and is reported as a fatal
//! `Internal` error; there is no implicit coercion between variants.

use std::collections::BTreeSet;

use crate::attr::{present_count, Attr, AttrPartialPermutation};
use crate::error::{Error, Result};
use crate::predicate::{Predicate, PredicateArena, PredId};

/// Stable identity of a relation node within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelId(pub(crate) usize);

/// Name of a base table or generated relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelName(pub String);

impl RelName {
    pub fn new(name: impl Into<String>) -> Self {
        RelName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered, deduplicated set of `(left, right)` column pairs constraining a
/// join or semijoin. The ordering makes textual forms and structural
/// comparisons canonical.
pub type JoinOn = BTreeSet<(Attr, Attr)>;

/// Build a [`JoinOn`] from pairs, deduplicating as it goes.
pub fn join_on<const N: usize>(pairs: [(Attr, Attr); N]) -> JoinOn {
    pairs.into_iter().collect()
}

/// The left column of every pair, in canonical order.
pub fn lhs_indices(on: &JoinOn) -> Vec<Attr> {
    on.iter().map(|(l, _)| *l).collect()
}

/// The right column of every pair, in canonical order.
pub fn rhs_indices(on: &JoinOn) -> Vec<Attr> {
    on.iter().map(|(_, r)| *r).collect()
}

/// Swap each pair; turns "join child to parent on" into the parent-side view.
pub fn flip_join_on(on: &JoinOn) -> JoinOn {
    on.iter().map(|(l, r)| (*r, *l)).collect()
}

/// A scalar function applied tuple-wise by `Map`, with declared arities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarFn {
    pub name: String,
    pub arguments: usize,
    pub results: usize,
}

/// A relation node. Child links are arena ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// A named base table with a declared arity
    Ref {
        name: RelName,
        arity: usize,
        local: bool,
    },
    /// Unary negation; same arity as the child
    Not(RelId),
    /// Equi-join on ordered column pairs; right `on` columns are dropped
    Join { lhs: RelId, rhs: RelId, on: JoinOn },
    /// Keeps lhs tuples whose `on`-projection matches some rhs tuple
    Semijoin { lhs: RelId, rhs: RelId, on: JoinOn },
    /// Set union of equal-arity operands
    Union { lhs: RelId, rhs: RelId },
    /// Set difference of equal-arity operands
    Difference { lhs: RelId, rhs: RelId },
    /// Rows satisfying a predicate
    Select { predicate: PredId, rel: RelId },
    /// Tuple-wise scalar function application
    Map { function: ScalarFn, rel: RelId },
    /// Column permutation/projection through a partial permutation
    View {
        perm: AttrPartialPermutation,
        rel: RelId,
    },
}

/// Arena owning every relation node of a compilation unit.
#[derive(Debug, Default)]
pub struct RelationArena {
    nodes: Vec<Relation>,
}

impl RelationArena {
    pub fn new() -> Self {
        RelationArena { nodes: Vec::new() }
    }

    fn alloc(&mut self, node: Relation) -> RelId {
        let id = RelId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn reference(&mut self, name: impl Into<String>, arity: usize) -> RelId {
        self.alloc(Relation::Ref {
            name: RelName::new(name),
            arity,
            local: false,
        })
    }

    pub fn local_reference(&mut self, name: impl Into<String>, arity: usize) -> RelId {
        self.alloc(Relation::Ref {
            name: RelName::new(name),
            arity,
            local: true,
        })
    }

    pub fn not(&mut self, rel: RelId) -> RelId {
        self.alloc(Relation::Not(rel))
    }

    pub fn join(&mut self, lhs: RelId, rhs: RelId, on: JoinOn) -> RelId {
        self.alloc(Relation::Join { lhs, rhs, on })
    }

    pub fn semijoin(&mut self, lhs: RelId, rhs: RelId, on: JoinOn) -> RelId {
        self.alloc(Relation::Semijoin { lhs, rhs, on })
    }

    pub fn union(&mut self, lhs: RelId, rhs: RelId) -> RelId {
        self.alloc(Relation::Union { lhs, rhs })
    }

    pub fn difference(&mut self, lhs: RelId, rhs: RelId) -> RelId {
        self.alloc(Relation::Difference { lhs, rhs })
    }

    pub fn select(&mut self, predicate: PredId, rel: RelId) -> RelId {
        self.alloc(Relation::Select { predicate, rel })
    }

    pub fn map(&mut self, function: ScalarFn, rel: RelId) -> RelId {
        self.alloc(Relation::Map { function, rel })
    }

    pub fn view(&mut self, perm: AttrPartialPermutation, rel: RelId) -> RelId {
        self.alloc(Relation::View { perm, rel })
    }

    /// Borrow a node. Ids from a different arena are an internal error.
    pub fn get(&self, id: RelId) -> Result<&Relation> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::internal(format!("unknown relation id {}", id.0)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = RelId> {
        (0..self.nodes.len()).map(RelId)
    }

    /// Number of columns in the node's tuples, enforcing per-variant shape
    /// invariants. Violations are type errors that reached the back-end.
    pub fn arity(&self, id: RelId) -> Result<usize> {
        match self.get(id)? {
            Relation::Ref { arity, .. } => Ok(*arity),
            Relation::Not(rel) => self.arity(*rel),
            Relation::Join { lhs, rhs, on } => {
                let lhs_arity = self.arity(*lhs)?;
                let rhs_arity = self.arity(*rhs)?;
                for (l, r) in on {
                    if *l >= lhs_arity || *r >= rhs_arity {
                        return Err(Error::internal(format!(
                            "type error got past the typechecker: join column ({l}, {r}) \
                             out of range for arities ({lhs_arity}, {rhs_arity})"
                        )));
                    }
                }
                let result = lhs_arity + rhs_arity;
                if on.len() > result {
                    return Err(Error::internal(
                        "type error got past the typechecker: negative join arity",
                    ));
                }
                Ok(result - on.len())
            }
            Relation::Semijoin { lhs, rhs, on } => {
                let lhs_arity = self.arity(*lhs)?;
                let rhs_arity = self.arity(*rhs)?;
                for (l, r) in on {
                    if *l >= lhs_arity || *r >= rhs_arity {
                        return Err(Error::internal(format!(
                            "type error got past the typechecker: semijoin column ({l}, {r}) \
                             out of range for arities ({lhs_arity}, {rhs_arity})"
                        )));
                    }
                }
                Ok(lhs_arity)
            }
            Relation::Union { lhs, rhs } | Relation::Difference { lhs, rhs } => {
                let lhs_arity = self.arity(*lhs)?;
                let rhs_arity = self.arity(*rhs)?;
                if lhs_arity != rhs_arity {
                    return Err(Error::internal(format!(
                        "type error got past the typechecker: operand arities {lhs_arity} \
                         and {rhs_arity} differ"
                    )));
                }
                Ok(lhs_arity)
            }
            Relation::Select { rel, .. } => self.arity(*rel),
            Relation::Map { function, rel } => {
                let input_arity = self.arity(*rel)?;
                if function.arguments != input_arity {
                    return Err(Error::internal(format!(
                        "type error got past the typechecker: function {} takes {} columns \
                         but input has {}",
                        function.name, function.arguments, input_arity
                    )));
                }
                Ok(function.results)
            }
            Relation::View { perm, rel } => {
                let input_arity = self.arity(*rel)?;
                if perm.len() != input_arity {
                    return Err(Error::internal(format!(
                        "type error got past the typechecker: view permutation length {} \
                         does not match input arity {}",
                        perm.len(),
                        input_arity
                    )));
                }
                let count = present_count(perm);
                let mut seen = vec![false; count];
                for target in perm.iter().flatten() {
                    if *target >= count || seen[*target] {
                        return Err(Error::internal(
                            "type error got past the typechecker: view permutation targets \
                             are not a bijection onto the output",
                        ));
                    }
                    seen[*target] = true;
                }
                Ok(count)
            }
        }
    }

    /// Whether any reference in the node's closure is a local relation.
    pub fn is_local(&self, id: RelId) -> Result<bool> {
        match self.get(id)? {
            Relation::Ref { local, .. } => Ok(*local),
            Relation::Not(rel)
            | Relation::Select { rel, .. }
            | Relation::Map { rel, .. }
            | Relation::View { rel, .. } => self.is_local(*rel),
            Relation::Join { lhs, rhs, .. }
            | Relation::Semijoin { lhs, rhs, .. }
            | Relation::Union { lhs, rhs }
            | Relation::Difference { lhs, rhs } => {
                Ok(self.is_local(*lhs)? || self.is_local(*rhs)?)
            }
        }
    }

    /// Canonical textual form. Identity views render as their underlying
    /// relation so the canonical permutation is invisible.
    pub fn display(&self, id: RelId, predicates: &PredicateArena) -> Result<String> {
        match self.get(id)? {
            Relation::Ref { name, .. } => Ok(name.to_string()),
            Relation::Not(rel) => Ok(format!("!{}", self.display(*rel, predicates)?)),
            Relation::Join { lhs, rhs, on } => Ok(format!(
                "Join([{}], {}, {})",
                display_join_on(on),
                self.display(*lhs, predicates)?,
                self.display(*rhs, predicates)?
            )),
            Relation::Semijoin { lhs, rhs, on } => Ok(format!(
                "Semijoin([{}], {}, {})",
                display_join_on(on),
                self.display(*lhs, predicates)?,
                self.display(*rhs, predicates)?
            )),
            Relation::Union { lhs, rhs } => Ok(format!(
                "Union({}, {})",
                self.display(*lhs, predicates)?,
                self.display(*rhs, predicates)?
            )),
            Relation::Difference { lhs, rhs } => Ok(format!(
                "Difference({}, {})",
                self.display(*lhs, predicates)?,
                self.display(*rhs, predicates)?
            )),
            Relation::Select { predicate, rel } => Ok(format!(
                "Select({}, {})",
                predicates.display(*predicate)?,
                self.display(*rel, predicates)?
            )),
            Relation::Map { function, rel } => Ok(format!(
                "Map({}, {}, {}, {})",
                function.name,
                function.arguments,
                function.results,
                self.display(*rel, predicates)?
            )),
            Relation::View { perm, rel } => {
                let identity = perm.len() == present_count(perm)
                    && perm.iter().enumerate().all(|(i, a)| *a == Some(i));
                if identity {
                    return self.display(*rel, predicates);
                }
                let entries: Vec<String> = perm
                    .iter()
                    .map(|a| match a {
                        Some(attr) => attr.to_string(),
                        None => "ø".to_string(),
                    })
                    .collect();
                Ok(format!(
                    "View([{}], {})",
                    entries.join(", "),
                    self.display(*rel, predicates)?
                ))
            }
        }
    }

    /// Structural equality across arenas, ignoring shared-subterm identity.
    pub fn structurally_equal(
        &self,
        id: RelId,
        predicates: &PredicateArena,
        other: &RelationArena,
        other_id: RelId,
        other_predicates: &PredicateArena,
    ) -> Result<bool> {
        let result = match (self.get(id)?, other.get(other_id)?) {
            (
                Relation::Ref { name, arity, local },
                Relation::Ref {
                    name: n2,
                    arity: a2,
                    local: l2,
                },
            ) => name == n2 && arity == a2 && local == l2,
            (Relation::Not(a), Relation::Not(b)) => {
                self.structurally_equal(*a, predicates, other, *b, other_predicates)?
            }
            (
                Relation::Join { lhs, rhs, on },
                Relation::Join {
                    lhs: l2,
                    rhs: r2,
                    on: o2,
                },
            )
            | (
                Relation::Semijoin { lhs, rhs, on },
                Relation::Semijoin {
                    lhs: l2,
                    rhs: r2,
                    on: o2,
                },
            ) => {
                on == o2
                    && self.structurally_equal(*lhs, predicates, other, *l2, other_predicates)?
                    && self.structurally_equal(*rhs, predicates, other, *r2, other_predicates)?
            }
            (Relation::Union { lhs, rhs }, Relation::Union { lhs: l2, rhs: r2 })
            | (Relation::Difference { lhs, rhs }, Relation::Difference { lhs: l2, rhs: r2 }) => {
                self.structurally_equal(*lhs, predicates, other, *l2, other_predicates)?
                    && self.structurally_equal(*rhs, predicates, other, *r2, other_predicates)?
            }
            (
                Relation::Select { predicate, rel },
                Relation::Select {
                    predicate: p2,
                    rel: r2,
                },
            ) => {
                predicates_equal(predicates, *predicate, other_predicates, *p2)?
                    && self.structurally_equal(*rel, predicates, other, *r2, other_predicates)?
            }
            (
                Relation::Map { function, rel },
                Relation::Map {
                    function: f2,
                    rel: r2,
                },
            ) => {
                function == f2
                    && self.structurally_equal(*rel, predicates, other, *r2, other_predicates)?
            }
            (Relation::View { perm, rel }, Relation::View { perm: p2, rel: r2 }) => {
                perm == p2
                    && self.structurally_equal(*rel, predicates, other, *r2, other_predicates)?
            }
            _ => false,
        };
        Ok(result)
    }
}

fn display_join_on(on: &JoinOn) -> String {
    let pairs: Vec<String> = on.iter().map(|(l, r)| format!("({l}, {r})")).collect();
    pairs.join(", ")
}

/// Structural equality of predicates across arenas.
pub fn predicates_equal(
    a_arena: &PredicateArena,
    a: PredId,
    b_arena: &PredicateArena,
    b: PredId,
) -> Result<bool> {
    let result = match (a_arena.get(a)?, b_arena.get(b)?) {
        (Predicate::And(xs), Predicate::And(ys)) | (Predicate::Or(xs), Predicate::Or(ys)) => {
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (x, y) in xs.iter().zip(ys.iter()) {
                if !predicates_equal(a_arena, *x, b_arena, *y)? {
                    return Ok(false);
                }
            }
            true
        }
        (Predicate::Not(x), Predicate::Not(y)) => predicates_equal(a_arena, *x, b_arena, *y)?,
        (Predicate::Like(attr, s), Predicate::Like(a2, s2)) => attr == a2 && s == s2,
        (Predicate::LessThan(attr, v), Predicate::LessThan(a2, v2))
        | (Predicate::Equals(attr, v), Predicate::Equals(a2, v2)) => attr == a2 && v == v2,
        _ => false,
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_arity_drops_right_columns() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 3);
        let s = arena.reference("S", 2);
        let j = arena.join(r, s, join_on([(2, 0)]));
        assert_eq!(arena.arity(j).unwrap(), 4);
    }

    #[test]
    fn test_join_column_out_of_range() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let s = arena.reference("S", 2);
        let j = arena.join(r, s, join_on([(5, 0)]));
        assert!(matches!(arena.arity(j), Err(Error::Internal(_))));
    }

    #[test]
    fn test_semijoin_keeps_lhs_arity() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 3);
        let s = arena.reference("S", 2);
        let sj = arena.semijoin(r, s, join_on([(2, 0)]));
        assert_eq!(arena.arity(sj).unwrap(), 3);
    }

    #[test]
    fn test_union_arity_mismatch() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 3);
        let s = arena.reference("S", 2);
        let u = arena.union(r, s);
        assert!(matches!(arena.arity(u), Err(Error::Internal(_))));

        let d = arena.difference(r, s);
        assert!(matches!(arena.arity(d), Err(Error::Internal(_))));
    }

    #[test]
    fn test_map_arity_checks_function() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let good = ScalarFn {
            name: "f".to_string(),
            arguments: 2,
            results: 5,
        };
        let m = arena.map(good, r);
        assert_eq!(arena.arity(m).unwrap(), 5);

        let bad = ScalarFn {
            name: "g".to_string(),
            arguments: 3,
            results: 1,
        };
        let m2 = arena.map(bad, r);
        assert!(matches!(arena.arity(m2), Err(Error::Internal(_))));
    }

    #[test]
    fn test_view_arity_counts_present_entries() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 3);
        let v = arena.view(vec![Some(1), None, Some(0)], r);
        assert_eq!(arena.arity(v).unwrap(), 2);
    }

    #[test]
    fn test_view_rejects_non_bijection() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let v = arena.view(vec![Some(0), Some(0)], r);
        assert!(matches!(arena.arity(v), Err(Error::Internal(_))));
    }

    #[test]
    fn test_join_on_is_ordered_and_deduplicated() {
        let on = join_on([(2, 0), (1, 1), (2, 0)]);
        assert_eq!(on.len(), 2);
        assert_eq!(lhs_indices(&on), vec![1, 2]);
        assert_eq!(rhs_indices(&on), vec![1, 0]);
        assert_eq!(flip_join_on(&on), join_on([(0, 2), (1, 1)]));
    }

    #[test]
    fn test_display_canonical_forms() {
        let mut arena = RelationArena::new();
        let preds = PredicateArena::new();
        let r = arena.reference("R", 3);
        let s = arena.reference("S", 2);
        let j = arena.join(r, s, join_on([(2, 0), (0, 1)]));
        assert_eq!(
            arena.display(j, &preds).unwrap(),
            "Join([(0, 1), (2, 0)], R, S)"
        );

        let v = arena.view(vec![Some(1), None, Some(0)], r);
        assert_eq!(arena.display(v, &preds).unwrap(), "View([1, ø, 0], R)");

        let identity = arena.view(vec![Some(0), Some(1), Some(2)], r);
        assert_eq!(arena.display(identity, &preds).unwrap(), "R");
    }

    #[test]
    fn test_local_flag_propagates() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let l = arena.local_reference("tmp", 2);
        let u = arena.union(r, l);
        assert!(!arena.is_local(r).unwrap());
        assert!(arena.is_local(u).unwrap());
    }

    #[test]
    fn test_shared_subterm_is_one_node() {
        let mut arena = RelationArena::new();
        let r = arena.reference("R", 2);
        let u = arena.union(r, r);
        let before = arena.len();
        assert_eq!(arena.arity(u).unwrap(), 2);
        assert_eq!(before, 2);
    }
}
