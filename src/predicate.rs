//! Predicate IR
//!
//! Boolean predicates over a single tuple: conjunction, disjunction,
//! negation, `LIKE`, `<`, `=`. Nodes are owned by a [`PredicateArena`]
//! which hands out copyable [`PredId`]s; sharing a sub-predicate between
//! parents is just reusing its id.
//!
//! Evaluation is total except for `Like`, which is an open hook and fails
//! loudly with `NotImplemented`.

use crate::attr::Attr;
use crate::error::{Error, Result};

/// Stable identity of a predicate node within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredId(pub(crate) usize);

/// A predicate over a tuple of integers.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Conjunction; true on the empty list
    And(Vec<PredId>),
    /// Disjunction; false on the empty list
    Or(Vec<PredId>),
    /// Negation
    Not(PredId),
    /// SQL-style pattern match; semantics are an open hook
    Like(Attr, String),
    /// Column strictly less than a constant
    LessThan(Attr, i32),
    /// Column equal to a constant
    Equals(Attr, i32),
}

/// Arena owning every predicate node of a compilation unit.
#[derive(Debug, Default)]
pub struct PredicateArena {
    nodes: Vec<Predicate>,
}

impl PredicateArena {
    pub fn new() -> Self {
        PredicateArena { nodes: Vec::new() }
    }

    fn alloc(&mut self, node: Predicate) -> PredId {
        let id = PredId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn and(&mut self, children: Vec<PredId>) -> PredId {
        self.alloc(Predicate::And(children))
    }

    pub fn or(&mut self, children: Vec<PredId>) -> PredId {
        self.alloc(Predicate::Or(children))
    }

    pub fn not(&mut self, child: PredId) -> PredId {
        self.alloc(Predicate::Not(child))
    }

    pub fn like(&mut self, attr: Attr, pattern: impl Into<String>) -> PredId {
        self.alloc(Predicate::Like(attr, pattern.into()))
    }

    pub fn less_than(&mut self, attr: Attr, value: i32) -> PredId {
        self.alloc(Predicate::LessThan(attr, value))
    }

    pub fn equals(&mut self, attr: Attr, value: i32) -> PredId {
        self.alloc(Predicate::Equals(attr, value))
    }

    /// Borrow a node. Ids from a different arena are an internal error.
    pub fn get(&self, id: PredId) -> Result<&Predicate> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::internal(format!("unknown predicate id {}", id.0)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Evaluate a predicate against a concrete tuple.
    ///
    /// Out-of-range attributes were rejected by typechecking; hitting one
    /// here is an internal error. `Like` is unimplemented by design.
    pub fn eval(&self, id: PredId, tuple: &[i32]) -> Result<bool> {
        match self.get(id)?.clone() {
            Predicate::And(children) => {
                let mut result = true;
                for child in children {
                    result &= self.eval(child, tuple)?;
                }
                Ok(result)
            }
            Predicate::Or(children) => {
                let mut result = false;
                for child in children {
                    result |= self.eval(child, tuple)?;
                }
                Ok(result)
            }
            Predicate::Not(child) => Ok(!self.eval(child, tuple)?),
            Predicate::Like(_, _) => Err(Error::not_implemented(
                "predicate evaluation does not yet support LIKE",
            )),
            Predicate::LessThan(attr, value) => {
                let column = self.column(tuple, attr)?;
                Ok(column < value)
            }
            Predicate::Equals(attr, value) => {
                let column = self.column(tuple, attr)?;
                Ok(column == value)
            }
        }
    }

    fn column(&self, tuple: &[i32], attr: Attr) -> Result<i32> {
        tuple.get(attr).copied().ok_or_else(|| {
            Error::internal(format!(
                "attribute {} out of range for tuple of width {}",
                attr,
                tuple.len()
            ))
        })
    }

    /// Canonical textual form: `(attr0 < 5)`, `(attr1 = 3)`,
    /// `(attr2 LIKE "x%")`, `(p && q)`, `(p || q)`, `!p`.
    pub fn display(&self, id: PredId) -> Result<String> {
        match self.get(id)? {
            Predicate::And(children) => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|c| self.display(*c))
                    .collect::<Result<_>>()?;
                Ok(format!("({})", parts.join(" && ")))
            }
            Predicate::Or(children) => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|c| self.display(*c))
                    .collect::<Result<_>>()?;
                Ok(format!("({})", parts.join(" || ")))
            }
            Predicate::Not(child) => Ok(format!("!{}", self.display(*child)?)),
            Predicate::Like(attr, pattern) => {
                Ok(format!("(attr{attr} LIKE \"{pattern}\")"))
            }
            Predicate::LessThan(attr, value) => Ok(format!("(attr{attr} < {value})")),
            Predicate::Equals(attr, value) => Ok(format!("(attr{attr} = {value})")),
        }
    }
}
