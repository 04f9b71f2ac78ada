//! Textual Forms
//!
//! Re-parsers for the canonical textual forms produced by
//! [`RelationArena::display`] and [`PredicateArena::display`]. Re-parsing a
//! rendered term yields a structurally equal term (modulo shared-subterm
//! identity), which is the round-trip property the test suite checks.
//!
//! Base-table references render as bare names, so parsing needs a
//! [`TableCatalog`] supplying each table's arity (and locality). An empty
//! conjunction and an empty disjunction both render as `()`; the parser
//! reads that as the empty conjunction.

use std::collections::BTreeMap;

use crate::attr::{Attr, AttrPartialPermutation};
use crate::error::{Error, Result};
use crate::predicate::{PredicateArena, PredId};
use crate::relation::{JoinOn, RelationArena, RelId, ScalarFn};

/// Declared base tables: name to (arity, local).
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: BTreeMap<String, (usize, bool)>,
}

impl TableCatalog {
    pub fn new() -> Self {
        TableCatalog {
            tables: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, arity: usize) {
        self.tables.insert(name.into(), (arity, false));
    }

    pub fn register_local(&mut self, name: impl Into<String>, arity: usize) {
        self.tables.insert(name.into(), (arity, true));
    }

    pub fn lookup(&self, name: &str) -> Option<(usize, bool)> {
        self.tables.get(name).copied()
    }
}

/// Parse a relation's textual form, allocating nodes into the given arenas.
pub fn parse_relation(
    input: &str,
    catalog: &TableCatalog,
    relations: &mut RelationArena,
    predicates: &mut PredicateArena,
) -> Result<RelId> {
    let mut parser = Parser::new(input);
    let rel = parser.relation(catalog, relations, predicates)?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("trailing input after relation"));
    }
    Ok(rel)
}

/// Parse a predicate's textual form, allocating nodes into the arena.
pub fn parse_predicate(input: &str, predicates: &mut PredicateArena) -> Result<PredId> {
    let mut parser = Parser::new(input);
    let pred = parser.predicate(predicates)?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("trailing input after predicate"));
    }
    Ok(pred)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Parser {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::precondition(format!("parse error at offset {}: {message}", self.pos))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, wanted: char) -> Result<()> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            _ => Err(self.error(&format!("expected '{wanted}'"))),
        }
    }

    fn eat(&mut self, wanted: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(wanted) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, wanted: &str) -> bool {
        self.skip_whitespace();
        let end = self.pos + wanted.chars().count();
        if end <= self.chars.len()
            && self.chars[self.pos..end].iter().copied().eq(wanted.chars())
        {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn identifier(&mut self) -> Result<String> {
        self.skip_whitespace();
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() || name.chars().next().is_some_and(char::is_numeric) {
            return Err(self.error("expected an identifier"));
        }
        Ok(name)
    }

    fn number(&mut self) -> Result<i64> {
        self.skip_whitespace();
        let negative = self.eat('-');
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.error("expected a number"));
        }
        let value: i64 = digits
            .parse()
            .map_err(|_| self.error("number out of range"))?;
        Ok(if negative { -value } else { value })
    }

    fn usize_number(&mut self) -> Result<usize> {
        let value = self.number()?;
        usize::try_from(value).map_err(|_| self.error("expected a nonnegative number"))
    }

    fn join_pairs(&mut self) -> Result<JoinOn> {
        self.expect('[')?;
        let mut on = JoinOn::new();
        if self.eat(']') {
            return Ok(on);
        }
        loop {
            self.expect('(')?;
            let left = self.usize_number()? as Attr;
            self.expect(',')?;
            let right = self.usize_number()? as Attr;
            self.expect(')')?;
            on.insert((left, right));
            if self.eat(']') {
                return Ok(on);
            }
            self.expect(',')?;
        }
    }

    fn partial_permutation(&mut self) -> Result<AttrPartialPermutation> {
        self.expect('[')?;
        let mut perm = AttrPartialPermutation::new();
        if self.eat(']') {
            return Ok(perm);
        }
        loop {
            self.skip_whitespace();
            if self.eat('ø') {
                perm.push(None);
            } else {
                perm.push(Some(self.usize_number()? as Attr));
            }
            if self.eat(']') {
                return Ok(perm);
            }
            self.expect(',')?;
        }
    }

    fn relation(
        &mut self,
        catalog: &TableCatalog,
        relations: &mut RelationArena,
        predicates: &mut PredicateArena,
    ) -> Result<RelId> {
        self.skip_whitespace();
        if self.eat('!') {
            let inner = self.relation(catalog, relations, predicates)?;
            return Ok(relations.not(inner));
        }

        let name = self.identifier()?;
        match name.as_str() {
            "Join" | "Semijoin" => {
                self.expect('(')?;
                let on = self.join_pairs()?;
                self.expect(',')?;
                let lhs = self.relation(catalog, relations, predicates)?;
                self.expect(',')?;
                let rhs = self.relation(catalog, relations, predicates)?;
                self.expect(')')?;
                Ok(if name == "Join" {
                    relations.join(lhs, rhs, on)
                } else {
                    relations.semijoin(lhs, rhs, on)
                })
            }
            "Union" | "Difference" => {
                self.expect('(')?;
                let lhs = self.relation(catalog, relations, predicates)?;
                self.expect(',')?;
                let rhs = self.relation(catalog, relations, predicates)?;
                self.expect(')')?;
                Ok(if name == "Union" {
                    relations.union(lhs, rhs)
                } else {
                    relations.difference(lhs, rhs)
                })
            }
            "Select" => {
                self.expect('(')?;
                let predicate = self.predicate(predicates)?;
                self.expect(',')?;
                let rel = self.relation(catalog, relations, predicates)?;
                self.expect(')')?;
                Ok(relations.select(predicate, rel))
            }
            "Map" => {
                self.expect('(')?;
                let function = self.identifier()?;
                self.expect(',')?;
                let arguments = self.usize_number()?;
                self.expect(',')?;
                let results = self.usize_number()?;
                self.expect(',')?;
                let rel = self.relation(catalog, relations, predicates)?;
                self.expect(')')?;
                Ok(relations.map(
                    ScalarFn {
                        name: function,
                        arguments,
                        results,
                    },
                    rel,
                ))
            }
            "View" => {
                self.expect('(')?;
                let perm = self.partial_permutation()?;
                self.expect(',')?;
                let rel = self.relation(catalog, relations, predicates)?;
                self.expect(')')?;
                Ok(relations.view(perm, rel))
            }
            table => {
                let (arity, local) = catalog
                    .lookup(table)
                    .ok_or_else(|| self.error(&format!("unknown base table {table}")))?;
                Ok(if local {
                    relations.local_reference(table, arity)
                } else {
                    relations.reference(table, arity)
                })
            }
        }
    }

    fn predicate(&mut self, predicates: &mut PredicateArena) -> Result<PredId> {
        self.skip_whitespace();
        if self.eat('!') {
            let inner = self.predicate(predicates)?;
            return Ok(predicates.not(inner));
        }
        self.expect('(')?;

        // an empty connective renders as "()"
        if self.eat(')') {
            return Ok(predicates.and(vec![]));
        }

        self.skip_whitespace();
        if self.eat_str("attr") {
            let attr = self.usize_number()? as Attr;
            self.skip_whitespace();
            if self.eat('<') {
                let value = self.number()?;
                self.expect(')')?;
                return Ok(predicates.less_than(attr, value as i32));
            }
            if self.eat('=') {
                let value = self.number()?;
                self.expect(')')?;
                return Ok(predicates.equals(attr, value as i32));
            }
            if self.eat_str("LIKE") {
                self.expect('"')?;
                let mut pattern = String::new();
                loop {
                    match self.bump() {
                        Some('"') => break,
                        Some(c) => pattern.push(c),
                        None => return Err(self.error("unterminated LIKE pattern")),
                    }
                }
                self.expect(')')?;
                return Ok(predicates.like(attr, pattern));
            }
            return Err(self.error("expected '<', '=', or LIKE after attribute"));
        }

        // a connective: children separated by a homogeneous operator
        let first = self.predicate(predicates)?;
        let mut children = vec![first];
        let mut conjunction: Option<bool> = None;
        loop {
            if self.eat(')') {
                break;
            }
            let is_and = if self.eat_str("&&") {
                true
            } else if self.eat_str("||") {
                false
            } else {
                return Err(self.error("expected '&&', '||', or ')'"));
            };
            match conjunction {
                None => conjunction = Some(is_and),
                Some(previous) if previous != is_and => {
                    return Err(self.error("mixed connectives without parentheses"));
                }
                Some(_) => {}
            }
            children.push(self.predicate(predicates)?);
        }
        Ok(match conjunction {
            Some(false) => predicates.or(children),
            _ => predicates.and(children),
        })
    }
}
