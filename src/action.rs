//! Action IR
//!
//! The small imperative language the code generator targets: named
//! variables, row construction and indexing, method invocation, a
//! conditional over a disjunction of variable equalities, and operations on
//! four container kinds. Containers are one tagged [`ContainerOp`] variant
//! rather than a family of types; back-ends pattern-match on it to render
//! code, and the runtime evaluator pattern-matches on it to execute.
//!
//! The action tree is pure data. Iteration bodies carry explicit binder
//! names drawn from a [`FreshNameSource`] at construction time, and must
//! not mutate the container being iterated.

use crate::types::Type;

/// A variable or method name inside a synthesized structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarName(pub String);

impl VarName {
    pub fn new(name: impl Into<String>) -> Self {
        VarName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VarName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-compilation-unit supply of distinct variable and relation names.
/// Names are opaque; nothing may depend on their shape.
#[derive(Debug, Default)]
pub struct FreshNameSource {
    var_number: u32,
    rel_number: u32,
}

impl FreshNameSource {
    pub fn new() -> Self {
        FreshNameSource {
            var_number: 0,
            rel_number: 0,
        }
    }

    pub fn fresh(&mut self) -> VarName {
        let name = VarName::new(format!("fresh{}", self.var_number));
        self.var_number += 1;
        name
    }

    pub fn fresh_rel(&mut self) -> VarName {
        let name = VarName::new(format!("rel{}", self.rel_number));
        self.rel_number += 1;
        name
    }
}

/// The four container kinds a synthesized structure can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Set-semantics hash set of rows
    HashSet,
    /// Element-to-count multiset; inserts increment, deletes decrement,
    /// and an entry vanishes when its count is no longer positive
    Bag,
    /// Key-to-value hash map
    HashMap,
    /// Prefix-indexed key-to-value map
    Trie,
}

/// An operation on a container-typed member.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerOp {
    /// Introduce a container member or local with its element types.
    /// `value_type` is present for the keyed kinds (hash map, trie).
    Create {
        var: VarName,
        kind: ContainerKind,
        element_type: Type,
        value_type: Option<Type>,
    },
    /// Insert `key` (and `value` for keyed kinds); for bags this is an
    /// increment
    Insert {
        container: VarName,
        kind: ContainerKind,
        key: VarName,
        value: Option<VarName>,
    },
    /// Remove `key`; for bags this decrements and drops at zero
    Delete {
        container: VarName,
        kind: ContainerKind,
        key: VarName,
    },
    /// Bind `binders` over each element and run `body`. Hash sets and bags
    /// bind one name, keyed kinds bind key then value. Multiplicities of a
    /// bag are invisible to the body.
    Iterate {
        container: VarName,
        kind: ContainerKind,
        binders: Vec<VarName>,
        body: Vec<Action>,
    },
    /// Bind a boolean: does the container hold `key`?
    Contains {
        var: VarName,
        container: VarName,
        key: VarName,
    },
}

/// One primitive action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// `var = constant` (textual constant, typed by the back-end)
    AssignConstant { var: VarName, constant: String },
    /// Build a row out of named elements
    CreateRow {
        var: VarName,
        elements: Vec<(VarName, Type)>,
    },
    /// `var = row[index]`
    IndexRow {
        var: VarName,
        row: VarName,
        index: usize,
    },
    /// Call another method of the structure
    Invoke {
        method: VarName,
        arguments: Vec<VarName>,
    },
    /// Run `body` when any of the variable pairs are equal
    IfEqual {
        equalities: Vec<(VarName, VarName)>,
        body: Vec<Action>,
    },
    /// A container operation
    Container(ContainerOp),
}

/// A storage member of a synthesized structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: VarName,
    pub ty: Type,
}

/// A method of a synthesized structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: VarName,
    pub parameters: Vec<(VarName, Type)>,
    pub body: Vec<Action>,
}

impl Method {
    pub fn new(name: VarName) -> Self {
        Method {
            name,
            parameters: Vec::new(),
            body: Vec::new(),
        }
    }
}

/// The shape of a synthesized incremental data structure: storage members
/// plus mutator/helper methods. Rendering to a concrete language is a
/// separate pass.
#[derive(Debug, Clone, Default)]
pub struct DataStructure {
    pub name: String,
    pub members: Vec<Member>,
    pub methods: Vec<Method>,
}

impl DataStructure {
    pub fn new(name: impl Into<String>) -> Self {
        DataStructure {
            name: name.into(),
            members: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name.as_str() == name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name.as_str() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_names_are_distinct() {
        let mut source = FreshNameSource::new();
        let a = source.fresh();
        let b = source.fresh();
        let r = source.fresh_rel();
        assert_ne!(a, b);
        assert_ne!(a, r);
        assert_ne!(b, r);
    }

    #[test]
    fn test_structure_lookup() {
        let mut ds = DataStructure::new("Example");
        ds.members.push(Member {
            name: VarName::new("storage"),
            ty: Type::HashSet(Box::new(Type::int_row(2))),
        });
        ds.methods.push(Method::new(VarName::new("storage_insert")));

        assert!(ds.member("storage").is_some());
        assert!(ds.method("storage_insert").is_some());
        assert!(ds.member("missing").is_none());
    }
}
