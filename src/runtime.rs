//! Runtime Evaluator for Synthesized Structures
//!
//! Materializes a [`DataStructure`] in-process: one live container per
//! member, and `invoke` walks a method's action sequence against an
//! environment of runtime values. This is the oracle-equality test driver —
//! the same mutation sequence is applied here and to the reference
//! interpreter, then the storage sets are compared.
//!
//! Iteration snapshots the iterated container, so propagation into other
//! members is safe mid-loop; mutating the iterated container itself is a
//! caller bug per the action-IR contract and the snapshot makes it
//! deterministic rather than undefined.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::action::{Action, ContainerKind, ContainerOp, DataStructure, VarName};
use crate::error::{Error, Result};
use crate::types::Type;

/// A runtime value: integers, booleans, and rows thereof.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Val {
    Int(i32),
    Bool(bool),
    Row(Vec<Val>),
}

impl Val {
    pub fn row_of_ints(values: &[i32]) -> Val {
        Val::Row(values.iter().map(|v| Val::Int(*v)).collect())
    }

    fn as_row(&self) -> Result<&[Val]> {
        match self {
            Val::Row(elements) => Ok(elements),
            other => Err(Error::internal(format!("expected a row, found {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
enum ContainerState {
    Set(HashSet<Val>),
    Bag(HashMap<Val, i32>),
    Map(HashMap<Val, Val>),
    Trie(BTreeMap<Vec<Val>, Val>),
}

impl ContainerState {
    fn empty(kind: ContainerKind) -> ContainerState {
        match kind {
            ContainerKind::HashSet => ContainerState::Set(HashSet::new()),
            ContainerKind::Bag => ContainerState::Bag(HashMap::new()),
            ContainerKind::HashMap => ContainerState::Map(HashMap::new()),
            ContainerKind::Trie => ContainerState::Trie(BTreeMap::new()),
        }
    }

    fn for_type(ty: &Type) -> Option<ContainerState> {
        match ty {
            Type::HashSet(_) => Some(ContainerState::empty(ContainerKind::HashSet)),
            Type::Bag(_) => Some(ContainerState::empty(ContainerKind::Bag)),
            Type::HashMap(_, _) => Some(ContainerState::empty(ContainerKind::HashMap)),
            Type::Trie(_, _) => Some(ContainerState::empty(ContainerKind::Trie)),
            _ => None,
        }
    }
}

type Env = HashMap<VarName, Val>;

/// A live instance of a synthesized structure.
pub struct Instance<'a> {
    structure: &'a DataStructure,
    method_index: HashMap<String, usize>,
    members: HashMap<VarName, ContainerState>,
}

impl<'a> Instance<'a> {
    /// Allocate every container member of the structure.
    pub fn new(structure: &'a DataStructure) -> Result<Self> {
        let mut members = HashMap::new();
        for member in &structure.members {
            let state = ContainerState::for_type(&member.ty).ok_or_else(|| {
                Error::internal(format!(
                    "member {} has non-container type {:?}",
                    member.name, member.ty
                ))
            })?;
            members.insert(member.name.clone(), state);
        }
        let method_index = structure
            .methods
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.as_str().to_string(), i))
            .collect();
        Ok(Instance {
            structure,
            method_index,
            members,
        })
    }

    /// Invoke a method by name with positional arguments.
    pub fn invoke(&mut self, method: &str, arguments: Vec<Val>) -> Result<()> {
        let index = *self
            .method_index
            .get(method)
            .ok_or_else(|| Error::precondition(format!("no method named {method}")))?;
        let structure = self.structure;
        let definition = &structure.methods[index];
        if definition.parameters.len() != arguments.len() {
            return Err(Error::precondition(format!(
                "{method} takes {} arguments, got {}",
                definition.parameters.len(),
                arguments.len()
            )));
        }
        let mut env: Env = definition
            .parameters
            .iter()
            .map(|(name, _)| name.clone())
            .zip(arguments)
            .collect();
        self.exec(&definition.body, &mut env)
    }

    /// Insert an integer row into a base table.
    pub fn insert_row(&mut self, table: &str, row: &[i32]) -> Result<()> {
        self.invoke(&format!("{table}_insert"), vec![Val::row_of_ints(row)])
    }

    /// Delete an integer row from a base table.
    pub fn delete_row(&mut self, table: &str, row: &[i32]) -> Result<()> {
        self.invoke(&format!("{table}_delete"), vec![Val::row_of_ints(row)])
    }

    /// Snapshot a set- or bag-backed member as a set of integer rows.
    pub fn rows_of(&self, member: &str) -> Result<HashSet<Vec<i32>>> {
        let state = self
            .members
            .get(&VarName::new(member))
            .ok_or_else(|| Error::precondition(format!("no member named {member}")))?;
        let keys: Vec<&Val> = match state {
            ContainerState::Set(set) => set.iter().collect(),
            ContainerState::Bag(bag) => bag.keys().collect(),
            _ => {
                return Err(Error::precondition(format!(
                    "member {member} is not set- or bag-backed"
                )))
            }
        };
        let mut rows = HashSet::new();
        for key in keys {
            let mut row = Vec::new();
            for element in key.as_row()? {
                match element {
                    Val::Int(v) => row.push(*v),
                    other => {
                        return Err(Error::internal(format!(
                            "non-integer column {other:?} in stored row"
                        )))
                    }
                }
            }
            rows.insert(row);
        }
        Ok(rows)
    }

    /// Multiplicity of a key in a bag-backed member; zero when absent.
    pub fn bag_count(&self, member: &str, row: &[i32]) -> Result<i32> {
        match self.members.get(&VarName::new(member)) {
            Some(ContainerState::Bag(bag)) => {
                Ok(bag.get(&Val::row_of_ints(row)).copied().unwrap_or(0))
            }
            Some(_) => Err(Error::precondition(format!(
                "member {member} is not bag-backed"
            ))),
            None => Err(Error::precondition(format!("no member named {member}"))),
        }
    }

    fn exec(&mut self, actions: &'a [Action], env: &mut Env) -> Result<()> {
        for action in actions {
            match action {
                Action::AssignConstant { var, constant } => {
                    let value = parse_constant(constant)?;
                    env.insert(var.clone(), value);
                }
                Action::CreateRow { var, elements } => {
                    let mut row = Vec::with_capacity(elements.len());
                    for (name, _) in elements {
                        row.push(self.read(env, name)?);
                    }
                    env.insert(var.clone(), Val::Row(row));
                }
                Action::IndexRow { var, row, index } => {
                    let value = self.read(env, row)?;
                    let element = value
                        .as_row()?
                        .get(*index)
                        .ok_or_else(|| Error::internal("row index out of range"))?
                        .clone();
                    env.insert(var.clone(), element);
                }
                Action::Invoke { method, arguments } => {
                    let values: Vec<Val> = arguments
                        .iter()
                        .map(|a| self.read(env, a))
                        .collect::<Result<_>>()?;
                    self.invoke(method.as_str(), values)?;
                }
                Action::IfEqual { equalities, body } => {
                    let mut taken = false;
                    for (x, y) in equalities {
                        if self.read(env, x)? == self.read(env, y)? {
                            taken = true;
                            break;
                        }
                    }
                    if taken {
                        self.exec(body, env)?;
                    }
                }
                Action::Container(op) => self.exec_container(op, env)?,
            }
        }
        Ok(())
    }

    fn exec_container(&mut self, op: &'a ContainerOp, env: &mut Env) -> Result<()> {
        match op {
            ContainerOp::Create { var, kind, .. } => {
                self.members.insert(var.clone(), ContainerState::empty(*kind));
            }
            ContainerOp::Insert {
                container,
                key,
                value,
                ..
            } => {
                let key = self.read(env, key)?;
                let value = value.as_ref().map(|v| self.read(env, v)).transpose()?;
                match self.container_mut(container)? {
                    ContainerState::Set(set) => {
                        set.insert(key);
                    }
                    ContainerState::Bag(bag) => {
                        *bag.entry(key).or_insert(0) += 1;
                    }
                    ContainerState::Map(map) => {
                        let value = value
                            .ok_or_else(|| Error::internal("hash map insert without a value"))?;
                        map.insert(key, value);
                    }
                    ContainerState::Trie(trie) => {
                        let value = value
                            .ok_or_else(|| Error::internal("trie insert without a value"))?;
                        trie.insert(trie_key(&key)?, value);
                    }
                }
            }
            ContainerOp::Delete { container, key, .. } => {
                let key = self.read(env, key)?;
                match self.container_mut(container)? {
                    ContainerState::Set(set) => {
                        set.remove(&key);
                    }
                    ContainerState::Bag(bag) => {
                        // decrement saturates: the entry vanishes once the
                        // count is no longer positive, and deleting an
                        // absent key stays absent
                        if let Some(count) = bag.get_mut(&key) {
                            *count -= 1;
                            if *count <= 0 {
                                bag.remove(&key);
                            }
                        }
                    }
                    ContainerState::Map(map) => {
                        map.remove(&key);
                    }
                    ContainerState::Trie(trie) => {
                        trie.remove(&trie_key(&key)?);
                    }
                }
            }
            ContainerOp::Iterate {
                container,
                binders,
                body,
                ..
            } => {
                let bindings = self.snapshot(container)?;
                for values in bindings {
                    if values.len() != binders.len() {
                        return Err(Error::internal(format!(
                            "iteration binds {} names over {}-tuples",
                            binders.len(),
                            values.len()
                        )));
                    }
                    for (binder, value) in binders.iter().zip(values) {
                        env.insert(binder.clone(), value);
                    }
                    self.exec(body, env)?;
                }
            }
            ContainerOp::Contains {
                var,
                container,
                key,
            } => {
                let key = self.read(env, key)?;
                let held = match self.container(container)? {
                    ContainerState::Set(set) => set.contains(&key),
                    ContainerState::Bag(bag) => bag.contains_key(&key),
                    ContainerState::Map(map) => map.contains_key(&key),
                    ContainerState::Trie(trie) => trie.contains_key(&trie_key(&key)?),
                };
                env.insert(var.clone(), Val::Bool(held));
            }
        }
        Ok(())
    }

    fn snapshot(&self, container: &VarName) -> Result<Vec<Vec<Val>>> {
        let state = self.container(container)?;
        let rows = match state {
            ContainerState::Set(set) => set.iter().map(|v| vec![v.clone()]).collect(),
            // multiplicities are invisible to iteration
            ContainerState::Bag(bag) => bag.keys().map(|v| vec![v.clone()]).collect(),
            ContainerState::Map(map) => map
                .iter()
                .map(|(k, v)| vec![k.clone(), v.clone()])
                .collect(),
            ContainerState::Trie(trie) => trie
                .iter()
                .map(|(k, v)| vec![Val::Row(k.clone()), v.clone()])
                .collect(),
        };
        Ok(rows)
    }

    fn container(&self, name: &VarName) -> Result<&ContainerState> {
        self.members
            .get(name)
            .ok_or_else(|| Error::internal(format!("no container named {name}")))
    }

    fn container_mut(&mut self, name: &VarName) -> Result<&mut ContainerState> {
        self.members
            .get_mut(name)
            .ok_or_else(|| Error::internal(format!("no container named {name}")))
    }

    fn read(&self, env: &Env, name: &VarName) -> Result<Val> {
        env.get(name)
            .cloned()
            .ok_or_else(|| Error::internal(format!("unbound variable {name}")))
    }
}

fn parse_constant(constant: &str) -> Result<Val> {
    match constant {
        "true" => Ok(Val::Bool(true)),
        "false" => Ok(Val::Bool(false)),
        other => other
            .parse::<i32>()
            .map(Val::Int)
            .map_err(|_| Error::internal(format!("unparseable constant {other}"))),
    }
}

fn trie_key(key: &Val) -> Result<Vec<Val>> {
    Ok(key.as_row()?.to_vec())
}
