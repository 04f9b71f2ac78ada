//! Incremental Code Generator
//!
//! Walks a relation term bottom-up and synthesizes a [`DataStructure`]:
//! one storage member per node in the term's transitive closure, an
//! insert/delete method pair per base table, and internal helper pairs per
//! view. Each operator appends to its inputs' methods the delta
//! propagation that keeps its own storage current, so a single base-table
//! mutation ripples through every dependent view synchronously.
//!
//! The walk is memoized by node identity: a sub-term shared between two
//! parents gets one storage member and two propagation call sites.
//!
//! Deletion propagation is symmetric to insertion for every implemented
//! operator. Select and Map have no action-IR encoding for their runtime
//! checks and report `NotImplemented`, as does unary negation.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::action::{
    Action, ContainerKind, ContainerOp, DataStructure, FreshNameSource, Member, Method, VarName,
};
use crate::attr::Attr;
use crate::config::CodegenConfig;
use crate::error::{Error, Result};
use crate::relation::{
    lhs_indices, rhs_indices, JoinOn, Relation, RelationArena, RelId, RelName,
};
use crate::types::{Type, TypeEnv};

/// Storage member and mutator methods synthesized for one relation node.
#[derive(Debug, Clone, Copy)]
pub struct RelationSlots {
    pub member: usize,
    pub insert: usize,
    pub delete: usize,
}

/// The code generator for one data structure.
pub struct Codegen<'a> {
    arena: &'a RelationArena,
    types: &'a TypeEnv,
    source: &'a mut FreshNameSource,
    tables: BTreeMap<RelName, RelationSlots>,
    views: HashMap<RelId, RelationSlots>,
    structure: DataStructure,
}

/// Synthesize the data structure maintaining `root` under base mutations.
pub fn generate_structure(
    name: &str,
    arena: &RelationArena,
    types: &TypeEnv,
    source: &mut FreshNameSource,
    root: RelId,
) -> Result<DataStructure> {
    let mut codegen = Codegen::new(name, arena, types, source);
    codegen.process(root)?;
    Ok(codegen.finish())
}

/// Like [`generate_structure`], naming the structure from configuration.
pub fn generate_configured_structure(
    config: &CodegenConfig,
    arena: &RelationArena,
    types: &TypeEnv,
    source: &mut FreshNameSource,
    root: RelId,
) -> Result<DataStructure> {
    generate_structure(&config.structure_name, arena, types, source, root)
}

impl<'a> Codegen<'a> {
    pub fn new(
        name: &str,
        arena: &'a RelationArena,
        types: &'a TypeEnv,
        source: &'a mut FreshNameSource,
    ) -> Self {
        Codegen {
            arena,
            types,
            source,
            tables: BTreeMap::new(),
            views: HashMap::new(),
            structure: DataStructure::new(name),
        }
    }

    pub fn finish(self) -> DataStructure {
        self.structure
    }

    /// Name of the storage member backing a processed relation node.
    pub fn storage_name(&self, rel: RelId) -> Result<VarName> {
        Ok(self.member_name(self.slots_of(rel)?))
    }

    fn slots_of(&self, rel: RelId) -> Result<RelationSlots> {
        self.views
            .get(&rel)
            .copied()
            .ok_or_else(|| Error::internal("relation was not processed before use"))
    }

    fn member_name(&self, slots: RelationSlots) -> VarName {
        self.structure.members[slots.member].name.clone()
    }

    fn insert_name(&self, slots: RelationSlots) -> VarName {
        self.structure.methods[slots.insert].name.clone()
    }

    fn delete_name(&self, slots: RelationSlots) -> VarName {
        self.structure.methods[slots.delete].name.clone()
    }

    fn append_insert(&mut self, slots: RelationSlots, actions: Vec<Action>) {
        self.structure.methods[slots.insert].body.extend(actions);
    }

    fn append_delete(&mut self, slots: RelationSlots, actions: Vec<Action>) {
        self.structure.methods[slots.delete].body.extend(actions);
    }

    /// Hash-set storage plus insert/delete methods that touch only it.
    fn simple_relation_slots(&mut self, name: &str, row_type: Type) -> RelationSlots {
        let member = self.structure.members.len();
        self.structure.members.push(Member {
            name: VarName::new(name),
            ty: Type::HashSet(Box::new(row_type.clone())),
        });

        let tuple = VarName::new("tuple");

        let insert = self.structure.methods.len();
        let mut insert_method = Method::new(VarName::new(format!("{name}_insert")));
        insert_method.parameters.push((tuple.clone(), row_type.clone()));
        insert_method.body.push(Action::Container(ContainerOp::Insert {
            container: VarName::new(name),
            kind: ContainerKind::HashSet,
            key: tuple.clone(),
            value: None,
        }));
        self.structure.methods.push(insert_method);

        let delete = self.structure.methods.len();
        let mut delete_method = Method::new(VarName::new(format!("{name}_delete")));
        delete_method.parameters.push((tuple.clone(), row_type));
        delete_method.body.push(Action::Container(ContainerOp::Delete {
            container: VarName::new(name),
            kind: ContainerKind::HashSet,
            key: tuple,
        }));
        self.structure.methods.push(delete_method);

        RelationSlots {
            member,
            insert,
            delete,
        }
    }

    /// Emit row-index actions for the selected columns of `tuple` and a
    /// row-construct of the projection into `output`.
    fn project_tuple(
        &mut self,
        output: VarName,
        tuple: &VarName,
        tuple_type: &Type,
        indices: &[Attr],
    ) -> Result<(Vec<Action>, Type)> {
        let elements = tuple_type.row_elements()?;
        let mut actions = Vec::new();
        let mut projected = Vec::new();
        let mut projected_types = Vec::new();
        for &index in indices {
            let ty = elements
                .get(index)
                .ok_or_else(|| {
                    Error::internal(format!(
                        "projection index {index} out of range for row of width {}",
                        elements.len()
                    ))
                })?
                .clone();
            let element = self.source.fresh();
            actions.push(Action::IndexRow {
                var: element.clone(),
                row: tuple.clone(),
                index,
            });
            projected.push((element, ty.clone()));
            projected_types.push(ty);
        }
        actions.push(Action::CreateRow {
            var: output,
            elements: projected,
        });
        Ok((actions, Type::Row(projected_types)))
    }

    /// Register storage and wire propagation for `rel` and everything
    /// below it. Revisiting a processed node is a no-op.
    pub fn process(&mut self, rel: RelId) -> Result<()> {
        if self.views.contains_key(&rel) {
            return Ok(());
        }

        match self.arena.get(rel)?.clone() {
            Relation::Ref { name, .. } => self.process_reference(rel, &name),
            Relation::Semijoin { lhs, rhs, on } => self.process_semijoin(rel, lhs, rhs, &on),
            Relation::Join { lhs, rhs, on } => self.process_join(rel, lhs, rhs, &on),
            Relation::Union { lhs, rhs } => self.process_union(rel, lhs, rhs),
            Relation::Difference { lhs, rhs } => self.process_difference(rel, lhs, rhs),
            Relation::View { perm, rel: inner } => self.process_view(rel, &perm, inner),
            Relation::Select { .. } => Err(Error::not_implemented(
                "code generation for Select: the action IR has no predicate evaluation form",
            )),
            Relation::Map { .. } => Err(Error::not_implemented(
                "code generation for Map: the action IR has no scalar function call form",
            )),
            Relation::Not(_) => Err(Error::not_implemented(
                "code generation for Not: negation has no incremental maintenance recipe",
            )),
        }
    }

    fn process_reference(&mut self, rel: RelId, name: &RelName) -> Result<()> {
        if let Some(slots) = self.tables.get(name) {
            self.views.insert(rel, *slots);
            return Ok(());
        }

        let row_type = self.types.row_of(rel)?.clone();
        let slots = self.simple_relation_slots(name.as_str(), row_type);
        debug!(table = %name, "codegen_table_registered");
        self.tables.insert(name.clone(), slots);
        self.views.insert(rel, slots);
        Ok(())
    }

    fn process_semijoin(&mut self, rel: RelId, lhs: RelId, rhs: RelId, on: &JoinOn) -> Result<()> {
        let name = self.source.fresh();
        let row_type = self.types.row_of(rel)?.clone();
        let slots = self.simple_relation_slots(name.as_str(), row_type);
        self.views.insert(rel, slots);

        self.process(lhs)?;
        self.process(rhs)?;

        let tuple = VarName::new("tuple");
        let lhs_type = self.types.row_of(lhs)?.clone();
        let rhs_type = self.types.row_of(rhs)?.clone();
        let lhs_slots = self.slots_of(lhs)?;
        let rhs_slots = self.slots_of(rhs)?;

        // lhs insert: probe every rhs tuple for a matching projection and
        // push the new lhs tuple through on a hit
        {
            let restricted_lhs = self.source.fresh();
            let (mut actions, _) = self.project_tuple(
                restricted_lhs.clone(),
                &tuple,
                &lhs_type,
                &lhs_indices(on),
            )?;

            let binder = self.source.fresh();
            let restricted_rhs = self.source.fresh();
            let (mut body, _) = self.project_tuple(
                restricted_rhs.clone(),
                &binder,
                &rhs_type,
                &rhs_indices(on),
            )?;
            body.push(Action::IfEqual {
                equalities: vec![(restricted_lhs, restricted_rhs)],
                body: vec![Action::Invoke {
                    method: self.insert_name(slots),
                    arguments: vec![tuple.clone()],
                }],
            });
            actions.push(Action::Container(ContainerOp::Iterate {
                container: self.member_name(rhs_slots),
                kind: ContainerKind::HashSet,
                binders: vec![binder],
                body,
            }));
            self.append_insert(lhs_slots, actions);
        }

        // rhs insert: probe every stored lhs tuple and push the matches
        {
            let restricted_rhs = self.source.fresh();
            let (mut actions, _) = self.project_tuple(
                restricted_rhs.clone(),
                &tuple,
                &rhs_type,
                &rhs_indices(on),
            )?;

            let binder = self.source.fresh();
            let restricted_lhs = self.source.fresh();
            let (mut body, _) = self.project_tuple(
                restricted_lhs.clone(),
                &binder,
                &lhs_type,
                &lhs_indices(on),
            )?;
            body.push(Action::IfEqual {
                equalities: vec![(restricted_lhs, restricted_rhs)],
                body: vec![Action::Invoke {
                    method: self.insert_name(slots),
                    arguments: vec![binder.clone()],
                }],
            });
            actions.push(Action::Container(ContainerOp::Iterate {
                container: self.member_name(lhs_slots),
                kind: ContainerKind::HashSet,
                binders: vec![binder],
                body,
            }));
            self.append_insert(rhs_slots, actions);
        }

        // lhs delete: the tuple can only be in the output if it was in lhs
        {
            let actions = vec![Action::Invoke {
                method: self.delete_name(slots),
                arguments: vec![tuple.clone()],
            }];
            self.append_delete(lhs_slots, actions);
        }

        // rhs delete: drop every stored lhs tuple matching the departed
        // projection
        {
            let restricted_rhs = self.source.fresh();
            let (mut actions, _) = self.project_tuple(
                restricted_rhs.clone(),
                &tuple,
                &rhs_type,
                &rhs_indices(on),
            )?;

            let binder = self.source.fresh();
            let restricted_lhs = self.source.fresh();
            let (mut body, _) = self.project_tuple(
                restricted_lhs.clone(),
                &binder,
                &lhs_type,
                &lhs_indices(on),
            )?;
            body.push(Action::IfEqual {
                equalities: vec![(restricted_lhs, restricted_rhs)],
                body: vec![Action::Invoke {
                    method: self.delete_name(slots),
                    arguments: vec![binder.clone()],
                }],
            });
            actions.push(Action::Container(ContainerOp::Iterate {
                container: self.member_name(lhs_slots),
                kind: ContainerKind::HashSet,
                binders: vec![binder],
                body,
            }));
            self.append_delete(rhs_slots, actions);
        }

        Ok(())
    }

    fn process_join(&mut self, rel: RelId, lhs: RelId, rhs: RelId, on: &JoinOn) -> Result<()> {
        let name = self.source.fresh();
        let row_type = self.types.row_of(rel)?.clone();
        let slots = self.simple_relation_slots(name.as_str(), row_type);
        self.views.insert(rel, slots);

        self.process(lhs)?;
        self.process(rhs)?;

        for deletion in [false, true] {
            let lhs_actions = self.join_delta(rel, lhs, rhs, on, true, deletion)?;
            let rhs_actions = self.join_delta(rel, lhs, rhs, on, false, deletion)?;
            let lhs_slots = self.slots_of(lhs)?;
            let rhs_slots = self.slots_of(rhs)?;
            if deletion {
                self.append_delete(lhs_slots, lhs_actions);
                self.append_delete(rhs_slots, rhs_actions);
            } else {
                self.append_insert(lhs_slots, lhs_actions);
                self.append_insert(rhs_slots, rhs_actions);
            }
        }

        Ok(())
    }

    /// Delta propagation for one side of a join: project the incoming
    /// tuple, scan the opposite storage, and on a match reconstruct the
    /// joined row (left row, then right row minus its `on` columns) and
    /// push it through the output's mutator.
    fn join_delta(
        &mut self,
        rel: RelId,
        lhs: RelId,
        rhs: RelId,
        on: &JoinOn,
        from_lhs: bool,
        deletion: bool,
    ) -> Result<Vec<Action>> {
        let slots = self.slots_of(rel)?;
        let tuple = VarName::new("tuple");
        let lhs_type = self.types.row_of(lhs)?.clone();
        let rhs_type = self.types.row_of(rhs)?.clone();
        let lhs_width = lhs_type.row_elements()?.len();
        let rhs_width = rhs_type.row_elements()?.len();
        let dropped = rhs_indices(on);

        let (delta_type, delta_keys, stored, stored_type, stored_keys) = if from_lhs {
            (&lhs_type, lhs_indices(on), rhs, &rhs_type, rhs_indices(on))
        } else {
            (&rhs_type, rhs_indices(on), lhs, &lhs_type, lhs_indices(on))
        };
        let stored_slots = self.slots_of(stored)?;

        let restricted_delta = self.source.fresh();
        let (mut actions, _) =
            self.project_tuple(restricted_delta.clone(), &tuple, delta_type, &delta_keys)?;

        let binder = self.source.fresh();
        let restricted_stored = self.source.fresh();
        let (mut body, _) =
            self.project_tuple(restricted_stored.clone(), &binder, stored_type, &stored_keys)?;

        // joined row: all lhs columns, then rhs columns outside `on`
        let (lhs_var, rhs_var) = if from_lhs {
            (&tuple, &binder)
        } else {
            (&binder, &tuple)
        };
        let mut joined = Vec::new();
        let mut guarded = Vec::new();
        let lhs_elements = lhs_type.row_elements()?;
        for index in 0..lhs_width {
            let element = self.source.fresh();
            guarded.push(Action::IndexRow {
                var: element.clone(),
                row: lhs_var.clone(),
                index,
            });
            joined.push((element, lhs_elements[index].clone()));
        }
        let rhs_elements = rhs_type.row_elements()?;
        for index in 0..rhs_width {
            if dropped.contains(&index) {
                continue;
            }
            let element = self.source.fresh();
            guarded.push(Action::IndexRow {
                var: element.clone(),
                row: rhs_var.clone(),
                index,
            });
            joined.push((element, rhs_elements[index].clone()));
        }
        let output = self.source.fresh();
        guarded.push(Action::CreateRow {
            var: output.clone(),
            elements: joined,
        });
        guarded.push(Action::Invoke {
            method: if deletion {
                self.delete_name(slots)
            } else {
                self.insert_name(slots)
            },
            arguments: vec![output],
        });

        body.push(Action::IfEqual {
            equalities: vec![(restricted_delta, restricted_stored)],
            body: guarded,
        });
        actions.push(Action::Container(ContainerOp::Iterate {
            container: self.member_name(stored_slots),
            kind: ContainerKind::HashSet,
            binders: vec![binder],
            body,
        }));
        Ok(actions)
    }

    fn process_union(&mut self, rel: RelId, lhs: RelId, rhs: RelId) -> Result<()> {
        let name = self.source.fresh();
        let row_type = self.types.row_of(rel)?.clone();
        let slots = self.simple_relation_slots(name.as_str(), row_type);
        self.views.insert(rel, slots);

        self.process(lhs)?;
        self.process(rhs)?;

        let tuple = VarName::new("tuple");
        for side in [lhs, rhs] {
            let side_slots = self.slots_of(side)?;
            self.append_insert(
                side_slots,
                vec![Action::Invoke {
                    method: self.insert_name(slots),
                    arguments: vec![tuple.clone()],
                }],
            );
            self.append_delete(
                side_slots,
                vec![Action::Invoke {
                    method: self.delete_name(slots),
                    arguments: vec![tuple.clone()],
                }],
            );
        }

        Ok(())
    }

    fn process_difference(&mut self, rel: RelId, lhs: RelId, rhs: RelId) -> Result<()> {
        let name = self.source.fresh();
        let row_type = self.types.row_of(rel)?.clone();
        let slots = self.simple_relation_slots(name.as_str(), row_type);
        self.views.insert(rel, slots);

        self.process(lhs)?;
        self.process(rhs)?;

        let tuple = VarName::new("tuple");
        let lhs_slots = self.slots_of(lhs)?;
        let rhs_slots = self.slots_of(rhs)?;

        self.append_insert(
            lhs_slots,
            vec![Action::Invoke {
                method: self.insert_name(slots),
                arguments: vec![tuple.clone()],
            }],
        );
        self.append_insert(
            rhs_slots,
            vec![Action::Invoke {
                method: self.delete_name(slots),
                arguments: vec![tuple.clone()],
            }],
        );
        self.append_delete(
            lhs_slots,
            vec![Action::Invoke {
                method: self.delete_name(slots),
                arguments: vec![tuple.clone()],
            }],
        );

        // rhs delete: the lhs tuple resurfaces if lhs still holds it
        let contains = self.source.fresh();
        let truth = self.source.fresh();
        self.append_delete(
            rhs_slots,
            vec![
                Action::Container(ContainerOp::Contains {
                    var: contains.clone(),
                    container: self.member_name(lhs_slots),
                    key: tuple.clone(),
                }),
                Action::AssignConstant {
                    var: truth.clone(),
                    constant: "true".to_string(),
                },
                Action::IfEqual {
                    equalities: vec![(contains, truth)],
                    body: vec![Action::Invoke {
                        method: self.insert_name(slots),
                        arguments: vec![tuple],
                    }],
                },
            ],
        );

        Ok(())
    }

    fn process_view(
        &mut self,
        rel: RelId,
        perm: &[Option<Attr>],
        inner: RelId,
    ) -> Result<()> {
        let name = self.source.fresh();
        let row_type = self.types.row_of(rel)?.clone();
        let slots = self.simple_relation_slots(name.as_str(), row_type);
        self.views.insert(rel, slots);

        self.process(inner)?;
        let inner_slots = self.slots_of(inner)?;
        let inner_type = self.types.row_of(inner)?.clone();
        let output_width = self.arena.arity(rel)?;

        for deletion in [false, true] {
            let actions =
                self.view_projection(perm, &inner_type, output_width, slots, deletion)?;
            if deletion {
                self.append_delete(inner_slots, actions);
            } else {
                self.append_insert(inner_slots, actions);
            }
        }

        Ok(())
    }

    /// Project the inner tuple through the partial permutation and push the
    /// reordered row through the view's mutator.
    fn view_projection(
        &mut self,
        perm: &[Option<Attr>],
        inner_type: &Type,
        output_width: usize,
        slots: RelationSlots,
        deletion: bool,
    ) -> Result<Vec<Action>> {
        let tuple = VarName::new("tuple");
        let elements = inner_type.row_elements()?;
        let mut actions = Vec::new();
        let mut placed: Vec<Option<(VarName, Type)>> = vec![None; output_width];
        for (index, target) in perm.iter().enumerate() {
            let Some(target) = target else { continue };
            let element = self.source.fresh();
            actions.push(Action::IndexRow {
                var: element.clone(),
                row: tuple.clone(),
                index,
            });
            let ty = elements
                .get(index)
                .ok_or_else(|| Error::internal("view permutation longer than input row"))?
                .clone();
            placed[*target] = Some((element, ty));
        }
        let output = self.source.fresh();
        let elements: Vec<(VarName, Type)> = placed
            .into_iter()
            .map(|slot| slot.ok_or_else(|| Error::internal("view output column left unfilled")))
            .collect::<Result<_>>()?;
        actions.push(Action::CreateRow {
            var: output.clone(),
            elements,
        });
        actions.push(Action::Invoke {
            method: if deletion {
                self.delete_name(slots)
            } else {
                self.insert_name(slots)
            },
            arguments: vec![output],
        });
        Ok(actions)
    }
}
