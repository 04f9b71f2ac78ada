//! C++ Back-End
//!
//! Renders a synthesized [`DataStructure`] as C++ source text: hash-set and
//! hash-map members, methods taking tuples, range-for loops. The core never
//! depends on this pass; it is one possible back-end over the action tree,
//! and pattern-matches the tagged container operations to pick syntax.

use crate::action::{
    Action, ContainerKind, ContainerOp, DataStructure, FreshNameSource, Member, Method,
};
use crate::types::Type;

/// Indent every non-empty line by `n` levels of four spaces.
fn indent(text: &str, n: usize) -> String {
    let pad = " ".repeat(4 * n);
    let mut result = String::new();
    for line in text.split('\n') {
        if !line.is_empty() {
            result.push_str(&pad);
            result.push_str(line);
            result.push('\n');
        }
    }
    result
}

/// The C++ spelling of a type.
pub fn type_to_cxx(ty: &Type) -> String {
    match ty {
        Type::Int => "int32_t".to_string(),
        Type::Basic(name) => name.clone(),
        Type::Row(elements) => {
            let parts: Vec<String> = elements.iter().map(type_to_cxx).collect();
            format!("std::tuple<{}>", parts.join(", "))
        }
        Type::HashSet(element) => format!("absl::flat_hash_set<{}>", type_to_cxx(element)),
        Type::Bag(element) => {
            format!("absl::flat_hash_map<{}, int32_t>", type_to_cxx(element))
        }
        Type::HashMap(key, value) => format!(
            "absl::flat_hash_map<{}, {}>",
            type_to_cxx(key),
            type_to_cxx(value)
        ),
        Type::Trie(key, value) => {
            format!("Trie<{}, {}>", type_to_cxx(key), type_to_cxx(value))
        }
        Type::Vector(element) => format!("std::vector<{}>", type_to_cxx(element)),
    }
}

fn body_to_cxx(actions: &[Action], source: &mut FreshNameSource) -> String {
    let mut result = String::new();
    for action in actions {
        result.push_str(&action_to_cxx(action, source));
        result.push('\n');
    }
    result
}

/// The C++ spelling of one action.
pub fn action_to_cxx(action: &Action, source: &mut FreshNameSource) -> String {
    match action {
        Action::AssignConstant { var, constant } => format!("auto {var} = {constant};"),
        Action::CreateRow { var, elements } => {
            let names: Vec<String> = elements.iter().map(|(n, _)| n.to_string()).collect();
            let types: Vec<String> = elements.iter().map(|(_, t)| type_to_cxx(t)).collect();
            format!(
                "std::tuple<{}> {} {{ {} }};",
                types.join(", "),
                var,
                names.join(", ")
            )
        }
        Action::IndexRow { var, row, index } => {
            format!("auto {var} = std::get<{index}>({row});")
        }
        Action::Invoke { method, arguments } => {
            let args: Vec<String> = arguments.iter().map(ToString::to_string).collect();
            format!("{}({});", method, args.join(", "))
        }
        Action::IfEqual { equalities, body } => {
            let tests: Vec<String> = equalities
                .iter()
                .map(|(x, y)| format!("({x} == {y})"))
                .collect();
            format!(
                "if ({}) {{\n{}}}",
                tests.join(" || "),
                indent(&body_to_cxx(body, source), 1)
            )
        }
        Action::Container(op) => container_to_cxx(op, source),
    }
}

fn container_to_cxx(op: &ContainerOp, source: &mut FreshNameSource) -> String {
    match op {
        ContainerOp::Create {
            var,
            kind,
            element_type,
            value_type,
        } => match kind {
            ContainerKind::HashSet => {
                format!("absl::flat_hash_set<{}> {};", type_to_cxx(element_type), var)
            }
            ContainerKind::Bag => format!(
                "absl::flat_hash_map<{}, int32_t> {};",
                type_to_cxx(element_type),
                var
            ),
            ContainerKind::HashMap => format!(
                "absl::flat_hash_map<{}, {}> {};",
                type_to_cxx(element_type),
                value_type.as_ref().map_or_else(String::new, type_to_cxx),
                var
            ),
            ContainerKind::Trie => format!(
                "Trie<{}, {}> {};",
                type_to_cxx(element_type),
                value_type.as_ref().map_or_else(String::new, type_to_cxx),
                var
            ),
        },
        ContainerOp::Insert {
            container,
            kind,
            key,
            value,
        } => match kind {
            ContainerKind::HashSet => format!("{container}.insert({key});"),
            ContainerKind::Bag => format!(
                "if ({container}.contains({key})) {{ {container}[{key}]++; }} \
                 else {{ {container}[{key}] = 1; }}"
            ),
            ContainerKind::HashMap => {
                let value = value.as_ref().map_or("", |v| v.as_str());
                format!("{container}.insert_or_assign({key}, {value});")
            }
            ContainerKind::Trie => {
                let value = value.as_ref().map_or("", |v| v.as_str());
                format!("{container}.Insert({key}, {value});")
            }
        },
        ContainerOp::Delete {
            container,
            kind,
            key,
        } => match kind {
            ContainerKind::HashSet | ContainerKind::HashMap => {
                format!("{container}.erase({key});")
            }
            ContainerKind::Bag => format!(
                "if ({container}.contains({key})) {{ {container}[{key}]--; \
                 if ({container}[{key}] <= 0) {container}.erase({key}); }}"
            ),
            ContainerKind::Trie => format!("{container}.Delete({key});"),
        },
        ContainerOp::Iterate {
            container,
            kind,
            binders,
            body,
        } => {
            let binding = match kind {
                ContainerKind::HashSet => binders[0].to_string(),
                // multiplicities are invisible, so the count gets a
                // throwaway name
                ContainerKind::Bag => format!("[{}, {}]", binders[0], source.fresh()),
                ContainerKind::HashMap | ContainerKind::Trie => {
                    format!("[{}, {}]", binders[0], binders[1])
                }
            };
            format!(
                "for (const auto& {} : {}) {{\n{}}}",
                binding,
                container,
                indent(&body_to_cxx(body, source), 1)
            )
        }
        ContainerOp::Contains {
            var,
            container,
            key,
        } => format!("bool {var} = {container}.contains({key});"),
    }
}

fn member_to_cxx(member: &Member) -> String {
    format!("{} {};", type_to_cxx(&member.ty), member.name)
}

fn method_to_cxx(method: &Method, source: &mut FreshNameSource) -> String {
    let params: Vec<String> = method
        .parameters
        .iter()
        .map(|(name, ty)| format!("const {}& {}", type_to_cxx(ty), name))
        .collect();
    format!(
        "void {}({}) {{\n{}}}",
        method.name,
        params.join(", "),
        indent(&body_to_cxx(&method.body, source), 1)
    )
}

/// The C++ spelling of the whole structure.
pub fn structure_to_cxx(structure: &DataStructure, source: &mut FreshNameSource) -> String {
    let mut inner = String::new();
    for member in &structure.members {
        inner.push_str(&member_to_cxx(member));
        inner.push('\n');
    }
    for method in &structure.methods {
        inner.push('\n');
        inner.push_str(&method_to_cxx(method, source));
        inner.push('\n');
    }
    format!("struct {} {{\n{}}};\n", structure.name, indent(&inner, 1))
}
