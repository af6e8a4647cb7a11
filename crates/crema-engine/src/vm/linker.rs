// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Linking and evaluation of module graphs.
//!
//! Linking hoists each module's declarations into its environment, maps
//! imported names onto the exporting module and rejects imports of names
//! that are not exported. Evaluation then runs module bodies depth first,
//! dependencies before dependents. A module already being evaluated is
//! skipped, which is what lets cyclic graphs terminate.

use rustc_hash::FxHashMap;

use super::builtins::ErrorKind;
use super::interpreter;
use super::{Completion, Throw};
use crate::ast::{self, ExportDeclaration, ImportSpecifier, ModuleItem, Statement, VariableKind};
use crate::runtime::module::{Binding, ImportBinding};
use crate::runtime::{ContextId, JsObject, ModuleId, ModuleStatus, ObjectId, ObjectKind, RuntimeState, Value};

/// Where an exported name ultimately lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBinding {
    /// A binding in a module environment
    Local {
        /// Module that owns the binding
        module: ModuleId,
        /// Binding name
        name: String,
    },
    /// A module namespace object
    Namespace(ModuleId),
}

/// Follows an export through re-exported imports to the binding it names.
pub fn resolve_export(state: &RuntimeState, module: ModuleId, name: &str) -> Option<ResolvedBinding> {
    let mut visited: Vec<(ModuleId, String)> = Vec::new();
    let mut current = (module, name.to_string());

    loop {
        if visited.contains(&current) {
            return None;
        }
        visited.push(current.clone());

        let (id, export) = &current;
        let record = state.module(*id);
        let local = record.exports.get(export)?;
        match record.imports.get(local) {
            Some(ImportBinding::Export { module, name }) => current = (*module, name.clone()),
            Some(ImportBinding::Namespace(module)) => return Some(ResolvedBinding::Namespace(*module)),
            None => {
                return Some(ResolvedBinding::Local {
                    module: *id,
                    name: local.clone(),
                })
            }
        }
    }
}

fn declare(environment: &mut FxHashMap<String, Binding>, kind: VariableKind, name: &str) {
    let binding = match kind {
        VariableKind::Var => Binding {
            value: Some(Value::Undefined),
            mutable: true,
        },
        VariableKind::Let => Binding {
            value: None,
            mutable: true,
        },
        VariableKind::Const => Binding {
            value: None,
            mutable: false,
        },
    };
    // `var` redeclaration keeps the current value.
    if kind == VariableKind::Var && environment.contains_key(name) {
        return;
    }
    environment.insert(name.to_string(), binding);
}

/// Collects `var` declarations nested inside blocks.
pub(crate) fn hoist_vars(statement: &Statement, environment: &mut FxHashMap<String, Binding>) {
    match statement {
        Statement::VariableDeclaration(decl) if decl.kind == VariableKind::Var => {
            for declarator in &decl.declarations {
                declare(environment, VariableKind::Var, &declarator.id.name);
            }
        }
        Statement::Block(body) => {
            for statement in body {
                hoist_vars(statement, environment);
            }
        }
        Statement::If(stmt) => {
            hoist_vars(&stmt.consequent, environment);
            if let Some(alternate) = &stmt.alternate {
                hoist_vars(alternate, environment);
            }
        }
        _ => {}
    }
}

fn instantiate(state: &mut RuntimeState, id: ModuleId) {
    let Some(body) = state.module(id).ast.clone() else {
        return;
    };

    let mut environment = FxHashMap::default();
    let mut imports = FxHashMap::default();

    for item in &body.body {
        match item {
            ModuleItem::Import(import) => {
                let Some(target) = state.module(id).requested_module(&import.source) else {
                    continue;
                };
                for specifier in &import.specifiers {
                    let binding = match specifier {
                        ImportSpecifier::Default(_) => ImportBinding::Export {
                            module: target,
                            name: "default".to_string(),
                        },
                        ImportSpecifier::Named { imported, .. } => ImportBinding::Export {
                            module: target,
                            name: imported.clone(),
                        },
                        ImportSpecifier::Namespace(_) => ImportBinding::Namespace(target),
                    };
                    imports.insert(specifier.local().name.clone(), binding);
                }
            }
            ModuleItem::Export(ExportDeclaration::Default(_)) => {
                declare(&mut environment, VariableKind::Const, ast::DEFAULT_EXPORT_BINDING);
            }
            ModuleItem::Export(ExportDeclaration::Variable(decl))
            | ModuleItem::Statement(Statement::VariableDeclaration(decl)) => {
                for declarator in &decl.declarations {
                    declare(&mut environment, decl.kind, &declarator.id.name);
                }
            }
            ModuleItem::Statement(statement) => hoist_vars(statement, &mut environment),
            ModuleItem::Export(ExportDeclaration::Named(_)) => {}
        }
    }

    let module = state.module_mut(id);
    module.environment = environment;
    module.imports = imports;
    module.exports = body.export_entries().into_iter().collect();
}

/// Links every parsed module reachable from `root`.
pub fn link_graph(state: &mut RuntimeState, context: ContextId, root: ModuleId) -> Completion<()> {
    let pending: Vec<ModuleId> = state
        .graph(root)
        .into_iter()
        .filter(|id| state.module(*id).status == ModuleStatus::Parsed)
        .collect();

    for id in &pending {
        instantiate(state, *id);
    }

    for id in &pending {
        let Some(body) = state.module(*id).ast.clone() else {
            continue;
        };
        for item in &body.body {
            let ModuleItem::Import(import) = item else {
                continue;
            };
            for specifier in &import.specifiers {
                let requested = match specifier {
                    ImportSpecifier::Default(_) => "default",
                    ImportSpecifier::Named { imported, .. } => imported.as_str(),
                    ImportSpecifier::Namespace(_) => continue,
                };
                let Some(target) = state.module(*id).requested_module(&import.source) else {
                    continue;
                };
                if resolve_export(state, target, requested).is_none() {
                    let message = format!(
                        "The requested module '{}' does not provide an export named '{}'",
                        import.source, requested
                    );
                    let error = state.create_error(context, ErrorKind::SyntaxError, &message);
                    state.module_mut(*id).fail(error.clone());
                    return Err(Throw(error));
                }
            }
        }
    }

    for id in pending {
        state.module_mut(id).status = ModuleStatus::Linked;
    }
    Ok(())
}

/// Reads a binding of `module` by local name, following imports.
pub fn read_binding(state: &mut RuntimeState, context: ContextId, module: ModuleId, name: &str) -> Completion<Value> {
    if let Some(binding) = state.module(module).environment.get(name) {
        return match &binding.value {
            Some(value) => Ok(value.clone()),
            None => {
                let message = format!("Cannot access '{}' before initialization", display_name(name));
                Err(state.throw_error(context, ErrorKind::ReferenceError, &message))
            }
        };
    }

    match state.module(module).imports.get(name).cloned() {
        Some(ImportBinding::Export { module: target, name: export }) => {
            match resolve_export(state, target, &export) {
                Some(resolved) => read_resolved(state, context, resolved),
                None => {
                    let message = format!("{} is not defined", name);
                    Err(state.throw_error(context, ErrorKind::ReferenceError, &message))
                }
            }
        }
        Some(ImportBinding::Namespace(target)) => Ok(Value::Object(namespace_object(state, target))),
        None => {
            let message = format!("{} is not defined", name);
            Err(state.throw_error(context, ErrorKind::ReferenceError, &message))
        }
    }
}

fn read_resolved(state: &mut RuntimeState, context: ContextId, resolved: ResolvedBinding) -> Completion<Value> {
    match resolved {
        ResolvedBinding::Local { module, name } => read_binding(state, context, module, &name),
        ResolvedBinding::Namespace(module) => Ok(Value::Object(namespace_object(state, module))),
    }
}

fn display_name(local: &str) -> &str {
    if local == ast::DEFAULT_EXPORT_BINDING {
        "default"
    } else {
        local
    }
}

/// Returns the namespace object of `module`, creating it on first use.
pub fn namespace_object(state: &mut RuntimeState, module: ModuleId) -> ObjectId {
    if let Some(namespace) = state.module(module).namespace {
        return namespace;
    }
    let namespace = state.heap.alloc(JsObject::new(ObjectKind::Namespace(module), None));
    state.module_mut(module).namespace = Some(namespace);
    namespace
}

/// Reads an export through a namespace object. Unknown names read as
/// `undefined`.
pub fn namespace_get(state: &mut RuntimeState, context: ContextId, module: ModuleId, name: &str) -> Completion<Value> {
    match resolve_export(state, module, name) {
        Some(resolved) => read_resolved(state, context, resolved),
        None => Ok(Value::Undefined),
    }
}

/// Sorted export names of `module`.
pub fn export_names(state: &RuntimeState, module: ModuleId) -> Vec<String> {
    let mut names: Vec<String> = state.module(module).exports.keys().cloned().collect();
    names.sort();
    names
}

/// Evaluates `module` after its dependencies.
pub fn evaluate_graph(state: &mut RuntimeState, context: ContextId, module: ModuleId) -> Completion<()> {
    match state.module(module).status {
        ModuleStatus::Evaluated | ModuleStatus::Evaluating => return Ok(()),
        ModuleStatus::Errored => {
            let error = state.module(module).error.clone().unwrap_or_default();
            return Err(Throw(error));
        }
        ModuleStatus::Linked => {}
        ModuleStatus::Initialized | ModuleStatus::Parsing | ModuleStatus::Parsed => {
            let error = state.create_error(context, ErrorKind::Error, "Module is not linked");
            return Err(Throw(error));
        }
    }

    state.module_mut(module).status = ModuleStatus::Evaluating;
    tracing::trace!(module = module.0, "evaluating module");

    let dependencies: Vec<ModuleId> = state.module(module).requested.iter().map(|(_, id)| *id).collect();
    for dependency in dependencies {
        if let Err(thrown) = evaluate_graph(state, context, dependency) {
            state.module_mut(module).fail(thrown.0.clone());
            return Err(thrown);
        }
    }

    if let Err(thrown) = interpreter::run_module(state, context, module) {
        state.module_mut(module).fail(thrown.0.clone());
        return Err(thrown);
    }

    state.module_mut(module).status = ModuleStatus::Evaluated;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::runtime::JsRuntimeAttributes;
    use std::rc::Rc;

    struct Graph {
        state: RuntimeState,
        ctx: ContextId,
        ids: Vec<ModuleId>,
    }

    /// Builds a parsed graph; module 0 is the root, imports resolve by name.
    fn graph(modules: &[(&str, &str)]) -> Graph {
        let mut state = RuntimeState::new(1, JsRuntimeAttributes::empty());
        let ctx = state.create_context();
        let mut ids = Vec::new();
        for (index, (name, source)) in modules.iter().enumerate() {
            let referencing = if index == 0 { None } else { Some(ids[0]) };
            let id = state.create_module(ctx, referencing, Some(Rc::from(*name)));
            state.module_mut(id).ast = Some(Rc::new(parse_module(source).unwrap()));
            state.module_mut(id).status = ModuleStatus::Parsed;
            ids.push(id);
        }
        for id in &ids {
            let requested = state.module(*id).ast.as_ref().unwrap().requested_modules();
            let resolved = requested
                .into_iter()
                .map(|spec| {
                    let index = modules.iter().position(|(name, _)| *name == spec).unwrap();
                    (spec, ids[index])
                })
                .collect();
            state.module_mut(*id).requested = resolved;
        }
        Graph { state, ctx, ids }
    }

    fn run(g: &mut Graph) -> Completion<()> {
        link_graph(&mut g.state, g.ctx, g.ids[0])?;
        evaluate_graph(&mut g.state, g.ctx, g.ids[0])
    }

    fn export(g: &mut Graph, index: usize, name: &str) -> Value {
        namespace_get(&mut g.state, g.ctx, g.ids[index], name).unwrap()
    }

    #[test]
    fn test_dependencies_evaluate_first() {
        let mut g = graph(&[
            ("main", "import { n } from 'dep'; export const doubled = n * 2;"),
            ("dep", "export const n = 21;"),
        ]);
        run(&mut g).unwrap();
        assert_eq!(export(&mut g, 0, "doubled"), Value::Number(42.0));
        assert_eq!(g.state.module(g.ids[1]).status, ModuleStatus::Evaluated);
    }

    #[test]
    fn test_missing_export_is_a_syntax_error() {
        let mut g = graph(&[("main", "import { nope } from 'dep';"), ("dep", "export const n = 1;")]);
        let thrown = run(&mut g).unwrap_err();
        let message = g.state.to_display_string(g.ctx, &thrown.0);
        assert_eq!(
            message,
            "SyntaxError: The requested module 'dep' does not provide an export named 'nope'"
        );
        assert_eq!(g.state.module(g.ids[0]).status, ModuleStatus::Errored);
    }

    #[test]
    fn test_cycles_terminate_and_bindings_are_live() {
        let mut g = graph(&[
            ("a", "import { b } from 'b'; export let a = 'a'; export const seen = b;"),
            ("b", "import * as ns from 'a'; export let b = 'b'; export const early = typeof ns;"),
        ]);
        run(&mut g).unwrap();
        assert_eq!(export(&mut g, 0, "seen"), Value::string("b"));
        assert_eq!(export(&mut g, 1, "early"), Value::string("object"));
    }

    #[test]
    fn test_reexported_import_resolves_to_origin() {
        let mut g = graph(&[
            ("main", "import { value } from 'middle'; export default value;"),
            ("middle", "import { value } from 'leaf'; export { value };"),
            ("leaf", "export const value = 'leaf';"),
        ]);
        run(&mut g).unwrap();
        assert_eq!(
            resolve_export(&g.state, g.ids[1], "value"),
            Some(ResolvedBinding::Local {
                module: g.ids[2],
                name: "value".to_string()
            })
        );
        assert_eq!(export(&mut g, 0, "default"), Value::string("leaf"));
    }

    #[test]
    fn test_throw_marks_module_errored() {
        let mut g = graph(&[("main", "import 'dep';"), ("dep", "throw new Error('bad');")]);
        let thrown = run(&mut g).unwrap_err();
        assert_eq!(g.state.to_display_string(g.ctx, &thrown.0), "Error: bad");
        assert_eq!(g.state.module(g.ids[1]).status, ModuleStatus::Errored);
        assert_eq!(g.state.module(g.ids[0]).status, ModuleStatus::Errored);
    }

    #[test]
    fn test_export_names_are_sorted() {
        let mut g = graph(&[("main", "export const b = 1; export default 2; export let a;")]);
        run(&mut g).unwrap();
        assert_eq!(export_names(&g.state, g.ids[0]), vec!["a", "b", "default"]);
    }
}
