//! Module loading and evaluation
//!
//! The host registers module sources by specifier. Evaluating a module
//! first evaluates its not-yet-visited dependencies on the same coroutine,
//! so a top-level `await` anywhere in the graph suspends the whole load.
//! Imports are indirect bindings into the exporting module's environment.

use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};
use tracing::debug;

use crate::ast::{ExportKind, ImportSpecifier, Program, Statement};
use crate::completion::Completion;
use crate::environment::{EnvRef, Environment};
use crate::error::JsError;
use crate::object::Access;
use crate::parser::Parser;
use crate::value::{CheapClone, JsString, JsValue};

use super::Interpreter;
use super::async_fn::{AsyncInvocation, InvocationState};
use super::frame::{ActivationKind, Context, Coroutine, Flow, Op, Step};
use super::hoist::{DEFAULT_EXPORT_BINDING, ScopeInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Unlinked,
    /// Body queued or running
    Evaluating,
    Evaluated,
}

pub struct ModuleInstance {
    pub specifier: JsString,
    pub program: Rc<Program>,
    pub env: EnvRef,
    status: Cell<ModuleStatus>,
    /// Exported name to local binding name
    exports: IndexMap<JsString, JsString, FxBuildHasher>,
}

impl ModuleInstance {
    fn new(specifier: JsString, program: Program, global_env: &EnvRef) -> Self {
        let exports = export_table(&program);
        Self {
            specifier,
            program: Rc::new(program),
            env: Environment::new_module(Some(global_env.cheap_clone())),
            status: Cell::new(ModuleStatus::Unlinked),
            exports,
        }
    }

    pub fn status(&self) -> ModuleStatus {
        self.status.get()
    }

    /// Claim the module for evaluation; false when it was already visited
    fn begin_visit(&self) -> bool {
        if self.status.get() != ModuleStatus::Unlinked {
            return false;
        }
        self.status.set(ModuleStatus::Evaluating);
        true
    }

    pub(crate) fn mark_evaluated(&self) {
        self.status.set(ModuleStatus::Evaluated);
    }

    /// Environment and local name behind an exported name
    pub fn resolve_export(&self, name: &str) -> Option<(EnvRef, JsString)> {
        self.exports
            .get(name)
            .map(|local| (self.env.cheap_clone(), local.cheap_clone()))
    }

    pub fn export_names(&self) -> impl Iterator<Item = &JsString> {
        self.exports.keys()
    }
}

/// Registered sources and the instances created from them
#[derive(Default)]
pub struct ModuleRegistry {
    sources: FxHashMap<String, Rc<str>>,
    instances: FxHashMap<String, Rc<ModuleInstance>>,
}

impl ModuleRegistry {
    pub fn register(&mut self, specifier: &str, source: &str) {
        self.sources.insert(specifier.to_string(), Rc::from(source));
    }

    pub fn instance(&self, specifier: &str) -> Option<Rc<ModuleInstance>> {
        self.instances.get(specifier).cloned()
    }
}

/// Exported names of a module body
fn export_table(program: &Program) -> IndexMap<JsString, JsString, FxBuildHasher> {
    let mut exports = IndexMap::default();
    for stmt in program.body.iter() {
        let Statement::Export(export) = stmt else {
            continue;
        };
        match &export.kind {
            ExportKind::Declaration(decl) => {
                for name in declared_names(decl) {
                    exports.insert(name.cheap_clone(), name);
                }
            }
            ExportKind::Named(specifiers) => {
                for spec in specifiers {
                    exports.insert(spec.exported.cheap_clone(), spec.local.name.cheap_clone());
                }
            }
            ExportKind::DefaultExpression(_) => {
                exports.insert(JsString::from("default"), JsString::from(DEFAULT_EXPORT_BINDING));
            }
            ExportKind::DefaultDeclaration(decl) => {
                let local = declared_names(decl)
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| JsString::from(DEFAULT_EXPORT_BINDING));
                exports.insert(JsString::from("default"), local);
            }
        }
    }
    exports
}

fn declared_names(stmt: &Statement) -> Vec<JsString> {
    match stmt {
        Statement::VariableDeclaration(decl) => {
            let mut ids = Vec::new();
            for d in &decl.declarations {
                d.id.bound_names(&mut ids);
            }
            ids.into_iter().map(|id| id.name).collect()
        }
        Statement::FunctionDeclaration(f) => f.id.iter().map(|id| id.name.cheap_clone()).collect(),
        Statement::ClassDeclaration(c) => c.id.iter().map(|id| id.name.cheap_clone()).collect(),
        _ => Vec::new(),
    }
}

impl Interpreter {
    /// Instance for `specifier`, parsing the registered source on first use
    pub(crate) fn load_module(&mut self, specifier: &str) -> Result<Rc<ModuleInstance>, JsError> {
        if let Some(instance) = self.modules.instance(specifier) {
            return Ok(instance);
        }
        let Some(source) = self.modules.sources.get(specifier).cloned() else {
            return Err(JsError::type_error(format!("Cannot find module '{}'", specifier)));
        };
        let program = Parser::new(&source).parse_module()?;
        let instance = Rc::new(ModuleInstance::new(
            JsString::from(specifier),
            program,
            &self.realm.global_env,
        ));
        debug!(specifier, exports = instance.exports.len(), "module instantiated");
        self.modules
            .instances
            .insert(specifier.to_string(), instance.clone());
        Ok(instance)
    }

    /// Value of an evaluated module's export
    pub fn module_export(&mut self, specifier: &str, name: &str) -> Result<JsValue, JsError> {
        let instance = self
            .modules
            .instance(specifier)
            .ok_or_else(|| JsError::type_error(format!("Cannot find module '{}'", specifier)))?;
        let (env, local) = instance.resolve_export(name).ok_or_else(|| {
            JsError::reference_error_with_message(format!(
                "Module '{}' does not provide an export named '{}'",
                specifier, name
            ))
        })?;
        match env.get_binding_value(&local, true)? {
            Access::Value(v) => Ok(v),
            Access::Getter(getter) => self.call_function(&JsValue::Object(getter), JsValue::Undefined, &[]),
        }
    }

    /// Root of a module evaluation: an async invocation over the module
    /// body and its dependencies
    pub(crate) fn start_module(&mut self, ctx: &Rc<Context>, instance: Rc<ModuleInstance>) -> Step {
        let promise = self.create_promise();
        self.mark_handled(&promise);
        let id = self.fresh_invocation_id();
        let invocation = Rc::new(AsyncInvocation::new(id, promise));
        invocation.set_state(InvocationState::Started);

        let mut co = Coroutine::default();
        co.push(ctx, Op::AsyncShell { script: true });
        if instance.begin_visit() {
            let module_ctx = Context::new(instance.env.cheap_clone(), instance.env.cheap_clone(), true);
            co.push(&module_ctx, Op::ModuleEvaluated(instance.clone()));
            co.push(&module_ctx, Op::ModuleBody(instance));
        }
        self.enter_activation(
            ActivationKind::Async {
                invocation,
                deliver_promise: true,
            },
            co,
        );
        Ok(Flow::Continue)
    }

    /// Declaration instantiation and import linking, then dependencies,
    /// then the body
    pub(crate) fn module_body(&mut self, instance: &Rc<ModuleInstance>) -> Step {
        let env = &instance.env;
        let module_ctx = Context::new(env.cheap_clone(), env.cheap_clone(), true);
        let info = ScopeInfo::for_program(&instance.program);

        for name in &info.var_names {
            env.create_mutable_binding(name.cheap_clone(), false);
            env.initialize_binding(name, JsValue::Undefined)?;
        }
        for func in &info.functions {
            let (binding, name) = match &func.id {
                Some(id) => (id.name.cheap_clone(), id.name.cheap_clone()),
                None => (JsString::from(DEFAULT_EXPORT_BINDING), JsString::from("default")),
            };
            let fobj = self.instantiate_function(env, func, name, None);
            env.create_mutable_binding(binding.cheap_clone(), false);
            env.initialize_binding(&binding, JsValue::Object(fobj))?;
        }
        for lexical in &info.lexical {
            if lexical.constant {
                env.create_immutable_binding(lexical.name.cheap_clone(), true);
            } else {
                env.create_mutable_binding(lexical.name.cheap_clone(), false);
            }
        }

        let mut dependencies = Vec::new();
        for stmt in instance.program.body.iter() {
            let Statement::Import(import) = stmt else {
                continue;
            };
            let dependency = self.load_module(import.source.as_str())?;
            for spec in &import.specifiers {
                let imported = match spec {
                    ImportSpecifier::Named { imported, .. } => imported.as_str(),
                    ImportSpecifier::Default { .. } => "default",
                };
                let Some((target, target_name)) = dependency.resolve_export(imported) else {
                    return Err(JsError::syntax_error(
                        format!(
                            "The requested module '{}' does not provide an export named '{}'",
                            import.source, imported
                        ),
                        import.span.line,
                        import.span.column,
                    )
                    .into());
                };
                env.create_import_binding(spec.local().name.cheap_clone(), target, target_name)?;
            }
            if dependency.begin_visit() {
                dependencies.push(dependency);
            }
        }

        self.co.completion = Completion::empty();
        self.co.push(
            &module_ctx,
            Op::StmtList {
                body: instance.program.body.clone(),
                index: 0,
                value: None,
            },
        );
        for dependency in dependencies.into_iter().rev() {
            debug!(specifier = %dependency.specifier, importer = %instance.specifier, "evaluating dependency");
            let dep_ctx = Context::new(dependency.env.cheap_clone(), dependency.env.cheap_clone(), true);
            self.co.push(&dep_ctx, Op::ModuleEvaluated(dependency.clone()));
            self.co.push(&dep_ctx, Op::ModuleBody(dependency));
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_table() {
        let program = Parser::new(
            "export const a = 1; export function f() {} let b = 2; export { b as c }; export default 42;",
        )
        .parse_module();
        let Ok(program) = program else {
            panic!("parse failed");
        };
        let table = export_table(&program);
        let entries: Vec<(&str, &str)> = table.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            entries,
            vec![("a", "a"), ("f", "f"), ("c", "b"), ("default", DEFAULT_EXPORT_BINDING)]
        );
    }
}
