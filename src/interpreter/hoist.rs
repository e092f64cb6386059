//! Declaration pre-pass
//!
//! Collects the names a function body, script or block declares before any
//! of it runs: `var` names (which ignore block boundaries), top-level
//! function declarations, and lexical `let`/`const`/`class` names.

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::ast::{
    ExportKind, ForHead, ForInit, FunctionBody, FunctionNode, Program, Statement, VariableKind,
};
use crate::value::{CheapClone, JsString};

#[derive(Debug, Clone)]
pub struct LexicalName {
    pub name: JsString,
    pub constant: bool,
}

/// Declarations of a function body or program
#[derive(Debug, Default)]
pub struct ScopeInfo {
    /// `var` names, first occurrence order, function names excluded
    pub var_names: Vec<JsString>,
    /// Function declarations to instantiate; for duplicate names the last wins
    pub functions: Vec<Rc<FunctionNode>>,
    pub lexical: Vec<LexicalName>,
}

impl ScopeInfo {
    pub fn for_function(node: &FunctionNode) -> Rc<ScopeInfo> {
        node.scope
            .get_or_init(|| match &node.body {
                FunctionBody::Block(body) => Rc::new(Self::collect(body)),
                FunctionBody::Expression(_) => Rc::new(ScopeInfo::default()),
            })
            .clone()
    }

    pub fn for_program(program: &Program) -> Rc<ScopeInfo> {
        program.scope.get_or_init(|| Rc::new(Self::collect(&program.body))).clone()
    }

    fn collect(body: &[Statement]) -> ScopeInfo {
        let mut info = ScopeInfo::default();
        let mut seen = FxHashSet::default();
        for stmt in body {
            collect_var_names(stmt, &mut info.var_names, &mut seen);
        }

        let mut functions: Vec<Rc<FunctionNode>> = Vec::new();
        for stmt in body {
            if let Some(func) = top_level_function(stmt) {
                if let Some(name) = func.id.as_ref().map(|id| &id.name) {
                    functions.retain(|f| f.id.as_ref().map(|id| &id.name) != Some(name));
                }
                functions.push(func);
            }
        }
        info.var_names.retain(|name| {
            !functions
                .iter()
                .any(|f| f.id.as_ref().is_some_and(|id| &id.name == name))
        });
        info.functions = functions;
        info.lexical = lexical_names(body);
        info
    }

    /// Every name the body declares at var scope (vars and functions)
    pub fn var_scoped_names(&self) -> Vec<JsString> {
        let mut names = self.var_names.clone();
        for func in &self.functions {
            if let Some(id) = &func.id {
                names.push(id.name.cheap_clone());
            }
        }
        names
    }
}

/// Declarations scoped to a block or a switch body
#[derive(Debug, Default)]
pub struct BlockScope {
    pub lexical: Vec<LexicalName>,
    /// Block-level function declarations (lexical, initialized on entry)
    pub functions: Vec<Rc<FunctionNode>>,
}

impl BlockScope {
    pub fn collect<'a>(body: impl IntoIterator<Item = &'a Statement> + Clone) -> Option<BlockScope> {
        let lexical = lexical_names(body.clone());
        let functions: Vec<Rc<FunctionNode>> = body
            .into_iter()
            .filter_map(|stmt| match stmt {
                Statement::FunctionDeclaration(f) => Some(f.clone()),
                _ => None,
            })
            .collect();
        if lexical.is_empty() && functions.is_empty() {
            return None;
        }
        Some(BlockScope { lexical, functions })
    }
}

fn top_level_function(stmt: &Statement) -> Option<Rc<FunctionNode>> {
    match stmt {
        Statement::FunctionDeclaration(f) => Some(f.clone()),
        Statement::Labeled(l) => top_level_function(&l.body),
        Statement::Export(e) => match &e.kind {
            ExportKind::Declaration(Statement::FunctionDeclaration(f))
            | ExportKind::DefaultDeclaration(Statement::FunctionDeclaration(f)) => Some(f.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn lexical_names<'a>(body: impl IntoIterator<Item = &'a Statement>) -> Vec<LexicalName> {
    let mut out = Vec::new();
    for stmt in body {
        lexical_names_of(stmt, &mut out);
    }
    out
}

fn lexical_names_of(stmt: &Statement, out: &mut Vec<LexicalName>) {
    match stmt {
        Statement::VariableDeclaration(decl) if decl.kind.is_lexical() => {
            let mut ids = Vec::new();
            for d in &decl.declarations {
                d.id.bound_names(&mut ids);
            }
            out.extend(ids.into_iter().map(|id| LexicalName {
                name: id.name,
                constant: decl.kind == VariableKind::Const,
            }));
        }
        Statement::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                out.push(LexicalName {
                    name: id.name.cheap_clone(),
                    constant: false,
                });
            }
        }
        Statement::Export(e) => match &e.kind {
            ExportKind::DefaultDeclaration(Statement::ClassDeclaration(class)) if class.id.is_none() => {
                out.push(LexicalName {
                    name: JsString::from(DEFAULT_EXPORT_BINDING),
                    constant: false,
                });
            }
            ExportKind::Declaration(inner) | ExportKind::DefaultDeclaration(inner) => {
                lexical_names_of(inner, out);
            }
            ExportKind::DefaultExpression(_) => out.push(LexicalName {
                name: JsString::from(DEFAULT_EXPORT_BINDING),
                constant: true,
            }),
            ExportKind::Named(_) => {}
        },
        _ => {}
    }
}

/// Local binding behind `export default <expression>`
pub const DEFAULT_EXPORT_BINDING: &str = "*default*";

fn push_var(name: JsString, names: &mut Vec<JsString>, seen: &mut FxHashSet<JsString>) {
    if seen.insert(name.cheap_clone()) {
        names.push(name);
    }
}

fn collect_var_names(stmt: &Statement, names: &mut Vec<JsString>, seen: &mut FxHashSet<JsString>) {
    match stmt {
        Statement::VariableDeclaration(decl) if decl.kind == VariableKind::Var => {
            let mut ids = Vec::new();
            for d in &decl.declarations {
                d.id.bound_names(&mut ids);
            }
            for id in ids {
                push_var(id.name, names, seen);
            }
        }
        Statement::Block(block) => {
            for s in block.body.iter() {
                collect_var_names(s, names, seen);
            }
        }
        Statement::If(s) => {
            collect_var_names(&s.consequent, names, seen);
            if let Some(alt) = &s.alternate {
                collect_var_names(alt, names, seen);
            }
        }
        Statement::For(s) => {
            if let Some(ForInit::Variable(decl)) = &s.init {
                collect_var_names(&Statement::VariableDeclaration(decl.clone()), names, seen);
            }
            collect_var_names(&s.body, names, seen);
        }
        Statement::ForIn(s) | Statement::ForOf(s) => {
            if let ForHead::Declaration(VariableKind::Var, pattern) = &s.left {
                let mut ids = Vec::new();
                pattern.bound_names(&mut ids);
                for id in ids {
                    push_var(id.name, names, seen);
                }
            }
            collect_var_names(&s.body, names, seen);
        }
        Statement::While(s) | Statement::DoWhile(s) => collect_var_names(&s.body, names, seen),
        Statement::Try(s) => {
            for st in s.block.body.iter() {
                collect_var_names(st, names, seen);
            }
            if let Some(handler) = &s.handler {
                for st in handler.body.body.iter() {
                    collect_var_names(st, names, seen);
                }
            }
            if let Some(finalizer) = &s.finalizer {
                for st in finalizer.body.iter() {
                    collect_var_names(st, names, seen);
                }
            }
        }
        Statement::Switch(s) => {
            for case in s.cases.iter() {
                for st in case.consequent.iter() {
                    collect_var_names(st, names, seen);
                }
            }
        }
        Statement::With(s) => collect_var_names(&s.body, names, seen),
        Statement::Labeled(s) => collect_var_names(&s.body, names, seen),
        Statement::Export(e) => {
            if let ExportKind::Declaration(inner) = &e.kind {
                collect_var_names(inner, names, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn scope_of(source: &str) -> Rc<ScopeInfo> {
        let program = Parser::new(source).parse_program();
        let Ok(program) = program else {
            panic!("parse failed");
        };
        ScopeInfo::for_program(&program)
    }

    fn names(list: &[JsString]) -> Vec<&str> {
        list.iter().map(|n| n.as_str()).collect()
    }

    #[test]
    fn test_vars_cross_blocks_not_functions() {
        let info = scope_of(
            "var a; { var b; let c; } if (x) { for (var i = 0;;) {} } function f() { var inner; }",
        );
        assert_eq!(names(&info.var_names), vec!["a", "b", "i"]);
        assert_eq!(info.functions.len(), 1);
        assert!(info.lexical.is_empty());
    }

    #[test]
    fn test_lexical_top_level_only() {
        let info = scope_of("let a = 1; const b = 2; class C {} { let nested; }");
        let lexical: Vec<(&str, bool)> = info
            .lexical
            .iter()
            .map(|l| (l.name.as_str(), l.constant))
            .collect();
        assert_eq!(lexical, vec![("a", false), ("b", true), ("C", false)]);
    }

    #[test]
    fn test_last_function_declaration_wins() {
        let info = scope_of("var f; function f() { return 1; } function f() { return 2; }");
        assert_eq!(info.functions.len(), 1);
        assert!(info.var_names.is_empty());
        assert_eq!(names(&info.var_scoped_names()), vec!["f"]);
    }
}
