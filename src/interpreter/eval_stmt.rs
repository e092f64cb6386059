//! Statement evaluation
//!
//! Each statement leaves its completion in the coroutine's completion
//! register. `break`/`continue` stay there until a loop, switch or label
//! scope consumes them; `return`/`throw` leave as `Err(Unwind)`.

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::ast::{
    ExportKind, Expression, ForHead, ForInOfStatement, ForInit, IfStatement, LabeledStatement, Pattern, Statement,
    SwitchStatement, TryStatement, VariableDeclaration, VariableKind, WhileStatement, WithStatement,
};
use crate::completion::{Completion, Unwind};
use crate::environment::{EnvRef, Environment};
use crate::error::JsError;
use crate::object::{Access, ObjectRef};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe};

use super::Interpreter;
use super::frame::{
    BindTarget, Context, Flow, ForInState, ForOfState, ForState, IteratorRecord, LoopState, NameHint, Op, Pending,
    Step, SwitchState,
};
use super::hoist::{BlockScope, DEFAULT_EXPORT_BINDING};

/// What a loop does after its body completed
enum LoopControl {
    Next,
    Exit,
}

fn no_labels() -> Rc<[JsString]> {
    Rc::from(Vec::new())
}

/// `NamedExpr` for anonymous function definitions, plain `Expr` otherwise
pub(crate) fn named_or_plain(expr: &Expression, name: &JsString) -> Op {
    if expr.unparenthesized().is_anonymous_function_definition() {
        Op::NamedExpr(expr.clone(), NameHint::Static(name.cheap_clone()))
    } else {
        Op::Expr(expr.clone())
    }
}

/// Fresh declarative scope holding the names a loop head declares
fn head_environment(ctx: &Rc<Context>, kind: VariableKind, pattern: &Pattern) -> EnvRef {
    let env = Environment::new_declarative(Some(ctx.lexical_env.cheap_clone()));
    let mut names = Vec::new();
    pattern.bound_names(&mut names);
    for id in names {
        if kind == VariableKind::Const {
            env.create_immutable_binding(id.name, true);
        } else {
            env.create_mutable_binding(id.name, false);
        }
    }
    env
}

impl Interpreter {
    pub(crate) fn eval_statement(&mut self, ctx: &Rc<Context>, stmt: Statement) -> Step {
        match stmt {
            Statement::Expression(node) => {
                self.co.push(ctx, Op::ExprStmtEnd);
                self.co.push(ctx, Op::Expr(node.expression.clone()));
            }
            Statement::VariableDeclaration(decl) => {
                self.co.push(ctx, Op::Declarators { decl, index: 0 });
            }
            Statement::FunctionDeclaration(_) | Statement::Empty(_) | Statement::Debugger(_) | Statement::Import(_) => {
                self.co.completion = Completion::empty();
            }
            Statement::ClassDeclaration(node) => {
                let Some(id) = &node.id else {
                    return Err(JsError::internal_error("class declaration without a name").into());
                };
                let name = id.name.cheap_clone();
                self.co.push(ctx, Op::ClassDeclBind(name.cheap_clone()));
                self.start_class(ctx, &node, name)?;
            }
            Statement::Block(block) => self.enter_block(ctx, &block.body),
            Statement::If(node) => {
                self.co.push(ctx, Op::IfBranch(node.clone()));
                self.co.push(ctx, Op::Expr(node.test.clone()));
            }
            Statement::Switch(node) => self.start_switch(ctx, node, no_labels()),
            Statement::For(_)
            | Statement::ForIn(_)
            | Statement::ForOf(_)
            | Statement::While(_)
            | Statement::DoWhile(_) => self.start_loop(ctx, &stmt, no_labels()),
            Statement::Try(node) => self.start_try(ctx, node),
            Statement::With(node) => {
                self.co.push(ctx, Op::WithEnter(node.clone()));
                self.co.push(ctx, Op::Expr(node.object.clone()));
            }
            Statement::Return(node) => {
                self.co.push(ctx, Op::ReturnValue);
                match &node.argument {
                    Some(arg) => self.co.push(ctx, Op::Expr(arg.clone())),
                    None => self.co.push(ctx, Op::Push(JsValue::Undefined)),
                }
            }
            Statement::Throw(node) => {
                self.co.push(ctx, Op::ThrowValue);
                self.co.push(ctx, Op::Expr(node.argument.clone()));
            }
            Statement::Break(node) => {
                self.co.completion = Completion::Break {
                    label: node.label.as_ref().map(|l| l.name.cheap_clone()),
                    value: None,
                };
            }
            Statement::Continue(node) => {
                self.co.completion = Completion::Continue {
                    label: node.label.as_ref().map(|l| l.name.cheap_clone()),
                    value: None,
                };
            }
            Statement::Labeled(node) => self.labeled_statement(ctx, &node),
            Statement::Export(node) => return self.export_statement(ctx, &node.kind),
        }
        Ok(Flow::Continue)
    }

    /// Continue a statement list. For `index > 0` the register holds the
    /// completion of `body[index - 1]`.
    pub(crate) fn statement_list(
        &mut self,
        ctx: &Rc<Context>,
        body: Rc<[Statement]>,
        index: usize,
        value: Option<JsValue>,
    ) -> Step {
        let mut value = value;
        if index > 0 {
            let completion = std::mem::take(&mut self.co.completion).update_empty(value);
            if completion.is_abrupt() {
                self.co.completion = completion;
                return Ok(Flow::Continue);
            }
            value = completion.carried();
        }
        match body.get(index).cloned() {
            None => self.co.completion = Completion::Normal(value),
            Some(stmt) => {
                self.co.push(
                    ctx,
                    Op::StmtList {
                        body,
                        index: index + 1,
                        value,
                    },
                );
                self.co.push(ctx, Op::Stmt(stmt));
            }
        }
        Ok(Flow::Continue)
    }

    /// Block scope: uninitialized lexical names, initialized function declarations
    pub(crate) fn enter_block(&mut self, ctx: &Rc<Context>, body: &Rc<[Statement]>) {
        let block_ctx = match BlockScope::collect(body.iter()) {
            Some(scope) => {
                let env = Environment::new_declarative(Some(ctx.lexical_env.cheap_clone()));
                self.instantiate_block(&env, &scope);
                ctx.with_lexical(env)
            }
            None => ctx.clone(),
        };
        self.co.completion = Completion::empty();
        self.co.push(
            &block_ctx,
            Op::StmtList {
                body: body.clone(),
                index: 0,
                value: None,
            },
        );
    }

    fn instantiate_block(&self, env: &EnvRef, scope: &BlockScope) {
        for lexical in &scope.lexical {
            if lexical.constant {
                env.create_immutable_binding(lexical.name.cheap_clone(), true);
            } else {
                env.create_mutable_binding(lexical.name.cheap_clone(), false);
            }
        }
        for func in &scope.functions {
            let Some(id) = &func.id else { continue };
            env.create_mutable_binding(id.name.cheap_clone(), false);
            let fobj = self.instantiate_function(env, func, id.name.cheap_clone(), None);
            env.initialize_or_set(&id.name, JsValue::Object(fobj));
        }
    }

    pub(crate) fn declarators(&mut self, ctx: &Rc<Context>, decl: Rc<VariableDeclaration>, index: usize) -> Step {
        let Some(declarator) = decl.declarations.get(index).cloned() else {
            self.co.completion = Completion::empty();
            return Ok(Flow::Continue);
        };
        let kind = decl.kind;
        self.co.push(ctx, Op::Declarators { decl, index: index + 1 });

        let target = if kind.is_lexical() {
            BindTarget::Initialize(ctx.lexical_env.cheap_clone())
        } else {
            BindTarget::Assign
        };
        match (&declarator.init, kind) {
            // Hoisted `var x;` has nothing left to do
            (None, VariableKind::Var) => {}
            (None, _) => {
                self.co.push(
                    ctx,
                    Op::BindPattern {
                        pattern: declarator.id.clone(),
                        target,
                    },
                );
                self.co.push(ctx, Op::Push(JsValue::Undefined));
            }
            (Some(init), _) => {
                let value_op = match &declarator.id {
                    Pattern::Identifier(id) => named_or_plain(init, &id.name),
                    _ => Op::Expr(init.clone()),
                };
                self.co.push(
                    ctx,
                    Op::BindPattern {
                        pattern: declarator.id.clone(),
                        target,
                    },
                );
                self.co.push(ctx, value_op);
            }
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn if_branch(&mut self, ctx: &Rc<Context>, node: Rc<IfStatement>) -> Step {
        let test = self.pop_value()?;
        let branch = if test.to_boolean() {
            Some(&node.consequent)
        } else {
            node.alternate.as_ref()
        };
        match branch {
            Some(stmt) => {
                self.co.push(ctx, Op::FillEmpty);
                self.co.push(ctx, Op::Stmt(stmt.clone()));
            }
            None => self.co.completion = Completion::Normal(Some(JsValue::Undefined)),
        }
        Ok(Flow::Continue)
    }

    fn labeled_statement(&mut self, ctx: &Rc<Context>, node: &LabeledStatement) {
        let mut labels = vec![node.label.name.cheap_clone()];
        let mut body = &node.body;
        while let Statement::Labeled(inner) = body {
            labels.push(inner.label.name.cheap_clone());
            body = &inner.body;
        }
        let labels: Rc<[JsString]> = labels.into();
        match body {
            stmt if stmt.is_iteration() => self.start_loop(ctx, stmt, labels),
            Statement::Switch(node) => self.start_switch(ctx, node.clone(), labels),
            stmt => {
                self.co.push(ctx, Op::LabelScope(labels));
                self.co.push(ctx, Op::Stmt(stmt.clone()));
            }
        }
    }

    pub(crate) fn label_scope(&mut self, labels: &[JsString]) -> Step {
        let completion = std::mem::take(&mut self.co.completion);
        self.co.completion = match completion {
            Completion::Break { label: Some(label), value } if labels.contains(&label) => Completion::Normal(value),
            other => other,
        };
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Loops
    // ═══════════════════════════════════════════════════════════════════════

    fn start_loop(&mut self, ctx: &Rc<Context>, stmt: &Statement, labels: Rc<[JsString]>) {
        match stmt {
            Statement::While(node) => self.co.push(ctx, Op::LoopTest(loop_state(node, labels))),
            Statement::DoWhile(node) => {
                self.co.completion = Completion::empty();
                self.co.push(ctx, Op::LoopAfterBody(loop_state(node, labels)));
                self.co.push(ctx, Op::Stmt(node.body.clone()));
            }
            Statement::For(node) => {
                let mut loop_ctx = ctx.clone();
                let mut per_iteration = Vec::new();
                if let Some(ForInit::Variable(decl)) = &node.init
                    && decl.kind.is_lexical()
                {
                    let env = Environment::new_declarative(Some(ctx.lexical_env.cheap_clone()));
                    let mut names = Vec::new();
                    for d in &decl.declarations {
                        d.id.bound_names(&mut names);
                    }
                    for id in names {
                        if decl.kind == VariableKind::Const {
                            env.create_immutable_binding(id.name, true);
                        } else {
                            per_iteration.push(id.name.cheap_clone());
                            env.create_mutable_binding(id.name, false);
                        }
                    }
                    loop_ctx = ctx.with_lexical(env);
                }
                let state = ForState {
                    node: node.clone(),
                    labels,
                    value: JsValue::Undefined,
                    per_iteration: per_iteration.into(),
                };
                self.co.push(&loop_ctx, Op::ForStart(state));
                match &node.init {
                    Some(ForInit::Variable(decl)) => self.co.push(
                        &loop_ctx,
                        Op::Declarators {
                            decl: decl.clone(),
                            index: 0,
                        },
                    ),
                    Some(ForInit::Expression(expr)) => {
                        self.co.push(&loop_ctx, Op::Pop);
                        self.co.push(&loop_ctx, Op::Expr(expr.clone()));
                    }
                    None => {}
                }
            }
            Statement::ForIn(node) => {
                self.co.push(
                    ctx,
                    Op::ForInStart {
                        node: node.clone(),
                        labels,
                    },
                );
                let head_ctx = self.for_head_context(ctx, node);
                self.co.push(&head_ctx, Op::Expr(node.right.clone()));
            }
            Statement::ForOf(node) => {
                self.co.push(
                    ctx,
                    Op::ForOfStart {
                        node: node.clone(),
                        labels,
                    },
                );
                let head_ctx = self.for_head_context(ctx, node);
                self.co.push(&head_ctx, Op::GetIterator);
                self.co.push(&head_ctx, Op::Expr(node.right.clone()));
            }
            _ => {}
        }
    }

    /// The iterated expression sees the head's names in their dead zone
    fn for_head_context(&self, ctx: &Rc<Context>, node: &ForInOfStatement) -> Rc<Context> {
        match &node.left {
            ForHead::Declaration(kind, pattern) if kind.is_lexical() => {
                ctx.with_lexical(head_environment(ctx, *kind, pattern))
            }
            _ => ctx.clone(),
        }
    }

    /// Consume the body's completion. `Exit` leaves the loop's own
    /// completion in the register.
    fn loop_control(&mut self, labels: &[JsString], value: &mut JsValue) -> LoopControl {
        let completion = std::mem::take(&mut self.co.completion);
        if let Some(v) = completion.carried() {
            *value = v;
        }
        match completion {
            Completion::Normal(_) => LoopControl::Next,
            Completion::Continue { label, .. } if Completion::targets(&label, labels, true) => LoopControl::Next,
            Completion::Break { label, .. } if Completion::targets(&label, labels, true) => {
                self.co.completion = Completion::Normal(Some(value.clone()));
                LoopControl::Exit
            }
            other => {
                self.co.completion = other.update_empty(Some(value.clone()));
                LoopControl::Exit
            }
        }
    }

    pub(crate) fn loop_test(&mut self, ctx: &Rc<Context>, state: LoopState) -> Step {
        let test = state.node.test.clone();
        self.co.push(ctx, Op::LoopCheck(state));
        self.co.push(ctx, Op::Expr(test));
        Ok(Flow::Continue)
    }

    pub(crate) fn loop_check(&mut self, ctx: &Rc<Context>, state: LoopState) -> Step {
        if !self.pop_value()?.to_boolean() {
            self.co.completion = Completion::Normal(Some(state.value));
            return Ok(Flow::Continue);
        }
        let body = state.node.body.clone();
        self.co.completion = Completion::empty();
        self.co.push(ctx, Op::LoopAfterBody(state));
        self.co.push(ctx, Op::Stmt(body));
        Ok(Flow::Continue)
    }

    pub(crate) fn loop_after_body(&mut self, ctx: &Rc<Context>, mut state: LoopState) -> Step {
        if let LoopControl::Next = self.loop_control(&state.labels.clone(), &mut state.value) {
            self.co.push(ctx, Op::LoopTest(state));
        }
        Ok(Flow::Continue)
    }

    /// Copy the `let` bindings of a `for` head into a fresh environment so
    /// closures of each iteration see their own values
    fn per_iteration_context(&self, ctx: &Rc<Context>, names: &[JsString]) -> Result<Rc<Context>, JsError> {
        if names.is_empty() {
            return Ok(ctx.clone());
        }
        let last = &ctx.lexical_env;
        let env = Environment::new_declarative(last.outer.clone());
        for name in names {
            let value = match last.get_binding_value(name, true)? {
                Access::Value(v) => v,
                Access::Getter(_) => JsValue::Undefined,
            };
            env.create_mutable_binding(name.cheap_clone(), false);
            env.initialize_binding(name, value)?;
        }
        Ok(ctx.with_lexical(env))
    }

    pub(crate) fn for_start(&mut self, ctx: &Rc<Context>, state: ForState) -> Step {
        let iteration_ctx = self.per_iteration_context(ctx, &state.per_iteration)?;
        self.co.push(&iteration_ctx, Op::ForTest(state));
        Ok(Flow::Continue)
    }

    pub(crate) fn for_test(&mut self, ctx: &Rc<Context>, state: ForState) -> Step {
        match state.node.test.clone() {
            Some(test) => {
                self.co.push(ctx, Op::ForCheck(state));
                self.co.push(ctx, Op::Expr(test));
            }
            None => {
                self.co.push(ctx, Op::ForCheck(state));
                self.co.push(ctx, Op::Push(JsValue::Boolean(true)));
            }
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn for_check(&mut self, ctx: &Rc<Context>, state: ForState) -> Step {
        if !self.pop_value()?.to_boolean() {
            self.co.completion = Completion::Normal(Some(state.value));
            return Ok(Flow::Continue);
        }
        let body = state.node.body.clone();
        self.co.completion = Completion::empty();
        self.co.push(ctx, Op::ForAfterBody(state));
        self.co.push(ctx, Op::Stmt(body));
        Ok(Flow::Continue)
    }

    pub(crate) fn for_after_body(&mut self, ctx: &Rc<Context>, mut state: ForState) -> Step {
        if let LoopControl::Exit = self.loop_control(&state.labels.clone(), &mut state.value) {
            return Ok(Flow::Continue);
        }
        let iteration_ctx = self.per_iteration_context(ctx, &state.per_iteration)?;
        let update = state.node.update.clone();
        self.co.push(&iteration_ctx, Op::ForUpdated(state));
        if let Some(update) = update {
            self.co.push(&iteration_ctx, Op::Pop);
            self.co.push(&iteration_ctx, Op::Expr(update));
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn for_updated(&mut self, ctx: &Rc<Context>, state: ForState) -> Step {
        self.for_test(ctx, state)
    }

    /// Bind the loop variable for one for-in/for-of iteration and run the body
    fn push_iteration(&mut self, ctx: &Rc<Context>, node: &ForInOfStatement, value: JsValue) {
        let (pattern, body_ctx, target) = match &node.left {
            ForHead::Declaration(kind, pattern) if kind.is_lexical() => {
                let env = head_environment(ctx, *kind, pattern);
                let body_ctx = ctx.with_lexical(env.cheap_clone());
                (pattern, body_ctx, BindTarget::Initialize(env))
            }
            ForHead::Declaration(_, pattern) | ForHead::Target(pattern) => (pattern, ctx.clone(), BindTarget::Assign),
        };
        self.co.completion = Completion::empty();
        self.co.push(&body_ctx, Op::Stmt(node.body.clone()));
        self.co.push(
            &body_ctx,
            Op::BindPattern {
                pattern: pattern.clone(),
                target,
            },
        );
        self.co.push(&body_ctx, Op::Push(value));
    }

    pub(crate) fn for_in_start(&mut self, ctx: &Rc<Context>, node: Rc<ForInOfStatement>, labels: Rc<[JsString]>) -> Step {
        let subject = self.pop_value()?;
        if subject.is_null_or_undefined() {
            self.co.completion = Completion::Normal(Some(JsValue::Undefined));
            return Ok(Flow::Continue);
        }
        let object = self.to_object(&subject)?;
        let keys = for_in_keys(&object);
        let state = ForInState {
            node,
            labels,
            value: JsValue::Undefined,
            object,
            keys: keys.into(),
            index: 0,
        };
        self.co.push(ctx, Op::ForInNext(state));
        Ok(Flow::Continue)
    }

    pub(crate) fn for_in_next(&mut self, ctx: &Rc<Context>, mut state: ForInState) -> Step {
        // Keys deleted before being visited are skipped
        let mut next = None;
        while let Some(key) = state.keys.get(state.index) {
            state.index += 1;
            if state.object.has_property(key) {
                next = Some(key.to_value());
                break;
            }
        }
        let Some(key) = next else {
            self.co.completion = Completion::Normal(Some(state.value));
            return Ok(Flow::Continue);
        };
        let node = state.node.clone();
        self.co.push(ctx, Op::ForInAfterBody(state));
        self.push_iteration(ctx, &node, key);
        Ok(Flow::Continue)
    }

    pub(crate) fn for_in_after_body(&mut self, ctx: &Rc<Context>, mut state: ForInState) -> Step {
        if let LoopControl::Next = self.loop_control(&state.labels.clone(), &mut state.value) {
            self.co.push(ctx, Op::ForInNext(state));
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn for_of_start(&mut self, ctx: &Rc<Context>, node: Rc<ForInOfStatement>, labels: Rc<[JsString]>) -> Step {
        let iterator = self.pop_value()?;
        let iter = self.iterator_record(iterator)?;
        let state = ForOfState {
            node,
            labels,
            value: JsValue::Undefined,
            iter: Rc::new(iter),
        };
        self.co.push(ctx, Op::ForOfNext(state));
        Ok(Flow::Continue)
    }

    pub(crate) fn for_of_next(&mut self, ctx: &Rc<Context>, state: ForOfState) -> Step {
        let iter = state.iter.clone();
        iter.done.set(true);
        self.co.push(ctx, Op::ForOfResult(state));
        self.invoke(ctx, iter.next.clone(), iter.iterator.clone(), Vec::new())
    }

    pub(crate) fn for_of_result(&mut self, ctx: &Rc<Context>, state: ForOfState) -> Step {
        let result = self.pop_value()?;
        if !result.is_object() {
            return Err(JsError::type_error(format!("Iterator result {} is not an object", describe(&result))).into());
        }
        if self.get_named(&result, "done")?.to_boolean() {
            self.co.completion = Completion::Normal(Some(state.value));
            return Ok(Flow::Continue);
        }
        let value = self.get_named(&result, "value")?;
        state.iter.done.set(false);
        let node = state.node.clone();
        self.co.push(ctx, Op::ForOfAfterBody(state));
        self.push_iteration(ctx, &node, value);
        Ok(Flow::Continue)
    }

    pub(crate) fn for_of_after_body(&mut self, ctx: &Rc<Context>, mut state: ForOfState) -> Step {
        match self.loop_control(&state.labels.clone(), &mut state.value) {
            LoopControl::Next => {
                self.co.push(ctx, Op::ForOfNext(state));
                Ok(Flow::Continue)
            }
            LoopControl::Exit => {
                let completion = std::mem::take(&mut self.co.completion);
                self.close_iterator(ctx, &state.iter, completion)
            }
        }
    }

    /// Leave a for-of early: call `return()` and restore `completion` after it
    fn close_iterator(&mut self, ctx: &Rc<Context>, iter: &IteratorRecord, completion: Completion) -> Step {
        iter.done.set(true);
        let method = self.get_named(&iter.iterator, "return")?;
        if method.is_null_or_undefined() {
            self.co.completion = completion;
            return Ok(Flow::Continue);
        }
        self.co.push(ctx, Op::ForOfClosed(completion));
        self.invoke(ctx, method, iter.iterator.clone(), Vec::new())
    }

    pub(crate) fn for_of_closed(&mut self, completion: Completion) -> Step {
        let result = self.pop_value()?;
        if !result.is_object() {
            return Err(JsError::type_error(format!("Iterator result {} is not an object", describe(&result))).into());
        }
        self.co.completion = completion;
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // switch
    // ═══════════════════════════════════════════════════════════════════════

    fn start_switch(&mut self, ctx: &Rc<Context>, node: Rc<SwitchStatement>, labels: Rc<[JsString]>) {
        let discriminant = node.discriminant.clone();
        self.co.push(ctx, Op::SwitchStart { node, labels });
        self.co.push(ctx, Op::Expr(discriminant));
    }

    pub(crate) fn switch_start(&mut self, ctx: &Rc<Context>, node: Rc<SwitchStatement>, labels: Rc<[JsString]>) -> Step {
        let discriminant = self.pop_value()?;
        let scope = BlockScope::collect(node.cases.iter().flat_map(|case| case.consequent.iter()));
        let block_ctx = match scope {
            Some(scope) => {
                let env = Environment::new_declarative(Some(ctx.lexical_env.cheap_clone()));
                self.instantiate_block(&env, &scope);
                ctx.with_lexical(env)
            }
            None => ctx.clone(),
        };
        let state = Rc::new(SwitchState {
            node,
            labels,
            discriminant,
        });
        self.co.push(&block_ctx, Op::SwitchTest { state, index: 0 });
        Ok(Flow::Continue)
    }

    /// Evaluate the next `case` test at or after `index`
    pub(crate) fn switch_test(&mut self, ctx: &Rc<Context>, state: Rc<SwitchState>, index: usize) -> Step {
        let cases = state.node.cases.clone();
        let next = cases
            .iter()
            .enumerate()
            .skip(index)
            .find_map(|(i, case)| case.test.as_ref().map(|test| (i, test.clone())));
        match next {
            Some((i, test)) => {
                self.co.push(ctx, Op::SwitchCompare { state, index: i });
                self.co.push(ctx, Op::Expr(test));
            }
            None => match cases.iter().position(|case| case.test.is_none()) {
                Some(default) => self.co.push(
                    ctx,
                    Op::SwitchRun {
                        state,
                        index: default,
                        value: JsValue::Undefined,
                    },
                ),
                None => self.co.completion = Completion::Normal(Some(JsValue::Undefined)),
            },
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn switch_compare(&mut self, ctx: &Rc<Context>, state: Rc<SwitchState>, index: usize) -> Step {
        let candidate = self.pop_value()?;
        if state.discriminant.strict_equals(&candidate) {
            self.co.push(
                ctx,
                Op::SwitchRun {
                    state,
                    index,
                    value: JsValue::Undefined,
                },
            );
        } else {
            self.co.push(ctx, Op::SwitchTest { state, index: index + 1 });
        }
        Ok(Flow::Continue)
    }

    /// Run the case body at `index`, falling through to the following ones
    pub(crate) fn switch_run(&mut self, ctx: &Rc<Context>, state: Rc<SwitchState>, index: usize, value: JsValue) -> Step {
        let Some(case) = state.node.cases.get(index) else {
            self.co.completion = Completion::Normal(Some(value));
            return Ok(Flow::Continue);
        };
        let body = case.consequent.clone();
        self.co.completion = Completion::empty();
        self.co.push(ctx, Op::SwitchAfterCase { state, index, value });
        self.co.push(ctx, Op::StmtList { body, index: 0, value: None });
        Ok(Flow::Continue)
    }

    pub(crate) fn switch_after_case(
        &mut self,
        ctx: &Rc<Context>,
        state: Rc<SwitchState>,
        index: usize,
        value: JsValue,
    ) -> Step {
        let completion = std::mem::take(&mut self.co.completion);
        let value = completion.carried().unwrap_or(value);
        match completion {
            Completion::Normal(_) => {
                self.co.push(
                    ctx,
                    Op::SwitchRun {
                        state,
                        index: index + 1,
                        value,
                    },
                );
            }
            Completion::Break { label, .. } if Completion::targets(&label, &state.labels, true) => {
                self.co.completion = Completion::Normal(Some(value));
            }
            other => self.co.completion = other.update_empty(Some(value)),
        }
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // try / with
    // ═══════════════════════════════════════════════════════════════════════

    fn start_try(&mut self, ctx: &Rc<Context>, node: Rc<TryStatement>) {
        let mark = self.co.mark();
        if node.finalizer.is_some() {
            self.co.push(
                ctx,
                Op::TryFinally {
                    node: node.clone(),
                    mark,
                },
            );
        }
        if node.handler.is_some() {
            self.co.push(
                ctx,
                Op::TryCatch {
                    node: node.clone(),
                    mark,
                },
            );
        }
        self.enter_block(ctx, &node.block.body);
    }

    /// A throw reached the `catch` clause: bind the parameter and run the block
    pub(crate) fn enter_catch(&mut self, ctx: &Rc<Context>, node: &TryStatement, value: JsValue) -> Result<(), JsError> {
        let Some(handler) = &node.handler else {
            return Err(JsError::internal_error("catch frame without a catch clause"));
        };
        let env = Environment::new_declarative(Some(ctx.lexical_env.cheap_clone()));
        let catch_ctx = ctx.with_lexical(env.cheap_clone());

        self.co.push(&catch_ctx, Op::FillEmpty);
        self.enter_block(&catch_ctx, &handler.body.body);
        if let Some(param) = &handler.param {
            let mut names = Vec::new();
            param.bound_names(&mut names);
            for id in names {
                env.create_mutable_binding(id.name, false);
            }
            self.co.push(
                &catch_ctx,
                Op::BindPattern {
                    pattern: param.clone(),
                    target: BindTarget::Initialize(env),
                },
            );
            self.co.push(&catch_ctx, Op::Push(value));
        }
        Ok(())
    }

    /// Run the `finally` block with `pending` parked beneath it
    pub(crate) fn enter_finally(&mut self, ctx: &Rc<Context>, node: &TryStatement, pending: Pending) -> Step {
        let Some(finalizer) = &node.finalizer else {
            return Err(JsError::internal_error("finally frame without a finally block").into());
        };
        self.co.push(ctx, Op::FinallyResume(pending));
        self.enter_block(ctx, &finalizer.body);
        Ok(Flow::Continue)
    }

    /// The finalizer completed normally or with a label jump
    pub(crate) fn finally_resume(&mut self, pending: Pending) -> Step {
        let finalizer = std::mem::take(&mut self.co.completion);
        match pending {
            // An abort is never cancelled by the finalizer
            Pending::Unwind(Unwind::Abort) => Err(Unwind::Abort),
            _ if finalizer.is_abrupt() => {
                self.co.completion = finalizer;
                Ok(Flow::Continue)
            }
            Pending::Completion(completion) => {
                self.co.completion = completion.update_empty(Some(JsValue::Undefined));
                Ok(Flow::Continue)
            }
            Pending::Unwind(signal) => Err(signal),
        }
    }

    pub(crate) fn with_enter(&mut self, ctx: &Rc<Context>, node: Rc<WithStatement>) -> Step {
        let value = self.pop_value()?;
        if value.is_null_or_undefined() {
            return Err(JsError::type_error("Cannot convert undefined or null to object").into());
        }
        let object = self.to_object(&value)?;
        let env = Environment::new_object(object, Some(ctx.lexical_env.cheap_clone()));
        let body_ctx = ctx.with_lexical(env);
        self.co.completion = Completion::empty();
        self.co.push(ctx, Op::FillEmpty);
        self.co.push(&body_ctx, Op::Stmt(node.body.clone()));
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Modules
    // ═══════════════════════════════════════════════════════════════════════

    fn export_statement(&mut self, ctx: &Rc<Context>, kind: &ExportKind) -> Step {
        match kind {
            ExportKind::Declaration(stmt) => return self.eval_statement(ctx, stmt.clone()),
            ExportKind::Named(_) | ExportKind::DefaultDeclaration(Statement::FunctionDeclaration(_)) => {
                self.co.completion = Completion::empty();
            }
            ExportKind::DefaultExpression(expr) => {
                self.co.push(ctx, Op::ExportDefaultBind);
                self.co.push(ctx, named_or_plain(expr, &JsString::from("default")));
            }
            ExportKind::DefaultDeclaration(Statement::ClassDeclaration(class)) if class.id.is_none() => {
                self.co.push(ctx, Op::ClassDeclBind(JsString::from(DEFAULT_EXPORT_BINDING)));
                self.start_class(ctx, class, JsString::from("default"))?;
            }
            ExportKind::DefaultDeclaration(stmt) => return self.eval_statement(ctx, stmt.clone()),
        }
        Ok(Flow::Continue)
    }
}

fn loop_state(node: &Rc<WhileStatement>, labels: Rc<[JsString]>) -> LoopState {
    LoopState {
        node: node.clone(),
        labels,
        value: JsValue::Undefined,
    }
}

/// Enumerable string keys along the prototype chain; a shadowing own key
/// hides the inherited one even when it is not enumerable
fn for_in_keys(object: &ObjectRef) -> Vec<PropertyKey> {
    let mut seen = FxHashSet::default();
    let mut keys = Vec::new();
    let mut current = Some(object.cheap_clone());
    while let Some(obj) = current {
        let o = obj.borrow();
        for key in o.own_keys() {
            if key.is_symbol() || !seen.insert(key.clone()) {
                continue;
            }
            if o.get_own_property(&key).is_some_and(|p| p.enumerable) {
                keys.push(key);
            }
        }
        current = o.prototype.clone();
    }
    keys
}
