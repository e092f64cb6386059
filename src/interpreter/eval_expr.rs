//! Expression evaluation
//!
//! An expression op leaves exactly one value on the value stack. Reference
//! producing forms (assignment targets, update operands) leave a
//! [`Reference`] on the reference stack instead, which `GetRef`/`PutRef`
//! consume.

use std::rc::Rc;

use crate::ast::{
    Argument, AssignmentExpression, BinaryOp, CallExpression, ConditionalExpression, Expression,
    FunctionKind, LiteralValue, LogicalExpression, LogicalOp, MemberExpression, MemberProperty, NewExpression,
    ObjectExpression, ObjectProperty, Pattern, PropertyName, TemplateLiteral, UnaryOp, UpdateOp,
};
use crate::environment::{EnvRecord, Reference, resolve_binding, this_environment};
use crate::error::JsError;
use crate::object::{Assign, ObjectRef, Property};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe};

use super::Interpreter;
use super::eval_stmt::named_or_plain;
use super::frame::{Context, Flow, IteratorRecord, NameHint, Op, Step};

/// Key of a non-computed property name
pub(crate) fn static_key(name: &PropertyName) -> Option<PropertyKey> {
    match name {
        PropertyName::Identifier(s) | PropertyName::String(s) => Some(PropertyKey::from(s.cheap_clone())),
        PropertyName::Number(n) => Some(PropertyKey::from_number(*n)),
        PropertyName::Computed(_) => None,
    }
}

/// Install one half of an accessor, keeping the other half if present
pub(crate) fn define_accessor(
    obj: &ObjectRef,
    key: PropertyKey,
    getter: Option<ObjectRef>,
    setter: Option<ObjectRef>,
    enumerable: bool,
) {
    let existing = obj.borrow().get_own_property(&key).filter(|p| p.is_accessor());
    let (getter, setter) = match existing {
        Some(prev) => (getter.or(prev.getter), setter.or(prev.setter)),
        None => (getter, setter),
    };
    obj.borrow_mut()
        .define_property(key, Property::accessor(getter, setter, enumerable));
}

/// `with` objects are the receiver of calls through their bindings
fn binding_receiver(reference: &Reference) -> JsValue {
    match reference {
        Reference::Env { env, .. } => match &env.record {
            EnvRecord::Object(object) => JsValue::Object(object.cheap_clone()),
            _ => JsValue::Undefined,
        },
        _ => JsValue::Undefined,
    }
}

fn literal_value(value: &LiteralValue) -> JsValue {
    match value {
        LiteralValue::Null => JsValue::Null,
        LiteralValue::Boolean(b) => JsValue::Boolean(*b),
        LiteralValue::Number(n) => JsValue::Number(*n),
        LiteralValue::String(s) => JsValue::String(s.cheap_clone()),
    }
}

impl Interpreter {
    pub(crate) fn eval_expression(&mut self, ctx: &Rc<Context>, expr: Expression) -> Step {
        match expr {
            Expression::Literal(lit) => self.co.values.push(literal_value(&lit.value)),
            Expression::Identifier(id) => {
                let reference = resolve_binding(&ctx.lexical_env, &id.name, ctx.strict);
                let access = reference.get_binding()?;
                let receiver = binding_receiver(&reference);
                return self.push_access(ctx, access, receiver);
            }
            Expression::This(_) => {
                let this = self.resolve_this(ctx)?;
                self.co.values.push(this);
            }
            Expression::NewTarget(_) => {
                let new_target = this_environment(&ctx.lexical_env)
                    .and_then(|env| env.as_function().and_then(|f| f.new_target.clone()))
                    .map(JsValue::Object)
                    .unwrap_or_default();
                self.co.values.push(new_target);
            }
            Expression::Parenthesized(inner, _) => self.co.push(ctx, Op::Expr((*inner).clone())),
            Expression::Array(node) => {
                let base = self.co.values.len();
                self.co.push(ctx, Op::ArrayFinish { base });
                for element in node.elements.iter().rev() {
                    match element {
                        Some(arg) => self.push_argument(ctx, arg),
                        None => self.co.push(ctx, Op::Push(JsValue::Undefined)),
                    }
                }
            }
            Expression::Object(node) => {
                let obj = self.create_object();
                self.co.values.push(JsValue::Object(obj));
                self.co.push(ctx, Op::ObjectProps { node, index: 0 });
            }
            Expression::Function(node) | Expression::Arrow(node) => {
                let func = self.function_expression(ctx, &node, None);
                self.co.values.push(JsValue::Object(func));
            }
            Expression::Class(node) => {
                let name = node.id.as_ref().map(|id| id.name.cheap_clone()).unwrap_or_default();
                self.start_class(ctx, &node, name)?;
            }
            Expression::Template(node) => {
                self.co.push(ctx, Op::TemplateConcat(node.clone()));
                for e in node.expressions.iter().rev() {
                    self.co.push(ctx, Op::ToStringTop);
                    self.co.push(ctx, Op::Expr(e.clone()));
                }
            }
            Expression::Unary(node) => return self.unary_expression(ctx, node.operator, &node.argument),
            Expression::Update(node) => {
                self.co.push(
                    ctx,
                    Op::UpdateFinish {
                        op: node.operator,
                        prefix: node.prefix,
                    },
                );
                self.co.push(ctx, Op::GetRef);
                self.push_reference(ctx, &node.argument)?;
            }
            Expression::Binary(node) => {
                self.co.push(ctx, Op::Binary(node.operator));
                self.co.push(ctx, Op::Expr(node.right.clone()));
                self.co.push(ctx, Op::Expr(node.left.clone()));
            }
            Expression::Logical(node) => {
                let left = node.left.clone();
                self.co.push(ctx, Op::LogicalRest(node));
                self.co.push(ctx, Op::Expr(left));
            }
            Expression::Conditional(node) => {
                let test = node.test.clone();
                self.co.push(ctx, Op::ConditionalRest(node));
                self.co.push(ctx, Op::Expr(test));
            }
            Expression::Assignment(node) => return self.assignment(ctx, node),
            Expression::Sequence(node) => {
                let mut exprs = node.expressions.iter().rev();
                if let Some(last) = exprs.next() {
                    self.co.push(ctx, Op::Expr(last.clone()));
                }
                for e in exprs {
                    self.co.push(ctx, Op::Pop);
                    self.co.push(ctx, Op::Expr(e.clone()));
                }
            }
            Expression::Member(node) => {
                match &node.property {
                    MemberProperty::Identifier(name) => {
                        self.co.push(ctx, Op::MemberGetStatic(PropertyKey::from(name.cheap_clone())));
                    }
                    MemberProperty::Computed(key) => {
                        self.co.push(ctx, Op::MemberGet);
                        self.co.push(ctx, Op::Expr(key.clone()));
                    }
                }
                if node.optional {
                    self.co.push(ctx, Op::OptionalCheck);
                }
                self.co.push(ctx, Op::Expr(node.object.clone()));
            }
            Expression::SuperMember(node) => {
                self.co.push(ctx, Op::DropRef);
                self.co.push(ctx, Op::GetRef);
                self.co.push(ctx, Op::MakeSuperRef);
                self.push_member_key(ctx, &node.property);
            }
            Expression::OptionalChain(node) => {
                let mark = self.co.mark();
                self.co.push(ctx, Op::OptionalChainEnd(mark));
                self.co.push(ctx, Op::Expr(node.expression.clone()));
            }
            Expression::Call(node) => return self.call_expression(ctx, node),
            Expression::New(node) => {
                let base = self.co.values.len();
                self.co.push(ctx, Op::NewFinish { node: node.clone(), base });
                self.push_arguments(ctx, &node.arguments);
                self.co.push(ctx, Op::Expr(node.callee.clone()));
            }
            Expression::SuperCall(node) => {
                let base = self.co.values.len();
                self.co.push(ctx, Op::SuperCallFinish { node: node.clone(), base });
                self.push_arguments(ctx, &node.arguments);
            }
            Expression::Yield(node) => {
                if node.delegate {
                    self.co.push(ctx, Op::YieldStarBegin);
                    self.co.push(ctx, Op::GetIterator);
                } else {
                    self.co.push(ctx, Op::YieldValue);
                }
                match &node.argument {
                    Some(arg) => self.co.push(ctx, Op::Expr(arg.clone())),
                    None => self.co.push(ctx, Op::Push(JsValue::Undefined)),
                }
            }
            Expression::Await(node) => {
                self.co.push(ctx, Op::AwaitValue);
                self.co.push(ctx, Op::Expr(node.argument.clone()));
            }
        }
        Ok(Flow::Continue)
    }

    /// Anonymous function definition evaluated under a binding or property name
    pub(crate) fn named_expression(&mut self, ctx: &Rc<Context>, expr: Expression, hint: NameHint) -> Step {
        let name = match hint {
            NameHint::Static(name) => name,
            NameHint::FromKey => {
                let key = self.peek_value()?;
                self.to_property_key(&key)?.function_name()
            }
        };
        match expr.unparenthesized() {
            Expression::Function(node) | Expression::Arrow(node) => {
                let func = self.function_expression(ctx, node, Some(name));
                self.co.values.push(JsValue::Object(func));
                Ok(Flow::Continue)
            }
            Expression::Class(node) => {
                self.start_class(ctx, node, name)?;
                Ok(Flow::Continue)
            }
            _ => self.eval_expression(ctx, expr),
        }
    }

    pub(crate) fn resolve_this(&self, ctx: &Context) -> Result<JsValue, JsError> {
        match this_environment(&ctx.lexical_env) {
            Some(env) => env.get_this_binding(),
            None => Ok(JsValue::Undefined),
        }
    }

    /// Object whose prototype `super` refers to
    pub(crate) fn home_object(&self, ctx: &Context) -> Result<ObjectRef, JsError> {
        this_environment(&ctx.lexical_env)
            .and_then(|env| env.as_function().and_then(|f| f.home_object.clone()))
            .ok_or_else(|| JsError::syntax_error("'super' keyword unexpected here", 0, 0))
    }

    fn push_member_key(&mut self, ctx: &Rc<Context>, property: &MemberProperty) {
        match property {
            MemberProperty::Identifier(name) => self.co.push(ctx, Op::Push(JsValue::String(name.cheap_clone()))),
            MemberProperty::Computed(key) => self.co.push(ctx, Op::Expr(key.clone())),
        }
    }

    fn push_argument(&mut self, ctx: &Rc<Context>, arg: &Argument) {
        match arg {
            Argument::Expression(e) => self.co.push(ctx, Op::Expr(e.clone())),
            Argument::Spread(e) => {
                self.co.push(ctx, Op::SpreadBegin);
                self.co.push(ctx, Op::GetIterator);
                self.co.push(ctx, Op::Expr(e.clone()));
            }
        }
    }

    /// Push argument frames so they run left to right
    fn push_arguments(&mut self, ctx: &Rc<Context>, args: &[Argument]) {
        for arg in args.iter().rev() {
            self.push_argument(ctx, arg);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Operators
    // ═══════════════════════════════════════════════════════════════════════

    fn unary_expression(&mut self, ctx: &Rc<Context>, op: UnaryOp, argument: &Expression) -> Step {
        match (op, argument.unparenthesized()) {
            (UnaryOp::Typeof, Expression::Identifier(id)) => {
                self.co.push(ctx, Op::Unary(UnaryOp::Typeof));
                match resolve_binding(&ctx.lexical_env, &id.name, ctx.strict) {
                    Reference::Unresolvable { .. } => self.co.push(ctx, Op::Push(JsValue::Undefined)),
                    _ => self.co.push(ctx, Op::Expr(argument.clone())),
                }
            }
            (UnaryOp::Delete, Expression::Identifier(id)) => {
                let deleted = match resolve_binding(&ctx.lexical_env, &id.name, ctx.strict) {
                    Reference::Env { env, name, .. } => env.delete_binding(&name),
                    _ => true,
                };
                self.co.values.push(JsValue::Boolean(deleted));
            }
            (UnaryOp::Delete, Expression::Member(member)) => {
                self.co.push(ctx, Op::DeleteMember);
                self.push_member_key(ctx, &member.property);
                if member.optional {
                    self.co.push(ctx, Op::OptionalCheck);
                }
                self.co.push(ctx, Op::Expr(member.object.clone()));
            }
            (UnaryOp::Delete, Expression::OptionalChain(chain)) if matches!(chain.expression, Expression::Member(_)) => {
                let Expression::Member(member) = &chain.expression else {
                    return Ok(Flow::Continue);
                };
                let mark = self.co.mark();
                self.co.push(ctx, Op::OptionalChainEnd(mark));
                self.co.push(ctx, Op::DeleteMember);
                self.push_member_key(ctx, &member.property);
                if member.optional {
                    self.co.push(ctx, Op::OptionalCheck);
                }
                self.co.push(ctx, Op::Expr(member.object.clone()));
            }
            (UnaryOp::Delete, Expression::SuperMember(_)) => {
                return Err(JsError::reference_error_with_message("Unsupported reference to 'super'").into());
            }
            _ => {
                self.co.push(ctx, Op::Unary(op));
                self.co.push(ctx, Op::Expr(argument.clone()));
            }
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn unary(&mut self, op: UnaryOp) -> Step {
        let value = self.pop_value()?;
        let result = self.unary_operator(op, value)?;
        self.co.values.push(result);
        Ok(Flow::Continue)
    }

    pub(crate) fn binary(&mut self, op: BinaryOp) -> Step {
        let right = self.pop_value()?;
        let left = self.pop_value()?;
        let result = self.binary_operator(op, left, right)?;
        self.co.values.push(result);
        Ok(Flow::Continue)
    }

    pub(crate) fn logical_rest(&mut self, ctx: &Rc<Context>, node: Rc<LogicalExpression>) -> Step {
        let left = self.peek_value()?;
        let short = match node.operator {
            LogicalOp::And => !left.to_boolean(),
            LogicalOp::Or => left.to_boolean(),
            LogicalOp::NullishCoalescing => !left.is_null_or_undefined(),
        };
        if !short {
            self.pop_value()?;
            self.co.push(ctx, Op::Expr(node.right.clone()));
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn conditional_rest(&mut self, ctx: &Rc<Context>, node: Rc<ConditionalExpression>) -> Step {
        let test = self.pop_value()?;
        let branch = if test.to_boolean() {
            node.consequent.clone()
        } else {
            node.alternate.clone()
        };
        self.co.push(ctx, Op::Expr(branch));
        Ok(Flow::Continue)
    }

    pub(crate) fn template_concat(&mut self, node: &TemplateLiteral) -> Step {
        let count = node.expressions.len();
        let start = self
            .co
            .values
            .len()
            .checked_sub(count)
            .ok_or_else(|| JsError::internal_error("value stack underflow"))?;
        let parts = self.co.values.split_off(start);
        let mut out = String::new();
        let mut quasis = node.quasis.iter();
        if let Some(first) = quasis.next() {
            out.push_str(first.as_str());
        }
        for (part, quasi) in parts.iter().zip(quasis) {
            if let JsValue::String(s) = part {
                out.push_str(s.as_str());
            }
            out.push_str(quasi.as_str());
        }
        self.co.values.push(JsValue::from(out));
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Spread
    // ═══════════════════════════════════════════════════════════════════════

    /// Iterator on stack: append every value it produces to the value stack
    pub(crate) fn spread_begin(&mut self, ctx: &Rc<Context>) -> Step {
        let iterator = self.pop_value()?;
        let rec = Rc::new(self.iterator_record(iterator)?);
        self.co.push(ctx, Op::SpreadNext(rec));
        Ok(Flow::Continue)
    }

    pub(crate) fn spread_next(&mut self, ctx: &Rc<Context>, rec: Rc<IteratorRecord>) -> Step {
        let (next, iterator) = (rec.next.clone(), rec.iterator.clone());
        self.co.push(ctx, Op::SpreadResult(rec));
        self.invoke(ctx, next, iterator, Vec::new())
    }

    pub(crate) fn spread_result(&mut self, ctx: &Rc<Context>, rec: Rc<IteratorRecord>) -> Step {
        let result = self.pop_value()?;
        if !result.is_object() {
            return Err(JsError::type_error(format!("Iterator result {} is not an object", describe(&result))).into());
        }
        if self.get_named(&result, "done")?.to_boolean() {
            return Ok(Flow::Continue);
        }
        let value = self.get_named(&result, "value")?;
        self.co.values.push(value);
        self.co.push(ctx, Op::SpreadNext(rec));
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Object literals
    // ═══════════════════════════════════════════════════════════════════════

    /// Object under construction on top of the stack: define property `index`
    pub(crate) fn object_props(&mut self, ctx: &Rc<Context>, node: Rc<ObjectExpression>, index: usize) -> Step {
        let Some(property) = node.properties.get(index).cloned() else {
            return Ok(Flow::Continue);
        };
        let JsValue::Object(obj) = self.peek_value()? else {
            return Err(JsError::internal_error("object literal target missing").into());
        };
        self.co.push(
            ctx,
            Op::ObjectProps {
                node: node.clone(),
                index: index + 1,
            },
        );
        match &property {
            ObjectProperty::Spread(e) => {
                self.co.push(ctx, Op::ObjectSpread);
                self.co.push(ctx, Op::Expr(e.clone()));
            }
            ObjectProperty::Init { key, value } => match static_key(key) {
                Some(k) => {
                    if let Expression::Function(f) = value
                        && f.kind == FunctionKind::Method
                    {
                        let method = self.instantiate_function(&ctx.lexical_env, f, k.function_name(), Some(obj));
                        self.co.push(ctx, Op::ObjectDefine { key: Some(k), proto_setter: false });
                        self.co.push(ctx, Op::Push(JsValue::Object(method)));
                        return Ok(Flow::Continue);
                    }
                    let proto_setter = k.eq_str("__proto__");
                    let name = k.function_name();
                    self.co.push(ctx, Op::ObjectDefine { key: Some(k), proto_setter });
                    self.co.push(ctx, named_or_plain(value, &name));
                }
                None => {
                    let PropertyName::Computed(key_expr) = key else {
                        return Ok(Flow::Continue);
                    };
                    if matches!(value, Expression::Function(f) if f.kind == FunctionKind::Method) {
                        self.co.push(ctx, Op::ObjectMethod { node, index });
                    } else {
                        self.co.push(ctx, Op::ObjectDefine { key: None, proto_setter: false });
                        if value.unparenthesized().is_anonymous_function_definition() {
                            self.co.push(ctx, Op::NamedExpr(value.clone(), NameHint::FromKey));
                        } else {
                            self.co.push(ctx, Op::Expr(value.clone()));
                        }
                    }
                    self.co.push(ctx, Op::ToPropertyKey);
                    self.co.push(ctx, Op::Expr(key_expr.clone()));
                }
            },
            ObjectProperty::Getter { key, .. } | ObjectProperty::Setter { key, .. } => match static_key(key) {
                Some(k) => self.define_literal_method(ctx, &obj, &property, k)?,
                None => {
                    let PropertyName::Computed(key_expr) = key else {
                        return Ok(Flow::Continue);
                    };
                    self.co.push(ctx, Op::ObjectMethod { node, index });
                    self.co.push(ctx, Op::ToPropertyKey);
                    self.co.push(ctx, Op::Expr(key_expr.clone()));
                }
            },
        }
        Ok(Flow::Continue)
    }

    fn define_literal_method(
        &mut self,
        ctx: &Rc<Context>,
        obj: &ObjectRef,
        property: &ObjectProperty,
        key: PropertyKey,
    ) -> Result<(), JsError> {
        let name = key.function_name();
        match property {
            ObjectProperty::Getter { value, .. } => {
                let getter = self.instantiate_function(&ctx.lexical_env, value, JsString::from("get ") + &name, Some(obj.cheap_clone()));
                define_accessor(obj, key, Some(getter), None, true);
            }
            ObjectProperty::Setter { value, .. } => {
                let setter = self.instantiate_function(&ctx.lexical_env, value, JsString::from("set ") + &name, Some(obj.cheap_clone()));
                define_accessor(obj, key, None, Some(setter), true);
            }
            ObjectProperty::Init {
                value: Expression::Function(f),
                ..
            } => {
                let method = self.instantiate_function(&ctx.lexical_env, f, name, Some(obj.cheap_clone()));
                obj.borrow_mut().define_property(key, Property::data(JsValue::Object(method)));
            }
            _ => return Err(JsError::internal_error("not an object literal method")),
        }
        Ok(())
    }

    /// Pops value (and the key when not static), defines it on the object below
    pub(crate) fn object_define(&mut self, key: Option<PropertyKey>, proto_setter: bool) -> Step {
        let value = self.pop_value()?;
        let key = match key {
            Some(k) => k,
            None => {
                let k = self.pop_value()?;
                self.to_property_key(&k)?
            }
        };
        let JsValue::Object(obj) = self.peek_value()? else {
            return Err(JsError::internal_error("object literal target missing").into());
        };
        if proto_setter {
            match value {
                JsValue::Object(proto) => obj.borrow_mut().prototype = Some(proto),
                JsValue::Null => obj.borrow_mut().prototype = None,
                _ => {}
            }
        } else {
            obj.borrow_mut().define_property(key, Property::data(value));
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn object_method(&mut self, ctx: &Rc<Context>, node: &ObjectExpression, index: usize) -> Step {
        let key = self.pop_value()?;
        let key = self.to_property_key(&key)?;
        let JsValue::Object(obj) = self.peek_value()? else {
            return Err(JsError::internal_error("object literal target missing").into());
        };
        let Some(property) = node.properties.get(index) else {
            return Err(JsError::internal_error("object literal property index out of range").into());
        };
        self.define_literal_method(ctx, &obj, property, key)?;
        Ok(Flow::Continue)
    }

    /// `{ ...source }`: copy own enumerable properties, running getters
    pub(crate) fn object_spread(&mut self) -> Step {
        let source = self.pop_value()?;
        let JsValue::Object(target) = self.peek_value()? else {
            return Err(JsError::internal_error("object literal target missing").into());
        };
        if source.is_null_or_undefined() {
            return Ok(Flow::Continue);
        }
        let from = self.to_object(&source)?;
        let keys: Vec<PropertyKey> = {
            let o = from.borrow();
            o.own_keys()
                .into_iter()
                .filter(|k| o.get_own_property(k).is_some_and(|p| p.enumerable))
                .collect()
        };
        for key in keys {
            let value = self.get_value(&JsValue::Object(from.cheap_clone()), &key)?;
            target.borrow_mut().define_property(key, Property::data(value));
        }
        Ok(Flow::Continue)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Member access and optional chains
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn member_get(&mut self, ctx: &Rc<Context>, key: Option<PropertyKey>) -> Step {
        let key = match key {
            Some(k) => k,
            None => {
                let k = self.pop_value()?;
                self.to_property_key(&k)?
            }
        };
        let base = self.pop_value()?;
        let access = self.property_access(&base, &key)?;
        self.push_access(ctx, access, base)
    }

    /// Nullish value under `?.`: drop the rest of the chain, result is undefined
    pub(crate) fn short_circuit(&mut self) -> Step {
        while let Some(frame) = self.co.frames.pop() {
            if let Op::OptionalChainEnd(mark) = frame.op {
                self.co.truncate(mark);
                self.co.values.push(JsValue::Undefined);
                return Ok(Flow::Continue);
            }
        }
        Err(JsError::internal_error("optional chain without an end").into())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════

    /// Evaluate `this` and the callee into `values[base..base + 2]`, then the
    /// arguments above them
    fn call_expression(&mut self, ctx: &Rc<Context>, node: Rc<CallExpression>) -> Step {
        let base = self.co.values.len();
        self.co.push(ctx, Op::CallFinish { node: node.clone(), base });
        self.push_arguments(ctx, &node.arguments);
        if node.optional {
            self.co.push(ctx, Op::OptionalCheck);
        }
        match node.callee.unparenthesized() {
            Expression::Member(member) => self.push_method_load(ctx, member),
            Expression::SuperMember(member) => {
                self.co.push(ctx, Op::SuperMethodLoad);
                self.push_member_key(ctx, &member.property);
                self.co.push(ctx, Op::Expr(Expression::This(member.span)));
            }
            Expression::Identifier(id) => {
                let reference = resolve_binding(&ctx.lexical_env, &id.name, ctx.strict);
                self.co.values.push(binding_receiver(&reference));
                self.co.push(ctx, Op::Expr(node.callee.clone()));
            }
            _ => {
                self.co.values.push(JsValue::Undefined);
                self.co.push(ctx, Op::Expr(node.callee.clone()));
            }
        }
        Ok(Flow::Continue)
    }

    fn push_method_load(&mut self, ctx: &Rc<Context>, member: &MemberExpression) {
        match &member.property {
            MemberProperty::Identifier(name) => {
                self.co.push(ctx, Op::MethodLoadStatic(PropertyKey::from(name.cheap_clone())));
            }
            MemberProperty::Computed(key) => {
                self.co.push(ctx, Op::MethodLoad);
                self.co.push(ctx, Op::Expr(key.clone()));
            }
        }
        if member.optional {
            self.co.push(ctx, Op::OptionalCheck);
        }
        self.co.push(ctx, Op::Expr(member.object.clone()));
    }

    /// Receiver stays on the stack below the loaded method
    pub(crate) fn method_load(&mut self, ctx: &Rc<Context>, key: Option<PropertyKey>) -> Step {
        let key = match key {
            Some(k) => k,
            None => {
                let k = self.pop_value()?;
                self.to_property_key(&k)?
            }
        };
        let base = self.peek_value()?;
        let access = self.property_access(&base, &key)?;
        self.push_access(ctx, access, base)
    }

    /// `this` then key on the stack: load `super[key]` keeping `this`
    pub(crate) fn super_method_load(&mut self, ctx: &Rc<Context>) -> Step {
        let key = self.pop_value()?;
        let key = self.to_property_key(&key)?;
        let this = self.peek_value()?;
        let home = self.home_object(ctx)?;
        let access = match home.prototype() {
            Some(proto) => proto.get(&key),
            None => {
                return Err(JsError::type_error(format!("Cannot read properties of null (reading '{}')", key)).into());
            }
        };
        self.push_access(ctx, access, this)
    }

    pub(crate) fn call_finish(&mut self, ctx: &Rc<Context>, _node: &CallExpression, base: usize) -> Step {
        let items = self.co.values.split_off(base.min(self.co.values.len()));
        let mut items = items.into_iter();
        let (Some(this), Some(func)) = (items.next(), items.next()) else {
            return Err(JsError::internal_error("call without callee").into());
        };
        self.invoke(ctx, func, this, items.collect())
    }

    pub(crate) fn new_finish(&mut self, ctx: &Rc<Context>, _node: &NewExpression, base: usize) -> Step {
        let items = self.co.values.split_off(base.min(self.co.values.len()));
        let mut items = items.into_iter();
        let Some(func) = items.next() else {
            return Err(JsError::internal_error("new without callee").into());
        };
        let Some(new_target) = func.as_object().cloned() else {
            return Err(JsError::type_error(format!("{} is not a constructor", describe(&func))).into());
        };
        self.construct(ctx, func, items.collect(), new_target)
    }

    /// `super(...args)`: construct the parent with the current `new.target`
    pub(crate) fn super_call_finish(&mut self, ctx: &Rc<Context>, base: usize) -> Step {
        let args = self.co.values.split_off(base.min(self.co.values.len()));
        let env = this_environment(&ctx.lexical_env)
            .filter(|env| env.as_function().is_some_and(|f| f.new_target.is_some()))
            .ok_or_else(|| JsError::syntax_error("'super' keyword unexpected here", 0, 0))?;
        let (parent, new_target) = match env.as_function() {
            Some(record) => (record.function.prototype(), record.new_target.clone()),
            None => (None, None),
        };
        let (Some(parent), Some(new_target)) = (parent, new_target) else {
            return Err(JsError::type_error("Super constructor is not a constructor").into());
        };
        if !parent.callable().is_some_and(|c| c.is_constructor()) {
            return Err(JsError::type_error(format!(
                "Super constructor {} of anonymous class is not a constructor",
                describe(&JsValue::Object(parent))
            ))
            .into());
        }
        self.co.push(ctx, Op::BindThis(env));
        self.construct(ctx, JsValue::Object(parent), args, new_target)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // References and assignment
    // ═══════════════════════════════════════════════════════════════════════

    /// Push frames that leave a reference for `expr` on the reference stack
    pub(crate) fn push_reference(&mut self, ctx: &Rc<Context>, expr: &Expression) -> Result<(), JsError> {
        match expr.unparenthesized() {
            Expression::Identifier(id) => {
                // Nothing runs before the reference is needed, so resolve now
                let reference = resolve_binding(&ctx.lexical_env, &id.name, ctx.strict);
                self.co.refs.push(reference);
            }
            Expression::Member(member) => {
                match &member.property {
                    MemberProperty::Identifier(name) => {
                        self.co.push(ctx, Op::MakeRefStatic(PropertyKey::from(name.cheap_clone())));
                    }
                    MemberProperty::Computed(key) => {
                        self.co.push(ctx, Op::MakeRef);
                        self.co.push(ctx, Op::Expr(key.clone()));
                    }
                }
                self.co.push(ctx, Op::Expr(member.object.clone()));
            }
            Expression::SuperMember(member) => {
                self.co.push(ctx, Op::MakeSuperRef);
                self.push_member_key(ctx, &member.property);
            }
            _ => {
                return Err(JsError::syntax_error("Invalid left-hand side in assignment", 0, 0));
            }
        }
        Ok(())
    }

    fn push_target_reference(&mut self, ctx: &Rc<Context>, target: &Pattern) -> Result<(), JsError> {
        match target {
            Pattern::Identifier(id) => {
                let reference = resolve_binding(&ctx.lexical_env, &id.name, ctx.strict);
                self.co.refs.push(reference);
                Ok(())
            }
            Pattern::Expression(expr) => self.push_reference(ctx, expr),
            _ => Err(JsError::syntax_error("Invalid left-hand side in assignment", 0, 0)),
        }
    }

    fn assignment(&mut self, ctx: &Rc<Context>, node: Rc<AssignmentExpression>) -> Step {
        if let Some(op) = node.operator.binary_op() {
            self.co.push(ctx, Op::CompoundFinish(op));
            self.co.push(ctx, Op::Expr(node.right.clone()));
            self.co.push(ctx, Op::GetRef);
            self.push_target_reference(ctx, &node.left)?;
            return Ok(Flow::Continue);
        }
        if node.operator.logical_op().is_some() {
            let left = node.left.clone();
            self.co.push(ctx, Op::LogicalAssignRest(node));
            self.co.push(ctx, Op::GetRef);
            self.push_target_reference(ctx, &left)?;
            return Ok(Flow::Continue);
        }
        match &node.left {
            Pattern::Object(_) | Pattern::Array(_) => {
                self.co.push(ctx, Op::AssignPattern(node.left.clone()));
                self.co.push(ctx, Op::Expr(node.right.clone()));
            }
            Pattern::Identifier(id) => {
                self.co.push(ctx, Op::PutRef);
                self.co.push(ctx, named_or_plain(&node.right, &id.name));
                self.push_target_reference(ctx, &node.left)?;
            }
            _ => {
                self.co.push(ctx, Op::PutRef);
                self.co.push(ctx, Op::Expr(node.right.clone()));
                self.push_target_reference(ctx, &node.left)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Key and base on the stack: property reference
    pub(crate) fn make_ref(&mut self, ctx: &Rc<Context>, key: Option<PropertyKey>) -> Step {
        let key = match key {
            Some(k) => k,
            None => {
                let k = self.pop_value()?;
                self.to_property_key(&k)?
            }
        };
        let base = self.pop_value()?;
        if base.is_null_or_undefined() {
            return Err(JsError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                describe(&base),
                key
            ))
            .into());
        }
        self.co.refs.push(Reference::Property {
            this: base.clone(),
            base,
            key,
            strict: ctx.strict,
        });
        Ok(Flow::Continue)
    }

    /// Key on the stack: reference into the home object's prototype with
    /// `this` as receiver
    pub(crate) fn make_super_ref(&mut self, ctx: &Rc<Context>) -> Step {
        let key = self.pop_value()?;
        let key = self.to_property_key(&key)?;
        let this = self.resolve_this(ctx)?;
        let home = self.home_object(ctx)?;
        let base = home.prototype().map(JsValue::Object).unwrap_or(JsValue::Null);
        self.co.refs.push(Reference::Property {
            base,
            key,
            this,
            strict: true,
        });
        Ok(Flow::Continue)
    }

    /// Read the top reference, keeping it
    pub(crate) fn get_ref(&mut self, ctx: &Rc<Context>) -> Step {
        let Some(reference) = self.co.refs.last().cloned() else {
            return Err(JsError::internal_error("reference stack underflow").into());
        };
        match &reference {
            Reference::Property { base, key, this, .. } => {
                let access = self.property_access(base, key)?;
                self.push_access(ctx, access, this.clone())
            }
            _ => {
                let access = reference.get_binding()?;
                self.push_access(ctx, access, binding_receiver(&reference))
            }
        }
    }

    /// Store through `reference`; with `push` the stored value is the result
    pub(crate) fn put_reference(&mut self, ctx: &Rc<Context>, reference: Reference, value: JsValue, push: bool) -> Step {
        let (outcome, receiver, strict) = match &reference {
            Reference::Property { base, key, this, strict } => {
                let object = self.to_object(base)?;
                let receiver = match this {
                    JsValue::Object(r) => r.cheap_clone(),
                    _ => object.cheap_clone(),
                };
                let outcome = object.set_with_receiver(key.clone(), value.clone(), &receiver);
                (outcome, this.clone(), *strict)
            }
            Reference::Env { strict, .. } | Reference::Unresolvable { strict, .. } => {
                let outcome = reference.put_binding(value.clone(), &self.realm.global)?;
                (outcome, binding_receiver(&reference), *strict)
            }
        };
        match outcome {
            Assign::Done => {
                if push {
                    self.co.values.push(value);
                }
                Ok(Flow::Continue)
            }
            Assign::Rejected => {
                if strict {
                    let what = match &reference {
                        Reference::Property { key, .. } => key.to_string(),
                        Reference::Env { name, .. } | Reference::Unresolvable { name, .. } => name.to_string(),
                    };
                    return Err(JsError::type_error(format!("Cannot assign to read only property '{}' of object", what)).into());
                }
                if push {
                    self.co.values.push(value);
                }
                Ok(Flow::Continue)
            }
            Assign::Setter(setter) => {
                if push {
                    self.co.push(ctx, Op::Replace(value.clone()));
                } else {
                    self.co.push(ctx, Op::Pop);
                }
                self.invoke(ctx, JsValue::Object(setter), receiver, vec![value])
            }
        }
    }

    pub(crate) fn compound_finish(&mut self, ctx: &Rc<Context>, op: BinaryOp) -> Step {
        let right = self.pop_value()?;
        let left = self.pop_value()?;
        let result = self.binary_operator(op, left, right)?;
        let reference = self.pop_reference()?;
        self.put_reference(ctx, reference, result, true)
    }

    /// Current value on the stack, reference below: short-circuit or assign
    pub(crate) fn logical_assign_rest(&mut self, ctx: &Rc<Context>, node: Rc<AssignmentExpression>) -> Step {
        let current = self.peek_value()?;
        let short = match node.operator.logical_op() {
            Some(LogicalOp::And) => !current.to_boolean(),
            Some(LogicalOp::Or) => current.to_boolean(),
            Some(LogicalOp::NullishCoalescing) => !current.is_null_or_undefined(),
            None => return Err(JsError::internal_error("not a logical assignment").into()),
        };
        if short {
            self.pop_reference()?;
            return Ok(Flow::Continue);
        }
        self.pop_value()?;
        self.co.push(ctx, Op::PutRef);
        match &node.left {
            Pattern::Identifier(id) => self.co.push(ctx, named_or_plain(&node.right, &id.name)),
            _ => self.co.push(ctx, Op::Expr(node.right.clone())),
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn update_finish(&mut self, ctx: &Rc<Context>, op: UpdateOp, prefix: bool) -> Step {
        let old = self.pop_value()?;
        let old = self.to_number(&old)?;
        let new = match op {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        let reference = self.pop_reference()?;
        let result = if prefix { new } else { old };
        self.co.push(ctx, Op::Push(JsValue::Number(result)));
        self.put_reference(ctx, reference, JsValue::Number(new), false)
    }

    /// Key and base on the stack
    pub(crate) fn delete_member(&mut self, ctx: &Rc<Context>) -> Step {
        let key = self.pop_value()?;
        let key = self.to_property_key(&key)?;
        let base = self.pop_value()?;
        let object = self.to_object(&base)?;
        let deleted = object.borrow_mut().delete(&key);
        if !deleted && ctx.strict {
            return Err(JsError::type_error(format!("Cannot delete property '{}' of {}", key, describe(&base))).into());
        }
        self.co.values.push(JsValue::Boolean(deleted));
        Ok(Flow::Continue)
    }
}
