//! Class definitions
//!
//! A class is evaluated in three steps on the frame stack: the heritage
//! expression, then the constructor and prototype, then one member at a
//! time so computed keys can run guest code between definitions.

use std::rc::Rc;

use crate::ast::{ClassNode, MethodKind, PropertyName};
use crate::environment::Environment;
use crate::error::JsError;
use crate::object::{JsObject, ObjectRef, Property};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, describe};

use super::Interpreter;
use super::call::{Closure, ConstructorKind, Intrinsic, ThisMode};
use super::eval_expr::{define_accessor, static_key};
use super::frame::{ClassState, Context, Flow, Op, Step};

impl Interpreter {
    /// Begin a class definition; the class ends up on the value stack
    pub(crate) fn start_class(&mut self, ctx: &Rc<Context>, node: &Rc<ClassNode>, name: JsString) -> Result<(), JsError> {
        let class_env = Environment::new_declarative(Some(ctx.lexical_env.cheap_clone()));
        if let Some(id) = &node.id {
            class_env.create_immutable_binding(id.name.cheap_clone(), true);
        }
        let class_ctx = Rc::new(Context {
            lexical_env: class_env,
            variable_env: ctx.variable_env.cheap_clone(),
            strict: true,
        });

        self.co.push(
            &class_ctx,
            Op::ClassHeritage {
                node: node.clone(),
                name,
            },
        );
        if let Some(super_class) = &node.super_class {
            self.co.push(&class_ctx, Op::Expr(super_class.clone()));
        }
        Ok(())
    }

    /// Heritage evaluated: create the constructor and its prototype object
    pub(crate) fn class_heritage(&mut self, ctx: &Rc<Context>, node: Rc<ClassNode>, name: JsString) -> Step {
        let (proto_parent, ctor_parent, derived) = match &node.super_class {
            None => (
                Some(self.realm.object_prototype.cheap_clone()),
                self.realm.function_prototype.cheap_clone(),
                false,
            ),
            Some(_) => match self.pop_value()? {
                JsValue::Null => (None, self.realm.function_prototype.cheap_clone(), true),
                parent => {
                    let Some(parent_obj) = parent
                        .as_object()
                        .filter(|p| p.callable().is_some_and(|c| c.is_constructor()))
                        .cloned()
                    else {
                        return Err(JsError::type_error(format!(
                            "Class extends value {} is not a constructor or null",
                            describe(&parent)
                        ))
                        .into());
                    };
                    let proto_parent = match self.get_named(&parent, "prototype")? {
                        JsValue::Object(p) => Some(p),
                        JsValue::Null => None,
                        other => {
                            return Err(JsError::type_error(format!(
                                "Class extends value does not have valid prototype property {}",
                                describe(&other)
                            ))
                            .into());
                        }
                    };
                    (proto_parent, parent_obj, true)
                }
            },
        };

        let prototype = ObjectRef::new(JsObject::ordinary(proto_parent));
        let constructor = match &node.constructor {
            Some(ctor) => self.closure_object(Closure {
                node: ctor.clone(),
                env: ctx.lexical_env.cheap_clone(),
                this_mode: ThisMode::Strict,
                home_object: Some(prototype.cheap_clone()),
                constructor_kind: if derived {
                    ConstructorKind::Derived
                } else {
                    ConstructorKind::Base
                },
                name: name.cheap_clone(),
            }),
            None => self.create_intrinsic(
                Intrinsic::DefaultConstructor {
                    derived,
                    name: name.cheap_clone(),
                },
                0,
            ),
        };
        constructor.borrow_mut().prototype = Some(ctor_parent);
        constructor.borrow_mut().define_property(
            PropertyKey::from("prototype"),
            Property::internal(JsValue::Object(prototype.cheap_clone())),
        );
        prototype.define_hidden("constructor", JsValue::Object(constructor.cheap_clone()));

        self.co.push(
            ctx,
            Op::ClassMembers {
                state: Rc::new(ClassState {
                    node,
                    name,
                    constructor,
                    prototype,
                }),
                index: 0,
            },
        );
        Ok(Flow::Continue)
    }

    /// Define members from `index` until one needs a computed key
    pub(crate) fn class_members(&mut self, ctx: &Rc<Context>, state: Rc<ClassState>, mut index: usize) -> Step {
        loop {
            let Some(member) = state.node.members.get(index) else {
                if let Some(id) = &state.node.id {
                    ctx.lexical_env
                        .initialize_binding(&id.name, JsValue::Object(state.constructor.cheap_clone()))?;
                }
                self.co.values.push(JsValue::Object(state.constructor.cheap_clone()));
                return Ok(Flow::Continue);
            };
            if let Some(key) = static_key(&member.key) {
                self.define_class_member(ctx, &state, index, key)?;
                index += 1;
                continue;
            }
            let PropertyName::Computed(expr) = &member.key else {
                return Err(JsError::internal_error("class member key without a value").into());
            };
            let expr = expr.clone();
            self.co.push(
                ctx,
                Op::ClassMembers {
                    state: state.clone(),
                    index: index + 1,
                },
            );
            self.co.push(ctx, Op::ClassMemberDefine { state, index });
            self.co.push(ctx, Op::Expr(expr));
            return Ok(Flow::Continue);
        }
    }

    /// Install the member at `index` under `key`. Class members are never
    /// enumerable.
    pub(crate) fn define_class_member(
        &mut self,
        ctx: &Rc<Context>,
        state: &ClassState,
        index: usize,
        key: PropertyKey,
    ) -> Result<(), JsError> {
        let Some(member) = state.node.members.get(index) else {
            return Err(JsError::internal_error("class member index out of range"));
        };
        let target = if member.is_static {
            state.constructor.cheap_clone()
        } else {
            state.prototype.cheap_clone()
        };
        if member.is_static && key.eq_str("prototype") {
            return Err(JsError::type_error(
                "Classes may not have a static property named 'prototype'",
            ));
        }

        let name = key.function_name();
        let env = &ctx.lexical_env;
        let home = Some(target.cheap_clone());
        match member.kind {
            MethodKind::Method => {
                let method = self.instantiate_function(env, &member.value, name, home);
                target
                    .borrow_mut()
                    .define_property(key, Property::hidden(JsValue::Object(method)));
            }
            MethodKind::Get => {
                let getter = self.instantiate_function(env, &member.value, JsString::from("get ") + &name, home);
                define_accessor(&target, key, Some(getter), None, false);
            }
            MethodKind::Set => {
                let setter = self.instantiate_function(env, &member.value, JsString::from("set ") + &name, home);
                define_accessor(&target, key, None, Some(setter), false);
            }
        }
        Ok(())
    }
}
