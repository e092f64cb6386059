//! Parser for JavaScript source code
//!
//! Uses recursive descent with Pratt parsing for expressions. Early errors
//! that depend on the enclosing function (`return`, `yield`, `await`,
//! jump targets, strictness) are reported here as `SyntaxError`s.

use std::cell::OnceCell;
use std::rc::Rc;

use crate::ast::*;
use crate::error::JsError;
use crate::lexer::{Lexer, LexerCheckpoint, Span, Token, TokenKind};
use crate::value::JsString;

#[derive(Debug, Clone)]
struct LabelEntry {
    name: JsString,
    is_loop: bool,
}

/// Parsing context of the innermost function, swapped on every function boundary
#[derive(Debug, Clone, Default)]
struct FunctionScope {
    in_function: bool,
    generator: bool,
    is_async: bool,
    strict: bool,
    uses_arguments: bool,
    super_call: bool,
    super_property: bool,
    new_target: bool,
    labels: Vec<LabelEntry>,
    /// Index of the first label in a chain `a: b: stmt` still waiting for its statement
    label_chain: Option<usize>,
    loop_depth: u32,
    breakable_depth: u32,
}

/// Saved position for speculative parsing
struct ParserState {
    checkpoint: LexerCheckpoint,
    current: Token,
    previous: Token,
    uses_arguments: bool,
}

#[derive(Debug, Clone, Copy)]
enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Parser for JavaScript source code
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    scope: FunctionScope,
    /// Set while parsing a `for` head, where `in` ends the expression
    no_in: bool,
    source_type: SourceType,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            previous: Token::eof(0, 1, 1),
            scope: FunctionScope::default(),
            no_in: false,
            source_type: SourceType::Script,
        }
    }

    /// Treat the whole source as strict mode code
    pub fn strict(mut self, strict: bool) -> Self {
        self.scope.strict = strict;
        self
    }

    /// Parse a script. Top-level `await` is accepted and suspends the script itself.
    pub fn parse_program(&mut self) -> Result<Program, JsError> {
        self.source_type = SourceType::Script;
        self.parse_top_level()
    }

    /// Parse a module: always strict, `import`/`export` allowed at top level
    pub fn parse_module(&mut self) -> Result<Program, JsError> {
        self.source_type = SourceType::Module;
        self.scope.strict = true;
        self.parse_top_level()
    }

    fn parse_top_level(&mut self) -> Result<Program, JsError> {
        self.scope.is_async = true;
        let mut body = Vec::new();
        self.parse_directive_prologue(&mut body)?;

        while !self.is_at_end() {
            let stmt = match self.current.kind {
                TokenKind::Import if self.source_type == SourceType::Module => {
                    self.parse_import()?
                }
                TokenKind::Export if self.source_type == SourceType::Module => {
                    self.parse_export()?
                }
                _ => self.parse_statement_item()?,
            };
            body.push(stmt);
        }

        check_declarations(&body, false)?;

        Ok(Program {
            body: body.into(),
            source_type: self.source_type,
            strict: self.scope.strict,
            scope: OnceCell::new(),
        })
    }

    /// Leading string-literal statements; `"use strict"` switches the current scope.
    fn parse_directive_prologue(&mut self, body: &mut Vec<Statement>) -> Result<(), JsError> {
        while let TokenKind::String(value) = &self.current.kind {
            // Escaped spellings do not count, hence the raw length check
            let use_strict = value == "use strict"
                && self.current.span.end - self.current.span.start == "'use strict'".len();
            let stmt = self.parse_statement_item()?;
            let is_directive = matches!(
                &stmt,
                Statement::Expression(e) if matches!(
                    &e.expression,
                    Expression::Literal(l) if matches!(l.value, LiteralValue::String(_))
                )
            );
            body.push(stmt);
            if !is_directive {
                break;
            }
            if use_strict {
                self.scope.strict = true;
            }
        }
        Ok(())
    }

    // ============ STATEMENTS ============

    /// Statement or declaration in a statement list
    fn parse_statement_item(&mut self) -> Result<Statement, JsError> {
        let async_function = self.check_keyword("async")
            && self.peek_is(&TokenKind::Function)
            && !self.peek_newline();
        if async_function {
            let start = self.current.span;
            self.advance(); // async
            self.advance(); // function
            let func = self.parse_function(true, true, start)?;
            return Ok(Statement::FunctionDeclaration(func));
        }

        match &self.current.kind {
            TokenKind::Let | TokenKind::Const => {
                let decl = self.parse_variable_declaration(false)?;
                self.expect_semicolon()?;
                Ok(Statement::VariableDeclaration(Rc::new(decl)))
            }
            TokenKind::Class => {
                let class = self.parse_class(true)?;
                Ok(Statement::ClassDeclaration(class))
            }
            TokenKind::Function => {
                let start = self.current.span;
                self.advance();
                let func = self.parse_function(false, true, start)?;
                Ok(Statement::FunctionDeclaration(func))
            }
            _ => self.parse_statement(),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, JsError> {
        let label_chain = self.scope.label_chain.take();

        if self.check_identifier() && self.peek_is(&TokenKind::Colon) {
            return self.parse_labeled_statement(label_chain);
        }

        if matches!(
            self.current.kind,
            TokenKind::For | TokenKind::While | TokenKind::Do
        ) && let Some(first) = label_chain
        {
            for label in self.scope.labels.iter_mut().skip(first) {
                label.is_loop = true;
            }
        }

        match &self.current.kind {
            TokenKind::Var => {
                let decl = self.parse_variable_declaration(false)?;
                self.expect_semicolon()?;
                Ok(Statement::VariableDeclaration(Rc::new(decl)))
            }
            TokenKind::LBrace => Ok(Statement::Block(self.parse_block_statement()?)),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::With => self.parse_with_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Break => self.parse_jump_statement(true),
            TokenKind::Continue => self.parse_jump_statement(false),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Semicolon => {
                let span = self.current.span;
                self.advance();
                Ok(Statement::Empty(span))
            }
            TokenKind::Debugger => {
                let span = self.current.span;
                self.advance();
                self.expect_semicolon()?;
                Ok(Statement::Debugger(span))
            }
            TokenKind::Import | TokenKind::Export => Err(self.error(
                "import and export may only appear at the top level of a module",
            )),
            TokenKind::Let | TokenKind::Const | TokenKind::Class => {
                Err(self.error("Lexical declaration cannot appear in a single-statement context"))
            }
            TokenKind::Function => {
                if self.scope.strict {
                    return Err(self.error(
                        "In strict mode code, functions can only be declared at top level or inside a block",
                    ));
                }
                // Sloppy-mode function in statement position behaves as if braced
                let start = self.current.span;
                let decl = self.parse_statement_item()?;
                let span = self.span_from(start);
                Ok(Statement::Block(Rc::new(BlockStatement {
                    body: Rc::new([decl]),
                    span,
                })))
            }
            _ => {
                let start = self.current.span;
                let expression = self.parse_expression()?;
                self.expect_semicolon()?;
                let span = self.span_from(start);
                Ok(Statement::Expression(Rc::new(ExpressionStatement {
                    expression,
                    span,
                })))
            }
        }
    }

    fn parse_variable_declaration(&mut self, in_for_head: bool) -> Result<VariableDeclaration, JsError> {
        let start = self.current.span;
        let kind = match &self.current.kind {
            TokenKind::Let => VariableKind::Let,
            TokenKind::Const => VariableKind::Const,
            TokenKind::Var => VariableKind::Var,
            _ => return Err(self.unexpected_token("variable declaration")),
        };
        self.advance();

        let mut declarations = vec![self.parse_variable_declarator(kind, in_for_head)?];
        while self.match_token(&TokenKind::Comma) {
            declarations.push(self.parse_variable_declarator(kind, in_for_head)?);
        }

        let span = self.span_from(start);
        Ok(VariableDeclaration {
            kind,
            declarations,
            span,
        })
    }

    fn parse_variable_declarator(
        &mut self,
        kind: VariableKind,
        in_for_head: bool,
    ) -> Result<VariableDeclarator, JsError> {
        let start = self.current.span;
        let id = self.parse_binding_target()?;

        let init = if self.match_token(&TokenKind::Eq) {
            Some(self.parse_assignment_expression()?)
        } else {
            None
        };

        // `for (const x of ...)` and `for (let [a] in ...)` are initialized by the loop
        let head_binding = in_for_head && (self.check_keyword("of") || self.check(&TokenKind::In));
        if init.is_none() && !head_binding {
            if kind == VariableKind::Const {
                return Err(JsError::syntax_error(
                    "Missing initializer in const declaration",
                    start.line,
                    start.column,
                ));
            }
            if !matches!(id, Pattern::Identifier(_)) {
                return Err(JsError::syntax_error(
                    "Missing initializer in destructuring declaration",
                    start.line,
                    start.column,
                ));
            }
        }

        let span = self.span_from(start);
        Ok(VariableDeclarator { id, init, span })
    }

    // ============ PATTERNS ============

    /// Identifier, object pattern or array pattern (no default)
    fn parse_binding_target(&mut self) -> Result<Pattern, JsError> {
        match &self.current.kind {
            TokenKind::LBrace => self.parse_object_pattern(),
            TokenKind::LBracket => self.parse_array_pattern(),
            _ => Ok(Pattern::Identifier(self.parse_binding_identifier()?)),
        }
    }

    /// Binding target with an optional `= default`
    fn parse_binding_element(&mut self) -> Result<Pattern, JsError> {
        let start = self.current.span;
        let target = self.parse_binding_target()?;
        if self.match_token(&TokenKind::Eq) {
            let default = self.parse_assignment_expression()?;
            let span = self.span_from(start);
            return Ok(Pattern::Assignment(Rc::new(AssignmentPattern {
                target,
                default,
                span,
            })));
        }
        Ok(target)
    }

    fn parse_binding_identifier(&mut self) -> Result<Identifier, JsError> {
        let id = self.parse_identifier()?;
        self.validate_binding_identifier(&id)?;
        Ok(id)
    }

    fn validate_binding_identifier(&self, id: &Identifier) -> Result<(), JsError> {
        if self.scope.strict && (id.name == "eval" || id.name == "arguments") {
            return Err(JsError::syntax_error(
                format!("Unexpected eval or arguments in strict mode: '{}'", id.name),
                id.span.line,
                id.span.column,
            ));
        }
        Ok(())
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::LBrace)?;

        let mut properties = Vec::new();
        let mut rest = None;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_token(&TokenKind::DotDotDot) {
                rest = Some(Pattern::Identifier(self.parse_binding_identifier()?));
                break;
            }

            let key_start = self.current.span;
            if self.check_identifier() && !self.peek_is(&TokenKind::Colon) {
                // `{ a }` / `{ a = 1 }`
                let id = self.parse_binding_identifier()?;
                let key = PropertyName::Identifier(id.name.clone());
                let mut value = Pattern::Identifier(id);
                if self.match_token(&TokenKind::Eq) {
                    let default = self.parse_assignment_expression()?;
                    let span = self.span_from(key_start);
                    value = Pattern::Assignment(Rc::new(AssignmentPattern {
                        target: value,
                        default,
                        span,
                    }));
                }
                properties.push(PatternProperty { key, value });
            } else {
                let key = self.parse_property_name()?;
                self.require_token(&TokenKind::Colon)?;
                let value = self.parse_binding_element()?;
                properties.push(PatternProperty { key, value });
            }

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.require_token(&TokenKind::RBrace)?;
        let span = self.span_from(start);
        Ok(Pattern::Object(Rc::new(ObjectPattern {
            properties: properties.into(),
            rest,
            span,
        })))
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::LBracket)?;

        let mut elements = Vec::new();
        let mut rest = None;

        while !self.check(&TokenKind::RBracket) && !self.is_at_end() {
            if self.match_token(&TokenKind::Comma) {
                elements.push(None);
                continue;
            }
            if self.match_token(&TokenKind::DotDotDot) {
                rest = Some(self.parse_binding_target()?);
                break;
            }
            elements.push(Some(self.parse_binding_element()?));
            if !self.check(&TokenKind::RBracket) {
                self.require_token(&TokenKind::Comma)?;
            }
        }

        self.require_token(&TokenKind::RBracket)?;
        let span = self.span_from(start);
        Ok(Pattern::Array(Rc::new(ArrayPattern {
            elements: elements.into(),
            rest,
            span,
        })))
    }

    // ============ FUNCTIONS ============

    /// Parse a function after the `function` keyword (and `async` prefix).
    fn parse_function(
        &mut self,
        is_async: bool,
        is_declaration: bool,
        start: Span,
    ) -> Result<Rc<FunctionNode>, JsError> {
        let is_generator = self.match_token(&TokenKind::Star);

        let id = if self.check_identifier() {
            Some(self.parse_binding_identifier()?)
        } else if is_declaration {
            return Err(self.unexpected_token("function name"));
        } else {
            None
        };

        let scope = FunctionScope {
            in_function: true,
            generator: is_generator,
            is_async,
            strict: self.scope.strict,
            new_target: true,
            ..FunctionScope::default()
        };
        self.parse_function_rest(id, FunctionKind::Normal, scope, start)
    }

    /// Parameters and body with `scope` installed as the function context
    fn parse_function_rest(
        &mut self,
        id: Option<Identifier>,
        kind: FunctionKind,
        scope: FunctionScope,
        start: Span,
    ) -> Result<Rc<FunctionNode>, JsError> {
        let outer = std::mem::replace(&mut self.scope, scope);
        let outer_no_in = std::mem::replace(&mut self.no_in, false);

        let result = self.parse_params_and_body(id, kind, start);

        self.scope = outer;
        self.no_in = outer_no_in;
        result
    }

    fn parse_params_and_body(
        &mut self,
        id: Option<Identifier>,
        kind: FunctionKind,
        start: Span,
    ) -> Result<Rc<FunctionNode>, JsError> {
        let (params, rest) = self.parse_formal_parameters()?;

        match kind {
            FunctionKind::Getter if !params.is_empty() || rest.is_some() => {
                return Err(self.error("Getter must not have any formal parameters"));
            }
            FunctionKind::Setter if params.len() != 1 || rest.is_some() => {
                return Err(self.error("Setter must have exactly one formal parameter"));
            }
            _ => {}
        }

        let was_strict = self.scope.strict;
        self.require_token(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        self.parse_directive_prologue(&mut body)?;
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            body.push(self.parse_statement_item()?);
        }
        self.require_token(&TokenKind::RBrace)?;

        let simple_params = rest.is_none() && params.iter().all(|p| matches!(p, Pattern::Identifier(_)));
        if self.scope.strict && !was_strict && !simple_params {
            return Err(JsError::syntax_error(
                "Illegal 'use strict' directive in function with non-simple parameter list",
                start.line,
                start.column,
            ));
        }
        if let Some(id) = &id {
            self.validate_binding_identifier(id)?;
        }

        check_declarations(&body, false)?;
        let node = FunctionNode {
            id,
            params: params.into(),
            rest,
            body: FunctionBody::Block(body.into()),
            kind,
            is_async: self.scope.is_async,
            is_generator: self.scope.generator,
            strict: self.scope.strict,
            simple_params,
            uses_arguments: self.scope.uses_arguments,
            span: self.span_from(start),
            scope: OnceCell::new(),
        };
        self.check_params(&node)?;
        Ok(Rc::new(node))
    }

    fn parse_formal_parameters(&mut self) -> Result<(Vec<Pattern>, Option<Pattern>), JsError> {
        self.require_token(&TokenKind::LParen)?;
        let mut params = Vec::new();
        let mut rest = None;

        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            if self.match_token(&TokenKind::DotDotDot) {
                rest = Some(self.parse_binding_target()?);
                break;
            }
            params.push(self.parse_binding_element()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.require_token(&TokenKind::RParen)?;
        Ok((params, rest))
    }

    /// Duplicate parameters and parameter/lexical clashes
    fn check_params(&self, func: &FunctionNode) -> Result<(), JsError> {
        let mut names = Vec::new();
        for param in func.params.iter() {
            param.bound_names(&mut names);
        }
        if let Some(rest) = &func.rest {
            rest.bound_names(&mut names);
        }

        let duplicates_allowed = !func.strict
            && func.simple_params
            && matches!(func.kind, FunctionKind::Normal);
        if !duplicates_allowed {
            for (i, name) in names.iter().enumerate() {
                if names.iter().take(i).any(|n| n.name == name.name) {
                    return Err(JsError::syntax_error(
                        "Duplicate parameter name not allowed in this context",
                        name.span.line,
                        name.span.column,
                    ));
                }
            }
        }

        if let FunctionBody::Block(body) = &func.body {
            let mut lexical = Vec::new();
            for stmt in body.iter() {
                lexically_declared_names(stmt, &mut lexical);
            }
            if let Some(clash) = lexical.iter().find(|l| names.iter().any(|n| n.name == l.name)) {
                return Err(already_declared(clash));
            }
        }
        Ok(())
    }

    fn parse_arrow_body(
        &mut self,
        params: Vec<Pattern>,
        rest: Option<Pattern>,
        is_async: bool,
        start: Span,
    ) -> Result<Expression, JsError> {
        let scope = FunctionScope {
            in_function: true,
            generator: false,
            is_async,
            strict: self.scope.strict,
            super_call: self.scope.super_call,
            super_property: self.scope.super_property,
            new_target: self.scope.new_target,
            ..FunctionScope::default()
        };
        let outer = std::mem::replace(&mut self.scope, scope);
        let outer_no_in = self.no_in;

        let result = self.parse_arrow_rest(params, rest, is_async, start);

        let arrow_uses_arguments = self.scope.uses_arguments;
        self.scope = outer;
        self.no_in = outer_no_in;
        // Arrows see the enclosing function's `arguments`
        self.scope.uses_arguments |= arrow_uses_arguments;

        let node = result?;
        self.check_params(&node)?;
        Ok(Expression::Arrow(Rc::new(node)))
    }

    fn parse_arrow_rest(
        &mut self,
        params: Vec<Pattern>,
        rest: Option<Pattern>,
        is_async: bool,
        start: Span,
    ) -> Result<FunctionNode, JsError> {
        let was_strict = self.scope.strict;
        let body = if self.match_token(&TokenKind::LBrace) {
            self.no_in = false;
            let mut body = Vec::new();
            self.parse_directive_prologue(&mut body)?;
            while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
                body.push(self.parse_statement_item()?);
            }
            self.require_token(&TokenKind::RBrace)?;
            check_declarations(&body, false)?;
            FunctionBody::Block(body.into())
        } else {
            FunctionBody::Expression(self.parse_assignment_expression()?)
        };

        let simple_params = rest.is_none() && params.iter().all(|p| matches!(p, Pattern::Identifier(_)));
        if self.scope.strict && !was_strict && !simple_params {
            return Err(JsError::syntax_error(
                "Illegal 'use strict' directive in function with non-simple parameter list",
                start.line,
                start.column,
            ));
        }

        Ok(FunctionNode {
            id: None,
            params: params.into(),
            rest,
            body,
            kind: FunctionKind::Arrow,
            is_async,
            is_generator: false,
            strict: self.scope.strict,
            simple_params,
            uses_arguments: self.scope.uses_arguments,
            span: self.span_from(start),
            scope: OnceCell::new(),
        })
    }

    /// Attempt `x => ...` or `(params) => ...`. Rolls back and returns `None`
    /// when the tokens do not form arrow parameters.
    fn try_parse_arrow(&mut self, start: Span, is_async: bool) -> Result<Option<Expression>, JsError> {
        let saved = self.save_state();

        let params = if self.check_identifier() {
            self.parse_binding_identifier()
                .map(|id| (vec![Pattern::Identifier(id)], None))
        } else {
            self.parse_formal_parameters()
        };

        match params {
            Ok((params, rest)) if self.check(&TokenKind::Arrow) && !self.current.newline_before => {
                self.advance();
                self.parse_arrow_body(params, rest, is_async, start).map(Some)
            }
            _ => {
                self.restore_state(saved);
                Ok(None)
            }
        }
    }

    // ============ CLASSES ============

    fn parse_class(&mut self, is_declaration: bool) -> Result<Rc<ClassNode>, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Class)?;

        // Class bodies are always strict
        let outer_strict = std::mem::replace(&mut self.scope.strict, true);
        let result = self.parse_class_rest(is_declaration, start);
        self.scope.strict = outer_strict;
        result
    }

    fn parse_class_rest(&mut self, is_declaration: bool, start: Span) -> Result<Rc<ClassNode>, JsError> {
        let id = if self.check_identifier() {
            Some(self.parse_binding_identifier()?)
        } else if is_declaration {
            return Err(self.unexpected_token("class name"));
        } else {
            None
        };

        let super_class = if self.match_token(&TokenKind::Extends) {
            Some(self.parse_left_hand_side_expression()?)
        } else {
            None
        };
        let derived = super_class.is_some();

        self.require_token(&TokenKind::LBrace)?;
        let mut constructor = None;
        let mut members = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_token(&TokenKind::Semicolon) {
                continue;
            }
            let member_start = self.current.span;

            let is_static = self.check_keyword("static")
                && !self.peek_is(&TokenKind::LParen)
                && !self.peek_is(&TokenKind::Eq);
            if is_static {
                self.advance();
            }

            let (kind, is_async, is_generator) = self.parse_method_modifiers();
            let key = self.parse_property_name()?;

            if !self.check(&TokenKind::LParen) {
                return Err(self.error("Class fields are not supported"));
            }

            let is_constructor = !is_static
                && matches!(&key, PropertyName::Identifier(n) | PropertyName::String(n) if n == "constructor");

            if is_constructor {
                if kind != MethodKind::Method || is_async || is_generator {
                    return Err(self.error("Class constructor may not be an accessor, generator or async"));
                }
                if constructor.is_some() {
                    return Err(self.error("A class may only have one constructor"));
                }
                let scope = FunctionScope {
                    in_function: true,
                    strict: true,
                    super_call: derived,
                    super_property: true,
                    new_target: true,
                    ..FunctionScope::default()
                };
                let func = self.parse_function_rest(
                    id.clone(),
                    FunctionKind::ClassConstructor,
                    scope,
                    member_start,
                )?;
                constructor = Some(func);
                continue;
            }

            let value = self.parse_method(kind, is_async, is_generator, member_start)?;
            members.push(ClassMember {
                key,
                value,
                kind,
                is_static,
                span: self.span_from(member_start),
            });
        }

        self.require_token(&TokenKind::RBrace)?;
        let span = self.span_from(start);
        Ok(Rc::new(ClassNode {
            id,
            super_class,
            constructor,
            members: members.into(),
            span,
        }))
    }

    /// `get`, `set`, `async`, `*` prefixes of a method definition
    fn parse_method_modifiers(&mut self) -> (MethodKind, bool, bool) {
        let followed_by_name = |p: &mut Self| {
            !(p.peek_is(&TokenKind::LParen)
                || p.peek_is(&TokenKind::Colon)
                || p.peek_is(&TokenKind::Comma)
                || p.peek_is(&TokenKind::RBrace)
                || p.peek_is(&TokenKind::Eq))
        };

        if (self.check_keyword("get") || self.check_keyword("set")) && followed_by_name(self) {
            let kind = if self.check_keyword("get") {
                MethodKind::Get
            } else {
                MethodKind::Set
            };
            self.advance();
            return (kind, false, false);
        }

        let is_async = self.check_keyword("async") && followed_by_name(self) && !self.peek_newline();
        if is_async {
            self.advance();
        }
        let is_generator = self.match_token(&TokenKind::Star);
        (MethodKind::Method, is_async, is_generator)
    }

    /// Method body after its key
    fn parse_method(
        &mut self,
        kind: MethodKind,
        is_async: bool,
        is_generator: bool,
        start: Span,
    ) -> Result<Rc<FunctionNode>, JsError> {
        let function_kind = match kind {
            MethodKind::Method => FunctionKind::Method,
            MethodKind::Get => FunctionKind::Getter,
            MethodKind::Set => FunctionKind::Setter,
        };
        let scope = FunctionScope {
            in_function: true,
            generator: is_generator,
            is_async,
            strict: self.scope.strict,
            super_property: true,
            new_target: true,
            ..FunctionScope::default()
        };
        self.parse_function_rest(None, function_kind, scope, start)
    }

    // ============ CONTROL FLOW ============

    fn parse_block_statement(&mut self) -> Result<Rc<BlockStatement>, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::LBrace)?;

        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            body.push(self.parse_statement_item()?);
        }

        self.require_token(&TokenKind::RBrace)?;
        check_declarations(&body, true)?;
        let span = self.span_from(start);
        Ok(Rc::new(BlockStatement {
            body: body.into(),
            span,
        }))
    }

    fn parse_if_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::If)?;
        self.require_token(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.require_token(&TokenKind::RParen)?;

        let consequent = self.parse_statement()?;
        let alternate = if self.match_token(&TokenKind::Else) {
            Some(self.parse_statement()?)
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(Statement::If(Rc::new(IfStatement {
            test,
            consequent,
            alternate,
            span,
        })))
    }

    /// Loop body with `break`/`continue` enabled
    fn parse_loop_body(&mut self) -> Result<Statement, JsError> {
        self.scope.loop_depth += 1;
        self.scope.breakable_depth += 1;
        let body = self.parse_statement();
        self.scope.loop_depth -= 1;
        self.scope.breakable_depth -= 1;
        body
    }

    fn parse_for_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::For)?;
        if self.check(&TokenKind::Await) {
            return Err(self.error("for await is not supported"));
        }
        self.require_token(&TokenKind::LParen)?;

        let mut init = None;
        if self.check(&TokenKind::Var) || self.check(&TokenKind::Let) || self.check(&TokenKind::Const) {
            self.no_in = true;
            let decl = self.parse_variable_declaration(true);
            self.no_in = false;
            let decl = decl?;

            let is_of = self.check_keyword("of");
            if is_of || self.check(&TokenKind::In) {
                let [declarator] = decl.declarations.as_slice() else {
                    return Err(self.error("Invalid left-hand side in for-in/of loop: must have a single binding"));
                };
                if declarator.init.is_some() {
                    return Err(self.error("for-in/of loop variable declaration may not have an initializer"));
                }
                let left = ForHead::Declaration(decl.kind, declarator.id.clone());
                return self.parse_for_in_of_rest(left, is_of, start);
            }
            init = Some(ForInit::Variable(Rc::new(decl)));
        } else if !self.check(&TokenKind::Semicolon) {
            self.no_in = true;
            let expr = self.parse_expression();
            self.no_in = false;
            let expr = expr?;

            let is_of = self.check_keyword("of");
            if is_of || self.check(&TokenKind::In) {
                let left = ForHead::Target(self.expression_to_pattern(&expr)?);
                return self.parse_for_in_of_rest(left, is_of, start);
            }
            init = Some(ForInit::Expression(expr));
        }

        self.require_token(&TokenKind::Semicolon)?;
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.require_token(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.require_token(&TokenKind::RParen)?;

        let body = self.parse_loop_body()?;
        let span = self.span_from(start);
        Ok(Statement::For(Rc::new(ForStatement {
            init,
            test,
            update,
            body,
            span,
        })))
    }

    fn parse_for_in_of_rest(&mut self, left: ForHead, is_of: bool, start: Span) -> Result<Statement, JsError> {
        self.advance(); // `of` / `in`
        let right = if is_of {
            self.parse_assignment_expression()?
        } else {
            self.parse_expression()?
        };
        self.require_token(&TokenKind::RParen)?;

        let body = self.parse_loop_body()?;
        let span = self.span_from(start);
        let stmt = Rc::new(ForInOfStatement {
            left,
            right,
            body,
            span,
        });
        Ok(if is_of {
            Statement::ForOf(stmt)
        } else {
            Statement::ForIn(stmt)
        })
    }

    fn parse_while_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::While)?;
        self.require_token(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.require_token(&TokenKind::RParen)?;
        let body = self.parse_loop_body()?;
        let span = self.span_from(start);
        Ok(Statement::While(Rc::new(WhileStatement { test, body, span })))
    }

    fn parse_do_while_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Do)?;
        let body = self.parse_loop_body()?;
        self.require_token(&TokenKind::While)?;
        self.require_token(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.require_token(&TokenKind::RParen)?;
        // The semicolon after do-while is always optional
        self.match_token(&TokenKind::Semicolon);
        let span = self.span_from(start);
        Ok(Statement::DoWhile(Rc::new(WhileStatement { test, body, span })))
    }

    fn parse_switch_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Switch)?;
        self.require_token(&TokenKind::LParen)?;
        let discriminant = self.parse_expression()?;
        self.require_token(&TokenKind::RParen)?;
        self.require_token(&TokenKind::LBrace)?;

        self.scope.breakable_depth += 1;
        let cases = self.parse_switch_cases();
        self.scope.breakable_depth -= 1;
        let cases = cases?;

        self.require_token(&TokenKind::RBrace)?;
        let all: Vec<Statement> = cases
            .iter()
            .flat_map(|c| c.consequent.iter().cloned())
            .collect();
        check_declarations(&all, true)?;

        let span = self.span_from(start);
        Ok(Statement::Switch(Rc::new(SwitchStatement {
            discriminant,
            cases: cases.into(),
            span,
        })))
    }

    fn parse_switch_cases(&mut self) -> Result<Vec<SwitchCase>, JsError> {
        let mut cases = Vec::new();
        let mut seen_default = false;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let case_start = self.current.span;
            let test = if self.match_token(&TokenKind::Case) {
                Some(self.parse_expression()?)
            } else {
                self.require_token(&TokenKind::Default)?;
                if seen_default {
                    return Err(JsError::syntax_error(
                        "More than one default clause in switch statement",
                        case_start.line,
                        case_start.column,
                    ));
                }
                seen_default = true;
                None
            };
            self.require_token(&TokenKind::Colon)?;

            let mut consequent = Vec::new();
            while !self.check(&TokenKind::Case)
                && !self.check(&TokenKind::Default)
                && !self.check(&TokenKind::RBrace)
                && !self.is_at_end()
            {
                consequent.push(self.parse_statement_item()?);
            }

            let span = self.span_from(case_start);
            cases.push(SwitchCase {
                test,
                consequent: consequent.into(),
                span,
            });
        }

        Ok(cases)
    }

    fn parse_try_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Try)?;
        let block = self.parse_block_statement()?;

        let handler = if self.check(&TokenKind::Catch) {
            let catch_start = self.current.span;
            self.advance();
            let param = if self.match_token(&TokenKind::LParen) {
                let param = self.parse_binding_target()?;
                self.require_token(&TokenKind::RParen)?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block_statement()?;

            if let Some(param) = &param {
                let mut params = Vec::new();
                param.bound_names(&mut params);
                let mut lexical = Vec::new();
                for stmt in body.body.iter() {
                    lexically_declared_names(stmt, &mut lexical);
                }
                if let Some(clash) = lexical.iter().find(|l| params.iter().any(|p| p.name == l.name)) {
                    return Err(already_declared(clash));
                }
            }

            let span = self.span_from(catch_start);
            Some(CatchClause { param, body, span })
        } else {
            None
        };

        let finalizer = if self.match_token(&TokenKind::Finally) {
            Some(self.parse_block_statement()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("Missing catch or finally after try"));
        }

        let span = self.span_from(start);
        Ok(Statement::Try(Rc::new(TryStatement {
            block,
            handler,
            finalizer,
            span,
        })))
    }

    fn parse_with_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        if self.scope.strict {
            return Err(self.error("Strict mode code may not include a with statement"));
        }
        self.require_token(&TokenKind::With)?;
        self.require_token(&TokenKind::LParen)?;
        let object = self.parse_expression()?;
        self.require_token(&TokenKind::RParen)?;
        let body = self.parse_statement()?;
        let span = self.span_from(start);
        Ok(Statement::With(Rc::new(WithStatement { object, body, span })))
    }

    fn parse_return_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        if !self.scope.in_function {
            return Err(self.error("Illegal return statement"));
        }
        self.require_token(&TokenKind::Return)?;

        let argument = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon()?;

        let span = self.span_from(start);
        Ok(Statement::Return(Rc::new(ReturnStatement { argument, span })))
    }

    /// `break` (is_break) or `continue`, with target validation
    fn parse_jump_statement(&mut self, is_break: bool) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.advance();

        let label = if self.check_identifier() && !self.current.newline_before {
            let label = self.parse_identifier()?;
            let entry = self.scope.labels.iter().rev().find(|l| l.name == label.name);
            match entry {
                None => {
                    return Err(JsError::syntax_error(
                        format!("Undefined label '{}'", label.name),
                        label.span.line,
                        label.span.column,
                    ));
                }
                Some(entry) if !is_break && !entry.is_loop => {
                    return Err(JsError::syntax_error(
                        format!("Illegal continue statement: '{}' does not denote an iteration statement", label.name),
                        label.span.line,
                        label.span.column,
                    ));
                }
                Some(_) => {}
            }
            Some(label)
        } else {
            if is_break && self.scope.breakable_depth == 0 {
                return Err(JsError::syntax_error("Illegal break statement", start.line, start.column));
            }
            if !is_break && self.scope.loop_depth == 0 {
                return Err(JsError::syntax_error(
                    "Illegal continue statement: no surrounding iteration statement",
                    start.line,
                    start.column,
                ));
            }
            None
        };
        self.expect_semicolon()?;

        let span = self.span_from(start);
        let jump = Rc::new(JumpStatement { label, span });
        Ok(if is_break {
            Statement::Break(jump)
        } else {
            Statement::Continue(jump)
        })
    }

    fn parse_throw_statement(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Throw)?;
        if self.current.newline_before {
            return Err(self.error("Illegal newline after throw"));
        }
        let argument = self.parse_expression()?;
        self.expect_semicolon()?;
        let span = self.span_from(start);
        Ok(Statement::Throw(Rc::new(ThrowStatement { argument, span })))
    }

    fn parse_labeled_statement(&mut self, label_chain: Option<usize>) -> Result<Statement, JsError> {
        let start = self.current.span;
        let label = self.parse_identifier()?;
        self.require_token(&TokenKind::Colon)?;

        if self.scope.labels.iter().any(|l| l.name == label.name) {
            return Err(JsError::syntax_error(
                format!("Label '{}' has already been declared", label.name),
                label.span.line,
                label.span.column,
            ));
        }

        let chain_start = label_chain.unwrap_or(self.scope.labels.len());
        self.scope.labels.push(LabelEntry {
            name: label.name.clone(),
            is_loop: false,
        });
        self.scope.label_chain = Some(chain_start);

        let body = if self.check(&TokenKind::Function) && !self.scope.strict {
            self.scope.label_chain = None;
            self.parse_statement_item()
        } else {
            self.parse_statement()
        };
        self.scope.labels.pop();
        self.scope.label_chain = None;
        let body = body?;

        let span = self.span_from(start);
        Ok(Statement::Labeled(Rc::new(LabeledStatement { label, body, span })))
    }

    // ============ MODULES ============

    fn parse_import(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Import)?;

        let mut specifiers = Vec::new();

        // `import "m";`
        if let TokenKind::String(source) = &self.current.kind {
            let source = source.clone();
            self.advance();
            self.expect_semicolon()?;
            let span = self.span_from(start);
            return Ok(Statement::Import(Rc::new(ImportDeclaration {
                specifiers,
                source,
                span,
            })));
        }

        if self.check_identifier() {
            let local = self.parse_binding_identifier()?;
            specifiers.push(ImportSpecifier::Default { local });
            if !self.match_token(&TokenKind::Comma) {
                return self.finish_import(specifiers, start);
            }
        }

        if self.check(&TokenKind::Star) {
            return Err(self.error("Namespace imports are not supported"));
        }

        self.require_token(&TokenKind::LBrace)?;
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let imported = self.parse_module_export_name()?;
            let local = if self.check_keyword("as") {
                self.advance();
                self.parse_binding_identifier()?
            } else {
                let span = self.previous.span;
                let id = Identifier {
                    name: imported.clone(),
                    span,
                };
                if !matches!(self.previous.kind, TokenKind::Identifier(_)) {
                    return Err(JsError::syntax_error(
                        format!("Unexpected reserved word '{}' in import", imported),
                        span.line,
                        span.column,
                    ));
                }
                self.validate_binding_identifier(&id)?;
                id
            };
            specifiers.push(ImportSpecifier::Named { imported, local });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.require_token(&TokenKind::RBrace)?;

        self.finish_import(specifiers, start)
    }

    fn finish_import(&mut self, specifiers: Vec<ImportSpecifier>, start: Span) -> Result<Statement, JsError> {
        if !self.check_keyword("from") {
            return Err(self.unexpected_token("'from'"));
        }
        self.advance();
        let source = self.parse_module_specifier()?;
        self.expect_semicolon()?;
        let span = self.span_from(start);
        Ok(Statement::Import(Rc::new(ImportDeclaration {
            specifiers,
            source,
            span,
        })))
    }

    fn parse_module_specifier(&mut self) -> Result<JsString, JsError> {
        match &self.current.kind {
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected_token("module specifier")),
        }
    }

    /// Identifier name or string literal naming an export
    fn parse_module_export_name(&mut self) -> Result<JsString, JsError> {
        if let TokenKind::String(s) = &self.current.kind {
            let s = s.clone();
            self.advance();
            return Ok(s);
        }
        Ok(self.parse_identifier_name()?.name)
    }

    fn parse_export(&mut self) -> Result<Statement, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Export)?;

        let kind = match &self.current.kind {
            TokenKind::Default => {
                self.advance();
                self.parse_export_default()?
            }
            TokenKind::Star => return Err(self.error("Re-exports are not supported")),
            TokenKind::LBrace => {
                self.advance();
                let mut specifiers = Vec::new();
                while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
                    let local = self.parse_identifier_name()?;
                    let exported = if self.check_keyword("as") {
                        self.advance();
                        self.parse_module_export_name()?
                    } else {
                        local.name.clone()
                    };
                    specifiers.push(ExportSpecifier { local, exported });
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.require_token(&TokenKind::RBrace)?;
                if self.check_keyword("from") {
                    return Err(self.error("Re-exports are not supported"));
                }
                self.expect_semicolon()?;
                ExportKind::Named(specifiers)
            }
            TokenKind::Var
            | TokenKind::Let
            | TokenKind::Const
            | TokenKind::Function
            | TokenKind::Class => ExportKind::Declaration(self.parse_statement_item()?),
            TokenKind::Identifier(name) if name == "async" => {
                ExportKind::Declaration(self.parse_statement_item()?)
            }
            _ => return Err(self.unexpected_token("export declaration")),
        };

        let span = self.span_from(start);
        Ok(Statement::Export(Rc::new(ExportDeclaration { kind, span })))
    }

    fn parse_export_default(&mut self) -> Result<ExportKind, JsError> {
        let start = self.current.span;
        let is_async_function = self.check_keyword("async")
            && self.peek_is(&TokenKind::Function)
            && !self.peek_newline();

        if self.check(&TokenKind::Function) || is_async_function {
            if is_async_function {
                self.advance();
            }
            self.advance();
            let func = self.parse_function(is_async_function, false, start)?;
            return Ok(ExportKind::DefaultDeclaration(Statement::FunctionDeclaration(func)));
        }

        if self.check(&TokenKind::Class) {
            let class = self.parse_class(false)?;
            return Ok(ExportKind::DefaultDeclaration(Statement::ClassDeclaration(class)));
        }

        let expr = self.parse_assignment_expression()?;
        self.expect_semicolon()?;
        Ok(ExportKind::DefaultExpression(expr))
    }

    // ============ EXPRESSIONS ============

    fn parse_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        let first = self.parse_assignment_expression()?;

        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }

        let mut expressions = vec![first];
        while self.match_token(&TokenKind::Comma) {
            expressions.push(self.parse_assignment_expression()?);
        }
        let span = self.span_from(start);
        Ok(Expression::Sequence(Rc::new(SequenceExpression {
            expressions: expressions.into(),
            span,
        })))
    }

    fn parse_assignment_expression(&mut self) -> Result<Expression, JsError> {
        if self.check(&TokenKind::Yield) {
            return self.parse_yield_expression();
        }

        let start = self.current.span;
        let expr = self.parse_conditional_expression()?;

        // An arrow function is a complete assignment expression
        if matches!(expr, Expression::Arrow(_)) {
            return Ok(expr);
        }

        if let Some(operator) = self.current_assignment_op() {
            let left = if operator == AssignmentOp::Assign {
                self.expression_to_pattern(&expr)?
            } else {
                self.expression_to_simple_target(&expr)?
            };
            self.advance();
            let right = self.parse_assignment_expression()?;
            let span = self.span_from(start);
            return Ok(Expression::Assignment(Rc::new(AssignmentExpression {
                operator,
                left,
                right,
                span,
            })));
        }

        Ok(expr)
    }

    fn parse_yield_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        if !self.scope.generator {
            return Err(self.error("Yield expression not allowed outside of a generator function"));
        }
        self.require_token(&TokenKind::Yield)?;

        let delegate = !self.current.newline_before && self.match_token(&TokenKind::Star);

        // `yield` without argument ends at anything that cannot start an expression
        let argument = if delegate
            || !(self.current.newline_before
                || matches!(
                    self.current.kind,
                    TokenKind::Semicolon
                        | TokenKind::RBrace
                        | TokenKind::RParen
                        | TokenKind::RBracket
                        | TokenKind::Comma
                        | TokenKind::Colon
                        | TokenKind::In
                        | TokenKind::Eof
                ))
        {
            Some(self.parse_assignment_expression()?)
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(Expression::Yield(Rc::new(YieldExpression {
            argument,
            delegate,
            span,
        })))
    }

    fn parse_conditional_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        let test = self.parse_binary_expression(0)?;

        if matches!(test, Expression::Arrow(_)) {
            return Ok(test);
        }

        if self.match_token(&TokenKind::Question) {
            let consequent = self.allow_in(|p| p.parse_assignment_expression())?;
            self.require_token(&TokenKind::Colon)?;
            let alternate = self.parse_assignment_expression()?;
            let span = self.span_from(start);
            return Ok(Expression::Conditional(Rc::new(ConditionalExpression {
                test,
                consequent,
                alternate,
                span,
            })));
        }

        Ok(test)
    }

    /// Pratt parser for binary and logical operators
    fn parse_binary_expression(&mut self, min_prec: u8) -> Result<Expression, JsError> {
        let start = self.current.span;
        let mut left = self.parse_unary_expression()?;

        while let Some((op, prec)) = self.current_binary_op() {
            if prec < min_prec {
                break;
            }
            if matches!(op, Operator::Binary(BinaryOp::Exp))
                && matches!(left, Expression::Unary(_) | Expression::Await(_))
            {
                return Err(self.error(
                    "Unary operator used immediately before exponentiation expression",
                ));
            }
            self.advance();

            // `**` is right associative
            let next_prec = if matches!(op, Operator::Binary(BinaryOp::Exp)) {
                prec
            } else {
                prec + 1
            };
            let right = self.parse_binary_expression(next_prec)?;

            let span = self.span_from(start);
            left = match op {
                Operator::Logical(operator) => Expression::Logical(Rc::new(LogicalExpression {
                    operator,
                    left,
                    right,
                    span,
                })),
                Operator::Binary(operator) => Expression::Binary(Rc::new(BinaryExpression {
                    operator,
                    left,
                    right,
                    span,
                })),
            };
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;

        if let Some(operator) = self.current_unary_op() {
            self.advance();
            let argument = self.parse_unary_expression()?;

            if operator == UnaryOp::Delete
                && self.scope.strict
                && let Expression::Identifier(id) = argument.unparenthesized()
            {
                return Err(JsError::syntax_error(
                    format!("Delete of an unqualified identifier '{}' in strict mode", id.name),
                    id.span.line,
                    id.span.column,
                ));
            }

            let span = self.span_from(start);
            return Ok(Expression::Unary(Rc::new(UnaryExpression {
                operator,
                argument,
                span,
            })));
        }

        if let Some(operator) = self.current_update_op() {
            self.advance();
            let target = self.parse_unary_expression()?;
            let argument = self.check_update_target(target)?;
            let span = self.span_from(start);
            return Ok(Expression::Update(Rc::new(UpdateExpression {
                operator,
                argument,
                prefix: true,
                span,
            })));
        }

        if self.check(&TokenKind::Await) {
            if !self.scope.is_async {
                return Err(self.error("await is only valid in async functions and the top level of scripts and modules"));
            }
            self.advance();
            let argument = self.parse_unary_expression()?;
            let span = self.span_from(start);
            return Ok(Expression::Await(Rc::new(AwaitExpression { argument, span })));
        }

        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        let expr = self.parse_left_hand_side_expression()?;

        if !self.current.newline_before
            && let Some(operator) = self.current_update_op()
        {
            let argument = self.check_update_target(expr)?;
            self.advance();
            let span = self.span_from(start);
            return Ok(Expression::Update(Rc::new(UpdateExpression {
                operator,
                argument,
                prefix: false,
                span,
            })));
        }

        Ok(expr)
    }

    fn check_update_target(&self, expr: Expression) -> Result<Expression, JsError> {
        match expr.unparenthesized() {
            Expression::Identifier(_) | Expression::Member(_) | Expression::SuperMember(_) => Ok(expr),
            _ => {
                let span = expr.span();
                Err(JsError::syntax_error(
                    "Invalid left-hand side expression in update operation",
                    span.line,
                    span.column,
                ))
            }
        }
    }

    /// Member accesses, calls and `new`, wrapped in an optional chain when `?.` appears
    fn parse_left_hand_side_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;

        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else if self.check(&TokenKind::Super) {
            self.parse_super()?
        } else {
            self.parse_primary_expression()?
        };

        let mut optional_chain = false;
        loop {
            match &self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let property = MemberProperty::Identifier(self.parse_identifier_name()?.name);
                    expr = self.member(expr, property, false, start);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.allow_in(|p| p.parse_expression())?;
                    self.require_token(&TokenKind::RBracket)?;
                    expr = self.member(expr, MemberProperty::Computed(property), false, start);
                }
                TokenKind::LParen => {
                    let arguments = self.parse_arguments()?;
                    let span = self.span_from(start);
                    expr = Expression::Call(Rc::new(CallExpression {
                        callee: expr,
                        arguments,
                        optional: false,
                        span,
                    }));
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    optional_chain = true;
                    match &self.current.kind {
                        TokenKind::LParen => {
                            let arguments = self.parse_arguments()?;
                            let span = self.span_from(start);
                            expr = Expression::Call(Rc::new(CallExpression {
                                callee: expr,
                                arguments,
                                optional: true,
                                span,
                            }));
                        }
                        TokenKind::LBracket => {
                            self.advance();
                            let property = self.allow_in(|p| p.parse_expression())?;
                            self.require_token(&TokenKind::RBracket)?;
                            expr = self.member(expr, MemberProperty::Computed(property), true, start);
                        }
                        _ => {
                            let property =
                                MemberProperty::Identifier(self.parse_identifier_name()?.name);
                            expr = self.member(expr, property, true, start);
                        }
                    }
                }
                TokenKind::TemplateNoSub(_) | TokenKind::TemplateHead(_) => {
                    return Err(self.error("Tagged templates are not supported"));
                }
                _ => break,
            }
        }

        if optional_chain {
            let span = self.span_from(start);
            expr = Expression::OptionalChain(Rc::new(OptionalChain {
                expression: expr,
                span,
            }));
        }

        Ok(expr)
    }

    fn member(&self, object: Expression, property: MemberProperty, optional: bool, start: Span) -> Expression {
        let span = self.span_from(start);
        Expression::Member(Rc::new(MemberExpression {
            object,
            property,
            optional,
            span,
        }))
    }

    fn parse_new_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::New)?;

        if self.match_token(&TokenKind::Dot) {
            let name = self.parse_identifier_name()?;
            if name.name != "target" {
                return Err(JsError::syntax_error(
                    format!("Unexpected new.{}", name.name),
                    name.span.line,
                    name.span.column,
                ));
            }
            if !self.scope.new_target {
                return Err(self.error("new.target expression is not allowed here"));
            }
            return Ok(Expression::NewTarget(self.span_from(start)));
        }

        // Callee: member expression without calls
        let callee_start = self.current.span;
        let mut callee = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else if self.check(&TokenKind::Super) {
            self.parse_super()?
        } else {
            self.parse_primary_expression()?
        };
        loop {
            match &self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let property = MemberProperty::Identifier(self.parse_identifier_name()?.name);
                    callee = self.member(callee, property, false, callee_start);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.allow_in(|p| p.parse_expression())?;
                    self.require_token(&TokenKind::RBracket)?;
                    callee = self.member(callee, MemberProperty::Computed(property), false, callee_start);
                }
                TokenKind::QuestionDot => {
                    return Err(self.error("Invalid optional chain from new expression"));
                }
                _ => break,
            }
        }

        let arguments = if self.check(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Rc::new([])
        };

        let span = self.span_from(start);
        Ok(Expression::New(Rc::new(NewExpression {
            callee,
            arguments,
            span,
        })))
    }

    fn parse_super(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::Super)?;

        match &self.current.kind {
            TokenKind::LParen => {
                if !self.scope.super_call {
                    return Err(JsError::syntax_error("'super' keyword unexpected here", start.line, start.column));
                }
                let arguments = self.parse_arguments()?;
                let span = self.span_from(start);
                Ok(Expression::SuperCall(Rc::new(SuperCall { arguments, span })))
            }
            TokenKind::Dot | TokenKind::LBracket => {
                if !self.scope.super_property {
                    return Err(JsError::syntax_error("'super' keyword unexpected here", start.line, start.column));
                }
                let property = if self.match_token(&TokenKind::Dot) {
                    MemberProperty::Identifier(self.parse_identifier_name()?.name)
                } else {
                    self.advance();
                    let property = self.allow_in(|p| p.parse_expression())?;
                    self.require_token(&TokenKind::RBracket)?;
                    MemberProperty::Computed(property)
                };
                let span = self.span_from(start);
                Ok(Expression::SuperMember(Rc::new(SuperMember { property, span })))
            }
            _ => Err(JsError::syntax_error("'super' keyword unexpected here", start.line, start.column)),
        }
    }

    fn parse_arguments(&mut self) -> Result<Rc<[Argument]>, JsError> {
        self.require_token(&TokenKind::LParen)?;
        self.allow_in(|p| {
            let mut arguments = Vec::new();
            while !p.check(&TokenKind::RParen) && !p.is_at_end() {
                if p.match_token(&TokenKind::DotDotDot) {
                    arguments.push(Argument::Spread(p.parse_assignment_expression()?));
                } else {
                    arguments.push(Argument::Expression(p.parse_assignment_expression()?));
                }
                if !p.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            p.require_token(&TokenKind::RParen)?;
            Ok(arguments.into())
        })
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;

        match &self.current.kind {
            TokenKind::Number(n) => {
                let value = LiteralValue::Number(*n);
                self.advance();
                Ok(self.literal(value, start))
            }
            TokenKind::String(s) => {
                let value = LiteralValue::String(s.clone());
                self.advance();
                Ok(self.literal(value, start))
            }
            TokenKind::True | TokenKind::False => {
                let value = LiteralValue::Boolean(self.check(&TokenKind::True));
                self.advance();
                Ok(self.literal(value, start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.literal(LiteralValue::Null, start))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expression::This(start))
            }
            TokenKind::Identifier(name) => {
                if name == "async" {
                    if let Some(expr) = self.try_parse_async(start)? {
                        return Ok(expr);
                    }
                } else if self.peek_is(&TokenKind::Arrow)
                    && let Some(arrow) = self.try_parse_arrow(start, false)?
                {
                    return Ok(arrow);
                }
                let id = self.parse_identifier()?;
                if id.name == "arguments" {
                    self.scope.uses_arguments = true;
                }
                Ok(Expression::Identifier(id))
            }
            TokenKind::LParen => {
                if let Some(arrow) = self.try_parse_arrow(start, false)? {
                    return Ok(arrow);
                }
                self.advance();
                let expr = self.allow_in(|p| p.parse_expression())?;
                self.require_token(&TokenKind::RParen)?;
                let span = self.span_from(start);
                Ok(Expression::Parenthesized(Rc::new(expr), span))
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Function => {
                self.advance();
                let func = self.parse_function(false, false, start)?;
                Ok(Expression::Function(func))
            }
            TokenKind::Class => Ok(Expression::Class(self.parse_class(false)?)),
            TokenKind::TemplateNoSub(s) => {
                let quasis = vec![s.clone()];
                self.advance();
                let span = self.span_from(start);
                Ok(Expression::Template(Rc::new(TemplateLiteral {
                    quasis,
                    expressions: Rc::new([]),
                    span,
                })))
            }
            TokenKind::TemplateHead(s) => {
                let first = s.clone();
                self.advance();
                self.parse_template_literal(first, start)
            }
            TokenKind::Slash | TokenKind::SlashEq => {
                Err(self.error("Regular expression literals are not supported"))
            }
            _ => Err(self.unexpected_token("expression")),
        }
    }

    /// `async function`, `async x => ...`, `async (...) => ...`; `None` for a plain `async` identifier
    fn try_parse_async(&mut self, start: Span) -> Result<Option<Expression>, JsError> {
        let saved = self.save_state();
        self.advance(); // async

        if !self.current.newline_before {
            if self.match_token(&TokenKind::Function) {
                let func = self.parse_function(true, false, start)?;
                return Ok(Some(Expression::Function(func)));
            }
            if (self.check_identifier() || self.check(&TokenKind::LParen))
                && let Some(arrow) = self.try_parse_arrow(start, true)?
            {
                return Ok(Some(arrow));
            }
        }

        self.restore_state(saved);
        Ok(None)
    }

    fn literal(&self, value: LiteralValue, start: Span) -> Expression {
        Expression::Literal(Rc::new(Literal {
            value,
            span: self.span_from(start),
        }))
    }

    fn parse_array_literal(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::LBracket)?;

        let elements = self.allow_in(|p| {
            let mut elements = Vec::new();
            while !p.check(&TokenKind::RBracket) && !p.is_at_end() {
                if p.match_token(&TokenKind::Comma) {
                    elements.push(None);
                    continue;
                }
                let element = if p.match_token(&TokenKind::DotDotDot) {
                    Argument::Spread(p.parse_assignment_expression()?)
                } else {
                    Argument::Expression(p.parse_assignment_expression()?)
                };
                elements.push(Some(element));
                if !p.check(&TokenKind::RBracket) {
                    p.require_token(&TokenKind::Comma)?;
                }
            }
            p.require_token(&TokenKind::RBracket)?;
            Ok(elements)
        })?;
        let span = self.span_from(start);
        Ok(Expression::Array(Rc::new(ArrayExpression {
            elements: elements.into(),
            span,
        })))
    }

    fn parse_object_literal(&mut self) -> Result<Expression, JsError> {
        let start = self.current.span;
        self.require_token(&TokenKind::LBrace)?;

        let properties = self.allow_in(|p| {
            let mut properties = Vec::new();
            while !p.check(&TokenKind::RBrace) && !p.is_at_end() {
                properties.push(p.parse_object_property()?);
                if !p.check(&TokenKind::RBrace) {
                    p.require_token(&TokenKind::Comma)?;
                }
            }
            p.require_token(&TokenKind::RBrace)?;
            Ok(properties)
        })?;
        let span = self.span_from(start);
        Ok(Expression::Object(Rc::new(ObjectExpression {
            properties: properties.into(),
            span,
        })))
    }

    fn parse_object_property(&mut self) -> Result<ObjectProperty, JsError> {
        let start = self.current.span;

        if self.match_token(&TokenKind::DotDotDot) {
            return Ok(ObjectProperty::Spread(self.parse_assignment_expression()?));
        }

        let (kind, is_async, is_generator) = self.parse_method_modifiers();
        let key_token = self.current.kind.clone();
        let key = self.parse_property_name()?;

        if kind != MethodKind::Method || is_async || is_generator || self.check(&TokenKind::LParen) {
            let value = self.parse_method(kind, is_async, is_generator, start)?;
            return Ok(match kind {
                MethodKind::Get => ObjectProperty::Getter { key, value },
                MethodKind::Set => ObjectProperty::Setter { key, value },
                MethodKind::Method => ObjectProperty::Init {
                    key,
                    value: Expression::Function(value),
                },
            });
        }

        if self.match_token(&TokenKind::Colon) {
            let value = self.parse_assignment_expression()?;
            return Ok(ObjectProperty::Init { key, value });
        }

        // Shorthand `{ a }`; `{ a = 1 }` is only meaningful once converted to a pattern
        let TokenKind::Identifier(name) = key_token else {
            return Err(self.unexpected_token("':'"));
        };
        let id = Identifier {
            name,
            span: self.span_from(start),
        };
        if id.name == "arguments" {
            self.scope.uses_arguments = true;
        }
        let mut value = Expression::Identifier(id.clone());
        if self.match_token(&TokenKind::Eq) {
            let default = self.parse_assignment_expression()?;
            let span = self.span_from(start);
            value = Expression::Assignment(Rc::new(AssignmentExpression {
                operator: AssignmentOp::Assign,
                left: Pattern::Identifier(id),
                right: default,
                span,
            }));
        }
        Ok(ObjectProperty::Init { key, value })
    }

    fn parse_template_literal(&mut self, first: JsString, start: Span) -> Result<Expression, JsError> {
        let mut quasis = vec![first];
        let mut expressions = Vec::new();

        loop {
            expressions.push(self.allow_in(|p| p.parse_expression())?);
            if !self.check(&TokenKind::RBrace) {
                return Err(self.unexpected_token("'}' in template literal"));
            }

            // Resume the template from the closing brace
            let continuation = self.lexer.rescan_template_continuation(self.current.span);
            let (value, done) = match &continuation.kind {
                TokenKind::TemplateTail(s) => (s.clone(), true),
                TokenKind::TemplateMiddle(s) => (s.clone(), false),
                _ => return Err(self.error("Unterminated template literal")),
            };
            quasis.push(value);
            self.current = continuation;
            self.advance();
            if done {
                break;
            }
        }

        let span = self.span_from(start);
        Ok(Expression::Template(Rc::new(TemplateLiteral {
            quasis,
            expressions: expressions.into(),
            span,
        })))
    }

    // ============ NAMES ============

    fn parse_identifier(&mut self) -> Result<Identifier, JsError> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let id = Identifier {
                    name: name.clone(),
                    span: self.current.span,
                };
                self.advance();
                Ok(id)
            }
            _ => Err(self.unexpected_token("identifier")),
        }
    }

    /// Identifier including reserved words (`a.if`, `{ class: 1 }`)
    fn parse_identifier_name(&mut self) -> Result<Identifier, JsError> {
        let name = match &self.current.kind {
            TokenKind::Identifier(name) => name.clone(),
            kind => match keyword_name(kind) {
                Some(name) => JsString::from(name),
                None => return Err(self.unexpected_token("identifier")),
            },
        };
        let id = Identifier {
            name,
            span: self.current.span,
        };
        self.advance();
        Ok(id)
    }

    fn parse_property_name(&mut self) -> Result<PropertyName, JsError> {
        match &self.current.kind {
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(PropertyName::String(s))
            }
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Ok(PropertyName::Number(n))
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.allow_in(|p| p.parse_assignment_expression())?;
                self.require_token(&TokenKind::RBracket)?;
                Ok(PropertyName::Computed(expr))
            }
            _ => Ok(PropertyName::Identifier(self.parse_identifier_name()?.name)),
        }
    }

    // ============ TARGETS ============

    /// Convert a parsed expression into an assignment target (destructuring allowed)
    fn expression_to_pattern(&self, expr: &Expression) -> Result<Pattern, JsError> {
        match expr {
            Expression::Identifier(id) => {
                self.validate_binding_identifier(id)?;
                Ok(Pattern::Identifier(id.clone()))
            }
            Expression::Member(_) | Expression::SuperMember(_) => Ok(Pattern::Expression(expr.clone())),
            Expression::Parenthesized(inner, _)
                if matches!(
                    inner.unparenthesized(),
                    Expression::Identifier(_) | Expression::Member(_) | Expression::SuperMember(_)
                ) =>
            {
                self.expression_to_pattern(inner.unparenthesized())
            }
            Expression::Object(obj) => {
                let mut properties = Vec::new();
                let mut rest = None;
                for (i, prop) in obj.properties.iter().enumerate() {
                    match prop {
                        ObjectProperty::Init { key, value } => properties.push(PatternProperty {
                            key: key.clone(),
                            value: self.expression_to_element(value)?,
                        }),
                        ObjectProperty::Spread(arg) if i + 1 == obj.properties.len() => {
                            rest = Some(self.expression_to_simple_target(arg)?);
                        }
                        _ => return Err(invalid_destructuring(obj.span)),
                    }
                }
                Ok(Pattern::Object(Rc::new(ObjectPattern {
                    properties: properties.into(),
                    rest,
                    span: obj.span,
                })))
            }
            Expression::Array(arr) => {
                let mut elements = Vec::new();
                let mut rest = None;
                for (i, elem) in arr.elements.iter().enumerate() {
                    match elem {
                        None => elements.push(None),
                        Some(Argument::Expression(e)) => elements.push(Some(self.expression_to_element(e)?)),
                        Some(Argument::Spread(e)) if i + 1 == arr.elements.len() => {
                            rest = Some(self.expression_to_pattern(e)?);
                        }
                        Some(Argument::Spread(_)) => return Err(invalid_destructuring(arr.span)),
                    }
                }
                Ok(Pattern::Array(Rc::new(ArrayPattern {
                    elements: elements.into(),
                    rest,
                    span: arr.span,
                })))
            }
            _ => {
                let span = expr.span();
                Err(JsError::syntax_error(
                    "Invalid left-hand side in assignment",
                    span.line,
                    span.column,
                ))
            }
        }
    }

    /// Destructuring element: `a = 1` becomes a target with a default
    fn expression_to_element(&self, expr: &Expression) -> Result<Pattern, JsError> {
        if let Expression::Assignment(assign) = expr
            && assign.operator == AssignmentOp::Assign
        {
            return Ok(Pattern::Assignment(Rc::new(AssignmentPattern {
                target: assign.left.clone(),
                default: assign.right.clone(),
                span: assign.span,
            })));
        }
        self.expression_to_pattern(expr)
    }

    /// Target of compound assignment: identifier or member only
    fn expression_to_simple_target(&self, expr: &Expression) -> Result<Pattern, JsError> {
        match expr.unparenthesized() {
            Expression::Identifier(id) => {
                self.validate_binding_identifier(id)?;
                Ok(Pattern::Identifier(id.clone()))
            }
            inner @ (Expression::Member(_) | Expression::SuperMember(_)) => {
                Ok(Pattern::Expression(inner.clone()))
            }
            _ => {
                let span = expr.span();
                Err(JsError::syntax_error(
                    "Invalid left-hand side in assignment",
                    span.line,
                    span.column,
                ))
            }
        }
    }

    // ============ TOKEN HELPERS ============

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
    }

    fn require_token(&mut self, kind: &TokenKind) -> Result<(), JsError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected_token(&format!("{:?}", kind)))
        }
    }

    fn expect_semicolon(&mut self) -> Result<(), JsError> {
        if self.match_token(&TokenKind::Semicolon) {
            return Ok(());
        }

        // ASI: accept at end of input, before `}`, or after a newline
        if self.is_at_end() || self.check(&TokenKind::RBrace) || self.current.newline_before {
            return Ok(());
        }

        Err(self.unexpected_token("';'"))
    }

    /// Position where a restricted production (`return`) ends its operand
    fn at_statement_end(&self) -> bool {
        self.current.newline_before
            || matches!(
                self.current.kind,
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            )
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn peek(&mut self) -> Token {
        let checkpoint = self.lexer.checkpoint();
        let next = self.lexer.next_token();
        self.lexer.restore(checkpoint);
        next
    }

    /// Check if the next token (after current) is of the given kind
    fn peek_is(&mut self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn peek_newline(&mut self) -> bool {
        self.peek().newline_before
    }

    fn check_identifier(&self) -> bool {
        matches!(self.current.kind, TokenKind::Identifier(_))
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Identifier(s) if s == keyword)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    fn allow_in<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, JsError>) -> Result<T, JsError> {
        let outer = std::mem::replace(&mut self.no_in, false);
        let result = f(self);
        self.no_in = outer;
        result
    }

    fn save_state(&self) -> ParserState {
        ParserState {
            checkpoint: self.lexer.checkpoint(),
            current: self.current.clone(),
            previous: self.previous.clone(),
            uses_arguments: self.scope.uses_arguments,
        }
    }

    fn restore_state(&mut self, state: ParserState) {
        self.lexer.restore(state.checkpoint);
        self.current = state.current;
        self.previous = state.previous;
        self.scope.uses_arguments = state.uses_arguments;
    }

    fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.previous.span.end, start.line, start.column)
    }

    fn error(&self, message: &str) -> JsError {
        JsError::syntax_error(message, self.current.span.line, self.current.span.column)
    }

    fn unexpected_token(&self, expected: &str) -> JsError {
        let found = match &self.current.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Invalid(c) => format!("invalid or unexpected token '{}'", c),
            kind => format!("{:?}", kind),
        };
        JsError::syntax_error(
            format!("Unexpected {}, expected {}", found, expected),
            self.current.span.line,
            self.current.span.column,
        )
    }

    fn current_binary_op(&self) -> Option<(Operator, u8)> {
        use Operator::{Binary, Logical};
        Some(match &self.current.kind {
            TokenKind::QuestionQuestion => (Logical(LogicalOp::NullishCoalescing), 3),
            TokenKind::PipePipe => (Logical(LogicalOp::Or), 4),
            TokenKind::AmpAmp => (Logical(LogicalOp::And), 5),
            TokenKind::Pipe => (Binary(BinaryOp::BitOr), 6),
            TokenKind::Caret => (Binary(BinaryOp::BitXor), 7),
            TokenKind::Amp => (Binary(BinaryOp::BitAnd), 8),
            TokenKind::EqEq => (Binary(BinaryOp::Eq), 9),
            TokenKind::BangEq => (Binary(BinaryOp::NotEq), 9),
            TokenKind::EqEqEq => (Binary(BinaryOp::StrictEq), 9),
            TokenKind::BangEqEq => (Binary(BinaryOp::StrictNotEq), 9),
            TokenKind::Lt => (Binary(BinaryOp::Lt), 10),
            TokenKind::LtEq => (Binary(BinaryOp::LtEq), 10),
            TokenKind::Gt => (Binary(BinaryOp::Gt), 10),
            TokenKind::GtEq => (Binary(BinaryOp::GtEq), 10),
            TokenKind::In if !self.no_in => (Binary(BinaryOp::In), 10),
            TokenKind::Instanceof => (Binary(BinaryOp::Instanceof), 10),
            TokenKind::LtLt => (Binary(BinaryOp::LShift), 11),
            TokenKind::GtGt => (Binary(BinaryOp::RShift), 11),
            TokenKind::GtGtGt => (Binary(BinaryOp::URShift), 11),
            TokenKind::Plus => (Binary(BinaryOp::Add), 12),
            TokenKind::Minus => (Binary(BinaryOp::Sub), 12),
            TokenKind::Star => (Binary(BinaryOp::Mul), 13),
            TokenKind::Slash => (Binary(BinaryOp::Div), 13),
            TokenKind::Percent => (Binary(BinaryOp::Mod), 13),
            TokenKind::StarStar => (Binary(BinaryOp::Exp), 14),
            _ => return None,
        })
    }

    fn current_unary_op(&self) -> Option<UnaryOp> {
        match &self.current.kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        }
    }

    fn current_update_op(&self) -> Option<UpdateOp> {
        match &self.current.kind {
            TokenKind::PlusPlus => Some(UpdateOp::Increment),
            TokenKind::MinusMinus => Some(UpdateOp::Decrement),
            _ => None,
        }
    }

    fn current_assignment_op(&self) -> Option<AssignmentOp> {
        match &self.current.kind {
            TokenKind::Eq => Some(AssignmentOp::Assign),
            TokenKind::PlusEq => Some(AssignmentOp::AddAssign),
            TokenKind::MinusEq => Some(AssignmentOp::SubAssign),
            TokenKind::StarEq => Some(AssignmentOp::MulAssign),
            TokenKind::SlashEq => Some(AssignmentOp::DivAssign),
            TokenKind::PercentEq => Some(AssignmentOp::ModAssign),
            TokenKind::StarStarEq => Some(AssignmentOp::ExpAssign),
            TokenKind::AmpEq => Some(AssignmentOp::BitAndAssign),
            TokenKind::PipeEq => Some(AssignmentOp::BitOrAssign),
            TokenKind::CaretEq => Some(AssignmentOp::BitXorAssign),
            TokenKind::LtLtEq => Some(AssignmentOp::LShiftAssign),
            TokenKind::GtGtEq => Some(AssignmentOp::RShiftAssign),
            TokenKind::GtGtGtEq => Some(AssignmentOp::URShiftAssign),
            TokenKind::AmpAmpEq => Some(AssignmentOp::AndAssign),
            TokenKind::PipePipeEq => Some(AssignmentOp::OrAssign),
            TokenKind::QuestionQuestionEq => Some(AssignmentOp::NullishAssign),
            _ => None,
        }
    }
}

/// Spelling of a keyword token usable as a property name
fn keyword_name(kind: &TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::Null => "null",
        TokenKind::Let => "let",
        TokenKind::Const => "const",
        TokenKind::Var => "var",
        TokenKind::Function => "function",
        TokenKind::Return => "return",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::For => "for",
        TokenKind::While => "while",
        TokenKind::Do => "do",
        TokenKind::Break => "break",
        TokenKind::Continue => "continue",
        TokenKind::Switch => "switch",
        TokenKind::Case => "case",
        TokenKind::Default => "default",
        TokenKind::Try => "try",
        TokenKind::Catch => "catch",
        TokenKind::Finally => "finally",
        TokenKind::Throw => "throw",
        TokenKind::New => "new",
        TokenKind::This => "this",
        TokenKind::Super => "super",
        TokenKind::Class => "class",
        TokenKind::Extends => "extends",
        TokenKind::Import => "import",
        TokenKind::Export => "export",
        TokenKind::Typeof => "typeof",
        TokenKind::Instanceof => "instanceof",
        TokenKind::In => "in",
        TokenKind::Void => "void",
        TokenKind::Delete => "delete",
        TokenKind::Yield => "yield",
        TokenKind::Await => "await",
        TokenKind::With => "with",
        TokenKind::Debugger => "debugger",
        _ => return None,
    })
}

/// Names bound by `let`/`const`/`class` (and block-level functions) of one statement
fn lexically_declared_names(stmt: &Statement, out: &mut Vec<Identifier>) {
    match stmt {
        Statement::VariableDeclaration(decl) if decl.kind.is_lexical() => {
            for d in &decl.declarations {
                d.id.bound_names(out);
            }
        }
        Statement::ClassDeclaration(class) => out.extend(class.id.clone()),
        Statement::Export(export) => match &export.kind {
            ExportKind::Declaration(inner) | ExportKind::DefaultDeclaration(inner) => {
                lexically_declared_names(inner, out)
            }
            _ => {}
        },
        _ => {}
    }
}

fn already_declared(id: &Identifier) -> JsError {
    JsError::syntax_error(
        format!("Identifier '{}' has already been declared", id.name),
        id.span.line,
        id.span.column,
    )
}

fn invalid_destructuring(span: Span) -> JsError {
    JsError::syntax_error("Invalid destructuring assignment target", span.line, span.column)
}

/// Redeclaration checks within one statement list.
/// In blocks, function declarations are lexical too.
fn check_declarations(body: &[Statement], is_block: bool) -> Result<(), JsError> {
    let mut lexical = Vec::new();
    let mut functions = Vec::new();
    let mut vars = Vec::new();

    for stmt in body {
        lexically_declared_names(stmt, &mut lexical);
        match stmt {
            Statement::FunctionDeclaration(f) => functions.extend(f.id.clone()),
            Statement::VariableDeclaration(decl) if !decl.kind.is_lexical() => {
                for d in &decl.declarations {
                    d.id.bound_names(&mut vars);
                }
            }
            _ => {}
        }
    }

    for (i, name) in lexical.iter().enumerate() {
        let clash = lexical.iter().take(i).any(|n| n.name == name.name)
            || vars.iter().any(|n| n.name == name.name)
            || functions.iter().any(|n| n.name == name.name);
        if clash {
            return Err(already_declared(name));
        }
    }

    if is_block {
        for name in &vars {
            if functions.iter().any(|f| f.name == name.name) {
                return Err(already_declared(name));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        let mut parser = Parser::new(source);
        match parser.parse_program() {
            Ok(program) => program,
            Err(e) => panic!("parse failed for {:?}: {}", source, e),
        }
    }

    fn parse_err(source: &str) -> String {
        let mut parser = Parser::new(source);
        match parser.parse_program() {
            Ok(_) => panic!("expected a syntax error for {:?}", source),
            Err(e) => e.to_string(),
        }
    }

    fn first_expression(program: &Program) -> &Expression {
        match program.body.first() {
            Some(Statement::Expression(e)) => &e.expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_variable_declaration() {
        let prog = parse("let x = 1, [a, b] = y;");
        assert_eq!(prog.body.len(), 1);
        let Some(Statement::VariableDeclaration(decl)) = prog.body.first() else {
            panic!("expected declaration");
        };
        assert_eq!(decl.kind, VariableKind::Let);
        assert_eq!(decl.declarations.len(), 2);
    }

    #[test]
    fn test_binary_precedence() {
        let prog = parse("1 + 2 * 3;");
        let Expression::Binary(bin) = first_expression(&prog) else {
            panic!("expected binary expression");
        };
        assert_eq!(bin.operator, BinaryOp::Add);
        assert!(matches!(&bin.right, Expression::Binary(r) if r.operator == BinaryOp::Mul));
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let prog = parse("2 ** 3 ** 2;");
        let Expression::Binary(bin) = first_expression(&prog) else {
            panic!("expected binary expression");
        };
        assert!(matches!(&bin.left, Expression::Literal(_)));
        assert!(matches!(&bin.right, Expression::Binary(_)));
    }

    #[test]
    fn test_logical_operators() {
        let prog = parse("a ?? b || c && d;");
        let Expression::Logical(l) = first_expression(&prog) else {
            panic!("expected logical expression");
        };
        assert_eq!(l.operator, LogicalOp::NullishCoalescing);
    }

    #[test]
    fn test_arrow_functions() {
        let prog = parse("const f = (a, {b}, ...c) => a; const g = x => x * 2; const h = async () => {};");
        assert_eq!(prog.body.len(), 3);
        let Some(Statement::VariableDeclaration(decl)) = prog.body.first() else {
            panic!("expected declaration");
        };
        let Some(Expression::Arrow(f)) = decl.declarations.first().and_then(|d| d.init.as_ref()) else {
            panic!("expected arrow");
        };
        assert_eq!(f.params.len(), 2);
        assert!(f.rest.is_some());
        assert!(!f.simple_params);
    }

    #[test]
    fn test_parenthesized_is_not_arrow() {
        let prog = parse("(a, b);");
        assert!(matches!(first_expression(&prog), Expression::Parenthesized(..)));
    }

    #[test]
    fn test_destructuring_assignment() {
        let prog = parse("[a, {b = 1, ...c}] = value;");
        let Expression::Assignment(assign) = first_expression(&prog) else {
            panic!("expected assignment");
        };
        assert!(matches!(assign.left, Pattern::Array(_)));
    }

    #[test]
    fn test_optional_chain_wraps_whole_chain() {
        let prog = parse("a?.b.c();");
        let Expression::OptionalChain(chain) = first_expression(&prog) else {
            panic!("expected optional chain");
        };
        assert!(matches!(chain.expression, Expression::Call(_)));
    }

    #[test]
    fn test_template_literal() {
        let prog = parse("`a${x}b${y + 1}c`;");
        let Expression::Template(t) = first_expression(&prog) else {
            panic!("expected template");
        };
        assert_eq!(t.quasis.len(), 3);
        assert_eq!(t.expressions.len(), 2);
    }

    #[test]
    fn test_for_loops() {
        let prog = parse("for (let i = 0; i < 3; i++) {} for (const x of xs) {} for (k in obj) {}");
        assert!(matches!(prog.body.first(), Some(Statement::For(_))));
        assert!(matches!(prog.body.get(1), Some(Statement::ForOf(_))));
        assert!(matches!(prog.body.get(2), Some(Statement::ForIn(_))));
    }

    #[test]
    fn test_for_in_head_with_in_operator_in_parens() {
        let prog = parse("for (var x = ('a' in o); x; ) { break; }");
        assert!(matches!(prog.body.first(), Some(Statement::For(_))));
    }

    #[test]
    fn test_class_declaration() {
        let prog = parse(
            "class A extends B { constructor() { super(); } get x() { return 1; } static make() { return new A(); } }",
        );
        let Some(Statement::ClassDeclaration(class)) = prog.body.first() else {
            panic!("expected class");
        };
        assert!(class.super_class.is_some());
        assert!(class.constructor.is_some());
        assert_eq!(class.members.len(), 2);
    }

    #[test]
    fn test_generators_and_async() {
        let prog = parse("function* g() { yield 1; yield* other(); } async function f() { await g; }");
        let Some(Statement::FunctionDeclaration(g)) = prog.body.first() else {
            panic!("expected generator");
        };
        assert!(g.is_generator);
        let Some(Statement::FunctionDeclaration(f)) = prog.body.get(1) else {
            panic!("expected async function");
        };
        assert!(f.is_async);
    }

    #[test]
    fn test_use_strict_directive() {
        let prog = parse("'use strict'; var x = 1;");
        assert!(prog.strict);
        let prog = parse("function f() { 'use strict'; return this; }");
        assert!(!prog.strict);
        let Some(Statement::FunctionDeclaration(f)) = prog.body.first() else {
            panic!("expected function");
        };
        assert!(f.strict);
    }

    #[test]
    fn test_uses_arguments_propagates_from_arrows() {
        let prog = parse("function f() { return () => arguments[0]; }");
        let Some(Statement::FunctionDeclaration(f)) = prog.body.first() else {
            panic!("expected function");
        };
        assert!(f.uses_arguments);
    }

    #[test]
    fn test_labels() {
        parse("outer: for (;;) { inner: for (;;) { continue outer; } }");
        parse("block: { break block; }");
    }

    #[test]
    fn test_early_errors() {
        assert!(parse_err("return 1;").contains("Illegal return"));
        assert!(parse_err("break;").contains("Illegal break"));
        assert!(parse_err("while (1) { continue foo; }").contains("Undefined label"));
        assert!(parse_err("l: { continue l; }").contains("Illegal continue"));
        assert!(parse_err("function f() { yield 1; }").contains("Yield"));
        assert!(parse_err("function f() { await 1; }").contains("await"));
        assert!(parse_err("'use strict'; with (o) {}").contains("with"));
        assert!(parse_err("if (x) let y = 1;").contains("single-statement"));
        assert!(parse_err("1 = 2;").contains("Invalid left-hand side"));
        assert!(parse_err("'use strict'; function f(a, a) {}").contains("Duplicate parameter"));
        assert!(parse_err("let a; let a;").contains("already been declared"));
        assert!(parse_err("const c;").contains("Missing initializer"));
    }

    #[test]
    fn test_sloppy_duplicate_params_allowed() {
        parse("function f(a, a) { return a; }");
    }

    #[test]
    fn test_modules() {
        let mut parser = Parser::new(
            "import def, { a as b, c } from 'm'; export const x = 1; export { x as y }; export default 42;",
        );
        let program = match parser.parse_module() {
            Ok(p) => p,
            Err(e) => panic!("module parse failed: {}", e),
        };
        assert!(program.strict);
        assert_eq!(program.body.len(), 4);
        let Some(Statement::Import(import)) = program.body.first() else {
            panic!("expected import");
        };
        assert_eq!(import.specifiers.len(), 3);
        assert_eq!(import.source, "m");
    }

    #[test]
    fn test_import_outside_module_is_error() {
        assert!(parse_err("import x from 'm';").contains("top level of a module"));
    }

    #[test]
    fn test_asi_restricted_return() {
        let prog = parse("function f() { return\n1; }");
        let Some(Statement::FunctionDeclaration(f)) = prog.body.first() else {
            panic!("expected function");
        };
        let FunctionBody::Block(body) = &f.body else {
            panic!("expected block body");
        };
        assert!(matches!(body.first(), Some(Statement::Return(r)) if r.argument.is_none()));
    }
}
