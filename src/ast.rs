//! Abstract Syntax Tree types
//!
//! Every child node is reference counted so evaluation frames can keep cheap
//! handles on the code they still have to run.

use std::cell::OnceCell;
use std::rc::Rc;

use crate::lexer::Span;
use crate::value::JsString;

/// A complete program (script or module)
#[derive(Debug)]
pub struct Program {
    pub body: Rc<[Statement]>,
    pub source_type: SourceType,
    pub strict: bool,
    /// Declaration pre-pass result, filled on first evaluation
    pub scope: OnceCell<Rc<crate::interpreter::hoist::ScopeInfo>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Script,
    Module,
}

// ═══════════════════════════════════════════════════════════════════════════
// Statements
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum Statement {
    // Declarations
    VariableDeclaration(Rc<VariableDeclaration>),
    FunctionDeclaration(Rc<FunctionNode>),
    ClassDeclaration(Rc<ClassNode>),

    // Control flow
    Block(Rc<BlockStatement>),
    If(Rc<IfStatement>),
    Switch(Rc<SwitchStatement>),
    For(Rc<ForStatement>),
    ForIn(Rc<ForInOfStatement>),
    ForOf(Rc<ForInOfStatement>),
    While(Rc<WhileStatement>),
    DoWhile(Rc<WhileStatement>),
    Try(Rc<TryStatement>),
    With(Rc<WithStatement>),

    // Jumps
    Return(Rc<ReturnStatement>),
    Break(Rc<JumpStatement>),
    Continue(Rc<JumpStatement>),
    Throw(Rc<ThrowStatement>),

    // Modules
    Import(Rc<ImportDeclaration>),
    Export(Rc<ExportDeclaration>),

    // Other
    Expression(Rc<ExpressionStatement>),
    Labeled(Rc<LabeledStatement>),
    Empty(Span),
    Debugger(Span),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::VariableDeclaration(d) => d.span,
            Statement::FunctionDeclaration(f) => f.span,
            Statement::ClassDeclaration(c) => c.span,
            Statement::Block(b) => b.span,
            Statement::If(s) => s.span,
            Statement::Switch(s) => s.span,
            Statement::For(s) => s.span,
            Statement::ForIn(s) | Statement::ForOf(s) => s.span,
            Statement::While(s) | Statement::DoWhile(s) => s.span,
            Statement::Try(s) => s.span,
            Statement::With(s) => s.span,
            Statement::Return(s) => s.span,
            Statement::Break(s) | Statement::Continue(s) => s.span,
            Statement::Throw(s) => s.span,
            Statement::Import(s) => s.span,
            Statement::Export(s) => s.span,
            Statement::Expression(s) => s.span,
            Statement::Labeled(s) => s.span,
            Statement::Empty(s) | Statement::Debugger(s) => *s,
        }
    }

    /// Loops accept `continue` and share their label set with enclosing labels.
    pub fn is_iteration(&self) -> bool {
        matches!(
            self,
            Statement::For(_)
                | Statement::ForIn(_)
                | Statement::ForOf(_)
                | Statement::While(_)
                | Statement::DoWhile(_)
        )
    }
}

#[derive(Debug)]
pub struct ExpressionStatement {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug)]
pub struct BlockStatement {
    pub body: Rc<[Statement]>,
    pub span: Span,
}

#[derive(Debug)]
pub struct VariableDeclaration {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Let,
    Const,
    Var,
}

impl VariableKind {
    pub fn is_lexical(self) -> bool {
        !matches!(self, VariableKind::Var)
    }
}

#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub id: Pattern,
    pub init: Option<Expression>,
    pub span: Span,
}

#[derive(Debug)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Statement,
    pub alternate: Option<Statement>,
    pub span: Span,
}

#[derive(Debug)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Rc<[SwitchCase]>,
    pub span: Span,
}

#[derive(Debug)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expression>,
    pub consequent: Rc<[Statement]>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug)]
pub enum ForInit {
    Variable(Rc<VariableDeclaration>),
    Expression(Expression),
}

/// Shared by `for-in` and `for-of`
#[derive(Debug)]
pub struct ForInOfStatement {
    pub left: ForHead,
    pub right: Expression,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug)]
pub enum ForHead {
    /// `for (let x of ...)`, `for (var [a, b] in ...)`
    Declaration(VariableKind, Pattern),
    /// `for (x of ...)`, `for (obj.prop in ...)`
    Target(Pattern),
}

#[derive(Debug)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug)]
pub struct TryStatement {
    pub block: Rc<BlockStatement>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Rc<BlockStatement>>,
    pub span: Span,
}

#[derive(Debug)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Rc<BlockStatement>,
    pub span: Span,
}

#[derive(Debug)]
pub struct WithStatement {
    pub object: Expression,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug)]
pub struct ReturnStatement {
    pub argument: Option<Expression>,
    pub span: Span,
}

/// `break` / `continue`
#[derive(Debug)]
pub struct JumpStatement {
    pub label: Option<Identifier>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ThrowStatement {
    pub argument: Expression,
    pub span: Span,
}

#[derive(Debug)]
pub struct LabeledStatement {
    pub label: Identifier,
    pub body: Statement,
    pub span: Span,
}

// Module declarations

#[derive(Debug)]
pub struct ImportDeclaration {
    pub specifiers: Vec<ImportSpecifier>,
    pub source: JsString,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ImportSpecifier {
    /// `import { imported as local }`
    Named { imported: JsString, local: Identifier },
    /// `import local from "m"`
    Default { local: Identifier },
}

impl ImportSpecifier {
    pub fn local(&self) -> &Identifier {
        match self {
            ImportSpecifier::Named { local, .. } | ImportSpecifier::Default { local } => local,
        }
    }
}

#[derive(Debug)]
pub struct ExportDeclaration {
    pub kind: ExportKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum ExportKind {
    /// `export let x = 1;`, `export function f() {}`
    Declaration(Statement),
    /// `export { a, b as c };`
    Named(Vec<ExportSpecifier>),
    /// `export default <expr>;`
    DefaultExpression(Expression),
    /// `export default function f() {}` / `export default class C {}`
    DefaultDeclaration(Statement),
}

#[derive(Debug, Clone)]
pub struct ExportSpecifier {
    pub local: Identifier,
    pub exported: JsString,
}

// ═══════════════════════════════════════════════════════════════════════════
// Functions and classes
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    Getter,
    Setter,
    ClassConstructor,
}

#[derive(Debug)]
pub struct FunctionNode {
    pub id: Option<Identifier>,
    pub params: Rc<[Pattern]>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub kind: FunctionKind,
    pub is_async: bool,
    pub is_generator: bool,
    pub strict: bool,
    /// No defaults, no destructuring, no rest
    pub simple_params: bool,
    /// Body (or a nested arrow) references `arguments`
    pub uses_arguments: bool,
    pub span: Span,
    pub scope: OnceCell<Rc<crate::interpreter::hoist::ScopeInfo>>,
}

impl FunctionNode {
    pub fn is_arrow(&self) -> bool {
        self.kind == FunctionKind::Arrow
    }

    /// `length` of the function object: params before the first default or rest
    pub fn expected_arguments(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| !matches!(p, Pattern::Assignment(_)))
            .count()
    }
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Rc<[Statement]>),
    /// Concise arrow body
    Expression(Expression),
}

#[derive(Debug)]
pub struct ClassNode {
    pub id: Option<Identifier>,
    pub super_class: Option<Expression>,
    pub constructor: Option<Rc<FunctionNode>>,
    pub members: Rc<[ClassMember]>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub key: PropertyName,
    pub value: Rc<FunctionNode>,
    pub kind: MethodKind,
    pub is_static: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Get,
    Set,
}

// ═══════════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum Expression {
    // Literals
    Literal(Rc<Literal>),
    Array(Rc<ArrayExpression>),
    Object(Rc<ObjectExpression>),
    Function(Rc<FunctionNode>),
    Arrow(Rc<FunctionNode>),
    Class(Rc<ClassNode>),
    Template(Rc<TemplateLiteral>),

    // Identifiers
    Identifier(Identifier),
    This(Span),
    /// `new.target`
    NewTarget(Span),

    // Operations
    Unary(Rc<UnaryExpression>),
    Update(Rc<UpdateExpression>),
    Binary(Rc<BinaryExpression>),
    Logical(Rc<LogicalExpression>),
    Conditional(Rc<ConditionalExpression>),
    Assignment(Rc<AssignmentExpression>),
    Sequence(Rc<SequenceExpression>),

    // Access
    Member(Rc<MemberExpression>),
    Call(Rc<CallExpression>),
    New(Rc<NewExpression>),
    /// Delimits the short-circuit extent of `?.` links
    OptionalChain(Rc<OptionalChain>),
    SuperMember(Rc<SuperMember>),
    SuperCall(Rc<SuperCall>),

    // Suspension points
    Yield(Rc<YieldExpression>),
    Await(Rc<AwaitExpression>),

    /// Kept so `(a) = 1` and `(a, b) => ...` can be told apart from their bare forms
    Parenthesized(Rc<Expression>, Span),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(l) => l.span,
            Expression::Array(a) => a.span,
            Expression::Object(o) => o.span,
            Expression::Function(f) | Expression::Arrow(f) => f.span,
            Expression::Class(c) => c.span,
            Expression::Template(t) => t.span,
            Expression::Identifier(i) => i.span,
            Expression::This(s) | Expression::NewTarget(s) => *s,
            Expression::Unary(u) => u.span,
            Expression::Update(u) => u.span,
            Expression::Binary(b) => b.span,
            Expression::Logical(l) => l.span,
            Expression::Conditional(c) => c.span,
            Expression::Assignment(a) => a.span,
            Expression::Sequence(s) => s.span,
            Expression::Member(m) => m.span,
            Expression::Call(c) => c.span,
            Expression::New(n) => n.span,
            Expression::OptionalChain(o) => o.span,
            Expression::SuperMember(s) => s.span,
            Expression::SuperCall(s) => s.span,
            Expression::Yield(y) => y.span,
            Expression::Await(a) => a.span,
            Expression::Parenthesized(_, s) => *s,
        }
    }

    /// Strips redundant parentheses
    pub fn unparenthesized(&self) -> &Expression {
        let mut expr = self;
        while let Expression::Parenthesized(inner, _) = expr {
            expr = inner;
        }
        expr
    }

    /// Anonymous function definitions pick up the name of their binding.
    pub fn is_anonymous_function_definition(&self) -> bool {
        match self {
            Expression::Function(f) => f.id.is_none(),
            Expression::Arrow(_) => true,
            Expression::Class(c) => c.id.is_none(),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Literal {
    pub value: LiteralValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
}

#[derive(Debug, Clone)]
pub struct Identifier {
    pub name: JsString,
    pub span: Span,
}

#[derive(Debug)]
pub struct ArrayExpression {
    /// `None` is a hole
    pub elements: Rc<[Option<Argument>]>,
    pub span: Span,
}

/// Element of an argument list or array literal
#[derive(Debug, Clone)]
pub enum Argument {
    Expression(Expression),
    Spread(Expression),
}

#[derive(Debug)]
pub struct ObjectExpression {
    pub properties: Rc<[ObjectProperty]>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ObjectProperty {
    /// `key: value`, shorthand `key`, method `key() {}`
    Init { key: PropertyName, value: Expression },
    Getter { key: PropertyName, value: Rc<FunctionNode> },
    Setter { key: PropertyName, value: Rc<FunctionNode> },
    Spread(Expression),
}

#[derive(Debug, Clone)]
pub enum PropertyName {
    Identifier(JsString),
    String(JsString),
    Number(f64),
    Computed(Expression),
}

#[derive(Debug)]
pub struct TemplateLiteral {
    pub quasis: Vec<JsString>,
    pub expressions: Rc<[Expression]>,
    pub span: Span,
}

#[derive(Debug)]
pub struct UnaryExpression {
    pub operator: UnaryOp,
    pub argument: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,  // -
    Plus,   // +
    Not,    // !
    BitNot, // ~
    Typeof, // typeof
    Void,   // void
    Delete, // delete
}

#[derive(Debug)]
pub struct UpdateExpression {
    pub operator: UpdateOp,
    pub argument: Expression,
    pub prefix: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment, // ++
    Decrement, // --
}

#[derive(Debug)]
pub struct BinaryExpression {
    pub operator: BinaryOp,
    pub left: Expression,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,         // +
    Sub,         // -
    Mul,         // *
    Div,         // /
    Mod,         // %
    Exp,         // **
    Eq,          // ==
    NotEq,       // !=
    StrictEq,    // ===
    StrictNotEq, // !==
    Lt,          // <
    LtEq,        // <=
    Gt,          // >
    GtEq,        // >=
    BitAnd,      // &
    BitOr,       // |
    BitXor,      // ^
    LShift,      // <<
    RShift,      // >>
    URShift,     // >>>
    In,          // in
    Instanceof,  // instanceof
}

#[derive(Debug)]
pub struct LogicalExpression {
    pub operator: LogicalOp,
    pub left: Expression,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,               // &&
    Or,                // ||
    NullishCoalescing, // ??
}

#[derive(Debug)]
pub struct ConditionalExpression {
    pub test: Expression,
    pub consequent: Expression,
    pub alternate: Expression,
    pub span: Span,
}

#[derive(Debug)]
pub struct AssignmentExpression {
    pub operator: AssignmentOp,
    pub left: Pattern,
    pub right: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,        // =
    AddAssign,     // +=
    SubAssign,     // -=
    MulAssign,     // *=
    DivAssign,     // /=
    ModAssign,     // %=
    ExpAssign,     // **=
    BitAndAssign,  // &=
    BitOrAssign,   // |=
    BitXorAssign,  // ^=
    LShiftAssign,  // <<=
    RShiftAssign,  // >>=
    URShiftAssign, // >>>=
    AndAssign,     // &&=
    OrAssign,      // ||=
    NullishAssign, // ??=
}

impl AssignmentOp {
    /// Arithmetic operator behind a compound assignment
    pub fn binary_op(self) -> Option<BinaryOp> {
        Some(match self {
            AssignmentOp::AddAssign => BinaryOp::Add,
            AssignmentOp::SubAssign => BinaryOp::Sub,
            AssignmentOp::MulAssign => BinaryOp::Mul,
            AssignmentOp::DivAssign => BinaryOp::Div,
            AssignmentOp::ModAssign => BinaryOp::Mod,
            AssignmentOp::ExpAssign => BinaryOp::Exp,
            AssignmentOp::BitAndAssign => BinaryOp::BitAnd,
            AssignmentOp::BitOrAssign => BinaryOp::BitOr,
            AssignmentOp::BitXorAssign => BinaryOp::BitXor,
            AssignmentOp::LShiftAssign => BinaryOp::LShift,
            AssignmentOp::RShiftAssign => BinaryOp::RShift,
            AssignmentOp::URShiftAssign => BinaryOp::URShift,
            AssignmentOp::Assign
            | AssignmentOp::AndAssign
            | AssignmentOp::OrAssign
            | AssignmentOp::NullishAssign => return None,
        })
    }

    pub fn logical_op(self) -> Option<LogicalOp> {
        match self {
            AssignmentOp::AndAssign => Some(LogicalOp::And),
            AssignmentOp::OrAssign => Some(LogicalOp::Or),
            AssignmentOp::NullishAssign => Some(LogicalOp::NullishCoalescing),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SequenceExpression {
    pub expressions: Rc<[Expression]>,
    pub span: Span,
}

#[derive(Debug)]
pub struct MemberExpression {
    pub object: Expression,
    pub property: MemberProperty,
    /// `a?.b`
    pub optional: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    Identifier(JsString),
    Computed(Expression),
}

#[derive(Debug)]
pub struct CallExpression {
    pub callee: Expression,
    pub arguments: Rc<[Argument]>,
    /// `f?.()`
    pub optional: bool,
    pub span: Span,
}

#[derive(Debug)]
pub struct NewExpression {
    pub callee: Expression,
    pub arguments: Rc<[Argument]>,
    pub span: Span,
}

#[derive(Debug)]
pub struct OptionalChain {
    pub expression: Expression,
    pub span: Span,
}

/// `super.x` / `super[x]`
#[derive(Debug)]
pub struct SuperMember {
    pub property: MemberProperty,
    pub span: Span,
}

/// `super(...)`
#[derive(Debug)]
pub struct SuperCall {
    pub arguments: Rc<[Argument]>,
    pub span: Span,
}

#[derive(Debug)]
pub struct YieldExpression {
    pub argument: Option<Expression>,
    pub delegate: bool,
    pub span: Span,
}

#[derive(Debug)]
pub struct AwaitExpression {
    pub argument: Expression,
    pub span: Span,
}

// ═══════════════════════════════════════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum Pattern {
    Identifier(Identifier),
    Object(Rc<ObjectPattern>),
    Array(Rc<ArrayPattern>),
    /// Target with a default value
    Assignment(Rc<AssignmentPattern>),
    /// Member expression target (assignment patterns only)
    Expression(Expression),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier(i) => i.span,
            Pattern::Object(o) => o.span,
            Pattern::Array(a) => a.span,
            Pattern::Assignment(a) => a.span,
            Pattern::Expression(e) => e.span(),
        }
    }

    /// Collect every identifier bound by this pattern, in source order.
    pub fn bound_names(&self, out: &mut Vec<Identifier>) {
        match self {
            Pattern::Identifier(id) => out.push(id.clone()),
            Pattern::Object(obj) => {
                for prop in obj.properties.iter() {
                    prop.value.bound_names(out);
                }
                if let Some(rest) = &obj.rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Array(arr) => {
                for elem in arr.elements.iter().flatten() {
                    elem.bound_names(out);
                }
                if let Some(rest) = &arr.rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Assignment(assign) => assign.target.bound_names(out),
            Pattern::Expression(_) => {}
        }
    }
}

#[derive(Debug)]
pub struct ObjectPattern {
    pub properties: Rc<[PatternProperty]>,
    pub rest: Option<Pattern>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct PatternProperty {
    pub key: PropertyName,
    pub value: Pattern,
}

#[derive(Debug)]
pub struct ArrayPattern {
    pub elements: Rc<[Option<Pattern>]>,
    pub rest: Option<Pattern>,
    pub span: Span,
}

#[derive(Debug)]
pub struct AssignmentPattern {
    pub target: Pattern,
    pub default: Expression,
    pub span: Span,
}
