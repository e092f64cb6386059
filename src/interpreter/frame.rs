//! Explicit frame stacks for suspendable execution
//!
//! Every pending piece of work is a [`Frame`] on a [`Coroutine`]'s frame
//! stack. The interpreter pops one frame per step, so guest recursion and AST
//! depth grow these vectors instead of the host call stack, and a suspended
//! coroutine is nothing more than its three stacks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ast::{
    AssignmentExpression, BinaryOp, CallExpression, ClassNode, ConditionalExpression, Expression,
    ForInOfStatement, ForStatement, IfStatement, LogicalExpression, NewExpression, ObjectExpression,
    ObjectPattern, ArrayPattern, Pattern, Program, Statement, SuperCall, SwitchStatement,
    TemplateLiteral, TryStatement, UnaryOp, UpdateOp, VariableDeclaration, WhileStatement,
    WithStatement,
};
use crate::completion::{Completion, Resumption, Unwind};
use crate::environment::{EnvRef, Reference};
use crate::object::ObjectRef;
use crate::value::{JsString, JsValue, PropertyKey};

use super::async_fn::AsyncInvocation;
use super::call::Closure;
use super::callback::CallbackLoop;
use super::module::ModuleInstance;

/// Scope state a frame evaluates in. Replaced, never mutated, when entering
/// a new scope.
pub struct Context {
    pub lexical_env: EnvRef,
    pub variable_env: EnvRef,
    pub strict: bool,
}

impl Context {
    pub fn new(lexical_env: EnvRef, variable_env: EnvRef, strict: bool) -> Rc<Self> {
        Rc::new(Self {
            lexical_env,
            variable_env,
            strict,
        })
    }

    /// Same variable scope, new lexical scope
    pub fn with_lexical(&self, lexical_env: EnvRef) -> Rc<Self> {
        Rc::new(Self {
            lexical_env,
            variable_env: self.variable_env.clone(),
            strict: self.strict,
        })
    }
}

pub struct Frame {
    pub ctx: Rc<Context>,
    pub op: Op,
}

/// Stack heights recorded by handler frames so unwinding can drop whatever
/// the abandoned expressions left behind
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pub values: usize,
    pub refs: usize,
}

/// One suspendable evaluation: frames plus the value, reference and
/// completion registers they communicate through
#[derive(Default)]
pub struct Coroutine {
    pub frames: Vec<Frame>,
    pub values: Vec<JsValue>,
    pub refs: Vec<Reference>,
    /// Completion of the statement that finished last
    pub completion: Completion,
    /// Guest call depth on this coroutine
    pub depth: usize,
}

impl Coroutine {
    pub fn mark(&self) -> Mark {
        Mark {
            values: self.values.len(),
            refs: self.refs.len(),
        }
    }

    pub fn truncate(&mut self, mark: Mark) {
        self.values.truncate(mark.values);
        self.refs.truncate(mark.refs);
    }

    pub fn push(&mut self, ctx: &Rc<Context>, op: Op) {
        self.frames.push(Frame { ctx: ctx.clone(), op });
    }
}

/// What the running coroutine belongs to
#[derive(Clone)]
pub enum ActivationKind {
    /// No task is running
    Idle,
    /// Root of a host request or a microtask job
    Task,
    Generator(ObjectRef),
    Async {
        invocation: Rc<AsyncInvocation>,
        /// The caller waits for the invocation's promise (initial call) rather
        /// than for nothing (a resumption job)
        deliver_promise: bool,
    },
}

/// A suspended caller on the activation stack
pub struct Activation {
    pub kind: ActivationKind,
    pub co: Coroutine,
}

/// Result of one step
pub enum Flow {
    Continue,
    Suspend(crate::completion::SuspensionCommand),
}

pub type Step = Result<Flow, Unwind>;

/// State of an iterator being consumed by the evaluator
pub struct IteratorRecord {
    pub iterator: JsValue,
    pub next: JsValue,
    /// Set before each `next()` call and cleared by a successful result, so
    /// a throwing `next()` leaves the iterator marked exhausted
    pub done: Cell<bool>,
}

/// Anonymous function naming for `NamedExpr`
#[derive(Clone)]
pub enum NameHint {
    Static(JsString),
    /// Name comes from the property key on top of the value stack
    FromKey,
}

/// How pattern leaves are bound
#[derive(Clone)]
pub enum BindTarget {
    /// Resolve the name and assign (`var`, assignment expressions)
    Assign,
    /// Initialize in this environment (`let`, `const`, parameters, catch)
    Initialize(EnvRef),
}

/// Completion parked while a `finally` block runs
pub enum Pending {
    Completion(Completion),
    Unwind(Unwind),
}

#[derive(Clone)]
pub enum ShellKind {
    Call,
    /// Base constructor: the allocated `this`
    Construct(ObjectRef),
    /// Derived constructor: `this` lives in the function record
    ConstructDerived(EnvRef),
}

/// How a job settles its derived promise
pub enum JobSettle {
    None,
    Promise(ObjectRef),
    /// Resolving functions of a thenable adoption
    Resolvers { promise: ObjectRef, resolved: Rc<Cell<bool>> },
}

pub struct LoopState {
    pub node: Rc<WhileStatement>,
    pub labels: Rc<[JsString]>,
    pub value: JsValue,
}

pub struct ForState {
    pub node: Rc<ForStatement>,
    pub labels: Rc<[JsString]>,
    pub value: JsValue,
    /// `let` names copied into a fresh environment every iteration
    pub per_iteration: Rc<[JsString]>,
}

pub struct ForInState {
    pub node: Rc<ForInOfStatement>,
    pub labels: Rc<[JsString]>,
    pub value: JsValue,
    pub object: ObjectRef,
    pub keys: Rc<[PropertyKey]>,
    pub index: usize,
}

pub struct ForOfState {
    pub node: Rc<ForInOfStatement>,
    pub labels: Rc<[JsString]>,
    pub value: JsValue,
    pub iter: Rc<IteratorRecord>,
}

pub struct SwitchState {
    pub node: Rc<SwitchStatement>,
    pub labels: Rc<[JsString]>,
    pub discriminant: JsValue,
}

pub struct ClassState {
    pub node: Rc<ClassNode>,
    pub name: JsString,
    pub constructor: ObjectRef,
    pub prototype: ObjectRef,
}

pub struct ObjectPatternState {
    pub pattern: Rc<ObjectPattern>,
    pub target: BindTarget,
    pub source: JsValue,
    /// Keys already taken, skipped by the rest element
    pub excluded: RefCell<Vec<PropertyKey>>,
}

pub struct ArrayPatternState {
    pub pattern: Rc<ArrayPattern>,
    pub target: BindTarget,
    pub iter: Rc<IteratorRecord>,
}

/// Pending operation. Expression ops leave exactly one value on the value
/// stack; statement ops leave their result in the completion register.
pub enum Op {
    // ═══════════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════════
    Stmt(Statement),

    /// Run `body[index..]`, accumulating the statement-list value
    StmtList {
        body: Rc<[Statement]>,
        index: usize,
        value: Option<JsValue>,
    },

    /// Expression statement: value on stack becomes the completion
    ExprStmtEnd,

    /// Variable declarators from `index`
    Declarators {
        decl: Rc<VariableDeclaration>,
        index: usize,
    },

    IfBranch(Rc<IfStatement>),

    /// Empty completion becomes `undefined` (if, with, try)
    FillEmpty,

    /// Consumes `break` to one of `labels` (labeled non-loop statements)
    LabelScope(Rc<[JsString]>),

    /// while / do-while
    LoopTest(LoopState),
    LoopCheck(LoopState),
    LoopAfterBody(LoopState),

    ForStart(ForState),
    ForTest(ForState),
    ForCheck(ForState),
    ForAfterBody(ForState),
    ForUpdated(ForState),

    ForInStart {
        node: Rc<ForInOfStatement>,
        labels: Rc<[JsString]>,
    },
    ForInNext(ForInState),
    ForInAfterBody(ForInState),

    ForOfStart {
        node: Rc<ForInOfStatement>,
        labels: Rc<[JsString]>,
    },
    ForOfNext(ForOfState),
    ForOfResult(ForOfState),
    /// Body running; closes the iterator when unwound
    ForOfAfterBody(ForOfState),
    /// Iterator closed after a `break`: check `return()` result, restore completion
    ForOfClosed(Completion),

    SwitchStart {
        node: Rc<SwitchStatement>,
        labels: Rc<[JsString]>,
    },
    SwitchTest { state: Rc<SwitchState>, index: usize },
    SwitchCompare { state: Rc<SwitchState>, index: usize },
    /// Run case bodies from `index` (fall-through)
    SwitchRun {
        state: Rc<SwitchState>,
        index: usize,
        value: JsValue,
    },
    SwitchAfterCase {
        state: Rc<SwitchState>,
        index: usize,
        value: JsValue,
    },

    /// Catches throws out of the try block
    TryCatch { node: Rc<TryStatement>, mark: Mark },
    /// Runs the finalizer on every exit path
    TryFinally { node: Rc<TryStatement>, mark: Mark },
    /// Finalizer done: restore the parked completion unless it was overridden
    FinallyResume(Pending),

    WithEnter(Rc<WithStatement>),

    /// Pops a value and returns it from the function
    ReturnValue,
    ThrowValue,

    /// Class declaration: initialize the binding with the class on the stack
    ClassDeclBind(JsString),

    /// `export default <expr>`
    ExportDefaultBind,

    // ═══════════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════════
    Expr(Expression),

    /// Evaluates an anonymous function definition under a name
    NamedExpr(Expression, NameHint),

    Pop,
    Push(JsValue),
    /// Replace the top of the value stack (setter results, `super()` binding)
    Replace(JsValue),

    Unary(UnaryOp),
    Binary(BinaryOp),
    LogicalRest(Rc<LogicalExpression>),
    ConditionalRest(Rc<ConditionalExpression>),

    /// ToString on the top value (template substitutions)
    ToStringTop,
    TemplateConcat(Rc<TemplateLiteral>),

    /// ToPropertyKey on the top value (kept as a string or symbol value)
    ToPropertyKey,

    /// Collect `values[base..]` into an array
    ArrayFinish { base: usize },

    /// Iterator object on stack: start appending its values to the value stack
    SpreadBegin,
    SpreadNext(Rc<IteratorRecord>),
    SpreadResult(Rc<IteratorRecord>),

    /// Object literal under construction on the stack
    ObjectProps { node: Rc<ObjectExpression>, index: usize },
    /// Pops value (and key when `key` is `None`), defines on the object below
    ObjectDefine { key: Option<PropertyKey>, proto_setter: bool },
    /// Computed key on stack: define the method or accessor at `index`
    ObjectMethod { node: Rc<ObjectExpression>, index: usize },
    ObjectSpread,

    /// Pops key and base, pushes the property value
    MemberGet,
    MemberGetStatic(PropertyKey),
    /// `?.`: short-circuits the chain when the top value is nullish
    OptionalCheck,
    OptionalChainEnd(Mark),

    /// Base (the future `this`) on stack: push the method found under the key
    MethodLoad,
    MethodLoadStatic(PropertyKey),
    SuperMethodLoad,

    CallFinish { node: Rc<CallExpression>, base: usize },
    NewFinish { node: Rc<NewExpression>, base: usize },
    SuperCallFinish { node: Rc<SuperCall>, base: usize },
    /// `super()` returned: bind `this` in the constructor's function record
    BindThis(EnvRef),

    /// Pops key and base into a property reference
    MakeRef,
    MakeRefStatic(PropertyKey),
    MakeSuperRef,
    /// Push the value of the top reference (kept)
    GetRef,
    DropRef,
    /// Pops value and reference, stores, pushes the value
    PutRef,
    CompoundFinish(BinaryOp),
    LogicalAssignRest(Rc<AssignmentExpression>),
    UpdateFinish { op: UpdateOp, prefix: bool },
    /// Destructuring assignment expression: value on stack stays as result
    AssignPattern(Pattern),

    DeleteMember,

    ClassHeritage { node: Rc<ClassNode>, name: JsString },
    ClassMembers { state: Rc<ClassState>, index: usize },
    ClassMemberDefine { state: Rc<ClassState>, index: usize },

    // ═══════════════════════════════════════════════════════════════════════
    // Patterns
    // ═══════════════════════════════════════════════════════════════════════
    /// Pops a value and binds `pattern` to it
    BindPattern { pattern: Pattern, target: BindTarget },
    ObjectPatternStep { state: Rc<ObjectPatternState>, index: usize },
    /// Key (computed) on stack: read the property and bind
    ObjectPatternKey { state: Rc<ObjectPatternState>, index: usize },
    ArrayPatternBegin { pattern: Rc<ArrayPattern>, target: BindTarget },
    /// Next element; doubles as the close-on-throw handler
    ArrayPatternStep {
        state: Rc<ArrayPatternState>,
        index: usize,
    },
    ArrayPatternValue {
        state: Rc<ArrayPatternState>,
        index: usize,
    },
    ArrayPatternRest {
        state: Rc<ArrayPatternState>,
        base: usize,
    },
    ArrayPatternRestValue {
        state: Rc<ArrayPatternState>,
        base: usize,
    },
    /// Pops a `return()` result after normal iterator closing
    IterCloseResult,
    /// Handler around `return()` during close-on-unwind
    ResumeUnwind(Unwind),

    // ═══════════════════════════════════════════════════════════════════════
    // Iteration, generators, await
    // ═══════════════════════════════════════════════════════════════════════
    /// Pops an iterable, pushes its iterator object
    GetIterator,

    YieldValue,
    YieldStarBegin,
    /// Suspended inside `yield*`; forwards throw/return resumptions
    YieldDelegate(Rc<IteratorRecord>),
    YieldDelegateResult(Rc<IteratorRecord>),
    YieldDelegateReturn(Rc<IteratorRecord>),

    AwaitValue,

    // ═══════════════════════════════════════════════════════════════════════
    // Calls and activations
    // ═══════════════════════════════════════════════════════════════════════
    /// Bottom of a guest call on the caller's coroutine
    CallShell { kind: ShellKind, mark: Mark },
    /// Parameters bound: declaration instantiation, then the body
    FunctionBody { closure: Rc<Closure>, env: EnvRef },
    /// Parameters bound: create the generator object and return it
    MakeGenerator {
        closure: Rc<Closure>,
        env: EnvRef,
        func: ObjectRef,
    },

    GeneratorShell,
    AsyncShell { script: bool },
    /// Bottom of a task; `root` tasks report their result to the host
    TaskShell { root: bool },
    JobShell(JobSettle),

    /// A native's callback is running above: pops its result and resumes
    /// the loop. Throws out of the callback reach [`CallbackLoop::catch`].
    CallbackLoop { state: Box<dyn CallbackLoop>, mark: Mark },

    /// Call a value (task entry for host calls and generator steps)
    Invoke {
        func: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    },
    /// `new func(...args)` with `func` as `new.target`
    Construct { func: ObjectRef, args: Vec<JsValue> },

    /// Continue an awaiting invocation (microtask job)
    ResumeAsync {
        invocation: Rc<AsyncInvocation>,
        resumption: Resumption,
    },
    /// Re-enter a parked invocation and unwind it with `Unwind::Abort`
    AbortAsync(Rc<AsyncInvocation>),

    /// Global declaration instantiation, then the script body
    ScriptBody(Rc<Program>),
    StartScript(Rc<Program>),
    StartModule(Rc<ModuleInstance>),
    ModuleBody(Rc<ModuleInstance>),
    ModuleEvaluated(Rc<ModuleInstance>),

    /// `Promise.prototype.finally` pass-through after `onFinally()` returned
    FinallyPass { value: JsValue, reject: bool },
}
