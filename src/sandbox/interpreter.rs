//! Tree-walking evaluator for parsed scripts.
//!
//! Every statement, loop iteration and call costs one step. The step budget
//! and the wall-clock deadline are checked as steps are taken; running out of
//! either unwinds the whole evaluation and cannot be caught by the script.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use derive_more::Display;
use hashlink::LinkedHashMap;

use super::ast::{
    BinaryOp, DeclKind, Expr, FunctionBody, LogicalOp, Stmt, TemplatePart, UnaryOp, UpdateOp,
};
use super::builtins;
use super::engine::ExecutionLimits;
use super::transcript::DiagnosticSink;
use super::value::{BoundMethod, Closure, ErrorKind, Method, Native, Val, release};

/// The deadline is only consulted every this many steps.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Arrays are not grown past this many elements by index assignment.
const MAX_ARRAY_LENGTH: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Exhausted {
    #[display("exceeded {_0} steps")]
    Steps(u64),
    #[display("exceeded {}ms", _0.as_millis())]
    Time(Duration),
}

/// Abrupt termination of an evaluation.
#[derive(Debug)]
pub enum Interrupt {
    /// A thrown value that `try`/`catch` can observe.
    Throw(Val),
    Exhausted(Exhausted),
}

pub type Completion<T> = Result<T, Interrupt>;

pub fn throw<T>(kind: ErrorKind, message: impl Into<String>) -> Completion<T> {
    Err(Interrupt::Throw(Val::error(kind, message)))
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Val),
}

struct Binding {
    value: Val,
    constant: bool,
}

enum AssignFailure {
    Constant,
    Undeclared(Val),
}

/// One level of the lexical scope chain.
pub struct Scope {
    bindings: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Scope>>,
    function_boundary: bool,
}

impl Scope {
    pub fn global() -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::default(),
            parent: None,
            function_boundary: true,
        })
    }

    fn child(parent: &Rc<Scope>, function_boundary: bool) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::default(),
            parent: Some(parent.clone()),
            function_boundary,
        })
    }

    pub fn define(&self, name: &str, value: Val, constant: bool) {
        self.bindings
            .borrow_mut()
            .insert(name.to_string(), Binding { value, constant });
    }

    fn has_own(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    fn lookup(&self, name: &str) -> Option<Val> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(binding) = current.bindings.borrow().get(name) {
                return Some(binding.value.clone());
            }
            scope = current.parent.as_deref();
        }
        None
    }

    fn assign(&self, name: &str, value: Val) -> Result<(), AssignFailure> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(binding) = current.bindings.borrow_mut().get_mut(name) {
                if binding.constant {
                    return Err(AssignFailure::Constant);
                }
                release([std::mem::replace(&mut binding.value, value)]);
                return Ok(());
            }
            scope = current.parent.as_deref();
        }
        Err(AssignFailure::Undeclared(value))
    }

    /// Nearest enclosing scope that `var` declarations belong to.
    fn var_scope(self: &Rc<Self>) -> Rc<Scope> {
        let mut scope = self.clone();
        while !scope.function_boundary {
            match &scope.parent {
                Some(parent) => scope = parent.clone(),
                None => break,
            }
        }
        scope
    }

    /// Fresh scope with the same parent and copies of this scope's bindings.
    /// Gives every `for (let ...)` iteration its own loop variables.
    fn copied(self: &Rc<Self>) -> Rc<Scope> {
        let bindings = self
            .bindings
            .borrow()
            .iter()
            .map(|(name, binding)| {
                (
                    name.clone(),
                    Binding {
                        value: binding.value.clone(),
                        constant: binding.constant,
                    },
                )
            })
            .collect();
        Rc::new(Self {
            bindings: RefCell::new(bindings),
            parent: self.parent.clone(),
            function_boundary: self.function_boundary,
        })
    }

    /// Drops every binding, breaking reference cycles between closures and
    /// the scopes they capture.
    pub fn clear(&self) {
        let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
        release(bindings.into_values().map(|binding| binding.value));
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let bindings = std::mem::take(self.bindings.get_mut());
        release(bindings.into_values().map(|binding| binding.value));
    }
}

/// Assignable location resolved once, so compound assignments evaluate their
/// target expression a single time.
enum Place {
    Variable(String),
    Property { target: Val, key: String },
}

pub struct Interpreter {
    limits: ExecutionLimits,
    started: Instant,
    steps: u64,
    depth: usize,
    globals: Rc<Scope>,
    sink: DiagnosticSink,
}

impl Interpreter {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            steps: 0,
            depth: 0,
            globals: builtins::global_scope(),
            sink: DiagnosticSink::default(),
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn sink_mut(&mut self) -> &mut DiagnosticSink {
        &mut self.sink
    }

    pub fn into_sink(self) -> DiagnosticSink {
        self.globals.clear();
        self.sink
    }

    /// Evaluates a whole program in the global scope. A top-level `return`
    /// ends the program normally.
    pub fn run(&mut self, program: &[Stmt]) -> Completion<()> {
        self.started = Instant::now();
        let globals = self.globals.clone();
        self.exec_block(program, &globals)?;
        Ok(())
    }

    fn tick(&mut self) -> Completion<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(Interrupt::Exhausted(Exhausted::Steps(self.limits.max_steps)));
        }
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 && self.started.elapsed() > self.limits.timeout
        {
            return Err(Interrupt::Exhausted(Exhausted::Time(self.limits.timeout)));
        }
        Ok(())
    }

    /* ===================== Statements ===================== */

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Completion<Flow> {
        hoist_functions(body, scope);
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Completion<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Block { body } => self.exec_block(body, &Scope::child(scope, false)),
            Stmt::Declare { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(init) => self.eval(init, scope)?,
                        None => Val::Undefined,
                    };
                    match kind {
                        DeclKind::Var => {
                            let target = scope.var_scope();
                            if init.is_some() || !target.has_own(name) {
                                target.define(name, value, false);
                            }
                        }
                        DeclKind::Let => scope.define(name, value, false),
                        DeclKind::Const => scope.define(name, value, true),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Function { .. } | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr { expr } => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                then_s,
                else_s,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.exec(then_s, scope)
                } else if let Some(else_s) = else_s {
                    self.exec(else_s, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test, scope)?.is_truthy() {
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let mut iteration = Scope::child(scope, false);
                if let Some(init) = init {
                    self.exec(init, &iteration)?;
                }
                let per_iteration = matches!(
                    init.as_deref(),
                    Some(Stmt::Declare {
                        kind: DeclKind::Let | DeclKind::Const,
                        ..
                    })
                );

                loop {
                    if let Some(test) = test
                        && !self.eval(test, &iteration)?.is_truthy()
                    {
                        break;
                    }
                    match self.exec(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if per_iteration {
                        iteration = iteration.copied();
                    }
                    if let Some(update) = update {
                        self.eval(update, &iteration)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                kind,
                binding,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable, scope)? {
                    Val::Array(items) => items,
                    Val::Str(text) => Rc::new(RefCell::new(
                        text.chars().map(|c| Val::Str(c.to_string())).collect(),
                    )),
                    _ => {
                        return throw(
                            ErrorKind::TypeError,
                            format!("{} is not iterable", iterable.describe()),
                        );
                    }
                };

                let mut index = 0;
                loop {
                    let Some(item) = items.borrow().get(index).cloned() else {
                        break;
                    };
                    index += 1;

                    let iteration = Scope::child(scope, false);
                    iteration.define(binding, item, *kind == DeclKind::Const);
                    match self.exec(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return { value } => {
                let value = match value {
                    Some(value) => self.eval(value, scope)?,
                    None => Val::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw { value } => {
                let value = self.eval(value, scope)?;
                Err(Interrupt::Throw(value))
            }
            Stmt::Try {
                body,
                catch_param,
                catch_body,
                finally_body,
            } => {
                let mut result = self.exec_block(body, &Scope::child(scope, false));

                if let Some(handler) = catch_body
                    && let Err(Interrupt::Throw(thrown)) = result
                {
                    let handler_scope = Scope::child(scope, false);
                    if let Some(param) = catch_param {
                        handler_scope.define(param, thrown, false);
                    }
                    result = self.exec_block(handler, &handler_scope);
                }

                if let Err(Interrupt::Exhausted(_)) = result {
                    return result;
                }
                if let Some(finally_body) = finally_body {
                    match self.exec_block(finally_body, &Scope::child(scope, false))? {
                        Flow::Normal => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                result
            }
        }
    }

    /* ===================== Expressions ===================== */

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Completion<Val> {
        match expr {
            Expr::LitUndefined => Ok(Val::Undefined),
            Expr::LitNull => Ok(Val::Null),
            Expr::LitBool { v } => Ok(Val::Bool(*v)),
            Expr::LitNum { v } => Ok(Val::Num(*v)),
            Expr::LitStr { v } => Ok(Val::Str(v.clone())),
            Expr::Template { parts } => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(literal) => text.push_str(literal),
                        TemplatePart::Expr(expr) => {
                            text.push_str(&self.eval(expr, scope)?.to_js_string());
                        }
                    }
                }
                Ok(Val::Str(text))
            }
            Expr::Array { items } => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<Completion<Vec<_>>>()?;
                Ok(Val::array(values))
            }
            Expr::Object { properties } => {
                let mut map = LinkedHashMap::new();
                for (key, value) in properties {
                    let value = self.eval(value, scope)?;
                    set_entry(&mut map, key.clone(), value);
                }
                Ok(Val::object(map))
            }
            Expr::Function { function } => Ok(Val::Function(Rc::new(Closure {
                def: function.clone(),
                scope: scope.clone(),
            }))),
            Expr::Ident { name } => match scope.lookup(name) {
                Some(value) => Ok(value),
                None => throw(ErrorKind::ReferenceError, format!("{name} is not defined")),
            },
            Expr::Member { object, property } => {
                let target = self.eval(object, scope)?;
                get_property(&target, property)
            }
            Expr::Index { object, index } => {
                let target = self.eval(object, scope)?;
                let key = self.eval(index, scope)?.to_property_key();
                get_property(&target, &key)
            }
            Expr::Call { callee, args } => {
                let function = self.eval(callee, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Completion<Vec<_>>>()?;
                if !function.is_callable() {
                    return throw(
                        ErrorKind::TypeError,
                        format!("{} is not a function", callee.describe()),
                    );
                }
                self.call(&function, args)
            }
            Expr::New { constructor, args } => {
                let Some(target) = scope.lookup(constructor) else {
                    return throw(
                        ErrorKind::ReferenceError,
                        format!("{constructor} is not defined"),
                    );
                };
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Completion<Vec<_>>>()?;
                match target {
                    Val::Native(Native::ErrorConstructor(_)) => self.call(&target, args),
                    _ => throw(
                        ErrorKind::TypeError,
                        format!("{constructor} is not a constructor"),
                    ),
                }
            }
            Expr::Unary { op, operand } => {
                if let (UnaryOp::TypeOf, Expr::Ident { name }) = (op, operand.as_ref()) {
                    let type_name = scope.lookup(name).map_or("undefined", |v| v.type_of());
                    return Ok(Val::string(type_name));
                }
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => Val::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Val::Num(-value.to_number()),
                    UnaryOp::Plus => Val::Num(value.to_number()),
                    UnaryOp::TypeOf => Val::string(value.type_of()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuits = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { target, op, value } => {
                let place = self.place(target, scope)?;
                let value = match op {
                    None => self.eval(value, scope)?,
                    Some(op) => {
                        let current = self.read_place(&place, scope)?;
                        let operand = self.eval(value, scope)?;
                        binary(*op, &current, &operand)
                    }
                };
                self.write_place(place, value.clone(), scope)?;
                Ok(value)
            }
            Expr::Update { op, prefix, target } => {
                let place = self.place(target, scope)?;
                let old = self.read_place(&place, scope)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_place(place, Val::Num(new), scope)?;
                Ok(Val::Num(if *prefix { new } else { old }))
            }
        }
    }

    fn place(&mut self, target: &Expr, scope: &Rc<Scope>) -> Completion<Place> {
        match target {
            Expr::Ident { name } => Ok(Place::Variable(name.clone())),
            Expr::Member { object, property } => Ok(Place::Property {
                target: self.eval(object, scope)?,
                key: property.clone(),
            }),
            Expr::Index { object, index } => {
                let target = self.eval(object, scope)?;
                let key = self.eval(index, scope)?.to_property_key();
                Ok(Place::Property { target, key })
            }
            _ => throw(
                ErrorKind::SyntaxError,
                "Invalid left-hand side in assignment",
            ),
        }
    }

    fn read_place(&self, place: &Place, scope: &Rc<Scope>) -> Completion<Val> {
        match place {
            Place::Variable(name) => match scope.lookup(name) {
                Some(value) => Ok(value),
                None => throw(ErrorKind::ReferenceError, format!("{name} is not defined")),
            },
            Place::Property { target, key } => get_property(target, key),
        }
    }

    fn write_place(&self, place: Place, value: Val, scope: &Rc<Scope>) -> Completion<()> {
        match place {
            Place::Variable(name) => match scope.assign(&name, value) {
                Ok(()) => Ok(()),
                Err(AssignFailure::Constant) => {
                    throw(ErrorKind::TypeError, "Assignment to constant variable.")
                }
                Err(AssignFailure::Undeclared(value)) => {
                    self.globals.define(&name, value, false);
                    Ok(())
                }
            },
            Place::Property { target, key } => set_property(&target, key, value),
        }
    }

    /* ===================== Calls ===================== */

    /// Invokes any callable value with already evaluated arguments.
    pub fn call(&mut self, function: &Val, args: Vec<Val>) -> Completion<Val> {
        match function {
            Val::Function(closure) => self.call_closure(closure, args),
            Val::Native(native) => builtins::call_native(self, *native, args),
            Val::Method(bound) => builtins::call_method(self, &bound.receiver, bound.method, args),
            other => throw(
                ErrorKind::TypeError,
                format!("{} is not a function", other.to_js_string()),
            ),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<Val>) -> Completion<Val> {
        if self.depth >= self.limits.max_call_depth {
            return throw(ErrorKind::RangeError, "Maximum call stack size exceeded");
        }
        self.tick()?;

        let scope = Scope::child(&closure.scope, true);
        if let Some(name) = &closure.def.name {
            scope.define(name, Val::Function(closure.clone()), false);
        }
        let mut args = args.into_iter();
        for param in &closure.def.params {
            scope.define(param, args.next().unwrap_or(Val::Undefined), false);
        }

        self.depth += 1;
        let result = match &closure.def.body {
            FunctionBody::Block(body) => self.exec_block(body, &scope).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Val::Undefined,
            }),
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
        };
        self.depth -= 1;
        result
    }
}

fn hoist_functions(body: &[Stmt], scope: &Rc<Scope>) {
    for stmt in body {
        if let Stmt::Function { function } = stmt
            && let Some(name) = &function.name
        {
            let closure = Closure {
                def: function.clone(),
                scope: scope.clone(),
            };
            scope.define(name, Val::Function(Rc::new(closure)), false);
        }
    }
}

/// Inserts or overwrites a property without moving an existing key.
pub fn set_entry(map: &mut LinkedHashMap<String, Val>, key: String, value: Val) {
    match map.get_mut(&key) {
        Some(slot) => *slot = value,
        None => {
            map.insert(key, value);
        }
    }
}

fn array_index(key: &str) -> Option<usize> {
    key.parse::<usize>()
        .ok()
        .filter(|index| index.to_string() == key)
}

fn bind(receiver: &Val, method: Method) -> Val {
    Val::Method(Rc::new(BoundMethod {
        receiver: receiver.clone(),
        method,
    }))
}

pub fn get_property(target: &Val, key: &str) -> Completion<Val> {
    Ok(match target {
        Val::Undefined | Val::Null => {
            return throw(
                ErrorKind::TypeError,
                format!(
                    "Cannot read properties of {} (reading '{key}')",
                    target.to_js_string()
                ),
            );
        }
        Val::Array(items) => {
            if key == "length" {
                Val::Num(items.borrow().len() as f64)
            } else if let Some(index) = array_index(key) {
                items.borrow().get(index).cloned().unwrap_or(Val::Undefined)
            } else {
                Method::for_array(key).map_or(Val::Undefined, |method| bind(target, method))
            }
        }
        Val::Str(text) => {
            if key == "length" {
                Val::Num(text.chars().count() as f64)
            } else if let Some(index) = array_index(key) {
                text.chars()
                    .nth(index)
                    .map_or(Val::Undefined, |c| Val::Str(c.to_string()))
            } else {
                Method::for_string(key).map_or(Val::Undefined, |method| bind(target, method))
            }
        }
        Val::Num(_) => {
            Method::for_number(key).map_or(Val::Undefined, |method| bind(target, method))
        }
        Val::Object(properties) => properties
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(Val::Undefined),
        Val::Error(error) => match key {
            "message" => Val::Str(error.message.clone()),
            "name" => Val::Str(error.kind.to_string()),
            _ => Val::Undefined,
        },
        Val::Function(closure) if key == "name" => {
            Val::Str(closure.def.name.clone().unwrap_or_default())
        }
        Val::Native(native) if key == "name" => Val::string(native.name()),
        _ => Val::Undefined,
    })
}

pub fn set_property(target: &Val, key: String, value: Val) -> Completion<()> {
    match target {
        Val::Undefined | Val::Null => throw(
            ErrorKind::TypeError,
            format!(
                "Cannot set properties of {} (setting '{key}')",
                target.to_js_string()
            ),
        ),
        Val::Array(items) if key == "length" => {
            let length = value.to_number();
            if length < 0.0 || length.fract() != 0.0 || length > MAX_ARRAY_LENGTH as f64 {
                return throw(ErrorKind::RangeError, "Invalid array length");
            }
            items.borrow_mut().resize(length as usize, Val::Undefined);
            Ok(())
        }
        Val::Array(items) => {
            let Some(index) = array_index(&key) else {
                return Ok(());
            };
            if index >= MAX_ARRAY_LENGTH {
                return throw(ErrorKind::RangeError, "Invalid array length");
            }
            let mut items = items.borrow_mut();
            if index >= items.len() {
                items.resize(index + 1, Val::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        Val::Object(properties) => {
            set_entry(&mut properties.borrow_mut(), key, value);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn to_primitive(value: &Val) -> Val {
    match value {
        Val::Array(_)
        | Val::Object(_)
        | Val::Error(_)
        | Val::Function(_)
        | Val::Native(_)
        | Val::Method(_) => Val::Str(value.to_js_string()),
        primitive => primitive.clone(),
    }
}

fn binary(op: BinaryOp, left: &Val, right: &Val) -> Val {
    match op {
        BinaryOp::Add => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            match (&left, &right) {
                (Val::Str(a), _) => Val::Str(format!("{a}{}", right.to_js_string())),
                (_, Val::Str(b)) => Val::Str(format!("{}{b}", left.to_js_string())),
                _ => Val::Num(left.to_number() + right.to_number()),
            }
        }
        BinaryOp::Sub => Val::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Val::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Val::Num(left.to_number() / right.to_number()),
        BinaryOp::Rem => Val::Num(left.to_number() % right.to_number()),
        BinaryOp::StrictEq => Val::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => Val::Bool(!left.strict_equals(right)),
        BinaryOp::LooseEq => Val::Bool(left.loose_equals(right)),
        BinaryOp::LooseNe => Val::Bool(!left.loose_equals(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            let ordering = match (&left, &right) {
                (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Val::Bool(match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Lt, Some(ordering)) => ordering == Ordering::Less,
                (BinaryOp::Le, Some(ordering)) => ordering != Ordering::Greater,
                (BinaryOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
                (_, Some(ordering)) => ordering != Ordering::Less,
            })
        }
    }
}
