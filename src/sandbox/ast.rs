//! Abstract syntax tree of sandbox scripts

use std::rc::Rc;

use super::value::number_to_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
    },
    Declare {
        kind: DeclKind,
        declarations: Vec<(String, Option<Expr>)>,
    },
    Function {
        function: Rc<FunctionDef>,
    },
    Expr {
        expr: Expr,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        kind: DeclKind,
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Return {
        value: Option<Expr>,
    },
    Break,
    Continue,
    Throw {
        value: Expr,
    },
    Try {
        body: Vec<Stmt>,
        catch_param: Option<String>,
        catch_body: Option<Vec<Stmt>>,
        finally_body: Option<Vec<Stmt>>,
    },
    Empty,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Arrow function with an expression body
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    LitUndefined,
    LitNull,
    LitBool {
        v: bool,
    },
    LitNum {
        v: f64,
    },
    LitStr {
        v: String,
    },
    Template {
        parts: Vec<TemplatePart>,
    },
    Array {
        items: Vec<Expr>,
    },
    Object {
        properties: Vec<(String, Expr)>,
    },
    Function {
        function: Rc<FunctionDef>,
    },
    Ident {
        name: String,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        constructor: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
}

impl Expr {
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::Ident { .. } | Expr::Member { .. } | Expr::Index { .. }
        )
    }

    /// Source-like rendering of a callee, used in "is not a function" faults.
    /// Computed values without a name render as `(intermediate value)`.
    pub fn describe(&self) -> String {
        match self {
            Expr::Ident { name } => name.clone(),
            Expr::Member { object, property } => format!("{}.{}", object.describe(), property),
            Expr::Index { object, .. } => format!("{}[...]", object.describe()),
            Expr::Call { callee, .. } => format!("{}(...)", callee.describe()),
            Expr::LitUndefined => "undefined".to_string(),
            Expr::LitNull => "null".to_string(),
            Expr::LitBool { v } => v.to_string(),
            Expr::LitNum { v } => number_to_string(*v),
            Expr::LitStr { v } => format!("\"{v}\""),
            _ => "(intermediate value)".to_string(),
        }
    }
}
