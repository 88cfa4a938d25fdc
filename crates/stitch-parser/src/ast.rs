/// Abstract Syntax Tree types for Stitch scripts
///
/// The tree doubles as the intermediate representation that the evaluator
/// runs. Nodes own their strings so a compiled routine can outlive the text
/// it was parsed from.
use std::sync::Arc;

/// Decorator names owned by the hooking framework. Decorators with these
/// names are tagged `framework` and dropped before a composed routine runs.
pub const FRAMEWORK_DECORATORS: &[&str] = &["target", "patch"];

/// A parsed script: its top-level routine declarations in source order
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub routines: Vec<Arc<RoutineDecl>>,
}

impl Module {
    pub fn routine(&self, name: &str) -> Option<&Arc<RoutineDecl>> {
        self.routines.iter().find(|r| r.name == name)
    }

    /// Remove framework decorators from every top-level routine.
    pub fn strip_framework_decorators(&mut self) {
        for routine in &mut self.routines {
            if routine.decorators.iter().any(|d| d.framework) {
                Arc::make_mut(routine).decorators.retain(|d| !d.framework);
            }
        }
    }
}

/// Routine declaration: `[async] def name(params):` followed by a block
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDecl {
    pub name: String,
    pub params: Vec<String>,
    pub is_async: bool,
    pub decorators: Vec<Decorator>,
    pub body: Block,
    /// Line of the `def` keyword
    pub line: usize,
}

impl RoutineDecl {
    pub fn decorator(&self, name: &str) -> Option<&Decorator> {
        self.decorators.iter().find(|d| d.name == name)
    }
}

/// Decorator line: `@name` or `@name(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub name: String,
    pub args: Vec<Expr>,
    pub framework: bool,
    pub line: usize,
}

/// Indented block of statements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Nested routine declaration
    Def(Arc<RoutineDecl>),
    /// `target = value` or `target op= value`
    Assign {
        target: AssignTarget,
        op: Option<BinaryOp>,
        value: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    /// `if` with any number of `elif` branches
    If {
        branches: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    ForIn {
        var: String,
        iter: Expr,
        body: Block,
    },
    Break,
    Continue,
    Pass,
    Raise(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    Index { base: Expr, index: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Identifier(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
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
    /// `await call(...)`; only valid inside `async def`
    Await(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}
