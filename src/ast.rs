use crate::types::Type;

/// Dense index of a typed node; the checker records one [`Type`] per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone)]
pub struct Program {
    pub procedures: Vec<Procedure>,
    pub wain: Procedure,
    /// Number of ids handed out while lowering.
    pub expr_count: u32,
}

impl Program {
    /// Every procedure in declaration order, `wain` last.
    pub fn all_procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.iter().chain(std::iter::once(&self.wain))
    }
}

#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<Dcl>,
    pub dcls: Vec<Declaration>,
    pub body: Vec<Statement>,
    pub ret: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dcl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub dcl: Dcl,
    pub init: Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initializer {
    Num(i32),
    Null,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Assign(LValue, Expr),
    If {
        test: Test,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    While {
        test: Test,
        body: Vec<Statement>,
    },
    Println(Expr),
    Delete(Expr),
}

#[derive(Debug, Clone)]
pub struct Test {
    pub lhs: Expr,
    pub op: RelOp,
    pub rhs: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Ge,
    Gt,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

/// `expr → term` and `term → factor` are folded away; every other
/// alternative of `expr`, `term` and `factor` has its own variant.
#[derive(Debug, Clone)]
pub enum ExprKind {
    Num(i32),
    Null,
    Var(String),
    Paren(Box<Expr>),
    AddressOf(LValue),
    Deref(Box<Expr>),
    New(Box<Expr>),
    Call(String, Vec<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone)]
pub enum LValue {
    Var(String),
    Deref(Box<Expr>),
    Paren(Box<LValue>),
}
