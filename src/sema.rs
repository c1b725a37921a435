//! Builds the symbol catalog and checks every typing rule.
//!
//! The first violation aborts the whole pass; nothing downstream ever sees a
//! partially checked program.

use crate::ast::*;
use crate::error::{SemanticError, SemanticErrorKind as Kind};
use crate::symbols::{ProcId, ProcedureDirectory, ProcedureInfo, TypeTable};
use crate::types::{difference_type, product_type, sum_type, Type};

/// Everything code generation needs from the checker.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub directory: ProcedureDirectory,
    pub types: TypeTable,
}

type SemResult<T> = Result<T, SemanticError>;

pub fn check(program: &Program) -> SemResult<Analysis> {
    let mut checker = Checker {
        directory: ProcedureDirectory::new(),
        types: TypeTable::with_capacity(program.expr_count),
    };
    for p in &program.procedures {
        checker.check_procedure(p, false)?;
    }
    checker.check_procedure(&program.wain, true)?;
    log::info!(
        "type check passed: {} procedures",
        checker.directory.iter().count()
    );
    Ok(Analysis {
        directory: checker.directory,
        types: checker.types,
    })
}

struct Checker {
    directory: ProcedureDirectory,
    types: TypeTable,
}

/// The procedure whose body is being checked, handed to every visit.
#[derive(Clone, Copy)]
struct Scope<'p> {
    id: ProcId,
    name: &'p str,
}

impl Checker {
    fn check_procedure(&mut self, p: &Procedure, entry: bool) -> SemResult<()> {
        if self.directory.contains(&p.name) {
            return Err(SemanticError::new(
                Kind::DuplicateProcedure,
                format!("procedure '{}' is already defined", p.name),
            ));
        }
        if entry {
            if let Some(second) = p.params.get(1) {
                if second.ty != Type::Int {
                    return Err(SemanticError::new(
                        Kind::EntrySecondParamNotInt,
                        format!("parameter '{}' of wain has type {}", second.name, second.ty),
                    ));
                }
            }
        }

        let mut info = ProcedureInfo::new(&p.name);
        for prm in &p.params {
            if !info.declare_param(&prm.name, prm.ty) {
                return Err(duplicate_symbol(&prm.name, &p.name));
            }
        }
        // Registered before the body so a procedure can call itself.
        let id = self.directory.push(info);
        let scope = Scope {
            id,
            name: &p.name,
        };
        log::debug!("registered procedure '{}' ({} params)", p.name, p.params.len());

        for d in &p.dcls {
            self.check_declaration(scope, d)?;
        }
        for s in &p.body {
            self.check_stmt(scope, s)?;
        }
        let rt = self.type_of(scope, &p.ret)?;
        if rt != Type::Int {
            return Err(SemanticError::new(
                Kind::TypeMismatch,
                format!("procedure '{}' must return int, found {rt}", p.name),
            ));
        }
        Ok(())
    }

    fn current(&self, scope: Scope) -> &ProcedureInfo {
        self.directory.procedure(scope.id)
    }

    fn check_declaration(&mut self, scope: Scope, d: &Declaration) -> SemResult<()> {
        match (d.init, d.dcl.ty) {
            (Initializer::Num(_), Type::Int) | (Initializer::Null, Type::IntPtr) => {}
            (Initializer::Num(n), ty) => {
                return Err(SemanticError::new(
                    Kind::TypeMismatch,
                    format!("'{}' of type {ty} initialised with {n} in '{}'", d.dcl.name, scope.name),
                ))
            }
            (Initializer::Null, ty) => {
                return Err(SemanticError::new(
                    Kind::TypeMismatch,
                    format!("'{}' of type {ty} initialised with NULL in '{}'", d.dcl.name, scope.name),
                ))
            }
        }
        if !self
            .directory
            .procedure_mut(scope.id)
            .declare(&d.dcl.name, d.dcl.ty)
        {
            return Err(duplicate_symbol(&d.dcl.name, scope.name));
        }
        Ok(())
    }

    fn check_stmt(&mut self, scope: Scope, s: &Statement) -> SemResult<()> {
        match s {
            Statement::Assign(lv, rhs) => {
                let lt = self.type_of_lvalue(scope, lv)?;
                let rt = self.type_of(scope, rhs)?;
                if lt != rt {
                    return Err(mismatch(scope, format!("cannot assign {rt} to {lt}")));
                }
                Ok(())
            }
            Statement::If {
                test,
                then_body,
                else_body,
            } => {
                self.check_test(scope, test)?;
                for st in then_body.iter().chain(else_body) {
                    self.check_stmt(scope, st)?;
                }
                Ok(())
            }
            Statement::While { test, body } => {
                self.check_test(scope, test)?;
                for st in body {
                    self.check_stmt(scope, st)?;
                }
                Ok(())
            }
            Statement::Println(e) => {
                let t = self.type_of(scope, e)?;
                if t != Type::Int {
                    return Err(mismatch(scope, format!("println expects int, found {t}")));
                }
                Ok(())
            }
            Statement::Delete(e) => {
                let t = self.type_of(scope, e)?;
                if t != Type::IntPtr {
                    return Err(mismatch(scope, format!("delete expects int*, found {t}")));
                }
                Ok(())
            }
        }
    }

    fn check_test(&mut self, scope: Scope, t: &Test) -> SemResult<()> {
        let a = self.type_of(scope, &t.lhs)?;
        let b = self.type_of(scope, &t.rhs)?;
        if a != b {
            return Err(mismatch(scope, format!("comparison between {a} and {b}")));
        }
        Ok(())
    }

    fn lookup_var(&self, scope: Scope, name: &str) -> SemResult<Type> {
        self.current(scope).lookup(name).ok_or_else(|| {
            SemanticError::new(
                Kind::UndeclaredSymbol,
                format!("'{name}' is not declared in '{}'", scope.name),
            )
        })
    }

    fn type_of_lvalue(&mut self, scope: Scope, lv: &LValue) -> SemResult<Type> {
        match lv {
            LValue::Var(n) => self.lookup_var(scope, n),
            LValue::Deref(inner) => {
                let t = self.type_of(scope, inner)?;
                if t != Type::IntPtr {
                    return Err(mismatch(scope, format!("cannot dereference {t}")));
                }
                Ok(Type::Int)
            }
            LValue::Paren(inner) => self.type_of_lvalue(scope, inner),
        }
    }

    /// Infers the type of `e` and records it for code generation.
    fn type_of(&mut self, scope: Scope, e: &Expr) -> SemResult<Type> {
        let t = match &e.kind {
            ExprKind::Num(_) => Type::Int,
            ExprKind::Null => Type::IntPtr,
            ExprKind::Var(n) => self.lookup_var(scope, n)?,
            ExprKind::Paren(inner) => self.type_of(scope, inner)?,
            ExprKind::AddressOf(lv) => {
                let t = self.type_of_lvalue(scope, lv)?;
                if t != Type::Int {
                    return Err(mismatch(scope, format!("cannot take the address of {t}")));
                }
                Type::IntPtr
            }
            ExprKind::Deref(inner) => {
                let t = self.type_of(scope, inner)?;
                if t != Type::IntPtr {
                    return Err(mismatch(scope, format!("cannot dereference {t}")));
                }
                Type::Int
            }
            ExprKind::New(len) => {
                let t = self.type_of(scope, len)?;
                if t != Type::Int {
                    return Err(mismatch(scope, format!("new int[] length has type {t}")));
                }
                Type::IntPtr
            }
            ExprKind::Call(name, args) => {
                self.check_call(scope, name, args)?;
                Type::Int
            }
            ExprKind::Binary(a, op, b) => {
                let ta = self.type_of(scope, a)?;
                let tb = self.type_of(scope, b)?;
                let rule = match op {
                    BinOp::Add => sum_type(ta, tb),
                    BinOp::Sub => difference_type(ta, tb),
                    BinOp::Mul | BinOp::Div | BinOp::Rem => product_type(ta, tb),
                };
                rule.ok_or_else(|| {
                    mismatch(scope, format!("operator {op:?} cannot combine {ta} and {tb}"))
                })?
            }
        };
        self.types.record(e.id, t);
        Ok(t)
    }

    fn check_call(&mut self, scope: Scope, name: &str, args: &[Expr]) -> SemResult<()> {
        if self.current(scope).lookup(name).is_some() {
            return Err(SemanticError::new(
                Kind::UndeclaredOrMisusedCall,
                format!("variable '{name}' is called as a procedure in '{}'", scope.name),
            ));
        }
        let params: Vec<Type> = match self.directory.find(name) {
            Some(callee) => callee.param_types().collect(),
            None => {
                return Err(SemanticError::new(
                    Kind::UndeclaredOrMisusedCall,
                    format!("procedure '{name}' is not declared before '{}'", scope.name),
                ))
            }
        };
        // Covers `f()` too: a zero-argument call must name a zero-parameter procedure.
        if params.len() != args.len() {
            return Err(SemanticError::new(
                Kind::ArityMismatch,
                format!(
                    "'{name}' expects {} arguments, got {} (in '{}')",
                    params.len(),
                    args.len(),
                    scope.name
                ),
            ));
        }
        for (idx, (want, a)) in params.iter().zip(args).enumerate() {
            let got = self.type_of(scope, a)?;
            if got != *want {
                return Err(SemanticError::new(
                    Kind::ArgumentTypeMismatch,
                    format!(
                        "argument #{} in call to '{name}': expected {want}, got {got}",
                        idx + 1
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn duplicate_symbol(name: &str, procedure: &str) -> SemanticError {
    SemanticError::new(
        Kind::DuplicateSymbol,
        format!("'{name}' is declared twice in '{procedure}'"),
    )
}

fn mismatch(scope: Scope, what: String) -> SemanticError {
    SemanticError::new(Kind::TypeMismatch, format!("{what} in '{}'", scope.name))
}
