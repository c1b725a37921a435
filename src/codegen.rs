//! Lowers a checked program to assembly for the register machine.
//!
//! Every expression leaves its value in `$3`. Binary operators evaluate the
//! left operand, push it, evaluate the right operand and pop the left one
//! into `$5`. Each procedure's frame pointer is the stack pointer at entry;
//! parameters and locals live at negative offsets from it.

use crate::asm::{Branch, Emitter, Instr, Line, Reg, Target, Word};
use crate::ast::*;
use crate::error::InternalError;
use crate::frame::{FrameLayout, WORD};
use crate::labels::LabelAllocator;
use crate::sema::Analysis;
use crate::types::Type;

/// Runtime routines, in the order their addresses are loaded.
const RUNTIME_IMPORTS: [(&str, Reg); 4] = [
    ("print", Reg::PRINT),
    ("init", Reg::INIT),
    ("new", Reg::NEW),
    ("delete", Reg::DELETE),
];

type GenResult<T> = Result<T, InternalError>;

pub fn generate(program: &Program, analysis: &Analysis) -> GenResult<String> {
    let mut g = CodeGen::new(analysis);
    g.gen_program(program)?;
    log::info!("generated {} words of code", g.out.words());
    Ok(g.finish())
}

/// State of the procedure being generated. A fresh one is made at every
/// procedure boundary, so offsets never leak between procedures.
struct ProcCtx<'p> {
    name: &'p str,
    frame: FrameLayout,
}

impl<'p> ProcCtx<'p> {
    fn enter(p: &'p Procedure) -> GenResult<Self> {
        let frame = FrameLayout::for_procedure(p)?;
        log::debug!(
            "frame of '{}' ({} bytes): {}",
            p.name,
            frame.size(),
            frame
                .entries()
                .iter()
                .map(|e| format!("{} {}@{}", e.ty, e.name, e.offset))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { name: &p.name, frame })
    }

    fn offset(&self, var: &str) -> GenResult<i32> {
        self.frame.offset(var).ok_or_else(|| {
            InternalError(format!("'{var}' has no stack slot in '{}'", self.name))
        })
    }
}

pub struct CodeGen<'a> {
    analysis: &'a Analysis,
    out: Emitter,
    labels: LabelAllocator,
}

impl<'a> CodeGen<'a> {
    pub fn new(analysis: &'a Analysis) -> Self {
        Self {
            analysis,
            out: Emitter::new(),
            labels: LabelAllocator::new(),
        }
    }

    pub fn finish(self) -> String {
        self.out.finish()
    }

    pub fn gen_program(&mut self, program: &Program) -> GenResult<()> {
        for (sym, _) in RUNTIME_IMPORTS {
            self.out.line(Line::Import(sym));
        }
        self.gen_wain(&program.wain)?;
        for p in &program.procedures {
            self.out.line(Line::Blank);
            self.gen_procedure(p)?;
        }
        Ok(())
    }

    fn gen_wain(&mut self, p: &Procedure) -> GenResult<()> {
        self.out.comment("runtime initialization");
        self.out.load_const(Reg::WORD, Word::Num(WORD));
        self.out.load_const(Reg::ONE, Word::Num(1));
        for (sym, reg) in RUNTIME_IMPORTS {
            self.out.load_const(reg, Word::Symbol(sym.to_string()));
        }
        self.out.copy(Reg::FP, Reg::SP);

        let ctx = ProcCtx::enter(p)?;
        for (prm, reg) in p.params.iter().zip([Reg::ARG1, Reg::ARG2]) {
            let offset = ctx.offset(&prm.name)?;
            self.out.emit(Instr::Sw {
                t: reg,
                offset,
                s: Reg::FP,
            });
            self.out.emit(Instr::Sub {
                d: Reg::SP,
                s: Reg::SP,
                t: Reg::WORD,
            });
        }
        // init expects an array length in $2; zero means no array.
        if p.params.first().map(|d| d.ty) == Some(Type::Int) {
            self.out.copy(Reg::ARG2, Reg::ZERO);
        }
        call_runtime(&mut self.out, Reg::INIT);

        self.gen_body(&ctx, p)?;

        self.out.comment("return to the host");
        self.out.copy(Reg::SP, Reg::FP);
        self.out.emit(Instr::Jr(Reg::RA));
        Ok(())
    }

    fn gen_procedure(&mut self, p: &Procedure) -> GenResult<()> {
        self.out.label(&LabelAllocator::procedure(&p.name));
        // The caller already stored the arguments in the parameter slots.
        let ctx = ProcCtx::enter(p)?;
        self.gen_body(&ctx, p)?;
        self.out.copy(Reg::SP, Reg::FP);
        self.out.emit(Instr::Jr(Reg::RA));
        Ok(())
    }

    fn gen_body(&mut self, ctx: &ProcCtx, p: &Procedure) -> GenResult<()> {
        for d in &p.dcls {
            match d.init {
                Initializer::Num(n) => self.out.load_const(Reg::ACC, Word::Num(n)),
                Initializer::Null => self.out.copy(Reg::ACC, Reg::ONE),
            }
            let offset = ctx.offset(&d.dcl.name)?;
            self.out.emit(Instr::Sw {
                t: Reg::ACC,
                offset,
                s: Reg::FP,
            });
            self.out.emit(Instr::Sub {
                d: Reg::SP,
                s: Reg::SP,
                t: Reg::WORD,
            });
        }
        for s in &p.body {
            self.gen_stmt(ctx, s)?;
        }
        self.gen_expr(ctx, &p.ret)
    }

    fn gen_stmt(&mut self, ctx: &ProcCtx, s: &Statement) -> GenResult<()> {
        match s {
            Statement::Assign(lv, rhs) => match strip_parens(lv) {
                LValue::Var(name) => {
                    let offset = ctx.offset(name)?;
                    self.gen_expr(ctx, rhs)?;
                    self.out.emit(Instr::Sw {
                        t: Reg::ACC,
                        offset,
                        s: Reg::FP,
                    });
                    Ok(())
                }
                LValue::Deref(addr) => {
                    self.gen_expr(ctx, addr)?;
                    self.out.push(Reg::ACC);
                    self.gen_expr(ctx, rhs)?;
                    self.out.pop(Reg::LEFT);
                    self.out.emit(Instr::Sw {
                        t: Reg::ACC,
                        offset: 0,
                        s: Reg::LEFT,
                    });
                    Ok(())
                }
                LValue::Paren(_) => unreachable_shape("parenthesised lvalue after stripping"),
            },
            Statement::Println(e) => {
                self.gen_expr(ctx, e)?;
                self.out.copy(Reg::ARG1, Reg::ACC);
                call_runtime(&mut self.out, Reg::PRINT);
                Ok(())
            }
            Statement::Delete(e) => {
                self.gen_expr(ctx, e)?;
                let mut call = Emitter::new();
                call.copy(Reg::ARG1, Reg::ACC);
                call_runtime(&mut call, Reg::DELETE);
                // Deleting NULL skips the runtime call.
                self.out.emit(Instr::Beq {
                    s: Reg::ACC,
                    t: Reg::ONE,
                    target: Target::Offset(call.words() as i32),
                });
                self.out.append(call);
                Ok(())
            }
            Statement::While { test, body } => {
                let labels = self.labels.next_while();
                log::trace!("allocated {} / {}", labels.top, labels.exit);
                self.out.label(&labels.top);
                let exit_when = self.gen_test(ctx, test)?;
                self.out.emit(exit_when.to(Target::Label(labels.exit.clone())));
                for st in body {
                    self.gen_stmt(ctx, st)?;
                }
                self.jump(Target::Label(labels.top));
                self.out.label(&labels.exit);
                Ok(())
            }
            Statement::If {
                test,
                then_body,
                else_body,
            } => {
                let labels = self.labels.next_if();
                log::trace!(
                    "allocated {} / {} / {}",
                    labels.then_label,
                    labels.else_label,
                    labels.end
                );
                let skip_then = self.gen_test(ctx, test)?;
                self.out
                    .emit(skip_then.inverted().to(Target::Label(labels.then_label.clone())));
                self.jump(Target::Label(labels.else_label.clone()));
                self.out.label(&labels.then_label);
                for st in then_body {
                    self.gen_stmt(ctx, st)?;
                }
                self.jump(Target::Label(labels.end.clone()));
                self.out.label(&labels.else_label);
                for st in else_body {
                    self.gen_stmt(ctx, st)?;
                }
                self.out.label(&labels.end);
                Ok(())
            }
        }
    }

    fn jump(&mut self, target: Target) {
        self.out.emit(Instr::Beq {
            s: Reg::ZERO,
            t: Reg::ZERO,
            target,
        });
    }

    /// Leaves 1 in `$3` when the test holds and 0 otherwise, and returns the
    /// branch that is taken when it does not hold.
    fn gen_test(&mut self, ctx: &ProcCtx, t: &Test) -> GenResult<Branch> {
        let pointers = self.type_of(&t.lhs)?.is_pointer();
        let less = |d, s, t| {
            if pointers {
                Instr::Sltu { d, s, t }
            } else {
                Instr::Slt { d, s, t }
            }
        };
        self.gen_expr(ctx, &t.lhs)?;
        self.out.push(Reg::ACC);
        self.gen_expr(ctx, &t.rhs)?;
        self.out.pop(Reg::LEFT);

        let (l, r) = (Reg::LEFT, Reg::ACC);
        match t.op {
            RelOp::Lt => self.out.emit(less(Reg::ACC, l, r)),
            RelOp::Gt => self.out.emit(less(Reg::ACC, r, l)),
            RelOp::Le => {
                self.out.emit(less(Reg::ACC, r, l));
                self.negate_truth();
            }
            RelOp::Ge => {
                self.out.emit(less(Reg::ACC, l, r));
                self.negate_truth();
            }
            RelOp::Ne | RelOp::Eq => {
                self.out.emit(less(Reg::T1, l, r));
                self.out.emit(less(Reg::T2, r, l));
                self.out.emit(Instr::Add {
                    d: Reg::ACC,
                    s: Reg::T1,
                    t: Reg::T2,
                });
                if t.op == RelOp::Eq {
                    self.negate_truth();
                }
            }
        }
        Ok(Branch {
            on_equal: false,
            s: Reg::ACC,
            t: Reg::ONE,
        })
    }

    /// `$3 = 1 - $3`
    fn negate_truth(&mut self) {
        self.out.emit(Instr::Sub {
            d: Reg::ACC,
            s: Reg::ONE,
            t: Reg::ACC,
        });
    }

    fn type_of(&self, e: &Expr) -> GenResult<Type> {
        self.analysis
            .types
            .get(e.id)
            .ok_or_else(|| InternalError(format!("no type recorded for node {}", e.id.0)))
    }

    fn gen_expr(&mut self, ctx: &ProcCtx, e: &Expr) -> GenResult<()> {
        match &e.kind {
            ExprKind::Num(n) => self.out.load_const(Reg::ACC, Word::Num(*n)),
            ExprKind::Null => self.out.copy(Reg::ACC, Reg::ONE),
            ExprKind::Var(name) => {
                let offset = ctx.offset(name)?;
                self.out.emit(Instr::Lw {
                    t: Reg::ACC,
                    offset,
                    s: Reg::FP,
                });
            }
            ExprKind::Paren(inner) => self.gen_expr(ctx, inner)?,
            ExprKind::AddressOf(lv) => self.gen_address(ctx, lv)?,
            ExprKind::Deref(inner) => {
                self.gen_expr(ctx, inner)?;
                self.out.emit(Instr::Lw {
                    t: Reg::ACC,
                    offset: 0,
                    s: Reg::ACC,
                });
            }
            ExprKind::New(len) => {
                self.gen_expr(ctx, len)?;
                self.out.copy(Reg::ARG1, Reg::ACC);
                call_runtime(&mut self.out, Reg::NEW);
                // A failed allocation returns 0; hand back NULL instead.
                self.out.emit(Instr::Bne {
                    s: Reg::ACC,
                    t: Reg::ZERO,
                    target: Target::Offset(1),
                });
                self.out.copy(Reg::ACC, Reg::ONE);
            }
            ExprKind::Call(name, args) => self.gen_call(ctx, name, args)?,
            ExprKind::Binary(a, op, b) => {
                let ta = self.type_of(a)?;
                let tb = self.type_of(b)?;
                self.gen_expr(ctx, a)?;
                self.out.push(Reg::ACC);
                self.gen_expr(ctx, b)?;
                self.out.pop(Reg::LEFT);
                self.gen_binary(*op, ta, tb)?;
            }
        }
        Ok(())
    }

    /// Combines `$5 op $3` into `$3`.
    fn gen_binary(&mut self, op: BinOp, ta: Type, tb: Type) -> GenResult<()> {
        let (l, r, acc) = (Reg::LEFT, Reg::ACC, Reg::ACC);
        match (op, ta, tb) {
            (BinOp::Add, Type::Int, Type::Int) => self.out.emit(Instr::Add { d: acc, s: l, t: r }),
            (BinOp::Add, Type::IntPtr, Type::Int) => {
                self.scale(r);
                self.out.emit(Instr::Add { d: acc, s: l, t: r });
            }
            (BinOp::Add, Type::Int, Type::IntPtr) => {
                self.scale(l);
                self.out.emit(Instr::Add { d: acc, s: l, t: r });
            }
            (BinOp::Sub, Type::Int, Type::Int) => self.out.emit(Instr::Sub { d: acc, s: l, t: r }),
            (BinOp::Sub, Type::IntPtr, Type::Int) => {
                self.scale(r);
                self.out.emit(Instr::Sub { d: acc, s: l, t: r });
            }
            (BinOp::Sub, Type::IntPtr, Type::IntPtr) => {
                self.out.emit(Instr::Sub { d: acc, s: l, t: r });
                self.out.emit(Instr::Div { s: acc, t: Reg::WORD });
                self.out.emit(Instr::Mflo(acc));
            }
            (BinOp::Mul, Type::Int, Type::Int) => {
                self.out.emit(Instr::Mult { s: l, t: r });
                self.out.emit(Instr::Mflo(acc));
            }
            (BinOp::Div, Type::Int, Type::Int) => {
                self.out.emit(Instr::Div { s: l, t: r });
                self.out.emit(Instr::Mflo(acc));
            }
            (BinOp::Rem, Type::Int, Type::Int) => {
                self.out.emit(Instr::Div { s: l, t: r });
                self.out.emit(Instr::Mfhi(acc));
            }
            _ => {
                return Err(InternalError(format!(
                    "unchecked operands {ta} {op:?} {tb}"
                )))
            }
        }
        Ok(())
    }

    /// `reg = reg * 4`
    fn scale(&mut self, reg: Reg) {
        self.out.emit(Instr::Mult { s: reg, t: Reg::WORD });
        self.out.emit(Instr::Mflo(reg));
    }

    fn gen_address(&mut self, ctx: &ProcCtx, lv: &LValue) -> GenResult<()> {
        match lv {
            LValue::Var(name) => {
                let offset = ctx.offset(name)?;
                self.out.load_const(Reg::ACC, Word::Num(offset));
                self.out.emit(Instr::Add {
                    d: Reg::ACC,
                    s: Reg::FP,
                    t: Reg::ACC,
                });
                Ok(())
            }
            // &*p is just p
            LValue::Deref(addr) => self.gen_expr(ctx, addr),
            LValue::Paren(inner) => self.gen_address(ctx, inner),
        }
    }

    /// Saves `$29` and `$31`, pushes the arguments so that argument `k` sits
    /// at `-4k` from the callee's frame pointer, then jumps.
    fn gen_call(&mut self, ctx: &ProcCtx, name: &str, args: &[Expr]) -> GenResult<()> {
        let callee = self
            .analysis
            .directory
            .find(name)
            .ok_or_else(|| InternalError(format!("call to unknown procedure '{name}'")))?;
        if callee.params.len() != args.len() {
            return Err(InternalError(format!("unchecked arity in call to '{name}'")));
        }

        self.out.comment(format!("call {name}"));
        self.out.push(Reg::FP);
        self.out.push(Reg::RA);
        for a in args {
            self.gen_expr(ctx, a)?;
            self.out.push(Reg::ACC);
        }
        if args.is_empty() {
            self.out.copy(Reg::FP, Reg::SP);
        } else {
            self.out
                .load_const(Reg::T1, Word::Num(WORD * args.len() as i32));
            self.out.emit(Instr::Add {
                d: Reg::FP,
                s: Reg::SP,
                t: Reg::T1,
            });
        }
        self.out.load_const(
            Reg::CALLEE,
            Word::Symbol(LabelAllocator::procedure(name).to_string()),
        );
        self.out.emit(Instr::Jalr(Reg::CALLEE));
        self.out.pop(Reg::RA);
        self.out.pop(Reg::FP);
        Ok(())
    }
}

/// Calls one of the imported runtime routines, preserving `$31`.
fn call_runtime(out: &mut Emitter, routine: Reg) {
    out.push(Reg::RA);
    out.emit(Instr::Jalr(routine));
    out.pop(Reg::RA);
}

fn strip_parens(lv: &LValue) -> &LValue {
    match lv {
        LValue::Paren(inner) => strip_parens(inner),
        other => other,
    }
}

fn unreachable_shape(what: &str) -> GenResult<()> {
    Err(InternalError(format!("unexpected {what}")))
}
