//! Instructions of the target register machine and their textual form.

use std::fmt;

use crate::labels::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u8);

/// Fixed register roles.
impl Reg {
    pub const ZERO: Reg = Reg(0);
    pub const ARG1: Reg = Reg(1); // wain's first argument, runtime argument
    pub const ARG2: Reg = Reg(2);
    pub const ACC: Reg = Reg(3); // value of the expression just evaluated
    pub const WORD: Reg = Reg(4); // holds 4
    pub const LEFT: Reg = Reg(5); // saved left operand
    pub const T1: Reg = Reg(6);
    pub const T2: Reg = Reg(7);
    pub const CALLEE: Reg = Reg(8);
    pub const ONE: Reg = Reg(11); // NULL and "true"
    pub const PRINT: Reg = Reg(15);
    pub const INIT: Reg = Reg(16);
    pub const NEW: Reg = Reg(17);
    pub const DELETE: Reg = Reg(18);
    pub const FP: Reg = Reg(29);
    pub const SP: Reg = Reg(30);
    pub const RA: Reg = Reg(31);
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Branch destination: a word offset from the next instruction, or a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Offset(i32),
    Label(Label),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Offset(n) => write!(f, "{n}"),
            Target::Label(l) => write!(f, "{l}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Add { d: Reg, s: Reg, t: Reg },
    Sub { d: Reg, s: Reg, t: Reg },
    Slt { d: Reg, s: Reg, t: Reg },
    Sltu { d: Reg, s: Reg, t: Reg },
    Mult { s: Reg, t: Reg },
    Div { s: Reg, t: Reg },
    Mfhi(Reg),
    Mflo(Reg),
    /// Loads the `.word` that follows into the register and skips it.
    Lis(Reg),
    Lw { t: Reg, offset: i32, s: Reg },
    Sw { t: Reg, offset: i32, s: Reg },
    Beq { s: Reg, t: Reg, target: Target },
    Bne { s: Reg, t: Reg, target: Target },
    Jr(Reg),
    Jalr(Reg),
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Add { d, s, t } => write!(f, "add {d}, {s}, {t}"),
            Instr::Sub { d, s, t } => write!(f, "sub {d}, {s}, {t}"),
            Instr::Slt { d, s, t } => write!(f, "slt {d}, {s}, {t}"),
            Instr::Sltu { d, s, t } => write!(f, "sltu {d}, {s}, {t}"),
            Instr::Mult { s, t } => write!(f, "mult {s}, {t}"),
            Instr::Div { s, t } => write!(f, "div {s}, {t}"),
            Instr::Mfhi(d) => write!(f, "mfhi {d}"),
            Instr::Mflo(d) => write!(f, "mflo {d}"),
            Instr::Lis(d) => write!(f, "lis {d}"),
            Instr::Lw { t, offset, s } => write!(f, "lw {t}, {offset}({s})"),
            Instr::Sw { t, offset, s } => write!(f, "sw {t}, {offset}({s})"),
            Instr::Beq { s, t, target } => write!(f, "beq {s}, {t}, {target}"),
            Instr::Bne { s, t, target } => write!(f, "bne {s}, {t}, {target}"),
            Instr::Jr(s) => write!(f, "jr {s}"),
            Instr::Jalr(s) => write!(f, "jalr {s}"),
        }
    }
}

/// Operand of a `.word` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Word {
    Num(i32),
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Import(&'static str),
    Word(Word),
    Label(Label),
    Comment(String),
    Blank,
    Instr(Instr),
}

impl Line {
    /// Whether the line occupies a word of the assembled program.
    pub fn occupies_word(&self) -> bool {
        matches!(self, Line::Word(_) | Line::Instr(_))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Import(sym) => write!(f, ".import {sym}"),
            Line::Word(Word::Num(n)) => write!(f, ".word {n}"),
            Line::Word(Word::Symbol(s)) => write!(f, ".word {s}"),
            Line::Label(l) => write!(f, "{l}:"),
            Line::Comment(c) => write!(f, "; {c}"),
            Line::Blank => Ok(()),
            Line::Instr(i) => write!(f, "{i}"),
        }
    }
}

/// A conditional branch whose target is not known yet. Tests produce one;
/// the enclosing `if` or `while` supplies the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub on_equal: bool,
    pub s: Reg,
    pub t: Reg,
}

impl Branch {
    /// The branch taken exactly when this one is not.
    pub fn inverted(self) -> Self {
        Self {
            on_equal: !self.on_equal,
            ..self
        }
    }

    pub fn to(self, target: Target) -> Instr {
        if self.on_equal {
            Instr::Beq {
                s: self.s,
                t: self.t,
                target,
            }
        } else {
            Instr::Bne {
                s: self.s,
                t: self.t,
                target,
            }
        }
    }
}

/// Append-only sink of output lines.
#[derive(Debug, Default)]
pub struct Emitter {
    lines: Vec<Line>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, i: Instr) {
        log::trace!("  {i}");
        self.lines.push(Line::Instr(i));
    }

    pub fn line(&mut self, l: Line) {
        self.lines.push(l);
    }

    pub fn comment(&mut self, c: impl Into<String>) {
        self.lines.push(Line::Comment(c.into()));
    }

    pub fn label(&mut self, l: &Label) {
        self.lines.push(Line::Label(l.clone()));
    }

    /// `lis d` followed by its `.word`.
    pub fn load_const(&mut self, d: Reg, w: Word) {
        self.emit(Instr::Lis(d));
        self.lines.push(Line::Word(w));
    }

    pub fn push(&mut self, r: Reg) {
        self.emit(Instr::Sw {
            t: r,
            offset: -4,
            s: Reg::SP,
        });
        self.emit(Instr::Sub {
            d: Reg::SP,
            s: Reg::SP,
            t: Reg::WORD,
        });
    }

    pub fn pop(&mut self, r: Reg) {
        self.emit(Instr::Add {
            d: Reg::SP,
            s: Reg::SP,
            t: Reg::WORD,
        });
        self.emit(Instr::Lw {
            t: r,
            offset: -4,
            s: Reg::SP,
        });
    }

    /// `d = s`
    pub fn copy(&mut self, d: Reg, s: Reg) {
        self.emit(Instr::Add { d, s, t: Reg::ZERO });
    }

    /// Appends everything another emitter collected.
    pub fn append(&mut self, other: Emitter) {
        self.lines.extend(other.lines);
    }

    /// Number of machine words emitted so far.
    pub fn words(&self) -> usize {
        self.lines.iter().filter(|l| l.occupies_word()).count()
    }

    pub fn finish(self) -> String {
        let mut out = String::new();
        for l in &self.lines {
            out.push_str(&l.to_string());
            out.push('\n');
        }
        out
    }
}
