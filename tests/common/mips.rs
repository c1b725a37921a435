//! A small simulator of the target machine, enough to run generated code.
//!
//! Code is loaded at address 0. Imported runtime routines live at fixed
//! addresses outside the code; jumping to one runs its effect and returns
//! through `$31`. `wain` returns to a sentinel address, which stops the run.

use std::collections::HashMap;

const STACK_TOP: u32 = 0x0100_0000;
const ARRAY_BASE: u32 = 0x0020_0000;
const HEAP_BASE: u32 = 0x0040_0000;
const EXIT: u32 = 0x7fff_fff0;
const RUNTIME: [(&str, u32); 4] = [
    ("print", 0x7fff_0000),
    ("init", 0x7fff_0010),
    ("new", 0x7fff_0020),
    ("delete", 0x7fff_0030),
];
const STEP_LIMIT: u64 = 5_000_000;

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(usize, usize, usize),
    Sub(usize, usize, usize),
    Slt(usize, usize, usize),
    Sltu(usize, usize, usize),
    Mult(usize, usize),
    Multu(usize, usize),
    Div(usize, usize),
    Divu(usize, usize),
    Mfhi(usize),
    Mflo(usize),
    Lis(usize),
    Lw(usize, i32, usize),
    Sw(usize, i32, usize),
    Beq(usize, usize, i32),
    Bne(usize, usize, i32),
    Jr(usize),
    Jalr(usize),
    Data(i32),
}

/// What a finished run left behind.
#[derive(Debug, Default)]
pub struct Outcome {
    /// One line per `print` call.
    pub output: String,
    /// `$3` when `wain` returned.
    pub result: i32,
    /// Length passed to `init` in `$2`.
    pub init_len: i32,
    /// Addresses handed out by `new`.
    pub allocations: Vec<i32>,
    /// Addresses passed to `delete`.
    pub deleted: Vec<i32>,
    /// The input array as `wain` left it.
    pub array: Vec<i32>,
    pub steps: u64,
}

enum Pending {
    Op(Op),
    Word(String),
    Branch { eq: bool, s: usize, t: usize, target: String },
}

fn reg(tok: &str) -> Result<usize, String> {
    let n: usize = tok
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| format!("expected a register, found {tok:?}"))?
        .parse()
        .map_err(|_| format!("bad register {tok:?}"))?;
    if n > 31 {
        return Err(format!("no such register {tok:?}"));
    }
    Ok(n)
}

/// `-4($29)` → (-4, 29)
fn mem_operand(tok: &str) -> Result<(i32, usize), String> {
    let open = tok.find('(').ok_or_else(|| format!("bad memory operand {tok:?}"))?;
    let offset = tok[..open]
        .trim()
        .parse()
        .map_err(|_| format!("bad offset in {tok:?}"))?;
    let r = reg(tok[open + 1..].trim_end_matches(')'))?;
    Ok((offset, r))
}

fn parse_line(line: &str) -> Result<Pending, String> {
    let (op, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let args: Vec<&str> = rest.split(',').map(str::trim).filter(|a| !a.is_empty()).collect();
    let want = |n: usize| -> Result<(), String> {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("{op} takes {n} operands: {line:?}"))
        }
    };
    let three = |f: fn(usize, usize, usize) -> Op| -> Result<Pending, String> {
        want(3)?;
        Ok(Pending::Op(f(reg(args[0])?, reg(args[1])?, reg(args[2])?)))
    };
    let two = |f: fn(usize, usize) -> Op| -> Result<Pending, String> {
        want(2)?;
        Ok(Pending::Op(f(reg(args[0])?, reg(args[1])?)))
    };
    let one = |f: fn(usize) -> Op| -> Result<Pending, String> {
        want(1)?;
        Ok(Pending::Op(f(reg(args[0])?)))
    };
    match op {
        ".word" => {
            want(1)?;
            Ok(Pending::Word(args[0].to_string()))
        }
        "add" => three(Op::Add),
        "sub" => three(Op::Sub),
        "slt" => three(Op::Slt),
        "sltu" => three(Op::Sltu),
        "mult" => two(Op::Mult),
        "multu" => two(Op::Multu),
        "div" => two(Op::Div),
        "divu" => two(Op::Divu),
        "mfhi" => one(Op::Mfhi),
        "mflo" => one(Op::Mflo),
        "lis" => one(Op::Lis),
        "jr" => one(Op::Jr),
        "jalr" => one(Op::Jalr),
        "lw" | "sw" => {
            want(2)?;
            let t = reg(args[0])?;
            let (offset, s) = mem_operand(args[1])?;
            Ok(Pending::Op(if op == "lw" {
                Op::Lw(t, offset, s)
            } else {
                Op::Sw(t, offset, s)
            }))
        }
        "beq" | "bne" => {
            want(3)?;
            Ok(Pending::Branch {
                eq: op == "beq",
                s: reg(args[0])?,
                t: reg(args[1])?,
                target: args[2].to_string(),
            })
        }
        other => Err(format!("unknown mnemonic {other:?}")),
    }
}

/// Two passes: collect label addresses, then resolve every reference.
fn assemble(asm: &str) -> Result<Vec<Op>, String> {
    let mut labels: HashMap<String, u32> = HashMap::new();
    let mut imports: HashMap<String, u32> = HashMap::new();
    let mut pending = vec![];

    for raw in asm.lines() {
        let mut line = raw.split(';').next().unwrap_or("").trim();
        if let Some(sym) = line.strip_prefix(".import") {
            let sym = sym.trim();
            let addr = RUNTIME
                .iter()
                .find(|(name, _)| *name == sym)
                .map(|(_, a)| *a)
                .ok_or_else(|| format!("unknown import {sym:?}"))?;
            imports.insert(sym.to_string(), addr);
            continue;
        }
        while let Some((label, rest)) = line.split_once(':') {
            let label = label.trim();
            let addr = pending.len() as u32 * 4;
            if labels.insert(label.to_string(), addr).is_some() {
                return Err(format!("label {label:?} defined twice"));
            }
            line = rest.trim();
        }
        if line.is_empty() {
            continue;
        }
        pending.push(parse_line(line)?);
    }

    let resolve = |sym: &str| -> Result<u32, String> {
        labels
            .get(sym)
            .or_else(|| imports.get(sym))
            .copied()
            .ok_or_else(|| format!("undefined symbol {sym:?}"))
    };

    pending
        .into_iter()
        .enumerate()
        .map(|(i, p)| match p {
            Pending::Op(op) => Ok(op),
            Pending::Word(w) => match w.parse::<i64>() {
                Ok(n) => Ok(Op::Data(n as i32)),
                Err(_) => Ok(Op::Data(resolve(&w)? as i32)),
            },
            Pending::Branch { eq, s, t, target } => {
                let offset = match target.parse::<i32>() {
                    Ok(n) => n,
                    Err(_) => {
                        let dest = resolve(&target)? as i64;
                        ((dest - (i as i64 + 1) * 4) / 4) as i32
                    }
                };
                Ok(if eq {
                    Op::Beq(s, t, offset)
                } else {
                    Op::Bne(s, t, offset)
                })
            }
        })
        .collect()
}

pub struct Machine {
    code: Vec<Op>,
    regs: [i32; 32],
    hi: i32,
    lo: i32,
    pc: u32,
    memory: HashMap<u32, i32>,
    heap_next: u32,
    heap_limit: u32,
    outcome: Outcome,
}

impl Machine {
    pub fn new(asm: &str) -> Result<Self, String> {
        let mut regs = [0; 32];
        regs[30] = STACK_TOP as i32;
        regs[31] = EXIT as i32;
        Ok(Self {
            code: assemble(asm)?,
            regs,
            hi: 0,
            lo: 0,
            pc: 0,
            memory: HashMap::new(),
            heap_next: HEAP_BASE,
            heap_limit: HEAP_BASE + 0x10_0000,
            outcome: Outcome::default(),
        })
    }

    /// Caps the heap so that `new` can be made to fail.
    pub fn with_heap_words(mut self, words: u32) -> Self {
        self.heap_limit = HEAP_BASE + words * 4;
        self
    }

    fn load(&self, addr: u32) -> Result<i32, String> {
        if addr % 4 != 0 {
            return Err(format!("unaligned load from {addr:#x}"));
        }
        Ok(self.memory.get(&addr).copied().unwrap_or(0))
    }

    fn store(&mut self, addr: u32, value: i32) -> Result<(), String> {
        if addr % 4 != 0 {
            return Err(format!("unaligned store to {addr:#x}"));
        }
        if (addr as usize) < self.code.len() * 4 {
            return Err(format!("store into code at {addr:#x}"));
        }
        self.memory.insert(addr, value);
        Ok(())
    }

    fn runtime(&mut self, name: &str) -> Result<(), String> {
        match name {
            "print" => {
                let v = self.regs[1];
                self.outcome.output.push_str(&format!("{v}\n"));
            }
            "init" => {
                self.outcome.init_len = self.regs[2];
            }
            "new" => {
                let n = self.regs[1];
                let bytes = (n.max(0) as u32).saturating_mul(4);
                if n <= 0 || self.heap_next.saturating_add(bytes) > self.heap_limit {
                    self.regs[3] = 0;
                } else {
                    let addr = self.heap_next;
                    self.heap_next += bytes;
                    self.regs[3] = addr as i32;
                    self.outcome.allocations.push(addr as i32);
                }
            }
            "delete" => {
                let p = self.regs[1];
                if !self.outcome.allocations.contains(&p) {
                    return Err(format!("delete of {p:#x}, which new never returned"));
                }
                self.outcome.deleted.push(p);
            }
            other => return Err(format!("no runtime routine {other}")),
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), String> {
        loop {
            if self.pc == EXIT {
                break;
            }
            self.outcome.steps += 1;
            if self.outcome.steps > STEP_LIMIT {
                return Err("step limit exceeded".into());
            }
            if let Some((name, _)) = RUNTIME.iter().find(|(_, a)| *a == self.pc) {
                self.runtime(name)?;
                self.pc = self.regs[31] as u32;
                continue;
            }
            let op = *self
                .code
                .get((self.pc / 4) as usize)
                .ok_or_else(|| format!("pc {:#x} is outside the program", self.pc))?;
            if self.pc % 4 != 0 {
                return Err(format!("unaligned pc {:#x}", self.pc));
            }
            self.pc += 4;
            let r = self.regs;
            match op {
                Op::Add(d, s, t) => self.regs[d] = r[s].wrapping_add(r[t]),
                Op::Sub(d, s, t) => self.regs[d] = r[s].wrapping_sub(r[t]),
                Op::Slt(d, s, t) => self.regs[d] = (r[s] < r[t]) as i32,
                Op::Sltu(d, s, t) => self.regs[d] = ((r[s] as u32) < (r[t] as u32)) as i32,
                Op::Mult(s, t) => {
                    let p = r[s] as i64 * r[t] as i64;
                    self.lo = p as i32;
                    self.hi = (p >> 32) as i32;
                }
                Op::Multu(s, t) => {
                    let p = r[s] as u32 as u64 * r[t] as u32 as u64;
                    self.lo = p as i32;
                    self.hi = (p >> 32) as i32;
                }
                Op::Div(s, t) => {
                    if r[t] == 0 {
                        return Err("division by zero".into());
                    }
                    self.lo = r[s].wrapping_div(r[t]);
                    self.hi = r[s].wrapping_rem(r[t]);
                }
                Op::Divu(s, t) => {
                    if r[t] == 0 {
                        return Err("division by zero".into());
                    }
                    self.lo = ((r[s] as u32) / (r[t] as u32)) as i32;
                    self.hi = ((r[s] as u32) % (r[t] as u32)) as i32;
                }
                Op::Mfhi(d) => self.regs[d] = self.hi,
                Op::Mflo(d) => self.regs[d] = self.lo,
                Op::Lis(d) => {
                    let word = self
                        .code
                        .get((self.pc / 4) as usize)
                        .ok_or("lis at the end of the program")?;
                    let Op::Data(v) = *word else {
                        return Err(format!("lis at {:#x} is not followed by .word", self.pc - 4));
                    };
                    self.regs[d] = v;
                    self.pc += 4;
                }
                Op::Lw(t, i, s) => self.regs[t] = self.load((r[s].wrapping_add(i)) as u32)?,
                Op::Sw(t, i, s) => self.store((r[s].wrapping_add(i)) as u32, r[t])?,
                Op::Beq(s, t, i) => {
                    if r[s] == r[t] {
                        self.pc = (self.pc as i64 + i as i64 * 4) as u32;
                    }
                }
                Op::Bne(s, t, i) => {
                    if r[s] != r[t] {
                        self.pc = (self.pc as i64 + i as i64 * 4) as u32;
                    }
                }
                Op::Jr(s) => self.pc = r[s] as u32,
                Op::Jalr(s) => {
                    self.regs[31] = self.pc as i32;
                    self.pc = r[s] as u32;
                }
                Op::Data(v) => {
                    return Err(format!("executed data word {v} at {:#x}", self.pc - 4))
                }
            }
            self.regs[0] = 0;
        }
        if self.regs[30] != STACK_TOP as i32 {
            return Err(format!(
                "stack pointer not restored: {:#x}",
                self.regs[30] as u32
            ));
        }
        self.outcome.result = self.regs[3];
        Ok(())
    }

    /// Runs `wain(a, b)` for a program whose parameters are both `int`.
    pub fn run_twoints(mut self, a: i32, b: i32) -> Result<Outcome, String> {
        self.regs[1] = a;
        self.regs[2] = b;
        self.run()?;
        Ok(self.outcome)
    }

    /// Runs `wain(array, len)` for a program taking `int*, int`.
    pub fn run_array(mut self, values: &[i32]) -> Result<Outcome, String> {
        for (i, v) in values.iter().enumerate() {
            self.memory.insert(ARRAY_BASE + 4 * i as u32, *v);
        }
        self.regs[1] = ARRAY_BASE as i32;
        self.regs[2] = values.len() as i32;
        self.run()?;
        self.outcome.array = (0..values.len())
            .map(|i| self.memory.get(&(ARRAY_BASE + 4 * i as u32)).copied().unwrap_or(0))
            .collect();
        Ok(self.outcome)
    }
}

pub fn run_twoints(asm: &str, a: i32, b: i32) -> Outcome {
    Machine::new(asm)
        .and_then(|m| m.run_twoints(a, b))
        .unwrap_or_else(|e| panic!("simulation failed: {e}\n{asm}"))
}

pub fn run_array(asm: &str, values: &[i32]) -> Outcome {
    Machine::new(asm)
        .and_then(|m| m.run_array(values))
        .unwrap_or_else(|e| panic!("simulation failed: {e}\n{asm}"))
}
