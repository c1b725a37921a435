//! The symbol catalog: the procedure directory, per-procedure symbol tables
//! and the type recorded for every expression node.

use std::collections::BTreeMap;
use std::fmt;

use crate::ast::ExprId;
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct ProcedureInfo {
    pub name: String,
    pub params: Vec<(String, Type)>,
    // Params and locals share one flat namespace.
    symbols: BTreeMap<String, Type>,
}

impl ProcedureInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: vec![],
            symbols: BTreeMap::new(),
        }
    }

    /// Returns `false` if the name is already taken in this procedure.
    pub fn declare(&mut self, name: &str, ty: Type) -> bool {
        if self.symbols.contains_key(name) {
            return false;
        }
        self.symbols.insert(name.to_string(), ty);
        true
    }

    pub fn declare_param(&mut self, name: &str, ty: Type) -> bool {
        if !self.declare(name, ty) {
            return false;
        }
        self.params.push((name.to_string(), ty));
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Type> {
        self.symbols.get(name).copied()
    }

    pub fn param_types(&self) -> impl Iterator<Item = Type> + '_ {
        self.params.iter().map(|(_, t)| *t)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, Type)> {
        self.symbols.iter().map(|(n, t)| (n.as_str(), *t))
    }
}

/// Handle to an entry of the [`ProcedureDirectory`] that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcId(usize);

/// Append-only, insertion-ordered list of procedures.
#[derive(Debug, Clone, Default)]
pub struct ProcedureDirectory {
    procedures: Vec<ProcedureInfo>,
}

impl ProcedureDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn find(&self, name: &str) -> Option<&ProcedureInfo> {
        self.procedures.iter().find(|p| p.name == name)
    }

    /// Appends a procedure and returns its handle. The caller checks
    /// uniqueness.
    pub fn push(&mut self, info: ProcedureInfo) -> ProcId {
        self.procedures.push(info);
        ProcId(self.procedures.len() - 1)
    }

    // Entries are never removed, so a handle from `push` stays in range.
    pub fn procedure(&self, id: ProcId) -> &ProcedureInfo {
        &self.procedures[id.0]
    }

    pub fn procedure_mut(&mut self, id: ProcId) -> &mut ProcedureInfo {
        &mut self.procedures[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcedureInfo> {
        self.procedures.iter()
    }
}

/// One line per procedure with its parameter types, then its symbols in
/// name order; procedures are separated by a blank line.
impl fmt::Display for ProcedureDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            write!(f, "{}", p.name)?;
            for t in p.param_types() {
                write!(f, " {t}")?;
            }
            writeln!(f)?;
            for (name, t) in p.symbols() {
                writeln!(f, "{name} {t}")?;
            }
        }
        Ok(())
    }
}

/// The type inferred for each expression node, indexed by [`ExprId`].
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<Option<Type>>,
}

impl TypeTable {
    pub fn with_capacity(count: u32) -> Self {
        Self {
            types: vec![None; count as usize],
        }
    }

    pub fn record(&mut self, id: ExprId, ty: Type) {
        let i = id.0 as usize;
        if i >= self.types.len() {
            self.types.resize(i + 1, None);
        }
        self.types[i] = Some(ty);
    }

    pub fn get(&self, id: ExprId) -> Option<Type> {
        self.types.get(id.0 as usize).copied().flatten()
    }
}
