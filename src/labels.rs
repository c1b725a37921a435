use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct WhileLabels {
    pub top: Label,
    pub exit: Label,
}

#[derive(Debug, Clone)]
pub struct IfLabels {
    pub then_label: Label,
    pub else_label: Label,
    pub end: Label,
}

/// Hands out control-flow labels that are unique across the whole unit.
/// The counters are never reset between procedures.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    whiles: u32,
    ifs: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_while(&mut self) -> WhileLabels {
        let n = self.whiles;
        self.whiles += 1;
        WhileLabels {
            top: Label(format!("while{n}")),
            exit: Label(format!("endWhile{n}")),
        }
    }

    pub fn next_if(&mut self) -> IfLabels {
        let n = self.ifs;
        self.ifs += 1;
        IfLabels {
            then_label: Label(format!("if{n}")),
            else_label: Label(format!("else{n}")),
            end: Label(format!("endif{n}")),
        }
    }

    /// Entry label of a user procedure.
    pub fn procedure(name: &str) -> Label {
        Label(format!("F{name}"))
    }
}
