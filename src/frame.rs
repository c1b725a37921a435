use std::collections::HashMap;

use crate::ast::Procedure;
use crate::error::InternalError;
use crate::types::Type;

/// Bytes per machine word; every slot is one word regardless of type.
pub const WORD: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEntry {
    pub name: String,
    pub ty: Type,
    pub offset: i32,
}

/// Stack offsets, relative to the frame pointer, of one procedure's
/// parameters and locals. Offsets start at -4 and step down by one word in
/// declaration order.
#[derive(Debug, Clone)]
pub struct FrameLayout {
    entries: Vec<FrameEntry>,
    index: HashMap<String, usize>,
    next_offset: i32,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLayout {
    pub fn new() -> Self {
        Self {
            entries: vec![],
            index: HashMap::new(),
            next_offset: -WORD,
        }
    }

    /// Layout of `p`: parameters first, then locals. Fails if two of them
    /// share a name.
    pub fn for_procedure(p: &Procedure) -> Result<Self, InternalError> {
        let mut frame = Self::new();
        let names = p
            .params
            .iter()
            .map(|prm| (&prm.name, prm.ty))
            .chain(p.dcls.iter().map(|d| (&d.dcl.name, d.dcl.ty)));
        for (name, ty) in names {
            if frame.allocate(name, ty).is_none() {
                return Err(InternalError(format!(
                    "'{name}' is declared twice in the frame of '{}'",
                    p.name
                )));
            }
        }
        Ok(frame)
    }

    /// Assigns the next slot to `name` and returns its offset, or `None` if
    /// the name already has a slot.
    pub fn allocate(&mut self, name: &str, ty: Type) -> Option<i32> {
        if self.index.contains_key(name) {
            return None;
        }
        let offset = self.next_offset;
        self.next_offset -= WORD;
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(FrameEntry {
            name: name.to_string(),
            ty,
            offset,
        });
        Some(offset)
    }

    pub fn offset(&self, name: &str) -> Option<i32> {
        self.index.get(name).map(|&i| self.entries[i].offset)
    }

    pub fn entries(&self) -> &[FrameEntry] {
        &self.entries
    }

    /// Bytes occupied by all slots.
    pub fn size(&self) -> i32 {
        self.entries.len() as i32 * WORD
    }
}
