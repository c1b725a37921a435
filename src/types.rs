use std::fmt;

/// The language has exactly two types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    IntPtr,
}

impl Type {
    pub fn is_pointer(self) -> bool {
        matches!(self, Type::IntPtr)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::IntPtr => f.write_str("int*"),
        }
    }
}

/// Result type of `a + b`, or `None` when the operands do not combine.
pub fn sum_type(a: Type, b: Type) -> Option<Type> {
    match (a, b) {
        (Type::Int, Type::Int) => Some(Type::Int),
        (Type::IntPtr, Type::Int) | (Type::Int, Type::IntPtr) => Some(Type::IntPtr),
        (Type::IntPtr, Type::IntPtr) => None,
    }
}

/// Result type of `a - b`. Pointer minus pointer is the element distance.
pub fn difference_type(a: Type, b: Type) -> Option<Type> {
    match (a, b) {
        (Type::Int, Type::Int) | (Type::IntPtr, Type::IntPtr) => Some(Type::Int),
        (Type::IntPtr, Type::Int) => Some(Type::IntPtr),
        (Type::Int, Type::IntPtr) => None,
    }
}

/// Result type of `*`, `/` and `%`.
pub fn product_type(a: Type, b: Type) -> Option<Type> {
    match (a, b) {
        (Type::Int, Type::Int) => Some(Type::Int),
        _ => None,
    }
}
