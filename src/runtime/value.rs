/// value.rs
///
/// Runtime values. A value is a small `Copy` type: heap values are handles
/// into the environment's pools, and copying a handle does not take a
/// reference. Whoever stores a copy somewhere (stack slot, array, global)
/// must retain it through the heap, and release it when overwritten or
/// dropped.

use super::heap::BlockRef;

/// A string in the constant pool of a loaded unit. These are never freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrRef {
    pub unit: u32,
    pub index: u16,
}

/// A script function: its index in the function table of a loaded unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRef {
    pub unit: u32,
    pub index: u16,
}

/// Index into the environment's native function registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Undefined,
    NaN,
    Boolean(bool),
    Number(f64),
    StaticStr(StrRef),
    String(BlockRef),
    // String owned by the host, see `Heap::alloc_foreign`
    Foreign(BlockRef),
    Object(BlockRef),
    Array(BlockRef),
    // A boxed variable shared between a function and its closures. Never
    // visible to scripts, classified as an object.
    Cell(BlockRef),
    Function(FuncRef),
    Closure(BlockRef),
    Native(NativeId),
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl Value {
    /// Numbers are normalized: a NaN result becomes `Value::NaN`.
    #[inline]
    pub fn number(value: f64) -> Value {
        if value.is_nan() { Value::NaN } else { Value::Number(value) }
    }

    #[inline]
    pub fn boolean(value: bool) -> Value {
        Value::Boolean(value)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::NaN)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::StaticStr(_) | Value::String(_) | Value::Foreign(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_) | Value::Cell(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Closure(_) | Value::Native(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Whether the value is a number without a fractional part. Printing
    /// relies on this to choose between integer and float formatting.
    pub fn is_integer(&self) -> bool {
        match self {
            Value::Number(v) => is_integral(*v),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Heap block the value holds a handle to, if any.
    pub fn heap_block(&self) -> Option<BlockRef> {
        match self {
            Value::String(b) | Value::Foreign(b) | Value::Object(b) |
            Value::Array(b) | Value::Cell(b) | Value::Closure(b) => Some(*b),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::NaN => "NaN",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::StaticStr(_) | Value::String(_) | Value::Foreign(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) | Value::Cell(_) => "object",
            Value::Function(_) | Value::Closure(_) | Value::Native(_) => "function",
        }
    }
}

pub(crate) fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0
}
