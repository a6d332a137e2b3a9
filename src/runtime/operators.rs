/// operators.rs
///
/// Semantics of the value operators. These live on the environment because
/// strings may be constants of any loaded unit, and because `+` on strings
/// allocates.

use std::borrow::Cow;

use crate::common::*;
use super::value::is_integral;

/// Shortest text of a number, used for concatenation and property keys.
/// Integral values have no fractional part, `-0` becomes `0`.
pub(crate) fn number_to_string(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() };
    }
    if value == 0.0 {
        return "0".to_owned();
    }
    format!("{}", value)
}

/// Printed form of a number: integral values as integers, others with six
/// decimals.
pub(crate) fn number_to_display(value: f64) -> String {
    if value.is_finite() && !is_integral(value) {
        format!("{:.6}", value)
    } else {
        number_to_string(value)
    }
}

/// ToInt32: truncation modulo 2^32, non-finite values become zero.
fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    (value.trunc() % 4294967296.0) as i64 as i32
}

impl Env {
    /// Text of any string value: a constant of a loaded unit, a heap string
    /// or a foreign string.
    pub fn string_of(&self, value: Value) -> Option<&str> {
        match value {
            Value::StaticStr(r) => self.units.get(r.unit as usize)?.program.string(r.index),
            Value::String(_) | Value::Foreign(_) => self.heap.string(value),
            _ => None,
        }
    }

    pub fn is_truthy(&self, value: Value) -> bool {
        match value {
            Value::Undefined | Value::NaN => false,
            Value::Boolean(b) => b,
            Value::Number(n) => n != 0.0,
            Value::StaticStr(_) | Value::String(_) | Value::Foreign(_) => {
                self.string_of(value).map_or(false, |s| !s.is_empty())
            },
            _ => true,
        }
    }

    /// Strict equality: no conversions, strings by content, heap values and
    /// functions by identity.
    pub fn strict_equals(&self, lhs: Value, rhs: Value) -> bool {
        match (lhs, rhs) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            _ if lhs.is_string() && rhs.is_string() => {
                match (self.string_of(lhs), self.string_of(rhs)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            },
            _ => match (lhs.heap_block(), rhs.heap_block()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Renders a value the way `print` shows it.
    pub fn display_value(&self, value: Value) -> String {
        match value {
            Value::Number(n) => number_to_display(n),
            Value::StaticStr(_) | Value::String(_) | Value::Foreign(_) => {
                format!("\"{}\"", self.string_of(value).unwrap_or(""))
            },
            _ => self.value_to_string(value),
        }
    }

    /// Text of a value when concatenated to a string.
    pub fn value_to_string(&self, value: Value) -> String {
        match value {
            Value::Undefined => "undefined".to_owned(),
            Value::NaN => "NaN".to_owned(),
            Value::Boolean(b) => if b { "true".to_owned() } else { "false".to_owned() },
            Value::Number(n) => number_to_string(n),
            Value::StaticStr(_) | Value::String(_) | Value::Foreign(_) => {
                self.string_of(value).unwrap_or("").to_owned()
            },
            Value::Object(_) | Value::Array(_) | Value::Cell(_) => "object".to_owned(),
            Value::Function(func) => format!("function:{}.{}", func.unit, func.index),
            Value::Closure(block) => match self.heap.closure_func(block) {
                Some(func) => format!("function:{}.{}", func.unit, func.index),
                None => "function".to_owned(),
            },
            Value::Native(id) => match self.natives.name(id) {
                Some(name) => format!("function:{}", name),
                None => "function".to_owned(),
            },
        }
    }

    pub(crate) fn unary(&self, op: OpCode, value: Value) -> ExecResult<Value> {
        match op {
            OpCode::Neg => Ok(match value {
                Value::Number(n) => Value::number(-n),
                _ => Value::NaN,
            }),
            OpCode::Not => Ok(Value::Boolean(!self.is_truthy(value))),
            OpCode::BitNot => Ok(match value {
                Value::Number(n) => Value::Number(!to_int32(n) as f64),
                _ => Value::NaN,
            }),
            _ => Err(ExecError::InvalidOpcode(op as u8)),
        }
    }

    /// Applies a binary operator. The operands stay owned by the caller, the
    /// result is owned by whoever receives it.
    pub(crate) fn binary(&mut self, op: OpCode, lhs: Value, rhs: Value) -> ExecResult<Value> {
        use OpCode::*;

        let result = match op {
            Add if lhs.is_string() || rhs.is_string() => {
                let mut text = self.value_to_string(lhs);
                text.push_str(&self.value_to_string(rhs));
                return self.heap.alloc_str(&text);
            },
            Eq => Value::Boolean(self.strict_equals(lhs, rhs)),
            Ne => Value::Boolean(!self.strict_equals(lhs, rhs)),
            Lt | Le | Gt | Ge => Value::Boolean(self.compare(op, lhs, rhs)),
            _ => {
                let (a, b) = match (lhs, rhs) {
                    (Value::Number(a), Value::Number(b)) => (a, b),
                    _ => return match op {
                        Add | Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | Shl | Shr => Ok(Value::NaN),
                        _ => Err(ExecError::InvalidOpcode(op as u8)),
                    },
                };
                match op {
                    Add => Value::number(a + b),
                    Sub => Value::number(a - b),
                    Mul => Value::number(a * b),
                    Div => if b == 0.0 { Value::NaN } else { Value::number(a / b) },
                    Mod => if b == 0.0 { Value::NaN } else { Value::number(a % b) },
                    BitAnd => Value::Number((to_int32(a) & to_int32(b)) as f64),
                    BitOr => Value::Number((to_int32(a) | to_int32(b)) as f64),
                    BitXor => Value::Number((to_int32(a) ^ to_int32(b)) as f64),
                    Shl => Value::Number(to_int32(a).wrapping_shl(to_int32(b) as u32 & 31) as f64),
                    Shr => Value::Number((to_int32(a) >> (to_int32(b) as u32 & 31)) as f64),
                    _ => return Err(ExecError::InvalidOpcode(op as u8)),
                }
            },
        };

        Ok(result)
    }

    /// Relational operators order numbers numerically and strings
    /// lexicographically. Every other combination compares false.
    fn compare(&self, op: OpCode, lhs: Value, rhs: Value) -> bool {
        use std::cmp::Ordering;

        let ordering = match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(&b),
            _ if lhs.is_string() && rhs.is_string() => {
                match (self.string_of(lhs), self.string_of(rhs)) {
                    (Some(a), Some(b)) => Some(a.cmp(b)),
                    _ => None,
                }
            },
            _ => None,
        };

        match (op, ordering) {
            (_, None) => false,
            (OpCode::Lt, Some(o)) => o == Ordering::Less,
            (OpCode::Le, Some(o)) => o != Ordering::Greater,
            (OpCode::Gt, Some(o)) => o == Ordering::Greater,
            (OpCode::Ge, Some(o)) => o != Ordering::Less,
            _ => false,
        }
    }

    /// Property name used to index an object.
    fn property_key(&self, key: Value) -> ExecResult<Cow<'_, str>> {
        match key {
            Value::Number(n) => Ok(Cow::Owned(number_to_string(n))),
            _ => match self.string_of(key) {
                Some(text) => Ok(Cow::Borrowed(text)),
                None => Err(ExecError::TypeMismatch),
            },
        }
    }

    /// Array index: a non-negative integer.
    fn element_index(key: Value) -> ExecResult<usize> {
        match key {
            Value::Number(n) if is_integral(n) && n >= 0.0 && n <= u32::MAX as f64 => Ok(n as usize),
            _ => Err(ExecError::InvalidIndex),
        }
    }

    /// Reads `subject[key]`. The result is retained for the caller.
    pub(crate) fn get_elem(&mut self, subject: Value, key: Value) -> ExecResult<Value> {
        let found = match subject {
            Value::Array(block) => {
                if key.is_string() {
                    if self.string_of(key) == Some("length") {
                        Value::Number(self.heap.array_len(block).unwrap_or(0) as f64)
                    } else {
                        Value::Undefined
                    }
                } else {
                    let index = Self::element_index(key)?;
                    self.heap.array_get(block, index).unwrap_or(Value::Undefined)
                }
            },
            Value::Object(block) => {
                let key = self.property_key(key)?;
                self.heap.object_get(block, &key).unwrap_or(Value::Undefined)
            },
            Value::StaticStr(_) | Value::String(_) | Value::Foreign(_) => {
                if key.is_string() {
                    return match self.string_of(key) {
                        Some("length") => {
                            let length = self.string_of(subject).map_or(0, |s| s.chars().count());
                            Ok(Value::Number(length as f64))
                        },
                        _ => Ok(Value::Undefined),
                    };
                }
                let index = Self::element_index(key)?;
                let found = self.string_of(subject).and_then(|s| s.chars().nth(index));
                return match found {
                    Some(c) => {
                        let mut buffer = [0u8; 4];
                        self.heap.alloc_str(c.encode_utf8(&mut buffer))
                    },
                    None => Ok(Value::Undefined),
                };
            },
            _ => return Err(ExecError::TypeMismatch),
        };

        Ok(self.heap.retain(found))
    }

    /// Performs `subject[key] = value`. The container takes its own
    /// reference to `value`.
    pub(crate) fn set_elem(&mut self, subject: Value, key: Value, value: Value) -> ExecResult<()> {
        match subject {
            Value::Array(block) => {
                let index = Self::element_index(key)?;
                let stored = self.heap.retain(value);
                self.heap.array_set(block, index, stored)
            },
            Value::Object(block) => {
                let key = self.property_key(key)?.into_owned();
                let stored = self.heap.retain(value);
                self.heap.object_set(block, &key, stored)
            },
            _ => Err(ExecError::TypeMismatch),
        }
    }
}
