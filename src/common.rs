///////////////////// PRELUDE /////////////////////

pub(crate) use crate::lang::{
    bytecode::OpCode,
    input_source::{InputSource, ParseError},
    Program,
};
pub(crate) use crate::runtime::{
    error::{ExecError, ExecResult},
    heap::{BlockRef, Heap},
    value::{FuncRef, NativeId, StrRef, Value},
    Env,
};

pub(crate) use core::fmt::{Debug, Formatter};
pub(crate) use std::{
    collections::HashMap,
    rc::Rc,
};
