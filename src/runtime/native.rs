use std::collections::HashMap;

use super::error::ExecResult;
use super::value::{NativeId, Value};
use super::Env;

/// A host function callable from scripts. The arguments are borrowed for the
/// duration of the call only: a native that keeps one around must retain it.
/// The returned value is owned by the caller.
pub type NativeFn = fn(&mut Env, &[Value]) -> ExecResult<Value>;

#[derive(Clone, Copy)]
pub struct NativeEntry {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeEntry {
    pub fn new(name: &'static str, func: NativeFn) -> Self {
        Self{ name, func }
    }
}

/// Natives known to an environment, by name and by id. Registering a name
/// again replaces the function but keeps its id.
#[derive(Default)]
pub(crate) struct NativeRegistry {
    functions: Vec<(Box<str>, NativeFn)>,
    by_name: HashMap<Box<str>, NativeId>,
}

impl NativeRegistry {
    pub(crate) fn register(&mut self, name: &str, func: NativeFn) -> NativeId {
        if let Some(id) = self.by_name.get(name) {
            self.functions[id.0 as usize].1 = func;
            return *id;
        }

        let id = NativeId(self.functions.len() as u32);
        self.functions.push((name.into(), func));
        self.by_name.insert(name.into(), id);
        id
    }

    #[inline]
    pub(crate) fn get(&self, id: NativeId) -> Option<NativeFn> {
        self.functions.get(id.0 as usize).map(|(_, f)| *f)
    }

    pub(crate) fn name(&self, id: NativeId) -> Option<&str> {
        self.functions.get(id.0 as usize).map(|(n, _)| &**n)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<NativeId> {
        self.by_name.get(name).copied()
    }
}
