/// symbol_table.rs
///
/// Name resolution while compiling. There is one scope per function being
/// compiled, nested functions pushing a new one. Variables are function
/// scoped. A name resolves to a local slot of the innermost function, to an
/// upvalue when it is a local of an enclosing function, or otherwise to a
/// global. The top level function has no named locals: variables declared
/// there are globals.

/// Where a name lives, as seen from the function currently being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    Local(u16),
    Upvalue(u16),
    Global,
}

/// How a closure obtains one of its captured cells when it is created inside
/// its parent function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpvalueSource {
    ParentLocal(u16),
    ParentUpvalue(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SymbolError {
    TooManyLocals,
    TooManyUpvalues,
    DuplicateParameter,
}

pub(crate) struct FunctionScope<'a> {
    pub(crate) locals: Vec<&'a [u8]>,
    pub(crate) captured: Vec<bool>,
    pub(crate) upvalues: Vec<(&'a [u8], UpvalueSource)>,
    pub(crate) arg_count: u16,
}

impl<'a> FunctionScope<'a> {
    fn new() -> Self {
        Self{ locals: Vec::new(), captured: Vec::new(), upvalues: Vec::new(), arg_count: 0 }
    }

    fn find_local(&self, name: &[u8]) -> Option<u16> {
        self.locals.iter().position(|v| *v == name).map(|idx| idx as u16)
    }
}

pub(crate) struct SymbolTable<'a> {
    scopes: Vec<FunctionScope<'a>>,
    max_locals: usize,
}

impl<'a> SymbolTable<'a> {
    /// Creates the table with the scope of the top level function. Its only
    /// slot is an unnamed one holding the value of the last expression
    /// statement.
    pub(crate) fn new(max_locals: usize) -> Self {
        let mut top_level = FunctionScope::new();
        top_level.locals.push(b"");
        top_level.captured.push(false);
        Self{ scopes: vec![top_level], max_locals }
    }

    #[inline]
    pub(crate) fn is_top_level(&self) -> bool {
        self.scopes.len() == 1
    }

    pub(crate) fn push_function(&mut self) {
        self.scopes.push(FunctionScope::new());
    }

    pub(crate) fn pop_function(&mut self) -> FunctionScope<'a> {
        debug_assert!(self.scopes.len() > 1, "popping the top level scope");
        if self.scopes.len() == 1 {
            return FunctionScope::new();
        }
        let idx = self.scopes.len() - 1;
        self.scopes.remove(idx)
    }

    /// Declares a parameter of the current function. Must be called before
    /// any local of that function is declared.
    pub(crate) fn declare_parameter(&mut self, name: &'a [u8]) -> Result<u16, SymbolError> {
        let scope_idx = self.scopes.len() - 1;
        if self.scopes[scope_idx].find_local(name).is_some() {
            return Err(SymbolError::DuplicateParameter);
        }
        let slot = self.declare_local(name)?;
        self.scopes[scope_idx].arg_count += 1;
        Ok(slot)
    }

    /// Declares a local in the current function, returning its slot. Repeated
    /// declarations of the same name share the slot.
    pub(crate) fn declare_local(&mut self, name: &'a [u8]) -> Result<u16, SymbolError> {
        let max_locals = self.max_locals;
        let scope_idx = self.scopes.len() - 1;
        let scope = &mut self.scopes[scope_idx];
        if let Some(slot) = scope.find_local(name) {
            return Ok(slot);
        }

        if scope.locals.len() >= max_locals || scope.locals.len() >= u16::MAX as usize {
            return Err(SymbolError::TooManyLocals);
        }
        scope.locals.push(name);
        scope.captured.push(false);
        Ok((scope.locals.len() - 1) as u16)
    }

    pub(crate) fn resolve(&mut self, name: &'a [u8]) -> Result<Resolved, SymbolError> {
        let scope_idx = self.scopes.len() - 1;
        if scope_idx == 0 {
            return Ok(Resolved::Global);
        }

        if let Some(slot) = self.scopes[scope_idx].find_local(name) {
            return Ok(Resolved::Local(slot));
        }

        match self.resolve_upvalue(scope_idx, name)? {
            Some(idx) => Ok(Resolved::Upvalue(idx)),
            None => Ok(Resolved::Global),
        }
    }

    fn resolve_upvalue(&mut self, scope_idx: usize, name: &'a [u8]) -> Result<Option<u16>, SymbolError> {
        // Locals of the top level function are never captured
        if scope_idx <= 1 {
            return Ok(None);
        }

        let parent_idx = scope_idx - 1;
        if let Some(slot) = self.scopes[parent_idx].find_local(name) {
            self.scopes[parent_idx].captured[slot as usize] = true;
            return self.add_upvalue(scope_idx, name, UpvalueSource::ParentLocal(slot)).map(Some);
        }

        match self.resolve_upvalue(parent_idx, name)? {
            Some(parent_upvalue) => {
                self.add_upvalue(scope_idx, name, UpvalueSource::ParentUpvalue(parent_upvalue)).map(Some)
            },
            None => Ok(None),
        }
    }

    fn add_upvalue(&mut self, scope_idx: usize, name: &'a [u8], source: UpvalueSource) -> Result<u16, SymbolError> {
        let max_locals = self.max_locals;
        let scope = &mut self.scopes[scope_idx];
        if let Some(idx) = scope.upvalues.iter().position(|(_, s)| *s == source) {
            return Ok(idx as u16);
        }

        if scope.upvalues.len() >= max_locals {
            return Err(SymbolError::TooManyUpvalues);
        }
        scope.upvalues.push((name, source));
        Ok((scope.upvalues.len() - 1) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_names_are_global() {
        let mut table = SymbolTable::new(8);
        assert!(table.is_top_level());
        assert_eq!(table.resolve(b"x"), Ok(Resolved::Global));
        assert_eq!(table.resolve(b""), Ok(Resolved::Global));
    }

    #[test]
    fn test_locals_share_slots_per_function() {
        let mut table = SymbolTable::new(8);
        table.push_function();
        assert_eq!(table.declare_parameter(b"a"), Ok(0));
        assert_eq!(table.declare_local(b"b"), Ok(1));
        assert_eq!(table.declare_local(b"a"), Ok(0));
        assert_eq!(table.declare_parameter(b"b"), Err(SymbolError::DuplicateParameter));
        assert_eq!(table.resolve(b"b"), Ok(Resolved::Local(1)));
        assert_eq!(table.pop_function().arg_count, 1);
    }

    #[test]
    fn test_nested_capture_chains_upvalues() {
        let mut table = SymbolTable::new(8);
        table.push_function();
        table.declare_local(b"x").unwrap();
        table.push_function();
        table.push_function();

        // Innermost refers to x twice, the middle function relays it
        assert_eq!(table.resolve(b"x"), Ok(Resolved::Upvalue(0)));
        assert_eq!(table.resolve(b"x"), Ok(Resolved::Upvalue(0)));
        let inner = table.pop_function();
        assert_eq!(inner.upvalues[0].1, UpvalueSource::ParentUpvalue(0));

        let middle = table.pop_function();
        assert_eq!(middle.upvalues[0].1, UpvalueSource::ParentLocal(0));
        assert!(table.pop_function().captured[0]);
    }

    #[test]
    fn test_local_limit() {
        let mut table = SymbolTable::new(2);
        table.push_function();
        table.declare_local(b"a").unwrap();
        table.declare_local(b"b").unwrap();
        assert_eq!(table.declare_local(b"c"), Err(SymbolError::TooManyLocals));
    }
}
