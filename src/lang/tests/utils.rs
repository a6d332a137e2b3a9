use crate::lang::{
    bytecode::{disassemble, OpCode},
    compile,
    image::{write_image, ImageHeader},
    input_source::*,
    CompileOptions, FunctionDef, Program,
};
use crate::runtime::{
    builtins::{is_builtin, OutputBuffer},
    config::EnvConfig,
    Env,
};

//------------------------------------------------------------------------------
// Interface for compiling
//------------------------------------------------------------------------------

pub(crate) struct Tester {
    test_name: String,
    source: String,
    config: EnvConfig,
}

impl Tester {
    /// Constructs a new tester with the default environment configuration
    pub(crate) fn new<S: ToString>(test_name: S) -> Self {
        Self{
            test_name: test_name.to_string(),
            source: String::new(),
            config: EnvConfig::default(),
        }
    }

    /// Utility for quick tests that use a single source and expect the
    /// compilation to succeed.
    pub(crate) fn new_single_source_expect_ok<T: ToString, S: ToString>(test_name: T, source: S) -> CompileOkTester {
        Self::new(test_name)
            .with_source(source)
            .compile()
            .expect_ok()
    }

    /// Utility for quick tests that use a single source and expect the
    /// compilation to fail.
    pub(crate) fn new_single_source_expect_err<T: ToString, S: ToString>(test_name: T, source: S) -> CompileErrTester {
        Self::new(test_name)
            .with_source(source)
            .compile()
            .expect_err()
    }

    pub(crate) fn with_source<S: ToString>(mut self, source: S) -> Self {
        self.source = source.to_string();
        self
    }

    pub(crate) fn with_compile_options(mut self, options: CompileOptions) -> Self {
        self.config.compile = options;
        self
    }

    pub(crate) fn with_config(mut self, config: EnvConfig) -> Self {
        self.config = config;
        self
    }

    /// Compiles against an environment that only knows the builtins
    pub(crate) fn compile(self) -> CompileTesterResult {
        let input_source = InputSource::from_str(&self.test_name, &self.source);
        match compile(&input_source, &self.config.compile, &is_builtin) {
            Ok(program) => CompileTesterResult::Ok(CompileOkTester{
                test_name: self.test_name, program, config: self.config,
            }),
            Err(error) => CompileTesterResult::Err(CompileErrTester{
                test_name: self.test_name, error,
            }),
        }
    }
}

pub(crate) enum CompileTesterResult {
    Ok(CompileOkTester),
    Err(CompileErrTester),
}

impl CompileTesterResult {
    pub(crate) fn expect_ok(self) -> CompileOkTester {
        match self {
            CompileTesterResult::Ok(v) => v,
            CompileTesterResult::Err(err) => {
                let wrapped = ErrorTester{ test_name: &err.test_name, error: &err.error };
                println!("DEBUG: Full error:\n{}", &err.error);
                assert!(
                    false,
                    "[{}] Expected compilation to succeed, but it failed with {}",
                    err.test_name, wrapped.assert_postfix()
                );
                unreachable!();
            }
        }
    }

    pub(crate) fn expect_err(self) -> CompileErrTester {
        match self {
            CompileTesterResult::Ok(ok) => {
                assert!(false, "[{}] Expected compilation to fail, but it succeeded", ok.test_name);
                unreachable!();
            },
            CompileTesterResult::Err(err) => err,
        }
    }
}

//------------------------------------------------------------------------------
// Interface for successful compilation
//------------------------------------------------------------------------------

pub(crate) struct CompileOkTester {
    test_name: String,
    program: Program,
    config: EnvConfig,
}

impl CompileOkTester {
    pub(crate) fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn assert_num_functions(self, num: usize) -> Self {
        assert_eq!(
            num, self.program.functions.len(),
            "[{}] Expected {} functions, but found {}",
            self.test_name, num, self.program.functions.len()
        );
        self
    }

    pub(crate) fn assert_has_string(self, text: &str) -> Self {
        assert!(
            self.program.strings.iter().any(|s| &**s == text),
            "[{}] Expected string constant '{}', constants are {:?}",
            self.test_name, text, self.program.strings
        );
        self
    }

    pub(crate) fn assert_num_numbers(self, num: usize) -> Self {
        assert_eq!(
            num, self.program.numbers.len(),
            "[{}] Expected {} number constants, but found {:?}",
            self.test_name, num, self.program.numbers
        );
        self
    }

    pub(crate) fn for_function<F: Fn(FunctionTester)>(self, index: usize, f: F) -> Self {
        match self.program.functions.get(index) {
            Some(def) => f(FunctionTester{ test_name: &self.test_name, index, def }),
            None => assert!(
                false, "[{}] Failed to find function {}, there are {}",
                self.test_name, index, self.program.functions.len()
            ),
        }
        self
    }

    /// Runs the compiled program in a fresh environment
    pub(crate) fn execute(self) -> ExecTester {
        let (mut env, output) = self.new_env();
        let result = env.execute_program(self.program.clone()).map_err(|e| e.code());
        ExecTester::new(self.test_name, &mut env, output, result)
    }

    /// Writes the program to an image and runs that in a fresh environment
    pub(crate) fn execute_via_image(self) -> ExecTester {
        let bytes = write_image(&self.program, ImageHeader::default())
            .unwrap_or_else(|e| panic!("[{}] Failed to write image: {}", self.test_name, e));
        let (mut env, output) = self.new_env();
        let result = env.execute_image(&bytes).map_err(|e| e.code());
        ExecTester::new(self.test_name, &mut env, output, result)
    }

    /// Runs the program directly and through an image, both must print
    /// `expected`.
    pub(crate) fn assert_output(self, expected: &str) -> Self {
        let direct = Self{ test_name: self.test_name.clone(), program: self.program.clone(), config: self.config.clone() };
        direct.execute().assert_ok().assert_output(expected);
        let via_image = Self{ test_name: self.test_name.clone(), program: self.program.clone(), config: self.config.clone() };
        via_image.execute_via_image().assert_ok().assert_output(expected);
        self
    }

    fn new_env(&self) -> (Env, OutputBuffer) {
        let mut env = Env::with_builtins(self.config.clone());
        let output = OutputBuffer::new();
        env.set_output(Box::new(output.clone()));
        (env, output)
    }
}

pub(crate) struct FunctionTester<'a> {
    test_name: &'a str,
    index: usize,
    def: &'a FunctionDef,
}

impl<'a> FunctionTester<'a> {
    pub(crate) fn assert_arg_count(self, num: u16) -> Self {
        assert_eq!(
            num, self.def.arg_count,
            "[{}] Expected {} arguments for {}", self.test_name, num, self.assert_postfix()
        );
        self
    }

    pub(crate) fn assert_var_count(self, num: u16) -> Self {
        assert_eq!(
            num, self.def.var_count,
            "[{}] Expected {} variables for {}", self.test_name, num, self.assert_postfix()
        );
        self
    }

    pub(crate) fn assert_stack_high(self, num: u16) -> Self {
        assert_eq!(
            num, self.def.stack_high,
            "[{}] Expected a stack high water mark of {} for {}", self.test_name, num, self.assert_postfix()
        );
        self
    }

    pub(crate) fn assert_is_closure(self, is_closure: bool) -> Self {
        assert_eq!(
            is_closure, self.def.is_closure,
            "[{}] Expected is_closure to be {} for {}", self.test_name, is_closure, self.assert_postfix()
        );
        self
    }

    pub(crate) fn assert_has_op(self, op: OpCode) -> Self {
        assert!(
            self.ops().contains(&op),
            "[{}] Expected to find '{}' in {}", self.test_name, op, self.assert_postfix()
        );
        self
    }

    pub(crate) fn assert_no_op(self, op: OpCode) -> Self {
        assert!(
            !self.ops().contains(&op),
            "[{}] Expected not to find '{}' in {}", self.test_name, op, self.assert_postfix()
        );
        self
    }

    fn ops(&self) -> Vec<OpCode> {
        disassemble(&self.def.code)
            .unwrap_or_else(|e| panic!("[{}] Undecodable code: {}", self.test_name, e))
            .into_iter()
            .map(|(_, inst)| inst.op)
            .collect()
    }

    fn assert_postfix(&self) -> String {
        let mut v = format!("Function{{ index: {}, code: [", self.index);
        if let Ok(instructions) = disassemble(&self.def.code) {
            for (idx, (pc, inst)) in instructions.iter().enumerate() {
                if idx != 0 {
                    v.push_str(", ");
                }
                v.push_str(&format!("{}: {}", pc, inst));
            }
        }
        v.push_str("] }");
        v
    }
}

//------------------------------------------------------------------------------
// Interface for execution
//------------------------------------------------------------------------------

pub(crate) struct ExecTester {
    test_name: String,
    output: String,
    // Printed form of the result, or the status code
    result: Result<String, i32>,
}

impl ExecTester {
    fn new(test_name: String, env: &mut Env, output: OutputBuffer, result: Result<crate::runtime::value::Value, i32>) -> Self {
        let result = result.map(|value| {
            let shown = env.display_value(value);
            env.release(value);
            shown
        });
        assert_eq!(env.stack_depth(), 0, "[{}] Value stack not empty after execution", test_name);
        Self{ test_name, output: output.take_string(), result }
    }

    pub(crate) fn assert_ok(self) -> Self {
        assert!(
            self.result.is_ok(),
            "[{}] Expected execution to succeed for {}", self.test_name, self.assert_postfix()
        );
        self
    }

    pub(crate) fn assert_output(self, expected: &str) -> Self {
        assert_eq!(
            expected, self.output,
            "[{}] Unexpected output for {}", self.test_name, self.assert_postfix()
        );
        self
    }

    /// Checks the printed form of the value of the last expression statement
    pub(crate) fn assert_result(self, expected: &str) -> Self {
        assert_eq!(
            Ok(expected), self.result.as_ref().map(|s| s.as_str()),
            "[{}] Unexpected result for {}", self.test_name, self.assert_postfix()
        );
        self
    }

    pub(crate) fn assert_code(self, code: i32) -> Self {
        assert_eq!(
            Err(code), self.result.as_ref().map(|_| ()).map_err(|c| *c),
            "[{}] Expected execution to fail with {} for {}", self.test_name, code, self.assert_postfix()
        );
        self
    }

    fn assert_postfix(&self) -> String {
        format!("Execution{{ result: {:?}, output: {:?} }}", self.result, self.output)
    }
}

//------------------------------------------------------------------------------
// Interface for failed compilation
//------------------------------------------------------------------------------

pub(crate) struct CompileErrTester {
    test_name: String,
    error: ParseError,
}

impl CompileErrTester {
    pub(crate) fn error<F: Fn(ErrorTester)>(&self, f: F) {
        let tester = ErrorTester{ test_name: &self.test_name, error: &self.error };
        f(tester)
    }

    pub(crate) fn assert_code(self, code: i32) -> Self {
        assert_eq!(
            code, self.error.code(),
            "[{}] Expected error code {} for {}", self.test_name, code,
            ErrorTester{ test_name: &self.test_name, error: &self.error }.assert_postfix()
        );
        self
    }
}

//------------------------------------------------------------------------------
// Utilities for failed compilation
//------------------------------------------------------------------------------

pub(crate) struct ErrorTester<'a> {
    test_name: &'a str,
    error: &'a ParseError,
}

impl<'a> ErrorTester<'a> {
    pub(crate) fn assert_num(self, num: usize) -> Self {
        assert_eq!(
            num, self.error.statements.len(),
            "[{}] expected error to consist of '{}' parts, but encountered '{}' for {}",
            self.test_name, num, self.error.statements.len(), self.assert_postfix()
        );

        self
    }

    pub(crate) fn assert_ctx_has(self, idx: usize, msg: &str) -> Self {
        assert!(
            self.error.statements[idx].context.contains(msg),
            "[{}] expected error statement {}'s context to contain '{}' for {}",
            self.test_name, idx, msg, self.assert_postfix()
        );

        self
    }

    pub(crate) fn assert_msg_has(self, idx: usize, msg: &str) -> Self {
        assert!(
            self.error.statements[idx].message.contains(msg),
            "[{}] expected error statement {}'s message to contain '{}' for {}",
            self.test_name, idx, msg, self.assert_postfix()
        );

        self
    }

    pub(crate) fn assert_line(self, line: u32) -> Self {
        assert_eq!(
            line, self.error.line(),
            "[{}] expected error at line {} for {}", self.test_name, line, self.assert_postfix()
        );

        self
    }

    /// Seeks the index of the pattern in the context message, then checks if
    /// the error's column corresponds to that index.
    pub(crate) fn assert_occurs_at(self, idx: usize, pattern: &str) -> Self {
        let pos = self.error.statements[idx].context.find(pattern);
        assert!(
            pos.is_some(),
            "[{}] incorrect occurs_at: '{}' could not be found in the context for {}",
            self.test_name, pattern, self.assert_postfix()
        );
        let pos = pos.unwrap();
        let col = self.error.statements[idx].start_column as usize;
        assert_eq!(
            pos + 1, col,
            "[{}] Expected error to occur at column {}, but found it at {} for {}",
            self.test_name, pos + 1, col, self.assert_postfix()
        );

        self
    }

    fn assert_postfix(&self) -> String {
        let mut v = String::new();
        v.push_str("error: [");
        for (idx, stmt) in self.error.statements.iter().enumerate() {
            if idx != 0 {
                v.push_str(", ");
            }

            v.push_str(&format!("{{ context: {}, message: {} }}", &stmt.context, stmt.message));
        }
        v.push(']');
        v
    }
}
