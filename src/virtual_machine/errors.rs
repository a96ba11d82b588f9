use equity_derive::Error;

/// Errors that can occur during VM execution, assembly or disassembly.
#[derive(Debug, Error)]
pub enum VMError {
    // ==================== Decoding / assembly ====================
    /// Opcode that is not part of the instruction table.
    #[error("invalid instruction 0x{opcode:02x} at offset {offset}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Unrecognized mnemonic during assembly.
    #[error("invalid instruction name: {name}")]
    InvalidInstructionName { name: String },
    /// Bytecode ended while reading an instruction's operands.
    #[error("unexpected end of bytecode at {ip}: needed {requested} bytes, {available} available")]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// Malformed token in assembly source.
    #[error("line {line}:{offset}: {message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: String,
    },
    /// Assembly error with line and column context.
    #[error("line {line}:{offset}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// Label defined more than once.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Reference to undefined label.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    /// File I/O error.
    #[error("io error: {0}")]
    IoError(String),

    // ==================== Execution ====================
    /// Pop or peek on an empty or too shallow data stack.
    #[error("data stack underflow")]
    DataStackUnderflow,
    /// Pop from an empty alt stack.
    #[error("alt stack underflow")]
    AltStackUnderflow,
    /// Operand has the wrong shape (oversized number, bad length, negative count).
    #[error("bad value: {reason}")]
    BadValue { reason: String },
    /// Arithmetic result does not fit an unsigned 256-bit integer.
    #[error("range error in {op}")]
    RangeError { op: &'static str },
    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Modulo by zero.
    #[error("modulo by zero")]
    ModuloByZero,
    /// Gas budget exhausted.
    #[error("run limit exceeded: needed {needed}, {available} left")]
    RunLimitExceeded { needed: u64, available: u64 },
    /// Introspection opcode without the matching context field.
    #[error("missing context field: {field}")]
    ContextMissing { field: &'static str },
    /// Expansion opcode under a transaction version that reserves them.
    #[error("disallowed opcode {mnemonic}")]
    DisallowedOpcode { mnemonic: String },
    /// Jump to an offset outside the program.
    #[error("invalid jump target {target}")]
    InvalidJumpTarget { target: u32 },
    /// `FAIL` executed.
    #[error("FAIL executed")]
    Fail,
    /// `VERIFY` (or a `*VERIFY` opcode) popped a false value.
    #[error("VERIFY failed")]
    VerifyFailed,
    /// Context declares a VM version this interpreter does not run.
    #[error("unsupported VM version {version}")]
    UnsupportedVM { version: u64 },
    /// Program completed with an empty stack or a false top item.
    #[error("false VM result")]
    FalseResult,
    /// The instance already stopped on an error.
    #[error("virtual machine faulted by an earlier error")]
    Faulted,
    /// Transaction-level gas accounting failure.
    #[error("gas calculation: {reason}")]
    GasCalculation { reason: String },
    /// Context callback failure.
    #[error("context callback failed: {reason}")]
    Callback { reason: String },
    /// First error of a run, with the program and arguments that produced it.
    #[error("{source}; program: [{disassembly}]; args: [{args}]")]
    Execution {
        #[source]
        source: Box<VMError>,
        disassembly: String,
        args: String,
    },
}

impl VMError {
    /// Builds a [`VMError::BadValue`].
    pub(crate) fn bad_value(reason: impl Into<String>) -> Self {
        VMError::BadValue {
            reason: reason.into(),
        }
    }

    /// Returns the innermost error, looking through [`VMError::Execution`].
    pub fn root(&self) -> &VMError {
        match self {
            VMError::Execution { source, .. } => source.root(),
            other => other,
        }
    }
}
