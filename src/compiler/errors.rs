use equity_derive::Error;
use std::fmt;

/// Location in contract source. Lines and columns are 1-based.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Errors raised while compiling or instantiating a contract.
#[derive(Debug, Error)]
pub enum CompileError {
    // ==================== Source ====================
    /// Bad token, unterminated string or bad escape.
    #[error("{pos}: {message}")]
    Lex { pos: Position, message: String },
    /// Unexpected structure.
    #[error("{pos}: {message}")]
    Parse { pos: Position, message: String },
    /// The file's version pragma excludes this compiler.
    #[error("compiler version {version} does not satisfy pragma \"{required}\"")]
    Pragma { required: String, version: String },
    /// Unparseable version constraint.
    #[error("invalid version constraint \"{required}\": {reason}")]
    BadPragma { required: String, reason: String },
    /// An import could not be read.
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },
    /// A file imports itself, directly or through others.
    #[error("import cycle through {path}")]
    ImportCycle { path: String },
    /// `import` in source compiled without a file to resolve it against.
    #[error("import \"{path}\" needs a source file to resolve against")]
    UnresolvedImport { path: String },

    // ==================== Environment ====================
    #[error("\"{name}\" is already defined")]
    DuplicateName { name: String },
    #[error("undefined reference \"{name}\"")]
    UndefinedName { name: String },
    #[error("unknown type \"{name}\"")]
    UnknownType { name: String },
    #[error("\"{name}\" is a {role}, not a {expected}")]
    WrongRole {
        name: String,
        role: String,
        expected: String,
    },

    // ==================== Static checks ====================
    #[error("contract parameter \"{name}\" has type Signature, signatures must be clause arguments")]
    SignatureParam { name: String },
    #[error("parameter \"{name}\" is unused")]
    UnusedParam { name: String },
    #[error("local \"{name}\" is never referenced")]
    UnusedLocal { name: String },
    #[error("if statement branches unlock or lock different numbers of values ({then_count} vs {else_count})")]
    LockCountMismatch { then_count: usize, else_count: usize },
    #[error("{message}")]
    Type { message: String },
    #[error("== and != cannot compare Boolean values")]
    BooleanEquality,
    #[error("contract \"{name}\" has no clauses")]
    NoClauses { name: String },
    #[error("contract \"{child}\" extends \"{parent}\" with a different locked value")]
    ValueMismatch { child: String, parent: String },
    #[error("contract \"{name}\" extends itself")]
    InheritanceCycle { name: String },

    // ==================== Codegen ====================
    #[error("contract \"{name}\" is referenced before it is compiled")]
    ForwardReference { name: String },
    #[error("list literal outside a function call")]
    ListOutsideCall,
    #[error("operand stack is shorter than {needed} items")]
    StackUnderflow { needed: usize },
    #[error("assembling contract body: {reason}")]
    Assembly { reason: String },

    // ==================== Instantiation ====================
    #[error("expected {expected} arguments, got {got}")]
    ArgCount { expected: usize, got: usize },
    #[error("argument \"{name}\" must be {expected}, got {got}")]
    ArgType {
        name: String,
        expected: String,
        got: String,
    },
    #[error("malformed instantiated program: {reason}")]
    Envelope { reason: String },

    /// Error with the path of constructs it unwound through.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        CompileError::Type {
            message: message.into(),
        }
    }

    /// Wraps the error with where it happened.
    pub fn context(self, context: impl Into<String>) -> Self {
        CompileError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through [`CompileError::Context`].
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Source position of a lexical or parse error.
    pub fn position(&self) -> Option<Position> {
        match self.root() {
            CompileError::Lex { pos, .. } | CompileError::Parse { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    /// Message without position or context prefixes.
    pub fn message(&self) -> String {
        match self.root() {
            CompileError::Lex { message, .. } | CompileError::Parse { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Adds unwind context to compiler results.
pub(crate) trait WithContext<T> {
    fn context_with(self, f: impl FnOnce() -> String) -> Result<T, CompileError>;
}

impl<T> WithContext<T> for Result<T, CompileError> {
    fn context_with(self, f: impl FnOnce() -> String) -> Result<T, CompileError> {
        self.map_err(|e| e.context(f()))
    }
}

/// Renders a lexical or parse error the way compilers print them.
///
/// ```text
/// error: expected "{"
///  --> trade.equity:3:14
///   |
/// 3 | contract Foo() locks value
///   |              ^
/// ```
pub fn render_diagnostic(err: &CompileError, path: &str, source: &str) -> String {
    let Some(pos) = err.position() else {
        return format!("error: {err}\n --> {path}\n");
    };
    let line_text = source.lines().nth(pos.line.saturating_sub(1)).unwrap_or("");
    let gutter = pos.line.to_string().len();
    let pad = " ".repeat(gutter);
    let caret_pad = " ".repeat(pos.col.saturating_sub(1));
    format!(
        "error: {msg}\n{pad}--> {path}:{line}:{col}\n{pad} |\n{line} | {line_text}\n{pad} | {caret_pad}^\n",
        msg = err.message(),
        line = pos.line,
        col = pos.col,
    )
}
