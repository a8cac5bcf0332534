//! Errores de compilación y su reporte agregado.

use std::fmt::{self, Display};

use crate::table::TableError;
use thiserror::Error;

/// Clase de error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// El modelo de entrada es inconsistente.
    Consistency,

    /// El programa es válido, pero no cabe en las restricciones del objetivo.
    Constraint,
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Consistency => fmt.write_str("error"),
            ErrorKind::Constraint => fmt.write_str("backend error"),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Type `{0}` cannot be resolved")]
    UnresolvedType(String),

    #[error("Type `{0}` is declared more than once")]
    DuplicateType(String),

    #[error("Type `{ty}` declares `{name}` more than once")]
    DuplicateMember { ty: String, name: String },

    #[error("Field `{name}` not found in type `{ty}`")]
    UnresolvedField { ty: String, name: String },

    #[error("Subroutine `{name}` not found in type `{ty}`")]
    UnresolvedSubroutine { ty: String, name: String },

    #[error("Type `{ty}` lists {expected} {what} in its symbol table, but {found} were delivered")]
    CountMismatch {
        ty: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Type `{0}` contains itself")]
    RecursiveLayout(String),

    #[error("`{subroutine}` is marked {intrinsic} and must take {expected} parameter(s), found {found}")]
    IntrinsicArity {
        subroutine: String,
        intrinsic: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("`{subroutine}` is marked {intrinsic}, which moves single bytes, but uses `{ty}`")]
    IntrinsicWidth {
        subroutine: String,
        intrinsic: &'static str,
        ty: String,
    },

    #[error("Attempted load to unknown register `{register}` in `{subroutine}`")]
    UnknownRegister { subroutine: String, register: String },

    #[error("Constant {value} at IL_{index:04} in `{subroutine}` does not fit in a byte")]
    ConstantOverflow {
        subroutine: String,
        index: usize,
        value: i64,
    },

    #[error("Opcode `{opcode}` at IL_{index:04} in `{subroutine}` expects a {expected} operand")]
    BadOperand {
        subroutine: String,
        index: usize,
        opcode: String,
        expected: &'static str,
    },

    #[error("`{subroutine}` has no {what} {slot}")]
    BadSlot {
        subroutine: String,
        what: &'static str,
        slot: u16,
    },

    #[error("Branch at IL_{index:04} in `{subroutine}` targets {target}, past the end of the body")]
    BadBranchTarget {
        subroutine: String,
        index: usize,
        target: usize,
    },

    #[error("Entry point not found, exactly one subroutine must be marked as `entry`")]
    NoEntryPoint,

    #[error("Multiple entry points: {}", .0.join(", "))]
    MultipleEntryPoints(Vec<String>),

    #[error("Recursion detected in `{subroutine}` (call path: {path})")]
    Recursion { subroutine: String, path: String },

    #[error("Zero page region ${start:04X}..${end:04X} lies outside page zero")]
    ZeroPageRange { start: u16, end: u16 },

    #[error("Out of RAM while allocating {size} byte(s) for `{symbol}`")]
    OutOfMemory { symbol: String, size: usize },

    #[error("Implementation `{implementation}` for `{subroutine}` is not provided by the support library")]
    MissingImplementation {
        subroutine: String,
        implementation: String,
    },

    #[error("Attempted to inline `{callee}` into `{caller}` before compiling it")]
    InlineOrder { caller: String, callee: String },

    #[error("Opcode `{opcode}` at IL_{index:04} in `{subroutine}` is not supported")]
    UnsupportedOpcode {
        subroutine: String,
        index: usize,
        opcode: String,
    },

    #[error("At IL_{index:04} in `{subroutine}`: {reason}")]
    UnsupportedComposite {
        subroutine: String,
        index: usize,
        reason: String,
    },

    #[error("Evaluation stack underflow at IL_{index:04} in `{subroutine}`")]
    StackUnderflow { subroutine: String, index: usize },

    #[error("Compile-time call to `{callee}` at IL_{index:04} in `{subroutine}` needs {expected} constant argument(s) right before it")]
    NonConstantArgument {
        subroutine: String,
        callee: String,
        index: usize,
        expected: usize,
    },

    #[error(transparent)]
    Table(#[from] TableError),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        use CompileError::*;

        match self {
            Recursion { .. }
            | InlineOrder { .. }
            | UnknownRegister { .. }
            | IntrinsicWidth { .. }
            | OutOfMemory { .. }
            | ZeroPageRange { .. }
            | UnsupportedOpcode { .. }
            | UnsupportedComposite { .. }
            | StackUnderflow { .. }
            | NonConstantArgument { .. } => ErrorKind::Constraint,

            _ => ErrorKind::Consistency,
        }
    }
}

/// Colección de errores reportados por una compilación fallida.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<CompileError>,
}

impl Diagnostics {
    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    pub fn into_errors(self) -> Vec<CompileError> {
        self.errors
    }
}

impl From<CompileError> for Diagnostics {
    fn from(error: CompileError) -> Self {
        Diagnostics {
            errors: vec![error],
        }
    }
}

impl From<Vec<CompileError>> for Diagnostics {
    fn from(errors: Vec<CompileError>) -> Self {
        Diagnostics { errors }
    }
}

impl From<TableError> for Diagnostics {
    fn from(error: TableError) -> Self {
        CompileError::from(error).into()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = &self.errors;
        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", error.kind(), error)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(
            fmt,
            "Build failed with {} {}",
            errors.len(),
            error_or_errors
        )
    }
}

impl std::error::Error for Diagnostics {}
