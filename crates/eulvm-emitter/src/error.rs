use thiserror::Error;

use crate::ast::Type;

/// A `file:row:col` source location, supplied by the (external) parser.
/// The emitter itself never constructs spans from scratch — it only
/// threads through whatever the AST node it's compiling was tagged
/// with — so most emitter-internal call sites use
/// [`SourceSpan::UNKNOWN`] when the AST surface in this crate (see
/// [`crate::ast`]) doesn't carry position info of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    /// 1-based line.
    pub row: u32,
    /// 1-based column.
    pub col: u32,
}

impl SourceSpan {
    /// A span with no useful position, used where the minimal AST this
    /// crate consumes doesn't carry one.
    pub const UNKNOWN: SourceSpan = SourceSpan { row: 0, col: 0 };
}

impl core::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

/// A compile-time diagnostic: always fatal, formatted by the CLI as
/// `file:row:col ERROR ...`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// A name was referenced that resolves to no variable, function,
    /// map, or enum constant visible from the current scope.
    #[error("{span} ERROR unknown identifier `{name}`")]
    UnknownIdentifier {
        /// The unresolved name.
        name: String,
        /// Where it was referenced.
        span: SourceSpan,
    },

    /// A function, variable, map, or enum was declared twice at module
    /// scope, or a variable was declared twice in the same block scope.
    #[error("{span} ERROR `{name}` is already declared")]
    DoubleDeclaration {
        /// The repeated name.
        name: String,
        /// Where the second declaration occurred.
        span: SourceSpan,
    },

    /// An operation was applied to operands of mismatched or
    /// inadmissible types.
    #[error("{span} ERROR type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The type the context required.
        expected: String,
        /// The type actually produced.
        found: String,
        /// Where the mismatch occurred.
        span: SourceSpan,
    },

    /// A call supplied the wrong number of arguments, or a `return`
    /// supplied the wrong number of values.
    #[error("{span} ERROR arity mismatch: `{name}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        /// The callee or enclosing function's name.
        name: String,
        /// Declared arity.
        expected: usize,
        /// Arity actually supplied.
        found: usize,
        /// Where the call/return occurred.
        span: SourceSpan,
    },

    /// A `map[key]` read or write referenced a name not declared with
    /// `map`.
    #[error("{span} ERROR unknown map `{name}`")]
    UnknownMap {
        /// The unresolved map name.
        name: String,
        /// Where it was referenced.
        span: SourceSpan,
    },

    /// A map name exceeded the 32-byte prefix budget.
    #[error("{span} ERROR name `{name}` is too long to use as a map prefix (max 32 bytes)")]
    NameTooLong {
        /// The offending name.
        name: String,
        /// Where it was declared.
        span: SourceSpan,
    },

    /// A `bytes32`/`address` literal didn't parse as the hex string its
    /// type requires.
    #[error("{span} ERROR malformed {ty} literal `{value}`")]
    MalformedLiteral {
        /// The target type the literal was being converted to.
        ty: Type,
        /// The offending literal text.
        value: String,
        /// Where it occurred.
        span: SourceSpan,
    },

    /// `return`'s argument count didn't match the enclosing function's
    /// declared return types.
    #[error("{span} ERROR return arity mismatch: function declares {expected} return value(s), `return` supplies {found}")]
    ReturnArityMismatch {
        /// Declared return arity.
        expected: usize,
        /// Supplied arity.
        found: usize,
        /// Where the `return` statement occurred.
        span: SourceSpan,
    },

    /// A call-expression named an `external` function directly — only
    /// `internal` functions are callable from EulVM code.
    #[error("{span} ERROR cannot call external function `{name}` directly")]
    CallToExternal {
        /// The callee's name.
        name: String,
        /// Where the call occurred.
        span: SourceSpan,
    },

    /// A variable was declared with type `void`.
    #[error("{span} ERROR variable `{name}` cannot have type void")]
    VoidVariable {
        /// The offending variable's name.
        name: String,
        /// Where it was declared.
        span: SourceSpan,
    },

    /// A top-level variable's initializer wasn't a compile-time constant.
    /// Top-level initializers are folded directly into the preallocated
    /// memory image — there is no module-init trampoline to run
    /// arbitrary instructions before `CALLDATA` dispatches — so only
    /// literal expressions are admissible here.
    #[error("{span} ERROR initializer for top-level variable `{name}` must be a constant")]
    NonConstantGlobalInit {
        /// The variable's name.
        name: String,
        /// Where the initializer occurred.
        span: SourceSpan,
    },

    /// A map's key or value type isn't one of the permitted primitive
    /// types.
    #[error("{span} ERROR map `{name}` cannot use type {ty} as a key or value type")]
    InvalidMapType {
        /// The map's name.
        name: String,
        /// The offending type.
        ty: Type,
        /// Where the map was declared.
        span: SourceSpan,
    },
}
