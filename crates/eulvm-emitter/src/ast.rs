//! The typed AST surface the emitter consumes. The lexer and parser that
//! produce this tree are external collaborators, out of scope here —
//! this module only defines the shape they hand off.

/// A primitive type. All are single-word at runtime; the distinctions
/// exist only for compile-time type-checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    /// 64-bit signed integer, stored zero/sign-extended into a [`Word`](eulvm_types::Word).
    I64,
    /// Boolean, encoded as `0x00…00` / `0x00…01`.
    Bool,
    /// Raw 32-byte value.
    Bytes32,
    /// Right-aligned 20-byte value.
    Address,
    /// The absence of a value. Illegal as a variable's type.
    Void,
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Type::I64 => "i64",
            Type::Bool => "bool",
            Type::Bytes32 => "bytes32",
            Type::Address => "address",
            Type::Void => "void",
        };
        f.write_str(name)
    }
}

/// Whether a function is callable only from other EulVM code (`Internal`,
/// exits with `RET`) or is an ABI entry point (`External`, exits with
/// `STOP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Modifier {
    /// Callable only via `CALL` from other compiled functions.
    Internal,
    /// An ABI entry point, dispatched to via the `CALLDATA` trampoline.
    External,
}

/// A binary operator, grouped by its precedence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    /// `||` (P0)
    Or,
    /// `&&` (P0)
    And,
    /// `==` (P1)
    Eq,
    /// `!=` (P1)
    Neq,
    /// `<` (P1)
    Lt,
    /// `>` (P1)
    Gt,
    /// `+` (P2)
    Add,
    /// `-` (P2)
    Sub,
    /// `*` (P3)
    Mul,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    /// An integer literal.
    IntLit(i64),
    /// A boolean literal.
    BoolLit(bool),
    /// A string literal — placed into static memory as `(addr, len)`.
    StrLit(String),
    /// A `bytes32` literal: a `0x`-prefixed, 66-character hex string.
    Bytes32Lit(String),
    /// An `address` literal: a `0x`-prefixed hex string of at most 40
    /// hex digits.
    AddressLit(String),
    /// A read of a variable by name.
    VarRead(String),
    /// A read of one map slot.
    MapRead {
        /// The map's declared name.
        map: String,
        /// The key expression.
        key: Box<Expr>,
    },
    /// A call to a (necessarily internal) function.
    FuncCall {
        /// The callee's name.
        name: String,
        /// Argument expressions, in source order.
        args: Vec<Expr>,
    },
    /// A binary operation.
    BinaryOp {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stmt {
    /// An expression evaluated for its side effects; its value is
    /// discarded.
    Expr(Expr),
    /// `if (cond) { then } else { else }`.
    If {
        /// The condition; must type-check as `Bool`.
        cond: Expr,
        /// The then-branch.
        then_block: Block,
        /// The optional else-branch.
        else_block: Option<Block>,
    },
    /// `while (cond) { body }`.
    While {
        /// The condition; must type-check as `Bool`.
        cond: Expr,
        /// The loop body.
        body: Block,
    },
    /// A local variable declaration, with an optional initializer.
    VarDef {
        /// The variable's name.
        name: String,
        /// The variable's declared type. Must not be `Void`.
        ty: Type,
        /// The optional initializer expression.
        init: Option<Expr>,
    },
    /// `name = value;`
    VarAssign {
        /// The target variable's name.
        name: String,
        /// The value expression.
        value: Expr,
    },
    /// `(a, b) = f(...)` — destructuring a multi-return call.
    MultiAssign {
        /// Target variable names, in declared-return order.
        names: Vec<String>,
        /// The call expression producing the values.
        call: Expr,
    },
    /// `map[key] = value;`
    MapWrite {
        /// The target map's name.
        map: String,
        /// The key expression.
        key: Expr,
        /// The value expression.
        value: Expr,
    },
    /// `return expr, expr, ...;`
    Return(Vec<Expr>),
}

/// An ordered sequence of statements sharing one lexical scope.
pub type Block = Vec<Stmt>;

/// A compiled function's declaration and body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FuncDef {
    /// The function's name.
    pub name: String,
    /// Declared parameters, in order.
    pub params: Vec<(String, Type)>,
    /// Declared return types, in order.
    pub returns: Vec<Type>,
    /// `Internal` or `External`.
    pub modifier: Modifier,
    /// The function body.
    pub body: Block,
}

/// A top-level variable declaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarDef {
    /// The variable's name.
    pub name: String,
    /// The variable's declared type. Must not be `Void`.
    pub ty: Type,
    /// The optional initializer expression.
    pub init: Option<Expr>,
}

/// A top-level map declaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapDef {
    /// The map's name (at most 32 bytes, the map-name prefix width).
    pub name: String,
    /// The declared key type.
    pub key_type: Type,
    /// The declared value type.
    pub value_type: Type,
}

/// A top-level enum declaration. Each variant becomes a compile-time
/// `i64` constant equal to its declaration-order index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumDef {
    /// The enum's name, used only for diagnostics (variants live in the
    /// same flat namespace as other top-level constants).
    pub name: String,
    /// Variant names, in declaration order.
    pub variants: Vec<String>,
}

/// One top-level declaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Top {
    /// A function declaration.
    Func(FuncDef),
    /// A top-level variable declaration.
    Var(VarDef),
    /// A map declaration.
    Map(MapDef),
    /// An enum declaration.
    Enum(EnumDef),
}

/// A whole compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Module {
    /// Top-level declarations, in source order.
    pub tops: Vec<Top>,
}
