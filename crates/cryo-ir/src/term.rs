//! IR terms: the expression DAG of a lifted function.

use crate::function::{StmtId, TermId};
use crate::memory::{MemoryDomain, MemoryLocation};

/// How a term touches its memory location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Access {
    /// Not attached to a statement yet.
    #[default]
    None,
    Read,
    Write,
    Kill,
}

/// Unary operators of the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOpKind {
    /// Bitwise complement.
    Not,
    /// Two's-complement negation.
    Negation,
    SignExtend,
    ZeroExtend,
    Truncate,
}

/// Binary operators of the IR.
///
/// Division, remainder and order comparisons carry their signedness; the
/// abstract-value lattice itself does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOpKind {
    And,
    Or,
    Xor,
    Shl,
    /// Logical shift right.
    Shr,
    /// Arithmetic shift right.
    Sar,
    Add,
    Sub,
    Mul,
    SignedDiv,
    SignedRem,
    UnsignedDiv,
    UnsignedRem,
    Equal,
    SignedLess,
    SignedLessOrEqual,
    UnsignedLess,
    UnsignedLessOrEqual,
}

/// The kind of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TermKind {
    /// An integer constant.
    IntConst(u64),
    /// A value produced by something the lifter cannot express.
    Intrinsic,
    /// An undefined value.
    Undefined,
    /// Direct access to a statically known memory location.
    MemoryLocationAccess(MemoryLocation),
    /// Memory access through a computed address.
    Dereference {
        addr: TermId,
        domain: MemoryDomain,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: TermId,
    },
    BinaryOp {
        op: BinaryOpKind,
        left: TermId,
        right: TermId,
    },
    /// Resolves to `preferred` if that term has a reaching definition,
    /// otherwise to `default`.
    Choice {
        preferred: TermId,
        default: TermId,
    },
}

/// A node of the IR expression DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Term {
    pub kind: TermKind,
    /// Size of the produced value in bits.
    pub size: u32,
    pub access: Access,
    /// The statement this term belongs to, set when the statement is added.
    pub stmt: Option<StmtId>,
}

impl Term {
    pub fn new(kind: TermKind, size: u32) -> Self {
        Self {
            kind,
            size,
            access: Access::None,
            stmt: None,
        }
    }

    pub fn is_read(&self) -> bool {
        self.access == Access::Read
    }

    pub fn is_write(&self) -> bool {
        self.access == Access::Write
    }

    pub fn is_kill(&self) -> bool {
        self.access == Access::Kill
    }
}
