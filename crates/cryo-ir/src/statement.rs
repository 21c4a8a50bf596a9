//! IR statements and jump targets.

use crate::function::{BasicBlockId, TermId};
use crate::term::Access;

/// Reference to the machine instruction a statement was lifted from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstructionRef {
    pub address: u64,
    /// Disassembled form, used when rendering inline assembly.
    pub text: String,
}

/// One entry of a jump table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JumpTableEntry {
    /// Target machine address stored in the table.
    pub address: u64,
    /// The basic block at that address, when it belongs to the function.
    pub block: Option<BasicBlockId>,
}

/// An ordered jump table indexed by the switch value.
pub type JumpTable = Vec<JumpTableEntry>;

/// Where a jump transfers control.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JumpTarget {
    Block(BasicBlockId),
    /// Computed target address.
    Address(TermId),
    /// Table-based jump: the computed address term plus the table it reads.
    Table { address: TermId, table: JumpTable },
    /// The lifter could not determine the target.
    Unknown,
}

impl JumpTarget {
    /// The target basic block, for direct jumps.
    pub fn block(&self) -> Option<BasicBlockId> {
        match self {
            JumpTarget::Block(block) => Some(*block),
            _ => None,
        }
    }

    /// The computed address term, if the target is computed.
    pub fn address_term(&self) -> Option<TermId> {
        match self {
            JumpTarget::Address(term) | JumpTarget::Table { address: term, .. } => Some(*term),
            JumpTarget::Block(_) | JumpTarget::Unknown => None,
        }
    }

    /// The jump table, for table-based jumps.
    pub fn table(&self) -> Option<&JumpTable> {
        match self {
            JumpTarget::Table { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// A conditional or unconditional control transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Jump {
    pub condition: Option<TermId>,
    pub then_target: JumpTarget,
    pub else_target: Option<JumpTarget>,
}

impl Jump {
    pub fn unconditional(target: JumpTarget) -> Self {
        Self {
            condition: None,
            then_target: target,
            else_target: None,
        }
    }

    pub fn conditional(condition: TermId, then_target: JumpTarget, else_target: JumpTarget) -> Self {
        Self {
            condition: Some(condition),
            then_target,
            else_target: Some(else_target),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

/// The kind of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatementKind {
    /// An instruction the lifter could not translate.
    InlineAssembly,
    Comment(String),
    Assignment { left: TermId, right: TermId },
    /// Invalidates the definitions of the term's location.
    Kill(TermId),
    Jump(Jump),
    Call { target: TermId },
    Return,
    /// Marks a term as observed without other effects.
    Touch { term: TermId, access: Access },
    /// Host callback marker; no dataflow or output effect.
    Callback,
}

/// A statement of a basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statement {
    pub kind: StatementKind,
    pub block: BasicBlockId,
    pub instruction: Option<InstructionRef>,
}

impl Statement {
    /// The jump payload, if this is a jump statement.
    pub fn as_jump(&self) -> Option<&Jump> {
        match &self.kind {
            StatementKind::Jump(jump) => Some(jump),
            _ => None,
        }
    }

    /// Address of the originating machine instruction.
    pub fn instruction_address(&self) -> Option<u64> {
        self.instruction.as_ref().map(|i| i.address)
    }
}
