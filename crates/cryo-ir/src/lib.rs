//! # cryo-ir
//!
//! Core abstractions for the cryo decompiler. This crate defines the
//! architecture-agnostic intermediate representation consumed by dataflow
//! analysis and code synthesis: terms, statements, basic blocks, functions,
//! the CFG view with dominators, and the control-flow region tree.

pub mod arch;
pub mod cancel;
pub mod cfg;
pub mod error;
pub mod function;
pub mod image;
pub mod memory;
pub mod region;
pub mod statement;
pub mod term;

pub use arch::{Architecture, ByteOrder, RegisterInfo};
pub use cancel::CancellationToken;
pub use cfg::{Cfg, DominatorTree};
pub use error::Error;
pub use function::{BasicBlock, BasicBlockId, Function, StmtId, TermId};
pub use image::{Image, Section};
pub use memory::{MemoryDomain, MemoryLocation};
pub use region::{NodeId, RegionKind, RegionNode, RegionTree, SwitchData};
pub use statement::{
    InstructionRef, Jump, JumpTable, JumpTableEntry, JumpTarget, Statement, StatementKind,
};
pub use term::{Access, BinaryOpKind, Term, TermKind, UnaryOpKind};
