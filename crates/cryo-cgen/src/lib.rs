//! # cryo-cgen
//!
//! Structured-code synthesis for the cryo decompiler. Given a function, its
//! dataflow results, a control-flow region tree, and liveness/variable/type/
//! signature oracles, this crate emits a tree of C-like statements and
//! expressions with structured control flow and a minimum of `goto`s.

pub mod error;
pub mod generator;
pub mod likec;
pub mod options;
pub mod oracles;
pub mod policy;
pub mod switch_context;

pub use error::GenerateError;
pub use generator::FunctionGenerator;
pub use likec::{
    CBinaryOp, CBlock, CExpr, CExprKind, CStatement, CStatementKind, CType, CUnaryOp,
    FunctionDefinition, VariableDeclaration,
};
pub use options::GeneratorOptions;
pub use oracles::{
    AddressGlobals, Globals, Liveness, Parameter, Signature, Signatures, Ty, Types, VarId,
    Variable, Variables,
};
pub use policy::SubstitutionPolicy;
pub use switch_context::SwitchContext;
