//! Arena-owned IR functions.
//!
//! Terms, statements and basic blocks live in per-function arenas and refer
//! to each other through plain index handles, so the cyclic traversal links
//! of the IR (term → statement → block → function) never form an ownership
//! cycle.

use crate::memory::{MemoryDomain, MemoryLocation};
use crate::statement::{InstructionRef, Jump, Statement, StatementKind};
use crate::term::{Access, BinaryOpKind, Term, TermKind, UnaryOpKind};

/// Handle of a term within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TermId(pub u32);

/// Handle of a statement within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtId(pub u32);

/// Handle of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlockId(pub u32);

impl std::fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// An ordered list of statements ending in a terminator.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlock {
    /// Machine address of the block, when it corresponds to one.
    pub address: Option<u64>,
    pub statements: Vec<StmtId>,
}

/// A reconstructed function: arenas plus the entry block.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    name: String,
    terms: Vec<Term>,
    statements: Vec<Statement>,
    blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terms: Vec::new(),
            statements: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entry block. The first block added is the entry.
    pub fn entry(&self) -> BasicBlockId {
        BasicBlockId(0)
    }

    // ==================== Blocks ====================

    /// Adds a basic block, optionally at a machine address.
    pub fn add_block(&mut self, address: Option<u64>) -> BasicBlockId {
        let id = BasicBlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            address,
            statements: Vec::new(),
        });
        id
    }

    pub fn block(&self, id: BasicBlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BasicBlockId> {
        (0..self.blocks.len() as u32).map(BasicBlockId)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The block at the given machine address, if any.
    pub fn block_at(&self, address: u64) -> Option<BasicBlockId> {
        self.block_ids()
            .find(|&id| self.block(id).address == Some(address))
    }

    // ==================== Terms ====================

    fn add_term(&mut self, term: Term) -> TermId {
        let id = TermId(self.terms.len() as u32);
        self.terms.push(term);
        id
    }

    pub fn term(&self, id: TermId) -> &Term {
        &self.terms[id.0 as usize]
    }

    pub fn term_ids(&self) -> impl Iterator<Item = TermId> {
        (0..self.terms.len() as u32).map(TermId)
    }

    pub fn int_const(&mut self, value: u64, size: u32) -> TermId {
        self.add_term(Term::new(TermKind::IntConst(value), size))
    }

    pub fn intrinsic(&mut self, size: u32) -> TermId {
        self.add_term(Term::new(TermKind::Intrinsic, size))
    }

    pub fn undefined(&mut self, size: u32) -> TermId {
        self.add_term(Term::new(TermKind::Undefined, size))
    }

    pub fn location_access(&mut self, location: MemoryLocation) -> TermId {
        let size = location.size as u32;
        self.add_term(Term::new(TermKind::MemoryLocationAccess(location), size))
    }

    pub fn dereference(&mut self, addr: TermId, domain: MemoryDomain, size: u32) -> TermId {
        self.add_term(Term::new(TermKind::Dereference { addr, domain }, size))
    }

    pub fn unary_op(&mut self, op: UnaryOpKind, operand: TermId, size: u32) -> TermId {
        self.add_term(Term::new(TermKind::UnaryOp { op, operand }, size))
    }

    pub fn binary_op(&mut self, op: BinaryOpKind, left: TermId, right: TermId, size: u32) -> TermId {
        self.add_term(Term::new(TermKind::BinaryOp { op, left, right }, size))
    }

    pub fn choice(&mut self, preferred: TermId, default: TermId) -> TermId {
        let size = self.term(preferred).size;
        self.add_term(Term::new(TermKind::Choice { preferred, default }, size))
    }

    // ==================== Statements ====================

    pub fn statement(&self, id: StmtId) -> &Statement {
        &self.statements[id.0 as usize]
    }

    pub fn statements_of(&self, block: BasicBlockId) -> &[StmtId] {
        &self.block(block).statements
    }

    /// Appends a statement to a block, wiring parent links and access roles
    /// into every term the statement mentions.
    pub fn push_statement(
        &mut self,
        block: BasicBlockId,
        kind: StatementKind,
        instruction: Option<InstructionRef>,
    ) -> StmtId {
        let id = StmtId(self.statements.len() as u32);

        let roots: Vec<(TermId, Access)> = match &kind {
            StatementKind::Assignment { left, right } => {
                vec![(*right, Access::Read), (*left, Access::Write)]
            }
            StatementKind::Kill(term) => vec![(*term, Access::Kill)],
            StatementKind::Jump(jump) => {
                let mut roots = Vec::new();
                if let Some(condition) = jump.condition {
                    roots.push((condition, Access::Read));
                }
                if let Some(addr) = jump.then_target.address_term() {
                    roots.push((addr, Access::Read));
                }
                if let Some(addr) = jump
                    .else_target
                    .as_ref()
                    .and_then(|target| target.address_term())
                {
                    roots.push((addr, Access::Read));
                }
                roots
            }
            StatementKind::Call { target } => vec![(*target, Access::Read)],
            StatementKind::Touch { term, access } => vec![(*term, *access)],
            StatementKind::InlineAssembly
            | StatementKind::Comment(_)
            | StatementKind::Return
            | StatementKind::Callback => Vec::new(),
        };

        self.statements.push(Statement {
            kind,
            block,
            instruction,
        });
        for (root, access) in roots {
            self.wire_term(root, access, id);
        }
        self.blocks[block.0 as usize].statements.push(id);
        id
    }

    /// Sets the access role and the parent statement of a term and of its
    /// operands. Operands of an accessed term are reads, except that both
    /// alternatives of a choice share the choice's own role.
    fn wire_term(&mut self, id: TermId, access: Access, stmt: StmtId) {
        let term = &mut self.terms[id.0 as usize];
        term.access = access;
        term.stmt = Some(stmt);
        let kind = term.kind.clone();
        match kind {
            TermKind::Dereference { addr, .. } => self.wire_term(addr, Access::Read, stmt),
            TermKind::UnaryOp { operand, .. } => self.wire_term(operand, Access::Read, stmt),
            TermKind::BinaryOp { left, right, .. } => {
                self.wire_term(left, Access::Read, stmt);
                self.wire_term(right, Access::Read, stmt);
            }
            TermKind::Choice { preferred, default } => {
                self.wire_term(preferred, access, stmt);
                self.wire_term(default, access, stmt);
            }
            TermKind::IntConst(_)
            | TermKind::Intrinsic
            | TermKind::Undefined
            | TermKind::MemoryLocationAccess(_) => {}
        }
    }

    /// The right-hand side of the assignment defining `term`, when `term`
    /// is the assignment's left side.
    pub fn assignment_source(&self, term: TermId) -> Option<TermId> {
        let stmt = self.term(term).stmt?;
        match &self.statement(stmt).kind {
            StatementKind::Assignment { left, right } if *left == term => Some(*right),
            _ => None,
        }
    }

    /// The terminating jump of a block, if its last statement is one.
    pub fn terminator_jump(&self, block: BasicBlockId) -> Option<(StmtId, &Jump)> {
        let last = *self.block(block).statements.last()?;
        self.statement(last).as_jump().map(|jump| (last, jump))
    }

    /// Position of a statement within its block.
    pub fn statement_position(&self, stmt: StmtId) -> Option<usize> {
        let block = self.statement(stmt).block;
        self.statements_of(block).iter().position(|&s| s == stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::JumpTarget;

    #[test]
    fn test_assignment_wires_roles() {
        let mut func = Function::new("f");
        let entry = func.add_block(None);
        let reg = MemoryLocation::new(MemoryDomain::Register, 0, 32);
        let lhs = func.location_access(reg);
        let five = func.int_const(5, 32);
        let stmt = func.push_statement(
            entry,
            StatementKind::Assignment {
                left: lhs,
                right: five,
            },
            None,
        );

        assert!(func.term(lhs).is_write());
        assert!(func.term(five).is_read());
        assert_eq!(func.term(lhs).stmt, Some(stmt));
        assert_eq!(func.assignment_source(lhs), Some(five));
    }

    #[test]
    fn test_dereference_address_is_read() {
        let mut func = Function::new("f");
        let entry = func.add_block(None);
        let reg = MemoryLocation::new(MemoryDomain::Register, 0, 64);
        let addr = func.location_access(reg);
        let store = func.dereference(addr, MemoryDomain::Memory, 32);
        let value = func.int_const(1, 32);
        func.push_statement(
            entry,
            StatementKind::Assignment {
                left: store,
                right: value,
            },
            None,
        );

        assert!(func.term(store).is_write());
        assert!(func.term(addr).is_read());
    }

    #[test]
    fn test_choice_shares_role() {
        let mut func = Function::new("f");
        let entry = func.add_block(None);
        let a = func.location_access(MemoryLocation::new(MemoryDomain::Register, 0, 32));
        let b = func.location_access(MemoryLocation::new(MemoryDomain::Register, 32, 32));
        let choice = func.choice(a, b);
        let rhs = func.int_const(0, 32);
        func.push_statement(
            entry,
            StatementKind::Assignment {
                left: choice,
                right: rhs,
            },
            None,
        );

        assert!(func.term(choice).is_write());
        assert!(func.term(a).is_write());
        assert!(func.term(b).is_write());
    }

    #[test]
    fn test_terminator_jump() {
        let mut func = Function::new("f");
        let entry = func.add_block(Some(0x1000));
        let exit = func.add_block(Some(0x1010));
        func.push_statement(
            entry,
            StatementKind::Jump(Jump::unconditional(JumpTarget::Block(exit))),
            None,
        );

        let (_, jump) = func.terminator_jump(entry).unwrap();
        assert_eq!(jump.then_target.block(), Some(exit));
        assert!(func.terminator_jump(exit).is_none());
    }

    #[test]
    fn test_block_at_address() {
        let mut func = Function::new("f");
        func.add_block(Some(0x1000));
        let second = func.add_block(Some(0x1010));
        assert_eq!(func.block_at(0x1010), Some(second));
        assert_eq!(func.block_at(0x2000), None);
    }
}
