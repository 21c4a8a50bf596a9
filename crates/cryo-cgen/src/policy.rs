//! Variable/substitution policy.
//!
//! Decides which variables are single-assignment, which terms are movable,
//! and which variables are intermediate (inlined at their use sites with
//! the defining assignment suppressed).

use std::collections::HashMap;

use cryo_dflow::Dataflow;
use cryo_ir::{DominatorTree, Function, TermId, TermKind};

use crate::oracles::{Liveness, VarId, Variables};

/// Memoized answers of the substitution policy for one function.
pub struct SubstitutionPolicy<'a> {
    function: &'a Function,
    dataflow: &'a Dataflow,
    liveness: &'a dyn Liveness,
    variables: &'a dyn Variables,
    dominators: DominatorTree,
    inline_enabled: bool,
    single_assignment: HashMap<VarId, bool>,
    intermediate: HashMap<VarId, bool>,
}

impl<'a> SubstitutionPolicy<'a> {
    pub fn new(
        function: &'a Function,
        dataflow: &'a Dataflow,
        liveness: &'a dyn Liveness,
        variables: &'a dyn Variables,
        dominators: DominatorTree,
        inline_enabled: bool,
    ) -> Self {
        Self {
            function,
            dataflow,
            liveness,
            variables,
            dominators,
            inline_enabled,
            single_assignment: HashMap::new(),
            intermediate: HashMap::new(),
        }
    }

    /// True if every execution reaching `read` passed `write` first.
    ///
    /// Within a basic block dominance is decided at instruction granularity
    /// (by address) and falls back to statement order; across blocks the
    /// dominator tree decides.
    pub fn is_dominating(&self, write: TermId, read: TermId) -> bool {
        debug_assert!(self.function.term(write).is_write());
        debug_assert!(self.function.term(read).is_read());

        let Some(write_stmt) = self.function.term(write).stmt else {
            return false;
        };
        let Some(read_stmt) = self.function.term(read).stmt else {
            return false;
        };

        let write_block = self.function.statement(write_stmt).block;
        let read_block = self.function.statement(read_stmt).block;

        if write_block == read_block {
            let write_addr = self.function.statement(write_stmt).instruction_address();
            let read_addr = self.function.statement(read_stmt).instruction_address();
            match (write_addr, read_addr) {
                (Some(write_addr), Some(read_addr)) if write_addr != read_addr => {
                    write_addr < read_addr
                }
                _ => {
                    let write_pos = self.function.statement_position(write_stmt);
                    let read_pos = self.function.statement_position(read_stmt);
                    write_pos <= read_pos
                }
            }
        } else {
            self.dominators.dominates(write_block, read_block)
        }
    }

    /// The unique write term of a variable, if there is exactly one.
    pub fn single_definition(&self, var: VarId) -> Option<TermId> {
        let mut result = None;
        for &(term, _) in &self.variables.get(var).terms_and_locations {
            if self.function.term(term).is_write() {
                if result.is_some() {
                    return None;
                }
                result = Some(term);
            }
        }
        result
    }

    /// The unique live read of a variable, if there is exactly one.
    pub fn single_live_use(&self, var: VarId) -> Option<TermId> {
        let mut result = None;
        for &(term, _) in &self.variables.get(var).terms_and_locations {
            if self.function.term(term).is_read() && self.liveness.is_live(term) {
                if result.is_some() {
                    return None;
                }
                result = Some(term);
            }
        }
        result
    }

    /// A single-assignment variable is non-global, has exactly one write,
    /// and every live read touches its full location and is dominated by
    /// the definition.
    pub fn is_single_assignment(&mut self, var: VarId) -> bool {
        if let Some(&cached) = self.single_assignment.get(&var) {
            return cached;
        }
        let result = self.compute_single_assignment(var);
        self.single_assignment.insert(var, result);
        result
    }

    fn compute_single_assignment(&self, var: VarId) -> bool {
        let variable = self.variables.get(var);
        if variable.is_global() {
            return false;
        }
        let Some(definition) = self.single_definition(var) else {
            return false;
        };
        for &(term, location) in &variable.terms_and_locations {
            let term_info = self.function.term(term);
            if term_info.is_read() && self.liveness.is_live(term) {
                if !self.is_dominating(definition, term) {
                    return false;
                }
                if location != variable.location {
                    return false;
                }
            } else if term_info.is_write() && location != variable.location {
                return false;
            }
        }
        true
    }

    /// A movable expression can be re-evaluated at its use site without
    /// changing meaning.
    pub fn is_movable(&mut self, term: TermId) -> bool {
        if let Some(var) = self.variables.variable_of(term) {
            return self.is_single_assignment(var);
        }
        match self.function.term(term).kind {
            TermKind::IntConst(_) => true,
            TermKind::Intrinsic | TermKind::Undefined => false,
            TermKind::MemoryLocationAccess(_) => false,
            TermKind::Dereference { .. } => false,
            TermKind::UnaryOp { operand, .. } => self.is_movable(operand),
            TermKind::BinaryOp { left, right, .. } => {
                self.is_movable(left) && self.is_movable(right)
            }
            TermKind::Choice { preferred, default } => {
                if self.dataflow.has_definitions(preferred) {
                    self.is_movable(preferred)
                } else {
                    self.is_movable(default)
                }
            }
        }
    }

    /// An intermediate variable is inlined at its use sites and its
    /// defining assignment is suppressed.
    pub fn is_intermediate(&mut self, var: VarId) -> bool {
        if !self.inline_enabled {
            return false;
        }
        if let Some(&cached) = self.intermediate.get(&var) {
            return cached;
        }
        let result = self.compute_intermediate(var);
        self.intermediate.insert(var, result);
        result
    }

    fn compute_intermediate(&mut self, var: VarId) -> bool {
        if self.variables.get(var).is_global() {
            return false;
        }
        if !self.is_single_assignment(var) {
            return false;
        }
        let Some(definition) = self.single_definition(var) else {
            return false;
        };
        let Some(source) = self.function.assignment_source(definition) else {
            return false;
        };

        // Substituting complex expressions more than once is not wanted.
        if self.single_live_use(var).is_some() {
            self.is_movable(source)
        } else if let Some(source_var) = self.variables.variable_of(source) {
            self.is_single_assignment(source_var)
        } else {
            false
        }
    }
}
