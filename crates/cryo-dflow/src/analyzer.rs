//! The dataflow analyzer: an iterative fixpoint over the CFG.

use log::warn;

use cryo_ir::{
    Architecture, BinaryOpKind, ByteOrder, CancellationToken, Cfg, Function, MemoryDomain,
    MemoryLocation, StatementKind, StmtId, TermId, TermKind, UnaryOpKind,
};
use indexmap::IndexMap;

use crate::abstract_value::{bit_mask, bit_shift, AbstractValue};
use crate::context::SimulationContext;
use crate::dataflow::Dataflow;
use crate::error::AnalysisError;
use crate::hooks::ConventionHooks;
use crate::reaching::ReachingDefinitions;
use crate::value::{Product, StackOffset, Value};

/// Tunables of the analyzer.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerOptions {
    /// Hard cap on fixpoint iterations; beyond it the current approximation
    /// is kept and a warning names the function.
    pub max_iterations: u32,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self { max_iterations: 30 }
    }
}

/// Computes, for every term of a function, a [`Value`], optionally a
/// [`MemoryLocation`], and per-read reaching definitions.
pub struct DataflowAnalyzer<'a> {
    function: &'a Function,
    arch: &'a Architecture,
    options: AnalyzerOptions,
    hooks: Option<&'a mut dyn ConventionHooks>,
    dataflow: Dataflow,
}

impl<'a> DataflowAnalyzer<'a> {
    pub fn new(function: &'a Function, arch: &'a Architecture) -> Self {
        Self {
            function,
            arch,
            options: AnalyzerOptions::default(),
            hooks: None,
            dataflow: Dataflow::new(),
        }
    }

    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches a calling-convention model.
    pub fn with_hooks(mut self, hooks: &'a mut dyn ConventionHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Runs the simulation until reaching a stationary point twice in a row.
    ///
    /// Once an iteration produces no change the fixpoint flag is raised and
    /// one extra iteration runs, so hooks observing the flag can produce
    /// their final refinement.
    pub fn analyze(mut self, canceled: &CancellationToken) -> Result<Dataflow, AnalysisError> {
        let function = self.function;
        let cfg = Cfg::new(function);

        let mut output: IndexMap<cryo_ir::BasicBlockId, ReachingDefinitions> = IndexMap::new();
        let mut iterations = 0u32;
        let mut fixpoint_reached = false;

        loop {
            let mut changed = false;

            for block in function.block_ids() {
                let mut context = SimulationContext::new(function, fixpoint_reached);

                for &pred in cfg.predecessors(block) {
                    if let Some(defs) = output.get(&pred) {
                        context.definitions_mut().merge(defs);
                    }
                }

                if block == function.entry() {
                    if let Some(hooks) = self.hooks.as_deref_mut() {
                        hooks.simulate_enter(function, &mut self.dataflow, &mut context);
                    }
                }

                for &stmt in function.statements_of(block) {
                    self.simulate_statement(stmt, &mut context);
                }

                let stored = output.entry(block).or_default();
                if *stored != *context.definitions() {
                    *stored = context.definitions().clone();
                    changed = true;
                }
            }

            self.rebuild_uses();

            if changed {
                fixpoint_reached = false;
            } else if !fixpoint_reached {
                fixpoint_reached = true;
                changed = true;
            }

            if !changed {
                break;
            }
            iterations += 1;
            if iterations >= self.options.max_iterations {
                warn!(
                    "no dataflow fixpoint after {} iterations while analyzing {}; giving up",
                    iterations,
                    function.name()
                );
                break;
            }
            if canceled.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
        }

        Ok(self.dataflow)
    }

    /// Recomputes use lists from the current reaching-definition sets.
    fn rebuild_uses(&mut self) {
        let function = self.function;
        for term in function.term_ids() {
            if function.term(term).is_write() {
                self.dataflow.clear_uses(term);
            }
        }
        for term in function.term_ids() {
            if !function.term(term).is_read() {
                continue;
            }
            let Some(definitions) = self.dataflow.definitions(term) else {
                continue;
            };
            let pairs: Vec<(TermId, TermId)> = definitions
                .iter()
                .flat_map(|(_, defs)| defs.iter().map(move |&def| (def, term)))
                .collect();
            for (definition, use_term) in pairs {
                self.dataflow.add_use(definition, use_term);
            }
        }
    }

    fn simulate_statement(&mut self, stmt: StmtId, context: &mut SimulationContext<'_>) {
        let function = self.function;
        match &function.statement(stmt).kind {
            StatementKind::Comment(_) => {}
            StatementKind::InlineAssembly => {
                // Inline assembly deliberately does not kill reaching
                // definitions.
            }
            StatementKind::Assignment { left, right } => {
                let (left, right) = (*left, *right);
                self.simulate_term(right, context);
                self.simulate_term(left, context);
                let value = self.dataflow.value(right);
                self.propagate_assigned_value(left, &value);
            }
            StatementKind::Kill(term) => {
                self.simulate_term(*term, context);
            }
            StatementKind::Jump(jump) => {
                let condition = jump.condition;
                let then_addr = jump.then_target.address_term();
                let else_addr = jump
                    .else_target
                    .as_ref()
                    .and_then(|target| target.address_term());
                if let Some(condition) = condition {
                    self.simulate_term(condition, context);
                }
                if let Some(addr) = then_addr {
                    self.simulate_term(addr, context);
                }
                if let Some(addr) = else_addr {
                    self.simulate_term(addr, context);
                }
            }
            StatementKind::Call { target } => {
                let target = *target;
                self.simulate_term(target, context);
                let target_value = self.dataflow.value(target);
                if let Some(hooks) = self.hooks.as_deref_mut() {
                    if let Some(address) = target_value.abstract_value().as_concrete() {
                        hooks.called_address(stmt, address.value());
                    }
                    hooks.simulate_call(stmt, function, &mut self.dataflow, context);
                }
            }
            StatementKind::Return => {
                if let Some(hooks) = self.hooks.as_deref_mut() {
                    hooks.simulate_return(stmt, function, &mut self.dataflow, context);
                }
            }
            StatementKind::Touch { term, .. } => {
                self.simulate_term(*term, context);
            }
            StatementKind::Callback => {}
        }
    }

    /// The definition carries the assigned value; choices forward it to
    /// both alternatives.
    fn propagate_assigned_value(&mut self, left: TermId, value: &Value) {
        let term = self.function.term(left);
        let slot = self.dataflow.value_mut(left);
        slot.set_abstract_value(value.abstract_value().resize(term.size));
        slot.copy_flags(value);
        if let TermKind::Choice { preferred, default } = term.kind {
            self.propagate_assigned_value(preferred, value);
            self.propagate_assigned_value(default, value);
        }
    }

    fn simulate_term(&mut self, id: TermId, context: &mut SimulationContext<'_>) {
        let function = self.function;
        let term = function.term(id);
        match &term.kind {
            TermKind::IntConst(constant) => {
                let size = term.size;
                let constant = *constant;
                let value = self.dataflow.value_mut(id);
                value.set_abstract_value(AbstractValue::concrete(size, constant));
                value.make_not_stack_offset();
                value.make_not_product();
            }
            TermKind::Intrinsic | TermKind::Undefined => {
                let size = term.size;
                let value = self.dataflow.value_mut(id);
                value.set_abstract_value(AbstractValue::top(size));
                value.make_not_stack_offset();
                value.make_not_product();
            }
            TermKind::MemoryLocationAccess(location) => {
                let location = *location;
                self.dataflow.set_memory_location(id, location);

                // The value of the instruction pointer is always easy to
                // guess.
                if self.arch.instruction_pointer() == Some(&location) {
                    if let Some(address) = term
                        .stmt
                        .and_then(|stmt| function.statement(stmt).instruction_address())
                    {
                        self.dataflow
                            .value_mut(id)
                            .set_abstract_value(AbstractValue::concrete(term.size, address));
                    }
                }
            }
            TermKind::Dereference { addr, domain } => {
                let (addr, domain) = (*addr, *domain);
                let size = term.size as i64;
                self.simulate_term(addr, context);

                let addr_value = self.dataflow.value(addr);
                if let Some(concrete) = addr_value.abstract_value().as_concrete() {
                    let location = if domain == MemoryDomain::Memory {
                        MemoryLocation::new(domain, concrete.value() as i64 * 8, size)
                    } else {
                        MemoryLocation::new(domain, concrete.value() as i64, size)
                    };
                    self.dataflow.set_memory_location(id, location);
                } else if let Some(offset) = addr_value.stack_offset_value() {
                    self.dataflow.set_memory_location(
                        id,
                        MemoryLocation::new(MemoryDomain::Stack, offset * 8, size),
                    );
                } else {
                    self.dataflow.unset_memory_location(id);
                }
            }
            TermKind::UnaryOp { op, operand } => {
                self.simulate_unary_operator(id, *op, *operand, context);
            }
            TermKind::BinaryOp { op, left, right } => {
                self.simulate_binary_operator(id, *op, *left, *right, context);
            }
            TermKind::Choice { preferred, default } => {
                let (preferred, default) = (*preferred, *default);
                self.simulate_term(preferred, context);
                self.simulate_term(default, context);

                let chosen = if self.dataflow.has_definitions(preferred) {
                    preferred
                } else {
                    default
                };
                let value = self.dataflow.value(chosen);
                *self.dataflow.value_mut(id) = value;
            }
        }

        self.process_access(id, context);
    }

    /// Common handling once a term's location is known: reads collect their
    /// reaching definitions and merge the defined values in, writes add a
    /// definition, kills remove them.
    fn process_access(&mut self, id: TermId, context: &mut SimulationContext<'_>) {
        let function = self.function;
        let term = function.term(id);

        let Some(&location) = self.dataflow.memory_location(id) else {
            if term.is_read() {
                self.dataflow.clear_definitions(id);
            }
            return;
        };

        if self.arch.is_global_memory(&location) {
            // Global reads are unknown sources.
            if term.is_read() {
                self.dataflow.clear_definitions(id);
            }
            return;
        }

        if term.is_read() {
            let definitions = context.definitions().get_definitions(location);

            let mut abstract_value = *self.dataflow.value(id).abstract_value();
            let mut stack_offset = StackOffset::Unknown;
            let mut product = Product::Unknown;

            for (defined_location, defining_terms) in definitions.iter() {
                debug_assert!(location.covers(defined_location));

                for &definition in defining_terms {
                    let Some(&definition_location) = self.dataflow.memory_location(definition)
                    else {
                        continue;
                    };
                    if !definition_location.covers(defined_location) {
                        continue;
                    }

                    let definition_value = self.dataflow.value(definition);

                    // Shift the definition's value so the bits covering the
                    // defined location line up with their position inside
                    // the term's location, then project those bits out.
                    let (value_shift, mask_shift) = match self.arch.byte_order() {
                        ByteOrder::Little => (
                            definition_location.addr - location.addr,
                            defined_location.addr - location.addr,
                        ),
                        ByteOrder::Big => (
                            location.end_addr() - definition_location.end_addr(),
                            location.end_addr() - defined_location.end_addr(),
                        ),
                    };
                    let mask = bit_shift(
                        bit_mask(defined_location.size.min(64) as u32),
                        mask_shift,
                    );
                    let contribution = definition_value
                        .abstract_value()
                        .shift(value_shift)
                        .project(mask);
                    abstract_value = abstract_value.merge(&contribution);

                    if *defined_location == location && definition_location == location {
                        stack_offset =
                            combine_stack_offset(stack_offset, definition_value.stack_offset());
                        product = combine_product(product, definition_value.product());
                    } else {
                        stack_offset = StackOffset::NotOffset;
                        product = Product::NotProduct;
                    }
                }
            }

            self.dataflow.set_definitions(id, definitions);

            let size = term.size;
            let value = self.dataflow.value_mut(id);
            value.set_abstract_value(abstract_value.resize(size));
            match stack_offset {
                StackOffset::Offset(offset) => value.make_stack_offset(offset),
                StackOffset::NotOffset => value.make_not_stack_offset(),
                StackOffset::Unknown => {}
            }
            match product {
                Product::Product => value.make_product(),
                Product::NotProduct => value.make_not_product(),
                Product::Unknown => {}
            }
        }
        if term.is_write() {
            context.definitions_mut().add_definition(location, id);
        }
        if term.is_kill() {
            context.definitions_mut().kill_definitions(location);
        }
    }

    fn simulate_unary_operator(
        &mut self,
        id: TermId,
        op: UnaryOpKind,
        operand: TermId,
        context: &mut SimulationContext<'_>,
    ) {
        self.simulate_term(operand, context);

        let size = self.function.term(id).size;
        let operand_value = self.dataflow.value(operand);
        let result = apply_unary(op, operand_value.abstract_value(), size);

        let value = self.dataflow.value_mut(id);
        value.set_abstract_value(result);

        match op {
            UnaryOpKind::SignExtend | UnaryOpKind::ZeroExtend | UnaryOpKind::Truncate => {
                match operand_value.stack_offset() {
                    StackOffset::Offset(offset) => value.make_stack_offset(offset),
                    StackOffset::NotOffset => value.make_not_stack_offset(),
                    StackOffset::Unknown => {}
                }
                match operand_value.product() {
                    Product::Product => value.make_product(),
                    Product::NotProduct => value.make_not_product(),
                    Product::Unknown => {}
                }
            }
            _ => {
                value.make_not_stack_offset();
                value.make_not_product();
            }
        }
    }

    fn simulate_binary_operator(
        &mut self,
        id: TermId,
        op: BinaryOpKind,
        left: TermId,
        right: TermId,
        context: &mut SimulationContext<'_>,
    ) {
        self.simulate_term(left, context);
        self.simulate_term(right, context);

        let size = self.function.term(id).size;
        let left_value = self.dataflow.value(left);
        let right_value = self.dataflow.value(right);
        let result = apply_binary(
            op,
            left_value.abstract_value(),
            right_value.abstract_value(),
        );

        let value = self.dataflow.value_mut(id);
        value.set_abstract_value(result);

        // Stack-offset propagation.
        match op {
            BinaryOpKind::Add => {
                if let Some(constant) = left_value.abstract_value().as_concrete() {
                    if let Some(offset) = right_value.stack_offset_value() {
                        value.make_stack_offset(constant.signed_value().wrapping_add(offset));
                    } else if right_value.is_not_stack_offset() {
                        value.make_not_stack_offset();
                    }
                } else if left_value.abstract_value().is_nondeterministic() {
                    value.make_not_stack_offset();
                }
                if let Some(constant) = right_value.abstract_value().as_concrete() {
                    if let Some(offset) = left_value.stack_offset_value() {
                        value.make_stack_offset(offset.wrapping_add(constant.signed_value()));
                    } else if left_value.is_not_stack_offset() {
                        value.make_not_stack_offset();
                    }
                } else if right_value.abstract_value().is_nondeterministic() {
                    value.make_not_stack_offset();
                }
            }
            BinaryOpKind::Sub => {
                if let (Some(offset), Some(constant)) = (
                    left_value.stack_offset_value(),
                    right_value.abstract_value().as_concrete(),
                ) {
                    value.make_stack_offset(offset.wrapping_sub(constant.signed_value()));
                } else if left_value.is_not_stack_offset()
                    || right_value.abstract_value().is_nondeterministic()
                {
                    value.make_not_stack_offset();
                }
            }
            BinaryOpKind::And => {
                // Used for aligning stack pointer values.
                if let (Some(offset), Some(constant)) = (
                    left_value.stack_offset_value(),
                    right_value.abstract_value().as_concrete(),
                ) {
                    value.make_stack_offset(masked_offset(offset, constant.value(), size));
                } else if let (Some(offset), Some(constant)) = (
                    right_value.stack_offset_value(),
                    left_value.abstract_value().as_concrete(),
                ) {
                    value.make_stack_offset(masked_offset(offset, constant.value(), size));
                } else if (left_value.abstract_value().is_nondeterministic()
                    && left_value.is_not_stack_offset())
                    || (right_value.abstract_value().is_nondeterministic()
                        && right_value.is_not_stack_offset())
                {
                    value.make_not_stack_offset();
                }
            }
            _ => {
                value.make_not_stack_offset();
            }
        }

        // Product flag.
        match op {
            BinaryOpKind::Mul | BinaryOpKind::Shl => value.make_product(),
            _ => value.make_not_product(),
        }
    }
}

fn combine_stack_offset(acc: StackOffset, new: StackOffset) -> StackOffset {
    match (acc, new) {
        (acc, StackOffset::Unknown) => acc,
        (StackOffset::Unknown, new) => new,
        (StackOffset::Offset(a), StackOffset::Offset(b)) if a == b => acc,
        _ => StackOffset::NotOffset,
    }
}

fn combine_product(acc: Product, new: Product) -> Product {
    match (acc, new) {
        (acc, Product::Unknown) => acc,
        (Product::Unknown, new) => new,
        (Product::Product, Product::Product) => acc,
        _ => Product::NotProduct,
    }
}

/// ANDs a stack offset with an alignment mask at the operation's width.
fn masked_offset(offset: i64, mask: u64, size: u32) -> i64 {
    crate::abstract_value::SizedValue::new(size, offset as u64 & mask).signed_value()
}

fn apply_unary(op: UnaryOpKind, operand: &AbstractValue, size: u32) -> AbstractValue {
    match op {
        UnaryOpKind::Not => operand.not().resize(size),
        UnaryOpKind::Negation => operand.neg().resize(size),
        UnaryOpKind::SignExtend => {
            if operand.size() < size {
                operand.sign_extend(size)
            } else {
                operand.resize(size)
            }
        }
        UnaryOpKind::ZeroExtend => {
            if operand.size() < size {
                operand.zero_extend(size)
            } else {
                operand.resize(size)
            }
        }
        UnaryOpKind::Truncate => operand.resize(size),
    }
}

fn apply_binary(op: BinaryOpKind, left: &AbstractValue, right: &AbstractValue) -> AbstractValue {
    match op {
        BinaryOpKind::And => left.and(right),
        BinaryOpKind::Or => left.or(right),
        BinaryOpKind::Xor => left.xor(right),
        BinaryOpKind::Shl => left.shl(right),
        BinaryOpKind::Shr => left.shr(right),
        BinaryOpKind::Sar => left.sar(right),
        BinaryOpKind::Add => left.add(right),
        BinaryOpKind::Sub => left.sub(right),
        BinaryOpKind::Mul => left.mul(right),
        BinaryOpKind::SignedDiv => left.div_signed(right),
        BinaryOpKind::SignedRem => left.rem_signed(right),
        BinaryOpKind::UnsignedDiv => left.div_unsigned(right),
        BinaryOpKind::UnsignedRem => left.rem_unsigned(right),
        BinaryOpKind::Equal => left.equal(right),
        BinaryOpKind::SignedLess => left.less_signed(right),
        BinaryOpKind::SignedLessOrEqual => left.less_or_equal_signed(right),
        BinaryOpKind::UnsignedLess => left.less_unsigned(right),
        BinaryOpKind::UnsignedLessOrEqual => left.less_or_equal_unsigned(right),
    }
}
