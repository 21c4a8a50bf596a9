//! The function-definition generator.
//!
//! Walks the control-flow region tree and lowers IR statements and terms to
//! the C-like tree, routing fallthroughs through three basic-block
//! sentinels (`next`, `break`, `continue`) so that structured control flow
//! needs as few `goto`s as possible.

use indexmap::IndexMap;
use log::warn;

use cryo_dflow::{ConventionHooks, Dataflow, SizedValue};
use cryo_ir::{
    Architecture, BasicBlockId, BinaryOpKind, CancellationToken, Cfg, DominatorTree, Function,
    Image, JumpTarget, MemoryDomain, MemoryLocation, NodeId, RegionKind, RegionNode, RegionTree,
    StatementKind, StmtId, TermId, TermKind, UnaryOpKind,
};

use crate::error::GenerateError;
use crate::likec::{
    annotate_stmt, annotate_term, CBinaryOp, CBlock, CExpr, CStatement, CStatementKind, CType,
    CUnaryOp, FunctionDefinition, VariableDeclaration,
};
use crate::options::GeneratorOptions;
use crate::oracles::{Globals, Liveness, Signatures, Ty, Types, VarId, Variables};
use crate::policy::SubstitutionPolicy;
use crate::switch_context::SwitchContext;

/// Emits the C-like definition of one reconstructed function.
pub struct FunctionGenerator<'a> {
    function: &'a Function,
    arch: &'a Architecture,
    image: Option<&'a Image>,
    dataflow: &'a Dataflow,
    regions: &'a RegionTree,
    liveness: &'a dyn Liveness,
    variables: &'a dyn Variables,
    types: &'a dyn Types,
    signatures: &'a dyn Signatures,
    globals: &'a dyn Globals,
    hooks: Option<&'a dyn ConventionHooks>,
    options: GeneratorOptions,
    cfg: Cfg,
    policy: Option<SubstitutionPolicy<'a>>,
    labels: IndexMap<BasicBlockId, String>,
    local_names: IndexMap<VarId, String>,
    declarations: Vec<VariableDeclaration>,
}

impl<'a> FunctionGenerator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        function: &'a Function,
        arch: &'a Architecture,
        dataflow: &'a Dataflow,
        regions: &'a RegionTree,
        liveness: &'a dyn Liveness,
        variables: &'a dyn Variables,
        types: &'a dyn Types,
        signatures: &'a dyn Signatures,
        globals: &'a dyn Globals,
    ) -> Self {
        Self {
            function,
            arch,
            image: None,
            dataflow,
            regions,
            liveness,
            variables,
            types,
            signatures,
            globals,
            hooks: None,
            options: GeneratorOptions::default(),
            cfg: Cfg::new(function),
            policy: None,
            labels: IndexMap::new(),
            local_names: IndexMap::new(),
            declarations: Vec::new(),
        }
    }

    /// Attaches the image, enabling string-literal synthesis.
    pub fn with_image(mut self, image: &'a Image) -> Self {
        self.image = Some(image);
        self
    }

    /// Attaches the calling-convention hooks used for argument binding.
    pub fn with_hooks(mut self, hooks: &'a dyn ConventionHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_options(mut self, options: GeneratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Produces the function definition.
    pub fn generate(
        mut self,
        canceled: &CancellationToken,
    ) -> Result<FunctionDefinition, GenerateError> {
        let function = self.function;
        let dominators =
            DominatorTree::compute(&self.cfg, canceled).map_err(|_| GenerateError::Cancelled)?;
        self.policy = Some(SubstitutionPolicy::new(
            function,
            self.dataflow,
            self.liveness,
            self.variables,
            dominators,
            self.options.inline_intermediate_variables,
        ));

        let signatures = self.signatures;
        let signature = signatures.function_signature(function);

        let mut definition = FunctionDefinition {
            name: signature
                .map(|s| s.name.clone())
                .unwrap_or_else(|| function.name().to_string()),
            return_type: signature
                .and_then(|s| s.return_type.as_ref())
                .map(make_type)
                .unwrap_or(CType::Void),
            parameters: Vec::new(),
            variadic: signature.is_some_and(|s| s.variadic),
            comment: signature.and_then(|s| s.comment.clone()),
            declarations: Vec::new(),
            labels: Vec::new(),
            body: CBlock::new(),
        };

        // Bind signature arguments to the terms the entry hook injected.
        // An argument whose term covers its variable exactly becomes the
        // variable's declaration; otherwise the value is copied over.
        if let (Some(signature), Some(hooks)) = (signature, self.hooks) {
            for (index, parameter) in signature.parameters.iter().enumerate() {
                let Some(term) = hooks.entry_argument_term(index) else {
                    debug_assert!(false, "entry hook must bind every signature argument");
                    continue;
                };
                let location = self.dataflow.memory_location(term).copied();
                debug_assert!(location.is_some(), "argument must have a memory location");

                let ty = make_type(&self.types.type_of(term));
                definition.parameters.push(VariableDeclaration {
                    name: parameter.name.clone(),
                    ty,
                });

                let predeclared = match (location, self.variables.variable_of(term)) {
                    (Some(location), Some(var))
                        if self.variables.get(var).location == location =>
                    {
                        Some(var)
                    }
                    _ => None,
                };
                if let Some(var) = predeclared {
                    self.local_names.insert(var, parameter.name.clone());
                } else {
                    let access = self.make_variable_access(term);
                    definition.body.push(CStatement::expression(CExpr::binary(
                        CBinaryOp::Assign,
                        access,
                        CExpr::variable(parameter.name.clone()),
                    )));
                }
            }
        }

        let mut body = std::mem::take(&mut definition.body);
        let mut switch_context = SwitchContext::new();
        self.make_statements(
            self.regions.root(),
            &mut body,
            None,
            None,
            None,
            &mut switch_context,
        );
        definition.body = body;

        definition.declarations = std::mem::take(&mut self.declarations);
        definition.labels = self.labels.values().cloned().collect();
        Ok(definition)
    }

    // ==================== Labels ====================

    /// Issues the label of a basic block, once.
    fn label(&mut self, block: BasicBlockId) -> String {
        if let Some(name) = self.labels.get(&block) {
            return name.clone();
        }
        let index = self.labels.len();
        let name = match self.function.block(block).address {
            Some(address) => format!("addr_0x{:x}_{}", address, index),
            None => format!("label_{}", index),
        };
        self.labels.insert(block, name.clone());
        name
    }

    /// Emits the block's label, plus case/default labels when the block is
    /// a switch target. Case values for the address are consumed.
    fn add_labels(
        &mut self,
        bb: BasicBlockId,
        block: &mut CBlock,
        switch_context: &mut SwitchContext,
    ) {
        let name = self.label(bb);
        block.push(CStatement::new(CStatementKind::Label(name)));

        if let Some(address) = self.function.block(bb).address {
            if switch_context.default_block() == Some(bb) {
                block.push(CStatement::new(CStatementKind::DefaultLabel));
            } else {
                let ty = switch_context.value_type().clone();
                for value in switch_context.case_values(address).to_vec() {
                    block.push(CStatement::new(CStatementKind::CaseLabel {
                        value,
                        ty: ty.clone(),
                    }));
                }
            }
            switch_context.erase_case_values(address);
        }
    }

    // ==================== Region recursion ====================

    fn make_statements(
        &mut self,
        node: NodeId,
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let regions = self.regions;
        match regions.node(node) {
            RegionNode::Basic { block: bb } => {
                let bb = *bb;
                self.add_labels(bb, block, switch_context);
                for &stmt in self.function.statements_of(bb) {
                    if let Some(statement) =
                        self.make_statement(stmt, next_bb, break_bb, continue_bb)
                    {
                        block.push(statement);
                    }
                }
            }
            RegionNode::Region { kind, .. } => match kind {
                RegionKind::Unknown => {
                    // DFS order tends to minimize the number of gotos.
                    let order = regions.dfs_preorder(node, &self.cfg);
                    self.make_statements_list(
                        &order,
                        block,
                        next_bb,
                        break_bb,
                        continue_bb,
                        switch_context,
                    );
                }
                RegionKind::Block | RegionKind::CompoundCondition => {
                    let children = regions.children(node).to_vec();
                    self.make_statements_list(
                        &children,
                        block,
                        next_bb,
                        break_bb,
                        continue_bb,
                        switch_context,
                    );
                }
                RegionKind::IfThenElse => {
                    self.make_if_then_else(node, block, next_bb, break_bb, continue_bb, switch_context)
                }
                RegionKind::IfThen => {
                    self.make_if_then(node, block, next_bb, break_bb, continue_bb, switch_context)
                }
                RegionKind::Loop => {
                    self.make_loop(node, block, next_bb, break_bb, continue_bb, switch_context)
                }
                RegionKind::While => {
                    self.make_while(node, block, next_bb, break_bb, continue_bb, switch_context)
                }
                RegionKind::DoWhile => {
                    self.make_do_while(node, block, next_bb, break_bb, continue_bb, switch_context)
                }
                RegionKind::Switch => {
                    self.make_switch(node, block, next_bb, break_bb, continue_bb, switch_context)
                }
            },
        }
    }

    /// Emits a sequence of sibling nodes; each node's fallthrough sentinel
    /// is the next node's entry block.
    fn make_statements_list(
        &mut self,
        nodes: &[NodeId],
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let Some((&last, rest)) = nodes.split_last() else {
            return;
        };
        for (i, &node) in rest.iter().enumerate() {
            let next = self.regions.entry_block(nodes[i + 1]);
            self.make_statements(node, block, next, break_bb, continue_bb, switch_context);
        }
        self.make_statements(last, block, next_bb, break_bb, continue_bb, switch_context);
    }

    fn make_if_then_else(
        &mut self,
        node: NodeId,
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let regions = self.regions;
        let children = regions.children(node).to_vec();
        debug_assert_eq!(children.len(), 3);
        if children.len() != 3 {
            return self.make_statements_list(
                &children,
                block,
                next_bb,
                break_bb,
                continue_bb,
                switch_context,
            );
        }

        let then_entry = regions.entry_block(children[1]);
        let else_entry = regions.entry_block(children[2]);
        let condition = self.make_expression_node(
            children[0],
            Some(&mut *block),
            then_entry,
            else_entry,
            switch_context,
        );

        let mut then_block = CBlock::new();
        self.make_statements(
            children[1],
            &mut then_block,
            next_bb,
            break_bb,
            continue_bb,
            switch_context,
        );
        let mut else_block = CBlock::new();
        self.make_statements(
            children[2],
            &mut else_block,
            next_bb,
            break_bb,
            continue_bb,
            switch_context,
        );

        block.push(CStatement::new(CStatementKind::If {
            condition,
            then_stmt: Box::new(CStatement::block(then_block)),
            else_stmt: Some(Box::new(CStatement::block(else_block))),
        }));
    }

    fn make_if_then(
        &mut self,
        node: NodeId,
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let regions = self.regions;
        let children = regions.children(node).to_vec();
        debug_assert_eq!(children.len(), 2);
        debug_assert!(regions.exit_block(node).is_some());
        if children.len() != 2 {
            return self.make_statements_list(
                &children,
                block,
                next_bb,
                break_bb,
                continue_bb,
                switch_context,
            );
        }

        let then_entry = regions.entry_block(children[1]);
        let exit = regions.exit_block(node).or(next_bb);
        let condition = self.make_expression_node(
            children[0],
            Some(&mut *block),
            then_entry,
            exit,
            switch_context,
        );

        let mut then_block = CBlock::new();
        self.make_statements(
            children[1],
            &mut then_block,
            next_bb,
            break_bb,
            continue_bb,
            switch_context,
        );

        block.push(CStatement::new(CStatementKind::If {
            condition,
            then_stmt: Box::new(CStatement::block(then_block)),
            else_stmt: None,
        }));
    }

    fn make_loop(
        &mut self,
        node: NodeId,
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        _break_bb: Option<BasicBlockId>,
        _continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let regions = self.regions;
        let order = regions.dfs_preorder(node, &self.cfg);
        let entry_bb = regions.entry_block(node);

        let condition = CExpr::integer(1, CType::integer(self.arch.int_size(), false));
        let mut body = CBlock::new();
        self.make_statements_list(&order, &mut body, entry_bb, next_bb, entry_bb, switch_context);

        block.push(CStatement::new(CStatementKind::While {
            condition,
            body: Box::new(CStatement::block(body)),
        }));
    }

    fn make_while(
        &mut self,
        node: NodeId,
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let regions = self.regions;
        let Some(entry_node) = regions.entry(node) else {
            debug_assert!(false, "while region must have a condition entry");
            return self.make_loop(node, block, next_bb, break_bb, continue_bb, switch_context);
        };
        debug_assert!(regions.exit_block(node).is_some());

        let condition_bb = regions.entry_block(entry_node);
        if let Some(bb) = condition_bb {
            self.add_labels(bb, block, switch_context);
        }

        let mut order = regions.dfs_preorder(node, &self.cfg);
        debug_assert_eq!(order.first(), Some(&entry_node));
        order.retain(|&n| n != entry_node);

        let body_entry = order
            .first()
            .and_then(|&n| regions.entry_block(n))
            .or(condition_bb);
        let exit_bb = regions.exit_block(node);

        let condition = self.make_expression_node(
            entry_node,
            None,
            body_entry,
            exit_bb.or(next_bb),
            switch_context,
        );

        let mut body = CBlock::new();
        self.make_statements_list(
            &order,
            &mut body,
            condition_bb,
            exit_bb,
            condition_bb,
            switch_context,
        );

        block.push(CStatement::new(CStatementKind::While {
            condition,
            body: Box::new(CStatement::block(body)),
        }));

        if let Some(exit) = exit_bb {
            if let Some(jump) = self.make_jump_to_block(exit, next_bb, break_bb, continue_bb) {
                block.push(jump);
            }
        }
    }

    fn make_do_while(
        &mut self,
        node: NodeId,
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let regions = self.regions;
        let Some(condition_node) = regions.loop_condition(node) else {
            debug_assert!(false, "do-while region must have a loop condition");
            return self.make_loop(node, block, next_bb, break_bb, continue_bb, switch_context);
        };
        debug_assert!(regions.exit_block(node).is_some());

        let condition_bb = regions.entry_block(condition_node);

        let mut order = regions.dfs_preorder(node, &self.cfg);
        debug_assert!(order.contains(&condition_node));
        order.retain(|&n| n != condition_node);

        let mut body = CBlock::new();
        self.make_statements_list(
            &order,
            &mut body,
            condition_bb,
            next_bb,
            condition_bb,
            switch_context,
        );

        let entry_bb = regions.entry_block(node);
        let exit_bb = regions.exit_block(node);
        let condition = self.make_expression_node(
            condition_node,
            Some(&mut body),
            entry_bb,
            exit_bb.or(next_bb),
            switch_context,
        );

        block.push(CStatement::new(CStatementKind::DoWhile {
            body: Box::new(CStatement::block(body)),
            condition,
        }));

        if let Some(exit) = exit_bb {
            if let Some(jump) = self.make_jump_to_block(exit, next_bb, break_bb, continue_bb) {
                block.push(jump);
            }
        }
    }

    fn make_switch(
        &mut self,
        node: NodeId,
        block: &mut CBlock,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) {
        let regions = self.regions;
        let Some(data) = regions.switch_data(node).cloned() else {
            debug_assert!(false, "switch region must carry switch data");
            let children = regions.children(node).to_vec();
            return self.make_statements_list(
                &children,
                block,
                next_bb,
                break_bb,
                continue_bb,
                switch_context,
            );
        };

        // The bounds check and the table jump emit everything but their
        // terminators; no gotos are created for them.
        if let Some(bounds_node) = data.bounds_check_node {
            if let Some(bb) = regions.entry_block(bounds_node) {
                self.make_statements_but_last(bb, block, switch_context);
            }
        }
        let Some(switch_bb) = regions.entry_block(data.switch_node) else {
            debug_assert!(false, "switch node must wrap a basic block");
            return;
        };
        self.make_statements_but_last(switch_bb, block, switch_context);

        let table = self.function.terminator_jump(switch_bb).and_then(|(_, jump)| {
            debug_assert!(!jump.is_conditional());
            jump.then_target.table().cloned()
        });
        let Some(table) = table else {
            debug_assert!(false, "switch node must end in a table jump");
            warn!(
                "switch region of {} has no jump table; skipping",
                self.function.name()
            );
            return;
        };

        let value_type = CType::integer(self.function.term(data.switch_term).size, false);
        let mut inner_context = SwitchContext::new();
        inner_context.set_value_type(value_type.clone());
        for (index, entry) in table.iter().take(data.table_size).enumerate() {
            inner_context.add_case_value(entry.address, index as u64);
        }
        if let Some(default_block) = data.default_block {
            inner_context.set_default_block(default_block);
        }

        let exit_bb = regions.exit_block(node).or(next_bb);

        let value = CExpr::cast(value_type, self.make_expression(data.switch_term));

        let mut order = regions.dfs_preorder(node, &self.cfg);
        order.retain(|&n| Some(n) != data.bounds_check_node && n != data.switch_node);

        let mut body = CBlock::new();
        self.make_statements_list(&order, &mut body, exit_bb, exit_bb, continue_bb, &mut inner_context);

        // Case values whose target lies outside the switch fall back to
        // gotos on the literal address.
        let pointer_type = CType::integer(self.arch.pointer_size(), false);
        let leftovers: Vec<(u64, Vec<u64>)> = inner_context
            .remaining()
            .map(|(address, values)| (address, values.to_vec()))
            .collect();
        for (address, values) in leftovers {
            for case in values {
                body.push(CStatement::new(CStatementKind::CaseLabel {
                    value: case,
                    ty: inner_context.value_type().clone(),
                }));
            }
            body.push(CStatement::new(CStatementKind::Goto(CExpr::integer(
                address,
                pointer_type.clone(),
            ))));
        }

        block.push(CStatement::new(CStatementKind::Switch {
            value,
            body: Box::new(CStatement::block(body)),
        }));

        if let Some(exit) = exit_bb {
            if let Some(jump) = self.make_jump_to_block(exit, next_bb, break_bb, continue_bb) {
                block.push(jump);
            }
        }
    }

    /// Emits a basic block's labels and statements, except its terminator.
    fn make_statements_but_last(
        &mut self,
        bb: BasicBlockId,
        block: &mut CBlock,
        switch_context: &mut SwitchContext,
    ) {
        self.add_labels(bb, block, switch_context);
        let statements = self.function.statements_of(bb);
        let Some((_, rest)) = statements.split_last() else {
            return;
        };
        for &stmt in rest {
            if let Some(statement) = self.make_statement(stmt, None, None, None) {
                block.push(statement);
            }
        }
    }

    // ==================== Condition synthesis ====================

    /// Builds the boolean expression of a condition node, routed so that
    /// truth transfers control to `then_bb` and falsehood to `else_bb`.
    fn make_expression_node(
        &mut self,
        node: NodeId,
        mut block: Option<&mut CBlock>,
        then_bb: Option<BasicBlockId>,
        else_bb: Option<BasicBlockId>,
        switch_context: &mut SwitchContext,
    ) -> CExpr {
        let function = self.function;
        let regions = self.regions;
        debug_assert!(regions.is_condition(node, function));

        match regions.node(node) {
            RegionNode::Basic { block: bb } => {
                let bb = *bb;
                if let Some(out) = block.as_deref_mut() {
                    self.add_labels(bb, out, switch_context);
                }

                let mut result: Option<CExpr> = None;
                for &stmt in function.statements_of(bb) {
                    let mut expression = None;

                    if let Some(jump) = function.statement(stmt).as_jump() {
                        let jump_then = jump.then_target.block();
                        let jump_else = jump.else_target.as_ref().and_then(|t| t.block());
                        debug_assert!(
                            (jump_then == then_bb && jump_else == else_bb)
                                || (jump_then == else_bb && jump_else == then_bb)
                        );

                        let mut condition = match jump.condition {
                            Some(term) => self.make_expression(term),
                            None => {
                                debug_assert!(false, "condition node must branch conditionally");
                                CExpr::integer(1, CType::integer(1, false))
                            }
                        };
                        if jump_then != then_bb {
                            condition = CExpr::unary(CUnaryOp::LogicalNot, condition);
                        }
                        expression = Some(condition);
                    } else if let Some(statement) = self.make_statement(stmt, None, None, None) {
                        if let Some(out) = block.as_deref_mut() {
                            out.push(statement);
                        } else if let CStatementKind::Expression(expr) = statement.kind {
                            // Side effects survive as comma operands.
                            expression = Some(expr);
                        }
                    }

                    if let Some(expr) = expression {
                        result = Some(match result {
                            Some(acc) => CExpr::binary(CBinaryOp::Comma, acc, expr),
                            None => expr,
                        });
                    }
                }

                result.unwrap_or_else(|| {
                    debug_assert!(false, "condition node produced no expression");
                    warn!(
                        "condition block of {} produced no expression",
                        self.function.name()
                    );
                    CExpr::integer(1, CType::integer(1, false))
                })
            }
            RegionNode::Region { kind, children, .. } => {
                debug_assert_eq!(*kind, RegionKind::CompoundCondition);
                debug_assert_eq!(children.len(), 2);
                if children.len() != 2 {
                    return CExpr::integer(1, CType::integer(1, false));
                }
                let (first, second) = (children[0], children[1]);

                // Distinguishing AND from OR by where the left child's jump
                // leads:
                //   if (a || b) { then } else { else }:  a -> then | b
                //   if (a && b) { then } else { else }:  a -> b | else
                let mut leaf = first;
                while let RegionNode::Region { children, .. } = regions.node(leaf) {
                    let Some(&last) = children.last() else {
                        break;
                    };
                    leaf = last;
                }
                let jump = match regions.node(leaf) {
                    RegionNode::Basic { block } => {
                        function.terminator_jump(*block).map(|(_, jump)| jump)
                    }
                    RegionNode::Region { .. } => None,
                };
                let Some(jump) = jump else {
                    debug_assert!(false, "compound condition must contain a jump");
                    return CExpr::integer(1, CType::integer(1, false));
                };

                let jump_then = jump.then_target.block();
                let jump_else = jump.else_target.as_ref().and_then(|t| t.block());
                let second_entry = regions.entry_block(second);

                if then_bb.is_some() && (jump_then == then_bb || jump_else == then_bb) {
                    let left =
                        self.make_expression_node(first, block, then_bb, second_entry, switch_context);
                    let right =
                        self.make_expression_node(second, None, then_bb, else_bb, switch_context);
                    CExpr::binary(CBinaryOp::LogicalOr, left, right)
                } else if else_bb.is_some() && (jump_then == else_bb || jump_else == else_bb) {
                    let left =
                        self.make_expression_node(first, block, second_entry, else_bb, switch_context);
                    let right =
                        self.make_expression_node(second, None, then_bb, else_bb, switch_context);
                    CExpr::binary(CBinaryOp::LogicalAnd, left, right)
                } else {
                    debug_assert!(
                        false,
                        "compound condition must jump to the then or else block"
                    );
                    CExpr::integer(1, CType::integer(1, false))
                }
            }
        }
    }

    // ==================== Statement lowering ====================

    fn make_statement(
        &mut self,
        stmt: StmtId,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
    ) -> Option<CStatement> {
        let mut result = self.do_make_statement(stmt, next_bb, break_bb, continue_bb)?;
        annotate_stmt(&mut result, stmt);
        Some(result)
    }

    fn do_make_statement(
        &mut self,
        stmt: StmtId,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
    ) -> Option<CStatement> {
        let function = self.function;
        match &function.statement(stmt).kind {
            StatementKind::InlineAssembly => {
                let text = function
                    .statement(stmt)
                    .instruction
                    .as_ref()
                    .map(|i| i.text.clone())
                    .unwrap_or_default();
                Some(CStatement::new(CStatementKind::InlineAssembly(text)))
            }
            StatementKind::Comment(text) => {
                Some(CStatement::new(CStatementKind::Comment(text.clone())))
            }
            StatementKind::Assignment { left, right } => {
                let (left, right) = (*left, *right);
                if !self.liveness.is_live(left) {
                    return None;
                }
                if let Some(var) = self.variables.variable_of(left) {
                    if self.is_intermediate(var) {
                        return None;
                    }
                }
                let left_expr = self.make_expression(left);
                let ty = make_type(&self.types.type_of(left));
                let right_expr = self.make_expression(right);
                Some(CStatement::expression(CExpr::binary(
                    CBinaryOp::Assign,
                    left_expr,
                    CExpr::cast(ty, right_expr),
                )))
            }
            StatementKind::Kill(_) => None,
            StatementKind::Jump(jump) => {
                if jump.is_conditional() {
                    let condition_term = jump.condition;
                    let then_jump =
                        self.make_jump_target(&jump.then_target, next_bb, break_bb, continue_bb);
                    let else_jump = jump.else_target.as_ref().and_then(|target| {
                        self.make_jump_target(target, next_bb, break_bb, continue_bb)
                    });
                    let mut condition = match condition_term {
                        Some(term) => self.make_expression(term),
                        None => CExpr::integer(1, CType::integer(1, false)),
                    };
                    match (then_jump, else_jump) {
                        (None, None) => None,
                        (None, Some(else_stmt)) => {
                            condition = CExpr::unary(CUnaryOp::LogicalNot, condition);
                            Some(CStatement::new(CStatementKind::If {
                                condition,
                                then_stmt: Box::new(else_stmt),
                                else_stmt: None,
                            }))
                        }
                        (Some(then_stmt), else_stmt) => Some(CStatement::new(CStatementKind::If {
                            condition,
                            then_stmt: Box::new(then_stmt),
                            else_stmt: else_stmt.map(Box::new),
                        })),
                    }
                } else {
                    self.make_jump_target(&jump.then_target, next_bb, break_bb, continue_bb)
                }
            }
            StatementKind::Call { target } => {
                let target = *target;
                let signatures = self.signatures;

                let mut target_expr = None;
                if let Some(address) = self.dataflow.value(target).abstract_value().as_concrete() {
                    if let Some(signature) = signatures.signature_at(address.value()) {
                        let mut expr = CExpr::function_ref(signature.name.clone());
                        expr.term = Some(target);
                        target_expr = Some(expr);
                    }
                }
                let target_expr = match target_expr {
                    Some(expr) => expr,
                    None => self.make_expression(target),
                };

                let mut args = Vec::new();
                if let (Some(signature), Some(hooks)) = (signatures.call_signature(stmt), self.hooks)
                {
                    for index in 0..signature.parameters.len() {
                        let Some(argument) = hooks.call_argument_term(stmt, index) else {
                            debug_assert!(false, "call hook must bind every signature argument");
                            continue;
                        };
                        args.push(self.make_expression(argument));
                    }
                    if signature.return_type.is_some() {
                        if let Some(return_term) = hooks.call_return_term(stmt) {
                            let call = CExpr::call(target_expr, args);
                            let ty = make_type(&self.types.type_of(return_term));
                            let result = self.make_expression(return_term);
                            return Some(CStatement::expression(CExpr::binary(
                                CBinaryOp::Assign,
                                result,
                                CExpr::cast(ty, call),
                            )));
                        }
                    }
                }

                Some(CStatement::expression(CExpr::call(target_expr, args)))
            }
            StatementKind::Return => {
                let signatures = self.signatures;
                if let (Some(signature), Some(hooks)) =
                    (signatures.function_signature(function), self.hooks)
                {
                    if signature.return_type.is_some() {
                        if let Some(term) = hooks.return_value_term(stmt) {
                            let expr = self.make_expression(term);
                            return Some(CStatement::new(CStatementKind::Return(Some(expr))));
                        }
                    }
                }
                Some(CStatement::new(CStatementKind::Return(None)))
            }
            StatementKind::Touch { .. } | StatementKind::Callback => None,
        }
    }

    // ==================== Jump reification ====================

    fn make_jump_to_block(
        &mut self,
        target: BasicBlockId,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
    ) -> Option<CStatement> {
        if Some(target) == next_bb {
            None
        } else if Some(target) == break_bb {
            Some(CStatement::new(CStatementKind::Break))
        } else if Some(target) == continue_bb {
            Some(CStatement::new(CStatementKind::Continue))
        } else {
            let label = self.label(target);
            Some(CStatement::new(CStatementKind::Goto(CExpr::label_ref(
                label,
            ))))
        }
    }

    fn make_jump_target(
        &mut self,
        target: &JumpTarget,
        next_bb: Option<BasicBlockId>,
        break_bb: Option<BasicBlockId>,
        continue_bb: Option<BasicBlockId>,
    ) -> Option<CStatement> {
        match target {
            JumpTarget::Block(block) => {
                self.make_jump_to_block(*block, next_bb, break_bb, continue_bb)
            }
            JumpTarget::Address(term) | JumpTarget::Table { address: term, .. } => {
                let expr = self.make_expression(*term);
                Some(CStatement::new(CStatementKind::Goto(expr)))
            }
            JumpTarget::Unknown => Some(CStatement::new(CStatementKind::Goto(CExpr::string(
                "???",
            )))),
        }
    }

    // ==================== Expression lowering ====================

    fn make_expression(&mut self, term: TermId) -> CExpr {
        let mut result = self.do_make_expression(term);
        annotate_term(&mut result, term);
        result
    }

    fn do_make_expression(&mut self, term: TermId) -> CExpr {
        let function = self.function;
        let info = function.term(term);

        if self.options.prefer_constants_to_expressions && info.is_read() {
            if let Some(value) = self.dataflow.value(term).abstract_value().as_concrete() {
                return self.make_constant(term, value);
            }
        }

        if let Some(var) = self.variables.variable_of(term) {
            if self.is_intermediate(var) {
                if let Some(source) = self.intermediate_source(var) {
                    return self.make_expression(source);
                }
            }
            return self.make_variable_access(term);
        }

        match &info.kind {
            TermKind::IntConst(value) => {
                self.make_constant(term, SizedValue::new(info.size, *value))
            }
            TermKind::Intrinsic => CExpr::intrinsic(),
            TermKind::Undefined => {
                debug_assert!(false, "undefined terms should not be rendered");
                CExpr::intrinsic()
            }
            TermKind::MemoryLocationAccess(_) => {
                debug_assert!(false, "the term must belong to a variable");
                CExpr::intrinsic()
            }
            TermKind::Dereference { addr, .. } => {
                debug_assert!(
                    self.dataflow.memory_location(term).is_none(),
                    "the term must belong to a variable"
                );
                let addr = *addr;
                let ty = make_type(&self.types.type_of(term));
                let addr_expr = self.make_expression(addr);
                CExpr::unary(
                    CUnaryOp::Dereference,
                    CExpr::cast(CType::pointer(ty), addr_expr),
                )
            }
            TermKind::UnaryOp { op, operand } => self.make_unary_expression(term, *op, *operand),
            TermKind::BinaryOp { op, left, right } => {
                self.make_binary_expression(*op, *left, *right)
            }
            TermKind::Choice { preferred, default } => {
                let chosen = if self.dataflow.has_definitions(*preferred) {
                    *preferred
                } else {
                    *default
                };
                self.make_expression(chosen)
            }
        }
    }

    fn make_unary_expression(&mut self, term: TermId, op: UnaryOpKind, operand: TermId) -> CExpr {
        let function = self.function;
        let term_size = function.term(term).size;
        let operand_size = function.term(operand).size;
        let operand_ty = self.types.type_of(operand);
        let operand_expr = self.make_expression(operand);

        match op {
            UnaryOpKind::Not => CExpr::unary(
                CUnaryOp::BitwiseNot,
                CExpr::cast(
                    CType::integer(operand_ty.size, operand_ty.unsigned),
                    operand_expr,
                ),
            ),
            UnaryOpKind::Negation => CExpr::unary(
                CUnaryOp::Negation,
                CExpr::cast(
                    CType::integer(operand_ty.size, operand_ty.unsigned),
                    operand_expr,
                ),
            ),
            UnaryOpKind::SignExtend => CExpr::cast(
                CType::integer(term_size, false),
                CExpr::cast(CType::integer(operand_size, false), operand_expr),
            ),
            UnaryOpKind::ZeroExtend => CExpr::cast(
                CType::integer(term_size, true),
                CExpr::cast(CType::integer(operand_size, true), operand_expr),
            ),
            UnaryOpKind::Truncate => {
                CExpr::cast(make_type(&self.types.type_of(term)), operand_expr)
            }
        }
    }

    fn make_binary_expression(&mut self, op: BinaryOpKind, left: TermId, right: TermId) -> CExpr {
        let left_ty = self.types.type_of(left);
        let right_ty = self.types.type_of(right);
        let left_expr = self.make_expression(left);
        let right_expr = self.make_expression(right);

        let cast =
            |size: u32, unsigned: bool, expr: CExpr| CExpr::cast(CType::integer(size, unsigned), expr);

        match op {
            BinaryOpKind::And => CExpr::binary(
                CBinaryOp::BitwiseAnd,
                cast(left_ty.size, left_ty.unsigned, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Or => CExpr::binary(
                CBinaryOp::BitwiseOr,
                cast(left_ty.size, left_ty.unsigned, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Xor => CExpr::binary(
                CBinaryOp::BitwiseXor,
                cast(left_ty.size, left_ty.unsigned, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Shl => CExpr::binary(
                CBinaryOp::Shl,
                cast(left_ty.size, left_ty.unsigned, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Shr => CExpr::binary(
                CBinaryOp::Shr,
                cast(left_ty.size, true, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Sar => CExpr::binary(
                CBinaryOp::Shr,
                cast(left_ty.size, false, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Add => CExpr::binary(
                CBinaryOp::Add,
                cast(left_ty.size, left_ty.unsigned, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Sub => CExpr::binary(
                CBinaryOp::Sub,
                cast(left_ty.size, left_ty.unsigned, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::Mul => CExpr::binary(
                CBinaryOp::Mul,
                cast(left_ty.size, left_ty.unsigned, left_expr),
                cast(right_ty.size, right_ty.unsigned, right_expr),
            ),
            BinaryOpKind::SignedDiv => CExpr::binary(
                CBinaryOp::Div,
                cast(left_ty.size, false, left_expr),
                cast(right_ty.size, false, right_expr),
            ),
            BinaryOpKind::SignedRem => CExpr::binary(
                CBinaryOp::Rem,
                cast(left_ty.size, false, left_expr),
                cast(right_ty.size, false, right_expr),
            ),
            BinaryOpKind::UnsignedDiv => CExpr::binary(
                CBinaryOp::Div,
                cast(left_ty.size, true, left_expr),
                cast(right_ty.size, true, right_expr),
            ),
            BinaryOpKind::UnsignedRem => CExpr::binary(
                CBinaryOp::Rem,
                cast(left_ty.size, true, left_expr),
                cast(right_ty.size, true, right_expr),
            ),
            BinaryOpKind::Equal => CExpr::binary(CBinaryOp::Equal, left_expr, right_expr),
            BinaryOpKind::SignedLess => CExpr::binary(
                CBinaryOp::Less,
                cast(left_ty.size, false, left_expr),
                cast(right_ty.size, false, right_expr),
            ),
            BinaryOpKind::SignedLessOrEqual => CExpr::binary(
                CBinaryOp::LessOrEqual,
                cast(left_ty.size, false, left_expr),
                cast(right_ty.size, false, right_expr),
            ),
            BinaryOpKind::UnsignedLess => CExpr::binary(
                CBinaryOp::Less,
                cast(left_ty.size, true, left_expr),
                cast(right_ty.size, true, right_expr),
            ),
            BinaryOpKind::UnsignedLessOrEqual => CExpr::binary(
                CBinaryOp::LessOrEqual,
                cast(left_ty.size, true, left_expr),
                cast(right_ty.size, true, right_expr),
            ),
        }
    }

    /// Lowers a concrete value, preferring string literals and global
    /// variable references when the options and the type allow it.
    fn make_constant(&mut self, term: TermId, value: SizedValue) -> CExpr {
        let ty = self.types.type_of(term);

        if self.options.prefer_cstrings_to_constants {
            if let Some(pointee) = &ty.pointee {
                if pointee.size == 8 {
                    if let Some(section) = self
                        .image
                        .and_then(|image| image.section_containing(value.value()))
                    {
                        if section.allocated {
                            if let Some(string) = section.read_asciiz_string(value.value(), 1024) {
                                if string.is_ascii() {
                                    return CExpr::string(string);
                                }
                            }
                        }
                    }
                }
            }
        }

        if self.options.prefer_global_variables_to_constants {
            if let Some(pointee) = &ty.pointee {
                if pointee.size > 0 {
                    let location = MemoryLocation::new(
                        MemoryDomain::Memory,
                        value.value() as i64 * 8,
                        pointee.size as i64,
                    );
                    let name = self.globals.global_variable(location, &ty);
                    return CExpr::unary(CUnaryOp::Reference, CExpr::variable(name));
                }
            }
        }

        CExpr::cast(
            make_type(&ty),
            CExpr::integer(value.value(), CType::integer(ty.size, ty.unsigned)),
        )
    }

    /// Renders a variable access, adding pointer arithmetic when the term
    /// touches only part of the variable.
    fn make_variable_access(&mut self, term: TermId) -> CExpr {
        let Some(&location) = self.dataflow.memory_location(term) else {
            debug_assert!(false, "a variable access must have a memory location");
            return CExpr::intrinsic();
        };
        let Some(var) = self.variables.variable_of(term) else {
            debug_assert!(false, "the term must belong to a variable");
            return CExpr::intrinsic();
        };
        let variable_location = self.variables.get(var).location;
        let identifier = CExpr::variable(self.variable_name(var));

        if location == variable_location {
            return identifier;
        }

        // Pointer arithmetic to reach the right part of the variable.
        // Non-byte-aligned sublocations cannot be expressed in C; the byte
        // offset truncates.
        let pointer_ty = CType::integer(self.arch.pointer_size(), true);
        let variable_address = CExpr::cast(
            pointer_ty.clone(),
            CExpr::unary(CUnaryOp::Reference, identifier),
        );
        let term_address = if location.addr == variable_location.addr {
            variable_address
        } else {
            CExpr::binary(
                CBinaryOp::Add,
                variable_address,
                CExpr::integer(
                    ((location.addr - variable_location.addr) / 8) as u64,
                    pointer_ty,
                ),
            )
        };
        let term_type = make_type(&self.types.type_of(term));
        CExpr::unary(
            CUnaryOp::Dereference,
            CExpr::cast(CType::pointer(term_type), term_address),
        )
    }

    /// The name of a variable; locals are declared lazily on first use.
    fn variable_name(&mut self, var: VarId) -> String {
        let variables = self.variables;
        let variable = variables.get(var);

        if variable.is_global() {
            let ty = Ty::integer(variable.location.size as u32, true);
            return self.globals.global_variable(variable.location, &ty);
        }

        if let Some(name) = self.local_names.get(&var) {
            return name.clone();
        }

        let mut prefix = String::from("v");
        if self.options.register_variable_names {
            if let Some(register) = self.arch.register_at(&variable.location) {
                prefix = register.name.clone();
                if prefix.is_empty() || prefix.ends_with(|c: char| c.is_ascii_digit()) {
                    prefix.push('_');
                }
            }
        }
        let name = format!("{}{}", prefix, self.local_names.len());
        self.local_names.insert(var, name.clone());
        self.declarations.push(VariableDeclaration {
            name: name.clone(),
            ty: CType::integer(variable.location.size as u32, true),
        });
        name
    }

    // ==================== Policy access ====================

    fn is_intermediate(&mut self, var: VarId) -> bool {
        match self.policy.as_mut() {
            Some(policy) => policy.is_intermediate(var),
            None => false,
        }
    }

    /// The source expression an intermediate variable inlines to.
    fn intermediate_source(&mut self, var: VarId) -> Option<TermId> {
        let definition = self.policy.as_mut()?.single_definition(var)?;
        self.function.assignment_source(definition)
    }
}

/// Maps a reconstructed type to its C rendering.
fn make_type(ty: &Ty) -> CType {
    match &ty.pointee {
        Some(pointee) => CType::pointer(make_type(pointee)),
        None => CType::integer(ty.size, ty.unsigned),
    }
}
