//! Control-flow view of a function: edges, orderings, dominators.

use indexmap::IndexMap;
use log::trace;

use crate::cancel::CancellationToken;
use crate::error::Error;
use crate::function::{BasicBlockId, Function};
use crate::statement::JumpTarget;

/// Predecessor/successor edges derived from the terminating jumps.
#[derive(Debug)]
pub struct Cfg {
    entry: BasicBlockId,
    successors: IndexMap<BasicBlockId, Vec<BasicBlockId>>,
    predecessors: IndexMap<BasicBlockId, Vec<BasicBlockId>>,
}

impl Cfg {
    /// Builds the edge view of a function. Jump-table entries contribute an
    /// edge per resolved target block.
    pub fn new(function: &Function) -> Self {
        let mut successors: IndexMap<BasicBlockId, Vec<BasicBlockId>> = IndexMap::new();
        let mut predecessors: IndexMap<BasicBlockId, Vec<BasicBlockId>> = IndexMap::new();

        for block in function.block_ids() {
            successors.entry(block).or_default();
            predecessors.entry(block).or_default();
        }

        for block in function.block_ids() {
            let mut targets = Vec::new();
            for &stmt in function.statements_of(block) {
                let Some(jump) = function.statement(stmt).as_jump() else {
                    continue;
                };
                collect_targets(&jump.then_target, &mut targets);
                if let Some(else_target) = &jump.else_target {
                    collect_targets(else_target, &mut targets);
                }
            }
            for target in targets {
                if !successors[&block].contains(&target) {
                    successors[&block].push(target);
                    predecessors[&target].push(block);
                }
            }
        }

        Self {
            entry: function.entry(),
            successors,
            predecessors,
        }
    }

    pub fn entry(&self) -> BasicBlockId {
        self.entry
    }

    pub fn successors(&self, id: BasicBlockId) -> &[BasicBlockId] {
        self.successors.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: BasicBlockId) -> &[BasicBlockId] {
        self.predecessors
            .get(&id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns blocks in reverse post-order.
    ///
    /// Reverse post-order visits a node before all its successors in acyclic
    /// parts of the graph, which is the fastest-converging order for forward
    /// dataflow. Unreachable blocks are appended so every block appears.
    pub fn reverse_post_order(&self) -> Vec<BasicBlockId> {
        let mut visited = std::collections::HashSet::new();
        let mut post_order = Vec::new();

        fn dfs(
            cfg: &Cfg,
            block: BasicBlockId,
            visited: &mut std::collections::HashSet<BasicBlockId>,
            post_order: &mut Vec<BasicBlockId>,
        ) {
            if !visited.insert(block) {
                return;
            }
            for &succ in cfg.successors(block) {
                dfs(cfg, succ, visited, post_order);
            }
            post_order.push(block);
        }

        dfs(self, self.entry, &mut visited, &mut post_order);
        for &id in self.successors.keys() {
            if !visited.contains(&id) {
                dfs(self, id, &mut visited, &mut post_order);
            }
        }

        post_order.reverse();
        post_order
    }
}

fn collect_targets(target: &JumpTarget, out: &mut Vec<BasicBlockId>) {
    match target {
        JumpTarget::Block(block) => out.push(*block),
        JumpTarget::Address(_) | JumpTarget::Unknown => {}
        JumpTarget::Table { table, .. } => {
            out.extend(table.iter().filter_map(|entry| entry.block));
        }
    }
}

/// Dominator tree for a CFG.
///
/// Block A dominates block B if every path from entry to B must go through A.
#[derive(Debug)]
pub struct DominatorTree {
    idom: IndexMap<BasicBlockId, BasicBlockId>,
}

impl DominatorTree {
    /// Computes the dominator tree with the iterative RPO algorithm,
    /// consulting the cancellation token between passes.
    pub fn compute(cfg: &Cfg, canceled: &CancellationToken) -> Result<Self, Error> {
        let mut idom: IndexMap<BasicBlockId, BasicBlockId> = IndexMap::new();
        idom.insert(cfg.entry(), cfg.entry());

        let rpo = cfg.reverse_post_order();
        let rpo_number: IndexMap<BasicBlockId, usize> =
            rpo.iter().copied().enumerate().map(|(i, b)| (b, i)).collect();

        let mut changed = true;
        while changed {
            if canceled.is_cancelled() {
                return Err(Error::Cancelled);
            }
            changed = false;

            for &block in &rpo {
                if block == cfg.entry() {
                    continue;
                }

                let preds = cfg.predecessors(block);
                let Some(mut new_idom) = preds
                    .iter()
                    .copied()
                    .find(|pred| idom.contains_key(pred))
                else {
                    continue;
                };

                for &pred in preds {
                    if pred == new_idom || !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Self::intersect(&idom, &rpo_number, pred, new_idom);
                }

                if idom.get(&block) != Some(&new_idom) {
                    trace!("idom({block}) <- {new_idom}");
                    idom.insert(block, new_idom);
                    changed = true;
                }
            }
        }

        Ok(Self { idom })
    }

    fn intersect(
        idom: &IndexMap<BasicBlockId, BasicBlockId>,
        rpo_number: &IndexMap<BasicBlockId, usize>,
        mut b1: BasicBlockId,
        mut b2: BasicBlockId,
    ) -> BasicBlockId {
        while b1 != b2 {
            while rpo_number.get(&b1) > rpo_number.get(&b2) {
                b1 = idom[&b1];
            }
            while rpo_number.get(&b2) > rpo_number.get(&b1) {
                b2 = idom[&b2];
            }
        }
        b1
    }

    /// Returns true if `a` dominates `b`.
    pub fn dominates(&self, a: BasicBlockId, b: BasicBlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom.get(&current) {
                Some(&idom) if idom != current => current = idom,
                _ => return false,
            }
        }
    }

    /// Returns the immediate dominator of a block.
    pub fn immediate_dominator(&self, block: BasicBlockId) -> Option<BasicBlockId> {
        self.idom.get(&block).copied().filter(|&d| d != block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Jump, StatementKind};

    /// bb0 -> {bb1, bb2}, bb1 -> bb3, bb2 -> bb3
    fn diamond() -> Function {
        let mut func = Function::new("diamond");
        let b0 = func.add_block(Some(0x1000));
        let b1 = func.add_block(Some(0x1010));
        let b2 = func.add_block(Some(0x1020));
        let b3 = func.add_block(Some(0x1030));

        let cond = func.int_const(1, 1);
        func.push_statement(
            b0,
            StatementKind::Jump(Jump::conditional(
                cond,
                JumpTarget::Block(b1),
                JumpTarget::Block(b2),
            )),
            None,
        );
        for block in [b1, b2] {
            func.push_statement(
                block,
                StatementKind::Jump(Jump::unconditional(JumpTarget::Block(b3))),
                None,
            );
        }
        func.push_statement(b3, StatementKind::Return, None);
        func
    }

    #[test]
    fn test_edges() {
        let func = diamond();
        let cfg = Cfg::new(&func);

        assert_eq!(
            cfg.successors(BasicBlockId(0)),
            &[BasicBlockId(1), BasicBlockId(2)]
        );
        assert_eq!(cfg.predecessors(BasicBlockId(3)).len(), 2);
        assert!(cfg.successors(BasicBlockId(3)).is_empty());
    }

    #[test]
    fn test_reverse_post_order_starts_at_entry() {
        let func = diamond();
        let cfg = Cfg::new(&func);
        let rpo = cfg.reverse_post_order();

        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], BasicBlockId(0));
        assert_eq!(rpo[3], BasicBlockId(3));
    }

    #[test]
    fn test_dominators_diamond() {
        let func = diamond();
        let cfg = Cfg::new(&func);
        let dom = DominatorTree::compute(&cfg, &CancellationToken::new()).unwrap();

        assert!(dom.dominates(BasicBlockId(0), BasicBlockId(3)));
        assert!(!dom.dominates(BasicBlockId(1), BasicBlockId(3)));
        assert!(!dom.dominates(BasicBlockId(2), BasicBlockId(3)));
        assert_eq!(
            dom.immediate_dominator(BasicBlockId(3)),
            Some(BasicBlockId(0))
        );
    }

    #[test]
    fn test_dominators_cancelled() {
        let func = diamond();
        let cfg = Cfg::new(&func);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            DominatorTree::compute(&cfg, &token),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_jump_table_edges() {
        let mut func = Function::new("table");
        let b0 = func.add_block(Some(0x1000));
        let b1 = func.add_block(Some(0x1010));
        let b2 = func.add_block(Some(0x1020));

        let index = func.int_const(0, 64);
        func.push_statement(
            b0,
            StatementKind::Jump(Jump::unconditional(JumpTarget::Table {
                address: index,
                table: vec![
                    crate::statement::JumpTableEntry {
                        address: 0x1010,
                        block: Some(b1),
                    },
                    crate::statement::JumpTableEntry {
                        address: 0x1020,
                        block: Some(b2),
                    },
                ],
            })),
            None,
        );

        let cfg = Cfg::new(&func);
        assert_eq!(cfg.successors(b0), &[b1, b2]);
    }
}
