//! Control-flow region tree.
//!
//! The tree is built by the structuring collaborator; this core only
//! consumes it. Leaves wrap basic blocks, internal nodes classify the
//! control construct the synthesizer should emit.

use crate::cfg::Cfg;
use crate::function::{BasicBlockId, Function, TermId};

/// Handle of a node within its region tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

/// Classification of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegionKind {
    /// No structure recognized; children are emitted in DFS preorder.
    Unknown,
    /// Straight-line sequence.
    Block,
    /// Two condition nodes forming `&&` or `||`.
    CompoundCondition,
    IfThen,
    IfThenElse,
    /// Endless loop.
    Loop,
    While,
    DoWhile,
    Switch,
}

/// Switch-specific data of a `Switch` region.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwitchData {
    /// The term being switched over.
    pub switch_term: TermId,
    /// Node holding the table-based jump.
    pub switch_node: NodeId,
    /// Number of jump-table entries that map to cases.
    pub table_size: usize,
    /// Node performing the bounds check, if one was recognized.
    pub bounds_check_node: Option<NodeId>,
    /// Basic block of the default branch.
    pub default_block: Option<BasicBlockId>,
}

/// A node of the region tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegionNode {
    /// Leaf wrapping a basic block.
    Basic { block: BasicBlockId },
    /// Internal node; child order is significant.
    Region {
        kind: RegionKind,
        children: Vec<NodeId>,
        /// Condition head for `While`/`DoWhile`/`IfThen`/`IfThenElse`.
        entry: Option<NodeId>,
        /// First basic block after the region.
        exit_block: Option<BasicBlockId>,
        /// Condition node of a `DoWhile`.
        loop_condition: Option<NodeId>,
        switch: Option<SwitchData>,
    },
}

/// The region tree of a function.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionTree {
    nodes: Vec<RegionNode>,
    root: Option<NodeId>,
}

impl RegionTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root.expect("region tree has no root")
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn node(&self, id: NodeId) -> &RegionNode {
        &self.nodes[id.0 as usize]
    }

    pub fn add_basic(&mut self, block: BasicBlockId) -> NodeId {
        self.push(RegionNode::Basic { block })
    }

    pub fn add_region(&mut self, kind: RegionKind, children: Vec<NodeId>) -> NodeId {
        self.push(RegionNode::Region {
            kind,
            children,
            entry: None,
            exit_block: None,
            loop_condition: None,
            switch: None,
        })
    }

    fn push(&mut self, node: RegionNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn set_entry(&mut self, region: NodeId, entry: NodeId) {
        if let RegionNode::Region { entry: slot, .. } = &mut self.nodes[region.0 as usize] {
            *slot = Some(entry);
        }
    }

    pub fn set_exit_block(&mut self, region: NodeId, block: BasicBlockId) {
        if let RegionNode::Region { exit_block, .. } = &mut self.nodes[region.0 as usize] {
            *exit_block = Some(block);
        }
    }

    pub fn set_loop_condition(&mut self, region: NodeId, node: NodeId) {
        if let RegionNode::Region { loop_condition, .. } = &mut self.nodes[region.0 as usize] {
            *loop_condition = Some(node);
        }
    }

    pub fn set_switch(&mut self, region: NodeId, data: SwitchData) {
        if let RegionNode::Region { switch, .. } = &mut self.nodes[region.0 as usize] {
            *switch = Some(data);
        }
    }

    pub fn kind(&self, id: NodeId) -> Option<RegionKind> {
        match self.node(id) {
            RegionNode::Region { kind, .. } => Some(*kind),
            RegionNode::Basic { .. } => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            RegionNode::Region { children, .. } => children,
            RegionNode::Basic { .. } => &[],
        }
    }

    pub fn entry(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id) {
            RegionNode::Region { entry, .. } => *entry,
            RegionNode::Basic { .. } => None,
        }
    }

    pub fn exit_block(&self, id: NodeId) -> Option<BasicBlockId> {
        match self.node(id) {
            RegionNode::Region { exit_block, .. } => *exit_block,
            RegionNode::Basic { .. } => None,
        }
    }

    pub fn loop_condition(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id) {
            RegionNode::Region { loop_condition, .. } => *loop_condition,
            RegionNode::Basic { .. } => None,
        }
    }

    pub fn switch_data(&self, id: NodeId) -> Option<&SwitchData> {
        match self.node(id) {
            RegionNode::Region { switch, .. } => switch.as_ref(),
            RegionNode::Basic { .. } => None,
        }
    }

    /// The basic block control enters through at this node: the block of a
    /// leaf, or the entry (falling back to the first child) of a region.
    pub fn entry_block(&self, id: NodeId) -> Option<BasicBlockId> {
        match self.node(id) {
            RegionNode::Basic { block } => Some(*block),
            RegionNode::Region {
                entry, children, ..
            } => {
                let head = entry.or_else(|| children.first().copied())?;
                self.entry_block(head)
            }
        }
    }

    /// All basic blocks in the subtree rooted at `id`, in child order.
    pub fn subtree_blocks(&self, id: NodeId) -> Vec<BasicBlockId> {
        let mut blocks = Vec::new();
        self.collect_blocks(id, &mut blocks);
        blocks
    }

    fn collect_blocks(&self, id: NodeId, out: &mut Vec<BasicBlockId>) {
        match self.node(id) {
            RegionNode::Basic { block } => out.push(*block),
            RegionNode::Region { children, .. } => {
                for &child in children {
                    self.collect_blocks(child, out);
                }
            }
        }
    }

    /// The direct children of a region ordered by a DFS over the CFG edges
    /// between them, starting from the region entry. Children unreachable
    /// along intra-region edges keep their original order at the tail.
    pub fn dfs_preorder(&self, region: NodeId, cfg: &Cfg) -> Vec<NodeId> {
        let children = self.children(region);
        if children.is_empty() {
            return Vec::new();
        }

        let mut owner: std::collections::HashMap<BasicBlockId, usize> =
            std::collections::HashMap::new();
        for (index, &child) in children.iter().enumerate() {
            for block in self.subtree_blocks(child) {
                owner.entry(block).or_insert(index);
            }
        }

        let start = self
            .entry(region)
            .and_then(|entry| children.iter().position(|&c| c == entry))
            .unwrap_or(0);

        let mut order = Vec::with_capacity(children.len());
        let mut visited = vec![false; children.len()];
        self.dfs_visit(children, start, cfg, &owner, &mut visited, &mut order);
        for index in 0..children.len() {
            if !visited[index] {
                self.dfs_visit(children, index, cfg, &owner, &mut visited, &mut order);
            }
        }
        order
    }

    fn dfs_visit(
        &self,
        children: &[NodeId],
        index: usize,
        cfg: &Cfg,
        owner: &std::collections::HashMap<BasicBlockId, usize>,
        visited: &mut Vec<bool>,
        order: &mut Vec<NodeId>,
    ) {
        if visited[index] {
            return;
        }
        visited[index] = true;
        order.push(children[index]);
        for block in self.subtree_blocks(children[index]) {
            for &succ in cfg.successors(block) {
                if let Some(&next) = owner.get(&succ) {
                    if !visited[next] {
                        self.dfs_visit(children, next, cfg, owner, visited, order);
                    }
                }
            }
        }
    }

    /// A node is a condition node if its terminator encodes a conditional
    /// branch between two known blocks; a compound condition is one if both
    /// of its children are.
    pub fn is_condition(&self, id: NodeId, function: &Function) -> bool {
        match self.node(id) {
            RegionNode::Basic { block } => function
                .terminator_jump(*block)
                .map(|(_, jump)| {
                    jump.is_conditional()
                        && jump.then_target.block().is_some()
                        && jump
                            .else_target
                            .as_ref()
                            .is_some_and(|target| target.block().is_some())
                })
                .unwrap_or(false),
            RegionNode::Region { kind, children, .. } => {
                *kind == RegionKind::CompoundCondition
                    && children.len() == 2
                    && children.iter().all(|&c| self.is_condition(c, function))
            }
        }
    }
}

impl Default for RegionTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Jump, JumpTarget, StatementKind};

    #[test]
    fn test_entry_block_falls_through_regions() {
        let mut tree = RegionTree::new();
        let leaf = tree.add_basic(BasicBlockId(2));
        let inner = tree.add_region(RegionKind::Block, vec![leaf]);
        let outer = tree.add_region(RegionKind::Block, vec![inner]);

        assert_eq!(tree.entry_block(outer), Some(BasicBlockId(2)));
    }

    #[test]
    fn test_dfs_preorder_follows_edges() {
        // bb0 -> bb2 -> bb1; children listed out of flow order.
        let mut func = Function::new("f");
        let b0 = func.add_block(None);
        let b1 = func.add_block(None);
        let b2 = func.add_block(None);
        func.push_statement(
            b0,
            StatementKind::Jump(Jump::unconditional(JumpTarget::Block(b2))),
            None,
        );
        func.push_statement(
            b2,
            StatementKind::Jump(Jump::unconditional(JumpTarget::Block(b1))),
            None,
        );
        func.push_statement(b1, StatementKind::Return, None);
        let cfg = Cfg::new(&func);

        let mut tree = RegionTree::new();
        let n0 = tree.add_basic(b0);
        let n1 = tree.add_basic(b1);
        let n2 = tree.add_basic(b2);
        let region = tree.add_region(RegionKind::Unknown, vec![n0, n1, n2]);
        tree.set_entry(region, n0);

        assert_eq!(tree.dfs_preorder(region, &cfg), vec![n0, n2, n1]);
    }

    #[test]
    fn test_condition_node() {
        let mut func = Function::new("f");
        let b0 = func.add_block(None);
        let b1 = func.add_block(None);
        let b2 = func.add_block(None);
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

        let mut tree = RegionTree::new();
        let condition = tree.add_basic(b0);
        let plain = tree.add_basic(b1);

        assert!(tree.is_condition(condition, &func));
        assert!(!tree.is_condition(plain, &func));
    }
}
