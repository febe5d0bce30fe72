//! `SsaFunction`: the per-function arena of nodes and blocks (spec.md §3
//! "SSA function" / "SSA basic block").
//!
//! Invariants maintained by construction (spec.md §3):
//! 1. Every φ's `inputs` is a permutation of its block's predecessors.
//! 2. A block's instruction list holds all of its φs first, then non-φ
//!    instructions, then at most one terminator as its last entry.
//! 3. Every reachable block ends in a terminator (`Jump`/`ConditionalJump`)
//!    except possibly during construction, before `seal`.
//! 4. A node is referenced only by nodes whose block is dominated by (or
//!    equal to) the referenced node's own block (checked by the optional
//!    verifier, not by this module).
//! 5. Node identity is stable across passes: replacing a node's uses never
//!    reuses another live node's `Node` key.

use std::collections::HashMap;

use crate::entity::{PrimaryMap, SecondaryMap};
use crate::ir::ssa::entities::{Block, Node};
use crate::ir::ssa::node::NodeKind;
use crate::types::{Type, TypeTable};
use crate::variable::{Variable, VariableTable};

struct NodeData {
    kind: NodeKind,
    /// Cached result type; `Compare` stores `Bool` here since `NodeKind`
    /// doesn't carry it inline (see `NodeKind::result_type`).
    ty: Option<Type>,
}

/// One basic block: an ordered instruction list (φs first, invariant 2) plus
/// the predecessor/successor edges and dominator-tree fields filled in by
/// [`crate::ir::ssa::dominators`].
#[derive(Default, Clone)]
pub struct BasicBlock {
    /// Instructions in program order; φs occupy a prefix.
    pub nodes: Vec<Node>,
    /// How many of `nodes`'s prefix are φs.
    pub phi_count: usize,
    /// Predecessor blocks, insertion order.
    pub predecessors: Vec<Block>,
    /// Successor blocks, insertion order (derived from the terminator).
    pub successors: Vec<Block>,
    /// Immediate dominator, filled in by the dominator pass. `None` only
    /// for the entry block and for not-yet-analyzed/unreachable blocks.
    pub idom: Option<Block>,
    /// True once control-flow analysis has run and `predecessors`/
    /// `successors` reflect the current terminators.
    pub sealed: bool,
}

impl BasicBlock {
    /// The block's terminator node, if its instruction list ends in one.
    pub fn terminator(&self, arena: &NodeArena) -> Option<Node> {
        self.nodes
            .last()
            .copied()
            .filter(|&n| arena.kind(n).is_terminator())
    }

    /// Non-φ, non-terminator instructions (the "body").
    pub fn body(&self, arena: &NodeArena) -> &[Node] {
        let end = self
            .nodes
            .last()
            .filter(|&&n| arena.kind(n).is_terminator())
            .map(|_| self.nodes.len() - 1)
            .unwrap_or(self.nodes.len());
        &self.nodes[self.phi_count..end]
    }

    /// The φ nodes at the head of this block.
    pub fn phis(&self) -> &[Node] {
        &self.nodes[..self.phi_count]
    }
}

/// The flat per-function node store. Kept separate from `SsaFunction` so
/// `BasicBlock` methods that only need node data can borrow it without
/// borrowing the whole function.
#[derive(Default)]
pub struct NodeArena {
    data: PrimaryMap<Node, NodeData>,
}

impl NodeArena {
    fn new() -> Self {
        Self {
            data: PrimaryMap::new(),
        }
    }

    fn push(&mut self, kind: NodeKind, ty: Option<Type>) -> Node {
        self.data.push(NodeData { kind, ty })
    }

    /// Borrow a node's kind.
    pub fn kind(&self, n: Node) -> &NodeKind {
        &self.data[n].kind
    }

    /// Mutably borrow a node's kind (for in-place rewriting by passes).
    pub fn kind_mut(&mut self, n: Node) -> &mut NodeKind {
        &mut self.data[n].kind
    }

    /// A node's cached result type (`None` for nodes with no result).
    pub fn result_type(&self, n: Node) -> Option<Type> {
        self.data[n].ty
    }

    /// Total number of nodes ever allocated (including dead ones still
    /// referenced by a stale index; dead-code elimination removes them from
    /// block instruction lists but the arena itself never shrinks).
    pub fn len(&self) -> usize {
        self.data.len()
    }
}

/// One function body in SSA form.
pub struct SsaFunction {
    /// Human-readable name, used by diagnostics and the assembly writer.
    pub name: String,
    arena: NodeArena,
    blocks: PrimaryMap<Block, BasicBlock>,
    block_order: Vec<Block>,
    /// Per-block dominance frontier, filled in by the dominator pass.
    pub dominance_frontier: SecondaryMap<Block, Vec<Block>>,
    /// The function's entry block.
    pub entry: Option<Block>,
    /// Source locals and parameters, declared by the front end before
    /// lowering begins (spec.md §4.3 step 1, §9 frame model).
    variables: VariableTable,
}

impl SsaFunction {
    /// Start an empty function with no blocks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arena: NodeArena::new(),
            blocks: PrimaryMap::new(),
            block_order: Vec::new(),
            dominance_frontier: SecondaryMap::new(),
            entry: None,
            variables: VariableTable::new(),
        }
    }

    /// Borrow the function's variable table.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Mutably borrow the function's variable table (front end declares
    /// locals/parameters into this before `declare_alloca` runs).
    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    /// Append a new, empty block and return its key. The first block
    /// created becomes the entry block.
    pub fn make_block(&mut self) -> Block {
        let b = self.blocks.push(BasicBlock::default());
        self.block_order.push(b);
        if self.entry.is_none() {
            self.entry = Some(b);
        }
        b
    }

    /// Blocks in creation order (not necessarily reverse-postorder; callers
    /// needing a traversal order should use `ir::ssa::cfg`).
    pub fn blocks(&self) -> &[Block] {
        &self.block_order
    }

    /// Borrow a block.
    pub fn block(&self, b: Block) -> &BasicBlock {
        &self.blocks[b]
    }

    /// Mutably borrow a block.
    pub fn block_mut(&mut self, b: Block) -> &mut BasicBlock {
        &mut self.blocks[b]
    }

    /// The node arena, for read-only traversal.
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// The node arena, mutable (passes rewrite node kinds in place).
    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    /// Append a non-φ instruction to the end of `block`'s body (before its
    /// terminator, if any — callers append the terminator last).
    pub fn append(&mut self, block: Block, kind: NodeKind, ty: Option<Type>) -> Node {
        let n = self.arena.push(kind, ty);
        let bb = &mut self.blocks[block];
        match bb.terminator(&self.arena) {
            Some(_) => {
                let last = bb.nodes.len() - 1;
                bb.nodes.insert(last, n);
            }
            None => bb.nodes.push(n),
        }
        n
    }

    /// Insert a new instruction immediately before `before` in `block`'s
    /// instruction list. Used to replace a node with a fresh one standing
    /// in for it (e.g. folding to a `Constant`): since every existing use
    /// of `before` already sits at a later position in program order,
    /// splicing the replacement in at `before`'s own slot keeps it ahead of
    /// all of them without disturbing anything that follows, terminator
    /// included.
    pub fn insert_before(&mut self, block: Block, before: Node, kind: NodeKind, ty: Option<Type>) -> Node {
        let n = self.arena.push(kind, ty);
        let bb = &mut self.blocks[block];
        let pos = bb
            .nodes
            .iter()
            .position(|&m| m == before)
            .expect("`before` must belong to `block`");
        bb.nodes.insert(pos, n);
        n
    }

    /// Append a φ to the front of `block`'s instruction list (maintaining
    /// invariant 2: all φs precede all other instructions).
    pub fn append_phi(&mut self, block: Block, kind: NodeKind, ty: Type) -> Node {
        debug_assert!(matches!(kind, NodeKind::Phi { .. }));
        let n = self.arena.push(kind, Some(ty));
        let bb = &mut self.blocks[block];
        bb.nodes.insert(bb.phi_count, n);
        bb.phi_count += 1;
        n
    }

    /// Allocate an `Alloca` node for `variable` at the top of `block`'s
    /// body. Used by the frame-allocation step (spec.md §4.3 step 1) before
    /// mem2reg runs.
    pub fn declare_alloca(&mut self, block: Block, variable: Variable, ty: Type, types: &mut TypeTable) -> Node {
        let ptr_ty = types.pointer(ty);
        self.append(block, NodeKind::Alloca { ty: ptr_ty, variable }, Some(ptr_ty))
    }

    /// Recompute `predecessors`/`successors` for every block from the
    /// current terminators. Call after building or rewriting control flow,
    /// before running the dominator pass.
    pub fn seal(&mut self) {
        for b in &self.block_order {
            self.blocks[*b].predecessors.clear();
            self.blocks[*b].successors.clear();
        }
        let mut edges: Vec<(Block, Block)> = Vec::new();
        for &b in &self.block_order {
            if let Some(term) = self.blocks[b].terminator(&self.arena) {
                match self.arena.kind(term) {
                    NodeKind::Jump { target } => edges.push((b, *target)),
                    NodeKind::ConditionalJump {
                        if_true, if_false, ..
                    } => {
                        edges.push((b, *if_true));
                        edges.push((b, *if_false));
                    }
                    _ => {}
                }
            }
        }
        for (from, to) in edges {
            self.blocks[from].successors.push(to);
            self.blocks[to].predecessors.push(from);
        }
        for b in &self.block_order {
            self.blocks[*b].sealed = true;
        }
    }

    /// True if `block` has more than one predecessor (a φ-bearing merge
    /// point; used by critical-edge splitting, spec.md §4.6).
    pub fn is_merge_block(&self, block: Block) -> bool {
        self.blocks[block].predecessors.len() > 1
    }

    /// Replace every use of `old` with `new` across all blocks (spec.md §4
    /// "node replacement"). Does not remove `old` from its own block's
    /// instruction list; callers do that separately once `old` has no
    /// remaining uses and no side effects.
    pub fn replace_all_uses(&mut self, old: Node, new: Node) {
        let mut map = HashMap::new();
        map.insert(old, (new, true));
        for &b in &self.block_order {
            for &n in &self.blocks[b].nodes.clone() {
                if n == old {
                    continue;
                }
                self.arena.kind_mut(n).replace_inputs(&map);
            }
        }
    }

    /// Remove `node` from `block`'s instruction list without touching other
    /// nodes' references to it (callers must have already redirected uses).
    pub fn remove_node(&mut self, block: Block, node: Node) {
        let bb = &mut self.blocks[block];
        if let Some(pos) = bb.nodes.iter().position(|&n| n == node) {
            if pos < bb.phi_count {
                bb.phi_count -= 1;
            }
            bb.nodes.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Width;
    use crate::value::Value;

    #[test]
    fn blocks_and_nodes_round_trip() {
        let mut f = SsaFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let b0 = f.make_block();
        let b1 = f.make_block();
        assert_eq!(f.entry, Some(b0));

        let c = f.append(
            b0,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 1),
            },
            Some(i32_),
        );
        f.append(b0, NodeKind::Jump { target: b1 }, None);
        assert_eq!(f.block(b0).body(f.arena()).len(), 1);
        assert_eq!(f.block(b0).body(f.arena())[0], c);

        f.append(b1, NodeKind::Jump { target: b1 }, None);
        f.seal();
        assert_eq!(f.block(b1).predecessors, vec![b0, b1]);
        assert_eq!(f.block(b0).successors, vec![b1]);
    }

    #[test]
    fn phi_precedes_body() {
        let mut f = SsaFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let b0 = f.make_block();
        let v = f.append(
            b0,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 1),
            },
            Some(i32_),
        );
        let phi = f.append_phi(
            b0,
            NodeKind::Phi {
                ty: i32_,
                spill: None,
                inputs: vec![(b0, v)],
            },
            i32_,
        );
        assert_eq!(f.block(b0).phis(), &[phi]);
        assert_eq!(f.block(b0).nodes[1], v);
    }
}
