//! `RtlFunction`: virtual-register three-address IR between SSA and Asm
//! (spec.md §3 "RTL function/block", §9 C9).

use crate::entity::PrimaryMap;
use crate::ir::rtl::entities::{Block, Reg};
use crate::ir::rtl::node::RtlOp;
use crate::types::Type;
use crate::variable::{Variable, VariableTable};

struct RegData {
    ty: Type,
    spill: Option<Variable>,
}

/// One RTL instruction plus its (optional) destination register.
#[derive(Clone)]
pub struct RtlInst {
    pub dest: Option<Reg>,
    pub op: RtlOp,
}

/// A block in an `RtlFunction`: a flat instruction list, at most one
/// terminator as the last entry, and rebuilt predecessor/successor edges
/// (no dominator tree — RTL doesn't need one, spec.md §4.1).
#[derive(Default, Clone)]
pub struct RtlBlock {
    pub insts: Vec<RtlInst>,
    pub predecessors: Vec<Block>,
    pub successors: Vec<Block>,
}

/// A function body in RTL form.
pub struct RtlFunction {
    pub name: String,
    regs: PrimaryMap<Reg, RegData>,
    blocks: PrimaryMap<Block, RtlBlock>,
    block_order: Vec<Block>,
    pub entry: Option<Block>,
    /// Running byte size of the function's local-variable area (spill
    /// slots are carved out of this by the allocator, spec.md §4.9).
    pub locals_size: u32,
    /// Source locals and parameters, inherited from the `SsaFunction` this
    /// was lowered from.
    variables: VariableTable,
}

impl RtlFunction {
    /// Start an empty function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regs: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            block_order: Vec::new(),
            entry: None,
            locals_size: 0,
            variables: VariableTable::new(),
        }
    }

    /// Borrow the function's variable table.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Mutably borrow the function's variable table.
    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    /// Replace the variable table wholesale (used by SSA→RTL lowering to
    /// carry the originating function's table forward).
    pub fn set_variables(&mut self, variables: VariableTable) {
        self.variables = variables;
    }

    /// Allocate a fresh virtual register of type `ty`, optionally carrying a
    /// spill location inherited from an SSA φ (spec.md §4.6 step 4).
    pub fn make_reg(&mut self, ty: Type, spill: Option<Variable>) -> Reg {
        self.regs.push(RegData { ty, spill })
    }

    /// The register's type.
    pub fn reg_type(&self, r: Reg) -> Type {
        self.regs[r].ty
    }

    /// The register's spill location, if any.
    pub fn reg_spill(&self, r: Reg) -> Option<Variable> {
        self.regs[r].spill
    }

    /// Number of virtual registers allocated so far (lowering iterates
    /// `0..reg_count` via `Reg::new` to build a 1:1 Asm-register mapping).
    pub fn reg_count(&self) -> usize {
        self.regs.len()
    }

    /// Append a new, empty block. The first created becomes the entry.
    pub fn make_block(&mut self) -> Block {
        let b = self.blocks.push(RtlBlock::default());
        self.block_order.push(b);
        if self.entry.is_none() {
            self.entry = Some(b);
        }
        b
    }

    /// Blocks in creation order.
    pub fn blocks(&self) -> &[Block] {
        &self.block_order
    }

    /// Borrow a block.
    pub fn block(&self, b: Block) -> &RtlBlock {
        &self.blocks[b]
    }

    /// Mutably borrow a block.
    pub fn block_mut(&mut self, b: Block) -> &mut RtlBlock {
        &mut self.blocks[b]
    }

    /// Append an instruction to `block`.
    pub fn append(&mut self, block: Block, dest: Option<Reg>, op: RtlOp) {
        self.blocks[block].insts.push(RtlInst { dest, op });
    }

    /// Rebuild `predecessors`/`successors` from current terminators (spec.md
    /// §4.1: "For RTL the function is simpler: only successors/predecessors
    /// are rebuilt from terminators").
    pub fn seal(&mut self) {
        for b in &self.block_order {
            self.blocks[*b].predecessors.clear();
            self.blocks[*b].successors.clear();
        }
        let mut edges = Vec::new();
        for &b in &self.block_order {
            if let Some(last) = self.blocks[b].insts.last() {
                match &last.op {
                    RtlOp::Jump { target } => edges.push((b, *target)),
                    RtlOp::ConditionalJump {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeTable, Width};
    use crate::value::Value;

    #[test]
    fn seal_rebuilds_edges() {
        let mut f = RtlFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let b0 = f.make_block();
        let b1 = f.make_block();
        let r = f.make_reg(i32_, None);
        f.append(
            b0,
            Some(r),
            RtlOp::LoadConstant {
                ty: i32_,
                value: Value::int(true, Width::W32, 1),
            },
        );
        f.append(b0, None, RtlOp::Jump { target: b1 });
        f.append(b1, None, RtlOp::Jump { target: b1 });
        f.seal();
        assert_eq!(f.block(b0).successors, vec![b1]);
        assert_eq!(f.block(b1).predecessors, vec![b0, b1]);
    }
}
