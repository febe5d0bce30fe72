//! `AsmFunction`: target-specific virtual-register IR directly above
//! textual assembly (spec.md §3 "Asm function/block", §9 design note: "this
//! is the IR the register allocator and the writer both consume").

use std::collections::BTreeSet;

use crate::entity::EntityRef;
use crate::ir::asm::entities::{AsmReg, Block};
use crate::ir::asm::node::AsmOp;
use crate::isa::registers::PhysicalRegisterKindMask;
use crate::types::{Type, TypeProperties};
use crate::variable::{Variable, VariableTable};

struct VirtualRegData {
    kind_mask: PhysicalRegisterKindMask,
    ty: Type,
    spill: Option<Variable>,
}

/// One Asm instruction plus its (optional) destination register.
#[derive(Clone)]
pub struct AsmInst {
    pub dest: Option<AsmReg>,
    pub op: AsmOp,
}

/// A block in an `AsmFunction`. The `used_at_start`/`assigned_registers`/
/// `live_in_at_start`/`live_out_at_end` sets are `BTreeSet`s (spec.md §5:
/// "iteration over sets must be ... sorted by stable identifiers so that
/// output assembly is reproducible") and are populated by
/// `regalloc::liveness`.
#[derive(Default, Clone)]
pub struct AsmBlock {
    pub insts: Vec<AsmInst>,
    pub predecessors: Vec<Block>,
    pub successors: Vec<Block>,
    pub used_at_start: BTreeSet<AsmReg>,
    pub assigned_registers: BTreeSet<AsmReg>,
    pub live_in_at_start: BTreeSet<AsmReg>,
    pub live_out_at_end: BTreeSet<AsmReg>,
    /// Set by the assembly writer's first pass (spec.md §4.11).
    pub can_join_previous: bool,
}

/// A function body in Asm form.
pub struct AsmFunction {
    pub name: String,
    virtual_regs: Vec<VirtualRegData>,
    blocks: Vec<AsmBlock>,
    block_order: Vec<Block>,
    pub entry: Option<Block>,
    /// Byte size of the local-variable area, before the allocator grows it
    /// for spill slots (spec.md §4.9).
    pub locals_size: u32,
    /// Source locals and parameters inherited from the front end, plus any
    /// spill slots the register allocator declares (spec.md §4.9 "Spill-
    /// code insertion").
    variables: VariableTable,
}

impl AsmFunction {
    /// Start an empty function, inheriting `variables` from the SSA/RTL
    /// function it was lowered from.
    pub fn new(name: impl Into<String>, variables: VariableTable) -> Self {
        Self {
            name: name.into(),
            virtual_regs: Vec::new(),
            blocks: Vec::new(),
            block_order: Vec::new(),
            entry: None,
            locals_size: 0,
            variables,
        }
    }

    /// Borrow the function's variable table (frame offsets, for the
    /// writer).
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Declare a fresh spill slot of `props`'s size/alignment, bumping
    /// `locals_size` and assigning it a frame offset immediately (spec.md
    /// §4.9: "allocate a spill slot in the function's local area").
    pub fn declare_spill_slot(&mut self, ty: Type, props: TypeProperties) -> Variable {
        let v = self.variables.declare(crate::variable::VariableKind::Local, ty);
        self.locals_size = self.variables.allocate(v, self.locals_size, props);
        v
    }

    /// Allocate a fresh virtual register whose physical-kind-mask is
    /// `kind_mask` (computed from `ty` by the RTL→Asm lowering, spec.md
    /// §4.7).
    pub fn make_virtual(
        &mut self,
        kind_mask: PhysicalRegisterKindMask,
        ty: Type,
        spill: Option<Variable>,
    ) -> AsmReg {
        let idx = self.virtual_regs.len() as u32;
        self.virtual_regs.push(VirtualRegData {
            kind_mask,
            ty,
            spill,
        });
        AsmReg::Virtual(idx)
    }

    /// The register's physical-kind-mask (physical registers consult
    /// `isa::registers::RegisterTable` directly instead).
    pub fn virtual_kind_mask(&self, idx: u32) -> PhysicalRegisterKindMask {
        self.virtual_regs[idx as usize].kind_mask
    }

    /// The virtual register's type.
    pub fn virtual_type(&self, idx: u32) -> Type {
        self.virtual_regs[idx as usize].ty
    }

    /// The virtual register's spill location, if it carries one forward
    /// from an SSA φ / RTL register (spec.md §4.6 step 4).
    pub fn virtual_spill(&self, idx: u32) -> Option<Variable> {
        self.virtual_regs[idx as usize].spill
    }

    /// Number of virtual registers allocated so far.
    pub fn virtual_count(&self) -> usize {
        self.virtual_regs.len()
    }

    /// Append a new, empty block. The first created becomes the entry.
    pub fn make_block(&mut self) -> Block {
        let b = Block::new(self.blocks.len());
        self.blocks.push(AsmBlock::default());
        self.block_order.push(b);
        if self.entry.is_none() {
            self.entry = Some(b);
        }
        b
    }

    /// Blocks in creation (= final emission) order (spec.md §4.11: "start
    /// block first, then remaining blocks in their function order").
    pub fn blocks(&self) -> &[Block] {
        &self.block_order
    }

    pub fn block(&self, b: Block) -> &AsmBlock {
        &self.blocks[b.index()]
    }

    pub fn block_mut(&mut self, b: Block) -> &mut AsmBlock {
        &mut self.blocks[b.index()]
    }

    /// Append an instruction to `block`.
    pub fn append(&mut self, block: Block, dest: Option<AsmReg>, op: AsmOp) {
        self.blocks[block.index()].insts.push(AsmInst { dest, op });
    }

    /// Rebuild `predecessors`/`successors` from current terminators.
    pub fn seal(&mut self) {
        for b in &self.block_order {
            self.blocks[b.index()].predecessors.clear();
            self.blocks[b.index()].successors.clear();
        }
        let mut edges = Vec::new();
        for &b in &self.block_order {
            if let Some(last) = self.blocks[b.index()].insts.last() {
                match &last.op {
                    AsmOp::Jump { target } => edges.push((b, *target)),
                    AsmOp::CompareAgainstConstAndJump {
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
            self.blocks[from.index()].successors.push(to);
            self.blocks[to.index()].predecessors.push(from);
        }
    }

    /// Every register this function's instructions write to, across all
    /// blocks (used by the writer's callee-save scan, spec.md §4.11).
    pub fn all_defined_registers(&self) -> BTreeSet<AsmReg> {
        let mut out = BTreeSet::new();
        for b in &self.blocks {
            for inst in &b.insts {
                if let Some(d) = inst.dest {
                    out.insert(d);
                }
            }
        }
        out
    }
}
