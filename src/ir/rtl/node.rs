//! RTL instructions (spec.md §3 "RTL function/block", §4.6 node emission).
//!
//! Unlike the SSA IR, RTL instructions name virtual registers instead of
//! referencing other instructions directly; there is no φ.

use smallvec::SmallVec;

use crate::ir::rtl::entities::{Block, Reg};
use crate::types::Type;
use crate::value::Value;

pub use crate::ir::ssa::node::CompareOp;

/// One RTL instruction. The destination register (if any) is tracked by the
/// owning block alongside the instruction, not inline, since several
/// variants (`Store`, `Jump`, `ConditionalJump`) have none.
#[derive(Clone, Debug)]
pub enum RtlOp {
    /// Materializes a compile-time constant into `dest`.
    LoadConstant { ty: Type, value: Value },
    /// Copies `src` into `dest`.
    Move { ty: Type, src: Reg },
    /// Reads `*addr` into `dest`.
    Load { ty: Type, addr: Reg },
    /// Writes `value` to `*addr`. No destination register.
    Store { addr: Reg, value: Reg },
    /// `dest := lhs op rhs`, `dest` is `Bool`.
    Compare {
        op: CompareOp,
        lhs: Reg,
        rhs: Reg,
        operand_ty: Type,
    },
    /// `dest := lhs + rhs`.
    Add { ty: Type, lhs: Reg, rhs: Reg },
    /// `dest := reinterpret(input, ty)`.
    TypeCast { ty: Type, input: Reg },
    /// Unconditional control transfer.
    Jump { target: Block },
    /// Two-way control transfer on `cond` (a `Bool` register).
    ConditionalJump {
        cond: Reg,
        if_true: Block,
        if_false: Block,
    },
}

impl RtlOp {
    /// True for `Jump`/`ConditionalJump`.
    pub fn is_terminator(&self) -> bool {
        matches!(self, RtlOp::Jump { .. } | RtlOp::ConditionalJump { .. })
    }

    /// `Store` always has side effects; every other variant is pure (aside
    /// from writing its own destination register, tracked separately).
    pub fn has_side_effects(&self) -> bool {
        matches!(self, RtlOp::Store { .. })
    }

    /// Every register this instruction reads.
    pub fn inputs(&self) -> SmallVec<[Reg; 2]> {
        let mut out = SmallVec::new();
        match self {
            RtlOp::LoadConstant { .. } | RtlOp::Jump { .. } => {}
            RtlOp::Move { src, .. } | RtlOp::TypeCast { input: src, .. } => out.push(*src),
            RtlOp::Load { addr, .. } => out.push(*addr),
            RtlOp::Store { addr, value } => {
                out.push(*addr);
                out.push(*value);
            }
            RtlOp::Compare { lhs, rhs, .. } | RtlOp::Add { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            RtlOp::ConditionalJump { cond, .. } => out.push(*cond),
        }
    }

    /// Rewrite every register reference through `f`.
    pub fn map_inputs(&mut self, f: &mut impl FnMut(Reg) -> Reg) {
        match self {
            RtlOp::LoadConstant { .. } | RtlOp::Jump { .. } => {}
            RtlOp::Move { src, .. } | RtlOp::TypeCast { input: src, .. } => *src = f(*src),
            RtlOp::Load { addr, .. } => *addr = f(*addr),
            RtlOp::Store { addr, value } => {
                *addr = f(*addr);
                *value = f(*value);
            }
            RtlOp::Compare { lhs, rhs, .. } | RtlOp::Add { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            RtlOp::ConditionalJump { cond, .. } => *cond = f(*cond),
        }
    }
}
