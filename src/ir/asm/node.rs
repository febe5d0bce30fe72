//! Asm instructions (spec.md §3 "Asm function/block", §4.7 lowering rules).

use smallvec::SmallVec;

use crate::ir::asm::entities::{AsmReg, Block};
use crate::types::Type;
use crate::value::Value;
use crate::variable::Variable;

/// A condition code, chosen from operand signedness at lowering time
/// (spec.md §4.7: "pick a condition code from `{E,NE,A/B/AE/BE,G/L/GE/LE}`
/// using the signedness of `T`").
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ConditionCode {
    E,
    NE,
    A,
    AE,
    B,
    BE,
    G,
    GE,
    L,
    LE,
}

impl ConditionCode {
    /// The GAS mnemonic suffix this condition code maps to (e.g. `sete`,
    /// `jne`); callers append it to `set`/`j` as the writer needs.
    pub fn mnemonic_suffix(self) -> &'static str {
        match self {
            ConditionCode::E => "e",
            ConditionCode::NE => "ne",
            ConditionCode::A => "a",
            ConditionCode::AE => "ae",
            ConditionCode::B => "b",
            ConditionCode::BE => "be",
            ConditionCode::G => "g",
            ConditionCode::GE => "ge",
            ConditionCode::L => "l",
            ConditionCode::LE => "le",
        }
    }

    /// The negated condition (used by the writer to invert a branch when
    /// the true target is the natural fallthrough, spec.md §4.11).
    pub fn negate(self) -> ConditionCode {
        match self {
            ConditionCode::E => ConditionCode::NE,
            ConditionCode::NE => ConditionCode::E,
            ConditionCode::A => ConditionCode::BE,
            ConditionCode::AE => ConditionCode::B,
            ConditionCode::B => ConditionCode::AE,
            ConditionCode::BE => ConditionCode::A,
            ConditionCode::G => ConditionCode::LE,
            ConditionCode::GE => ConditionCode::L,
            ConditionCode::L => ConditionCode::GE,
            ConditionCode::LE => ConditionCode::G,
        }
    }

    /// Choose a condition code for `op` given whether the compared operands
    /// are signed (bool and pointer compares are always unsigned, spec.md
    /// §4.7).
    pub fn from_compare(op: crate::ir::ssa::node::CompareOp, signed: bool) -> ConditionCode {
        use crate::ir::ssa::node::CompareOp::*;
        match (op, signed) {
            (Eq, _) => ConditionCode::E,
            (Ne, _) => ConditionCode::NE,
            (Lt, true) => ConditionCode::L,
            (Lt, false) => ConditionCode::B,
            (Le, true) => ConditionCode::LE,
            (Le, false) => ConditionCode::BE,
            (Gt, true) => ConditionCode::G,
            (Gt, false) => ConditionCode::A,
            (Ge, true) => ConditionCode::GE,
            (Ge, false) => ConditionCode::AE,
        }
    }
}

/// One Asm instruction. The destination register (if any) is tracked by the
/// owning `AsmInst`, alongside the op, mirroring `RtlInst`.
#[derive(Clone, Debug)]
pub enum AsmOp {
    /// Materializes a compile-time constant.
    LoadConstant { ty: Type, value: Value },
    /// Copies `src`.
    Move { ty: Type, src: AsmReg },
    /// Reads `*addr` (address not statically known to be a single local).
    Load { ty: Type, addr: AsmReg },
    /// Writes `value` to `*addr`.
    Store { addr: AsmReg, value: AsmReg },
    /// Reads `variable` directly off the frame (spec.md §4.8 address-of
    /// analysis).
    LoadLocal { ty: Type, variable: Variable },
    /// Writes `value` directly to `variable`'s frame slot.
    StoreLocal { variable: Variable, value: AsmReg },
    /// `dest := lhs op rhs` as a boolean (0/1) register, per `cond`.
    Compare {
        cond: ConditionCode,
        lhs: AsmReg,
        rhs: AsmReg,
    },
    /// `dest := lhs + rhs`.
    Add { ty: Type, lhs: AsmReg, rhs: AsmReg },
    /// `dest := lhs * rhs` (pointer-arithmetic element-size scaling, spec.md
    /// §4.7).
    Mul { ty: Type, lhs: AsmReg, rhs: AsmReg },
    /// `dest := reinterpret(input, ty)`.
    TypeCast { ty: Type, input: AsmReg },
    /// Unconditional control transfer.
    Jump { target: Block },
    /// `cmp reg, constant; j<cond> if_true else if_false` (spec.md §4.7:
    /// `ConditionalJump(cond,T,F) -> AsmCompareAgainstConstAndJump(cond,0,NE,T,F)`).
    CompareAgainstConstAndJump {
        reg: AsmReg,
        constant: i64,
        cond: ConditionCode,
        if_true: Block,
        if_false: Block,
    },
}

impl AsmOp {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            AsmOp::Jump { .. } | AsmOp::CompareAgainstConstAndJump { .. }
        )
    }

    /// `Store`/`StoreLocal` always have side effects.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, AsmOp::Store { .. } | AsmOp::StoreLocal { .. })
    }

    pub fn inputs(&self) -> SmallVec<[AsmReg; 2]> {
        let mut out = SmallVec::new();
        match self {
            AsmOp::LoadConstant { .. } | AsmOp::LoadLocal { .. } | AsmOp::Jump { .. } => {}
            AsmOp::Move { src, .. } | AsmOp::TypeCast { input: src, .. } => out.push(*src),
            AsmOp::Load { addr, .. } => out.push(*addr),
            AsmOp::Store { addr, value } => {
                out.push(*addr);
                out.push(*value);
            }
            AsmOp::StoreLocal { value, .. } => out.push(*value),
            AsmOp::Compare { lhs, rhs, .. }
            | AsmOp::Add { lhs, rhs, .. }
            | AsmOp::Mul { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            AsmOp::CompareAgainstConstAndJump { reg, .. } => out.push(*reg),
        }
    }

    pub fn map_inputs(&mut self, f: &mut impl FnMut(AsmReg) -> AsmReg) {
        match self {
            AsmOp::LoadConstant { .. } | AsmOp::LoadLocal { .. } | AsmOp::Jump { .. } => {}
            AsmOp::Move { src, .. } | AsmOp::TypeCast { input: src, .. } => *src = f(*src),
            AsmOp::Load { addr, .. } => *addr = f(*addr),
            AsmOp::Store { addr, value } => {
                *addr = f(*addr);
                *value = f(*value);
            }
            AsmOp::StoreLocal { value, .. } => *value = f(*value),
            AsmOp::Compare { lhs, rhs, .. }
            | AsmOp::Add { lhs, rhs, .. }
            | AsmOp::Mul { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            AsmOp::CompareAgainstConstAndJump { reg, .. } => *reg = f(*reg),
        }
    }
}
