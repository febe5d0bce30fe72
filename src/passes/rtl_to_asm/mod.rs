//! RTL → Asm lowering (spec.md §4.7, C10): maps every virtual RTL register
//! to a virtual Asm register whose physical-kind-mask is derived from its
//! type, duplicates block/function shells, and expands each `RtlOp` per the
//! per-instruction rules below. Address-of analysis ([`addr_of`]) runs first
//! so `Load`/`Store` through a register known to hold a single local's
//! address become `LoadLocal`/`StoreLocal`.

pub mod addr_of;

use std::collections::HashMap;

use crate::entity::EntityRef;
use crate::ir::asm::entities::{AsmReg, Block as ABlock};
use crate::ir::asm::function::AsmFunction;
use crate::ir::asm::node::{AsmOp, ConditionCode};
use crate::ir::rtl::entities::{Block as RBlock, Reg};
use crate::ir::rtl::function::{RtlFunction, RtlInst};
use crate::ir::rtl::node::RtlOp;
use crate::isa::registers::{kind, PhysicalRegisterKindMask};
use crate::result::{CodegenError, CodegenResult};
use crate::types::{Type, TypeTable, Width};
use crate::value::Value;

/// The physical-kind-mask a register of `ty` needs (spec.md §4.7: "integer
/// sizes 1/2/4/8, pointer size 4 or 8 depending on target; 8-byte integer
/// forbidden on 32-bit target; void forbidden").
fn kind_mask_for(ty: Type, types: &TypeTable, target_width: u32) -> CodegenResult<PhysicalRegisterKindMask> {
    if types.is_void(ty) {
        return Err(CodegenError::UnsupportedOperand(
            "void value cannot occupy a register".to_string(),
        ));
    }
    let bytes = if types.is_bool(ty) {
        1
    } else if types.is_pointer(ty) {
        target_width / 8
    } else if let Some((_, width)) = types.as_integer(ty) {
        width.resolve(target_width).bytes()
    } else {
        return Err(CodegenError::UnsupportedOperand(types.display(ty)));
    };
    match bytes {
        1 => Ok(kind::INT8),
        2 => Ok(kind::INT16),
        4 => Ok(kind::INT32),
        8 if target_width == 64 => Ok(kind::INT64),
        8 => Err(CodegenError::UnsupportedOperand(
            "64-bit integer is not representable on a 32-bit target".to_string(),
        )),
        _ => unreachable!("type layout only ever produces 1/2/4/8-byte values"),
    }
}

/// Bool and pointer compares are unsigned; everything else takes its
/// signedness from the operand type (spec.md §4.7).
fn operand_signed(ty: Type, types: &TypeTable) -> bool {
    types.as_integer(ty).map(|(signed, _)| signed).unwrap_or(false)
}

/// Lower a fully RTL-SCCP'd function to Asm form.
pub fn run(func: &RtlFunction, types: &TypeTable, target_width: u32) -> CodegenResult<AsmFunction> {
    let local_addrs = addr_of::analyze(func);

    let mut asm = AsmFunction::new(func.name.clone(), func.variables().clone());

    let mut block_map: HashMap<RBlock, ABlock> = HashMap::new();
    for &b in func.blocks() {
        block_map.insert(b, asm.make_block());
    }

    let mut reg_map: HashMap<Reg, AsmReg> = HashMap::new();
    for i in 0..func.reg_count() {
        let r = Reg::new(i);
        let ty = func.reg_type(r);
        let kind_mask = kind_mask_for(ty, types, target_width)?;
        let v = asm.make_virtual(kind_mask, ty, func.reg_spill(r));
        reg_map.insert(r, v);
    }

    for &b in func.blocks() {
        let ab = block_map[&b];
        for inst in &func.block(b).insts {
            lower_inst(func, inst, &reg_map, &block_map, &local_addrs, &mut asm, ab, types, target_width)?;
        }
    }

    asm.seal();
    Ok(asm)
}

#[allow(clippy::too_many_arguments)]
fn lower_inst(
    func: &RtlFunction,
    inst: &RtlInst,
    reg_map: &HashMap<Reg, AsmReg>,
    block_map: &HashMap<RBlock, ABlock>,
    local_addrs: &HashMap<Reg, crate::variable::Variable>,
    asm: &mut AsmFunction,
    ab: ABlock,
    types: &TypeTable,
    target_width: u32,
) -> CodegenResult<()> {
    let dest = inst.dest.map(|r| reg_map[&r]);

    match &inst.op {
        RtlOp::LoadConstant { ty, value } => {
            asm.append(
                ab,
                dest,
                AsmOp::LoadConstant {
                    ty: *ty,
                    value: value.clone(),
                },
            );
        }
        RtlOp::Move { ty, src } => {
            asm.append(
                ab,
                dest,
                AsmOp::Move {
                    ty: *ty,
                    src: reg_map[src],
                },
            );
        }
        RtlOp::Load { ty, addr } => {
            if let Some(&variable) = local_addrs.get(addr) {
                asm.append(ab, dest, AsmOp::LoadLocal { ty: *ty, variable });
            } else {
                asm.append(
                    ab,
                    dest,
                    AsmOp::Load {
                        ty: *ty,
                        addr: reg_map[addr],
                    },
                );
            }
        }
        RtlOp::Store { addr, value } => {
            if let Some(&variable) = local_addrs.get(addr) {
                asm.append(
                    ab,
                    None,
                    AsmOp::StoreLocal {
                        variable,
                        value: reg_map[value],
                    },
                );
            } else {
                asm.append(
                    ab,
                    None,
                    AsmOp::Store {
                        addr: reg_map[addr],
                        value: reg_map[value],
                    },
                );
            }
        }
        RtlOp::Compare { op, lhs, rhs, operand_ty } => {
            let cond = ConditionCode::from_compare(*op, operand_signed(*operand_ty, types));
            asm.append(
                ab,
                dest,
                AsmOp::Compare {
                    cond,
                    lhs: reg_map[lhs],
                    rhs: reg_map[rhs],
                },
            );
        }
        RtlOp::Add { ty, lhs, rhs } => {
            lower_add(func, *ty, *lhs, *rhs, dest, reg_map, asm, ab, types, target_width)?;
        }
        RtlOp::TypeCast { ty, input } => {
            asm.append(
                ab,
                dest,
                AsmOp::TypeCast {
                    ty: *ty,
                    input: reg_map[input],
                },
            );
        }
        RtlOp::Jump { target } => {
            asm.append(ab, None, AsmOp::Jump { target: block_map[target] });
        }
        RtlOp::ConditionalJump { cond, if_true, if_false } => {
            asm.append(
                ab,
                None,
                AsmOp::CompareAgainstConstAndJump {
                    reg: reg_map[cond],
                    constant: 0,
                    cond: ConditionCode::NE,
                    if_true: block_map[if_true],
                    if_false: block_map[if_false],
                },
            );
        }
    }
    Ok(())
}

/// `Add(d,l,r)` where one operand is a pointer expands to a scaled-index
/// computation in `d`; otherwise it's a plain two-step add (spec.md §4.7).
#[allow(clippy::too_many_arguments)]
fn lower_add(
    func: &RtlFunction,
    ty: Type,
    lhs: Reg,
    rhs: Reg,
    dest: Option<AsmReg>,
    reg_map: &HashMap<Reg, AsmReg>,
    asm: &mut AsmFunction,
    ab: ABlock,
    types: &TypeTable,
    target_width: u32,
) -> CodegenResult<()> {
    let d = dest.expect("Add always produces a result register");
    let lhs_ty = func.reg_type(lhs);
    let rhs_ty = func.reg_type(rhs);

    if types.is_pointer(lhs_ty) || types.is_pointer(rhs_ty) {
        let (ptr_reg, ptr_ty, int_reg, int_ty) = if types.is_pointer(lhs_ty) {
            (reg_map[&lhs], lhs_ty, reg_map[&rhs], rhs_ty)
        } else {
            (reg_map[&rhs], rhs_ty, reg_map[&lhs], lhs_ty)
        };
        let elem_size = types.layout(types.dereference(ptr_ty), target_width).size;
        let (signed, width) = types
            .as_integer(int_ty)
            .ok_or_else(|| CodegenError::UnsupportedOperand("non-integer pointer-arithmetic operand".to_string()))?;
        let width = width.resolve(target_width);
        asm.append(
            ab,
            Some(d),
            AsmOp::LoadConstant {
                ty: int_ty,
                value: Value::int(signed, width, elem_size as i64),
            },
        );
        asm.append(
            ab,
            Some(d),
            AsmOp::Mul {
                ty: int_ty,
                lhs: d,
                rhs: int_reg,
            },
        );
        asm.append(
            ab,
            Some(d),
            AsmOp::Add {
                ty,
                lhs: d,
                rhs: ptr_reg,
            },
        );
    } else {
        asm.append(
            ab,
            Some(d),
            AsmOp::Move {
                ty,
                src: reg_map[&lhs],
            },
        );
        asm.append(
            ab,
            Some(d),
            AsmOp::Add {
                ty,
                lhs: d,
                rhs: reg_map[&rhs],
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Width;

    #[test]
    fn conditional_jump_becomes_compare_against_zero() {
        let mut f = RtlFunction::new("test");
        let mut types = TypeTable::new();
        let bool_ = types.bool_();
        let b0 = f.make_block();
        let b1 = f.make_block();
        let b2 = f.make_block();
        let cond = f.make_reg(bool_, None);
        f.append(
            b0,
            Some(cond),
            RtlOp::LoadConstant {
                ty: bool_,
                value: Value::Bool(true),
            },
        );
        f.append(
            b0,
            None,
            RtlOp::ConditionalJump {
                cond,
                if_true: b1,
                if_false: b2,
            },
        );
        f.append(b1, None, RtlOp::Jump { target: b1 });
        f.append(b2, None, RtlOp::Jump { target: b2 });
        f.seal();

        let asm = run(&f, &types, 64).unwrap();
        let entry = asm.entry.unwrap();
        let term = asm.block(entry).insts.last().unwrap();
        match &term.op {
            AsmOp::CompareAgainstConstAndJump { constant, cond, .. } => {
                assert_eq!(*constant, 0);
                assert_eq!(*cond, ConditionCode::NE);
            }
            other => panic!("expected CompareAgainstConstAndJump, got {:?}", other),
        }
    }

    #[test]
    fn pointer_add_expands_to_scaled_index() {
        let mut f = RtlFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let ptr_ = types.pointer(i32_);
        let b0 = f.make_block();
        let p = f.make_reg(ptr_, None);
        let idx = f.make_reg(i32_, None);
        let sum = f.make_reg(ptr_, None);
        f.append(b0, Some(sum), RtlOp::Add { ty: ptr_, lhs: p, rhs: idx });
        f.append(b0, None, RtlOp::Jump { target: b0 });
        f.seal();

        let asm = run(&f, &types, 64).unwrap();
        let entry = asm.entry.unwrap();
        assert_eq!(asm.block(entry).insts.len(), 4, "3 expanded add insts + jump");
        match &asm.block(entry).insts[0].op {
            AsmOp::LoadConstant { value, .. } => {
                assert_eq!(*value, Value::int(true, Width::W32, 4))
            }
            other => panic!("expected LoadConstant, got {:?}", other),
        }
        assert!(matches!(asm.block(entry).insts[1].op, AsmOp::Mul { .. }));
        assert!(matches!(asm.block(entry).insts[2].op, AsmOp::Add { .. }));
    }
}
