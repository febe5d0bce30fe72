//! The assembly writer (spec.md §4.11, C13): turns a fully allocated
//! `AsmFunction` into GAS-flavoured Intel-syntax x86 text.
//!
//! Two passes over the function's block list (already in emission order,
//! start block first): the first marks which blocks are reached by falling
//! straight through from their predecessor so the second can skip the
//! redundant jump (and invert a branch instead, when it's the true target
//! that falls through).

use std::collections::{BTreeSet, HashSet};

use crate::ir::asm::entities::{AsmReg, Block};
use crate::ir::asm::function::AsmFunction;
use crate::ir::asm::node::{AsmOp, ConditionCode};
use crate::isa::registers::RegisterIndex;
use crate::isa::TargetIsa;
use crate::result::{CodegenError, CodegenResult};
use crate::types::{Type, TypeTable};
use crate::value::Value;
use crate::variable::{Variable, VariableTable};

/// Output dialects the driver may request (spec.md §6). Only `GasIntel` is
/// implemented; the others are reserved.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Dialect {
    GasIntel,
    GasAtT,
    Fasm,
}

fn round_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Render `func` to text. `func` must already be fully register-allocated
/// (every `AsmReg` a `Physical`) and DCE'd.
pub fn write(func: &AsmFunction, isa: &dyn TargetIsa, types: &TypeTable, dialect: Dialect) -> CodegenResult<String> {
    if dialect != Dialect::GasIntel {
        return Err(CodegenError::NotImplemented(format!("{:?} output dialect", dialect)));
    }

    let labels = assign_labels(func);
    let can_join = mark_fallthrough(func);
    let callee_saves = callee_save_set(func, isa);
    let width_bytes = isa.pointer_width() / 8;

    let aligned_locals = round_up(func.locals_size, 16);
    let saves_size = width_bytes * callee_saves.len() as u32;
    let save_offset = |i: usize| aligned_locals + width_bytes * (i as u32 + 1);

    let mut out = String::new();
    out.push_str(".text\n");
    out.push_str(&format!(".globl {}\n", func.name));
    out.push_str(".align 16, 0x90\n");
    out.push_str(&format!(".type {}, @function\n", func.name));
    out.push_str(&format!("{}:\n", func.name));
    out.push_str(".cfi_startproc\n");

    let bp = isa.frame_pointer_name();
    let sp = isa.stack_pointer_name();
    out.push_str(&format!("push %{}\n", bp));
    out.push_str(".cfi_def_cfa_offset 16\n");
    out.push_str(&format!(".cfi_offset %{}, -16\n", bp));
    out.push_str(&format!("mov %{}, %{}\n", bp, sp));
    out.push_str(&format!(".cfi_def_cfa_register %{}\n", bp));
    if aligned_locals + saves_size > 0 {
        out.push_str(&format!("sub %{}, {}\n", sp, aligned_locals + saves_size));
    }
    for (i, &reg) in callee_saves.iter().enumerate() {
        let disp = save_offset(i);
        out.push_str(&format!("mov [%{} - {}], %{}\n", bp, disp, isa.registers()[reg].name));
        out.push_str(&format!(".cfi_offset %{}, -{}\n", isa.registers()[reg].name, 16 + disp));
    }

    for &b in func.blocks() {
        if !can_join.contains(&b) {
            out.push_str(".align 16, 0x90\n");
        }
        out.push_str(&format!(".Ltmp{}:\n", labels[&b]));

        let insts = &func.block(b).insts;
        let terminator_is_control = insts.last().map(|i| i.op.is_terminator()).unwrap_or(false);
        let body_len = if terminator_is_control { insts.len() - 1 } else { insts.len() };

        for inst in &insts[..body_len] {
            emit_instruction(&mut out, inst, isa, types, func.variables());
        }

        if terminator_is_control {
            emit_terminator(&mut out, func, b, &insts[body_len], &labels, isa);
        } else {
            out.push_str(".cfi_remember_state\n");
            for (i, &reg) in callee_saves.iter().enumerate().rev() {
                let disp = save_offset(i);
                out.push_str(&format!("mov %{}, [%{} - {}]\n", isa.registers()[reg].name, bp, disp));
            }
            out.push_str(&format!("mov %{}, %{}\n", sp, bp));
            out.push_str(&format!("pop %{}\n", bp));
            out.push_str("ret\n");
            out.push_str(".cfi_restore_state\n");
        }
    }

    out.push_str(".cfi_endproc\n");
    Ok(out)
}

/// Pass 1: a block can join its predecessor (skip the explicit `.Ltmp`
/// re-entry and any jump into it) iff the immediately preceding block's
/// terminator falls through to it naturally (spec.md §4.11 pass 1).
fn mark_fallthrough(func: &AsmFunction) -> HashSet<Block> {
    let order = func.blocks();
    let mut joinable = HashSet::new();
    for pair in order.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let falls_through = match func.block(prev).insts.last().map(|i| &i.op) {
            Some(AsmOp::Jump { target }) => *target == next,
            Some(AsmOp::CompareAgainstConstAndJump { if_true, if_false, .. }) => {
                *if_true == next || *if_false == next
            }
            _ => false,
        };
        if falls_through {
            joinable.insert(next);
        }
    }
    joinable
}

fn assign_labels(func: &AsmFunction) -> std::collections::HashMap<Block, u32> {
    func.blocks().iter().enumerate().map(|(i, &b)| (b, i as u32 + 1)).collect()
}

/// Every callee-save, non-special-purpose physical register this function
/// ever writes, widened to its save-register alias (spec.md §4.11 "Callee-
/// save set").
fn callee_save_set(func: &AsmFunction, isa: &dyn TargetIsa) -> Vec<RegisterIndex> {
    let mut out: BTreeSet<RegisterIndex> = BTreeSet::new();
    for r in func.all_defined_registers() {
        if let AsmReg::Physical(idx) = r {
            let save = isa.registers()[idx].save_register;
            if isa.registers()[save].is_callee_save && !isa.registers()[save].is_special_purpose {
                out.insert(save);
            }
        }
    }
    out.into_iter().collect()
}

fn reg_name(r: AsmReg, isa: &dyn TargetIsa) -> String {
    match r {
        AsmReg::Physical(idx) => format!("%{}", isa.registers()[idx].name),
        AsmReg::Virtual(idx) => format!("%v{}", idx),
    }
}

fn frame_operand(v: Variable, vars: &VariableTable, bp: &str) -> String {
    let off = vars.offset(v).unwrap();
    if off < 0 {
        format!("[%{} - {}]", bp, -off)
    } else {
        format!("[%{} + {}]", bp, off)
    }
}

fn reg_width_bytes(r: AsmReg, isa: &dyn TargetIsa) -> u32 {
    let mask = match r {
        AsmReg::Physical(idx) => isa.registers()[idx].kind_mask,
        AsmReg::Virtual(_) => 0,
    };
    use crate::isa::registers::kind;
    if mask & kind::INT64 != 0 {
        8
    } else if mask & kind::INT32 != 0 {
        4
    } else if mask & kind::INT16 != 0 {
        2
    } else {
        1
    }
}

fn dest_width_bytes(ty: Type, types: &TypeTable, target_width: u32) -> u32 {
    if types.is_bool(ty) {
        1
    } else if types.is_pointer(ty) {
        target_width / 8
    } else {
        types.as_integer(ty).map(|(_, w)| w.resolve(target_width).bytes()).unwrap_or(target_width / 8)
    }
}

fn emit_instruction(out: &mut String, inst: &crate::ir::asm::function::AsmInst, isa: &dyn TargetIsa, types: &TypeTable, vars: &VariableTable) {
    let bp = isa.frame_pointer_name();
    let dest = inst.dest.map(|d| reg_name(d, isa));
    match &inst.op {
        AsmOp::LoadConstant { value, .. } => match value {
            Value::VarPtr { variable, offset } => {
                let base = frame_operand(*variable, vars, bp);
                let base = base.trim_start_matches('[').trim_end_matches(']');
                if *offset == 0 {
                    out.push_str(&format!("lea {}, [{}]\n", dest.unwrap(), base));
                } else {
                    out.push_str(&format!("lea {}, [{} + {}]\n", dest.unwrap(), base, offset));
                }
            }
            Value::Bool(b) => out.push_str(&format!("mov {}, {}\n", dest.unwrap(), *b as i32)),
            Value::Int { bits, .. } => out.push_str(&format!("mov {}, {}\n", dest.unwrap(), bits)),
            Value::NullPtr => out.push_str(&format!("mov {}, 0\n", dest.unwrap())),
            Value::Varying => unreachable!("SCCP never leaves a Varying value as a materialized constant"),
        },
        AsmOp::Move { src, .. } => {
            out.push_str(&format!("mov {}, {}\n", dest.unwrap(), reg_name(*src, isa)));
        }
        AsmOp::Load { addr, .. } => {
            out.push_str(&format!("mov {}, [{}]\n", dest.unwrap(), reg_name(*addr, isa)));
        }
        AsmOp::Store { addr, value } => {
            out.push_str(&format!("mov [{}], {}\n", reg_name(*addr, isa), reg_name(*value, isa)));
        }
        AsmOp::LoadLocal { variable, .. } => {
            out.push_str(&format!("mov {}, {}\n", dest.unwrap(), frame_operand(*variable, vars, bp)));
        }
        AsmOp::StoreLocal { variable, value } => {
            out.push_str(&format!("mov {}, {}\n", frame_operand(*variable, vars, bp), reg_name(*value, isa)));
        }
        AsmOp::Compare { cond, lhs, rhs } => {
            out.push_str(&format!("cmp {}, {}\n", reg_name(*lhs, isa), reg_name(*rhs, isa)));
            out.push_str(&format!("set{} {}\n", cond.mnemonic_suffix(), dest.unwrap()));
        }
        AsmOp::Add { lhs, rhs, .. } => {
            let d = dest.unwrap();
            if reg_name(*lhs, isa) != d {
                out.push_str(&format!("mov {}, {}\n", d, reg_name(*lhs, isa)));
            }
            out.push_str(&format!("add {}, {}\n", d, reg_name(*rhs, isa)));
        }
        AsmOp::Mul { lhs, rhs, .. } => {
            let d = dest.unwrap();
            if reg_name(*lhs, isa) != d {
                out.push_str(&format!("mov {}, {}\n", d, reg_name(*lhs, isa)));
            }
            out.push_str(&format!("imul {}, {}\n", d, reg_name(*rhs, isa)));
        }
        AsmOp::TypeCast { ty, input } => {
            let d = dest.unwrap();
            let src = reg_name(*input, isa);
            let dest_bytes = dest_width_bytes(*ty, types, isa.pointer_width());
            let input_bytes = reg_width_bytes(*input, isa);
            if dest_bytes > input_bytes {
                let signed = types.as_integer(*ty).map(|(s, _)| s).unwrap_or(false);
                let mnemonic = if signed { "movsx" } else { "movzx" };
                out.push_str(&format!("{} {}, {}\n", mnemonic, d, src));
            } else {
                out.push_str(&format!("mov {}, {}\n", d, src));
            }
        }
        AsmOp::Jump { .. } | AsmOp::CompareAgainstConstAndJump { .. } => {
            unreachable!("terminators are emitted by emit_terminator")
        }
    }
}

fn emit_terminator(
    out: &mut String,
    func: &AsmFunction,
    block: Block,
    inst: &crate::ir::asm::function::AsmInst,
    labels: &std::collections::HashMap<Block, u32>,
    isa: &dyn TargetIsa,
) {
    let next = func
        .blocks()
        .iter()
        .position(|&b| b == block)
        .and_then(|i| func.blocks().get(i + 1))
        .copied();

    match &inst.op {
        AsmOp::Jump { target } => {
            if Some(*target) != next {
                out.push_str(&format!("jmp .Ltmp{}\n", labels[target]));
            }
        }
        AsmOp::CompareAgainstConstAndJump {
            reg,
            constant,
            cond,
            if_true,
            if_false,
        } => {
            out.push_str(&format!("cmp {}, {}\n", reg_name(*reg, isa), constant));
            if Some(*if_false) == next {
                out.push_str(&format!("j{} .Ltmp{}\n", cond.mnemonic_suffix(), labels[if_true]));
            } else if Some(*if_true) == next {
                out.push_str(&format!("j{} .Ltmp{}\n", cond.negate().mnemonic_suffix(), labels[if_false]));
            } else {
                out.push_str(&format!("j{} .Ltmp{}\n", cond.mnemonic_suffix(), labels[if_true]));
                out.push_str(&format!("jmp .Ltmp{}\n", labels[if_false]));
            }
        }
        _ => unreachable!("non-terminator passed to emit_terminator"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::X86_64;
    use crate::types::Width;

    #[test]
    fn fallthrough_block_gets_no_explicit_jump() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let ptr_ = types.pointer(i32_);
        let mut f = AsmFunction::new("main", VariableTable::new());
        let b0 = f.make_block();
        let b1 = f.make_block();
        let reg = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        let addr = f.make_virtual(crate::isa::registers::kind::INT32, ptr_, None);
        f.append(b0, Some(reg), AsmOp::LoadConstant { ty: i32_, value: Value::int(true, Width::W32, 1) });
        f.append(b0, None, AsmOp::Jump { target: b1 });
        f.append(b1, Some(addr), AsmOp::LoadConstant { ty: ptr_, value: Value::NullPtr });
        f.append(b1, None, AsmOp::Store { addr, value: reg });
        f.seal();

        let isa = X86_64::new();
        crate::regalloc::allocator::run(&mut f, &isa, &types).unwrap();
        crate::passes::asm_dce::run(&mut f);
        let text = write(&f, &isa, &types, Dialect::GasIntel).unwrap();
        assert!(!text.contains("jmp .Ltmp2"));
    }

    #[test]
    fn non_fallthrough_jump_is_emitted() {
        let types = TypeTable::new();
        let mut f = AsmFunction::new("main", VariableTable::new());
        let b0 = f.make_block();
        let b1 = f.make_block();
        let b2 = f.make_block();
        f.append(b0, None, AsmOp::Jump { target: b2 });
        f.append(b1, None, AsmOp::Jump { target: b1 });
        f.append(b2, None, AsmOp::Jump { target: b1 });
        f.seal();

        let isa = X86_64::new();
        let text = write(&f, &isa, &types, Dialect::GasIntel).unwrap();
        assert!(text.contains("jmp .Ltmp3"));
    }

    #[test]
    fn non_gas_intel_dialect_reports_not_implemented() {
        let types = TypeTable::new();
        let f = AsmFunction::new("main", VariableTable::new());
        let isa = X86_64::new();
        let result = write(&f, &isa, &types, Dialect::Fasm);
        assert!(matches!(result, Err(CodegenError::NotImplemented(_))));
    }
}
