//! The Chaitin/Briggs-style register allocator (spec.md §4.9, C11): simplify,
//! color, spill, repeat until every live range is assigned a physical
//! register or the retry budget is exhausted.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::ir::asm::entities::AsmReg;
use crate::ir::asm::function::AsmFunction;
use crate::ir::asm::node::AsmOp;
use crate::isa::registers::RegisterIndex;
use crate::isa::TargetIsa;
use crate::regalloc::live_range::LiveRangeData;
use crate::regalloc::liveness;
use crate::result::{CodegenError, CodegenResult};
use crate::types::{Type, TypeTable};

/// Number of non-special-purpose physical registers compatible with `r`'s
/// kind-mask: `K(r)` in spec.md §4.9.
fn capacity(range: &LiveRangeData, isa: &dyn TargetIsa) -> usize {
    isa.registers()
        .all()
        .filter(|(_, p)| !p.is_special_purpose && (p.kind_mask & range.kind_mask) != 0)
        .count()
}

/// Chaitin colorability simplification: repeatedly push the first register
/// with fewer than `K` remaining interfering registers, or — if none
/// qualifies — the one with the fewest (a potential spill candidate).
fn simplify(ranges: &BTreeMap<AsmReg, LiveRangeData>, isa: &dyn TargetIsa) -> Vec<AsmReg> {
    let mut remaining: BTreeSet<AsmReg> = ranges
        .keys()
        .copied()
        .filter(|r| matches!(r, AsmReg::Virtual(_)))
        .collect();
    let mut stack = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut chosen = None;
        let mut least: Option<(AsmReg, usize)> = None;
        for &r in &remaining {
            let degree = ranges[&r].intersecting.intersection(&remaining).count();
            if degree < capacity(&ranges[&r], isa) {
                chosen = Some(r);
                break;
            }
            if least.map(|(_, d)| degree < d).unwrap_or(true) {
                least = Some((r, degree));
            }
        }
        let r = chosen.or_else(|| least.map(|(r, _)| r)).expect("remaining set is non-empty");
        remaining.remove(&r);
        stack.push(r);
    }
    stack
}

/// Pop `stack` and assign each register a physical register, preferring
/// `combinable` hints and avoiding their interferences. Returns the
/// registers that couldn't be colored (spill candidates).
fn color(ranges: &mut BTreeMap<AsmReg, LiveRangeData>, mut stack: Vec<AsmReg>, isa: &dyn TargetIsa) -> Vec<AsmReg> {
    let mut spilled = Vec::new();

    while let Some(r) = stack.pop() {
        let mut intersecting_phys: BTreeSet<RegisterIndex> = BTreeSet::new();
        for other in &ranges[&r].intersecting {
            let assigned = ranges[other].allocated_register.or(match ranges[other].original_register {
                p @ AsmReg::Physical(_) => Some(p),
                AsmReg::Virtual(_) => None,
            });
            if let Some(AsmReg::Physical(p)) = assigned {
                intersecting_phys.extend(isa.registers()[p].interferes_with.iter().copied());
            }
        }

        let preferred: BTreeSet<RegisterIndex> = ranges[&r]
            .combinable
            .iter()
            .filter_map(|c| ranges[c].allocated_register)
            .filter_map(|a| match a {
                AsmReg::Physical(p) => Some(p),
                AsmReg::Virtual(_) => None,
            })
            .collect();
        let avoided: BTreeSet<RegisterIndex> = ranges[&r]
            .combinable
            .iter()
            .flat_map(|c| ranges[c].intersecting.iter())
            .filter_map(|ir| ranges[ir].allocated_register)
            .filter_map(|a| match a {
                AsmReg::Physical(p) => Some(p),
                AsmReg::Virtual(_) => None,
            })
            .collect();

        let mask = ranges[&r].kind_mask;
        let mut best: Option<(RegisterIndex, i32)> = None;
        for (idx, preg) in isa.registers().all() {
            if preg.is_special_purpose && !preferred.contains(&idx) {
                continue;
            }
            if preg.kind_mask & mask == 0 {
                continue;
            }
            if intersecting_phys.contains(&idx) {
                continue;
            }
            let score = if preferred.contains(&idx) {
                1
            } else if avoided.contains(&idx) {
                -1
            } else {
                0
            };
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, _)) => {
                ranges.get_mut(&r).unwrap().allocated_register = Some(AsmReg::Physical(idx));
            }
            None => spilled.push(r),
        }
    }

    spilled
}

enum SpillPlan {
    Rematerialize(crate::value::Value, Type),
    Slot(crate::variable::Variable, Type),
}

/// Insert `LoadConstant`/`LoadLocal` before each read and `StoreLocal` after
/// each write of a spilled register (spec.md §4.9 "Spill-code insertion").
fn apply_spill(
    func: &mut AsmFunction,
    ranges: &BTreeMap<AsmReg, LiveRangeData>,
    spilled: &[AsmReg],
    types: &TypeTable,
    target_width: u32,
) {
    let mut plans: BTreeMap<AsmReg, SpillPlan> = BTreeMap::new();
    for &r in spilled {
        let idx = match r {
            AsmReg::Virtual(idx) => idx,
            AsmReg::Physical(_) => unreachable!("physical registers are never pushed to the spill list"),
        };
        let ty = func.virtual_type(idx);
        let lr = &ranges[&r];
        if let Some(value) = &lr.constant_value {
            plans.insert(r, SpillPlan::Rematerialize(value.clone(), ty));
        } else {
            let props = types.layout(ty, target_width);
            let v = func.declare_spill_slot(ty, props);
            plans.insert(r, SpillPlan::Slot(v, ty));
        }
    }

    for &b in &func.blocks().to_vec() {
        let old = func.block(b).insts.clone();
        let mut new_insts = Vec::with_capacity(old.len());
        for inst in &old {
            for input in inst.op.inputs() {
                match plans.get(&input) {
                    Some(SpillPlan::Rematerialize(value, ty)) => new_insts.push(crate::ir::asm::function::AsmInst {
                        dest: Some(input),
                        op: AsmOp::LoadConstant { ty: *ty, value: value.clone() },
                    }),
                    Some(SpillPlan::Slot(v, ty)) => new_insts.push(crate::ir::asm::function::AsmInst {
                        dest: Some(input),
                        op: AsmOp::LoadLocal { ty: *ty, variable: *v },
                    }),
                    None => {}
                }
            }
            new_insts.push(inst.clone());
            if let Some(dest) = inst.dest {
                if let Some(SpillPlan::Slot(v, _)) = plans.get(&dest) {
                    new_insts.push(crate::ir::asm::function::AsmInst {
                        dest: None,
                        op: AsmOp::StoreLocal { variable: *v, value: dest },
                    });
                }
            }
        }
        func.block_mut(b).insts = new_insts;
    }
    func.seal();
}

/// Replace every register reference with its allocated physical register,
/// then drop any `Move` whose source and destination now coincide (spec.md
/// §4.9 "Coalescing cleanup").
fn apply_coloring(func: &mut AsmFunction, ranges: &BTreeMap<AsmReg, LiveRangeData>) {
    let resolve = |r: AsmReg| ranges.get(&r).and_then(|lr| lr.allocated_register).unwrap_or(r);
    for &b in &func.blocks().to_vec() {
        for inst in func.block_mut(b).insts.iter_mut() {
            if let Some(d) = inst.dest {
                inst.dest = Some(resolve(d));
            }
            inst.op.map_inputs(&mut |r| resolve(r));
        }
    }
    for &b in &func.blocks().to_vec() {
        func.block_mut(b).insts.retain(|inst| match &inst.op {
            AsmOp::Move { src, .. } => inst.dest != Some(*src),
            _ => true,
        });
    }
}

/// Run the allocator to completion: repeated simplify/color/spill rounds
/// until every live range is colored, bounded by `tryCount >= |liveRanges|`
/// (spec.md §4.9 "Failure semantics").
pub fn run(func: &mut AsmFunction, isa: &dyn TargetIsa, types: &TypeTable) -> CodegenResult<()> {
    let target_width = isa.pointer_width();
    let mut attempts = 0usize;

    loop {
        let mut ranges = liveness::compute(func, isa);
        if attempts >= ranges.len().max(1) {
            return Err(CodegenError::RegisterAllocationFailed { attempts });
        }
        attempts += 1;

        let stack = simplify(&ranges, isa);
        let spilled = color(&mut ranges, stack, isa);

        if spilled.is_empty() {
            apply_coloring(func, &ranges);
            return Ok(());
        }
        apply_spill(func, &ranges, &spilled, types, target_width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::asm::node::AsmOp;
    use crate::isa::X86_64;
    use crate::types::{TypeTable, Width};
    use crate::value::Value;
    use crate::variable::VariableTable;

    #[test]
    fn non_interfering_registers_allocate_without_spilling() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let mut f = AsmFunction::new("test", VariableTable::new());
        let b0 = f.make_block();
        let a = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        let b = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        let sum = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        let ptr_ = types.pointer(i32_);
        let addr = f.make_virtual(crate::isa::registers::kind::INT32, ptr_, None);
        f.append(b0, Some(a), AsmOp::LoadConstant { ty: i32_, value: Value::int(true, Width::W32, 1) });
        f.append(b0, Some(b), AsmOp::LoadConstant { ty: i32_, value: Value::int(true, Width::W32, 2) });
        f.append(b0, Some(sum), AsmOp::Add { ty: i32_, lhs: a, rhs: b });
        f.append(b0, Some(addr), AsmOp::LoadConstant { ty: ptr_, value: Value::NullPtr });
        f.append(b0, None, AsmOp::Store { addr, value: sum });
        f.append(b0, None, AsmOp::Jump { target: b0 });
        f.seal();

        let isa = X86_64::new();
        let result = run(&mut f, &isa, &types);
        assert!(result.is_ok());
    }

    #[test]
    fn excess_simultaneously_live_registers_spill() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let ptr_ = types.pointer(i32_);
        let mut f = AsmFunction::new("test", VariableTable::new());
        let b0 = f.make_block();
        let addr = f.make_virtual(crate::isa::registers::kind::INT32, ptr_, None);
        f.append(b0, Some(addr), AsmOp::LoadConstant { ty: ptr_, value: Value::NullPtr });
        let regs: Vec<_> = (0..20)
            .map(|i| {
                let r = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
                f.append(b0, Some(r), AsmOp::LoadConstant { ty: i32_, value: Value::int(true, Width::W32, i) });
                r
            })
            .collect();
        for &r in &regs {
            f.append(b0, None, AsmOp::Store { addr, value: r });
        }
        f.append(b0, None, AsmOp::Jump { target: b0 });
        f.seal();

        let isa = X86_64::new();
        let result = run(&mut f, &isa, &types);
        assert!(result.is_ok());
    }
}
