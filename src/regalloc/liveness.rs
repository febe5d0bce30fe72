//! Asm-level liveness and interference computation (spec.md §4.9 "Live-range
//! computation"): populates each block's `used_at_start`/
//! `assigned_registers`/`live_in_at_start`/`live_out_at_end` and builds one
//! [`LiveRangeData`] per register referenced anywhere in the function.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::asm::entities::AsmReg;
use crate::ir::asm::function::AsmFunction;
use crate::ir::asm::node::AsmOp;
use crate::isa::registers::PhysicalRegisterKindMask;
use crate::isa::TargetIsa;
use crate::regalloc::live_range::LiveRangeData;
use crate::value::Value;

fn kind_mask_of(func: &AsmFunction, isa: &dyn TargetIsa, r: AsmReg) -> PhysicalRegisterKindMask {
    match r {
        AsmReg::Virtual(idx) => func.virtual_kind_mask(idx),
        AsmReg::Physical(p) => isa.registers()[p].kind_mask,
    }
}

/// Per-register constant value if every definition of it loads the same
/// one; `None` once any def disagrees or isn't a `LoadConstant`.
fn compute_constants(func: &AsmFunction) -> BTreeMap<AsmReg, Value> {
    let mut state: BTreeMap<AsmReg, Option<Value>> = BTreeMap::new();
    for &b in func.blocks() {
        for inst in &func.block(b).insts {
            let Some(dest) = inst.dest else { continue };
            let contributed = match &inst.op {
                AsmOp::LoadConstant { value, .. } => Some(value.clone()),
                _ => None,
            };
            match state.get(&dest) {
                None => {
                    state.insert(dest, contributed);
                }
                Some(None) => {}
                Some(Some(existing)) => {
                    if contributed.as_ref() != Some(existing) {
                        state.insert(dest, None);
                    }
                }
            }
        }
    }
    state.into_iter().filter_map(|(r, v)| v.map(|v| (r, v))).collect()
}

/// Standard backward block-level liveness, writing the result into each
/// block's `live_in_at_start`/`live_out_at_end`/`used_at_start`/
/// `assigned_registers` fields.
fn compute_block_liveness(func: &mut AsmFunction) {
    for &b in &func.blocks().to_vec() {
        let mut used_at_start = BTreeSet::new();
        let mut assigned = BTreeSet::new();
        for inst in &func.block(b).insts {
            for input in inst.op.inputs() {
                if !assigned.contains(&input) {
                    used_at_start.insert(input);
                }
            }
            if let Some(dest) = inst.dest {
                assigned.insert(dest);
            }
        }
        let block = func.block_mut(b);
        block.used_at_start = used_at_start;
        block.assigned_registers = assigned;
    }

    loop {
        let mut changed = false;
        for &b in &func.blocks().to_vec() {
            let live_out: BTreeSet<AsmReg> = func
                .block(b)
                .successors
                .iter()
                .flat_map(|s| func.block(*s).live_in_at_start.iter().copied())
                .collect();
            let used_at_start = func.block(b).used_at_start.clone();
            let assigned = func.block(b).assigned_registers.clone();
            let live_in: BTreeSet<AsmReg> = used_at_start
                .into_iter()
                .chain(live_out.iter().filter(|r| !assigned.contains(r)).copied())
                .collect();
            let block = func.block_mut(b);
            if block.live_out_at_end != live_out {
                block.live_out_at_end = live_out;
                changed = true;
            }
            if block.live_in_at_start != live_in {
                block.live_in_at_start = live_in;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Compute interference, coalescing hints, constants, and spill points for
/// every register in `func`. Requires [`compute_block_liveness`] to have
/// already populated per-block live sets, done internally here.
pub fn compute(func: &mut AsmFunction, isa: &dyn TargetIsa) -> BTreeMap<AsmReg, LiveRangeData> {
    compute_block_liveness(func);
    let constants = compute_constants(func);

    let mut ranges: BTreeMap<AsmReg, LiveRangeData> = BTreeMap::new();
    let touch = |ranges: &mut BTreeMap<AsmReg, LiveRangeData>, r: AsmReg| {
        if !ranges.contains_key(&r) {
            let mask = kind_mask_of(func, isa, r);
            let constant = constants.get(&r).cloned();
            ranges.insert(r, LiveRangeData::new(r, mask, constant));
        }
    };

    for &b in func.blocks() {
        let mut live: BTreeSet<AsmReg> = func.block(b).live_out_at_end.clone();
        for &r in &live {
            touch(&mut ranges, r);
        }

        let insts = func.block(b).insts.clone();
        for (idx, inst) in insts.iter().enumerate().rev() {
            if let Some(dest) = inst.dest {
                touch(&mut ranges, dest);
                ranges.get_mut(&dest).unwrap().spill_store_points.push((b, idx));
                live.remove(&dest);
            }
            for input in inst.op.inputs() {
                touch(&mut ranges, input);
                ranges.get_mut(&input).unwrap().spill_load_points.push((b, idx));
                live.insert(input);
            }

            let live_vec: Vec<AsmReg> = live.iter().copied().collect();
            for i in 0..live_vec.len() {
                for j in (i + 1)..live_vec.len() {
                    let (a, bq) = (live_vec[i], live_vec[j]);
                    ranges.get_mut(&a).unwrap().intersecting.insert(bq);
                    ranges.get_mut(&bq).unwrap().intersecting.insert(a);
                }
            }

            if let (AsmOp::Move { src, .. }, Some(dest)) = (&inst.op, inst.dest) {
                let src = *src;
                if !ranges[&dest].intersecting.contains(&src) {
                    ranges.get_mut(&dest).unwrap().combinable.insert(src);
                    ranges.get_mut(&src).unwrap().combinable.insert(dest);
                }
            }
        }
    }

    ranges
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
    fn simultaneously_live_registers_interfere() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let mut f = AsmFunction::new("test", VariableTable::new());
        let b0 = f.make_block();
        let a = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        let b = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        let c = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        f.append(b0, Some(a), AsmOp::LoadConstant { ty: i32_, value: Value::int(true, Width::W32, 1) });
        f.append(b0, Some(b), AsmOp::LoadConstant { ty: i32_, value: Value::int(true, Width::W32, 2) });
        f.append(b0, Some(c), AsmOp::Add { ty: i32_, lhs: a, rhs: b });
        f.append(b0, None, AsmOp::Jump { target: b0 });
        f.seal();

        let isa = X86_64::new();
        let ranges = compute(&mut f, &isa);
        assert!(ranges[&a].intersecting.contains(&b));
        assert!(ranges[&b].intersecting.contains(&a));
        assert!(!ranges[&c].intersecting.contains(&a));
    }

    #[test]
    fn move_only_from_constant_marks_combinable_not_constant_conflict() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let mut f = AsmFunction::new("test", VariableTable::new());
        let b0 = f.make_block();
        let a = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        let b = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        f.append(b0, Some(a), AsmOp::LoadConstant { ty: i32_, value: Value::int(true, Width::W32, 7) });
        f.append(b0, Some(b), AsmOp::Move { ty: i32_, src: a });
        f.append(b0, None, AsmOp::Jump { target: b0 });
        f.seal();

        let isa = X86_64::new();
        let ranges = compute(&mut f, &isa);
        assert!(ranges[&a].combinable.contains(&b));
        assert!(ranges[&b].combinable.contains(&a));
        assert_eq!(ranges[&a].constant_value, Some(Value::int(true, Width::W32, 7)));
    }
}
