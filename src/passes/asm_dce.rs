//! Asm dead-code elimination (spec.md §4.10, C12), run after lowering and
//! again after the allocator's coalescing cleanup.
//!
//! Backward fixed-point per block: seed `used` from successors' live-in
//! sets, walk instructions in reverse, and drop anything that isn't live.

use std::collections::{BTreeSet, HashMap};

use crate::ir::asm::entities::{AsmReg, Block};
use crate::ir::asm::function::AsmFunction;

/// Run Asm DCE to a fixed point. Returns `true` if any instruction was
/// removed.
pub fn run(func: &mut AsmFunction) -> bool {
    let mut live_in: HashMap<Block, BTreeSet<AsmReg>> = HashMap::new();
    for &b in func.blocks() {
        live_in.insert(b, BTreeSet::new());
    }

    loop {
        let mut changed = false;
        for &b in &func.blocks().to_vec() {
            let mut used: BTreeSet<AsmReg> = func
                .block(b)
                .successors
                .iter()
                .flat_map(|s| live_in[s].iter().copied())
                .collect();
            for inst in func.block(b).insts.iter().rev() {
                if let Some(dest) = inst.dest {
                    used.remove(&dest);
                }
                used.extend(inst.op.inputs());
            }
            if used != live_in[&b] {
                live_in.insert(b, used);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut removed_any = false;
    for &b in &func.blocks().to_vec() {
        let mut used = func.block(b).successors.iter().flat_map(|s| live_in[s].iter().copied()).collect::<BTreeSet<_>>();
        let mut keep = vec![true; func.block(b).insts.len()];
        for (idx, inst) in func.block(b).insts.iter().enumerate().rev() {
            let is_live = inst.op.has_side_effects()
                || inst.op.is_terminator()
                || inst.dest.map(|d| used.contains(&d)).unwrap_or(false);
            if is_live {
                if let Some(dest) = inst.dest {
                    used.remove(&dest);
                }
                used.extend(inst.op.inputs());
            } else {
                keep[idx] = false;
            }
        }
        let mut iter = keep.into_iter();
        let before = func.block(b).insts.len();
        func.block_mut(b).insts.retain(|_| iter.next().unwrap());
        if func.block(b).insts.len() != before {
            removed_any = true;
        }
    }
    removed_any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::asm::node::AsmOp;
    use crate::types::{TypeTable, Width};
    use crate::value::Value;
    use crate::variable::VariableTable;

    #[test]
    fn dead_load_constant_is_removed() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let mut f = AsmFunction::new("test", VariableTable::new());
        let b0 = f.make_block();
        let dead = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        f.append(
            b0,
            Some(dead),
            AsmOp::LoadConstant {
                ty: i32_,
                value: Value::int(true, Width::W32, 1),
            },
        );
        f.append(b0, None, AsmOp::Jump { target: b0 });
        f.seal();

        let changed = run(&mut f);
        assert!(changed);
        assert_eq!(f.block(b0).insts.len(), 1);
        assert!(matches!(f.block(b0).insts[0].op, AsmOp::Jump { .. }));
    }

    #[test]
    fn store_is_kept_despite_no_destination() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let ptr_ = types.pointer(i32_);
        let mut f = AsmFunction::new("test", VariableTable::new());
        let b0 = f.make_block();
        let addr = f.make_virtual(crate::isa::registers::kind::INT32, ptr_, None);
        let value = f.make_virtual(crate::isa::registers::kind::INT32, i32_, None);
        f.append(b0, None, AsmOp::Store { addr, value });
        f.append(b0, None, AsmOp::Jump { target: b0 });
        f.seal();

        let changed = run(&mut f);
        assert!(!changed);
        assert_eq!(f.block(b0).insts.len(), 2);
    }
}
