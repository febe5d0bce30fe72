//! SSA block-level liveness (spec.md §4.2, C4): per block, a backward walk
//! builds `usedAtStart`/`assignedRegisters`, then `liveInAtStart`/
//! `liveOutAtEnd` are iterated to a fixed point over the CFG.
//!
//! A φ's inputs are not "used" at the start of the φ's own block — each
//! `(pred, value)` pair is a use of `value` at the end of `pred`, the block
//! that actually carries the value across the edge. So φ inputs are folded
//! into their owning predecessor's `liveOutAtEnd` instead of this block's
//! `usedAtStart`; the φ's result itself is still a def, always counted in
//! `assignedRegisters` since it's live from block entry.

use std::collections::{HashMap, HashSet};

use crate::ir::ssa::entities::{Block, Node};
use crate::ir::ssa::function::SsaFunction;
use crate::ir::ssa::node::NodeKind;

/// The four per-block sets spec.md §4.2 names.
#[derive(Default, Clone)]
pub struct BlockLiveness {
    pub used_at_start: HashSet<Node>,
    pub assigned_registers: HashSet<Node>,
    pub live_in_at_start: HashSet<Node>,
    pub live_out_at_end: HashSet<Node>,
}

/// Values a successor's φs pull across the edge from `b`.
fn phi_uses_from(func: &SsaFunction, b: Block, succ: Block) -> Vec<Node> {
    let mut out = Vec::new();
    for &phi in func.block(succ).phis() {
        if let NodeKind::Phi { inputs, .. } = func.arena().kind(phi) {
            for &(pred, value) in inputs {
                if pred == b {
                    out.push(value);
                }
            }
        }
    }
    out
}

/// Compute every reachable block's liveness sets. Requires `func.seal()` to
/// have been called first so `predecessors`/`successors` are current.
pub fn compute(func: &SsaFunction) -> HashMap<Block, BlockLiveness> {
    let mut sets: HashMap<Block, BlockLiveness> = HashMap::new();

    for &b in func.blocks() {
        let mut used_at_start = HashSet::new();
        let mut assigned = HashSet::new();
        let block = func.block(b);
        for &n in block.nodes[block.phi_count..].iter().rev() {
            for input in func.arena().kind(n).inputs() {
                if !assigned.contains(&input) {
                    used_at_start.insert(input);
                }
            }
            assigned.insert(n);
        }
        for &phi in block.phis() {
            assigned.insert(phi);
        }
        let live_in_at_start = used_at_start.clone();
        sets.insert(
            b,
            BlockLiveness {
                used_at_start,
                assigned_registers: assigned,
                live_in_at_start,
                live_out_at_end: HashSet::new(),
            },
        );
    }

    loop {
        let mut changed = false;
        for &b in func.blocks() {
            let mut live_out: HashSet<Node> = HashSet::new();
            for &s in &func.block(b).successors {
                live_out.extend(sets[&s].live_in_at_start.iter().copied());
                live_out.extend(phi_uses_from(func, b, s));
            }
            let used_at_start = sets[&b].used_at_start.clone();
            let assigned = sets[&b].assigned_registers.clone();
            let mut live_in = used_at_start;
            for &r in &live_out {
                if !assigned.contains(&r) {
                    live_in.insert(r);
                }
            }

            let entry = sets.get_mut(&b).unwrap();
            if entry.live_out_at_end != live_out {
                entry.live_out_at_end = live_out;
                changed = true;
            }
            if entry.live_in_at_start != live_in {
                entry.live_in_at_start = live_in;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeTable, Width};
    use crate::value::Value;

    #[test]
    fn value_defined_before_a_loop_is_live_across_the_back_edge() {
        // b0: x = 1; jmp b1
        // b1: y = x + 1; jmp b1 (x stays live into and across the loop)
        let mut f = SsaFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let b0 = f.make_block();
        let b1 = f.make_block();
        let x = f.append(
            b0,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 1),
            },
            Some(i32_),
        );
        f.append(b0, NodeKind::Jump { target: b1 }, None);
        let _y = f.append(b1, NodeKind::Add { ty: i32_, lhs: x, rhs: x }, Some(i32_));
        f.append(b1, NodeKind::Jump { target: b1 }, None);
        f.seal();

        let live = compute(&f);
        assert!(live[&b1].live_in_at_start.contains(&x));
        assert!(live[&b1].live_out_at_end.contains(&x));
        assert!(!live[&b0].live_in_at_start.contains(&x), "x is defined, not used, in b0");
    }

    #[test]
    fn phi_input_is_live_out_of_its_predecessor_not_live_in_of_the_join() {
        // b0: jmp b2 (carries `a`)        b1: jmp b2 (carries `b`)
        // b2: v = phi(b0: a, b1: b); store
        let mut f = SsaFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let ptr_i32 = types.pointer(i32_);
        let b0 = f.make_block();
        let b1 = f.make_block();
        let b2 = f.make_block();

        let a = f.append(
            b0,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 10),
            },
            Some(i32_),
        );
        f.append(b0, NodeKind::Jump { target: b2 }, None);

        let b = f.append(
            b1,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 20),
            },
            Some(i32_),
        );
        f.append(b1, NodeKind::Jump { target: b2 }, None);

        let v = f.append_phi(
            b2,
            NodeKind::Phi {
                ty: i32_,
                spill: None,
                inputs: vec![(b0, a), (b1, b)],
            },
            i32_,
        );
        let addr = f.append(
            b2,
            NodeKind::Constant {
                ty: ptr_i32,
                value: Value::NullPtr,
            },
            Some(ptr_i32),
        );
        f.append(b2, NodeKind::Store { addr, value: v }, None);
        f.seal();

        let live = compute(&f);
        assert!(live[&b0].live_out_at_end.contains(&a));
        assert!(live[&b1].live_out_at_end.contains(&b));
        // `v` the phi result, not `a`/`b`, is what's live-in at the join.
        assert!(live[&b2].live_in_at_start.is_empty());
    }
}
