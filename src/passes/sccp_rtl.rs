//! RTL-level sparse conditional constant propagation + DCE (spec.md §4.4
//! second paragraph, C6 applied post-lowering).
//!
//! Unlike the SSA pass, there's no per-node lattice cell: state is a
//! per-block map `register -> value`, propagated from predecessors by
//! [`Value::join`] and walked forward one block at a time (RTL has no
//! dominator tree to exploit, spec.md §4.1).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ir::rtl::entities::{Block, Reg};
use crate::ir::rtl::function::RtlFunction;
use crate::ir::rtl::node::RtlOp;
use crate::types::TypeTable;
use crate::value::Value;

/// Run RTL SCCP followed by its DCE sweep. Returns `true` if anything
/// changed.
pub fn run(func: &mut RtlFunction, types: &TypeTable, target_width: u32) -> bool {
    let mut changed = false;

    let (out_maps, reachable) = analyze(func, types, target_width);

    for &b in &func.blocks().to_vec() {
        if !reachable.contains(&b) {
            continue;
        }
        let mut current = predecessor_join(func, b, &out_maps);
        let insts = func.block(b).insts.clone();
        for (idx, inst) in insts.iter().enumerate() {
            let value = evaluate(&inst.op, &current, types, target_width);
            if let Some(dest) = inst.dest {
                if let Some(v) = &value {
                    current.insert(dest, v.clone());
                }
                if let Some(v) = value.filter(|v| *v != Value::Varying) {
                    if !matches!(inst.op, RtlOp::LoadConstant { .. }) {
                        let ty = func.reg_type(dest);
                        func.block_mut(b).insts[idx] = crate::ir::rtl::function::RtlInst {
                            dest: Some(dest),
                            op: RtlOp::LoadConstant { ty, value: v },
                        };
                        changed = true;
                    }
                }
            }
            if let RtlOp::ConditionalJump {
                cond,
                if_true,
                if_false,
            } = &inst.op
            {
                let (cond, if_true, if_false) = (*cond, *if_true, *if_false);
                let targets = reachable_targets(current.get(&cond).cloned(), if_true, if_false);
                if targets.len() == 1 {
                    func.block_mut(b).insts[idx] = crate::ir::rtl::function::RtlInst {
                        dest: None,
                        op: RtlOp::Jump { target: targets[0] },
                    };
                    changed = true;
                }
            }
        }
    }

    func.seal();
    let live_blocks: HashSet<Block> = crate::ir::rtl::cfg::reachable_from_entry(func);
    for &b in &func.blocks().to_vec() {
        if !live_blocks.contains(&b) {
            func.block_mut(b).insts.clear();
            changed = true;
        }
    }
    func.seal();

    if sweep_dead(func) {
        changed = true;
    }

    changed
}

fn predecessor_join(
    func: &RtlFunction,
    b: Block,
    out_maps: &HashMap<Block, HashMap<Reg, Value>>,
) -> HashMap<Reg, Value> {
    let mut merged: HashMap<Reg, Option<Value>> = HashMap::new();
    for &p in &func.block(b).predecessors {
        if let Some(out) = out_maps.get(&p) {
            for (r, v) in out {
                let entry = merged.entry(*r).or_insert(None);
                *entry = Value::join(entry.clone(), Some(v.clone()));
            }
        }
    }
    merged
        .into_iter()
        .filter_map(|(r, v)| v.map(|v| (r, v)))
        .collect()
}

fn analyze(
    func: &RtlFunction,
    types: &TypeTable,
    target_width: u32,
) -> (HashMap<Block, HashMap<Reg, Value>>, HashSet<Block>) {
    let mut out_maps: HashMap<Block, HashMap<Reg, Value>> = HashMap::new();
    let mut reachable: HashSet<Block> = HashSet::new();
    let Some(entry) = func.entry else {
        return (out_maps, reachable);
    };
    reachable.insert(entry);

    let order = crate::ir::rtl::cfg::reverse_postorder(func);
    let mut worklist: VecDeque<Block> = order.into_iter().collect();

    while let Some(b) = worklist.pop_front() {
        if !reachable.contains(&b) {
            continue;
        }
        let mut current = predecessor_join(func, b, &out_maps);
        let mut last_cond: Option<(Reg, Block, Block)> = None;
        for inst in &func.block(b).insts {
            let value = evaluate(&inst.op, &current, types, target_width);
            if let Some(dest) = inst.dest {
                if let Some(v) = value {
                    current.insert(dest, v);
                }
            }
            if let RtlOp::ConditionalJump {
                cond,
                if_true,
                if_false,
            } = &inst.op
            {
                last_cond = Some((*cond, *if_true, *if_false));
            }
        }

        let successors: Vec<Block> = if let Some((cond, if_true, if_false)) = last_cond {
            reachable_targets(current.get(&cond).cloned(), if_true, if_false)
        } else {
            func.block(b).successors.clone()
        };

        let changed = out_maps
            .get(&b)
            .map(|old| *old != current)
            .unwrap_or(true);
        out_maps.insert(b, current);

        for t in successors {
            let newly_reached = reachable.insert(t);
            if newly_reached || changed {
                worklist.push_back(t);
            }
        }
    }

    (out_maps, reachable)
}

fn reachable_targets(cond: Option<Value>, if_true: Block, if_false: Block) -> Vec<Block> {
    match cond {
        None => Vec::new(),
        Some(Value::Varying) => vec![if_true, if_false],
        Some(Value::Bool(b)) => {
            if b {
                vec![if_true]
            } else {
                vec![if_false]
            }
        }
        Some(_) => vec![if_true, if_false],
    }
}

/// Mirrors `NodeKind::evaluate_for_constants` (spec.md §4.4), over a
/// register-keyed map instead of a node-keyed one.
fn evaluate(
    op: &RtlOp,
    current: &HashMap<Reg, Value>,
    types: &TypeTable,
    target_width: u32,
) -> Option<Value> {
    let lookup = |r: Reg| current.get(&r).cloned();
    match op {
        RtlOp::LoadConstant { value, .. } => Some(value.clone()),
        RtlOp::Move { ty, src } => lookup(*src).map(|v| v.type_cast(*ty, types, target_width).unwrap_or(v)),
        // Memory content is never tracked by this lattice, volatile or not
        // (mirrors the SSA-level pass: only mem2reg, which runs earlier,
        // turns a promotable local's loads into direct value references).
        RtlOp::Load { .. } => Some(Value::Varying),
        RtlOp::Store { .. } => None,
        RtlOp::Compare {
            op,
            lhs,
            rhs,
            operand_ty: _,
        } => {
            let l = lookup(*lhs)?;
            let r = lookup(*rhs)?;
            if l == Value::Varying || r == Value::Varying {
                return Some(Value::Varying);
            }
            match op.apply(l.compare(&r, target_width)) {
                Some(b) => Some(Value::Bool(b)),
                None => Some(Value::Varying),
            }
        }
        RtlOp::Add { lhs, rhs, .. } => {
            let l = lookup(*lhs)?;
            let r = lookup(*rhs)?;
            if l == Value::Varying || r == Value::Varying {
                return Some(Value::Varying);
            }
            Some(l.add(&r, target_width).unwrap_or(Value::Varying))
        }
        RtlOp::TypeCast { ty, input } => {
            let v = lookup(*input)?;
            if v == Value::Varying {
                return Some(Value::Varying);
            }
            Some(v.type_cast(*ty, types, target_width).unwrap_or(Value::Varying))
        }
        RtlOp::Jump { .. } | RtlOp::ConditionalJump { .. } => None,
    }
}

fn sweep_dead(func: &mut RtlFunction) -> bool {
    // Map each register to the inputs of its defining instruction, so
    // liveness can walk backward from a use to the registers that feed it.
    let mut def_inputs: HashMap<Reg, Vec<Reg>> = HashMap::new();
    for &b in func.blocks() {
        for inst in &func.block(b).insts {
            if let Some(dest) = inst.dest {
                def_inputs.insert(dest, inst.op.inputs().into_iter().collect());
            }
        }
    }

    let mut live: HashSet<Reg> = HashSet::new();
    let mut worklist: VecDeque<Reg> = VecDeque::new();
    for &b in func.blocks() {
        for inst in &func.block(b).insts {
            if inst.op.has_side_effects() || inst.op.is_terminator() {
                for input in inst.op.inputs() {
                    if live.insert(input) {
                        worklist.push_back(input);
                    }
                }
            }
        }
    }
    while let Some(r) = worklist.pop_front() {
        if let Some(inputs) = def_inputs.get(&r).cloned() {
            for input in inputs {
                if live.insert(input) {
                    worklist.push_back(input);
                }
            }
        }
    }

    let mut changed = false;
    for &b in &func.blocks().to_vec() {
        let before = func.block(b).insts.len();
        func.block_mut(b).insts.retain(|inst| {
            inst.op.has_side_effects()
                || inst.op.is_terminator()
                || inst.dest.map(|d| live.contains(&d)).unwrap_or(false)
        });
        if func.block(b).insts.len() != before {
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Width;

    #[test]
    fn constant_add_folds_to_load_constant() {
        let mut f = RtlFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let b0 = f.make_block();
        let ptr_ = types.pointer(i32_);
        let r1 = f.make_reg(i32_, None);
        let r2 = f.make_reg(i32_, None);
        let r3 = f.make_reg(i32_, None);
        let addr = f.make_reg(ptr_, None);
        f.append(
            b0,
            Some(r1),
            RtlOp::LoadConstant {
                ty: i32_,
                value: Value::int(true, Width::W32, 2),
            },
        );
        f.append(
            b0,
            Some(r2),
            RtlOp::LoadConstant {
                ty: i32_,
                value: Value::int(true, Width::W32, 3),
            },
        );
        f.append(
            b0,
            Some(r3),
            RtlOp::Add {
                ty: i32_,
                lhs: r1,
                rhs: r2,
            },
        );
        // Store keeps r3 (and its fold) alive through the DCE sweep below.
        f.append(b0, None, RtlOp::Store { addr, value: r3 });
        f.append(b0, None, RtlOp::Jump { target: b0 });
        f.seal();

        let changed = run(&mut f, &types, 32);
        assert!(changed);
        // r1/r2 are dead after folding and get swept away, so look the
        // surviving instruction up by its destination register.
        let inst = f
            .block(b0)
            .insts
            .iter()
            .find(|i| i.dest == Some(r3))
            .expect("r3's instruction should survive DCE");
        match &inst.op {
            RtlOp::LoadConstant { value, .. } => {
                assert_eq!(*value, Value::int(true, Width::W32, 5))
            }
            other => panic!("expected LoadConstant, got {:?}", other),
        }
    }

    #[test]
    fn determinate_conditional_jump_becomes_jump() {
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

        run(&mut f, &types, 32);
        // `cond`'s own LoadConstant is dead once the branch resolves, so
        // find the terminator rather than indexing by position.
        let term = f.block(b0).insts.last().expect("block keeps its terminator");
        match &term.op {
            RtlOp::Jump { target } => assert_eq!(*target, b1),
            other => panic!("expected Jump, got {:?}", other),
        }
    }
}
