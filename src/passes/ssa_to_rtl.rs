//! SSA → RTL lowering (spec.md §4.6, C8): critical-edge splitting, φ
//! resolution via predecessor copies, a second CF-simplification pass, and
//! union-find merging of φ-connected SSA nodes into shared virtual RTL
//! registers.

use std::collections::HashMap;

use crate::ir::rtl::entities::{Block as RBlock, Reg};
use crate::ir::rtl::function::RtlFunction;
use crate::ir::rtl::node::RtlOp;
use crate::ir::ssa::entities::{Block, Node};
use crate::ir::ssa::function::SsaFunction;
use crate::ir::ssa::node::NodeKind;
use crate::passes::cf_simplify;

/// A minimal union-find over `Node`, used to merge every SSA value
/// connected by a φ input/output relation (spec.md §4.6 step 4).
struct UnionFind {
    parent: HashMap<Node, Node>,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: HashMap::new(),
        }
    }

    fn find(&mut self, x: Node) -> Node {
        let p = *self.parent.entry(x).or_insert(x);
        if p == x {
            x
        } else {
            let root = self.find(p);
            self.parent.insert(x, root);
            root
        }
    }

    fn union(&mut self, a: Node, b: Node) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

/// Split every edge `s -> t` where `t` has φs and either `s` has >1
/// successor or `t` has >1 predecessor (spec.md §4.6 step 1).
fn split_critical_edges(func: &mut SsaFunction) {
    loop {
        func.seal();
        let mut did_split = false;
        'outer: for &t in &func.blocks().to_vec() {
            if func.block(t).phis().is_empty() {
                continue;
            }
            let preds = func.block(t).predecessors.clone();
            for s in preds {
                let s_out = func.block(s).successors.len();
                let t_in = func.block(t).predecessors.len();
                if s_out > 1 || t_in > 1 {
                    insert_split_block(func, s, t);
                    did_split = true;
                    break 'outer;
                }
            }
        }
        if !did_split {
            break;
        }
    }
}

fn insert_split_block(func: &mut SsaFunction, s: Block, t: Block) {
    let new_block = func.make_block();
    func.append(new_block, NodeKind::Jump { target: t }, None);

    if let Some(term) = func.block(s).terminator(func.arena()) {
        retarget(func, term, t, new_block);
    }

    for &phi in &func.block(t).phis().to_vec() {
        if let NodeKind::Phi { inputs, .. } = func.arena_mut().kind_mut(phi) {
            for (pred, _) in inputs.iter_mut() {
                if *pred == s {
                    *pred = new_block;
                }
            }
        }
    }
    func.seal();
}

fn retarget(func: &mut SsaFunction, term: Node, from: Block, to: Block) {
    match func.arena_mut().kind_mut(term) {
        NodeKind::Jump { target } => {
            if *target == from {
                *target = to;
            }
        }
        NodeKind::ConditionalJump {
            if_true, if_false, ..
        } => {
            if *if_true == from {
                *if_true = to;
            }
            if *if_false == from {
                *if_false = to;
            }
        }
        _ => {}
    }
}

/// φ resolution: for every φ in `t` with inputs `{(p_i, v_i)}`, insert a
/// `Move` copy at the end of each `p_i` (just before its terminator); the
/// φ's own input record now names that copy (spec.md §4.6 step 2).
fn resolve_phis(func: &mut SsaFunction) {
    for &t in &func.blocks().to_vec() {
        for &phi in &func.block(t).phis().to_vec() {
            let (ty, spill, inputs) = match func.arena().kind(phi).clone() {
                NodeKind::Phi { ty, spill, inputs } => (ty, spill, inputs),
                _ => unreachable!(),
            };
            let mut new_inputs = Vec::with_capacity(inputs.len());
            let _ = spill; // carried on the RTL register later, at union time (build_register_classes).
            for (pred, v) in inputs {
                let copy = func.append(pred, NodeKind::Move { ty, input: v }, Some(ty));
                new_inputs.push((pred, copy));
            }
            if let NodeKind::Phi { inputs, .. } = func.arena_mut().kind_mut(phi) {
                *inputs = new_inputs;
            }
        }
    }
}

/// Build register classes: every φ is unioned with each of its (already
/// copy-resolved) inputs and with its own result.
fn build_register_classes(func: &SsaFunction) -> UnionFind {
    let mut uf = UnionFind::new();
    for &b in func.blocks() {
        for &phi in func.block(b).phis() {
            if let NodeKind::Phi { inputs, .. } = func.arena().kind(phi) {
                for &(_, v) in inputs {
                    uf.union(phi, v);
                }
            }
        }
    }
    uf
}

/// Lower a fully-prepared SSA function (critical edges split, φs removed,
/// SCCP'd, trivial φs gone) to RTL.
pub fn run(func: &mut SsaFunction, types: &crate::types::TypeTable) -> RtlFunction {
    split_critical_edges(func);
    resolve_phis(func);
    cf_simplify::run(func);

    let mut uf = build_register_classes(func);
    let mut rtl = RtlFunction::new(func.name.clone());
    rtl.set_variables(func.variables().clone());

    let mut block_map: HashMap<Block, RBlock> = HashMap::new();
    for &b in func.blocks() {
        block_map.insert(b, rtl.make_block());
    }

    let mut reg_of_class: HashMap<Node, Reg> = HashMap::new();
    let mut reg_of_node: HashMap<Node, Reg> = HashMap::new();

    let spill_of_class = |uf: &mut UnionFind, func: &SsaFunction, n: Node| -> Option<crate::variable::Variable> {
        let root = uf.find(n);
        if let NodeKind::Phi { spill, .. } = func.arena().kind(root) {
            *spill
        } else {
            for &b in func.blocks() {
                for &other in func.block(b).phis() {
                    if let NodeKind::Phi { spill, inputs, .. } = func.arena().kind(other) {
                        if inputs.iter().any(|&(_, v)| v == n) {
                            return *spill;
                        }
                    }
                }
            }
            None
        }
    };

    let mut reg_for = |func: &SsaFunction, uf: &mut UnionFind, n: Node, rtl: &mut RtlFunction| -> Reg {
        let root = uf.find(n);
        if let Some(&r) = reg_of_class.get(&root) {
            reg_of_node.insert(n, r);
            return r;
        }
        let ty = func
            .arena()
            .result_type(root)
            .or_else(|| func.arena().result_type(n))
            .expect("value-producing node must have a type");
        let spill = spill_of_class(uf, func, root);
        let r = rtl.make_reg(ty, spill);
        reg_of_class.insert(root, r);
        reg_of_node.insert(n, r);
        r
    };

    for &b in func.blocks() {
        for &n in func.block(b).phis() {
            reg_for(func, &mut uf, n, &mut rtl);
        }
    }

    for &b in func.blocks() {
        let rb = block_map[&b];
        for &n in &func.block(b).nodes.clone() {
            if matches!(func.arena().kind(n), NodeKind::Phi { .. }) {
                continue;
            }
            lower_node(func, &mut uf, n, &mut reg_for, &block_map, rb, &mut rtl, types);
        }
    }

    rtl.seal();
    rtl
}

#[allow(clippy::too_many_arguments)]
fn lower_node(
    func: &SsaFunction,
    uf: &mut UnionFind,
    n: Node,
    reg_for: &mut impl FnMut(&SsaFunction, &mut UnionFind, Node, &mut RtlFunction) -> Reg,
    block_map: &HashMap<Block, RBlock>,
    rb: RBlock,
    rtl: &mut RtlFunction,
    types: &crate::types::TypeTable,
) {
    let kind = func.arena().kind(n).clone();
    let dest_ty = func.arena().result_type(n);
    let dest = dest_ty.map(|_| reg_for(func, uf, n, rtl));

    let op = match kind {
        NodeKind::Constant { ty, value } => Some(RtlOp::LoadConstant { ty, value }),
        NodeKind::Move { ty, input } => Some(RtlOp::Move {
            ty,
            src: reg_for(func, uf, input, rtl),
        }),
        NodeKind::Load { ty, addr } => Some(RtlOp::Load {
            ty,
            addr: reg_for(func, uf, addr, rtl),
        }),
        NodeKind::Store { addr, value } => Some(RtlOp::Store {
            addr: reg_for(func, uf, addr, rtl),
            value: reg_for(func, uf, value, rtl),
        }),
        NodeKind::Compare {
            op,
            lhs,
            rhs,
            operand_ty,
        } => Some(RtlOp::Compare {
            op,
            lhs: reg_for(func, uf, lhs, rtl),
            rhs: reg_for(func, uf, rhs, rtl),
            operand_ty,
        }),
        NodeKind::Alloca { .. } => {
            // Mem2Reg should have eliminated every promotable alloca; any
            // survivor escapes and is treated as a bare frame address, not
            // yet supported by this lowering (out of scope, spec.md §1).
            None
        }
        NodeKind::TypeCast { ty, input } => Some(RtlOp::TypeCast {
            ty,
            input: reg_for(func, uf, input, rtl),
        }),
        NodeKind::Add { ty, lhs, rhs } => Some(RtlOp::Add {
            ty,
            lhs: reg_for(func, uf, lhs, rtl),
            rhs: reg_for(func, uf, rhs, rtl),
        }),
        NodeKind::Jump { target } => Some(RtlOp::Jump {
            target: block_map[&target],
        }),
        NodeKind::ConditionalJump {
            cond,
            if_true,
            if_false,
        } => Some(RtlOp::ConditionalJump {
            cond: reg_for(func, uf, cond, rtl),
            if_true: block_map[&if_true],
            if_false: block_map[&if_false],
        }),
        NodeKind::Phi { .. } => None,
    };

    let _ = types;
    if let Some(op) = op {
        rtl.append(rb, dest, op);
    }
}
