//! Control-flow simplification (spec.md §4.5, C7): repeatedly merge a block
//! with its sole successor, or splice out an empty pass-through block.
//! Safe to run both before and after φ-elimination (after, φs are just
//! copies, so merging never needs to touch one).

use crate::ir::ssa::entities::Block;
use crate::ir::ssa::function::SsaFunction;
use crate::ir::ssa::node::NodeKind;

/// Run to a fixed point. Returns `true` if anything changed.
pub fn run(func: &mut SsaFunction) -> bool {
    let mut changed = false;
    loop {
        func.seal();
        if !step(func) {
            break;
        }
        changed = true;
    }
    changed
}

fn step(func: &mut SsaFunction) -> bool {
    for &a in &func.blocks().to_vec() {
        if func.block(a).nodes.is_empty() {
            continue;
        }
        let successors = func.block(a).successors.clone();
        if successors.len() != 1 {
            continue;
        }
        let b = successors[0];
        if b == a {
            continue;
        }

        if func.block(b).predecessors.len() == 1 {
            merge_into(func, a, b);
            return true;
        }

        if func.block(a).nodes.len() == 1
            && func
                .block(a)
                .terminator(func.arena())
                .map(|t| matches!(func.arena().kind(t), NodeKind::Jump { .. }))
                .unwrap_or(false)
        {
            redirect_predecessors(func, a, b);
            return true;
        }
    }
    false
}

/// Append `b`'s non-φ instructions to `a`, replacing `a`'s terminator with
/// `b`'s. `b` has no other predecessor so its φs (if any, pre-lowering)
/// trivially have a single input and have already been removed by
/// `phi_removal`; this pass assumes none remain.
fn merge_into(func: &mut SsaFunction, a: Block, b: Block) {
    let term = func.block(a).terminator(func.arena());
    if let Some(term) = term {
        func.remove_node(a, term);
    }
    let b_nodes = func.block(b).nodes.clone();
    debug_assert!(
        func.block(b).phis().is_empty(),
        "merge target must have no φs (single predecessor)"
    );
    for n in b_nodes {
        func.block_mut(a).nodes.push(n);
    }
    func.block_mut(b).nodes.clear();
    func.seal();
}

/// `a` is an empty pass-through to `b`; repoint every predecessor's
/// terminator directly at `b`, making `a` unreachable.
fn redirect_predecessors(func: &mut SsaFunction, a: Block, b: Block) {
    let preds = func.block(a).predecessors.clone();
    for p in preds {
        if let Some(term) = func.block(p).terminator(func.arena()) {
            retarget(func, term, a, b);
        }
    }
    let nodes = func.block(a).nodes.clone();
    for n in nodes {
        func.remove_node(a, n);
    }
    func.seal();
}

fn retarget(func: &mut SsaFunction, term: crate::ir::ssa::entities::Node, from: Block, to: Block) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_collapses() {
        let mut f = SsaFunction::new("test");
        let b0 = f.make_block();
        let b1 = f.make_block();
        let b2 = f.make_block();
        f.append(b0, NodeKind::Jump { target: b1 }, None);
        f.append(b1, NodeKind::Jump { target: b2 }, None);
        f.append(b2, NodeKind::Jump { target: b2 }, None);
        f.seal();

        let changed = run(&mut f);
        assert!(changed);
        // b0 should now jump straight to b2 (b1 merged away).
        let term = f.block(b0).terminator(f.arena()).unwrap();
        match f.arena().kind(term) {
            NodeKind::Jump { target } => assert_eq!(*target, b2),
            _ => panic!("expected a Jump"),
        }
    }
}
