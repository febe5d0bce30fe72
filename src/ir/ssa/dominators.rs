//! Dominator tree and dominance-frontier construction (spec.md §4.1),
//! using the iterative Cooper/Harvey/Kennedy fixed-point algorithm: simpler
//! to get right than Lengauer-Tarjan and plenty fast for the function sizes
//! this crate compiles.

use std::collections::HashMap;

use crate::ir::ssa::cfg::reverse_postorder;
use crate::ir::ssa::entities::Block;
use crate::ir::ssa::function::SsaFunction;

/// Recompute every reachable block's immediate dominator and dominance
/// frontier in place. Requires `func.seal()` to have been called first so
/// `predecessors`/`successors` are current.
pub fn compute(func: &mut SsaFunction) {
    let rpo = reverse_postorder(func);
    let Some(&entry) = rpo.first() else {
        return;
    };
    let rpo_index: HashMap<Block, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: HashMap<Block, Block> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let preds = &func.block(b).predecessors;
            let mut new_idom: Option<Block> = None;
            for &p in preds {
                if !idom.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(&idom, &rpo_index, cur, p),
                });
            }
            if let Some(new_idom) = new_idom {
                if idom.get(&b) != Some(&new_idom) {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }
    }

    for &b in &rpo {
        let d = idom.get(&b).copied();
        func.block_mut(b).idom = if b == entry { None } else { d };
    }

    let mut frontier: HashMap<Block, Vec<Block>> = HashMap::new();
    for &b in &rpo {
        let preds = func.block(b).predecessors.clone();
        if preds.len() < 2 {
            continue;
        }
        for p in preds {
            let mut runner = p;
            while Some(runner) != idom.get(&b).copied() {
                let entry = frontier.entry(runner).or_default();
                if !entry.contains(&b) {
                    entry.push(b);
                }
                match idom.get(&runner) {
                    Some(&next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }
    for &b in &rpo {
        func.dominance_frontier[b] = frontier.remove(&b).unwrap_or_default();
    }
}

fn intersect(
    idom: &HashMap<Block, Block>,
    rpo_index: &HashMap<Block, usize>,
    mut a: Block,
    mut b: Block,
) -> Block {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

/// True if `a` dominates `b` (every path from the entry to `b` passes
/// through `a`), inclusive of `a == b`.
pub fn dominates(func: &SsaFunction, a: Block, b: Block) -> bool {
    if a == b {
        return true;
    }
    let mut cur = b;
    while let Some(idom) = func.block(cur).idom {
        if idom == a {
            return true;
        }
        if idom == cur {
            break;
        }
        cur = idom;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ssa::node::NodeKind;

    #[test]
    fn diamond_cfg_has_entry_as_join_idom() {
        // b0 -> b1, b0 -> b2, b1 -> b3, b2 -> b3.
        let mut f = SsaFunction::new("test");
        let b0 = f.make_block();
        let b1 = f.make_block();
        let b2 = f.make_block();
        let b3 = f.make_block();
        let mut types = crate::types::TypeTable::new();
        let bool_ty = types.bool_();
        let dummy_cond = f.append(
            b0,
            NodeKind::Constant {
                ty: bool_ty,
                value: crate::value::Value::Bool(true),
            },
            Some(bool_ty),
        );
        f.append(
            b0,
            NodeKind::ConditionalJump {
                cond: dummy_cond,
                if_true: b1,
                if_false: b2,
            },
            None,
        );
        f.append(b1, NodeKind::Jump { target: b3 }, None);
        f.append(b2, NodeKind::Jump { target: b3 }, None);
        f.append(b3, NodeKind::Jump { target: b3 }, None);
        f.seal();
        compute(&mut f);

        assert_eq!(f.block(b1).idom, Some(b0));
        assert_eq!(f.block(b2).idom, Some(b0));
        assert_eq!(f.block(b3).idom, Some(b0));
        assert!(dominates(&f, b0, b3));
        assert!(!dominates(&f, b1, b3));
        assert!(f.dominance_frontier[b1].contains(&b3));
        assert!(f.dominance_frontier[b2].contains(&b3));
    }
}
