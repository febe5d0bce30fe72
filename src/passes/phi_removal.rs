//! Trivial-φ removal (spec.md §4.5, C7): a φ whose non-self-referential
//! inputs are all identical is replaced by that single node. Iterated to a
//! fixed point — this is a closure operator (spec.md §8).

use crate::ir::ssa::entities::Node;
use crate::ir::ssa::function::SsaFunction;
use crate::ir::ssa::node::NodeKind;

/// Remove every trivial φ, iterating until none remain. Returns `true` if
/// anything changed.
pub fn run(func: &mut SsaFunction) -> bool {
    let mut changed = false;
    loop {
        let mut did_one = false;
        for &b in &func.blocks().to_vec() {
            for &phi in &func.block(b).phis().to_vec() {
                if let Some(unique) = trivial_replacement(func, phi) {
                    func.replace_all_uses(phi, unique);
                    func.remove_node(b, phi);
                    did_one = true;
                    changed = true;
                }
            }
        }
        if !did_one {
            break;
        }
    }
    changed
}

fn trivial_replacement(func: &SsaFunction, phi: Node) -> Option<Node> {
    let NodeKind::Phi { inputs, .. } = func.arena().kind(phi) else {
        return None;
    };
    let mut unique: Option<Node> = None;
    for &(_, v) in inputs {
        if v == phi {
            continue;
        }
        match unique {
            None => unique = Some(v),
            Some(u) if u == v => {}
            Some(_) => return None,
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeTable, Width};
    use crate::value::Value;

    #[test]
    fn identical_inputs_collapse() {
        let mut f = SsaFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let b0 = f.make_block();
        let b1 = f.make_block();
        let b2 = f.make_block();
        let c = f.append(
            b0,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 7),
            },
            Some(i32_),
        );
        let phi = f.append_phi(
            b2,
            NodeKind::Phi {
                ty: i32_,
                spill: None,
                inputs: vec![(b0, c), (b1, c)],
            },
            i32_,
        );
        let changed = run(&mut f);
        assert!(changed);
        assert!(!f.block(b2).phis().contains(&phi));
    }
}
