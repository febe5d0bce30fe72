//! Address-of analysis (spec.md §4.8), run as a micro-pass inside RTL → Asm
//! lowering: for each RTL register, track the unique `Value::VarPtr` constant
//! (offset 0) ever assigned to it. A register that is always assigned the
//! same local's address lowers `Load`/`Store` through it to `LoadLocal`/
//! `StoreLocal` instead of a generic memory access.

use std::collections::HashMap;

use crate::ir::rtl::entities::Reg;
use crate::ir::rtl::function::RtlFunction;
use crate::ir::rtl::node::RtlOp;
use crate::value::Value;
use crate::variable::Variable;

/// Per-register knowledge: not yet seen any def, seen defs that all agree on
/// one variable, or seen conflicting/non-constant defs.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Known {
    Single(Variable),
    Varies,
}

/// Returns, for every register proven to always hold the address of the same
/// local (at offset zero), that local.
pub fn analyze(func: &RtlFunction) -> HashMap<Reg, Variable> {
    let mut known: HashMap<Reg, Known> = HashMap::new();
    let mut changed = true;
    while changed {
        changed = false;
        for &b in func.blocks() {
            for inst in &func.block(b).insts {
                let Some(dest) = inst.dest else { continue };
                let contributed = match &inst.op {
                    RtlOp::LoadConstant {
                        value: Value::VarPtr { variable, offset: 0 },
                        ..
                    } => Some(Known::Single(*variable)),
                    RtlOp::LoadConstant { .. } => Some(Known::Varies),
                    RtlOp::Move { src, .. } => known.get(src).copied(),
                    _ => Some(Known::Varies),
                };
                let Some(contributed) = contributed else {
                    // A `Move` whose source isn't resolved yet; revisit on
                    // the next pass once it is.
                    continue;
                };
                let merged = match known.get(&dest) {
                    None => contributed,
                    Some(Known::Varies) => Known::Varies,
                    Some(&Known::Single(existing)) => match contributed {
                        Known::Single(v) if v == existing => Known::Single(existing),
                        _ => Known::Varies,
                    },
                };
                if known.get(&dest) != Some(&merged) {
                    known.insert(dest, merged);
                    changed = true;
                }
            }
        }
    }

    known
        .into_iter()
        .filter_map(|(r, k)| match k {
            Known::Single(v) => Some((r, v)),
            Known::Varies => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeTable, Width};
    use crate::variable::VariableKind;

    #[test]
    fn register_assigned_one_address_resolves() {
        let mut f = RtlFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let ptr_ = types.pointer(i32_);
        let var = f.variables_mut().declare(VariableKind::Local, i32_);
        let b0 = f.make_block();
        let addr = f.make_reg(ptr_, None);
        f.append(
            b0,
            Some(addr),
            RtlOp::LoadConstant {
                ty: ptr_,
                value: Value::VarPtr {
                    variable: var,
                    offset: 0,
                },
            },
        );
        f.append(b0, None, RtlOp::Jump { target: b0 });

        let resolved = analyze(&f);
        assert_eq!(resolved.get(&addr), Some(&var));
    }

    #[test]
    fn register_assigned_two_addresses_varies() {
        let mut f = RtlFunction::new("test");
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let ptr_ = types.pointer(i32_);
        let var_a = f.variables_mut().declare(VariableKind::Local, i32_);
        let var_b = f.variables_mut().declare(VariableKind::Local, i32_);
        let b0 = f.make_block();
        let b1 = f.make_block();
        let addr = f.make_reg(ptr_, None);
        f.append(
            b0,
            Some(addr),
            RtlOp::LoadConstant {
                ty: ptr_,
                value: Value::VarPtr {
                    variable: var_a,
                    offset: 0,
                },
            },
        );
        f.append(b0, None, RtlOp::Jump { target: b1 });
        f.append(
            b1,
            Some(addr),
            RtlOp::LoadConstant {
                ty: ptr_,
                value: Value::VarPtr {
                    variable: var_b,
                    offset: 0,
                },
            },
        );
        f.append(b1, None, RtlOp::Jump { target: b1 });

        let resolved = analyze(&f);
        assert_eq!(resolved.get(&addr), None);
    }
}
