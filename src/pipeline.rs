//! The one public entry point a front end (or a test) calls: takes an
//! already-constructed `SsaFunction` and drives it through every stage
//! down to assembly text (spec.md §9 Design Notes, §2 pipeline order;
//! SPEC_FULL.md §3 "driver sequencing", adopted from the original's
//! `main.cpp`).

use crate::context::CompilerContext;
use crate::ir::ssa::dominators;
use crate::ir::ssa::function::SsaFunction;
use crate::isa::Architecture;
use crate::passes::{asm_dce, cf_simplify, mem2reg, phi_removal, rtl_to_asm, sccp_rtl, sccp_ssa, ssa_to_rtl};
use crate::regalloc::allocator;
use crate::result::CodegenResult;
use crate::writer::{self, Dialect};

/// Compile one already-built SSA function down to assembly text for
/// `arch`, in `dialect`.
///
/// Caller owns construction of `func` (blocks, nodes, `alloca`s, the
/// entry block) and must have called `func.seal()` at least once before
/// passing it in; this function seals again itself after every
/// CFG-mutating pass, so callers never need to reseal between stages.
pub fn compile_function(
    ctx: &mut CompilerContext,
    func: &mut SsaFunction,
    arch: Architecture,
    dialect: Dialect,
) -> CodegenResult<String> {
    let target_width = arch.pointer_width();

    func.seal();
    dominators::compute(func);

    mem2reg::run(func, &mut ctx.types)?;
    func.seal();
    dominators::compute(func);

    // SCCP+DCE and phi-removal/CF-simplify each narrow what the other can
    // see (a resolved branch exposes a block whose single surviving
    // predecessor lets phi-removal drop a phi; a dropped phi exposes a
    // dead define SCCP can fold away), so the three run in a loop until
    // none of them change anything.
    loop {
        let mut changed = sccp_ssa::run(func, &ctx.types, target_width);
        changed |= phi_removal::run(func);
        changed |= cf_simplify::run(func);
        if changed {
            func.seal();
            dominators::compute(func);
        } else {
            break;
        }
    }

    let mut rtl = ssa_to_rtl::run(func, &ctx.types);

    // RTL has no dominator tree to exploit (spec.md §4.1), but its SCCP+DCE
    // pass still exposes further folds each time it resolves a branch or
    // drops a register, so loop it to a fixed point the same way.
    while sccp_rtl::run(&mut rtl, &ctx.types, target_width) {}

    let mut asm = rtl_to_asm::run(&rtl, &ctx.types, target_width)?;

    let isa = ctx.isa(arch);
    allocator::run(&mut asm, isa, &ctx.types)?;
    asm_dce::run(&mut asm);

    writer::write(&asm, isa, &ctx.types, dialect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ssa::node::NodeKind;
    use crate::types::Width;
    use crate::value::Value;

    /// `*null = 2 + 3;` — exercises every stage end to end: mem2reg has
    /// nothing to promote, SCCP folds the add to a constant, the store
    /// keeps it alive through DCE (stores are always side-effecting), RTL
    /// lowering and allocation run on a single register, and the writer
    /// emits a prologue/epilogue around the one surviving instruction.
    /// There's no parameter-passing or return-value convention to exercise
    /// (spec.md §1 Non-goals: "calling conventions beyond a single
    /// parameterless `main`-style entry"), so a store is the simplest
    /// observable effect available to a test.
    #[test]
    fn compiles_constant_add_to_assembly_text() {
        let mut ctx = CompilerContext::default();
        let i32_ = ctx.types.integer(true, Width::W32);
        let ptr_i32 = ctx.types.pointer(i32_);

        let mut f = SsaFunction::new("add_two_constants");
        let b0 = f.make_block();
        f.entry = Some(b0);
        let two = f.append(
            b0,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 2),
            },
            Some(i32_),
        );
        let three = f.append(
            b0,
            NodeKind::Constant {
                ty: i32_,
                value: Value::int(true, Width::W32, 3),
            },
            Some(i32_),
        );
        let sum = f.append(
            b0,
            NodeKind::Add {
                ty: i32_,
                lhs: two,
                rhs: three,
            },
            Some(i32_),
        );
        let addr = f.append(
            b0,
            NodeKind::Constant {
                ty: ptr_i32,
                value: Value::NullPtr,
            },
            Some(ptr_i32),
        );
        f.append(b0, NodeKind::Store { addr, value: sum }, None);
        f.seal();

        let asm = compile_function(&mut ctx, &mut f, Architecture::X86_64, Dialect::GasIntel)
            .expect("compilation should succeed");

        assert!(asm.contains(".globl add_two_constants"));
        assert!(asm.contains("ret"));

        // SCCP folds `sum` to a constant; that fold must not leave the
        // fresh constant ordered after the store that uses it.
        let nodes = f.block(b0).nodes.clone();
        let store_pos = nodes
            .iter()
            .position(|&n| matches!(f.arena().kind(n), NodeKind::Store { .. }))
            .expect("the store survives DCE (stores always have side effects)");
        let stored_value = match f.arena().kind(nodes[store_pos]) {
            NodeKind::Store { value, .. } => *value,
            _ => unreachable!(),
        };
        let value_pos = nodes
            .iter()
            .position(|&n| n == stored_value)
            .expect("the store's value must still be a live node in this block");
        assert!(value_pos < store_pos, "def must precede use: the stored value's node must come before the store");
    }
}
