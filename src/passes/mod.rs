//! Optimization and lowering passes (spec.md §2 pipeline order, §4.2-§4.10).

pub mod asm_dce;
pub mod cf_simplify;
pub mod mem2reg;
pub mod phi_removal;
pub mod rtl_to_asm;
pub mod sccp_rtl;
pub mod sccp_ssa;
pub mod ssa_to_rtl;
