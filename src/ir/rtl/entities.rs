//! Entity references for the RTL IR (spec.md §3 "RTL function/block").

use crate::entity::entity_impl;

/// A basic block in an `RtlFunction`. Distinct from `ir::ssa::entities::Block`
/// so the two IRs' block keys can never be confused.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Block(u32);
entity_impl!(Block, "rblock");

/// A virtual RTL register: `(name, spillLocation)` per spec.md §3. The
/// spill location lives alongside the register in `RegisterTable`, not on
/// this handle, so `Reg` stays `Copy`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Reg(u32);
entity_impl!(Reg, "v");
