//! Entity references for the Asm IR (spec.md §3 "Asm function/block").

use crate::entity::entity_impl;

/// A basic block in an `AsmFunction`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Block(u32);
entity_impl!(Block, "ablock");

/// A virtual or physical Asm register. Virtual registers are allocated by
/// `AsmFunction::make_virtual`; physical ones wrap an
/// `isa::registers::RegisterIndex` (spec.md §3: "instructions reference Asm
/// registers — either physical or virtual").
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum AsmReg {
    Physical(crate::isa::registers::RegisterIndex),
    Virtual(u32),
}
