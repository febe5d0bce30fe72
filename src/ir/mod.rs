//! The three intermediate representations this crate transforms between:
//! SSA (from the front end), RTL (post φ-elimination), and Asm (target-
//! specific, pre-allocation). See spec.md §2 for the data-flow order.

pub mod asm;
pub mod rtl;
pub mod ssa;
