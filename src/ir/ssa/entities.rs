//! Entity references used by the SSA IR (spec.md §3 "SSA function" /
//! "SSA basic block" / "SSA node").

use crate::entity::entity_impl;

/// A basic block in an `SsaFunction`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A node (instruction/value) in an `SsaFunction`. Nodes live in a flat,
/// per-function arena (see module docs on `ir::ssa::function`) rather than
/// being addressed as `(Block, index)` pairs; the block's instruction list
/// holds an ordered `Vec<Node>` of arena keys, which is where the
/// `(block, index)` identity spec.md §9 discusses actually lives.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Node(u32);
entity_impl!(Node, "n");
