//! The error type threaded through every pass in the pipeline.
//!
//! Mirrors spec.md §7's three error categories: user-visible front-end
//! errors (passed through, never constructed here), not-implemented paths,
//! and internal invariant violations that abort compilation.

use thiserror::Error;

use crate::entity::EntityRef;

/// Errors produced anywhere in the SSA → RTL → Asm → text pipeline.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// A requested type, calling convention, or output dialect has no
    /// lowering implemented. Spec.md §7 category 2.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The register allocator could not find a legal coloring within its
    /// retry budget. Spec.md §7 category 3 / §4.9 "Failure semantics".
    #[error("register allocation failed to converge after {attempts} attempts")]
    RegisterAllocationFailed {
        /// Number of simplify/color/spill rounds attempted.
        attempts: usize,
    },

    /// The dominator tree is inconsistent with the control-flow graph it was
    /// built from (spec.md §8 "Dominator correctness").
    #[error("dominator tree inconsistent at {0}: {1}")]
    DominatorInconsistency(String, String),

    /// Mem2Reg found `block` live-in for a promotable local whose first use
    /// would read uninitialized memory (spec.md §4.3 step 3).
    #[error("memory-to-register promotion would read an uninitialized local entering {0}")]
    UninitializedLocal(String),

    /// A comparison, cast, or arithmetic op was dispatched to a type/value
    /// combination with no defined semantics (spec.md §9, open question 1).
    #[error("no code pattern for operation on this operand type: {0}")]
    UnsupportedOperand(String),

    /// Pass-through for a front-end error. This crate never constructs this
    /// variant itself; it exists so `CodegenResult` can represent the whole
    /// compilation pipeline's outcome uniformly for an external driver.
    #[error("input error: {0}")]
    InputError(String),
}

impl CodegenError {
    /// Build a `DominatorInconsistency` referencing a block by its display
    /// form, without requiring the caller to format it twice.
    pub fn dominator_inconsistency<E: EntityRef + std::fmt::Display>(
        block: E,
        detail: impl Into<String>,
    ) -> Self {
        CodegenError::DominatorInconsistency(block.to_string(), detail.into())
    }
}

/// Result type returned by every pass and by the top-level pipeline.
pub type CodegenResult<T> = Result<T, CodegenError>;
