//! Compilation flags threaded through every pass, in the spirit of the
//! teacher's `isa::TargetIsa` / `settings::Flags` pattern: a small, explicit,
//! cloneable struct rather than global mutable state (spec.md §9).

/// Flags controlling optional, expensive behavior. None of these change the
/// meaning of the compiled program; they trade compile time for extra
/// checking or diagnostics.
#[derive(Copy, Clone, Debug)]
pub struct Flags {
    /// Re-check CFG/dominator/liveness invariants (spec.md §8) after every
    /// pass that could disturb them. Off by default; turned on by the
    /// integration tests.
    pub enable_verifier: bool,
}

impl Flags {
    /// Defaults matching normal (non-test) compilation: verification off.
    pub fn new() -> Self {
        Self {
            enable_verifier: false,
        }
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::new()
    }
}
