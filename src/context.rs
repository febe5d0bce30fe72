//! `CompilerContext` (spec.md §9 "Global mutable state"): the original's
//! process-wide value-index counters and per-template-type caches become an
//! explicit context object threaded through construction instead, holding
//! the target backend, the interned type table, and a cache of
//! already-built per-architecture register tables.

use std::collections::HashMap;

use crate::isa::{make_isa, Architecture, TargetIsa};
use crate::settings::Flags;
use crate::types::TypeTable;

/// Owns everything the pipeline would otherwise reach for through a global:
/// the interned-type table, the compilation flags, a cache of per-
/// architecture `TargetIsa` backends, and the counters `fresh_name` draws
/// from.
pub struct CompilerContext {
    pub types: TypeTable,
    pub flags: Flags,
    isas: HashMap<Architecture, Box<dyn TargetIsa>>,
    fresh_name_counters: HashMap<&'static str, u32>,
}

impl CompilerContext {
    /// Start a fresh context with an empty type table.
    pub fn new(flags: Flags) -> Self {
        Self {
            types: TypeTable::new(),
            flags,
            isas: HashMap::new(),
            fresh_name_counters: HashMap::new(),
        }
    }

    /// The target description for `arch`, built on first request and cached
    /// for the lifetime of this context.
    pub fn isa(&mut self, arch: Architecture) -> &dyn TargetIsa {
        self.isas.entry(arch).or_insert_with(|| make_isa(arch)).as_ref()
    }

    /// A fresh name under `prefix`, unique within this context (e.g.
    /// `"mem2reg.spill0"`, `"mem2reg.spill1"`, ...). Used by mem2reg and
    /// φ-removal when they need to label a synthetic local for debugging
    /// (spec.md §9: "Counters for fresh names are context-local").
    pub fn fresh_name(&mut self, prefix: &'static str) -> String {
        let counter = self.fresh_name_counters.entry(prefix).or_insert(0);
        let name = format!("{}{}", prefix, counter);
        *counter += 1;
        name
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new(Flags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_are_unique_per_prefix() {
        let mut ctx = CompilerContext::default();
        assert_eq!(ctx.fresh_name("spill"), "spill0");
        assert_eq!(ctx.fresh_name("spill"), "spill1");
        assert_eq!(ctx.fresh_name("phi"), "phi0");
    }

    #[test]
    fn isa_is_cached_across_requests() {
        let mut ctx = CompilerContext::default();
        assert_eq!(ctx.isa(Architecture::X86_64).name(), "x86_64");
        assert_eq!(ctx.isa(Architecture::X86_64).name(), "x86_64");
    }
}
