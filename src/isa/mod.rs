//! Target descriptions: x86-32 and x86-64 (spec.md §6 `-a`/`--arch`).
//!
//! Mirrors the teacher's `isa::TargetIsa` trait: a small object threaded
//! through every pass that needs target-specific facts (pointer width,
//! physical register table, prologue/epilogue shape) without every pass
//! hard-coding which architecture it runs for.

pub mod registers;

use self::registers::RegisterTable;

/// Which x86 variant we are compiling for.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Architecture {
    /// 32-bit x86 (cdecl-ish, single-parameter `main`-style entry per
    /// spec.md §1 Non-goals).
    X86_32,
    /// 64-bit x86 (System V-ish, same Non-goals).
    X86_64,
}

impl Architecture {
    /// Parse the `-a`/`--arch` CLI value (spec.md §6). This crate doesn't
    /// implement the CLI itself (out of scope), but the external driver
    /// collaborator needs this to turn its flag into an `Architecture`.
    pub fn parse(name: &str) -> Option<Architecture> {
        match name {
            "x86_64" => Some(Architecture::X86_64),
            "x86_32" => Some(Architecture::X86_32),
            _ => None,
        }
    }

    /// Pointer/native-integer width in bits.
    pub fn pointer_width(self) -> u32 {
        match self {
            Architecture::X86_32 => 32,
            Architecture::X86_64 => 64,
        }
    }
}

/// Target-specific facts needed by the RTL→Asm lowering, the register
/// allocator, and the assembly writer.
pub trait TargetIsa {
    /// Which architecture this is.
    fn architecture(&self) -> Architecture;

    /// Pointer/native-integer width in bits (32 or 64).
    fn pointer_width(&self) -> u32 {
        self.architecture().pointer_width()
    }

    /// The physical register file.
    fn registers(&self) -> &RegisterTable;

    /// The frame-pointer register's name, for the writer's prologue.
    fn frame_pointer_name(&self) -> &'static str;

    /// The stack-pointer register's name, for the writer's prologue.
    fn stack_pointer_name(&self) -> &'static str;

    /// GAS output dialect name, for `.text`/`.globl` headers (spec.md §6).
    fn name(&self) -> &'static str;
}

/// x86-64 target.
pub struct X86_64 {
    registers: RegisterTable,
}

impl X86_64 {
    /// Build the x86-64 target description.
    pub fn new() -> Self {
        Self {
            registers: registers::x86_64_registers(),
        }
    }
}

impl Default for X86_64 {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetIsa for X86_64 {
    fn architecture(&self) -> Architecture {
        Architecture::X86_64
    }
    fn registers(&self) -> &RegisterTable {
        &self.registers
    }
    fn frame_pointer_name(&self) -> &'static str {
        "rbp"
    }
    fn stack_pointer_name(&self) -> &'static str {
        "rsp"
    }
    fn name(&self) -> &'static str {
        "x86_64"
    }
}

/// x86-32 target.
pub struct X86_32 {
    registers: RegisterTable,
}

impl X86_32 {
    /// Build the x86-32 target description.
    pub fn new() -> Self {
        Self {
            registers: registers::x86_32_registers(),
        }
    }
}

impl Default for X86_32 {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetIsa for X86_32 {
    fn architecture(&self) -> Architecture {
        Architecture::X86_32
    }
    fn registers(&self) -> &RegisterTable {
        &self.registers
    }
    fn frame_pointer_name(&self) -> &'static str {
        "ebp"
    }
    fn stack_pointer_name(&self) -> &'static str {
        "esp"
    }
    fn name(&self) -> &'static str {
        "x86_32"
    }
}

/// Build the target description for `arch`.
pub fn make_isa(arch: Architecture) -> Box<dyn TargetIsa> {
    match arch {
        Architecture::X86_64 => Box::new(X86_64::new()),
        Architecture::X86_32 => Box::new(X86_32::new()),
    }
}
