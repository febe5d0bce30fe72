//! Physical register tables (spec.md §3 "Asm function/block").
//!
//! A [`PhysicalRegister`] carries a name, a mask of the operand kinds it can
//! hold, an interference set of sub-register aliases (e.g. `eax`/`ax`/`al`
//! all interfere with each other and with `rax` on x86-64), a designated
//! *save register* (the widest alias, used for callee-save spill/restore),
//! and the `is_special_purpose`/`is_callee_save` flags the allocator and
//! writer both consult.

use std::fmt;

/// Bitmask of operand kinds a physical (or virtual) register may hold.
/// Floating-point kinds are reserved per spec.md §1 Non-goals (the type
/// system reserves slots but emission is incomplete); no register is ever
/// given a float kind bit today, but the bits exist so a future pass can
/// widen the matrix without changing the representation (spec.md §9 open
/// question 1).
pub mod kind {
    /// An 8-bit integer value.
    pub const INT8: u8 = 1 << 0;
    /// A 16-bit integer value.
    pub const INT16: u8 = 1 << 1;
    /// A 32-bit integer value.
    pub const INT32: u8 = 1 << 2;
    /// A 64-bit integer value (x86-64 only; spec.md §1 Non-goals excludes
    /// 64-bit arithmetic on x86-32).
    pub const INT64: u8 = 1 << 3;
    /// Reserved, unused today.
    pub const FLOAT32: u8 = 1 << 4;
    /// Reserved, unused today.
    pub const FLOAT64: u8 = 1 << 5;
}

/// A mask of [`kind`] bits.
pub type PhysicalRegisterKindMask = u8;

/// An index into a [`RegisterTable`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RegisterIndex(pub u16);

/// A single physical register alias (e.g. `eax`, or `ax`, or `al` are three
/// distinct `PhysicalRegister` entries that all interfere with each other).
#[derive(Clone, Debug)]
pub struct PhysicalRegister {
    /// Assembly-syntax name, without the `%` prefix (added by the writer).
    pub name: &'static str,
    /// Which operand kinds this exact alias can hold.
    pub kind_mask: PhysicalRegisterKindMask,
    /// Indices (into the same table) of every register this one aliases,
    /// including itself.
    pub interferes_with: Vec<RegisterIndex>,
    /// The widest alias in this register's family, used as the callee-save
    /// unit (spec.md §4.11 "Callee-save set").
    pub save_register: RegisterIndex,
    /// Stack/base pointer or similar: the allocator avoids assigning this
    /// register unless a live range specifically prefers it.
    pub is_special_purpose: bool,
    /// Per the target's calling convention, a function that clobbers this
    /// register must restore it before returning.
    pub is_callee_save: bool,
}

/// All physical registers for one target, plus convenience lookup.
pub struct RegisterTable {
    regs: Vec<PhysicalRegister>,
}

impl RegisterTable {
    /// Every register in declaration order.
    pub fn all(&self) -> impl Iterator<Item = (RegisterIndex, &PhysicalRegister)> {
        self.regs
            .iter()
            .enumerate()
            .map(|(i, r)| (RegisterIndex(i as u16), r))
    }

    /// Look up a register by assembly name.
    pub fn by_name(&self, name: &str) -> Option<RegisterIndex> {
        self.regs
            .iter()
            .position(|r| r.name == name)
            .map(|i| RegisterIndex(i as u16))
    }
}

impl std::ops::Index<RegisterIndex> for RegisterTable {
    type Output = PhysicalRegister;
    fn index(&self, i: RegisterIndex) -> &PhysicalRegister {
        &self.regs[i.0 as usize]
    }
}

impl fmt::Display for RegisterIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// One general-purpose register family: the 64-bit name (x86-64 only, pass
/// `None` for x86-32), the 32-bit name, the 16-bit name, and the low-8-bit
/// name.
struct Family {
    r64: Option<&'static str>,
    r32: &'static str,
    r16: &'static str,
    r8: &'static str,
    is_special_purpose: bool,
    is_callee_save: bool,
}

fn build(families: &[Family]) -> RegisterTable {
    let mut regs = Vec::new();
    for fam in families {
        let base = regs.len() as u16;
        let mut indices = Vec::new();
        if let Some(r64) = fam.r64 {
            indices.push(RegisterIndex(base));
            regs.push(PhysicalRegister {
                name: r64,
                kind_mask: kind::INT64,
                interferes_with: Vec::new(),
                save_register: RegisterIndex(base),
                is_special_purpose: fam.is_special_purpose,
                is_callee_save: fam.is_callee_save,
            });
        }
        let r32_idx = RegisterIndex(regs.len() as u16);
        indices.push(r32_idx);
        regs.push(PhysicalRegister {
            name: fam.r32,
            kind_mask: kind::INT32,
            interferes_with: Vec::new(),
            save_register: RegisterIndex(base),
            is_special_purpose: fam.is_special_purpose,
            is_callee_save: fam.is_callee_save,
        });
        let r16_idx = RegisterIndex(regs.len() as u16);
        indices.push(r16_idx);
        regs.push(PhysicalRegister {
            name: fam.r16,
            kind_mask: kind::INT16,
            interferes_with: Vec::new(),
            save_register: RegisterIndex(base),
            is_special_purpose: fam.is_special_purpose,
            is_callee_save: fam.is_callee_save,
        });
        let r8_idx = RegisterIndex(regs.len() as u16);
        indices.push(r8_idx);
        regs.push(PhysicalRegister {
            name: fam.r8,
            kind_mask: kind::INT8,
            interferes_with: Vec::new(),
            save_register: RegisterIndex(base),
            is_special_purpose: fam.is_special_purpose,
            is_callee_save: fam.is_callee_save,
        });
        for &i in &indices {
            regs[i.0 as usize].interferes_with = indices.clone();
        }
    }
    RegisterTable { regs }
}

/// x86-64 general-purpose register file: `rax`..`r15` with their `e`/16-bit/
/// low-8-bit aliases. `rsp`/`rbp` are special-purpose; the System V callee-
/// save set (`rbx`, `rbp`, `r12`-`r15`) is marked `is_callee_save`.
pub fn x86_64_registers() -> RegisterTable {
    build(&[
        Family { r64: Some("rax"), r32: "eax", r16: "ax", r8: "al", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("rcx"), r32: "ecx", r16: "cx", r8: "cl", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("rdx"), r32: "edx", r16: "dx", r8: "dl", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("rbx"), r32: "ebx", r16: "bx", r8: "bl", is_special_purpose: false, is_callee_save: true },
        Family { r64: Some("rsp"), r32: "esp", r16: "sp", r8: "spl", is_special_purpose: true, is_callee_save: false },
        Family { r64: Some("rbp"), r32: "ebp", r16: "bp", r8: "bpl", is_special_purpose: true, is_callee_save: false },
        Family { r64: Some("rsi"), r32: "esi", r16: "si", r8: "sil", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("rdi"), r32: "edi", r16: "di", r8: "dil", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("r8"), r32: "r8d", r16: "r8w", r8: "r8b", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("r9"), r32: "r9d", r16: "r9w", r8: "r9b", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("r10"), r32: "r10d", r16: "r10w", r8: "r10b", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("r11"), r32: "r11d", r16: "r11w", r8: "r11b", is_special_purpose: false, is_callee_save: false },
        Family { r64: Some("r12"), r32: "r12d", r16: "r12w", r8: "r12b", is_special_purpose: false, is_callee_save: true },
        Family { r64: Some("r13"), r32: "r13d", r16: "r13w", r8: "r13b", is_special_purpose: false, is_callee_save: true },
        Family { r64: Some("r14"), r32: "r14d", r16: "r14w", r8: "r14b", is_special_purpose: false, is_callee_save: true },
        Family { r64: Some("r15"), r32: "r15d", r16: "r15w", r8: "r15b", is_special_purpose: false, is_callee_save: true },
    ])
}

/// x86-32 general-purpose register file: `eax`..`edi` with 16/8-bit
/// aliases. `esp`/`ebp` are special-purpose; `ebx`, `esi`, `edi`, `ebp` are
/// callee-save under cdecl.
pub fn x86_32_registers() -> RegisterTable {
    build(&[
        Family { r64: None, r32: "eax", r16: "ax", r8: "al", is_special_purpose: false, is_callee_save: false },
        Family { r64: None, r32: "ecx", r16: "cx", r8: "cl", is_special_purpose: false, is_callee_save: false },
        Family { r64: None, r32: "edx", r16: "dx", r8: "dl", is_special_purpose: false, is_callee_save: false },
        Family { r64: None, r32: "ebx", r16: "bx", r8: "bl", is_special_purpose: false, is_callee_save: true },
        Family { r64: None, r32: "esp", r16: "sp", r8: "spl", is_special_purpose: true, is_callee_save: false },
        Family { r64: None, r32: "ebp", r16: "bp", r8: "bpl", is_special_purpose: true, is_callee_save: false },
        Family { r64: None, r32: "esi", r16: "si", r8: "sil", is_special_purpose: false, is_callee_save: true },
        Family { r64: None, r32: "edi", r16: "di", r8: "dil", is_special_purpose: false, is_callee_save: true },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_interfere() {
        let regs = x86_64_registers();
        let rax = regs.by_name("rax").unwrap();
        let eax = regs.by_name("eax").unwrap();
        let al = regs.by_name("al").unwrap();
        assert!(regs[rax].interferes_with.contains(&eax));
        assert!(regs[rax].interferes_with.contains(&al));
        assert_eq!(regs[al].save_register, rax);
    }

    #[test]
    fn x86_32_has_no_64_bit_registers() {
        let regs = x86_32_registers();
        assert!(regs.by_name("rax").is_none());
        assert!(regs.all().all(|(_, r)| r.kind_mask & kind::INT64 == 0));
    }
}
