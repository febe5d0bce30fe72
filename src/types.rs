//! The interned type model (spec.md §3 "Types").
//!
//! Types are structural and interned: two requests for `Integer{signed:
//! true, width: 32}` return the same `Type` handle. `Const`/`Volatile`
//! wrappers canonicalize so `Const(Const(T)) = Const(T)` and
//! `Volatile(Const(T)) = Const(Volatile(T))`, matching spec.md §3 and the
//! canonicalization note in spec.md §9.

use std::collections::HashMap;
use std::fmt;

/// Integer bit width. `Native` takes on the target's pointer width during
/// lowering; by the time code reaches RTL it has always been resolved to a
/// concrete width.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Width {
    /// 8 bits.
    W8,
    /// 16 bits.
    W16,
    /// 32 bits.
    W32,
    /// 64 bits. Out of scope for x86-32 (spec.md §1 Non-goals).
    W64,
    /// The target's native integer/pointer width.
    Native,
}

impl Width {
    /// Resolve `Native` to a concrete width for `target_width` (the target's
    /// pointer width in bits: 32 or 64).
    pub fn resolve(self, target_width: u32) -> Width {
        match self {
            Width::Native => match target_width {
                32 => Width::W32,
                64 => Width::W64,
                _ => unreachable!("target width must be 32 or 64"),
            },
            other => other,
        }
    }

    /// Size in bytes of a resolved (non-`Native`) width.
    pub fn bytes(self) -> u32 {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
            Width::Native => panic!("Width::Native has no fixed size before resolution"),
        }
    }
}

/// A structural type node. Not `Copy`/`Clone`-free-floating: owners hold a
/// `Type` handle returned from `TypeTable::intern`, which is a cheap `Copy`
/// index into the owning `TypeTable`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Type(u32);

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum TypeData {
    Void,
    Bool,
    Pointer(Type),
    Integer { signed: bool, width: Width },
    Const(Type),
    Volatile(Type),
}

/// The per-context interning table for `Type`s. Owned by `CompilerContext`
/// (spec.md §3 "Types are owned by the compilation context").
#[derive(Default)]
pub struct TypeTable {
    data: Vec<TypeData>,
    index: HashMap<TypeData, Type>,
}

impl TypeTable {
    /// Create an empty type table.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn intern(&mut self, data: TypeData) -> Type {
        if let Some(&t) = self.index.get(&data) {
            return t;
        }
        let t = Type(self.data.len() as u32);
        self.data.push(data.clone());
        self.index.insert(data, t);
        t
    }

    /// The `void` type.
    pub fn void(&mut self) -> Type {
        self.intern(TypeData::Void)
    }

    /// The `bool` type.
    pub fn bool_(&mut self) -> Type {
        self.intern(TypeData::Bool)
    }

    /// `Pointer(inner)`.
    pub fn pointer(&mut self, inner: Type) -> Type {
        self.intern(TypeData::Pointer(inner))
    }

    /// `Integer{signed, width}`.
    pub fn integer(&mut self, signed: bool, width: Width) -> Type {
        self.intern(TypeData::Integer { signed, width })
    }

    /// `Const(inner)`, canonicalizing `Const(Const(T)) = Const(T)` and
    /// `Const(Volatile(T)) = Const(Volatile(T))` (left as-is; only
    /// `Volatile(Const(T))` needs rewriting, see `volatile`).
    pub fn const_(&mut self, inner: Type) -> Type {
        match &self.data[inner.0 as usize] {
            TypeData::Const(_) => inner,
            _ => self.intern(TypeData::Const(inner)),
        }
    }

    /// `Volatile(inner)`, canonicalizing `Volatile(Const(T))` to
    /// `Const(Volatile(T))` per spec.md §3.
    pub fn volatile(&mut self, inner: Type) -> Type {
        match self.data[inner.0 as usize].clone() {
            TypeData::Volatile(_) => inner,
            TypeData::Const(unwrapped) => {
                let v = self.intern(TypeData::Volatile(unwrapped));
                self.intern(TypeData::Const(v))
            }
            _ => self.intern(TypeData::Volatile(inner)),
        }
    }

    /// `dereference(Pointer(T)) = T`. Panics if `t` is not a pointer type;
    /// callers that may see non-pointer types should check `is_pointer`
    /// first.
    pub fn dereference(&self, t: Type) -> Type {
        match self.data[t.0 as usize] {
            TypeData::Pointer(inner) => inner,
            _ => panic!("dereference of non-pointer type"),
        }
    }

    /// True if `t` is a `Pointer(..)`.
    pub fn is_pointer(&self, t: Type) -> bool {
        matches!(self.data[t.0 as usize], TypeData::Pointer(_))
    }

    /// True if `t` is `Bool`.
    pub fn is_bool(&self, t: Type) -> bool {
        matches!(self.data[t.0 as usize], TypeData::Bool)
    }

    /// True if `t` is `Void`.
    pub fn is_void(&self, t: Type) -> bool {
        matches!(self.data[t.0 as usize], TypeData::Void)
    }

    /// The `(signed, width)` pair if `t` is an integer type (stripping
    /// `Const`/`Volatile` wrappers first).
    pub fn as_integer(&self, t: Type) -> Option<(bool, Width)> {
        match self.data[self.strip_wrappers(t).0 as usize] {
            TypeData::Integer { signed, width } => Some((signed, width)),
            _ => None,
        }
    }

    /// Strip any `Const`/`Volatile` wrappers to get at the underlying type.
    pub fn strip_wrappers(&self, t: Type) -> Type {
        match self.data[t.0 as usize] {
            TypeData::Const(inner) | TypeData::Volatile(inner) => self.strip_wrappers(inner),
            _ => t,
        }
    }

    /// True if `t` (after stripping wrappers) is `Volatile` anywhere in its
    /// wrapper chain. Used by SCCP (spec.md §8 scenario S3) to avoid folding
    /// through a volatile access.
    pub fn is_volatile(&self, mut t: Type) -> bool {
        loop {
            match self.data[t.0 as usize] {
                TypeData::Volatile(_) => return true,
                TypeData::Const(inner) => t = inner,
                _ => return false,
            }
        }
    }

    /// `{size, alignment}` in bytes for a non-void type on a target whose
    /// pointer width is `target_width` bits (32 or 64).
    pub fn layout(&self, t: Type, target_width: u32) -> TypeProperties {
        match self.data[t.0 as usize] {
            TypeData::Void => panic!("void has no layout"),
            TypeData::Bool => TypeProperties { size: 1, align: 1 },
            TypeData::Pointer(_) => {
                let bytes = target_width / 8;
                TypeProperties {
                    size: bytes,
                    align: bytes,
                }
            }
            TypeData::Integer { width, .. } => {
                let bytes = width.resolve(target_width).bytes();
                TypeProperties {
                    size: bytes,
                    align: bytes,
                }
            }
            TypeData::Const(inner) | TypeData::Volatile(inner) => self.layout(inner, target_width),
        }
    }

    /// Display helper; `TypeTable` doesn't implement `Display` on `Type`
    /// directly since rendering needs the table.
    pub fn display(&self, t: Type) -> String {
        match self.data[t.0 as usize].clone() {
            TypeData::Void => "void".to_string(),
            TypeData::Bool => "bool".to_string(),
            TypeData::Pointer(inner) => format!("*{}", self.display(inner)),
            TypeData::Integer { signed, width } => {
                let w = match width {
                    Width::W8 => "8",
                    Width::W16 => "16",
                    Width::W32 => "32",
                    Width::W64 => "64",
                    Width::Native => "n",
                };
                format!("{}{}", if signed { "i" } else { "u" }, w)
            }
            TypeData::Const(inner) => format!("const {}", self.display(inner)),
            TypeData::Volatile(inner) => format!("volatile {}", self.display(inner)),
        }
    }
}

/// `{size, alignment}` for a non-void type (spec.md §3).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TypeProperties {
    /// Size in bytes.
    pub size: u32,
    /// Required alignment in bytes.
    pub align: u32,
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ty{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut types = TypeTable::new();
        let i32a = types.integer(true, Width::W32);
        let i32b = types.integer(true, Width::W32);
        assert_eq!(i32a, i32b);
        let u32_ = types.integer(false, Width::W32);
        assert_ne!(i32a, u32_);
    }

    #[test]
    fn const_and_volatile_canonicalize() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let c = types.const_(i32_);
        let cc = types.const_(c);
        assert_eq!(c, cc, "Const(Const(T)) = Const(T)");

        let vc = types.volatile(c);
        let cv_direct = types.const_(types.volatile(i32_));
        assert_eq!(vc, cv_direct, "Volatile(Const(T)) = Const(Volatile(T))");
        assert!(types.is_volatile(vc));
    }

    #[test]
    fn pointer_dereference_round_trips() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let p = types.pointer(i32_);
        assert_eq!(types.dereference(p), i32_);
        assert!(types.is_pointer(p));
    }

    #[test]
    fn layout_matches_target_width() {
        let mut types = TypeTable::new();
        let bool_ = types.bool_();
        let p = types.pointer(bool_);
        assert_eq!(types.layout(p, 32).size, 4);
        assert_eq!(types.layout(p, 64).size, 8);
    }
}
