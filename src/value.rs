//! The constant-value domain used by SCCP (spec.md §3 "Values").
//!
//! `Value` is the lattice element SCCP propagates: `ValueUnknown` is ⊤
//! (not yet evaluated), a concrete variant is a known constant, and
//! [`Value::Varying`] is ⊥ (proven to vary at run time). `join` implements
//! the SSA-level lattice meet described in spec.md §4.4 and adopted for the
//! RTL-level per-block map in the same section; the original's φ-input join
//! rule (SPEC_FULL.md §3) is the same rule, applied there across
//! predecessors instead of across a single node's φ inputs.

use crate::types::{Type, TypeTable, Width};
use crate::variable::Variable;

/// Result of `compareValue` (spec.md §3): three-way, with `Unknown` when the
/// two operands' relative order cannot be determined statically.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Ordering3 {
    /// Less.
    Less,
    /// Equal.
    Equal,
    /// Greater.
    Greater,
    /// Not statically determinable.
    Unknown,
}

/// The constant/lattice value carried by an SSA node or RTL register during
/// SCCP (spec.md §4.4). `Varying` is the lattice bottom (⊥); the absence of
/// any `Value` (handled by callers as `None`/`Unknown` at the very start of
/// the analysis) is the lattice top (⊤).
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    /// A concrete `bool`.
    Bool(bool),
    /// A concrete integer, truncated/sign-extended to the stated width and
    /// signedness. Values wider than a machine word are never constructed;
    /// `width` only distinguishes 8/16/32/64-bit constants of the same
    /// 64-bit storage.
    Int {
        /// Whether this integer's declared type is signed.
        signed: bool,
        /// The integer's declared width.
        width: Width,
        /// The raw bit pattern, stored in a 64-bit cell regardless of
        /// `width` (sign/zero-extended to 64 bits consistently with
        /// `signed`).
        bits: i64,
    },
    /// The null pointer constant.
    NullPtr,
    /// The address of `variable`, offset by `offset` bytes. Produced by
    /// `&variable` (an `Alloca` result feeding an address-of) and by pointer
    /// arithmetic on such an address.
    VarPtr {
        /// The variable whose address this is.
        variable: Variable,
        /// Byte offset from the variable's base address.
        offset: i64,
    },
    /// Proven non-constant (lattice ⊥).
    Varying,
}

impl Value {
    /// Sign/zero-extend `bits` to a canonical 64-bit representation for an
    /// integer of the given `signed`/`width`.
    pub fn int(signed: bool, width: Width, bits: i64) -> Value {
        let truncated = truncate(bits, width);
        let canon = if signed {
            sign_extend(truncated, width)
        } else {
            truncated
        };
        Value::Int {
            signed,
            width,
            bits: canon,
        }
    }

    /// Join two lattice values, per spec.md §4.4: "`Unknown ⊔ x = x`,
    /// `concrete ⊔ concrete = concrete if equal else Varying`". `Unknown`
    /// (⊤) is represented by `None` at this layer; callers seed an
    /// accumulator with `None` and fold in each operand with `join`.
    pub fn join(a: Option<Value>, b: Option<Value>) -> Option<Value> {
        match (a, b) {
            (None, x) | (x, None) => x,
            (Some(Value::Varying), _) | (_, Some(Value::Varying)) => Some(Value::Varying),
            (Some(x), Some(y)) => {
                if x == y {
                    Some(x)
                } else {
                    Some(Value::Varying)
                }
            }
        }
    }

    /// Three-way comparison (spec.md §3): `ValueNullPtr < ValueVarPtr`
    /// always; integer comparison honors a signedness mismatch (an unsigned
    /// value compares greater than a negative signed one); widths wider
    /// than `target_width` bits are clamped to that width first. Any
    /// comparison touching `Varying` is `Unknown`.
    pub fn compare(&self, other: &Value, target_width: u32) -> Ordering3 {
        use Value::*;
        match (self, other) {
            (Varying, _) | (_, Varying) => Ordering3::Unknown,
            (Bool(a), Bool(b)) => cmp3(*a as i64, *b as i64),
            (NullPtr, NullPtr) => Ordering3::Equal,
            (NullPtr, VarPtr { .. }) => Ordering3::Less,
            (VarPtr { .. }, NullPtr) => Ordering3::Greater,
            (
                VarPtr {
                    variable: v1,
                    offset: o1,
                },
                VarPtr {
                    variable: v2,
                    offset: o2,
                },
            ) => {
                if v1 == v2 {
                    cmp3(*o1, *o2)
                } else {
                    Ordering3::Unknown
                }
            }
            (
                Int {
                    signed: s1,
                    width: w1,
                    bits: b1,
                },
                Int {
                    signed: s2,
                    width: w2,
                    bits: b2,
                },
            ) => {
                let clamped1 = clamp_to_word(*b1, *s1, *w1, target_width);
                let clamped2 = clamp_to_word(*b2, *s2, *w2, target_width);
                match (s1, s2) {
                    (true, true) => cmp3(clamped1, clamped2),
                    (false, false) => cmp3_unsigned(clamped1 as u64, clamped2 as u64),
                    (true, false) => mixed_signed_unsigned(clamped1, clamped2 as u64),
                    (false, true) => mixed_signed_unsigned(clamped2, clamped1 as u64).reverse(),
                }
            }
            _ => Ordering3::Unknown,
        }
    }

    /// `typeCast` (spec.md §3): reinterpret this value as `target`, or
    /// return `None` if not representable (e.g. casting a `VarPtr` to a
    /// narrower integer).
    pub fn type_cast(&self, target: Type, types: &TypeTable, target_width: u32) -> Option<Value> {
        if types.is_bool(target) {
            return match self {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::Int { bits, .. } => Some(Value::Bool(*bits != 0)),
                _ => None,
            };
        }
        if types.is_pointer(target) {
            return match self {
                Value::NullPtr | Value::VarPtr { .. } => Some(self.clone()),
                Value::Int { bits, .. } if *bits == 0 => Some(Value::NullPtr),
                _ => None,
            };
        }
        if let Some((signed, width)) = types.as_integer(target) {
            let resolved = width.resolve(target_width);
            return match self {
                Value::Bool(b) => Some(Value::int(signed, resolved, *b as i64)),
                Value::Int { bits, .. } => Some(Value::int(signed, resolved, *bits)),
                _ => None,
            };
        }
        None
    }

    /// `add` (spec.md §3): pointer + integer produces a `VarPtr` offset;
    /// integer + integer wraps within the destination width. `None` if the
    /// operand combination has no defined semantics (spec.md §9 open
    /// question: pointer/integer only).
    pub fn add(&self, other: &Value, target_width: u32) -> Option<Value> {
        use Value::*;
        match (self, other) {
            (VarPtr { variable, offset }, Int { bits, .. })
            | (Int { bits, .. }, VarPtr { variable, offset }) => Some(VarPtr {
                variable: *variable,
                offset: offset.wrapping_add(*bits),
            }),
            (
                Int {
                    signed,
                    width,
                    bits: b1,
                },
                Int { bits: b2, .. },
            ) => {
                let resolved = width.resolve(target_width);
                Some(Value::int(*signed, resolved, b1.wrapping_add(*b2)))
            }
            _ => None,
        }
    }

    /// `subtract` (spec.md §3), symmetric to `add`: pointer - integer is a
    /// `VarPtr`; pointer - pointer (same variable) is an integer byte
    /// distance; integer - integer wraps.
    pub fn subtract(&self, other: &Value, target_width: u32) -> Option<Value> {
        use Value::*;
        match (self, other) {
            (VarPtr { variable, offset }, Int { bits, .. }) => Some(VarPtr {
                variable: *variable,
                offset: offset.wrapping_sub(*bits),
            }),
            (
                VarPtr {
                    variable: v1,
                    offset: o1,
                },
                VarPtr {
                    variable: v2,
                    offset: o2,
                },
            ) if v1 == v2 => Some(Value::int(true, Width::Native.resolve(target_width), o1 - o2)),
            (
                Int {
                    signed,
                    width,
                    bits: b1,
                },
                Int { bits: b2, .. },
            ) => {
                let resolved = width.resolve(target_width);
                Some(Value::int(*signed, resolved, b1.wrapping_sub(*b2)))
            }
            _ => None,
        }
    }
}

fn truncate(bits: i64, width: Width) -> i64 {
    match width {
        Width::W8 => bits & 0xff,
        Width::W16 => bits & 0xffff,
        Width::W32 => bits & 0xffff_ffff,
        Width::W64 | Width::Native => bits,
    }
}

fn sign_extend(bits: i64, width: Width) -> i64 {
    match width {
        Width::W8 => (bits as i8) as i64,
        Width::W16 => (bits as i16) as i64,
        Width::W32 => (bits as i32) as i64,
        Width::W64 | Width::Native => bits,
    }
}

fn clamp_to_word(bits: i64, signed: bool, width: Width, target_width: u32) -> i64 {
    let word = if target_width == 32 { Width::W32 } else { Width::W64 };
    if width_bits(width, target_width) <= target_width {
        bits
    } else if signed {
        sign_extend(truncate(bits, word), word)
    } else {
        truncate(bits, word)
    }
}

fn width_bits(width: Width, target_width: u32) -> u32 {
    match width.resolve(target_width) {
        Width::W8 => 8,
        Width::W16 => 16,
        Width::W32 => 32,
        Width::W64 => 64,
        Width::Native => target_width,
    }
}

fn cmp3(a: i64, b: i64) -> Ordering3 {
    if a < b {
        Ordering3::Less
    } else if a > b {
        Ordering3::Greater
    } else {
        Ordering3::Equal
    }
}

fn cmp3_unsigned(a: u64, b: u64) -> Ordering3 {
    if a < b {
        Ordering3::Less
    } else if a > b {
        Ordering3::Greater
    } else {
        Ordering3::Equal
    }
}

impl Ordering3 {
    fn reverse(self) -> Ordering3 {
        match self {
            Ordering3::Less => Ordering3::Greater,
            Ordering3::Greater => Ordering3::Less,
            other => other,
        }
    }
}

/// A signed value compared against an unsigned value: a negative signed
/// value is always less than any unsigned value (spec.md §3: "unsigned-vs-
/// negative-signed → greater" from the unsigned side).
fn mixed_signed_unsigned(signed: i64, unsigned: u64) -> Ordering3 {
    if signed < 0 {
        Ordering3::Less
    } else {
        cmp3(signed as u64 as i64, unsigned as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullptr_less_than_varptr() {
        let mut types = TypeTable::new();
        let mut vars = crate::variable::VariableTable::new();
        let i32_ = types.integer(true, Width::W32);
        let v = vars.declare(crate::variable::VariableKind::Local, i32_);
        let p = Value::VarPtr {
            variable: v,
            offset: 0,
        };
        assert_eq!(Value::NullPtr.compare(&p, 32), Ordering3::Less);
        assert_eq!(p.compare(&Value::NullPtr, 32), Ordering3::Greater);
    }

    #[test]
    fn unsigned_vs_negative_signed() {
        let neg = Value::int(true, Width::W32, -1);
        let big_unsigned = Value::int(false, Width::W32, 0xffff_fffe_u32 as i64);
        assert_eq!(neg.compare(&big_unsigned, 32), Ordering3::Less);
        assert_eq!(big_unsigned.compare(&neg, 32), Ordering3::Greater);
    }

    #[test]
    fn join_rule() {
        let a = Value::Bool(true);
        assert_eq!(Value::join(None, Some(a.clone())), Some(a.clone()));
        assert_eq!(
            Value::join(Some(a.clone()), Some(Value::Bool(false))),
            Some(Value::Varying)
        );
        assert_eq!(
            Value::join(Some(a.clone()), Some(a.clone())),
            Some(a.clone())
        );
        assert_eq!(
            Value::join(Some(Value::Varying), Some(a)),
            Some(Value::Varying)
        );
    }

    #[test]
    fn add_pointer_and_integer() {
        let mut types = TypeTable::new();
        let mut vars = crate::variable::VariableTable::new();
        let i32_ = types.integer(true, Width::W32);
        let v = vars.declare(crate::variable::VariableKind::Local, i32_);
        let p = Value::VarPtr {
            variable: v,
            offset: 4,
        };
        let three = Value::int(true, Width::W32, 3);
        match p.add(&three, 32).unwrap() {
            Value::VarPtr { offset, .. } => assert_eq!(offset, 7),
            _ => panic!("expected VarPtr"),
        }
    }

    #[test]
    fn type_cast_bool_to_int() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(false, Width::W32);
        let b = Value::Bool(true);
        match b.type_cast(i32_, &types, 32).unwrap() {
            Value::Int { bits, .. } => assert_eq!(bits, 1),
            _ => panic!("expected Int"),
        }
    }
}
