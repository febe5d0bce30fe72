//! SSA node variants (spec.md §3 "SSA node", design note §9: "tagged
//! variants with exhaustive pattern matching" rather than a visitor
//! hierarchy).

use smallvec::SmallVec;

use crate::entity::EntityRef;
use crate::ir::ssa::entities::{Block, Node};
use crate::types::{Type, TypeTable};
use crate::value::Value;
use crate::variable::Variable;

/// A three-way comparison operator (spec.md §4.7 picks a condition code from
/// this set at lowering time).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Evaluate this operator given a three-way `Ordering3`.
    pub fn apply(self, ord: crate::value::Ordering3) -> Option<bool> {
        use crate::value::Ordering3::*;
        match (self, ord) {
            (_, Unknown) => None,
            (CompareOp::Eq, Equal) => Some(true),
            (CompareOp::Eq, _) => Some(false),
            (CompareOp::Ne, Equal) => Some(false),
            (CompareOp::Ne, _) => Some(true),
            (CompareOp::Lt, Less) => Some(true),
            (CompareOp::Lt, _) => Some(false),
            (CompareOp::Le, Greater) => Some(false),
            (CompareOp::Le, _) => Some(true),
            (CompareOp::Gt, Greater) => Some(true),
            (CompareOp::Gt, _) => Some(false),
            (CompareOp::Ge, Less) => Some(false),
            (CompareOp::Ge, _) => Some(true),
        }
    }
}

/// One SSA instruction. Every variant that produces a value has a `ty`
/// field; `Store`, `Jump`, and `ConditionalJump` produce no value.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Merges a value per predecessor. `inputs[i] = (pred_block, value)`;
    /// spec.md §3 invariant 1: a permutation of the block's predecessors.
    Phi {
        /// The φ's result type.
        ty: Type,
        /// If this φ is the promoted value of a local, that variable
        /// (spec.md §4.3 step 4: "spillLocation = v").
        spill: Option<Variable>,
        /// One `(predecessor, value)` pair per predecessor edge.
        inputs: Vec<(Block, Node)>,
    },
    /// A compile-time-known value.
    Constant {
        /// The constant's type.
        ty: Type,
        /// Its value.
        value: Value,
    },
    /// Copies `input`.
    Move {
        /// Result (and input) type.
        ty: Type,
        /// Copied value.
        input: Node,
    },
    /// Reads `*addr`. Side-effecting (and thus kept live by DCE even if
    /// unused) when `addr`'s pointee type is volatile (spec.md §8 S3).
    Load {
        /// Loaded type.
        ty: Type,
        /// Pointer being read.
        addr: Node,
    },
    /// Writes `value` to `*addr`. Always side-effecting.
    Store {
        /// Pointer being written.
        addr: Node,
        /// Value stored.
        value: Node,
    },
    /// `lhs op rhs`, producing `Bool`.
    Compare {
        /// The comparison operator.
        op: CompareOp,
        /// Left operand.
        lhs: Node,
        /// Right operand.
        rhs: Node,
        /// The operands' common type (drives signedness at lowering,
        /// spec.md §4.7).
        operand_ty: Type,
    },
    /// Reserves a stack slot for `variable` and produces its address.
    Alloca {
        /// Pointer-to-`variable`'s-type result type.
        ty: Type,
        /// The reserved local.
        variable: Variable,
    },
    /// Reinterprets `input` as `ty`.
    TypeCast {
        /// Destination type.
        ty: Type,
        /// Source value.
        input: Node,
    },
    /// `lhs + rhs` (spec.md §4.7: pointer+integer or integer+integer).
    Add {
        /// Result type.
        ty: Type,
        /// Left operand.
        lhs: Node,
        /// Right operand.
        rhs: Node,
    },
    /// Unconditional control transfer.
    Jump {
        /// Destination block.
        target: Block,
    },
    /// Two-way control transfer on `cond`.
    ConditionalJump {
        /// The condition, of type `Bool`.
        cond: Node,
        /// Taken when `cond` is true.
        if_true: Block,
        /// Taken when `cond` is false.
        if_false: Block,
    },
}

impl NodeKind {
    /// The type of the value this node produces, or `None` for nodes with no
    /// result (`Store`, `Jump`, `ConditionalJump`) or whose type isn't
    /// stored inline (`Compare`, always `Bool` — the owning `SsaFunction`
    /// caches that alongside the node instead of interning a fresh `Bool`
    /// handle on every query).
    pub fn result_type(&self) -> Option<Type> {
        match self {
            NodeKind::Phi { ty, .. }
            | NodeKind::Constant { ty, .. }
            | NodeKind::Move { ty, .. }
            | NodeKind::Load { ty, .. }
            | NodeKind::Alloca { ty, .. }
            | NodeKind::TypeCast { ty, .. }
            | NodeKind::Add { ty, .. } => Some(*ty),
            NodeKind::Compare { .. }
            | NodeKind::Store { .. }
            | NodeKind::Jump { .. }
            | NodeKind::ConditionalJump { .. } => None,
        }
    }

    /// True if this node is a control-flow terminator.
    pub fn is_terminator(&self) -> bool {
        matches!(self, NodeKind::Jump { .. } | NodeKind::ConditionalJump { .. })
    }

    /// True if removing this node (when its result is unused) would change
    /// program behavior: `Store` always; `Load` only of a volatile pointee;
    /// terminators always (they are kept live by the DCE worklist directly,
    /// not queried here, but report `true` for completeness/documentation).
    pub fn has_side_effects(&self, types: &TypeTable) -> bool {
        match self {
            NodeKind::Store { .. } => true,
            NodeKind::Load { ty, .. } => types.is_volatile(*ty),
            NodeKind::Jump { .. } | NodeKind::ConditionalJump { .. } => true,
            _ => false,
        }
    }

    /// Every node this one directly references, in a stable order (used for
    /// DCE worklist seeding and for generic input iteration).
    pub fn inputs(&self) -> SmallVec<[Node; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeKind::Phi { inputs, .. } => {
                for &(_, n) in inputs {
                    out.push(n);
                }
            }
            NodeKind::Constant { .. } | NodeKind::Alloca { .. } => {}
            NodeKind::Move { input, .. } | NodeKind::TypeCast { input, .. } => out.push(*input),
            NodeKind::Load { addr, .. } => out.push(*addr),
            NodeKind::Store { addr, value } => {
                out.push(*addr);
                out.push(*value);
            }
            NodeKind::Compare { lhs, rhs, .. } | NodeKind::Add { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            NodeKind::Jump { .. } => {}
            NodeKind::ConditionalJump { cond, .. } => out.push(*cond),
        }
        out
    }

    /// Apply `replace` to every input reference, recursively (a map entry
    /// `old -> (new, reusable)` rewrites `old` wherever it is referenced;
    /// `reusable` is not consulted here — it only tells a caller doing
    /// in-place node removal whether the old node can be dropped outright
    /// or must be preserved for its side effects).
    pub fn replace_inputs(
        &mut self,
        replace: &std::collections::HashMap<Node, (Node, bool)>,
    ) {
        let map = |n: &mut Node| {
            if let Some(&(new, _)) = replace.get(n) {
                *n = new;
            }
        };
        match self {
            NodeKind::Phi { inputs, .. } => {
                for (_, n) in inputs.iter_mut() {
                    map(n);
                }
            }
            NodeKind::Constant { .. } | NodeKind::Alloca { .. } | NodeKind::Jump { .. } => {}
            NodeKind::Move { input, .. } | NodeKind::TypeCast { input, .. } => map(input),
            NodeKind::Load { addr, .. } => map(addr),
            NodeKind::Store { addr, value } => {
                map(addr);
                map(value);
            }
            NodeKind::Compare { lhs, rhs, .. } | NodeKind::Add { lhs, rhs, .. } => {
                map(lhs);
                map(rhs);
            }
            NodeKind::ConditionalJump { cond, .. } => map(cond),
        }
    }

    /// Evaluate this node's lattice value for SCCP (spec.md §4.4), given a
    /// lookup returning the current lattice cell of any input (`None` = ⊤
    /// unknown, `Some(Varying)` = ⊥, `Some(v)` = constant). Must not be
    /// called for `Phi` (whose join depends on CFG reachability, handled by
    /// the pass itself) or for nodes with no result.
    pub fn evaluate_for_constants(
        &self,
        lookup: &dyn Fn(Node) -> Option<Value>,
        types: &TypeTable,
        target_width: u32,
    ) -> Option<Value> {
        match self {
            NodeKind::Phi { .. } => {
                panic!("Phi is evaluated by the SCCP pass directly, not via evaluate_for_constants")
            }
            NodeKind::Constant { value, .. } => Some(value.clone()),
            NodeKind::Alloca { .. } => None, // an alloca's address is not a compile-time constant by itself.
            NodeKind::Move { ty, input } => lookup(*input).map(|v| coerce_identity(v, *ty, types)),
            NodeKind::Load { ty, addr } => {
                if types.is_volatile(*ty) {
                    return Some(Value::Varying);
                }
                // Loads are never folded from an address's constant value in
                // this design: memory content is unknown to SCCP regardless
                // of whether the address is constant (only mem2reg, which
                // runs before SCCP, turns a promotable local's loads into
                // direct references to the defining value).
                let _ = addr;
                Some(Value::Varying)
            }
            NodeKind::Store { .. } => None,
            NodeKind::Compare {
                op,
                lhs,
                rhs,
                operand_ty,
            } => {
                let l = lookup(*lhs)?;
                let r = lookup(*rhs)?;
                if l == Value::Varying || r == Value::Varying {
                    return Some(Value::Varying);
                }
                let _ = operand_ty;
                match op.apply(l.compare(&r, target_width)) {
                    Some(b) => Some(Value::Bool(b)),
                    None => Some(Value::Varying),
                }
            }
            NodeKind::TypeCast { ty, input } => {
                let v = lookup(*input)?;
                if v == Value::Varying {
                    return Some(Value::Varying);
                }
                Some(v.type_cast(*ty, types, target_width).unwrap_or(Value::Varying))
            }
            NodeKind::Add { lhs, rhs, .. } => {
                let l = lookup(*lhs)?;
                let r = lookup(*rhs)?;
                if l == Value::Varying || r == Value::Varying {
                    return Some(Value::Varying);
                }
                Some(l.add(&r, target_width).unwrap_or(Value::Varying))
            }
            NodeKind::Jump { .. } | NodeKind::ConditionalJump { .. } => None,
        }
    }
}

fn coerce_identity(v: Value, _ty: Type, _types: &TypeTable) -> Value {
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Width;

    #[test]
    fn add_two_constants_folds() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let one = Value::int(true, Width::W32, 1);
        let two = Value::int(true, Width::W32, 2);
        let lookup = |n: Node| -> Option<Value> {
            if n.index() == 0 {
                Some(one.clone())
            } else {
                Some(two.clone())
            }
        };
        let node = NodeKind::Add {
            ty: i32_,
            lhs: Node::new(0),
            rhs: Node::new(1),
        };
        let result = node.evaluate_for_constants(&lookup, &types, 32);
        assert_eq!(result, Some(Value::int(true, Width::W32, 3)));
    }

    #[test]
    fn volatile_load_is_never_constant() {
        let mut types = TypeTable::new();
        let i32_ = types.integer(true, Width::W32);
        let vol = types.volatile(i32_);
        let node = NodeKind::Load {
            ty: vol,
            addr: Node::new(0),
        };
        let lookup = |_: Node| -> Option<Value> { Some(Value::int(true, Width::W32, 5)) };
        assert_eq!(
            node.evaluate_for_constants(&lookup, &types, 32),
            Some(Value::Varying)
        );
        assert!(node.has_side_effects(&types));
    }
}
