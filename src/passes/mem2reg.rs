//! Mem2Reg: promotes `alloca`d locals that never escape into SSA values
//! plus inserted φs (spec.md §4.3, C5).

use std::collections::{HashMap, HashSet};

use crate::ir::ssa::entities::{Block, Node};
use crate::ir::ssa::function::SsaFunction;
use crate::ir::ssa::node::NodeKind;
use crate::result::CodegenResult;
use crate::types::TypeTable;
use crate::variable::Variable;

struct Candidate {
    alloca_node: Node,
    variable: Variable,
    refs: Vec<(Block, usize, Node)>, // (block, position in block.nodes, the Load/Store node)
}

/// Find every `alloca` whose only uses are as the `addr` operand of a
/// `Load` or `Store` (spec.md §4.3: "the address-of node flows only into
/// load/store address operands; never into any other instruction").
fn find_promotable(func: &SsaFunction) -> Vec<Candidate> {
    let mut by_alloca: HashMap<Node, Candidate> = HashMap::new();
    let mut disqualified: HashSet<Node> = HashSet::new();

    for &b in func.blocks() {
        for &n in &func.block(b).nodes {
            if let NodeKind::Alloca { variable, .. } = func.arena().kind(n) {
                by_alloca.entry(n).or_insert_with(|| Candidate {
                    alloca_node: n,
                    variable: *variable,
                    refs: Vec::new(),
                });
            }
        }
    }

    for &b in func.blocks() {
        for (pos, &n) in func.block(b).nodes.clone().iter().enumerate() {
            let kind = func.arena().kind(n).clone();
            match kind {
                NodeKind::Load { addr, .. } => {
                    if by_alloca.contains_key(&addr) {
                        by_alloca.get_mut(&addr).unwrap().refs.push((b, pos, n));
                    }
                }
                NodeKind::Store { addr, .. } => {
                    if by_alloca.contains_key(&addr) {
                        by_alloca.get_mut(&addr).unwrap().refs.push((b, pos, n));
                    }
                }
                _ => {
                    for input in func.arena().kind(n).inputs() {
                        if by_alloca.contains_key(&input) {
                            disqualified.insert(input);
                        }
                    }
                }
            }
            // A Store's *value* operand referencing an alloca also disqualifies it
            // (storing the address itself somewhere, not through it).
            if let NodeKind::Store { value, .. } = func.arena().kind(n) {
                if by_alloca.contains_key(value) {
                    disqualified.insert(*value);
                }
            }
        }
    }

    by_alloca
        .into_iter()
        .filter(|(k, _)| !disqualified.contains(k))
        .map(|(_, v)| v)
        .collect()
}

/// Promote every promotable local to SSA form. Returns the number of
/// variables promoted (used by the pipeline's fixed-point loop as a
/// "did anything change" signal alongside SCCP).
pub fn run(func: &mut SsaFunction, types: &mut TypeTable) -> CodegenResult<usize> {
    let mut promoted = 0;
    loop {
        let candidates = find_promotable(func);
        if candidates.is_empty() {
            break;
        }
        for c in candidates {
            promote_one(func, types, &c)?;
            promoted += 1;
        }
    }
    Ok(promoted)
}

fn promote_one(
    func: &mut SsaFunction,
    types: &mut TypeTable,
    c: &Candidate,
) -> CodegenResult<()> {
    let value_ty = {
        let alloca_ty = func
            .arena()
            .result_type(c.alloca_node)
            .expect("alloca always has a result type");
        types.dereference(alloca_ty)
    };

    // "First reference per block" classification: candidate(b) iff the
    // first ref in program order is a Load. `c.refs` is already in program
    // order (blocks in function order, positions ascending within a block),
    // so the first `or_insert` per block wins.
    let mut first_kind: HashMap<Block, bool /* is_load */> = HashMap::new();
    for &(b, _pos, n) in &c.refs {
        let is_load = matches!(func.arena().kind(n), NodeKind::Load { .. });
        first_kind.entry(b).or_insert(is_load);
    }
    let candidate_block = |b: Block| -> bool { first_kind.get(&b).copied().unwrap_or(false) };
    let transparent = |b: Block| -> bool {
        match first_kind.get(&b) {
            Some(&is_load) => is_load,
            None => true, // no reference at all
        }
    };

    let all_blocks: Vec<Block> = func.blocks().to_vec();
    let mut live_in: HashMap<Block, bool> = all_blocks.iter().map(|&b| (b, false)).collect();
    let mut live_out: HashMap<Block, bool> = all_blocks.iter().map(|&b| (b, false)).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for &b in &all_blocks {
            let new_out = func
                .block(b)
                .successors
                .iter()
                .any(|s| live_in[s]);
            if new_out != live_out[&b] {
                live_out.insert(b, new_out);
                changed = true;
            }
            let new_in = candidate_block(b) || (transparent(b) && live_out[&b]);
            if new_in != live_in[&b] {
                live_in.insert(b, new_in);
                changed = true;
            }
        }
    }

    if let Some(entry) = func.entry {
        if live_in[&entry] {
            // Reading uninitialized memory on entry: not promotable, leave
            // the alloca/loads/stores untouched.
            return Ok(());
        }
    }

    let live_in_blocks: Vec<Block> = all_blocks.iter().copied().filter(|b| live_in[b]).collect();

    let mut phis: HashMap<Block, Node> = HashMap::new();
    for &b in &live_in_blocks {
        let phi = func.append_phi(
            b,
            NodeKind::Phi {
                ty: value_ty,
                spill: Some(c.variable),
                inputs: Vec::new(),
            },
            value_ty,
        );
        phis.insert(b, phi);
    }

    let mut exit_value: HashMap<Block, Option<Node>> = HashMap::new();
    let mut to_delete: Vec<(Block, Node)> = vec![(func_block_of(func, c.alloca_node), c.alloca_node)];

    rename_block(func, func.entry.unwrap(), None, &phis, c, &mut exit_value, &mut to_delete);

    for &b in &live_in_blocks {
        let phi = phis[&b];
        let preds = func.block(b).predecessors.clone();
        let mut inputs = Vec::new();
        for p in preds {
            if let Some(Some(v)) = exit_value.get(&p).copied() {
                inputs.push((p, v));
            }
        }
        if let NodeKind::Phi { inputs: slot, .. } = func.arena_mut().kind_mut(phi) {
            *slot = inputs;
        }
    }

    for (b, n) in to_delete {
        func.remove_node(b, n);
    }

    Ok(())
}

fn func_block_of(func: &SsaFunction, alloca: Node) -> Block {
    for &b in func.blocks() {
        if func.block(b).nodes.contains(&alloca) {
            return b;
        }
    }
    func.entry.expect("function with an alloca has an entry block")
}

fn rename_block(
    func: &mut SsaFunction,
    block: Block,
    incoming: Option<Node>,
    phis: &HashMap<Block, Node>,
    c: &Candidate,
    exit_value: &mut HashMap<Block, Option<Node>>,
    to_delete: &mut Vec<(Block, Node)>,
) {
    if exit_value.contains_key(&block) {
        return;
    }
    let mut current = phis.get(&block).copied().or(incoming);

    let nodes = func.block(block).nodes.clone();
    for n in nodes {
        match func.arena().kind(n).clone() {
            NodeKind::Load { addr, .. } if addr == c.alloca_node => {
                if let Some(cur) = current {
                    func.replace_all_uses(n, cur);
                }
                to_delete.push((block, n));
            }
            NodeKind::Store { addr, value } if addr == c.alloca_node => {
                current = Some(value);
                to_delete.push((block, n));
            }
            _ => {}
        }
    }

    exit_value.insert(block, current);

    let children: Vec<Block> = func
        .blocks()
        .iter()
        .copied()
        .filter(|&b| func.block(b).idom == Some(block))
        .collect();
    for child in children {
        rename_block(func, child, current, phis, c, exit_value, to_delete);
    }
}
