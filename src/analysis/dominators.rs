//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::analysis::ControlFlowGraph;
use smallvec::SmallVec;

/// Models the dominator tree for a control-flow graph. This analysis also
/// gives a postorder for the reachable blocks (as this is required for
/// calculating dominators, and is useful information for other passes to
/// have as well).
///
/// # Implementation
/// The algorithm used is described in "A Simple, Fast Dominance Algorithm"
/// by Cooper et. al.
///
/// The tree is stored as a flat idom table indexed by block number; the
/// "tree" structure comes from walking farther up, e.g. `idom(idom(b))`.
/// Blocks unreachable from the entry have no immediate dominator, exactly
/// like the entry block itself.
pub struct DominatorTree {
    idoms: Vec<Option<u32>>,
    postorder: Vec<u32>,
}

impl DominatorTree {
    /// Computes dominance information for a control-flow graph. The entry
    /// node is block 0.
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let po = compute_postorder(cfg);
        let idoms = compute_idoms(&po, cfg);

        Self {
            idoms,
            postorder: po,
        }
    }

    /// Gets the immediate dominator of `block`, if one exists. The entry
    /// block and any block unreachable from it have none.
    pub fn idom(&self, block: u32) -> Option<u32> {
        self.idoms[block as usize]
    }

    /// Checks if `possible_dominator` dominates `block`.
    ///
    /// This follows the dominance property directly, it returns true if
    /// `block` and `possible_dominator` are the same block.
    /// [`Self::strictly_dominates`] does not.
    pub fn dominates(&self, block: u32, possible_dominator: u32) -> bool {
        (block == possible_dominator) || self.strictly_dominates(block, possible_dominator)
    }

    /// Checks if `possible_dominator` strictly dominates `block`, i.e.
    /// dominates it and is not `block` itself.
    pub fn strictly_dominates(&self, block: u32, possible_dominator: u32) -> bool {
        let mut curr = block;

        while let Some(idom) = self.idom(curr) {
            if idom == possible_dominator {
                return true;
            }

            curr = idom;
        }

        false
    }

    /// Checks if a block is reachable from the entry node.
    pub fn is_reachable(&self, block: u32) -> bool {
        block == self.root() || self.idoms[block as usize].is_some()
    }

    /// Returns the root (entry) node of the CFG.
    pub fn root(&self) -> u32 {
        self.postorder
            .last()
            .copied()
            .expect("should have a root node")
    }

    /// Returns the reachable blocks in a valid postorder for the CFG.
    pub fn postorder(&self) -> &[u32] {
        &self.postorder
    }

    /// Returns an iterator over the reachable blocks in reverse postorder.
    pub fn reverse_postorder(&self) -> impl Iterator<Item = u32> + '_ {
        self.postorder.iter().copied().rev()
    }
}

/// The immediate-dominator tree viewed as a graph: each node's outgoing
/// edges are the blocks it immediately dominates.
///
/// This is the view the SSA renamer walks. It is derived from a
/// [`DominatorTree`]'s idom table, so the two views agree by construction.
pub struct DominatorGraph {
    children: Vec<SmallVec<[u32; 4]>>,
    roots: Vec<bool>,
}

impl DominatorGraph {
    /// Builds the child-edge view of `domtree` over `block_count` blocks.
    pub fn compute(domtree: &DominatorTree, block_count: usize) -> Self {
        let mut children = vec![SmallVec::new(); block_count];
        let mut roots = vec![false; block_count];

        for block in 0..block_count as u32 {
            match domtree.idom(block) {
                Some(idom) => children[idom as usize].push(block),
                None => roots[block as usize] = true,
            }
        }

        Self { children, roots }
    }

    /// The blocks whose immediate dominator is `block`.
    pub fn children(&self, block: u32) -> &[u32] {
        &self.children[block as usize]
    }

    /// Whether `block` is a root of the dominator tree, i.e. has no
    /// immediate dominator. The entry block is a root, and so is every
    /// block unreachable from it.
    pub fn is_root(&self, block: u32) -> bool {
        self.roots[block as usize]
    }
}

/// Models the dominance frontier information for a procedure.
///
/// The dominance frontier effectively models the "join points" of the
/// program, a block's dominance frontier is the set of nodes directly
/// outside of the region that the block dominates.
///
/// Formally, for a given basic block A, the dominance frontier is the set
/// of nodes B where A dominates a predecessor of B but does not strictly
/// dominate B itself.
///
/// Only reachable blocks get nonempty frontiers.
pub struct DominanceFrontier {
    frontiers: Vec<Vec<u32>>,
}

impl DominanceFrontier {
    /// Computes the dominance frontier of a control-flow graph.
    ///
    /// The algorithm used is the dominance frontier algorithm described in
    /// "A Simple, Fast Dominance Algorithm" by Cooper et. al.
    pub fn compute(cfg: &ControlFlowGraph, domtree: &DominatorTree) -> Self {
        let mut frontiers = vec![Vec::new(); cfg.len()];

        for &node in domtree.postorder() {
            let preds = cfg.predecessors(node);

            // a node only joins control flow when it has multiple
            // predecessors, and unreachable predecessors don't count
            if preds.len() < 2 {
                continue;
            }

            for &pred in preds.iter().filter(|p| domtree.is_reachable(**p)) {
                let mut runner = pred;

                while runner != domtree.idom(node).unwrap() {
                    let frontier = &mut frontiers[runner as usize];

                    // these arrays are almost always very small, a linear
                    // scan beats hashing here
                    if !frontier.contains(&node) {
                        frontier.push(node);
                    }

                    runner = domtree.idom(runner).unwrap();
                }
            }
        }

        Self { frontiers }
    }

    /// Gets the blocks in the dominance frontier of `block`.
    ///
    /// These are the blocks "one past the edge" of `block`'s range of
    /// dominance.
    pub fn frontier(&self, block: u32) -> &[u32] {
        &self.frontiers[block as usize]
    }
}

/// Directly computes a valid post-ordering of the blocks reachable from
/// the entry block (block 0).
pub fn compute_postorder(cfg: &ControlFlowGraph) -> Vec<u32> {
    let mut po = Vec::with_capacity(cfg.len());

    if cfg.is_empty() {
        return po;
    }

    let mut seen = vec![false; cfg.len()];

    // explicit stack of (block, next successor offset) frames, this is a
    // plain iterative DFS
    let mut stack: Vec<(u32, usize)> = vec![(0, 0)];
    seen[0] = true;

    while let Some(top) = stack.last_mut() {
        let (block, offset) = *top;

        top.1 += 1;

        match cfg.successors(block).get(offset).copied() {
            Some(next) => {
                if !seen[next as usize] {
                    seen[next as usize] = true;
                    stack.push((next, 0));
                }
            }
            None => {
                po.push(block);
                stack.pop();
            }
        }
    }

    po
}

fn intersect(po_numbers: &[usize], idoms: &[Option<u32>], bb1: u32, bb2: u32) -> u32 {
    let mut f1 = bb1;
    let mut f2 = bb2;

    while f1 != f2 {
        let f2v = po_numbers[f2 as usize];

        while po_numbers[f1 as usize] < f2v {
            f1 = idoms[f1 as usize].unwrap();
        }

        let f1v = po_numbers[f1 as usize];

        while po_numbers[f2 as usize] < f1v {
            f2 = idoms[f2 as usize].unwrap();
        }
    }

    f1
}

//
// this implements the dominator algorithm described in "A Simple, Fast
// Dominance Algorithm" by Cooper et. al. See the paper:
// http://www.hipersoft.rice.edu/grads/publications/dom14.pdf.
//
fn compute_idoms(po: &[u32], cfg: &ControlFlowGraph) -> Vec<Option<u32>> {
    let mut idoms: Vec<Option<u32>> = vec![None; cfg.len()];

    if po.is_empty() {
        return idoms;
    }

    // map block -> postorder number. unreachable blocks keep usize::MAX,
    // they are skipped entirely by the loop below
    let mut po_numbers = vec![usize::MAX; cfg.len()];

    for (i, bb) in po.iter().copied().enumerate() {
        po_numbers[bb as usize] = i;
    }

    let root = *po.last().unwrap();
    let mut changed = true;

    // for the purposes of the algorithm, the entry node is its own idom
    idoms[root as usize] = Some(root);

    while changed {
        changed = false;

        // root has no predecessors worth processing, skip it
        for block in po.iter().rev().copied().skip(1) {
            // start by getting every processed predecessor. there will
            // always be at least one when iterating in reverse postorder,
            // since the root was processed at the beginning
            let mut preds = cfg
                .predecessors(block)
                .iter()
                .copied()
                .filter(|p| idoms[*p as usize].is_some());

            let mut idom = preds
                .next()
                .expect("every block should have at least one processed predecessor when in reverse postorder");

            for pred in preds {
                idom = intersect(&po_numbers, &idoms, pred, idom);
            }

            if idoms[block as usize] != Some(idom) {
                idoms[block as usize] = Some(idom);
                changed = true;
            }
        }
    }

    // remove the root -> root relationship, the root has no idom
    idoms[root as usize] = None;

    idoms
}
