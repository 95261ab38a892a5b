//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022 Evan Cox <evanacox00@gmail.com>. All rights reserved.      //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::Procedure;
use smallvec::SmallVec;

#[derive(Default)]
struct FlowNode {
    predecessors: SmallVec<[u32; 4]>,
    successors: SmallVec<[u32; 4]>,
}

/// Models successor/predecessor information about the control-flow graph of
/// a procedure.
///
/// Nodes are the procedure's block indices. Edges come from terminator
/// targets *and* from every protected block to its handlers: an exception
/// transfer is a real control transfer, and passes that walk predecessors
/// (φ placement in particular) must see it.
pub struct ControlFlowGraph {
    nodes: Vec<FlowNode>,
}

impl ControlFlowGraph {
    /// Directly computes flowgraph information for a procedure.
    pub fn compute(proc: &Procedure) -> Self {
        let mut nodes = Vec::with_capacity(proc.block_count());

        nodes.resize_with(proc.block_count(), FlowNode::default);

        let mut cfg = Self { nodes };

        for block in proc.block_indices() {
            for successor in proc.block(block).successors() {
                cfg.add_edge(block as u32, successor);
            }
        }

        for node in cfg.nodes.iter_mut() {
            node.predecessors.sort_unstable();
            node.predecessors.dedup();
            node.successors.sort_unstable();
            node.successors.dedup();
        }

        cfg
    }

    /// The number of nodes (= blocks) in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has any nodes at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The blocks with an edge into `block`.
    pub fn predecessors(&self, block: u32) -> &[u32] {
        &self.nodes[block as usize].predecessors
    }

    /// The blocks with an edge out of `block`.
    pub fn successors(&self, block: u32) -> &[u32] {
        &self.nodes[block as usize].successors
    }

    fn add_edge(&mut self, from: u32, to: u32) {
        self.nodes[from as usize].successors.push(to);
        self.nodes[to as usize].predecessors.push(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    #[test]
    fn no_blocks() {
        let proc = Procedure::new();

        // shouldn't panic
        let cfg = ControlFlowGraph::compute(&proc);

        assert_eq!(cfg.len(), 0);
    }

    #[test]
    fn merge() {
        let mut proc = Procedure::new();
        let cond = proc.create_variable();

        //
        // @0: if cond then @1 else @2
        // @1: jump @3
        // @2: jump @3
        // @3: return
        //
        for _ in 0..4 {
            proc.create_block();
        }

        proc.block_mut(0).instructions.push(Instruction::Branching {
            condition: BranchingCondition::NotEqual,
            operand: cond,
            consequent: 1,
            alternative: 2,
        });
        proc.block_mut(1)
            .instructions
            .push(Instruction::Jump { target: 3 });
        proc.block_mut(2)
            .instructions
            .push(Instruction::Jump { target: 3 });
        proc.block_mut(3)
            .instructions
            .push(Instruction::Exit { value: None });

        let cfg = ControlFlowGraph::compute(&proc);

        assert_eq!(cfg.predecessors(0), &[]);
        assert_eq!(cfg.successors(0), &[1, 2]);
        assert_eq!(cfg.predecessors(3), &[1, 2]);
        assert_eq!(cfg.successors(3), &[]);
    }

    #[test]
    fn exception_edges_are_cfg_edges() {
        let mut proc = Procedure::new();
        let exc = proc.create_variable();

        //
        // @0: protected by a try/catch with handler @1, returns
        // @1: catch block, returns
        //
        proc.create_block();
        proc.create_block();

        proc.block_mut(0).try_catches.push(TryCatchBlock::new(1));
        proc.block_mut(0)
            .instructions
            .push(Instruction::Exit { value: None });
        proc.block_mut(1).exception_variable = Some(exc);
        proc.block_mut(1)
            .instructions
            .push(Instruction::Exit { value: None });

        let cfg = ControlFlowGraph::compute(&proc);

        assert_eq!(cfg.successors(0), &[1]);
        assert_eq!(cfg.predecessors(1), &[0]);
    }

    #[test]
    fn self_loop() {
        let mut proc = Procedure::new();

        proc.create_block();
        proc.block_mut(0)
            .instructions
            .push(Instruction::Jump { target: 0 });

        let cfg = ControlFlowGraph::compute(&proc);

        assert_eq!(cfg.predecessors(0), &[0]);
        assert_eq!(cfg.successors(0), &[0]);
    }

    #[test]
    fn switch_targets_deduplicated() {
        let mut proc = Procedure::new();
        let cond = proc.create_variable();

        proc.create_block();
        proc.create_block();

        proc.block_mut(0).instructions.push(Instruction::Switch {
            condition: cond,
            table: vec![
                SwitchTableEntry {
                    condition: 0,
                    target: 1,
                },
                SwitchTableEntry {
                    condition: 1,
                    target: 1,
                },
            ],
            default_target: 1,
        });

        let cfg = ControlFlowGraph::compute(&proc);

        assert_eq!(cfg.successors(0), &[1]);
        assert_eq!(cfg.predecessors(1), &[0]);
    }
}
