//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::analysis::{ControlFlowGraph, DominanceFrontier, DominatorGraph, DominatorTree};
use crate::ir::{Incoming, OperandKind, Phi, Procedure, Variable};
use crate::utility::GaHashMap;
use smallvec::SmallVec;

/// Rewrites a procedure into SSA form.
///
/// After [`SsaRewriter::rewrite`] runs, every variable of the procedure has
/// exactly one definition site: redefinitions get fresh variables, every use
/// is rewired to the definition reaching it, φ-functions are synthesized at
/// the iterated dominance frontiers of the definition sites, and try/catch
/// joints collect the variable versions that can be live when an exception
/// transfers control to a handler.
///
/// The rewriter is reusable; all working state is reinitialized per call.
/// Nothing outside the procedure (and its variable table) is mutated.
///
/// # Expectations
/// The input must be well-formed: on every path, a variable is defined
/// before it is used. A use with no reaching definition is a bug in the
/// caller and trips an assertion, there is no recoverable error.
#[derive(Default)]
pub struct SsaRewriter {
    // current[v] for the original variable index v, along the path the
    // renamer is currently on. copied on every task push so sibling
    // dominator subtrees can't contaminate each other
    variable_map: Vec<Option<Variable>>,
    // whether an original variable index has been handed out as a receiver
    // already. the first definition of an index keeps the original name
    used_definitions: Vec<bool>,
    // φs synthesized by placement, per block, kept out of the real φ lists
    // until the renamer finishes
    synthesized: Vec<Vec<Phi>>,
    // per block: original variable index -> position in `synthesized`,
    // the deduplication table of the placement worklist
    phi_positions: Vec<GaHashMap<u32, usize>>,
    // per block: position in `synthesized` -> original variable index, so
    // predecessors can fill incomings without inspecting renamed receivers
    phi_originals: Vec<Vec<u32>>,
    // handler block -> protected block -> original joint receiver index ->
    // (try/catch position, joint position) on the protected block
    joint_map: Vec<GaHashMap<u32, GaHashMap<u32, (usize, usize)>>>,
    current_block: u32,
}

// a unit of renaming work. the map snapshot travels with the task, so a
// popped task sees exactly the reaching definitions of its dominator path
enum Task {
    // visit one dominator-tree node
    Block {
        block: u32,
        variables: Vec<Option<Variable>>,
    },
    // process the joints of one try/catch; carries the protected block's
    // outgoing map, which the joint receivers then overlay before the
    // handler's subtree is descended into
    TryCatch {
        protected: u32,
        try_catch: usize,
        variables: Vec<Option<Variable>>,
    },
}

impl SsaRewriter {
    /// Creates a rewriter. Equivalent to `SsaRewriter::default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites `proc` into SSA form, in place.
    ///
    /// `arguments` binds the procedure's formal parameters: `arguments[i]`
    /// must be the variable with index `i`. Parameters are already in SSA
    /// form (defined once, on entry), so they keep their names.
    ///
    /// A procedure with zero blocks is left untouched.
    pub fn rewrite(&mut self, proc: &mut Procedure, arguments: &[Variable]) {
        if proc.block_count() == 0 {
            return;
        }

        let cfg = ControlFlowGraph::compute(proc);
        let domtree = DominatorTree::compute(&cfg);
        let domgraph = DominatorGraph::compute(&domtree, proc.block_count());
        let df = DominanceFrontier::compute(&cfg, &domtree);

        self.variable_map = vec![None; proc.variable_count()];
        self.used_definitions = vec![false; proc.variable_count()];
        self.synthesized = vec![Vec::new(); proc.block_count()];
        self.phi_positions = vec![GaHashMap::default(); proc.block_count()];
        self.phi_originals = vec![Vec::new(); proc.block_count()];
        self.joint_map = vec![GaHashMap::default(); proc.block_count()];
        self.current_block = 0;

        for (index, arg) in arguments.iter().enumerate() {
            debug_assert_eq!(
                arg.index(),
                index,
                "arguments must be the first variables of the procedure"
            );

            self.variable_map[arg.index()] = Some(*arg);
            self.used_definitions[arg.index()] = true;
        }

        // a handler's entry is the unique definition site of its exception
        // variable. reserving the name here means any instruction that also
        // assigns the same index gets a fresh variable instead
        for block in proc.block_indices() {
            if let Some(var) = proc.block(block).exception_variable {
                self.used_definitions[var.index()] = true;
            }
        }

        self.estimate_phis(proc, &df);
        self.rename_variables(proc, &cfg, &domtree, &domgraph);
    }

    //
    // placement: find every assignment and synthesize empty φs at the
    // iterated dominance frontier of its block
    //

    fn estimate_phis(&mut self, proc: &Procedure, df: &DominanceFrontier) {
        for index in proc.block_indices() {
            self.current_block = index as u32;

            let block = proc.block(index);

            if let Some(var) = block.exception_variable {
                self.mark_assignment(proc, df, var);
            }

            for phi in &block.phis {
                self.mark_assignment(proc, df, phi.receiver);
            }

            for insn in &block.instructions {
                if let Some(var) = insn.receiver() {
                    self.mark_assignment(proc, df, var);
                }
            }

            for try_catch in &block.try_catches {
                for joint in &try_catch.joints {
                    self.mark_assignment(proc, df, joint.receiver);
                }
            }
        }
    }

    fn mark_assignment(&mut self, proc: &Procedure, df: &DominanceFrontier, var: Variable) {
        let mut worklist: Vec<u32> = vec![self.current_block];

        while let Some(block) = worklist.pop() {
            for &frontier in df.frontier(block) {
                // a pre-existing φ already carrying this exact incoming
                // means the merge is present, don't synthesize another
                let exists = proc.block(frontier as usize).phis.iter().any(|phi| {
                    phi.incomings
                        .iter()
                        .any(|inc| inc.source == block && inc.value == var)
                });

                if exists {
                    continue;
                }

                let positions = &mut self.phi_positions[frontier as usize];

                if !positions.contains_key(&(var.index() as u32)) {
                    positions.insert(var.index() as u32, self.synthesized[frontier as usize].len());
                    self.phi_originals[frontier as usize].push(var.index() as u32);
                    self.synthesized[frontier as usize].push(Phi::new(var));
                    worklist.push(frontier);
                }
            }
        }
    }

    //
    // renaming: a preorder walk of the dominator tree with a per-path
    // current-version map, driven by an explicit task stack
    //

    fn rename_variables(
        &mut self,
        proc: &mut Procedure,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
        domgraph: &DominatorGraph,
    ) {
        let mut stack: Vec<Task> = Vec::new();

        for block in 0..proc.block_count() as u32 {
            if domgraph.is_root(block) {
                stack.push(Task::Block {
                    block,
                    variables: self.variable_map.clone(),
                });
            }
        }

        // incomings of pre-existing φs, grouped by source block; each is
        // rewritten exactly once, at its source block's visit
        let mut phi_outputs: Vec<Vec<(u32, usize, usize)>> = vec![Vec::new(); proc.block_count()];

        for block in proc.block_indices() {
            for (position, phi) in proc.block(block).phis.iter().enumerate() {
                for (i, incoming) in phi.incomings.iter().enumerate() {
                    phi_outputs[incoming.source as usize].push((block as u32, position, i));
                }
            }
        }

        while let Some(task) = stack.pop() {
            match task {
                Task::Block { block, variables } => {
                    self.process_block(proc, cfg, domtree, domgraph, block, variables, &phi_outputs, &mut stack)
                }
                Task::TryCatch {
                    protected,
                    try_catch,
                    variables,
                } => self.process_try_catch(proc, domtree, protected, try_catch, variables, &mut stack),
            }
        }

        // φs that never collected an incoming represent merges no
        // definition reaches; drop them, append the rest for real
        for block in proc.block_indices() {
            for phi in self.synthesized[block].drain(..) {
                if !phi.incomings.is_empty() {
                    proc.block_mut(block).phis.push(phi);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_block(
        &mut self,
        proc: &mut Procedure,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
        domgraph: &DominatorGraph,
        block: u32,
        variables: Vec<Option<Variable>>,
        phi_outputs: &[Vec<(u32, usize, usize)>],
        stack: &mut Vec<Task>,
    ) {
        self.current_block = block;
        self.variable_map = variables;

        let index = block as usize;

        // the exception variable is defined by the handler's entry itself;
        // seed it so uses inside the handler resolve, without renaming it
        if let Some(var) = proc.block(index).exception_variable {
            self.variable_map[var.index()] = Some(var);
        }

        self.register_joints(proc, domtree, block);

        // synthesized φs define their variable at the head of this block.
        // the receiver is always a brand-new variable, placement reused the
        // original name only as a marker
        for position in 0..self.synthesized[index].len() {
            let original = self.synthesized[index][position].receiver;
            let fresh = proc.create_variable();

            proc.merge_debug_names(fresh, original);
            self.propagate_to_joints(proc, original, fresh, None);
            self.variable_map[original.index()] = Some(fresh);
            self.synthesized[index][position].receiver = fresh;
        }

        // pre-existing φs are renamed in place
        let mut phis = std::mem::take(&mut proc.block_mut(index).phis);

        for phi in phis.iter_mut() {
            phi.receiver = self.define(proc, phi.receiver);
        }

        proc.block_mut(index).phis = phis;

        // the body: uses take the current version, receivers fresh ones
        let mut instructions = std::mem::take(&mut proc.block_mut(index).instructions);

        for insn in instructions.iter_mut() {
            insn.visit_operands(|kind, var| match kind {
                OperandKind::Use => *var = self.use_variable(*var),
                OperandKind::Def => *var = self.define(proc, *var),
            });
        }

        proc.block_mut(index).instructions = instructions;

        // incomings of pre-existing φs sourced here take the version live
        // at the end of this block
        for &(target, position, i) in &phi_outputs[index] {
            let value = proc.block(target as usize).phis[position].incomings[i].value;
            let mapped = self.use_variable(value);

            proc.block_mut(target as usize).phis[position].incomings[i].value = mapped;
        }

        // this block is a real predecessor of every CFG successor
        // (exception edges included), so it contributes an incoming to
        // each successor's synthesized φs
        for &successor in cfg.successors(block) {
            self.rename_outgoing_phis(proc, successor);
        }

        // handlers this block dominates are descended into through their
        // try-catch task, everything else is a plain child visit
        let mut handlers: SmallVec<[u32; 2]> = SmallVec::new();

        for try_catch in 0..proc.block(index).try_catches.len() {
            let handler = proc.block(index).try_catches[try_catch].handler;

            if !handlers.contains(&handler) {
                stack.push(Task::TryCatch {
                    protected: block,
                    try_catch,
                    variables: self.variable_map.clone(),
                });
            }

            handlers.push(handler);
        }

        for &child in domgraph.children(block) {
            if !handlers.contains(&child) {
                stack.push(Task::Block {
                    block: child,
                    variables: self.variable_map.clone(),
                });
            }
        }
    }

    // makes the joints of `block`'s try/catches reachable from
    // `propagate_to_joints`, and rewrites their declared source lists to
    // the versions reaching this block. only try/catches whose protected
    // block strictly dominates the handler participate: any other merge
    // into a handler is already covered by ordinary frontier φs.
    fn register_joints(&mut self, proc: &mut Procedure, domtree: &DominatorTree, block: u32) {
        let index = block as usize;

        for try_catch in 0..proc.block(index).try_catches.len() {
            let handler = proc.block(index).try_catches[try_catch].handler;

            if !domtree.strictly_dominates(handler, block) {
                continue;
            }

            let exception_variable = proc.block(handler as usize).exception_variable;
            let mut joints: GaHashMap<u32, (usize, usize)> = GaHashMap::default();

            for joint in 0..proc.block(index).try_catches[try_catch].joints.len() {
                let receiver = proc.block(index).try_catches[try_catch].joints[joint].receiver;

                // the exception variable is defined by the handler's own
                // entry, a joint for it has nothing to merge
                if Some(receiver) == exception_variable {
                    continue;
                }

                joints.insert(receiver.index() as u32, (try_catch, joint));

                let rewritten: Vec<Variable> = proc.block(index).try_catches[try_catch].joints
                    [joint]
                    .source_variables
                    .iter()
                    .filter_map(|v| self.variable_map.get(v.index()).copied().flatten())
                    .collect();

                proc.block_mut(index).try_catches[try_catch].joints[joint].source_variables =
                    rewritten;
            }

            self.joint_map[handler as usize].insert(block, joints);
        }
    }

    fn process_try_catch(
        &mut self,
        proc: &mut Procedure,
        domtree: &DominatorTree,
        protected: u32,
        try_catch: usize,
        variables: Vec<Option<Variable>>,
        stack: &mut Vec<Task>,
    ) {
        let index = protected as usize;
        let handler = proc.block(index).try_catches[try_catch].handler;

        // when the protected block doesn't strictly dominate its handler,
        // the joints stay untouched and the handler is reached through its
        // real dominator parent instead
        if !domtree.strictly_dominates(handler, protected) {
            return;
        }

        let exception_variable = proc.block(handler as usize).exception_variable;
        let mut next = variables;

        for joint in 0..proc.block(index).try_catches[try_catch].joints.len() {
            let receiver = proc.block(index).try_catches[try_catch].joints[joint].receiver;

            if Some(receiver) == exception_variable {
                continue;
            }

            let mapped = self.introduce(proc, receiver);

            for position in 0..proc.block(index).try_catches[try_catch].joints[joint]
                .source_variables
                .len()
            {
                let source =
                    proc.block(index).try_catches[try_catch].joints[joint].source_variables[position];

                // accumulated versions may have been minted during this
                // pass, those indices don't exist in the original map
                if source.index() < next.len() {
                    next[source.index()] = Some(mapped);
                }
            }

            next[receiver.index()] = Some(mapped);
            proc.block_mut(index).try_catches[try_catch].joints[joint].receiver = mapped;
        }

        stack.push(Task::Block {
            block: handler,
            variables: next,
        });
    }

    // appends ⟨current block, current version⟩ to every synthesized φ of
    // `successor` whose variable has a reaching definition on this path
    fn rename_outgoing_phis(&mut self, proc: &mut Procedure, successor: u32) {
        let index = successor as usize;

        for position in 0..self.synthesized[index].len() {
            let original = self.phi_originals[index][position];

            if let Some(value) = self.variable_map[original as usize] {
                let receiver = self.synthesized[index][position].receiver;

                self.synthesized[index][position].incomings.push(Incoming {
                    source: self.current_block,
                    value,
                });
                proc.merge_debug_names(receiver, value);
            }
        }
    }

    //
    // the little renaming primitives
    //

    fn define(&mut self, proc: &mut Procedure, var: Variable) -> Variable {
        let old = self.variable_map[var.index()];
        let fresh = self.introduce(proc, var);

        self.propagate_to_joints(proc, var, fresh, old);
        self.variable_map[var.index()] = Some(fresh);

        fresh
    }

    fn introduce(&mut self, proc: &mut Procedure, var: Variable) -> Variable {
        if !self.used_definitions[var.index()] {
            // the first definition of an index keeps the original name,
            // which keeps variable counts low for single-definition inputs
            self.used_definitions[var.index()] = true;

            var
        } else {
            let fresh = proc.create_variable();

            proc.merge_debug_names(fresh, var);

            fresh
        }
    }

    fn use_variable(&self, var: Variable) -> Variable {
        match self.variable_map[var.index()] {
            Some(mapped) => mapped,
            None => panic!(
                "use of variable %{} with no reaching definition",
                var.index()
            ),
        }
    }

    // called for every definition of `original` inside the current block:
    // any joint registered for it collects the new version (and, the first
    // time, the version that was live before it)
    fn propagate_to_joints(
        &self,
        proc: &mut Procedure,
        original: Variable,
        fresh: Variable,
        old: Option<Variable>,
    ) {
        let block = self.current_block;
        let mut targets: SmallVec<[(usize, usize); 2]> = SmallVec::new();

        for try_catch in &proc.block(block as usize).try_catches {
            if let Some(joints) = self.joint_map[try_catch.handler as usize].get(&block) {
                if let Some(&target) = joints.get(&(original.index() as u32)) {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }

        for (try_catch, joint) in targets {
            let joint =
                &mut proc.block_mut(block as usize).try_catches[try_catch].joints[joint];

            if joint.source_variables.is_empty() {
                if let Some(old) = old {
                    joint.source_variables.push(old);
                }
            }

            joint.source_variables.push(fresh);
        }
    }
}

/// Rewrites `proc` into SSA form with a freshly-created [`SsaRewriter`].
///
/// See [`SsaRewriter::rewrite`] for the contract.
pub fn rewrite_to_ssa(proc: &mut Procedure, arguments: &[Variable]) {
    SsaRewriter::new().rewrite(proc, arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn branch(cond: Variable, consequent: u32, alternative: u32) -> Instruction {
        Instruction::Branching {
            condition: BranchingCondition::NotEqual,
            operand: cond,
            consequent,
            alternative,
        }
    }

    fn jump(target: u32) -> Instruction {
        Instruction::Jump { target }
    }

    fn ret(value: Variable) -> Instruction {
        Instruction::Exit { value: Some(value) }
    }

    fn int_const(receiver: Variable, value: i32) -> Instruction {
        Instruction::IntegerConstant { receiver, value }
    }

    fn receivers_in(proc: &Procedure) -> Vec<Variable> {
        let mut defs = Vec::new();

        for block in proc.block_indices() {
            let bb = proc.block(block);

            defs.extend(bb.exception_variable);
            defs.extend(bb.phis.iter().map(|phi| phi.receiver));
            defs.extend(bb.instructions.iter().filter_map(|insn| insn.receiver()));

            for try_catch in &bb.try_catches {
                defs.extend(try_catch.joints.iter().map(|joint| joint.receiver));
            }
        }

        defs
    }

    // every receiver in the procedure is unique, i.e. the output really is
    // in SSA form
    fn assert_single_assignment(proc: &Procedure) {
        let mut defs = receivers_in(proc);

        defs.sort();

        for pair in defs.windows(2) {
            assert_ne!(pair[0], pair[1], "variable defined more than once");
        }
    }

    #[test]
    fn empty_procedure_is_untouched() {
        let mut proc = Procedure::new();

        rewrite_to_ssa(&mut proc, &[]);

        assert_eq!(proc.block_count(), 0);
        assert_eq!(proc.variable_count(), 0);
    }

    #[test]
    fn straight_line_redefinition() {
        let mut proc = Procedure::new();
        let x = proc.create_variable();

        proc.add_debug_name(x, "x");

        //
        // @0: x = int 1; x = int 2; jump @1
        // @1: return x
        //
        proc.create_block();
        proc.create_block();
        proc.block_mut(0).instructions.push(int_const(x, 1));
        proc.block_mut(0).instructions.push(int_const(x, 2));
        proc.block_mut(0).instructions.push(jump(1));
        proc.block_mut(1).instructions.push(ret(x));

        rewrite_to_ssa(&mut proc, &[]);

        // the first definition keeps its name, the second gets a fresh one
        let first = proc.block(0).instructions[0].receiver().unwrap();
        let second = proc.block(0).instructions[1].receiver().unwrap();

        assert_eq!(first, x);
        assert_ne!(second, x);
        assert_eq!(proc.variable_count(), 2);

        // the return reads the fresh variable, and no φs were introduced
        assert_eq!(proc.block(1).instructions[0], ret(second));
        assert!(proc.block(0).phis.is_empty());
        assert!(proc.block(1).phis.is_empty());

        // the fresh version inherits the debug name
        assert!(proc.debug_names(second).contains("x"));
        assert_single_assignment(&proc);
    }

    #[test]
    fn argument_passthrough() {
        let mut proc = Procedure::new();
        let x = proc.create_variable();

        proc.create_block();
        proc.block_mut(0).instructions.push(ret(x));

        rewrite_to_ssa(&mut proc, &[x]);

        // arguments are already SSA, nothing changes
        assert_eq!(proc.block(0).instructions[0], ret(x));
        assert_eq!(proc.variable_count(), 1);
    }

    #[test]
    fn diamond_merges_through_phi() {
        let mut proc = Procedure::new();
        let x = proc.create_variable();
        let cond = proc.create_variable();

        proc.add_debug_name(x, "x");

        //
        // @0: if cond then @1 else @2
        // @1: x = int 1; jump @3
        // @2: x = int 2; jump @3
        // @3: return x
        //
        for _ in 0..4 {
            proc.create_block();
        }

        proc.block_mut(0).instructions.push(branch(cond, 1, 2));
        proc.block_mut(1).instructions.push(int_const(x, 1));
        proc.block_mut(1).instructions.push(jump(3));
        proc.block_mut(2).instructions.push(int_const(x, 2));
        proc.block_mut(2).instructions.push(jump(3));
        proc.block_mut(3).instructions.push(ret(x));

        rewrite_to_ssa(&mut proc, &[x, cond]);

        // both arms define fresh versions, x itself is an argument
        let left = proc.block(1).instructions[0].receiver().unwrap();
        let right = proc.block(2).instructions[0].receiver().unwrap();

        assert_ne!(left, x);
        assert_ne!(right, x);
        assert_ne!(left, right);

        // the join gets a φ merging the two versions, and the return reads
        // the φ's receiver
        assert_eq!(proc.block(3).phis.len(), 1);

        let phi = &proc.block(3).phis[0];
        let mut incomings = phi.incomings.clone();

        incomings.sort_by_key(|inc| inc.source);

        assert_eq!(
            incomings,
            [
                Incoming {
                    source: 1,
                    value: left
                },
                Incoming {
                    source: 2,
                    value: right
                }
            ]
        );
        assert_eq!(proc.block(3).instructions[0], ret(phi.receiver));

        // names follow every version, the φ receiver included
        assert!(proc.debug_names(left).contains("x"));
        assert!(proc.debug_names(right).contains("x"));
        assert!(proc.debug_names(phi.receiver).contains("x"));
        assert_single_assignment(&proc);
    }

    #[test]
    fn diamond_rewrite_is_idempotent() {
        let mut proc = Procedure::new();
        let x = proc.create_variable();
        let cond = proc.create_variable();

        for _ in 0..4 {
            proc.create_block();
        }

        proc.block_mut(0).instructions.push(branch(cond, 1, 2));
        proc.block_mut(1).instructions.push(int_const(x, 1));
        proc.block_mut(1).instructions.push(jump(3));
        proc.block_mut(2).instructions.push(int_const(x, 2));
        proc.block_mut(2).instructions.push(jump(3));
        proc.block_mut(3).instructions.push(ret(x));

        rewrite_to_ssa(&mut proc, &[x, cond]);

        let after_first = proc.clone();

        rewrite_to_ssa(&mut proc, &[x, cond]);

        // a second run finds nothing left to do
        assert_eq!(proc, after_first);
    }

    #[test]
    fn loop_header_gets_phi() {
        let mut proc = Procedure::new();
        let x = proc.create_variable();

        //
        // @0: jump @1
        // @1: x = x + x; if x then @1 else @2
        // @2: return x
        //
        for _ in 0..3 {
            proc.create_block();
        }

        proc.block_mut(0).instructions.push(jump(1));
        proc.block_mut(1).instructions.push(Instruction::Binary {
            op: BinaryOp::Add,
            receiver: x,
            first: x,
            second: x,
            operand_type: NumericOperandType::Int,
        });
        proc.block_mut(1).instructions.push(branch(x, 1, 2));
        proc.block_mut(2).instructions.push(ret(x));

        rewrite_to_ssa(&mut proc, &[x]);

        // the header merges the initial value with the loop-carried one
        assert_eq!(proc.block(1).phis.len(), 1);

        let phi = proc.block(1).phis[0].clone();
        let body_def = proc.block(1).instructions[0].receiver().unwrap();
        let mut incomings = phi.incomings.clone();

        incomings.sort_by_key(|inc| inc.source);

        assert_eq!(
            incomings,
            [
                Incoming {
                    source: 0,
                    value: x
                },
                Incoming {
                    source: 1,
                    value: body_def
                }
            ]
        );

        // the body's reads were rewired to the φ's receiver, its write got
        // a fresh variable, and the exit reads the loop-carried version
        assert_eq!(
            proc.block(1).instructions[0],
            Instruction::Binary {
                op: BinaryOp::Add,
                receiver: body_def,
                first: phi.receiver,
                second: phi.receiver,
                operand_type: NumericOperandType::Int,
            }
        );
        assert_eq!(proc.block(1).instructions[1], branch(body_def, 1, 2));
        assert_eq!(proc.block(2).instructions[0], ret(body_def));
        assert_single_assignment(&proc);
    }

    #[test]
    fn unreached_merge_is_discarded() {
        let mut proc = Procedure::new();
        let cond = proc.create_variable();
        let merged = proc.create_variable();
        let exc = proc.create_variable();

        //
        // @0: if cond then @1 else @2
        // @1: try -> @3 joint merged <- (); jump @4
        // @2: try -> @3; jump @4
        // @3: catch exc: return
        // @4: return
        //
        // neither protected block dominates the handler, so the joint is
        // left alone and `merged` never gets a definition anywhere: the
        // φs placement synthesized for it collect no incomings and must
        // be dropped
        //
        for _ in 0..5 {
            proc.create_block();
        }

        proc.block_mut(0).instructions.push(branch(cond, 1, 2));

        let mut try_catch = TryCatchBlock::new(3);

        try_catch.joints.push(TryCatchJoint::new(merged, []));
        proc.block_mut(1).try_catches.push(try_catch);
        proc.block_mut(1).instructions.push(jump(4));
        proc.block_mut(2).try_catches.push(TryCatchBlock::new(3));
        proc.block_mut(2).instructions.push(jump(4));
        proc.block_mut(3).exception_variable = Some(exc);
        proc.block_mut(3)
            .instructions
            .push(Instruction::Exit { value: None });
        proc.block_mut(4)
            .instructions
            .push(Instruction::Exit { value: None });

        rewrite_to_ssa(&mut proc, &[cond]);

        // no block ends up with a φ for the undefined merge variable
        for block in proc.block_indices() {
            assert!(proc.block(block).phis.is_empty());
        }

        // the joint was not rewritten
        assert_eq!(proc.block(1).try_catches[0].joints[0].receiver, merged);
        assert!(proc.block(1).try_catches[0].joints[0]
            .source_variables
            .is_empty());
    }

    #[test]
    fn joint_collects_versions_for_dominated_handler() {
        let mut proc = Procedure::new();
        let x = proc.create_variable();
        let exc = proc.create_variable();

        proc.add_debug_name(x, "x");

        //
        // @0: try -> @2 joint x <- (x); x = int 1; x = int 2; jump @1
        // @1: return x
        // @2: catch exc: return x
        //
        for _ in 0..3 {
            proc.create_block();
        }

        let mut try_catch = TryCatchBlock::catching(2, "java.lang.Exception");

        try_catch.joints.push(TryCatchJoint::new(x, [x]));
        proc.block_mut(0).try_catches.push(try_catch);
        proc.block_mut(0).instructions.push(int_const(x, 1));
        proc.block_mut(0).instructions.push(int_const(x, 2));
        proc.block_mut(0).instructions.push(jump(1));
        proc.block_mut(1).instructions.push(ret(x));
        proc.block_mut(2).exception_variable = Some(exc);
        proc.block_mut(2).instructions.push(ret(x));

        rewrite_to_ssa(&mut proc, &[x]);

        let first = proc.block(0).instructions[0].receiver().unwrap();
        let second = proc.block(0).instructions[1].receiver().unwrap();

        assert_ne!(first, x);
        assert_ne!(second, first);

        // the joint saw the pre-entry version plus both fresh versions
        // minted inside the protected block
        let joint = &proc.block(0).try_catches[0].joints[0];

        assert_eq!(joint.source_variables, [x, first, second]);

        // its receiver is a fresh variable, and the handler reads it
        assert_ne!(joint.receiver, x);
        assert_ne!(joint.receiver, first);
        assert_ne!(joint.receiver, second);
        assert_eq!(proc.block(2).instructions[0], ret(joint.receiver));
        assert!(proc.debug_names(joint.receiver).contains("x"));

        // the normal path still sees the last version
        assert_eq!(proc.block(1).instructions[0], ret(second));
        assert_single_assignment(&proc);
    }

    #[test]
    fn exception_variable_is_not_renamed() {
        let mut proc = Procedure::new();
        let exc = proc.create_variable();

        //
        // @0: try -> @1; return
        // @1: catch exc: return exc
        //
        proc.create_block();
        proc.create_block();
        proc.block_mut(0).try_catches.push(TryCatchBlock::new(1));
        proc.block_mut(0)
            .instructions
            .push(Instruction::Exit { value: None });
        proc.block_mut(1).exception_variable = Some(exc);
        proc.block_mut(1).instructions.push(ret(exc));

        rewrite_to_ssa(&mut proc, &[]);

        // the catch receiver is defined by the handler's entry: it keeps
        // its name and uses of it resolve to it unchanged
        assert_eq!(proc.block(1).exception_variable, Some(exc));
        assert_eq!(proc.block(1).instructions[0], ret(exc));
        assert_eq!(proc.variable_count(), 1);
    }

    #[test]
    fn pre_existing_phis_are_renamed_in_place() {
        let mut proc = Procedure::new();
        let cond = proc.create_variable();
        let a = proc.create_variable();
        let b = proc.create_variable();
        let c = proc.create_variable();

        //
        // @0: if cond then @1 else @2
        // @1: a = int 1; a = int 2; jump @3
        // @2: b = int 3; jump @3
        // @3: c = phi [@1: a] [@2: b]; return c
        //
        for _ in 0..4 {
            proc.create_block();
        }

        proc.block_mut(0).instructions.push(branch(cond, 1, 2));
        proc.block_mut(1).instructions.push(int_const(a, 1));
        proc.block_mut(1).instructions.push(int_const(a, 2));
        proc.block_mut(1).instructions.push(jump(3));
        proc.block_mut(2).instructions.push(int_const(b, 3));
        proc.block_mut(2).instructions.push(jump(3));

        let mut phi = Phi::new(c);

        phi.incomings.push(Incoming { source: 1, value: a });
        phi.incomings.push(Incoming { source: 2, value: b });
        proc.block_mut(3).phis.push(phi);
        proc.block_mut(3).instructions.push(ret(c));

        rewrite_to_ssa(&mut proc, &[cond]);

        let second = proc.block(1).instructions[1].receiver().unwrap();

        assert_ne!(second, a);

        // the φ was not duplicated, its receiver kept its (single-def)
        // name, and the incoming from @1 was rewired to the last version
        assert_eq!(proc.block(3).phis.len(), 1);

        let phi = &proc.block(3).phis[0];

        assert_eq!(phi.receiver, c);
        assert_eq!(
            phi.incomings,
            [
                Incoming {
                    source: 1,
                    value: second
                },
                Incoming { source: 2, value: b }
            ]
        );
        assert_eq!(proc.block(3).instructions[0], ret(c));
        assert_single_assignment(&proc);
    }

    #[test]
    fn dominance_holds_for_every_use() {
        // a loop inside a diamond, with redefinitions everywhere: checks
        // the output invariants rather than exact shapes
        let mut proc = Procedure::new();
        let x = proc.create_variable();
        let cond = proc.create_variable();

        //
        // @0: if cond then @1 else @2
        // @1: x = int 1; jump @3
        // @2: x = int 2; jump @3
        // @3: x = x + x; if x then @3 else @4
        // @4: return x
        //
        for _ in 0..5 {
            proc.create_block();
        }

        proc.block_mut(0).instructions.push(branch(cond, 1, 2));
        proc.block_mut(1).instructions.push(int_const(x, 1));
        proc.block_mut(1).instructions.push(jump(3));
        proc.block_mut(2).instructions.push(int_const(x, 2));
        proc.block_mut(2).instructions.push(jump(3));
        proc.block_mut(3).instructions.push(Instruction::Binary {
            op: BinaryOp::Add,
            receiver: x,
            first: x,
            second: x,
            operand_type: NumericOperandType::Int,
        });
        proc.block_mut(3).instructions.push(branch(x, 3, 4));
        proc.block_mut(4).instructions.push(ret(x));

        rewrite_to_ssa(&mut proc, &[x, cond]);
        assert_single_assignment(&proc);

        // every use refers to some defined variable (operand closure)
        let defined: Vec<Variable> = receivers_in(&proc);
        let mut uses = Vec::new();

        for block in proc.block_indices() {
            let mut instructions = proc.block(block).instructions.clone();

            for insn in instructions.iter_mut() {
                insn.visit_operands(|kind, var| {
                    if kind == OperandKind::Use {
                        uses.push(*var);
                    }
                });
            }

            for phi in &proc.block(block).phis {
                uses.extend(phi.incomings.iter().map(|inc| inc.value));
            }
        }

        for used in uses {
            assert!(
                used == x || used == cond || defined.contains(&used),
                "use of %{} has no definition",
                used.index()
            );
        }

        // the loop header merges both arms and the back edge
        let header_phi = &proc.block(3).phis[0];
        let sources: Vec<u32> = {
            let mut s: Vec<u32> = header_phi.incomings.iter().map(|inc| inc.source).collect();
            s.sort_unstable();
            s
        };

        assert_eq!(sources, [1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "no reaching definition")]
    fn use_before_def_asserts() {
        let mut proc = Procedure::new();
        let x = proc.create_variable();

        proc.create_block();
        proc.block_mut(0).instructions.push(ret(x));

        // x is not an argument and nothing defines it
        rewrite_to_ssa(&mut proc, &[]);
    }
}
