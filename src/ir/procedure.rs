//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::BasicBlock;
use static_assertions::assert_eq_size;
use std::collections::BTreeSet;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// References a single variable (a virtual register) of a procedure.
///
/// Variables are plain indices into the procedure's variable table; two
/// variables with the same index are the same variable. The index never
/// changes over a variable's lifetime, so passes can freely key dense and
/// sparse tables by it.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Variable(u32);

assert_eq_size!(Variable, u32);

impl Variable {
    /// Creates a variable reference from a raw index.
    ///
    /// This is mostly useful for tests and IR builders; passes get their
    /// variables from [`Procedure::create_variable`] or from the procedure
    /// they walk.
    pub fn with_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// The index of this variable in its procedure's variable table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-variable auxiliary data owned by the procedure.
///
/// The SSA rewriter only cares about the debug names: when a fresh variable
/// stands in for an original one, the original's names are union-merged onto
/// the replacement so debugger-visible names survive renaming.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
struct VariableData {
    debug_names: BTreeSet<String>,
}

/// A procedure: a list of basic blocks plus the variables they operate on.
///
/// Blocks are indexed `0..block_count()` and the block at index 0 is the
/// entry block. Variables are indexed `0..variable_count()`; the table only
/// ever grows, via [`Self::create_variable`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Procedure {
    blocks: Vec<BasicBlock>,
    variables: Vec<VariableData>,
}

impl Procedure {
    /// Creates an empty procedure with no blocks and no variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of basic blocks in the procedure.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The number of variables the procedure references.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Gets the block at `index`.
    pub fn block(&self, index: usize) -> &BasicBlock {
        &self.blocks[index]
    }

    /// Gets the block at `index`, mutably.
    pub fn block_mut(&mut self, index: usize) -> &mut BasicBlock {
        &mut self.blocks[index]
    }

    /// Appends a new, empty basic block and returns its index.
    ///
    /// The first block created is the entry block.
    pub fn create_block(&mut self) -> usize {
        self.blocks.push(BasicBlock::default());
        self.blocks.len() - 1
    }

    /// The variable factory: mints a brand-new variable with no debug names.
    pub fn create_variable(&mut self) -> Variable {
        self.variables.push(VariableData::default());

        Variable((self.variables.len() - 1) as u32)
    }

    /// Iterates over every block index in order.
    pub fn block_indices(&self) -> impl Iterator<Item = usize> {
        0..self.blocks.len()
    }

    /// The debug names currently attached to `var`.
    pub fn debug_names(&self, var: Variable) -> &BTreeSet<String> {
        &self.variables[var.index()].debug_names
    }

    /// Attaches one debug name to `var`.
    pub fn add_debug_name(&mut self, var: Variable, name: impl Into<String>) {
        self.variables[var.index()].debug_names.insert(name.into());
    }

    /// Union-merges the debug names of `from` into those of `into`.
    ///
    /// `from` keeps its names; only `into` grows.
    pub fn merge_debug_names(&mut self, into: Variable, from: Variable) {
        if into == from {
            return;
        }

        let (a, b) = (into.index(), from.index());
        let names = std::mem::take(&mut self.variables[b].debug_names);

        self.variables[a].debug_names.extend(names.iter().cloned());
        self.variables[b].debug_names = names;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_grow_monotonically() {
        let mut proc = Procedure::new();
        let v0 = proc.create_variable();
        let v1 = proc.create_variable();

        assert_eq!(v0.index(), 0);
        assert_eq!(v1.index(), 1);
        assert_eq!(proc.variable_count(), 2);
    }

    #[test]
    fn debug_names_merge_is_a_union() {
        let mut proc = Procedure::new();
        let v0 = proc.create_variable();
        let v1 = proc.create_variable();

        proc.add_debug_name(v0, "x");
        proc.add_debug_name(v1, "y");
        proc.merge_debug_names(v1, v0);

        assert!(proc.debug_names(v1).contains("x"));
        assert!(proc.debug_names(v1).contains("y"));
        assert!(proc.debug_names(v0).contains("x"));
        assert!(!proc.debug_names(v0).contains("y"));
    }
}
