//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Instruction, Variable};
use smallvec::SmallVec;
use static_assertions::assert_eq_size;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// One incoming value of a φ-function: the value the φ takes when control
/// arrives from `source`.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Incoming {
    /// Index of the predecessor block this value flows in from
    pub source: u32,
    /// The value itself
    pub value: Variable,
}

assert_eq_size!(Incoming, u64);

/// A φ-function: selects one of its incoming values according to which
/// predecessor control arrived from, and defines its receiver with it.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Phi {
    /// The variable the φ defines
    pub receiver: Variable,
    /// One entry per contributing predecessor
    pub incomings: Vec<Incoming>,
}

impl Phi {
    /// Creates a φ for `receiver` with no incomings yet.
    pub fn new(receiver: Variable) -> Self {
        Self {
            receiver,
            incomings: Vec::new(),
        }
    }
}

/// An exception-flow merge node declared on a try/catch.
///
/// A joint for variable `v` means: if an exception raised inside the
/// protected block transfers control to the handler, the reaching definition
/// of `v` at the throw point is made available through the joint's receiver.
/// Conceptually a φ whose incoming edges are potential throw points rather
/// than CFG edges.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct TryCatchJoint {
    /// The variable the handler reads
    pub receiver: Variable,
    /// The variable versions that can be live at a throw point
    pub source_variables: Vec<Variable>,
}

impl TryCatchJoint {
    /// Creates a joint for `receiver` sourced from `sources`.
    pub fn new(receiver: Variable, sources: impl IntoIterator<Item = Variable>) -> Self {
        Self {
            receiver,
            source_variables: sources.into_iter().collect(),
        }
    }
}

/// Associates a protected block with an exception handler.
///
/// Try/catches are stored on the block they protect, so the protected side
/// is implicit; only the handler is carried as an index.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct TryCatchBlock {
    /// Index of the handler block
    pub handler: u32,
    /// The caught exception class, absent for catch-all
    pub exception_type: Option<String>,
    /// The exception-flow merge nodes declared on this try/catch
    pub joints: Vec<TryCatchJoint>,
}

impl TryCatchBlock {
    /// Creates a try/catch transferring control to `handler`, catching
    /// everything, with no joints.
    pub fn new(handler: u32) -> Self {
        Self {
            handler,
            exception_type: None,
            joints: Vec::new(),
        }
    }

    /// Creates a try/catch catching a specific exception class.
    pub fn catching(handler: u32, exception_type: impl Into<String>) -> Self {
        Self {
            handler,
            exception_type: Some(exception_type.into()),
            joints: Vec::new(),
        }
    }
}

/// A single basic block: an ordered φ list, an ordered instruction list
/// ending in a terminator, the try/catches protecting the block, and an
/// optional exception variable that is defined on entry when the block is
/// a handler.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct BasicBlock {
    /// The φ-functions at the head of the block
    pub phis: Vec<Phi>,
    /// The instructions of the block, in execution order
    pub instructions: Vec<Instruction>,
    /// The try/catches protecting this block
    pub try_catches: Vec<TryCatchBlock>,
    /// Defined on entry when this block is an exception handler
    pub exception_variable: Option<Variable>,
}

impl BasicBlock {
    /// The blocks control can transfer to from this block: the terminator's
    /// targets plus the handler of every try/catch protecting the block.
    pub fn successors(&self) -> SmallVec<[u32; 4]> {
        let mut targets = match self.instructions.last() {
            Some(insn) => insn.targets(),
            None => SmallVec::new(),
        };

        for try_catch in &self.try_catches {
            targets.push(try_catch.handler);
        }

        targets
    }
}
