//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::types::*;
use crate::ir::Variable;
use smallvec::SmallVec;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// Whether an operand visited by [`Instruction::visit_operands`] is read
/// or written by the instruction.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum OperandKind {
    /// The instruction reads the variable
    Use,
    /// The instruction writes the variable (this is its receiver)
    Def,
}

/// One entry of a `switch` instruction's jump table.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SwitchTableEntry {
    /// The constant being matched against
    pub condition: i32,
    /// The block jumped to when the condition matches
    pub target: u32,
}

/// A single three-address instruction.
///
/// Every shape has an explicit set of *use* operands and at most one
/// *receiver* (the variable it defines). Operand access goes through
/// [`Instruction::visit_operands`] and [`Instruction::receiver`], which are
/// exhaustive over the shape set; adding a variant without updating them is
/// a compile error.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Instruction {
    /// Does nothing. Placeholder left behind by transforms.
    Empty,
    /// `recv = classof C`, loads a class literal
    ClassConstant {
        /// The defined variable
        receiver: Variable,
        /// The class being referenced
        value: ValueType,
    },
    /// `recv = null`
    NullConstant {
        /// The defined variable
        receiver: Variable,
    },
    /// `recv = <int constant>`
    IntegerConstant {
        /// The defined variable
        receiver: Variable,
        /// The constant
        value: i32,
    },
    /// `recv = <long constant>`
    LongConstant {
        /// The defined variable
        receiver: Variable,
        /// The constant
        value: i64,
    },
    /// `recv = <float constant>`
    FloatConstant {
        /// The defined variable
        receiver: Variable,
        /// The constant bits
        value: f32,
    },
    /// `recv = <double constant>`
    DoubleConstant {
        /// The defined variable
        receiver: Variable,
        /// The constant bits
        value: f64,
    },
    /// `recv = "..."`
    StringConstant {
        /// The defined variable
        receiver: Variable,
        /// The constant
        value: String,
    },
    /// `recv = assignee`, a register-to-register copy
    Assign {
        /// The defined variable
        receiver: Variable,
        /// The variable being copied
        assignee: Variable,
    },
    /// `recv = -operand`
    Negate {
        /// The defined variable
        receiver: Variable,
        /// The variable being negated
        operand: Variable,
        /// The arithmetic type of the operation
        operand_type: NumericOperandType,
    },
    /// `recv = first <op> second`
    Binary {
        /// The operation performed
        op: BinaryOp,
        /// The defined variable
        receiver: Variable,
        /// Left operand
        first: Variable,
        /// Right operand
        second: Variable,
        /// The arithmetic type of the operation
        operand_type: NumericOperandType,
    },
    /// Conditional branch testing a single operand against zero/null
    Branching {
        /// The tested condition
        condition: BranchingCondition,
        /// The tested variable
        operand: Variable,
        /// Block taken when the condition holds
        consequent: u32,
        /// Block taken otherwise
        alternative: u32,
    },
    /// Conditional branch comparing two operands
    BinaryBranching {
        /// The tested condition
        condition: BinaryBranchingCondition,
        /// Left operand
        first: Variable,
        /// Right operand
        second: Variable,
        /// Block taken when the condition holds
        consequent: u32,
        /// Block taken otherwise
        alternative: u32,
    },
    /// Unconditional jump
    Jump {
        /// The target block
        target: u32,
    },
    /// Multi-way branch over an integer condition
    Switch {
        /// The tested variable
        condition: Variable,
        /// The jump table
        table: Vec<SwitchTableEntry>,
        /// Block taken when no table entry matches
        default_target: u32,
    },
    /// Returns from the procedure, optionally with a value
    Exit {
        /// The returned variable, if the procedure returns one
        value: Option<Variable>,
    },
    /// Throws an exception
    Raise {
        /// The thrown exception object
        exception: Variable,
    },
    /// `recv = new C`
    Construct {
        /// The defined variable
        receiver: Variable,
        /// The instantiated class
        class: String,
    },
    /// `recv = new T[size]`
    ConstructArray {
        /// The defined variable
        receiver: Variable,
        /// Element type of the array
        item_type: ValueType,
        /// Number of elements
        size: Variable,
    },
    /// `recv = new T[d0][d1]...`
    ConstructMultiArray {
        /// The defined variable
        receiver: Variable,
        /// Element type of the innermost dimension
        item_type: ValueType,
        /// The sizes of each dimension, outermost first
        dimensions: SmallVec<[Variable; 4]>,
    },
    /// `recv = instance.field` (or a static field when `instance` is absent)
    GetField {
        /// The defined variable
        receiver: Variable,
        /// The object read from, absent for static fields
        instance: Option<Variable>,
        /// The field being read
        field: FieldRef,
        /// Declared type of the field
        field_type: ValueType,
    },
    /// `instance.field = value` (or a static field when `instance` is absent)
    PutField {
        /// The object written to, absent for static fields
        instance: Option<Variable>,
        /// The field being written
        field: FieldRef,
        /// The stored variable
        value: Variable,
        /// Declared type of the field
        field_type: ValueType,
    },
    /// `recv = array[index]`
    GetElement {
        /// The defined variable
        receiver: Variable,
        /// The array read from
        array: Variable,
        /// The element index
        index: Variable,
    },
    /// `array[index] = value`
    PutElement {
        /// The array written to
        array: Variable,
        /// The element index
        index: Variable,
        /// The stored variable
        value: Variable,
    },
    /// `recv? = instance?.method(args...)`
    Invoke {
        /// The defined variable, absent for `void` calls
        receiver: Option<Variable>,
        /// The receiver object, absent for static calls
        instance: Option<Variable>,
        /// The callee
        method: MethodRef,
        /// The actual arguments
        arguments: SmallVec<[Variable; 4]>,
        /// How the callee is resolved
        invocation_type: InvocationType,
    },
    /// `recv? = invokedynamic bootstrap(args...)`
    InvokeDynamic {
        /// The defined variable, absent for `void` call sites
        receiver: Option<Variable>,
        /// The receiver object, if the call site has one
        instance: Option<Variable>,
        /// Name of the dynamic method
        method: String,
        /// The bootstrap method producing the call target
        bootstrap: MethodRef,
        /// The actual arguments
        arguments: SmallVec<[Variable; 4]>,
    },
    /// `recv = value instanceof T`
    IsInstance {
        /// The defined variable
        receiver: Variable,
        /// The tested variable
        value: Variable,
        /// The tested-against type
        of: ValueType,
    },
    /// `recv = (T) value`, a checked reference cast
    Cast {
        /// The defined variable
        receiver: Variable,
        /// The cast variable
        value: Variable,
        /// The target type
        target_type: ValueType,
    },
    /// Numeric conversion between primitive arithmetic types
    CastNumber {
        /// The defined variable
        receiver: Variable,
        /// The converted variable
        value: Variable,
        /// The source arithmetic type
        source_type: NumericOperandType,
        /// The target arithmetic type
        target_type: NumericOperandType,
    },
    /// Conversion between `int` and one of its subtypes
    CastInteger {
        /// The defined variable
        receiver: Variable,
        /// The converted variable
        value: Variable,
        /// The sub-integer type involved
        target_type: IntegerSubtype,
        /// Whether the cast widens or narrows
        direction: CastIntegerDirection,
    },
    /// `recv = array.length`
    ArrayLength {
        /// The defined variable
        receiver: Variable,
        /// The measured array
        array: Variable,
    },
    /// `recv = unwrap(array)`, strips the wrapper off a managed array value
    UnwrapArray {
        /// The defined variable
        receiver: Variable,
        /// The unwrapped array
        array: Variable,
        /// The element kind the wrapper is expected to hold
        element_kind: ArrayElementKind,
    },
    /// `recv = array.clone()`
    CloneArray {
        /// The defined variable
        receiver: Variable,
        /// The cloned array
        array: Variable,
    },
    /// Forces class initialization of `class`
    InitClass {
        /// The initialized class
        class: String,
    },
    /// `recv = nullcheck(value)`, throws if `value` is null
    NullCheck {
        /// The defined variable
        receiver: Variable,
        /// The checked variable
        value: Variable,
    },
    /// Acquires the monitor of an object
    MonitorEnter {
        /// The locked object
        object_ref: Variable,
    },
    /// Releases the monitor of an object
    MonitorExit {
        /// The unlocked object
        object_ref: Variable,
    },
}

impl Instruction {
    /// Visits every variable operand of the instruction, telling the
    /// callback whether each one is a use or the receiver.
    ///
    /// Uses are visited before the receiver, so a renamer that rewrites
    /// both through the same callback sees the instruction's reads against
    /// the state *before* its write. This is the single operand enumeration
    /// that both the renamer and [`Self::receiver`] are defined in terms of.
    pub fn visit_operands(&mut self, mut f: impl FnMut(OperandKind, &mut Variable)) {
        use OperandKind::{Def, Use};

        match self {
            Instruction::Empty | Instruction::InitClass { .. } => {}
            Instruction::ClassConstant { receiver, .. }
            | Instruction::NullConstant { receiver }
            | Instruction::IntegerConstant { receiver, .. }
            | Instruction::LongConstant { receiver, .. }
            | Instruction::FloatConstant { receiver, .. }
            | Instruction::DoubleConstant { receiver, .. }
            | Instruction::StringConstant { receiver, .. }
            | Instruction::Construct { receiver, .. } => f(Def, receiver),
            Instruction::Assign { receiver, assignee } => {
                f(Use, assignee);
                f(Def, receiver);
            }
            Instruction::Negate {
                receiver, operand, ..
            } => {
                f(Use, operand);
                f(Def, receiver);
            }
            Instruction::Binary {
                receiver,
                first,
                second,
                ..
            } => {
                f(Use, first);
                f(Use, second);
                f(Def, receiver);
            }
            Instruction::Branching { operand, .. } => f(Use, operand),
            Instruction::BinaryBranching { first, second, .. } => {
                f(Use, first);
                f(Use, second);
            }
            Instruction::Jump { .. } => {}
            Instruction::Switch { condition, .. } => f(Use, condition),
            Instruction::Exit { value } => {
                if let Some(value) = value {
                    f(Use, value);
                }
            }
            Instruction::Raise { exception } => f(Use, exception),
            Instruction::ConstructArray { receiver, size, .. } => {
                f(Use, size);
                f(Def, receiver);
            }
            Instruction::ConstructMultiArray {
                receiver,
                dimensions,
                ..
            } => {
                for dim in dimensions.iter_mut() {
                    f(Use, dim);
                }

                f(Def, receiver);
            }
            Instruction::GetField {
                receiver, instance, ..
            } => {
                if let Some(instance) = instance {
                    f(Use, instance);
                }

                f(Def, receiver);
            }
            Instruction::PutField {
                instance, value, ..
            } => {
                if let Some(instance) = instance {
                    f(Use, instance);
                }

                f(Use, value);
            }
            Instruction::GetElement {
                receiver,
                array,
                index,
            } => {
                f(Use, array);
                f(Use, index);
                f(Def, receiver);
            }
            Instruction::PutElement {
                array,
                index,
                value,
            } => {
                f(Use, array);
                f(Use, index);
                f(Use, value);
            }
            Instruction::Invoke {
                receiver,
                instance,
                arguments,
                ..
            }
            | Instruction::InvokeDynamic {
                receiver,
                instance,
                arguments,
                ..
            } => {
                for arg in arguments.iter_mut() {
                    f(Use, arg);
                }

                if let Some(instance) = instance {
                    f(Use, instance);
                }

                if let Some(receiver) = receiver {
                    f(Def, receiver);
                }
            }
            Instruction::IsInstance {
                receiver, value, ..
            }
            | Instruction::Cast {
                receiver, value, ..
            }
            | Instruction::CastNumber {
                receiver, value, ..
            }
            | Instruction::CastInteger {
                receiver, value, ..
            }
            | Instruction::NullCheck { receiver, value } => {
                f(Use, value);
                f(Def, receiver);
            }
            Instruction::ArrayLength { receiver, array }
            | Instruction::UnwrapArray {
                receiver, array, ..
            }
            | Instruction::CloneArray { receiver, array } => {
                f(Use, array);
                f(Def, receiver);
            }
            Instruction::MonitorEnter { object_ref } | Instruction::MonitorExit { object_ref } => {
                f(Use, object_ref)
            }
        }
    }

    /// Returns the variable this instruction defines, if any.
    ///
    /// This is the definition extractor: it is pure, and the dispatch is
    /// total over the shape set.
    pub fn receiver(&self) -> Option<Variable> {
        match self {
            Instruction::Empty
            | Instruction::Branching { .. }
            | Instruction::BinaryBranching { .. }
            | Instruction::Jump { .. }
            | Instruction::Switch { .. }
            | Instruction::Exit { .. }
            | Instruction::Raise { .. }
            | Instruction::PutField { .. }
            | Instruction::PutElement { .. }
            | Instruction::InitClass { .. }
            | Instruction::MonitorEnter { .. }
            | Instruction::MonitorExit { .. } => None,
            Instruction::ClassConstant { receiver, .. }
            | Instruction::NullConstant { receiver }
            | Instruction::IntegerConstant { receiver, .. }
            | Instruction::LongConstant { receiver, .. }
            | Instruction::FloatConstant { receiver, .. }
            | Instruction::DoubleConstant { receiver, .. }
            | Instruction::StringConstant { receiver, .. }
            | Instruction::Assign { receiver, .. }
            | Instruction::Negate { receiver, .. }
            | Instruction::Binary { receiver, .. }
            | Instruction::Construct { receiver, .. }
            | Instruction::ConstructArray { receiver, .. }
            | Instruction::ConstructMultiArray { receiver, .. }
            | Instruction::GetField { receiver, .. }
            | Instruction::GetElement { receiver, .. }
            | Instruction::IsInstance { receiver, .. }
            | Instruction::Cast { receiver, .. }
            | Instruction::CastNumber { receiver, .. }
            | Instruction::CastInteger { receiver, .. }
            | Instruction::ArrayLength { receiver, .. }
            | Instruction::UnwrapArray { receiver, .. }
            | Instruction::CloneArray { receiver, .. }
            | Instruction::NullCheck { receiver, .. } => Some(*receiver),
            Instruction::Invoke { receiver, .. } | Instruction::InvokeDynamic { receiver, .. } => {
                *receiver
            }
        }
    }

    /// Checks whether this instruction is a terminator, i.e. whether it is
    /// one of the shapes allowed at the end of a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Branching { .. }
                | Instruction::BinaryBranching { .. }
                | Instruction::Jump { .. }
                | Instruction::Switch { .. }
                | Instruction::Exit { .. }
                | Instruction::Raise { .. }
        )
    }

    /// Returns the blocks control can transfer to once this instruction
    /// executes. Empty for non-terminators and for terminators that leave
    /// the procedure (`exit`, `raise`).
    pub fn targets(&self) -> SmallVec<[u32; 4]> {
        match self {
            Instruction::Branching {
                consequent,
                alternative,
                ..
            }
            | Instruction::BinaryBranching {
                consequent,
                alternative,
                ..
            } => SmallVec::from_slice(&[*consequent, *alternative]),
            Instruction::Jump { target } => SmallVec::from_slice(&[*target]),
            Instruction::Switch {
                table,
                default_target,
                ..
            } => {
                let mut targets: SmallVec<[u32; 4]> =
                    table.iter().map(|entry| entry.target).collect();

                targets.push(*default_target);
                targets
            }
            _ => SmallVec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Variable;

    fn collect(insn: &mut Instruction) -> (Vec<Variable>, Option<Variable>) {
        let mut uses = Vec::new();
        let mut def = None;

        insn.visit_operands(|kind, var| match kind {
            OperandKind::Use => uses.push(*var),
            OperandKind::Def => def = Some(*var),
        });

        (uses, def)
    }

    #[test]
    fn operands_of_binary() {
        let v = |i| Variable::with_index(i);
        let mut insn = Instruction::Binary {
            op: BinaryOp::Add,
            receiver: v(2),
            first: v(0),
            second: v(1),
            operand_type: NumericOperandType::Int,
        };

        let (uses, def) = collect(&mut insn);

        assert_eq!(uses, [v(0), v(1)]);
        assert_eq!(def, Some(v(2)));
        assert_eq!(insn.receiver(), Some(v(2)));
        assert!(!insn.is_terminator());
    }

    #[test]
    fn operands_of_invoke() {
        let v = |i| Variable::with_index(i);
        let mut insn = Instruction::Invoke {
            receiver: Some(v(5)),
            instance: Some(v(0)),
            method: MethodRef::new("java.lang.StringBuilder", "append"),
            arguments: smallvec::smallvec![v(1), v(2)],
            invocation_type: InvocationType::Virtual,
        };

        let (uses, def) = collect(&mut insn);

        // arguments first, then the instance
        assert_eq!(uses, [v(1), v(2), v(0)]);
        assert_eq!(def, Some(v(5)));
    }

    #[test]
    fn void_invoke_has_no_receiver() {
        let v = |i| Variable::with_index(i);
        let insn = Instruction::Invoke {
            receiver: None,
            instance: None,
            method: MethodRef::new("java.lang.System", "gc"),
            arguments: smallvec::smallvec![],
            invocation_type: InvocationType::Special,
        };

        assert_eq!(insn.receiver(), None);
        assert_eq!(Instruction::Empty.receiver(), None);
    }

    #[test]
    fn terminator_targets() {
        let v = |i| Variable::with_index(i);

        let jump = Instruction::Jump { target: 3 };
        assert!(jump.is_terminator());
        assert_eq!(jump.targets().as_slice(), &[3]);

        let branch = Instruction::Branching {
            condition: BranchingCondition::Equal,
            operand: v(0),
            consequent: 1,
            alternative: 2,
        };
        assert_eq!(branch.targets().as_slice(), &[1, 2]);

        let switch = Instruction::Switch {
            condition: v(0),
            table: vec![
                SwitchTableEntry {
                    condition: 0,
                    target: 1,
                },
                SwitchTableEntry {
                    condition: 1,
                    target: 2,
                },
            ],
            default_target: 3,
        };
        assert_eq!(switch.targets().as_slice(), &[1, 2, 3]);

        let exit = Instruction::Exit { value: Some(v(0)) };
        assert!(exit.is_terminator());
        assert!(exit.targets().is_empty());
    }
}
