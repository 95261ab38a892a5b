//======---------------------------------------------------------------======//
//                                                                           //
// Copyright 2022-2023 Evan Cox <evanacox00@gmail.com>. All rights reserved. //
//                                                                           //
// Use of this source code is governed by a BSD-style license that can be    //
// found in the LICENSE.txt file at the root of this project, or at the      //
// following link: https://opensource.org/licenses/BSD-3-Clause              //
//                                                                           //
//======---------------------------------------------------------------======//

use crate::ir::{Instruction, Procedure, Variable};
use std::fmt;

struct Var(Variable);

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0.index())
    }
}

struct VarList<'a>(&'a [Variable]);

impl fmt::Display for VarList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, var) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }

            write!(f, "{}", Var(*var))?;
        }

        Ok(())
    }
}

fn write_insn(f: &mut fmt::Formatter<'_>, insn: &Instruction) -> fmt::Result {
    match insn {
        Instruction::Empty => write!(f, "nop"),
        Instruction::ClassConstant { receiver, value } => {
            write!(f, "{} = classof {value}", Var(*receiver))
        }
        Instruction::NullConstant { receiver } => write!(f, "{} = null", Var(*receiver)),
        Instruction::IntegerConstant { receiver, value } => {
            write!(f, "{} = int {value}", Var(*receiver))
        }
        Instruction::LongConstant { receiver, value } => {
            write!(f, "{} = long {value}", Var(*receiver))
        }
        Instruction::FloatConstant { receiver, value } => {
            write!(f, "{} = float {value}", Var(*receiver))
        }
        Instruction::DoubleConstant { receiver, value } => {
            write!(f, "{} = double {value}", Var(*receiver))
        }
        Instruction::StringConstant { receiver, value } => {
            write!(f, "{} = string {value:?}", Var(*receiver))
        }
        Instruction::Assign { receiver, assignee } => {
            write!(f, "{} = {}", Var(*receiver), Var(*assignee))
        }
        Instruction::Negate {
            receiver, operand, ..
        } => write!(f, "{} = neg {}", Var(*receiver), Var(*operand)),
        Instruction::Binary {
            op,
            receiver,
            first,
            second,
            ..
        } => write!(
            f,
            "{} = {op:?} {}, {}",
            Var(*receiver),
            Var(*first),
            Var(*second)
        ),
        Instruction::Branching {
            condition,
            operand,
            consequent,
            alternative,
        } => write!(
            f,
            "if {condition:?} {} then @{consequent} else @{alternative}",
            Var(*operand)
        ),
        Instruction::BinaryBranching {
            condition,
            first,
            second,
            consequent,
            alternative,
        } => write!(
            f,
            "if {} {condition:?} {} then @{consequent} else @{alternative}",
            Var(*first),
            Var(*second)
        ),
        Instruction::Jump { target } => write!(f, "jump @{target}"),
        Instruction::Switch {
            condition,
            table,
            default_target,
        } => {
            write!(f, "switch {} [", Var(*condition))?;

            for entry in table {
                write!(f, " {} -> @{},", entry.condition, entry.target)?;
            }

            write!(f, " ] else @{default_target}")
        }
        Instruction::Exit { value: Some(value) } => write!(f, "return {}", Var(*value)),
        Instruction::Exit { value: None } => write!(f, "return"),
        Instruction::Raise { exception } => write!(f, "raise {}", Var(*exception)),
        Instruction::Construct { receiver, class } => {
            write!(f, "{} = new {class}", Var(*receiver))
        }
        Instruction::ConstructArray {
            receiver,
            item_type,
            size,
        } => write!(f, "{} = new {item_type}[{}]", Var(*receiver), Var(*size)),
        Instruction::ConstructMultiArray {
            receiver,
            item_type,
            dimensions,
        } => write!(
            f,
            "{} = new {item_type}[{}]",
            Var(*receiver),
            VarList(dimensions)
        ),
        Instruction::GetField {
            receiver,
            instance,
            field,
            ..
        } => match instance {
            Some(instance) => write!(
                f,
                "{} = {}.{}",
                Var(*receiver),
                Var(*instance),
                field.name
            ),
            None => write!(f, "{} = {}.{}", Var(*receiver), field.class, field.name),
        },
        Instruction::PutField {
            instance,
            field,
            value,
            ..
        } => match instance {
            Some(instance) => write!(
                f,
                "{}.{} = {}",
                Var(*instance),
                field.name,
                Var(*value)
            ),
            None => write!(f, "{}.{} = {}", field.class, field.name, Var(*value)),
        },
        Instruction::GetElement {
            receiver,
            array,
            index,
        } => write!(f, "{} = {}[{}]", Var(*receiver), Var(*array), Var(*index)),
        Instruction::PutElement {
            array,
            index,
            value,
        } => write!(f, "{}[{}] = {}", Var(*array), Var(*index), Var(*value)),
        Instruction::Invoke {
            receiver,
            instance,
            method,
            arguments,
            ..
        } => {
            if let Some(receiver) = receiver {
                write!(f, "{} = ", Var(*receiver))?;
            }

            match instance {
                Some(instance) => write!(f, "invoke {}.{}", Var(*instance), method.name)?,
                None => write!(f, "invoke {}.{}", method.class, method.name)?,
            }

            write!(f, "({})", VarList(arguments))
        }
        Instruction::InvokeDynamic {
            receiver,
            instance,
            method,
            arguments,
            ..
        } => {
            if let Some(receiver) = receiver {
                write!(f, "{} = ", Var(*receiver))?;
            }

            match instance {
                Some(instance) => write!(f, "invokedynamic {}.{method}", Var(*instance))?,
                None => write!(f, "invokedynamic {method}")?,
            }

            write!(f, "({})", VarList(arguments))
        }
        Instruction::IsInstance {
            receiver,
            value,
            of,
        } => write!(f, "{} = {} instanceof {of}", Var(*receiver), Var(*value)),
        Instruction::Cast {
            receiver,
            value,
            target_type,
        } => write!(f, "{} = cast {} to {target_type}", Var(*receiver), Var(*value)),
        Instruction::CastNumber {
            receiver,
            value,
            source_type,
            target_type,
        } => write!(
            f,
            "{} = cast {} {source_type:?} to {target_type:?}",
            Var(*receiver),
            Var(*value)
        ),
        Instruction::CastInteger {
            receiver, value, ..
        } => write!(f, "{} = cast.i {}", Var(*receiver), Var(*value)),
        Instruction::ArrayLength { receiver, array } => {
            write!(f, "{} = length {}", Var(*receiver), Var(*array))
        }
        Instruction::UnwrapArray {
            receiver, array, ..
        } => write!(f, "{} = unwrap {}", Var(*receiver), Var(*array)),
        Instruction::CloneArray { receiver, array } => {
            write!(f, "{} = clone {}", Var(*receiver), Var(*array))
        }
        Instruction::InitClass { class } => write!(f, "initclass {class}"),
        Instruction::NullCheck { receiver, value } => {
            write!(f, "{} = nullcheck {}", Var(*receiver), Var(*value))
        }
        Instruction::MonitorEnter { object_ref } => write!(f, "monitorenter {}", Var(*object_ref)),
        Instruction::MonitorExit { object_ref } => write!(f, "monitorexit {}", Var(*object_ref)),
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in self.block_indices() {
            let block = self.block(index);

            write!(f, "@{index}")?;

            if let Some(var) = block.exception_variable {
                write!(f, " catch {}", Var(var))?;
            }

            writeln!(f, ":")?;

            for phi in &block.phis {
                write!(f, "    {} = phi", Var(phi.receiver))?;

                for incoming in &phi.incomings {
                    write!(f, " [@{}: {}]", incoming.source, Var(incoming.value))?;
                }

                writeln!(f)?;
            }

            for try_catch in &block.try_catches {
                write!(f, "    try -> @{}", try_catch.handler)?;

                for joint in &try_catch.joints {
                    write!(
                        f,
                        " joint {} <- ({})",
                        Var(joint.receiver),
                        VarList(&joint.source_variables)
                    )?;
                }

                writeln!(f)?;
            }

            for insn in &block.instructions {
                write!(f, "    ")?;
                write_insn(f, insn)?;
                writeln!(f)?;
            }
        }

        Ok(())
    }
}
