//! Planificación de llamadas ejecutadas en tiempo de compilación.
//!
//! Una llamada a una subrutina evaluada por el compilador absorbe a las
//! cargas de constantes que la preceden inmediatamente, una por
//! parámetro. El resto de instrucciones se compila individualmente.

use std::{collections::BTreeMap, ops::Range};

use crate::{
    error::CompileError,
    ir::Opcode,
    table::TypeTable,
    types::{Intrinsic, Subroutine},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Action {
    Compile(usize),
    Execute { call: usize, arguments: Range<usize> },
}

impl Action {
    /// Instrucción que determina el bloque básico de la acción.
    pub fn anchor(&self) -> usize {
        match self {
            Action::Compile(index) => *index,
            Action::Execute { call, .. } => *call,
        }
    }

    /// Todas las instrucciones que consume la acción.
    pub fn range(&self) -> Range<usize> {
        match self {
            Action::Compile(index) => *index..*index + 1,
            Action::Execute { call, arguments } => arguments.start..*call + 1,
        }
    }
}

pub(super) fn plan(types: &TypeTable, subroutine: &Subroutine) -> Result<Vec<Action>, CompileError> {
    let instructions = &subroutine.instructions;

    // Primera pasada: inicio de cada grupo absorbido => llamada
    let mut groups = BTreeMap::new();
    for (index, instruction) in instructions.iter().enumerate() {
        let callee = match instruction.callee() {
            Some(callee) => &types[callee],
            None => continue,
        };

        if !matches!(callee.intrinsic, Some(Intrinsic::CompileTimeExecuted { .. })) {
            continue;
        }

        let arity = callee.parameters.len();
        let is_constant = |i: usize| instructions[i].opcode == Opcode::LoadConstant;

        let start = index
            .checked_sub(arity)
            .filter(|&start| (start..index).all(is_constant))
            .ok_or_else(|| CompileError::NonConstantArgument {
                subroutine: subroutine.full_name.to_string(),
                callee: callee.full_name.to_string(),
                index,
                expected: arity,
            })?;

        groups.insert(start, index);
    }

    // Segunda pasada: una acción por instrucción o grupo, en orden original
    let mut actions = Vec::with_capacity(instructions.len());
    let mut index = 0;

    while index < instructions.len() {
        match groups.get(&index) {
            Some(&call) => {
                actions.push(Action::Execute {
                    call,
                    arguments: index..call,
                });

                index = call + 1;
            }

            None => {
                actions.push(Action::Compile(index));
                index += 1;
            }
        }
    }

    Ok(actions)
}
