//! Llamadas, intrínsecos de sitio de llamada y expansión en línea.

use std::{collections::HashSet, ops::Range, rc::Rc};

use super::Context;
use crate::{
    arch::{Directive, Instruction, Line, Mnemonic::*, Operand as Mode, Symbol, Value},
    error::CompileError,
    ir::Operand,
    stack::EvaluationStack,
    types::{CompileTimeConstant, Evaluator, Intrinsic, Subroutine, SubroutineId, ValueType},
};

impl<'a> Context<'a> {
    pub(super) fn call(
        &mut self,
        index: usize,
        callee: SubroutineId,
        stack: &mut EvaluationStack,
    ) -> Result<(), CompileError> {
        let types = self.types;
        let callee = &types[callee];

        match &callee.intrinsic {
            Some(Intrinsic::StoreToSymbol { symbol, strobe }) => {
                // Un strobe solo necesita la escritura, no el valor
                if !strobe {
                    self.pop_byte(index, stack)?;
                    self.emit(Pla);
                }

                self.direct(Sta, symbol);
                return Ok(());
            }

            Some(Intrinsic::LoadToRegister { register }) => {
                self.pop_byte(index, stack)?;
                self.emit(Pla);
                if let Some(transfer) = register.transfer_from_accumulator() {
                    self.emit(transfer);
                }

                return Ok(());
            }

            Some(Intrinsic::LoadFromSymbol { symbol }) => {
                self.direct(Lda, symbol);
                self.emit(Pha);
                stack.push(callee.returns.clone());
                return Ok(());
            }

            Some(Intrinsic::CompileTimeExecuted { .. }) => return self.execute(index, index..index, stack),

            _ => (),
        }

        if callee.returns.size() > 1 {
            let reason = format!("`{}` returns multi-byte `{}`", callee, callee.returns);
            return Err(self.unsupported(index, reason));
        }

        self.pop_arguments(index, callee, stack)?;

        if let Some(Intrinsic::AlwaysInline) = callee.intrinsic {
            self.inline(callee)?;
        } else {
            self.direct(Jsr, &callee.label());
        }

        if !callee.returns.is_void() {
            self.emit(Pha);
            stack.push(callee.returns.clone());
        }

        Ok(())
    }

    /// Copia argumentos de la pila a las celdas de parámetros del callee.
    fn pop_arguments(
        &mut self,
        index: usize,
        callee: &Subroutine,
        stack: &mut EvaluationStack,
    ) -> Result<(), CompileError> {
        let memory = self.memory;

        for (n, ty) in callee.parameters.iter().enumerate().rev() {
            self.pop(index, stack)?;

            let allocation = memory
                .argument(callee.id, n as u16)
                .ok_or_else(|| CompileError::BadSlot {
                    subroutine: callee.full_name.to_string(),
                    what: "parameter",
                    slot: n as u16,
                })?;

            self.store(&allocation.symbol, ty.size());
        }

        Ok(())
    }

    /// Inserta el cuerpo ya compilado de un callee en el sitio de llamada.
    fn inline(&mut self, callee: &Subroutine) -> Result<(), CompileError> {
        let body = callee.body.as_ref().ok_or_else(|| CompileError::InlineOrder {
            caller: self.subroutine.full_name.to_string(),
            callee: callee.full_name.to_string(),
        })?;

        let site = self.unique_label("Inline");
        let end: Symbol = format!("{}_End", site).into();

        let defined: HashSet<&Symbol> = body
            .code
            .iter()
            .chain(body.data.iter())
            .filter_map(|line| match line {
                Line::Label(label) => Some(label),
                _ => None,
            })
            .collect();

        let rename = |symbol: &Symbol| -> Symbol {
            if defined.contains(symbol) {
                format!("{}_{}", symbol, site).into()
            } else {
                Rc::clone(symbol)
            }
        };

        let relabel = |line: &Line| match line {
            Line::Label(label) => Line::Label(rename(label)),
            Line::Instruction(instruction) => {
                let operand = instruction.operand.map_value(|value| match value.symbol() {
                    Some(symbol) => value.with_symbol(rename(symbol)),
                    None => value.clone(),
                });

                Line::Instruction(Instruction::new(instruction.mnemonic, operand))
            }

            other => other.clone(),
        };

        let trailing = body
            .code
            .iter()
            .rposition(|line| line.instruction().is_some())
            .filter(|&last| body.code[last].is(Rts));

        let mut jumps = false;
        for (i, line) in body.code.iter().enumerate() {
            if Some(i) == trailing {
                continue;
            } else if line.is(Rts) {
                self.direct(Jmp, &end);
                jumps = true;
            } else {
                self.code.push(relabel(line));
            }
        }

        if jumps {
            self.label(&end);
        }

        self.data.extend(body.data.iter().map(relabel));
        Ok(())
    }

    /// Evalúa una llamada en tiempo de compilación cuyos argumentos
    /// son las cargas de constantes en `arguments`.
    pub(super) fn execute(
        &mut self,
        call: usize,
        arguments: Range<usize>,
        stack: &mut EvaluationStack,
    ) -> Result<(), CompileError> {
        let (types, subroutine) = (self.types, self.subroutine);
        let instructions = &subroutine.instructions;

        let callee = match instructions[call].callee() {
            Some(callee) => &types[callee],
            None => return Err(self.unsupported(call, "compile-time evaluation of a non-call")),
        };

        let evaluator = match &callee.intrinsic {
            Some(Intrinsic::CompileTimeExecuted { evaluator }) => *evaluator,
            _ => return Err(self.unsupported(call, format!("`{}` is not compile-time executed", callee))),
        };

        let non_constant = || CompileError::NonConstantArgument {
            subroutine: subroutine.full_name.to_string(),
            callee: callee.full_name.to_string(),
            index: call,
            expected: callee.parameters.len(),
        };

        let mut bytes = Vec::with_capacity(arguments.len());
        for argument in arguments {
            match instructions[argument].operand {
                Operand::Constant(value) => bytes.push(u8::try_from(value).map_err(|_| non_constant())?),
                _ => return Err(non_constant()),
            }
        }

        if bytes.len() != callee.parameters.len() {
            return Err(non_constant());
        }

        match evaluator {
            Evaluator::Convert => {
                let &[value] = bytes.as_slice() else {
                    return Err(non_constant());
                };

                if callee.returns.size() != 1 {
                    let reason = format!("`{}` converts to multi-byte `{}`", callee, callee.returns);
                    return Err(self.unsupported(call, reason));
                }

                self.immediate(Lda, value);
                self.emit(Pha);

                stack.push(ValueType::Constant(Rc::new(CompileTimeConstant {
                    value: bytes,
                    ty: callee.returns.clone(),
                })));
            }

            Evaluator::Data => {
                let table = self.unique_label("Data");
                self.data.push(Line::Label(table.clone()));
                self.data.push(Line::Directive(Directive::Byte(bytes)));

                // Puntero de dos bytes, byte bajo primero
                self.emit_with(Lda, Mode::Immediate(Value::LowByte(table.clone())));
                self.emit(Pha);
                self.emit_with(Lda, Mode::Immediate(Value::HighByte(table)));
                self.emit(Pha);

                stack.push(ValueType::pointer_to(ValueType::byte(), false));
            }
        }

        Ok(())
    }
}
