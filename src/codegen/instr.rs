//! Traducción de instrucciones individuales.

use super::Context;
use crate::{
    arch::{
        Mnemonic::{self, *},
        Operand as Mode, Symbol, Value,
    },
    error::CompileError,
    ir::{Instruction, Opcode, Operand},
    layout::Allocation,
    stack::EvaluationStack,
    types::{Field, FieldId, ValueType},
};

impl<'a> Context<'a> {
    pub(super) fn put_instruction(
        &mut self,
        index: usize,
        instruction: &Instruction,
        stack: &mut EvaluationStack,
    ) -> Result<(), CompileError> {
        use Opcode::*;

        match (&instruction.opcode, &instruction.operand) {
            (Nop, _) => (),

            (LoadConstant, &Operand::Constant(value)) => {
                let byte = u8::try_from(value).map_err(|_| CompileError::ConstantOverflow {
                    subroutine: self.subroutine.full_name.to_string(),
                    index,
                    value,
                })?;

                self.immediate(Lda, byte);
                self.emit(Pha);
                stack.push(ValueType::byte());
            }

            (LoadLocal, &Operand::Local(n)) => {
                let (symbol, ty) = self.local(n)?;
                self.load(&symbol, ty, stack);
            }

            (StoreLocal, &Operand::Local(n)) => {
                let (symbol, ty) = self.local(n)?;
                self.pop(index, stack)?;
                self.store(&symbol, ty.size());
            }

            (LoadArgument, &Operand::Argument(n)) => {
                let (symbol, ty) = self.argument(n)?;
                self.load(&symbol, ty, stack);
            }

            (StoreArgument, &Operand::Argument(n)) => {
                let (symbol, ty) = self.argument(n)?;
                self.pop(index, stack)?;
                self.store(&symbol, ty.size());
            }

            (LoadStaticField, &Operand::Field(id)) => {
                let (field, allocation) = self.static_field(index, id)?;
                self.load(&allocation.symbol, &field.ty, stack);
            }

            (StoreStaticField, &Operand::Field(id)) => {
                let (field, allocation) = self.static_field(index, id)?;
                self.pop(index, stack)?;
                self.store(&allocation.symbol, field.ty.size());
            }

            (LoadStaticFieldAddress, &Operand::Field(id)) => {
                let (field, allocation) = self.static_field(index, id)?;
                if !allocation.is_zero_page() {
                    let reason = format!("`{}` is outside the zero page", allocation.symbol);
                    return Err(self.unsupported(index, reason));
                }

                self.emit_with(Lda, Mode::Immediate(Value::Symbol(allocation.symbol.clone())));
                self.emit(Pha);
                stack.push(ValueType::pointer_to(field.ty.clone(), true));
            }

            (LoadField, &Operand::Field(id)) => {
                let (field, offset) = self.instance_field(index, id)?;
                self.pop_address(index, stack)?;

                self.emit(Pla);
                self.emit(Tax);
                for k in 0..field.ty.size() {
                    let byte = self.indexed(index, usize::from(offset) + k)?;
                    self.emit_with(Lda, byte);
                    self.emit(Pha);
                }

                stack.push(field.ty.clone());
            }

            (LoadFieldAddress, &Operand::Field(id)) => {
                let (field, offset) = self.instance_field(index, id)?;
                self.pop_address(index, stack)?;

                self.emit(Pla);
                if offset != 0 {
                    self.emit(Clc);
                    self.immediate(Adc, offset);
                }

                self.emit(Pha);
                stack.push(ValueType::pointer_to(field.ty.clone(), true));
            }

            (StoreField, &Operand::Field(id)) => {
                let (field, offset) = self.instance_field(index, id)?;
                self.pop(index, stack)?;
                self.pop_address(index, stack)?;
                self.store_field(index, field.ty.size(), offset)?;
            }

            (InitObject, Operand::Type(ty)) => {
                let size = ty.size();
                self.byte_offset(index, size.saturating_sub(1))?;
                self.pop_address(index, stack)?;

                self.emit(Pla);
                self.emit(Tax);
                self.immediate(Lda, 0);
                for k in 0..size {
                    let byte = self.indexed(index, k)?;
                    self.emit_with(Sta, byte);
                }
            }

            (Add, _) => self.arithmetic(index, stack, Clc, Adc)?,
            (Subtract, _) => self.arithmetic(index, stack, Sec, Sbc)?,

            // a > b: distinto y sin préstamo
            (CompareGreater, _) => self.compare(index, stack, "Cgt", &[(Beq, false), (Bcs, true)])?,
            (CompareEqual, _) => self.compare(index, stack, "Ceq", &[(Beq, true)])?,
            (CompareLess, _) => self.compare(index, stack, "Clt", &[(Bcc, true)])?,

            (Convert, _) => {
                self.pop_byte(index, stack)?;
                stack.push(ValueType::byte());
            }

            (Duplicate, _) => {
                let ty = self.pop(index, stack)?;
                match ty.size() {
                    0 => (),
                    1 => {
                        self.emit(Pla);
                        self.emit(Pha);
                        self.emit(Pha);
                    }

                    _ => return Err(self.unsupported(index, format!("cannot duplicate `{}`", ty))),
                }

                stack.push(ty.clone());
                stack.push(ty);
            }

            (Pop, _) => {
                let ty = self.pop(index, stack)?;
                for _ in 0..ty.size() {
                    self.emit(Pla);
                }
            }

            (Branch, &Operand::Target(target)) => {
                let label = self.instruction_label(target);
                self.direct(Jmp, &label);
            }

            (BranchIfTrue, &Operand::Target(target)) => {
                self.pop_byte(index, stack)?;
                let label = self.instruction_label(target);
                self.emit(Pla);
                self.direct(Bne, &label);
            }

            (BranchIfFalse, &Operand::Target(target)) => {
                self.pop_byte(index, stack)?;
                let label = self.instruction_label(target);
                self.emit(Pla);
                self.direct(Beq, &label);
            }

            (Call, &Operand::Method(callee)) => self.call(index, callee, stack)?,

            (Return, _) => {
                let subroutine = self.subroutine;
                let returns = &subroutine.returns;
                match returns.size() {
                    0 => (),
                    1 => {
                        self.pop(index, stack)?;
                        self.emit(Pla);
                    }

                    _ => {
                        let reason = format!("multi-byte return value of type `{}`", returns);
                        return Err(self.unsupported(index, reason));
                    }
                }

                self.emit(Rts);
            }

            (Other(opcode), _) => {
                return Err(CompileError::UnsupportedOpcode {
                    subroutine: self.subroutine.full_name.to_string(),
                    index,
                    opcode: opcode.to_string(),
                })
            }

            (opcode, _) => {
                return Err(CompileError::BadOperand {
                    subroutine: self.subroutine.full_name.to_string(),
                    index,
                    opcode: opcode.to_string(),
                    expected: opcode.operand_kind().name(),
                })
            }
        }

        Ok(())
    }

    /// Dirección en página cero en el tope de la pila, de un byte.
    fn pop_address(&self, index: usize, stack: &mut EvaluationStack) -> Result<(), CompileError> {
        let ty = self.pop(index, stack)?;
        match ty.size() {
            1 => Ok(()),
            _ => Err(self.unsupported(index, format!("`{}` is not a zero-page address", ty))),
        }
    }

    fn store_field(&mut self, index: usize, size: usize, offset: u8) -> Result<(), CompileError> {
        match size {
            // Solo se descarta la dirección
            0 => self.emit(Pla),

            1 => {
                self.emit(Pla);
                self.emit(Tax);
                self.emit(Pla);
                self.emit(Tay);
                self.emit_with(Stx, Mode::IndexedY(Value::Byte(offset)));
            }

            _ => {
                // La dirección yace debajo de los `size` bytes del valor
                let depth = self.byte_offset(index, size + 1)?;
                self.byte_offset(index, usize::from(offset) + size - 1)?;

                self.emit(Tsx);
                self.emit_with(Ldy, Mode::IndexedX(Value::Byte(depth)));
                self.emit(Tya);
                self.emit(Tax);

                for k in (0..size).rev() {
                    let byte = self.indexed(index, usize::from(offset) + k)?;
                    self.emit(Pla);
                    self.emit_with(Sta, byte);
                }

                self.emit(Pla);
            }
        }

        Ok(())
    }

    /// Byte `offset` de un objeto apuntado por X.
    fn indexed(&self, index: usize, offset: usize) -> Result<Mode, CompileError> {
        let offset = self.byte_offset(index, offset)?;
        Ok(Mode::IndexedX(Value::Byte(offset)))
    }

    fn arithmetic(
        &mut self,
        index: usize,
        stack: &mut EvaluationStack,
        carry: Mnemonic,
        operation: Mnemonic,
    ) -> Result<(), CompileError> {
        self.pop_byte(index, stack)?;
        self.pop_byte(index, stack)?;

        let temporary = self.memory.temporary(0).clone();
        self.emit(Pla);
        self.direct(Sta, &temporary);
        self.emit(Pla);
        self.emit(carry);
        self.direct(operation, &temporary);
        self.emit(Pha);

        stack.push(ValueType::byte());
        Ok(())
    }

    /// Sintetiza 0 o 1 a partir de las banderas de `CMP`.
    ///
    /// Cada salto va a la etiqueta verdadera o a la falsa.
    fn compare(
        &mut self,
        index: usize,
        stack: &mut EvaluationStack,
        stem: &str,
        branches: &[(Mnemonic, bool)],
    ) -> Result<(), CompileError> {
        self.pop_byte(index, stack)?;
        self.pop_byte(index, stack)?;

        let if_false = self.unique_label(&format!("{}False", stem));
        let if_true = self.unique_label(&format!("{}True", stem));
        let end = self.unique_label(&format!("{}End", stem));

        let temporary = self.memory.temporary(0).clone();
        self.emit(Pla);
        self.direct(Sta, &temporary);
        self.emit(Pla);
        self.direct(Cmp, &temporary);

        for &(branch, outcome) in branches {
            let target = if outcome { &if_true } else { &if_false };
            self.direct(branch, target);
        }

        self.label(&if_false);
        self.immediate(Lda, 0);
        self.direct(Beq, &end);
        self.label(&if_true);
        self.immediate(Lda, 1);
        self.label(&end);
        self.emit(Pha);

        stack.push(ValueType::bool());
        Ok(())
    }

    fn local(&self, n: u16) -> Result<(Symbol, &'a ValueType), CompileError> {
        let subroutine = self.subroutine;
        let ty = subroutine.locals.get(usize::from(n));
        let allocation = self.memory.local(subroutine.id, n);

        match (ty, allocation) {
            (Some(ty), Some(allocation)) => Ok((allocation.symbol.clone(), ty)),
            _ => Err(CompileError::BadSlot {
                subroutine: subroutine.full_name.to_string(),
                what: "local",
                slot: n,
            }),
        }
    }

    fn argument(&self, n: u16) -> Result<(Symbol, &'a ValueType), CompileError> {
        let subroutine = self.subroutine;
        let ty = subroutine.parameters.get(usize::from(n));
        let allocation = self.memory.argument(subroutine.id, n);

        match (ty, allocation) {
            (Some(ty), Some(allocation)) => Ok((allocation.symbol.clone(), ty)),
            _ => Err(CompileError::BadSlot {
                subroutine: subroutine.full_name.to_string(),
                what: "parameter",
                slot: n,
            }),
        }
    }

    fn static_field(&self, index: usize, id: FieldId) -> Result<(&'a Field, &'a Allocation), CompileError> {
        let (types, memory) = (self.types, self.memory);
        let field = &types[id];

        match memory.field(id) {
            Some(allocation) if field.is_static => Ok((field, allocation)),
            _ => Err(self.unsupported(index, format!("`{}` is not a static field", field.name))),
        }
    }

    /// Campo de instancia y su desplazamiento, el cual debe caber en un byte.
    fn instance_field(&self, index: usize, id: FieldId) -> Result<(&'a Field, u8), CompileError> {
        let types = self.types;
        let field = &types[id];

        let offset = field
            .offset
            .ok_or_else(|| self.unsupported(index, format!("`{}` is a static field", field.name)))?;

        let last = offset + field.ty.size().max(1) - 1;
        self.byte_offset(index, last)?;

        Ok((field, self.byte_offset(index, offset)?))
    }
}
