//! Generación de código por subrutina.
//!
//! Las subrutinas se compilan en el orden topológico del grafo de
//! llamadas, de modo que toda subrutina a expandir en línea ya tiene
//! cuerpo cuando se compilan sus callers. Cada cuerpo compilado se
//! integra a una nueva versión de la tabla de tipos.
//!
//! Todo valor de un byte pasa por el acumulador y la pila de hardware
//! por medio de `PHA`/`PLA`. Los valores de varios bytes se empujan
//! del byte 0 al byte n-1 y se extraen en orden inverso.

use std::rc::Rc;

use tracing::{debug, info};

use crate::{
    arch::{Line, Mnemonic, Operand, Symbol, Value},
    callgraph::CallGraph,
    cfg,
    error::CompileError,
    layout::{MemoryMap, Ram},
    peephole,
    stack::{EvaluationStack, StackTracker},
    support::SupportLibrary,
    table::TypeTable,
    types::{CompiledBody, Intrinsic, Subroutine, ValueType},
};

mod call;
mod instr;
mod plan;

use plan::Action;

/// Opciones de compilación a nivel de biblioteca.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Aplicar el optimizador peephole a cada cuerpo.
    pub optimize: bool,

    /// Regiones de RAM disponibles.
    pub ram: Ram,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            optimize: true,
            ram: Ram::vcs(),
        }
    }
}

/// Compila toda subrutina alcanzable y retorna la tabla resultante.
pub fn compile(
    types: TypeTable,
    graph: &CallGraph,
    memory: &MemoryMap,
    support: &SupportLibrary,
    options: &CompileOptions,
) -> Result<TypeTable, CompileError> {
    let mut types = types;

    for &id in graph.topological_order() {
        let subroutine = match types.subroutine(id) {
            Some(subroutine) => Rc::clone(subroutine),
            None => continue,
        };

        if subroutine.is(Intrinsic::replaces_call_site) {
            continue;
        }

        info!("Compiling {}", subroutine);

        let body = compile_subroutine(&types, &subroutine, memory, support, options)?;
        types = types.with_replaced_subroutine(subroutine.with_body(body))?;
    }

    Ok(types)
}

fn compile_subroutine(
    types: &TypeTable,
    subroutine: &Subroutine,
    memory: &MemoryMap,
    support: &SupportLibrary,
    options: &CompileOptions,
) -> Result<CompiledBody, CompileError> {
    match &subroutine.intrinsic {
        Some(Intrinsic::UseProvidedImplementation { implementation }) => {
            let code = support
                .get(implementation)
                .ok_or_else(|| CompileError::MissingImplementation {
                    subroutine: subroutine.full_name.to_string(),
                    implementation: implementation.to_string(),
                })?;

            Ok(CompiledBody {
                code: Rc::clone(code),
                data: Rc::new([]),
            })
        }

        Some(Intrinsic::IgnoreImplementation) => Ok(CompiledBody {
            code: Rc::new([Line::op(Mnemonic::Rts)]),
            data: Rc::new([]),
        }),

        _ => {
            let body = Context::new(types, memory, subroutine).compile()?;
            if !options.optimize {
                return Ok(body);
            }

            Ok(CompiledBody {
                code: peephole::optimize(&body.code).into(),
                data: body.data,
            })
        }
    }
}

/// Estado de compilación de una única subrutina.
pub(crate) struct Context<'a> {
    types: &'a TypeTable,
    memory: &'a MemoryMap,
    subroutine: &'a Subroutine,
    label: Symbol,
    code: Vec<Line>,
    data: Vec<Line>,
    sequence: u32,
}

impl<'a> Context<'a> {
    pub fn new(types: &'a TypeTable, memory: &'a MemoryMap, subroutine: &'a Subroutine) -> Self {
        Context {
            types,
            memory,
            subroutine,
            label: subroutine.label(),
            code: Vec::new(),
            data: Vec::new(),
            sequence: 0,
        }
    }

    pub fn compile(mut self) -> Result<CompiledBody, CompileError> {
        let subroutine = self.subroutine;
        let instructions = &subroutine.instructions;

        let actions = plan::plan(self.types, subroutine)?;
        let targets = cfg::branch_targets(instructions);
        let mut tracker = StackTracker::new(&subroutine.cfg);

        for action in actions {
            // Las etiquetas de instrucciones absorbidas también se emiten
            for index in action.range() {
                if targets.contains(&index) {
                    let label = self.instruction_label(index);
                    self.code.push(Line::Label(label));
                }
            }

            let stack = tracker.enter(action.anchor());
            match action {
                Action::Compile(index) => self.put_instruction(index, &instructions[index], stack)?,
                Action::Execute { call, arguments } => self.execute(call, arguments, stack)?,
            }
        }

        debug!(
            "{} compiled to {} lines and {} data lines",
            subroutine,
            self.code.len(),
            self.data.len()
        );

        Ok(CompiledBody {
            code: self.code.into(),
            data: self.data.into(),
        })
    }

    fn emit(&mut self, mnemonic: Mnemonic) {
        self.code.push(Line::op(mnemonic));
    }

    fn emit_with(&mut self, mnemonic: Mnemonic, operand: Operand) {
        self.code.push(Line::with(mnemonic, operand));
    }

    fn immediate(&mut self, mnemonic: Mnemonic, byte: u8) {
        self.emit_with(mnemonic, Operand::Immediate(Value::Byte(byte)));
    }

    fn direct(&mut self, mnemonic: Mnemonic, symbol: &Symbol) {
        self.emit_with(mnemonic, Operand::Direct(Value::Symbol(symbol.clone())));
    }

    fn label(&mut self, label: &Symbol) {
        self.code.push(Line::Label(label.clone()));
    }

    /// `LDA símbolo(+k); PHA` por cada byte, del byte 0 en adelante.
    fn load(&mut self, symbol: &Symbol, ty: &ValueType, stack: &mut EvaluationStack) {
        let size = ty.size();
        for k in 0..size {
            self.emit_with(Mnemonic::Lda, Operand::Direct(Value::byte_of(symbol, k, size)));
            self.emit(Mnemonic::Pha);
        }

        stack.push(ty.clone());
    }

    /// `PLA; STA símbolo(+k)` por cada byte, del último al primero.
    fn store(&mut self, symbol: &Symbol, size: usize) {
        for k in (0..size).rev() {
            self.emit(Mnemonic::Pla);
            self.emit_with(Mnemonic::Sta, Operand::Direct(Value::byte_of(symbol, k, size)));
        }
    }

    fn pop(&self, index: usize, stack: &mut EvaluationStack) -> Result<ValueType, CompileError> {
        stack.pop().ok_or_else(|| CompileError::StackUnderflow {
            subroutine: self.subroutine.full_name.to_string(),
            index,
        })
    }

    /// Extrae un operando que debe medir exactamente un byte.
    fn pop_byte(&self, index: usize, stack: &mut EvaluationStack) -> Result<ValueType, CompileError> {
        let ty = self.pop(index, stack)?;
        match ty.size() {
            1 => Ok(ty),
            _ => Err(self.unsupported(index, format!("operand of type `{}` is not a single byte", ty))),
        }
    }

    fn instruction_label(&self, index: usize) -> Symbol {
        format!("{}_IL_{:04}", self.label, index).into()
    }

    /// Etiqueta única dentro de esta subrutina.
    fn unique_label(&mut self, stem: &str) -> Symbol {
        self.sequence += 1;
        format!("{}_{}_{}", self.label, stem, self.sequence).into()
    }

    fn unsupported<S: Into<String>>(&self, index: usize, reason: S) -> CompileError {
        CompileError::UnsupportedComposite {
            subroutine: self.subroutine.full_name.to_string(),
            index,
            reason: reason.into(),
        }
    }

    /// Desplazamiento direccionable con modo indexado de página cero.
    fn byte_offset(&self, index: usize, offset: usize) -> Result<u8, CompileError> {
        u8::try_from(offset)
            .map_err(|_| self.unsupported(index, format!("offset {} does not fit in a byte", offset)))
    }
}
