//! Representación intermedia de entrada.
//!
//! Cada subrutina llega como un flujo lineal de instrucciones de una
//! máquina de pila. Los operandos ya se encuentran resueltos contra
//! la tabla de tipos durante la ingesta.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use crate::types::{FieldId, SubroutineId, ValueType};

/// Código de operación.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    LoadConstant,
    LoadLocal,
    LoadArgument,
    StoreLocal,
    StoreArgument,
    LoadStaticField,
    StoreStaticField,
    LoadStaticFieldAddress,
    LoadField,
    LoadFieldAddress,
    StoreField,
    InitObject,
    Add,
    Subtract,
    CompareGreater,
    CompareEqual,
    CompareLess,
    Convert,
    Duplicate,
    Pop,
    Branch,
    BranchIfTrue,
    BranchIfFalse,
    Call,
    Return,

    /// Opcode reconocido por el front end, pero sin traducción.
    Other(Rc<str>),
}

/// Clase de operando que requiere cada opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Constant,
    Local,
    Argument,
    Field,
    Method,
    Type,
    Target,
}

impl OperandKind {
    pub fn name(self) -> &'static str {
        match self {
            OperandKind::None => "empty",
            OperandKind::Constant => "constant",
            OperandKind::Local => "local",
            OperandKind::Argument => "argument",
            OperandKind::Field => "field",
            OperandKind::Method => "method",
            OperandKind::Type => "type",
            OperandKind::Target => "branch target",
        }
    }
}

const NAMES: &[(&str, Opcode)] = &[
    ("nop", Opcode::Nop),
    ("ldc", Opcode::LoadConstant),
    ("ldloc", Opcode::LoadLocal),
    ("ldarg", Opcode::LoadArgument),
    ("stloc", Opcode::StoreLocal),
    ("starg", Opcode::StoreArgument),
    ("ldsfld", Opcode::LoadStaticField),
    ("stsfld", Opcode::StoreStaticField),
    ("ldsflda", Opcode::LoadStaticFieldAddress),
    ("ldfld", Opcode::LoadField),
    ("ldflda", Opcode::LoadFieldAddress),
    ("stfld", Opcode::StoreField),
    ("initobj", Opcode::InitObject),
    ("add", Opcode::Add),
    ("sub", Opcode::Subtract),
    ("cgt", Opcode::CompareGreater),
    ("ceq", Opcode::CompareEqual),
    ("clt", Opcode::CompareLess),
    ("conv", Opcode::Convert),
    ("dup", Opcode::Duplicate),
    ("pop", Opcode::Pop),
    ("br", Opcode::Branch),
    ("brtrue", Opcode::BranchIfTrue),
    ("brfalse", Opcode::BranchIfFalse),
    ("call", Opcode::Call),
    ("ret", Opcode::Return),
];

impl Opcode {
    /// Resuelve un nombre de opcode, sin distinguir mayúsculas.
    ///
    /// Los nombres desconocidos no son un error en este punto: se
    /// conservan como [`Opcode::Other`] y fallan al generar código.
    pub fn from_name(name: &str) -> Opcode {
        NAMES
            .iter()
            .find(|(known, _)| unicase::eq_ascii(*known, name))
            .map(|(_, opcode)| opcode.clone())
            .unwrap_or_else(|| Opcode::Other(name.into()))
    }

    pub fn name(&self) -> &str {
        match self {
            Opcode::Other(name) => name,
            known => NAMES
                .iter()
                .find(|(_, opcode)| opcode == known)
                .map_or("?", |(name, _)| name),
        }
    }

    pub fn operand_kind(&self) -> OperandKind {
        use Opcode::*;

        match self {
            LoadConstant => OperandKind::Constant,
            LoadLocal | StoreLocal => OperandKind::Local,
            LoadArgument | StoreArgument => OperandKind::Argument,
            LoadStaticField | StoreStaticField | LoadStaticFieldAddress | LoadField
            | LoadFieldAddress | StoreField => OperandKind::Field,
            InitObject => OperandKind::Type,
            Branch | BranchIfTrue | BranchIfFalse => OperandKind::Target,
            Call => OperandKind::Method,
            _ => OperandKind::None,
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Operando ya resuelto.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    None,
    Constant(i64),
    Local(u16),
    Argument(u16),
    Field(FieldId),
    Method(SubroutineId),
    Type(ValueType),

    /// Índice de instrucción destino dentro de la misma subrutina.
    Target(usize),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Constant(_) => OperandKind::Constant,
            Operand::Local(_) => OperandKind::Local,
            Operand::Argument(_) => OperandKind::Argument,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
            Operand::Type(_) => OperandKind::Type,
            Operand::Target(_) => OperandKind::Target,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Destino de salto, si esta instrucción es un salto.
    pub fn branch_target(&self) -> Option<usize> {
        match (&self.opcode, &self.operand) {
            (Opcode::Branch | Opcode::BranchIfTrue | Opcode::BranchIfFalse, Operand::Target(target)) => {
                Some(*target)
            }

            _ => None,
        }
    }

    /// Determina si esta instrucción termina un bloque básico.
    pub fn ends_block(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Branch | Opcode::BranchIfTrue | Opcode::BranchIfFalse | Opcode::Return
        )
    }

    /// Determina si la ejecución puede continuar en la siguiente instrucción.
    pub fn falls_through(&self) -> bool {
        !matches!(self.opcode, Opcode::Branch | Opcode::Return)
    }

    /// Subrutina invocada, si esta instrucción es una llamada.
    pub fn callee(&self) -> Option<SubroutineId> {
        match (&self.opcode, &self.operand) {
            (Opcode::Call, Operand::Method(id)) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_names_resolve_without_case() {
        assert_eq!(Opcode::from_name("LdLoc"), Opcode::LoadLocal);
        assert_eq!(Opcode::from_name("brfalse"), Opcode::BranchIfFalse);
        assert_eq!(Opcode::from_name("mul"), Opcode::Other("mul".into()));
        assert_eq!(Opcode::StoreField.to_string(), "stfld");
    }

    #[test]
    fn branches_end_blocks() {
        let branch = Instruction::new(Opcode::BranchIfTrue, Operand::Target(3));
        assert_eq!(branch.branch_target(), Some(3));
        assert!(branch.ends_block());
        assert!(branch.falls_through());

        let ret = Instruction::new(Opcode::Return, Operand::None);
        assert!(ret.ends_block());
        assert!(!ret.falls_through());
        assert_eq!(ret.branch_target(), None);
    }
}
