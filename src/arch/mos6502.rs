//! Conjunto de instrucciones MOS 6502.
//!
//! El 6507 del Atari VCS ejecuta exactamente el mismo conjunto
//! de instrucciones que el 6502, con un bus de direcciones de
//! 13 bits. Aquí solo se modelan mnemónicos oficiales y los
//! modos de direccionamiento en su forma textual, ya que la
//! codificación binaria queda a cargo del ensamblador.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use super::Symbol;
use thiserror::Error;
use unicase::UniCase;

macro_rules! mnemonics {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Mnemónico de instrucción oficial.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($variant),*
        }

        impl Mnemonic {
            /// Todos los mnemónicos, en orden alfabético.
            pub const ALL: &'static [Mnemonic] = &[$(Mnemonic::$variant),*];

            /// Nombre en mayúsculas, tal como lo acepta el ensamblador.
            pub fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$variant => $name),*
                }
            }
        }
    };
}

mnemonics! {
    Adc => "ADC", And => "AND", Asl => "ASL", Bcc => "BCC", Bcs => "BCS",
    Beq => "BEQ", Bit => "BIT", Bmi => "BMI", Bne => "BNE", Bpl => "BPL",
    Brk => "BRK", Bvc => "BVC", Bvs => "BVS", Clc => "CLC", Cld => "CLD",
    Cli => "CLI", Clv => "CLV", Cmp => "CMP", Cpx => "CPX", Cpy => "CPY",
    Dec => "DEC", Dex => "DEX", Dey => "DEY", Eor => "EOR", Inc => "INC",
    Inx => "INX", Iny => "INY", Jmp => "JMP", Jsr => "JSR", Lda => "LDA",
    Ldx => "LDX", Ldy => "LDY", Lsr => "LSR", Nop => "NOP", Ora => "ORA",
    Pha => "PHA", Php => "PHP", Pla => "PLA", Plp => "PLP", Rol => "ROL",
    Ror => "ROR", Rti => "RTI", Rts => "RTS", Sbc => "SBC", Sec => "SEC",
    Sed => "SED", Sei => "SEI", Sta => "STA", Stx => "STX", Sty => "STY",
    Tax => "TAX", Tay => "TAY", Tsx => "TSX", Txa => "TXA", Txs => "TXS",
    Tya => "TYA",
}

impl Display for Mnemonic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.pad(self.name())
    }
}

impl FromStr for Mnemonic {
    type Err = SyntaxError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Mnemonic::ALL
            .iter()
            .copied()
            .find(|mnemonic| unicase::eq_ascii(mnemonic.name(), string))
            .ok_or_else(|| SyntaxError::Mnemonic(string.to_owned()))
    }
}

/// Registro de procesador visible al programador.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    A,
    X,
    Y,
}

impl Register {
    /// Instrucción que copia el acumulador a este registro, si hace falta.
    pub fn transfer_from_accumulator(self) -> Option<Mnemonic> {
        match self {
            Register::A => None,
            Register::X => Some(Mnemonic::Tax),
            Register::Y => Some(Mnemonic::Tay),
        }
    }
}

impl FromStr for Register {
    type Err = SyntaxError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let name = UniCase::ascii(string.trim());
        [Register::A, Register::X, Register::Y]
            .iter()
            .copied()
            .find(|register| UniCase::ascii(register.name()) == name)
            .ok_or_else(|| SyntaxError::Register(string.to_owned()))
    }
}

impl Register {
    fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::X => "X",
            Register::Y => "Y",
        }
    }
}

/// Valor de un operando.
///
/// Los símbolos se resuelven por el ensamblador, por lo cual
/// aquí se conservan sin evaluar.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// Byte literal, se imprime en decimal.
    Byte(u8),

    /// Dirección o palabra literal de 16 bits.
    Word(u16),

    /// Símbolo o etiqueta.
    Symbol(Symbol),

    /// `símbolo+k`.
    Offset(Symbol, u8),

    /// Byte bajo de un símbolo (`<símbolo`).
    LowByte(Symbol),

    /// Byte alto de un símbolo (`>símbolo`).
    HighByte(Symbol),
}

impl Value {
    /// Byte `k` de un objeto que reside en `symbol` y mide `size` bytes.
    pub fn byte_of(symbol: &Symbol, k: usize, size: usize) -> Value {
        match (size, k) {
            (1, _) | (_, 0) => Value::Symbol(symbol.clone()),
            _ => Value::Offset(symbol.clone(), k as u8),
        }
    }

    /// Símbolo referenciado por este valor, si lo hay.
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Byte(_) | Value::Word(_) => None,
            Value::Symbol(symbol)
            | Value::Offset(symbol, _)
            | Value::LowByte(symbol)
            | Value::HighByte(symbol) => Some(symbol),
        }
    }

    /// Reemplaza el símbolo referenciado, conservando la forma.
    pub fn with_symbol(&self, symbol: Symbol) -> Value {
        match self {
            Value::Byte(_) | Value::Word(_) => self.clone(),
            Value::Symbol(_) => Value::Symbol(symbol),
            Value::Offset(_, k) => Value::Offset(symbol, *k),
            Value::LowByte(_) => Value::LowByte(symbol),
            Value::HighByte(_) => Value::HighByte(symbol),
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(byte) => write!(fmt, "{}", byte),
            Value::Word(word) => write!(fmt, "${:04X}", word),
            Value::Symbol(symbol) => write!(fmt, "{}", symbol),
            Value::Offset(symbol, k) => write!(fmt, "{}+{}", symbol, k),
            Value::LowByte(symbol) => write!(fmt, "<{}", symbol),
            Value::HighByte(symbol) => write!(fmt, ">{}", symbol),
        }
    }
}

impl FromStr for Value {
    type Err = SyntaxError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let bad = || SyntaxError::Value(string.to_owned());
        let text = string.trim();

        let number = |digits: &str, radix: u32| -> Result<Value, SyntaxError> {
            let value = u16::from_str_radix(digits, radix).map_err(|_| bad())?;
            let wide = match radix {
                16 => digits.len() > 2,
                _ => value > 0xff,
            };

            Ok(if wide {
                Value::Word(value)
            } else {
                Value::Byte(value as u8)
            })
        };

        if let Some(hex) = text.strip_prefix('$') {
            number(hex, 16)
        } else if let Some(binary) = text.strip_prefix('%') {
            number(binary, 2)
        } else if text.starts_with(|c: char| c.is_ascii_digit()) {
            number(text, 10)
        } else if let Some(symbol) = text.strip_prefix('<') {
            Ok(Value::LowByte(parse_symbol(symbol).ok_or_else(bad)?))
        } else if let Some(symbol) = text.strip_prefix('>') {
            Ok(Value::HighByte(parse_symbol(symbol).ok_or_else(bad)?))
        } else if let Some((symbol, k)) = text.split_once('+') {
            let symbol = parse_symbol(symbol).ok_or_else(bad)?;
            let k = k.trim().parse().map_err(|_| bad())?;
            Ok(Value::Offset(symbol, k))
        } else {
            parse_symbol(text).map(Value::Symbol).ok_or_else(bad)
        }
    }
}

fn parse_symbol(text: &str) -> Option<Symbol> {
    let text = text.trim();
    let valid = !text.is_empty()
        && !text.starts_with(|c: char| c.is_ascii_digit())
        && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    valid.then(|| text.into())
}

/// Modo de direccionamiento junto con su valor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Implied,
    Immediate(Value),

    /// Página cero o absoluto, según lo decida el ensamblador.
    Direct(Value),

    IndexedX(Value),
    IndexedY(Value),

    /// `(v)`, solo para `JMP`.
    Indirect(Value),

    /// `(v,X)`.
    IndirectX(Value),

    /// `(v),Y`.
    IndirectY(Value),
}

impl Operand {
    /// Valor del operando, excepto en modo implícito.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Operand::Implied => None,
            Operand::Immediate(value)
            | Operand::Direct(value)
            | Operand::IndexedX(value)
            | Operand::IndexedY(value)
            | Operand::Indirect(value)
            | Operand::IndirectX(value)
            | Operand::IndirectY(value) => Some(value),
        }
    }

    /// Reemplaza el valor del operando, conservando el modo.
    pub fn map_value<F: FnOnce(&Value) -> Value>(&self, map: F) -> Operand {
        match self {
            Operand::Implied => Operand::Implied,
            Operand::Immediate(value) => Operand::Immediate(map(value)),
            Operand::Direct(value) => Operand::Direct(map(value)),
            Operand::IndexedX(value) => Operand::IndexedX(map(value)),
            Operand::IndexedY(value) => Operand::IndexedY(map(value)),
            Operand::Indirect(value) => Operand::Indirect(map(value)),
            Operand::IndirectX(value) => Operand::IndirectX(map(value)),
            Operand::IndirectY(value) => Operand::IndirectY(map(value)),
        }
    }

    /// Determina si el operando se refiere a una posición de memoria.
    pub fn is_memory(&self) -> bool {
        !matches!(self, Operand::Implied | Operand::Immediate(_))
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Implied => Ok(()),
            Operand::Immediate(value) => write!(fmt, "#{}", value),
            Operand::Direct(value) => write!(fmt, "{}", value),
            Operand::IndexedX(value) => write!(fmt, "{},X", value),
            Operand::IndexedY(value) => write!(fmt, "{},Y", value),
            Operand::Indirect(value) => write!(fmt, "({})", value),
            Operand::IndirectX(value) => write!(fmt, "({},X)", value),
            Operand::IndirectY(value) => write!(fmt, "({}),Y", value),
        }
    }
}

impl FromStr for Operand {
    type Err = SyntaxError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let text = string.trim();
        let upper = text.to_ascii_uppercase();

        let operand = if text.is_empty() || upper == "A" {
            Operand::Implied
        } else if let Some(value) = text.strip_prefix('#') {
            Operand::Immediate(value.parse()?)
        } else if upper.starts_with('(') && upper.ends_with(",X)") {
            Operand::IndirectX(text[1..text.len() - 3].parse()?)
        } else if upper.starts_with('(') && upper.ends_with("),Y") {
            Operand::IndirectY(text[1..text.len() - 3].parse()?)
        } else if text.starts_with('(') && text.ends_with(')') {
            Operand::Indirect(text[1..text.len() - 1].parse()?)
        } else if upper.ends_with(",X") {
            Operand::IndexedX(text[..text.len() - 2].parse()?)
        } else if upper.ends_with(",Y") {
            Operand::IndexedY(text[..text.len() - 2].parse()?)
        } else {
            Operand::Direct(text.parse()?)
        };

        Ok(operand)
    }
}

/// Instrucción de máquina.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic, operand: Operand) -> Self {
        Instruction { mnemonic, operand }
    }

    pub fn implied(mnemonic: Mnemonic) -> Self {
        Instruction::new(mnemonic, Operand::Implied)
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::Implied => write!(fmt, "{}", self.mnemonic),
            _ => write!(fmt, "{} {}", self.mnemonic, self.operand),
        }
    }
}

impl FromStr for Instruction {
    type Err = SyntaxError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let text = string.trim();
        let (mnemonic, operand) = match text.split_once(char::is_whitespace) {
            Some((mnemonic, operand)) => (mnemonic, operand),
            None => (text, ""),
        };

        Ok(Instruction::new(mnemonic.parse()?, operand.parse()?))
    }
}

/// Error de sintaxis en código ensamblador textual.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Unknown mnemonic `{0}`")]
    Mnemonic(String),

    #[error("Unknown register `{0}`")]
    Register(String),

    #[error("Bad operand value `{0}`")]
    Value(String),
}
