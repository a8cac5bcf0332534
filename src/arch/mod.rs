//! Detalles específicos de la máquina objetivo.
//!
//! El submódulo [`mos6502`] describe el conjunto de instrucciones
//! y [`vcs`] los parámetros de la plataforma. Los listados de
//! código se construyen como secuencias de [`Line`], las cuales
//! se imprimen en la sintaxis que acepta `dasm`.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

pub mod mos6502;
pub mod vcs;

pub use mos6502::{Instruction, Mnemonic, Operand, Register, Value};

/// Nombre de símbolo o etiqueta en ensamblador.
pub type Symbol = Rc<str>;

/// Directiva del ensamblador.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    Processor(&'static str),
    Include(&'static str),
    Org(u16),

    /// `NOMBRE = $dirección`.
    Equate(Symbol, u16),

    /// Palabra de 16 bits con el valor de un símbolo.
    Word(Symbol),

    /// Tabla de bytes literales.
    Byte(Vec<u8>),
}

/// Línea de un listado en ensamblador.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Directive(Directive),
    Label(Symbol),
    Instruction(Instruction),
    Comment(String),
    Blank,
}

impl Line {
    pub fn op(mnemonic: Mnemonic) -> Line {
        Line::Instruction(Instruction::implied(mnemonic))
    }

    pub fn with(mnemonic: Mnemonic, operand: Operand) -> Line {
        Line::Instruction(Instruction::new(mnemonic, operand))
    }

    pub fn comment<S: Into<String>>(text: S) -> Line {
        Line::Comment(text.into())
    }

    /// Obtiene la instrucción, si esta línea es una.
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            Line::Instruction(instruction) => Some(instruction),
            _ => None,
        }
    }

    /// Determina si esta línea es la instrucción indicada.
    pub fn is(&self, mnemonic: Mnemonic) -> bool {
        self.instruction()
            .map_or(false, |instruction| instruction.mnemonic == mnemonic)
    }
}

impl From<Instruction> for Line {
    fn from(instruction: Instruction) -> Self {
        Line::Instruction(instruction)
    }
}

impl Display for Line {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Directive(directive) => match directive {
                Directive::Processor(processor) => emit!(fmt, "processor", "{}", processor),
                Directive::Include(header) => emit!(fmt, "include", "\"{}\"", header),
                Directive::Org(address) => emit!(fmt, "org", "${:04X}", address),
                Directive::Equate(symbol, address) => write!(fmt, "{} = ${:02X}", symbol, address),
                Directive::Word(symbol) => emit!(fmt, ".word", "{}", symbol),
                Directive::Byte(bytes) => {
                    write!(fmt, "\t{:7} ", ".byte")?;
                    for (i, byte) in bytes.iter().enumerate() {
                        if i > 0 {
                            fmt.write_str(", ")?;
                        }

                        write!(fmt, "{}", byte)?;
                    }

                    Ok(())
                }
            },

            Line::Label(label) => write!(fmt, "{}", label),
            Line::Comment(text) => write!(fmt, "; {}", text),
            Line::Blank => Ok(()),

            Line::Instruction(Instruction { mnemonic, operand }) => match operand {
                Operand::Implied => emit!(fmt, mnemonic),
                _ => emit!(fmt, mnemonic, "{}", operand),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_render_in_dasm_syntax() {
        let store = Line::with(Mnemonic::Sta, Operand::Direct(Value::Symbol("COLUBK".into())));
        assert_eq!(store.to_string(), "\tSTA     COLUBK");
        assert_eq!(Line::op(Mnemonic::Rts).to_string(), "\tRTS");
        assert_eq!(Line::Label("Game_Main".into()).to_string(), "Game_Main");

        let org = Line::Directive(Directive::Org(vcs::ROM_ORIGIN));
        assert_eq!(org.to_string(), "\torg     $F000");

        let equate = Line::Directive(Directive::Equate("__TEMP0".into(), 0x80));
        assert_eq!(equate.to_string(), "__TEMP0 = $80");

        let table = Line::Directive(Directive::Byte(vec![1, 2, 255]));
        assert_eq!(table.to_string(), "\t.byte   1, 2, 255");
    }
}
