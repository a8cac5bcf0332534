//! Biblioteca de soporte.
//!
//! Las subrutinas marcadas con `use_provided_implementation` toman su
//! cuerpo de un archivo de ensamblador escrito a mano, con el formato:
//!
//! ```text
//! ; comentario
//! .impl Nombre
//! Etiqueta:
//!     LDA #0
//!     RTS
//! .end
//! ```

use std::{collections::HashMap, fs, path::Path, rc::Rc, str::FromStr};

use thiserror::Error;
use tracing::debug;

use crate::arch::{Instruction, Line};

#[derive(Clone, Debug, Default)]
pub struct SupportLibrary {
    implementations: HashMap<String, Rc<[Line]>>,
}

/// Error al cargar una biblioteca de soporte.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupportError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Implementation `{0}` is defined more than once")]
    Duplicate(String),
}

impl SupportLibrary {
    pub fn empty() -> Self {
        SupportLibrary::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SupportError> {
        let text = fs::read_to_string(path)?;
        SupportLibrary::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, SupportError> {
        let mut implementations = HashMap::new();
        let mut current: Option<(String, Vec<Line>)> = None;

        for (number, raw) in text.lines().enumerate() {
            let number = number + 1;
            let syntax = |message: String| SupportError::Syntax { line: number, message };

            let text = match raw.split_once(';') {
                Some((code, _)) => code.trim(),
                None => raw.trim(),
            };

            if text.is_empty() {
                continue;
            }

            if let Some(name) = text.strip_prefix(".impl") {
                let name = name.trim();
                if let Some((open, _)) = &current {
                    return Err(syntax(format!("`.impl {}` inside `.impl {}`", name, open)));
                } else if name.is_empty() {
                    return Err(syntax(String::from("expected an implementation name")));
                }

                current = Some((name.to_owned(), Vec::new()));
                continue;
            }

            let (name, lines) = match &mut current {
                Some((name, lines)) => (name, lines),
                None => return Err(syntax(format!("`{}` outside of any `.impl`", text))),
            };

            if text == ".end" {
                let name = std::mem::take(name);
                let lines: Rc<[Line]> = std::mem::take(lines).into();

                debug!("Support implementation {} has {} lines", name, lines.len());
                if implementations.insert(name.clone(), lines).is_some() {
                    return Err(SupportError::Duplicate(name));
                }

                current = None;
            } else if let Some(label) = text.strip_suffix(':') {
                lines.push(Line::Label(label.trim().into()));
            } else {
                let instruction = Instruction::from_str(text).map_err(|error| syntax(error.to_string()))?;
                lines.push(Line::Instruction(instruction));
            }
        }

        if let Some((name, _)) = current {
            return Err(SupportError::Syntax {
                line: text.lines().count(),
                message: format!("`.impl {}` is never closed", name),
            });
        }

        Ok(SupportLibrary { implementations })
    }

    pub fn get(&self, name: &str) -> Option<&Rc<[Line]>> {
        self.implementations.get(name)
    }

    pub fn len(&self) -> usize {
        self.implementations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.implementations.is_empty()
    }
}

impl FromStr for SupportLibrary {
    type Err = SupportError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        SupportLibrary::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Mnemonic, Operand, Value};

    const LIBRARY: &str = "
        ; Rutinas del kernel
        .impl WaitForVblank
        Loop:
            LDA INTIM   ; temporizador
            BNE Loop
            RTS
        .end

        .impl Nothing
            rts
        .end
    ";

    #[test]
    fn implementations_are_parsed() {
        let library: SupportLibrary = LIBRARY.parse().unwrap();
        assert_eq!(library.len(), 2);

        let wait = library.get("WaitForVblank").unwrap();
        assert_eq!(wait.len(), 4);
        assert_eq!(wait[0], Line::Label("Loop".into()));
        assert_eq!(
            wait[1],
            Line::with(Mnemonic::Lda, Operand::Direct(Value::Symbol("INTIM".into())))
        );
        assert!(wait[3].is(Mnemonic::Rts));

        assert_eq!(&**library.get("Nothing").unwrap(), &[Line::op(Mnemonic::Rts)][..]);
        assert!(library.get("Missing").is_none());
    }

    #[test]
    fn malformed_libraries_are_rejected() {
        let unclosed = SupportLibrary::parse(".impl A\nRTS\n");
        assert!(matches!(unclosed, Err(SupportError::Syntax { line: 2, .. })));

        let outside = SupportLibrary::parse("RTS\n");
        assert!(matches!(outside, Err(SupportError::Syntax { line: 1, .. })));

        let bad = SupportLibrary::parse(".impl A\nFOO #1\n.end\n");
        assert!(matches!(bad, Err(SupportError::Syntax { line: 2, .. })));

        let twice = SupportLibrary::parse(".impl A\nRTS\n.end\n.impl A\nRTS\n.end\n");
        assert!(matches!(twice, Err(SupportError::Duplicate(name)) if name == "A"));
    }
}
