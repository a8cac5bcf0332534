//! Construcción de la imagen binaria.
//!
//! Una vez que se ha emitido código ensamblador, este debe ser
//! ensamblado por `dasm` para producir una ROM de cartucho. El
//! ensamblador resuelve todas las etiquetas y escribe la imagen en
//! formato crudo (`-f3`), sin encabezado.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, info};

bitflags! {
    /// Archivos adicionales a solicitar al ensamblador.
    pub struct AssembleOptions: u32 {
        /// Tabla de símbolos, útil para depurar en emuladores.
        const SYMBOLS = 0x01;

        /// Listado con direcciones y bytes por línea.
        const LISTING = 0x02;
    }
}

/// Un error de ensamblado.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AssemblerError {
    /// Ocurrió un evento de error de E/S durante la invocación
    /// del ensamblador.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// El ensamblador inició su ejecución, pero falló en ensamblar.
    #[error("Assembler exited with status code {0:?}\n{1}")]
    Failed(ExitStatus, String),
}

/// Invocación de `dasm`.
#[derive(Clone, Debug)]
pub struct Assembler {
    command: PathBuf,
    include: Vec<PathBuf>,
}

/// Archivos producidos por una invocación exitosa.
#[derive(Clone, Debug)]
pub struct RomInfo {
    pub binary: PathBuf,
    pub symbols: Option<PathBuf>,
    pub listing: Option<PathBuf>,

    /// Salida estándar del ensamblador, incluye el tamaño final.
    pub output: String,
}

impl Default for Assembler {
    fn default() -> Self {
        Assembler::new("dasm")
    }
}

impl Assembler {
    pub fn new<P: Into<PathBuf>>(command: P) -> Self {
        Assembler {
            command: command.into(),
            include: Vec::new(),
        }
    }

    /// Agrega un directorio de búsqueda para `include`, donde debe
    /// hallarse `vcs.h`.
    pub fn include<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.include.push(directory.into());
        self
    }

    /// Ensambla `source` en una imagen junto a él, con extensión `.bin`.
    pub fn assemble<S>(&self, source: &S, opts: AssembleOptions) -> Result<RomInfo, AssemblerError>
    where
        S: AsRef<Path>,
    {
        let source = source.as_ref();
        let binary = source.with_extension("bin");
        let symbols = opts
            .contains(AssembleOptions::SYMBOLS)
            .then(|| source.with_extension("sym"));
        let listing = opts
            .contains(AssembleOptions::LISTING)
            .then(|| source.with_extension("lst"));

        let mut command = Command::new(&self.command);
        command
            .arg(source)
            .arg("-f3")
            .arg(flag("-o", &binary));

        if let Some(symbols) = &symbols {
            command.arg(flag("-s", symbols));
        }

        if let Some(listing) = &listing {
            command.arg(flag("-l", listing));
        }

        for directory in &self.include {
            command.arg(flag("-I", directory));
        }

        debug!("Running {:?}", command);

        let result = command.output()?;
        let output = String::from_utf8_lossy(&result.stdout).into_owned();

        if !result.status.success() {
            let mut log = output;
            log.push_str(&String::from_utf8_lossy(&result.stderr));
            return Err(AssemblerError::Failed(result.status, log));
        }

        info!("Assembled {}", binary.display());

        Ok(RomInfo {
            binary,
            symbols,
            listing,
            output,
        })
    }
}

/// `dasm` espera opciones y rutas sin separación.
fn flag(option: &str, path: &Path) -> OsString {
    let mut flag = OsString::from(option);
    flag.push(path);
    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_joined_to_paths() {
        assert_eq!(flag("-o", Path::new("out/game.bin")), OsString::from("-oout/game.bin"));
    }

    #[test]
    fn missing_assembler_is_an_io_error() {
        let assembler = Assembler::new("/nonexistent/dasm");
        let result = assembler.assemble(&"game.asm", AssembleOptions::empty());
        assert!(matches!(result, Err(AssemblerError::Io(_))));
    }
}
