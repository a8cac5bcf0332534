//! Optimizador peephole.
//!
//! Opera sobre pares de instrucciones adyacentes del listado de una
//! subrutina. Cualquier línea que no sea instrucción, en particular
//! etiquetas y comentarios, interrumpe la adyacencia.

use tracing::debug;

use crate::arch::{Line, Mnemonic};

/// Aplica una pasada de optimización.
///
/// - `PHA` seguido de `PLA` se elimina por completo.
/// - `STA x` seguido de `LDA x` conserva únicamente el `STA`.
pub fn optimize(lines: &[Line]) -> Vec<Line> {
    let mut output: Vec<Line> = Vec::with_capacity(lines.len());
    let (mut push_pull, mut reloads) = (0, 0);

    for line in lines {
        let previous = output.last().and_then(Line::instruction);
        let current = line.instruction();

        if let (Some(previous), Some(current)) = (previous, current) {
            match (previous.mnemonic, current.mnemonic) {
                (Mnemonic::Pha, Mnemonic::Pla) => {
                    output.pop();
                    push_pull += 1;
                    continue;
                }

                (Mnemonic::Sta, Mnemonic::Lda)
                    if previous.operand.is_memory() && previous.operand == current.operand =>
                {
                    reloads += 1;
                    continue;
                }

                _ => (),
            }
        }

        output.push(line.clone());
    }

    debug!(
        "Peephole removed {} push/pull pairs and {} redundant loads",
        push_pull, reloads
    );

    output
}
