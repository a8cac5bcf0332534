//! Seguimiento de la pila de evaluación durante compilación.
//!
//! Cada bloque básico tiene su propia pila de tipos. Cuando la
//! compilación pasa de un bloque a otro y el bloque anterior deja
//! valores sin consumir, estos solo se trasladan si el bloque nuevo
//! tiene como único predecesor al bloque anterior.

use std::fmt::{self, Display};

use tracing::debug;

use crate::{
    cfg::{BlockId, ControlFlowGraph},
    types::ValueType,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationStack {
    entries: Vec<ValueType>,
}

impl EvaluationStack {
    pub fn push(&mut self, ty: ValueType) {
        self.entries.push(ty);
    }

    pub fn pop(&mut self) -> Option<ValueType> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entradas desde el fondo hasta el tope.
    pub fn iter(&self) -> impl Iterator<Item = &ValueType> {
        self.entries.iter()
    }
}

impl Display for EvaluationStack {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("[")?;
        for (i, ty) in self.iter().enumerate() {
            if i > 0 {
                fmt.write_str(", ")?;
            }

            write!(fmt, "{}", ty)?;
        }

        fmt.write_str("]")
    }
}

pub struct StackTracker<'a> {
    cfg: &'a ControlFlowGraph,
    stacks: Vec<EvaluationStack>,
    current: Option<BlockId>,
}

impl<'a> StackTracker<'a> {
    pub fn new(cfg: &'a ControlFlowGraph) -> Self {
        StackTracker {
            cfg,
            stacks: vec![EvaluationStack::default(); cfg.blocks().len()],
            current: None,
        }
    }

    /// Cambia al bloque que contiene la instrucción `index`.
    pub fn enter(&mut self, index: usize) -> &mut EvaluationStack {
        let block = self.cfg.block_containing(index);

        match self.current {
            Some(current) if current == block => (),

            Some(previous) => {
                let leftover = self.stacks[previous.0].len();
                if leftover > 0 && self.cfg.predecessors(block) == [previous] {
                    let moved = std::mem::take(&mut self.stacks[previous.0]);
                    self.stacks[block.0].entries.extend(moved.entries);

                    debug!("Carried {} stack entries into block {}", leftover, block.0);
                } else if leftover > 0 {
                    debug!(
                        "Block {} left {} that block {} does not inherit",
                        previous.0, self.stacks[previous.0], block.0
                    );
                }

                self.current = Some(block);
            }

            None => self.current = Some(block),
        }

        &mut self.stacks[block.0]
    }

    #[cfg(test)]
    pub fn stack(&self, block: BlockId) -> &EvaluationStack {
        &self.stacks[block.0]
    }
}
