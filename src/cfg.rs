//! Grafo de flujo de control.
//!
//! Un bloque básico inicia en la primera instrucción, en todo
//! destino de salto y en la instrucción inmediatamente posterior
//! a un salto o retorno.

use std::{collections::BTreeSet, ops::Range};

use crate::ir::Instruction;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    pub id: BlockId,

    /// Índices de instrucciones que cubre este bloque.
    pub range: Range<usize>,

    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    block_of: Vec<BlockId>,
}

impl ControlFlowGraph {
    /// Particiona un flujo de instrucciones en bloques básicos.
    ///
    /// Todos los destinos de salto deben ser índices válidos.
    pub fn build(instructions: &[Instruction]) -> Self {
        let len = instructions.len();
        let mut leaders = BTreeSet::new();

        if len > 0 {
            leaders.insert(0);
        }

        for (index, instruction) in instructions.iter().enumerate() {
            leaders.extend(instruction.branch_target().filter(|&target| target < len));
            if instruction.ends_block() && index + 1 < len {
                leaders.insert(index + 1);
            }
        }

        let starts: Vec<usize> = leaders.into_iter().collect();
        let mut blocks: Vec<BasicBlock> = starts
            .iter()
            .enumerate()
            .map(|(i, &start)| BasicBlock {
                id: BlockId(i),
                range: start..starts.get(i + 1).copied().unwrap_or(len),
                successors: Vec::new(),
                predecessors: Vec::new(),
            })
            .collect();

        let mut block_of = vec![BlockId(0); len];
        for block in &blocks {
            for index in block.range.clone() {
                block_of[index] = block.id;
            }
        }

        for i in 0..blocks.len() {
            let end = blocks[i].range.end;
            let last = &instructions[end - 1];

            let mut successors = Vec::new();
            if last.falls_through() && end < len {
                successors.push(block_of[end]);
            }

            if let Some(target) = last.branch_target().filter(|&target| target < len) {
                let target = block_of[target];
                if !successors.contains(&target) {
                    successors.push(target);
                }
            }

            for &successor in &successors {
                let predecessors = &mut blocks[successor.0].predecessors;
                if !predecessors.contains(&BlockId(i)) {
                    predecessors.push(BlockId(i));
                }
            }

            blocks[i].successors = successors;
        }

        ControlFlowGraph { blocks, block_of }
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    /// Bloque que contiene a una instrucción.
    pub fn block_containing(&self, index: usize) -> BlockId {
        self.block_of[index]
    }

    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        &self.blocks[id.0].predecessors
    }
}

/// Índices de instrucciones que son destino de algún salto.
pub fn branch_targets(instructions: &[Instruction]) -> BTreeSet<usize> {
    instructions
        .iter()
        .filter_map(Instruction::branch_target)
        .collect()
}
