//! Compilador de IR de máquina de pila a ensamblador 6502 para Atari VCS.
//!
//! # Front end
//! El programa de entrada ya fue analizado por un front end externo
//! y llega como un modelo JSON descrito en [`frontend`]. Cada tipo
//! declara campos y subrutinas, y cada subrutina trae su cuerpo como
//! una secuencia de instrucciones de pila descritas en [`ir`]. La
//! ingesta en [`ingest`] resuelve todo nombre contra la tabla de
//! tipos de [`table`] y dispone los objetos en memoria con [`layout`].
//!
//! # Back end
//! El grafo de llamadas de [`callgraph`] determina qué subrutinas son
//! alcanzables y en qué orden compilarlas. Con ello se asigna RAM a
//! toda variable global y a los parámetros y locales de cada subrutina,
//! pues el objetivo no tiene marcos de activación. La generación de
//! código en [`codegen`] sigue la pila de evaluación de [`stack`] a lo
//! largo del grafo de flujo de [`cfg`] y emite listados de
//! [`arch::Line`], los cuales [`peephole`] simplifica. Finalmente,
//! [`rom`] dispone la imagen completa y [`link`] delega el ensamblado
//! a `dasm`.

#[macro_use]
mod macros;

pub mod arch;
pub mod callgraph;
pub mod cfg;
pub mod codegen;
pub mod error;
pub mod frontend;
pub mod ingest;
pub mod ir;
pub mod layout;
pub mod link;
pub mod peephole;
pub mod rom;
pub mod stack;
pub mod support;
pub mod table;
pub mod types;

pub use codegen::CompileOptions;

use tracing::{debug, info};

use crate::{
    callgraph::CallGraph,
    error::Diagnostics,
    frontend::Module,
    ingest::Ingested,
    layout::MemoryMap,
    rom::CompiledProgram,
    support::SupportLibrary,
};

/// Compila un módulo completo.
///
/// La ingesta se detiene en el primer error. El análisis del grafo de
/// llamadas reporta todos los ciclos de recursión a la vez.
pub fn compile(
    module: &Module,
    support: &SupportLibrary,
    options: &CompileOptions,
) -> Result<CompiledProgram, Diagnostics> {
    let Ingested { types, entry } = ingest::ingest(module)?;
    info!("Ingested {} types, entry point is {}", types.len(), types[entry]);

    let graph = CallGraph::build(&types)?;
    debug!("Call graph:\n{}", graph.print(&types));

    let memory = MemoryMap::allocate(&types, &graph, &options.ram)?;
    let types = codegen::compile(types, &graph, &memory, support, options)?;

    Ok(CompiledProgram {
        types,
        entry,
        memory,
        graph,
        ram: options.ram.clone(),
    })
}
