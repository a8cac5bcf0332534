//! Disposición de tipos en memoria y asignación de RAM.
//!
//! Los campos de instancia se disponen de forma contigua luego de
//! los campos heredados. La máquina objetivo no tiene marcos de pila,
//! por lo cual los campos estáticos, parámetros y locales reciben
//! direcciones fijas. Esto es válido únicamente porque ninguna
//! subrutina es reentrante.

use std::{collections::HashMap, ops::Range, rc::Rc};

use tracing::{debug, info, warn};

use crate::{
    arch::{vcs, Symbol},
    callgraph::CallGraph,
    error::CompileError,
    table::TypeTable,
    types::{mangle, FieldId, FieldLayout, Intrinsic, Layout, SubroutineId, ValueType},
};

/// Dispone los campos de instancia de un tipo a continuación de su base.
pub fn lay_out<'a, I>(name: &str, base: Option<&Layout>, fields: I) -> Layout
where
    I: IntoIterator<Item = (&'a str, ValueType)>,
{
    let mut laid_out: Vec<FieldLayout> = base.map(|base| base.fields.clone()).unwrap_or_default();
    let base_size = base.map_or(0, Layout::size);

    let mut offset = base_size;
    for (name, ty) in fields {
        let size = ty.size();
        laid_out.push(FieldLayout {
            name: name.into(),
            ty,
            offset,
        });

        offset += size;
    }

    Layout {
        name: name.into(),
        own_size: offset - base_size,
        fields: laid_out,
    }
}

/// Regiones de RAM disponibles para asignación.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ram {
    /// Región rápida, en página cero.
    pub zero_page: Range<u16>,

    /// RAM de cartucho, vacía si el cartucho no la tiene.
    pub extended: Range<u16>,
}

impl Ram {
    pub fn vcs() -> Self {
        Ram {
            zero_page: vcs::ZERO_PAGE_RAM,
            extended: 0..0,
        }
    }

    pub fn with_extended(self, extended: Range<u16>) -> Self {
        Ram { extended, ..self }
    }
}

impl Default for Ram {
    fn default() -> Self {
        Ram::vcs()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub symbol: Symbol,
    pub address: u16,
    pub size: usize,
}

impl Allocation {
    pub fn is_zero_page(&self) -> bool {
        self.address < 0x100
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum Slot {
    Field(FieldId),
    Argument(SubroutineId, u16),
    Local(SubroutineId, u16),
}

/// Direcciones asignadas a toda variable global del programa.
#[derive(Clone, Debug)]
pub struct MemoryMap {
    allocations: Rc<Vec<Allocation>>,
    slots: Rc<HashMap<Slot, usize>>,
}

pub const TEMPORARIES: [&str; 2] = ["TEMP0", "TEMP1"];

impl MemoryMap {
    /// Asigna RAM a temporales, campos estáticos y a los parámetros
    /// y locales de toda subrutina alcanzable que se compile.
    pub fn allocate(types: &TypeTable, graph: &CallGraph, ram: &Ram) -> Result<MemoryMap, CompileError> {
        let (start, end) = (ram.zero_page.start, ram.zero_page.end);
        if end > 0x100 {
            return Err(CompileError::ZeroPageRange { start, end });
        }

        let mut allocator = Allocator {
            regions: [ram.zero_page.clone(), ram.extended.clone()],
            allocations: Vec::new(),
            slots: HashMap::new(),
        };

        for temporary in TEMPORARIES {
            allocator.allocate(temporary.into(), 1, None)?;
        }

        for ty in types.iter() {
            for field in ty.fields.iter().filter(|field| field.is_static) {
                let symbol = mangle(&format!("{}_{}", ty.name, field.name));
                allocator.allocate(symbol.into(), field.ty.size(), Some(Slot::Field(field.id)))?;
            }
        }

        for subroutine in types.subroutines() {
            if subroutine.is(Intrinsic::replaces_call_site) || !graph.contains(subroutine.id) {
                continue;
            }

            let label = subroutine.label();
            for (n, ty) in subroutine.parameters.iter().enumerate() {
                let symbol = format!("{}_P{}", label, n);
                let slot = Slot::Argument(subroutine.id, n as u16);
                allocator.allocate(symbol.into(), ty.size(), Some(slot))?;
            }

            for (n, ty) in subroutine.locals.iter().enumerate() {
                let symbol = format!("{}_L{}", label, n);
                let slot = Slot::Local(subroutine.id, n as u16);
                allocator.allocate(symbol.into(), ty.size(), Some(slot))?;
            }
        }

        let used: usize = allocator.allocations.iter().map(|a| a.size).sum();
        info!("Allocated {} bytes of RAM in {} symbols", used, allocator.allocations.len());

        // La pila de hardware crece hacia abajo desde el tope de página cero
        let free = usize::from(allocator.regions[0].end - allocator.regions[0].start);
        let needed = 2 * graph.max_depth();
        if free < needed {
            warn!(
                "Only {} bytes of zero page remain for a call depth of {} ({} bytes)",
                free,
                graph.max_depth(),
                needed
            );
        }

        Ok(MemoryMap {
            allocations: Rc::new(allocator.allocations),
            slots: Rc::new(allocator.slots),
        })
    }

    pub fn field(&self, id: FieldId) -> Option<&Allocation> {
        self.slot(Slot::Field(id))
    }

    pub fn argument(&self, subroutine: SubroutineId, n: u16) -> Option<&Allocation> {
        self.slot(Slot::Argument(subroutine, n))
    }

    pub fn local(&self, subroutine: SubroutineId, n: u16) -> Option<&Allocation> {
        self.slot(Slot::Local(subroutine, n))
    }

    /// Celda temporal de un byte, `n` en `0..2`.
    pub fn temporary(&self, n: usize) -> &Symbol {
        &self.allocations[n].symbol
    }

    /// Asignaciones en orden de asignación.
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    fn slot(&self, slot: Slot) -> Option<&Allocation> {
        self.slots.get(&slot).map(|&index| &self.allocations[index])
    }
}

struct Allocator {
    regions: [Range<u16>; 2],
    allocations: Vec<Allocation>,
    slots: HashMap<Slot, usize>,
}

impl Allocator {
    fn allocate(&mut self, symbol: Symbol, size: usize, slot: Option<Slot>) -> Result<(), CompileError> {
        let region = self
            .regions
            .iter_mut()
            .find(|region| usize::from(region.end - region.start) >= size)
            .ok_or_else(|| CompileError::OutOfMemory {
                symbol: symbol.to_string(),
                size,
            })?;

        let address = region.start;
        region.start += size as u16;

        debug!("{} => ${:04X} ({} bytes)", symbol, address, size);

        if let Some(slot) = slot {
            self.slots.insert(slot, self.allocations.len());
        }

        self.allocations.push(Allocation {
            symbol,
            address,
            size,
        });

        Ok(())
    }
}
