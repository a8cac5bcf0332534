//! Disposición final de la imagen de ROM.
//!
//! La imagen es un cartucho de 4 KiB en `$F000`. El punto de entrada
//! inicializa la máquina y cae al cuerpo de la subrutina de entrada.
//! Al final de la ROM se colocan los vectores de reset e interrupción,
//! ambos apuntando al punto de entrada.

use std::io;

use crate::{
    arch::{vcs, Directive, Line, Mnemonic::*, Operand, Symbol, Value},
    callgraph::CallGraph,
    layout::{MemoryMap, Ram},
    table::TypeTable,
    types::{Intrinsic, Subroutine, SubroutineId},
};

pub const ENTRY_POINT: &str = "__EntryPoint";

/// Programa compilado, listo para disponerse en ROM.
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub types: TypeTable,
    pub entry: SubroutineId,
    pub memory: MemoryMap,
    pub graph: CallGraph,
    pub ram: Ram,
}

impl CompiledProgram {
    /// Subrutinas con cuerpo propio en ROM, en orden de tabla.
    pub fn emitted(&self) -> impl Iterator<Item = &Subroutine> {
        self.types
            .subroutines()
            .filter(move |sub| self.graph.contains(sub.id) && sub.body.is_some())
            .filter(|sub| !matches!(sub.intrinsic, Some(Intrinsic::AlwaysInline)))
            .map(|sub| &**sub)
    }
}

/// Construye el listado completo del programa.
pub fn assemble(program: &CompiledProgram) -> Vec<Line> {
    let mut lines = vec![
        Line::Directive(Directive::Processor(vcs::PROCESSOR)),
        Line::Directive(Directive::Include(vcs::HEADER)),
        Line::Blank,
    ];

    for allocation in program.memory.allocations() {
        lines.push(Line::Directive(Directive::Equate(
            allocation.symbol.clone(),
            allocation.address,
        )));
    }

    lines.push(Line::Blank);
    lines.push(Line::Directive(Directive::Org(vcs::ROM_ORIGIN)));

    let entry = &program.types[program.entry];
    lines.push(Line::Label(ENTRY_POINT.into()));
    lines.push(Line::Label(entry.label()));
    lines.extend(prologue(&program.ram));
    put_body(&mut lines, entry);

    for subroutine in program.emitted().filter(|sub| sub.id != program.entry) {
        lines.push(Line::Blank);
        lines.push(Line::comment(&*subroutine.full_name));
        lines.push(Line::Label(subroutine.label()));
        put_body(&mut lines, subroutine);
    }

    let vector = || Line::Directive(Directive::Word(ENTRY_POINT.into()));

    lines.push(Line::Blank);
    lines.push(Line::Directive(Directive::Org(vcs::VECTORS)));
    lines.push(vector());
    lines.push(vector());

    lines
}

/// Escribe un listado, una línea a la vez.
pub fn write<W: io::Write>(lines: &[Line], output: &mut W) -> io::Result<()> {
    for line in lines {
        writeln!(output, "{}", line)?;
    }

    output.flush()
}

fn put_body(lines: &mut Vec<Line>, subroutine: &Subroutine) {
    if let Some(body) = &subroutine.body {
        lines.extend(body.code.iter().cloned());
        lines.extend(body.data.iter().cloned());
    }
}

/// Inicialización en frío: interrupciones deshabilitadas, modo binario,
/// pila en el tope de página cero y toda la RAM en cero.
fn prologue(ram: &Ram) -> Vec<Line> {
    let immediate = |mnemonic, byte| Line::with(mnemonic, Operand::Immediate(Value::Byte(byte)));
    let branch = |mnemonic, label: &Symbol| Line::with(mnemonic, Operand::Direct(Value::Symbol(label.clone())));

    let mut lines = vec![
        Line::op(Sei),
        Line::op(Cld),
        immediate(Ldx, vcs::STACK_TOP),
        Line::op(Txs),
        immediate(Lda, 0),
    ];

    let zero_page: Symbol = format!("{}_ClearZeroPage", ENTRY_POINT).into();
    let (start, end) = (ram.zero_page.start, ram.zero_page.end.min(0x100));
    let base = Operand::IndexedX(Value::Byte(start.to_le_bytes()[0]));

    match end.saturating_sub(start) {
        0 => (),

        // Índice descendente hasta que X se vuelve negativo
        length @ 1..=0x80 => {
            lines.push(immediate(Ldx, (length - 1).to_le_bytes()[0]));
            lines.push(Line::Label(zero_page.clone()));
            lines.push(Line::with(Sta, base));
            lines.push(Line::op(Dex));
            lines.push(branch(Bpl, &zero_page));
        }

        length => {
            lines.push(immediate(Ldx, 0));
            lines.push(Line::Label(zero_page.clone()));
            lines.push(Line::with(Sta, base));
            lines.push(Line::op(Inx));
            if length < 0x100 {
                lines.push(immediate(Cpx, length.to_le_bytes()[0]));
            }

            lines.push(branch(Bne, &zero_page));
        }
    }

    let mut page = ram.extended.start;
    while page < ram.extended.end {
        let length = (ram.extended.end - page).min(0x100);
        let clear: Symbol = format!("{}_ClearRam_{:04X}", ENTRY_POINT, page).into();

        lines.push(immediate(Ldx, 0));
        lines.push(Line::Label(clear.clone()));
        lines.push(Line::with(Sta, Operand::IndexedX(Value::Word(page))));
        lines.push(Line::op(Inx));

        // Con 256 bytes el ciclo termina cuando X da la vuelta a cero
        if length < 0x100 {
            lines.push(immediate(Cpx, length.to_le_bytes()[0]));
        }

        lines.push(branch(Bne, &clear));
        page = page.saturating_add(length);
        if length < 0x100 {
            break;
        }
    }

    lines
}
