//! Parámetros de plataforma del Atari VCS (2600).

use std::ops::Range;

/// Procesador declarado para el ensamblador.
pub const PROCESSOR: &str = "6502";

/// Encabezado con los nombres de registros TIA y RIOT.
pub const HEADER: &str = "vcs.h";

/// Inicio del cartucho de 4 KiB.
pub const ROM_ORIGIN: u16 = 0xf000;

/// Vectores de reset e IRQ/BRK.
pub const VECTORS: u16 = 0xfffc;

/// RAM interna del RIOT, en página cero.
pub const ZERO_PAGE_RAM: Range<u16> = 0x80..0x100;

/// Valor inicial del puntero de pila.
pub const STACK_TOP: u8 = 0xff;
