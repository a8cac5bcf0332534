/// Escribe una instrucción o directiva indentada, alineando sus operandos.
macro_rules! emit {
    ($output:expr, $opcode:expr) => {
        write!($output, "\t{}", $opcode)
    };

    ($output:expr, $opcode:expr, $($format:tt)*) => {{
        write!($output, "\t{:7} ", $opcode)?;
        write!($output, $($format)*)
    }};
}
