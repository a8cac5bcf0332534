//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, Command};
use tracing_subscriber::EnvFilter;
use vcsc::{
    frontend::Module,
    link::{AssembleOptions, Assembler},
    rom,
    support::SupportLibrary,
    CompileOptions,
};

use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("vcsc")
        .version(crate_version!())
        .about("Stack-machine IR to Atari VCS compiler")
        .arg(
            Arg::new("sources")
                .value_name("MODULE")
                .takes_value(true)
                .multiple_values(true)
                .required(true)
                .help("Front end modules (JSON)"),
        )
        .arg(
            Arg::new("runtime")
                .short('r')
                .long("runtime")
                .value_name("FILE")
                .takes_value(true)
                .required(true)
                .help("Support library with provided implementations"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .takes_value(true)
                .default_value("out.asm")
                .help("Assembly output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("assembler")
                .short('a')
                .long("assembler")
                .value_name("PATH")
                .takes_value(true)
                .help("Assemble a ROM image with this dasm executable"),
        )
        .arg(
            Arg::new("include")
                .short('I')
                .long("include")
                .value_name("DIR")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Assembler include directory"),
        )
        .arg(Arg::new("symbols").long("symbols").help("Emit a symbol table"))
        .arg(Arg::new("listing").long("listing").help("Emit an assembly listing"))
        .arg(
            Arg::new("no-optimize")
                .long("no-optimize")
                .help("Disable the peephole optimizer"),
        )
        .get_matches();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Se extraen argumentos necesarios
    let sources = args.get_many::<String>("sources").into_iter().flatten();
    let runtime = args.get_one::<String>("runtime").context("Missing support library")?;
    let output = args.get_one::<String>("output").map_or("out.asm", String::as_str);
    let assembler = args.get_one::<String>("assembler");

    if let (Some(_), "-") = (assembler, output) {
        bail!("Refusing to assemble a ROM image from stdout");
    }

    let mut modules = Vec::new();
    for path in sources {
        let file = File::open(path).with_context(|| format!("Failed to open module: {}", path))?;
        let module = Module::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse module: {}", path))?;

        modules.push(module);
    }

    let support = SupportLibrary::load(runtime)
        .with_context(|| format!("Failed to load support library: {}", runtime))?;

    let options = CompileOptions {
        optimize: !args.contains_id("no-optimize"),
        ..CompileOptions::default()
    };

    let program = match vcsc::compile(&Module::merge(modules), &support, &options) {
        Ok(program) => program,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            bail!("Compilation failed");
        }
    };

    let lines = rom::assemble(&program);
    match output {
        // Salida a stdout sin ensamblado
        "-" => {
            let stdout = io::stdout();
            rom::write(&lines, &mut stdout.lock()).context("Failed to emit to stdout")?;
        }

        // Salida a archivo
        path => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            rom::write(&lines, &mut BufWriter::new(file))
                .with_context(|| format!("Failed to emit to file: {}", path))?;
        }
    }

    if let Some(command) = assembler {
        let mut options = AssembleOptions::empty();
        options.set(AssembleOptions::SYMBOLS, args.contains_id("symbols"));
        options.set(AssembleOptions::LISTING, args.contains_id("listing"));

        let assembler = args
            .get_many::<String>("include")
            .into_iter()
            .flatten()
            .fold(Assembler::new(command), Assembler::include);

        let rom = assembler
            .assemble(&output, options)
            .with_context(|| format!("Failed to assemble ROM image from: {}", output))?;

        println!("{}", rom.binary.display());
    }

    Ok(())
}
