use std::{
    error::Error,
    fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    str::FromStr,
};

use clap::Parser;
use hdasm::{
    config::Config, output, symtab::Scope, Asm, AsmFlags, Input, OutputFormat, Target,
};
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Assembly source file
    source: PathBuf,

    /// Output file
    #[arg(short, long, default_value = "a.out")]
    output: PathBuf,

    /// One of `decb`, `raw`, `obj`, or `os9`
    #[arg(short, long, value_parser = OutputFormat::from_str)]
    format: Option<OutputFormat>,

    /// Same as `--format raw`
    #[arg(short, long)]
    raw: bool,

    /// Same as `--format decb`
    #[arg(short = 'b', long)]
    decb: bool,

    /// Same as `--format obj`
    #[arg(long)]
    obj: bool,

    /// Pragmas to start with, comma separated (repeatable)
    #[arg(short, long)]
    pragma: Vec<String>,

    /// Assemble for the plain 6809
    #[arg(short = '9', long = "6809", conflicts_with = "h6309")]
    m6809: bool,

    /// Assemble for the 6309 (default)
    #[arg(short = '3', long = "6309")]
    h6309: bool,

    /// Search directories for included files
    #[arg(short = 'I', long)]
    includedir: Vec<PathBuf>,

    /// Pre-defined symbols (repeatable)
    #[arg(short = 'D', long, value_name = "SYM[=val]", value_parser = hdasm::parse_defines)]
    define: Vec<(String, i32)>,

    /// Print the files the source depends on instead of assembling
    #[arg(long)]
    depend: bool,

    /// Like `--depend`, but skip included files that do not exist
    #[arg(long)]
    dependnoerr: bool,

    /// Print the symbol table after assembling
    #[arg(short, long)]
    symbols: bool,

    /// Project file with default settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = main_real(args) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    let mut asm = Asm::new(Input::new(Vec::new()));
    if let Some(path) = &args.config {
        Config::load(path)?.apply(&mut asm)?;
    }
    for path in &args.includedir {
        asm.input.add_include_path(path);
    }

    let format = if args.raw {
        Some(OutputFormat::Raw)
    } else if args.decb {
        Some(OutputFormat::Decb)
    } else if args.obj {
        Some(OutputFormat::Obj)
    } else {
        args.format
    };
    if let Some(format) = format {
        asm.set_format(format);
    }
    if args.m6809 {
        asm.target = Target::M6809;
    } else if args.h6309 {
        asm.target = Target::H6309;
    }
    for list in &args.pragma {
        asm.pragmas.apply(list)?;
    }
    for (name, value) in &args.define {
        asm.define(name, *value);
    }
    if args.depend || args.dependnoerr {
        asm.flags |= AsmFlags::DEPEND;
    }
    if args.dependnoerr {
        asm.flags |= AsmFlags::DEPENDNOERR;
    }

    asm.input.open(&args.source, Vec::new())?;

    if let Err(e) = hdasm::run(&mut asm) {
        if !asm.is_depend() {
            for (line, err) in asm.errors() {
                tracing::error!("{}:{}: {err}\n    {}", line.spec, line.lineno, line.text);
            }
        }
        return Err(e.into());
    }

    if asm.is_depend() {
        let mut out = io::stdout().lock();
        for path in asm.input.discovered() {
            writeln!(out, "{}", path.display())?;
        }
        return Ok(());
    }

    // build the whole image first so a failure leaves no partial file
    let mut image = Vec::new();
    output::write_output(&asm, &mut image)?;
    fs::write(&args.output, image).map_err(|e| format!("cant write file: {e}"))?;
    tracing::debug!("wrote {}", args.output.display());

    if args.symbols {
        let mut out = io::stdout().lock();
        for sym in asm.syms.iter() {
            let scope = match sym.scope {
                Scope::Global => "G".to_string(),
                Scope::Local(context) => format!("L{context}"),
            };
            writeln!(out, "{:<24} {:<6} {}", sym.name, scope, sym.value)?;
        }
    }
    Ok(())
}
