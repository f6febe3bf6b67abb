//! Carv compiler driver
//!
//! Command-line interface for the Carv toolchain: emit C, build a native
//! binary through the system C compiler, type-check, or build-and-run.

mod loader;

use anyhow::{bail, Context, Result};
use carv_compiler::Compiler;
use clap::{Parser as ClapParser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(ClapParser)]
#[command(name = "carv")]
#[command(about = "Carv programming language compiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a file to C and build it with the system C compiler
    #[command(alias = "b")]
    Build {
        /// Entry source file
        file: PathBuf,
        /// Output binary path (defaults to the source name without extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop after writing the .c file
        #[arg(long)]
        emit_c: bool,
        /// C compiler to invoke
        #[arg(long, default_value = "cc")]
        cc: String,
    },

    /// Parse and type-check without generating code
    #[command(alias = "c")]
    Check {
        /// Entry source file
        file: PathBuf,
    },

    /// Write the generated C translation unit to stdout
    Emit {
        /// Entry source file
        file: PathBuf,
    },

    /// Build and immediately run
    #[command(alias = "r")]
    Run {
        /// Entry source file
        file: PathBuf,
        /// C compiler to invoke
        #[arg(long, default_value = "cc")]
        cc: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Build {
            file,
            output,
            emit_c,
            cc,
        } => build(&file, output, emit_c, &cc).map(|_| ()),
        Commands::Check { file } => check(&file),
        Commands::Emit { file } => emit(&file),
        Commands::Run { file, cc } => run(&file, &cc),
    };

    if let Err(err) = result {
        report_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn report_error(message: &str) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {message}");
}

fn report_warning(message: &str) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    let _ = write!(stderr, "warning");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {message}");
}

/// Load, check, and lower the entry file to C source.
fn generate_c(file: &Path) -> Result<String> {
    let loaded = loader::load(file)?;
    let (types, diagnostics) = carv_parser::check(&loaded.program);
    for diagnostic in &diagnostics {
        report_warning(&format!(
            "{} ({}:{})",
            diagnostic.message, diagnostic.span.line, diagnostic.span.column
        ));
    }
    let mut compiler = Compiler::new().with_types(&types);
    for alias in &loaded.builtin_aliases {
        compiler = compiler.with_builtin_alias(alias);
    }
    Ok(compiler.compile(&loaded.program)?)
}

fn emit(file: &Path) -> Result<()> {
    let c_source = generate_c(file)?;
    print!("{c_source}");
    Ok(())
}

fn check(file: &Path) -> Result<()> {
    let loaded = loader::load(file)?;
    let (_, diagnostics) = carv_parser::check(&loaded.program);
    for diagnostic in &diagnostics {
        report_warning(&format!(
            "{} ({}:{})",
            diagnostic.message, diagnostic.span.line, diagnostic.span.column
        ));
    }
    if diagnostics.is_empty() {
        println!("{}: ok", file.display());
    }
    Ok(())
}

fn build(file: &Path, output: Option<PathBuf>, emit_c: bool, cc: &str) -> Result<PathBuf> {
    let c_source = generate_c(file)?;

    let binary = output.unwrap_or_else(|| file.with_extension(""));
    let c_path = binary.with_extension("c");
    std::fs::write(&c_path, &c_source)
        .with_context(|| format!("cannot write {}", c_path.display()))?;

    if emit_c {
        return Ok(c_path);
    }

    let output = Command::new(cc)
        .arg("-std=c99")
        .arg("-o")
        .arg(&binary)
        .arg(&c_path)
        .output()
        .with_context(|| format!("cannot invoke C compiler `{cc}`"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("C compilation failed:\n{stderr}");
    }

    Ok(binary)
}

fn run(file: &Path, cc: &str) -> Result<()> {
    let binary = build(file, None, false, cc)?;
    let status = Command::new(&binary)
        .status()
        .with_context(|| format!("cannot execute {}", binary.display()))?;
    match status.code() {
        Some(0) | None => Ok(()),
        Some(code) => std::process::exit(code),
    }
}
