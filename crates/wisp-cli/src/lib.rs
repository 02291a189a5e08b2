//! wisp-cli — the `wisp` binary (spec §6.1): flag parsing, logging and
//! manifest setup, then either a dump-and-stop front-end pass or a full
//! run through `wisp-vm`.
//!
//! Structured the way the teacher's `vitte-cli` splits `main.rs`/`lib.rs`
//! (spec: `run()` is unit-testable, `main.rs` stays a thin shell), but the
//! flag surface itself follows spec.md §6.1's single-mode `wisp [options]
//! <file> [program-args...]`, not the teacher's multi-subcommand `Cmd`.

pub mod dump;
pub mod install;
pub mod logging;
pub mod manifest;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use wisp_vm::{Value, Vm, VmOptions};

/// `wisp [options] <file> [program-args...]` (spec §6.1). Clap's own
/// `-h`/`--help` stays default; `-v`/`--version` is hand-rolled since the
/// spec reserves uppercase `-V` for `--verbose`, which clap's built-in
/// version flag would otherwise claim.
#[derive(Parser, Debug)]
#[command(name = "wisp", about = "Wisp language runtime", disable_version_flag = true)]
pub struct Cli {
    /// Dump tokens and stop.
    #[arg(short = 'l', long = "lex")]
    pub lex: bool,
    /// Dump the raw AST and stop.
    #[arg(short = 'p', long = "parse")]
    pub parse: bool,
    /// Dump the simplified AST and stop.
    #[arg(short = 'P', long = "optparse")]
    pub optparse: bool,
    /// Dump generated bytecode.
    #[arg(short = 'i', long = "ir")]
    pub ir: bool,
    /// Compile only; skip execution.
    #[arg(short = 'd', long = "dry")]
    pub dry: bool,
    /// Send logs to stderr (default: stdout).
    #[arg(short = 'e', long = "logerr")]
    pub logerr: bool,
    /// Raise log level; repeatable.
    #[arg(short = 'V', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
    /// Raise log level to trace.
    #[arg(short = 'T', long = "trace")]
    pub trace: bool,
    /// Print version and exit.
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue)]
    pub version: bool,
    /// Recursion depth limit (SPEC_FULL §3 supplemental flag, default 256).
    #[arg(long = "max-recurse", default_value_t = 256)]
    pub max_recurse: u32,

    /// Script to run.
    pub file: Option<PathBuf>,

    /// Everything after `--` is passed through to the script unparsed.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub program_args: Vec<String>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("wisp {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    logging::init(cli.verbose, cli.trace, cli.logerr);

    let Some(file) = cli.file.clone() else {
        bail!("no input file given (see `wisp --help`)");
    };

    let source = std::fs::read_to_string(&file)?;
    let module_name = file.file_stem().and_then(|s| s.to_str()).unwrap_or("main").to_string();
    let module_path = file.to_string_lossy().to_string();

    if cli.lex {
        println!("{}", dump::dump_tokens(&source, &module_name, &module_path)?);
        return Ok(());
    }
    if cli.parse {
        println!("{}", dump::dump_ast(&source, &module_name, &module_path, 1)?);
        return Ok(());
    }
    if cli.optparse {
        println!("{}", dump::dump_optparse_ast(&source, &module_name, &module_path, 1)?);
        return Ok(());
    }
    if cli.ir {
        println!("{}", dump::dump_ir(&source, &module_name, &module_path, 1)?);
    }
    if cli.dry {
        // `-i` (if given) already printed above; `-d` alone just validates
        // that the file compiles.
        if !cli.ir {
            wisp_compiler::compile_module(&source, &module_name, &module_path, 1)?;
        }
        return Ok(());
    }

    run_vm(&cli, &file)
}

fn run_vm(cli: &Cli, file: &std::path::Path) -> Result<()> {
    let install_lib_dir = install::resolve_install_lib_dir();
    let options = VmOptions { recursion_limit: cli.max_recurse, install_lib_dir, load_prelude: true };
    let mut vm = Vm::new(options)?;

    if let Some(dir) = file.parent() {
        if let Some((_manifest, manifest_dir)) = manifest::find_manifest(dir) {
            tracing::debug!(dir = %manifest_dir, "found wisp.toml");
        }
    }

    // Program args (spec §6.1 "everything after `--` is program-args"):
    // exposed to the script as the global `args`, a `Vec` of strings.
    let args_value = Value::vec(cli.program_args.iter().map(|s| Value::str(s.clone())).collect(), false);
    vm.global().globals.lock().insert("args", args_value);

    match vm.run_file(file) {
        Ok(_) => Ok(()),
        Err(failure) => {
            if let wisp_vm::VmError::Exit(code) = failure.kind {
                std::process::exit(code);
            }
            report_failure(&vm, &failure);
            std::process::exit(1);
        }
    }
}

fn report_failure(vm: &Vm, failure: &wisp_vm::Failure) {
    let loc = failure.leaf_loc();
    if let Some(record) = (!loc.is_synthetic()).then(|| vm.global().modules.get(loc.module_id)).flatten() {
        let source = wisp_compiler::diagnostics::SourceMap::new(record.path.clone(), record.source.clone());
        eprintln!("{}", wisp_compiler::diagnostics::render(&source, loc, wisp_compiler::diagnostics::Severity::Failure, &failure.message()));
    } else {
        eprintln!("Failure: {}", failure.message());
    }
}
