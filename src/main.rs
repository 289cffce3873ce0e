use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use kite::compiler::SCRIPT;
use kite::diagnostic::{ansi::AnsiRenderer, json, registry, Diagnostic};
use kite::{Config, InterpretResult};

const EXIT_USAGE: u8 = 64;
const EXIT_COMPILE: u8 = 65;
const EXIT_NO_INPUT: u8 = 66;
const EXIT_RUNTIME: u8 = 70;

#[derive(Parser)]
#[command(name = "kite")]
#[command(about = "Run kite programs on the kite bytecode VM")]
#[command(version)]
struct Cli {
    /// Source file to run
    file: Option<PathBuf>,

    /// Run SOURCE instead of a file
    #[arg(short, long, value_name = "SOURCE", conflicts_with = "file")]
    eval: Option<String>,

    /// Skip constant folding and dead-code elimination
    #[arg(long)]
    no_optimize: bool,

    /// Print the bytecode of every function instead of running
    #[arg(long)]
    disassemble: bool,

    /// Print the optimized IR as JSON instead of running
    #[arg(long)]
    dump_ir: bool,

    /// Report diagnostics as JSON, one object per line
    #[arg(long)]
    json: bool,

    /// Never colour diagnostics
    #[arg(long)]
    no_color: bool,

    /// Explain an error code, e.g. K-V001
    #[arg(long, value_name = "CODE")]
    explain: Option<String>,

    /// Deepest call nesting before a stack overflow
    #[arg(long, value_name = "N", default_value_t = kite::vm::DEFAULT_MAX_FRAMES)]
    max_frames: usize,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct Reporter {
    json: bool,
    color: bool,
    source: String,
}

impl Reporter {
    fn report(&self, d: Diagnostic) {
        let d = d.with_source(self.source.clone());
        if self.json {
            eprintln!("{}", json::render(&d));
        } else {
            eprint!("{}", AnsiRenderer { use_color: self.color }.render(&d));
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(EXIT_USAGE) } else { ExitCode::SUCCESS };
        }
    };
    init_logging(cli.verbose);

    if let Some(code) = &cli.explain {
        return match registry::lookup(code) {
            Some(entry) => {
                print!("{}", entry.long);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("unknown error code '{}'", code);
                ExitCode::from(EXIT_USAGE)
            }
        };
    }

    let source = match (&cli.eval, &cli.file) {
        (Some(src), _) => src.clone(),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: cannot read {}: {}", path.display(), e);
                return ExitCode::from(EXIT_NO_INPUT);
            }
        },
        (None, None) => {
            eprintln!("error: no input; pass a FILE or -e SOURCE (see --help)");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let config = Config { optimize: !cli.no_optimize, max_frames: cli.max_frames, echo: true };
    let reporter = Reporter {
        json: cli.json,
        color: !cli.no_color && std::io::stderr().is_terminal(),
        source,
    };

    if cli.dump_ir || cli.disassemble {
        return inspect(&cli, &config, &reporter);
    }

    match kite::run_source(&reporter.source, &config).result {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError(errors) => {
            for e in &errors {
                reporter.report(e.into());
            }
            ExitCode::from(EXIT_COMPILE)
        }
        InterpretResult::RuntimeError(e) => {
            reporter.report((&e).into());
            if cli.verbose > 0 {
                eprintln!("{}", e.disassembly);
            }
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

fn inspect(cli: &Cli, config: &Config, reporter: &Reporter) -> ExitCode {
    let (program, script) = match kite::build(&reporter.source, config) {
        Ok(built) => built,
        Err(errors) => {
            for e in &errors {
                reporter.report(e.into());
            }
            return ExitCode::from(EXIT_COMPILE);
        }
    };
    if cli.dump_ir {
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: cannot serialize IR: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    if cli.disassemble {
        print!("{}", script.chunk.disassemble(SCRIPT));
    }
    ExitCode::SUCCESS
}
