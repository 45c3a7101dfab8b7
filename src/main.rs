use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use rox::ast_printer::{AstPrinter, RpnPrinter};
use rox::error::Diagnostics;
use rox::parser::Parser;
use rox::scanner::{scan, Scanner};
use rox::session::{RunStatus, Session};

const EXIT_USAGE: i32 = 64;
const EXIT_STATIC: i32 = 65;
const EXIT_RUNTIME: i32 = 70;

#[derive(ClapParser, Debug)]
#[command(version, about = "Rox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,

    /// Do not print resolver warnings (unused locals)
    #[arg(long, global = true)]
    no_warnings: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Print one JSON object per token
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse {
        filename: PathBuf,

        /// Print in reverse Polish notation instead of prefix form
        #[arg(long)]
        rpn: bool,
    },

    /// Runs input from a file as a Rox program
    Run { filename: PathBuf },

    /// Starts an interactive prompt
    Repl,
}

/// Reads a whole source file as UTF-8.
fn read_file(filename: &Path) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    String::from_utf8(buf).context(format!("File {:?} is not valid UTF-8", filename))
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Prints collected diagnostics to stderr.
fn report(diagnostics: &Diagnostics, warnings: bool) {
    if warnings {
        for warning in diagnostics.warnings() {
            eprintln!("{}", warning);
        }
    }

    for error in diagnostics.errors() {
        debug!("Reporting: {}", error);
        eprintln!("{}", error);
    }
}

fn tokenize(filename: &Path, json: bool) -> Result<i32> {
    let source = read_file(filename)?;
    let mut tokenized = true;

    for token in Scanner::new(&source) {
        match token {
            Ok(token) if json => {
                println!("{}", serde_json::to_string(&token).context("Failed to encode token")?);
            }

            Ok(token) => println!("{}", token),

            Err(e) => {
                tokenized = false;
                eprintln!("{}", e);
            }
        }
    }

    Ok(if tokenized { 0 } else { EXIT_STATIC })
}

fn parse(filename: &Path, rpn: bool) -> Result<i32> {
    let source = read_file(filename)?;
    let mut diagnostics = Diagnostics::new();

    let tokens = scan(&source, &mut diagnostics);
    let expr = Parser::new(tokens).parse_expression(&mut diagnostics);

    match expr {
        Some(expr) if !diagnostics.has_errors() => {
            let rendered = if rpn {
                RpnPrinter::print(&expr)
            } else {
                AstPrinter::print(&expr)
            };
            debug!("AST: {}", rendered);
            println!("{}", rendered);
            Ok(0)
        }

        _ => {
            report(&diagnostics, false);
            Ok(EXIT_STATIC)
        }
    }
}

fn run(filename: &Path, warnings: bool) -> Result<i32> {
    let source = read_file(filename)?;
    info!("Provided input:\n {}", source);

    let mut session = Session::new();
    let mut diagnostics = Diagnostics::new();

    let status = session.run(&source, &mut diagnostics);
    report(&diagnostics, warnings);

    Ok(match status {
        RunStatus::Ok => 0,
        RunStatus::StaticError => EXIT_STATIC,
        RunStatus::RuntimeError => EXIT_RUNTIME,
    })
}

/// Read-eval-print loop. Definitions persist from line to line; errors are
/// reported and the prompt continues.
fn repl(warnings: bool) -> Result<i32> {
    let mut session = Session::new();
    let mut diagnostics = Diagnostics::new();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush prompt")?;

        line.clear();
        let read = io::stdin()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;

        if read == 0 {
            println!();
            break;
        }

        let status = session.run(&line, &mut diagnostics);
        debug!("REPL line finished: {:?}", status);

        report(&diagnostics, warnings);
        diagnostics.clear();
    }

    Ok(0)
}

fn main() -> Result<()> {
    let args: Cli = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            process::exit(if e.use_stderr() { EXIT_USAGE } else { 0 });
        }
    };

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let warnings = !args.no_warnings;

    let code = match &args.commands {
        Commands::Tokenize { filename, json } => tokenize(filename, *json)?,
        Commands::Parse { filename, rpn } => parse(filename, *rpn)?,
        Commands::Run { filename } => run(filename, warnings)?,
        Commands::Repl => repl(warnings)?,
    };

    if code != 0 {
        debug!("Exiting with code {}", code);
        process::exit(code);
    }

    Ok(())
}
