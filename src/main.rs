use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use treelox as lox;

use lox::ast::Stmt;
use lox::ast_printer::AstPrinter;
use lox::interpreter::{Interpreter, RunResult};
use lox::parser::Parser;
use lox::scanner::Scanner;
use lox::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Emit tokens as JSON objects instead of the plain dump
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: PathBuf },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs input from a file as a Lox program
    Run { filename: PathBuf },

    /// Starts an interactive session; each line is one program submission
    Repl,
}

/// Reads the contents of a file into a Vec<u8>
fn read_file(filename: &PathBuf) -> Result<Vec<u8>> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    // The scanner slices lexemes out of this buffer without re-checking,
    // so reject non-UTF-8 input here, at the single ingestion point.
    std::str::from_utf8(&buf).context(format!("File {:?} is not valid UTF-8", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    Ok(buf)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Write to file with module path and source line
    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("treelox::")
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
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");

    Ok(())
}

/// Scan the whole buffer, reporting every lex error.  `None` means at least
/// one error was printed and the caller should reject the submission.
fn scan_all(buf: &[u8]) -> Option<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut clean = true;

    for result in Scanner::new(buf) {
        match result {
            Ok(token) => tokens.push(token),

            Err(e) => {
                clean = false;

                eprintln!("{}", e);
            }
        }
    }

    clean.then_some(tokens)
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename, json } => {
            info!("Running Tokenize subcommand");

            let buf = read_file(&filename)?;
            let mut clean = true;

            for result in Scanner::new(&buf) {
                match result {
                    Ok(token) => {
                        debug!("Scanned token: {}", token);

                        if json {
                            println!("{}", serde_json::to_string(&token)?);
                        } else {
                            println!("{}", token);
                        }
                    }

                    Err(e) => {
                        clean = false;

                        eprintln!("{}", e);
                    }
                }
            }

            if !clean {
                std::process::exit(65);
            }
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");

            let buf = read_file(&filename)?;

            let Some(tokens) = scan_all(&buf) else {
                std::process::exit(65);
            };

            match Parser::new(&tokens).parse_expression() {
                Ok(expr) => println!("{}", AstPrinter::print(&expr)),

                Err(e) => {
                    eprintln!("{}", e);

                    std::process::exit(65);
                }
            }
        }

        Commands::Evaluate { filename } => {
            info!("Running Evaluate subcommand");

            let buf = read_file(&filename)?;

            let Some(tokens) = scan_all(&buf) else {
                std::process::exit(65);
            };

            let expr = match Parser::new(&tokens).parse_expression() {
                Ok(expr) => expr,

                Err(e) => {
                    eprintln!("{}", e);

                    std::process::exit(65);
                }
            };

            let mut interpreter = Interpreter::new();

            match interpreter.evaluate(&expr) {
                Ok(value) => println!("{}", value),

                Err(e) => {
                    eprintln!("{}", e);

                    std::process::exit(70);
                }
            }
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");

            let buf = read_file(&filename)?;

            let Some(tokens) = scan_all(&buf) else {
                std::process::exit(65);
            };

            let statements = match Parser::new(&tokens).parse() {
                Ok(statements) => statements,

                Err(e) => {
                    eprintln!("{}", e);

                    std::process::exit(65);
                }
            };

            info!("Parsed {} statements", statements.len());

            let mut interpreter = Interpreter::new();

            match interpreter.resolve_and_run(&statements) {
                RunResult::Success => info!("Program executed successfully"),

                RunResult::StaticRejected => std::process::exit(65),

                RunResult::RuntimeFailed => std::process::exit(70),
            }
        }

        Commands::Repl => repl()?,
    }

    Ok(())
}

/// Interactive loop: one persistent interpreter, one submission per line.
/// A rejected or failed submission aborts only itself; globals and other
/// state survive into the next line.
fn repl() -> Result<()> {
    let mut interpreter: Interpreter<'static> = Interpreter::new();
    let stdin = io::stdin();

    // The interpreter's binding distances are keyed by expression id, so
    // every submission in the session must draw ids from one sequence.
    let mut next_id: usize = 0;

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();

        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        if line.trim().is_empty() {
            continue;
        }

        // Function values created by this submission keep borrowing its
        // tokens for the rest of the session, so the per-line buffers are
        // intentionally leaked (bounded by the amount of input typed).
        let src: &'static [u8] = Box::leak(line.into_bytes().into_boxed_slice());

        let Some(tokens) = scan_all(src) else {
            continue;
        };

        let tokens: &'static [Token<'static>] = Vec::leak(tokens);

        let mut parser = Parser::with_first_id(tokens, next_id);
        let parsed = parser.parse();

        // Ids issued before a syntax error stay burned either way.
        next_id = parser.next_id();

        let statements: Vec<Stmt<'static>> = match parsed {
            Ok(statements) => statements,

            Err(e) => {
                eprintln!("{}", e);

                continue;
            }
        };

        let _ = interpreter.resolve_and_run(&statements);
    }

    Ok(())
}
