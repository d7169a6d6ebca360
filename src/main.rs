//! Railyard CLI: serve the demo application, list its routes, or check that models boot.

use std::env;
use std::path::PathBuf;
use std::process;

use colored::Colorize;
use mimalloc::MiMalloc;

use railyard::{app, logging, AppConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Boot the models and serve HTTP
    Serve { port: Option<u16> },
    /// Print the routing table
    Routes,
    /// Boot the models and exit
    Check,
    Help,
    Version,
}

struct Options {
    command: Command,
    root: PathBuf,
}

fn print_usage() {
    eprintln!("Railyard v{}", VERSION);
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  railyard serve [--port N] [--root DIR]   Boot models and start the server");
    eprintln!("  railyard routes [--root DIR]             Print the routing table");
    eprintln!("  railyard check [--root DIR]              Boot models and exit");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --port, -p N    Port to listen on (overrides PORT)");
    eprintln!("  --root DIR      Application root holding .env files and app/views");
    eprintln!("  --help, -h      Show this help message");
    eprintln!("  --version, -v   Show version");
}

fn fail(message: &str) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    eprintln!();
    print_usage();
    process::exit(2);
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut command = None;
    let mut port = None;
    let mut root = PathBuf::from(".");
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "serve" | "server" | "s" => command = Some(Command::Serve { port: None }),
            "routes" => command = Some(Command::Routes),
            "check" => command = Some(Command::Check),
            "--help" | "-h" | "help" => command = Some(Command::Help),
            "--version" | "-v" => command = Some(Command::Version),
            "--port" | "-p" => {
                i += 1;
                let Some(raw) = args.get(i) else {
                    fail("--port requires a value");
                };
                match raw.parse::<u16>() {
                    Ok(p) => port = Some(p),
                    Err(_) => fail(&format!("invalid port '{}'", raw)),
                }
            }
            "--root" => {
                i += 1;
                let Some(dir) = args.get(i) else {
                    fail("--root requires a directory");
                };
                root = PathBuf::from(dir);
            }
            other => fail(&format!("unexpected argument '{}'", other)),
        }
        i += 1;
    }

    let command = match command {
        Some(Command::Serve { .. }) => Command::Serve { port },
        Some(other) => other,
        None => Command::Help,
    };
    Options { command, root }
}

fn main() {
    let options = parse_args();
    match options.command {
        Command::Help => {
            print_usage();
            return;
        }
        Command::Version => {
            println!("railyard {}", VERSION);
            return;
        }
        _ => {}
    }

    let mut config = AppConfig::load(&options.root);
    if let Command::Serve { port: Some(port) } = options.command {
        config.port = port;
    }
    logging::init(&config.log_level);

    let application = match app::build(config) {
        Ok(application) => application,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            process::exit(1);
        }
    };

    match options.command {
        Command::Routes => print!("{}", application.router().table()),
        Command::Check => match application.boot() {
            Ok(booted) => {
                println!(
                    "{} {} model(s) booted: {}",
                    "ok".green().bold(),
                    booted.len(),
                    booted.model_names().collect::<Vec<_>>().join(", ")
                );
            }
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err);
                process::exit(1);
            }
        },
        Command::Serve { .. } => {
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    eprintln!("{} failed to start runtime: {}", "error:".red().bold(), err);
                    process::exit(1);
                }
            };
            if let Err(err) = runtime.block_on(application.start()) {
                eprintln!("{} {}", "error:".red().bold(), err);
                process::exit(1);
            }
        }
        Command::Help | Command::Version => {}
    }
}
