//! `mush` — a thin demo/smoke-test binary over `mush_core`.
//!
//! This is deliberately **not** the shell dispatcher described in spec.md
//! §1: it does not parse shell syntax, does not maintain a program store
//! across invocations, and does not evaluate expressions. It exists to
//! exercise the job manager and variable store end to end, the way
//! `just-bash`'s own `main.rs` is a thin argv-handling shell around the
//! real `Bash` struct.

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use mush_core::pipeline::StringLiteral;
use mush_core::{Command, JobManager, JobManagerConfig, Pipeline, VariableStore};

#[derive(Parser)]
#[command(name = "mush")]
#[command(about = "Demo harness for mush_core's job manager and variable store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a single-stage pipeline, wait for it, and print its status and
    /// captured output.
    Run {
        /// Program and arguments, e.g. `mush run -- printf hello`.
        #[arg(last = true, required = true)]
        argv: Vec<String>,
    },
    /// Set a couple of variables and print the debug dump.
    Vars,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Cmd::Run { argv } => run_pipeline(argv),
        Cmd::Vars => run_vars(),
    };
    std::process::exit(code);
}

fn run_pipeline(argv: Vec<String>) -> i32 {
    let args = argv.into_iter().map(StringLiteral::new).collect();
    let pipeline = Pipeline::new(vec![Command::new(args)]).with_capture(true);

    let mut manager: JobManager<StringLiteral> = JobManager::new(JobManagerConfig::default());
    if let Err(err) = manager.init() {
        eprintln!("mush: failed to initialize job manager: {err}");
        return 1;
    }

    let job_id = match manager.run(&pipeline) {
        Ok(id) => id,
        Err(err) => {
            eprintln!("mush: failed to launch pipeline: {err}");
            let _ = manager.fini();
            return 1;
        }
    };

    let exit_status = match manager.wait(job_id) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("mush: wait failed: {err}");
            let _ = manager.fini();
            return 1;
        }
    };

    if let Ok(Some(output)) = manager.get_output(job_id) {
        let stdout = io::stdout();
        let _ = stdout.lock().write_all(output);
    }

    eprintln!("job {job_id} exited raw_status={exit_status}");

    let _ = manager.expunge(job_id);
    let _ = manager.fini();
    0
}

fn run_vars() -> i32 {
    let mut vars = VariableStore::new();
    let _ = vars.set_int("answer", 42);
    let _ = vars.set_string("greeting", Some(b"hello"));
    println!("{}", vars.show_to_string());
    0
}
