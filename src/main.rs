//! cosched - cooperative scheduler demo CLI

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cosched::util::config::{load_config, load_project_config, CoschedConfig};
use cosched::util::logger::{self, LogLevel};
use cosched::{ChannelInput, Scheduler, SchedulerBuilder, ScriptedInput, NAME, VERSION};
use tracing::info;

/// Marks a poll that finds no data in `--script`.
const SCRIPT_GAP: char = '.';

/// Single-threaded cooperative task scheduler
#[derive(Parser, Debug)]
#[command(name = "cosched")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./cosched.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Task table size, host included
    #[arg(long, global = true)]
    max_tasks: Option<usize>,

    /// Stack size of each task stack, in bytes
    #[arg(long, global = true)]
    stack_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sleeper/reader demo
    ///
    /// Task A sleeps, task B reads characters and then waits on A, and the
    /// host waits on B. Without --script, characters come from stdin; if
    /// stdin closes before B has read enough, a warning is logged and B keeps
    /// polling until interrupted.
    Demo {
        /// How long task A sleeps
        #[arg(long, default_value_t = 50, value_name = "MS")]
        sleep_ms: u64,

        /// Number of characters task B reads
        #[arg(long, default_value_t = 3)]
        reads: usize,

        /// Scripted input; every `.` is a poll that finds nothing
        #[arg(long, value_name = "SCRIPT")]
        script: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;
    logger::init_with_level(config.log.level);

    match args.command {
        Commands::Demo {
            sleep_ms,
            reads,
            script,
        } => run_demo(config, sleep_ms, reads, script)?,
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

/// Defaults, then the config file, then `COSCHED_*` variables, then flags.
fn resolve_config(args: &Args) -> Result<CoschedConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => {
            let dir = std::env::current_dir().context("Failed to get current directory")?;
            load_project_config(&dir)?
        }
    };
    config.apply_env()?;

    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    if let Some(max_tasks) = args.max_tasks {
        config.scheduler.max_tasks = max_tasks;
    }
    if let Some(stack_size) = args.stack_size {
        config.scheduler.stack_size = stack_size;
    }
    Ok(config)
}

fn run_demo(
    config: CoschedConfig,
    sleep_ms: u64,
    reads: usize,
    script: Option<String>,
) -> Result<()> {
    let builder = Scheduler::builder().config(config.scheduler);
    let builder: SchedulerBuilder = match script {
        Some(script) => {
            let available = script.chars().filter(|&c| c != SCRIPT_GAP).count();
            if available < reads {
                bail!(
                    "script delivers {} characters but task B reads {}",
                    available,
                    reads
                );
            }
            builder.input(ScriptedInput::from_script(&script, SCRIPT_GAP))
        }
        None => {
            eprintln!("Type {} characters:", reads);
            builder.input(ChannelInput::stdin().context("Failed to start stdin reader")?)
        }
    };
    let scheduler = builder.build()?;

    let log = Rc::new(RefCell::new(Vec::new()));
    let record = {
        let log = log.clone();
        move |sched: &Scheduler, event: String| {
            let task = sched.current().to_string();
            log.borrow_mut()
                .push(format!("{:>6} ms  {:<8} {}", sched.now_ms(), task, event));
        }
    };

    let a = {
        let record = record.clone();
        scheduler.create_named("A", move |sched| {
            record(sched, format!("sleeps {} ms", sleep_ms));
            sched.sleep(sleep_ms);
            record(sched, "woke, returning".to_string());
        })?
    };
    let b = {
        let record = record.clone();
        scheduler.create_named("B", move |sched| {
            for _ in 0..reads {
                let c = sched.read_char();
                record(sched, format!("read {:?}", c));
            }
            record(sched, format!("waits on {}", a));
            if let Err(e) = sched.wait(a) {
                record(sched, format!("wait failed: {}", e));
            }
            record(sched, "returning".to_string());
        })?
    };

    record(&scheduler, format!("waits on {}", b));
    scheduler.wait(b)?;
    record(&scheduler, "resumed".to_string());

    for line in log.borrow().iter() {
        println!("{}", line);
    }

    let stats = scheduler.stats();
    info!(
        created = stats.tasks_created(),
        exited = stats.tasks_exited(),
        switches = stats.context_switches(),
        idle = stats.idle_passes(),
        released = stats.stacks_released(),
        "scheduler stats"
    );
    println!(
        "tasks created: {}, exited: {}, context switches: {}, idle passes: {}, stacks released: {}",
        stats.tasks_created(),
        stats.tasks_exited(),
        stats.context_switches(),
        stats.idle_passes(),
        stats.stacks_released()
    );
    Ok(())
}
