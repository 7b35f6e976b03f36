mod interactive;

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use cache_sim::{
    config::HierarchyConfig,
    io::{Output, TextOutput},
    sim::Simulator,
    trace::{TraceItem, TraceReader},
};
use clap::{Args, Parser, Subcommand};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// replay a memory trace through the L1/L2 hierarchy
    Run(RunArgs),
    /// print the geometry derived from a config file
    Info(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// File path to cache config (`<label> <block size> <ways> <capacity KiB>`, L1 then L2)
    #[arg(short, long)]
    config: PathBuf,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    delegate: CommonArgs,
    /// File path to memory trace (`<R|W> <hex address>` per line)
    #[arg(short, long)]
    trace: PathBuf,
    /// File path to output (defaults to `<trace>.out`)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Enable interactive mode
    #[arg(long)]
    interactive: bool,
    /// File path to write run statistics as JSON
    #[arg(long)]
    stat_json: Option<PathBuf>,
}

fn init_logger(verbose: bool) {
    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    match args.command {
        Command::Info(CommonArgs { config, verbose }) => {
            init_logger(verbose);
            let config = read_config(&config)?;
            println!("{config}");
            Ok(())
        }
        Command::Run(RunArgs {
            delegate: CommonArgs { config, verbose },
            trace,
            output,
            interactive,
            stat_json,
        }) => {
            init_logger(verbose);
            let config = read_config(&config)?;
            let output = output.unwrap_or_else(|| default_output_path(&trace));
            let trace_file = File::open(&trace)
                .with_context(|| format!("unable to open trace {}", trace.display()))?;
            let out_file = File::create(&output)
                .with_context(|| format!("unable to create output {}", output.display()))?;
            let mut sim = Simulator::new(
                config,
                TraceReader::new(BufReader::new(trace_file)),
                TextOutput::new(BufWriter::new(out_file)),
            );
            execute(&mut sim, interactive)?;
            log::info!("access states written to {}", output.display());
            output_stat(&sim, stat_json)
        }
    }
}

fn read_config(path: &Path) -> Result<HierarchyConfig> {
    let src = fs::read_to_string(path)
        .with_context(|| format!("unable to open config {}", path.display()))?;
    let config = HierarchyConfig::parse(&src)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

fn default_output_path(trace: &Path) -> PathBuf {
    let mut name = trace.as_os_str().to_owned();
    name.push(".out");
    PathBuf::from(name)
}

fn execute<T, O>(sim: &mut Simulator<T, O>, interactive: bool) -> Result<()>
where
    T: Iterator<Item = TraceItem>,
    O: Output,
{
    if interactive {
        interactive::execute_interactive(sim)
    } else {
        Ok(sim.run()?)
    }
}

#[cfg(not(feature = "stat"))]
fn output_stat<T, O>(_: &Simulator<T, O>, stat_json: Option<PathBuf>) -> Result<()> {
    if stat_json.is_some() {
        log::warn!("--stat-json ignored: built without the `stat` feature");
    }
    Ok(())
}

#[cfg(feature = "stat")]
fn output_stat<T, O>(sim: &Simulator<T, O>, stat_json: Option<PathBuf>) -> Result<()> {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
    if let Some(path) = stat_json {
        let file = File::create(&path)
            .with_context(|| format!("unable to create {}", path.display()))?;
        sim.report().write_json(BufWriter::new(file))?;
    }
    Ok(())
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            PathBuf::from("traces/trace.txt.out"),
            default_output_path(Path::new("traces/trace.txt"))
        );
    }
    #[test]
    fn test_cli_args() {
        let cli = Cli::try_parse_from([
            "cli", "run", "-c", "cacheconfig.txt", "-t", "trace.txt", "--stat-json", "s.json",
        ])
        .unwrap();
        match cli.command {
            Command::Run(r) => {
                assert_eq!(PathBuf::from("cacheconfig.txt"), r.delegate.config);
                assert_eq!(PathBuf::from("trace.txt"), r.trace);
                assert!(r.output.is_none());
                assert!(!r.interactive);
                assert_eq!(Some(PathBuf::from("s.json")), r.stat_json);
            }
            Command::Info(_) => panic!("expected run"),
        }
    }
}
