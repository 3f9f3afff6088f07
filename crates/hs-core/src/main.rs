//! hostsnap - point-in-time OS and hardware fact gathering
//!
//! Thin formatting layer over the hs-core library:
//! - `os`  resolves the operating system identity
//! - `ps`  takes a process snapshot
//! - `fs`  enumerates mounted file stores
//! - `net` enumerates network interfaces
//!
//! Collection is best-effort end to end: degraded platforms produce
//! empty or partial output and a zero exit code, never a hard error.

use clap::{Args, Parser, Subcommand};
use hs_common::{OutputFormat, Result};
use hs_core::logging::{init_logging, LogConfig};
use hs_core::snapshot::{SnapshotOptions, SortKey};
use hs_core::source::LinuxSourceAdapter;
use hs_core::{
    collect_file_stores, collect_net_interfaces, resolve_os_identity, snapshot_processes,
    StaticFacts,
};
use serde::Serialize;

/// Point-in-time OS and hardware fact gathering
#[derive(Parser)]
#[command(name = "hostsnap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "table")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the operating system identity
    Os,

    /// Take a process snapshot
    Ps(PsArgs),

    /// Enumerate mounted file stores
    Fs,

    /// Enumerate network interfaces
    Net,
}

#[derive(Args, Debug)]
struct PsArgs {
    /// Restrict the snapshot to these pids
    #[arg(long, value_delimiter = ',')]
    pids: Vec<u32>,

    /// Include the expensive per-process fields (path, user, cwd, ...)
    #[arg(long)]
    slow: bool,

    /// Sort order
    #[arg(long, value_enum, default_value = "unsorted")]
    sort: SortKey,

    /// Show at most this many processes (0 = all)
    #[arg(long, default_value_t = 0)]
    limit: usize,
}

fn main() -> std::process::ExitCode {
    init_logging(&LogConfig::from_env());
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("hostsnap: {}", err);
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let adapter = LinuxSourceAdapter::new();
    match &cli.command {
        Commands::Os => {
            let identity = resolve_os_identity(&adapter);
            match cli.global.format {
                OutputFormat::Json => emit_json(&identity)?,
                OutputFormat::Table => {
                    println!("family:       {}", identity.family);
                    println!("version:      {}", identity.version);
                    println!("code name:    {}", identity.code_name);
                    println!("build number: {}", identity.build_number);
                }
            }
        }
        Commands::Ps(args) => {
            let facts = StaticFacts::gather(&adapter);
            let options = SnapshotOptions {
                filter_pids: if args.pids.is_empty() {
                    None
                } else {
                    Some(args.pids.iter().copied().collect())
                },
                include_slow_fields: args.slow,
                sort: args.sort,
                limit: args.limit,
            };
            let records = snapshot_processes(&adapter, &facts, &options);
            match cli.global.format {
                OutputFormat::Json => {
                    let envelope = PsOutput {
                        taken_at: chrono::Utc::now().to_rfc3339(),
                        process_count: records.len(),
                        processes: &records,
                    };
                    emit_json(&envelope)?;
                }
                OutputFormat::Table => {
                    println!(
                        "{:>8} {:>8} {:<10} {:>5} {:>12} {:>12} {:<16}",
                        "PID", "PPID", "STATE", "THR", "RSS", "CPU-MS", "NAME"
                    );
                    for r in &records {
                        println!(
                            "{:>8} {:>8} {:<10} {:>5} {:>12} {:>12} {:<16}",
                            r.pid.0,
                            r.parent_pid.0,
                            r.state.to_string(),
                            r.thread_count,
                            r.resident_set_size,
                            r.user_time_ms + r.kernel_time_ms,
                            r.name
                        );
                    }
                }
            }
        }
        Commands::Fs => {
            let stores = collect_file_stores(&adapter);
            match cli.global.format {
                OutputFormat::Json => emit_json(&stores)?,
                OutputFormat::Table => {
                    println!(
                        "{:<24} {:<20} {:<8} {:>14} {:>14}",
                        "MOUNT", "VOLUME", "TYPE", "TOTAL", "USABLE"
                    );
                    for s in &stores {
                        println!(
                            "{:<24} {:<20} {:<8} {:>14} {:>14}",
                            s.mount, s.volume, s.fs_type, s.total_space, s.usable_space
                        );
                    }
                }
            }
        }
        Commands::Net => {
            let interfaces = collect_net_interfaces(&adapter);
            match cli.global.format {
                OutputFormat::Json => emit_json(&interfaces)?,
                OutputFormat::Table => {
                    println!(
                        "{:<12} {:<18} {:>6} {:>12} {:<20}",
                        "NAME", "MAC", "MTU", "SPEED", "IPV4"
                    );
                    for i in &interfaces {
                        println!(
                            "{:<12} {:<18} {:>6} {:>12} {:<20}",
                            i.name,
                            i.mac,
                            i.mtu,
                            i.speed,
                            i.ipv4.join(",")
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

/// JSON envelope for process snapshots.
#[derive(Serialize)]
struct PsOutput<'a> {
    taken_at: String,
    process_count: usize,
    processes: &'a [hs_core::ProcessRecord],
}

fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
