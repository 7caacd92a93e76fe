use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use typescope::catalog::{CatalogDiff, CatalogStats, GlobPattern, NamePattern};
use typescope::config::{Config, ConfigLoader};
use typescope::core::types::{Address, PointerWidth, ProcessArchitecture, TypeDefinition};
use typescope::memory::SnapshotBuilder;
use typescope::metadata::{ImageBuilder, TypeSpec};
use typescope::process::MemorySourceKind;
use typescope::scan::{
    run_scan_async, CancellationToken, EventSink, ScanEvent, ScanOutcome, ScanReport, ScanRequest,
};
use typescope::TypeCatalog;

#[derive(Parser, Debug)]
#[command(name = "typescope")]
#[command(about = "Decode the type metadata of a running process into a queryable catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "typescope.toml", env = "TYPESCOPE_CONFIG")]
    config: PathBuf,

    /// Where target memory is read from
    #[arg(long, global = true, value_enum, default_value = "direct")]
    source: SourceArg,

    /// Snapshot file, required with --source snapshot
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a module and dump every type
    Scan {
        /// Target process name
        process: String,

        /// Module holding the metadata (default from config)
        #[arg(short, long)]
        module: Option<String>,

        /// Dump format
        #[arg(short, long, value_enum, default_value = "text")]
        format: DumpFormat,
    },

    /// Scan and list the types matching a glob pattern
    Search {
        process: String,

        /// Glob over full type names; `*` matches any run
        pattern: String,

        #[arg(short, long)]
        module: Option<String>,

        /// Match ignoring case
        #[arg(short, long)]
        ignore_case: bool,

        /// Treat the pattern as a regular expression matched anywhere in the name
        #[arg(short, long)]
        regex: bool,

        /// Match field names instead of type names
        #[arg(long)]
        fields: bool,
    },

    /// Scan and print one field's offset
    Field {
        process: String,

        /// Full type name, e.g. Game.Player
        type_name: String,

        field: String,

        #[arg(short, long)]
        module: Option<String>,
    },

    /// Scan and summarise the catalog
    Stats {
        process: String,

        #[arg(short, long)]
        module: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: DumpFormat,
    },

    /// Scan and diff the catalog against a snapshot of another build
    Compare {
        process: String,

        /// Snapshot holding the build to compare against
        #[arg(long)]
        against: PathBuf,

        /// Process name inside the other snapshot (default: same as PROCESS)
        #[arg(long)]
        against_process: Option<String>,

        #[arg(short, long)]
        module: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: DumpFormat,
    },

    /// Write a demo snapshot file holding a small metadata table
    Synth {
        /// Output snapshot path
        output: PathBuf,

        /// Process name recorded in the snapshot
        #[arg(long, default_value = "game.exe")]
        process: String,

        /// Module name recorded in the snapshot (default from config)
        #[arg(short, long)]
        module: Option<String>,

        /// Write 32-bit big-endian tables instead of 64-bit little-endian
        #[arg(long)]
        legacy: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SourceArg {
    Direct,
    Snapshot,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DumpFormat {
    Text,
    Json,
}

/// Forwards scan progress to the log; log events are already mirrored
struct ProgressLog;

impl EventSink for ProgressLog {
    fn emit(&self, event: ScanEvent) {
        if let ScanEvent::Progress(progress) = event {
            debug!("Progress {}", progress);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new(&cli.config).load_or_default();

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("typescope v{} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);

    let source = match (cli.source, &cli.snapshot) {
        (SourceArg::Direct, None) => MemorySourceKind::Direct,
        (SourceArg::Direct, Some(path)) => {
            warn!("--snapshot {} ignored with --source direct", path.display());
            MemorySourceKind::Direct
        }
        (SourceArg::Snapshot, Some(path)) => MemorySourceKind::Snapshot(path.clone()),
        (SourceArg::Snapshot, None) => bail!("--source snapshot needs --snapshot <FILE>"),
    };
    let module_or_default =
        |module: Option<String>| module.unwrap_or_else(|| config.locator.default_module.clone());

    match cli.command {
        Command::Scan {
            process,
            module,
            format,
        } => {
            let request = ScanRequest {
                process_name: process,
                module_name: module_or_default(module),
                source,
            };
            let Some(report) = scan(request, &config).await? else {
                return Ok(());
            };
            match format {
                DumpFormat::Text => print!("{}", render_text(&report.catalog)),
                DumpFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(report.catalog.as_ref())?)
                }
            }
        }
        Command::Search {
            process,
            pattern,
            module,
            ignore_case,
            regex,
            fields,
        } => {
            let request = ScanRequest {
                process_name: process,
                module_name: module_or_default(module),
                source,
            };
            let Some(report) = scan(request, &config).await? else {
                return Ok(());
            };
            let matcher = if regex {
                NamePattern::regex_with_case(&pattern, !ignore_case)?
            } else if ignore_case {
                GlobPattern::new(&pattern).case_insensitive().into()
            } else {
                GlobPattern::new(&pattern).into()
            };
            if fields {
                for hit in report.catalog.search_fields_with(matcher) {
                    println!(
                        "{}.{} {}",
                        hit.type_def.full_name(),
                        hit.field.name(),
                        hit.field.offset_hex()
                    );
                }
            } else {
                let mut count = 0;
                for type_def in report.catalog.search_with(matcher) {
                    println!("{} {}", type_def.kind(), type_def.full_name());
                    count += 1;
                }
                info!("{} types match {}", count, pattern);
            }
        }
        Command::Field {
            process,
            type_name,
            field,
            module,
        } => {
            let request = ScanRequest {
                process_name: process,
                module_name: module_or_default(module),
                source,
            };
            let Some(report) = scan(request, &config).await? else {
                return Ok(());
            };
            let found = report.catalog.get_field(&type_name, &field)?;
            println!(
                "{}.{} {} {}",
                type_name,
                found.name(),
                found.offset_hex(),
                found.field_type().unwrap_or("?")
            );
        }
        Command::Stats {
            process,
            module,
            format,
        } => {
            let request = ScanRequest {
                process_name: process,
                module_name: module_or_default(module),
                source,
            };
            let Some(report) = scan(request, &config).await? else {
                return Ok(());
            };
            let stats = report.catalog.stats();
            match format {
                DumpFormat::Text => print!("{}", render_stats(&stats)),
                DumpFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            }
        }
        Command::Compare {
            process,
            against,
            against_process,
            module,
            format,
        } => {
            let module_name = module_or_default(module);
            let other_request = ScanRequest {
                process_name: against_process.unwrap_or_else(|| process.clone()),
                module_name: module_name.clone(),
                source: MemorySourceKind::Snapshot(against),
            };
            let request = ScanRequest {
                process_name: process,
                module_name,
                source,
            };
            let Some(first) = scan(request, &config).await? else {
                return Ok(());
            };
            let Some(second) = scan(other_request, &config).await? else {
                return Ok(());
            };
            let diff = first.catalog.compare(&second.catalog);
            match format {
                DumpFormat::Text => print!("{}", render_diff(&diff)),
                DumpFormat::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
            }
        }
        Command::Synth {
            output,
            process,
            module,
            legacy,
        } => {
            let module = module_or_default(module);
            synth(&output, &process, &module, legacy, &config)?;
            info!("Wrote demo snapshot {}", output.display());
        }
    }

    Ok(())
}

/// Run one scan, cancelling it on Ctrl+C
async fn scan(request: ScanRequest, config: &Config) -> Result<Option<ScanReport>> {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_scan_async(
        request,
        config.clone(),
        Arc::new(ProgressLog),
        cancel.clone(),
    ));
    tokio::pin!(task);

    let outcome = tokio::select! {
        result = &mut task => result.context("scan task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("Cancelling scan");
            cancel.cancel();
            task.await.context("scan task panicked")??
        }
    };

    match outcome {
        ScanOutcome::Completed(report) => {
            info!(
                "{} types, {} row errors, {} duplicates in {:?}",
                report.catalog.len(),
                report.row_errors.len(),
                report.duplicates.len(),
                report.duration
            );
            Ok(Some(report))
        }
        ScanOutcome::Cancelled => {
            warn!("Scan cancelled");
            Ok(None)
        }
    }
}

fn render_text(catalog: &TypeCatalog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// module {} ({} types)", catalog.module_name(), catalog.len());
    for type_def in catalog {
        render_type(&mut out, type_def);
    }
    out
}

fn render_type(out: &mut String, type_def: &TypeDefinition) {
    let _ = write!(out, "\n{} {}", type_def.kind(), type_def.full_name());
    if let Some(parent) = type_def.parent() {
        let _ = write!(out, " : {}", parent);
    }
    let _ = writeln!(out);
    for field in type_def.fields() {
        let modifier = match (field.is_static(), field.has_value()) {
            (true, true) => "const ",
            (true, false) => "static ",
            _ => "",
        };
        let _ = writeln!(
            out,
            "    {:>8}  {}{} {}",
            field.offset_hex(),
            modifier,
            field.field_type().unwrap_or("?"),
            field.name()
        );
    }
}

fn render_stats(stats: &CatalogStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "types        {}", stats.total_types);
    let _ = writeln!(
        out,
        "  classes {}  structs {}  interfaces {}  enums {}",
        stats.classes, stats.structs, stats.interfaces, stats.enums
    );
    let _ = writeln!(out, "fields       {}", stats.total_fields);
    let _ = writeln!(
        out,
        "  static {}  constant {}  average {:.1}/type",
        stats.static_fields, stats.constant_fields, stats.average_fields_per_type
    );
    if let Some((name, count)) = &stats.largest_type {
        let _ = writeln!(out, "largest      {} ({} fields)", name, count);
    }
    let _ = writeln!(
        out,
        "system/user  {}/{}  empty {}  complex {}",
        stats.system_types,
        stats.user_types,
        stats.empty_types.len(),
        stats.complex_types.len()
    );
    if !stats.top_namespaces.is_empty() {
        let _ = writeln!(out, "\ntop namespaces");
        for (namespace, count) in stats.top_namespaces.iter().take(10) {
            let _ = writeln!(out, "  {:>6}  {}", count, namespace);
        }
    }
    out
}

fn render_diff(diff: &CatalogDiff) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// {} removed, {} added, {} modified",
        diff.only_in_first.len(),
        diff.only_in_second.len(),
        diff.modified.len()
    );
    for name in &diff.only_in_first {
        let _ = writeln!(out, "- {}", name);
    }
    for name in &diff.only_in_second {
        let _ = writeln!(out, "+ {}", name);
    }
    for type_diff in &diff.modified {
        let _ = write!(out, "\n~ {}", type_diff.type_name);
        if let Some((before, after)) = type_diff.field_count {
            let _ = write!(out, " ({} -> {} fields)", before, after);
        }
        let _ = writeln!(out);
        for name in &type_diff.fields_only_in_first {
            let _ = writeln!(out, "    - {}", name);
        }
        for name in &type_diff.fields_only_in_second {
            let _ = writeln!(out, "    + {}", name);
        }
        for field in &type_diff.modified_fields {
            let _ = writeln!(
                out,
                "    ~ {}  0x{:X} -> 0x{:X}  {} -> {}",
                field.field_name,
                field.offset.0,
                field.offset.1,
                field.field_type.0.as_deref().unwrap_or("?"),
                field.field_type.1.as_deref().unwrap_or("?")
            );
        }
    }
    out
}

fn synth(
    output: &Path,
    process: &str,
    module: &str,
    legacy: bool,
    config: &Config,
) -> Result<()> {
    let (width, architecture, base) = if legacy {
        (PointerWidth::Bits32, ProcessArchitecture::X86, Address::new(0x1000_0000))
    } else {
        (PointerWidth::Bits64, ProcessArchitecture::X64, Address::new(0x7ff6_1000_0000))
    };
    let mut builder = ImageBuilder::new(width)
        .with_type(
            TypeSpec::class("UnityEngine", "Object").field("m_CachedPtr", "System.IntPtr", 0x10),
        )
        .with_type(TypeSpec::class("UnityEngine", "MonoBehaviour").parent("UnityEngine.Object"))
        .with_type(
            TypeSpec::structure("UnityEngine", "Vector3")
                .field("x", "System.Single", 0x0)
                .field("y", "System.Single", 0x4)
                .field("z", "System.Single", 0x8),
        )
        .with_type(
            TypeSpec::enumeration("Game", "Team")
                .field("value__", "System.Int32", 0x0)
                .constant("Red", "Game.Team")
                .constant("Blue", "Game.Team"),
        )
        .with_type(
            TypeSpec::class("Game", "Player")
                .parent("UnityEngine.MonoBehaviour")
                .field("m_Health", "System.Single", 0x18)
                .field("m_Name", "System.String", 0x20)
                .field("m_Position", "UnityEngine.Vector3", 0x28)
                .field("m_Team", "Game.Team", 0x34)
                .static_field("LocalPlayer", "Game.Player", 0x0),
        )
        .with_type(TypeSpec::interface("Game", "IDamageable"));
    if legacy {
        builder = builder.endian(typescope::memory::Endian::Big);
    }

    let image = builder
        .build_module(base, config.metadata.root_rva_offset)
        .context("building metadata image")?;
    let module_file = if module.contains('.') {
        module.to_string()
    } else {
        format!("{}.dll", module)
    };

    SnapshotBuilder::new(4242, process, architecture)
        .module("UnityPlayer.dll", Address::new(0x1_0000), 0x1000)
        .module(module_file, image.base, image.bytes.len() as u64)
        .region(image.base, &image.bytes)
        .build()
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}
