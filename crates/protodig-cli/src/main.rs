//! protodig - Extract Protocol Buffer definitions from compiled binaries
//!
//! This tool scans binary files for embedded protobuf file descriptors
//! and reconstructs them into human-readable `.proto` source files.

mod registry;
mod sniff;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use protodig_core::{extract, scan_file, ReconstructorConfig, RenderedFile, ScannerConfig};
use registry::{ConflictStrategy, OutputRegistry, Placement};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Extract Protocol Buffer definitions from compiled binaries
#[derive(Parser, Debug)]
#[command(name = "protodig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Output directory for extracted .proto files
    #[arg(short, long, default_value = ".", env = "PROTODIG_OUTPUT")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv); -vv and above also traces the scanner
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Maximum number of descriptors to extract per file (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_descriptors: usize,

    /// Do not reattach source comments
    #[arg(long)]
    no_comments: bool,

    /// Dry run - don't write files, just show what would be extracted
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Only list found descriptors without extracting
    #[arg(long)]
    list_only: bool,

    /// Conflict resolution strategy for same-name different-content protos
    #[arg(long, value_enum, default_value = "hash-suffix")]
    conflict_strategy: ConflictStrategy,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single binary file to extract definitions from
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of binaries to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

impl Cli {
    fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig::new()
            .max_results(self.max_descriptors)
            .verbose(self.verbose >= 2)
    }

    fn reconstructor_config(&self) -> ReconstructorConfig {
        ReconstructorConfig::new().include_comments(!self.no_comments)
    }

    fn writes_files(&self) -> bool {
        !self.list_only && !self.dry_run
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let inputs = if let Some(ref file) = cli.input.file {
        vec![check_input_file(file)?]
    } else if let Some(ref directory) = cli.input.directory {
        discover_binaries(directory)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    let mut session = Session::new(&cli);
    session.run(&inputs, cli.input.directory.is_some())?;

    if cli.writes_files() {
        info!("Summary: {}", session.registry.stats);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();
}

fn check_input_file(file: &Path) -> Result<PathBuf> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let size = fs::metadata(file)
        .with_context(|| format!("Failed to stat input file: {}", file.display()))?
        .len();
    if size > sniff::MAX_INPUT_SIZE {
        bail!(
            "Input file is too large ({} bytes, limit {}): {}",
            size,
            sniff::MAX_INPUT_SIZE,
            file.display()
        );
    }

    Ok(file.to_path_buf())
}

/// Walks `directory` and returns the files that look like executables
fn discover_binaries(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        bail!("Not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let binaries: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.into_path())
        .filter(|path| {
            let keep = sniff::is_likely_binary(path);
            if !keep {
                trace!("Skipping non-binary: {}", path.display());
            }
            keep
        })
        .collect();

    info!("Found {} candidate binaries", binaries.len());
    Ok(binaries)
}

/// One run over all inputs, sharing the output registry
struct Session<'a> {
    cli: &'a Cli,
    scanner: ScannerConfig,
    reconstructor: ReconstructorConfig,
    registry: OutputRegistry,
}

impl<'a> Session<'a> {
    fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            scanner: cli.scanner_config(),
            reconstructor: cli.reconstructor_config(),
            registry: OutputRegistry::new(cli.conflict_strategy),
        }
    }

    /// In a directory walk a failing binary is logged and skipped
    fn run(&mut self, inputs: &[PathBuf], keep_going: bool) -> Result<()> {
        for input in inputs {
            debug!("Processing binary: {}", input.display());
            match self.process_binary(input) {
                Ok(()) => {}
                Err(e) if keep_going => warn!("Error processing {}: {:#}", input.display(), e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn process_binary(&mut self, binary: &Path) -> Result<()> {
        if let Ok(Some(format)) = sniff::detect_format(binary) {
            trace!("{} looks like {:?}", binary.display(), format);
        }

        let scanned = scan_file(binary, &self.scanner)
            .with_context(|| format!("Failed to scan binary: {}", binary.display()))?;

        if scanned.candidates().is_empty() {
            trace!("No descriptors found in {}", binary.display());
            return Ok(());
        }
        debug!(
            "Found {} potential descriptor(s) in {}",
            scanned.candidates().len(),
            binary.display()
        );

        for extraction in extract(&scanned, &self.reconstructor) {
            match extraction.result {
                Ok(rendered) => self.emit(binary, &rendered),
                Err(e) => trace!(
                    "Discarding candidate at offset {} in {}: {}",
                    extraction.range.start,
                    binary.display(),
                    e
                ),
            }
        }
        Ok(())
    }

    fn emit(&mut self, binary: &Path, rendered: &RenderedFile) {
        if self.cli.list_only {
            println!("{}", rendered.filename);
            return;
        }

        if let Err(e) = check_relative_path(&rendered.filename) {
            warn!("Refusing to write {}: {:#}", rendered.filename, e);
            self.registry.stats.rejected += 1;
            return;
        }

        let relative = match self.registry.place(&rendered.filename, &rendered.text, binary) {
            Placement::Write(relative) => relative,
            Placement::Duplicate | Placement::Conflict => return,
        };
        let output_path = self.cli.output.join(relative);

        if self.cli.dry_run {
            println!("Would write: {}", output_path.display());
            if self.cli.verbose > 0 {
                println!("---\n{}---", rendered.text);
            }
            return;
        }

        match write_proto_file(&output_path, &rendered.text, self.cli.force) {
            Ok(()) => {
                println!("Wrote {}", output_path.display());
                self.registry.stats.written += 1;
            }
            Err(e) => error!("Failed to write {}: {:#}", output_path.display(), e),
        }
    }
}

/// Output names come from untrusted input; only plain relative paths are allowed
fn check_relative_path(filename: &str) -> Result<()> {
    if filename.is_empty() {
        bail!("empty file name");
    }

    for component in Path::new(filename).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => bail!("path contains '..'"),
            Component::RootDir | Component::Prefix(_) => bail!("path is absolute"),
        }
    }

    Ok(())
}

/// Writes `content`, creating parent directories; existing files need `force`
fn write_proto_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if !force && output_path.exists() {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    fs::write(output_path, content)
        .with_context(|| format!("Failed to write file: {}", output_path.display()))
}
