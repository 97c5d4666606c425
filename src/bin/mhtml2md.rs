//! CLI binary for mhtml2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints or writes results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use mhtml2md::convert::write_atomic;
use mhtml2md::{
    convert, convert_batch, inspect, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, DocumentInfo, Mhtml2MdError, OutputFormat, ProgressCallback,
    TraceLog,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback for batch runs: one bar for the whole batch
/// and one log line per finished document. Documents finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, _index: usize, _total: usize, path: &Path) {
        self.bar.set_message(file_name(path));
    }

    fn on_document_complete(&self, index: usize, total: usize, output_len: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{output_len:>7} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        // First line only; the rest is a hint.
        let msg = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();
        let secs = self.started.elapsed().as_secs_f64();

        if failed == 0 {
            eprintln!(
                "{} {} files converted in {:.1}s",
                green("✔"),
                bold(&success_count.to_string()),
                secs
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown to stdout
  mhtml2md page.mht

  # Convert to file
  mhtml2md page.mht -o page.md

  # Self-contained HTML with images inlined
  mhtml2md --format html page.mhtml -o page.html

  # Batch: every archive into one directory, 8 at a time
  mhtml2md saved/*.mht --out-dir converted/ -c 8

  # Generic converter instead of the structure-aware passes
  mhtml2md --basic page.mht

  # List the MIME parts of an archive
  mhtml2md --inspect-only page.mht

  # JSON output with part summaries, stats and trace
  mhtml2md --json page.mht > page.json

  # Show the decoder trace and per-pass lengths
  mhtml2md --trace --debug page.mht -o page.md

OUTPUT LOCATION:
  One input, no -o          stdout
  One input, -o FILE        FILE
  --out-dir DIR             DIR/<input stem>.<md|html>
  Several inputs, no dir    next to each input, extension replaced

ENVIRONMENT VARIABLES:
  MHTML2MD_FORMAT        Output format (html, markdown)
  MHTML2MD_OUT_DIR       Output directory for batches
  MHTML2MD_CONCURRENCY   Files converted at once
  RUST_LOG               Log filter (overrides -v / -q)
"#;

/// Convert MHTML web archives to HTML or Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "mhtml2md",
    version,
    about = "Convert MHTML web archives (.mht/.mhtml) to Markdown or self-contained HTML",
    long_about = "Convert MHTML web archives (.mht / .mhtml files saved by browsers) to clean \
Markdown or to a single self-contained HTML file with images inlined as data URIs.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// MHTML files to convert.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Write the result to this file instead of stdout (single input only).
    #[arg(short, long, env = "MHTML2MD_OUTPUT", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Directory for batch output; files are named after their input.
    #[arg(long, env = "MHTML2MD_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Output format.
    #[arg(long, env = "MHTML2MD_FORMAT", value_enum, default_value = "markdown")]
    format: FormatArg,

    /// Leave cid: image references untouched instead of inlining data URIs.
    #[arg(long, env = "MHTML2MD_NO_IMAGES")]
    no_images: bool,

    /// Decode image bodies (inspection only; cannot be combined with conversion).
    #[arg(long, env = "MHTML2MD_DECODE_IMAGES")]
    decode_images: bool,

    /// Use the generic HTML → Markdown converter.
    #[arg(long, env = "MHTML2MD_BASIC")]
    basic: bool,

    /// Record every Markdown rewrite pass in the trace.
    #[arg(long, env = "MHTML2MD_DEBUG")]
    debug: bool,

    /// Output structured JSON (ConversionOutput) instead of the document.
    #[arg(long, env = "MHTML2MD_JSON")]
    json: bool,

    /// Print the conversion trace to stderr.
    #[arg(long, env = "MHTML2MD_TRACE")]
    trace: bool,

    /// List the MIME parts only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Number of files converted at once.
    #[arg(short, long, env = "MHTML2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Disable progress bar.
    #[arg(long, env = "MHTML2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MHTML2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MHTML2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Html,
    Markdown,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Html => OutputFormat::Html,
            FormatArg::Markdown => OutputFormat::Markdown,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output takes a single input; use --out-dir for several files");
    }
    let batch = cli.inputs.len() > 1 || cli.out_dir.is_some();

    // ── Logging setup ────────────────────────────────────────────────────
    // The batch progress bar replaces INFO-level library logs.
    let show_progress = batch && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
    install_panic_hook();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        for path in &cli.inputs {
            let info = inspect(path, &config)
                .await
                .with_context(|| format!("Failed to inspect {}", path.display()))?;
            if cli.trace {
                print_trace(path, &info.trace);
            }
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("Failed to serialize parts")?
                );
            } else {
                print_parts(path, &info);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    if batch {
        run_batch(&cli, &config).await
    } else {
        run_single(&cli, &config).await
    }
}

/// One input: stdout, or `-o`.
async fn run_single(cli: &Cli, config: &ConversionConfig) -> Result<()> {
    let input = &cli.inputs[0];
    let output = match convert(input, config).await {
        Ok(output) => output,
        Err(e) => {
            if cli.trace {
                if let Some(trace) = e.trace() {
                    print_trace(input, trace);
                }
            }
            return Err(e).with_context(|| format!("Conversion of {} failed", input.display()));
        }
    };
    if cli.trace {
        print_trace(input, &output.trace);
    }

    if let Some(ref output_path) = cli.output {
        let body = if cli.json {
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        } else {
            output.content.clone()
        };
        write_atomic(output_path, body.into_bytes())
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            print_summary(&output, Some(output_path));
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            writeln!(handle, "{json}").context("Failed to write to stdout")?;
        } else {
            handle
                .write_all(output.content.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.content.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
        if !cli.quiet {
            print_summary(&output, None);
        }
    }
    Ok(())
}

/// Several inputs, or `--out-dir`: convert concurrently and write each result.
async fn run_batch(cli: &Cli, config: &ConversionConfig) -> Result<()> {
    let extension = if cli.json {
        "json"
    } else {
        config.output_format.extension()
    };
    let mut results = convert_batch(cli.inputs.clone(), config);
    let mut failures = 0usize;

    while let Some(doc) = results.next().await {
        let target = output_path_for(&doc.path, cli.out_dir.as_deref(), extension);
        match doc.result {
            Ok(output) => {
                if cli.trace {
                    print_trace(&doc.path, &output.trace);
                }
                let body = if cli.json {
                    serde_json::to_string_pretty(&output).context("Failed to serialise output")?
                } else {
                    output.content
                };
                if let Err(e) = write_atomic(&target, body.into_bytes()).await {
                    failures += 1;
                    eprintln!("{} {}", red("✗"), e);
                } else if !cli.quiet && config.progress_callback.is_none() {
                    eprintln!("{} {}", green("✓"), target.display());
                }
            }
            Err(e) => {
                failures += 1;
                if cli.trace {
                    if let Some(trace) = e.trace() {
                        print_trace(&doc.path, trace);
                    }
                }
                if config.progress_callback.is_none() {
                    eprintln!("{} {}: {}", red("✗"), doc.path.display(), first_line(&e));
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} file(s) failed", cli.inputs.len());
    }
    Ok(())
}

/// Keep recovered rewrite-pass panics off the terminal. The document still
/// converts through the plain-text fallback; anything else panics as usual.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if mhtml2md::pipeline::markdown::panic_is_recovered() {
            tracing::debug!("Recovered rewrite-pass panic: {info}");
        } else {
            default_hook(info);
        }
    }));
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .output_format(cli.format.into())
        .include_images(!cli.no_images)
        .decode_image_data(cli.decode_images)
        .enhanced_markdown(!cli.basic)
        .debug_mode(cli.debug)
        .concurrency(cli.concurrency);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `out_dir/<stem>.<ext>`, or the input path with its extension replaced.
fn output_path_for(input: &Path, out_dir: Option<&Path>, extension: &str) -> PathBuf {
    match out_dir {
        Some(dir) => {
            let stem = input
                .file_stem()
                .map(|s| s.to_os_string())
                .unwrap_or_else(|| "output".into());
            dir.join(stem).with_extension(extension)
        }
        None => input.with_extension(extension),
    }
}

fn first_line(e: &Mhtml2MdError) -> String {
    e.to_string().lines().next().unwrap_or_default().to_string()
}

fn print_trace(path: &Path, trace: &TraceLog) {
    eprintln!("{}", bold(&format!("── trace: {} ──", path.display())));
    for entry in trace.entries() {
        eprintln!("  {}", dim(entry));
    }
}

fn print_summary(output: &ConversionOutput, written_to: Option<&Path>) {
    let s = &output.stats;
    let mut line = format!(
        "{}  {} parts ({} html, {} images, {} other)  {} inlined  {}ms",
        if s.decode_failures == 0 && s.markdown_fallback.is_none() {
            green("✔")
        } else {
            cyan("⚠")
        },
        s.total_parts,
        s.html_parts,
        s.image_parts,
        s.other_parts,
        s.images_embedded,
        s.duration_ms,
    );
    if let Some(path) = written_to {
        line.push_str(&format!("  →  {}", bold(&path.display().to_string())));
    }
    eprintln!("{line}");
    if s.decode_failures > 0 {
        eprintln!("   {} part(s) kept undecoded", s.decode_failures);
    }
    if let Some(ref fallback) = s.markdown_fallback {
        eprintln!("   {}", dim(&format!("markdown fallback: {fallback:?}")));
    }
}

fn print_parts(path: &Path, info: &DocumentInfo) {
    println!("File:       {}", path.display());
    println!("Boundary:   {}", info.boundary);
    println!(
        "Parts:      {} ({} html, {} images, {} other)",
        info.stats.total_parts, info.stats.html_parts, info.stats.image_parts, info.stats.other_parts
    );
    for part in &info.parts {
        let encoding = match part.transfer_encoding.as_str() {
            "" => "-",
            other => other,
        };
        println!(
            "  {:>3}  {:<24} {:<16} {:<10} {:>8}  {}{}",
            part.index,
            part.content_type,
            encoding,
            part.charset,
            part.body_len,
            part.identifier,
            match part.decode_error {
                Some(ref e) => format!("  {}", red(&e.to_string())),
                None => String::new(),
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_in_out_dir() {
        let p = output_path_for(Path::new("saved/page.mht"), Some(Path::new("out")), "md");
        assert_eq!(p, PathBuf::from("out/page.md"));
    }

    #[test]
    fn output_path_next_to_input() {
        let p = output_path_for(Path::new("saved/page.mhtml"), None, "html");
        assert_eq!(p, PathBuf::from("saved/page.html"));
    }

    #[test]
    fn cli_parses_batch_flags() {
        let cli = Cli::try_parse_from([
            "mhtml2md", "a.mht", "b.mht", "--out-dir", "out", "--format", "html", "-c", "2",
            "--no-images",
        ])
        .unwrap();
        assert_eq!(cli.inputs.len(), 2);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.output_format, OutputFormat::Html);
        assert!(!config.include_images);
        assert_eq!(config.concurrency, 2);
    }

    #[test]
    fn output_conflicts_with_out_dir() {
        assert!(Cli::try_parse_from(["mhtml2md", "a.mht", "-o", "x.md", "--out-dir", "d"]).is_err());
    }
}
