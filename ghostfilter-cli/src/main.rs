use clap::Parser;
use colored::Colorize;
use ghostfilter::{
    config::{CliOverrides, FilterConfig, OutputFormat},
    errors::Stage,
    sink::{write_stats_json, write_stats_text, JsonSink, LineSink, ResultSink},
    FilterError, PipelineResult,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, FilterError>;

#[derive(Parser)]
#[command(name = "ghostfilter", author, version, about = "Flag sensitive URLs in large crawl lists", long_about = None)]
struct Cli {
    /// Path to the input file containing URLs, one per line ("-" reads stdin)
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Path to the output file ("-" writes to stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output format (text|json), inferred from the output extension by default
    #[arg(short = 'f', long)]
    format: Option<OutputFormat>,

    /// Write per-rule match counts to this file
    #[arg(short = 's', long)]
    stats: Option<PathBuf>,

    /// Statistics format (text|json), inferred from the stats extension by default
    #[arg(long)]
    stats_format: Option<OutputFormat>,

    /// Extra keyword to flag (can be specified multiple times)
    #[arg(short = 'k', long = "keyword")]
    keywords: Vec<String>,

    /// Extra regular expression to flag (can be specified multiple times)
    #[arg(short = 'r', long = "regex")]
    regexes: Vec<String>,

    /// Extensions never to flag (e.g. png,css)
    #[arg(short = 'x', long = "exclude-ext", value_delimiter = ',')]
    exclude_ext: Vec<String>,

    /// Use only the rules given on the command line
    #[arg(long)]
    only_custom: bool,

    /// Number of worker threads (default: CPU cores)
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Capacity of the internal queues
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Configuration file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Do not print the banner
    #[arg(long)]
    no_banner: bool,

    /// Show a progress bar while reading the input file
    #[arg(long)]
    progress: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            input_path: self.input.clone(),
            output_path: self.output.clone(),
            output_format: self.format,
            stats_path: self.stats.clone(),
            stats_format: self.stats_format,
            thread_count: self.threads,
            queue_capacity: self.queue_capacity,
            log_level: self.log_level.clone(),
            keywords: self.keywords.clone(),
            regex_patterns: self.regexes.clone(),
            excluded_extensions: self.exclude_ext.clone(),
            replace_rules: self.only_custom,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = FilterConfig::load_from(cli.config.as_deref())?.merge_with_cli(cli.overrides());
    init_logging(&config.log_level);

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let to_stdout = is_stdio(&config.output_path);
    if !cli.no_banner && !to_stdout {
        print_banner();
    }

    // Rule errors abort before any file is touched
    let rules = config.rule_set()?;
    debug!("Loaded {} rules", rules.len());

    let (input, progress) = open_input(&config.input_path, cli.progress)?;
    let mut sink = open_sink(&config.output_path, config.output_format())?;

    let outcome = ghostfilter::run(
        input.lines(),
        &rules,
        &config.pipeline_options(),
        &mut sink,
    );
    drop(sink);
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    match outcome {
        Ok(result) => {
            write_report(&config, &result)?;
            print_summary(&config, &result, to_stdout);
            Ok(())
        }
        Err(failure) => {
            let (error, partial) = failure.into_parts();
            eprintln!(
                "{} stopped after {} URLs, {} sensitive, {} written",
                "Warning:".yellow().bold(),
                partial.processed,
                partial.matched,
                partial.written
            );
            if let Some(path) = &config.stats_path {
                match write_report(&config, &partial) {
                    Ok(()) => eprintln!(
                        "Partial rule statistics saved to: {}",
                        path.display().to_string().blue()
                    ),
                    Err(e) => warn!("Could not write partial statistics: {}", e),
                }
            }
            Err(error)
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn print_banner() {
    let skull = r#"
           _________
         /         \
        |  ( )   ( )  |
        |      ^      |
        |     '-'     |
         \___________/
             💀"#;
    println!("{}", skull.bright_red());
    println!(
        "  Developed by ghost_man01 | {} v{}\n",
        "GhostFilter".bold(),
        env!("CARGO_PKG_VERSION")
    );
}

type Input = BufReader<Box<dyn io::Read + Send>>;

fn reader(inner: impl io::Read + Send + 'static) -> Input {
    let inner: Box<dyn io::Read + Send> = Box::new(inner);
    BufReader::new(inner)
}

fn open_input(path: &Path, show_progress: bool) -> Result<(Input, Option<ProgressBar>)> {
    if is_stdio(path) {
        return Ok((reader(io::stdin()), None));
    }
    if !path.exists() {
        return Err(FilterError::file_not_found(path));
    }
    let file = File::open(path).map_err(|e| FilterError::io(Stage::Producer, e))?;

    if !show_progress {
        return Ok((reader(file), None));
    }
    let len = file
        .metadata()
        .map(|m| m.len())
        .map_err(|e| FilterError::io(Stage::Producer, e))?;
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    Ok((reader(bar.wrap_read(file)), Some(bar)))
}

fn open_sink(path: &Path, format: OutputFormat) -> Result<Box<dyn ResultSink>> {
    if is_stdio(path) {
        return Ok(boxed_sink(io::stdout().lock(), format));
    }
    let file = File::create(path).map_err(|e| FilterError::io(Stage::Collector, e))?;
    Ok(boxed_sink(BufWriter::new(file), format))
}

fn boxed_sink<W: Write + 'static>(writer: W, format: OutputFormat) -> Box<dyn ResultSink> {
    match format {
        OutputFormat::Text => Box::new(LineSink::new(writer)),
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
    }
}

fn write_report(config: &FilterConfig, result: &PipelineResult) -> Result<()> {
    let Some(path) = &config.stats_path else {
        return Ok(());
    };
    let file = File::create(path).map_err(|e| FilterError::io(Stage::Report, e))?;
    let writer = BufWriter::new(file);
    match config.stats_format() {
        OutputFormat::Text => write_stats_text(&result.stats, writer),
        OutputFormat::Json => write_stats_json(result, writer),
    }
    .map_err(|e| FilterError::io(Stage::Report, e))
}

fn print_summary(config: &FilterConfig, result: &PipelineResult, to_stdout: bool) {
    let elapsed = Duration::from_millis(result.elapsed.as_millis() as u64);
    let mut lines = vec![format!(
        "{} {} sensitive URLs out of {} in {}",
        "Filtering complete!".green().bold(),
        result.matched,
        result.processed,
        humantime::format_duration(elapsed)
    )];

    if !to_stdout {
        lines.push(format!(
            "Sensitive URLs saved to: {}",
            config.output_path.display().to_string().blue()
        ));
    }

    match &config.stats_path {
        Some(path) => lines.push(format!(
            "Rule statistics saved to: {}",
            path.display().to_string().blue()
        )),
        None if !result.stats.is_empty() => {
            lines.push("Matches per rule:".to_string());
            for (rule, count) in result.stats.ranked() {
                lines.push(format!("  {}: {}", rule.yellow(), count.to_string().green()));
            }
        }
        None => {}
    }

    // Keep stdout clean when it carries the results
    for line in lines {
        if to_stdout {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}
