use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};

use docmerge::compose::{compose, fill_single};
use docmerge::config::{find_default_config, init_default_config, load_config, AppConfig};
use docmerge::docx::document::TemplateDocument;
use docmerge::mapping::MappingStore;
use docmerge::matching::auto_map;
use docmerge::progress::ConsoleProgress;
use docmerge::scan::{scan_all, PlaceholderKind, PlaceholderSet};
use docmerge::tabular::DataTable;

#[derive(Parser, Debug)]
#[command(name = "docmerge")]
#[command(about = "DOCX mail merge: placeholder scan, column mapping, multi-row composition", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .docx template(s)
    #[arg(value_name = "DOCX")]
    inputs: Vec<PathBuf>,

    /// Config file path (default: search for docmerge.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List placeholders found in the inputs, then exit
    #[arg(long)]
    scan: bool,

    /// CSV data file (header row + data rows)
    #[arg(short, long, value_name = "CSV")]
    data: Option<PathBuf>,

    /// Auto-map placeholders to data columns, save the mapping, then exit
    #[arg(long)]
    auto_map: bool,

    /// Mapping config to load (JSON)
    #[arg(short, long, value_name = "JSON")]
    mapping: Option<PathBuf>,

    /// Where --auto-map saves the mapping (default: <stem>.mapping.json)
    #[arg(long, value_name = "JSON")]
    mapping_out: Option<PathBuf>,

    /// Output .docx (single input only; default: <stem><suffix>.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Override the configured row limit
    #[arg(long)]
    row_limit: Option<usize>,

    /// Fill each template once from one data row, one output per template
    #[arg(long)]
    fill_each: bool,

    /// Zero-based data row used by --fill-each
    #[arg(long, default_value_t = 0)]
    row: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(true);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if args.inputs.is_empty() {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nUSAGE:\n  docmerge <template.docx> --scan\n  docmerge <template.docx> --data rows.csv --auto-map\n  docmerge <template.docx> --data rows.csv [-m mapping.json] -o merged.docx\n"
        );
        return Ok(());
    }

    let cfg = match args.config.clone() {
        Some(p) => load_config(&p)?,
        None => {
            let workdir = args.inputs[0]
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            match find_default_config(&workdir) {
                Some(p) => load_config(&p)?,
                None => AppConfig::default(),
            }
        }
    };
    let styles = cfg.styles()?;
    let row_limit = args.row_limit.unwrap_or_else(|| cfg.row_limit());

    // Load templates with per-document recovery: one bad file is reported
    // and skipped, the rest of the batch proceeds.
    let mut docs: Vec<TemplateDocument> = Vec::new();
    let mut load_failures = 0usize;
    for path in &args.inputs {
        match TemplateDocument::from_path(path) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                load_failures += 1;
                progress.warn(format!("skipping {}: {e}", path.display()));
            }
        }
    }
    if docs.is_empty() {
        anyhow::bail!("no usable templates among {} input(s)", args.inputs.len());
    }

    let (set, scan_failures) = scan_all(&docs, &styles);
    for f in &scan_failures {
        progress.warn(format!("skipping {}: {}", f.document, f.error));
    }

    if args.scan {
        print_placeholders(&set);
        progress.info(format!(
            "{} document(s) scanned, {} placeholder(s) found, {} skipped",
            docs.len() - scan_failures.len(),
            set.len(),
            load_failures + scan_failures.len()
        ));
        return Ok(());
    }

    let data_path = args
        .data
        .as_ref()
        .context("--data <CSV> is required for mapping and merging")?;
    let table = DataTable::from_csv_path(data_path)?;

    let mut store = match args.mapping.as_ref() {
        Some(p) => {
            let bytes =
                std::fs::read(p).with_context(|| format!("read mapping: {}", p.display()))?;
            MappingStore::from_json(&bytes)
                .with_context(|| format!("parse mapping: {}", p.display()))?
        }
        None => MappingStore::default(),
    };

    if args.auto_map || args.mapping.is_none() {
        let report = auto_map(&set.names(), &table.headers, &mut store);
        progress.info(format!(
            "auto-map: {} of {} placeholder(s) mapped, {} unmatched",
            report.mapped_count(),
            set.len(),
            report.unmatched.len()
        ));
        for m in report.needs_review() {
            progress.warn(format!(
                "low confidence ({:.2}): {} -> {}",
                m.confidence, m.placeholder, m.column
            ));
        }
    }

    if args.auto_map {
        let out = args.mapping_out.clone().unwrap_or_else(|| {
            default_sibling(&args.inputs[0], ".mapping.json")
        });
        std::fs::write(&out, store.to_json()?)
            .with_context(|| format!("write mapping: {}", out.display()))?;
        progress.info(format!("wrote mapping: {}", out.display()));
        return Ok(());
    }

    let unmapped = store.unmapped_placeholders(set.entries());
    if !unmapped.is_empty() {
        progress.warn(format!(
            "{} placeholder(s) left unmapped: {}",
            unmapped.len(),
            unmapped.join(", ")
        ));
    }

    if args.output.is_some() && docs.len() > 1 {
        anyhow::bail!("-o/--output only applies to a single input; got {}", docs.len());
    }

    let suffix = cfg.output_suffix().to_string();
    let mut merged_docs = 0usize;
    let mut merged_rows = 0usize;
    for (doc, path) in docs.iter().zip(paths_for(&docs, &args.inputs)) {
        let out_path = match args.output.clone() {
            Some(p) => p,
            None => default_output(path, &suffix),
        };
        let result = if args.fill_each {
            if args.row >= table.rows.len() {
                anyhow::bail!("--row {} out of range ({} data rows)", args.row, table.rows.len());
            }
            fill_single(doc, &store, &styles, &table.row_map(args.row))
        } else {
            compose(doc, &store, &styles, &table, row_limit)
        };
        match result {
            Ok(bytes) => {
                std::fs::write(&out_path, bytes)
                    .with_context(|| format!("write output: {}", out_path.display()))?;
                merged_docs += 1;
                merged_rows += if args.fill_each {
                    1
                } else {
                    table.rows.len().min(row_limit)
                };
                progress.info(format!("{} -> {}", doc.name, out_path.display()));
            }
            Err(e) => {
                progress.warn(format!("merge failed for {}: {e}", doc.name));
            }
        }
    }

    progress.info(format!(
        "{merged_docs} document(s) merged, {} placeholder(s) mapped, {merged_rows} row(s) rendered",
        store.mapped_count()
    ));
    Ok(())
}

fn print_placeholders(set: &PlaceholderSet) {
    for ph in set.entries() {
        let kind = match ph.kind {
            PlaceholderKind::Bookmark => "bookmark",
            PlaceholderKind::BracketedText => "token",
        };
        let sources: Vec<&str> = ph.sources.iter().map(String::as_str).collect();
        println!("{:<10} {}  ({})", kind, ph.name, sources.join(", "));
    }
}

fn paths_for<'a>(docs: &[TemplateDocument], inputs: &'a [PathBuf]) -> Vec<&'a PathBuf> {
    // Pair surviving documents with their source paths by stem.
    docs.iter()
        .map(|doc| {
            inputs
                .iter()
                .find(|p| {
                    p.file_stem().and_then(|s| s.to_str()) == Some(doc.name.as_str())
                })
                .unwrap_or(&inputs[0])
        })
        .collect()
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}{suffix}.docx"))
}

fn default_sibling(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template");
    input.with_file_name(format!("{stem}{suffix}"))
}
