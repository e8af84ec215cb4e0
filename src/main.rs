use clap::{Parser, Subcommand};
use folio::{DocumentData, EngineConfig, ExportedPdf, Folio, FolioBuilder, Result};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Paginate, preview and export offers and invoices", long_about = None)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the page plan for a document
    Paginate {
        /// Document JSON file
        document: PathBuf,
    },

    /// Print the layout of one page
    Preview {
        /// Document JSON file
        document: PathBuf,

        /// 1-based page to show
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Also rasterize the page to this PNG file
        #[arg(long, value_name = "FILE")]
        png: Option<PathBuf>,
    },

    /// Export every page to a PDF
    Export {
        /// Document JSON file
        document: PathBuf,

        /// Output path (default: suggested filename in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_path(path)?,
        None => EngineConfig::default(),
    };
    let folio = FolioBuilder::from_config(config).build()?;

    match cli.command {
        Commands::Paginate { document } => cmd_paginate(&folio, &document),
        Commands::Preview {
            document,
            page,
            png,
        } => cmd_preview(&folio, &document, page, png.as_deref()),
        Commands::Export { document, output } => cmd_export(&folio, &document, output),
    }
}

fn load_document(path: &Path) -> Result<DocumentData> {
    let raw = std::fs::read_to_string(path)?;
    DocumentData::from_json_str(&raw)
}

fn cmd_paginate(folio: &Folio, path: &Path) -> Result<()> {
    let data = load_document(path)?;
    let pages = folio.paginate(&data.items);
    println!(
        "{} item(s) on {} page(s) ({} {})",
        data.items.len(),
        pages.len(),
        data.kind.label(),
        data.display_number()
    );
    for page in &pages {
        let span = page.span();
        let mut flags = Vec::new();
        if page.is_first_page() {
            flags.push("first");
        }
        if page.is_last_page() {
            flags.push("last");
        }
        let rows = if span.is_empty() {
            "no rows".to_string()
        } else {
            format!("rows {}-{}", span.start + 1, span.end)
        };
        println!(
            "  page {}: {} ({} item(s)){}",
            page.page_number(),
            rows,
            span.len(),
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
    }
    Ok(())
}

fn cmd_preview(folio: &Folio, path: &Path, page: usize, png: Option<&Path>) -> Result<()> {
    let data = load_document(path)?;
    let mut preview = folio.preview();
    preview.set_document(data)?;
    preview.go_to(page);
    if preview.current_page() != page {
        return Err(folio::FolioError::InvalidDocument(format!(
            "page {page} is out of range 1..={}",
            preview.page_count()
        )));
    }
    if let Some(layout) = preview.current_layout() {
        print!("{layout}");
    }
    if let Some(png) = png {
        std::fs::write(png, preview.render_current_png()?)?;
        println!("Wrote {}", png.display());
    }
    Ok(())
}

fn cmd_export(folio: &Folio, path: &Path, output: Option<PathBuf>) -> Result<()> {
    let data = load_document(path)?;
    let ExportedPdf {
        bytes,
        filename,
        pages,
    } = folio.export_pdf(&data)?;
    let output = output.unwrap_or_else(|| PathBuf::from(&filename));
    std::fs::write(&output, &bytes)?;
    println!(
        "Wrote {} ({} page(s), {} bytes, {})",
        output.display(),
        pages.len(),
        bytes.len(),
        ExportedPdf::MIME_TYPE
    );
    Ok(())
}
