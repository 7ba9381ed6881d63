//! Command-line front end for the pdfsearch extraction pipeline.
//!
//! Drives the same request protocol a file-manager host uses, so every field,
//! the chunked text stream and the comparison can be tried from a shell.

use clap::{Parser, Subcommand};
use pdfsearch::{
    CompareVerdict, ContentPlugin, ExtractError, Field, FieldResult, LopdfBackend, PluginOptions, Result,
    COMPARE_BASE_INDEX,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Read metadata, text and comparisons from PDF documents.
#[derive(Debug, Parser)]
#[command(name = "pdfsearch", about, version)]
struct Cli {
    /// Options file (TOML, `[pdfsearch]` table)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List every field with its index, type and units
    Fields,

    /// Print one field of a document
    Get {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Field name (e.g. "Title", "Number Of Pages") or index
        field: String,

        /// Unit index for page sizes: 0 mm, 1 cm, 2 in, 3 pt
        #[arg(long, default_value_t = 0)]
        unit: i32,
    },

    /// Print the full text of a document, chunk by chunk
    Text {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Chunk size in UTF-16 units
        #[arg(long, default_value_t = 1024)]
        chunk: usize,
    },

    /// Compare one field of two documents
    Compare {
        first: PathBuf,
        second: PathBuf,

        /// Field name or index
        field: String,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdfsearch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let options = match &cli.config {
        Some(path) => PluginOptions::load(path)?,
        None => PluginOptions::default(),
    };
    let mut plugin = ContentPlugin::new(Arc::new(LopdfBackend), options);

    let outcome = match cli.command {
        Commands::Fields => {
            list_fields(&plugin);
            Ok(())
        }
        Commands::Get { file, field, unit } => get_field(&mut plugin, &file, &field, unit),
        Commands::Text { file, chunk } => print_text(&mut plugin, &file, chunk),
        Commands::Compare { first, second, field } => compare(&mut plugin, &first, &second, &field),
    };
    plugin.unloading();
    outcome
}

fn parse_field(name: &str) -> Result<Field> {
    match name.parse::<usize>() {
        Ok(index) => Field::from_index(index).ok_or(ExtractError::UnsupportedField(index)),
        Err(_) => Field::from_name(name).ok_or_else(|| ExtractError::UnknownField(name.to_string())),
    }
}

fn list_fields(plugin: &ContentPlugin) {
    println!("Detect string: {}", plugin.detect_string());
    println!("{:>5}  {:<30} {:>4} {:>5}  UNITS", "INDEX", "NAME", "TYPE", "FLAGS");
    let mut index = 0;
    while let Some(info) = plugin.supported_field(index) {
        let flags = plugin.supported_field_flags(index as i64);
        println!("{index:>5}  {:<30} {:>4} {flags:>5}  {}", info.name, info.type_code, info.units);
        index += 1;
    }
}

fn get_field(plugin: &mut ContentPlugin, file: &Path, name: &str, unit: i32) -> Result<()> {
    let field = parse_field(name)?;
    if field.is_streaming() {
        return print_stream(plugin, file, field, 1024);
    }
    let mut buf = vec![0u16; pdfsearch::REQUEST_BUFFER_UNITS + 1];
    let result = plugin.get_value(file, field.index(), unit, &mut buf, 0);
    match result {
        FieldResult::String(len) => println!("{}", String::from_utf16_lossy(&buf[..len])),
        FieldResult::Int32(v) => println!("{v}"),
        FieldResult::Double(v) => println!("{v}"),
        FieldResult::Boolean(v) => println!("{v}"),
        FieldResult::DateTime(v) => println!("{}", v.to_rfc3339()),
        FieldResult::FieldEmpty => println!("(empty)"),
        FieldResult::FileError => {
            return Err(ExtractError::InvalidPdf(format!("cannot read {}", file.display())));
        }
        other => println!("{other:?}"),
    }
    Ok(())
}

fn print_text(plugin: &mut ContentPlugin, file: &Path, chunk: usize) -> Result<()> {
    print_stream(plugin, file, Field::Text, chunk)
}

/// Poll a streaming field until it reports no more data.
fn print_stream(plugin: &mut ContentPlugin, file: &Path, field: Field, chunk: usize) -> Result<()> {
    // one extra unit for the terminator
    let mut buf = vec![0u16; chunk.max(1) + 1];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut unit = 0;
    loop {
        match plugin.get_value(file, field.index(), unit, &mut buf, 0) {
            FieldResult::FullText(len) => {
                out.write_all(String::from_utf16_lossy(&buf[..len]).as_bytes())?;
            }
            FieldResult::FieldEmpty => break,
            FieldResult::FileError => {
                return Err(ExtractError::InvalidPdf(format!("cannot read {}", file.display())));
            }
            other => {
                return Err(ExtractError::StreamInterrupted(format!("{other:?}")));
            }
        }
        unit += 1;
    }
    writeln!(out)?;
    Ok(())
}

fn compare(plugin: &mut ContentPlugin, first: &Path, second: &Path, name: &str) -> Result<()> {
    let field = parse_field(name)?;
    let mut total = 0usize;
    let verdict = plugin.compare_files(
        |bytes| {
            total += bytes;
            tracing::debug!(total, "compared so far");
            false
        },
        COMPARE_BASE_INDEX + field.index(),
        first,
        second,
    );
    let text = match verdict {
        CompareVerdict::Equal => "✅ equal",
        CompareVerdict::EqualAsText => "✅ equal as text",
        CompareVerdict::NotEqual => "❌ not equal",
        CompareVerdict::Error => "⚠️  cannot read one of the documents",
        CompareVerdict::Aborted => "⚠️  comparison aborted",
        CompareVerdict::Unsupported => "⚠️  field cannot be compared",
    };
    println!("{} ({})", text, field.name());
    Ok(())
}
