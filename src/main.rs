//! spindle - inspect the structure of an EPUB

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use spindle::{Document, Section};

#[derive(Parser)]
#[command(name = "spindle")]
#[command(version, about = "Inspect EPUB metadata, manifest and table of contents", long_about = None)]
#[command(after_help = "EXAMPLES:
    spindle book.epub            Show metadata and table of contents
    spindle --json book.epub     Emit the same as JSON
    RUST_LOG=spindle=debug spindle book.epub")]
struct Cli {
    /// Input file (EPUB)
    #[arg(value_name = "INPUT")]
    input: String,

    /// Print a JSON summary instead of text
    #[arg(long)]
    json: bool,

    /// Also list the spine in reading order
    #[arg(long)]
    spine: bool,

    /// Log resolution decisions (skipped entries, chosen TOC source)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    title: &'a str,
    authors: Vec<&'a str>,
    language: Option<&'a str>,
    identifier: Option<&'a str>,
    version: Option<&'a str>,
    cover: Option<&'a str>,
    items: usize,
    toc_source: Option<String>,
    spine: Vec<Entry<'a>>,
    navigation: Vec<Entry<'a>>,
}

#[derive(Serialize)]
struct Entry<'a> {
    reading_order: usize,
    href: &'a str,
    title: Option<&'a str>,
    linear: bool,
    sub_section: bool,
}

impl<'a> From<&'a Section> for Entry<'a> {
    fn from(section: &'a Section) -> Self {
        Self {
            reading_order: section.reading_order,
            href: &section.content.href,
            title: section.title.as_deref(),
            linear: section.linear,
            sub_section: section.sub_section,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> spindle::Result<()> {
    let doc = Document::open(&cli.input)?;

    let summary = Summary {
        title: doc.title()?,
        authors: doc.authors()?,
        language: doc.language()?,
        identifier: doc.identifier()?,
        version: doc.version()?,
        cover: doc.cover()?.map(|item| item.href.as_str()),
        items: doc.items()?.len(),
        toc_source: doc.navigation_source()?.map(|s| s.to_string()),
        spine: doc.sections()?.iter().map(Entry::from).collect(),
        navigation: doc.navigation()?.iter().map(Entry::from).collect(),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?;
        println!("{json}");
        return Ok(());
    }

    println!("File: {}", cli.input);
    println!("Title: {}", summary.title);
    if !summary.authors.is_empty() {
        println!("Authors: {}", summary.authors.join(", "));
    }
    if let Some(language) = summary.language {
        println!("Language: {language}");
    }
    if let Some(identifier) = summary.identifier {
        println!("Identifier: {identifier}");
    }
    if let Some(version) = summary.version {
        println!("EPUB version: {version}");
    }
    if let Some(cover) = summary.cover {
        println!("Cover: {cover}");
    }
    println!("Items: {}", summary.items);
    println!("Spine entries: {}", summary.spine.len());

    if cli.spine {
        println!();
        println!("Spine:");
        for entry in &summary.spine {
            let marker = if entry.linear { "" } else { " (non-linear)" };
            println!("  {:>3}. {}{}", entry.reading_order, entry.href, marker);
        }
    }

    println!();
    match &summary.toc_source {
        Some(source) => println!("Table of contents (from {source}):"),
        None => println!("Table of contents: none"),
    }
    for entry in &summary.navigation {
        let indent = if entry.sub_section { "      " } else { "  " };
        println!(
            "{}{:>3}. {}",
            indent,
            entry.reading_order,
            entry.title.unwrap_or(entry.href)
        );
    }

    Ok(())
}
