mod error;
mod mailer;
mod settings;
mod snippet;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::error;

#[derive(Parser, Debug)]
#[command(
    name = "snipmail",
    about = "Email a markdown section over a direct SMTP/TLS session."
)]
struct Args {
    /// Markdown document to slice.
    markdown: PathBuf,

    /// Exact heading line of the section to send.
    #[arg(long, required_unless_present = "rotate", conflicts_with = "rotate")]
    heading: Option<String>,

    /// Rotate through the "##" sections, resuming from the state file.
    #[arg(long)]
    rotate: bool,

    /// Settings file (YAML).
    #[arg(long, default_value = "settings.yaml")]
    config: PathBuf,

    /// Rotation state file; defaults to ".snipmail_state" next to the document.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Override the configured subject prefix.
    #[arg(long)]
    subject_prefix: Option<String>,

    /// Print subject and body without sending or updating state.
    #[arg(long)]
    dry_run: bool,

    /// Log SMTP protocol traffic.
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = setup_logging(args.verbose) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

// Logs go to stderr; stdout is reserved for the confirmation line.
fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = settings::load_settings(&args.config)?;
    let smtp = &config.smtp;

    let document = snippet::read_document(&args.markdown)?;

    let (section, rotation) = match &args.heading {
        Some(heading) => (snippet::extract_snippet(&document, heading)?, None),
        None => {
            let sections = snippet::load_sections(&document);
            if sections.is_empty() {
                return Err(error::Error::NoSections(args.markdown.clone()).into());
            }
            let state_path = args
                .state_file
                .clone()
                .unwrap_or_else(|| default_state_path(&args.markdown));
            let index = snippet::next_section_index(&state_path, sections.len());
            (sections[index].clone(), Some((state_path, index)))
        }
    };

    let prefix = args.subject_prefix.as_deref().unwrap_or(&smtp.subject_prefix);
    let (subject, body) = compose_message(prefix, &section);

    if args.dry_run {
        println!("Subject: {subject}\n\n{body}");
        return Ok(());
    }

    mailer::smtp::send_email(smtp, &subject, &body)?;

    // Only a delivered message advances the rotation.
    if let Some((state_path, index)) = rotation {
        snippet::save_section_index(&state_path, index)?;
    }

    println!("Email sent successfully.");
    Ok(())
}

// Subject and body laid out the way the original senders compose them:
// "{prefix} - {title}" and the heading repeated above the section text.
fn compose_message(prefix: &str, section: &snippet::Snippet) -> (String, String) {
    let subject = format!("{} - {}", prefix, section.title_suffix);
    let body = format!("{}\n\n{}", section.heading, section.body);
    (subject, body)
}

fn default_state_path(markdown: &Path) -> PathBuf {
    markdown
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(".snipmail_state")
}
