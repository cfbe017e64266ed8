//! fOS Elem - Command Line Entry Point

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fos_elem::{Bootstrap, Content, Directory, Elem, FsTransport, Node, Resolved};
use fos_js::QuickJsHost;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let host = QuickJsHost::new().context("failed to start the script runtime")?;
    let elem = Bootstrap::new(host, FsTransport::new(cli.root.clone()))
        .start(cli.config())
        .with_context(|| format!("failed to start in {}", cli.root.display()))?;

    elem.load_blocking(&Node::Dir(elem.root().clone()));

    match &cli.command {
        Commands::Tree => print_tree(elem.root(), 0),
        Commands::Tags => print_tags(&elem),
        Commands::Resolve {
            reference,
            ext,
            from,
        } => resolve(&elem, reference, ext, from)?,
    }

    Ok(())
}

fn print_tree(dir: &Rc<Directory>, depth: usize) {
    let indent = "  ".repeat(depth);

    for (name, node) in dir.entries() {
        match node {
            Node::Dir(sub) => {
                println!("{}{}/", indent, name);
                print_tree(&sub, depth + 1);
            }
            Node::Res(res) => {
                let global = if res.is_global() { " (global)" } else { "" };
                println!("{}{}{}", indent, name, global);
            }
        }
    }
}

fn print_tags(elem: &Elem<QuickJsHost>) {
    let mut tags: Vec<_> = elem.tags().into_iter().collect();
    tags.sort_by(|a, b| a.0.cmp(&b.0));

    for (tag, dir) in tags {
        println!("{:<24} {}", tag, dir.path());
    }
}

fn resolve(elem: &Elem<QuickJsHost>, reference: &str, ext: &str, from: &str) -> Result<()> {
    let resolved = elem.block_on(elem.require_async(reference, Some(ext), Some(from)))?;

    let Some(resolved) = resolved else {
        bail!("no resource matches {} ({}) from {}", reference, ext, from);
    };

    match resolved {
        Resolved::Content(Content::Text(text)) => println!("{}", text),
        Resolved::Content(Content::Json(value)) => println!("{}", serde_json::to_string_pretty(&*value)?),
        Resolved::Content(Content::Empty) => tracing::warn!("{} has no content", reference),
        Resolved::Content(Content::Malformed(message)) => bail!("malformed JSON: {}", message),
        Resolved::Exports(exports) => {
            let json = elem.host().to_json(&exports)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Resolved::Executed => tracing::info!("Ran global script {}", reference),
    }

    Ok(())
}
