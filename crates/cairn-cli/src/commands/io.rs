//! Import/Export commands

use std::io::{Read, Write};
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use anyhow::Context;
use clap::Args;

use crate::output::emit;
use crate::AppContext;
use cairn_core::Graph;

#[derive(Args)]
pub struct ImportArgs {
    /// Graph JSON file, or `-` for stdin
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run_import(args: &ImportArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let content = if args.file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.file)
            .with_context(|| format!("reading {}", args.file.display()))?
    };

    let graph: Graph = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", args.file.display()))?;
    tracing::debug!(
        "Importing {} entities and {} relationships",
        graph.entities.len(),
        graph.relationships.len()
    );

    let report = ctx.manager.import_graph(graph).await?;
    emit(&report, ctx.format, |r| {
        format!(
            "Imported {} entities ({} new, {} updated) and {} relationships ({} new, {} updated)",
            r.entities_created + r.entities_updated,
            r.entities_created,
            r.entities_updated,
            r.relationships_created + r.relationships_updated,
            r.relationships_created,
            r.relationships_updated
        )
    })
}

pub async fn run_export(args: &ExportArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let graph = ctx.manager.export_graph().await?;
    let content = serde_json::to_string_pretty(&graph)?;

    if let Some(ref path) = args.output {
        // Owner read/write only
        #[cfg(unix)]
        {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            file.write_all(content.as_bytes())?;
        }
        #[cfg(not(unix))]
        {
            std::fs::write(path, &content)?;
        }
        tracing::info!(
            "Exported {} entities and {} relationships to {:?}",
            graph.entities.len(),
            graph.relationships.len(),
            path
        );
        println!("Exported to {:?}", path);
    } else {
        println!("{}", content);
    }

    Ok(())
}
