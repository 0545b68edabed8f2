//! Relationship commands

use clap::{Args, Subcommand};

use crate::output::emit;
use crate::AppContext;
use cairn_core::{EntityId, MemoryRelationship, RelationshipId, RelationshipType};

#[derive(Args)]
pub struct RelationArgs {
    #[command(subcommand)]
    pub command: RelationCommands,
}

#[derive(Subcommand)]
pub enum RelationCommands {
    /// Create or update a relationship
    Add {
        /// Source entity id
        from: String,
        /// Target entity id
        to: String,
        /// Relationship type (e.g. depends_on, implements)
        #[arg(short = 't', long)]
        r#type: RelationshipType,
        /// Strength in [0, 1]
        #[arg(long, default_value = "0.5")]
        strength: f64,
        /// Confidence in [0, 1]
        #[arg(long, default_value = "0.5")]
        confidence: f64,
        /// Relationship id; generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Free-form context
        #[arg(long)]
        context: Option<String>,
        /// Supporting evidence
        #[arg(long)]
        evidence: Vec<String>,
    },
    /// List relationships
    List {
        /// Only relationships touching this entity
        #[arg(long)]
        entity: Option<String>,
        /// Include relationships whose endpoint was deleted
        #[arg(long)]
        include_orphaned: bool,
    },
    /// Delete a relationship
    Delete {
        /// Relationship id
        id: String,
    },
}

pub async fn run(args: &RelationArgs, ctx: &AppContext) -> anyhow::Result<()> {
    match &args.command {
        RelationCommands::Add {
            from,
            to,
            r#type,
            strength,
            confidence,
            id,
            context,
            evidence,
        } => {
            let mut relationship =
                MemoryRelationship::new(from.as_str(), to.as_str(), *r#type)
                    .with_strength(*strength)
                    .with_confidence(*confidence);
            if let Some(id) = id {
                relationship = relationship.with_id(id.as_str());
            }
            if let Some(context) = context {
                relationship = relationship.with_context(context.as_str());
            }
            for item in evidence {
                relationship = relationship.with_evidence(item.as_str());
            }

            let stored = ctx.manager.upsert_relationship(relationship).await?;
            tracing::info!("Stored relationship {}", stored.id);
            emit(&stored, ctx.format, |r| {
                format!("Stored relationship {} (version {})", describe(r), r.version)
            })?;
        }
        RelationCommands::List {
            entity,
            include_orphaned,
        } => {
            let relationships = match entity {
                Some(id) => {
                    let all = ctx
                        .manager
                        .relationships_for(&EntityId::from(id.as_str()))
                        .await?;
                    all.into_iter()
                        .filter(|r| *include_orphaned || !r.orphaned)
                        .collect()
                }
                None => ctx.manager.list_relationships(*include_orphaned).await?,
            };

            emit(&relationships, ctx.format, |rels| {
                if rels.is_empty() {
                    return "No relationships found".to_string();
                }
                rels.iter().map(describe).collect::<Vec<_>>().join("\n")
            })?;
        }
        RelationCommands::Delete { id } => {
            let deleted = ctx
                .manager
                .delete_relationship(&RelationshipId::from(id.as_str()))
                .await?;
            emit(&serde_json::json!({ "id": id, "deleted": deleted }), ctx.format, |_| {
                if deleted {
                    format!("Deleted relationship: {}", id)
                } else {
                    format!("Relationship '{}' not found", id)
                }
            })?;
        }
    }

    Ok(())
}

fn describe(r: &MemoryRelationship) -> String {
    let orphaned = if r.orphaned { " [orphaned]" } else { "" };
    format!(
        "{}: {} -[{} {:.2}]-> {}{}",
        r.id, r.source_id, r.relationship_type, r.strength, r.target_id, orphaned
    )
}
