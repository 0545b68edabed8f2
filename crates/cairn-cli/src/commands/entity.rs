//! Entity commands

use clap::{Args, Subcommand, ValueEnum};

use crate::output::{emit, join_or};
use crate::AppContext;
use cairn_core::{
    DecisionStatus, EntityId, EntityKind, EntityType, MemoryEntity, QueryFilter,
};

#[derive(Args)]
pub struct EntityArgs {
    #[command(subcommand)]
    pub command: EntityCommands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Proposed,
    Accepted,
    Deprecated,
    Superseded,
    Rejected,
}

impl From<StatusArg> for DecisionStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Proposed => DecisionStatus::Proposed,
            StatusArg::Accepted => DecisionStatus::Accepted,
            StatusArg::Deprecated => DecisionStatus::Deprecated,
            StatusArg::Superseded => DecisionStatus::Superseded,
            StatusArg::Rejected => DecisionStatus::Rejected,
        }
    }
}

#[derive(Subcommand)]
pub enum EntityCommands {
    /// Create an entity, or update the fields given on an existing one
    Add {
        /// Entity id
        id: String,
        /// Entity type (e.g. architectural_decision, code_component)
        #[arg(short = 't', long)]
        r#type: EntityType,
        /// Title (required for new entities)
        #[arg(long)]
        title: Option<String>,
        /// Description
        #[arg(long)]
        description: Option<String>,
        /// Tags for the entity
        #[arg(long)]
        tag: Vec<String>,
        /// Confidence in [0, 1]
        #[arg(long)]
        confidence: Option<f64>,
        /// Relevance in [0, 1]
        #[arg(long)]
        relevance: Option<f64>,
        /// Project phase
        #[arg(long)]
        phase: Option<String>,
        /// Business domain
        #[arg(long)]
        domain: Option<String>,
        /// Technologies involved
        #[arg(long)]
        stack: Vec<String>,
        /// Stakeholders involved
        #[arg(long)]
        stakeholder: Vec<String>,
        /// Decision status (architectural decisions only)
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Question the decision answers (architectural decisions only)
        #[arg(long)]
        concern: Option<String>,
        /// Chosen option (architectural decisions only)
        #[arg(long)]
        outcome: Option<String>,
    },
    /// Show an entity
    Get {
        /// Entity id
        id: String,
    },
    /// List entities
    List {
        /// Filter by type
        #[arg(short = 't', long)]
        r#type: Option<EntityType>,
        /// Filter by tag
        #[arg(long)]
        tag: Option<String>,
        /// Limit results
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Delete an entity; its relationships become orphaned
    Delete {
        /// Entity id
        id: String,
        /// Force deletion without confirmation
        #[arg(long)]
        force: bool,
    },
    /// Record an access to an entity
    Touch {
        /// Entity id
        id: String,
        /// What the entity was accessed for
        #[arg(long)]
        context: Option<String>,
    },
    /// Show the change history of an entity
    History {
        /// Entity id
        id: String,
    },
}

pub async fn run(args: &EntityArgs, ctx: &AppContext) -> anyhow::Result<()> {
    match &args.command {
        EntityCommands::Add {
            id,
            r#type,
            title,
            description,
            tag,
            confidence,
            relevance,
            phase,
            domain,
            stack,
            stakeholder,
            status,
            concern,
            outcome,
        } => {
            let entity_id = EntityId::from(id.as_str());
            let existing = ctx.manager.get_entity(&entity_id).await?;
            if let Some(current) = &existing {
                if current.entity_type() != *r#type {
                    anyhow::bail!(
                        "'{}' is already a {}; delete it before storing it as a {}",
                        id,
                        current.entity_type(),
                        r#type
                    );
                }
            }

            let mut entity = match (existing, title) {
                (Some(mut entity), title) => {
                    if let Some(title) = title {
                        entity.title = title.clone();
                    }
                    entity
                }
                (None, Some(title)) => {
                    MemoryEntity::new(entity_id, EntityKind::empty(*r#type), title.as_str())
                }
                (None, None) => anyhow::bail!("--title is required when creating '{}'", id),
            };

            if let Some(description) = description {
                entity.description = description.clone();
            }
            entity.tags.extend(tag.iter().cloned());
            if let Some(confidence) = confidence {
                entity.confidence = *confidence;
            }
            if let Some(relevance) = relevance {
                entity.relevance = *relevance;
            }
            if phase.is_some() {
                entity.context.project_phase = phase.clone();
            }
            if domain.is_some() {
                entity.context.business_domain = domain.clone();
            }
            entity.context.technical_stack.extend(stack.iter().cloned());
            entity.context.stakeholders.extend(stakeholder.iter().cloned());

            let decision_fields = status.is_some() || concern.is_some() || outcome.is_some();
            match &mut entity.kind {
                EntityKind::ArchitecturalDecision(data) => {
                    if let Some(status) = status {
                        data.status = (*status).into();
                    }
                    if concern.is_some() {
                        data.concern = concern.clone();
                    }
                    if outcome.is_some() {
                        data.outcome = outcome.clone();
                    }
                }
                _ if decision_fields => {
                    anyhow::bail!("--status, --concern and --outcome only apply to decisions")
                }
                _ => {}
            }

            let stored = ctx.manager.upsert_entity(entity).await?;
            tracing::info!("Stored entity {} at version {}", stored.id, stored.version);
            emit(&stored, ctx.format, |e| {
                format!("Stored {} (version {})\n{}", e.id, e.version, describe(e))
            })?;
        }
        EntityCommands::Get { id } => {
            let entity = ctx.manager.get_entity(&EntityId::from(id.as_str())).await?;
            emit(&entity, ctx.format, |e| match e {
                Some(entity) => describe(entity),
                None => format!("Entity '{}' not found", id),
            })?;
        }
        EntityCommands::List { r#type, tag, limit } => {
            let mut filter = QueryFilter::new().with_limit(*limit);
            if let Some(entity_type) = r#type {
                filter = filter.with_entity_type(*entity_type);
            }
            if let Some(tag) = tag {
                filter = filter.with_tag(tag.as_str());
            }
            let result = ctx.manager.query_entities(&filter).await?;
            tracing::info!("Found {} entities", result.total_count);

            emit(&result.entities, ctx.format, |entities| {
                if entities.is_empty() {
                    return "No entities found".to_string();
                }
                entities
                    .iter()
                    .map(|e| {
                        let tags: Vec<String> = e.tags.iter().cloned().collect();
                        format!("{} ({}) {} [{}]", e.id, e.entity_type(), e.title, tags.join(", "))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        EntityCommands::Delete { id, force } => {
            let entity_id = EntityId::from(id.as_str());
            if !force {
                if ctx.manager.get_entity(&entity_id).await?.is_none() {
                    println!("Entity '{}' not found", id);
                } else {
                    println!("Use --force to confirm deletion of entity '{}'", id);
                }
                return Ok(());
            }

            let deleted = ctx.manager.delete_entity(&entity_id).await?;
            emit(&serde_json::json!({ "id": id, "deleted": deleted }), ctx.format, |_| {
                if deleted {
                    format!("Deleted entity: {}", id)
                } else {
                    format!("Entity '{}' not found", id)
                }
            })?;
        }
        EntityCommands::Touch { id, context } => {
            let entity = ctx
                .manager
                .record_access(&EntityId::from(id.as_str()), context.as_deref())
                .await?;
            emit(&entity, ctx.format, |e| match e {
                Some(entity) => format!(
                    "Accessed {} ({} times)",
                    entity.id, entity.access_pattern.access_count
                ),
                None => format!("Entity '{}' not found", id),
            })?;
        }
        EntityCommands::History { id } => {
            let history = ctx
                .manager
                .entity_history(&EntityId::from(id.as_str()))
                .await?;
            emit(&history, ctx.format, |h| match h {
                Some(history) => history
                    .iter()
                    .map(|t| {
                        format!(
                            "v{} {} {:?}: {}",
                            t.version,
                            t.timestamp.to_rfc3339(),
                            t.kind,
                            t.description
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
                None => format!("Entity '{}' not found", id),
            })?;
        }
    }

    Ok(())
}

fn describe(entity: &MemoryEntity) -> String {
    let tags: Vec<String> = entity.tags.iter().cloned().collect();
    let mut lines = vec![
        format!("Entity: {}", entity.id),
        format!("  Type: {}", entity.entity_type()),
        format!("  Title: {}", entity.title),
        format!("  Version: {}", entity.version),
        format!(
            "  Confidence: {:.2}  Relevance: {:.2}",
            entity.confidence, entity.relevance
        ),
        format!("  Tags: {}", join_or(&tags, "(none)")),
        format!("  Modified: {}", entity.last_modified.to_rfc3339()),
    ];
    if let Some(decision) = entity.kind.as_decision() {
        lines.push(format!("  Status: {:?}", decision.status));
        if let Some(outcome) = &decision.outcome {
            lines.push(format!("  Outcome: {}", outcome));
        }
    }
    if !entity.description.is_empty() {
        lines.push(format!("  {}", entity.description));
    }
    lines.join("\n")
}
