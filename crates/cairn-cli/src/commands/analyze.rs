//! Traversal, intelligence and maintenance commands

use clap::Args;

use crate::output::{emit, join_or};
use crate::AppContext;
use cairn_core::{
    EntityId, EntityType, GraphStats, MemoryIntelligence, PathResult, RelatedEntities,
    RelationshipType, TraversalQuery,
};

#[derive(Args)]
pub struct RelatedArgs {
    /// Root entity id
    pub root: String,

    /// Maximum number of hops
    #[arg(long)]
    pub depth: Option<u32>,

    /// Only follow these relationship types
    #[arg(long = "relationship-type")]
    pub relationship_types: Vec<RelationshipType>,

    /// Only return entities of these types
    #[arg(long = "entity-type")]
    pub entity_types: Vec<EntityType>,
}

#[derive(Args)]
pub struct PathArgs {
    /// Start entity id
    pub from: String,

    /// End entity id
    pub to: String,

    /// Prefer strong relationships over fewer hops
    #[arg(long)]
    pub strongest: bool,
}

pub async fn run_related(args: &RelatedArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let related = if args.relationship_types.is_empty() && args.entity_types.is_empty() {
        ctx.manager
            .find_related_entities(&EntityId::from(args.root.as_str()), args.depth)
            .await?
    } else {
        let mut query = TraversalQuery::new(args.root.as_str())
            .filter_relationship_types(args.relationship_types.clone())
            .filter_entity_types(args.entity_types.clone());
        if let Some(depth) = args.depth {
            query = query.with_depth(depth);
        }
        ctx.manager.traverse(&query).await?
    };

    tracing::info!("Found {} related entities", related.entities.len());
    emit(&related, ctx.format, |r| render_related(&args.root, r))
}

fn render_related(root: &str, related: &RelatedEntities) -> String {
    if related.entities.is_empty() {
        return format!("No entities related to '{}'", root);
    }
    related
        .relationship_paths
        .iter()
        .map(|p| {
            let hops: Vec<String> = p.path.iter().map(|id| id.to_string()).collect();
            format!("[{}] {}", p.depth, hops.join(" -> "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run_path(args: &PathArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let result = ctx
        .manager
        .find_path(
            &EntityId::from(args.from.as_str()),
            &EntityId::from(args.to.as_str()),
            args.strongest,
        )
        .await?;

    emit(&result, ctx.format, render_path)
}

fn render_path(result: &PathResult) -> String {
    match &result.path {
        Some(path) => {
            let nodes: Vec<String> = path.nodes.iter().map(|id| id.to_string()).collect();
            format!(
                "{}\n{} hops, cost {:.2}, {} nodes visited",
                nodes.join(" -> "),
                path.length,
                path.total_cost,
                result.stats.nodes_visited
            )
        }
        None => format!(
            "No path from '{}' to '{}' ({} nodes visited)",
            result.root, result.target, result.stats.nodes_visited
        ),
    }
}

pub async fn run_analyze(ctx: &AppContext) -> anyhow::Result<()> {
    let intelligence = ctx.manager.analyze().await?;
    emit(&intelligence, ctx.format, render_intelligence)
}

fn render_intelligence(intel: &MemoryIntelligence) -> String {
    let awareness = &intel.context_awareness;
    let mut lines = vec![
        format!(
            "Phase: {}  Domain: {}",
            awareness.current_phase.as_deref().unwrap_or("-"),
            awareness.business_domain.as_deref().unwrap_or("-")
        ),
        format!("Stack: {}", join_or(&awareness.technical_stack, "-")),
        format!(
            "Average confidence {:.2}, relevance {:.2}",
            awareness.average_confidence, awareness.average_relevance
        ),
    ];

    let patterns = &intel.pattern_recognition.discovered_patterns;
    lines.push(format!("Patterns ({}):", patterns.len()));
    for p in patterns {
        lines.push(format!(
            "  {} x{} confidence {:.2}",
            p.signature, p.frequency, p.confidence
        ));
    }

    let inference = &intel.relationship_inference;
    lines.push(format!(
        "Suggested relationships ({}):",
        inference.suggested_relationships.len()
    ));
    for s in &inference.suggested_relationships {
        lines.push(format!(
            "  {} -[{}]-> {}: {}",
            s.source_id, s.relationship_type, s.target_id, s.reasoning
        ));
    }
    if !inference.conflicts.is_empty() {
        lines.push(format!("Conflicts ({}):", inference.conflicts.len()));
        for c in &inference.conflicts {
            let ids: Vec<String> = c.entity_ids.iter().map(|id| id.to_string()).collect();
            lines.push(format!("  {:?}: {}", c.reason, ids.join(", ")));
        }
    }

    let recommendations = &intel.adaptive_recommendations;
    lines.push(format!(
        "Next actions ({}):",
        recommendations.next_actions.len()
    ));
    for r in &recommendations.next_actions {
        lines.push(format!("  [{:?}] {:?}: {}", r.priority, r.action, r.reasoning));
    }
    lines.push(format!(
        "Knowledge gaps: {}  Optimization opportunities: {}",
        recommendations.knowledge_gaps.len(),
        recommendations.optimization_opportunities.len()
    ));
    lines.join("\n")
}

pub async fn run_snapshot(ctx: &AppContext) -> anyhow::Result<()> {
    let snapshot = ctx.manager.create_snapshot().await?;
    tracing::info!("Captured snapshot {}", snapshot.id());

    emit(&*snapshot, ctx.format, |s| {
        let meta = s.metadata();
        format!(
            "Snapshot {} at version {}\n{} entities, {} relationships, average confidence {:.2}",
            s.id(),
            s.version(),
            meta.total_entities,
            meta.total_relationships,
            meta.average_confidence
        )
    })
}

pub async fn run_optimize(ctx: &AppContext) -> anyhow::Result<()> {
    let report = ctx.manager.optimize().await?;
    emit(&report, ctx.format, |r| {
        format!(
            "Decayed {} entities, purged {} orphaned relationships",
            r.decayed_entities.len(),
            r.purged_relationships.len()
        )
    })
}

pub async fn run_stats(ctx: &AppContext) -> anyhow::Result<()> {
    let stats = ctx.manager.stats().await?;
    emit(&stats, ctx.format, render_stats)
}

fn render_stats(stats: &GraphStats) -> String {
    let last = stats
        .last_optimization
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "Entities: {}\nRelationships: {} ({} orphaned)\nAverage confidence: {:.2}\nRevision: {}\nLast optimization: {}",
        stats.total_entities,
        stats.total_relationships,
        stats.orphaned_relationships,
        stats.average_confidence,
        stats.revision,
        last
    )
}
