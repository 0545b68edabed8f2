//! Query command

use clap::{Args, ValueEnum};

use crate::output::emit;
use crate::AppContext;
use cairn_core::{ContextFilter, EntityType, QueryFilter, QueryResult, SortBy};

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Relevance,
    Confidence,
    LastModified,
    Created,
    AccessCount,
    TextScore,
}

impl From<SortArg> for SortBy {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::Relevance => SortBy::Relevance,
            SortArg::Confidence => SortBy::Confidence,
            SortArg::LastModified => SortBy::LastModified,
            SortArg::Created => SortBy::Created,
            SortArg::AccessCount => SortBy::AccessCount,
            SortArg::TextScore => SortBy::TextScore,
        }
    }
}

#[derive(Args)]
pub struct QueryArgs {
    /// Keywords matched against title, description and tags
    pub text: Option<String>,

    /// Entity types to include
    #[arg(short = 't', long = "type")]
    pub types: Vec<EntityType>,

    /// Tags; entities carrying any of them match
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Minimum confidence
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Project phase
    #[arg(long)]
    pub phase: Option<String>,

    /// Business domain
    #[arg(long)]
    pub domain: Option<String>,

    /// Technologies, any of which must match
    #[arg(long)]
    pub stack: Vec<String>,

    /// Stakeholders, any of which must match
    #[arg(long)]
    pub stakeholder: Vec<String>,

    /// Limit results
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Sort key
    #[arg(long, value_enum, default_value = "relevance")]
    pub sort: SortArg,

    /// Also return relationships among the matches
    #[arg(long)]
    pub related: bool,
}

impl QueryArgs {
    fn to_filter(&self) -> QueryFilter {
        let mut filter = match &self.text {
            Some(text) => QueryFilter::text(text.as_str()),
            None => QueryFilter::new(),
        }
        .sorted_by(self.sort.into());

        for entity_type in &self.types {
            filter = filter.with_entity_type(*entity_type);
        }
        for tag in &self.tags {
            filter = filter.with_tag(tag.as_str());
        }
        if let Some(threshold) = self.min_confidence {
            filter = filter.with_confidence_threshold(threshold);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }
        if self.related {
            filter = filter.include_related();
        }

        let context = ContextFilter {
            project_phase: self.phase.clone(),
            business_domain: self.domain.clone(),
            technical_stack: self.stack.clone(),
            stakeholders: self.stakeholder.clone(),
        };
        if context != ContextFilter::default() {
            filter = filter.with_context(context);
        }
        filter
    }
}

pub async fn run(args: &QueryArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let filter = args.to_filter();
    let result = ctx.manager.query_entities(&filter).await?;
    tracing::info!(
        "Query matched {} entities in {:.2}ms",
        result.total_count,
        result.query_time_ms
    );

    emit(&result, ctx.format, render)
}

fn render(result: &QueryResult) -> String {
    if result.entities.is_empty() {
        return "No entities found".to_string();
    }

    let mut lines = vec![format!(
        "{} of {} matching entities",
        result.entities.len(),
        result.total_count
    )];
    for e in &result.entities {
        lines.push(format!(
            "  {} ({}) {}  relevance {:.2}  confidence {:.2}",
            e.id,
            e.entity_type(),
            e.title,
            e.relevance,
            e.confidence
        ));
    }
    if !result.relationships.is_empty() {
        lines.push("Relationships:".to_string());
        for r in &result.relationships {
            lines.push(format!(
                "  {} -[{}]-> {}",
                r.source_id, r.relationship_type, r.target_id
            ));
        }
    }
    let by_type: Vec<String> = result
        .aggregations
        .by_type
        .iter()
        .map(|(t, n)| format!("{}={}", t, n))
        .collect();
    lines.push(format!("By type: {}", by_type.join(", ")));
    lines.join("\n")
}
