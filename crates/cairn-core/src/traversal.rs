//! Graph traversal types and algorithms

use crate::entity::{EntityId, EntityType, MemoryEntity};
use crate::relationship::{MemoryRelationship, RelationshipType};
use crate::store::GraphState;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

/// Default depth for related-entity expansion
pub const DEFAULT_TRAVERSAL_DEPTH: u32 = 2;

/// Traversal query builder
///
/// Relationships are walked as undirected edges; orphaned ones are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalQuery {
    /// Starting entity
    pub root: EntityId,

    /// Target entity (for path finding, None for expansion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EntityId>,

    /// Maximum number of hops
    #[serde(default = "default_depth")]
    pub max_depth: u32,

    /// Only follow these relationship types (empty = all)
    #[serde(default)]
    pub relationship_types: Vec<RelationshipType>,

    /// Only enter entities of these types (empty = all)
    #[serde(default)]
    pub entity_types: Vec<EntityType>,

    /// Path finding minimises the sum of (1 - strength) instead of hop count
    #[serde(default)]
    pub strongest: bool,
}

fn default_depth() -> u32 {
    DEFAULT_TRAVERSAL_DEPTH
}

impl TraversalQuery {
    pub fn new(root: impl Into<EntityId>) -> Self {
        Self {
            root: root.into(),
            target: None,
            max_depth: default_depth(),
            relationship_types: Vec::new(),
            entity_types: Vec::new(),
            strongest: false,
        }
    }

    /// Set target for path finding
    pub fn find_path_to(mut self, target: impl Into<EntityId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn filter_relationship_types(mut self, types: Vec<RelationshipType>) -> Self {
        self.relationship_types = types;
        self
    }

    pub fn filter_entity_types(mut self, types: Vec<EntityType>) -> Self {
        self.entity_types = types;
        self
    }

    /// Prefer strong relationships over short paths
    pub fn strongest(mut self) -> Self {
        self.strongest = true;
        self
    }

    fn follows(&self, relationship: &MemoryRelationship) -> bool {
        self.relationship_types.is_empty()
            || self
                .relationship_types
                .contains(&relationship.relationship_type)
    }

    fn enters(&self, entity: &MemoryEntity) -> bool {
        self.entity_types.is_empty() || self.entity_types.contains(&entity.entity_type())
    }
}

/// Shortest discovered route from the root to one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPath {
    /// Entity ids from the root to the discovered entity, both included
    pub path: Vec<EntityId>,

    /// Relationships traversed, in order
    pub relationships: Vec<MemoryRelationship>,

    /// Number of hops
    pub depth: u32,
}

/// Result of a related-entity expansion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntities {
    /// Discovered entities in discovery order, root excluded
    pub entities: Vec<MemoryEntity>,

    /// One path per discovered entity, same order as `entities`
    pub relationship_paths: Vec<RelationshipPath>,
}

/// A path between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    /// Ordered entity ids in the path
    pub nodes: Vec<EntityId>,

    /// Relationships connecting the nodes
    pub relationships: Vec<MemoryRelationship>,

    /// Sum of (1 - strength) over the relationships
    pub total_cost: f64,

    /// Path length (number of relationships)
    pub length: usize,
}

/// Traversal statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalStats {
    pub nodes_visited: usize,
    pub edges_traversed: usize,
    pub max_depth_reached: u32,
    pub path_found: bool,
}

/// Result of a path search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub root: EntityId,
    pub target: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<GraphPath>,
    pub stats: TraversalStats,
}

/// State for Dijkstra priority queue
#[derive(Clone, PartialEq)]
struct DijkstraState {
    cost: f64,
    hops: u32,
    node: EntityId,
}

impl Eq for DijkstraState {}

impl Ord for DijkstraState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; ids keep equal costs deterministic
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for DijkstraState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type ParentMap<'a> = HashMap<EntityId, (EntityId, &'a MemoryRelationship)>;

/// Graph traversal engine
pub struct TraversalEngine;

impl TraversalEngine {
    /// Breadth-first expansion from the query root
    ///
    /// Each entity keeps the first shortest path discovered. Incident
    /// relationships are expanded in ascending id order and the frontier is
    /// FIFO, so the result is deterministic.
    pub fn find_related(state: &GraphState, query: &TraversalQuery) -> RelatedEntities {
        let mut result = RelatedEntities::default();
        if query.max_depth == 0 || !state.entities().contains(&query.root) {
            return result;
        }

        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut parent: ParentMap<'_> = HashMap::new();
        let mut queue: VecDeque<(EntityId, u32)> = VecDeque::new();
        let mut discovered: Vec<(EntityId, u32)> = Vec::new();
        let mut stats = TraversalStats::default();

        visited.insert(query.root.clone());
        queue.push_back((query.root.clone(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            stats.nodes_visited += 1;
            stats.max_depth_reached = stats.max_depth_reached.max(depth);

            if depth >= query.max_depth {
                continue;
            }

            for rel in Self::neighbors(state, &current, query) {
                stats.edges_traversed += 1;
                let next = rel.other_end(&current);
                if visited.contains(next) {
                    continue;
                }
                let Some(entity) = state.entities().get(next) else {
                    continue;
                };
                if !query.enters(entity) {
                    continue;
                }

                visited.insert(next.clone());
                parent.insert(next.clone(), (current.clone(), rel));
                discovered.push((next.clone(), depth + 1));
                queue.push_back((next.clone(), depth + 1));
            }
        }

        tracing::debug!(
            "Expanded '{}' to depth {}: {} entities, {} edges traversed",
            query.root,
            stats.max_depth_reached,
            discovered.len(),
            stats.edges_traversed
        );

        for (id, depth) in discovered {
            let Some(entity) = state.entities().get(&id) else {
                continue;
            };
            let (path, relationships) = Self::reconstruct_path(&query.root, &id, &parent);
            result.entities.push(entity.clone());
            result.relationship_paths.push(RelationshipPath {
                path,
                relationships,
                depth,
            });
        }
        result
    }

    /// Shortest path from root to target (hop count, or strength with `strongest`)
    pub fn find_path(state: &GraphState, query: &TraversalQuery) -> Option<PathResult> {
        let target = query.target.clone()?;
        let (path, stats) = if query.strongest {
            Self::dijkstra_path(state, query, &target)
        } else {
            Self::bfs_path(state, query, &target)
        };
        Some(PathResult {
            root: query.root.clone(),
            target,
            path,
            stats,
        })
    }

    /// BFS for unweighted shortest path
    fn bfs_path(
        state: &GraphState,
        query: &TraversalQuery,
        target: &EntityId,
    ) -> (Option<GraphPath>, TraversalStats) {
        let mut stats = TraversalStats::default();
        if !state.entities().contains(&query.root) || !state.entities().contains(target) {
            return (None, stats);
        }

        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut parent: ParentMap<'_> = HashMap::new();
        let mut queue: VecDeque<(EntityId, u32)> = VecDeque::new();

        queue.push_back((query.root.clone(), 0));
        visited.insert(query.root.clone());

        while let Some((current, depth)) = queue.pop_front() {
            stats.nodes_visited += 1;
            stats.max_depth_reached = stats.max_depth_reached.max(depth);

            if &current == target {
                stats.path_found = true;
                tracing::debug!("BFS found path at depth {}", depth);
                break;
            }

            if depth >= query.max_depth {
                continue;
            }

            for rel in Self::neighbors(state, &current, query) {
                stats.edges_traversed += 1;
                let next = rel.other_end(&current);
                if visited.contains(next) {
                    continue;
                }
                if !state.entities().get(next).is_some_and(|e| query.enters(e)) && next != target {
                    continue;
                }
                visited.insert(next.clone());
                parent.insert(next.clone(), (current.clone(), rel));
                queue.push_back((next.clone(), depth + 1));
            }
        }

        let path = stats
            .path_found
            .then(|| Self::build_path(&query.root, target, &parent));
        (path, stats)
    }

    /// Dijkstra's algorithm over edge cost (1 - strength)
    fn dijkstra_path(
        state: &GraphState,
        query: &TraversalQuery,
        target: &EntityId,
    ) -> (Option<GraphPath>, TraversalStats) {
        let mut stats = TraversalStats::default();
        if !state.entities().contains(&query.root) || !state.entities().contains(target) {
            return (None, stats);
        }

        let mut dist: HashMap<EntityId, f64> = HashMap::new();
        let mut parent: ParentMap<'_> = HashMap::new();
        let mut heap = BinaryHeap::new();

        dist.insert(query.root.clone(), 0.0);
        heap.push(DijkstraState {
            cost: 0.0,
            hops: 0,
            node: query.root.clone(),
        });

        while let Some(DijkstraState { cost, hops, node }) = heap.pop() {
            stats.nodes_visited += 1;
            stats.max_depth_reached = stats.max_depth_reached.max(hops);

            if &node == target {
                stats.path_found = true;
                tracing::debug!("Dijkstra found path with cost {:.3}", cost);
                break;
            }

            // Skip if we already found a better path
            if cost > *dist.get(&node).unwrap_or(&f64::INFINITY) || hops >= query.max_depth {
                continue;
            }

            for rel in Self::neighbors(state, &node, query) {
                stats.edges_traversed += 1;
                let next = rel.other_end(&node);
                if !state.entities().get(next).is_some_and(|e| query.enters(e)) && next != target {
                    continue;
                }

                let new_cost = cost + (1.0 - rel.strength);
                if new_cost < *dist.get(next).unwrap_or(&f64::INFINITY) {
                    dist.insert(next.clone(), new_cost);
                    parent.insert(next.clone(), (node.clone(), rel));
                    heap.push(DijkstraState {
                        cost: new_cost,
                        hops: hops + 1,
                        node: next.clone(),
                    });
                }
            }
        }

        let path = stats
            .path_found
            .then(|| Self::build_path(&query.root, target, &parent));
        (path, stats)
    }

    /// Active, type-filtered relationships touching a node, in id order
    fn neighbors<'a>(
        state: &'a GraphState,
        node: &EntityId,
        query: &TraversalQuery,
    ) -> Vec<&'a MemoryRelationship> {
        state
            .relationships()
            .active_for(node)
            .into_iter()
            .filter(|rel| query.follows(rel))
            .collect()
    }

    /// Walk the parent map back from `end` to `start`
    fn reconstruct_path(
        start: &EntityId,
        end: &EntityId,
        parent: &ParentMap<'_>,
    ) -> (Vec<EntityId>, Vec<MemoryRelationship>) {
        let mut nodes = vec![end.clone()];
        let mut relationships = Vec::new();
        let mut current = end.clone();

        while &current != start {
            if let Some((prev, rel)) = parent.get(&current) {
                relationships.push((*rel).clone());
                nodes.push(prev.clone());
                current = prev.clone();
            } else {
                break;
            }
        }

        nodes.reverse();
        relationships.reverse();
        (nodes, relationships)
    }

    fn build_path(start: &EntityId, end: &EntityId, parent: &ParentMap<'_>) -> GraphPath {
        let (nodes, relationships) = Self::reconstruct_path(start, end, parent);
        let total_cost = relationships.iter().map(|r| 1.0 - r.strength).sum();
        GraphPath {
            length: relationships.len(),
            nodes,
            relationships,
            total_cost,
        }
    }
}
