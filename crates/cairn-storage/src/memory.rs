//! In-memory storage backend for testing

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use cairn_core::{Graph, GraphPersistence, PersistenceError};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory storage backend
///
/// Holds the last saved graph. Useful for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStorage {
    graph: RwLock<Option<Graph>>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing graph, as if it had been saved before
    pub fn with_graph(graph: Graph) -> Self {
        Self {
            graph: RwLock::new(Some(graph)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn load(&self) -> StorageResult<Option<Graph>> {
        let graph = self
            .graph
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        Ok(graph.clone())
    }

    fn store(&self, graph: &Graph) -> StorageResult<()> {
        let mut stored = self
            .graph
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        *stored = Some(graph.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl GraphPersistence for MemoryStorage {
    async fn load_graph(&self) -> Result<Option<Graph>, PersistenceError> {
        Ok(self.load()?)
    }

    async fn save_graph(&self, graph: &Graph) -> Result<(), PersistenceError> {
        self.store(graph)?;
        tracing::debug!(
            "Stored {} entities and {} relationships in memory",
            graph.entities.len(),
            graph.relationships.len()
        );
        Ok(())
    }
}
