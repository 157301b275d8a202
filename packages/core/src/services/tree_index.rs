//! Tree Index Store - Nested-set Mutations and Queries
//!
//! `TreeIndexStore` maintains the `(left, right)` encoding of one tree table
//! and answers hierarchy queries with single range scans.
//!
//! # Transactions
//!
//! Every operation runs in exactly one storage transaction. Mutations take a
//! write transaction and re-read the ranges they depend on inside it, so the
//! table is the only source of truth; nothing about the tree is cached
//! between calls. Any error rolls the transaction back before it is
//! returned.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::db::MemoryTreeStore;
//! use nestedset_core::models::TreeSchema;
//! use nestedset_core::services::TreeIndexStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), nestedset_core::services::TreeIndexError> {
//! let index = TreeIndexStore::new(Arc::new(MemoryTreeStore::new()), TreeSchema::default()).await?;
//!
//! let mut root = index.create_root(json!({ "name": "Catalog" })).await?;
//! let books = index.insert_child(&mut root, json!({ "name": "Books" })).await?;
//! assert_eq!((books.left, books.right), (2, 3));
//! assert_eq!(root.right, 4);
//! # Ok(())
//! # }
//! ```

use crate::config::TreeIndexConfig;
use crate::db::{
    DatabaseService, LibsqlTreeStore, NewRow, RangePlanError, RangePlanner, RangeScan,
    StoredRow, TransactionMode, TreeStore, TreeTransaction,
};
use crate::models::{Children, NodeId, NodeRecord, TreeSchema, ROOT_LEFT};
use crate::services::integrity::{self, IntegrityReport};
use crate::services::{TreeAssembler, TreeIndexError};
use serde_json::Value;
use std::sync::Arc;

/// Nested-set engine over one tree table
#[derive(Clone)]
pub struct TreeIndexStore {
    store: Arc<dyn TreeStore>,
    schema: TreeSchema,
    verify_mutations: bool,
}

impl TreeIndexStore {
    /// Create an engine for `schema`, creating the table if needed
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the schema names are not valid identifiers, or a
    /// storage error if the table cannot be prepared.
    pub async fn new(store: Arc<dyn TreeStore>, schema: TreeSchema) -> Result<Self, TreeIndexError> {
        schema
            .validate()
            .map_err(|e| TreeIndexError::invalid_config(e.to_string()))?;
        store.prepare_schema(&schema).await?;

        tracing::debug!("Tree index ready on table '{}'", schema.table);

        Ok(Self {
            store,
            schema,
            verify_mutations: false,
        })
    }

    /// Run the integrity checker inside every mutation before it commits
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_mutations = enabled;
        self
    }

    /// Open a libsql-backed engine from configuration
    pub async fn open(config: &TreeIndexConfig) -> Result<Self, TreeIndexError> {
        config.validate().map_err(TreeIndexError::invalid_config)?;

        let db = DatabaseService::with_busy_timeout(
            config.database_path.clone(),
            config.busy_timeout_ms,
        )
        .await?;
        let store = LibsqlTreeStore::new(Arc::new(db));

        Ok(Self::new(Arc::new(store), config.schema.clone())
            .await?
            .with_verification(config.verify_mutations))
    }

    pub fn schema(&self) -> &TreeSchema {
        &self.schema
    }

    pub fn verifies_mutations(&self) -> bool {
        self.verify_mutations
    }

    /// Insert the root row `(1, 2)` into an empty table
    ///
    /// Fails with `RangeConflict` when the table already holds rows.
    #[tracing::instrument(skip(self, properties))]
    pub async fn create_root(&self, properties: Value) -> Result<NodeRecord, TreeIndexError> {
        let mut tx = self.store.begin(TransactionMode::Write).await?;
        let result = self.create_root_in(tx.as_mut(), properties).await;
        let root = finish(tx, result).await?;

        tracing::info!("Created root of '{}'", self.schema.table);
        Ok(root)
    }

    async fn create_root_in(
        &self,
        tx: &mut dyn TreeTransaction,
        properties: Value,
    ) -> Result<NodeRecord, TreeIndexError> {
        let existing = tx.scan_ordered(&self.schema, &RangeScan::All).await?;
        if !existing.is_empty() {
            return Err(TreeIndexError::range_conflict(format!(
                "table '{}' already holds {} rows",
                self.schema.table,
                existing.len()
            )));
        }

        let root = NodeRecord::root(properties);
        tx.insert_row(
            &self.schema,
            &NewRow {
                id: Some(NodeId::ROOT),
                parent_id: None,
                left: root.left,
                right: root.right,
                properties: root.properties.clone(),
            },
        )
        .await?;
        Ok(root)
    }

    /// Load the root row, optionally with its whole subtree
    pub async fn root_node(&self, load_children: bool) -> Result<NodeRecord, TreeIndexError> {
        self.get_node(NodeId::ROOT, load_children).await
    }

    /// Load one node by id
    ///
    /// With `load_children` the full subtree is linked beneath it from the
    /// same snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn get_node(
        &self,
        id: NodeId,
        load_children: bool,
    ) -> Result<NodeRecord, TreeIndexError> {
        let mut tx = self.store.begin(TransactionMode::Read).await?;
        let result = async {
            let row = fetch_existing(tx.as_mut(), &self.schema, id).await?;
            if load_children {
                self.subtree_in(tx.as_mut(), row).await
            } else {
                Ok::<_, TreeIndexError>(NodeRecord::from_stored(row))
            }
        }
        .await;
        finish(tx, result).await
    }

    /// Insert a new last child under `parent`
    ///
    /// The parent range is re-read inside the write transaction. After the
    /// commit `parent` carries its new range, and the child is appended to
    /// `parent.children` if that list was already loaded.
    ///
    /// # Errors
    ///
    /// - `DetachedParent` if `parent` was never persisted
    /// - `NotFound` if the parent row no longer exists
    /// - `RangeConflict` if the shifted table disagrees with the plan
    #[tracing::instrument(skip(self, parent, properties), fields(parent_id = ?parent.id))]
    pub async fn insert_child(
        &self,
        parent: &mut NodeRecord,
        properties: Value,
    ) -> Result<NodeRecord, TreeIndexError> {
        let parent_id = parent.id.ok_or_else(|| {
            TreeIndexError::detached_parent("cannot insert under a node that was never persisted")
        })?;

        let mut tx = self.store.begin(TransactionMode::Write).await?;
        let result = self.insert_in(tx.as_mut(), parent_id, properties).await;
        let (child, parent_row) = finish(tx, result).await?;

        parent.left = parent_row.left;
        parent.right = parent_row.right;
        parent.children.push(child.clone());

        tracing::info!(
            "Inserted node {} at ({}, {}) under {}",
            child.id.map(NodeId::value).unwrap_or_default(),
            child.left,
            child.right,
            parent_id
        );
        Ok(child)
    }

    async fn insert_in(
        &self,
        tx: &mut dyn TreeTransaction,
        parent_id: NodeId,
        properties: Value,
    ) -> Result<(NodeRecord, StoredRow), TreeIndexError> {
        let parent = fetch_existing(tx, &self.schema, parent_id).await?;
        let plan = RangePlanner::plan_insert(parent.left, parent.right)
            .map_err(|e| plan_error(parent_id, e))?;
        tracing::debug!("Insert plan under {}: {:?}", parent_id, plan);

        for shift in &plan.shifts {
            tx.execute_range_update(&self.schema, shift).await?;
        }

        let occupied = tx
            .count_at_positions(&self.schema, &[plan.left, plan.right])
            .await?;
        if occupied != 0 {
            return Err(TreeIndexError::range_conflict(format!(
                "{} rows already use ({}, {}) after shifting",
                occupied, plan.left, plan.right
            )));
        }

        let parent = fetch_existing(tx, &self.schema, parent_id).await?;
        if parent.right != plan.parent_right_after {
            return Err(TreeIndexError::range_conflict(format!(
                "parent {} has right {} after shifting, expected {}",
                parent_id, parent.right, plan.parent_right_after
            )));
        }

        let id = tx
            .insert_row(
                &self.schema,
                &NewRow {
                    id: None,
                    parent_id: Some(parent_id),
                    left: plan.left,
                    right: plan.right,
                    properties: properties.clone(),
                },
            )
            .await?;

        if self.verify_mutations {
            self.verify_in(tx).await?;
        }

        let child = NodeRecord {
            id: Some(id),
            parent_id: Some(parent_id),
            left: plan.left,
            right: plan.right,
            properties,
            children: Children::Empty,
        };
        Ok((child, parent))
    }

    /// Delete `node` and all of its descendants
    ///
    /// The caller's range is only used to reject detached nodes; the range
    /// actually deleted is re-read inside the transaction.
    pub async fn delete_subtree(&self, node: &NodeRecord) -> Result<u64, TreeIndexError> {
        let id = node.id.filter(|_| node.has_range()).ok_or_else(|| {
            TreeIndexError::detached_parent("cannot delete a node without a loaded range")
        })?;
        self.delete_by_id(id).await
    }

    /// Delete the subtree rooted at `id`, returning the number of rows removed
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_id(&self, id: NodeId) -> Result<u64, TreeIndexError> {
        let mut tx = self.store.begin(TransactionMode::Write).await?;
        let result = self.delete_in(tx.as_mut(), id).await;
        let removed = finish(tx, result).await?;

        tracing::info!("Deleted subtree {} ({} rows)", id, removed);
        Ok(removed)
    }

    async fn delete_in(&self, tx: &mut dyn TreeTransaction, id: NodeId) -> Result<u64, TreeIndexError> {
        let row = fetch_existing(tx, &self.schema, id).await?;
        if row.parent_id.is_none() || row.left <= ROOT_LEFT {
            return Err(TreeIndexError::root_deletion(id));
        }

        let plan = RangePlanner::plan_delete(row.left, row.right).map_err(|e| plan_error(id, e))?;
        tracing::debug!("Delete plan for {}: {:?}", id, plan);

        let removed = tx.delete_rows(&self.schema, plan.lower, plan.upper).await?;
        if removed != plan.expected_rows {
            return Err(TreeIndexError::range_conflict(format!(
                "range ({}, {}) held {} rows, expected {}",
                plan.lower, plan.upper, removed, plan.expected_rows
            )));
        }

        for shift in &plan.shifts {
            tx.execute_range_update(&self.schema, shift).await?;
        }

        if self.verify_mutations {
            self.verify_in(tx).await?;
        }
        Ok(removed)
    }

    /// Load the children (or every descendant) of `node`
    ///
    /// Direct children are returned with leaf rows marked loaded-empty. With
    /// `include_descendants` the whole subtree comes back as a flat list in
    /// preorder, each entry carrying its own loaded descendants, and
    /// `node.children` receives the linked hierarchy. Either
    /// way `node.children` ends up loaded and `node` carries its current
    /// range.
    #[tracing::instrument(skip(self, node), fields(node_id = ?node.id))]
    pub async fn load_children(
        &self,
        node: &mut NodeRecord,
        include_descendants: bool,
    ) -> Result<Vec<NodeRecord>, TreeIndexError> {
        let id = require_range(node, "load children")?;

        let mut tx = self.store.begin(TransactionMode::Read).await?;
        let result = async {
            let current = fetch_existing(tx.as_mut(), &self.schema, id).await?;
            let rows = tx
                .scan_ordered(
                    &self.schema,
                    &RangeScan::Within {
                        left: current.left,
                        right: current.right,
                        inclusive: false,
                    },
                )
                .await?;
            Ok::<_, TreeIndexError>((current, rows))
        }
        .await;
        let (current, rows) = finish(tx, result).await?;
        tracing::debug!("Scanned {} rows under {}", rows.len(), id);

        node.left = current.left;
        node.right = current.right;

        let records: Vec<NodeRecord> = rows.into_iter().map(NodeRecord::from_stored_shallow).collect();
        if include_descendants {
            let anchor = NodeRecord::from_stored(current);
            let linked = TreeAssembler::assemble(anchor, records)?;
            let flat = linked.preorder().into_iter().cloned().collect();
            node.children = linked.children;
            Ok(flat)
        } else {
            let children = TreeAssembler::direct_children(id, records);
            node.children = Children::from_vec(children.clone());
            Ok(children)
        }
    }

    /// Direct children of `node`, fetched only if not already loaded
    pub async fn child_nodes<'a>(
        &self,
        node: &'a mut NodeRecord,
    ) -> Result<&'a [NodeRecord], TreeIndexError> {
        if !node.children.is_loaded() {
            self.load_children(node, false).await?;
        }
        Ok(node.children.as_slice())
    }

    /// Ancestors of `node`, root first and immediate parent last
    #[tracing::instrument(skip(self, node), fields(node_id = ?node.id))]
    pub async fn load_path(&self, node: &NodeRecord) -> Result<Vec<NodeRecord>, TreeIndexError> {
        let id = node
            .id
            .ok_or_else(|| TreeIndexError::detached_parent("cannot load the path of a detached node"))?;

        let mut tx = self.store.begin(TransactionMode::Read).await?;
        let result = async {
            let current = fetch_existing(tx.as_mut(), &self.schema, id).await?;
            let rows = tx
                .scan_ordered(
                    &self.schema,
                    &RangeScan::Enclosing {
                        left: current.left,
                        right: current.right,
                    },
                )
                .await?;
            Ok::<_, TreeIndexError>(rows)
        }
        .await;
        let rows = finish(tx, result).await?;

        Ok(rows.into_iter().map(NodeRecord::from_stored).collect())
    }

    /// `node` with its full subtree linked beneath it
    #[tracing::instrument(skip(self, node), fields(node_id = ?node.id))]
    pub async fn load_subtree(&self, node: &NodeRecord) -> Result<NodeRecord, TreeIndexError> {
        let id = node
            .id
            .ok_or_else(|| TreeIndexError::detached_parent("cannot load the subtree of a detached node"))?;

        let mut tx = self.store.begin(TransactionMode::Read).await?;
        let result = async {
            let row = fetch_existing(tx.as_mut(), &self.schema, id).await?;
            self.subtree_in(tx.as_mut(), row).await
        }
        .await;
        finish(tx, result).await
    }

    async fn subtree_in(
        &self,
        tx: &mut dyn TreeTransaction,
        row: StoredRow,
    ) -> Result<NodeRecord, TreeIndexError> {
        let mut rows = tx
            .scan_ordered(
                &self.schema,
                &RangeScan::Within {
                    left: row.left,
                    right: row.right,
                    inclusive: true,
                },
            )
            .await?
            .into_iter();

        match rows.next() {
            Some(first) if first.id == row.id => {}
            other => {
                return Err(TreeIndexError::range_conflict(format!(
                    "subtree scan of {} started at {:?}",
                    row.id,
                    other.map(|r| r.id.value())
                )));
            }
        }

        let descendants = rows.map(NodeRecord::from_stored_shallow).collect();
        TreeAssembler::assemble(NodeRecord::from_stored(row), descendants)
    }

    /// Check the whole table against the nested-set invariants
    #[tracing::instrument(skip(self))]
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, TreeIndexError> {
        let mut tx = self.store.begin(TransactionMode::Read).await?;
        let result = self.verify_in(tx.as_mut()).await;
        let report = finish(tx, result).await?;

        tracing::debug!("Integrity check passed: {:?}", report);
        Ok(report)
    }

    async fn verify_in(&self, tx: &mut dyn TreeTransaction) -> Result<IntegrityReport, TreeIndexError> {
        let rows = tx.scan_ordered(&self.schema, &RangeScan::All).await?;
        integrity::check_rows(&rows)
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(
    tx: Box<dyn TreeTransaction>,
    result: Result<T, TreeIndexError>,
) -> Result<T, TreeIndexError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback failed after '{}': {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

async fn fetch_existing(
    tx: &mut dyn TreeTransaction,
    schema: &TreeSchema,
    id: NodeId,
) -> Result<StoredRow, TreeIndexError> {
    tx.fetch_row(schema, id)
        .await?
        .ok_or_else(|| TreeIndexError::not_found(id))
}

fn require_range(node: &NodeRecord, operation: &str) -> Result<NodeId, TreeIndexError> {
    match node.id {
        Some(id) if node.has_range() => Ok(id),
        _ => Err(TreeIndexError::detached_parent(format!(
            "cannot {} of a node without a loaded range",
            operation
        ))),
    }
}

fn plan_error(id: NodeId, err: RangePlanError) -> TreeIndexError {
    match err {
        RangePlanError::RootDeletion { .. } => TreeIndexError::root_deletion(id),
        RangePlanError::InvalidRange { .. } => {
            TreeIndexError::range_conflict(format!("node {}: {}", id, err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryTreeStore;
    use serde_json::json;

    async fn memory_index() -> (TreeIndexStore, Arc<MemoryTreeStore>) {
        let store = Arc::new(MemoryTreeStore::new());
        let index = TreeIndexStore::new(store.clone(), TreeSchema::new("catalog"))
            .await
            .unwrap();
        (index, store)
    }

    fn range(node: &NodeRecord) -> (i64, i64) {
        (node.left, node.right)
    }

    #[tokio::test]
    async fn test_insert_and_delete_scenario() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({"name": "root"})).await.unwrap();

        let mut a = index.insert_child(&mut root, json!({"name": "A"})).await.unwrap();
        assert_eq!(range(&a), (2, 3));
        assert_eq!(range(&root), (1, 4));

        let b = index.insert_child(&mut root, json!({"name": "B"})).await.unwrap();
        assert_eq!(range(&b), (4, 5));
        assert_eq!(range(&root), (1, 6));

        let c = index.insert_child(&mut a, json!({"name": "C"})).await.unwrap();
        assert_eq!(range(&c), (3, 4));
        assert_eq!(range(&a), (2, 5));

        let b_now = index.get_node(b.id.unwrap(), false).await.unwrap();
        assert_eq!(range(&b_now), (6, 7));
        assert_eq!(range(&index.root_node(false).await.unwrap()), (1, 8));

        assert_eq!(index.delete_subtree(&a).await.unwrap(), 2);

        let b_now = index.get_node(b.id.unwrap(), false).await.unwrap();
        assert_eq!(range(&b_now), (2, 3));
        assert_eq!(range(&index.root_node(false).await.unwrap()), (1, 4));
        assert!(matches!(
            index.get_node(c.id.unwrap(), false).await,
            Err(TreeIndexError::NotFound { .. })
        ));
        index.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_root_rejects_populated_table() {
        let (index, _) = memory_index().await;
        index.create_root(json!({})).await.unwrap();
        assert!(matches!(
            index.create_root(json!({})).await,
            Err(TreeIndexError::RangeConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_insert_under_detached_parent() {
        let (index, _) = memory_index().await;
        let root = index.create_root(json!({})).await.unwrap();
        let mut transient = NodeRecord::new_child(&root, json!({}));

        assert!(matches!(
            index.insert_child(&mut transient, json!({})).await,
            Err(TreeIndexError::DetachedParent { .. })
        ));
    }

    #[tokio::test]
    async fn test_insert_under_missing_parent_leaves_table_unchanged() {
        let (index, _) = memory_index().await;
        index.create_root(json!({})).await.unwrap();

        let mut ghost = NodeRecord {
            id: Some(NodeId(99)),
            parent_id: Some(NodeId::ROOT),
            left: 2,
            right: 3,
            properties: json!({}),
            children: Children::Empty,
        };
        assert!(matches!(
            index.insert_child(&mut ghost, json!({})).await,
            Err(TreeIndexError::NotFound { .. })
        ));
        assert_eq!(range(&ghost), (2, 3));
        assert_eq!(index.verify_integrity().await.unwrap().rows, 1);
    }

    #[tokio::test]
    async fn test_root_cannot_be_deleted() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({})).await.unwrap();
        index.insert_child(&mut root, json!({})).await.unwrap();

        assert!(matches!(
            index.delete_subtree(&root).await,
            Err(TreeIndexError::RootDeletion { .. })
        ));
        assert_eq!(index.verify_integrity().await.unwrap().rows, 2);
    }

    #[tokio::test]
    async fn test_delete_uses_fresh_range() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({})).await.unwrap();
        let stale_a = index.insert_child(&mut root, json!({"name": "A"})).await.unwrap();

        // A grows after the caller's copy was taken
        let mut a = stale_a.clone();
        index.insert_child(&mut a, json!({"name": "A1"})).await.unwrap();
        index.insert_child(&mut a, json!({"name": "A2"})).await.unwrap();

        assert_eq!(index.delete_subtree(&stale_a).await.unwrap(), 3);
        let report = index.verify_integrity().await.unwrap();
        assert_eq!(report.rows, 1);
    }

    #[tokio::test]
    async fn test_child_nodes_loads_lazily() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({})).await.unwrap();
        let mut a = index.insert_child(&mut root, json!({"name": "A"})).await.unwrap();
        index.insert_child(&mut a, json!({"name": "A1"})).await.unwrap();
        index.insert_child(&mut root, json!({"name": "B"})).await.unwrap();

        let mut fresh_root = index.root_node(false).await.unwrap();
        assert_eq!(fresh_root.children, Children::Unloaded);

        let children = index.child_nodes(&mut fresh_root).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].children, Children::Unloaded);
        assert_eq!(children[1].children, Children::Empty);
    }

    #[tokio::test]
    async fn test_parent_children_follow_inserts_only_when_loaded() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({})).await.unwrap();
        let mut a = index.insert_child(&mut root, json!({})).await.unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(a.children, Children::Empty);

        let mut unloaded = index.get_node(a.id.unwrap(), false).await.unwrap();
        index.insert_child(&mut unloaded, json!({})).await.unwrap();
        assert_eq!(unloaded.children, Children::Unloaded);
        assert_eq!(range(&unloaded), (2, 5));

        index.insert_child(&mut a, json!({})).await.unwrap();
        assert_eq!(a.children.len(), 1);
        assert_eq!(range(&a), (2, 7));
    }

    #[tokio::test]
    async fn test_load_children_with_descendants_links_tree() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({})).await.unwrap();
        let mut a = index.insert_child(&mut root, json!({"name": "A"})).await.unwrap();
        index.insert_child(&mut a, json!({"name": "A1"})).await.unwrap();
        index.insert_child(&mut root, json!({"name": "B"})).await.unwrap();

        let mut fresh_root = index.root_node(false).await.unwrap();
        let flat = index.load_children(&mut fresh_root, true).await.unwrap();

        let lefts: Vec<i64> = flat.iter().map(|n| n.left).collect();
        assert_eq!(lefts, vec![2, 3, 6]);
        assert!(flat.iter().all(|n| n.children.is_loaded()));
        assert_eq!(flat[0].children.len(), 1);
        assert_eq!(flat[0].children.as_slice()[0].left, 3);
        assert_eq!(flat[1].children, Children::Empty);
        assert_eq!(fresh_root.children.len(), 2);
        assert_eq!(fresh_root.children.as_slice()[0].children.len(), 1);
        assert_eq!(fresh_root.preorder().len(), 3);
    }

    #[tokio::test]
    async fn test_load_path_orders_root_first() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({})).await.unwrap();
        let mut a = index.insert_child(&mut root, json!({})).await.unwrap();
        let mut b = index.insert_child(&mut a, json!({})).await.unwrap();
        let c = index.insert_child(&mut b, json!({})).await.unwrap();

        let path = index.load_path(&c).await.unwrap();
        let ids: Vec<Option<NodeId>> = path.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![root.id, a.id, b.id]);
        assert!(index.load_path(&root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_subtree_exports_nested_json() {
        let (index, _) = memory_index().await;
        let mut root = index.create_root(json!({"name": "root"})).await.unwrap();
        let mut a = index.insert_child(&mut root, json!({"name": "A"})).await.unwrap();
        index.insert_child(&mut a, json!({"name": "A1"})).await.unwrap();

        let tree = index.load_subtree(&root).await.unwrap();
        let exported = tree.to_json();
        assert_eq!(exported["right"], json!(6));
        assert_eq!(exported["children"][0]["properties"]["name"], json!("A"));
        assert_eq!(
            exported["children"][0]["children"][0]["properties"]["name"],
            json!("A1")
        );
    }

    #[tokio::test]
    async fn test_verified_mutation_rolls_back_on_corruption() {
        let (index, store) = memory_index().await;
        let mut root = index.create_root(json!({})).await.unwrap();
        let index = index.with_verification(true);

        let mut tx = store.begin(TransactionMode::Write).await.unwrap();
        tx.insert_row(
            index.schema(),
            &NewRow {
                id: None,
                parent_id: Some(NodeId::ROOT),
                left: 100,
                right: 101,
                properties: json!({}),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(
            index.insert_child(&mut root, json!({})).await,
            Err(TreeIndexError::RangeConflict { .. })
        ));
        assert_eq!(range(&root), (1, 2));

        let mut tx = store.begin(TransactionMode::Read).await.unwrap();
        let rows = tx.scan_ordered(index.schema(), &RangeScan::All).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].right, 2);
    }

    #[tokio::test]
    async fn test_invalid_schema_is_rejected() {
        let store = Arc::new(MemoryTreeStore::new());
        let result = TreeIndexStore::new(store, TreeSchema::new("bad table")).await;
        assert!(matches!(result, Err(TreeIndexError::InvalidConfig(_))));
    }
}
