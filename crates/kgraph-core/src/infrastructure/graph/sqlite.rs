//! SQLite implementation of the GraphRepository
//!
//! Idempotence comes from the schema: a partial unique index on entity
//! labels and a unique (source_id, target_id, relationship_type) key on
//! edges. Both upserts use `ON CONFLICT DO NOTHING`, so concurrent writers
//! never produce duplicates.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::graph::{
    Edge, EdgeMetadata, EdgeWrite, GraphRepository, GraphStats, Node, NodeProperties, NodeType,
    RelationshipType,
};
use crate::error::{Error, Result};

/// Bound parameters per `IN (...)` lookup
const URL_LOOKUP_CHUNK: usize = 500;

const NODE_COLUMNS: &str = "id, type, label, content, properties, created_at";
const EDGE_COLUMNS: &str = "id, source_id, target_id, relationship_type, metadata, created_at";

#[derive(Clone)]
pub struct SqliteGraphRepository {
    pool: SqlitePool,
}

impl SqliteGraphRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_nodes(&self, sql: &str, limit: Option<usize>) -> Result<Vec<Node>> {
        let mut query = sqlx::query_as::<_, NodeRow>(sql);
        if let Some(limit) = limit {
            query = query.bind(limit as i64);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(NodeRow::into_node)
            .collect()
    }
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    // ========== Node Operations ==========

    async fn insert_node(&self, node: &Node) -> Result<()> {
        let properties = node.properties.to_json()?;

        sqlx::query(
            r#"
            INSERT INTO nodes (id, type, label, content, properties, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(node.node_type.as_str())
        .bind(&node.label)
        .bind(&node.content)
        .bind(&properties)
        .bind(node.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(node_id = %node.id, node_type = %node.node_type, "Node inserted");
        Ok(())
    }

    async fn upsert_entity(&self, label: &str) -> Result<Option<String>> {
        let result = sqlx::query(
            r#"
            INSERT INTO nodes (id, type, label, content, properties, created_at)
            VALUES (?, 'entity', ?, '', '{}', ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(label)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(label, "Entity created");
        }

        let id: Option<(String,)> =
            sqlx::query_as("SELECT id FROM nodes WHERE type = 'entity' AND label = ?")
                .bind(label)
                .fetch_optional(&self.pool)
                .await?;

        Ok(id.map(|(id,)| id))
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let row: Option<NodeRow> =
            sqlx::query_as(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(NodeRow::into_node).transpose()
    }

    async fn get_node_label(&self, id: &str) -> Result<Option<String>> {
        let label: Option<(String,)> = sqlx::query_as("SELECT label FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(label.map(|(l,)| l))
    }

    async fn find_entity(&self, label: &str) -> Result<Option<Node>> {
        let row: Option<NodeRow> = sqlx::query_as(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE type = 'entity' AND label = ?"
        ))
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NodeRow::into_node).transpose()
    }

    async fn list_nodes_by_type(&self, node_type: NodeType, limit: usize) -> Result<Vec<Node>> {
        let rows: Vec<NodeRow> = sqlx::query_as(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE type = ? ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(node_type.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NodeRow::into_node).collect()
    }

    async fn count_nodes(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ========== Duplicate Lookups ==========

    async fn find_content_by_original_url(&self, url: &str) -> Result<Option<String>> {
        let id: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM nodes
            WHERE type = 'content' AND json_extract(properties, '$.original_url') = ?
            LIMIT 1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(|(id,)| id))
    }

    async fn find_content_by_hash(&self, hash: &str) -> Result<Option<String>> {
        let id: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM nodes
            WHERE type = 'content' AND json_extract(properties, '$.hash') = ?
            LIMIT 1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(|(id,)| id))
    }

    async fn existing_original_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();

        for chunk in urls.chunks(URL_LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT DISTINCT json_extract(properties, '$.original_url') FROM nodes \
                 WHERE type = 'content' AND json_extract(properties, '$.original_url') IN (",
            );
            let mut separated = builder.separated(", ");
            for url in chunk {
                separated.push_bind(url);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows.into_iter().map(|(url,)| url));
        }

        Ok(found)
    }

    // ========== Edge Operations ==========

    async fn upsert_edge(&self, edge: &Edge) -> Result<EdgeWrite> {
        let metadata = edge
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO edges (id, source_id, target_id, relationship_type, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id, relationship_type) DO NOTHING
            "#,
        )
        .bind(&edge.id)
        .bind(&edge.source_id)
        .bind(&edge.target_id)
        .bind(edge.relationship_type.as_str())
        .bind(&metadata)
        .bind(edge.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            EdgeWrite::Inserted
        } else {
            EdgeWrite::AlreadyPresent
        })
    }

    async fn list_edges_for_node(&self, node_id: &str) -> Result<Vec<Edge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE source_id = ? OR target_id = ? ORDER BY created_at"
        ))
        .bind(node_id)
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EdgeRow::into_edge).collect())
    }

    async fn count_edges(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM edges")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ========== Graph Queries ==========

    async fn orphan_nodes(&self, limit: usize) -> Result<Vec<Node>> {
        self.fetch_nodes(
            &format!(
                r#"
                SELECT {NODE_COLUMNS} FROM nodes n
                WHERE NOT EXISTS (
                    SELECT 1 FROM edges e WHERE e.source_id = n.id OR e.target_id = n.id
                )
                ORDER BY created_at DESC
                LIMIT ?
                "#
            ),
            Some(limit),
        )
        .await
    }

    async fn hub_nodes(&self) -> Result<Vec<Node>> {
        self.fetch_nodes(
            &format!(
                "SELECT {NODE_COLUMNS} FROM nodes WHERE type IN ('topic', 'briefing') ORDER BY label"
            ),
            None,
        )
        .await
    }

    async fn stats(&self) -> Result<GraphStats> {
        let nodes_by_type: Vec<(String, i64)> =
            sqlx::query_as("SELECT type, COUNT(*) FROM nodes GROUP BY type")
                .fetch_all(&self.pool)
                .await?;

        let edges_by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship_type, COUNT(*) FROM edges GROUP BY relationship_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let nodes_by_type: BTreeMap<String, u64> = nodes_by_type
            .into_iter()
            .map(|(t, c)| (t, c as u64))
            .collect();
        let edges_by_type: BTreeMap<String, u64> = edges_by_type
            .into_iter()
            .map(|(t, c)| (t, c as u64))
            .collect();

        Ok(GraphStats {
            total_nodes: nodes_by_type.values().sum(),
            total_edges: edges_by_type.values().sum(),
            nodes_by_type,
            edges_by_type,
        })
    }
}

// ========== Database Row Types ==========

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    #[sqlx(rename = "type")]
    node_type: String,
    label: String,
    content: String,
    properties: Option<String>,
    created_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<Node> {
        let node_type = NodeType::parse(&self.node_type)
            .ok_or_else(|| Error::InvalidNodeType(self.node_type.clone()))?;

        let properties = self
            .properties
            .as_deref()
            .map(NodeProperties::from_json)
            .unwrap_or_default();

        Ok(Node {
            id: self.id,
            node_type,
            label: self.label,
            content: self.content,
            properties,
            created_at: parse_time(&self.created_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct EdgeRow {
    id: String,
    source_id: String,
    target_id: String,
    relationship_type: String,
    metadata: Option<String>,
    created_at: String,
}

impl EdgeRow {
    fn into_edge(self) -> Edge {
        let metadata = self
            .metadata
            .as_deref()
            .and_then(|m| serde_json::from_str::<EdgeMetadata>(m).ok());

        Edge {
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type: RelationshipType::parse(&self.relationship_type),
            metadata,
            created_at: parse_time(&self.created_at),
        }
    }
}
