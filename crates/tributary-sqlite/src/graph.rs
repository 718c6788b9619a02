use crate::connection::{self, sql_err, SharedConnection};
use rusqlite::{params, Connection, OptionalExtension};
use tributary_core::{
    error::{Result, TributaryError},
    Direction, EndpointPolicy, GraphStore, Label, NodeRef, Properties, RelType, StoreConfig,
};

/// SQLite-backed property graph
///
/// Nodes are keyed by `(label, id)` with a JSON property bag; relationships
/// are keyed by `(rel, from, to)`, so a merge never produces a duplicate.
pub struct SqliteGraphStore {
    conn: SharedConnection,
}

impl SqliteGraphStore {
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        Self::with_connection(connection::open(cfg)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(connection::open_in_memory()?)
    }

    pub fn with_connection(conn: SharedConnection) -> Result<Self> {
        conn.lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS nodes (
                    label TEXT NOT NULL,
                    id INTEGER NOT NULL,
                    properties TEXT NOT NULL DEFAULT '{}',
                    PRIMARY KEY (label, id)
                );
                CREATE TABLE IF NOT EXISTS edges (
                    rel TEXT NOT NULL,
                    from_label TEXT NOT NULL,
                    from_id INTEGER NOT NULL,
                    to_label TEXT NOT NULL,
                    to_id INTEGER NOT NULL,
                    PRIMARY KEY (rel, from_label, from_id, to_label, to_id)
                );
                CREATE INDEX IF NOT EXISTS idx_edges_to
                    ON edges(to_label, to_id);
                CREATE INDEX IF NOT EXISTS idx_edges_from
                    ON edges(from_label, from_id);",
            )
            .map_err(sql_err)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &SharedConnection {
        &self.conn
    }

    /// All nodes with one label, ordered by id
    pub fn nodes(&self, label: Label) -> Result<Vec<(i64, Properties)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, properties FROM nodes WHERE label = ?1 ORDER BY id")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([label.as_str()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        rows.into_iter()
            .map(|(id, props)| Ok((id, parse_props(&props)?)))
            .collect()
    }
}

fn parse_props(raw: &str) -> Result<Properties> {
    Ok(serde_json::from_str(raw)?)
}

fn exists(conn: &Connection, node: NodeRef) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM nodes WHERE label = ?1 AND id = ?2)",
        params![node.label.as_str(), node.id],
        |row| row.get(0),
    )
    .map_err(sql_err)
}

fn parse_node(label: &str, id: i64) -> Result<NodeRef> {
    let label = Label::parse(label)
        .ok_or_else(|| TributaryError::InvalidState(format!("unknown node label {label}")))?;
    Ok(NodeRef { label, id })
}

impl GraphStore for SqliteGraphStore {
    fn merge_node(&self, node: NodeRef, props: &Properties) -> Result<()> {
        let patch = serde_json::to_string(props)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO nodes (label, id, properties) VALUES (?1, ?2, json_patch('{}', ?3))
                 ON CONFLICT(label, id) DO UPDATE
                 SET properties = json_patch(nodes.properties, excluded.properties)",
                params![node.label.as_str(), node.id, patch],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    fn node(&self, node: NodeRef) -> Result<Option<Properties>> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT properties FROM nodes WHERE label = ?1 AND id = ?2",
                params![node.label.as_str(), node.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        raw.as_deref().map(parse_props).transpose()
    }

    fn node_exists(&self, node: NodeRef) -> Result<bool> {
        exists(&self.conn.lock(), node)
    }

    fn detach_delete(&self, node: NodeRef) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        tx.execute(
            "DELETE FROM edges
             WHERE (from_label = ?1 AND from_id = ?2) OR (to_label = ?1 AND to_id = ?2)",
            params![node.label.as_str(), node.id],
        )
        .map_err(sql_err)?;
        let n = tx
            .execute(
                "DELETE FROM nodes WHERE label = ?1 AND id = ?2",
                params![node.label.as_str(), node.id],
            )
            .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;
        Ok(n > 0)
    }

    fn merge_edge(
        &self,
        rel: RelType,
        from: NodeRef,
        to: NodeRef,
        policy: EndpointPolicy,
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        for node in [from, to] {
            match policy {
                EndpointPolicy::CreateStubs => {
                    tx.execute(
                        "INSERT OR IGNORE INTO nodes (label, id) VALUES (?1, ?2)",
                        params![node.label.as_str(), node.id],
                    )
                    .map_err(sql_err)?;
                }
                EndpointPolicy::RequireExisting => {
                    if !exists(&tx, node)? {
                        return Ok(false);
                    }
                }
            }
        }
        tx.execute(
            "INSERT OR IGNORE INTO edges (rel, from_label, from_id, to_label, to_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                rel.as_str(),
                from.label.as_str(),
                from.id,
                to.label.as_str(),
                to.id
            ],
        )
        .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;
        Ok(true)
    }

    fn delete_edge(&self, rel: RelType, from: NodeRef, to: NodeRef) -> Result<bool> {
        let n = self
            .conn
            .lock()
            .execute(
                "DELETE FROM edges WHERE rel = ?1
                 AND from_label = ?2 AND from_id = ?3 AND to_label = ?4 AND to_id = ?5",
                params![
                    rel.as_str(),
                    from.label.as_str(),
                    from.id,
                    to.label.as_str(),
                    to.id
                ],
            )
            .map_err(sql_err)?;
        Ok(n > 0)
    }

    fn delete_edges_except(
        &self,
        rel: RelType,
        node: NodeRef,
        direction: Direction,
        keep: NodeRef,
    ) -> Result<usize> {
        let sql = match direction {
            Direction::Outgoing => {
                "DELETE FROM edges WHERE rel = ?1 AND from_label = ?2 AND from_id = ?3
                 AND NOT (to_label = ?4 AND to_id = ?5)"
            }
            Direction::Incoming => {
                "DELETE FROM edges WHERE rel = ?1 AND to_label = ?2 AND to_id = ?3
                 AND NOT (from_label = ?4 AND from_id = ?5)"
            }
        };
        self.conn
            .lock()
            .execute(
                sql,
                params![
                    rel.as_str(),
                    node.label.as_str(),
                    node.id,
                    keep.label.as_str(),
                    keep.id
                ],
            )
            .map_err(sql_err)
    }

    fn edge_count(&self, rel: RelType, from: NodeRef, to: NodeRef) -> Result<usize> {
        let n: i64 = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM edges WHERE rel = ?1
                 AND from_label = ?2 AND from_id = ?3 AND to_label = ?4 AND to_id = ?5",
                params![
                    rel.as_str(),
                    from.label.as_str(),
                    from.id,
                    to.label.as_str(),
                    to.id
                ],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        Ok(n as usize)
    }

    fn edges(&self, rel: RelType) -> Result<Vec<(NodeRef, NodeRef)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT from_label, from_id, to_label, to_id FROM edges WHERE rel = ?1
                 ORDER BY from_label, from_id, to_label, to_id",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([rel.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(sql_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        rows.into_iter()
            .map(|(fl, fid, tl, tid)| Ok((parse_node(&fl, fid)?, parse_node(&tl, tid)?)))
            .collect()
    }
}
