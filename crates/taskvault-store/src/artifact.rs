//! The artifact snapshot store.

use std::sync::Arc;

use taskvault_core::{Artifact, TaskResult};

use crate::codec;
use crate::dialect::JsonAdapter;
use crate::session::{SqlSession, SqlValue};
use crate::sql::{ARTIFACT_INSERT_COLUMNS, Statements, multi_row_placeholders};

/// Owns the artifact rows per task.
///
/// Artifacts are current outputs, not a log: every save deletes the
/// previous set and re-inserts the new one, positions as sequence numbers.
pub(crate) struct ArtifactStore {
    statements: Arc<Statements>,
    adapter: JsonAdapter,
    batch_size: usize,
}

impl ArtifactStore {
    pub fn new(statements: Arc<Statements>, adapter: JsonAdapter, batch_size: usize) -> Self {
        Self {
            statements,
            adapter,
            batch_size: batch_size.max(1),
        }
    }

    /// Replace the persisted artifact set with `artifacts`.
    pub fn save_all(
        &self,
        session: &mut dyn SqlSession,
        task_id: &str,
        artifacts: &[Artifact],
    ) -> TaskResult<()> {
        session.execute(
            &self.statements.delete_artifacts,
            &[SqlValue::Text(task_id.to_string())],
        )?;
        if artifacts.is_empty() {
            return Ok(());
        }

        for (chunk_index, chunk) in artifacts.chunks(self.batch_size).enumerate() {
            let sql = format!(
                "{}{}",
                self.statements.insert_artifacts_prefix,
                multi_row_placeholders(chunk.len(), ARTIFACT_INSERT_COLUMNS)
            );

            let mut params = Vec::with_capacity(chunk.len() * ARTIFACT_INSERT_COLUMNS);
            for (offset, artifact) in chunk.iter().enumerate() {
                let sequence = chunk_index * self.batch_size + offset;

                params.push(SqlValue::Text(task_id.to_string()));
                params.push(SqlValue::Text(artifact.id.clone()));
                params.push(match &artifact.name {
                    Some(name) => SqlValue::Text(name.clone()),
                    None => SqlValue::Null,
                });
                params.push(match &artifact.description {
                    Some(description) => SqlValue::Text(description.clone()),
                    None => SqlValue::Null,
                });
                params.push(
                    self.adapter
                        .adapt(Some(codec::parts_json(&artifact.parts)?))?,
                );
                params.push(
                    self.adapter
                        .adapt(codec::metadata_json(&artifact.metadata)?)?,
                );
                params.push(
                    self.adapter
                        .adapt(codec::extensions_json(&artifact.extensions)?)?,
                );
                params.push(SqlValue::Int(sequence as i64));
            }

            session.execute(&sql, &params)?;
        }

        tracing::debug!(task_id, count = artifacts.len(), "replaced artifact rows");
        Ok(())
    }

    /// Load the artifacts in sequence order.
    pub fn find_by_task_id(
        &self,
        session: &mut dyn SqlSession,
        task_id: &str,
    ) -> TaskResult<Vec<Artifact>> {
        let rows = session.query(
            &self.statements.select_artifacts,
            &[SqlValue::Text(task_id.to_string())],
        )?;

        rows.iter()
            .map(|row| {
                let content = row.opt_json(3)?.ok_or_else(|| {
                    taskvault_core::TaskStoreError::deserialization(
                        "artifact content",
                        "content_json is null",
                    )
                })?;
                let content = codec::recover_tree(content, "artifact content");
                let parts = codec::decode_parts(&content, "artifact content")?;

                Ok(Artifact {
                    id: row.text(0)?.to_string(),
                    name: row.opt_text(1)?.map(str::to_string),
                    description: row.opt_text(2)?.map(str::to_string),
                    parts,
                    metadata: codec::metadata_from_tree(row.opt_json(4)?, "artifact metadata")?,
                    extensions: codec::extensions_from_tree(
                        row.opt_json(5)?,
                        "artifact extensions",
                    )?,
                })
            })
            .collect()
    }
}
