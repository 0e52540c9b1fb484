//! Filesystem-backed graph store.
//!
//! Each project persists to `<root>/<project_id>.graph.json`. Saves go
//! through a temp file followed by a rename, so a crash mid-write leaves
//! the previous document intact.

use super::{GraphDocument, GraphStore};
use crate::graph::KnowledgeGraph;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const DOCUMENT_SUFFIX: &str = ".graph.json";

/// Graph store over a local directory.
#[derive(Debug, Clone)]
pub struct FileGraphStore {
    root: PathBuf,
}

impl FileGraphStore {
    /// Creates a store rooted at the given directory. The directory is
    /// created lazily on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rejects project ids that would escape the root directory.
    fn validate_project_id(project_id: &str) -> Result<()> {
        if project_id.is_empty() {
            return Err(Error::Validation("project id must not be empty".to_string()));
        }
        if project_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0')
            || project_id == "."
            || project_id == ".."
        {
            return Err(Error::Validation(format!(
                "project id '{project_id}' contains path separators"
            )));
        }
        Ok(())
    }

    fn document_path(&self, project_id: &str) -> PathBuf {
        self.root.join(format!("{project_id}{DOCUMENT_SUFFIX}"))
    }

    fn storage_error(operation: &str, err: &std::io::Error) -> Error {
        Error::Storage {
            operation: operation.to_string(),
            cause: err.to_string(),
        }
    }
}

#[async_trait]
impl GraphStore for FileGraphStore {
    async fn load(&self, project_id: &str) -> Result<Option<KnowledgeGraph>> {
        Self::validate_project_id(project_id)?;
        let path = self.document_path(project_id);

        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Self::storage_error("read_graph_document", &err)),
        };

        let document = GraphDocument::parse(&json)?;
        tracing::debug!(
            project_id,
            entities = document.metadata.entity_count,
            relationships = document.metadata.relationship_count,
            "Loaded graph document"
        );
        Ok(Some(document.into_graph()))
    }

    async fn save(&self, graph: &KnowledgeGraph) -> Result<()> {
        let project_id = graph.project_id();
        Self::validate_project_id(project_id)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::storage_error("create_data_dir", &e))?;

        let json = GraphDocument::from_graph(graph).to_json()?;
        let path = self.document_path(project_id);
        let temp_path = self.root.join(format!(".{project_id}{DOCUMENT_SUFFIX}.tmp"));

        tokio::fs::write(&temp_path, json.as_bytes())
            .await
            .map_err(|e| Self::storage_error("write_graph_document", &e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Self::storage_error("commit_graph_document", &e))?;

        tracing::debug!(
            project_id,
            path = %path.display(),
            entities = graph.metadata().entity_count,
            "Saved graph document"
        );
        metrics::counter!("graph_documents_saved_total").increment(1);
        Ok(())
    }

    async fn delete(&self, project_id: &str) -> Result<bool> {
        Self::validate_project_id(project_id)?;
        let path = self.document_path(project_id);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Self::storage_error("delete_graph_document", &err)),
        }
    }

    async fn list_projects(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::storage_error("list_graph_documents", &err)),
        };

        let mut projects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::storage_error("list_graph_documents", &e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(project_id) = name.strip_suffix(DOCUMENT_SUFFIX) {
                if !project_id.is_empty() && !project_id.starts_with('.') {
                    projects.push(project_id.to_string());
                }
            }
        }
        projects.sort();
        Ok(projects)
    }
}
