//! Saving artifacts as downloadable files.
//!
//! Every save goes through a staging file created next to the destination.
//! The staging file is the only handle to the payload; persisting it consumes
//! it, and dropping it on any error path deletes it.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::info;

use crate::error::ExportError;
use crate::state::{DiagramArtifact, MermaidArtifact, SchemaArtifact};

const DEFAULT_STEM: &str = "schema";
const STAGING_PREFIX: &str = ".schemaforge-";
const MAX_NAME_ATTEMPTS: usize = 100;

pub const HTML_MIME: &str = "text/html";
pub const JSON_MIME: &str = "application/json";
pub const MERMAID_MIME: &str = "text/vnd.mermaid";

/// A file written by the exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub mime: &'static str,
    pub bytes: usize,
}

struct Payload {
    bytes: Vec<u8>,
    mime: &'static str,
    stem: String,
    extension: &'static str,
}

/// File stem derived from the current schema's name.
pub fn file_stem(schema: Option<&SchemaArtifact>) -> String {
    let name = schema.and_then(SchemaArtifact::schema_name).unwrap_or(DEFAULT_STEM);
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // A name made only of dots would resolve to the directory itself.
    if cleaned.trim_matches('.').is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        cleaned
    }
}

pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save the diagram document as `<stem>_diagram.html`. The stem comes from
    /// `schema`, whichever diagram is being exported.
    pub fn export_diagram(
        &self,
        diagram: Option<&DiagramArtifact>,
        schema: Option<&SchemaArtifact>,
    ) -> Result<Option<ExportedFile>, ExportError> {
        let Some(diagram) = diagram else {
            return Ok(None);
        };

        self.save(Payload {
            bytes: diagram.document().as_bytes().to_vec(),
            mime: HTML_MIME,
            stem: format!("{}_diagram", file_stem(schema)),
            extension: "html",
        })
        .map(Some)
    }

    /// Save the schema record as indented JSON, `<stem>.json`.
    pub fn export_schema(
        &self,
        schema: Option<&SchemaArtifact>,
    ) -> Result<Option<ExportedFile>, ExportError> {
        let Some(artifact) = schema else {
            return Ok(None);
        };

        let json = serde_json::to_string_pretty(artifact.value())?;
        self.save(Payload {
            bytes: json.into_bytes(),
            mime: JSON_MIME,
            stem: file_stem(schema),
            extension: "json",
        })
        .map(Some)
    }

    /// Save the Mermaid source as `<stem>.mmd`.
    pub fn export_mermaid(
        &self,
        mermaid: Option<&MermaidArtifact>,
        schema: Option<&SchemaArtifact>,
    ) -> Result<Option<ExportedFile>, ExportError> {
        let Some(mermaid) = mermaid else {
            return Ok(None);
        };

        self.save(Payload {
            bytes: mermaid.source().as_bytes().to_vec(),
            mime: MERMAID_MIME,
            stem: file_stem(schema),
            extension: "mmd",
        })
        .map(Some)
    }

    fn save(&self, payload: Payload) -> Result<ExportedFile, ExportError> {
        fs::create_dir_all(&self.dir)?;

        let mut staged = Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        staged.write_all(&payload.bytes)?;
        staged.flush()?;

        let path = self.persist(staged, &payload.stem, payload.extension)?;
        info!(path = %path.display(), mime = payload.mime, "exported artifact");

        Ok(ExportedFile {
            path,
            mime: payload.mime,
            bytes: payload.bytes.len(),
        })
    }

    /// Move the staging file to the first free name, never overwriting.
    fn persist(
        &self,
        mut staged: NamedTempFile,
        stem: &str,
        extension: &str,
    ) -> Result<PathBuf, ExportError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.{}", stem, extension)
            } else {
                format!("{} ({}).{}", stem, attempt, extension)
            };
            let target = self.dir.join(name);

            match staged.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    staged = err.file;
                }
                Err(err) => return Err(err.error.into()),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for {}.{}", stem, extension),
        )
        .into())
    }
}
