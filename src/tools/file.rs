use async_trait::async_trait;
use tracing::{debug, info};

use super::{Arguments, ParamType, ParameterSchema, Tool, ToolContext, ToolOutput};
use crate::config::ReplacePolicy;
use crate::error::{AgentError, Result};

// -- ListFilesInDir ------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files_in_dir"
    }

    fn description(&self) -> &'static str {
        "List the entries of a directory (defaults to the current directory). Not recursive."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new().optional(
            "directory",
            ParamType::String,
            "Directory to list (optional). Defaults to the current directory",
        )
    }

    async fn execute(&self, args: &Arguments, ctx: &ToolContext) -> Result<ToolOutput> {
        let directory = args.str("directory").unwrap_or(".");
        let abs = ctx.workspace.resolve(directory)?;
        debug!(?abs, "listing directory");

        let entries = match std::fs::read_dir(&abs) {
            Ok(entries) => entries,
            Err(e) => return Ok(ToolOutput::error(format!("failed to list {directory}: {e}"))),
        };

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => files.push(entry.file_name().to_string_lossy().into_owned()),
                Err(e) => {
                    return Ok(ToolOutput::error(format!("failed to list {directory}: {e}")));
                }
            }
        }
        files.sort();

        Ok(ToolOutput::json(&serde_json::json!({ "files": files })))
    }
}

// -- ReadFile ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the content of the file at the given path. Returns the file contents as text."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new().required("path", ParamType::String, "Path of the file to read")
    }

    async fn execute(&self, args: &Arguments, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = args.str("path").unwrap_or_default();
        if path.is_empty() {
            return Ok(ToolOutput::error("path is required"));
        }

        let abs = ctx.workspace.resolve(path)?;
        debug!(?abs, "reading file");

        match std::fs::read_to_string(&abs) {
            Ok(contents) => Ok(ToolOutput::ok(contents)),
            Err(e) => Ok(ToolOutput::error(format!("failed to read {path}: {e}"))),
        }
    }
}

// -- EditFile ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EditFileTool {
    policy: ReplacePolicy,
}

impl EditFileTool {
    pub fn new(policy: ReplacePolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Edit a file by replacing previous_text with new_text. Creates the file (and missing \
         parent directories) if it does not exist. With an empty previous_text the whole file \
         is replaced by new_text."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("path", ParamType::String, "Path of the file to edit")
            .optional(
                "previous_text",
                ParamType::String,
                "Text to search for and replace (may be empty for new files)",
            )
            .required(
                "new_text",
                ParamType::String,
                "Text that replaces previous_text (or the full content of a new file)",
            )
    }

    async fn execute(&self, args: &Arguments, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = args.str("path").unwrap_or_default();
        let new_text = args.str("new_text").unwrap_or_default();
        let previous_text = args.str("previous_text").unwrap_or_default();

        if path.is_empty() {
            return Ok(ToolOutput::error("path is required"));
        }

        let abs = ctx.workspace.resolve(path)?;
        let existed = abs.exists();

        if existed && !previous_text.is_empty() {
            let contents = match std::fs::read_to_string(&abs) {
                Ok(c) => c,
                Err(e) => return Ok(ToolOutput::error(format!("failed to read {path}: {e}"))),
            };

            let count = contents.matches(previous_text).count();
            if count == 0 {
                let mismatch = AgentError::TextMismatch(format!(
                    "previous_text does not match the current content of {path}"
                ));
                return Ok(ToolOutput::error(mismatch.to_string()));
            }

            let (updated, replaced) = match self.policy {
                ReplacePolicy::All => (contents.replace(previous_text, new_text), count),
                ReplacePolicy::First => (contents.replacen(previous_text, new_text, 1), 1),
            };

            debug!(?abs, replaced, count, "editing file");
            return match std::fs::write(&abs, updated.as_bytes()) {
                Ok(()) => {
                    info!(path = %path, replaced, "file edited");
                    Ok(ToolOutput::ok(format!(
                        "Edited {path}: replaced {replaced} of {count} occurrence(s)"
                    )))
                }
                Err(e) => Ok(ToolOutput::error(format!("failed to write {path}: {e}"))),
            };
        }

        if let Some(parent) = abs.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return Ok(ToolOutput::error(format!(
                    "failed to create parent directories for {path}: {e}"
                )));
            }
        }

        debug!(?abs, bytes = new_text.len(), "writing file");
        match std::fs::write(&abs, new_text.as_bytes()) {
            Ok(()) => {
                let action = if existed { "Overwrote" } else { "Created" };
                info!(path = %path, action, "file written");
                Ok(ToolOutput::ok(format!(
                    "{action} {path} ({} bytes)",
                    new_text.len()
                )))
            }
            Err(e) => Ok(ToolOutput::error(format!("failed to write {path}: {e}"))),
        }
    }
}
