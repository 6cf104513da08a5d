//! Diagrams described in PlantUML

use super::{
    parse_fields, OutputBlock, Processor, ProcessorContext, ProcessorError, ProcessorOutput,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const DEFAULT_TITLE: &str = "Diagram";
/// Rendering timeout for [`PlantUmlRenderer`]
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Diagram source is empty")]
    EmptySource,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Renderer exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },
    #[error("Renderer timed out after {0:?}")]
    Timeout(Duration),
    #[error("Renderer produced no image at {0}")]
    MissingImage(PathBuf),
}

/// Turns diagram source into an image file
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Render `source` and return the path of the produced image
    async fn render(&self, source: &str) -> Result<PathBuf, RenderError>;
}

/// Renders through the `plantuml` command line tool
pub struct PlantUmlRenderer {
    binary: PathBuf,
    output_dir: PathBuf,
    timeout: Duration,
}

impl PlantUmlRenderer {
    pub fn new(binary: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            output_dir: output_dir.into(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, source_path: &Path) -> Result<(), RenderError> {
        // The image lands next to the source file
        let child = Command::new(&self.binary)
            .arg("-tpng")
            .arg(source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tokio::select! {
            () = tokio::time::sleep(self.timeout) => Err(RenderError::Timeout(self.timeout)),
            result = child.wait_with_output() => {
                let output = result?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(RenderError::Failed {
                        code: output.status.code().unwrap_or(-1),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl DiagramRenderer for PlantUmlRenderer {
    async fn render(&self, source: &str) -> Result<PathBuf, RenderError> {
        if source.trim().is_empty() {
            return Err(RenderError::EmptySource);
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let stem = format!("diagram-{}", uuid::Uuid::new_v4());
        let source_path = self.output_dir.join(format!("{stem}.puml"));
        let image_path = self.output_dir.join(format!("{stem}.png"));

        tokio::fs::write(&source_path, source).await?;
        let result = self.run(&source_path).await;
        if let Err(e) = tokio::fs::remove_file(&source_path).await {
            tracing::warn!(path = %source_path.display(), error = %e, "Could not remove diagram source");
        }
        result?;

        if tokio::fs::try_exists(&image_path).await? {
            Ok(image_path)
        } else {
            Err(RenderError::MissingImage(image_path))
        }
    }
}

pub struct DiagramProcessor {
    renderer: Arc<dyn DiagramRenderer>,
}

impl DiagramProcessor {
    pub fn new(renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self { renderer }
    }
}

#[derive(Debug, Deserialize)]
struct DiagramInput {
    diagram: String,
    #[serde(default)]
    title: Option<String>,
}

#[async_trait]
impl Processor for DiagramProcessor {
    fn kind(&self) -> &'static str {
        "diagram"
    }

    fn description(&self) -> String {
        "Draws sequence, use case, class, activity, component and entity-relationship diagrams with PlantUML.".to_string()
    }

    fn prompt_info(&self) -> String {
        r#"
== Responses of type 'diagram' ==
  Use this type for any request that involves drawing a sequence, use case, class, activity,
  component or entity-relationship (ERD) diagram.
  The 'type' field must be "diagram".
  Include a 'diagram' field with the PlantUML definition of the requested diagram.
  Use only ASCII characters in the diagram: no accents or other characters that may cause encoding problems.
  If you cannot express the diagram in PlantUML, do not use this type.
  Put a short descriptive title (at most 100 characters) in the 'title' field.
  Example:
  {
    "type": "diagram",
    "diagram": "@startuml\nhide circle\nentity \"MODELS\" {\n  + CODE : BIGINT <<PK>>\n  --\n  DESCRIPTION : VARCHAR(200)\n}\nentity \"SUPPORTS\" {\n  + CODE : VARCHAR(60) <<PK>>\n  --\n  MODEL : BIGINT <<FK>>\n}\nMODELS ||--o{ SUPPORTS : MODEL\n@enduml",
    "title": "Support models ERD"
  }
"#
        .to_string()
    }

    async fn handle(
        &self,
        _ctx: &ProcessorContext,
        _user_text: &str,
        fields: &Map<String, Value>,
    ) -> Result<ProcessorOutput, ProcessorError> {
        let input: DiagramInput = parse_fields(fields)?;
        let title = input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let image_path = self.renderer.render(&input.diagram).await?;
        tracing::info!(path = %image_path.display(), "Diagram rendered");

        Ok(ProcessorOutput::block(OutputBlock::Diagram { title, image_path }))
    }
}
