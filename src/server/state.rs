//! Shared application state

use crate::service::RemovalService;
use std::path::PathBuf;
use std::sync::Arc;

/// State handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: RemovalService,
    pub templates: Arc<TemplateDir>,
}

impl AppState {
    #[must_use]
    pub fn new(service: RemovalService, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            templates: Arc::new(TemplateDir::new(templates_dir)),
        }
    }
}

/// HTML templates read from disk on each render
#[derive(Debug)]
pub struct TemplateDir {
    base_dir: PathBuf,
}

impl TemplateDir {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base_dir: base.into() }
    }

    /// Render a template with the given context
    ///
    /// # Errors
    /// - Template file missing or unreadable
    /// - Template syntax or render error
    pub fn render<S: serde::Serialize>(&self, name: &str, ctx: S) -> anyhow::Result<String> {
        let path = self.base_dir.join(name);
        let source = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read template '{}': {}", path.display(), e))?;

        let mut env = minijinja::Environment::new();
        env.add_template(name, &source)?;
        let rendered = env.get_template(name)?.render(ctx)?;
        Ok(rendered)
    }
}
