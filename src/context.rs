//! Session context used to build destination folders for uploads.

const DEFAULT_FOLDER: &str = "default";

/// Supplies the display name of whoever is active in the host session.
pub trait ContextProvider: Send + Sync {
    fn display_name(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    name: Option<String>,
}

impl StaticContext {
    pub fn new(name: Option<String>) -> Self {
        Self { name }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Some(name.into()))
    }
}

impl ContextProvider for StaticContext {
    fn display_name(&self) -> Option<String> {
        self.name.clone()
    }
}

/// Turn a display name into a single safe path segment.
pub fn path_hint(display_name: Option<&str>) -> String {
    let sanitized: String = display_name
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        DEFAULT_FOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}
