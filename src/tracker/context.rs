use std::path::{Path, PathBuf};

/// Project name used when the host hasn't told us which workspace is open.
pub const UNKNOWN_PROJECT: &str = "Unknown Project";

/// Answers which project and which kind of file the user is working on. Neither question can
/// fail; unknown answers fall back to sentinels.
pub trait ContextResolver {
    fn project_name(&self) -> String;

    /// Extension of the focused file including the dot, for example `.ts`.
    fn active_extension(&self) -> Option<String>;
}

/// Editor state as reported by the host.
#[derive(Debug, Default, Clone)]
pub struct EditorContext {
    workspace: Option<String>,
    active_file: Option<PathBuf>,
}

impl EditorContext {
    pub fn new(workspace: Option<String>) -> Self {
        Self {
            workspace,
            active_file: None,
        }
    }

    pub fn set_workspace(&mut self, workspace: Option<String>) {
        self.workspace = workspace;
    }

    pub fn set_active_file(&mut self, file: Option<PathBuf>) {
        self.active_file = file;
    }

    pub fn active_file(&self) -> Option<&Path> {
        self.active_file.as_deref()
    }
}

impl ContextResolver for EditorContext {
    fn project_name(&self) -> String {
        self.workspace
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(UNKNOWN_PROJECT)
            .to_owned()
    }

    fn active_extension(&self) -> Option<String> {
        self.active_file.as_deref().and_then(extension_of)
    }
}

/// `src/app.test.ts` gives `.ts`. Dotfiles such as `.gitignore` and files without an extension
/// give nothing.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|v| v.to_string_lossy())
        .filter(|v| !v.is_empty())
        .map(|v| format!(".{v}"))
}
