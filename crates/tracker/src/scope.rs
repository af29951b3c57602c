use serde::{Deserialize, Serialize};

const UNTITLED_SCHEME: &str = "untitled:";

// Directory names whose files are vendored, generated or tool state.
const IGNORED_SCOPES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".cache",
    "node_modules",
    ".next",
    "target",
    "build",
    "dist",
    "out",
    "coverage",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
];

/// Which files are tracked for line changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrackingScope {
    #[default]
    AllFiles,
    /// Only files whose extension is listed (case-insensitive, with or without the dot)
    Extensions { extensions: Vec<String> },
}

impl TrackingScope {
    pub fn extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Extensions {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a unit identifier (path or URI) falls inside this scope
    pub fn accepts(&self, unit_id: &str) -> bool {
        if is_untitled(unit_id) || in_ignored_scope(unit_id) {
            return false;
        }
        match self {
            TrackingScope::AllFiles => true,
            TrackingScope::Extensions { extensions } => {
                let Some(ext) = extension_of(unit_id) else {
                    return false;
                };
                extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
            }
        }
    }
}

/// Unsaved editor buffers have no backing file and are never tracked
pub fn is_untitled(unit_id: &str) -> bool {
    unit_id.starts_with(UNTITLED_SCHEME)
}

/// Last path segment's extension, ignoring any URI query or fragment
pub fn extension_of(unit_id: &str) -> Option<&str> {
    let path = unit_id
        .split(['?', '#'])
        .next()
        .unwrap_or(unit_id);
    let name = path.rsplit(['/', '\\']).next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

fn in_ignored_scope(unit_id: &str) -> bool {
    let mut segments: Vec<&str> = unit_id.split(['/', '\\']).collect();
    // last segment is the file name itself
    segments.pop();
    segments.iter().any(|segment| {
        IGNORED_SCOPES
            .iter()
            .any(|ignored| segment.eq_ignore_ascii_case(ignored))
    })
}
