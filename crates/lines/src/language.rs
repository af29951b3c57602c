use serde::{Deserialize, Serialize};

/// Comment-syntax family a language tag belongs to.
///
/// Tags are editor language identifiers (`"typescript"`, `"python"`, ...),
/// matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageFamily {
    /// `//`, `/*` and `*` continuation lines
    CFamily,
    /// `#` line comments (Python, shells, config formats)
    Hash,
    /// `<!--` comments
    Markup,
    /// `/*` comments (CSS and its preprocessors)
    Style,
    /// No comment filtering
    Unknown,
}

const C_FAMILY_TAGS: &[&str] = &[
    "javascript",
    "typescript",
    "javascriptreact",
    "typescriptreact",
    "java",
    "c",
    "cpp",
    "csharp",
    "go",
    "rust",
    "swift",
    "kotlin",
    "php",
    "dart",
    "scala",
];

const HASH_TAGS: &[&str] = &[
    "python",
    "ruby",
    "shellscript",
    "bash",
    "sh",
    "zsh",
    "perl",
    "r",
    "yaml",
    "toml",
    "powershell",
    "makefile",
    "dockerfile",
];

const MARKUP_TAGS: &[&str] = &["html", "xml", "vue", "svelte", "markdown"];

const STYLE_TAGS: &[&str] = &["css", "scss", "less"];

impl LanguageFamily {
    /// Resolve the family for an editor language tag
    pub fn from_tag(tag: &str) -> Self {
        let lowered = tag.trim().to_ascii_lowercase();
        let tag = lowered.as_str();
        if C_FAMILY_TAGS.contains(&tag) {
            LanguageFamily::CFamily
        } else if HASH_TAGS.contains(&tag) {
            LanguageFamily::Hash
        } else if MARKUP_TAGS.contains(&tag) {
            LanguageFamily::Markup
        } else if STYLE_TAGS.contains(&tag) {
            LanguageFamily::Style
        } else {
            LanguageFamily::Unknown
        }
    }

    /// Map a file extension to the editor language tag it usually carries.
    ///
    /// Returns `None` for extensions without a known tag.
    pub fn tag_for_extension(ext: &str) -> Option<&'static str> {
        let tag = match ext.to_ascii_lowercase().as_str() {
            "rs" => "rust",
            "py" | "pyw" => "python",
            "js" | "mjs" | "cjs" => "javascript",
            "jsx" => "javascriptreact",
            "ts" | "mts" | "cts" => "typescript",
            "tsx" => "typescriptreact",
            "go" => "go",
            "java" => "java",
            "c" | "h" => "c",
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
            "cs" => "csharp",
            "swift" => "swift",
            "kt" | "kts" => "kotlin",
            "php" => "php",
            "dart" => "dart",
            "scala" => "scala",
            "rb" => "ruby",
            "sh" => "shellscript",
            "bash" => "bash",
            "zsh" => "zsh",
            "pl" => "perl",
            "r" => "r",
            "yml" | "yaml" => "yaml",
            "toml" => "toml",
            "ps1" => "powershell",
            "html" | "htm" => "html",
            "xml" => "xml",
            "vue" => "vue",
            "svelte" => "svelte",
            "md" => "markdown",
            "css" => "css",
            "scss" => "scss",
            "less" => "less",
            _ => return None,
        };
        Some(tag)
    }

    /// Line prefixes that mark a comment in this family
    pub fn comment_prefixes(self) -> &'static [&'static str] {
        match self {
            LanguageFamily::CFamily => &["//", "/*", "*"],
            LanguageFamily::Hash => &["#"],
            LanguageFamily::Markup => &["<!--"],
            LanguageFamily::Style => &["/*"],
            LanguageFamily::Unknown => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageFamily::CFamily => "c_family",
            LanguageFamily::Hash => "hash",
            LanguageFamily::Markup => "markup",
            LanguageFamily::Style => "style",
            LanguageFamily::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tag() {
        assert_eq!(LanguageFamily::from_tag("rust"), LanguageFamily::CFamily);
        assert_eq!(LanguageFamily::from_tag("TypeScript"), LanguageFamily::CFamily);
        assert_eq!(LanguageFamily::from_tag("python"), LanguageFamily::Hash);
        assert_eq!(LanguageFamily::from_tag("shellscript"), LanguageFamily::Hash);
        assert_eq!(LanguageFamily::from_tag("html"), LanguageFamily::Markup);
        assert_eq!(LanguageFamily::from_tag("scss"), LanguageFamily::Style);
        assert_eq!(LanguageFamily::from_tag("cobol"), LanguageFamily::Unknown);
        assert_eq!(LanguageFamily::from_tag(""), LanguageFamily::Unknown);
    }

    #[test]
    fn test_tag_for_extension() {
        assert_eq!(LanguageFamily::tag_for_extension("rs"), Some("rust"));
        assert_eq!(LanguageFamily::tag_for_extension("PY"), Some("python"));
        assert_eq!(LanguageFamily::tag_for_extension("tsx"), Some("typescriptreact"));
        assert_eq!(LanguageFamily::tag_for_extension("bin"), None);
    }

    #[test]
    fn test_comment_prefixes() {
        assert!(LanguageFamily::CFamily.comment_prefixes().contains(&"//"));
        assert!(LanguageFamily::Hash.comment_prefixes().contains(&"#"));
        assert_eq!(LanguageFamily::Style.comment_prefixes(), &["/*"]);
        assert!(LanguageFamily::Unknown.comment_prefixes().is_empty());
    }

    #[test]
    fn test_as_str() {
        assert_eq!(LanguageFamily::from_tag("go").as_str(), "c_family");
        assert_eq!(LanguageFamily::from_tag("ruby").as_str(), "hash");
        assert_eq!(LanguageFamily::Unknown.as_str(), "unknown");
    }
}
