use crate::models::ReadmeKind;

/// README text longer than this is cut before storing.
pub const MAX_README_CHARS: usize = 50_000;

/// README lookups tried for each repository, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadmeVariant {
    /// `README.md` at the root
    Markdown,
    /// `README.txt` at the root
    Plain,
    /// Whatever GitHub picks as the repository README: any case, any
    /// extension, root, `docs/` or `.github/`
    Detected,
}

impl ReadmeVariant {
    pub const ALL: [ReadmeVariant; 3] = [Self::Markdown, Self::Plain, Self::Detected];

    /// API path for this lookup, relative to the base URL.
    pub fn path(self, owner: &str, name: &str) -> String {
        match self {
            Self::Markdown => format!("/repos/{owner}/{name}/contents/README.md"),
            Self::Plain => format!("/repos/{owner}/{name}/contents/README.txt"),
            Self::Detected => format!("/repos/{owner}/{name}/readme"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Markdown => "README.md",
            Self::Plain => "README.txt",
            Self::Detected => "detected README",
        }
    }

    /// Kind assumed when the response does not say otherwise.
    pub fn kind(self) -> ReadmeKind {
        match self {
            Self::Markdown | Self::Detected => ReadmeKind::Markdown,
            Self::Plain => ReadmeKind::Plain,
        }
    }
}

/// A README as served: raw text plus its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadmeFile {
    pub text: String,
    pub kind: ReadmeKind,
}

impl ReadmeFile {
    pub fn new(text: impl Into<String>, kind: ReadmeKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Plain text when served as `text/plain`, Markdown otherwise.
pub fn kind_from_content_type(content_type: Option<&str>) -> ReadmeKind {
    match content_type {
        Some(ct) if ct.to_ascii_lowercase().contains("text/plain") => ReadmeKind::Plain,
        _ => ReadmeKind::Markdown,
    }
}

/// Normalize fetched README text: trim and cap the length. Returns `None`
/// when nothing is left, so the next variant gets a chance.
pub fn clean_readme(content: &str) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    let capped = crate::llm::embeddings::truncate_chars(content, MAX_README_CHARS);
    Some(capped.to_string())
}
