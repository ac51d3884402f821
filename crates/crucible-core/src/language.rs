use serde::{Deserialize, Serialize};

/// Supported execution targets. The set is closed: adding a language means
/// adding a variant (and a sandbox image), not loosening validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
    Ruby,
    Php,
    Go,
}

pub const ALL_LANGUAGES: [Language; 5] = [
    Language::Python,
    Language::Node,
    Language::Ruby,
    Language::Php,
    Language::Go,
];

impl Language {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "python" => Some(Self::Python),
            "node" => Some(Self::Node),
            "ruby" => Some(Self::Ruby),
            "php" => Some(Self::Php),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Go => "go",
        }
    }

    /// Conventional entry-file name the sandbox materializes the code body into.
    pub fn entry_file(self) -> &'static str {
        match self {
            Self::Python => "main.py",
            Self::Node => "main.js",
            Self::Ruby => "main.rb",
            Self::Php => "main.php",
            Self::Go => "main.go",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
