//! Language detection and per-language build/run configuration.
//!
//! Detection is derived, never stored authoritatively: a role's language can
//! always be recomputed from its source path (extension lookup) or, as a
//! fallback, from its content (marker scoring).
//!
//! ## Modules
//!
//! - `profile` - merged build/run configuration and pure command builders
//! - `toolchain` - per-language compilation strategies behind one trait

pub mod profile;
pub mod toolchain;

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported languages, classified by how their sources become runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Native-compiled: external compiler produces a host executable.
    Cpp,
    /// Interpreted: executed straight from source, no build step.
    Python,
    /// Bytecode-compiled: compiler targets a classpath directory.
    Java,
    Unknown,
}

impl Language {
    /// Stable key used in manifests and override maps.
    pub fn key(self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python => "py",
            Language::Java => "java",
            Language::Unknown => "unknown",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Cpp => "C++",
            Language::Python => "Python",
            Language::Java => "Java",
            Language::Unknown => "unknown",
        }
    }

    pub fn supported() -> [Language; 3] {
        [Language::Cpp, Language::Python, Language::Java]
    }
}

/// Extension → language lookup table.
const EXTENSION_MAP: &[(&str, Language)] = &[
    ("cpp", Language::Cpp),
    ("cc", Language::Cpp),
    ("cxx", Language::Cpp),
    ("c++", Language::Cpp),
    ("h", Language::Cpp),
    ("hpp", Language::Cpp),
    ("hxx", Language::Cpp),
    ("py", Language::Python),
    ("pyw", Language::Python),
    ("java", Language::Java),
];

// Characteristic textual markers per language: import/include idioms,
// declaration idioms, entry-point idioms.
const CPP_MARKERS: &[&str] = &[
    "#include",
    "using namespace std",
    "std::",
    "int main",
    "template<",
];
const PYTHON_MARKERS: &[&str] = &["def ", "import ", "__main__", "print(", "from "];
const JAVA_MARKERS: &[&str] = &[
    "public class",
    "public static void main",
    "import java.",
    "System.out",
    "package ",
];

fn markers(language: Language) -> &'static [&'static str] {
    match language {
        Language::Cpp => CPP_MARKERS,
        Language::Python => PYTHON_MARKERS,
        Language::Java => JAVA_MARKERS,
        Language::Unknown => &[],
    }
}

/// Detect a language from a path's extension. Unknown suffix → `Unknown`.
pub fn detect_from_extension(path: &Path) -> Language {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return Language::Unknown,
    };
    EXTENSION_MAP
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or(Language::Unknown)
}

/// Detect a language from source content by marker scoring.
///
/// Each language is scored by how many of its characteristic markers appear;
/// the highest nonzero score wins. If `hint_extension` maps to a language
/// whose markers are present, that language is preferred without scoring.
pub fn detect_from_content(content: &str, hint_extension: Option<&str>) -> Language {
    if content.is_empty() {
        return Language::Unknown;
    }

    if let Some(hint) = hint_extension {
        let hinted = detect_from_extension(Path::new(&format!("file.{}", hint.trim_start_matches('.'))));
        if hinted != Language::Unknown && markers(hinted).iter().any(|m| content.contains(m)) {
            return hinted;
        }
    }

    let mut best = (Language::Unknown, 0usize);
    for lang in Language::supported() {
        let score = markers(lang).iter().filter(|m| content.contains(*m)).count();
        if score > best.1 {
            best = (lang, score);
        }
    }
    best.0
}

/// Extension first, content as fallback.
pub fn detect(path: &Path, content: Option<&str>) -> Language {
    let by_ext = detect_from_extension(path);
    if by_ext != Language::Unknown {
        return by_ext;
    }
    match content {
        Some(text) => {
            let hint = path.extension().and_then(|e| e.to_str());
            detect_from_content(text, hint)
        }
        None => Language::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extension_detection_covers_suffix_table() {
        assert_eq!(detect_from_extension(Path::new("sol.cpp")), Language::Cpp);
        assert_eq!(detect_from_extension(Path::new("a/b/Sol.CC")), Language::Cpp);
        assert_eq!(detect_from_extension(Path::new("gen.py")), Language::Python);
        assert_eq!(detect_from_extension(Path::new("Main.java")), Language::Java);
        assert_eq!(detect_from_extension(Path::new("notes.txt")), Language::Unknown);
        assert_eq!(detect_from_extension(Path::new("Makefile")), Language::Unknown);
    }

    #[test]
    fn content_detection_scores_markers() {
        let cpp = "#include <vector>\nint main() { return 0; }";
        assert_eq!(detect_from_content(cpp, None), Language::Cpp);

        let py = "import sys\n\ndef main():\n    print(42)";
        assert_eq!(detect_from_content(py, None), Language::Python);

        let java = "import java.util.*;\npublic class Main { public static void main(String[] a) {} }";
        assert_eq!(detect_from_content(java, None), Language::Java);

        assert_eq!(detect_from_content("plain prose, no code", None), Language::Unknown);
        assert_eq!(detect_from_content("", None), Language::Unknown);
    }

    #[test]
    fn hint_extension_short_circuits_scoring() {
        // Content that scores for both Python and Java; the hint decides.
        let ambiguous = "import java.util.*;\nprint(1)\ndef f():\n    pass";
        assert_eq!(detect_from_content(ambiguous, Some(".py")), Language::Python);
        assert_eq!(detect_from_content(ambiguous, Some("java")), Language::Java);
    }

    #[test]
    fn detect_falls_back_to_content() {
        let path = PathBuf::from("solution");
        assert_eq!(detect(&path, None), Language::Unknown);
        assert_eq!(
            detect(&path, Some("#include <cstdio>\nint main() {}")),
            Language::Cpp
        );
        assert_eq!(detect(Path::new("sol.cpp"), Some("print(1)")), Language::Cpp);
    }
}
