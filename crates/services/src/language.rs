/// Editor language id for a file name, by extension.
pub fn language_for(file_name: &str) -> &'static str {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return match file_name {
            "Dockerfile" => "dockerfile",
            "Makefile" => "makefile",
            _ => "plaintext",
        };
    };
    match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "py" | "pyw" => "python",
        "go" => "go",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" | "zsh" => "shell",
        "ps1" => "powershell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" | "svg" => "xml",
        "md" | "markdown" => "markdown",
        "lua" => "lua",
        "dart" => "dart",
        "scala" => "scala",
        "r" => "r",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(language_for("main.rs"), "rust");
        assert_eq!(language_for("App.jsx"), "javascript");
        assert_eq!(language_for("README.MD"), "markdown");
        assert_eq!(language_for("archive.tar.toml"), "toml");
        assert_eq!(language_for("Dockerfile"), "dockerfile");
    }

    #[test]
    fn test_fallback() {
        assert_eq!(language_for("LICENSE"), "plaintext");
        assert_eq!(language_for("data.unknownext"), "plaintext");
        assert_eq!(language_for(".gitignore"), "plaintext");
    }
}
