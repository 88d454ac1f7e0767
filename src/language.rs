//! Maps a user-supplied language label to a canonical language, its source extension,
//! and the argv executed inside the container.

use crate::error::CoreError;

/// A single shared sandbox image carries every supported toolchain, mirroring the
/// original implementation's one `code_runner` image rather than per-language images.
pub const SANDBOX_IMAGE: &str = "isobox-sandbox:latest";

/// Fixed absolute path to an isolated Python interpreter inside the sandbox image.
const PYTHON_INTERPRETER: &str = "/usr/local/bin/python3.11";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    Php,
    C,
    Cpp,
}

impl Language {
    /// Trims, lower-cases, resolves aliases, then validates against the canonical set.
    pub fn normalize(label: &str) -> Result<Self, CoreError> {
        let key = label.trim().to_lowercase();
        let lang = match key.as_str() {
            "python" | "py" | "python3" => Language::Python,
            "javascript" | "js" | "node" | "nodejs" => Language::JavaScript,
            "php" => Language::Php,
            "c" | "gcc" => Language::C,
            "cpp" | "c++" | "g++" => Language::Cpp,
            _ => return Err(CoreError::UnsupportedLanguage(label.to_string())),
        };
        Ok(lang)
    }

    /// Source-file extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::JavaScript => "js",
            Language::Php => "php",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Stable canonical identifier, e.g. for logging and the gRPC-free HTTP surface.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Php => "php",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// The argv executed *inside* the container against an absolute in-container
    /// `source_path`. C/C++ compile to `/tmp` (a private tmpfs) and chain the run
    /// so a compile failure propagates a non-zero exit with no execution.
    pub fn invocation(&self, source_path: &str) -> Vec<String> {
        match self {
            Language::Python => vec![PYTHON_INTERPRETER.to_string(), source_path.to_string()],
            Language::JavaScript => vec!["node".to_string(), source_path.to_string()],
            Language::Php => vec!["php".to_string(), source_path.to_string()],
            Language::C => {
                shell_compile_and_run("gcc", &["-O2", "-std=c11", source_path, "-o", "/tmp/main"])
            }
            Language::Cpp => shell_compile_and_run(
                "g++",
                &["-O2", "-std=c++17", source_path, "-o", "/tmp/main"],
            ),
        }
    }
}

fn shell_compile_and_run(compiler: &str, compile_args: &[&str]) -> Vec<String> {
    let compile = std::iter::once(compiler)
        .chain(compile_args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("{compile} && /tmp/main"),
    ]
}
