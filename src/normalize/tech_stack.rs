//! Technology-stack tags.
//!
//! Tags come from two places: manifest files at the root of a checked-out
//! repository, and the ecosystems of the components scanners report.

use std::collections::BTreeSet;
use std::path::Path;

/// Manifest-file indicators, checked against root-level file names.
///
/// A leading `*` matches by suffix.
const INDICATORS: &[(&str, &[&str])] = &[
    ("python", &["requirements.txt", "setup.py", "Pipfile", "pyproject.toml", "poetry.lock"]),
    ("nodejs", &["package.json", "package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"]),
    ("java", &["pom.xml", "build.gradle", "build.gradle.kts", "build.xml", "settings.gradle"]),
    ("go", &["go.mod", "go.sum", "Gopkg.toml"]),
    ("rust", &["Cargo.toml", "Cargo.lock"]),
    ("dotnet", &["*.csproj", "*.fsproj", "*.vbproj", "*.sln", "nuget.config"]),
    ("ruby", &["Gemfile", "Gemfile.lock", "*.gemspec"]),
    ("php", &["composer.json", "composer.lock"]),
    ("docker", &["Dockerfile", "docker-compose.yml", "docker-compose.yaml"]),
    ("terraform", &["*.tf", "*.tfvars"]),
    ("typescript", &["tsconfig.json"]),
    ("flutter", &["pubspec.yaml", "pubspec.lock"]),
    ("swift", &["Package.swift", "Podfile"]),
    ("scala", &["build.sbt"]),
    ("elixir", &["mix.exs", "mix.lock"]),
    ("clojure", &["project.clj", "deps.edn"]),
    ("haskell", &["*.cabal", "stack.yaml", "cabal.project"]),
    ("julia", &["Project.toml", "Manifest.toml"]),
    ("perl", &["Makefile.PL", "Build.PL", "cpanfile"]),
    ("c/c++", &["CMakeLists.txt", "meson.build", "*.vcxproj"]),
    ("maven", &["pom.xml"]),
    ("gradle", &["build.gradle", "build.gradle.kts"]),
    ("poetry", &["poetry.lock"]),
];

/// Map a purl type, scanner package type or language name to a tech-stack tag.
///
/// Operating-system package types (deb, rpm, apk, ...) have no tag.
#[must_use]
pub fn ecosystem_tag(ecosystem: &str) -> Option<&'static str> {
    let tag = match ecosystem.to_ascii_lowercase().as_str() {
        "npm" | "yarn" | "pnpm" | "node-pkg" | "javascript" | "nodejs" => "nodejs",
        "pypi" | "pip" | "pipenv" | "poetry" | "python" | "python-pkg" => "python",
        "cargo" | "rust" | "rust-crate" | "rust-binary" => "rust",
        "golang" | "go" | "gomod" | "gobinary" | "go-module" => "go",
        "maven" | "jar" | "pom" | "gradle" | "java" | "java-archive" => "java",
        "gem" | "bundler" | "gemspec" | "ruby" => "ruby",
        "composer" | "php" | "php-composer" => "php",
        "nuget" | "dotnet" | "dotnet-core" => "dotnet",
        "pub" | "dart" | "dart-pub" => "dart",
        "hex" | "elixir" => "elixir",
        "swift" | "cocoapods" | "swiftpm" => "swift",
        "conan" | "c/c++" | "cpp" => "c/c++",
        "github" | "github-action" | "github-actions" => "github-actions",
        _ => return None,
    };
    Some(tag)
}

/// Tags for the manifest files found at the repository root.
#[must_use]
pub fn detect_repository_tech_stack(repo: &Path) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    let entries = match std::fs::read_dir(repo) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %repo.display(), error = %e, "Cannot read repository root");
            return tags;
        }
    };

    let files: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    for (tag, patterns) in INDICATORS {
        if patterns
            .iter()
            .any(|pattern| files.iter().any(|f| matches_indicator(pattern, f)))
        {
            tags.insert((*tag).to_string());
        }
    }

    if repo.join(".github").join("workflows").is_dir() {
        tags.insert("github-actions".to_string());
    }

    tracing::debug!(path = %repo.display(), tags = ?tags, "Detected tech stack");
    tags
}

fn matches_indicator(pattern: &str, file: &str) -> bool {
    pattern
        .strip_prefix('*')
        .map_or(pattern == file, |suffix| file.ends_with(suffix))
}
