use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's own Rust sources. Anything else under the
// package root (reference material, target output) is not subject to the policy.
const SOURCE_ROOTS: [&str; 4] = ["survival", "cli", "tests", "benches"];

const FORBIDDEN_COMMENT_WORDS: [&str; 14] = [
    "FIXED", "CORRECTED", "FIX", "FIXES", "NEW", "CHANGED", "CHANGES", "CHANGE", "MODIFIED",
    "MODIFIES", "MODIFY", "UPDATED", "UPDATES", "UPDATE",
];

// What a single policy scan looks for and how it explains a violation.
#[derive(Clone, Copy)]
enum Policy {
    UnderscorePrefix,
    ForbiddenWords,
    StarsInComments,
    UppercaseComments,
    AllowDeadCode,
}

impl Policy {
    fn pattern(self) -> String {
        match self {
            Policy::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Policy::ForbiddenWords => {
                format!(r"(//|/\*|///).*(?:{})", FORBIDDEN_COMMENT_WORDS.join("|"))
            }
            Policy::StarsInComments => r"(//|/\*).*\*\*".to_string(),
            Policy::UppercaseComments => r"(//|/\*|///).*".to_string(),
            Policy::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn headline(self) -> &'static str {
        match self {
            Policy::UnderscorePrefix => "underscore-prefixed variables",
            Policy::ForbiddenWords | Policy::StarsInComments => "forbidden comment patterns",
            Policy::UppercaseComments => "comments with all uppercase alphabetic characters",
            Policy::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> String {
        match self {
            Policy::UnderscorePrefix => "\n⚠️ Underscore-prefixed variable names are not allowed in this project.\n   Either use the variable (removing the underscore) or remove it completely.\n".to_string(),
            Policy::ForbiddenWords => format!(
                "\n⚠️ Comments containing {} are STRICTLY FORBIDDEN in this project.\n   Describe what the code does, not its history.\n",
                FORBIDDEN_COMMENT_WORDS
                    .iter()
                    .map(|word| format!("'{word}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Policy::StarsInComments => "\n⚠️ The '**' pattern is not allowed in regular comments (but is allowed in doc comments).\n".to_string(),
            Policy::UppercaseComments => "\n⚠️ Comments where all alphabetic characters are uppercase are STRICTLY FORBIDDEN in this project.\n   STRONGLY CONSIDER deleting the comment completely.\n".to_string(),
            Policy::AllowDeadCode => "\n⚠️ #[allow(dead_code)] attributes are STRICTLY FORBIDDEN in this project.\n   Either use the code (removing the attribute) or remove it completely.\n".to_string(),
        }
    }

    // Policies that inspect comments do not apply to the build script itself.
    fn skips_build_script(self) -> bool {
        !matches!(self, Policy::UnderscorePrefix)
    }
}

// A custom "Sink" for the grep searcher. It collects every matching line of a
// single file that actually violates the policy being checked.
struct ViolationCollector {
    policy: Policy,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(policy: Policy, file_path: &Path) -> Self {
        Self {
            policy,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.policy.headline(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&self.policy.advice());
        Some(error_msg)
    }

    fn is_violation(&self, line_text: &str) -> bool {
        match self.policy {
            Policy::UnderscorePrefix => !is_comment_or_string_match(line_text),
            Policy::ForbiddenWords | Policy::AllowDeadCode => true,
            Policy::StarsInComments => !is_doc_comment(line_text),
            Policy::UppercaseComments => comment_text(line_text).is_some_and(|text| {
                let alpha_chars: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                !alpha_chars.is_empty() && alpha_chars.iter().all(|c| c.is_uppercase())
            }),
        }
    }
}

// The `matched` method is called by the searcher for every line that matches the regex.
impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if self.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }

        // Keep searching for more matches in the same file.
        Ok(true)
    }
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

// Underscore matches inside comments or string literals are not identifiers.
fn is_comment_or_string_match(line_text: &str) -> bool {
    if line_text.trim_start().starts_with("//") {
        return true;
    }
    line_text
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

// Extracts the text of a comment line without its `//`, `///` or `/* */` markers.
fn comment_text(line_text: &str) -> Option<&str> {
    let trimmed = line_text.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim());
    }
    let idx = line_text.find("/*")?;
    let body = &line_text[idx + 2..];
    Some(match body.find("*/") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    })
}

fn rust_sources() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("build.rs")];
    for root in SOURCE_ROOTS {
        files.extend(
            WalkDir::new(root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
                .map(|e| e.into_path()),
        );
    }
    files
}

fn scan(policy: Policy, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&policy.pattern())?;
    let mut searcher = Searcher::new();

    for path in files {
        if policy.skips_build_script() && path.file_name().is_some_and(|name| name == "build.rs") {
            continue;
        }
        let mut collector = ViolationCollector::new(policy, path);
        searcher.search_path(&matcher, path, &mut collector)?;

        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    // Always rerun this script if the build script itself changes.
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    let files = rust_sources();
    let policies = [
        Policy::UnderscorePrefix,
        Policy::ForbiddenWords,
        Policy::StarsInComments,
        Policy::UppercaseComments,
        Policy::AllowDeadCode,
    ];
    for policy in policies {
        if let Err(e) = scan(policy, &files) {
            // The `eprintln!` here is what shows the report in cargo's output.
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
