//! Script linting.
//!
//! The build fails if any script reports a problem. The built-in
//! [`RuleLinter`] checks a small, configurable rule set line by line. Rules
//! that look at code (`no-debugger`, `eqeqeq`) run on a masked copy of the
//! source where comments and string literals are blanked out, so
//! `"a == b"` inside a string is not reported.

use crate::config::LintConfig;
use crate::selector::SelectedFile;
use crate::stage::StageError;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// One lint finding. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub line: usize,
    pub column: usize,
    pub rule: &'static str,
    pub message: String,
}

pub trait Linter: Sync {
    fn lint(&self, path: &Path, source: &str) -> Vec<Diagnostic>;
}

/// Render diagnostics one per line, `path:line:column  rule  message`.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| {
            format!(
                "  {}:{}:{}  {}  {}",
                d.path.display(),
                d.line,
                d.column,
                d.rule,
                d.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lint every file, in parallel. Diagnostics come back in file order.
pub fn lint_files(
    linter: &dyn Linter,
    files: &[SelectedFile],
) -> Result<Vec<Diagnostic>, StageError> {
    let per_file: Vec<Result<Vec<Diagnostic>, StageError>> = files
        .par_iter()
        .map(|file| {
            let source = fs::read_to_string(&file.path)?;
            Ok(linter.lint(&file.path, &source))
        })
        .collect();

    let mut all = Vec::new();
    for result in per_file {
        all.extend(result?);
    }
    Ok(all)
}

pub struct RuleLinter {
    config: LintConfig,
    debugger: Regex,
}

impl RuleLinter {
    pub fn new(config: LintConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            config,
            debugger: Regex::new(r"\bdebugger\b")?,
        })
    }
}

impl Linter for RuleLinter {
    fn lint(&self, path: &Path, source: &str) -> Vec<Diagnostic> {
        let masked = mask_code(source);
        let mut found = Vec::new();
        let mut report = |line: usize, column: usize, rule: &'static str, message: String| {
            found.push(Diagnostic {
                path: path.to_path_buf(),
                line,
                column,
                rule,
                message,
            })
        };

        for (idx, (raw, code)) in source.split('\n').zip(masked.split('\n')).enumerate() {
            let line = idx + 1;
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let code = code.strip_suffix('\r').unwrap_or(code);

            if self.config.trailing_whitespace && raw.ends_with([' ', '\t']) {
                let column = raw.trim_end_matches([' ', '\t']).chars().count() + 1;
                report(line, column, "no-trailing-spaces", "Trailing whitespace".into());
            }
            if let Some(max) = self.config.max_line_length {
                let len = raw.chars().count();
                if len > max {
                    report(
                        line,
                        max + 1,
                        "max-len",
                        format!("Line is {len} characters long (maximum {max})"),
                    );
                }
            }
            if self.config.no_debugger {
                for m in self.debugger.find_iter(code) {
                    let column = code[..m.start()].chars().count() + 1;
                    report(line, column, "no-debugger", "Unexpected 'debugger' statement".into());
                }
            }
            if self.config.eqeqeq {
                for (column, op) in loose_equality(code) {
                    report(
                        line,
                        column,
                        "eqeqeq",
                        format!("Expected '{op}=' and instead saw '{op}'"),
                    );
                }
            }
        }
        found
    }
}

/// Columns (1-based) and operators of every `==` / `!=` that is not part of
/// `===` / `!==`.
fn loose_equality(code: &str) -> Vec<(usize, &'static str)> {
    let chars: Vec<char> = code.chars().collect();
    let at = |i: usize| chars.get(i).copied();
    let mut hits = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let op = match (chars[i], at(i + 1)) {
            ('=', Some('=')) => "==",
            ('!', Some('=')) => "!=",
            _ => {
                i += 1;
                continue;
            }
        };
        if at(i + 2) == Some('=') {
            i += 3;
            continue;
        }
        let prev = if i > 0 { at(i - 1) } else { None };
        if !matches!(prev, Some('<' | '>' | '=' | '!')) {
            hits.push((i + 1, op));
        }
        i += 2;
    }
    hits
}

#[derive(Clone, Copy, PartialEq)]
enum Scan {
    Code,
    LineComment,
    BlockComment,
    Str(char),
}

/// Blank out comments and string contents, keeping quotes, newlines and the
/// character count of every line.
fn mask_code(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = Scan::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Scan::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = Scan::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = Scan::BlockComment;
                }
                '"' | '\'' | '`' => {
                    out.push(c);
                    state = Scan::Str(c);
                }
                _ => out.push(c),
            },
            Scan::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = Scan::Code;
                } else {
                    out.push(' ');
                }
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = Scan::Code;
                } else {
                    out.push(if c == '\n' { '\n' } else { ' ' });
                }
            }
            Scan::Str(quote) => {
                if c == '\\' {
                    out.push(' ');
                    if let Some(escaped) = chars.next() {
                        out.push(if escaped == '\n' { '\n' } else { ' ' });
                    }
                } else if c == quote {
                    out.push(c);
                    state = Scan::Code;
                } else if c == '\n' {
                    out.push('\n');
                    // Unterminated single-line string.
                    if quote != '`' {
                        state = Scan::Code;
                    }
                } else {
                    out.push(' ');
                }
            }
        }
    }
    out
}
