//! Build-block bundling for HTML pages.
//!
//! Markup can group assets between build comments:
//!
//! ```html
//! <!-- build:css css/combined.css -->
//! <link rel="stylesheet" href="css/normalize.css">
//! <link rel="stylesheet" href="css/main.css">
//! <!-- endbuild -->
//! ```
//!
//! Each `css` or `js` block is replaced by a single tag pointing at the
//! target, and the target is written with the referenced files concatenated
//! and minified. A `remove` block is dropped entirely. References starting
//! with `/` resolve against the output root, everything else against the
//! page's directory; external URLs are left out of the bundle.

use super::minify;
use crate::selector::SelectedFile;
use crate::stage::StageError;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const BLOCK_PATTERN: &str = r"(?s)<!--\s*build:(\w+)\s+(\S+?)\s*-->(.*?)<!--\s*endbuild\s*-->";
const STYLE_REF_PATTERN: &str = r#"<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#;
const SCRIPT_REF_PATTERN: &str = r#"<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Styles,
    Scripts,
    Remove,
}

impl BlockKind {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "css" => Some(Self::Styles),
            "js" => Some(Self::Scripts),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

struct Patterns {
    block: Regex,
    style_ref: Regex,
    script_ref: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            block: Regex::new(BLOCK_PATTERN)?,
            style_ref: Regex::new(STYLE_REF_PATTERN)?,
            script_ref: Regex::new(SCRIPT_REF_PATTERN)?,
        })
    }
}

/// Bundle the build blocks of every page. Returns the number of distinct
/// bundle files written.
pub fn bundle_files(files: &[SelectedFile], dist: &Path) -> Result<usize, StageError> {
    let patterns = Patterns::new()?;
    let mut written = BTreeSet::new();
    for file in files {
        let html = fs::read_to_string(&file.path)?;
        let page_dir = file.path.parent().unwrap_or(dist);
        let updated = bundle_page(&html, &file.path, page_dir, dist, &patterns, &mut written)?;
        if updated != html {
            fs::write(&file.path, updated)?;
        }
    }
    Ok(written.len())
}

fn bundle_page(
    html: &str,
    page: &Path,
    page_dir: &Path,
    dist: &Path,
    patterns: &Patterns,
    written: &mut BTreeSet<PathBuf>,
) -> Result<String, StageError> {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for caps in patterns.block.captures_iter(html) {
        let (Some(whole), Some(kind), Some(target), Some(body)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let Some(kind) = BlockKind::parse(kind.as_str()) else {
            tracing::warn!(
                page = %page.display(),
                kind = kind.as_str(),
                "unknown build block kind"
            );
            continue;
        };
        out.push_str(&html[last..whole.start()]);
        last = whole.end();

        let target = target.as_str();
        let replacement = match kind {
            BlockKind::Remove => String::new(),
            BlockKind::Styles => {
                let css = concat_refs(&patterns.style_ref, body.as_str(), page, page_dir, dist)?;
                write_bundle(&resolve(target, page_dir, dist), &minify::minify_css(&css), written)?;
                format!(r#"<link rel="stylesheet" href="{target}">"#)
            }
            BlockKind::Scripts => {
                let js = concat_refs(&patterns.script_ref, body.as_str(), page, page_dir, dist)?;
                write_bundle(&resolve(target, page_dir, dist), &minify::minify_js(&js), written)?;
                format!(r#"<script src="{target}"></script>"#)
            }
        };
        out.push_str(&replacement);
    }
    out.push_str(&html[last..]);
    Ok(out)
}

fn is_external(reference: &str) -> bool {
    reference.starts_with("//") || reference.contains("://") || reference.starts_with("data:")
}

/// Strip any query string or fragment, then resolve.
fn resolve(reference: &str, page_dir: &Path, dist: &Path) -> PathBuf {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    match path.strip_prefix('/') {
        Some(absolute) => dist.join(absolute),
        None => page_dir.join(path),
    }
}

fn concat_refs(
    pattern: &Regex,
    body: &str,
    page: &Path,
    page_dir: &Path,
    dist: &Path,
) -> Result<String, StageError> {
    let mut parts = Vec::new();
    for caps in pattern.captures_iter(body) {
        let Some(reference) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if is_external(reference) {
            tracing::warn!(
                page = %page.display(),
                reference,
                "external reference left out of bundle"
            );
            continue;
        }
        let path = resolve(reference, page_dir, dist);
        let content = fs::read_to_string(&path).map_err(|source| StageError::MissingReference {
            page: page.to_path_buf(),
            reference: reference.to_string(),
            source,
        })?;
        parts.push(content);
    }
    Ok(parts.join("\n"))
}

fn write_bundle(
    target: &Path,
    content: &str,
    written: &mut BTreeSet<PathBuf>,
) -> Result<(), StageError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, content)?;
    tracing::debug!(bundle = %target.display(), bytes = content.len(), "bundle written");
    written.insert(target.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let dist = tmp.path();
        fs::create_dir_all(dist.join("css")).unwrap();
        fs::create_dir_all(dist.join("js/vendor")).unwrap();
        fs::write(dist.join("css/normalize.css"), "html {\n  margin: 0;\n}\n").unwrap();
        fs::write(dist.join("css/main.css"), "/* app */\nbody {\n  color: red;\n}\n").unwrap();
        fs::write(dist.join("js/vendor/lib.js"), "// lib\nvar lib = 1;\n").unwrap();
        fs::write(dist.join("js/main.js"), "var main = lib + 1;\n").unwrap();
        tmp
    }

    fn pages(dist: &Path) -> Vec<SelectedFile> {
        Selector::new(dist, &["**/*.html"]).unwrap().select().unwrap()
    }

    #[test]
    fn css_and_js_blocks_become_single_tags() {
        let tmp = site();
        let dist = tmp.path();
        fs::write(
            dist.join("index.html"),
            concat!(
                "<head>\n",
                "  <!-- build:css css/combined.css -->\n",
                "  <link rel=\"stylesheet\" href=\"css/normalize.css\">\n",
                "  <link rel=\"stylesheet\" href=\"/css/main.css?v=2\">\n",
                "  <!-- endbuild -->\n",
                "</head>\n",
                "<body>\n",
                "  <!-- build:js js/app.js -->\n",
                "  <script src=\"js/vendor/lib.js\"></script>\n",
                "  <script src=\"https://cdn.example.com/x.js\"></script>\n",
                "  <script src=\"js/main.js\"></script>\n",
                "  <!-- endbuild -->\n",
                "</body>\n",
            ),
        )
        .unwrap();

        let count = bundle_files(&pages(dist), dist).unwrap();
        assert_eq!(count, 2);

        let html = fs::read_to_string(dist.join("index.html")).unwrap();
        assert_eq!(
            html,
            concat!(
                "<head>\n",
                "  <link rel=\"stylesheet\" href=\"css/combined.css\">\n",
                "</head>\n",
                "<body>\n",
                "  <script src=\"js/app.js\"></script>\n",
                "</body>\n",
            )
        );
        assert_eq!(
            fs::read_to_string(dist.join("css/combined.css")).unwrap(),
            "html{margin: 0}\nbody{color: red}"
        );
        assert_eq!(
            fs::read_to_string(dist.join("js/app.js")).unwrap(),
            "var lib = 1;\nvar main = lib + 1;"
        );
    }

    #[test]
    fn remove_blocks_are_dropped() {
        let tmp = site();
        let dist = tmp.path();
        fs::write(
            dist.join("index.html"),
            "<p>a</p><!-- build:remove x --><script src=\"js/dev.js\"></script><!-- endbuild --><p>b</p>",
        )
        .unwrap();
        assert_eq!(bundle_files(&pages(dist), dist).unwrap(), 0);
        assert_eq!(
            fs::read_to_string(dist.join("index.html")).unwrap(),
            "<p>a</p><p>b</p>"
        );
    }

    #[test]
    fn nested_pages_resolve_relative_to_their_directory() {
        let tmp = site();
        let dist = tmp.path();
        fs::create_dir_all(dist.join("docs")).unwrap();
        fs::write(
            dist.join("docs/page.html"),
            "<!-- build:js ../js/docs.js --><script src=\"../js/main.js\"></script><!-- endbuild -->",
        )
        .unwrap();
        bundle_files(&pages(dist), dist).unwrap();
        assert_eq!(
            fs::read_to_string(dist.join("js/docs.js")).unwrap(),
            "var main = lib + 1;"
        );
    }

    #[test]
    fn missing_reference_is_an_error() {
        let tmp = site();
        let dist = tmp.path();
        fs::write(
            dist.join("index.html"),
            "<!-- build:js js/app.js --><script src=\"js/nope.js\"></script><!-- endbuild -->",
        )
        .unwrap();
        let err = bundle_files(&pages(dist), dist).unwrap_err();
        match err {
            StageError::MissingReference { reference, .. } => assert_eq!(reference, "js/nope.js"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn pages_without_blocks_are_untouched() {
        let tmp = site();
        let dist = tmp.path();
        let html = "<html>\n<!-- build notes -->\n</html>\n";
        fs::write(dist.join("index.html"), html).unwrap();
        assert_eq!(bundle_files(&pages(dist), dist).unwrap(), 0);
        assert_eq!(fs::read_to_string(dist.join("index.html")).unwrap(), html);
    }
}
