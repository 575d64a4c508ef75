//! Conservative text minifiers for markup, stylesheets, scripts and SVG.
//!
//! None of these parse their language fully. They only remove what is safe
//! to remove without understanding the document: comments and redundant
//! whitespace. String literals, `<pre>`/`<textarea>`/`<script>`/`<style>`
//! contents, IE conditional comments and `/*! ... */` license comments are
//! always preserved. Scripts keep their line breaks so automatic semicolon
//! insertion is unaffected.

const PROTECTED_TAGS: [&str; 4] = ["pre", "textarea", "script", "style"];

/// Elements whose surrounding whitespace never renders.
const BLOCK_TAGS: [&str; 52] = [
    "!doctype", "address", "article", "aside", "base", "blockquote", "body", "caption", "col",
    "colgroup", "dd", "details", "div", "dl", "dt", "fieldset", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hr", "html",
    "legend", "li", "link", "main", "meta", "nav", "noscript", "ol", "p", "pre", "script",
    "section", "style", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title",
    "tr",
];

fn starts_with_ci(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Tag name if `rest` opens one of the protected elements.
fn protected_tag(rest: &str) -> Option<&'static str> {
    PROTECTED_TAGS.into_iter().find(|tag| {
        rest.starts_with('<')
            && starts_with_ci(&rest[1..], tag)
            && rest[1 + tag.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace())
    })
}

/// Lowercased name of the tag `rest` starts with (`</p>` gives `p`), or
/// `None` if `rest` does not start a tag.
fn tag_name(rest: &str) -> Option<String> {
    let inner = rest.strip_prefix('<')?;
    let inner = inner.strip_prefix('/').unwrap_or(inner);
    if !inner.starts_with(|c: char| c.is_ascii_alphabetic() || c == '!') {
        return None;
    }
    let name: String = inner
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '!' || *c == '-')
        .collect();
    Some(name.to_ascii_lowercase())
}

fn is_block_boundary(rest: &str) -> bool {
    rest.starts_with("<!--[if")
        || rest.starts_with("<![endif]")
        || tag_name(rest).is_some_and(|name| BLOCK_TAGS.contains(&name.as_str()))
}

/// Byte length of the element starting at `rest`, up to and including its
/// closing tag (or the rest of the input if it is never closed).
fn element_len(rest: &str, tag: &str) -> usize {
    let lower = rest.to_ascii_lowercase();
    let close = format!("</{tag}");
    match lower.find(&close) {
        Some(at) => match rest[at..].find('>') {
            Some(gt) => at + gt + 1,
            None => rest.len(),
        },
        None => rest.len(),
    }
}

fn comment_len(rest: &str) -> usize {
    rest.find("-->").map(|e| e + 3).unwrap_or(rest.len())
}

/// Copy the tag starting at `rest` into `out` and return its byte length.
///
/// Whitespace between attributes collapses to one space; quoted attribute
/// values are copied as they are.
fn copy_tag(rest: &str, out: &mut String) -> usize {
    let mut quote = None;
    let mut pending_space = false;
    for (i, c) in rest.char_indices() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space && c != '>' && !rest[i..].starts_with("/>") {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
                match c {
                    '"' | '\'' => quote = Some(c),
                    '>' => return i + 1,
                    _ => {}
                }
            }
        }
    }
    rest.len()
}

/// Minify an HTML document.
///
/// Comments are removed (conditional comments kept) and every whitespace
/// run becomes a single space. A run is dropped entirely only at the ends of
/// the document or when it touches a block-level tag, so inline elements
/// keep their separation. Attribute values are never touched.
pub fn minify_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    // Whether `out` ends in a block-level tag.
    let mut after_block = true;
    let mut pending_space = false;
    let mut i = 0;
    while i < html.len() {
        let rest = &html[i..];
        if rest.starts_with("<!--") && !rest.starts_with("<!--[if") {
            i += comment_len(rest);
            continue;
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        if c.is_whitespace() {
            pending_space = true;
            i += c.len_utf8();
            continue;
        }
        let block = is_block_boundary(rest);
        if pending_space && !after_block && !block {
            out.push(' ');
        }
        pending_space = false;

        if rest.starts_with("<!--[if") {
            const END: &str = "<![endif]-->";
            let len = rest.find(END).map(|e| e + END.len()).unwrap_or(rest.len());
            out.push_str(&rest[..len]);
            i += len;
            after_block = true;
        } else if let Some(tag) = protected_tag(rest) {
            let len = element_len(rest, tag);
            out.push_str(&rest[..len]);
            i += len;
            after_block = block;
        } else if tag_name(rest).is_some() {
            i += copy_tag(rest, &mut out);
            after_block = block;
        } else {
            out.push(c);
            i += c.len_utf8();
            after_block = false;
        }
    }
    out
}

/// Length of a quoted literal starting at `rest` (which begins with the quote).
fn string_len(rest: &str) -> usize {
    let mut chars = rest.char_indices();
    let Some((_, quote)) = chars.next() else {
        return 0;
    };
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return i + c.len_utf8();
        } else if c == '\n' && quote != '`' {
            return i;
        }
    }
    rest.len()
}

/// Minify a stylesheet, keeping a line break after every rule.
pub fn minify_css(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pending_space = false;
    let mut i = 0;
    while i < css.len() {
        let rest = &css[i..];
        if rest.starts_with("/*") {
            let len = rest[2..].find("*/").map(|e| e + 4).unwrap_or(rest.len());
            if rest.starts_with("/*!") {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&rest[..len]);
                out.push('\n');
                pending_space = false;
            }
            i += len;
            continue;
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        match c {
            '"' | '\'' => {
                if pending_space && needs_space(&out) {
                    out.push(' ');
                }
                pending_space = false;
                let len = string_len(rest);
                out.push_str(&rest[..len]);
                i += len;
                continue;
            }
            c if c.is_whitespace() => pending_space = true,
            '{' | '}' | ';' | ',' | '>' => {
                if c == '}' && out.ends_with(';') {
                    out.pop();
                }
                out.push(c);
                if c == '}' {
                    out.push('\n');
                }
                pending_space = false;
            }
            _ => {
                if pending_space && needs_space(&out) {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
        i += c.len_utf8();
    }
    out.trim_end().to_string()
}

fn needs_space(out: &str) -> bool {
    !out.is_empty() && !out.ends_with(['{', '}', ';', ',', '>', '\n'])
}

/// Whether a `/` at this point starts a regular expression literal.
fn regex_allowed(out: &str) -> bool {
    let prev = out.trim_end_matches([' ', '\t']);
    if let Some(before) = prev.strip_suffix("++").or_else(|| prev.strip_suffix("--")) {
        // Postfix increment: what follows is an operator.
        let operand = before.trim_end_matches([' ', '\t']).chars().next_back();
        return !operand.is_some_and(|c| c.is_alphanumeric() || "_$)]".contains(c));
    }
    match prev.chars().next_back() {
        None | Some('\n') => true,
        Some(c) => {
            "(,=:[!&|?{};+-*%<>~^".contains(c)
                || prev.ends_with("return")
                || prev.ends_with("typeof")
        }
    }
}

/// Length of a regex literal starting at `rest` (which begins with `/`).
fn regex_len(rest: &str) -> usize {
    let mut escaped = false;
    let mut in_class = false;
    for (i, c) in rest.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return i + 1,
            '\n' => return i,
            _ => {}
        }
    }
    rest.len()
}

/// Minify a script: drop comments and blank lines, trim every line, and
/// collapse runs of spaces. Line breaks are kept.
pub fn minify_js(js: &str) -> String {
    let mut out = String::with_capacity(js.len());
    let mut i = 0;
    while i < js.len() {
        let rest = &js[i..];
        if rest.starts_with("//") {
            i += rest.find('\n').unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("/*") {
            let len = rest[2..].find("*/").map(|e| e + 4).unwrap_or(rest.len());
            if rest.starts_with("/*!") {
                out.push_str(&rest[..len]);
            }
            i += len;
            continue;
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        let len = match c {
            '"' | '\'' | '`' => {
                let len = string_len(rest);
                out.push_str(&rest[..len]);
                len
            }
            '/' if regex_allowed(&out) => {
                let len = regex_len(rest);
                out.push_str(&rest[..len]);
                len
            }
            '\n' | '\r' => {
                let trimmed = out.trim_end_matches([' ', '\t']).len();
                out.truncate(trimmed);
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                1
            }
            ' ' | '\t' => {
                if !out.is_empty() && !out.ends_with(['\n', ' ']) {
                    out.push(' ');
                }
                1
            }
            _ => {
                out.push(c);
                c.len_utf8()
            }
        };
        i += len;
    }
    out.trim_end().to_string()
}

/// Minify SVG markup: comments and inter-tag whitespace are removed.
///
/// Inside `<text>` elements whitespace is collapsed to one space instead,
/// and attribute values are copied as they are.
pub fn minify_svg(svg: &str) -> String {
    let mut out = String::with_capacity(svg.len());
    let mut text_depth = 0usize;
    let mut i = 0;
    while i < svg.len() {
        let rest = &svg[i..];
        if rest.starts_with("<!--") {
            i += comment_len(rest);
            continue;
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        if c.is_whitespace() {
            let run_len = rest.len() - rest.trim_start().len();
            let next = rest[run_len..].chars().next();
            let between_tags = (out.is_empty() || out.ends_with('>'))
                && (next.is_none() || next == Some('<'));
            if text_depth > 0 || !between_tags {
                out.push(' ');
            }
            i += run_len;
            continue;
        }
        if let Some(name) = tag_name(rest) {
            let start = out.len();
            i += copy_tag(rest, &mut out);
            if name == "text" {
                if rest.starts_with("</") {
                    text_depth = text_depth.saturating_sub(1);
                } else if !out[start..].ends_with("/>") {
                    text_depth += 1;
                }
            }
            continue;
        }
        out.push(c);
        i += c.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_drops_comments_and_inter_tag_whitespace() {
        let html = "<!doctype html>\n<html>\n  <head>\n    <!-- meta -->\n    <title>Hi   there</title>\n  </head>\n  <body><p>Hello,\n    world <b>!</b></p></body>\n</html>\n";
        assert_eq!(
            minify_markup(html),
            "<!doctype html><html><head><title>Hi there</title></head><body><p>Hello, world <b>!</b></p></body></html>"
        );
    }

    #[test]
    fn markup_keeps_protected_regions() {
        let html = "<div>\n  <pre>  a\n   b </pre>\n  <script>\n  var a = 1;  // x\n</script>\n  <!--[if lt IE 9]>\n  <p>old</p>\n<![endif]-->\n</div>";
        assert_eq!(
            minify_markup(html),
            "<div><pre>  a\n   b </pre><script>\n  var a = 1;  // x\n</script><!--[if lt IE 9]>\n  <p>old</p>\n<![endif]--></div>"
        );
    }

    #[test]
    fn markup_is_stable() {
        let html = "<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>\n";
        let once = minify_markup(html);
        assert_eq!(minify_markup(&once), once);
    }

    #[test]
    fn markup_keeps_space_between_inline_elements() {
        assert_eq!(
            minify_markup("<p><a href=\"a\">one</a>\n<a href=\"b\">two</a></p>"),
            "<p><a href=\"a\">one</a> <a href=\"b\">two</a></p>"
        );
        assert_eq!(
            minify_markup("<p>\n  <em>x</em>\n  <strong>y</strong>\n</p>"),
            "<p><em>x</em> <strong>y</strong></p>"
        );
    }

    #[test]
    fn markup_copies_attribute_values_verbatim() {
        assert_eq!(
            minify_markup("<input   value=\"a   b\"\n  ><span title=\"x\n  y\" data-k='p  q'>t</span>"),
            "<input value=\"a   b\"><span title=\"x\n  y\" data-k='p  q'>t</span>"
        );
    }

    #[test]
    fn css_keeps_breaks_and_special_comments() {
        let css = "/*! v1 | MIT */\n/* normal */\nbody {\n  color : red;\n  margin: 0 auto;\n}\n\na > b, i {\n  content: \"a  ;  b\";\n}\n";
        assert_eq!(
            minify_css(css),
            "/*! v1 | MIT */\nbody{color : red;margin: 0 auto}\na>b,i{content: \"a  ;  b\"}"
        );
    }

    #[test]
    fn js_removes_comments_keeps_strings_and_regexes() {
        let js = "/*! lib v2 */\n// setup\nvar url = \"http://example.com\";   // trailing\n\n\nvar re = /\\/\\/+/g;\n  var half = total / 2 / count;\n/* gone */function f() {\n    return 1;\n}\n";
        assert_eq!(
            minify_js(js),
            "/*! lib v2 */\nvar url = \"http://example.com\";\nvar re = /\\/\\/+/g;\nvar half = total / 2 / count;\nfunction f() {\nreturn 1;\n}"
        );
    }

    #[test]
    fn js_division_after_postfix_increment() {
        let js = "n = i++ / \"/\"; s = \"http://q\";\nm = (a)-- / 2; // gone\n";
        assert_eq!(
            minify_js(js),
            "n = i++ / \"/\"; s = \"http://q\";\nm = (a)-- / 2;"
        );
        assert!(regex_allowed("x = "));
        assert!(!regex_allowed("i++ "));
        assert!(!regex_allowed("arr[0]--"));
    }

    #[test]
    fn svg_keeps_text_spacing_and_attributes() {
        let svg = "<svg>\n  <text x=\"0\">\n    <tspan>Hello</tspan>\n    <tspan>world</tspan>\n  </text>\n  <title>a  b</title>\n</svg>";
        assert_eq!(
            minify_svg(svg),
            "<svg><text x=\"0\"> <tspan>Hello</tspan> <tspan>world</tspan> </text><title>a b</title></svg>"
        );
    }

    #[test]
    fn svg_strips_comments_and_whitespace() {
        let svg = "<svg viewBox=\"0 0 1 1\">\n  <!-- icon -->\n  <path d=\"M0 0 L1 1\"/>\n</svg>\n";
        assert_eq!(
            minify_svg(svg),
            "<svg viewBox=\"0 0 1 1\"><path d=\"M0 0 L1 1\"/></svg>"
        );
    }
}
