//! HTML renderer for Markdown, source code and binary files.

use std::collections::HashMap;
use std::path::Path;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};

use super::highlight::highlight;
use super::{RenderError, Renderer};

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8000;

/// Source files are cut off after this many lines.
const MAX_CODE_LINES: usize = 1000;

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkd"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"];

const TRUNCATED_NOTICE: &str = concat!(
    r#"<div class="truncated">"#,
    "Showing first 1000 lines. File has more content.",
    "</div>"
);

/// Default renderer used by the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render already-loaded bytes as if they came from `path`.
    pub fn render_bytes(&self, path: &Path, content: &[u8]) -> String {
        if is_binary(content) {
            return binary_placeholder(path);
        }

        // is_binary rejected invalid UTF-8 in the sniffed prefix only
        let text = String::from_utf8_lossy(content);
        if is_markdown(path) {
            render_markdown(&text)
        } else {
            render_code(path, &text)
        }
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, path: &Path) -> Result<String, RenderError> {
        let metadata = std::fs::metadata(path).map_err(|source| RenderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(RenderError::NotAFile {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read(path).map_err(|source| RenderError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(self.render_bytes(path, &content))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_markdown(path: &Path) -> bool {
    extension(path).is_some_and(|ext| MARKDOWN_EXTENSIONS.contains(&ext.as_str()))
}

/// NUL bytes or invalid UTF-8 in the first 8000 bytes.
fn is_binary(content: &[u8]) -> bool {
    let sample = &content[..content.len().min(BINARY_SNIFF_LEN)];
    if sample.contains(&0) {
        return true;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => false,
        // A multi-byte sequence cut at the sniff boundary is still text
        Err(e) => e.error_len().is_some() || sample.len() == content.len(),
    }
}

fn binary_placeholder(path: &Path) -> String {
    let name = escape_html(&file_name(path));
    let is_image = extension(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));

    if is_image {
        format!(
            r#"<div class="binary"><p>Image file: {name}</p><p class="hint">Image preview not supported</p></div>"#
        )
    } else {
        format!(
            r#"<div class="binary"><p>Binary file: {name}</p><p class="hint">Cannot display binary content</p></div>"#
        )
    }
}

fn render_markdown(text: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;

    let mut events: Vec<Event> = Parser::new_ext(text, options)
        .map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        })
        .collect();
    assign_heading_ids(&mut events);
    let events = highlight_fences(events);

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// Replace fenced code blocks in a known language with highlighted HTML.
/// Unknown languages keep the plain `<pre><code>` rendering.
fn highlight_fences(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out = Vec::with_capacity(events.len());
    let mut events = events.into_iter();

    while let Some(event) = events.next() {
        let lang = match &event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => fence_language(info),
            _ => None,
        };
        let Some(lang) = lang else {
            out.push(event);
            continue;
        };

        let mut block = vec![event];
        let mut code = String::new();
        for inner in events.by_ref() {
            let end = matches!(inner, Event::End(TagEnd::CodeBlock));
            if let Event::Text(text) = &inner {
                code.push_str(text);
            }
            block.push(inner);
            if end {
                break;
            }
        }

        match highlight(&code, &[lang.as_str()]) {
            Some(html) => out.push(Event::Html(CowStr::from(html))),
            None => out.extend(block),
        }
    }
    out
}

/// First word of a fence info string: `rust,ignore` and `rust {x}` give `rust`.
fn fence_language(info: &str) -> Option<String> {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
}

/// Give every heading without an explicit id a slug of its text.
/// Repeated slugs get `-1`, `-2`, ... suffixes.
fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut seen: HashMap<String, usize> = HashMap::new();

    let mut i = 0;
    while i < events.len() {
        let needs_id = matches!(&events[i], Event::Start(Tag::Heading { id: None, .. }));
        if !needs_id {
            i += 1;
            continue;
        }

        let mut text = String::new();
        let mut j = i + 1;
        while j < events.len() {
            match &events[j] {
                Event::End(TagEnd::Heading(_)) => break,
                Event::Text(t) | Event::Code(t) => text.push_str(t),
                _ => {}
            }
            j += 1;
        }

        let base = slugify(&text);
        let slug = match seen.get_mut(&base) {
            Some(count) => {
                *count += 1;
                format!("{base}-{count}")
            }
            None => {
                seen.insert(base.clone(), 0);
                base
            }
        };

        if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
            *id = Some(CowStr::from(slug));
        }
        i = j;
    }
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() || ch == '_' {
            slug.extend(ch.to_lowercase());
        } else if (ch.is_whitespace() || ch == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "heading".to_string()
    } else {
        slug.to_string()
    }
}

fn render_code(path: &Path, text: &str) -> String {
    let mut lines = text.split('\n');
    let shown: Vec<&str> = lines.by_ref().take(MAX_CODE_LINES).collect();
    let truncated = lines.next().is_some();

    let code = shown.join("\n");
    let lang = language_for(path);
    let ext = extension(path);
    let tokens: Vec<&str> = lang.into_iter().chain(ext.as_deref()).collect();

    let mut out = match highlight(&code, &tokens) {
        Some(html) => html,
        None => plain_code(lang, &code),
    };
    if truncated {
        out.push_str(TRUNCATED_NOTICE);
    }
    out
}

fn plain_code(lang: Option<&str>, code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 64);
    match lang {
        Some(lang) => out.push_str(&format!(r#"<pre><code class="language-{lang}">"#)),
        None => out.push_str("<pre><code>"),
    }
    out.push_str(&escape_html(code));
    out.push_str("</code></pre>");
    out
}

/// Language of a file, by well-known file name then extension.
fn language_for(path: &Path) -> Option<&'static str> {
    let name = file_name(path).to_ascii_lowercase();
    let by_name = match name.as_str() {
        "makefile" | "gnumakefile" => Some("makefile"),
        "dockerfile" | ".dockerignore" => Some("dockerfile"),
        ".gitignore" | ".gitattributes" | ".gitmodules" => Some("gitignore"),
        ".editorconfig" => Some("ini"),
        ".env" | ".bashrc" | ".zshrc" | ".bash_profile" => Some("bash"),
        "cmakelists.txt" => Some("cmake"),
        "go.mod" | "go.sum" => Some("go"),
        "cargo.lock" => Some("toml"),
        "gemfile" | "rakefile" | "vagrantfile" => Some("ruby"),
        "jenkinsfile" => Some("groovy"),
        _ => None,
    };
    if by_name.is_some() {
        return by_name;
    }

    let lang = match extension(path)?.as_str() {
        "rs" => "rust",
        "go" => "go",
        "py" => "python",
        "rb" => "ruby",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" | "razor" => "csharp",
        "fs" => "fsharp",
        "swift" => "swift",
        "php" => "php",
        "lua" => "lua",
        "pl" | "pm" => "perl",
        "r" => "r",
        "ex" | "exs" => "elixir",
        "erl" | "hrl" => "erlang",
        "hs" => "haskell",
        "ml" | "mli" => "ocaml",
        "clj" => "clojure",
        "sh" | "bash" | "zsh" => "bash",
        "fish" => "fish",
        "ps1" | "psm1" => "powershell",
        "bat" | "cmd" => "batch",
        "html" | "htm" => "html",
        "xml" | "svg" => "xml",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "ini" => "ini",
        "sql" => "sql",
        "tf" | "hcl" => "hcl",
        "nix" => "nix",
        "vue" => "vue",
        "svelte" => "svelte",
        "vim" => "vim",
        _ => return None,
    };
    Some(lang)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
