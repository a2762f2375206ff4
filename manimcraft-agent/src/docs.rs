//! Documentation lookup
//!
//! A `DocStore` indexes a directory of cached documentation pages. The first
//! line of every page file is the URL the page was fetched from; everything
//! after it is the page HTML. The oracle reaches the store through the
//! `get_specific_documentation_info` tool and gets back the page's text.

use manimcraft_error::{Error, ErrorKind, Result};
use manimcraft_llm::{ToolCall, ToolDefinition};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the lookup tool as the oracle sees it
pub const LOOKUP_TOOL: &str = "get_specific_documentation_info";

/// Elements whose text never reaches the oracle
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "video"];

/// One piece of a documentation page, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Image(Option<String>),
    Video(Option<String>),
}

/// Cached documentation pages keyed by URL
#[derive(Debug, Clone)]
pub struct DocStore {
    pages: BTreeMap<String, PathBuf>,
}

impl DocStore {
    /// Index every page file in `dir`.
    ///
    /// Files are visited in file-name order, so when two files claim the same
    /// URL the lexicographically first one wins.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::file_not_found(root.display().to_string())
                .with_operation("DocStore::open"));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut pages: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in files {
            let Some(key) = read_key(&path)? else {
                warn!(path = %path.display(), "skipping documentation page without a url line");
                continue;
            };
            if let Some(existing) = pages.get(&key) {
                warn!(
                    url = %key,
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "duplicate documentation url"
                );
                continue;
            }
            pages.insert(key, path);
        }

        debug!(root = %root.display(), pages = pages.len(), "indexed documentation store");
        Ok(Self { pages })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pages.contains_key(key)
    }

    /// `(url, page file)` pairs sorted by url
    pub fn pages(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.pages.iter().map(|(k, p)| (k.as_str(), p.as_path()))
    }

    /// Ordered text and media segments of the page stored under `key`
    pub fn segments(&self, key: &str) -> Result<Vec<Segment>> {
        let path = self.pages.get(key).ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument, format!("no documentation page for {}", key))
                .with_operation("DocStore::segments")
        })?;

        let raw = fs::read(path).map_err(|e| {
            Error::from(e)
                .with_operation("DocStore::segments")
                .with_context("path", path.display().to_string())
        })?;
        let raw = String::from_utf8_lossy(&raw);
        let html = raw.split_once('\n').map_or("", |(_, body)| body);

        Ok(extract_segments(html))
    }

    /// Serve one lookup.
    ///
    /// Never fails: unknown keys and unreadable pages come back as text the
    /// oracle can act on.
    pub fn lookup(&self, key: &str) -> String {
        if !self.contains(key) {
            debug!(url = %key, "documentation lookup miss");
            return not_found(key);
        }

        match self.segments(key) {
            Ok(segments) => {
                let payload = text_payload(&segments);
                debug!(url = %key, segments = segments.len(), bytes = payload.len(), "documentation lookup");
                payload
            }
            Err(e) => {
                warn!(url = %key, error = %e, "documentation page unreadable");
                format!("Documentation page for {} could not be read: {}", key, e.message())
            }
        }
    }

    /// Answer a tool call from the oracle
    pub fn serve(&self, call: &ToolCall) -> String {
        if call.name != LOOKUP_TOOL {
            return format!(
                "Unknown tool '{}'. The only available tool is '{}'.",
                call.name, LOOKUP_TOOL
            );
        }

        match call.parse_arguments::<LookupArgs>() {
            Ok(args) => self.lookup(args.url.trim()),
            Err(_) => format!(
                "Invalid arguments for '{}'. Provide a JSON object with a string 'url' field.",
                LOOKUP_TOOL
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupArgs {
    url: String,
}

fn read_key(path: &Path) -> Result<Option<String>> {
    let file = fs::File::open(path)?;
    let mut first = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut first)?;
    let key = String::from_utf8_lossy(&first).trim().to_string();
    Ok((!key.is_empty()).then_some(key))
}

fn not_found(key: &str) -> String {
    format!("Provided url {} does not exist. Please provide an existing one.", key)
}

/// The tool definition advertised to the oracle
pub fn tool_definition() -> ToolDefinition {
    ToolDefinition::new(LOOKUP_TOOL, "Gets specific documentation info from provided url").with_parameters(
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL whose documentation info you want returned."
                }
            },
            "required": ["url"]
        }),
    )
}

/// Split page HTML into text runs and media placeholders.
///
/// Text between two media elements becomes one run; runs are trimmed and
/// empty ones dropped.
pub fn extract_segments(html: &str) -> Vec<Segment> {
    let document = Html::parse_document(html);
    let source = Selector::parse("source").ok();

    let mut segments = Vec::new();
    let mut run = String::new();

    for node in document.tree.root().descendants() {
        match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
                });
                if !hidden {
                    run.push_str(text);
                }
            }
            Node::Element(el) if el.name() == "img" => {
                flush(&mut run, &mut segments);
                let src = el.attr("src").or_else(|| el.attr("data-src"));
                segments.push(Segment::Image(src.map(str::to_string)));
            }
            Node::Element(el) if el.name() == "video" => {
                flush(&mut run, &mut segments);
                let src = el.attr("src").map(str::to_string).or_else(|| {
                    let sel = source.as_ref()?;
                    ElementRef::wrap(node)?
                        .select(sel)
                        .next()
                        .and_then(|s| s.value().attr("src"))
                        .map(str::to_string)
                });
                segments.push(Segment::Video(src));
            }
            _ => {}
        }
    }
    flush(&mut run, &mut segments);

    segments
}

fn flush(run: &mut String, segments: &mut Vec<Segment>) {
    let text = run.trim();
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
    run.clear();
}

#[derive(Serialize)]
struct Payload<'a> {
    role: &'static str,
    content: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// A user message holding the text segments only, serialized as JSON
pub fn text_payload(segments: &[Segment]) -> String {
    let payload = Payload {
        role: "user",
        content: segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(text) => Some(TextPart { kind: "text", text }),
                _ => None,
            })
            .collect(),
    };
    serde_json::to_string(&payload).unwrap_or_else(|e| format!("failed to encode documentation: {}", e))
}
