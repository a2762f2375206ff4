//! System prompt and task message assembly

use crate::docs::{DocStore, LOOKUP_TOOL};
use manimcraft_error::{Error, Result};
use manimcraft_llm::ImageAttachment;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Class the generated program must define
pub const ENTRY_POINT: &str = "FullTutorial";

const ROLE: &str = "\
You are an expert at Manim, the Python library that renders animated videos, and you write \
educational video tutorials with it. You receive textbook material on some topic and turn it into \
a tutorial that makes the technical parts intuitive, with sections that visualize the mathematical \
ideas and add explanatory text where it helps. Use the voiceover feature when narration helps, and \
explore the documentation: accuracy matters more than anything else.

Start by understanding the topic. If there are several, cover the first one and then move through \
the rest. Follow how the material presents its ideas and equations, split long material into \
sections and handle them one at a time, and pitch everything so a beginner can follow.

Go into depth on each topic: aim for a video of at least a minute that explains the idea, works \
through an example and ends with a summary. Put the whole tutorial in a single scene class called \
FullTutorial. Any equation must be written in LaTeX that compiles, using only safe characters and \
formatting. Prefer graphs, diagrams and plots over bullet points. The program must run as is and \
produce the video without errors. All text has to fit on screen without overlapping. A few example \
inputs and outputs follow.";

/// Where the prompt's static material lives
#[derive(Debug, Clone)]
pub struct PromptSources {
    /// Worked examples: `<name>.in.<ext>` paired with `<name>.out.<ext>`
    pub examples_dir: PathBuf,
    /// `<page>.txt` summary for each `<page>.html` in the doc store
    pub summaries_dir: PathBuf,
    /// Appended verbatim at the end of the prompt
    pub supplement_file: PathBuf,
}

/// One worked input/output example
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamplePair {
    pub input: String,
    pub output: String,
}

/// Load every example pair from `dir`, sorted by input file name
pub fn load_examples(dir: &Path) -> Result<Vec<ExamplePair>> {
    if !dir.is_dir() {
        return Err(Error::file_not_found(dir.display().to_string()).with_operation("prompt::load_examples"));
    }

    let mut inputs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_input = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(".in."));
        if path.is_file() && is_input {
            inputs.push(path);
        }
    }
    inputs.sort();

    inputs
        .into_iter()
        .map(|input_path| -> Result<ExamplePair> {
            let name = input_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let output_path = input_path.with_file_name(name.replacen(".in.", ".out.", 1));
            Ok(ExamplePair {
                input: read_required(&input_path)?,
                output: read_required(&output_path)?,
            })
        })
        .collect()
}

fn read_required(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::file_not_found(path.display().to_string()).with_operation("prompt::read"));
    }
    fs::read_to_string(path)
        .map_err(|e| Error::from(e).with_context("path", path.display().to_string()))
}

/// Summary file for a documentation page: same stem, `.txt` extension
fn summary_path(summaries_dir: &Path, page: &Path) -> PathBuf {
    let stem = page.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    summaries_dir.join(format!("{}.txt", stem))
}

/// Assemble the system prompt.
///
/// Sections in order: role instructions, worked examples, the documentation
/// index (one url and summary per page, sorted by url), then the
/// supplementary text. Any missing input file is an error.
pub fn build_system_prompt(docs: &DocStore, sources: &PromptSources) -> Result<String> {
    let examples = load_examples(&sources.examples_dir)?;

    let mut prompt = String::from(ROLE);

    prompt.push_str("\n\n===\nBelow are a few examples\n\n");
    for pair in &examples {
        let _ = write!(prompt, "Input:\n{}\n\nOutput:\n{}\n\n", pair.input, pair.output);
    }

    let _ = write!(
        prompt,
        "\n===\nYou have access to the full Manim documentation. Below is every documentation page \
         link followed by a summary of that page. To read the full details of a page, call the \
         `{}` function with its url. Do not hesitate to do so: accuracy is the highest priority.\n\n",
        LOOKUP_TOOL
    );
    for (url, page) in docs.pages() {
        let summary = read_required(&summary_path(&sources.summaries_dir, page))?;
        let _ = write!(prompt, "{}\n{}\n\n", url, summary);
    }

    prompt.push_str(
        "\n\nThe voiceover documentation is separate and included in full below, \
         so there is no need to look it up.\n\n",
    );
    prompt.push_str(&read_required(&sources.supplement_file)?);

    debug!(
        examples = examples.len(),
        pages = docs.len(),
        chars = prompt.len(),
        "assembled system prompt"
    );
    Ok(prompt)
}

/// First user turn: the topic followed by the fixed instruction list
pub fn task_message(topic: &str) -> String {
    format!(
        r#"{topic}

Instructions:
1) Create manim code for a video that facilitates understanding. Name the single overarching scene class "{ENTRY_POINT}".
2) Use voiceover if you think it will help.
3) Include plenty of visuals to make the animation look good. A shorter video with strong visuals is preferred over a longer one with only text.
4) Consult the documentation through the available function whenever you are even slightly unsure, to maximize accuracy. Avoiding errors is a MUST.

Extremely important rules you must follow:
1) AVOID LATEX ERRORS AT ALL COSTS. Do nothing even slightly risky, the code has to actually run.
    a) Do NOT use special unicode or greek characters that could cause trouble with some LaTeX interpreters.
    b) Be very careful with special characters such as &.
    c) Be very careful with line breaks.
2) Fade out all text and images at the right time so nothing lingers longer than it should. A title or body from several scenes ago must not persist through the video. EVERYTHING is temporary. Triple check that NOTHING persists.
3) Make sure there are no runtime errors and the code plays. If the task is advanced, break it up and make sure each part is correct.
4) Avoid list index errors at all costs. Check every index access: the sequence must not be empty and the index must be in bounds.
5) Keep everything in frame. Titles and images must never be cut off.
6) Make sure there are no common Python syntax or runtime errors.
7) Make sure audio is properly integrated with the mp4.

Write the complete program in a single ```python fenced code block."#
    )
}

/// Load page screenshots from `dir`, sorted by file name.
///
/// Only PNG and JPEG files are attached; anything else is ignored.
pub fn load_images(dir: &Path) -> Result<Vec<ImageAttachment>> {
    if !dir.is_dir() {
        return Err(Error::file_not_found(dir.display().to_string()).with_operation("prompt::load_images"));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(media_type) = image_media_type(&path) {
            files.push((path, media_type));
        }
    }
    files.sort();

    let mut images = Vec::with_capacity(files.len());
    for (path, media_type) in files {
        let bytes = fs::read(&path)?;
        images.push(ImageAttachment::from_bytes(media_type, &bytes));
    }
    debug!(dir = %dir.display(), images = images.len(), "loaded screenshots");
    Ok(images)
}

fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manimcraft_error::ErrorKind;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        docs: DocStore,
        sources: PromptSources,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for sub in ["examples", "pages", "summaries"] {
            fs::create_dir(root.join(sub)).unwrap();
        }

        fs::write(root.join("examples/b.in.txt"), "binary search").unwrap();
        fs::write(root.join("examples/b.out.txt"), "class FullTutorial(Scene): pass").unwrap();
        fs::write(root.join("examples/a.in.txt"), "arrays").unwrap();
        fs::write(root.join("examples/a.out.txt"), "class Arrays(Scene): pass").unwrap();

        fs::write(root.join("pages/z.html"), "https://docs/a\n<p>A</p>").unwrap();
        fs::write(root.join("pages/y.html"), "https://docs/b\n<p>B</p>").unwrap();
        fs::write(root.join("summaries/z.txt"), "summary of a").unwrap();
        fs::write(root.join("summaries/y.txt"), "summary of b").unwrap();

        fs::write(root.join("voiceover.txt"), "VOICEOVER DOCS").unwrap();

        let docs = DocStore::open(root.join("pages")).unwrap();
        let sources = PromptSources {
            examples_dir: root.join("examples"),
            summaries_dir: root.join("summaries"),
            supplement_file: root.join("voiceover.txt"),
        };
        Fixture { _dir: dir, docs, sources }
    }

    #[test]
    fn test_prompt_section_order() {
        let f = fixture();
        let prompt = build_system_prompt(&f.docs, &f.sources).unwrap();

        let role = prompt.find("FullTutorial").unwrap();
        let examples = prompt.find("Below are a few examples").unwrap();
        let first_pair = prompt.find("Input:\narrays\n\nOutput:\nclass Arrays(Scene): pass\n\n").unwrap();
        let second_pair = prompt.find("Input:\nbinary search").unwrap();
        let page_a = prompt.find("https://docs/a\nsummary of a\n\n").unwrap();
        let page_b = prompt.find("https://docs/b\nsummary of b\n\n").unwrap();
        let supplement = prompt.find("VOICEOVER DOCS").unwrap();

        assert!(role < examples);
        assert!(examples < first_pair && first_pair < second_pair);
        assert!(second_pair < page_a && page_a < page_b);
        assert!(page_b < supplement);
        assert!(prompt.ends_with("VOICEOVER DOCS"));
        assert!(prompt.contains(LOOKUP_TOOL));
    }

    #[test]
    fn test_missing_example_partner() {
        let f = fixture();
        fs::remove_file(f.sources.examples_dir.join("b.out.txt")).unwrap();
        let err = build_system_prompt(&f.docs, &f.sources).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_missing_summary() {
        let f = fixture();
        fs::remove_file(f.sources.summaries_dir.join("y.txt")).unwrap();
        let err = build_system_prompt(&f.docs, &f.sources).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.message().contains("y.txt"));
    }

    #[test]
    fn test_missing_supplement() {
        let mut f = fixture();
        f.sources.supplement_file = f.sources.summaries_dir.join("nope.txt");
        assert!(build_system_prompt(&f.docs, &f.sources).is_err());
    }

    #[test]
    fn test_task_message() {
        let msg = task_message("Explain segment trees");
        assert!(msg.starts_with("Explain segment trees\n\nInstructions:"));
        assert!(msg.contains("\"FullTutorial\""));
        assert!(msg.contains("7) Make sure audio"));
    }

    #[test]
    fn test_load_images_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("1.png"), b"png").unwrap();
        fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let images = load_images(dir.path()).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].media_type, "image/png");
        assert_eq!(images[1].media_type, "image/jpeg");
    }
}
