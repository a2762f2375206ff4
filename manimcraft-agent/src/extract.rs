//! Pull the program out of the oracle's final answer

use regex::Regex;
use std::sync::LazyLock;

/// Tried in order; the first pattern with a non-blank match wins
static PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?s)```python[^\n]*\n(.*?)```",
        r"(?s)<output>(.*?)</output>",
        r"(?s)```[^\n]*\n(.*?)```",
    ]
    .map(|pattern| Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern {pattern}: {e}")))
});

/// Extract the code from an answer.
///
/// Looks for the first ```` ```python ```` fence, then the first
/// `<output>...</output>` block, then the first bare fence. Returns `None`
/// when no block with content is found.
pub fn extract_code(answer: &str) -> Option<String> {
    PATTERNS.iter().find_map(|pattern| first_block(pattern, answer))
}

fn first_block(re: &Regex, text: &str) -> Option<String> {
    let body = re.captures(text)?.get(1)?.as_str();
    let body = body.trim_matches('\n').trim_end();
    (!body.trim().is_empty()).then(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_fence() {
        let answer = "Here it is:\n```python\nfrom manim import *\n\nclass FullTutorial(Scene):\n    pass\n```\nEnjoy.";
        assert_eq!(
            extract_code(answer).unwrap(),
            "from manim import *\n\nclass FullTutorial(Scene):\n    pass"
        );
    }

    #[test]
    fn test_python_fence_wins_over_other_blocks() {
        let answer = "```\nbare\n```\n<output>tagged</output>\n```python\nfenced\n```";
        assert_eq!(extract_code(answer).unwrap(), "fenced");
    }

    #[test]
    fn test_output_tags() {
        let answer = "<output>\nclass FullTutorial(Scene):\n    pass\n</output>";
        assert_eq!(extract_code(answer).unwrap(), "class FullTutorial(Scene):\n    pass");
    }

    #[test]
    fn test_bare_fence() {
        let answer = "```py\nx = 1\n```";
        assert_eq!(extract_code(answer).unwrap(), "x = 1");
    }

    #[test]
    fn test_first_python_block_is_used() {
        let answer = "```python\nfirst\n```\n```python\nsecond\n```";
        assert_eq!(extract_code(answer).unwrap(), "first");
    }

    #[test]
    fn test_no_block() {
        assert!(extract_code("I could not write the code.").is_none());
        assert!(extract_code("```python\n\n```").is_none());
    }
}
