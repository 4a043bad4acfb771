//! Extraction of code from free-form agent responses.
//!
//! Agents tend to wrap code in Markdown fences and surround it with prose.
//! [`extract_code`] recognizes backtick and tilde fences with or without a
//! language tag, including fences that open after prose on the same line or
//! close at the end of a code line. It tolerates a fence that is never closed
//! and falls back to the trimmed response when no usable fence is present.

/// An opening fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence<'a> {
    marker: char,
    len: usize,
    indent: usize,
    lang: Option<&'a str>,
}

/// A fenced block found in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// First word of the info string, if any.
    pub lang: Option<String>,
    pub body: String,
    /// Whether a closing fence was found.
    pub closed: bool,
}

impl CodeBlock {
    fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Return the code an agent meant to hand back.
///
/// Selection order:
/// 1. the first non-blank block tagged with `preferred` (aliases such as `py` count),
/// 2. the first closed non-blank block,
/// 3. the first non-blank block (an unclosed fence takes the rest of the text),
/// 4. the first closed block, which yields an empty string,
/// 5. the whole response, trimmed.
///
/// An empty fence that is never closed is ignored, so a stray fence cannot
/// hide the code around it.
pub fn extract_code(response: &str, preferred: Option<&str>) -> String {
    let blocks = parse_blocks(response);

    let chosen = preferred
        .map(canonical_lang)
        .and_then(|want| {
            blocks.iter().find(|b| {
                !b.is_blank()
                    && b.lang
                        .as_deref()
                        .is_some_and(|lang| canonical_lang(lang) == want)
            })
        })
        .or_else(|| blocks.iter().find(|b| b.closed && !b.is_blank()))
        .or_else(|| blocks.iter().find(|b| !b.is_blank()))
        .or_else(|| blocks.iter().find(|b| b.closed));

    match chosen {
        Some(block) => block.body.clone(),
        None => strip_inline_fence(response.trim()).to_string(),
    }
}

/// Split `text` into fenced blocks in document order.
pub fn parse_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(Fence<'_>, Vec<&str>)> = None;

    for line in text.lines() {
        match open.as_mut() {
            None => {
                if let Some(fence) = opening_fence(line) {
                    open = Some((fence, Vec::new()));
                }
            }
            Some((fence, body)) => match closing_fence(line, fence) {
                Some(last_line) => {
                    if !last_line.trim().is_empty() {
                        body.push(dedent(last_line, fence.indent));
                    }
                    blocks.push(finish_block(fence, body, true));
                    open = None;
                }
                None => body.push(dedent(line, fence.indent)),
            },
        }
    }

    if let Some((fence, body)) = open {
        blocks.push(finish_block(&fence, &body, false));
    }

    blocks
}

fn finish_block(fence: &Fence<'_>, body: &[&str], closed: bool) -> CodeBlock {
    let start = body
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(body.len());
    let text = body[start..].join("\n");

    CodeBlock {
        lang: fence.lang.map(str::to_string),
        body: text.trim_end().to_string(),
        closed,
    }
}

/// Find a fence opening on `line`, either at its start or after prose such
/// as `Here is the fix: ```python`.
fn opening_fence(line: &str) -> Option<Fence<'_>> {
    let start = [line.find("```"), line.find("~~~")]
        .into_iter()
        .flatten()
        .min()?;
    let prefix = &line[..start];
    let rest = &line[start..];

    let marker = if rest.starts_with('`') { '`' } else { '~' };
    let len = rest.chars().take_while(|c| *c == marker).count();
    let info = rest[len..].trim();
    // The marker showing up again means inline code like ```x = 1```.
    if info.contains(marker) {
        return None;
    }

    Some(Fence {
        marker,
        len,
        // Prose before the fence means there is no indentation to strip.
        indent: if prefix.trim().is_empty() {
            prefix.len()
        } else {
            0
        },
        lang: info.split_whitespace().next(),
    })
}

/// If `line` closes `fence`, return the code in front of the closing marker
/// (empty for a line holding only the fence).
fn closing_fence<'a>(line: &'a str, fence: &Fence<'_>) -> Option<&'a str> {
    let trimmed = line.trim_end();
    let run = trimmed
        .chars()
        .rev()
        .take_while(|c| *c == fence.marker)
        .count();
    (run >= fence.len).then(|| &trimmed[..trimmed.len() - run])
}

/// Remove up to `indent` leading spaces, matching the fence's own indentation.
fn dedent(line: &str, indent: usize) -> &str {
    let strip = line
        .bytes()
        .take(indent)
        .take_while(|b| *b == b' ')
        .count();
    &line[strip..]
}

/// Handle a response that is a single line of inline code, optionally after
/// prose: `` `x` ``, ```` ```x``` ```` or ```` Try ```x``` ````.
fn strip_inline_fence(text: &str) -> &str {
    if text.lines().count() != 1 {
        return text;
    }

    if let Some(start) = text.find("```") {
        let run = text[start..].chars().take_while(|c| *c == '`').count();
        let inner = &text[start + run..];
        if let Some(end) = inner.find(&"`".repeat(run)) {
            return inner[..end].trim();
        }
    }

    let ticks = text.chars().take_while(|c| *c == '`').count();
    if ticks >= 1 && text.len() > ticks * 2 && text.ends_with(&"`".repeat(ticks)) {
        return text[ticks..text.len() - ticks].trim();
    }
    text
}

fn canonical_lang(lang: &str) -> String {
    let lower = lang.to_ascii_lowercase();
    match lower.as_str() {
        "py" | "python3" | "py3" => "python".to_string(),
        "js" | "node" | "nodejs" => "javascript".to_string(),
        "bash" | "shell" | "zsh" => "sh".to_string(),
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tagged_block_with_prose() {
        let response = "Here is the fix:\n```python\nprint('hi')\n```\nThe bug was a typo.";
        assert_eq!(extract_code(response, Some("python")), "print('hi')");
    }

    #[test]
    fn test_untagged_block() {
        let response = "```\nx = 1\nprint(x)\n```";
        assert_eq!(extract_code(response, Some("python")), "x = 1\nprint(x)");
    }

    #[test]
    fn test_prefers_requested_language() {
        let response = "Output will be:\n```text\n42\n```\nCode:\n```py\nprint(42)\n```";
        assert_eq!(extract_code(response, Some("python")), "print(42)");
        assert_eq!(extract_code(response, None), "42");
    }

    #[test]
    fn test_no_fence_returns_trimmed_response() {
        assert_eq!(extract_code("\n  print(1)\n\n", None), "print(1)");
    }

    #[test]
    fn test_unterminated_fence_takes_rest() {
        let response = "Fixed:\n```python\nimport sys\nprint(sys.argv)\n";
        assert_eq!(
            extract_code(response, Some("python")),
            "import sys\nprint(sys.argv)"
        );
    }

    #[test]
    fn test_closed_block_beats_earlier_empty_block() {
        let response = "```\n```\nthen\n```sh\nexit 0\n```";
        assert_eq!(extract_code(response, Some("python")), "exit 0");
    }

    #[test]
    fn test_inner_indentation_is_kept() {
        let response = "```python\ndef f():\n    return 1\n\nprint(f())\n```";
        assert_eq!(
            extract_code(response, None),
            "def f():\n    return 1\n\nprint(f())"
        );
    }

    #[test]
    fn test_indented_fence_is_dedented() {
        let response = "1. Replace the file with:\n   ```python\n   if True:\n       print(1)\n   ```";
        assert_eq!(extract_code(response, None), "if True:\n    print(1)");
    }

    #[test]
    fn test_longer_fence_contains_shorter_one() {
        let response = "````markdown\n```python\nprint(1)\n```\n````";
        let blocks = parse_blocks(response);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "```python\nprint(1)\n```");
    }

    #[test]
    fn test_tilde_fence() {
        let response = "~~~python\nprint('tilde')\n~~~";
        assert_eq!(extract_code(response, None), "print('tilde')");
    }

    #[test]
    fn test_inline_single_line_fence() {
        assert_eq!(extract_code("```print(1)```", None), "print(1)");
        assert_eq!(extract_code("`print(2)`", None), "print(2)");
    }

    #[test]
    fn test_fence_opened_after_prose_on_same_line() {
        let response = "Sure, here is the fix: ```python\nprint(1)\n```";
        assert_eq!(extract_code(response, Some("python")), "print(1)");
    }

    #[test]
    fn test_fence_closed_at_end_of_code_line() {
        let response = "```python\nprint(1)```";
        assert_eq!(extract_code(response, Some("python")), "print(1)");

        let blocks = parse_blocks("```sh\necho a\necho b ```\ntrailing prose");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].closed);
        assert_eq!(blocks[0].body, "echo a\necho b");
    }

    #[test]
    fn test_empty_unclosed_fence_falls_back_to_response() {
        let response = "print(1)\n```";
        assert_eq!(extract_code(response, Some("python")), "print(1)\n```");
    }

    #[test]
    fn test_closed_empty_fence_is_empty() {
        assert_eq!(extract_code("```sh\n```", Some("sh")), "");
    }

    #[test]
    fn test_inline_fence_after_prose() {
        assert_eq!(extract_code("Try ```x = 1``` instead", None), "x = 1");
    }

    #[test]
    fn test_two_backticks_is_not_a_fence() {
        let response = "``\nprint(1)\n``";
        assert!(parse_blocks(response).is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let response = "```python\r\nprint(1)\r\n```\r\n";
        assert_eq!(extract_code(response, None), "print(1)");
    }

    #[test]
    fn test_parse_blocks_reports_closure() {
        let blocks = parse_blocks("```js\na()\n```\n```python\nb()");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lang.as_deref(), Some("js"));
        assert!(blocks[0].closed);
        assert_eq!(blocks[1].lang.as_deref(), Some("python"));
        assert!(!blocks[1].closed);
        assert_eq!(blocks[1].body, "b()");
    }
}
