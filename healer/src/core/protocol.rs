//! Parser for the whole-file patch protocol returned by the model.
//!
//! ```text
//! FILE: relative/path
//! <full new content>
//! <<<END_FILE
//! ```
//!
//! Blocks may be interleaved with free text, which is ignored. Markdown fences
//! are stripped before scanning since the format never contains them.

use thiserror::Error;

use crate::core::types::{Patch, PatchSet};

pub const FILE_MARKER: &str = "FILE:";
pub const END_MARKER: &str = "<<<END_FILE";
const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Input ended while a `FILE:` block was still open.
    #[error("missing <<<END_FILE terminator for file {path}")]
    MissingTerminator { path: String },
}

/// Parse a model response into patches, in document order.
///
/// Zero blocks is a valid, empty result. An unterminated block rejects the whole
/// response so a half-captured body is never written.
pub fn parse_patches(response: &str) -> Result<PatchSet, ProtocolError> {
    let cleaned = response.replace(FENCE, "");
    let mut lines = cleaned.lines();
    let mut patches = Vec::new();

    while let Some(line) = lines.next() {
        let Some(rest) = line.trim().strip_prefix(FILE_MARKER) else {
            continue;
        };
        let path = rest.trim().to_string();

        let mut body: Vec<&str> = Vec::new();
        let mut terminated = false;
        for body_line in lines.by_ref() {
            if body_line.trim() == END_MARKER {
                terminated = true;
                break;
            }
            body.push(body_line);
        }
        if !terminated {
            return Err(ProtocolError::MissingTerminator { path });
        }

        patches.push(Patch {
            path,
            content: normalize_body(&body),
        });
    }

    Ok(patches)
}

fn normalize_body(lines: &[&str]) -> String {
    let joined = lines.join("\n");
    let mut content = joined.trim_end_matches('\n').to_string();
    content.push('\n');
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_block() {
        let patches = parse_patches("FILE: a.txt\nhello\n<<<END_FILE").expect("parse");
        assert_eq!(
            patches,
            vec![Patch {
                path: "a.txt".to_string(),
                content: "hello\n".to_string(),
            }]
        );
    }

    #[test]
    fn keeps_document_order_and_ignores_chatter() {
        let response = "Here are the fixes:\n\
            \n\
            FILE: scripts/b.sh\n\
            echo b\n\
            <<<END_FILE\n\
            some commentary in between\n\
            FILE: config/a.json\n\
            {}\n\
            <<<END_FILE\n\
            Done.\n";
        let patches = parse_patches(response).expect("parse");
        let paths: Vec<&str> = patches.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["scripts/b.sh", "config/a.json"]);
        assert_eq!(patches[0].content, "echo b\n");
        assert_eq!(patches[1].content, "{}\n");
    }

    #[test]
    fn collapses_trailing_blank_lines_to_one_newline() {
        let patches = parse_patches("FILE: a.txt\nline\n\n\n\n<<<END_FILE\n").expect("parse");
        assert_eq!(patches[0].content, "line\n");
    }

    #[test]
    fn empty_body_becomes_single_newline() {
        let patches = parse_patches("FILE: empty.txt\n<<<END_FILE\n").expect("parse");
        assert_eq!(patches[0].content, "\n");
    }

    #[test]
    fn preserves_interior_whitespace_verbatim() {
        let response = "FILE: x.ps1\n  indented\n\n\ttabbed  \n<<<END_FILE";
        let patches = parse_patches(response).expect("parse");
        assert_eq!(patches[0].content, "  indented\n\n\ttabbed  \n");
    }

    #[test]
    fn strips_markdown_fences() {
        let response = "```\nFILE: a.txt\nhello\n<<<END_FILE\n```";
        let patches = parse_patches(response).expect("parse");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].content, "hello\n");
    }

    #[test]
    fn fence_with_language_tag_leaves_tag_as_chatter() {
        let response = "```powershell\nFILE: a.ps1\nWrite-Host hi\n<<<END_FILE\n```";
        let patches = parse_patches(response).expect("parse");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].content, "Write-Host hi\n");
    }

    #[test]
    fn trims_marker_lines() {
        let response = "   FILE:   padded/path.txt   \nbody\n   <<<END_FILE   \n";
        let patches = parse_patches(response).expect("parse");
        assert_eq!(patches[0].path, "padded/path.txt");
        assert_eq!(patches[0].content, "body\n");
    }

    #[test]
    fn nested_file_marker_is_body_text() {
        let response = "FILE: a.md\nFILE: not-a-block\n<<<END_FILE";
        let patches = parse_patches(response).expect("parse");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].content, "FILE: not-a-block\n");
    }

    #[test]
    fn missing_terminator_names_path_and_yields_nothing() {
        let response = "FILE: good.txt\nok\n<<<END_FILE\nFILE: broken.txt\npartial\n";
        let err = parse_patches(response).expect_err("unterminated");
        assert_eq!(
            err,
            ProtocolError::MissingTerminator {
                path: "broken.txt".to_string()
            }
        );
        assert!(err.to_string().contains("broken.txt"));
    }

    #[test]
    fn no_blocks_is_empty_not_error() {
        let patches = parse_patches("I could not determine a fix.").expect("parse");
        assert!(patches.is_empty());
        assert!(parse_patches("").expect("parse").is_empty());
    }

    #[test]
    fn handles_crlf_line_endings() {
        let patches = parse_patches("FILE: a.txt\r\nhello\r\n<<<END_FILE\r\n").expect("parse");
        assert_eq!(patches[0].path, "a.txt");
        assert_eq!(patches[0].content, "hello\n");
    }
}
