//! Extraction of `<tag>…</tag>` invocation spans from assistant text.
//!
//! Matching is purely textual and never fails: malformed, unterminated or
//! differently-cased tags simply produce no span.

use std::ops::Range;

/// An innermost, non-nested occurrence of `<tag>content</tag>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span<'a> {
    /// Byte range of the whole invocation, tags included.
    pub range: Range<usize>,
    /// Text between the tags, passed verbatim to the command.
    pub content: &'a str,
}

/// Find every innermost span of `tag` in `text`, left to right.
///
/// A span never contains another opening tag of the same name: for
/// `<t>a<t>b</t>` only `b` matches. Spans never overlap; scanning resumes
/// after the closing tag of each match.
pub fn extract_spans<'a>(tag: &str, text: &'a str) -> Vec<Span<'a>> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(&open) {
        let start = cursor + offset;
        let body_start = start + open.len();
        // Without a closing tag after this opening, no later opening can close either.
        let Some(close_offset) = text[body_start..].find(&close) else {
            break;
        };
        let body_end = body_start + close_offset;
        let body = &text[body_start..body_end];

        if let Some(inner) = body.rfind(&open) {
            // The last opening before this close is the innermost candidate.
            cursor = body_start + inner;
            continue;
        }

        let end = body_end + close.len();
        spans.push(Span {
            range: start..end,
            content: body,
        });
        cursor = end;
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents<'a>(tag: &str, text: &'a str) -> Vec<&'a str> {
        extract_spans(tag, text)
            .into_iter()
            .map(|span| span.content)
            .collect()
    }

    #[test]
    fn single_span_content_is_verbatim() {
        let text = "Let me check.\n<bash>ls -la\n</bash>\nDone.";
        let spans = extract_spans("bash", text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content, "ls -la\n");
        assert_eq!(&text[spans[0].range.clone()], "<bash>ls -la\n</bash>");
    }

    #[test]
    fn multiline_and_empty_content_match() {
        assert_eq!(
            contents("bash", "<bash>python3 -c \"\nprint(1)\n\"</bash>"),
            vec!["python3 -c \"\nprint(1)\n\""]
        );
        assert_eq!(contents("browse", "<browse></browse>"), vec![""]);
    }

    #[test]
    fn multiple_spans_are_found_in_order() {
        assert_eq!(
            contents("bash", "<bash>a</bash> then <bash>b</bash>"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn nested_same_tag_matches_innermost_only() {
        assert_eq!(contents("bash", "<bash>outer <bash>inner</bash> tail</bash>"), vec!["inner"]);
        assert_eq!(contents("t", "<t><t><t>deep</t></t></t>"), vec!["deep"]);
        assert_eq!(contents("t", "<t>a<t>b</t>"), vec!["b"]);
    }

    #[test]
    fn span_never_contains_an_opening_tag_of_its_own_name() {
        let text = "<t>x<t>y</t><t>z</t></t><t>";
        for span in extract_spans("t", text) {
            assert!(!span.content.contains("<t>"), "span {:?}", span.content);
        }
        assert_eq!(contents("t", text), vec!["y", "z"]);
    }

    #[test]
    fn other_tags_inside_a_span_are_kept_verbatim() {
        assert_eq!(
            contents("submit", "<submit><bash>ls</bash></submit>"),
            vec!["<bash>ls</bash>"]
        );
        assert_eq!(contents("bash", "<submit><bash>ls</bash></submit>"), vec!["ls"]);
    }

    #[test]
    fn malformed_input_yields_no_spans() {
        assert!(extract_spans("bash", "").is_empty());
        assert!(extract_spans("bash", "<bash>ls").is_empty());
        assert!(extract_spans("bash", "ls</bash>").is_empty());
        assert!(extract_spans("bash", "</bash>ls<bash>").is_empty());
        assert!(extract_spans("bash", "<bash >ls</bash>").is_empty());
        assert!(extract_spans("bash", "<BASH>ls</BASH>").is_empty());
        assert!(extract_spans("bash", "<bashx>ls</bashx>").is_empty());
    }

    #[test]
    fn unterminated_trailing_opening_does_not_hide_earlier_spans() {
        assert_eq!(contents("bash", "<bash>a</bash><bash>b"), vec!["a"]);
    }

    #[test]
    fn multibyte_text_around_spans_is_handled() {
        assert_eq!(
            contents("submit", "答え: <submit>四十二 ✓</submit> 🎉"),
            vec!["四十二 ✓"]
        );
    }
}
