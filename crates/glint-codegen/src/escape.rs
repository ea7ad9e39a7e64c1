//! HTML entity encoding for escaped output.

/// Escape HTML special characters: & < > " '
pub fn escape(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    escape_into(&mut output, input);
    output
}

/// Append `input` to `output`, entity-encoding the five special characters.
pub fn escape_into(output: &mut String, input: &str) {
    for c in input.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_each_special_character() {
        assert_eq!(escape("&"), "&amp;");
        assert_eq!(escape("<"), "&lt;");
        assert_eq!(escape(">"), "&gt;");
        assert_eq!(escape("\""), "&quot;");
        assert_eq!(escape("'"), "&#39;");
    }

    #[test]
    fn test_escape_script_tag() {
        assert_eq!(
            escape("<script>alert('xss')</script>"),
            "&lt;script&gt;alert(&#39;xss&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_escape_leaves_plain_text_and_unicode() {
        assert_eq!(escape("Grüße, world!"), "Grüße, world!");
    }

    #[test]
    fn test_escape_into_appends() {
        let mut out = String::from("<b>");
        escape_into(&mut out, "a&b");
        assert_eq!(out, "<b>a&amp;b");
    }
}
