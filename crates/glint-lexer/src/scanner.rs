use crate::token::{Keyword, Span, Token, TokenKind};
use crate::{CompileError, Location};

/// Scanner mode: which part of the source is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerMode {
    /// Leading `@` declarations, passed through as opaque `Header` tokens.
    Header,
    /// Literal text with `{{ ... }}` regions.
    Body,
}

/// Glint source scanner.
///
/// Tokenizes a template source into a flat token stream.
/// - `Vec<char>` source for index-based navigation
/// - Header mode, then body mode
/// - Pending-text buffer so comments and trim markers never split or leak text
/// - Position tracking on every token
pub struct Scanner<'a> {
    file: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    mode: ScannerMode,
    /// Literal text not yet emitted, with the position where it started.
    text: String,
    text_start: Option<Span>,
    /// Set by `-}}`: trim leading whitespace of the next text token.
    trim_leading: bool,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source. `file` is only used for errors.
    pub fn new(source: &str, file: &'a str) -> Self {
        Self {
            file,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            mode: ScannerMode::Header,
            text: String::new(),
            text_start: None,
            trim_leading: false,
        }
    }

    /// Tokenize the entire source into a vector of tokens ending with `Eof`.
    pub fn tokenize(source: &str, file: &str) -> Result<Vec<Token>, CompileError> {
        let mut scanner = Scanner::new(source, file);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }

    /// The mode the scanner is currently in.
    pub fn mode(&self) -> ScannerMode {
        self.mode
    }

    fn scan_tokens(&mut self) -> Result<(), CompileError> {
        self.scan_header();
        self.mode = ScannerMode::Body;

        while !self.is_at_end() {
            if self.starts_with("{{--") {
                self.scan_comment()?;
            } else if self.starts_with("{{") {
                self.scan_region()?;
            } else {
                self.push_text_char();
            }
        }

        self.flush_text(false);
        self.emit(TokenKind::Eof, self.pos);
        Ok(())
    }

    // --- Header ---

    /// Scan leading `@` declaration lines.
    ///
    /// A source whose first non-whitespace content is not `@` (for instance
    /// `{{` or plain markup) has no header; body mode starts at offset 0.
    fn scan_header(&mut self) {
        let first = self.chars.iter().position(|c| !c.is_whitespace());
        if first.map(|i| self.chars[i]) != Some('@') {
            return;
        }

        while !self.is_at_end() {
            let line_start = self.pos;
            let line_end = self.line_end(line_start);
            let content: String = self.chars[line_start..line_end].iter().collect();
            let trimmed = content.trim();

            if !trimmed.is_empty() && !trimmed.starts_with('@') {
                // Implicit switch: this line is the first line of the body.
                return;
            }

            if trimmed.starts_with('@') && trimmed != "@body" {
                let indent = content.len() - content.trim_start().len();
                let start = line_start + content[..indent].chars().count();
                let span = Span::new(
                    start,
                    start + trimmed.chars().count(),
                    self.line,
                    self.column + (start - line_start),
                );
                self.tokens.push(Token::new(
                    TokenKind::Header(trimmed.to_string()),
                    trimmed,
                    span,
                ));
            }

            self.advance_to(line_end);
            if !self.is_at_end() {
                self.advance(); // consume newline
            }

            if trimmed == "@body" {
                return;
            }
        }
    }

    fn line_end(&self, from: usize) -> usize {
        self.chars[from..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(self.chars.len(), |i| from + i)
    }

    // --- Text ---

    fn push_text_char(&mut self) {
        if self.text_start.is_none() {
            self.text_start = Some(self.here());
        }
        self.text.push(self.peek());
        self.advance();
    }

    /// Emit pending text as a `Text` token, applying trim markers.
    ///
    /// `trim_trailing` comes from a following `{{-`; leading trim from a
    /// preceding `-}}`. Text that trims to nothing is dropped.
    fn flush_text(&mut self, trim_trailing: bool) {
        let raw = std::mem::take(&mut self.text);
        let start = self.text_start.take();
        let trim_leading = std::mem::replace(&mut self.trim_leading, false);

        let mut value = raw.as_str();
        if trim_leading {
            value = value.trim_start();
        }
        if trim_trailing {
            value = value.trim_end();
        }
        if value.is_empty() {
            return;
        }

        let start = start.unwrap_or_else(|| self.here());
        let end = start.start + raw.chars().count();
        let span = Span::new(start.start, end, start.line, start.column);
        self.tokens
            .push(Token::new(TokenKind::Text(value.to_string()), raw.as_str(), span));
    }

    // --- Comments ---

    /// Skip `{{-- ... --}}`. Pending text is left untouched so the text on
    /// both sides of the comment joins into one token.
    fn scan_comment(&mut self) -> Result<(), CompileError> {
        let start = self.here();
        self.advance_n(4);

        while !self.is_at_end() {
            if self.starts_with("--}}") {
                self.advance_n(4);
                return Ok(());
            }
            self.advance();
        }

        Err(self.error_at("Unterminated comment, expected '--}}'", start))
    }

    // --- Regions ---

    /// Scan a `{{ ... }}` region, or a verbatim block opened by one.
    fn scan_region(&mut self) -> Result<(), CompileError> {
        let open = self.here();
        self.advance_n(2);
        let trim = self.peek() == '-';
        if trim {
            self.advance();
        }
        self.flush_text(trim);

        if let Some(after) = self.verbatim_marker(self.pos, "verbatim") {
            self.advance_to(after.end);
            return self.scan_verbatim(open);
        }

        let lexeme = if trim { "{{-" } else { "{{" };
        self.tokens.push(Token::new(
            TokenKind::Open { trim },
            lexeme,
            Span::new(open.start, self.pos, open.line, open.column),
        ));

        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                return Err(self.error_at("Unterminated '{{' region, expected '}}'", open));
            }

            if self.starts_with("-}}") {
                let start = self.pos;
                self.advance_n(3);
                self.emit_from(TokenKind::Close { trim: true }, start);
                self.trim_leading = true;
                return Ok(());
            }
            if self.starts_with("}}") {
                let start = self.pos;
                self.advance_n(2);
                self.emit_from(TokenKind::Close { trim: false }, start);
                return Ok(());
            }

            self.scan_region_token()?;
        }
    }

    /// Match `<ws> word <ws> ('}}' | '-}}')` starting at `from` (just after `{{` / `{{-`).
    fn verbatim_marker(&self, from: usize, word: &str) -> Option<Marker> {
        let mut i = from;
        while i < self.chars.len() && self.chars[i].is_whitespace() {
            i += 1;
        }
        for expected in word.chars() {
            if self.chars.get(i) != Some(&expected) {
                return None;
            }
            i += 1;
        }
        if self
            .chars
            .get(i)
            .is_some_and(|c| c.is_alphanumeric() || *c == '_')
        {
            return None;
        }
        while i < self.chars.len() && self.chars[i].is_whitespace() {
            i += 1;
        }
        if self.starts_with_at(i, "-}}") {
            Some(Marker {
                end: i + 3,
                trim: true,
            })
        } else if self.starts_with_at(i, "}}") {
            Some(Marker {
                end: i + 2,
                trim: false,
            })
        } else {
            None
        }
    }

    /// Capture everything up to the next `{{ end }}` as one literal text token.
    fn scan_verbatim(&mut self, open: Span) -> Result<(), CompileError> {
        let content_start = self.here();
        let mut i = self.pos;

        while i + 1 < self.chars.len() {
            if self.starts_with_at(i, "{{") {
                let after_open = if self.chars.get(i + 2) == Some(&'-') {
                    i + 3
                } else {
                    i + 2
                };
                if let Some(close) = self.verbatim_marker(after_open, "end") {
                    let content: String = self.chars[self.pos..i].iter().collect();
                    self.advance_to(i);
                    if !content.is_empty() {
                        let span = Span::new(
                            content_start.start,
                            i,
                            content_start.line,
                            content_start.column,
                        );
                        self.tokens
                            .push(Token::new(TokenKind::Text(content.clone()), content, span));
                    }
                    self.advance_to(close.end);
                    self.trim_leading = close.trim;
                    return Ok(());
                }
            }
            i += 1;
        }

        Err(self.error_at(
            "Unterminated verbatim block, expected '{{ end }}'",
            open,
        ))
    }

    // --- Region tokens ---

    fn scan_region_token(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        let ch = self.peek();

        let kind = match ch {
            '"' | '\'' => return self.scan_string(),
            '0'..='9' => return self.scan_number(),
            c if c.is_alphabetic() || c == '_' => return self.scan_word(),

            '?' if self.peek_next() == '.' => TokenKind::QuestionDot,
            '?' if self.peek_next() == '?' => TokenKind::QuestionQuestion,
            '?' => TokenKind::Question,
            '|' if self.peek_next() == '|' => TokenKind::OrOr,
            '|' => TokenKind::Pipe,
            '&' if self.peek_next() == '&' => TokenKind::AndAnd,
            '=' if self.peek_next() == '=' => TokenKind::EqEq,
            '=' => TokenKind::Equals,
            '!' if self.peek_next() == '=' => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '<' if self.peek_next() == '=' => TokenKind::LtEq,
            '<' => TokenKind::Lt,
            '>' if self.peek_next() == '=' => TokenKind::GtEq,
            '>' => TokenKind::Gt,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '~' => TokenKind::Tilde,
            '.' => TokenKind::Dot,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            _ => return Err(self.error(format!("Unexpected character: '{ch}'"))),
        };

        let width = kind.symbol().map_or(1, |s| s.chars().count());
        self.advance_n(width);
        self.emit_from(kind, start);
        Ok(())
    }

    /// Scan a string literal with backslash escapes.
    fn scan_string(&mut self) -> Result<(), CompileError> {
        let quote = self.peek();
        let start = self.here();
        self.advance(); // consume opening quote

        let mut value = String::new();

        while !self.is_at_end() && self.peek() != quote {
            if self.peek() == '\\' {
                self.advance(); // consume backslash
                if self.is_at_end() {
                    return Err(self.error("Unterminated escape sequence".into()));
                }
                match self.peek() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    c if c == quote => value.push(c),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                }
                self.advance();
            } else {
                value.push(self.peek());
                self.advance();
            }
        }

        if self.is_at_end() {
            return Err(self.error_at("Unterminated string", start));
        }

        self.advance(); // consume closing quote
        self.emit_from(TokenKind::String(value), start.start);
        Ok(())
    }

    /// Scan a number literal, keeping its raw text. A `.` is only part of the
    /// number when a digit follows it.
    fn scan_number(&mut self) -> Result<(), CompileError> {
        let start = self.pos;

        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let raw: String = self.chars[start..self.pos].iter().collect();
        self.emit_from(TokenKind::Number(raw), start);
        Ok(())
    }

    /// Scan an identifier, keyword or boolean literal.
    fn scan_word(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let word: String = self.chars[start..self.pos].iter().collect();
        let kind = Self::keyword_or_ident(word);
        self.emit_from(kind, start);
        Ok(())
    }

    fn keyword_or_ident(word: String) -> TokenKind {
        match word.as_str() {
            "true" => TokenKind::Boolean(true),
            "false" => TokenKind::Boolean(false),
            _ => match Keyword::from_word(&word) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier(word),
            },
        }
    }

    // --- Helpers ---

    fn here(&self) -> Span {
        Span::new(self.pos, self.pos, self.line, self.column)
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        let span = Span::new(start, self.pos, self.line, self.column);
        self.tokens.push(Token::new(kind, "", span));
    }

    /// Emit a token that started at `start` and ends at the current position.
    /// Tokens never span lines except strings, so the column is recomputed
    /// from the current column when the token stayed on one line.
    fn emit_from(&mut self, kind: TokenKind, start: usize) {
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let (line, column) = self.position_of(start);
        let span = Span::new(start, self.pos, line, column);
        self.tokens.push(Token::new(kind, lexeme, span));
    }

    /// Line and column of an earlier character offset on or before the cursor.
    fn position_of(&self, offset: usize) -> (usize, usize) {
        let newlines = self.chars[offset..self.pos]
            .iter()
            .filter(|&&c| c == '\n')
            .count();
        if newlines == 0 {
            return (self.line, self.column - (self.pos - offset));
        }
        let line = self.line - newlines;
        let line_start = self.chars[..offset]
            .iter()
            .rposition(|&c| c == '\n')
            .map_or(0, |i| i + 1);
        (line, offset - line_start + 1)
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn starts_with(&self, pattern: &str) -> bool {
        self.starts_with_at(self.pos, pattern)
    }

    fn starts_with_at(&self, at: usize, pattern: &str) -> bool {
        let mut i = at;
        for expected in pattern.chars() {
            if self.chars.get(i) != Some(&expected) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.pos]
        }
    }

    fn peek_next(&self) -> char {
        if self.pos + 1 >= self.chars.len() {
            '\0'
        } else {
            self.chars[self.pos + 1]
        }
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            if self.chars[self.pos] == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn advance_to(&mut self, target: usize) {
        while self.pos < target && !self.is_at_end() {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: String) -> CompileError {
        CompileError::new(message, Location::new(self.file, self.line, self.column))
    }

    fn error_at(&self, message: &str, at: Span) -> CompileError {
        CompileError::new(message, Location::at(self.file, at))
    }
}

/// End of a `verbatim` / `end` marker and whether it closed with `-}}`.
struct Marker {
    end: usize,
    trim: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Helper: tokenize and return token kinds (ignoring spans).
    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::tokenize(source, "test.glint")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    /// Helper: tokenize and panic on error.
    fn tokens(source: &str) -> Vec<Token> {
        Scanner::tokenize(source, "test.glint").unwrap()
    }

    /// Helper: values of all text tokens.
    fn texts(source: &str) -> Vec<String> {
        kinds(source)
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn text(s: &str) -> TokenKind {
        TokenKind::Text(s.into())
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Identifier(s.into())
    }

    const OPEN: TokenKind = TokenKind::Open { trim: false };
    const CLOSE: TokenKind = TokenKind::Close { trim: false };

    // =========================================================================
    // Structure: empty, text, EOF
    // =========================================================================

    #[test]
    fn test_empty_source() {
        let toks = tokens("");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            kinds("<h1>Hello</h1>\n"),
            vec![text("<h1>Hello</h1>\n"), TokenKind::Eof]
        );
    }

    #[test]
    fn test_whitespace_only_source_is_text() {
        assert_eq!(kinds("  \n"), vec![text("  \n"), TokenKind::Eof]);
    }

    #[test]
    fn test_simple_output() {
        assert_eq!(
            kinds("<p>{{ name }}</p>"),
            vec![
                text("<p>"),
                OPEN,
                ident("name"),
                CLOSE,
                text("</p>"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_adjacent_regions_have_no_empty_text() {
        assert_eq!(
            kinds("{{a}}{{b}}"),
            vec![OPEN, ident("a"), CLOSE, OPEN, ident("b"), CLOSE, TokenKind::Eof]
        );
    }

    #[test]
    fn test_multiline_region() {
        assert_eq!(
            kinds("{{\n  a\n}}"),
            vec![OPEN, ident("a"), CLOSE, TokenKind::Eof]
        );
    }

    // =========================================================================
    // Header mode
    // =========================================================================

    #[test]
    fn test_header_lines_then_implicit_body() {
        assert_eq!(
            kinds("@param user\n@import x\n<p>{{ user }}</p>"),
            vec![
                TokenKind::Header("@param user".into()),
                TokenKind::Header("@import x".into()),
                text("<p>"),
                OPEN,
                ident("user"),
                CLOSE,
                text("</p>"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_header_explicit_body_marker() {
        assert_eq!(
            kinds("@layout\n\n@body\n@not-a-header"),
            vec![
                TokenKind::Header("@layout".into()),
                text("@not-a-header"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_leading_expression_enters_body_immediately() {
        assert_eq!(
            kinds("  {{ x }}"),
            vec![text("  "), OPEN, ident("x"), CLOSE, TokenKind::Eof]
        );
    }

    #[test]
    fn test_markup_start_has_no_header() {
        assert_eq!(kinds("<p>@x</p>"), vec![text("<p>@x</p>"), TokenKind::Eof]);
    }

    #[test]
    fn test_scanner_switches_to_body_mode() {
        let mut scanner = Scanner::new("@layout\n<p></p>", "t.glint");
        assert_eq!(scanner.mode(), ScannerMode::Header);
        scanner.scan_tokens().unwrap();
        assert_eq!(scanner.mode(), ScannerMode::Body);
    }

    #[test]
    fn test_header_only_source() {
        assert_eq!(
            kinds("@layout"),
            vec![TokenKind::Header("@layout".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_header_span_points_at_declaration() {
        let toks = tokens("@a\n  @b\n");
        assert_eq!(toks[1].span.line, 2);
        assert_eq!(toks[1].span.column, 3);
    }

    // =========================================================================
    // Comments
    // =========================================================================

    #[test]
    fn test_comment_is_elided_and_text_joined() {
        let parts = texts("<h1>A</h1>{{-- c --}}<p>B</p>");
        assert_eq!(parts.concat(), "<h1>A</h1><p>B</p>");
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_comment_produces_no_tokens() {
        assert_eq!(kinds("{{-- only {{ x }} --}}"), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_comment_spanning_lines_keeps_line_numbers() {
        let toks = tokens("{{-- a\nb\nc --}}{{ x }}");
        assert_eq!(toks[1].kind, ident("x"));
        assert_eq!(toks[1].span.line, 3);
    }

    #[test]
    fn test_unterminated_comment() {
        let err = Scanner::tokenize("ok {{-- never closed", "t.glint").unwrap_err();
        assert!(err.message.contains("Unterminated comment"));
        assert_eq!(err.location.column, 4);
    }

    // =========================================================================
    // Whitespace trim markers
    // =========================================================================

    #[test]
    fn test_trim_both_sides() {
        assert_eq!(
            kinds("<p>X</p>   \n  {{- y -}}  \n  <p>Z</p>"),
            vec![
                text("<p>X</p>"),
                TokenKind::Open { trim: true },
                ident("y"),
                TokenKind::Close { trim: true },
                text("<p>Z</p>"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_left_only() {
        assert_eq!(
            texts("a \n {{- x }} b "),
            vec!["a".to_string(), " b ".to_string()]
        );
    }

    #[test]
    fn test_trim_right_only() {
        assert_eq!(
            texts(" a {{ x -}} \n\t b"),
            vec![" a ".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_trim_to_nothing_drops_token() {
        assert_eq!(
            kinds("{{ a -}}   \n  {{- b }}"),
            vec![
                OPEN,
                ident("a"),
                TokenKind::Close { trim: true },
                TokenKind::Open { trim: true },
                ident("b"),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_does_not_cross_next_region() {
        // `-}}` applies only to text that immediately follows it.
        assert_eq!(
            texts("{{ a -}}{{ b }}  c"),
            vec!["  c".to_string()]
        );
    }

    #[test]
    fn test_trim_reaches_through_comment() {
        assert_eq!(texts("{{ a -}}  {{-- c --}}  b"), vec!["b".to_string()]);
    }

    #[test]
    fn test_trim_open_followed_by_negation() {
        assert_eq!(
            kinds("{{- -x }}"),
            vec![
                TokenKind::Open { trim: true },
                TokenKind::Minus,
                ident("x"),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    // =========================================================================
    // Verbatim
    // =========================================================================

    #[test]
    fn test_verbatim_passthrough() {
        assert_eq!(
            kinds("{{ verbatim }}{{ x }}{{ end }}"),
            vec![text("{{ x }}"), TokenKind::Eof]
        );
    }

    #[test]
    fn test_verbatim_keeps_comments_and_whitespace() {
        assert_eq!(
            kinds("a{{verbatim}} {{-- c --}} {{-x-}} {{end}}b"),
            vec![
                text("a"),
                text(" {{-- c --}} {{-x-}} "),
                text("b"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_verbatim_trim_markers_apply_outside() {
        assert_eq!(
            kinds("a  {{- verbatim }} x {{ end -}}  b"),
            vec![text("a"), text(" x "), text("b"), TokenKind::Eof]
        );
    }

    #[test]
    fn test_verbatim_prefix_word_is_identifier() {
        assert_eq!(
            kinds("{{ verbatimx }}"),
            vec![OPEN, ident("verbatimx"), CLOSE, TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_verbatim() {
        let err = Scanner::tokenize("{{ verbatim }} {{ x }}", "t.glint").unwrap_err();
        assert!(err.message.contains("Unterminated verbatim"));
        assert_eq!(err.location.line, 1);
        assert_eq!(err.location.column, 1);
    }

    // =========================================================================
    // Keywords, identifiers, literals
    // =========================================================================

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("{{ for item in items }}"),
            vec![
                OPEN,
                TokenKind::Keyword(Keyword::For),
                ident("item"),
                TokenKind::Keyword(Keyword::In),
                ident("items"),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_all_directive_keywords() {
        let words = [
            "if", "else", "end", "for", "in", "switch", "case", "default", "set", "raw",
            "include", "widget", "component", "content", "fragment", "slot", "block",
            "stack", "push",
        ];
        for word in words {
            let k = kinds(&format!("{{{{ {word} }}}}"));
            assert_eq!(k[1], TokenKind::Keyword(Keyword::from_word(word).unwrap()));
            assert_eq!(Keyword::from_word(word).unwrap().as_str(), word);
        }
    }

    #[test]
    fn test_booleans() {
        assert_eq!(
            kinds("{{ true false }}"),
            vec![
                OPEN,
                TokenKind::Boolean(true),
                TokenKind::Boolean(false),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifier_with_underscore_and_digits() {
        assert_eq!(kinds("{{ item_2 }}")[1], ident("item_2"));
    }

    #[test]
    fn test_numbers_keep_raw_text() {
        assert_eq!(
            kinds("{{ 42 3.14 }}"),
            vec![
                OPEN,
                TokenKind::Number("42".into()),
                TokenKind::Number("3.14".into()),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_number_followed_by_dot_method() {
        assert_eq!(
            kinds("{{ 1.abs }}"),
            vec![
                OPEN,
                TokenKind::Number("1".into()),
                TokenKind::Dot,
                ident("abs"),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"{{ "a\"b" 'c\'d' "e\nf" }}"#),
            vec![
                OPEN,
                TokenKind::String("a\"b".into()),
                TokenKind::String("c'd".into()),
                TokenKind::String("e\nf".into()),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_may_contain_close_delimiter() {
        assert_eq!(
            kinds(r#"{{ "}}" }}"#),
            vec![OPEN, TokenKind::String("}}".into()), CLOSE, TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Scanner::tokenize("{{ \"abc }}", "t.glint").unwrap_err();
        assert!(err.message.contains("Unterminated string"));
        assert_eq!(err.location.column, 4);
    }

    // =========================================================================
    // Operators
    // =========================================================================

    #[test]
    fn test_pipe_vs_or() {
        assert_eq!(
            kinds("{{ a | f || b }}"),
            vec![
                OPEN,
                ident("a"),
                TokenKind::Pipe,
                ident("f"),
                TokenKind::OrOr,
                ident("b"),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_question_variants() {
        assert_eq!(
            kinds("{{ a ? b ?. c ?? d : e }}"),
            vec![
                OPEN,
                ident("a"),
                TokenKind::Question,
                ident("b"),
                TokenKind::QuestionDot,
                ident("c"),
                TokenKind::QuestionQuestion,
                ident("d"),
                TokenKind::Colon,
                ident("e"),
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comparison_and_equality_operators() {
        assert_eq!(
            kinds("{{ < <= > >= == != = ! }}"),
            vec![
                OPEN,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Equals,
                TokenKind::Bang,
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_arithmetic_and_punctuation() {
        assert_eq!(
            kinds("{{ + - * / % ~ && . [ ] ( ) , }}"),
            vec![
                OPEN,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Tilde,
                TokenKind::AndAnd,
                TokenKind::Dot,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Comma,
                CLOSE,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_single_ampersand_rejected() {
        let err = Scanner::tokenize("{{ a & b }}", "t.glint").unwrap_err();
        assert!(err.message.contains("Unexpected character: '&'"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Scanner::tokenize("{{ a # b }}", "t.glint").unwrap_err();
        assert_eq!(err.location.column, 6);
    }

    // =========================================================================
    // Regions and positions
    // =========================================================================

    #[test]
    fn test_unterminated_region() {
        let err = Scanner::tokenize("<p>\n  {{ name </p>", "page.glint").unwrap_err();
        assert!(err.message.contains("Unterminated '{{' region"));
        assert_eq!(err.location.file, "page.glint");
        assert_eq!(err.location.line, 2);
        assert_eq!(err.location.column, 3);
    }

    #[test]
    fn test_token_positions() {
        let toks = tokens("ab\n{{ x.y }}");
        assert_eq!(toks[1].span.line, 2);
        assert_eq!(toks[1].span.column, 1);
        assert_eq!(toks[2].lexeme, "x");
        assert_eq!(toks[2].span.column, 4);
        assert_eq!(toks[3].kind, TokenKind::Dot);
        assert_eq!(toks[3].span.column, 5);
    }

    #[test]
    fn test_lexeme_of_operators() {
        let toks = tokens("{{ a ?? b }}");
        assert_eq!(toks[2].lexeme, "??");
        assert_eq!(toks[2].span.end - toks[2].span.start, 2);
    }

    #[test]
    fn test_text_lexeme_is_untrimmed() {
        let toks = tokens("a  {{- x }}");
        assert_eq!(toks[0].kind, text("a"));
        assert_eq!(toks[0].lexeme, "a  ");
    }
}
