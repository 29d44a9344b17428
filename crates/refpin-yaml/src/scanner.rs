//! Block-structure scanner
//!
//! Walks text that `serde_yaml` has already accepted and records where every
//! scalar lives. It models block mappings, block sequences, plain, quoted and
//! block scalars, comments, anchors and tags. Flow collections and aliases
//! are kept as opaque spans.

use crate::document::{
    join_path, BlockLayout, Chomping, MapEntry, Mapping, Node, ScalarHandle, ScalarToken, Sequence,
};
use crate::error::{Location, ParseError};
use crate::quoting::ScalarStyle;

type ScanResult<T> = Result<T, ParseError>;

struct KeyScan {
    text: String,
    after_colon: usize,
}

pub(crate) struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    line_starts: &'a [usize],
    pos: usize,
    tokens: Vec<ScalarToken>,
}

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

#[inline]
fn is_break(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(src: &'a str, line_starts: &'a [usize]) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            line_starts,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    /// Scan the whole stream into a root node and its token arena
    pub(crate) fn scan(mut self) -> ScanResult<(Option<Node>, Vec<ScalarToken>)> {
        let root = self.parse_document()?;
        Ok((root, self.tokens))
    }

    // ── cursor helpers ────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn ws_or_end(&self, idx: usize) -> bool {
        self.bytes
            .get(idx)
            .map_or(true, |&b| is_blank(b) || is_break(b))
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    fn column_of(&self, offset: usize) -> usize {
        offset - self.line_starts[self.line_of(offset)]
    }

    fn location(&self, offset: usize) -> Location {
        let line = self.line_of(offset);
        let start = self.line_starts[line];
        let column = self.src[start..offset].chars().count();
        Location::new(line + 1, column + 1)
    }

    fn skip_blanks(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
    }

    fn line_end_from(&self, mut idx: usize) -> usize {
        while idx < self.bytes.len() && !is_break(self.bytes[idx]) {
            idx += 1;
        }
        idx
    }

    fn next_line_from(&self, idx: usize) -> Option<usize> {
        let end = self.line_end_from(idx);
        match self.bytes.get(end) {
            Some(b'\r') if self.bytes.get(end + 1) == Some(&b'\n') => Some(end + 2),
            Some(_) => Some(end + 1),
            None => None,
        }
    }

    /// After blanks: end of input, a line break or a comment
    fn at_line_end(&mut self) -> bool {
        self.skip_blanks();
        match self.peek() {
            None => true,
            Some(b) => is_break(b) || b == b'#',
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            self.skip_blanks();
            match self.peek() {
                Some(b'#') => self.pos = self.line_end_from(self.pos),
                Some(b) if is_break(b) => self.pos += 1,
                _ => break,
            }
        }
    }

    fn at_marker(&self, marker: &[u8; 3]) -> bool {
        self.column_of(self.pos) == 0
            && self.bytes[self.pos..].starts_with(marker)
            && self.ws_or_end(self.pos + 3)
    }

    fn at_document_boundary(&self) -> bool {
        self.at_end() || self.at_marker(b"---") || self.at_marker(b"...")
    }

    fn is_sequence_entry(&self, idx: usize) -> bool {
        self.bytes.get(idx) == Some(&b'-') && self.ws_or_end(idx + 1)
    }

    fn push_token(&mut self, token: ScalarToken) -> Node {
        self.tokens.push(token);
        Node::Scalar(ScalarHandle(self.tokens.len() - 1))
    }

    // ── structure ─────────────────────────────────────────────────────────

    fn parse_document(&mut self) -> ScanResult<Option<Node>> {
        self.skip_trivia();
        while self.peek() == Some(b'%') && self.column_of(self.pos) == 0 {
            self.pos = self.line_end_from(self.pos);
            self.skip_trivia();
        }

        if !self.at_end() && self.at_marker(b"---") {
            self.pos += 3;
            if !self.at_line_end() {
                let root = self.parse_node(-1, "")?;
                return self.finish(Some(root));
            }
            self.skip_trivia();
        }

        if self.at_document_boundary() {
            return self.finish(None);
        }
        let root = self.parse_node(-1, "")?;
        self.finish(Some(root))
    }

    fn finish(&mut self, root: Option<Node>) -> ScanResult<Option<Node>> {
        self.skip_trivia();
        if !self.at_end() && self.at_marker(b"...") {
            self.pos += 3;
            self.skip_trivia();
        }
        if self.at_end() {
            return Ok(root);
        }
        let location = Some(self.location(self.pos));
        if self.at_marker(b"---") {
            return Err(ParseError::MultipleDocuments { location });
        }
        Err(ParseError::Unsupported {
            message: "unexpected content after the document".to_string(),
            location,
        })
    }

    /// Parse the node starting at the cursor
    ///
    /// `parent_indent` is the column of the enclosing collection (-1 at the
    /// root); continuation lines must be indented further than it.
    fn parse_node(&mut self, parent_indent: isize, path: &str) -> ScanResult<Node> {
        let start = self.pos;
        let (tag, has_properties) = self.parse_properties();
        if has_properties && self.at_line_end() {
            return self.parse_indented_value(parent_indent, path, false);
        }

        match self.peek() {
            Some(b'-') if self.is_sequence_entry(self.pos) => self.parse_sequence(path),
            Some(b'|' | b'>') => Ok(self.parse_block_scalar(parent_indent, tag)),
            Some(b'[' | b'{') => {
                self.skip_flow_collection()?;
                Ok(Node::Opaque { offset: start })
            }
            Some(b'*') => {
                while !self.ws_or_end(self.pos) {
                    self.pos += 1;
                }
                Ok(Node::Opaque { offset: start })
            }
            Some(b'?') if self.ws_or_end(self.pos + 1) => Err(ParseError::unsupported(
                "explicit mapping keys",
                self.location(self.pos),
            )),
            _ if self.scan_key(self.pos)?.is_some() => {
                let column = self.column_of(start);
                self.parse_mapping(column, path)
            }
            _ => self.parse_flow_scalar(parent_indent, tag),
        }
    }

    /// Value that starts on a later line (after `key:`, `-` or properties)
    fn parse_indented_value(
        &mut self,
        parent_indent: isize,
        path: &str,
        allow_same_column_sequence: bool,
    ) -> ScanResult<Node> {
        let empty_at = self.pos;
        self.skip_trivia();
        if self.at_document_boundary() {
            return Ok(Node::Empty { offset: empty_at });
        }
        let column = self.column_of(self.pos) as isize;
        if column > parent_indent {
            return self.parse_node(parent_indent, path);
        }
        if allow_same_column_sequence
            && column == parent_indent
            && self.is_sequence_entry(self.pos)
        {
            return self.parse_sequence(path);
        }
        Ok(Node::Empty { offset: empty_at })
    }

    fn parse_mapping(&mut self, column: usize, path: &str) -> ScanResult<Node> {
        let offset = self.pos;
        let mut entries = Vec::new();
        loop {
            let key_offset = self.pos;
            let key = self.scan_key(self.pos)?.ok_or_else(|| {
                ParseError::unsupported("expected a mapping key", self.location(self.pos))
            })?;
            self.pos = key.after_colon;
            let child_path = join_path(path, &key.text);

            let value = if self.at_line_end() {
                self.parse_indented_value(column as isize, &child_path, true)?
            } else {
                self.parse_node(column as isize, &child_path)?
            };
            entries.push(MapEntry {
                key: key.text,
                key_offset,
                value,
            });

            self.skip_trivia();
            if self.at_document_boundary() {
                break;
            }
            let next = self.column_of(self.pos);
            if next == column && !self.is_sequence_entry(self.pos) {
                continue;
            }
            if next > column {
                return Err(ParseError::unsupported(
                    "unexpected indentation",
                    self.location(self.pos),
                ));
            }
            break;
        }

        Ok(Node::Mapping(Mapping {
            path: path.to_string(),
            offset,
            entries,
        }))
    }

    fn parse_sequence(&mut self, path: &str) -> ScanResult<Node> {
        let offset = self.pos;
        let column = self.column_of(self.pos);
        let mut items = Vec::new();
        loop {
            self.pos += 1;
            let item_path = format!("{path}[{}]", items.len());
            let item = if self.at_line_end() {
                self.parse_indented_value(column as isize, &item_path, false)?
            } else {
                self.parse_node(column as isize, &item_path)?
            };
            items.push(item);

            self.skip_trivia();
            if self.at_document_boundary() {
                break;
            }
            let next = self.column_of(self.pos);
            if next == column && self.is_sequence_entry(self.pos) {
                continue;
            }
            if next > column {
                return Err(ParseError::unsupported(
                    "unexpected indentation",
                    self.location(self.pos),
                ));
            }
            break;
        }

        Ok(Node::Sequence(Sequence {
            path: path.to_string(),
            offset,
            items,
        }))
    }

    /// Skip `&anchor` and `!tag` properties, returning the tag
    fn parse_properties(&mut self) -> (Option<String>, bool) {
        let mut tag = None;
        let mut seen = false;
        while let Some(b @ (b'&' | b'!')) = self.peek() {
            let start = self.pos;
            while !self.ws_or_end(self.pos) {
                self.pos += 1;
            }
            if b == b'!' {
                tag = Some(self.src[start..self.pos].to_string());
            }
            seen = true;
            self.skip_blanks();
        }
        (tag, seen)
    }

    /// Recognize `key:` at `idx` without moving the cursor
    fn scan_key(&self, idx: usize) -> ScanResult<Option<KeyScan>> {
        let Some(&first) = self.bytes.get(idx) else {
            return Ok(None);
        };

        if first == b'\'' || first == b'"' {
            let line_end = self.line_end_from(idx);
            let Some(close) = self.find_closing_quote(idx, line_end) else {
                return Ok(None);
            };
            let mut after = close + 1;
            while after < line_end && is_blank(self.bytes[after]) {
                after += 1;
            }
            if self.bytes.get(after) != Some(&b':') || !self.ws_or_end(after + 1) {
                return Ok(None);
            }
            let content = &self.src[idx + 1..close];
            let text = if first == b'\'' {
                decode_single(content)
            } else {
                decode_double(content)
            };
            return Ok(Some(KeyScan {
                text,
                after_colon: after + 1,
            }));
        }

        if matches!(
            first,
            b'[' | b'{' | b'&' | b'*' | b'!' | b'|' | b'>' | b'%' | b'@' | b'`' | b'#'
        ) {
            return Ok(None);
        }
        if matches!(first, b'-' | b'?' | b':') && self.ws_or_end(idx + 1) {
            return Ok(None);
        }

        let mut i = idx;
        while i < self.bytes.len() && !is_break(self.bytes[i]) {
            match self.bytes[i] {
                b':' if self.ws_or_end(i + 1) => {
                    let text = self.src[idx..i].trim_end().to_string();
                    return Ok(Some(KeyScan {
                        text,
                        after_colon: i + 1,
                    }));
                }
                b'#' if i > idx && is_blank(self.bytes[i - 1]) => return Ok(None),
                _ => i += 1,
            }
        }
        Ok(None)
    }

    fn find_closing_quote(&self, open: usize, limit: usize) -> Option<usize> {
        let quote = self.bytes[open];
        let mut i = open + 1;
        while i < limit {
            let b = self.bytes[i];
            if quote == b'\'' && b == b'\'' {
                if self.bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                return Some(i);
            }
            if quote == b'"' {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == b'"' {
                    return Some(i);
                }
            }
            i += 1;
        }
        None
    }

    fn skip_flow_collection(&mut self) -> ScanResult<()> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'[' | b'{' => depth += 1,
                b']' | b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                b'\'' | b'"' if self.opens_flow_quote(start) => {
                    let close = self
                        .find_closing_quote(self.pos, self.bytes.len())
                        .ok_or_else(|| ParseError::Syntax {
                            message: "unterminated quoted scalar".to_string(),
                            location: Some(self.location(self.pos)),
                        })?;
                    self.pos = close;
                }
                b'#' if self.pos > start && is_blank(self.bytes[self.pos - 1]) => {
                    self.pos = self.line_end_from(self.pos);
                    continue;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(ParseError::Syntax {
            message: "unterminated flow collection".to_string(),
            location: Some(self.location(start)),
        })
    }

    fn opens_flow_quote(&self, start: usize) -> bool {
        self.pos == start
            || matches!(
                self.bytes[self.pos - 1],
                b'[' | b'{' | b',' | b':' | b' ' | b'\t' | b'\n' | b'\r'
            )
    }

    // ── scalars ───────────────────────────────────────────────────────────

    fn parse_flow_scalar(&mut self, parent_indent: isize, tag: Option<String>) -> ScanResult<Node> {
        let start = self.pos;
        let (end, style, value) = match self.peek() {
            Some(quote @ (b'\'' | b'"')) => {
                let close = self
                    .find_closing_quote(start, self.bytes.len())
                    .ok_or_else(|| ParseError::Syntax {
                        message: "unterminated quoted scalar".to_string(),
                        location: Some(self.location(start)),
                    })?;
                let content = &self.src[start + 1..close];
                if quote == b'\'' {
                    (close + 1, ScalarStyle::SingleQuoted, decode_single(content))
                } else {
                    (close + 1, ScalarStyle::DoubleQuoted, decode_double(content))
                }
            }
            _ => {
                let (end, value) = self.scan_plain(start, parent_indent);
                (end, ScalarStyle::Plain, value)
            }
        };

        self.pos = end;
        Ok(self.push_token(ScalarToken {
            span: start..end,
            style,
            tag,
            raw: self.src[start..end].to_string(),
            value,
            block: None,
            dirty: false,
        }))
    }

    /// End of plain text on one line: stops at a comment, trims trailing blanks
    fn plain_line_end(&self, from: usize) -> usize {
        let mut i = from;
        while i < self.bytes.len() && !is_break(self.bytes[i]) {
            if self.bytes[i] == b'#' && i > from && is_blank(self.bytes[i - 1]) {
                break;
            }
            i += 1;
        }
        while i > from && is_blank(self.bytes[i - 1]) {
            i -= 1;
        }
        i
    }

    fn scan_plain(&self, start: usize, parent_indent: isize) -> (usize, String) {
        let mut end = self.plain_line_end(start);
        let mut value = self.src[start..end].to_string();

        let mut probe = end;
        'lines: while let Some(mut line) = self.next_line_from(probe) {
            let mut empty_lines = 0;
            let content = loop {
                let mut i = line;
                while i < self.bytes.len() && is_blank(self.bytes[i]) {
                    i += 1;
                }
                match self.bytes.get(i) {
                    None => break 'lines,
                    Some(&b) if is_break(b) => {
                        empty_lines += 1;
                        match self.next_line_from(i) {
                            Some(next) => line = next,
                            None => break 'lines,
                        }
                    }
                    Some(_) => break i,
                }
            };

            let indent = (content - line) as isize;
            let at_marker = indent == 0
                && (self.bytes[content..].starts_with(b"---")
                    || self.bytes[content..].starts_with(b"..."));
            if indent <= parent_indent || self.bytes[content] == b'#' || at_marker {
                break;
            }

            let line_end = self.plain_line_end(content);
            if empty_lines == 0 {
                value.push(' ');
            } else {
                value.push_str(&"\n".repeat(empty_lines));
            }
            value.push_str(&self.src[content..line_end]);
            end = line_end;
            probe = line_end;
        }

        (end, value)
    }

    fn parse_block_scalar(&mut self, parent_indent: isize, tag: Option<String>) -> Node {
        let src = self.src;
        let start = self.pos;
        let style = if self.bytes[start] == b'|' {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };

        let mut chomping = Chomping::Clip;
        let mut explicit = None;
        let mut i = start + 1;
        while let Some(&b) = self.bytes.get(i) {
            match b {
                b'+' => chomping = Chomping::Keep,
                b'-' => chomping = Chomping::Strip,
                b'1'..=b'9' => explicit = Some(usize::from(b - b'0')),
                _ => break,
            }
            i += 1;
        }

        let mut header_end = self.line_end_from(start);
        if header_end > start && self.bytes[header_end - 1] == b'\r' {
            header_end -= 1;
        }
        let base = usize::try_from(parent_indent.max(0)).unwrap_or(0);
        let mut content_indent = explicit.map(|digit| base + digit);

        let mut lines: Vec<&str> = Vec::new();
        let mut pending_empty = 0usize;
        let mut end = header_end;
        let mut cursor = self.next_line_from(start);
        while let Some(line) = cursor {
            if line >= self.bytes.len() {
                break;
            }
            let line_end = self.line_end_from(line);
            let text = src[line..line_end].trim_end_matches('\r');
            if text.trim_matches([' ', '\t']).is_empty() {
                pending_empty += 1;
                cursor = self.next_line_from(line);
                continue;
            }
            let indent = text.len() - text.trim_start_matches(' ').len();
            if (indent as isize) <= parent_indent {
                break;
            }
            let required = *content_indent.get_or_insert(indent);
            if indent < required {
                break;
            }
            lines.extend(std::iter::repeat("").take(pending_empty));
            pending_empty = 0;
            lines.push(&text[required..]);
            end = line + text.len();
            cursor = self.next_line_from(line);
        }

        let body = if style == ScalarStyle::Literal {
            lines.join("\n")
        } else {
            fold_block_lines(&lines)
        };
        let value = match chomping {
            _ if lines.is_empty() => String::new(),
            Chomping::Strip => body,
            Chomping::Clip => format!("{body}\n"),
            Chomping::Keep => format!("{body}\n{}", "\n".repeat(pending_empty)),
        };

        self.pos = end;
        let layout = BlockLayout {
            header: src[start..header_end].to_string(),
            indent: content_indent.unwrap_or(base + 2),
            chomping,
        };
        self.push_token(ScalarToken {
            span: start..end,
            style,
            tag,
            raw: src[start..end].to_string(),
            value,
            block: Some(layout),
            dirty: false,
        })
    }
}

/// Fold the line breaks of a multi-line quoted scalar
fn fold_quoted_lines(content: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.len() == 1 {
        return content.to_string();
    }

    let mut out = lines[0].trim_end_matches([' ', '\t', '\r']).to_string();
    let mut empty_lines = 0;
    let last = lines.len() - 1;
    for (idx, line) in lines.iter().enumerate().skip(1) {
        let trimmed = if idx == last {
            line.trim_start_matches([' ', '\t'])
        } else {
            line.trim_matches([' ', '\t', '\r'])
        };
        if trimmed.is_empty() && idx != last {
            empty_lines += 1;
            continue;
        }
        if empty_lines == 0 {
            out.push(' ');
        } else {
            out.push_str(&"\n".repeat(empty_lines));
        }
        empty_lines = 0;
        out.push_str(trimmed);
    }
    out
}

pub(crate) fn decode_single(content: &str) -> String {
    fold_quoted_lines(content).replace("''", "'")
}

pub(crate) fn decode_double(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t' | '\t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('a') => out.push('\u{7}'),
                Some('b') => out.push('\u{8}'),
                Some('e') => out.push('\u{1b}'),
                Some('f') => out.push('\u{c}'),
                Some('v') => out.push('\u{b}'),
                Some('N') => out.push('\u{85}'),
                Some('_') => out.push('\u{a0}'),
                Some('L') => out.push('\u{2028}'),
                Some('P') => out.push('\u{2029}'),
                Some(digits @ ('x' | 'u' | 'U')) => {
                    let width = match digits {
                        'x' => 2,
                        'u' => 4,
                        _ => 8,
                    };
                    let hex: String = chars.by_ref().take(width).collect();
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    out.push(decoded);
                }
                Some('\r' | '\n') => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    while chars.peek().is_some_and(|c| *c == ' ' || *c == '\t') {
                        chars.next();
                    }
                }
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                while out.ends_with([' ', '\t']) {
                    out.pop();
                }
                let mut empty_lines = 0;
                loop {
                    while chars.peek().is_some_and(|c| *c == ' ' || *c == '\t') {
                        chars.next();
                    }
                    match chars.peek() {
                        Some('\r') => {
                            chars.next();
                            if chars.peek() == Some(&'\n') {
                                chars.next();
                            }
                            empty_lines += 1;
                        }
                        Some('\n') => {
                            chars.next();
                            empty_lines += 1;
                        }
                        _ => break,
                    }
                }
                if empty_lines == 0 {
                    out.push(' ');
                } else {
                    out.push_str(&"\n".repeat(empty_lines));
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn fold_block_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    let mut previous: Option<&str> = None;
    let mut empty_lines = 0;
    for line in lines {
        if line.is_empty() {
            empty_lines += 1;
            continue;
        }
        match previous {
            Some(prev) if prev.starts_with([' ', '\t']) || line.starts_with([' ', '\t']) => {
                out.push_str(&"\n".repeat(empty_lines + 1));
            }
            Some(_) if empty_lines == 0 => out.push(' '),
            _ => out.push_str(&"\n".repeat(empty_lines)),
        }
        empty_lines = 0;
        out.push_str(line);
        previous = Some(line);
    }
    out
}
