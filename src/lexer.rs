use crate::ast::{ODataVersion, Token, TokenKind};
use crate::literal::parse_duration;
use std::fmt;

/// Error raised when no transition of the tokenizer matches the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    /// Character offset into the input
    pub index: usize,
    /// The input starting at `index`, truncated
    pub fragment: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at index {} near '{}'",
            self.message, self.index, self.fragment
        )
    }
}

impl std::error::Error for LexError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PathStart,
    PathSeparator,
    ParamOpen,
    ParamName,
    ParamEq,
    ParamValue,
    ParamEnd,
    QueryName,
    QueryEq,
    QueryValue,
}

/// Pull-based tokenizer over an OData URL.
///
/// Yields tokens in input order and stops at the first error. Percent-encoded
/// characters take part in the grammar as the character they encode, so
/// `People%28%27O%27%27Neil%27%29` tokenizes like `People('O''Neil')`.
///
/// # Example
///
/// ```text
/// Products?$filter=Name eq 'Milk'
/// Identifier Question QueryName QueryAssign Identifier Whitespace Equal Whitespace String
/// ```
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    state: State,
    version: ODataVersion,
    last: Option<Token>,
    in_query: bool,
    opaque_value: bool,
    failed: bool,
}

impl Tokenizer {
    pub fn new(input: &str, version: ODataVersion) -> Self {
        Tokenizer {
            input: input.chars().collect(),
            position: 0,
            state: State::PathStart,
            version,
            last: None,
            in_query: false,
            opaque_value: false,
            failed: false,
        }
    }

    pub fn version(&self) -> ODataVersion {
        self.version
    }

    /// The input as written, escapes included.
    pub fn source(&self) -> String {
        self.input.iter().collect()
    }

    /// Rewinds to the start of the input.
    pub fn reset(&mut self) {
        self.position = 0;
        self.state = State::PathStart;
        self.last = None;
        self.in_query = false;
        self.opaque_value = false;
        self.failed = false;
    }

    /// Produces the next token, or `None` at the end of the input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        loop {
            if self.position >= self.input.len() {
                return Ok(None);
            }
            let produced = match self.state {
                State::PathStart => self.path_start(),
                State::PathSeparator => self.path_separator(),
                State::ParamOpen => self.param_open(),
                State::ParamName => self.param_name(),
                State::ParamEq => self.param_eq(),
                State::ParamValue => self.param_value(),
                State::ParamEnd => self.param_end(),
                State::QueryName => self.query_name(),
                State::QueryEq => self.query_eq(),
                State::QueryValue => self.query_value(),
            }?;
            if let Some(token) = produced {
                return Ok(Some(token));
            }
        }
    }

    // ========================================
    // States
    // ========================================

    fn path_start(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        let mut at = start;
        while let Some((c, next)) = self.peek_at(at) {
            let raw = self.input[at];
            match c {
                ':' if raw == ':' => {
                    if start == 0 && at > 0 && self.matches(next, "//").is_some() {
                        self.state = State::PathSeparator;
                        return Ok(Some(self.emit(TokenKind::Scheme, start, at)));
                    }
                    if at > start && self.last_text() == Some("://") {
                        self.state = State::PathSeparator;
                        return Ok(Some(self.emit(TokenKind::Authority, start, at)));
                    }
                }
                '/' | '?' if raw == c => {
                    self.state = State::PathSeparator;
                    if at > start {
                        let kind = self.segment_kind();
                        return Ok(Some(self.emit(kind, start, at)));
                    }
                    return Ok(None);
                }
                '=' if raw == '=' => {
                    self.in_query = true;
                    self.state = State::QueryEq;
                    let token = self.emit(TokenKind::QueryName, start, at);
                    self.begin_option(token.text());
                    return Ok(Some(token));
                }
                '(' => {
                    self.state = State::ParamOpen;
                    if at > start {
                        return Ok(Some(self.emit(TokenKind::Identifier, start, at)));
                    }
                    self.position = at;
                    return Ok(None);
                }
                _ => {}
            }
            at = next;
        }
        let kind = self.segment_kind();
        Ok(Some(self.emit(kind, start, at)))
    }

    fn path_separator(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        let mut at = start;
        while let Some(&raw) = self.input.get(at) {
            if raw != '/' && raw != ':' {
                break;
            }
            at += 1;
        }
        if at > start {
            self.state = State::PathStart;
            return Ok(Some(self.emit(TokenKind::PathSeparator, start, at)));
        }
        if self.input[start] == '?' {
            self.in_query = true;
            self.state = State::QueryName;
            return Ok(Some(self.emit(TokenKind::Question, start, start + 1)));
        }
        self.state = State::PathStart;
        Ok(None)
    }

    fn param_open(&mut self) -> Result<Option<Token>, LexError> {
        match self.peek_at(self.position) {
            Some(('(', next)) => {
                self.state = State::ParamName;
                Ok(Some(self.emit(TokenKind::OpenParen, self.position, next)))
            }
            _ => Err(self.error("expected '('")),
        }
    }

    fn param_name(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        if let Some((')', next)) = self.peek_at(start) {
            self.state = State::PathStart;
            return Ok(Some(self.emit(TokenKind::CloseParen, start, next)));
        }
        if let Some(end) = self.identifier_end(start)
            && let Some(('=', _)) = self.peek_at(end)
        {
            self.state = State::ParamEq;
            return Ok(Some(self.emit(TokenKind::Identifier, start, end)));
        }
        self.param_value()
    }

    fn param_eq(&mut self) -> Result<Option<Token>, LexError> {
        match self.peek_at(self.position) {
            Some(('=', next)) => {
                self.state = State::ParamValue;
                Ok(Some(self.emit(TokenKind::QueryAssign, self.position, next)))
            }
            _ => Err(self.error("expected '='")),
        }
    }

    fn param_value(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        if let Some(end) = self.alias_end(start) {
            self.state = State::ParamEnd;
            return Ok(Some(self.emit(TokenKind::Parameter, start, end)));
        }
        if let Some((kind, end)) = self.literal(start)? {
            self.state = State::ParamEnd;
            return Ok(Some(self.emit(kind, start, end)));
        }
        Err(self.error("expected a key value"))
    }

    fn param_end(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        match self.peek_at(start) {
            Some((',', next)) => {
                self.state = State::ParamName;
                Ok(Some(self.emit(TokenKind::Comma, start, next)))
            }
            Some((')', next)) => {
                self.state = State::PathStart;
                Ok(Some(self.emit(TokenKind::CloseParen, start, next)))
            }
            _ => Err(self.error("expected ',' or ')'")),
        }
    }

    fn query_name(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        if self.input[start] == '&' {
            return Ok(Some(self.emit(TokenKind::Ampersand, start, start + 1)));
        }
        let (kind, end) = match self.peek_at(start) {
            Some(('@', _)) => match self.alias_end(start) {
                Some(end) => (TokenKind::Parameter, end),
                None => return Err(self.error("expected an alias name")),
            },
            Some(('$', next)) => match self.identifier_end(next) {
                Some(end) => (TokenKind::QueryName, end),
                None => return Err(self.error("expected a query option name")),
            },
            _ => {
                let mut end = start;
                while let Some(&raw) = self.input.get(end) {
                    if raw == '=' || raw == '&' {
                        break;
                    }
                    end += 1;
                }
                (TokenKind::QueryName, end)
            }
        };
        self.state = State::QueryEq;
        let token = self.emit(kind, start, end);
        self.begin_option(token.text());
        Ok(Some(token))
    }

    fn query_eq(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        self.state = State::QueryValue;
        if self.input[start] == '=' {
            return Ok(Some(self.emit(TokenKind::QueryAssign, start, start + 1)));
        }
        Ok(None)
    }

    fn query_value(&mut self) -> Result<Option<Token>, LexError> {
        let start = self.position;
        let raw = self.input[start];
        if raw == '&' {
            self.state = State::QueryName;
            return Ok(Some(self.emit(TokenKind::Ampersand, start, start + 1)));
        }
        if self.opaque_value {
            let mut end = start;
            while self.input.get(end).is_some_and(|&c| c != '&') {
                end += 1;
            }
            return Ok(Some(self.emit(TokenKind::Identifier, start, end)));
        }
        let Some((c, next)) = self.peek_at(start) else {
            return Ok(None);
        };

        let structural = match c {
            '*' => Some(TokenKind::Star),
            '.' => Some(TokenKind::Period),
            '/' => Some(TokenKind::Navigation),
            ',' => Some(TokenKind::Comma),
            '(' => Some(TokenKind::OpenParen),
            ')' => Some(TokenKind::CloseParen),
            ':' => Some(TokenKind::Colon),
            _ => None,
        };
        if let Some(kind) = structural {
            return Ok(Some(self.emit(kind, start, next)));
        }

        if c == '$' {
            return match self.identifier_end(next) {
                Some(end) => Ok(Some(self.emit(TokenKind::Identifier, start, end))),
                None => Err(self.error("expected an identifier after '$'")),
            };
        }

        if self.is_whitespace_at(start) {
            let mut end = start;
            while self.is_whitespace_at(end) {
                end = self.peek_at(end).map_or(end + 1, |(_, n)| n);
            }
            return Ok(Some(self.emit(TokenKind::Whitespace, start, end)));
        }

        if let Some((kind, end)) = self.keyword(start) {
            return Ok(Some(self.emit(kind, start, end)));
        }
        if let Some((kind, end)) = self.literal(start)? {
            return Ok(Some(self.emit(kind, start, end)));
        }
        if let Some(end) = self.alias_end(start) {
            return Ok(Some(self.emit(TokenKind::Parameter, start, end)));
        }
        if let Some(end) = self.identifier_end(start) {
            return Ok(Some(self.emit(TokenKind::Identifier, start, end)));
        }
        if c == '-' {
            return Ok(Some(self.emit(TokenKind::Negate, start, next)));
        }
        Err(self.error("unexpected character in query value"))
    }

    // ========================================
    // Literals
    // ========================================

    /// Tries every literal form that can start with the character at `at`.
    fn literal(&self, at: usize) -> Result<Option<(TokenKind, usize)>, LexError> {
        let Some((c, _)) = self.peek_at(at) else {
            return Ok(None);
        };
        let found = match c {
            '\'' => return self.string(at).map(Some),
            'n' => self.word(at, "null", TokenKind::Null),
            'N' => self.nan(at),
            't' => self
                .word(at, "true", TokenKind::True)
                .or_else(|| self.duration(at)),
            'f' => self
                .word(at, "false", TokenKind::False)
                .or_else(|| self.guid(at)),
            'b' => self.binary(at).or_else(|| self.guid(at)),
            'd' => self
                .duration(at)
                .or_else(|| self.date_time(at))
                .or_else(|| self.guid(at)),
            'g' => self.guid(at),
            'X' => self.binary(at),
            'I' => self.infinity(at),
            '-' | '+' => self.infinity(at).or_else(|| self.number(at)),
            c if c.is_ascii_digit() => self
                .guid(at)
                .or_else(|| self.date_time(at))
                .or_else(|| self.time_of_day(at))
                .or_else(|| self.number(at)),
            c if c.is_ascii_hexdigit() => self.guid(at),
            _ => None,
        };
        Ok(found)
    }

    fn string(&self, at: usize) -> Result<(TokenKind, usize), LexError> {
        let mut pos = at + self.width(at);
        loop {
            match self.peek_at(pos) {
                None => return Err(self.error_at(at, "unterminated string literal")),
                Some(('\'', next)) => {
                    if let Some(('\'', after)) = self.peek_at(next) {
                        pos = after;
                        continue;
                    }
                    return Ok((TokenKind::String, next));
                }
                Some((_, next)) => pos = next,
            }
        }
    }

    fn word(&self, at: usize, word: &str, kind: TokenKind) -> Option<(TokenKind, usize)> {
        let end = self.matches(at, word)?;
        (!self.ident_follows(end)).then_some((kind, end))
    }

    fn nan(&self, at: usize) -> Option<(TokenKind, usize)> {
        let end = self.matches(at, "NaN")?;
        self.float_suffix(end).map(|end| (TokenKind::NaN, end))
    }

    fn infinity(&self, at: usize) -> Option<(TokenKind, usize)> {
        let (kind, pos) = match self.matches(at, "-") {
            Some(pos) => (TokenKind::NegInfinity, pos),
            None => (TokenKind::PosInfinity, at),
        };
        let end = self.matches(pos, "INF")?;
        self.float_suffix(end).map(|end| (kind, end))
    }

    /// Accepts an optional `d`/`f` suffix (v2/v3 only) and rejects a trailing
    /// identifier character.
    fn float_suffix(&self, end: usize) -> Option<usize> {
        let end = match self.peek_at(end) {
            Some(('d' | 'D' | 'f' | 'F', next)) if self.version.supports_v2_or_v3() => next,
            _ => end,
        };
        (!self.ident_follows(end)).then_some(end)
    }

    fn guid(&self, at: usize) -> Option<(TokenKind, usize)> {
        if self.version.supports_v4()
            && let Some(end) = self.guid_body(at)
            && !self.ident_follows(end)
        {
            return Some((TokenKind::Guid, end));
        }
        if self.version.supports_v2_or_v3()
            && let Some(pos) = self.matches(at, "guid'")
            && let Some(body) = self.guid_body(pos)
            && let Some(end) = self.matches(body, "'")
        {
            return Some((TokenKind::Guid, end));
        }
        None
    }

    fn guid_body(&self, at: usize) -> Option<usize> {
        let mut pos = at;
        for (i, len) in [8, 4, 4, 4, 12].into_iter().enumerate() {
            if i > 0 {
                pos = self.matches(pos, "-")?;
            }
            pos = self.take(pos, len, |c| c.is_ascii_hexdigit())?;
        }
        Some(pos)
    }

    fn binary(&self, at: usize) -> Option<(TokenKind, usize)> {
        if let Some(pos) = self.matches(at, "binary'") {
            let body_end = self.scan_while(pos, |c| c != '\'');
            let end = self.matches(body_end, "'")?;
            let body = self.decoded(pos, body_end);
            if self.version.supports_v4() && is_base64url(&body) {
                return Some((TokenKind::Base64, end));
            }
            if self.version.supports_v2_or_v3() && is_even_hex(&body) {
                return Some((TokenKind::Binary, end));
            }
            return None;
        }
        if self.version.supports_v2_or_v3()
            && let Some(pos) = self.matches(at, "X'")
        {
            let body_end = self.scan_while(pos, |c| c != '\'');
            let end = self.matches(body_end, "'")?;
            if is_even_hex(&self.decoded(pos, body_end)) {
                return Some((TokenKind::Binary, end));
            }
        }
        None
    }

    fn date_time(&self, at: usize) -> Option<(TokenKind, usize)> {
        let prefixed = if self.version.supports_v2_or_v3() {
            self.matches(at, "datetimeoffset'")
                .or_else(|| self.matches(at, "datetime'"))
        } else {
            None
        };
        let (quoted, mut pos) = match prefixed {
            Some(pos) => (true, pos),
            None if self.version.supports_v4() => (false, at),
            None => return None,
        };

        pos = self.take(pos, 4, |c| c.is_ascii_digit())?;
        pos = self.matches(pos, "-")?;
        pos = self.take(pos, 2, |c| c.is_ascii_digit())?;
        pos = self.matches(pos, "-")?;
        pos = self.take(pos, 2, |c| c.is_ascii_digit())?;

        if let Some(time) = self.matches(pos, "T") {
            pos = self.clock(time)?;
            if let Some(next) = self.matches(pos, "Z") {
                pos = next;
            } else if let Some((c, next)) = self.peek_at(pos)
                && (c == '+' || c == '-')
            {
                let hours = self.take(next, 2, |c| c.is_ascii_digit())?;
                let colon = self.matches(hours, ":")?;
                pos = self.take(colon, 2, |c| c.is_ascii_digit())?;
            }
        }

        if quoted {
            return self.matches(pos, "'").map(|end| (TokenKind::Date, end));
        }
        (!self.ident_follows(pos)).then_some((TokenKind::Date, pos))
    }

    fn time_of_day(&self, at: usize) -> Option<(TokenKind, usize)> {
        let end = self.clock(at)?;
        (!self.ident_follows(end)).then_some((TokenKind::TimeOfDay, end))
    }

    /// `hh:mm[:ss[.fffffff]]`
    fn clock(&self, at: usize) -> Option<usize> {
        let mut pos = self.take(at, 2, |c| c.is_ascii_digit())?;
        pos = self.matches(pos, ":")?;
        pos = self.take(pos, 2, |c| c.is_ascii_digit())?;
        if let Some(colon) = self.matches(pos, ":")
            && let Some(seconds) = self.take(colon, 2, |c| c.is_ascii_digit())
        {
            pos = seconds;
            if let Some(dot) = self.matches(pos, ".") {
                let fraction = self.scan_while(dot, |c| c.is_ascii_digit());
                if fraction > dot {
                    pos = fraction;
                }
            }
        }
        Some(pos)
    }

    fn duration(&self, at: usize) -> Option<(TokenKind, usize)> {
        let pos = if self.version.supports_v4()
            && let Some(pos) = self.matches(at, "duration'")
        {
            pos
        } else if self.version.supports_v2_or_v3()
            && let Some(pos) = self.matches(at, "time'")
        {
            pos
        } else {
            return None;
        };
        let body_end = self.scan_while(pos, |c| c != '\'');
        parse_duration(&self.decoded(pos, body_end))?;
        self.matches(body_end, "'").map(|end| (TokenKind::Duration, end))
    }

    fn number(&self, at: usize) -> Option<(TokenKind, usize)> {
        let mut pos = at;
        if let Some((c, next)) = self.peek_at(pos)
            && (c == '-' || c == '+')
        {
            pos = next;
        }
        let digits = self.scan_while(pos, |c| c.is_ascii_digit());
        if digits == pos {
            return None;
        }
        pos = digits;

        let mut kind = TokenKind::Integer;
        if let Some(dot) = self.matches(pos, ".") {
            let fraction = self.scan_while(dot, |c| c.is_ascii_digit());
            if fraction > dot {
                pos = fraction;
                kind = TokenKind::Double;
            }
        }
        if let Some((c, next)) = self.peek_at(pos)
            && (c == 'e' || c == 'E')
        {
            let mut exponent = next;
            if let Some((sign, after)) = self.peek_at(exponent)
                && (sign == '-' || sign == '+')
            {
                exponent = after;
            }
            let end = self.scan_while(exponent, |c| c.is_ascii_digit());
            if end > exponent {
                pos = end;
                kind = TokenKind::Double;
            }
        }

        if self.version.supports_v2_or_v3()
            && let Some((c, next)) = self.peek_at(pos)
            && !self.ident_follows(next)
        {
            let suffixed = match c {
                'M' | 'm' => Some(TokenKind::Decimal),
                'D' | 'd' => Some(TokenKind::Double),
                'F' | 'f' => Some(TokenKind::Single),
                'L' | 'l' if kind == TokenKind::Integer => Some(TokenKind::Long),
                _ => None,
            };
            if let Some(kind) = suffixed {
                return Some((kind, next));
            }
        }
        Some((kind, pos))
    }

    // ========================================
    // Names and keywords
    // ========================================

    fn keyword(&self, at: usize) -> Option<(TokenKind, usize)> {
        let end = self.scan_while(at, |c| c.is_ascii_lowercase());
        if end == at || self.ident_follows(end) {
            return None;
        }
        TokenKind::keyword(&self.decoded(at, end)).map(|kind| (kind, end))
    }

    fn identifier_end(&self, at: usize) -> Option<usize> {
        match self.peek_at(at) {
            Some((c, next)) if c.is_alphabetic() || c == '_' => {
                Some(self.scan_while(next, is_ident_char))
            }
            _ => None,
        }
    }

    fn alias_end(&self, at: usize) -> Option<usize> {
        match self.peek_at(at) {
            Some(('@', next)) => self.identifier_end(next),
            _ => None,
        }
    }

    fn segment_kind(&self) -> TokenKind {
        match self.last_text() {
            Some("://") => TokenKind::Authority,
            Some(":") => TokenKind::Port,
            _ => TokenKind::Identifier,
        }
    }

    /// Values of options without a `$` or `@` prefix are application data and
    /// are kept as a single identifier.
    fn begin_option(&mut self, name: &str) {
        self.opaque_value = !(name.starts_with('$') || name.starts_with('@'));
    }

    // ========================================
    // Character primitives
    // ========================================

    /// Reads one logical character at `at`, decoding `%XX`. Returns the
    /// character and the position after it.
    fn peek_at(&self, at: usize) -> Option<(char, usize)> {
        let c = *self.input.get(at)?;
        if c == '%'
            && let Some(byte) = self.hex_byte(at + 1)
        {
            return Some((char::from(byte), at + 3));
        }
        Some((c, at + 1))
    }

    fn hex_byte(&self, at: usize) -> Option<u8> {
        let high = self.input.get(at)?.to_digit(16)?;
        let low = self.input.get(at + 1)?.to_digit(16)?;
        u8::try_from(high * 16 + low).ok()
    }

    fn width(&self, at: usize) -> usize {
        self.peek_at(at).map_or(1, |(_, next)| next - at)
    }

    fn matches(&self, at: usize, pattern: &str) -> Option<usize> {
        let mut pos = at;
        for expected in pattern.chars() {
            let (c, next) = self.peek_at(pos)?;
            if c != expected {
                return None;
            }
            pos = next;
        }
        Some(pos)
    }

    fn take(&self, at: usize, count: usize, pred: impl Fn(char) -> bool) -> Option<usize> {
        let mut pos = at;
        for _ in 0..count {
            let (c, next) = self.peek_at(pos)?;
            if !pred(c) {
                return None;
            }
            pos = next;
        }
        Some(pos)
    }

    fn scan_while(&self, at: usize, pred: impl Fn(char) -> bool) -> usize {
        let mut pos = at;
        while let Some((c, next)) = self.peek_at(pos) {
            if !pred(c) {
                break;
            }
            pos = next;
        }
        pos
    }

    fn ident_follows(&self, at: usize) -> bool {
        self.peek_at(at).is_some_and(|(c, _)| is_ident_char(c))
    }

    fn is_whitespace_at(&self, at: usize) -> bool {
        match self.input.get(at) {
            Some('+') => true,
            Some(_) => matches!(self.peek_at(at), Some((' ', _))),
            None => false,
        }
    }

    fn decoded(&self, start: usize, end: usize) -> String {
        let mut out = String::new();
        let mut pos = start;
        while pos < end {
            match self.peek_at(pos) {
                Some((c, next)) => {
                    out.push(c);
                    pos = next;
                }
                None => break,
            }
        }
        out
    }

    fn last_text(&self) -> Option<&str> {
        self.last.as_ref().map(|t| t.text())
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) -> Token {
        let raw: String = self.input[start..end].iter().collect();
        let token = Token::new(kind, percent_decode(&raw, self.in_query));
        log::trace!("{:?} {:?} at {}", kind, token.text(), start);
        self.position = end;
        self.last = Some(token.clone());
        token
    }

    fn error(&self, message: &str) -> LexError {
        self.error_at(self.position, message)
    }

    fn error_at(&self, index: usize, message: &str) -> LexError {
        let end = (index + 20).min(self.input.len());
        LexError {
            message: message.to_string(),
            index,
            fragment: self.input[index.min(end)..end].iter().collect(),
        }
    }
}

impl Iterator for Tokenizer {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_token() {
            Ok(token) => token.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Tokenizes `url` with the literal grammar of `version`.
pub fn tokenize(url: &str, version: ODataVersion) -> Tokenizer {
    Tokenizer::new(url, version)
}

/// Decodes `%XX` escapes, and `+` as a space when `plus_as_space` is set.
/// Malformed escapes are kept as written.
pub fn percent_decode(raw: &str, plus_as_space: bool) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let decoded = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_base64url(body: &str) -> bool {
    body.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=' | '+' | '/'))
}

fn is_even_hex(body: &str) -> bool {
    body.len() % 2 == 0 && body.chars().all(|c| c.is_ascii_hexdigit())
}
