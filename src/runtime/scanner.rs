/// A whitespace-separated word of IR text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub line: usize,
}

/// Splits IR text into tokens. `;` starts a comment running to the end of
/// the line.
#[derive(Debug)]
pub struct Scanner<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    last_line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut last_line = 1;
        for (i, raw) in source.lines().enumerate() {
            let line = i + 1;
            last_line = line;
            let code = raw.split_once(';').map_or(raw, |(code, _)| code);
            tokens.extend(code.split_whitespace().map(|text| Token { text, line }));
        }
        Self {
            tokens,
            pos: 0,
            last_line,
        }
    }

    pub fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    pub fn next_token(&mut self) -> Option<Token<'a>> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    /// Line to blame for an error at the current position.
    pub fn line(&self) -> usize {
        match self.peek() {
            Some(token) => token.line,
            None => self.last_line,
        }
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}
