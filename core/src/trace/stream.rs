//! Character cursor over a single trace line.
//!
//! Every operation is total: past the end of input they report failure or
//! return empty text instead of erroring, so grammar rules can freely try one
//! alternative and fall through to the next.

/// Characters skipped between tokens.
pub const WHITESPACE: &str = " \t\r\n";

/// Cursor over one line of raw trace text.
///
/// The stream is `Copy`: speculative parsing works on a copy and only the
/// copy's position moves.
#[derive(Debug, Clone, Copy)]
pub struct Stream<'a> {
    text: &'a str,
    pos: usize,
    token_start: usize,
}

impl<'a> Stream<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            token_start: 0,
        }
    }

    /// Byte offset of the cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed remainder of the line.
    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Look at the next character without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Consume and return the next character.
    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consume one character if it belongs to `set`.
    pub fn eat(&mut self, set: &str) -> bool {
        match self.peek() {
            Some(c) if set.contains(c) => {
                self.pos += c.len_utf8();
                true
            }
            _ => false,
        }
    }

    /// Greedily consume characters from `set`, returning how many were eaten.
    pub fn eat_while(&mut self, set: &str) -> usize {
        self.eat_while_matching(|c| set.contains(c))
    }

    /// Greedily consume characters accepted by `pred`.
    pub fn eat_while_matching<F: Fn(char) -> bool>(&mut self, pred: F) -> usize {
        let mut eaten = 0;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
            eaten += 1;
        }
        eaten
    }

    /// Consume everything up to (not including) the first character in `set`.
    pub fn eat_until(&mut self, set: &str) -> usize {
        self.eat_while_matching(|c| !set.contains(c))
    }

    pub fn skip_whitespace(&mut self) {
        self.eat_while(WHITESPACE);
    }

    /// Eat exactly one character from `set` as a standalone token, skipping
    /// whitespace on both sides.
    pub fn eat_token(&mut self, set: &str) -> bool {
        self.skip_whitespace();
        let eaten = self.eat(set);
        self.skip_whitespace();
        eaten
    }

    /// Skip whitespace and mark the start of a new token.
    pub fn start_token(&mut self) {
        self.skip_whitespace();
        self.token_start = self.pos;
    }

    /// Text between the last `start_token` and the cursor.
    pub fn current_token(&self) -> &'a str {
        &self.text[self.token_start.min(self.pos)..self.pos]
    }
}
