//! Newick parser.
//!
//! Accepts nested children, bare or single-quoted labels, optional
//! `:length` suffixes, `[...]` comments and arbitrary whitespace. The tree
//! must end with `;`.

use crate::errors::TreeError;

/// A node as written in the Newick text, before names are resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedNode {
    pub name: Option<String>,
    pub length: Option<f64>,
    pub children: Vec<ParsedNode>,
}

pub(crate) fn parse(input: &str) -> Result<ParsedNode, TreeError> {
    let mut parser = Parser { input, pos: 0 };
    parser.skip_trivia()?;
    if parser.peek().is_none() {
        return Err(TreeError::Empty);
    }
    let root = parser.subtree()?;
    parser.skip_trivia()?;
    parser.expect(b';')?;
    parser.skip_trivia()?;
    if parser.peek().is_some() {
        return Err(parser.error("unexpected text after ';'"));
    }
    Ok(root)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> TreeError {
        TreeError::Syntax {
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), TreeError> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.error(format!(
                "expected '{}', found '{}'",
                byte as char, b as char
            ))),
            None => Err(self.error(format!("expected '{}', found end of input", byte as char))),
        }
    }

    /// Skip whitespace and bracketed comments.
    fn skip_trivia(&mut self) -> Result<(), TreeError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'[') => {
                    let close = self.input[self.pos..]
                        .find(']')
                        .ok_or_else(|| self.error("unterminated comment"))?;
                    self.pos += close + 1;
                }
                _ => return Ok(()),
            }
        }
    }

    fn subtree(&mut self) -> Result<ParsedNode, TreeError> {
        let mut children = Vec::new();
        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                self.skip_trivia()?;
                children.push(self.subtree()?);
                self.skip_trivia()?;
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
            self.skip_trivia()?;
        }

        let name = self.label()?;
        self.skip_trivia()?;
        let length = if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_trivia()?;
            Some(self.number()?)
        } else {
            None
        };

        Ok(ParsedNode {
            name,
            length,
            children,
        })
    }

    fn label(&mut self) -> Result<Option<String>, TreeError> {
        if self.peek() == Some(b'\'') {
            return self.quoted_label().map(Some);
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b"()[]':;,".contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        // Underscores in bare labels stand for blanks.
        Ok(Some(self.input[start..self.pos].replace('_', " ")))
    }

    fn quoted_label(&mut self) -> Result<String, TreeError> {
        self.pos += 1;
        let mut label = String::new();
        loop {
            let rest = &self.input[self.pos..];
            let close = rest
                .find('\'')
                .ok_or_else(|| self.error("unterminated quoted label"))?;
            label.push_str(&rest[..close]);
            self.pos += close + 1;
            // A doubled quote is an escaped quote.
            if self.peek() == Some(b'\'') {
                label.push('\'');
                self.pos += 1;
            } else {
                return Ok(label);
            }
        }
    }

    fn number(&mut self) -> Result<f64, TreeError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>().map_err(|_| TreeError::Syntax {
            position: start,
            reason: format!("invalid branch length '{text}'"),
        })
    }
}
