use std::str::Chars;

/// Splits an input line into whitespace-separated terms. Double-quoted
/// spans become single terms with the quotes retained, so the literal
/// parser can tell strings apart from keywords.
pub struct Tokenizer<'a> {
    chars: Chars<'a>,
    pending: Option<char>,
    position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars(),
            pending: None,
            position: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<String>, TokenizeError> {
        let mut terms = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('"') => terms.push(self.quoted_term()?),
                Some(_) => terms.push(self.bare_term()),
            }
        }

        Ok(terms)
    }

    fn bare_term(&mut self) -> String {
        let mut term = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                break;
            }
            term.push(c);
            self.advance();
        }
        term
    }

    fn quoted_term(&mut self) -> Result<String, TokenizeError> {
        let start = self.position;
        let mut term = String::from('"');
        self.advance();

        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    term.push('"');
                    return Ok(term);
                }
                Some(c) => {
                    term.push(c);
                    self.advance();
                }
                None => {
                    return Err(TokenizeError {
                        message: "unterminated string".to_string(),
                        position: start,
                    })
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn peek(&mut self) -> Option<char> {
        if self.pending.is_none() {
            self.pending = self.chars.next();
        }
        self.pending
    }

    fn advance(&mut self) {
        if let Some(c) = self.pending.take() {
            self.position += c.len_utf8();
        } else if let Some(c) = self.chars.next() {
            self.position += c.len_utf8();
        }
    }
}

/// Convenience wrapper for a whole input line.
pub fn tokenize(source: &str) -> Result<Vec<String>, TokenizeError> {
    Tokenizer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        let terms = tokenize("1 2  add\t3 multiply").unwrap();
        assert_eq!(terms, vec!["1", "2", "add", "3", "multiply"]);
    }

    #[test]
    fn empty_input_yields_no_terms() {
        assert_eq!(tokenize("").unwrap(), Vec::<String>::new());
        assert_eq!(tokenize("   \t ").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn quoted_string_is_one_term() {
        let terms = tokenize(r#""hello world" echo"#).unwrap();
        assert_eq!(terms, vec!["\"hello world\"", "echo"]);
    }

    #[test]
    fn quotes_adjacent_to_terms() {
        let terms = tokenize(r#"1 "a b" 2"#).unwrap();
        assert_eq!(terms, vec!["1", "\"a b\"", "2"]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize(r#"1 "oops"#).unwrap_err();
        assert_eq!(err.message, "unterminated string");
        assert_eq!(err.position, 2);
    }
}
