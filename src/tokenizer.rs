use crate::error::{Error, Result};

/// Represents the smallest meaningful units of a textual filter clause such as
/// `amt BETWEEN 10 AND 50` or `name LIKE 'A%'`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // --- Keywords ---
    Between,
    And,
    Like,
    In,

    // --- Identifiers & Literals ---
    /// A column name or a bare word (e.g. `amt`, or `"Order Date"` when quoted).
    Ident(String),
    /// A 64-bit integer literal (e.g., `42`).
    Number(i64),
    /// A string literal, defined between single quotes (e.g., `'Alice'`).
    String(String),
    /// A 64-bit floating-point literal (e.g., `3.14`).
    FloatNumber(f64),
    /// The boolean literal `TRUE`.
    True,
    /// The boolean literal `FALSE`.
    False,

    // --- Symbols ---
    /// Left parenthesis `(`
    LeftParen,
    /// Right parenthesis `)`
    RightParen,
    /// Comma `,`
    Comma,
    /// Greater than
    Greater,
    /// Greater than or equal
    GreaterEqual,
    /// Lower than
    Lower,
    /// Lower than or equal
    LowerEqual,
    /// Equal to
    Equal,
    /// `<>` or `!=`
    NotEqual,

    // --- Special ---
    /// Represents the End Of File/Input.
    Eof,
}

/// A lexical scanner that converts a clause string into a sequence of [Token]s.
pub struct Tokenizer {
    /// The input string stored as a vector of characters for easy iteration.
    input: Vec<char>,
    /// The current position in the character vector.
    position: usize,
}

impl Tokenizer {
    /// Creates a new Tokenizer for the given input string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Processes the entire input and returns a vector of tokens.
    ///
    /// # Errors
    /// Returns an error if an invalid character is encountered or if a literal
    /// (like a string) is malformed.
    ///
    /// # Example
    /// ```
    /// # use tablepipe::tokenizer::{Tokenizer, Token};
    /// let mut t = Tokenizer::new("amt >= 10");
    /// let tokens = t.tokenize().unwrap();
    /// assert_eq!(tokens[1], Token::GreaterEqual);
    /// ```
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            self.skip_whitespace();

            if self.is_at_end() {
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        tokens.push(Token::Eof);
        Ok(tokens)
    }

    /// Identifies the next token based on the character at the current position.
    fn next_token(&mut self) -> Result<Token> {
        let ch = self.current_char();

        match ch {
            '(' => {
                self.advance();
                Ok(Token::LeftParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RightParen)
            }
            ',' => {
                self.advance();
                Ok(Token::Comma)
            }
            '=' => {
                self.advance();
                Ok(Token::Equal)
            }
            '>' => {
                self.advance();
                if self.eat('=') {
                    return Ok(Token::GreaterEqual);
                }
                Ok(Token::Greater)
            }
            '<' => {
                self.advance();
                if self.eat('=') {
                    return Ok(Token::LowerEqual);
                }
                if self.eat('>') {
                    return Ok(Token::NotEqual);
                }
                Ok(Token::Lower)
            }
            '!' => {
                self.advance();
                if self.eat('=') {
                    return Ok(Token::NotEqual);
                }
                Err(Error::Parse("expected '=' after '!'".into()))
            }
            '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),
            c if c.is_ascii_digit() => self.read_number(),
            '\'' => self.read_quoted('\'').map(Token::String),
            '"' | '`' => self.read_quoted(ch).map(Token::Ident),
            _ => Err(Error::Parse(format!("character: {ch:?} is not supported"))),
        }
    }

    // --- Navigation Helpers ---

    /// Returns the character at the current position.
    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Moves the cursor forward by one character.
    fn advance(&mut self) {
        self.position += 1;
    }

    /// Consumes `expected` if it is the current character.
    fn eat(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.current_char() == expected {
            self.advance();
            return true;
        }
        false
    }

    /// Checks if the cursor has reached the end of the input.
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Consumes any whitespace characters (spaces, tabs, newlines).
    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    // --- Extraction Logic ---

    /// Reads a sequence of alphanumeric characters and determines if it's
    /// a reserved keyword or a user-defined identifier.
    ///
    /// Keywords are matched case-insensitively.
    fn read_identifier(&mut self) -> Result<Token> {
        let mut ident = String::new();

        while !self.is_at_end()
            && (self.current_char().is_alphanumeric()
                || self.current_char() == '_'
                || self.current_char() == '.')
        {
            ident.push(self.current_char());
            self.advance();
        }

        match ident.to_uppercase().as_str() {
            "BETWEEN" => Ok(Token::Between),
            "AND" => Ok(Token::And),
            "LIKE" => Ok(Token::Like),
            "IN" => Ok(Token::In),
            "TRUE" => Ok(Token::True),
            "FALSE" => Ok(Token::False),
            _ => Ok(Token::Ident(ident)),
        }
    }

    /// Reads a numeric literal. If a dot `.` is encountered, it returns a
    /// [Token::FloatNumber], otherwise a [Token::Number].
    fn read_number(&mut self) -> Result<Token> {
        let mut number = String::new();
        let mut has_dot = false;

        if self.current_char() == '-' {
            number.push('-');
            self.advance();
        }

        while !self.is_at_end()
            && (self.current_char().is_ascii_digit() || (self.current_char() == '.' && !has_dot))
        {
            if self.current_char() == '.' {
                has_dot = true;
            }
            number.push(self.current_char());
            self.advance();
        }

        if !self.is_at_end() && self.current_char() == '.' {
            return Err(Error::Parse(
                "multiple dots are not allowed for a float".into(),
            ));
        }

        if has_dot {
            return number
                .parse::<f64>()
                .map(Token::FloatNumber)
                .map_err(|e| Error::Parse(format!("{number:?}: {e}")));
        }

        number
            .parse::<i64>()
            .map(Token::Number)
            .map_err(|e| Error::Parse(format!("{number:?}: {e}")))
    }

    /// Reads a literal enclosed in `quote`. Single quotes delimit strings, double
    /// quotes and backticks delimit column names containing spaces.
    fn read_quoted(&mut self, quote: char) -> Result<String> {
        self.advance(); // Skip the opening quote

        let mut string = String::new();
        while !self.is_at_end() && self.current_char() != quote {
            string.push(self.current_char());
            self.advance();
        }

        if self.is_at_end() {
            return Err(Error::Parse(format!("unterminated {quote} literal")));
        }

        // Skip the closing quote
        self.advance();

        Ok(string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_comparison() {
        let mut tokenizer = Tokenizer::new("age >= 18");
        let tokens = tokenizer.tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Ident("age".into()),
                Token::GreaterEqual,
                Token::Number(18),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_not_equal_forms() {
        for input in ["a <> 1", "a != 1"] {
            let tokens = Tokenizer::new(input).tokenize().unwrap();
            assert_eq!(tokens[1], Token::NotEqual);
        }
        assert_eq!(Tokenizer::new("a <= 1").tokenize().unwrap()[1], Token::LowerEqual);
        assert_eq!(Tokenizer::new("a < 1").tokenize().unwrap()[1], Token::Lower);
    }

    #[test]
    fn test_tokenize_between() {
        let tokens = Tokenizer::new("amt between 10 and 50.5").tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Ident("amt".into()),
                Token::Between,
                Token::Number(10),
                Token::And,
                Token::FloatNumber(50.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_negative_numbers() {
        let tokens = Tokenizer::new("-4, -1.5").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Number(-4),
                Token::Comma,
                Token::FloatNumber(-1.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings_and_quoted_idents() {
        let tokens = Tokenizer::new("\"Order Date\" LIKE 'Bob %'").tokenize().unwrap();

        assert_eq!(
            tokens,
            vec![
                Token::Ident("Order Date".into()),
                Token::Like,
                Token::String("Bob %".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_in_list() {
        let tokens = Tokenizer::new("cust IN (a, 'b c', TRUE)").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("cust".into()),
                Token::In,
                Token::LeftParen,
                Token::Ident("a".into()),
                Token::Comma,
                Token::String("b c".into()),
                Token::Comma,
                Token::True,
                Token::RightParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_empty_string() {
        let tokens = Tokenizer::new("''").tokenize().unwrap();
        assert_eq!(tokens, vec![Token::String(String::new()), Token::Eof]);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            Tokenizer::new("'hello").tokenize(),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_unsupported_character() {
        assert!(Tokenizer::new("a ; 1").tokenize().is_err());
        assert!(Tokenizer::new("a ! 1").tokenize().is_err());
    }
}
