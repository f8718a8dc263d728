use crate::error::{Error, Result};
use crate::predicate::{comparison_predicate, FilterClause, Literal, Operator, Predicate};
use crate::tokenizer::Token;

/// Turns the tokens of a single clause into a [FilterClause].
///
/// Grammar:
/// ```text
/// clause   := column op literal
///           | column BETWEEN literal (AND | ,) literal
///           | column LIKE string
///           | column IN [(] literal {, literal} [)]
/// ```
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> Result<FilterClause> {
        let column = self.consume_ident()?;

        let predicate = match self.current_token() {
            Token::Between => {
                self.advance();
                self.parse_between(&column)?
            }
            Token::Like => {
                self.advance();
                self.parse_like()?
            }
            Token::In => {
                self.advance();
                self.parse_in()?
            }
            _ => {
                let op = self.consume_comparison()?;
                comparison_predicate(op, self.consume_literal()?)
            }
        };

        // Check we are at the end of the clause
        if !self.is_at_end() {
            return Err(Error::Parse(format!(
                "Unexpected token after clause: {:?}",
                self.current_token()
            )));
        }

        Ok(FilterClause { column, predicate })
    }

    //helpers
    fn current_token(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    fn consume(&mut self, expected: Token) -> Result<()> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(Error::Parse(format!(
                "Expected {:?}, found {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    fn consume_ident(&mut self) -> Result<String> {
        match self.current_token() {
            Token::Ident(string) => {
                let string = string.clone(); // Get the name
                self.advance();
                Ok(string)
            }
            _ => Err(Error::Parse(format!(
                "Expected column name, found {:?}",
                self.current_token()
            ))),
        }
    }

    fn consume_comparison(&mut self) -> Result<Operator> {
        let op = match self.current_token() {
            Token::Equal => Operator::Eq,
            Token::NotEqual => Operator::Neq,
            Token::Greater => Operator::Gt,
            Token::Lower => Operator::Lt,
            Token::GreaterEqual => Operator::Gte,
            Token::LowerEqual => Operator::Lte,
            _ => {
                return Err(Error::Parse(format!(
                    "Expected an operator, found {:?}",
                    self.current_token()
                )));
            }
        };
        self.advance();
        Ok(op)
    }

    /// Literals may be numbers, booleans, quoted strings or bare words.
    fn consume_literal(&mut self) -> Result<Literal> {
        let literal = match self.current_token() {
            Token::Number(i) => Literal::Int(*i),
            Token::FloatNumber(f) => Literal::Float(*f),
            Token::String(s) | Token::Ident(s) => Literal::Text(s.clone()),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            _ => {
                return Err(Error::Parse(format!(
                    "Expected a value, found {:?}",
                    self.current_token()
                )));
            }
        };
        self.advance();
        Ok(literal)
    }

    fn parse_between(&mut self, column: &str) -> Result<Predicate> {
        let lo = self.consume_literal()?;
        match self.current_token() {
            Token::And | Token::Comma => self.advance(),
            _ => {
                return Err(Error::Parse(format!(
                    "Expected AND or ',', found {:?}",
                    self.current_token()
                )));
            }
        }
        let hi = self.consume_literal()?;

        if lo.as_f64().is_none() || hi.as_f64().is_none() {
            return Err(Error::InvalidOperand {
                column: column.to_string(),
                operator: Operator::Between.to_string(),
                reason: format!("bounds {lo} and {hi} must be numeric"),
            });
        }
        Ok(Predicate::Between(lo, hi))
    }

    fn parse_like(&mut self) -> Result<Predicate> {
        match self.current_token() {
            Token::String(pattern) => {
                let pattern = pattern.clone();
                self.advance();
                Ok(Predicate::Like(pattern))
            }
            _ => Err(Error::Parse(format!(
                "LIKE expects a quoted pattern, found {:?}",
                self.current_token()
            ))),
        }
    }

    fn parse_in(&mut self) -> Result<Predicate> {
        let parenthesized = matches!(self.current_token(), Token::LeftParen);
        if parenthesized {
            self.advance();
        }

        let mut items = vec![self.consume_literal()?];
        while matches!(self.current_token(), Token::Comma) {
            self.advance();
            items.push(self.consume_literal()?);
        }

        if parenthesized {
            self.consume(Token::RightParen)?;
        }
        Ok(Predicate::In(items))
    }
}
