//! Recursive-descent parser for `_filter` expressions.
//!
//! ```text
//! Or      := And (OR And)*
//! And     := Not (AND Not)*
//! Not     := NOT Not | Primary
//! Primary := '(' Or ')' | IDENTIFIER OPERATOR Value
//! ```

use crate::ast::{Expression, Operator, Value};
use crate::error::{SearchError, SearchResult};
use crate::filter::lexer::{Token, TokenKind};
use crate::infer;

pub(crate) struct FilterParser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'t> FilterParser<'t> {
    /// `tokens` must end with an [`TokenKind::Eof`] token.
    pub(crate) fn new(tokens: &'t [Token], max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Parses the whole token stream as one expression.
    pub(crate) fn parse(mut self) -> SearchResult<Expression> {
        let expr = self.parse_or()?;
        let next = self.peek();
        if next.kind != TokenKind::Eof {
            return Err(SearchError::TrailingInput {
                token: next.text.clone(),
                position: next.position,
            });
        }
        Ok(expr)
    }

    fn peek(&self) -> &'t Token {
        let tokens = self.tokens;
        &tokens[self.pos.min(tokens.len().saturating_sub(1))]
    }

    fn advance(&mut self) -> &'t Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> SearchResult<Expression> {
        let mut terms = vec![self.parse_and()?];
        while self.peek().kind == TokenKind::Or {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Expression::any(terms).ok_or_else(|| self.unexpected())
    }

    fn parse_and(&mut self) -> SearchResult<Expression> {
        let mut terms = vec![self.parse_not()?];
        while self.peek().kind == TokenKind::And {
            self.advance();
            terms.push(self.parse_not()?);
        }
        Expression::all(terms).ok_or_else(|| self.unexpected())
    }

    fn parse_not(&mut self) -> SearchResult<Expression> {
        if self.peek().kind == TokenKind::Not {
            let token = self.advance();
            self.enter(token)?;
            let inner = self.parse_not();
            self.depth -= 1;
            return Ok(Expression::negate(inner?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> SearchResult<Expression> {
        let token = self.peek();
        match token.kind {
            TokenKind::LParen => {
                self.advance();
                self.enter(token)?;
                let inner = self.parse_or();
                self.depth -= 1;
                let inner = inner?;
                if self.peek().kind != TokenKind::RParen {
                    return Err(self.unexpected());
                }
                self.advance();
                Ok(inner)
            }
            TokenKind::Identifier => {
                self.advance();
                self.comparison(token)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn comparison(&mut self, param: &Token) -> SearchResult<Expression> {
        let op_token = self.peek();
        let operator = match op_token.kind {
            TokenKind::Operator => Operator::from_filter_keyword(&op_token.text),
            _ => None,
        };
        let Some(operator) = operator else {
            return Err(SearchError::ExpectedOperator {
                param: param.text.clone(),
                found: op_token.text.clone(),
                position: op_token.position,
            });
        };
        self.advance();

        let value_token = self.peek();
        let value = match value_token.kind {
            TokenKind::String => Value::string(value_token.text.as_str()),
            TokenKind::Number => match value_token.text.parse::<f64>() {
                Ok(n) => Value::number(n),
                Err(_) => Value::string(value_token.text.as_str()),
            },
            TokenKind::Date => match infer::date(&value_token.text) {
                Some(date) => Value::Date(date),
                None => Value::string(value_token.text.as_str()),
            },
            TokenKind::Identifier => match value_token.text.as_str() {
                "true" => Value::boolean(true),
                "false" => Value::boolean(false),
                text => Value::string(text),
            },
            _ => {
                return Err(SearchError::ExpectedValue {
                    found: value_token.text.clone(),
                    position: value_token.position,
                })
            }
        };
        self.advance();

        Ok(Expression::compare(operator, param.text.as_str(), value))
    }

    fn enter(&mut self, token: &Token) -> SearchResult<()> {
        if self.depth >= self.max_depth {
            return Err(SearchError::NestingTooDeep {
                limit: self.max_depth,
                position: Some(token.position),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn unexpected(&self) -> SearchError {
        let token = self.peek();
        SearchError::UnexpectedToken {
            token: token.text.clone(),
            position: token.position,
        }
    }
}
