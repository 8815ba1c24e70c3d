//! Recursive-descent parser for the condition language.
//!
//! ```text
//! expr    := or
//! or      := and (("or" | "||") and)*
//! and     := unary (("and" | "&&") unary)*
//! unary   := ("not" | "!") unary | primary
//! primary := "(" expr ")" | call | operand (cmp operand)?
//! call    := ident "(" (ident | string) ")"
//! operand := path | number | "-" number | string | true | false | null
//! ```

use super::lexer::{CmpOp, Spanned, Token};
use super::ConditionError;
use crate::value_objects::StateValue;

/// Deepest nesting of parentheses and `not` a condition may use.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(Vec<String>),
    Literal(StateValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        lhs: Operand,
        op: CmpOp,
        rhs: Operand,
    },
    Truthy(Operand),
    HasItem(String),
}

pub fn parse(tokens: Vec<Spanned>, source_len: usize) -> Result<Expr, ConditionError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        source_len,
    };
    let expr = parser.expr()?;
    match parser.peek_spanned() {
        None => Ok(expr),
        Some((offset, token)) => Err(ConditionError::unexpected(*offset, format!("{:?}", token))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    source_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self) -> ConditionError {
        match self.peek_spanned() {
            Some((offset, token)) => ConditionError::unexpected(*offset, format!("{:?}", token)),
            None => ConditionError::UnexpectedEnd {
                position: self.source_len,
            },
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    /// Step one level deeper, refusing past [`MAX_NESTING`].
    fn descend(&mut self) -> Result<(), ConditionError> {
        if self.depth >= MAX_NESTING {
            let position = self
                .peek_spanned()
                .map(|(offset, _)| *offset)
                .unwrap_or(self.source_len);
            return Err(ConditionError::TooDeep {
                position,
                limit: MAX_NESTING,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ConditionError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            terms.push(self.and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            terms.push(self.unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.descend()?;
            self.pos += 1;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::LParen) {
            self.descend()?;
            self.pos += 1;
            let inner = self.expr()?;
            self.expect(Token::RParen)?;
            self.depth -= 1;
            return Ok(inner);
        }

        let is_call = matches!(self.tokens.get(self.pos + 1), Some((_, Token::LParen)));
        if is_call {
            if let Some(Token::Ident(name)) = self.peek().cloned() {
                return self.call(name);
            }
        }

        let lhs = self.operand()?;
        match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.pos += 1;
                let rhs = self.operand()?;
                Ok(Expr::Compare { lhs, op, rhs })
            }
            _ => Ok(Expr::Truthy(lhs)),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, ConditionError> {
        let offset = self.peek_spanned().map(|(o, _)| *o).unwrap_or(0);
        self.pos += 2;
        let argument = match self.next() {
            Some((_, Token::Ident(arg))) | Some((_, Token::Str(arg))) => arg,
            Some((offset, token)) => {
                return Err(ConditionError::unexpected(offset, format!("{:?}", token)))
            }
            None => {
                return Err(ConditionError::UnexpectedEnd {
                    position: self.source_len,
                })
            }
        };
        self.expect(Token::RParen)?;
        match name.as_str() {
            "has_item" => Ok(Expr::HasItem(argument)),
            _ => Err(ConditionError::UnknownFunction {
                position: offset,
                name,
            }),
        }
    }

    fn operand(&mut self) -> Result<Operand, ConditionError> {
        let operand = match self.peek().cloned() {
            Some(Token::Ident(path)) => {
                Operand::Path(path.split('.').map(str::to_string).collect())
            }
            Some(Token::Number(n)) => Operand::Literal(StateValue::Number(n)),
            Some(Token::Str(s)) => Operand::Literal(StateValue::Text(s)),
            Some(Token::True) => Operand::Literal(StateValue::Bool(true)),
            Some(Token::False) => Operand::Literal(StateValue::Bool(false)),
            Some(Token::Null) => Operand::Literal(StateValue::Null),
            Some(Token::Minus) => {
                self.pos += 1;
                return match self.next() {
                    Some((_, Token::Number(n))) => Ok(Operand::Literal(StateValue::Number(-n))),
                    Some((offset, token)) => {
                        Err(ConditionError::unexpected(offset, format!("{:?}", token)))
                    }
                    None => Err(ConditionError::UnexpectedEnd {
                        position: self.source_len,
                    }),
                };
            }
            _ => return Err(self.error_here()),
        };
        self.pos += 1;
        Ok(operand)
    }
}
