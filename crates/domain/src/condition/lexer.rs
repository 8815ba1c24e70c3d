use super::ConditionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(i64),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Cmp(CmpOp),
    Minus,
    LParen,
    RParen,
    Comma,
}

/// Token plus its byte offset in the source, for error messages.
pub type Spanned = (usize, Token);

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ConditionError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let two = source.get(pos..pos + 2).unwrap_or("");
        let token = match two {
            "==" => Some(Token::Cmp(CmpOp::Eq)),
            "!=" => Some(Token::Cmp(CmpOp::Ne)),
            ">=" => Some(Token::Cmp(CmpOp::Ge)),
            "<=" => Some(Token::Cmp(CmpOp::Le)),
            "&&" => Some(Token::And),
            "||" => Some(Token::Or),
            _ => None,
        };
        if let Some(token) = token {
            tokens.push((start, token));
            pos += 2;
            continue;
        }

        let token = match c {
            '>' => Some(Token::Cmp(CmpOp::Gt)),
            '<' => Some(Token::Cmp(CmpOp::Lt)),
            '=' => Some(Token::Cmp(CmpOp::Eq)),
            '!' => Some(Token::Not),
            '-' => Some(Token::Minus),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = token {
            tokens.push((start, token));
            pos += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            pos += 1;
            let body_start = pos;
            while pos < bytes.len() && bytes[pos] as char != quote {
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(ConditionError::UnterminatedString { position: start });
            }
            tokens.push((start, Token::Str(source[body_start..pos].to_string())));
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() {
            while pos < bytes.len() && (bytes[pos] as char).is_ascii_digit() {
                pos += 1;
            }
            let text = &source[start..pos];
            let value = text
                .parse::<i64>()
                .map_err(|_| ConditionError::unexpected(start, text))?;
            tokens.push((start, Token::Number(value)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while pos < bytes.len() {
                let ch = bytes[pos] as char;
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                    pos += 1;
                } else {
                    break;
                }
            }
            let word = &source[start..pos];
            let token = match word.to_ascii_lowercase().as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "true" => Token::True,
                "false" => Token::False,
                "null" | "none" => Token::Null,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push((start, token));
            continue;
        }

        let found: String = source[start..].chars().take(1).collect();
        return Err(ConditionError::unexpected(start, found));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|(_, t)| t).collect()
    }

    #[test]
    fn lexes_paths_operators_and_literals() {
        assert_eq!(
            kinds("npc.brother.affection >= 70 and flags.door == 'open'"),
            vec![
                Token::Ident("npc.brother.affection".into()),
                Token::Cmp(CmpOp::Ge),
                Token::Number(70),
                Token::And,
                Token::Ident("flags.door".into()),
                Token::Cmp(CmpOp::Eq),
                Token::Str("open".into()),
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("NOT True OR None"),
            vec![Token::Not, Token::True, Token::Or, Token::Null]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(matches!(
            tokenize("vars.location == 'attic"),
            Err(ConditionError::UnterminatedString { position: 17 })
        ));
    }

    #[test]
    fn unknown_character_is_an_error() {
        assert!(tokenize("vars.x # 3").is_err());
    }
}
