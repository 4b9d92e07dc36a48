use crate::error::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(number) => super::value::format_number(*number),
            Token::Str(text) => format!("string '{}'", text),
            Token::Ident(name) => name.clone(),
            Token::Punct(punct) => (*punct).to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

// Longest first so `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "+=", "-=", "*=", "/=", "++", "--",
    "(", ")", "[", "]", "{", "}", ",", ";", ".", "?", ":", "=", "+", "-", "*", "/", "%", "!",
    "<", ">",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        if c == '/' && chars.get(pos + 1) == Some(&'/') {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
            continue;
        }
        if c == '/' && chars.get(pos + 1) == Some(&'*') {
            let start = pos;
            pos += 2;
            loop {
                match (chars.get(pos), chars.get(pos + 1)) {
                    (Some('*'), Some('/')) => {
                        pos += 2;
                        break;
                    }
                    (Some(_), _) => pos += 1,
                    (None, _) => return Err(syntax(format!("unterminated comment at {}", start))),
                }
            }
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(char::is_ascii_digit)) {
            let (number, next) = read_number(&chars, pos)?;
            tokens.push(Token::Number(number));
            pos = next;
            continue;
        }
        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, pos)?;
            tokens.push(Token::Str(text));
            pos = next;
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '$') {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }
        let punct = PUNCTUATORS.iter().copied().find(|punct| {
            punct
                .chars()
                .enumerate()
                .all(|(offset, expected)| chars.get(pos + offset) == Some(&expected))
        });
        match punct {
            Some(punct) => {
                tokens.push(Token::Punct(punct));
                pos += punct.chars().count();
            }
            None => return Err(syntax(format!("Invalid or unexpected token '{}'", c))),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> Result<(f64, usize), SandboxError> {
    let mut pos = start;
    if chars[pos] == '0' && matches!(chars.get(pos + 1), Some('x') | Some('X')) {
        pos += 2;
        let digits_start = pos;
        while pos < chars.len() && chars[pos].is_ascii_hexdigit() {
            pos += 1;
        }
        let digits: String = chars[digits_start..pos].iter().collect();
        let number = i64::from_str_radix(&digits, 16)
            .map_err(|_| syntax("Invalid hexadecimal literal".to_string()))?;
        return Ok((number as f64, pos));
    }

    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if chars.get(pos) == Some(&'.') {
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if matches!(chars.get(pos), Some('e') | Some('E')) {
        let mut lookahead = pos + 1;
        if matches!(chars.get(lookahead), Some('+') | Some('-')) {
            lookahead += 1;
        }
        if chars.get(lookahead).is_some_and(char::is_ascii_digit) {
            pos = lookahead;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    let text: String = chars[start..pos].iter().collect();
    text.parse::<f64>()
        .map(|number| (number, pos))
        .map_err(|_| syntax(format!("Invalid number '{}'", text)))
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), SandboxError> {
    let quote = chars[start];
    let mut pos = start + 1;
    let mut text = String::new();
    while let Some(&c) = chars.get(pos) {
        pos += 1;
        match c {
            c if c == quote => return Ok((text, pos)),
            '\n' => break,
            '\\' => {
                let escaped = chars
                    .get(pos)
                    .copied()
                    .ok_or_else(|| syntax("Invalid or unexpected token".to_string()))?;
                pos += 1;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    'u' => {
                        let hex: String = chars.get(pos..pos + 4).unwrap_or_default().iter().collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or_else(|| syntax("Invalid Unicode escape sequence".to_string()))?;
                        text.push(code);
                        pos += 4;
                    }
                    other => text.push(other),
                }
            }
            c => text.push(c),
        }
    }
    Err(syntax("Invalid or unexpected token: unterminated string".to_string()))
}

fn syntax(message: String) -> SandboxError {
    SandboxError::Script(format!("SyntaxError: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_operators_longest_first() {
        let tokens = tokenize("valid = input === 'x';").expect("tokens");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("valid".into()),
                Token::Punct("="),
                Token::Ident("input".into()),
                Token::Punct("==="),
                Token::Str("x".into()),
                Token::Punct(";"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numbers_strings_and_comments() {
        let tokens = tokenize("/* a */ 1.5e2 // b\n 0x1F \"q\\\"\\u0041\"").expect("tokens");
        assert_eq!(
            tokens,
            vec![
                Token::Number(150.0),
                Token::Number(31.0),
                Token::Str("q\"A".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unknown_characters_and_open_strings() {
        assert!(tokenize("a # b").is_err());
        assert!(tokenize("'open").is_err());
    }
}
