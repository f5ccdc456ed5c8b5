use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::BlockKind;
use crate::error::ParseError;

/// Directive token. Carries no nesting information.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    ForOpen { binding: String, iterable: String },
    /// A `for` whose header is not `name in expr`.
    MalformedFor { header: String },
    IfOpen { condition: String },
    BlockClose(BlockKind),
    Variable(String),
    /// `{{include(...)}}`: the whole directive and its raw argument list.
    Include { directive: String, args: String },
}

/// One pattern for every directive form the tokenizer understands. A plain
/// include becomes a token so that it renders in the frame around it;
/// `{{!include(...)}}` is opaque and comes out as literal text.
static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\{\{\s*(?:",
        r"for\s*\((?P<for>.*?)\)",
        r"|(?P<endfor>endfor)",
        r"|if\s*\((?P<if>.*?)\)",
        r"|(?P<endif>endif)",
        r"|include\s*\((?P<include>.*?)\)",
        r"|(?P<opaque>!include\s*\(.*?\))",
        r"|\?(?P<var>[^}]*?)",
        r")\s*\}\}",
    ))
    .unwrap()
});

static FOR_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_$][A-Za-z0-9_$]*)\s+in\s+(.+?)\s*$").unwrap());

/// Split `text` into directive tokens in source order.
///
/// Text between directives is kept verbatim, whitespace included. Nesting is
/// not validated here; see [`crate::parser::build`].
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for caps in DIRECTIVE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            push_text(&mut tokens, &text[last..whole.start()]);
        }

        if let Some(header) = caps.name("for") {
            let header = header.as_str();
            match FOR_HEADER.captures(header) {
                Some(parts) => tokens.push(Token::ForOpen {
                    binding: parts[1].to_string(),
                    iterable: parts[2].to_string(),
                }),
                None => tokens.push(Token::MalformedFor {
                    header: header.trim().to_string(),
                }),
            }
        } else if caps.name("endfor").is_some() {
            tokens.push(Token::BlockClose(BlockKind::For));
        } else if let Some(condition) = caps.name("if") {
            tokens.push(Token::IfOpen {
                condition: condition.as_str().trim().to_string(),
            });
        } else if caps.name("endif").is_some() {
            tokens.push(Token::BlockClose(BlockKind::If));
        } else if let Some(args) = caps.name("include") {
            tokens.push(Token::Include {
                directive: whole.as_str().to_string(),
                args: args.as_str().to_string(),
            });
        } else if caps.name("opaque").is_some() {
            push_text(&mut tokens, whole.as_str());
        } else if let Some(expr) = caps.name("var") {
            tokens.push(Token::Variable(expr.as_str().trim().to_string()));
        }

        last = whole.end();
    }

    if last < text.len() {
        push_text(&mut tokens, &text[last..]);
    }

    tokens
}

fn push_text(tokens: &mut Vec<Token>, text: &str) {
    if let Some(Token::Text(prev)) = tokens.last_mut() {
        prev.push_str(text);
    } else {
        tokens.push(Token::Text(text.to_string()));
    }
}

/// Token of the sandboxed expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprToken {
    // Keywords
    True,
    False,
    Null,
    And,
    Or,
    Not,

    // Symbols
    EqEq,     // == or ===
    NotEq,    // != or !==
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Dot,      // .
    Comma,    // ,
    Colon,    // :
    Question, // ?
    LBracket, // [
    RBracket, // ]
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }

    // Data
    Ident(String),
    Number(f64),
    StringLit(String),
}

const SYMBOLS: &[(&str, ExprToken)] = &[
    ("===", ExprToken::EqEq),
    ("!==", ExprToken::NotEq),
    ("==", ExprToken::EqEq),
    ("!=", ExprToken::NotEq),
    ("<=", ExprToken::Le),
    (">=", ExprToken::Ge),
    ("&&", ExprToken::And),
    ("||", ExprToken::Or),
    ("<", ExprToken::Lt),
    (">", ExprToken::Gt),
    ("!", ExprToken::Not),
    ("+", ExprToken::Plus),
    ("-", ExprToken::Minus),
    ("*", ExprToken::Star),
    ("/", ExprToken::Slash),
    ("%", ExprToken::Percent),
    (".", ExprToken::Dot),
    (",", ExprToken::Comma),
    (":", ExprToken::Colon),
    ("?", ExprToken::Question),
    ("[", ExprToken::LBracket),
    ("]", ExprToken::RBracket),
    ("(", ExprToken::LParen),
    (")", ExprToken::RParen),
    ("{", ExprToken::LBrace),
    ("}", ExprToken::RBrace),
];

#[derive(Clone)]
pub struct ExprTokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> ExprTokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    pub fn next_token(&mut self) -> Result<Option<ExprToken>, ParseError> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        if first == '\'' || first == '"' {
            return self.string_literal(first).map(Some);
        }

        if first.is_ascii_digit() {
            return Ok(Some(self.number()));
        }

        if first.is_alphabetic() || first == '_' || first == '$' {
            let len: usize = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
                .map(char::len_utf8)
                .sum();
            let ident = &rest[..len];
            self.advance(len);

            return Ok(Some(match ident {
                "true" => ExprToken::True,
                "false" => ExprToken::False,
                "null" | "undefined" => ExprToken::Null,
                "and" => ExprToken::And,
                "or" => ExprToken::Or,
                "not" => ExprToken::Not,
                _ => ExprToken::Ident(ident.to_string()),
            }));
        }

        for (symbol, token) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.advance(symbol.len());
                return Ok(Some(token.clone()));
            }
        }

        Err(ParseError::UnexpectedChar {
            found: first,
            offset: self.cursor,
        })
    }

    fn number(&mut self) -> ExprToken {
        let rest = self.remaining();
        let bytes = rest.as_bytes();
        let mut len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
        // Fraction only when a digit follows the dot, so `1.foo` stays a member access.
        if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
            len += 1;
            len += bytes[len..].iter().take_while(|b| b.is_ascii_digit()).count();
        }
        let value = rest[..len].parse::<f64>().unwrap_or(f64::NAN);
        self.advance(len);
        ExprToken::Number(value)
    }

    fn string_literal(&mut self, quote: char) -> Result<ExprToken, ParseError> {
        let rest = self.remaining();
        let mut s = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + c.len_utf8());
                return Ok(ExprToken::StringLit(s));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, 'r')) => s.push('\r'),
                    Some((_, esc)) => s.push(esc),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }
        Err(ParseError::UnterminatedString)
    }
}
