use crate::ast::*;
use crate::error::{DiagnosticKind, Diagnostics, ParseError};
use crate::lexer::{ExprToken, ExprTokenizer, Token};
use std::collections::VecDeque;

/// An open block waiting for its close, plus the insertion point to restore.
struct Frame {
    open: Node,
    header: String,
    parent: Vec<Node>,
    /// Malformed opener: the block balances its close but renders nothing.
    skip: bool,
}

/// Build the block tree from a flat token stream.
///
/// An unmatched close is ignored and recorded, as is a `for` with a malformed
/// header, whose block is dropped. An unclosed open or a close of the wrong
/// kind is a hard error for the document.
pub fn build(tokens: Vec<Token>, diagnostics: &mut Diagnostics) -> Result<Template, ParseError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut current: Vec<Node> = Vec::new();

    for token in tokens {
        match token {
            Token::Text(s) => current.push(Node::Text(s)),
            Token::Variable(expr) => current.push(Node::Var(expr)),
            Token::Include { directive, args } => current.push(Node::Include { directive, args }),
            Token::ForOpen { binding, iterable } => {
                let header = format!("for({binding} in {iterable})");
                stack.push(Frame {
                    open: Node::For {
                        target: binding,
                        iterable,
                        body: Vec::new(),
                    },
                    header,
                    parent: std::mem::take(&mut current),
                    skip: false,
                });
            }
            Token::MalformedFor { header } => {
                diagnostics.push(
                    DiagnosticKind::MalformedBlock,
                    format!("for({header}): expected `name in expr`, block skipped"),
                );
                stack.push(Frame {
                    open: Node::For {
                        target: String::new(),
                        iterable: header.clone(),
                        body: Vec::new(),
                    },
                    header: format!("for({header})"),
                    parent: std::mem::take(&mut current),
                    skip: true,
                });
            }
            Token::IfOpen { condition } => {
                let header = format!("if({condition})");
                stack.push(Frame {
                    open: Node::If {
                        condition,
                        body: Vec::new(),
                    },
                    header,
                    parent: std::mem::take(&mut current),
                    skip: false,
                });
            }
            Token::BlockClose(kind) => {
                let Some(frame) = stack.pop() else {
                    diagnostics.push(
                        DiagnosticKind::UnmatchedClose,
                        format!("end{kind} without a matching {kind} block was ignored"),
                    );
                    continue;
                };
                let children = std::mem::replace(&mut current, frame.parent);
                let node = match frame.open {
                    Node::For { target, iterable, .. } if kind == BlockKind::For => Node::For {
                        target,
                        iterable,
                        body: children,
                    },
                    Node::If { condition, .. } if kind == BlockKind::If => Node::If {
                        condition,
                        body: children,
                    },
                    other => {
                        return Err(ParseError::MismatchedClose {
                            open: block_kind(&other),
                            found: kind,
                            header: frame.header,
                        })
                    }
                };
                if !frame.skip {
                    current.push(node);
                }
            }
        }
    }

    if let Some(frame) = stack.pop() {
        return Err(ParseError::UnclosedBlock {
            kind: block_kind(&frame.open),
            header: frame.header,
        });
    }

    Ok(current)
}

fn block_kind(node: &Node) -> BlockKind {
    match node {
        Node::If { .. } => BlockKind::If,
        _ => BlockKind::For,
    }
}

/// Parse a complete expression; trailing tokens are an error.
pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src);
    let expr = parser.parse_expr()?;
    match parser.consume()? {
        None => Ok(expr),
        Some(t) => Err(ParseError::Unexpected {
            expected: "end of expression".to_string(),
            found: format!("{:?}", t),
        }),
    }
}

pub struct Parser<'a> {
    lexer: ExprTokenizer<'a>,
    buffer: VecDeque<ExprToken>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: ExprTokenizer::new(input),
            buffer: VecDeque::new(),
        }
    }

    fn peek(&mut self) -> Result<Option<&ExprToken>, ParseError> {
        if self.buffer.is_empty() {
            if let Some(token) = self.lexer.next_token()? {
                self.buffer.push_back(token);
            }
        }
        Ok(self.buffer.front())
    }

    fn consume(&mut self) -> Result<Option<ExprToken>, ParseError> {
        match self.buffer.pop_front() {
            Some(t) => Ok(Some(t)),
            None => self.lexer.next_token(),
        }
    }

    fn eat(&mut self, token: &ExprToken) -> Result<bool, ParseError> {
        if self.peek()? == Some(token) {
            self.consume()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, token: ExprToken) -> Result<(), ParseError> {
        match self.consume()? {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(ParseError::Unexpected {
                expected: format!("{:?}", token),
                found: format!("{:?}", t),
            }),
            None => Err(ParseError::Unexpected {
                expected: format!("{:?}", token),
                found: "end of expression".to_string(),
            }),
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if !self.eat(&ExprToken::Question)? {
            return Ok(cond);
        }
        let then = self.parse_expr()?;
        self.expect(ExprToken::Colon)?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Conditional(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&ExprToken::Or)? {
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_eq()?;
        while self.eat(&ExprToken::And)? {
            let rhs = self.parse_eq()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_cmp()?;
        loop {
            let op = match self.peek()? {
                Some(ExprToken::EqEq) => BinOp::Eq,
                Some(ExprToken::NotEq) => BinOp::NotEq,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_cmp()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek()? {
                Some(ExprToken::Lt) => BinOp::Lt,
                Some(ExprToken::Le) => BinOp::Le,
                Some(ExprToken::Gt) => BinOp::Gt,
                Some(ExprToken::Ge) => BinOp::Ge,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_add()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek()? {
                Some(ExprToken::Plus) => BinOp::Add,
                Some(ExprToken::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek()? {
                Some(ExprToken::Star) => BinOp::Mul,
                Some(ExprToken::Slash) => BinOp::Div,
                Some(ExprToken::Percent) => BinOp::Rem,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek()? {
            Some(ExprToken::Not) => UnaryOp::Not,
            Some(ExprToken::Minus) => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.consume()?;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        // Handle suffixes: .attr, [index]
        loop {
            if self.eat(&ExprToken::Dot)? {
                match self.consume()? {
                    Some(ExprToken::Ident(attr)) => {
                        expr = Expr::Attribute(Box::new(expr), attr);
                    }
                    t => {
                        return Err(ParseError::Unexpected {
                            expected: "identifier after `.`".to_string(),
                            found: format!("{:?}", t),
                        })
                    }
                }
            } else if self.eat(&ExprToken::LBracket)? {
                let idx = self.parse_expr()?;
                self.expect(ExprToken::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(idx));
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let expr = match self.consume()? {
            Some(ExprToken::Number(n)) => Expr::NumberLit(n),
            Some(ExprToken::StringLit(s)) => Expr::StringLit(s),
            Some(ExprToken::True) => Expr::BoolLit(true),
            Some(ExprToken::False) => Expr::BoolLit(false),
            Some(ExprToken::Null) => Expr::Null,
            Some(ExprToken::Ident(s)) => Expr::Var(s),
            Some(ExprToken::LParen) => {
                let e = self.parse_expr()?;
                self.expect(ExprToken::RParen)?;
                e
            }
            Some(ExprToken::LBracket) => Expr::Array(self.parse_list()?),
            Some(ExprToken::LBrace) => Expr::Object(self.parse_object()?),
            t => {
                return Err(ParseError::Unexpected {
                    expected: "expression".to_string(),
                    found: t.map_or_else(|| "end of expression".to_string(), |t| format!("{:?}", t)),
                })
            }
        };
        Ok(expr)
    }

    // `[` already consumed. Trailing commas are accepted.
    fn parse_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.eat(&ExprToken::RBracket)? {
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            if !self.eat(&ExprToken::Comma)? {
                self.expect(ExprToken::RBracket)?;
                return Ok(items);
            }
        }
    }

    // `{` already consumed.
    fn parse_object(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut entries = Vec::new();
        loop {
            let key = match self.consume()? {
                Some(ExprToken::RBrace) => return Ok(entries),
                Some(ExprToken::Ident(k)) | Some(ExprToken::StringLit(k)) => k,
                t => {
                    return Err(ParseError::Unexpected {
                        expected: "mapping key".to_string(),
                        found: format!("{:?}", t),
                    })
                }
            };
            self.expect(ExprToken::Colon)?;
            entries.push((key, self.parse_expr()?));
            if !self.eat(&ExprToken::Comma)? {
                self.expect(ExprToken::RBrace)?;
                return Ok(entries);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn tree(src: &str) -> (Result<Template, ParseError>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let result = build(tokenize(src), &mut diags);
        (result, diags)
    }

    #[test]
    fn nested_blocks_build_nested_nodes() {
        let (result, diags) = tree("a{{for(x in xs)}}{{if(x)}}{{?x}}{{endif}}{{endfor}}b");
        assert!(diags.is_empty());
        assert_eq!(
            result.unwrap(),
            vec![
                Node::Text("a".into()),
                Node::For {
                    target: "x".into(),
                    iterable: "xs".into(),
                    body: vec![Node::If {
                        condition: "x".into(),
                        body: vec![Node::Var("x".into())],
                    }],
                },
                Node::Text("b".into()),
            ]
        );
    }

    #[test]
    fn unmatched_close_is_ignored_and_recorded() {
        let (result, diags) = tree("left{{endfor}}right");
        assert_eq!(
            result.unwrap(),
            vec![Node::Text("left".into()), Node::Text("right".into())]
        );
        assert_eq!(diags.count(DiagnosticKind::UnmatchedClose), 1);
    }

    #[test]
    fn malformed_for_drops_its_block_only() {
        let (result, diags) = tree("a{{for(items)}}x{{if(y)}}{{endif}}{{endfor}}b{{?c}}");
        assert_eq!(
            result.unwrap(),
            vec![
                Node::Text("a".into()),
                Node::Text("b".into()),
                Node::Var("c".into()),
            ]
        );
        assert_eq!(diags.count(DiagnosticKind::MalformedBlock), 1);
    }

    #[test]
    fn include_is_a_leaf_inside_blocks() {
        let (result, _) = tree("{{for(x in xs)}}{{include('c.html', v=x)}}{{endfor}}");
        assert_eq!(
            result.unwrap(),
            vec![Node::For {
                target: "x".into(),
                iterable: "xs".into(),
                body: vec![Node::Include {
                    directive: "{{include('c.html', v=x)}}".into(),
                    args: "'c.html', v=x".into(),
                }],
            }]
        );
    }

    #[test]
    fn unclosed_open_is_an_error() {
        let (result, _) = tree("{{for(x in xs)}}{{for(y in ys)}}{{endfor}}");
        assert_eq!(
            result,
            Err(ParseError::UnclosedBlock {
                kind: BlockKind::For,
                header: "for(x in xs)".into()
            })
        );
    }

    #[test]
    fn close_of_wrong_kind_is_an_error() {
        let (result, _) = tree("{{if(a)}}{{endfor}}");
        assert!(matches!(
            result,
            Err(ParseError::MismatchedClose {
                open: BlockKind::If,
                found: BlockKind::For,
                ..
            })
        ));
    }

    #[test]
    fn precedence_of_binary_operators() {
        let expr = parse_expression("1 + 2 * 3 == 7 && !done").unwrap();
        let expected = Expr::BinOp(
            Box::new(Expr::BinOp(
                Box::new(Expr::BinOp(
                    Box::new(Expr::NumberLit(1.0)),
                    BinOp::Add,
                    Box::new(Expr::BinOp(
                        Box::new(Expr::NumberLit(2.0)),
                        BinOp::Mul,
                        Box::new(Expr::NumberLit(3.0)),
                    )),
                )),
                BinOp::Eq,
                Box::new(Expr::NumberLit(7.0)),
            )),
            BinOp::And,
            Box::new(Expr::Unary(UnaryOp::Not, Box::new(Expr::Var("done".into())))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn member_and_index_suffixes_chain() {
        let expr = parse_expression("user.tags[0]").unwrap();
        assert_eq!(
            expr,
            Expr::Index(
                Box::new(Expr::Attribute(Box::new(Expr::Var("user".into())), "tags".into())),
                Box::new(Expr::NumberLit(0.0)),
            )
        );
    }

    #[test]
    fn list_and_mapping_literals() {
        let expr = parse_expression("[1, 'a', {k: true, 'q': null},]").unwrap();
        assert_eq!(
            expr,
            Expr::Array(vec![
                Expr::NumberLit(1.0),
                Expr::StringLit("a".into()),
                Expr::Object(vec![
                    ("k".into(), Expr::BoolLit(true)),
                    ("q".into(), Expr::Null),
                ]),
            ])
        );
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("").is_err());
        assert!(parse_expression("(a").is_err());
    }
}
