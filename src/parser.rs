use std::rc::Rc;

use tracing::debug;

use crate::{
    ast::{BinaryOp, FunctionDecl, Literal, Node, NodeKind, UnaryOp},
    diagnostics::{Diagnostic, Location, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
    stack::ensure_sufficient_stack,
};

/// Deepest tree the parser builds. Each statement, unary operator and
/// parenthesised or chained binary operand adds one level.
pub const MAX_NESTING: usize = 1024;

/// Parses a whole source buffer into a `Program` node.
///
/// Parsing is all-or-nothing: the first lexical or syntax error aborts and
/// no partial tree is returned.
pub fn parse(source: &str) -> Result<Node, Diagnostic> {
    let mut parser = Parser::new(source)?;
    let program = parser.parse_program()?;
    if let NodeKind::Program(statements) = &program.kind {
        debug!(statements = statements.len(), "parsed program");
    }
    Ok(program)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
    lookahead: Option<Token<'a>>,
    previous_end: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, Diagnostic> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            lookahead: None,
            previous_end: 0,
            depth: 0,
        })
    }

    fn parse_program(&mut self) -> Result<Node, Diagnostic> {
        let location = self.current.location;
        let mut statements = Vec::new();
        while !self.check_eof() {
            statements.push(self.parse_statement()?);
        }
        Ok(Node::new(
            NodeKind::Program(statements),
            SourceSpan::new(0, self.current.span.end),
            location,
        ))
    }

    fn parse_statement(&mut self) -> Result<Node, Diagnostic> {
        self.nested(|parser| match parser.current.kind {
            TokenKind::Keyword(Keyword::Let | Keyword::Var | Keyword::Const) => {
                parser.parse_declaration()
            }
            TokenKind::Keyword(Keyword::Function) => parser.parse_function(),
            TokenKind::Keyword(Keyword::Return) => parser.parse_return(),
            TokenKind::Keyword(Keyword::If) => parser.parse_if(),
            TokenKind::Keyword(Keyword::While) => parser.parse_while(),
            TokenKind::Symbol if parser.current.is_symbol('{') => parser.parse_block(),
            _ => parser.parse_assignment_or_expression(),
        })
    }

    fn parse_declaration(&mut self) -> Result<Node, Diagnostic> {
        let start = self.advance()?;
        let name = self.consume_identifier("expected variable name")?;
        self.consume_operator("=", "expected `=` in declaration")?;
        let value = self.parse_expression()?;
        self.consume_symbol(';', "expected `;` after declaration")?;
        Ok(self.finish(
            NodeKind::Assignment {
                name: name.text.to_string(),
                value: Box::new(value),
                is_declaration: true,
            },
            &start,
        ))
    }

    fn parse_assignment_or_expression(&mut self) -> Result<Node, Diagnostic> {
        if self.current.kind == TokenKind::Identifier && self.peek()?.is_operator("=") {
            let name = self.advance()?;
            self.advance()?;
            let value = self.parse_expression()?;
            self.consume_symbol(';', "expected `;` after assignment")?;
            return Ok(self.finish(
                NodeKind::Assignment {
                    name: name.text.to_string(),
                    value: Box::new(value),
                    is_declaration: false,
                },
                &name,
            ));
        }
        let expr = self.parse_expression()?;
        self.consume_symbol(';', "expected `;` after expression")?;
        Ok(expr)
    }

    fn parse_block(&mut self) -> Result<Node, Diagnostic> {
        let lbrace = self.consume_symbol('{', "expected `{` to start block")?;
        let mut statements = Vec::new();
        while !self.current.is_symbol('}') {
            if self.check_eof() {
                return Err(self.error("expected `}` to close block"));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance()?;
        Ok(self.finish(NodeKind::Block(statements), &lbrace))
    }

    fn parse_if(&mut self) -> Result<Node, Diagnostic> {
        let start = self.advance()?;
        self.consume_symbol('(', "expected `(` after `if`")?;
        let condition = self.parse_expression()?;
        self.consume_symbol(')', "expected `)` after condition")?;
        let then_branch = self.parse_statement()?;
        let else_branch = if self.current.is_keyword(Keyword::Else) {
            self.advance()?;
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(self.finish(
            NodeKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            &start,
        ))
    }

    fn parse_while(&mut self) -> Result<Node, Diagnostic> {
        let start = self.advance()?;
        self.consume_symbol('(', "expected `(` after `while`")?;
        let condition = self.parse_expression()?;
        self.consume_symbol(')', "expected `)` after condition")?;
        let body = self.parse_statement()?;
        Ok(self.finish(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
            &start,
        ))
    }

    fn parse_function(&mut self) -> Result<Node, Diagnostic> {
        let start = self.advance()?;
        let name = self.consume_identifier("expected function name")?;
        self.consume_symbol('(', "expected `(` after function name")?;
        let mut params = Vec::new();
        if !self.current.is_symbol(')') {
            loop {
                let param = self.consume_identifier("expected parameter name")?;
                params.push(param.text.to_string());
                if !self.current.is_symbol(',') {
                    break;
                }
                self.advance()?;
            }
        }
        self.consume_symbol(')', "expected `)` after parameters")?;
        let body = self.parse_statement()?;
        Ok(self.finish(
            NodeKind::FunctionDecl(Rc::new(FunctionDecl {
                name: name.text.to_string(),
                params,
                body,
            })),
            &start,
        ))
    }

    fn parse_return(&mut self) -> Result<Node, Diagnostic> {
        let start = self.advance()?;
        let value = if self.current.is_symbol(';') {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.consume_symbol(';', "expected `;` after return")?;
        Ok(self.finish(NodeKind::Return(value), &start))
    }

    fn parse_expression(&mut self) -> Result<Node, Diagnostic> {
        self.parse_binary(1)
    }

    /// Every operator folded into a left-leaning chain deepens the tree by
    /// one, so the chain's operators count against `MAX_NESTING` until the
    /// chain is complete.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Node, Diagnostic> {
        let outer_depth = self.depth;
        let result = self.parse_binary_chain(min_precedence);
        self.depth = outer_depth;
        result
    }

    fn parse_binary_chain(&mut self, min_precedence: u8) -> Result<Node, Diagnostic> {
        let start = self.current;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current_binary_op() {
                Some(op) if op.precedence() >= min_precedence => op,
                _ => break,
            };
            self.enter()?;
            self.advance()?;
            let right = self.parse_binary(op.precedence() + 1)?;
            left = self.finish(
                NodeKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                &start,
            );
        }
        Ok(left)
    }

    fn current_binary_op(&self) -> Option<BinaryOp> {
        if self.current.kind == TokenKind::Operator {
            BinaryOp::from_operator(self.current.text)
        } else {
            None
        }
    }

    fn parse_unary(&mut self) -> Result<Node, Diagnostic> {
        let op = if self.current.is_operator("-") {
            Some(UnaryOp::Negate)
        } else if self.current.is_operator("!") {
            Some(UnaryOp::Not)
        } else {
            None
        };
        self.nested(|parser| match op {
            Some(op) => {
                let start = parser.advance()?;
                let operand = parser.parse_unary()?;
                Ok(parser.finish(
                    NodeKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    &start,
                ))
            }
            None => parser.parse_primary(),
        })
    }

    fn parse_primary(&mut self) -> Result<Node, Diagnostic> {
        let token = self.current;
        match token.kind {
            TokenKind::Number => {
                let number = token.text.parse::<f64>().map_err(|_| {
                    self.error_at(&token, &format!("invalid number literal `{}`", token.text))
                })?;
                self.advance()?;
                Ok(self.finish(NodeKind::Literal(Literal::Number(number)), &token))
            }
            TokenKind::String => {
                self.advance()?;
                Ok(self.finish(
                    NodeKind::Literal(Literal::String(token.text.to_string())),
                    &token,
                ))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance()?;
                Ok(self.finish(NodeKind::Literal(Literal::Bool(true)), &token))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance()?;
                Ok(self.finish(NodeKind::Literal(Literal::Bool(false)), &token))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance()?;
                Ok(self.finish(NodeKind::Literal(Literal::Null), &token))
            }
            TokenKind::Identifier => {
                self.advance()?;
                if self.current.is_symbol('(') {
                    self.advance()?;
                    let args = self.parse_arguments()?;
                    Ok(self.finish(
                        NodeKind::Call {
                            name: token.text.to_string(),
                            args,
                        },
                        &token,
                    ))
                } else {
                    Ok(self.finish(NodeKind::Variable(token.text.to_string()), &token))
                }
            }
            TokenKind::Symbol if token.is_symbol('(') => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.consume_symbol(')', "expected `)` after expression")?;
                Ok(inner)
            }
            _ => Err(self.error_at(&token, "expected expression")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Node>, Diagnostic> {
        let mut args = Vec::new();
        if !self.current.is_symbol(')') {
            loop {
                args.push(self.parse_expression()?);
                if !self.current.is_symbol(',') {
                    break;
                }
                self.advance()?;
            }
        }
        self.consume_symbol(')', "expected `)` after arguments")?;
        Ok(args)
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        self.enter()?;
        let result = ensure_sufficient_stack(|| parse(self));
        self.depth -= 1;
        result
    }

    fn enter(&mut self) -> Result<(), Diagnostic> {
        if self.depth >= MAX_NESTING {
            return Err(self
                .error("nesting too deep")
                .with_note(format!("at most {MAX_NESTING} levels are allowed")));
        }
        self.depth += 1;
        Ok(())
    }

    fn finish(&self, kind: NodeKind, start: &Token<'a>) -> Node {
        let end = self.previous_end.max(start.span.end);
        Node::new(kind, SourceSpan::new(start.span.start, end), start.location)
    }

    fn peek(&mut self) -> Result<&Token<'a>, Diagnostic> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token()?);
        }
        Ok(self.lookahead.as_ref().unwrap_or(&self.current))
    }

    /// Moves to the next token and hands back the one just consumed.
    fn advance(&mut self) -> Result<Token<'a>, Diagnostic> {
        let next = match self.lookahead.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        let consumed = std::mem::replace(&mut self.current, next);
        self.previous_end = consumed.span.end;
        Ok(consumed)
    }

    fn check_eof(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    fn consume_symbol(&mut self, symbol: char, message: &str) -> Result<Token<'a>, Diagnostic> {
        if self.current.is_symbol(symbol) {
            self.advance()
        } else {
            Err(self.error(message))
        }
    }

    fn consume_operator(&mut self, op: &str, message: &str) -> Result<Token<'a>, Diagnostic> {
        if self.current.is_operator(op) {
            self.advance()
        } else {
            Err(self.error(message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token<'a>, Diagnostic> {
        if self.current.kind == TokenKind::Identifier {
            self.advance()
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: &str) -> Diagnostic {
        self.error_at(&self.current, message)
    }

    fn error_at(&self, token: &Token<'a>, message: &str) -> Diagnostic {
        let found = format!("found {}", token.describe());
        error_with_location(message, token.span, token.location).with_note(found)
    }
}

fn error_with_location(message: &str, span: SourceSpan, location: Location) -> Diagnostic {
    Diagnostic::syntax(message).with_span(span).at(location)
}
