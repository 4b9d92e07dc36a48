use super::lexer::{Token, tokenize};
use super::value::ScriptValue;
use crate::error::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Declare(Vec<(String, Option<Expr>)>),
    Expr(Expr),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Throw(Expr),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ScriptValue),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        constructor: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `target op= value`; `op` is `None` for plain `=`.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
}

impl Expr {
    fn is_assignable(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Member { .. })
    }
}

const RESERVED: &[&str] = &[
    "var", "let", "const", "if", "else", "while", "for", "return", "throw", "new", "typeof",
    "function", "class", "import", "export", "this", "do", "switch", "case", "break", "continue",
];

type ParseResult<T> = Result<T, SandboxError>;

/// Parses a whole script. `max_depth` bounds syntactic nesting so hostile
/// input cannot exhaust the stack while parsing or evaluating.
pub fn parse_program(source: &str, max_depth: usize) -> ParseResult<Vec<Stmt>> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
        depth: 0,
        max_depth,
    };
    let mut program = Vec::new();
    while !parser.at_eof() {
        program.push(parser.statement()?);
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Token::Punct(found) if *found == punct)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(found) if found == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> ParseResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> SandboxError {
        let message = match self.peek() {
            Token::Eof => "Unexpected end of input".to_string(),
            token => format!("Unexpected token {}", token.describe()),
        };
        SandboxError::Script(format!("SyntaxError: {}", message))
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(SandboxError::Script(
                "RangeError: script nesting exceeds the allowed depth".to_string(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match self.peek() {
            Token::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn semicolon(&mut self) {
        self.eat_punct(";");
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.enter()?;
        let stmt = self.statement_body();
        self.leave(1);
        stmt
    }

    fn statement_body(&mut self) -> ParseResult<Stmt> {
        if self.eat_punct("{") {
            let mut body = Vec::new();
            while !self.eat_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            return Ok(Stmt::Block(body));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }

        let keyword = match self.peek() {
            Token::Ident(name) => name.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "var" | "let" | "const" => {
                let stmt = self.declaration()?;
                self.semicolon();
                Ok(stmt)
            }
            "if" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.statement()?);
                let alternate = if self.is_keyword("else") {
                    self.pos += 1;
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    test,
                    consequent,
                    alternate,
                })
            }
            "while" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { test, body })
            }
            "for" => self.for_statement(),
            "return" => {
                self.pos += 1;
                let value = if self.is_punct(";") || self.is_punct("}") || self.at_eof() {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.semicolon();
                Ok(Stmt::Return(value))
            }
            "throw" => {
                self.pos += 1;
                let value = self.expression()?;
                self.semicolon();
                Ok(Stmt::Throw(value))
            }
            "function" | "class" | "import" | "export" | "this" | "do" | "switch" | "break"
            | "continue" => Err(self.unexpected()),
            _ => {
                let expr = self.expression()?;
                self.semicolon();
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn declaration(&mut self) -> ParseResult<Stmt> {
        self.pos += 1;
        let mut bindings = Vec::new();
        loop {
            let name = self.identifier()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            bindings.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Declare(bindings))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;
        let init = if self.is_punct(";") {
            None
        } else if self.is_keyword("var") || self.is_keyword("let") || self.is_keyword("const") {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.assignment_body();
        self.leave(1);
        result
    }

    fn assignment_body(&mut self) -> ParseResult<Expr> {
        let target = self.conditional()?;
        let op = match self.peek() {
            Token::Punct("=") => None,
            Token::Punct("+=") => Some(BinaryOp::Add),
            Token::Punct("-=") => Some(BinaryOp::Sub),
            Token::Punct("*=") => Some(BinaryOp::Mul),
            Token::Punct("/=") => Some(BinaryOp::Div),
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(SandboxError::Script(
                "SyntaxError: Invalid left-hand side in assignment".to_string(),
            ));
        }
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.logical_and()?;
        let mut levels = 0;
        loop {
            let op = if self.eat_punct("||") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                break;
            };
            self.enter()?;
            levels += 1;
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.leave(levels);
        Ok(left)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.equality()?;
        let mut levels = 0;
        while self.eat_punct("&&") {
            self.enter()?;
            levels += 1;
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.leave(levels);
        Ok(left)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::LooseEq),
                ("!=", BinaryOp::LooseNe),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = operand(self)?;
        let mut levels = 0;
        while let Some(op) = ops
            .iter()
            .find(|(punct, _)| self.is_punct(punct))
            .map(|(_, op)| *op)
        {
            self.pos += 1;
            self.enter()?;
            levels += 1;
            let right = operand(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.leave(levels);
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Plus),
            Token::Ident(name) if name == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            self.enter()?;
            let operand = self.unary();
            self.leave(1);
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand?),
            });
        }

        let increment = if self.is_punct("++") {
            Some(true)
        } else if self.is_punct("--") {
            Some(false)
        } else {
            None
        };
        if let Some(increment) = increment {
            self.pos += 1;
            self.enter()?;
            let target = self.unary();
            self.leave(1);
            let target = target?;
            if !target.is_assignable() {
                return Err(SandboxError::Script(
                    "SyntaxError: Invalid left-hand side expression in prefix operation"
                        .to_string(),
                ));
            }
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }

        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let expr = self.call_member()?;
        let increment = if self.is_punct("++") {
            true
        } else if self.is_punct("--") {
            false
        } else {
            return Ok(expr);
        };
        if !expr.is_assignable() {
            return Err(SandboxError::Script(
                "SyntaxError: Invalid left-hand side expression in postfix operation".to_string(),
            ));
        }
        self.pos += 1;
        Ok(Expr::Update {
            increment,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn call_member(&mut self) -> ParseResult<Expr> {
        let mut expr = if self.is_keyword("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        let mut levels = 0;
        loop {
            if self.eat_punct(".") {
                let name = match self.advance() {
                    Token::Ident(name) => name,
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                };
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Box::new(Expr::Literal(ScriptValue::String(name))),
                };
            } else if self.eat_punct("[") {
                let property = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Box::new(property),
                };
            } else if self.eat_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
            self.enter()?;
            levels += 1;
        }
        self.leave(levels);
        Ok(expr)
    }

    fn new_expression(&mut self) -> ParseResult<Expr> {
        self.pos += 1;
        let constructor = self.identifier()?;
        let args = if self.eat_punct("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New { constructor, args })
    }

    /// Comma-separated expressions after an opening `(`, through the closing `)`.
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.assignment()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Token::Number(number) => Ok(Expr::Literal(ScriptValue::Number(number))),
            Token::Str(text) => Ok(Expr::Literal(ScriptValue::String(text))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(ScriptValue::Bool(true))),
                "false" => Ok(Expr::Literal(ScriptValue::Bool(false))),
                "null" => Ok(Expr::Literal(ScriptValue::Null)),
                "undefined" => Ok(Expr::Literal(ScriptValue::Undefined)),
                reserved if RESERVED.contains(&reserved) => {
                    self.pos -= 1;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Ident(name)),
            },
            Token::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => {
                let mut entries = Vec::new();
                while !self.eat_punct("}") {
                    let key = match self.advance() {
                        Token::Ident(name) | Token::Str(name) => name,
                        Token::Number(number) => super::value::format_number(number),
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected());
                        }
                    };
                    self.expect_punct(":")?;
                    entries.push((key, self.assignment()?));
                    if !self.eat_punct(",") {
                        self.expect_punct("}")?;
                        break;
                    }
                }
                Ok(Expr::Object(entries))
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }
}
