//! Statement parsing.

use super::expr::Precedence;
use super::{PResult, Parser};
use crate::ast::{
    Alias, Assign, BinaryOp, Block, ClassDef, ExceptHandler, Expr, ExprKind, FunctionDef, Param,
    ParamKind, Stmt, StmtKind, WithItem,
};
use crate::token::{Token, TokenKind};

impl<I: Iterator<Item = Token>> Parser<I> {
    /// Parses one statement line (or compound statement) into `out`.
    pub(super) fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> PResult<()> {
        if self.check_op("@") {
            let stmt = self.parse_decorated()?;
            out.push(stmt);
            return Ok(());
        }
        if self.current.kind == TokenKind::Keyword {
            let stmt = match self.current.literal.as_str() {
                "if" => self.parse_if()?,
                "while" => self.parse_while()?,
                "for" => self.parse_for(false)?,
                "def" => self.parse_function(Vec::new(), false)?,
                "class" => self.parse_class(Vec::new())?,
                "try" => self.parse_try()?,
                "with" => self.parse_with(false)?,
                "async" => self.parse_async(Vec::new())?,
                _ => return self.parse_simple_statements(out),
            };
            out.push(stmt);
            return Ok(());
        }
        self.parse_simple_statements(out)
    }

    /// Parses `;`-separated simple statements up to the end of the line.
    fn parse_simple_statements(&mut self, out: &mut Vec<Stmt>) -> PResult<()> {
        loop {
            let stmt = self.parse_simple_statement()?;
            out.push(stmt);
            if !self.eat_delim(";") {
                break;
            }
            if matches!(self.current.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
        }
        self.expect_newline()
    }

    fn at_simple_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Newline | TokenKind::Eof) || self.check_delim(";")
    }

    fn parse_simple_statement(&mut self) -> PResult<Stmt> {
        let span = self.span();
        let kind = if self.current.kind == TokenKind::Keyword {
            match self.current.literal.as_str() {
                "pass" => {
                    self.advance();
                    StmtKind::Pass
                }
                "break" => {
                    self.advance();
                    StmtKind::Break
                }
                "continue" => {
                    self.advance();
                    StmtKind::Continue
                }
                "return" => {
                    self.advance();
                    let value = if self.at_simple_end() {
                        None
                    } else {
                        Some(self.parse_expression_list()?)
                    };
                    StmtKind::Return(value)
                }
                "import" => self.parse_import()?,
                "from" => self.parse_from_import()?,
                "raise" => {
                    self.advance();
                    let exc = if self.at_simple_end() {
                        None
                    } else {
                        Some(self.parse_expression(Precedence::Lowest)?)
                    };
                    let cause = if exc.is_some() && self.eat_keyword("from") {
                        Some(self.parse_expression(Precedence::Lowest)?)
                    } else {
                        None
                    };
                    StmtKind::Raise { exc, cause }
                }
                "assert" => {
                    self.advance();
                    let test = self.parse_expression(Precedence::Lowest)?;
                    let msg = if self.eat_delim(",") {
                        Some(self.parse_expression(Precedence::Lowest)?)
                    } else {
                        None
                    };
                    StmtKind::Assert { test, msg }
                }
                "del" => {
                    self.advance();
                    let targets = match self.parse_expression_list()? {
                        Expr {
                            kind: ExprKind::Tuple(items),
                            ..
                        } => items,
                        single => vec![single],
                    };
                    StmtKind::Delete(targets)
                }
                "global" | "nonlocal" => {
                    let nonlocal = self.advance().literal == "nonlocal";
                    let mut names = vec![self.expect_identifier("a name")?];
                    while self.eat_delim(",") {
                        names.push(self.expect_identifier("a name")?);
                    }
                    StmtKind::Global { names, nonlocal }
                }
                "elif" | "else" | "except" | "finally" => {
                    return Err(self.error_here(format!(
                        "`{}` without a matching statement",
                        self.current.literal
                    )));
                }
                _ => self.parse_expression_statement()?,
            }
        } else {
            self.parse_expression_statement()?
        };
        Ok(Stmt { span, kind })
    }

    /// Expression statement or any form of assignment.
    fn parse_expression_statement(&mut self) -> PResult<StmtKind> {
        let first = self.parse_expression_list()?;

        if self.check_op("=") {
            let mut targets = vec![first];
            let value = loop {
                self.advance();
                let next = self.parse_expression_list()?;
                if !self.check_op("=") {
                    break next;
                }
                targets.push(next);
            };
            for target in &targets {
                self.check_assignable(target)?;
            }
            return Ok(StmtKind::Assign(Assign {
                targets,
                value: Some(value),
                annotation: None,
                augmented: None,
            }));
        }

        if let Some(op) = self.augmented_operator() {
            self.check_assignable(&first)?;
            self.advance();
            let value = self.parse_expression_list()?;
            return Ok(StmtKind::Assign(Assign {
                targets: vec![first],
                value: Some(value),
                annotation: None,
                augmented: Some(op),
            }));
        }

        if self.eat_delim(":") {
            self.check_assignable(&first)?;
            let annotation = self.parse_expression(Precedence::Lowest)?;
            let value = if self.eat_op("=") {
                Some(self.parse_expression_list()?)
            } else {
                None
            };
            return Ok(StmtKind::Assign(Assign {
                targets: vec![first],
                value,
                annotation: Some(annotation),
                augmented: None,
            }));
        }

        Ok(StmtKind::Expr(first))
    }

    fn augmented_operator(&self) -> Option<BinaryOp> {
        if self.current.kind != TokenKind::Operator {
            return None;
        }
        let symbol = self.current.literal.strip_suffix('=')?;
        if matches!(symbol, "" | "=" | "!" | "<" | ">" | ":") {
            return None;
        }
        BinaryOp::from_symbol(symbol)
    }

    fn check_assignable(&self, target: &Expr) -> PResult<()> {
        match &target.kind {
            ExprKind::Identifier(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                Ok(())
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                items.iter().try_for_each(|item| self.check_assignable(item))
            }
            ExprKind::Starred(inner) => self.check_assignable(inner),
            _ => Err(super::ParseError {
                file: self.file.to_path_buf(),
                line: target.span.line,
                message: "cannot assign to expression".to_string(),
            }),
        }
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_identifier("a module name")?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_identifier("a name")?);
        }
        Ok(name)
    }

    fn parse_import(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let asname = if self.eat_keyword("as") {
                Some(self.expect_identifier("an alias")?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_delim(",") {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_from_import(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut level = 0;
        loop {
            if self.eat_op(".") {
                level += 1;
            } else if self.eat_op("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check_keyword("import") {
            String::new()
        } else {
            self.parse_dotted_name()?
        };
        self.expect_keyword("import")?;

        let mut names = Vec::new();
        if self.eat_op("*") {
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
            });
            return Ok(StmtKind::FromImport {
                module,
                level,
                names,
            });
        }

        let parenthesized = self.eat_delim("(");
        loop {
            if parenthesized && self.check_delim(")") {
                break;
            }
            let name = self.expect_identifier("a name to import")?;
            let asname = if self.eat_keyword("as") {
                Some(self.expect_identifier("an alias")?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_delim(",") {
                break;
            }
        }
        if parenthesized {
            self.expect_delim(")")?;
        }
        Ok(StmtKind::FromImport {
            module,
            level,
            names,
        })
    }

    // --- compound statements ---

    /// Parses the body after a `:`. A body on the same line becomes a
    /// one-statement-line block.
    pub(super) fn parse_block(&mut self) -> PResult<Block> {
        self.nested(Self::parse_block_body)
    }

    fn parse_block_body(&mut self) -> PResult<Block> {
        if self.current.kind != TokenKind::Newline {
            let span = self.span();
            let mut statements = Vec::new();
            self.parse_simple_statements(&mut statements)?;
            return Ok(Block { span, statements });
        }
        if self.peek.kind != TokenKind::Indent {
            return Err(self.error_here("expected an indented block"));
        }
        self.advance();
        self.advance();

        let span = self.span();
        let mut statements = Vec::new();
        while !matches!(self.current.kind, TokenKind::Dedent | TokenKind::Eof) {
            if self.current.kind == TokenKind::Newline {
                self.advance();
                continue;
            }
            self.parse_statement_recovering(&mut statements);
        }
        if self.current.kind == TokenKind::Dedent {
            self.advance();
        }
        Ok(Block { span, statements })
    }

    fn parse_suite(&mut self) -> PResult<Block> {
        self.expect_delim(":")?;
        self.parse_block()
    }

    fn parse_else_block(&mut self) -> PResult<Option<Block>> {
        if self.eat_keyword("else") {
            Ok(Some(self.parse_suite()?))
        } else {
            Ok(None)
        }
    }

    /// `if`/`elif` chain; each `elif` becomes the alternate of its predecessor.
    fn parse_if(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let test = self.parse_expression(Precedence::Lowest)?;
        let body = self.parse_suite()?;

        let alternate = if self.check_keyword("elif") {
            Some(Box::new(self.parse_if()?))
        } else if self.check_keyword("else") {
            let else_span = self.span();
            self.advance();
            let block = self.parse_suite()?;
            Some(Box::new(Stmt {
                span: else_span,
                kind: StmtKind::Block(block),
            }))
        } else {
            None
        };

        Ok(Stmt {
            span,
            kind: StmtKind::If {
                test,
                body,
                alternate,
            },
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let test = self.parse_expression(Precedence::Lowest)?;
        let body = self.parse_suite()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt {
            span,
            kind: StmtKind::While { test, body, orelse },
        })
    }

    fn parse_for(&mut self, is_async: bool) -> PResult<Stmt> {
        let span = self.span();
        self.expect_keyword("for")?;
        let target = self.parse_target_list()?;
        self.check_assignable(&target)?;
        self.expect_keyword("in")?;
        let iter = self.parse_expression_list()?;
        let body = self.parse_suite()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt {
            span,
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
                is_async,
            },
        })
    }

    fn parse_decorated(&mut self) -> PResult<Stmt> {
        let span = self.span();
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.parse_expression(Precedence::Lowest)?);
            self.expect_newline()?;
        }
        let mut stmt = match self.current.literal.as_str() {
            "def" if self.current.kind == TokenKind::Keyword => {
                self.parse_function(decorators, false)?
            }
            "class" if self.current.kind == TokenKind::Keyword => self.parse_class(decorators)?,
            "async" if self.current.kind == TokenKind::Keyword => self.parse_async(decorators)?,
            _ => return Err(self.unexpected("`def` or `class` after decorator")),
        };
        stmt.span = span;
        Ok(stmt)
    }

    fn parse_async(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let mut stmt = if self.check_keyword("def") {
            self.parse_function(decorators, true)?
        } else if !decorators.is_empty() {
            return Err(self.unexpected("`def`"));
        } else if self.check_keyword("for") {
            self.parse_for(true)?
        } else if self.check_keyword("with") {
            self.parse_with(true)?
        } else {
            return Err(self.unexpected("`def`, `for` or `with` after `async`"));
        };
        stmt.span = span;
        Ok(stmt)
    }

    fn parse_function(&mut self, decorators: Vec<Expr>, is_async: bool) -> PResult<Stmt> {
        let span = self.span();
        self.expect_keyword("def")?;
        let name = self.expect_identifier("a function name")?;
        self.expect_delim("(")?;
        let params = self.parse_params(")", true)?;
        self.expect_delim(")")?;
        let returns = if self.eat_op("->") {
            Some(self.parse_expression(Precedence::Lowest)?)
        } else {
            None
        };
        let body = self.parse_suite()?;
        Ok(Stmt {
            span,
            kind: StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                returns,
                body,
                decorators,
                is_async,
            }),
        })
    }

    /// Parameter list up to (not including) `terminator`.
    pub(super) fn parse_params(
        &mut self,
        terminator: &str,
        annotations: bool,
    ) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        while !self.check_delim(terminator) {
            if self.eat_op("/") {
                // positional-only marker
            } else if self.eat_op("*") {
                if !self.check_delim(",") && !self.check_delim(terminator) {
                    params.push(self.parse_param(ParamKind::VarArgs, annotations, false)?);
                }
            } else if self.eat_op("**") {
                params.push(self.parse_param(ParamKind::KwArgs, annotations, false)?);
            } else {
                params.push(self.parse_param(ParamKind::Normal, annotations, true)?);
            }
            if !self.eat_delim(",") {
                break;
            }
        }
        Ok(params)
    }

    fn parse_param(
        &mut self,
        kind: ParamKind,
        annotations: bool,
        with_default: bool,
    ) -> PResult<Param> {
        let name = self.expect_identifier("a parameter name")?;
        let annotation = if annotations && self.eat_delim(":") {
            Some(self.parse_expression(Precedence::Lowest)?)
        } else {
            None
        };
        let default = if with_default && self.eat_op("=") {
            Some(self.parse_expression(Precedence::Lowest)?)
        } else {
            None
        };
        Ok(Param {
            name,
            kind,
            default,
            annotation,
        })
    }

    fn parse_class(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        let span = self.span();
        self.expect_keyword("class")?;
        let name = self.expect_identifier("a class name")?;
        let bases = if self.eat_delim("(") {
            self.parse_call_args()?
        } else {
            Vec::new()
        };
        let body = self.parse_suite()?;
        Ok(Stmt {
            span,
            kind: StmtKind::ClassDef(ClassDef {
                name,
                bases,
                body,
                decorators,
            }),
        })
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let body = self.parse_suite()?;

        let mut handlers = Vec::new();
        while self.check_keyword("except") {
            let handler_span = self.span();
            self.advance();
            let (kind, name) = if self.check_delim(":") {
                (None, None)
            } else {
                let kind = self.parse_expression(Precedence::Lowest)?;
                let name = if self.eat_keyword("as") {
                    Some(self.expect_identifier("a name")?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let handler_body = self.parse_suite()?;
            handlers.push(ExceptHandler {
                span: handler_span,
                kind,
                name,
                body: handler_body,
            });
        }

        let orelse = self.parse_else_block()?;
        let finalbody = if self.eat_keyword("finally") {
            Some(self.parse_suite()?)
        } else {
            None
        };
        if handlers.is_empty() && finalbody.is_none() {
            return Err(self.unexpected("`except` or `finally`"));
        }

        Ok(Stmt {
            span,
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
        })
    }

    fn parse_with(&mut self, is_async: bool) -> PResult<Stmt> {
        let span = self.span();
        self.expect_keyword("with")?;
        let mut items = Vec::new();
        loop {
            let context = self.parse_expression(Precedence::Lowest)?;
            let target = if self.eat_keyword("as") {
                let target = self.parse_expression(Precedence::Lowest)?;
                self.check_assignable(&target)?;
                Some(target)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if !self.eat_delim(",") {
                break;
            }
        }
        let body = self.parse_suite()?;
        Ok(Stmt {
            span,
            kind: StmtKind::With {
                items,
                body,
                is_async,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{ArgumentKind, BinaryOp, ExprKind, ParamKind, Program, StmtKind};
    use crate::parser::lex_and_parse;

    fn parse_ok(src: &str) -> Program {
        let (program, errors) = lex_and_parse(src, "test.py");
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        program
    }

    #[test]
    fn test_elif_chain() {
        let program = parse_ok("if a:\n    x\nelif b:\n    y\nelse:\n    z\n");
        let StmtKind::If { alternate, .. } = &program.statements[0].kind else {
            panic!("expected if");
        };
        let elif = alternate.as_deref().map(|s| &s.kind);
        let Some(StmtKind::If { alternate, .. }) = elif else {
            panic!("expected elif as nested if");
        };
        assert!(matches!(
            alternate.as_deref().map(|s| &s.kind),
            Some(StmtKind::Block(b)) if b.statements.len() == 1
        ));
    }

    #[test]
    fn test_function_definition() {
        let program = parse_ok(
            "@app.route('/x', methods=['POST'])\nasync def handler(a, b: int = 1, *args, **kw) -> str:\n    return a\n",
        );
        let StmtKind::FunctionDef(def) = &program.statements[0].kind else {
            panic!("expected function");
        };
        assert_eq!(def.name, "handler");
        assert!(def.is_async);
        assert_eq!(def.decorators.len(), 1);
        let kinds: Vec<ParamKind> = def.params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![ParamKind::Normal, ParamKind::Normal, ParamKind::VarArgs, ParamKind::KwArgs]
        );
        assert!(def.returns.is_some());
    }

    #[test]
    fn test_chained_and_augmented_assignment() {
        let program = parse_ok("a = b = 1\ncount += 2\nx: int = 3\n");
        let StmtKind::Assign(chained) = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(chained.targets.len(), 2);
        let StmtKind::Assign(aug) = &program.statements[1].kind else {
            panic!("expected assignment");
        };
        assert_eq!(aug.augmented, Some(BinaryOp::Add));
        let StmtKind::Assign(annotated) = &program.statements[2].kind else {
            panic!("expected assignment");
        };
        assert!(annotated.annotation.is_some());
    }

    #[test]
    fn test_tuple_unpacking_target() {
        let program = parse_ok("a, b = b, a\n");
        let StmtKind::Assign(assign) = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(&assign.targets[0].kind, ExprKind::Tuple(items) if items.len() == 2));
    }

    #[test]
    fn test_walrus_is_rejected() {
        let (_, errors) = lex_and_parse("if (n := 10) > 5:\n    pass\n", "t.py");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains(":="));
    }

    #[test]
    fn test_assign_to_literal_is_error() {
        let (_, errors) = lex_and_parse("1 = x\n", "t.py");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_try_with_and_imports() {
        let program = parse_ok(
            "import os, sys as system\nfrom ..pkg import (a, b as c)\ntry:\n    with open(p) as f, lock:\n        pass\nexcept ValueError as e:\n    raise RuntimeError() from e\nfinally:\n    pass\n",
        );
        assert_eq!(program.statements.len(), 3);
        let StmtKind::FromImport { level, names, .. } = &program.statements[1].kind else {
            panic!("expected from-import");
        };
        assert_eq!(*level, 2);
        assert_eq!(names.len(), 2);
        assert!(matches!(&program.statements[2].kind, StmtKind::Try { handlers, .. } if handlers.len() == 1));
    }

    #[test]
    fn test_one_line_bodies_and_semicolons() {
        let program = parse_ok("if x: a = 1; b = 2\nwhile y: pass\n");
        let StmtKind::If { body, .. } = &program.statements[0].kind else {
            panic!("expected if");
        };
        assert_eq!(body.statements.len(), 2);
    }

    #[test]
    fn test_class_with_bases() {
        let program = parse_ok("class View(Base, metaclass=Meta):\n    def get(self):\n        pass\n");
        let StmtKind::ClassDef(class) = &program.statements[0].kind else {
            panic!("expected class");
        };
        assert_eq!(class.bases.len(), 2);
        assert_eq!(class.bases[1].kind, ArgumentKind::Keyword("metaclass".into()));
    }

    #[test]
    fn test_orphan_else_is_error() {
        let (program, errors) = lex_and_parse("else:\n    x = 1\ny = 2\n", "t.py");
        assert_eq!(errors.len(), 1);
        assert_eq!(program.statements.len(), 1);
    }
}
