use crate::script::ast::Statement;
use crate::script::error::CompileError;
use crate::script::opcode::Opcode;
use crate::script::token::{Span, Spanned, Token};
use crate::DeviceFamily;

/// Kinds of open structured blocks, tracked as a stack during parsing.
/// The span is the opening keyword's, for reporting blocks left open.
enum Block {
    Loop { id: usize, span: Span },
    If { id: usize, else_seen: bool, span: Span },
}

/// Parser for the token stream produced by [`Lexer`](crate::script::lexer::Lexer).
///
/// The language is concatenative: numbers accumulate into a pending literal
/// run that attaches to the next instruction as its operand list, or becomes
/// a standalone push when something other than an instruction follows.
/// Structured blocks (`begin`/`while`/`repeat` and `if`/`else`/`endif`) are
/// lowered here to jumps against synthesized labels; the back end only ever
/// sees flat statements.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    family: DeviceFamily,
    statements: Vec<Statement>,
    pending: Vec<u16>,
    pending_span: Span,
    blocks: Vec<Block>,
    next_block_id: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>, family: DeviceFamily) -> Self {
        Parser {
            tokens,
            pos: 0,
            family,
            statements: Vec::new(),
            pending: Vec::new(),
            pending_span: Span { line: 1, col: 1 },
            blocks: Vec::new(),
            next_block_id: 0,
        }
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.tokens.get(self.pos).cloned().unwrap_or(Spanned {
            token: Token::Eof,
            span: Span { line: 0, col: 0 },
        });
        self.pos += 1;
        spanned
    }

    /// Move any accumulated numbers out as a standalone push.
    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.statements.push(Statement::Push {
                values: std::mem::take(&mut self.pending),
                span: self.pending_span,
            });
        }
    }

    fn expect_name(&mut self, what: &str, span: Span) -> Result<String, CompileError> {
        match self.advance() {
            Spanned {
                token: Token::Ident(name),
                ..
            }
            | Spanned {
                token: Token::Label(name),
                ..
            } => Ok(name),
            other => Err(CompileError::parse(
                format!("expected {} name, found {}", what, other.token),
                span,
            )),
        }
    }

    /// Label names containing `#` cannot be written in source, so the
    /// synthesized block labels can never collide with user labels.
    fn block_label(prefix: &str, id: usize) -> String {
        format!("#block_{}_{}", prefix, id)
    }

    fn instruction(&mut self, opcode: Opcode, span: Span) -> Result<(), CompileError> {
        if opcode.mini_only() && !self.family.is_mini() {
            return Err(CompileError::parse(
                format!(
                    "{} is not available on the {}",
                    opcode.mnemonic().unwrap_or("instruction"),
                    self.family.name()
                ),
                span,
            ));
        }
        self.statements.push(Statement::Instruction {
            opcode,
            operands: std::mem::take(&mut self.pending),
            span,
        });
        Ok(())
    }

    pub fn parse(mut self) -> Result<Vec<Statement>, CompileError> {
        loop {
            let Spanned { token, span } = self.advance();

            match token {
                Token::Eof => {
                    self.flush_pending();
                    break;
                }
                Token::Newline => {}
                Token::Number(n) => {
                    if self.pending.is_empty() {
                        self.pending_span = span;
                    }
                    self.pending.push(n);
                }
                Token::Label(name) => {
                    self.flush_pending();
                    self.statements.push(Statement::LabelDef { name, span });
                }
                Token::Sub => {
                    self.flush_pending();
                    let name = self.expect_name("subroutine", span)?;
                    // A built-in name always parses as the instruction, so
                    // such a subroutine could never be called.
                    if Opcode::from_mnemonic(&name).is_some()
                        || name == "jump"
                        || name == "jump_z"
                    {
                        return Err(CompileError::parse(
                            format!("{} is a built-in command, not a valid subroutine name", name),
                            span,
                        ));
                    }
                    self.statements.push(Statement::SubDef { name, span });
                }
                Token::Goto => {
                    self.flush_pending();
                    let target = self.expect_name("label", span)?;
                    self.statements.push(Statement::Jump {
                        target,
                        conditional: false,
                        span,
                    });
                }
                Token::Begin => {
                    self.flush_pending();
                    let id = self.next_block_id;
                    self.next_block_id += 1;
                    self.blocks.push(Block::Loop { id, span });
                    self.statements.push(Statement::LabelDef {
                        name: Self::block_label("start", id),
                        span,
                    });
                }
                Token::While => {
                    self.flush_pending();
                    let id = match self.blocks.last() {
                        Some(Block::Loop { id, .. }) => *id,
                        _ => {
                            return Err(CompileError::parse(
                                "while outside of a begin block",
                                span,
                            ));
                        }
                    };
                    self.statements.push(Statement::Jump {
                        target: Self::block_label("end", id),
                        conditional: true,
                        span,
                    });
                }
                Token::Repeat => {
                    self.flush_pending();
                    let id = match self.blocks.pop() {
                        Some(Block::Loop { id, .. }) => id,
                        Some(other) => {
                            self.blocks.push(other);
                            return Err(CompileError::parse(
                                "repeat closes an if block; use endif",
                                span,
                            ));
                        }
                        None => {
                            return Err(CompileError::parse(
                                "repeat outside of a begin block",
                                span,
                            ));
                        }
                    };
                    self.statements.push(Statement::Jump {
                        target: Self::block_label("start", id),
                        conditional: false,
                        span,
                    });
                    self.statements.push(Statement::LabelDef {
                        name: Self::block_label("end", id),
                        span,
                    });
                }
                Token::If => {
                    self.flush_pending();
                    let id = self.next_block_id;
                    self.next_block_id += 1;
                    self.blocks.push(Block::If {
                        id,
                        else_seen: false,
                        span,
                    });
                    self.statements.push(Statement::Jump {
                        target: Self::block_label("else", id),
                        conditional: true,
                        span,
                    });
                }
                Token::Else => {
                    self.flush_pending();
                    let id = match self.blocks.last_mut() {
                        Some(Block::If { id, else_seen, .. }) if !*else_seen => {
                            *else_seen = true;
                            *id
                        }
                        Some(Block::If { .. }) => {
                            return Err(CompileError::parse("duplicate else", span));
                        }
                        _ => {
                            return Err(CompileError::parse(
                                "else outside of an if block",
                                span,
                            ));
                        }
                    };
                    self.statements.push(Statement::Jump {
                        target: Self::block_label("end", id),
                        conditional: false,
                        span,
                    });
                    self.statements.push(Statement::LabelDef {
                        name: Self::block_label("else", id),
                        span,
                    });
                }
                Token::Endif => {
                    self.flush_pending();
                    let (id, else_seen) = match self.blocks.pop() {
                        Some(Block::If { id, else_seen, .. }) => (id, else_seen),
                        Some(other) => {
                            self.blocks.push(other);
                            return Err(CompileError::parse(
                                "endif closes a begin block; use repeat",
                                span,
                            ));
                        }
                        None => {
                            return Err(CompileError::parse(
                                "endif outside of an if block",
                                span,
                            ));
                        }
                    };
                    if !else_seen {
                        // Without an else, the taken branch of the if lands
                        // straight on the end of the block.
                        self.statements.push(Statement::LabelDef {
                            name: Self::block_label("else", id),
                            span,
                        });
                    }
                    self.statements.push(Statement::LabelDef {
                        name: Self::block_label("end", id),
                        span,
                    });
                }
                Token::Ident(word) => match word.as_str() {
                    "jump" => {
                        self.flush_pending();
                        let target = self.expect_name("label", span)?;
                        self.statements.push(Statement::Jump {
                            target,
                            conditional: false,
                            span,
                        });
                    }
                    "jump_z" => {
                        self.flush_pending();
                        let target = self.expect_name("label", span)?;
                        self.statements.push(Statement::Jump {
                            target,
                            conditional: true,
                            span,
                        });
                    }
                    _ => {
                        if let Some(opcode) = Opcode::from_mnemonic(&word) {
                            self.instruction(opcode, span)?;
                        } else {
                            // Anything unrecognized is a subroutine call;
                            // the resolver reports it if no such sub exists.
                            self.flush_pending();
                            self.statements.push(Statement::CallSub { name: word, span });
                        }
                    }
                },
            }
        }

        if let Some(block) = self.blocks.last() {
            let (what, span) = match block {
                Block::Loop { span, .. } => ("begin block is missing its repeat", *span),
                Block::If { span, .. } => ("if block is missing its endif", *span),
            };
            return Err(CompileError::parse(what, span));
        }

        Ok(self.statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Result<Vec<Statement>, CompileError> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(tokens, DeviceFamily::Mini12).parse()
    }

    fn parse_micro(source: &str) -> Result<Vec<Statement>, CompileError> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(tokens, DeviceFamily::Micro6).parse()
    }

    #[test]
    fn test_operands_attach_to_instruction() {
        let stmts = parse("sub main:\n  9000 0 servo\n  quit\n").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[0], Statement::SubDef { name, .. } if name == "main"));
        assert!(matches!(
            &stmts[1],
            Statement::Instruction { opcode: Opcode::Servo, operands, .. }
                if operands == &[9000, 0]
        ));
        assert!(matches!(
            &stmts[2],
            Statement::Instruction { opcode: Opcode::Quit, operands, .. }
                if operands.is_empty()
        ));
    }

    #[test]
    fn test_literal_run_spans_lines() {
        // The pending run only closes at a non-number, so numbers on
        // separate lines still form a single operand list.
        let stmts = parse("100\n200\nplus\nquit").unwrap();
        assert!(matches!(
            &stmts[0],
            Statement::Instruction { opcode: Opcode::Plus, operands, .. }
                if operands == &[100, 200]
        ));
    }

    #[test]
    fn test_trailing_numbers_become_push() {
        let stmts = parse("4 blink\nquit").unwrap();
        assert!(matches!(&stmts[0], Statement::Push { values, .. } if values == &[4]));
        assert!(matches!(&stmts[1], Statement::CallSub { name, .. } if name == "blink"));
    }

    #[test]
    fn test_goto_and_label() {
        let stmts = parse("top:\n  goto top").unwrap();
        assert!(matches!(&stmts[0], Statement::LabelDef { name, .. } if name == "top"));
        assert!(matches!(
            &stmts[1],
            Statement::Jump { target, conditional: false, .. } if target == "top"
        ));
    }

    #[test]
    fn test_begin_while_repeat_lowering() {
        let stmts = parse("begin\n  depth while\n  drop\nrepeat\nquit").unwrap();
        let expected: Vec<Statement> = vec![
            Statement::LabelDef {
                name: "#block_start_0".to_string(),
                span: stmts[0].span(),
            },
            Statement::Instruction {
                opcode: Opcode::Depth,
                operands: vec![],
                span: stmts[1].span(),
            },
            Statement::Jump {
                target: "#block_end_0".to_string(),
                conditional: true,
                span: stmts[2].span(),
            },
            Statement::Instruction {
                opcode: Opcode::Drop,
                operands: vec![],
                span: stmts[3].span(),
            },
            Statement::Jump {
                target: "#block_start_0".to_string(),
                conditional: false,
                span: stmts[4].span(),
            },
            Statement::LabelDef {
                name: "#block_end_0".to_string(),
                span: stmts[5].span(),
            },
            Statement::Instruction {
                opcode: Opcode::Quit,
                operands: vec![],
                span: stmts[6].span(),
            },
        ];
        assert_eq!(stmts, expected);
    }

    #[test]
    fn test_if_else_endif_lowering() {
        let stmts = parse("1 if\n  led_on\nelse\n  led_off\nendif\nquit").unwrap();
        assert!(matches!(&stmts[0], Statement::Push { values, .. } if values == &[1]));
        assert!(matches!(
            &stmts[1],
            Statement::Jump { target, conditional: true, .. } if target == "#block_else_0"
        ));
        assert!(matches!(
            &stmts[2],
            Statement::Instruction { opcode: Opcode::LedOn, .. }
        ));
        assert!(matches!(
            &stmts[3],
            Statement::Jump { target, conditional: false, .. } if target == "#block_end_0"
        ));
        assert!(matches!(
            &stmts[4],
            Statement::LabelDef { name, .. } if name == "#block_else_0"
        ));
        assert!(matches!(
            &stmts[5],
            Statement::Instruction { opcode: Opcode::LedOff, .. }
        ));
        assert!(matches!(
            &stmts[6],
            Statement::LabelDef { name, .. } if name == "#block_end_0"
        ));
    }

    #[test]
    fn test_if_without_else() {
        let stmts = parse("1 if\n  led_on\nendif\nquit").unwrap();
        // Both synthesized labels land at the endif.
        assert!(matches!(
            &stmts[3],
            Statement::LabelDef { name, .. } if name == "#block_else_0"
        ));
        assert!(matches!(
            &stmts[4],
            Statement::LabelDef { name, .. } if name == "#block_end_0"
        ));
    }

    #[test]
    fn test_nested_blocks() {
        let stmts = parse("begin\n  1 if\n  endif\nrepeat").unwrap();
        assert!(matches!(
            &stmts[0],
            Statement::LabelDef { name, .. } if name == "#block_start_0"
        ));
        assert!(matches!(
            &stmts[2],
            Statement::Jump { target, .. } if target == "#block_else_1"
        ));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("quit\nbegin\n  led_on\n").unwrap_err();
        assert!(err.to_string().contains("missing its repeat"));
        // The error points at the begin, not at end of input.
        assert_eq!(err.line(), Some(2));

        let err = parse("1 if\nled_on").unwrap_err();
        assert!(err.to_string().contains("missing its endif"));
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_mismatched_block_close() {
        let err = parse("begin\nendif").unwrap_err();
        assert!(err.to_string().contains("use repeat"));
    }

    #[test]
    fn test_while_outside_begin() {
        let err = parse("1 while").unwrap_err();
        assert!(err.to_string().contains("while outside"));
    }

    #[test]
    fn test_duplicate_else() {
        let err = parse("1 if\nelse\nelse\nendif").unwrap_err();
        assert!(err.to_string().contains("duplicate else"));
    }

    #[test]
    fn test_sub_named_after_builtin() {
        let err = parse("sub servo\n  return\nquit").unwrap_err();
        assert!(err.to_string().contains("built-in command"));

        let err = parse("sub jump_z:\n  return\nquit").unwrap_err();
        assert!(err.to_string().contains("built-in command"));
    }

    #[test]
    fn test_sub_without_colon() {
        let stmts = parse("sub main\nquit").unwrap();
        assert!(matches!(&stmts[0], Statement::SubDef { name, .. } if name == "main"));
    }

    #[test]
    fn test_mini_only_rejected_on_micro() {
        let err = parse_micro("0 0 pwm\nquit").unwrap_err();
        assert!(err.to_string().contains("not available"));

        assert!(parse("0 0 pwm\nquit").is_ok());
    }

    #[test]
    fn test_explicit_jump_mnemonics() {
        let stmts = parse("top:\n0 jump_z top\njump top").unwrap();
        assert!(matches!(&stmts[1], Statement::Push { values, .. } if values == &[0]));
        assert!(matches!(
            &stmts[2],
            Statement::Jump { target, conditional: true, .. } if target == "top"
        ));
        assert!(matches!(
            &stmts[3],
            Statement::Jump { target, conditional: false, .. } if target == "top"
        ));
    }

    #[test]
    fn test_goto_without_target() {
        let err = parse("goto\n").unwrap_err();
        assert!(err.to_string().contains("expected label name"));
    }
}
