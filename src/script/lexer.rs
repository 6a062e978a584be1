use crate::script::error::CompileError;
use crate::script::token::{Span, Spanned, Token};

/// Lexer for the Maestro scripting language.
///
/// The language is word-oriented: tokens are separated by whitespace, `#`
/// starts a comment that runs to end of line, and newlines are significant
/// (the parser is line-oriented). Every step consumes at least one character,
/// so malformed input cannot loop forever.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_number(&mut self) -> Result<Token, CompileError> {
        let start = self.span();

        // Hex: 0x... or 0X...
        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.advance();

            let mut hex = String::new();
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            if hex.is_empty() {
                return Err(CompileError::lex("expected hex digits after 0x", start));
            }

            let value = u32::from_str_radix(&hex, 16)
                .map_err(|_| CompileError::lex(format!("invalid hex number: 0x{}", hex), start))?;

            return in_range(value, start);
        }

        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let value: u32 = digits
            .parse()
            .map_err(|_| CompileError::lex(format!("value {} must be an integer", digits), start))?;

        in_range(value, start)
    }

    fn read_word(&mut self) -> Result<Token, CompileError> {
        let start = self.span();
        let mut word = String::new();

        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // `name:` defines a label.
        if self.current() == Some(':') {
            self.advance();
            return Ok(Token::Label(word.to_lowercase()));
        }

        if word.is_empty() {
            // current() is a character no token can start with
            let ch = self.current().unwrap_or('\0');
            return Err(CompileError::lex(
                format!("unexpected character: '{}'", ch),
                start,
            ));
        }

        // Mnemonics and directives are case-insensitive.
        Ok(match word.to_lowercase().as_str() {
            "sub" => Token::Sub,
            "goto" => Token::Goto,
            "begin" => Token::Begin,
            "while" => Token::While,
            "repeat" => Token::Repeat,
            "if" => Token::If,
            "else" => Token::Else,
            "endif" => Token::Endif,
            lower => Token::Ident(lower.to_string()),
        })
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, CompileError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('\n') => {
                    tokens.push(Spanned {
                        token: Token::Newline,
                        span,
                    });
                    self.advance();
                }
                Some('#') => self.skip_comment(),
                Some(ch) if ch.is_ascii_digit() => {
                    let token = self.read_number()?;
                    // A digit run glued to letters ("12abc") is neither a
                    // number nor a word; reject it rather than splitting.
                    if matches!(self.current(), Some(c) if c.is_alphanumeric() || c == '_') {
                        return Err(CompileError::lex("malformed numeric literal", span));
                    }
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_alphabetic() || ch == '_' => {
                    let token = self.read_word()?;
                    tokens.push(Spanned { token, span });
                }
                Some(ch) => {
                    return Err(CompileError::lex(
                        format!("unexpected character: '{}'", ch),
                        span,
                    ));
                }
            }
        }

        Ok(tokens)
    }
}

fn in_range(value: u32, span: Span) -> Result<Token, CompileError> {
    if value > 0xFFFF {
        return Err(CompileError::lex(
            format!("value {} is not in the allowed range of 0 to 65535", value),
            span,
        ));
    }
    Ok(Token::Number(value as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .filter(|t| !matches!(t, Token::Newline | Token::Eof))
            .collect()
    }

    #[test]
    fn test_numbers_and_words() {
        let t = tokens("9000 0 servo");
        assert_eq!(
            t,
            vec![
                Token::Number(9000),
                Token::Number(0),
                Token::Ident("servo".to_string()),
            ]
        );
    }

    #[test]
    fn test_hex_numbers() {
        let t = tokens("0x2a 0XFF");
        assert_eq!(t, vec![Token::Number(42), Token::Number(255)]);
    }

    #[test]
    fn test_case_insensitive_mnemonics() {
        let t = tokens("SERVO Delay GET_ms");
        assert_eq!(
            t,
            vec![
                Token::Ident("servo".to_string()),
                Token::Ident("delay".to_string()),
                Token::Ident("get_ms".to_string()),
            ]
        );
    }

    #[test]
    fn test_label_and_sub() {
        let t = tokens("sub main:\nloop_top:\ngoto loop_top");
        assert_eq!(
            t,
            vec![
                Token::Sub,
                Token::Label("main".to_string()),
                Token::Label("loop_top".to_string()),
                Token::Goto,
                Token::Ident("loop_top".to_string()),
            ]
        );
    }

    #[test]
    fn test_block_keywords() {
        let t = tokens("begin while repeat if else endif");
        assert_eq!(
            t,
            vec![
                Token::Begin,
                Token::While,
                Token::Repeat,
                Token::If,
                Token::Else,
                Token::Endif,
            ]
        );
    }

    #[test]
    fn test_comments_stripped() {
        let t = tokens("quit # stop the script\n# whole-line comment\n500 delay");
        assert_eq!(
            t,
            vec![
                Token::Ident("quit".to_string()),
                Token::Number(500),
                Token::Ident("delay".to_string()),
            ]
        );
    }

    #[test]
    fn test_newlines_kept() {
        let mut lexer = Lexer::new("quit\nquit");
        let t: Vec<Token> = lexer.tokenize().unwrap().into_iter().map(|s| s.token).collect();
        assert_eq!(
            t,
            vec![
                Token::Ident("quit".to_string()),
                Token::Newline,
                Token::Ident("quit".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_value_out_of_range() {
        let mut lexer = Lexer::new("65536");
        let err = lexer.tokenize().unwrap_err();
        assert!(err.to_string().contains("allowed range"));
    }

    #[test]
    fn test_invalid_hex() {
        let mut lexer = Lexer::new("0x");
        let err = lexer.tokenize().unwrap_err();
        assert!(err.to_string().contains("expected hex digits"));
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("9000 @");
        let err = lexer.tokenize().unwrap_err();
        assert!(err.to_string().contains("unexpected character"));
    }

    #[test]
    fn test_glued_number_and_word() {
        let mut lexer = Lexer::new("12abc");
        assert!(lexer.tokenize().is_err());
    }

    #[test]
    fn test_spans() {
        let mut lexer = Lexer::new("sub main:\n  9000 0 servo\n");
        let sp = lexer.tokenize().unwrap();

        assert_eq!(sp[0].token, Token::Sub);
        assert_eq!((sp[0].span.line, sp[0].span.col), (1, 1));
        assert_eq!(sp[1].token, Token::Label("main".to_string()));
        assert_eq!((sp[1].span.line, sp[1].span.col), (1, 5));
        assert_eq!(sp[3].token, Token::Number(9000));
        assert_eq!((sp[3].span.line, sp[3].span.col), (2, 3));
    }
}
