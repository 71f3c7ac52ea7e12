use std::fmt;
use std::str::SplitWhitespace;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    Word(String),
    Exit,
    Pipe,
    Redirect(RedirectOp),
    Background,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectOp {
    Input,  // <
    Output, // >
}

impl Token {
    pub fn classify(word: &str) -> Self {
        match word {
            "exit" => Token::Exit,
            "|" => Token::Pipe,
            "<" => Token::Redirect(RedirectOp::Input),
            ">" => Token::Redirect(RedirectOp::Output),
            "&" => Token::Background,
            _ => Token::Word(word.to_string()),
        }
    }

    /// The literal text of the token as the user typed it.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(word) => word,
            Token::Exit => "exit",
            Token::Pipe => "|",
            Token::Redirect(RedirectOp::Input) => "<",
            Token::Redirect(RedirectOp::Output) => ">",
            Token::Background => "&",
        }
    }

    /// Tokens that may stand where a command name, argument or filename is expected.
    pub fn is_ordinary(&self) -> bool {
        matches!(self, Token::Word(_) | Token::Exit)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Splits a raw line on runs of whitespace and classifies each word.
/// No quoting, escaping or comments.
pub struct Lexer<'a> {
    words: SplitWhitespace<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            words: input.split_whitespace(),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.words.next().map(Token::classify)
    }
}

pub fn tokenize(line: &str) -> Vec<Token> {
    Lexer::new(line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn test_simple_command() {
        let mut lexer = Lexer::new("/bin/ls -l");
        assert_eq!(lexer.next(), Some(word("/bin/ls")));
        assert_eq!(lexer.next(), Some(word("-l")));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_pipe() {
        let tokens = tokenize("ls | grep foo");
        assert_eq!(tokens, vec![word("ls"), Token::Pipe, word("grep"), word("foo")]);
    }

    #[test]
    fn test_redirections() {
        let tokens = tokenize("cat < in.txt > out.txt &");
        assert_eq!(
            tokens,
            vec![
                word("cat"),
                Token::Redirect(RedirectOp::Input),
                word("in.txt"),
                Token::Redirect(RedirectOp::Output),
                word("out.txt"),
                Token::Background,
            ]
        );
    }

    #[test]
    fn test_operators_need_whitespace() {
        // Operators are only recognised as standalone tokens.
        assert_eq!(tokenize("a|b >out"), vec![word("a|b"), word(">out")]);
    }

    #[test]
    fn test_quotes_are_not_special() {
        assert_eq!(
            tokenize(r#"echo "hello world""#),
            vec![word("echo"), word("\"hello"), word("world\"")]
        );
    }

    #[test]
    fn test_runs_of_whitespace() {
        assert_eq!(tokenize("  a \t b\n\nc  "), vec![word("a"), word("b"), word("c")]);
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \t \n").is_empty());
    }

    #[test]
    fn test_exit_keeps_its_text() {
        let token = Token::classify("exit");
        assert_eq!(token, Token::Exit);
        assert_eq!(token.text(), "exit");
        assert!(token.is_ordinary());
        assert!(!Token::Background.is_ordinary());
    }
}
