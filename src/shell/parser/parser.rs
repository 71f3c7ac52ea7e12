use log::debug;

use super::ast::{InputMode, OutputMode, Pipeline, Stage};
use super::lexer::{RedirectOp, Token};

/// Where the parser stands within the stage currently being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing seen yet for this stage.
    Command,
    /// Command name seen; collecting arguments and operators.
    Arguments,
    /// `>` seen, waiting for the filename.
    OutputFile,
    /// Output filename seen; only `&` may follow.
    AfterOutputFile,
    /// `<` seen, waiting for the filename.
    InputFile,
    /// Input filename seen; `|`, `>` or `&` may follow.
    AfterInputFile,
    /// A syntax error was recorded; remaining tokens are ignored.
    Failed,
}

pub struct Parser<'a> {
    tokens: std::slice::Iter<'a, Token>,
    state: State,
    stages: Vec<Stage>,
    current: Stage,
    /// Index of the last stage before each `&`, in parse order.
    background_marks: Vec<usize>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens: tokens.iter(),
            state: State::Command,
            stages: Vec::new(),
            current: Stage::default(),
            background_marks: Vec::new(),
        }
    }

    pub fn parse_pipeline(mut self) -> Pipeline {
        while let Some(token) = self.tokens.next() {
            self.step(token);
        }

        // A trailing `&` (or an empty line) leaves an empty stage behind.
        if !self.current.is_empty() || self.current.error.is_some() {
            self.stages.push(self.current);
        }

        let groups = assign_background_groups(self.stages.len(), &self.background_marks);
        let stages = self
            .stages
            .into_iter()
            .zip(groups)
            .map(|(stage, background_group)| Stage {
                background_group,
                ..stage
            })
            .collect();

        Pipeline::new(stages)
    }

    fn step(&mut self, token: &Token) {
        match (self.state, token) {
            (State::Failed, _) => {}

            (State::Command, token) if token.is_ordinary() => {
                self.current.command = token.text().to_string();
                self.current.arguments.push(token.text().to_string());
                self.state = State::Arguments;
            }
            (State::Command, token) => {
                self.fail(format!("Invalid command: {}", token));
            }

            (State::Arguments, Token::Pipe) | (State::AfterInputFile, Token::Pipe) => {
                self.close_with_pipe();
            }
            (State::Arguments, Token::Redirect(RedirectOp::Input)) => {
                // The stage already reads from the previous one.
                if self.current.input == InputMode::Pipe {
                    self.unexpected(token);
                } else {
                    self.current.input = InputMode::File;
                    self.state = State::InputFile;
                }
            }
            (State::Arguments, Token::Redirect(RedirectOp::Output))
            | (State::AfterInputFile, Token::Redirect(RedirectOp::Output)) => {
                self.current.output = OutputMode::File;
                self.state = State::OutputFile;
            }
            (State::Arguments, Token::Background)
            | (State::AfterInputFile, Token::Background)
            | (State::AfterOutputFile, Token::Background) => {
                self.close_background();
            }
            (State::Arguments, token) => {
                self.current.arguments.push(token.text().to_string());
            }

            (State::OutputFile, token) if token.is_ordinary() => {
                self.current.output_file = Some(token.text().to_string());
                self.state = State::AfterOutputFile;
            }
            (State::InputFile, token) if token.is_ordinary() => {
                self.current.input_file = Some(token.text().to_string());
                self.state = State::AfterInputFile;
            }

            (State::OutputFile, token)
            | (State::InputFile, token)
            | (State::AfterOutputFile, token)
            | (State::AfterInputFile, token) => self.unexpected(token),
        }
    }

    fn close_with_pipe(&mut self) {
        self.current.output = OutputMode::Pipe;
        let finished = std::mem::replace(&mut self.current, Stage::piped_in());
        self.stages.push(finished);
        self.state = State::Command;
    }

    fn close_background(&mut self) {
        let finished = std::mem::take(&mut self.current);
        self.stages.push(finished);
        self.background_marks.push(self.stages.len() - 1);
        self.state = State::Command;
    }

    fn unexpected(&mut self, token: &Token) {
        self.fail(format!("Syntax error: unexpected token: {}", token));
    }

    fn fail(&mut self, error: String) {
        debug!("parse failed in state {:?}: {}", self.state, error);
        self.current.error = Some(error);
        self.state = State::Failed;
    }
}

/// Gives every stage up to and including each `&` mark the next group id.
///
/// Groups cover contiguous, non-overlapping ranges in parse order; stages
/// after the last mark stay in the foreground (`None`).
pub fn assign_background_groups(len: usize, marks: &[usize]) -> Vec<Option<usize>> {
    let mut groups = vec![None; len];
    let mut start = 0;
    for (group, &end) in marks.iter().enumerate() {
        if end >= len || end < start {
            continue;
        }
        for slot in &mut groups[start..=end] {
            *slot = Some(group);
        }
        start = end + 1;
    }
    groups
}

pub fn parse(tokens: &[Token]) -> Pipeline {
    Parser::new(tokens).parse_pipeline()
}
