//! Descriptor wiring for a stage, expressed as plain data.
//!
//! A pipe is identified by the index of the stage that writes into it, so
//! stage `i` with `OutputMode::Pipe` writes to pipe `i` and stage `i + 1`
//! reads from it.

use std::path::PathBuf;

use crate::shell::context::Context;
use crate::shell::parser::ast::{InputMode, OutputMode, Stage};

/// What a child gets as standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Inherit,
    File(PathBuf),
    Pipe(usize),
    /// The producer ran inside the shell and wrote nothing; read end-of-file.
    Null,
}

/// What a child gets as standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    Inherit,
    /// Created if missing, truncated otherwise.
    File(PathBuf),
    Pipe(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    pub index: usize,
    pub program: String,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub stdin: Source,
    pub stdout: Sink,
}

impl SpawnPlan {
    /// `upstream` is the pipe left open by the previous stage, if it made one.
    pub fn for_stage(index: usize, stage: &Stage, ctx: &Context, upstream: Option<usize>) -> Self {
        let stdin = match stage.input {
            InputMode::Standard => Source::Inherit,
            InputMode::File => Source::File(ctx.resolve(stage.input_file.as_deref().unwrap_or_default())),
            InputMode::Pipe => upstream.map_or(Source::Null, Source::Pipe),
        };
        let stdout = match stage.output {
            OutputMode::Standard => Sink::Inherit,
            OutputMode::File => Sink::File(ctx.resolve(stage.output_file.as_deref().unwrap_or_default())),
            OutputMode::Pipe => Sink::Pipe(index),
        };

        SpawnPlan {
            index,
            program: stage.command.clone(),
            argv: stage.arguments.clone(),
            cwd: ctx.cwd().to_path_buf(),
            env: ctx.env_pairs(),
            stdin,
            stdout,
        }
    }

    /// Pipe ends moved into the child. The launcher closes its own copies of
    /// exactly these once the child exists; every other pipe end is closed in
    /// the child.
    pub fn handoffs(&self) -> Vec<(usize, PipeEnd)> {
        let mut ends = Vec::with_capacity(2);
        if let Source::Pipe(id) = self.stdin {
            ends.push((id, PipeEnd::Read));
        }
        if let Sink::Pipe(id) = self.stdout {
            ends.push((id, PipeEnd::Write));
        }
        ends
    }
}
