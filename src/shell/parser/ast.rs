use std::fmt;

use crate::shell::error::ShellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Standard,
    File,
    Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Standard,
    File,
    Pipe,
}

/// One program of a pipeline together with its stream wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    pub command: String,
    pub arguments: Vec<String>,
    pub input: InputMode,
    pub output: OutputMode,
    pub input_file: Option<String>,
    pub output_file: Option<String>,
    /// `None` until a `&` closes the run of stages this one belongs to.
    pub background_group: Option<usize>,
    pub error: Option<String>,
}

impl Stage {
    pub fn piped_in() -> Self {
        Self {
            input: InputMode::Pipe,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    pub fn is_background(&self) -> bool {
        self.background_group.is_some()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arguments.join(" "))?;
        if let Some(file) = &self.input_file {
            write!(f, " < {}", file)?;
        }
        if let Some(file) = &self.output_file {
            write!(f, " > {}", file)?;
        }
        Ok(())
    }
}

/// The stages parsed from one input line, in launch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The syntax error recorded while parsing, if any.
    pub fn error(&self) -> Option<&str> {
        self.stages.iter().find_map(|stage| stage.error.as_deref())
    }

    /// Checks the whole line before anything is launched.
    ///
    /// Besides recorded syntax errors this rejects a redirect operator that
    /// never received its filename (`cmd >`), which the parser leaves as is.
    pub fn validate(&self) -> Result<(), ShellError> {
        if let Some(error) = self.error() {
            return Err(ShellError::Syntax(error.to_string()));
        }
        for stage in &self.stages {
            if stage.input == InputMode::File && stage.input_file.is_none() {
                return Err(ShellError::Syntax(
                    "Syntax error: expected filename after '<'".to_string(),
                ));
            }
            if stage.output == OutputMode::File && stage.output_file.is_none() {
                return Err(ShellError::Syntax(
                    "Syntax error: expected filename after '>'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                let joined_by_pipe = self.stages[i - 1].output == OutputMode::Pipe;
                f.write_str(if joined_by_pipe { " | " } else { " & " })?;
            }
            write!(f, "{}", stage)?;
        }
        if self.stages.last().is_some_and(Stage::is_background) {
            f.write_str(" &")?;
        }
        Ok(())
    }
}
