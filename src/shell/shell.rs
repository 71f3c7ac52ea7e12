use log::{debug, error, info, warn};
use std::error::Error;
use std::io::Write;

use crate::shell::context::Context;
use crate::shell::error::ShellError;
use crate::shell::executor::spawner::Spawner;
use crate::shell::executor::{Executor, Flow, OsSpawner};
use crate::shell::job_manager::JobManager;
use crate::shell::parser::{parse, tokenize};
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::shell::signals;
use crate::utils::config::Config;
use crate::utils::theme::{load_theme, Theme};

pub struct Shell<'a> {
    theme: Theme,
    readline: ReadlineManager<'a>,
    executor: Executor<OsSpawner>,
    context: Context,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            theme: load_theme(&config.theme),
            readline: ReadlineManager::new(config)?,
            executor: Executor::new(OsSpawner::new(), JobManager::new()),
            context: Context::from_process()?,
        })
    }

    /// Runs until `exit`, end of input or an empty line. Returns the exit code.
    pub fn run(&mut self) -> Result<i32, Box<dyn Error>> {
        debug!("starting psh in {}", self.context.cwd().display());

        signals::ignore_interactive_signals();
        self.readline.load_history();

        let result = self.run_loop();
        self.readline.save_history();
        let code = result?;

        let pending = self.executor.jobs().get_jobs().len();
        if pending > 0 {
            warn!("leaving {} background job(s) running", pending);
        }
        debug!("psh exiting with {}", code);
        Ok(code)
    }

    fn run_loop(&mut self) -> Result<i32, Box<dyn Error>> {
        loop {
            self.report_finished_jobs();
            std::io::stdout().flush()?;
            let prompt = self.context.prompt();

            match self.readline.readline(&prompt) {
                Ok(line) => {
                    if let Some(code) = self.handle_input(&line)? {
                        return Ok(code);
                    }
                }
                Err(ReadlineError::Eof) => {
                    info!("end of input");
                    return Ok(0);
                }
                Err(ReadlineError::Interrupted) => {
                    debug!("line discarded by interrupt");
                }
                Err(err) => {
                    error!("readline failed: {}", err);
                    return Err(err.into());
                }
            }
        }
    }

    /// Returns the exit code when the line ends the session.
    fn handle_input(&mut self, line: &str) -> Result<Option<i32>, Box<dyn Error>> {
        let outcome = run_line(&mut self.executor, &mut self.context, line);
        match &outcome {
            LineOutcome::Empty => info!("empty line, ending session"),
            LineOutcome::Aborted(err) => warn!("`{}` aborted: {}", line.trim(), err),
            LineOutcome::Status(status) if *status != 0 => {
                info!("`{}` exited with {}", line.trim(), status)
            }
            _ => {}
        }
        if !matches!(outcome, LineOutcome::Empty) {
            self.readline.add_history(line)?;
        }

        if let Some(message) = outcome.message() {
            eprintln!("{}", self.theme.error(message));
        }
        Ok(outcome.exit_code())
    }

    fn report_finished_jobs(&mut self) {
        for job in self.executor.reap_jobs() {
            info!("job [{}] finished: {:?}", job.index, job.status);
            println!("{}", self.theme.notice(job.to_string()));
        }
    }
}

/// What one input line did to the session.
#[derive(Debug)]
enum LineOutcome {
    /// Nothing to run; the session ends.
    Empty,
    Exit(i32),
    /// Status of the final stage.
    Status(i32),
    /// The line was abandoned; the session goes on.
    Aborted(ShellError),
}

impl LineOutcome {
    fn exit_code(&self) -> Option<i32> {
        match self {
            LineOutcome::Empty => Some(0),
            LineOutcome::Exit(code) => Some(*code),
            LineOutcome::Status(_) | LineOutcome::Aborted(_) => None,
        }
    }

    fn message(&self) -> Option<String> {
        match self {
            LineOutcome::Status(0) | LineOutcome::Empty | LineOutcome::Exit(_) => None,
            LineOutcome::Status(status) => Some(format!("exit status {}", status)),
            LineOutcome::Aborted(err) => Some(err.to_string()),
        }
    }
}

fn run_line<S: Spawner>(executor: &mut Executor<S>, ctx: &mut Context, line: &str) -> LineOutcome {
    let pipeline = parse(&tokenize(line));
    if pipeline.is_empty() {
        return LineOutcome::Empty;
    }
    debug!("parsed {} stage(s): {:?}", pipeline.len(), pipeline);

    match executor.execute(&pipeline, ctx) {
        Ok(Flow::Exit(code)) => LineOutcome::Exit(code),
        Ok(Flow::Continue(status)) => LineOutcome::Status(status),
        Err(err) => LineOutcome::Aborted(err),
    }
}
