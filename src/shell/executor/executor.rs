use log::{debug, info, warn};
use nix::unistd::Pid;

use super::plan::SpawnPlan;
use super::spawner::Spawner;
use crate::shell::context::Context;
use crate::shell::error::ShellError;
use crate::shell::job_manager::{Job, JobManager};
use crate::shell::parser::ast::{OutputMode, Pipeline, Stage};

/// What the driver should do after a line ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line; carries the status of the final stage.
    Continue(i32),
    Exit(i32),
}

pub struct Executor<S: Spawner> {
    spawner: S,
    jobs: JobManager,
}

/// Stages joined by pipes that have been launched but not waited on.
#[derive(Default)]
struct Chain {
    start: usize,
    pids: Vec<Pid>,
}

impl<S: Spawner> Executor<S> {
    pub fn new(spawner: S, jobs: JobManager) -> Self {
        Self { spawner, jobs }
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn execute(&mut self, pipeline: &Pipeline, ctx: &mut Context) -> Result<Flow, ShellError> {
        pipeline.validate()?;
        debug!("executing: {}", pipeline);

        let mut chain = Chain::default();
        let result = self.run_stages(pipeline, ctx, &mut chain);
        self.spawner.release_pipes();

        if result.is_err() && !chain.pids.is_empty() {
            // Whatever already runs gets EOF on its pipes; collect it.
            for pid in chain.pids {
                if let Err(err) = self.spawner.wait(pid) {
                    warn!("could not reap pid {}: {}", pid, err);
                }
            }
        }
        result
    }

    fn run_stages(
        &mut self,
        pipeline: &Pipeline,
        ctx: &mut Context,
        chain: &mut Chain,
    ) -> Result<Flow, ShellError> {
        let stages = pipeline.stages();
        let mut status = 0;
        let mut upstream: Option<usize> = None;

        for (index, stage) in stages.iter().enumerate() {
            if let Some(error) = &stage.error {
                return Err(ShellError::Syntax(error.clone()));
            }
            if index == 0 || stages[index - 1].output != OutputMode::Pipe {
                chain.start = index;
            }

            match stage.command.as_str() {
                "exit" => {
                    info!("exit requested by stage {}", index);
                    return Ok(Flow::Exit(0));
                }
                "cd" => {
                    builtin_cd(stage, ctx)?;
                    // Nobody reads what an upstream stage writes into `cd`.
                    self.spawner.release_pipes();
                    upstream = None;
                    if stage.output != OutputMode::Pipe {
                        self.finish_chain(&stages[chain.start..=index], chain)?;
                        status = 0;
                    }
                    continue;
                }
                _ => {}
            }

            if stage.output == OutputMode::Pipe {
                self.spawner.open_pipe(index)?;
            }
            let plan = SpawnPlan::for_stage(index, stage, ctx, upstream);
            let pid = self.spawner.spawn(&plan)?;
            chain.pids.push(pid);

            if stage.output == OutputMode::Pipe {
                upstream = Some(index);
            } else {
                upstream = None;
                status = self.finish_chain(&stages[chain.start..=index], chain)?.unwrap_or(0);
            }
        }

        Ok(Flow::Continue(status))
    }

    /// Waits for a foreground chain in launch order, or hands a background
    /// one to the job table. Returns the final stage's status if waited.
    fn finish_chain(&mut self, stages: &[Stage], chain: &mut Chain) -> Result<Option<i32>, ShellError> {
        let pids = std::mem::take(&mut chain.pids);
        let Some(last) = stages.last() else {
            return Ok(None);
        };

        if let Some(group) = last.background_group {
            let command = join_stages(stages);
            if let Some(job) = self.jobs.add_job(group, pids, command) {
                info!("group {} runs in background as job [{}]", job.group, job.index);
                println!("[{}] {}", job.index, job.last_pid);
            }
            return Ok(None);
        }

        // Every stage is reaped even after a failed wait.
        let mut status = None;
        let mut first_error = None;
        for pid in pids {
            match self.spawner.wait(pid) {
                Ok(code) => {
                    debug!("pid {} exited with {}", pid, code);
                    status = Some(code);
                }
                Err(err) => {
                    warn!("could not wait for pid {}: {}", pid, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(status),
        }
    }

    /// Background jobs that finished since the last call.
    pub fn reap_jobs(&mut self) -> Vec<Job> {
        self.jobs.reap(&mut self.spawner)
    }
}

fn builtin_cd(stage: &Stage, ctx: &mut Context) -> Result<(), ShellError> {
    match stage.arguments.as_slice() {
        [_, target] => ctx.change_dir(target),
        _ => Err(ShellError::Usage("cd <dir>".to_string())),
    }
}

fn join_stages(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(Stage::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::shell::executor::plan::{Sink, Source};
    use crate::shell::parser::lexer::tokenize;
    use crate::shell::parser::parser::parse;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Pipe(usize),
        Spawn(SpawnPlan),
        Wait(i32),
    }

    /// Records what the executor asks for; pids count up from 100.
    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        exit_codes: HashMap<String, i32>,
        programs: HashMap<i32, String>,
        finished: Vec<i32>,
        /// Pids whose wait fails.
        lost: Vec<i32>,
        next_pid: i32,
    }

    impl Recorder {
        fn spawned(&self) -> Vec<&SpawnPlan> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Spawn(plan) => Some(plan),
                    _ => None,
                })
                .collect()
        }

        fn waited(&self) -> Vec<i32> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Wait(pid) => Some(*pid),
                    _ => None,
                })
                .collect()
        }
    }

    impl Spawner for Recorder {
        fn open_pipe(&mut self, id: usize) -> Result<(), ShellError> {
            self.events.push(Event::Pipe(id));
            Ok(())
        }

        fn spawn(&mut self, plan: &SpawnPlan) -> Result<Pid, ShellError> {
            if plan.program == "missing-input" {
                return Err(ShellError::filesystem(
                    "nope",
                    std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                ));
            }
            let pid = 100 + self.next_pid;
            self.next_pid += 1;
            self.programs.insert(pid, plan.program.clone());
            self.events.push(Event::Spawn(plan.clone()));
            Ok(Pid::from_raw(pid))
        }

        fn wait(&mut self, pid: Pid) -> Result<i32, ShellError> {
            self.events.push(Event::Wait(pid.as_raw()));
            if self.lost.contains(&pid.as_raw()) {
                return Err(ShellError::Os(nix::Error::ECHILD));
            }
            let program = &self.programs[&pid.as_raw()];
            Ok(self.exit_codes.get(program).copied().unwrap_or(0))
        }

        fn try_wait(&mut self, pid: Pid) -> Result<Option<i32>, ShellError> {
            Ok(self.finished.contains(&pid.as_raw()).then_some(0))
        }

        fn release_pipes(&mut self) {}
    }

    fn context() -> Context {
        Context::new(PathBuf::from("/"), HashMap::new())
    }

    fn run(executor: &mut Executor<Recorder>, ctx: &mut Context, line: &str) -> Result<Flow, ShellError> {
        executor.execute(&parse(&tokenize(line)), ctx)
    }

    fn executor() -> Executor<Recorder> {
        Executor::new(Recorder::default(), JobManager::new())
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_single_command_is_waited() {
        let mut executor = executor();
        let mut ctx = context();
        executor.spawner.exit_codes.insert("false".into(), 1);

        assert_eq!(run(&mut executor, &mut ctx, "true").unwrap(), Flow::Continue(0));
        assert_eq!(run(&mut executor, &mut ctx, "false").unwrap(), Flow::Continue(1));
        assert_eq!(executor.spawner.waited(), vec![100, 101]);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_pipeline_wiring_and_final_status() {
        let mut executor = executor();
        let mut ctx = context();
        executor.spawner.exit_codes.insert("first".into(), 2);
        executor.spawner.exit_codes.insert("last".into(), 5);

        let flow = run(&mut executor, &mut ctx, "first | middle x | last").unwrap();
        assert_eq!(flow, Flow::Continue(5));

        let recorder = &executor.spawner;
        assert_eq!(recorder.events[0], Event::Pipe(0));
        assert!(matches!(recorder.events[1], Event::Spawn(_)));
        assert_eq!(recorder.events[2], Event::Pipe(1));

        let plans = recorder.spawned();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].stdout, Sink::Pipe(0));
        assert_eq!(plans[1].stdin, Source::Pipe(0));
        assert_eq!(plans[1].stdout, Sink::Pipe(1));
        assert_eq!(plans[2].stdin, Source::Pipe(1));
        assert_eq!(plans[2].stdout, Sink::Inherit);

        // Every stage is launched before any is waited on, then reaped in order.
        assert!(matches!(recorder.events[4], Event::Spawn(_)));
        assert_eq!(recorder.waited(), vec![100, 101, 102]);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_syntax_error_spawns_nothing() {
        let mut executor = executor();
        let mut ctx = context();
        let err = run(&mut executor, &mut ctx, "| cmd").unwrap_err();
        assert_eq!(err.to_string(), "Invalid command: |");
        assert!(executor.spawner.events.is_empty());

        let err = run(&mut executor, &mut ctx, "ls | wc >").unwrap_err();
        assert!(matches!(err, ShellError::Syntax(_)));
        assert!(executor.spawner.events.is_empty());
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_exit_stops_everything() {
        let mut executor = executor();
        let mut ctx = context();
        assert_eq!(run(&mut executor, &mut ctx, "exit").unwrap(), Flow::Exit(0));
        assert_eq!(run(&mut executor, &mut ctx, "exit & late").unwrap(), Flow::Exit(0));
        assert!(executor.spawner.spawned().is_empty());
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_cd_usage_and_effect() {
        let mut executor = executor();
        let mut ctx = context();

        for line in ["cd", "cd a b"] {
            let err = run(&mut executor, &mut ctx, line).unwrap_err();
            assert_eq!(err.to_string(), "usage: cd <dir>");
        }

        let root = std::env::temp_dir().canonicalize().unwrap();
        let mut ctx = Context::new(root.clone(), HashMap::new());
        std::fs::create_dir_all(root.join(format!("pipesh-exec-{}", std::process::id()))).unwrap();
        let inner = format!("pipesh-exec-{}", std::process::id());

        let line = format!("cd {} | child", inner);
        assert_eq!(run(&mut executor, &mut ctx, &line).unwrap(), Flow::Continue(0));
        assert_eq!(ctx.cwd(), root.join(&inner));

        // The child sees the new directory; its pipe had no producer process.
        let plans = executor.spawner.spawned();
        assert_eq!(plans[0].cwd, root.join(&inner));
        assert_eq!(plans[0].stdin, Source::Null);

        run(&mut executor, &mut ctx, "cd ..").unwrap();
        assert_eq!(ctx.cwd(), root.as_path());
        std::fs::remove_dir_all(root.join(&inner)).unwrap();
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_background_group_is_not_waited() {
        let mut executor = executor();
        let mut ctx = context();

        let flow = run(&mut executor, &mut ctx, "slow a | slower & quick").unwrap();
        assert_eq!(flow, Flow::Continue(0));
        // Only the foreground stage was waited.
        assert_eq!(executor.spawner.waited(), vec![102]);

        let jobs = executor.jobs().get_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].command, "slow a | slower");
        assert_eq!(jobs[0].pids, vec![Pid::from_raw(100), Pid::from_raw(101)]);

        assert!(executor.reap_jobs().is_empty());
        executor.spawner.finished.extend([100, 101]);
        let done = executor.reap_jobs();
        assert_eq!(done.len(), 1);
        assert!(executor.jobs().get_jobs().is_empty());
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_spawn_failure_reaps_launched_stages() {
        let mut executor = executor();
        let mut ctx = context();
        let err = run(&mut executor, &mut ctx, "producer | missing-input").unwrap_err();
        assert!(matches!(err, ShellError::Filesystem { .. }));
        assert_eq!(executor.spawner.waited(), vec![100]);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_failed_wait_still_reaps_rest_of_chain() {
        let mut executor = executor();
        let mut ctx = context();
        executor.spawner.lost.push(100);

        let err = run(&mut executor, &mut ctx, "a | b | c").unwrap_err();
        assert!(matches!(err, ShellError::Os(nix::Error::ECHILD)));
        assert_eq!(executor.spawner.waited(), vec![100, 101, 102]);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_output_redirect_then_background() {
        let mut executor = executor();
        let mut ctx = context();
        run(&mut executor, &mut ctx, "gen > /tmp/x & view < /tmp/x").unwrap();
        let plans = executor.spawner.spawned();
        assert_eq!(plans[0].stdout, Sink::File(PathBuf::from("/tmp/x")));
        assert_eq!(plans[1].stdin, Source::File(PathBuf::from("/tmp/x")));
        assert_eq!(executor.spawner.waited(), vec![101]);
    }
}
