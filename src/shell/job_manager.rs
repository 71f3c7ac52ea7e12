use std::fmt;

use log::{debug, warn};
use nix::unistd::Pid;

use crate::shell::executor::spawner::Spawner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done(i32),
}

/// A background group launched from one `&`.
#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub group: usize,
    /// Processes not reaped yet.
    pub pids: Vec<Pid>,
    /// The final stage, whose status is the job's status.
    pub last_pid: Pid,
    pub command: String,
    pub status: JobStatus,
    pub is_current: bool,
    pub is_previous: bool,
}

impl Job {
    fn new(index: usize, group: usize, pids: Vec<Pid>, command: String) -> Option<Self> {
        let last_pid = *pids.last()?;
        Some(Self {
            index,
            group,
            pids,
            last_pid,
            command,
            status: JobStatus::Running,
            is_current: false,
            is_previous: false,
        })
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            JobStatus::Running => "running".to_string(),
            JobStatus::Done(0) => "done".to_string(),
            JobStatus::Done(code) => format!("exit {}", code),
        };
        let mark = if self.is_current {
            "+"
        } else if self.is_previous {
            "-"
        } else {
            " "
        };
        write!(f, "[{}]{} {} {}", self.index, mark, status, self.command)
    }
}

#[derive(Default)]
pub struct JobManager {
    jobs: Vec<Job>,
}

impl JobManager {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn get_jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn find_available_index(&self) -> usize {
        let mut index = 1;
        while self.jobs.iter().any(|job| job.index == index) {
            index += 1;
        }
        index
    }

    /// Registers a launched background group and makes it the current job.
    pub fn add_job(&mut self, group: usize, pids: Vec<Pid>, command: String) -> Option<&Job> {
        let index = self.find_available_index();
        let job = Job::new(index, group, pids, command)?;
        debug!("background job [{}] group {} pids {:?}", index, group, job.pids);
        self.jobs.push(job);
        self.update_marks(index);
        self.jobs.last()
    }

    pub fn remove_job(&mut self, index: usize) -> Option<Job> {
        let pos = self.jobs.iter().position(|job| job.index == index)?;
        let was_current = self.jobs[pos].is_current;
        let removed = self.jobs.remove(pos);

        if was_current && !self.jobs.is_empty() {
            // Promote the previous job to current.
            if let Some(prev_job) = self.jobs.iter_mut().find(|job| job.is_previous) {
                prev_job.is_current = true;
                prev_job.is_previous = false;
            } else {
                let last_idx = self.jobs.len() - 1;
                self.jobs[last_idx].is_current = true;
            }
        }
        Some(removed)
    }

    fn update_marks(&mut self, current_job_index: usize) {
        for job in self.jobs.iter_mut() {
            if job.index == current_job_index {
                job.is_current = true;
                job.is_previous = false;
            } else if job.is_current {
                job.is_current = false;
                job.is_previous = true;
            } else {
                job.is_previous = false;
            }
        }
    }

    /// Polls every background process without blocking and returns the jobs
    /// that have fully terminated, removing them from the table.
    pub fn reap(&mut self, spawner: &mut dyn Spawner) -> Vec<Job> {
        let mut finished = Vec::new();
        for job in self.jobs.iter_mut() {
            let mut still_running = Vec::with_capacity(job.pids.len());
            for &pid in &job.pids {
                match spawner.try_wait(pid) {
                    Ok(None) => still_running.push(pid),
                    Ok(Some(code)) => {
                        if pid == job.last_pid {
                            job.status = JobStatus::Done(code);
                        }
                    }
                    Err(err) => {
                        warn!("lost track of pid {} in job [{}]: {}", pid, job.index, err);
                        if pid == job.last_pid {
                            job.status = JobStatus::Done(1);
                        }
                    }
                }
            }
            job.pids = still_running;
            if job.pids.is_empty() {
                if job.status == JobStatus::Running {
                    job.status = JobStatus::Done(0);
                }
                finished.push(job.index);
            }
        }

        finished
            .into_iter()
            .filter_map(|index| self.remove_job(index))
            .collect()
    }
}
