use std::time::Duration;

use rayon::prelude::*;
use tracing::{event, Level};

use super::ArenaError;
use crate::environment::{EnvironmentError, ExecOutput};

/// A bounded pool of workers running independent simulation trials.
///
/// Every trial gets its own timeout. A trial that times out yields `None`
/// and does not disturb its siblings. A trial that exits non-zero is logged
/// and keeps its output. Any other failure is fatal to the round, but only
/// after every trial has finished.
pub struct SimulationPool {
    pool: rayon::ThreadPool,
    timeout: Duration,
}

impl SimulationPool {
    pub fn new(workers: usize, timeout: Duration) -> Result<Self, ArenaError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|idx| format!("sim-worker-{idx}"))
            .build()?;
        Ok(SimulationPool { pool, timeout })
    }

    /// Run `count` trials. `trial` receives the trial index and the per
    /// trial timeout.
    ///
    /// The returned logs are in trial order.
    pub fn run<F>(&self, count: usize, trial: F) -> Result<Vec<Option<String>>, ArenaError>
    where
        F: Fn(usize, Duration) -> Result<ExecOutput, EnvironmentError> + Sync + Send,
    {
        let timeout = self.timeout;
        let results: Vec<Result<Option<String>, EnvironmentError>> = self.pool.install(|| {
            (0..count)
                .into_par_iter()
                .map(|idx| match trial(idx, timeout) {
                    Ok(out) => {
                        if !out.success() {
                            event!(
                                Level::WARN,
                                sim = idx,
                                returncode = out.returncode,
                                "Simulation exited with an error:\n{}",
                                out.output
                            );
                        }
                        Ok(Some(out.output))
                    }
                    Err(e) if e.is_timeout() => {
                        event!(Level::WARN, sim = idx, "Simulation timed out: {e}");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                })
                .collect()
        });

        let mut logs = Vec::with_capacity(count);
        for result in results {
            logs.push(result?);
        }
        let timed_out = logs.iter().filter(|l| l.is_none()).count();
        event!(
            Level::DEBUG,
            "Finished {count} simulations, {timed_out} timed out"
        );
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test_log::test]
    fn test_timeout_does_not_cancel_siblings() {
        let pool = SimulationPool::new(3, Duration::from_secs(1)).unwrap();
        let logs = pool
            .run(4, |idx, timeout| {
                if idx == 2 {
                    Err(EnvironmentError::Timeout {
                        command: "sim".to_string(),
                        timeout,
                    })
                } else {
                    Ok(ExecOutput::new(0, format!("sim {idx}")))
                }
            })
            .unwrap();
        assert_eq!(
            logs,
            vec![
                Some("sim 0".to_string()),
                Some("sim 1".to_string()),
                None,
                Some("sim 3".to_string())
            ]
        );
    }

    #[test]
    fn test_non_zero_exit_keeps_output() {
        let pool = SimulationPool::new(2, Duration::from_secs(1)).unwrap();
        let logs = pool
            .run(1, |_, _| Ok(ExecOutput::new(1, "partial")))
            .unwrap();
        assert_eq!(logs, vec![Some("partial".to_string())]);
    }

    #[test]
    fn test_fatal_error_waits_for_all_trials() {
        let ran = AtomicUsize::new(0);
        let pool = SimulationPool::new(2, Duration::from_secs(1)).unwrap();
        let result = pool.run(5, |idx, _| {
            ran.fetch_add(1, Ordering::SeqCst);
            if idx == 0 {
                Err(EnvironmentError::Unreachable("gone".to_string()))
            } else {
                Ok(ExecOutput::new(0, ""))
            }
        });
        assert!(matches!(result, Err(ArenaError::ExecutionFailure(_))));
        assert_eq!(ran.load(Ordering::SeqCst), 5);
    }
}
