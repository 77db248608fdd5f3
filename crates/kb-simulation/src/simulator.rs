use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use kb_entropy::EntropyFactory;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::setup::{EncounterSetup, PolicySet};
use crate::summary::{Accumulator, SimulationSummary};
use crate::trial::TrialRunner;

/// Trials per unit of work handed to a worker.
pub const BLOCK_SIZE: u64 = 64;

/// Runs many independent trials of an encounter in parallel.
///
/// Trials are cut into blocks of [`BLOCK_SIZE`] consecutive indices. Workers
/// claim blocks from a shared counter and aggregate each into its own
/// partial. Partials are folded into the running total in block order as
/// soon as every earlier block is in, so only blocks that finished ahead of
/// a slower one are held. The summary therefore does not depend on the
/// number of workers or on scheduling.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimConfig,
}

impl Simulator {
    /// A simulator for `config`, validated up front.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The run configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run every trial.
    pub fn run(
        &self,
        setup: &EncounterSetup,
        policies: &PolicySet,
        factory: &dyn EntropyFactory,
    ) -> SimResult<SimulationSummary> {
        self.run_with_cancel(setup, policies, factory, &CancelToken::new())
    }

    /// Run every trial, stopping at the next round boundary once `cancel`
    /// fires. A cancelled run still returns the summary of finished trials.
    pub fn run_with_cancel(
        &self,
        setup: &EncounterSetup,
        policies: &PolicySet,
        factory: &dyn EntropyFactory,
        cancel: &CancelToken,
    ) -> SimResult<SimulationSummary> {
        let config = &self.config;
        config.validate()?;
        policies.check_covers(setup)?;

        let trials = config.trial_count;
        let blocks = trials.div_ceil(BLOCK_SIZE);
        let workers = config.worker_count(blocks);
        info!(
            trials,
            workers,
            seed = config.seed,
            entropy = ?factory.kind(),
            "simulation started"
        );

        let runner = TrialRunner::new(setup, policies, config);
        let next_block = AtomicU64::new(0);
        let merger = Mutex::new(BlockMerger::new(config.sample_capacity));
        let work = Work {
            runner: &runner,
            next_block: &next_block,
            merger: &merger,
            blocks,
            factory,
            cancel,
        };
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| scope.spawn(move || work.drain()))
                .collect();
            for handle in handles {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
            }
        });

        let total = merger
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .finish();

        let failed = total.failed();
        let over_threshold = failed as f64 > config.failure_threshold * trials as f64;
        if let (true, Some(first)) = (over_threshold, total.first_failure()) {
            warn!(failed, trials, %first, "simulation aborted");
            return Err(SimError::RunAborted {
                failed,
                trial_count: trials,
                first: first.clone(),
            });
        }

        let summary = total.finish(config, factory.kind(), setup.sides());
        if summary.is_non_convergent() {
            warn!(metric = %config.metric, "confidence target not met");
        }
        info!(
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "simulation finished"
        );
        Ok(summary)
    }
}

/// Folds finished blocks into the total strictly in block order.
struct BlockMerger {
    total: Accumulator,
    next: u64,
    waiting: BTreeMap<u64, Accumulator>,
}

impl BlockMerger {
    fn new(sample_capacity: usize) -> Self {
        Self {
            total: Accumulator::new(sample_capacity),
            next: 0,
            waiting: BTreeMap::new(),
        }
    }

    /// Hand in a finished block; it and any blocks waiting behind it are
    /// merged once every earlier block has arrived.
    fn submit(&mut self, block: u64, acc: Accumulator) {
        self.waiting.insert(block, acc);
        while let Some(acc) = self.waiting.remove(&self.next) {
            self.total.merge(acc);
            self.next += 1;
        }
    }

    /// Blocks finished but not yet merged.
    fn pending(&self) -> usize {
        self.waiting.len()
    }

    fn finish(self) -> Accumulator {
        debug_assert!(self.waiting.is_empty());
        self.total
    }
}

/// What each worker needs: shared, read-only apart from the block counter
/// and the merger.
#[derive(Clone, Copy)]
struct Work<'a> {
    runner: &'a TrialRunner<'a>,
    next_block: &'a AtomicU64,
    merger: &'a Mutex<BlockMerger>,
    blocks: u64,
    factory: &'a dyn EntropyFactory,
    cancel: &'a CancelToken,
}

impl Work<'_> {
    /// Claim and run blocks until none are left.
    fn drain(self) {
        let config = self.runner.config();
        loop {
            let block = self.next_block.fetch_add(1, Ordering::Relaxed);
            if block >= self.blocks {
                break;
            }
            let start = block * BLOCK_SIZE;
            let end = (start + BLOCK_SIZE).min(config.trial_count);
            let mut acc = Accumulator::new(config.sample_capacity);
            for index in start..end {
                let run = self
                    .runner
                    .run(index, self.factory.for_trial(index), self.cancel);
                acc.record(run, config);
            }
            let mut merger = self.merger.lock().unwrap_or_else(PoisonError::into_inner);
            merger.submit(block, acc);
            debug!(block, start, end, pending = merger.pending(), "block finished");
        }
    }
}

/// Run `trial_count` trials with the default configuration otherwise.
pub fn run(
    setup: &EncounterSetup,
    policies: &PolicySet,
    trial_count: u64,
    factory: &dyn EntropyFactory,
) -> SimResult<SimulationSummary> {
    Simulator::new(SimConfig::default().with_trial_count(trial_count))?.run(setup, policies, factory)
}
