//! # Phase Scheduler
//!
//! Drives the fixed three-phase frame pipeline over every registered system.
//!
//! ```text
//!   CreatePending ──► DynamicsPending ──► LogicPending ──► FrameComplete
//!        │  barrier        │  barrier          │  barrier         │
//!        ▼                 ▼                   ▼                  │
//!    commands          commands            commands               │
//!                      streaming                                  │
//!                      resort + overlaps                          │
//!                      bus update                                 │
//!        ▲                                                        │
//!        └──────────────────────── next frame ◄───────────────────┘
//! ```
//!
//! Within a phase, consecutive systems whose declared accesses do not
//! conflict form a batch; with `parallel` enabled a batch runs on scoped
//! threads. Batches run in registration order, and command queues are
//! drained in registration order, so the structural outcome of a phase does
//! not depend on the thread interleaving.
//!
//! ## Failures
//!
//! A failing system never stops its phase neighbours. Under
//! [`FailurePolicy::Halt`] the phase stays open: the next
//! [`Scheduler::run_frame`] re-runs only the failed systems, and
//! [`Scheduler::skip_failed`] closes the phase without them. Under
//! [`FailurePolicy::SkipFailed`] the failure is reported and the frame goes on.

use std::collections::BTreeSet;
use std::ops::Range;
use std::time::Instant;

use atlas_core::{Delivery, SimError, SimResult};

use crate::commands::{Command, CommandQueue};
use crate::config::{FailurePolicy, SimulationConfig};
use crate::system::{Phase, PhaseContext, System, SystemAccess};
use crate::world::{StreamingStats, World};

// =============================================================================
// States and reports
// =============================================================================

/// Position of the scheduler in the frame pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramePhase {
    /// Waiting to run (or finish) the create phase.
    CreatePending,
    /// Waiting to run (or finish) the dynamics phase.
    DynamicsPending,
    /// Waiting to run (or finish) the logic phase.
    LogicPending,
    /// The last frame ran to completion.
    FrameComplete,
}

impl FramePhase {
    /// The phase this state is waiting on.
    #[must_use]
    pub const fn phase(self) -> Option<Phase> {
        match self {
            Self::CreatePending => Some(Phase::Create),
            Self::DynamicsPending => Some(Phase::Dynamics),
            Self::LogicPending => Some(Phase::Logic),
            Self::FrameComplete => None,
        }
    }

    const fn next(self) -> Self {
        match self {
            Self::CreatePending => Self::DynamicsPending,
            Self::DynamicsPending => Self::LogicPending,
            Self::LogicPending | Self::FrameComplete => Self::FrameComplete,
        }
    }
}

/// One failed phase call.
#[derive(Debug)]
pub struct SystemFailure {
    /// System name.
    pub system: String,
    /// Phase it failed in.
    pub phase: Phase,
    /// What it returned.
    pub error: SimError,
}

/// Wall-clock time per phase, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Create phase and its boundary.
    pub create_us: u64,
    /// Dynamics phase and its boundary.
    pub dynamics_us: u64,
    /// Logic phase and its boundary.
    pub logic_us: u64,
    /// The whole `run_frame` call.
    pub total_us: u64,
}

impl PhaseTimings {
    fn add(&mut self, phase: Phase, micros: u64) {
        match phase {
            Phase::Create => self.create_us += micros,
            Phase::Dynamics => self.dynamics_us += micros,
            Phase::Logic => self.logic_us += micros,
        }
    }
}

/// Outcome of one `run_frame` call.
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Frame the call worked on.
    pub frame: u64,
    /// True if the frame reached `FrameComplete`.
    pub completed: bool,
    /// Failed phase calls, in phase then registration order.
    pub failures: Vec<SystemFailure>,
    /// Systems dropped from their phase by `skip_failed`.
    pub skipped: Vec<String>,
    /// Deferred commands that could not be applied.
    pub command_errors: Vec<SimError>,
    /// Streaming work done at the dynamics boundary.
    pub streaming: StreamingStats,
    /// Overlapping pairs after the dynamics boundary.
    pub overlaps: usize,
    /// Events delivered for the logic phase.
    pub deliveries: usize,
    /// Timings.
    pub timings: PhaseTimings,
}

fn micros(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

// =============================================================================
// Scheduler
// =============================================================================

struct Entry {
    system: Box<dyn System>,
    access: SystemAccess,
    commands: CommandQueue,
}

/// The frame driver.
pub struct Scheduler {
    entries: Vec<Entry>,
    batches: Vec<Range<usize>>,
    policy: FailurePolicy,
    parallel: bool,
    state: FramePhase,
    /// Systems that still owe the current phase; `None` until it started.
    outstanding: Option<BTreeSet<usize>>,
    /// Systems skipped since the last report.
    skipped: Vec<String>,
    deliveries: Vec<Delivery>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new(policy: FailurePolicy, parallel: bool) -> Self {
        Self {
            entries: Vec::new(),
            batches: Vec::new(),
            policy,
            parallel,
            state: FramePhase::CreatePending,
            outstanding: None,
            skipped: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    /// Creates a scheduler with the policy and parallelism of `config`.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.failure_policy, config.parallel)
    }

    /// Registers a system; it runs after every system registered before it.
    ///
    /// # Errors
    ///
    /// - `AlreadyRegistered` if a system with the same name exists
    /// - `InvalidConfig` if called in the middle of a frame
    pub fn add_system(&mut self, system: impl System + 'static) -> SimResult<()> {
        if !matches!(self.state, FramePhase::CreatePending | FramePhase::FrameComplete)
            || self.outstanding.is_some()
        {
            return Err(SimError::InvalidConfig(
                "systems can only be added between frames".into(),
            ));
        }
        let name = system.name().to_owned();
        if self.entries.iter().any(|e| e.system.name() == name) {
            return Err(SimError::AlreadyRegistered(name));
        }

        let access = system.access();
        self.entries.push(Entry {
            system: Box::new(system),
            access,
            commands: CommandQueue::new(),
        });
        self.rebuild_batches();
        tracing::debug!(system = %name, batches = self.batches.len(), "system registered");
        Ok(())
    }

    fn rebuild_batches(&mut self) {
        self.batches.clear();
        let mut start = 0;
        for i in 0..self.entries.len() {
            let conflicts = self.entries[start..i]
                .iter()
                .any(|e| e.access.conflicts_with(&self.entries[i].access));
            if conflicts {
                self.batches.push(start..i);
                start = i;
            }
        }
        if start < self.entries.len() {
            self.batches.push(start..self.entries.len());
        }
    }

    /// Current pipeline state.
    #[must_use]
    pub const fn state(&self) -> FramePhase {
        self.state
    }

    /// Failure policy.
    #[must_use]
    pub const fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Registered system names, in run order.
    pub fn system_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.system.name())
    }

    /// Groups of systems that may run concurrently, as name lists.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<&str>> {
        self.batches
            .iter()
            .map(|range| {
                self.entries[range.clone()]
                    .iter()
                    .map(|e| e.system.name())
                    .collect()
            })
            .collect()
    }

    /// Returns true if a phase is held open by failed systems.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.outstanding.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Systems holding the current phase open.
    #[must_use]
    pub fn blocked_systems(&self) -> Vec<&str> {
        self.outstanding
            .iter()
            .flatten()
            .map(|&i| self.entries[i].system.name())
            .collect()
    }

    /// Gives up on the systems holding the current phase open.
    ///
    /// The next `run_frame` closes the phase without running them again.
    /// Returns their names; empty if nothing was blocked.
    pub fn skip_failed(&mut self) -> Vec<String> {
        let Some(outstanding) = self.outstanding.as_mut() else {
            return Vec::new();
        };
        let names: Vec<String> = std::mem::take(outstanding)
            .into_iter()
            .map(|i| self.entries[i].system.name().to_owned())
            .collect();
        if !names.is_empty() {
            tracing::warn!(systems = ?names, state = ?self.state, "skipping failed systems");
        }
        self.skipped.extend(names.iter().cloned());
        names
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Runs the pipeline from the current state to the end of the frame.
    ///
    /// Returns early, with `completed == false`, when a phase fails under
    /// [`FailurePolicy::Halt`]. Calling again resumes that phase.
    pub fn run_frame(&mut self, world: &mut World, dt: f32) -> FrameReport {
        let started = Instant::now();
        if self.state == FramePhase::FrameComplete {
            self.state = FramePhase::CreatePending;
        }
        let mut report = FrameReport {
            frame: world.frame(),
            ..FrameReport::default()
        };

        while let Some(phase) = self.state.phase() {
            let phase_started = Instant::now();
            let _span = tracing::debug_span!("phase", %phase, frame = world.frame()).entered();

            let failed = self.run_systems(world, phase, dt);
            let halted = !failed.is_empty() && self.policy == FailurePolicy::Halt;
            for (index, error) in failed {
                let entry = &self.entries[index];
                let discarded = entry.commands.drain().len();
                tracing::error!(
                    system = entry.system.name(),
                    %phase,
                    %error,
                    discarded,
                    "system phase failed"
                );
                if halted {
                    self.outstanding.get_or_insert_with(BTreeSet::new).insert(index);
                }
                report.failures.push(SystemFailure {
                    system: entry.system.name().to_owned(),
                    phase,
                    error,
                });
            }

            if halted {
                report.timings.add(phase, micros(phase_started));
                report.timings.total_us = micros(started);
                report.skipped = std::mem::take(&mut self.skipped);
                return report;
            }

            self.outstanding = None;
            self.finish_phase(world, phase, &mut report);
            self.state = self.state.next();
            report.timings.add(phase, micros(phase_started));
        }

        world.advance_frame();
        report.completed = true;
        report.skipped = std::mem::take(&mut self.skipped);
        report.timings.total_us = micros(started);
        tracing::trace!(
            frame = report.frame,
            overlaps = report.overlaps,
            deliveries = report.deliveries,
            total_us = report.timings.total_us,
            "frame complete"
        );
        report
    }

    /// Runs the systems that owe `phase` and returns the failures.
    fn run_systems(&mut self, world: &World, phase: Phase, dt: f32) -> Vec<(usize, SimError)> {
        let Self {
            entries,
            batches,
            parallel,
            outstanding,
            deliveries,
            ..
        } = self;

        // An outstanding set means the phase already ran once.
        let selected: Vec<bool> = match outstanding {
            Some(set) => (0..entries.len()).map(|i| set.contains(&i)).collect(),
            None => vec![true; entries.len()],
        };
        *outstanding = Some(BTreeSet::new());

        let view = world.view();
        let deliveries: &[Delivery] = deliveries;
        let selected = &selected;
        let run = move |index: usize, entry: &mut Entry| -> Option<(usize, SimError)> {
            if !selected[index] {
                return None;
            }
            let ctx = PhaseContext::new(view, deliveries, &entry.commands);
            entry
                .system
                .run_phase(phase, &ctx, dt)
                .err()
                .map(|error| (index, error))
        };

        let mut failed = Vec::new();
        for range in batches.iter() {
            let start = range.start;
            let batch = &mut entries[range.clone()];
            let active = selected[range.clone()].iter().filter(|&&s| s).count();

            if *parallel && active > 1 {
                std::thread::scope(|scope| {
                    let handles: Vec<_> = batch
                        .iter_mut()
                        .enumerate()
                        .map(|(offset, entry)| scope.spawn(move || run(start + offset, entry)))
                        .collect();
                    for handle in handles {
                        match handle.join() {
                            Ok(result) => failed.extend(result),
                            Err(panic) => std::panic::resume_unwind(panic),
                        }
                    }
                });
            } else {
                for (offset, entry) in batch.iter_mut().enumerate() {
                    failed.extend(run(start + offset, entry));
                }
            }
        }
        failed
    }

    /// Boundary work after every system finished `phase`.
    fn finish_phase(&mut self, world: &mut World, phase: Phase, report: &mut FrameReport) {
        let commands: Vec<Command> = self
            .entries
            .iter()
            .flat_map(|e| e.commands.drain())
            .collect();
        if !commands.is_empty() {
            tracing::trace!(%phase, count = commands.len(), "applying deferred commands");
        }
        report.command_errors.extend(world.apply_commands(commands));

        match phase {
            Phase::Create => {}
            Phase::Dynamics => {
                report.streaming = world.apply_streaming();
                world.resort();
                report.overlaps = world.overlaps().len();
                self.deliveries = world.bus().update();
                report.deliveries = self.deliveries.len();
            }
            Phase::Logic => self.deliveries.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::Registry;

    struct Probe {
        name: &'static str,
        access: SystemAccess,
    }

    impl System for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn access(&self) -> SystemAccess {
            self.access.clone()
        }
    }

    #[test]
    fn test_batches_split_at_conflicts() {
        let mut registry = Registry::new(1);
        let a = registry.register_component_type::<f32>("a").unwrap();
        let b = registry.register_component_type::<u32>("b").unwrap();

        let mut scheduler = Scheduler::new(FailurePolicy::Halt, true);
        let probes = [
            ("write_a", SystemAccess::new().write(a)),
            ("write_b", SystemAccess::new().write(b)),
            ("read_a", SystemAccess::new().read(a)),
            ("read_a_too", SystemAccess::new().read(a)),
        ];
        for (name, access) in probes {
            scheduler.add_system(Probe { name, access }).unwrap();
        }

        assert_eq!(
            scheduler.batches(),
            vec![vec!["write_a", "write_b"], vec!["read_a", "read_a_too"]]
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut scheduler = Scheduler::new(FailurePolicy::Halt, false);
        let probe = || Probe {
            name: "same",
            access: SystemAccess::new(),
        };
        scheduler.add_system(probe()).unwrap();
        assert!(matches!(
            scheduler.add_system(probe()),
            Err(SimError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_state_cycle() {
        assert_eq!(FramePhase::CreatePending.next(), FramePhase::DynamicsPending);
        assert_eq!(FramePhase::DynamicsPending.next(), FramePhase::LogicPending);
        assert_eq!(FramePhase::LogicPending.next(), FramePhase::FrameComplete);
        assert_eq!(FramePhase::FrameComplete.phase(), None);
    }
}
