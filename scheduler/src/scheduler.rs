use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use reflex_channel::{unbounded, Receiver, Sender};
use reflex_error::{Error, Result};
use reflex_logger::{debug, error, info, warn};
use reflex_memory::{DataSource, StateChangeInfo, TimingDataSource};
use reflex_stop_handler::has_received_stop_signal;
use reflex_timer::{ticks, Timeout};

use crate::affinity::pin_current_thread;
use crate::cycle::CycleEvent;
use crate::record::{StateRecord, ThreadSchedule};

const PERMIT_POLL: Duration = Duration::from_micros(200);

/// Construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerOptions {
    /// In stepped mode workers run only cycles granted through
    /// [`Scheduler::step`]. Free-running otherwise.
    pub stepped: bool,
}

/// A module execute failure surfaced from a worker thread.
#[derive(Debug)]
pub struct ExecFailure {
    pub state: String,
    pub thread: String,
    pub gam: String,
    pub error: Error,
    /// True when the module declared itself fatal-on-error; the
    /// application reacts with the error-state transition.
    pub fatal: bool,
}

struct SchedulerShared {
    stop_flag: AtomicBool,
    change_pending: AtomicBool,
    active_slot: AtomicUsize,
    staged_slot: AtomicUsize,
    running: AtomicUsize,
    cycle_event: CycleEvent,
    error_tx: Sender<ExecFailure>,
}

struct RunState {
    current: Option<String>,
    staged: Option<String>,
    handles: Vec<JoinHandle<()>>,
    permits: Vec<Arc<AtomicI64>>,
    superseded: u64,
}

/// Owner of the per-state records and the worker threads of the active
/// state. Shared by value behind `Arc`; all methods take `&self`.
pub struct Scheduler {
    records: HashMap<String, StateRecord>,
    datasources: Vec<Arc<dyn DataSource>>,
    timing: Arc<TimingDataSource>,
    shared: Arc<SchedulerShared>,
    run: Mutex<RunState>,
    stepped: bool,
    error_rx: Mutex<Option<Receiver<ExecFailure>>>,
}

impl Scheduler {
    pub fn new(
        records: Vec<StateRecord>,
        datasources: Vec<Arc<dyn DataSource>>,
        timing: Arc<TimingDataSource>,
        options: SchedulerOptions,
    ) -> Self {
        let (error_tx, error_rx) = unbounded();
        Scheduler {
            records: records
                .into_iter()
                .map(|record| (record.name.clone(), record))
                .collect(),
            datasources,
            timing,
            shared: Arc::new(SchedulerShared {
                stop_flag: AtomicBool::new(false),
                change_pending: AtomicBool::new(false),
                active_slot: AtomicUsize::new(0),
                staged_slot: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                cycle_event: CycleEvent::new(),
                error_tx,
            }),
            run: Mutex::new(RunState {
                current: None,
                staged: None,
                handles: Vec::new(),
                permits: Vec::new(),
                superseded: 0,
            }),
            stepped: options.stepped,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    /// The state currently executing, if any.
    pub fn current_state(&self) -> Option<String> {
        self.run.lock().current.clone()
    }

    /// Index of the active execution slot.
    pub fn active_slot(&self) -> usize {
        self.shared.active_slot.load(Ordering::Acquire)
    }

    /// How many staged states were replaced before taking effect.
    pub fn superseded_count(&self) -> u64 {
        self.run.lock().superseded
    }

    /// Total cycles completed over all workers since construction.
    pub fn cycle_count(&self) -> u64 {
        self.shared.cycle_event.count()
    }

    /// The execute-failure channel. Can be taken once.
    pub fn take_error_receiver(&self) -> Option<Receiver<ExecFailure>> {
        self.error_rx.lock().take()
    }

    /// Validates the next state's record, pre-applies default values on
    /// every DataSource and stages the state. A second call before the
    /// swap replaces the first (last writer wins).
    pub fn prepare_next_state(&self, next: &str) -> Result<()> {
        let record = self.records.get(next).ok_or_else(|| {
            Error::initialisation(format!("unknown state {next}"))
        })?;
        if record.threads.iter().any(|t| t.pipelines.is_empty()) {
            return Err(Error::initialisation(format!(
                "state {next} has a thread without pipelines"
            )));
        }
        let mut run = self.run.lock();
        let info = StateChangeInfo {
            current: run.current.as_deref(),
            next,
        };
        for datasource in &self.datasources {
            datasource.prepare_next_state(&info)?;
        }
        if let Some(previous) = run.staged.replace(next.to_owned()) {
            run.superseded += 1;
            warn!("staged state {previous} superseded by {next}");
        }
        debug!("state {next} staged");
        Ok(())
    }

    /// Swaps to the staged state. Running workers finish their cycle; the
    /// last one out writes the active slot, then the staged state's
    /// workers start on the bank that received the defaults.
    pub fn start_next_state_execution(&self) -> Result<()> {
        let mut run = self.run.lock();
        let next = run
            .staged
            .take()
            .ok_or_else(|| Error::parameters("no next state staged"))?;
        let record = self
            .records
            .get(&next)
            .cloned()
            .expect("staged states are validated");

        self.shared.staged_slot.store(
            1 - self.shared.active_slot.load(Ordering::Acquire),
            Ordering::Release,
        );
        if run.current.is_some() {
            self.halt_workers(&mut run, true);
        } else {
            self.shared
                .active_slot
                .store(self.shared.staged_slot.load(Ordering::Acquire), Ordering::Release);
        }

        let start_bank = 1 - self
            .datasources
            .first()
            .map(|ds| ds.arena().active_buffer())
            .unwrap_or(0);
        for datasource in &self.datasources {
            datasource.apply_state_defaults(&next, start_bank)?;
        }

        self.shared.stop_flag.store(false, Ordering::SeqCst);
        self.shared.change_pending.store(false, Ordering::SeqCst);
        self.shared
            .running
            .store(record.threads.len(), Ordering::SeqCst);
        run.permits.clear();
        let mut handles = Vec::with_capacity(record.threads.len());
        for schedule in record.threads {
            let permits = if self.stepped {
                let permit = Arc::new(AtomicI64::new(0));
                run.permits.push(Arc::clone(&permit));
                Some(permit)
            } else {
                None
            };
            let shared = Arc::clone(&self.shared);
            let datasources = self.datasources.clone();
            let timing = Arc::clone(&self.timing);
            let state = next.clone();
            let label = format!("rt-{next}-{}", schedule.name);
            handles.push(
                thread::Builder::new()
                    .name(label)
                    .spawn(move || {
                        worker_loop(
                            schedule,
                            state,
                            shared,
                            datasources,
                            timing,
                            start_bank,
                            permits,
                        )
                    })
                    .expect("start real-time worker thread should ok"),
            );
        }
        run.handles = handles;
        run.current = Some(next.clone());
        info!("state {next} executing on bank {start_bank}");
        Ok(())
    }

    /// Stops the active state's workers at their cycle boundary. No-op
    /// when nothing runs.
    pub fn stop_current_state_execution(&self) -> Result<()> {
        let mut run = self.run.lock();
        if run.current.is_none() {
            return Ok(());
        }
        self.halt_workers(&mut run, false);
        Ok(())
    }

    /// Grants each worker of the active state `cycles` more cycles.
    /// Stepped mode only.
    pub fn step(&self, cycles: u64) -> Result<()> {
        if !self.stepped {
            return Err(Error::parameters("scheduler is free-running"));
        }
        let run = self.run.lock();
        if run.current.is_none() {
            return Err(Error::parameters("no state is executing"));
        }
        for permit in &run.permits {
            permit.fetch_add(cycles as i64, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Blocks until the total cycle count reaches `target`.
    pub fn wait_for_total_cycles(&self, target: u64, timeout: Timeout) -> Result<()> {
        self.shared.cycle_event.wait_for(target, timeout)
    }

    /// Stepped-mode convenience: grants `cycles` and waits for their
    /// completion over all workers of the active state.
    pub fn run_cycles(&self, cycles: u64, timeout: Timeout) -> Result<()> {
        let workers = {
            let run = self.run.lock();
            run.permits.len() as u64
        };
        let target = self.cycle_count() + cycles * workers.max(1);
        self.step(cycles)?;
        self.wait_for_total_cycles(target, timeout)
    }

    fn halt_workers(&self, run: &mut RunState, changing: bool) {
        self.shared.change_pending.store(changing, Ordering::SeqCst);
        self.shared.stop_flag.store(true, Ordering::SeqCst);
        for handle in run.handles.drain(..) {
            if handle.join().is_err() {
                error!("a real-time worker thread panicked");
            }
        }
        self.shared.change_pending.store(false, Ordering::SeqCst);
        if let Some(old) = run.current.take() {
            debug!("state {old} stopped");
        }
        run.permits.clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let mut run = self.run.lock();
        if run.current.is_some() {
            self.halt_workers(&mut run, false);
        }
    }
}

fn worker_loop(
    schedule: ThreadSchedule,
    state: String,
    shared: Arc<SchedulerShared>,
    datasources: Vec<Arc<dyn DataSource>>,
    timing: Arc<TimingDataSource>,
    start_bank: usize,
    permits: Option<Arc<AtomicI64>>,
) {
    if let Some(mask) = schedule.cpu_mask {
        if let Err(err) = pin_current_thread(mask) {
            warn!("thread {}: CPU pinning failed: {err}", schedule.name);
        }
    }
    let cycle_time_index = timing.cycle_time_index(&schedule.name);
    let cycle_count_index = timing.cycle_count_index(&schedule.name);
    let mut cycle: u64 = 0;
    'cycles: loop {
        if shared.stop_flag.load(Ordering::Acquire) || has_received_stop_signal() {
            break;
        }
        if let Some(permits) = &permits {
            loop {
                if permits.load(Ordering::Acquire) > 0 {
                    permits.fetch_sub(1, Ordering::AcqRel);
                    break;
                }
                if shared.stop_flag.load(Ordering::Acquire) || has_received_stop_signal() {
                    break 'cycles;
                }
                thread::sleep(PERMIT_POLL);
            }
        }
        let bank = (cycle as usize + start_bank) & 1;
        for datasource in &datasources {
            datasource.arena().set_active_buffer(bank);
        }
        let started = ticks();
        for pipeline in &schedule.pipelines {
            if let Err(err) = pipeline.execute_cycle(bank, cycle, &timing) {
                error!(
                    "state {state} thread {} module {}: {err}",
                    schedule.name,
                    pipeline.gam_name()
                );
                timing.bump_u64(timing.exec_errors_index(), 1);
                let _ = shared.error_tx.send(ExecFailure {
                    state: state.clone(),
                    thread: schedule.name.clone(),
                    gam: pipeline.gam_name().to_owned(),
                    error: err,
                    fatal: pipeline.fatal_on_error(),
                });
            }
        }
        if let Some(index) = cycle_time_index {
            timing.write_u64(bank, index, ticks().saturating_sub(started));
        }
        if let Some(index) = cycle_count_index {
            timing.write_u64(bank, index, cycle + 1);
        }
        shared.cycle_event.signal();
        cycle += 1;
    }
    // the worker completing the last cycle of the outgoing state performs
    // the swap of the active slot
    if shared.running.fetch_sub(1, Ordering::AcqRel) == 1
        && shared.change_pending.load(Ordering::Acquire)
    {
        shared
            .active_slot
            .store(shared.staged_slot.load(Ordering::Acquire), Ordering::Release);
    }
}
