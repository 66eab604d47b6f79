//! The real-time application: resolution, assembly and lifecycle.
//!
//! [`RealTimeApplication::build`] turns a configuration tree into running
//! machinery: it resolves the signal graph, allocates the DataSource
//! arenas, instantiates and sets up the modules, precomputes the brokers,
//! assembles the per-state scheduler records and registers the lifecycle
//! message recipient. Afterwards the application is driven either through
//! its methods or through `PrepareNextState` / `StartNextStateExecution` /
//! `StopCurrentStateExecution` messages.

mod builder;
mod lifecycle;

pub use builder::ApplicationOptions;
pub use lifecycle::{FUNCTION_PREPARE, FUNCTION_START, FUNCTION_STOP, PAYLOAD_NEXT_STATE};

use std::sync::Arc;
use std::thread::JoinHandle;

use reflex_channel::{select, Sender};
use reflex_config::Node;
use reflex_error::Result;
use reflex_gam::GamFactory;
use reflex_logger::{error, info, warn};
use reflex_memory::{GamDataSource, TimingDataSource};
use reflex_message::MessageHub;
use reflex_scheduler::{ExecFailure, Scheduler};
use reflex_signal::ResolvedApplication;

/// A configured application and its scheduler.
pub struct RealTimeApplication {
    name: String,
    initial_state: String,
    resolved: ResolvedApplication,
    datasources: Vec<Arc<GamDataSource>>,
    timing: Arc<TimingDataSource>,
    scheduler: Arc<Scheduler>,
    hub: MessageHub,
    fault_stop_tx: Option<Sender<()>>,
    fault_monitor: Option<JoinHandle<()>>,
}

impl RealTimeApplication {
    /// Builds an application from a parsed configuration tree.
    pub fn build(
        config: &Node,
        factory: &GamFactory,
        hub: MessageHub,
        options: ApplicationOptions,
    ) -> Result<RealTimeApplication> {
        builder::build(config, factory, hub, options)
    }

    /// The recipient name lifecycle messages address.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The state entered by [`RealTimeApplication::start`].
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn resolved(&self) -> &ResolvedApplication {
        &self.resolved
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn timing(&self) -> &Arc<TimingDataSource> {
        &self.timing
    }

    pub fn datasource(&self, name: &str) -> Option<&Arc<GamDataSource>> {
        self.datasources.iter().find(|ds| {
            use reflex_memory::DataSource as _;
            ds.name() == name
        })
    }

    /// Stages and enters the initial state.
    pub fn start(&self) -> Result<()> {
        self.scheduler.prepare_next_state(&self.initial_state)?;
        self.scheduler.start_next_state_execution()
    }

    pub fn prepare_next_state(&self, state: &str) -> Result<()> {
        self.scheduler.prepare_next_state(state)
    }

    pub fn start_next_state_execution(&self) -> Result<()> {
        self.scheduler.start_next_state_execution()
    }

    pub fn stop_current_state_execution(&self) -> Result<()> {
        self.scheduler.stop_current_state_execution()
    }

    pub(crate) fn spawn_fault_monitor(&mut self, error_state: Option<String>) {
        let Some(failures) = self.scheduler.take_error_receiver() else {
            return;
        };
        let (stop_tx, stop_rx) = reflex_channel::bounded::<()>(1);
        let scheduler = Arc::clone(&self.scheduler);
        let exit_rx = reflex_stop_handler::new_crossbeam_exit_rx();
        let monitor = std::thread::Builder::new()
            .name("app-fault".into())
            .spawn(move || loop {
                select! {
                    recv(failures) -> failure => match failure {
                        Ok(failure) => handle_failure(&scheduler, &error_state, failure),
                        Err(_) => break,
                    },
                    recv(stop_rx) -> _ => break,
                    recv(exit_rx) -> _ => break,
                }
            })
            .expect("start fault monitor thread should ok");
        self.fault_stop_tx = Some(stop_tx);
        self.fault_monitor = Some(monitor);
    }

    /// Stops execution, the lifecycle recipient and the fault monitor.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let _ = self.scheduler.stop_current_state_execution();
        if let Some(stop_tx) = self.fault_stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(monitor) = self.fault_monitor.take() {
            let _ = monitor.join();
        }
        if self.hub.filters(&self.name).is_some() {
            let _ = self.hub.unregister(&self.name);
        }
    }
}

impl Drop for RealTimeApplication {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn handle_failure(
    scheduler: &Arc<Scheduler>,
    error_state: &Option<String>,
    failure: ExecFailure,
) {
    if !failure.fatal {
        return;
    }
    match error_state {
        Some(state) if *state == failure.state => {
            error!(
                "module {} failed fatally inside the error state {state}; stopping",
                failure.gam
            );
            let _ = scheduler.stop_current_state_execution();
        }
        Some(state) => {
            warn!(
                "module {} failed fatally in state {}; entering error state {state}",
                failure.gam, failure.state
            );
            if let Err(err) = scheduler
                .prepare_next_state(state)
                .and_then(|()| scheduler.start_next_state_execution())
            {
                error!("error-state transition failed: {err}");
                let _ = scheduler.stop_current_state_execution();
            }
        }
        None => {
            error!(
                "module {} failed fatally in state {}; no error state configured, stopping",
                failure.gam, failure.state
            );
            let _ = scheduler.stop_current_state_execution();
            info!("execution stopped after fatal module failure");
        }
    }
}
