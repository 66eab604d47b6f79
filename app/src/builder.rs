use std::collections::HashMap;
use std::sync::Arc;

use reflex_broker::{InputBroker, OutputBroker};
use reflex_config::Node;
use reflex_error::{Error, Result};
use reflex_gam::{GamFactory, GamScratch, SetupContext};
use reflex_logger::info;
use reflex_memory::{DataSource, GamDataSource, TimingDataSource};
use reflex_message::MessageHub;
use reflex_scheduler::{
    GamUnit, Pipeline, Scheduler, SchedulerOptions, SharedGamUnit, StateRecord, ThreadSchedule,
};
use reflex_signal::{resolve, DataSourceClass, SignalBinding, TypeRegistry};

use crate::lifecycle::LifecycleFilter;
use crate::RealTimeApplication;

/// Build-time options.
pub struct ApplicationOptions {
    /// Recipient name for lifecycle messages.
    pub name: String,
    /// Run the scheduler in stepped mode (cycles granted explicitly).
    pub stepped: bool,
    /// Known signal types; composites registered by the embedder.
    pub types: TypeRegistry,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        ApplicationOptions {
            name: "Application".to_owned(),
            stepped: false,
            types: TypeRegistry::new(),
        }
    }
}

struct BuiltGam {
    unit: SharedGamUnit,
    input_brokers: Vec<InputBroker>,
    output_brokers: Vec<OutputBroker>,
    exec_time_index: Option<usize>,
}

pub(crate) fn build(
    config: &Node,
    factory: &GamFactory,
    hub: MessageHub,
    options: ApplicationOptions,
) -> Result<RealTimeApplication> {
    let resolved = resolve(config, &options.types)?;

    // arenas; the slot map leaves holes for timing-class declarations
    let mut datasources: Vec<Arc<GamDataSource>> = Vec::new();
    let mut datasource_slots: Vec<Option<usize>> = Vec::new();
    for declaration in &resolved.datasources {
        match declaration.class {
            DataSourceClass::GamData => {
                datasource_slots.push(Some(datasources.len()));
                datasources.push(Arc::new(GamDataSource::allocate(
                    declaration.registry.clone(),
                )));
            }
            DataSourceClass::TimingData => datasource_slots.push(None),
        }
    }

    // timing signals are framework-produced; module signals cannot bind
    // into that DataSource
    for function in &resolved.functions {
        for binding in function.inputs.iter().chain(&function.outputs) {
            if datasource_slots[binding.datasource_index].is_none() {
                return Err(Error::initialisation(format!(
                    "signal {}.{} binds into the timing DataSource",
                    function.name, binding.declared_name
                )));
            }
        }
    }

    let mut thread_names: Vec<String> = Vec::new();
    for state in &resolved.states {
        for thread in &state.threads {
            if !thread_names.contains(&thread.name) {
                thread_names.push(thread.name.clone());
            }
        }
    }
    let gam_names: Vec<String> = resolved.functions.iter().map(|f| f.name.clone()).collect();
    let timing = Arc::new(TimingDataSource::build(
        &resolved.scheduler.timing_datasource,
        &thread_names,
        &gam_names,
    ));

    // modules: instantiate, lay out scratch, precompute brokers, set up
    let mut built: Vec<BuiltGam> = Vec::new();
    for function in &resolved.functions {
        let mut gam = factory.build(&function.class, &function.parameters)?;
        let scratch = GamScratch::build(&function.inputs, &function.outputs);

        let mut input_brokers = Vec::new();
        for (ds_index, positions) in group_by_datasource(&function.inputs) {
            let ds = &datasources[datasource_slots[ds_index].expect("timing bindings rejected")];
            input_brokers.push(InputBroker::build_for_positions(
                &scratch,
                &function.inputs,
                &positions,
                ds.as_ref(),
            )?);
        }
        let mut output_brokers = Vec::new();
        for (ds_index, positions) in group_by_datasource(&function.outputs) {
            let ds = &datasources[datasource_slots[ds_index].expect("timing bindings rejected")];
            output_brokers.push(OutputBroker::build_for_positions(
                &scratch,
                &function.outputs,
                &positions,
                ds.as_ref(),
            )?);
        }

        let mut setup = SetupContext::new(&function.name, &function.parameters, &scratch);
        gam.setup(&mut setup)?;

        built.push(BuiltGam {
            unit: GamUnit::new(function.name.clone(), gam, scratch),
            input_brokers,
            output_brokers,
            exec_time_index: timing.exec_time_index(&function.name),
        });
    }

    // per-state records
    let mut records = Vec::with_capacity(resolved.states.len());
    for state in &resolved.states {
        let mut threads = Vec::with_capacity(state.threads.len());
        for thread in &state.threads {
            let pipelines = thread
                .functions
                .iter()
                .map(|&gam_index| {
                    let gam = &built[gam_index];
                    Pipeline::new(
                        Arc::clone(&gam.unit),
                        gam.input_brokers.clone(),
                        gam.output_brokers.clone(),
                        gam.exec_time_index,
                    )
                })
                .collect();
            threads.push(ThreadSchedule {
                name: thread.name.clone(),
                cpu_mask: thread.cpu_mask,
                pipelines,
            });
        }
        records.push(StateRecord {
            name: state.name.clone(),
            threads,
        });
    }

    let mut scheduler_datasources: Vec<Arc<dyn DataSource>> = datasources
        .iter()
        .map(|ds| Arc::clone(ds) as Arc<dyn DataSource>)
        .collect();
    scheduler_datasources.push(Arc::clone(&timing) as Arc<dyn DataSource>);

    let scheduler = Arc::new(Scheduler::new(
        records,
        scheduler_datasources,
        Arc::clone(&timing),
        SchedulerOptions {
            stepped: options.stepped,
        },
    ));

    let initial_state = match config.get_str("InitialState") {
        Some(state) => {
            if resolved.state(state).is_none() {
                return Err(Error::initialisation(format!(
                    "InitialState {state} is not a configured state"
                )));
            }
            state.to_owned()
        }
        None => resolved.states[0].name.clone(),
    };
    let error_state = match config.get_str("ErrorStateName") {
        Some(state) => {
            if resolved.state(state).is_none() {
                return Err(Error::initialisation(format!(
                    "ErrorStateName {state} is not a configured state"
                )));
            }
            Some(state.to_owned())
        }
        None => None,
    };

    let lifecycle_pool = hub.register_queued(&options.name)?;
    lifecycle_pool.install_back(Box::new(LifecycleFilter::new(
        Arc::clone(&scheduler),
        hub.downgrade(),
    )));

    let mut application = RealTimeApplication {
        name: options.name,
        initial_state,
        resolved,
        datasources,
        timing,
        scheduler,
        hub,
        fault_stop_tx: None,
        fault_monitor: None,
    };
    application.spawn_fault_monitor(error_state);
    info!(
        "application {} built: {} modules, {} datasources, {} states",
        application.name,
        application.resolved.functions.len(),
        application.datasources.len(),
        application.resolved.states.len()
    );
    Ok(application)
}


/// Splits a module's bindings by backing DataSource, keeping the first-use
/// order: one broker is built per DataSource and direction.
fn group_by_datasource(bindings: &[SignalBinding]) -> Vec<(usize, Vec<usize>)> {
    let mut order: Vec<usize> = Vec::new();
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (position, binding) in bindings.iter().enumerate() {
        if !groups.contains_key(&binding.datasource_index) {
            order.push(binding.datasource_index);
        }
        groups
            .entry(binding.datasource_index)
            .or_default()
            .push(position);
    }
    order
        .into_iter()
        .map(|ds_index| {
            let positions = groups.remove(&ds_index).expect("inserted above");
            (ds_index, positions)
        })
        .collect()
}
