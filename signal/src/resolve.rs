use std::collections::HashMap;

use linked_hash_map::LinkedHashMap;
use reflex_config::{Node, Value};
use reflex_error::{Error, Result};

use crate::descriptor::{parse_default, SignalDescriptor, SignalUsage};
use crate::registry::SignalRegistry;
use crate::types::{SignalType, TypeRegistry};

/// Tagged DataSource variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceClass {
    /// Plain double-buffered signal exchange.
    GamData,
    /// Framework-produced per-cycle diagnostics.
    TimingData,
}

/// One resolved DataSource with its frozen signal registry.
#[derive(Debug, Clone)]
pub struct DataSourceDeclaration {
    pub name: String,
    pub class: DataSourceClass,
    pub registry: SignalRegistry,
}

/// One module signal resolved against its DataSource.
#[derive(Debug, Clone)]
pub struct SignalBinding {
    /// The name used inside the module's signal list.
    pub declared_name: String,
    pub datasource: String,
    pub datasource_index: usize,
    /// Name inside the DataSource, after alias application.
    pub signal_name: String,
    pub signal_index: usize,
    pub signal_type: SignalType,
    pub num_elements_total: u32,
    pub num_samples: u32,
    pub byte_size: u32,
}

/// One configured module with its resolved signal sets.
#[derive(Debug, Clone)]
pub struct GamDeclaration {
    pub name: String,
    pub class: String,
    /// The module's whole configuration node; builders read their
    /// parameters from it.
    pub parameters: Node,
    pub inputs: Vec<SignalBinding>,
    pub outputs: Vec<SignalBinding>,
}

/// One real-time thread of a state: name, optional CPU affinity and the
/// ordered module indices it executes.
#[derive(Debug, Clone)]
pub struct ThreadDeclaration {
    pub name: String,
    pub cpu_mask: Option<u64>,
    pub functions: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct StateDeclaration {
    pub name: String,
    pub threads: Vec<ThreadDeclaration>,
}

#[derive(Debug, Clone)]
pub struct SchedulerDeclaration {
    pub class: String,
    pub timing_datasource: String,
}

/// The frozen result of configuration resolution.
#[derive(Debug, Clone)]
pub struct ResolvedApplication {
    pub datasources: Vec<DataSourceDeclaration>,
    pub functions: Vec<GamDeclaration>,
    pub states: Vec<StateDeclaration>,
    pub scheduler: SchedulerDeclaration,
    functions_config: Node,
    states_config: Node,
}

impl ResolvedApplication {
    pub fn state(&self, name: &str) -> Option<&StateDeclaration> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Serializes the resolved application back to a configuration tree.
    /// The result is a superset of the parsed input: names and geometry are
    /// preserved, derived fields and per-state usage records are added.
    pub fn to_config(&self) -> Node {
        let mut root = Node::new();
        root.insert("Functions", self.functions_config.clone());
        let mut data = Node::new();
        for ds in &self.datasources {
            let mut entry = Node::new();
            entry.insert(
                "Class",
                match ds.class {
                    DataSourceClass::GamData => "GamDataSource",
                    DataSourceClass::TimingData => "TimingDataSource",
                },
            );
            entry.insert("Signals", ds.registry.to_config());
            data.insert(ds.name.as_str(), entry);
        }
        root.insert("Data", data);
        root.insert("States", self.states_config.clone());
        let mut scheduler = Node::new();
        scheduler.insert("Class", self.scheduler.class.as_str());
        scheduler.insert("TimingDataSource", self.scheduler.timing_datasource.as_str());
        root.insert("Scheduler", scheduler);
        root
    }
}

#[derive(Debug, Default)]
struct DraftSignal {
    name: String,
    signal_type: Option<SignalType>,
    num_dimensions: Option<u8>,
    num_elements: Option<[u32; 3]>,
    num_samples: Option<u32>,
    default_literal: Option<Value>,
    states: LinkedHashMap<String, SignalUsage>,
}

struct DraftDataSource {
    name: String,
    class: DataSourceClass,
    signals: Vec<DraftSignal>,
    by_name: HashMap<String, usize>,
}

impl DraftDataSource {
    fn signal_entry(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = self.signals.len();
        self.signals.push(DraftSignal {
            name: name.to_owned(),
            ..DraftSignal::default()
        });
        self.by_name.insert(name.to_owned(), idx);
        idx
    }
}

#[derive(Debug, Default)]
struct SignalDecl {
    signal_type: Option<SignalType>,
    num_dimensions: Option<u8>,
    num_elements: Option<[u32; 3]>,
    num_samples: Option<u32>,
    default_literal: Option<Value>,
    alias: Option<String>,
    datasource: Option<String>,
}

struct DraftBinding {
    declared_name: String,
    datasource_index: usize,
    signal_index: usize,
}

/// Resolves the configured signal graph.
///
/// Walks `Functions`, `Data` and `States`, auto-creates DataSource signals
/// declared only by modules, records per-state producer and consumer lists
/// in scheduling order, runs the consistency checks and freezes the result.
pub fn resolve(config: &Node, types: &TypeRegistry) -> Result<ResolvedApplication> {
    let functions_config = config
        .node("Functions")
        .ok_or_else(|| Error::initialisation("missing Functions section"))?
        .clone();
    let states_config = config
        .node("States")
        .ok_or_else(|| Error::initialisation("missing States section"))?
        .clone();

    let mut drafts = parse_data_section(config, types)?;
    let (mut gams, bindings) = parse_functions(&functions_config, types, &mut drafts)?;
    let states = parse_states(&states_config, &mut drafts, &gams, &bindings)?;
    check_consumers_have_producers_or_defaults(&drafts)?;

    let datasources = freeze_datasources(drafts)?;
    fill_bindings(&mut gams, &bindings, &datasources)?;

    let scheduler = parse_scheduler(config);

    Ok(ResolvedApplication {
        datasources,
        functions: gams,
        states,
        scheduler,
        functions_config,
        states_config,
    })
}

fn parse_data_section(config: &Node, types: &TypeRegistry) -> Result<Vec<DraftDataSource>> {
    let mut drafts = Vec::new();
    let Some(data) = config.node("Data") else {
        return Ok(drafts);
    };
    for (name, value) in data.iter() {
        let node = value.as_node().ok_or_else(|| {
            Error::initialisation(format!("Data entry {name} is not a section"))
        })?;
        let class = match node.get_str("Class").unwrap_or("GamDataSource") {
            "GamDataSource" => DataSourceClass::GamData,
            "TimingDataSource" => DataSourceClass::TimingData,
            other => {
                return Err(Error::initialisation(format!(
                    "DataSource {name} has unknown class {other}"
                )))
            }
        };
        let mut draft = DraftDataSource {
            name: name.to_owned(),
            class,
            signals: Vec::new(),
            by_name: HashMap::new(),
        };
        if let Some(signals) = node.node("Signals") {
            for (signal_name, signal_value) in signals.iter() {
                let signal_node = signal_value.as_node().ok_or_else(|| {
                    Error::initialisation(format!(
                        "signal {name}.{signal_name} is not a section"
                    ))
                })?;
                let context = format!("{name}.{signal_name}");
                let decl = parse_signal_decl(signal_node, types, &context)?;
                if decl.datasource.is_some() || decl.alias.is_some() {
                    return Err(Error::initialisation(format!(
                        "signal {context}: DataSource and Alias are module-side fields"
                    )));
                }
                let idx = draft.signal_entry(signal_name);
                merge_decl(&mut draft.signals[idx], &decl, &context)?;
            }
        }
        drafts.push(draft);
    }
    Ok(drafts)
}

fn parse_functions(
    functions: &Node,
    types: &TypeRegistry,
    drafts: &mut Vec<DraftDataSource>,
) -> Result<(Vec<GamDeclaration>, Vec<(Vec<DraftBinding>, Vec<DraftBinding>)>)> {
    let mut gams = Vec::new();
    let mut bindings = Vec::new();
    for (gam_name, value) in functions.iter() {
        let node = value.as_node().ok_or_else(|| {
            Error::initialisation(format!("Functions entry {gam_name} is not a section"))
        })?;
        let class = node
            .get_str("Class")
            .ok_or_else(|| {
                Error::initialisation(format!("module {gam_name} declares no Class"))
            })?
            .to_owned();

        let inputs = parse_signal_set(node.node("InputSignals"), gam_name, types, drafts)?;
        let outputs = parse_signal_set(node.node("OutputSignals"), gam_name, types, drafts)?;
        if inputs.is_empty() && outputs.is_empty() {
            return Err(Error::initialisation(format!(
                "module {gam_name} declares neither inputs nor outputs"
            )));
        }

        gams.push(GamDeclaration {
            name: gam_name.to_owned(),
            class,
            parameters: node.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        bindings.push((inputs, outputs));
    }
    if gams.is_empty() {
        return Err(Error::initialisation("Functions section is empty"));
    }
    Ok((gams, bindings))
}

fn parse_signal_set(
    set: Option<&Node>,
    gam_name: &str,
    types: &TypeRegistry,
    drafts: &mut Vec<DraftDataSource>,
) -> Result<Vec<DraftBinding>> {
    let mut out = Vec::new();
    let Some(set) = set else {
        return Ok(out);
    };
    for (declared_name, value) in set.iter() {
        let node = value.as_node().ok_or_else(|| {
            Error::initialisation(format!(
                "signal {gam_name}.{declared_name} is not a section"
            ))
        })?;
        let context = format!("{gam_name}.{declared_name}");
        let decl = parse_signal_decl(node, types, &context)?;
        let ds_name = decl.datasource.as_deref().ok_or_else(|| {
            Error::initialisation(format!("signal {context} declares no DataSource"))
        })?;
        let ds_idx = drafts
            .iter()
            .position(|d| d.name == ds_name)
            .ok_or_else(|| {
                Error::initialisation(format!(
                    "signal {context} references unknown DataSource {ds_name}"
                ))
            })?;
        let signal_name = decl.alias.clone().unwrap_or_else(|| declared_name.to_owned());
        let signal_idx = drafts[ds_idx].signal_entry(&signal_name);
        merge_decl(&mut drafts[ds_idx].signals[signal_idx], &decl, &context)?;
        out.push(DraftBinding {
            declared_name: declared_name.to_owned(),
            datasource_index: ds_idx,
            signal_index: signal_idx,
        });
    }
    Ok(out)
}

fn parse_states(
    states_config: &Node,
    drafts: &mut [DraftDataSource],
    gams: &[GamDeclaration],
    bindings: &[(Vec<DraftBinding>, Vec<DraftBinding>)],
) -> Result<Vec<StateDeclaration>> {
    let mut states = Vec::new();
    for (state_name, value) in states_config.iter() {
        let state_node = value.as_node().ok_or_else(|| {
            Error::initialisation(format!("state {state_name} is not a section"))
        })?;
        let threads_node = state_node.node("Threads").ok_or_else(|| {
            Error::initialisation(format!("state {state_name} declares no Threads"))
        })?;
        let mut threads = Vec::new();
        let mut scheduled: HashMap<usize, String> = HashMap::new();
        for (thread_name, thread_value) in threads_node.iter() {
            let thread_node = thread_value.as_node().ok_or_else(|| {
                Error::initialisation(format!(
                    "thread {state_name}.{thread_name} is not a section"
                ))
            })?;
            let cpu_mask = parse_cpu_mask(thread_node, state_name, thread_name)?;
            let names = thread_node
                .get("Functions")
                .and_then(Value::as_str_list)
                .ok_or_else(|| {
                    Error::initialisation(format!(
                        "thread {state_name}.{thread_name} declares no Functions"
                    ))
                })?;
            if names.is_empty() {
                return Err(Error::initialisation(format!(
                    "thread {state_name}.{thread_name} has an empty Functions list"
                )));
            }
            let mut functions = Vec::new();
            for name in names {
                let gam_idx = gams.iter().position(|g| g.name == name).ok_or_else(|| {
                    Error::initialisation(format!(
                        "thread {state_name}.{thread_name} references unknown module {name}"
                    ))
                })?;
                if let Some(previous) = scheduled.insert(gam_idx, thread_name.to_owned()) {
                    return Err(Error::initialisation(format!(
                        "module {name} is scheduled in threads {previous} and {thread_name} of state {state_name}"
                    )));
                }
                // record usage in scheduling order
                let (inputs, outputs) = &bindings[gam_idx];
                for binding in inputs {
                    drafts[binding.datasource_index].signals[binding.signal_index]
                        .states
                        .entry(state_name.to_owned())
                        .or_insert_with(SignalUsage::default)
                        .consumers
                        .push(name.to_owned());
                }
                for binding in outputs {
                    drafts[binding.datasource_index].signals[binding.signal_index]
                        .states
                        .entry(state_name.to_owned())
                        .or_insert_with(SignalUsage::default)
                        .producers
                        .push(name.to_owned());
                }
                functions.push(gam_idx);
            }
            threads.push(ThreadDeclaration {
                name: thread_name.to_owned(),
                cpu_mask,
                functions,
            });
        }
        if threads.is_empty() {
            return Err(Error::initialisation(format!(
                "state {state_name} declares no threads"
            )));
        }
        states.push(StateDeclaration {
            name: state_name.to_owned(),
            threads,
        });
    }
    if states.is_empty() {
        return Err(Error::initialisation("States section is empty"));
    }
    Ok(states)
}

fn check_consumers_have_producers_or_defaults(drafts: &[DraftDataSource]) -> Result<()> {
    for draft in drafts {
        for signal in &draft.signals {
            for (state, usage) in signal.states.iter() {
                if !usage.consumers.is_empty()
                    && usage.producers.is_empty()
                    && signal.default_literal.is_none()
                {
                    return Err(Error::initialisation(format!(
                        "signal {}.{} is consumed in state {state} but has no producer there and no Default",
                        draft.name, signal.name
                    )));
                }
            }
        }
    }
    Ok(())
}

fn freeze_datasources(drafts: Vec<DraftDataSource>) -> Result<Vec<DataSourceDeclaration>> {
    let mut out = Vec::new();
    for draft in drafts {
        let ds_name = draft.name;
        let mut signals = Vec::new();
        for signal in draft.signals {
            let context = format!("{ds_name}.{}", signal.name);
            let signal_type = signal.signal_type.ok_or_else(|| {
                Error::initialisation(format!("signal {context} never acquired a type"))
            })?;
            let num_elements = signal.num_elements.unwrap_or([1, 1, 1]);
            let num_dimensions = match signal.num_dimensions {
                Some(d) => d,
                None => infer_dimensions(&num_elements),
            };
            validate_geometry(num_dimensions, &num_elements, &context)?;
            let num_samples = signal.num_samples.unwrap_or(1);
            let total_elements: u32 = num_elements.iter().product();
            let byte_size = signal_type.byte_size() * total_elements * num_samples;
            let default_value = signal
                .default_literal
                .as_ref()
                .map(|literal| {
                    parse_default(literal, &signal_type, total_elements, num_samples, &context)
                })
                .transpose()?;
            signals.push(SignalDescriptor {
                qualified_name: format!("{ds_name}.{}", signal.name),
                name: signal.name,
                signal_type,
                num_dimensions,
                num_elements,
                num_samples,
                byte_size,
                default_literal: signal.default_literal,
                default_value,
                states: signal.states,
            });
        }
        out.push(DataSourceDeclaration {
            name: ds_name.clone(),
            class: draft.class,
            registry: SignalRegistry::new(ds_name, signals),
        });
    }
    Ok(out)
}

fn fill_bindings(
    gams: &mut [GamDeclaration],
    bindings: &[(Vec<DraftBinding>, Vec<DraftBinding>)],
    datasources: &[DataSourceDeclaration],
) -> Result<()> {
    for (gam, (inputs, outputs)) in gams.iter_mut().zip(bindings) {
        gam.inputs = build_bindings(inputs, datasources)?;
        gam.outputs = build_bindings(outputs, datasources)?;
    }
    Ok(())
}

fn build_bindings(
    drafts: &[DraftBinding],
    datasources: &[DataSourceDeclaration],
) -> Result<Vec<SignalBinding>> {
    drafts
        .iter()
        .map(|draft| {
            let ds = &datasources[draft.datasource_index];
            let signal = ds
                .registry
                .signal(draft.signal_index)
                .expect("draft indices survive freezing");
            Ok(SignalBinding {
                declared_name: draft.declared_name.clone(),
                datasource: ds.name.clone(),
                datasource_index: draft.datasource_index,
                signal_name: signal.name.clone(),
                signal_index: draft.signal_index,
                signal_type: signal.signal_type.clone(),
                num_elements_total: signal.total_elements(),
                num_samples: signal.num_samples,
                byte_size: signal.byte_size,
            })
        })
        .collect()
}

fn parse_scheduler(config: &Node) -> SchedulerDeclaration {
    let node = config.node("Scheduler");
    SchedulerDeclaration {
        class: node
            .and_then(|n| n.get_str("Class"))
            .unwrap_or("GamScheduler")
            .to_owned(),
        timing_datasource: node
            .and_then(|n| n.get_str("TimingDataSource"))
            .unwrap_or("Timings")
            .to_owned(),
    }
}

fn parse_signal_decl(node: &Node, types: &TypeRegistry, context: &str) -> Result<SignalDecl> {
    let mut decl = SignalDecl::default();
    if let Some(type_name) = node.get_str("Type") {
        decl.signal_type = Some(types.lookup(type_name).ok_or_else(|| {
            Error::initialisation(format!("signal {context} has unknown type {type_name}"))
        })?);
    }
    if let Some(value) = node.get("NumberOfElements") {
        decl.num_elements = Some(parse_elements(value, context)?);
    }
    if let Some(dims) = node.get_i64("NumberOfDimensions") {
        if !(0..=2).contains(&dims) {
            return Err(Error::initialisation(format!(
                "signal {context} has unsupported NumberOfDimensions {dims}"
            )));
        }
        decl.num_dimensions = Some(dims as u8);
    }
    if let Some(samples) = node.get_u32("NumberOfSamples") {
        if samples == 0 {
            return Err(Error::initialisation(format!(
                "signal {context} has zero NumberOfSamples"
            )));
        }
        decl.num_samples = Some(samples);
    }
    decl.default_literal = node.get("Default").cloned();
    decl.alias = node.get_str("Alias").map(str::to_owned);
    decl.datasource = node.get_str("DataSource").map(str::to_owned);
    Ok(decl)
}

fn parse_elements(value: &Value, context: &str) -> Result<[u32; 3]> {
    let bad = || {
        Error::initialisation(format!(
            "signal {context} has a malformed NumberOfElements"
        ))
    };
    match value {
        Value::Array(items) => {
            if items.is_empty() || items.len() > 3 {
                return Err(bad());
            }
            let mut elements = [1u32; 3];
            for (slot, item) in elements.iter_mut().zip(items) {
                let n = item.as_u32().ok_or_else(bad)?;
                if n == 0 {
                    return Err(bad());
                }
                *slot = n;
            }
            Ok(elements)
        }
        scalar => {
            let n = scalar.as_u32().ok_or_else(bad)?;
            if n == 0 {
                return Err(bad());
            }
            Ok([n, 1, 1])
        }
    }
}

fn infer_dimensions(elements: &[u32; 3]) -> u8 {
    if elements[2] > 1 {
        // elements beyond two dimensions are rejected by validation
        3
    } else if elements[1] > 1 {
        2
    } else if elements[0] > 1 {
        1
    } else {
        0
    }
}

fn validate_geometry(dims: u8, elements: &[u32; 3], context: &str) -> Result<()> {
    if dims > 2 {
        return Err(Error::initialisation(format!(
            "signal {context} has more than two dimensions"
        )));
    }
    for (axis, &n) in elements.iter().enumerate() {
        if axis >= dims as usize && n != 1 {
            return Err(Error::initialisation(format!(
                "signal {context}: rank {dims} is inconsistent with {n} elements on axis {axis}"
            )));
        }
    }
    Ok(())
}

fn parse_cpu_mask(node: &Node, state: &str, thread: &str) -> Result<Option<u64>> {
    let Some(value) = node.get("CPUMask") else {
        return Ok(None);
    };
    let bad = || {
        Error::initialisation(format!(
            "thread {state}.{thread} has a malformed CPUMask"
        ))
    };
    match value {
        Value::Int(v) if *v > 0 => Ok(Some(*v as u64)),
        Value::Str(s) => {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"));
            let mask = match digits {
                Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| bad())?,
                None => s.parse::<u64>().map_err(|_| bad())?,
            };
            if mask == 0 {
                return Err(bad());
            }
            Ok(Some(mask))
        }
        _ => Err(bad()),
    }
}

fn merge_decl(draft: &mut DraftSignal, decl: &SignalDecl, context: &str) -> Result<()> {
    merge_field(&mut draft.signal_type, &decl.signal_type, "Type", context)?;
    merge_field(
        &mut draft.num_dimensions,
        &decl.num_dimensions,
        "NumberOfDimensions",
        context,
    )?;
    merge_field(
        &mut draft.num_elements,
        &decl.num_elements,
        "NumberOfElements",
        context,
    )?;
    merge_field(
        &mut draft.num_samples,
        &decl.num_samples,
        "NumberOfSamples",
        context,
    )?;
    merge_field(
        &mut draft.default_literal,
        &decl.default_literal,
        "Default",
        context,
    )?;
    Ok(())
}

fn merge_field<T: Clone + PartialEq + std::fmt::Debug>(
    slot: &mut Option<T>,
    incoming: &Option<T>,
    field: &str,
    context: &str,
) -> Result<()> {
    if let Some(new) = incoming {
        match slot {
            Some(existing) if existing != new => {
                return Err(Error::initialisation(format!(
                    "signal {context}: conflicting {field} ({existing:?} vs {new:?})"
                )));
            }
            Some(_) => {}
            None => *slot = Some(new.clone()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_config::parse;

    fn base_config() -> String {
        r#"
            Functions = {
                Counter = {
                    Class = CounterGam
                    OutputSignals = {
                        sigX = { DataSource = DDB1 Type = int32 }
                    }
                }
                Doubler = {
                    Class = GainGam
                    Gain = 2
                    InputSignals = {
                        sigX = { DataSource = DDB1 Type = int32 }
                    }
                    OutputSignals = {
                        sigY = { DataSource = DDB1 Type = int32 }
                    }
                }
            }
            Data = {
                DDB1 = { Class = GamDataSource }
            }
            States = {
                Run = {
                    Threads = {
                        Main = { Functions = { Counter Doubler } }
                    }
                }
            }
            Scheduler = { Class = GamScheduler TimingDataSource = Timings }
        "#
        .to_owned()
    }

    fn resolve_text(text: &str) -> Result<ResolvedApplication> {
        let config = parse(text).expect("config parses");
        resolve(&config, &TypeRegistry::new())
    }

    #[test]
    fn auto_creates_signals_from_module_declarations() {
        let resolved = resolve_text(&base_config()).expect("resolve");
        let ddb = &resolved.datasources[0];
        assert_eq!(ddb.name, "DDB1");
        assert_eq!(ddb.registry.len(), 2);
        let sig_x = ddb
            .registry
            .signal(ddb.registry.signal_index("sigX").expect("sigX exists"))
            .unwrap();
        assert_eq!(sig_x.byte_size, 4);
        assert_eq!(sig_x.qualified_name, "DDB1.sigX");
        let usage = sig_x.usage("Run").expect("usage in Run");
        assert_eq!(usage.producers, vec!["Counter"]);
        assert_eq!(usage.consumers, vec!["Doubler"]);
    }

    #[test]
    fn bindings_carry_resolved_indices() {
        let resolved = resolve_text(&base_config()).expect("resolve");
        let doubler = &resolved.functions[1];
        assert_eq!(doubler.name, "Doubler");
        assert_eq!(doubler.inputs.len(), 1);
        assert_eq!(doubler.inputs[0].signal_name, "sigX");
        assert_eq!(doubler.inputs[0].datasource_index, 0);
        assert_eq!(doubler.outputs[0].signal_name, "sigY");
        assert_ne!(doubler.inputs[0].signal_index, doubler.outputs[0].signal_index);
    }

    #[test]
    fn conflicting_types_are_fatal() {
        let text = r#"
            Functions = {
                Producer = {
                    Class = CounterGam
                    OutputSignals = { sigX = { DataSource = DDB1 Type = int32 } }
                }
                Consumer = {
                    Class = SinkGam
                    InputSignals = { sigX = { DataSource = DDB1 Type = float64 } }
                }
            }
            Data = { DDB1 = { Class = GamDataSource } }
            States = {
                Run = { Threads = { Main = { Functions = { Producer Consumer } } } }
            }
        "#;
        let err = resolve_text(text).expect_err("type conflict");
        assert!(err.to_string().contains("conflicting Type"), "{err}");
    }

    #[test]
    fn consumer_without_producer_or_default_is_fatal() {
        let text = r#"
            Functions = {
                Sink = {
                    Class = SinkGam
                    InputSignals = { lonely = { DataSource = DDB1 Type = int32 } }
                }
            }
            Data = { DDB1 = { Class = GamDataSource } }
            States = {
                Run = { Threads = { Main = { Functions = Sink } } }
            }
        "#;
        let err = resolve_text(text).expect_err("no producer");
        assert!(err.to_string().contains("no producer"), "{err}");
    }

    #[test]
    fn consumer_with_default_is_legal() {
        let text = r#"
            Functions = {
                Sink = {
                    Class = SinkGam
                    InputSignals = {
                        lonely = { DataSource = DDB1 Type = int32 Default = 42 }
                    }
                }
            }
            Data = { DDB1 = { Class = GamDataSource } }
            States = {
                Run = { Threads = { Main = { Functions = Sink } } }
            }
        "#;
        let resolved = resolve_text(text).expect("resolve");
        let ds = &resolved.datasources[0];
        let signal = ds.registry.signal(0).unwrap();
        assert_eq!(
            signal.default_value.as_deref(),
            Some(42i32.to_le_bytes().as_slice())
        );
    }

    #[test]
    fn module_in_two_threads_of_one_state_is_fatal() {
        let text = base_config().replace(
            "Main = { Functions = { Counter Doubler } }",
            "Main = { Functions = { Counter Doubler } }\nSpare = { Functions = { Counter } }",
        );
        let err = resolve_text(&text).expect_err("double scheduling");
        assert!(err.to_string().contains("scheduled in threads"), "{err}");
    }

    #[test]
    fn alias_renames_inside_the_datasource() {
        let text = base_config().replace(
            "sigY = { DataSource = DDB1 Type = int32 }",
            "sigY = { DataSource = DDB1 Type = int32 Alias = renamed }",
        );
        let resolved = resolve_text(&text).expect("resolve");
        let ddb = &resolved.datasources[0];
        assert!(ddb.registry.signal_index("renamed").is_some());
        assert!(ddb.registry.signal_index("sigY").is_none());
        let doubler = &resolved.functions[1];
        assert_eq!(doubler.outputs[0].declared_name, "sigY");
        assert_eq!(doubler.outputs[0].signal_name, "renamed");
    }

    #[test]
    fn rank_element_mismatch_is_fatal() {
        let text = base_config().replace(
            "sigY = { DataSource = DDB1 Type = int32 }",
            "sigY = { DataSource = DDB1 Type = int32 NumberOfDimensions = 0 NumberOfElements = 4 }",
        );
        let err = resolve_text(&text).expect_err("rank mismatch");
        assert!(err.to_string().contains("inconsistent"), "{err}");
    }

    #[test]
    fn unknown_module_in_state_is_fatal() {
        let text = base_config().replace("{ Counter Doubler }", "{ Counter Ghost }");
        let err = resolve_text(&text).expect_err("unknown module");
        assert!(err.to_string().contains("unknown module"), "{err}");
    }

    #[test]
    fn serialized_resolution_is_a_superset() {
        let original = parse(&base_config()).expect("parse original");
        let resolved = resolve_text(&base_config()).expect("resolve");
        let exported = resolved.to_config();

        // geometry fields present only after resolution
        let sig_x = exported
            .node_at("Data/DDB1/Signals/sigX")
            .expect("resolved sigX");
        assert_eq!(sig_x.get_i64("ByteSize"), Some(4));
        assert!(sig_x.node("States").is_some());

        // names and structure of the original survive
        assert!(exported.node_at("Functions/Doubler").is_some());
        assert_eq!(
            exported.at("Functions/Doubler/Gain").and_then(Value::as_i64),
            original.at("Functions/Doubler/Gain").and_then(Value::as_i64),
        );
        assert!(exported.node_at("States/Run/Threads/Main").is_some());
    }

    #[test]
    fn multi_sample_signal_size() {
        let text = base_config().replace(
            "sigY = { DataSource = DDB1 Type = int32 }",
            "sigY = { DataSource = DDB1 Type = int32 NumberOfElements = 4 NumberOfSamples = 3 }",
        );
        let resolved = resolve_text(&text).expect("resolve");
        let ddb = &resolved.datasources[0];
        let sig_y = ddb
            .registry
            .signal(ddb.registry.signal_index("sigY").unwrap())
            .unwrap();
        assert_eq!(sig_y.byte_size, 4 * 4 * 3);
        assert_eq!(sig_y.num_dimensions, 1);
    }
}
