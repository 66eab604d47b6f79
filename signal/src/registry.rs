use std::collections::HashMap;

use reflex_config::{Node, Value};

use crate::descriptor::SignalDescriptor;

/// Frozen, index-addressable view of every signal in one DataSource.
#[derive(Debug, Clone)]
pub struct SignalRegistry {
    datasource: String,
    signals: Vec<SignalDescriptor>,
    by_name: HashMap<String, usize>,
}

impl SignalRegistry {
    /// Freezes a list of resolved descriptors into an indexed registry.
    pub fn new(datasource: String, signals: Vec<SignalDescriptor>) -> Self {
        let by_name = signals
            .iter()
            .enumerate()
            .map(|(idx, signal)| (signal.name.clone(), idx))
            .collect();
        SignalRegistry {
            datasource,
            signals,
            by_name,
        }
    }

    pub fn datasource_name(&self) -> &str {
        &self.datasource
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signal(&self, index: usize) -> Option<&SignalDescriptor> {
        self.signals.get(index)
    }

    pub fn signal_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalDescriptor> {
        self.signals.iter()
    }

    /// Sum of the byte sizes of all signals: the length of one memory bank.
    pub fn total_byte_size(&self) -> usize {
        self.signals.iter().map(|s| s.byte_size as usize).sum()
    }

    /// Serializes the resolved signals back to a configuration node, with
    /// the derived fields included.
    pub fn to_config(&self) -> Node {
        let mut signals = Node::new();
        for signal in &self.signals {
            let mut entry = Node::new();
            entry.insert("QualifiedName", signal.qualified_name.as_str());
            entry.insert("Type", signal.signal_type.name());
            entry.insert("NumberOfDimensions", signal.num_dimensions as i64);
            if signal.num_dimensions > 1 {
                let dims: Vec<Value> = signal.num_elements[..signal.num_dimensions as usize]
                    .iter()
                    .map(|&n| Value::Int(n as i64))
                    .collect();
                entry.insert("NumberOfElements", Value::Array(dims));
            } else {
                entry.insert("NumberOfElements", signal.total_elements() as i64);
            }
            entry.insert("NumberOfSamples", signal.num_samples as i64);
            entry.insert("ByteSize", signal.byte_size as i64);
            if let Some(literal) = &signal.default_literal {
                entry.insert("Default", literal.clone());
            }
            if !signal.states.is_empty() {
                let mut states = Node::new();
                for (state, usage) in signal.states.iter() {
                    let mut record = Node::new();
                    record.insert(
                        "Producers",
                        Value::Array(
                            usage.producers.iter().map(|p| p.as_str().into()).collect(),
                        ),
                    );
                    record.insert(
                        "Consumers",
                        Value::Array(
                            usage.consumers.iter().map(|c| c.as_str().into()).collect(),
                        ),
                    );
                    states.insert(state.as_str(), record);
                }
                entry.insert("States", states);
            }
            signals.insert(signal.name.as_str(), entry);
        }
        signals
    }
}
