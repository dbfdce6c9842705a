//! Session-scoped memoization of engine lookups
//!
//! Fetching full processes and searching flows or methods by name are the
//! slow engine calls that repeat on every model rebuild. [`ModelCache`]
//! keeps the answers for the lifetime of one session. Entries are never
//! evicted or invalidated: a session assumes nobody else edits the model
//! library while it runs.
//!
//! The first fetched definition of every process the session overwrites is
//! kept, so a process can be put back when a sheet has no provider to
//! substitute in.

use rustc_hash::FxHashMap;

use crate::engine::Engine;
use crate::error::{EngineError, LookupError};
use crate::model::{FlowRef, ImpactMethodRef, Process, ProcessId, ReferenceFlow};

/// Hit/miss counters for one cache map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }
}

pub struct ModelCache<'e, E: Engine> {
    engine: &'e E,
    processes: FxHashMap<ProcessId, Process>,
    originals: FxHashMap<ProcessId, Process>,
    flows: FxHashMap<String, FlowRef>,
    reference_flows: FxHashMap<ProcessId, ReferenceFlow>,
    methods: FxHashMap<String, ImpactMethodRef>,
    process_stats: CacheStats,
    flow_stats: CacheStats,
    reference_stats: CacheStats,
    method_stats: CacheStats,
}

impl<'e, E: Engine> ModelCache<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            processes: FxHashMap::default(),
            originals: FxHashMap::default(),
            flows: FxHashMap::default(),
            reference_flows: FxHashMap::default(),
            methods: FxHashMap::default(),
            process_stats: CacheStats::default(),
            flow_stats: CacheStats::default(),
            reference_stats: CacheStats::default(),
            method_stats: CacheStats::default(),
        }
    }

    pub fn engine(&self) -> &'e E {
        self.engine
    }

    /// Full process definition by id
    pub fn process(&mut self, id: &ProcessId) -> Result<&Process, LookupError> {
        let hit = self.processes.contains_key(id);
        self.process_stats.record(hit);
        if !hit {
            let process = self.engine.fetch_process(id)?;
            self.processes.insert(id.clone(), process);
        }
        Ok(&self.processes[id])
    }

    /// Replace a cached process with the definition just persisted
    pub fn store_process(&mut self, process: Process) {
        let id = process.id.clone();
        if let Some(previous) = self.processes.insert(id.clone(), process) {
            self.originals.entry(id).or_insert(previous);
        }
    }

    /// Definition of `id` as first fetched, if it has been replaced since
    pub fn original_process(&self, id: &ProcessId) -> Option<&Process> {
        self.originals.get(id)
    }

    /// Persist the first fetched definition of `id` again.
    ///
    /// Returns `false` without touching the engine when the process was never
    /// replaced or already matches its original.
    pub fn restore_original(&mut self, id: &ProcessId) -> Result<bool, EngineError> {
        let Some(original) = self.originals.get(id) else {
            return Ok(false);
        };
        if self.processes.get(id) == Some(original) {
            return Ok(false);
        }
        self.engine.persist_process(original)?;
        self.processes.insert(id.clone(), original.clone());
        tracing::debug!(process = %original.name, "Original process definition restored");
        Ok(true)
    }

    /// Flow by exact name
    pub fn flow(&mut self, name: &str) -> Result<&FlowRef, LookupError> {
        let hit = self.flows.contains_key(name);
        self.flow_stats.record(hit);
        if !hit {
            let flow = self.engine.find_flow(name)?;
            self.flows.insert(name.to_string(), flow);
        }
        Ok(&self.flows[name])
    }

    /// Reference (quantitative) flow of a provider process
    pub fn reference_flow(&mut self, id: &ProcessId) -> Result<&ReferenceFlow, LookupError> {
        let hit = self.reference_flows.contains_key(id);
        self.reference_stats.record(hit);
        if !hit {
            let exchange = self
                .process(id)?
                .quantitative_reference()
                .cloned()
                .ok_or_else(|| LookupError::NoReferenceFlow(id.clone()))?;
            let flow = self.flow(&exchange.flow.name)?.clone();
            self.reference_flows.insert(
                id.clone(),
                ReferenceFlow {
                    flow,
                    flow_property: exchange.flow_property,
                    unit: exchange.unit.name,
                    amount: exchange.amount,
                },
            );
        }
        Ok(&self.reference_flows[id])
    }

    /// LCIA method by name
    pub fn impact_method(&mut self, name: &str) -> Result<&ImpactMethodRef, LookupError> {
        let hit = self.methods.contains_key(name);
        self.method_stats.record(hit);
        if !hit {
            let method = self.engine.find_impact_method(name)?;
            self.methods.insert(name.to_string(), method);
        }
        Ok(&self.methods[name])
    }

    /// Counters for processes, flows, reference flows and methods, in that order
    pub fn stats(&self) -> [CacheStats; 4] {
        [
            self.process_stats,
            self.flow_stats,
            self.reference_stats,
            self.method_stats,
        ]
    }

    /// Log cache effectiveness at the end of a session
    pub fn log_stats(&self) {
        let [processes, flows, references, methods] = self.stats();
        tracing::info!(
            process_hits = processes.hits,
            process_misses = processes.misses,
            flow_hits = flows.hits,
            flow_misses = flows.misses,
            reference_hits = references.hits,
            reference_misses = references.misses,
            method_hits = methods.hits,
            method_misses = methods.misses,
            "Model cache statistics"
        );
    }
}
