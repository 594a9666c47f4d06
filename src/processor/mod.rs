//! Handler orchestration.
//!
//! The processor owns one instance of each registered handler, orders them
//! by their declared dependencies once at construction, and drives every
//! parse through the same three phases:
//! 1. reset and initialize, in dependency order
//! 2. ingest: every event, in trace order, to every handler
//! 3. finalize, one handler at a time, each awaited before the next starts

use crate::handlers::{
    create_handler, FinalizeContext, FramesData, Handler, HandlerName, HandlerOutput,
    InitiatorsData, LayoutShiftsData, MetaData, NetworkData, RendererData, SamplesData,
    ServerTimingsData, UserInteractionsData, UserTimingsData, WebSocketsData,
};
use crate::parser::trace_file::Trace;
use crate::utils::config::{EngineConfig, PROGRESS_CHUNK_SIZE};
use crate::utils::error::ProcessorError;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Finalized outputs of one parse; `None` for handlers that did not run
#[derive(Debug, Clone, Default)]
pub struct TraceParseData {
    pub meta: Option<Arc<MetaData>>,
    pub samples: Option<Arc<SamplesData>>,
    pub renderer: Option<Arc<RendererData>>,
    pub frames: Option<Arc<FramesData>>,
    pub user_interactions: Option<Arc<UserInteractionsData>>,
    pub user_timings: Option<Arc<UserTimingsData>>,
    pub network: Option<Arc<NetworkData>>,
    pub layout_shifts: Option<Arc<LayoutShiftsData>>,
    pub web_sockets: Option<Arc<WebSocketsData>>,
    pub server_timings: Option<Arc<ServerTimingsData>>,
    pub initiators: Option<Arc<InitiatorsData>>,
}

impl TraceParseData {
    fn from_outputs(outputs: HashMap<HandlerName, HandlerOutput>) -> Self {
        let mut data = Self::default();
        for output in outputs.into_values() {
            match output {
                HandlerOutput::Meta(d) => data.meta = Some(d),
                HandlerOutput::Samples(d) => data.samples = Some(d),
                HandlerOutput::Renderer(d) => data.renderer = Some(d),
                HandlerOutput::Frames(d) => data.frames = Some(d),
                HandlerOutput::UserInteractions(d) => data.user_interactions = Some(d),
                HandlerOutput::UserTimings(d) => data.user_timings = Some(d),
                HandlerOutput::Network(d) => data.network = Some(d),
                HandlerOutput::LayoutShifts(d) => data.layout_shifts = Some(d),
                HandlerOutput::WebSockets(d) => data.web_sockets = Some(d),
                HandlerOutput::ServerTimings(d) => data.server_timings = Some(d),
                HandlerOutput::Initiators(d) => data.initiators = Some(d),
            }
        }
        data
    }
}

pub struct Processor {
    /// Already in dependency order
    handlers: Vec<Box<dyn Handler>>,
}

impl Processor {
    /// Register `handlers` and order them by their dependencies
    ///
    /// # Errors
    /// * `ProcessorError::DuplicateHandler` - a name appears twice
    /// * `ProcessorError::MissingDependency` - a declared dependency is not registered
    /// * `ProcessorError::CyclicDependency` - the dependency graph has a cycle
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Result<Self, ProcessorError> {
        let order = sort_handlers(&handlers)?;

        let mut slots: Vec<Option<Box<dyn Handler>>> = handlers.into_iter().map(Some).collect();
        let handlers: Vec<Box<dyn Handler>> = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        debug!(
            "Handler order: {}",
            handlers
                .iter()
                .map(|h| h.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { handlers })
    }

    /// Built-in handlers selected by `config`
    ///
    /// A subset named in `handlers.enabled` is widened with everything it
    /// transitively depends on.
    pub fn with_config(config: &EngineConfig) -> Result<Self, ProcessorError> {
        let mut selected: BTreeSet<HandlerName> = match &config.handlers.enabled {
            Some(enabled) => enabled.iter().copied().collect(),
            None => HandlerName::ALL.into_iter().collect(),
        };

        let mut pending: Vec<HandlerName> = selected.iter().copied().collect();
        while let Some(name) = pending.pop() {
            for dep in create_handler(name, config).deps() {
                if selected.insert(*dep) {
                    pending.push(*dep);
                }
            }
        }

        let handlers = HandlerName::ALL
            .into_iter()
            .filter(|name| selected.contains(name))
            .map(|name| create_handler(name, config))
            .collect();
        Self::new(handlers)
    }

    pub fn handler_order(&self) -> Vec<HandlerName> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every handler over `trace`
    ///
    /// **Public** - main entry point of the pipeline
    ///
    /// Handler state from any earlier parse is discarded first, so one
    /// processor can parse several traces in turn.
    ///
    /// # Errors
    /// * `ProcessorError::Handler` - a handler broke its lifecycle contract
    pub async fn parse(&mut self, trace: &Trace) -> Result<TraceParseData, ProcessorError> {
        for handler in self.handlers.iter_mut() {
            handler.reset();
            handler.initialize();
        }

        let total = trace.len();
        for (index, event) in trace.events().iter().enumerate() {
            for handler in self.handlers.iter_mut() {
                handler.handle_event(event)?;
            }
            if (index + 1) % PROGRESS_CHUNK_SIZE == 0 {
                debug!("Ingested {}/{} events", index + 1, total);
            }
        }
        debug!("Ingested {} events", total);

        let mut outputs: HashMap<HandlerName, HandlerOutput> = HashMap::new();
        for handler in self.handlers.iter_mut() {
            let name = handler.name();
            let ctx = FinalizeContext::new(name, handler.deps(), &outputs);
            handler.finalize(&ctx).await?;
            let output = handler.data()?;
            debug!("Finalized {}", name);
            outputs.insert(name, output);
        }

        info!(
            "Processed {} events with {} handlers",
            total,
            self.handlers.len()
        );
        Ok(TraceParseData::from_outputs(outputs))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Dependency order of `handlers`, as indices into the slice
///
/// **Public** - depth-first, so independent handlers keep their
/// registration order
///
/// # Errors
/// * `ProcessorError::DuplicateHandler` - a name appears twice
/// * `ProcessorError::MissingDependency` - a declared dependency is not registered
/// * `ProcessorError::CyclicDependency` - the names along the cycle, in order
pub fn sort_handlers(handlers: &[Box<dyn Handler>]) -> Result<Vec<usize>, ProcessorError> {
    let mut index_of: HashMap<HandlerName, usize> = HashMap::new();
    for (index, handler) in handlers.iter().enumerate() {
        if index_of.insert(handler.name(), index).is_some() {
            return Err(ProcessorError::DuplicateHandler(handler.name()));
        }
    }
    for handler in handlers {
        for dep in handler.deps() {
            if !index_of.contains_key(dep) {
                return Err(ProcessorError::MissingDependency {
                    handler: handler.name(),
                    dependency: *dep,
                });
            }
        }
    }

    let mut marks = vec![Mark::Unvisited; handlers.len()];
    let mut order = Vec::with_capacity(handlers.len());
    let mut path = Vec::new();
    for start in 0..handlers.len() {
        visit(start, handlers, &index_of, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    index: usize,
    handlers: &[Box<dyn Handler>],
    index_of: &HashMap<HandlerName, usize>,
    marks: &mut [Mark],
    path: &mut Vec<HandlerName>,
    order: &mut Vec<usize>,
) -> Result<(), ProcessorError> {
    let name = handlers[index].name();
    match marks[index] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let start = path.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(name);
            return Err(ProcessorError::CyclicDependency(cycle));
        }
        Mark::Unvisited => {}
    }

    marks[index] = Mark::InProgress;
    path.push(name);
    for dep in handlers[index].deps() {
        visit(index_of[dep], handlers, index_of, marks, path, order)?;
    }
    path.pop();
    marks[index] = Mark::Done;
    order.push(index);
    Ok(())
}
