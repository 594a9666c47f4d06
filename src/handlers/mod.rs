//! Domain handlers and the contract the processor drives them through.
//!
//! Every handler owns its state for one session and moves through
//! `Uninitialized -> Initialized -> Finalized`:
//! - `reset()` drops all state and returns to `Uninitialized`
//! - `initialize()` arms the handler for ingest
//! - `handle_event()` sees every raw event, in trace order
//! - `finalize()` builds the output, reading declared dependencies only
//! - `data()` hands out the finalized output as a cheap `Arc` clone

pub mod frames;
pub mod initiators;
pub mod layout_shifts;
pub mod meta;
pub mod network;
pub mod renderer;
pub mod samples;
pub mod server_timings;
pub mod user_interactions;
pub mod user_timings;
pub mod web_sockets;

use crate::parser::event::RawEvent;
use crate::utils::config::EngineConfig;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use frames::{Frame, FrameStatus, FramesData, FramesHandler};
pub use initiators::{InitiatorsData, InitiatorsHandler};
pub use layout_shifts::{LayoutShift, LayoutShiftCluster, LayoutShiftsData, LayoutShiftsHandler};
pub use meta::{MetaData, MetaHandler};
pub use network::{NetworkData, NetworkHandler, NetworkRequest};
pub use renderer::{RendererData, RendererHandler, RendererThread};
pub use samples::{ProfileThread, SamplesData, SamplesHandler};
pub use server_timings::{ServerTiming, ServerTimingsData, ServerTimingsHandler};
pub use user_interactions::{InteractionEvent, UserInteractionsData, UserInteractionsHandler};
pub use user_timings::{UserTimingsData, UserTimingsHandler};
pub use web_sockets::{WebSocketConnection, WebSocketsData, WebSocketsHandler};

/// Identity of a handler, used for dependency declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandlerName {
    Meta,
    Samples,
    Renderer,
    Frames,
    UserInteractions,
    UserTimings,
    Network,
    LayoutShifts,
    WebSockets,
    ServerTimings,
    Initiators,
}

impl HandlerName {
    /// Every built-in handler, in registration order
    pub const ALL: [HandlerName; 11] = [
        HandlerName::Meta,
        HandlerName::Samples,
        HandlerName::Renderer,
        HandlerName::Frames,
        HandlerName::UserInteractions,
        HandlerName::UserTimings,
        HandlerName::Network,
        HandlerName::LayoutShifts,
        HandlerName::WebSockets,
        HandlerName::ServerTimings,
        HandlerName::Initiators,
    ];
}

impl fmt::Display for HandlerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Position of a handler in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerState {
    #[default]
    Uninitialized,
    Initialized,
    Finalized,
}

/// Lifecycle guard embedded in every handler
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    name: HandlerName,
    state: HandlerState,
}

impl Lifecycle {
    pub fn new(name: HandlerName) -> Self {
        Self {
            name,
            state: HandlerState::Uninitialized,
        }
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = HandlerState::Uninitialized;
    }

    pub fn initialize(&mut self) {
        self.state = HandlerState::Initialized;
    }

    /// Gate for `handle_event` and the start of `finalize`
    pub fn ensure_accepting(&self) -> Result<(), HandlerError> {
        match self.state {
            HandlerState::Uninitialized => Err(HandlerError::NotInitialized(self.name)),
            HandlerState::Initialized => Ok(()),
            HandlerState::Finalized => Err(HandlerError::AlreadyFinalized(self.name)),
        }
    }

    pub fn finish(&mut self) {
        self.state = HandlerState::Finalized;
    }

    /// Gate for `data`
    pub fn ensure_finalized(&self) -> Result<(), HandlerError> {
        if self.state == HandlerState::Finalized {
            Ok(())
        } else {
            Err(HandlerError::NotFinalized(self.name))
        }
    }
}

/// Finalized output of one handler
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    Meta(Arc<MetaData>),
    Samples(Arc<SamplesData>),
    Renderer(Arc<RendererData>),
    Frames(Arc<FramesData>),
    UserInteractions(Arc<UserInteractionsData>),
    UserTimings(Arc<UserTimingsData>),
    Network(Arc<NetworkData>),
    LayoutShifts(Arc<LayoutShiftsData>),
    WebSockets(Arc<WebSocketsData>),
    ServerTimings(Arc<ServerTimingsData>),
    Initiators(Arc<InitiatorsData>),
}

impl HandlerOutput {
    pub fn name(&self) -> HandlerName {
        match self {
            Self::Meta(_) => HandlerName::Meta,
            Self::Samples(_) => HandlerName::Samples,
            Self::Renderer(_) => HandlerName::Renderer,
            Self::Frames(_) => HandlerName::Frames,
            Self::UserInteractions(_) => HandlerName::UserInteractions,
            Self::UserTimings(_) => HandlerName::UserTimings,
            Self::Network(_) => HandlerName::Network,
            Self::LayoutShifts(_) => HandlerName::LayoutShifts,
            Self::WebSockets(_) => HandlerName::WebSockets,
            Self::ServerTimings(_) => HandlerName::ServerTimings,
            Self::Initiators(_) => HandlerName::Initiators,
        }
    }
}

/// Read access to already-finalized outputs during `finalize`
///
/// Only the outputs a handler declared in `deps()` are reachable.
pub struct FinalizeContext<'a> {
    handler: HandlerName,
    deps: &'static [HandlerName],
    outputs: &'a HashMap<HandlerName, HandlerOutput>,
}

impl<'a> FinalizeContext<'a> {
    pub fn new(
        handler: HandlerName,
        deps: &'static [HandlerName],
        outputs: &'a HashMap<HandlerName, HandlerOutput>,
    ) -> Self {
        Self {
            handler,
            deps,
            outputs,
        }
    }

    /// Output of a declared dependency
    ///
    /// # Errors
    /// * `HandlerError::UndeclaredDependency` - `dependency` is not in `deps()`
    /// * `HandlerError::MissingData` - dependency has not published output
    pub fn dependency(&self, dependency: HandlerName) -> Result<&HandlerOutput, HandlerError> {
        if !self.deps.contains(&dependency) {
            return Err(HandlerError::UndeclaredDependency {
                handler: self.handler,
                dependency,
            });
        }
        self.outputs
            .get(&dependency)
            .ok_or(HandlerError::MissingData {
                handler: self.handler,
                dependency,
            })
    }

    pub fn meta(&self) -> Result<Arc<MetaData>, HandlerError> {
        match self.dependency(HandlerName::Meta)? {
            HandlerOutput::Meta(data) => Ok(data.clone()),
            _ => Err(self.missing(HandlerName::Meta)),
        }
    }

    pub fn samples(&self) -> Result<Arc<SamplesData>, HandlerError> {
        match self.dependency(HandlerName::Samples)? {
            HandlerOutput::Samples(data) => Ok(data.clone()),
            _ => Err(self.missing(HandlerName::Samples)),
        }
    }

    pub fn network(&self) -> Result<Arc<NetworkData>, HandlerError> {
        match self.dependency(HandlerName::Network)? {
            HandlerOutput::Network(data) => Ok(data.clone()),
            _ => Err(self.missing(HandlerName::Network)),
        }
    }

    fn missing(&self, dependency: HandlerName) -> HandlerError {
        HandlerError::MissingData {
            handler: self.handler,
            dependency,
        }
    }
}

/// Contract between the processor and one domain handler
#[async_trait]
pub trait Handler: Send {
    fn name(&self) -> HandlerName;

    /// Handlers whose output `finalize` reads
    fn deps(&self) -> &'static [HandlerName] {
        &[]
    }

    /// Drop all state and return to `Uninitialized`
    fn reset(&mut self);

    fn initialize(&mut self);

    /// Inspect one raw event; irrelevant events are ignored
    ///
    /// # Errors
    /// * `HandlerError::NotInitialized` - called before `initialize`
    /// * `HandlerError::AlreadyFinalized` - called after `finalize`
    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError>;

    /// Build the output from ingested state and dependency outputs
    async fn finalize(&mut self, ctx: &FinalizeContext<'_>) -> Result<(), HandlerError>;

    /// The finalized output
    ///
    /// # Errors
    /// * `HandlerError::NotFinalized` - called before `finalize`
    fn data(&self) -> Result<HandlerOutput, HandlerError>;
}

/// Instantiate the built-in handler for `name`
///
/// **Public** - used by the processor to build the default pipeline
pub fn create_handler(name: HandlerName, config: &EngineConfig) -> Box<dyn Handler> {
    match name {
        HandlerName::Meta => Box::new(MetaHandler::new()),
        HandlerName::Samples => Box::new(SamplesHandler::new()),
        HandlerName::Renderer => Box::new(RendererHandler::new()),
        HandlerName::Frames => Box::new(FramesHandler::new()),
        HandlerName::UserInteractions => Box::new(UserInteractionsHandler::new()),
        HandlerName::UserTimings => Box::new(UserTimingsHandler::new()),
        HandlerName::Network => Box::new(NetworkHandler::new()),
        HandlerName::LayoutShifts => Box::new(LayoutShiftsHandler::with_config(config.layout_shifts)),
        HandlerName::WebSockets => Box::new(WebSocketsHandler::new()),
        HandlerName::ServerTimings => Box::new(ServerTimingsHandler::new()),
        HandlerName::Initiators => Box::new(InitiatorsHandler::new()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::parser::timing::{MicroSeconds, TraceWindow};
    use crate::parser::trace_file::Trace;

    /// Number events the way a loaded trace would
    pub fn sequenced(events: Vec<RawEvent>) -> Vec<Arc<RawEvent>> {
        Trace::from_events(events).events().to_vec()
    }

    pub fn meta_output(min: i64, max: i64) -> (HandlerName, HandlerOutput) {
        let data = MetaData {
            trace_bounds: TraceWindow::new(MicroSeconds(min), MicroSeconds(max)),
            ..Default::default()
        };
        (HandlerName::Meta, HandlerOutput::Meta(Arc::new(data)))
    }

    /// Drive one handler through a full session
    pub async fn run_handler(
        handler: &mut dyn Handler,
        events: &[Arc<RawEvent>],
        outputs: Vec<(HandlerName, HandlerOutput)>,
    ) -> HandlerOutput {
        let outputs: HashMap<HandlerName, HandlerOutput> = outputs.into_iter().collect();
        handler.reset();
        handler.initialize();
        for event in events {
            handler.handle_event(event).unwrap();
        }
        let ctx = FinalizeContext::new(handler.name(), handler.deps(), &outputs);
        handler.finalize(&ctx).await.unwrap();
        handler.data().unwrap()
    }
}
