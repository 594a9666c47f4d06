//! `performance.measure()`, `performance.mark()` and `console.time()` records.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::helpers::synthetic::create_matched_sorted_synthetic_events;
use crate::parser::entity::SyntheticEvent;
use crate::parser::event::{EventKind, RawEvent, UserTimingSignal};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct UserTimingsData {
    /// Paired measures, sorted by `ts`
    pub performance_measures: Vec<Arc<SyntheticEvent>>,
    pub performance_marks: Vec<Arc<RawEvent>>,
    /// Paired `console.time()`/`console.timeEnd()`, sorted by `ts`
    pub console_timings: Vec<Arc<SyntheticEvent>>,
}

pub struct UserTimingsHandler {
    lifecycle: Lifecycle,
    measure_records: Vec<Arc<RawEvent>>,
    marks: Vec<Arc<RawEvent>>,
    console_records: Vec<Arc<RawEvent>>,
    output: Arc<UserTimingsData>,
}

impl UserTimingsHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::UserTimings),
            measure_records: Vec::new(),
            marks: Vec::new(),
            console_records: Vec::new(),
            output: Arc::default(),
        }
    }
}

impl Default for UserTimingsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for UserTimingsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::UserTimings
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Meta]
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        match event.kind() {
            EventKind::UserTiming(UserTimingSignal::Measure) => {
                self.measure_records.push(event.clone())
            }
            EventKind::UserTiming(UserTimingSignal::Mark) => self.marks.push(event.clone()),
            EventKind::ConsoleTime => self.console_records.push(event.clone()),
            _ => {}
        }
        Ok(())
    }

    async fn finalize(&mut self, ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let trace_end = ctx.meta()?.trace_end();

        let performance_measures =
            create_matched_sorted_synthetic_events(&self.measure_records, trace_end);
        let console_timings =
            create_matched_sorted_synthetic_events(&self.console_records, trace_end);
        debug!(
            "{} measures, {} marks, {} console timings",
            performance_measures.len(),
            self.marks.len(),
            console_timings.len()
        );

        self.output = Arc::new(UserTimingsData {
            performance_measures,
            performance_marks: std::mem::take(&mut self.marks),
            console_timings,
        });
        self.measure_records.clear();
        self.console_records.clear();
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::UserTimings(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{meta_output, run_handler, sequenced};
    use crate::parser::event::Phase;
    use crate::parser::timing::MicroSeconds;

    #[tokio::test]
    async fn test_measures_marks_and_console_timings() {
        let events = sequenced(vec![
            RawEvent::new("load", Phase::AsyncBegin, 10)
                .with_cat("blink.user_timing")
                .with_id("0x1"),
            RawEvent::new("load", Phase::AsyncEnd, 70)
                .with_cat("blink.user_timing")
                .with_id("0x1"),
            RawEvent::new("ready", Phase::Mark, 75).with_cat("blink.user_timing"),
            RawEvent::new("navigationStart", Phase::Mark, 0).with_cat("blink.user_timing"),
            RawEvent::new("timer", Phase::AsyncBegin, 80).with_cat("blink.console"),
        ]);

        let mut handler = UserTimingsHandler::new();
        let data = match run_handler(&mut handler, &events, vec![meta_output(0, 200)]).await {
            HandlerOutput::UserTimings(data) => data,
            other => panic!("unexpected output {:?}", other.name()),
        };

        assert_eq!(data.performance_measures.len(), 1);
        assert_eq!(data.performance_measures[0].dur, MicroSeconds(60));
        assert_eq!(data.performance_marks.len(), 1);
        assert_eq!(data.performance_marks[0].name, "ready");
        // console.time() never ended: runs to the end of the trace
        assert_eq!(data.console_timings[0].dur, MicroSeconds(120));
    }
}
