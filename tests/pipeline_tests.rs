use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use trace_engine::annotations::EventKeyMap;
use trace_engine::commands::{execute_process, ProcessArgs};
use trace_engine::handlers::HandlerName;
use trace_engine::output::read_summary;
use trace_engine::parser::{load_trace, parse_trace_value, EventKey, MicroSeconds, RawEvent, Trace, TraceEntity};
use trace_engine::processor::{Processor, TraceParseData};
use trace_engine::utils::config::EngineConfig;

fn page_trace() -> Value {
    json!({
        "traceEvents": [
            {"name": "thread_name", "ph": "M", "ts": 0, "pid": 1, "tid": 1,
             "args": {"name": "CrRendererMain"}},
            {"name": "RunTask", "ph": "X", "ts": 0, "dur": 100, "pid": 1, "tid": 1},
            {"name": "FunctionCall", "ph": "X", "ts": 10, "dur": 50, "pid": 1, "tid": 1},
            {"name": "load", "cat": "blink.user_timing", "ph": "b", "ts": 10, "id": "0x1",
             "pid": 1, "tid": 1},
            {"name": "load", "cat": "blink.user_timing", "ph": "e", "ts": 70, "id": "0x1",
             "pid": 1, "tid": 1},
            {"name": "BeginFrame", "ph": "I", "ts": 100, "pid": 1, "tid": 5,
             "args": {"frameSeqId": 5}},
            {"name": "DrawFrame", "ph": "I", "ts": 116, "pid": 1, "tid": 5,
             "args": {"frameSeqId": 5}},
            {"name": "EventTiming", "ph": "b", "ts": 100, "id": "i1", "pid": 1, "tid": 1,
             "args": {"data": {"interactionId": 1540, "type": "pointerdown", "duration": 5.0}}},
            {"name": "EventTiming", "ph": "e", "ts": 132, "id": "i1", "pid": 1, "tid": 1}
        ]
    })
}

fn find(trace: &Trace, name: &str) -> Arc<RawEvent> {
    trace
        .events()
        .iter()
        .find(|e| e.name == name)
        .cloned()
        .unwrap()
}

async fn process(trace: &Trace) -> TraceParseData {
    let mut processor = Processor::with_config(&EngineConfig::default()).unwrap();
    processor.parse(trace).await.unwrap()
}

#[tokio::test]
async fn test_full_pipeline_builds_every_domain() {
    let trace = parse_trace_value(&page_trace()).unwrap();
    let data = process(&trace).await;

    let meta = data.meta.as_ref().unwrap();
    assert_eq!(meta.trace_bounds.min, MicroSeconds(0));
    assert_eq!(meta.trace_bounds.max, MicroSeconds(132));

    let frames = data.frames.as_ref().unwrap();
    assert_eq!(frames.frames.len(), 1);
    assert_eq!(frames.count_with_status("drawn"), 1);

    let interactions = data.user_interactions.as_ref().unwrap();
    let longest = interactions.longest_interaction.as_ref().unwrap();
    assert_eq!(longest.interaction_id, 1540);
    assert_eq!(longest.ts, MicroSeconds(100));
    assert_eq!(longest.dur, MicroSeconds(32));

    let timings = data.user_timings.as_ref().unwrap();
    assert_eq!(timings.performance_measures.len(), 1);
    assert_eq!(timings.performance_measures[0].dur, MicroSeconds(60));

    let renderer = data.renderer.as_ref().unwrap();
    let task = TraceEntity::Raw(find(&trace, "RunTask"));
    let call = TraceEntity::Raw(find(&trace, "FunctionCall"));
    assert_eq!(renderer.children_of(&task), vec![call.clone()]);
    assert_eq!(renderer.parent_of(&call), Some(task));
}

#[tokio::test]
async fn test_keys_resolve_to_the_same_entities() {
    let trace = parse_trace_value(&page_trace()).unwrap();
    let data = process(&trace).await;
    let keys = EventKeyMap::new(&trace, &data);

    let call = TraceEntity::Raw(find(&trace, "FunctionCall"));
    let key = keys.key_for_event(&call).unwrap();
    assert_eq!(keys.event_for_key(&key), Some(call));

    let interaction = &data.user_interactions.as_ref().unwrap().interactions[0];
    let synthetic = TraceEntity::Synthetic(interaction.synthetic.clone());
    let key = keys.key_for_event(&synthetic).unwrap();
    assert!(matches!(key, EventKey::Synthetic(_)));
    assert_eq!(
        keys.event_for_key_str(&key.to_string()).unwrap(),
        Some(synthetic)
    );
}

#[tokio::test]
async fn test_same_file_loads_with_same_numbering() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("page.json");
    fs::write(&path, page_trace().to_string()).unwrap();

    let first = load_trace(&path).unwrap();
    let second = load_trace(&path).unwrap();
    let names = |t: &Trace| -> Vec<(usize, String)> {
        t.events().iter().map(|e| (e.seq, e.name.clone())).collect()
    };
    assert_eq!(names(&first), names(&second));
}

#[tokio::test]
async fn test_process_command_writes_summary_with_annotations() {
    let dir = TempDir::new().unwrap();
    let trace_path = dir.path().join("page.json");
    fs::write(&trace_path, page_trace().to_string()).unwrap();

    let trace = load_trace(&trace_path).unwrap();
    let hidden_key = EventKey::Raw(find(&trace, "FunctionCall").seq).to_string();

    let annotations_path = dir.path().join("annotations.json");
    let annotations = json!({
        "entriesModifications": {
            "hiddenEntries": [hidden_key, "r-9999"],
            "expandableEntries": ["not-a-key"]
        },
        "initialBreadcrumb": {
            "window": {"min": 0, "max": 132, "range": 132},
            "child": {
                "window": {"min": 10, "max": 60, "range": 50},
                "child": null
            }
        }
    });
    fs::write(&annotations_path, annotations.to_string()).unwrap();

    let output_json = dir.path().join("out").join("summary.json");
    let args = ProcessArgs {
        trace_path: trace_path.clone(),
        output_json: output_json.clone(),
        annotations: Some(annotations_path),
        top_paths: Some(5),
        ..Default::default()
    };

    let summary = execute_process(args).await.unwrap();

    assert_eq!(summary.handlers.len(), HandlerName::ALL.len());
    assert_eq!(summary.domains.frames.drawn, 1);
    assert_eq!(summary.domains.interactions, 1);
    assert_eq!(summary.longest_interaction.as_ref().unwrap().interaction_id, 1540);
    assert_eq!(summary.hot_paths.len(), 2);
    assert!(summary
        .hot_paths
        .iter()
        .all(|p| p.self_time_us == 50 && (p.percentage - 50.0).abs() < 1e-9));

    let annotations = summary.annotations.as_ref().unwrap();
    assert_eq!(annotations.hidden_entries, 1);
    assert_eq!(annotations.skipped_keys, 2);
    assert_eq!(annotations.breadcrumbs, 2);

    let written = read_summary(&output_json).unwrap();
    assert_eq!(written.event_count, summary.event_count);
    assert_eq!(written.handlers, summary.handlers);
    assert_eq!(written.domains, summary.domains);
    assert_eq!(written.annotations, summary.annotations);
}

#[tokio::test]
async fn test_process_command_rejects_missing_trace() {
    let dir = TempDir::new().unwrap();
    let args = ProcessArgs {
        trace_path: dir.path().join("missing.json"),
        output_json: dir.path().join("summary.json"),
        ..Default::default()
    };
    assert!(execute_process(args).await.is_err());
}
