mod common;

use browser_agent::prompt;
use browser_agent::session::with_session;
use browser_agent::{
    ActionKind, ContentBlock, LoopConfig, Role, SessionError, StepStatus, TerminationReason,
    Vendor,
};
use common::{
    sampling_loop, FixedVision, NavigateBehavior, RecordingBrowser, RecordingPool, ScriptedModel,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const DONE: &str = r#"{"actions":[],"done":true,"final_response":"finished"}"#;

fn observation_texts(result: &browser_agent::LoopResult) -> Vec<String> {
    result
        .conversation
        .messages()
        .iter()
        .filter(|m| m.role == Role::Observation)
        .map(|m| m.text())
        .collect()
}

#[tokio::test]
async fn test_batch_runs_in_order_against_post_navigation_viewport() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[
        r#"{"actions":[
            {"action":"navigate","args":{"url":"example.com"}},
            {"action":"click_at","args":{"x":500,"y":500}}
        ]}"#,
        DONE,
    ]);

    let result = sampling_loop(model, browser.clone(), LoopConfig::default())
        .run("open example and click the middle")
        .await
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Stopped);
    // The click is resolved against the 2000x1000 page seen after navigating.
    assert_eq!(
        browser.calls(),
        vec!["navigate https://example.com", "click (1000, 500) left x1"]
    );
    let kinds: Vec<ActionKind> = result.step_log.iter().map(|s| s.action).collect();
    assert_eq!(
        kinds,
        vec![ActionKind::Navigate, ActionKind::Click, ActionKind::Stop]
    );
    assert_eq!(result.step_log[0].state_changed, Some(true));
    assert!(result.execution_id.contains("_scripted_"));

    // Results after the navigation carry the page they left the browser on.
    let observation = result
        .conversation
        .messages()
        .iter()
        .find(|m| m.role == Role::Observation)
        .unwrap();
    let urls: Vec<Option<&str>> = observation
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ActionResult { url, .. } => Some(url.as_deref()),
            _ => None,
        })
        .collect();
    assert_eq!(
        urls,
        vec![Some("https://example.com"), Some("https://example.com")]
    );
}

#[tokio::test]
async fn test_placeholder_answer_keeps_running() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[
        r#"{"actions":[],"done":true,"final_response":"The result is {{x}}"}"#,
        r#"{"actions":[],"done":true,"final_response":"The result is 7"}"#,
    ]);

    let result = sampling_loop(model.clone(), browser, LoopConfig::default())
        .run("compute x")
        .await
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Stopped);
    assert_eq!(result.final_answer.as_deref(), Some("The result is 7"));
    assert_eq!(result.iterations, 2);
    assert_eq!(model.calls(), 2);
    assert_eq!(result.step_log[0].status, StepStatus::Failed);
    assert!(observation_texts(&result)[0].contains(prompt::EMPTY_OR_PLACEHOLDER_ANSWER));
}

#[tokio::test]
async fn test_invalid_json_answer_is_corrected() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[
        r#"{"actions":[],"done":true,"final_response":"{\"price\": 12,"}"#,
        r#"{"actions":[],"done":true,"final_response":"{\"price\": 12}"}"#,
    ]);

    let result = sampling_loop(model, browser, LoopConfig::default())
        .run("return the price as JSON")
        .await
        .unwrap();

    assert_eq!(result.final_answer.as_deref(), Some(r#"{"price": 12}"#));
    assert!(observation_texts(&result)[0].contains(prompt::INVALID_JSON_ANSWER));
}

#[tokio::test]
async fn test_old_screenshots_are_pruned_before_each_call() {
    let browser = Arc::new(RecordingBrowser::default());
    let shot = r#"{"actions":[{"action":"open_web_browser","args":{}}]}"#;
    let model = ScriptedModel::new(&[shot, shot, shot, shot, shot, DONE]);

    let result = sampling_loop(model.clone(), browser, LoopConfig::default())
        .run("look around")
        .await
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Stopped);
    assert_eq!(model.image_turns(), vec![0, 1, 2, 3, 3, 3]);

    // Stripped turns keep their action results.
    let observations: Vec<_> = result
        .conversation
        .messages()
        .iter()
        .filter(|m| m.role == Role::Observation)
        .collect();
    assert!(!observations[0].has_image());
    assert!(matches!(
        observations[0].content[0],
        ContentBlock::ActionResult {
            action: ActionKind::Screenshot,
            ..
        }
    ));
}

#[tokio::test]
async fn test_fatal_error_mid_batch_releases_session_once_without_reuse() {
    let browser = Arc::new(RecordingBrowser::default().with_fatal_clicks());
    let pool = RecordingPool::new(browser.clone());
    let model = ScriptedModel::new(&[r#"{"actions":[
        {"action":"navigate","args":{"url":"https://example.com"}},
        {"action":"click_at","args":{"x":10,"y":10}},
        {"action":"type_text_at","args":{"x":10,"y":10,"text":"never typed"}}
    ]}"#]);

    let err = with_session(pool.as_ref(), None, |lease| async move {
        sampling_loop(model, lease.browser(), LoopConfig::default())
            .run("click something")
            .await
    })
    .await
    .unwrap_err();

    assert!(matches!(err, SessionError::Fatal(_)));
    assert_eq!(pool.releases(), vec![("browser-0".to_string(), false)]);
    assert_eq!(
        browser.calls(),
        vec!["navigate https://example.com", "click (20, 10) left x1"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_navigate_retries_with_increasing_backoff_then_reports_error() {
    let browser =
        Arc::new(RecordingBrowser::default().with_navigate(NavigateBehavior::AlwaysFail));
    let model = ScriptedModel::new(&[
        r#"{"actions":[{"action":"navigate","args":{"url":"https://flaky.example"}}]}"#,
        DONE,
    ]);

    let result = sampling_loop(model, browser.clone(), LoopConfig::default())
        .run("open the flaky site")
        .await
        .unwrap();

    let attempts = browser.navigate_attempts();
    assert_eq!(attempts.len(), 3);
    let first_gap = attempts[1] - attempts[0];
    let second_gap = attempts[2] - attempts[1];
    assert!(first_gap >= Duration::from_millis(500));
    assert!(second_gap >= Duration::from_millis(1000));
    assert!(second_gap > first_gap);

    // Exhaustion is data the model sees, not a loop failure.
    assert_eq!(result.termination, TerminationReason::Stopped);
    let step = &result.step_log[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert!(step
        .detail
        .contains("navigation to https://flaky.example failed after 3 attempts"));
    assert!(step.detail.contains("ERR_CONNECTION_RESET"));
}

#[tokio::test]
async fn test_unparseable_response_gets_one_correction() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&["Sure! I'll click the login button now.", DONE]);

    let result = sampling_loop(model.clone(), browser, LoopConfig::default())
        .run("log in")
        .await
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Stopped);
    assert_eq!(result.iterations, 1);
    assert_eq!(model.calls(), 2);
    assert!(result
        .conversation
        .messages()
        .iter()
        .any(|m| m.role == Role::User && m.text() == prompt::INVALID_OUTPUT_CORRECTION));
}

#[tokio::test]
async fn test_salvaged_response_is_executed() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[
        "Here you go: ```json\n[{\"action\":\"wait\",\"args\":{\"seconds\":0}},]\n```",
        DONE,
    ]);

    let result = sampling_loop(model.clone(), browser, LoopConfig::default())
        .run("wait a moment")
        .await
        .unwrap();

    assert_eq!(model.calls(), 2);
    assert_eq!(result.step_log[0].action, ActionKind::Wait);
    assert_eq!(result.step_log[0].status, StepStatus::Success);
}

#[tokio::test]
async fn test_iteration_budget_is_a_distinct_terminal_state() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::repeating(r#"{"actions":[{"action":"scroll_document","args":{"direction":"down"}}]}"#);

    let result = sampling_loop(
        model.clone(),
        browser.clone(),
        LoopConfig {
            max_iterations: 3,
            ..Default::default()
        },
    )
    .run("scroll forever")
    .await
    .unwrap();

    assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
    assert_eq!(result.iterations, 3);
    assert_eq!(model.calls(), 3);
    assert!(result.final_answer.is_none());
    assert!(result.failure_reason.is_none());
    assert_eq!(
        browser.calls(),
        vec!["scroll (512, 384) 0 500"; 3]
    );
}

#[tokio::test]
async fn test_unchanged_screen_is_reported() {
    let browser = Arc::new(RecordingBrowser::default().with_static_screen());
    let click = r#"{"actions":[{"action":"click_at","args":{"x":100,"y":100}}]}"#;
    let model = ScriptedModel::new(&[click, click, DONE]);

    let result = sampling_loop(model, browser, LoopConfig::default())
        .run("click twice")
        .await
        .unwrap();

    let changed: Vec<Option<bool>> = result.step_log.iter().map(|s| s.state_changed).collect();
    assert_eq!(changed, vec![Some(true), Some(false), None]);
}

#[tokio::test]
async fn test_located_point_is_the_fallback_click_target() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[
        r#"{"actions":[
            {"action":"moondream_point","args":{"object":"login button"}},
            {"action":"click_at","args":{}},
            {"action":"moondream_query","args":{"question":"Is the dialog open?"}}
        ]}"#,
        DONE,
    ]);

    let result = sampling_loop(model, browser.clone(), LoopConfig::default())
        .with_vision(Arc::new(FixedVision {
            point: Some((0.5, 0.25)),
        }))
        .run("press login")
        .await
        .unwrap();

    assert_eq!(browser.calls(), vec!["click (512, 192) left x1"]);
    assert_eq!(result.step_log[0].action, ActionKind::Locate);
    let located: serde_json::Value =
        serde_json::from_str(result.step_log[0].output.as_deref().unwrap()).unwrap();
    assert_eq!(located["x_norm"], 500);
    assert_eq!(located["y_norm"], 250);
    assert_eq!(
        result.step_log[2].output.as_deref(),
        Some("answer to: Is the dialog open?")
    );
}

#[tokio::test]
async fn test_vision_actions_fail_softly_without_a_service() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[
        r#"{"actions":[{"action":"moondream_caption","args":{"length":"short"}}]}"#,
        DONE,
    ]);

    let result = sampling_loop(model, browser, LoopConfig::default())
        .run("describe the page")
        .await
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Stopped);
    assert_eq!(result.step_log[0].action, ActionKind::Caption);
    assert_eq!(result.step_log[0].status, StepStatus::Failed);
    assert_eq!(result.step_log[0].detail, "no vision service configured");
}

#[tokio::test]
async fn test_anthropic_click_reuses_last_pointer() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[
        r#"{"actions":[
            {"action":"mouse_move","args":{"coordinate":[100,200]}},
            {"action":"left_click","args":{}},
            {"action":"key","args":{"text":"ctrl+Return"}}
        ]}"#,
        DONE,
    ]);

    sampling_loop(model, browser.clone(), LoopConfig::for_vendor(Vendor::Anthropic))
        .run("click where the mouse is")
        .await
        .unwrap();

    assert_eq!(
        browser.calls(),
        vec![
            "move (100, 200)",
            "click (100, 200) left x1",
            "key ctrl+Return"
        ]
    );
}

#[tokio::test]
async fn test_unknown_action_fails_the_loop() {
    let browser = Arc::new(RecordingBrowser::default());
    let model = ScriptedModel::new(&[r#"{"actions":[{"action":"teleport","args":{}}]}"#]);

    let result = sampling_loop(model, browser.clone(), LoopConfig::default())
        .run("go somewhere")
        .await
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Failed);
    assert_eq!(result.failure_reason.as_deref(), Some("unknown action: teleport"));
    assert!(browser.calls().is_empty());
}
