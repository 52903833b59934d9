//! End-to-end dialogue flows against a scripted provider.
//!
//! These tests exercise the public API only:
//! - Starting and continuing a conversation over several turns
//! - Recovering from model replies that ignore the requested format
//! - Session expiry and sweeping
//! - Independent sessions driven concurrently

use futures::future::join_all;
use galsim_core::{
    normalize, DialogueError, MockProvider, ProviderError, Role, Strategy, TestHarness,
};

const OPENING: &str = r#"{"dialogue":"欢迎来到魔法学院！","choices":["选项A：微笑","选项B：点头","选项C：沉默","选项D：离开"]}"#;

fn reply(text: &str) -> String {
    serde_json::json!({
        "response": text,
        "choices": ["A", "B", "C", "D"],
    })
    .to_string()
}

// =============================================================================
// CONVERSATION FLOW
// =============================================================================

#[tokio::test]
async fn test_full_conversation() {
    let harness = TestHarness::new(vec![
        "魔法学院的邂逅".to_string(),
        OPENING.to_string(),
        reply("你笑起来真好看。"),
        reply("……好吧。"),
        reply("再见。"),
    ]);

    let start = harness.engine.start("s1", Some("auto"), None).await.unwrap();
    assert_eq!(start.theme, "魔法学院的邂逅");
    assert_eq!(start.affection, 50);

    // Picking the offered choices walks affection through +3, -1, -3.
    let first = harness
        .engine
        .continue_dialogue("s1", &start.choices[0], None)
        .await
        .unwrap();
    assert_eq!(first.affection, 53);
    assert_eq!(first.character_response, "你笑起来真好看。");

    let second = harness
        .engine
        .continue_dialogue("s1", &start.choices[2], None)
        .await
        .unwrap();
    assert_eq!(second.affection, 52);

    let third = harness
        .engine
        .continue_dialogue("s1", &start.choices[3], None)
        .await
        .unwrap();
    assert_eq!(third.affection, 49);

    let session = harness.store().get("s1").await.unwrap();
    let roles: Vec<Role> = session.history.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::Character,
            Role::User,
            Role::Character,
            Role::User,
            Role::Character,
            Role::User,
            Role::Character,
        ]
    );
    assert_eq!(harness.provider().remaining(), 0);
}

#[tokio::test]
async fn test_restart_replaces_session() {
    let harness = TestHarness::new(vec![
        OPENING.to_string(),
        reply("嗯。"),
        OPENING.to_string(),
    ]);

    harness.engine.start("s1", Some("old"), None).await.unwrap();
    harness
        .engine
        .continue_dialogue("s1", "选项A：微笑", None)
        .await
        .unwrap();

    let restarted = harness.engine.start("s1", Some("new"), None).await.unwrap();
    assert_eq!(restarted.affection, 50);

    let info = harness.engine.session_info("s1").await.unwrap();
    assert_eq!(info.theme, "new");
    assert_eq!(info.history_length, 1);
}

#[tokio::test]
async fn test_history_capped_at_max() {
    let provider = MockProvider::with_replies(
        std::iter::once(OPENING.to_string()).chain((0..5).map(|i| reply(&format!("r{i}")))),
    );
    let harness = TestHarness::with_store_limits(provider, 3600, 4);

    harness.engine.start("s1", Some("t"), None).await.unwrap();
    for i in 0..5 {
        harness
            .engine
            .continue_dialogue("s1", &format!("say {i}"), None)
            .await
            .unwrap();
    }

    let session = harness.store().get("s1").await.unwrap();
    let contents: Vec<&str> = session.history.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["say 3", "r3", "say 4", "r4"]);
}

// =============================================================================
// MESSY MODEL OUTPUT
// =============================================================================

#[tokio::test]
async fn test_fenced_json_reply() {
    let fenced = "当然！\n```json\n{\"response\": \"我也是。\", \"choices\": [\"1\", \"2\", \"3\", \"4\"]}\n```";
    let harness = TestHarness::new(vec![OPENING, fenced]);
    harness.engine.start("s1", Some("t"), None).await.unwrap();

    let turn = harness
        .engine
        .continue_dialogue("s1", "我喜欢你", None)
        .await
        .unwrap();
    assert_eq!(turn.character_response, "我也是。");
    assert_eq!(turn.choices, ["1", "2", "3", "4"].map(String::from));
    assert_eq!(turn.affection, 51);
}

#[tokio::test]
async fn test_labeled_text_reply() {
    let labeled = "她愣了一下。\nA. 道歉\nB. 解释\nC. 转移话题\nD. 什么都不说";
    assert_eq!(normalize(labeled).strategy, Strategy::LabeledSegments);

    let harness = TestHarness::new(vec![OPENING, labeled]);
    harness.engine.start("s1", Some("t"), None).await.unwrap();

    let turn = harness
        .engine
        .continue_dialogue("s1", "随便", None)
        .await
        .unwrap();
    assert_eq!(turn.character_response, "她愣了一下。");
    assert_eq!(turn.choices, ["道歉", "解释", "转移话题", "什么都不说"].map(String::from));
    assert_eq!(turn.affection, 50);

    let session = harness.store().get("s1").await.unwrap();
    assert_eq!(session.history.back().unwrap().content, "她愣了一下。");
}

// =============================================================================
// FAILURES AND EXPIRY
// =============================================================================

#[tokio::test]
async fn test_theme_generation_failure() {
    let harness = TestHarness::with_provider(
        MockProvider::new().with_failure(ProviderError::Unavailable("connection refused".into())),
    );

    let err = harness.engine.start("s1", None, None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "generate_theme failed: provider unreachable: connection refused"
    );
    assert_eq!(harness.provider().call_count(), 1);
    assert!(harness.store().is_empty().await);
}

#[tokio::test]
async fn test_idle_session_expires() {
    let harness = TestHarness::with_store_limits(MockProvider::with_replies([OPENING]), 60, 50);
    harness.engine.start("s1", Some("t"), None).await.unwrap();

    harness.clock.advance_secs(60);
    assert!(harness.engine.session_info("s1").await.is_ok());

    harness.clock.advance_secs(61);
    let err = harness
        .engine
        .continue_dialogue("s1", "还在吗？", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DialogueError::NotFound(ref id) if id == "s1"));
    assert_eq!(harness.provider().call_count(), 1);
}

#[tokio::test]
async fn test_sweep_removes_only_idle_sessions() {
    let harness = TestHarness::with_store_limits(
        MockProvider::with_replies([OPENING.to_string(), OPENING.to_string(), reply("嗯")]),
        100,
        50,
    );
    harness.engine.start("idle", Some("t"), None).await.unwrap();
    harness.engine.start("active", Some("t"), None).await.unwrap();

    harness.clock.advance_secs(80);
    harness
        .engine
        .continue_dialogue("active", "你好", None)
        .await
        .unwrap();
    harness.clock.advance_secs(80);

    assert_eq!(harness.store().sweep_expired().await, 1);
    assert_eq!(harness.store().len().await, 1);
    assert!(harness.engine.session_info("active").await.is_ok());
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[tokio::test]
async fn test_concurrent_sessions_stay_independent() {
    let sessions = 8;
    let replies = (0..sessions)
        .map(|_| OPENING.to_string())
        .chain((0..sessions).map(|_| reply("好")));
    let harness = TestHarness::new(replies);

    let starts = join_all((0..sessions).map(|_| harness.engine.start_new(Some("t"), None))).await;
    let ids: Vec<String> = starts
        .into_iter()
        .map(|r| r.unwrap().session_id)
        .collect();

    let turns = join_all(ids.iter().enumerate().map(|(i, id)| {
        let choice = if i % 2 == 0 { "选项A" } else { "选项D" };
        harness.engine.continue_dialogue(id, choice, None)
    }))
    .await;

    for (i, turn) in turns.into_iter().enumerate() {
        let expected = if i % 2 == 0 { 53 } else { 47 };
        assert_eq!(turn.unwrap().affection, expected);
    }

    assert_eq!(harness.store().len().await, sessions);
    for id in &ids {
        let info = harness.engine.session_info(id).await.unwrap();
        assert_eq!(info.history_length, 3);
    }
}
