//! End-to-end conversation flow
//!
//! Drives the command surface against a mocked inference server: chat,
//! page through the reply, regenerate, and check what ends up in history.

use llama_relay::commands::{self, AppContext, ChatCommand, ClearHistoryCommand, Direction};
use llama_relay::config::Config;
use llama_relay::error::AppError;
use llama_relay::formatter::Page;
use llama_relay::pager::ManualClock;
use llama_relay::surface::{BufferedResponder, EmbedColor, ResponderEvent};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn create_test_context(base_url: &str) -> (AppContext, Arc<ManualClock>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.inference.base_url = base_url.to_string();
    config.storage.db_path = temp_dir
        .path()
        .join("nested/history.db")
        .to_string_lossy()
        .to_string();
    config.storage.models_file = temp_dir
        .path()
        .join("models.txt")
        .to_string_lossy()
        .to_string();
    config.presentation.max_response_length = 100;
    let clock = Arc::new(ManualClock::new());
    let ctx = AppContext::new(config, clock.clone()).await.unwrap();
    (ctx, clock, temp_dir)
}

fn reply_body(content: &str) -> String {
    json!({"model": "llama3", "message": {"role": "assistant", "content": content}, "done": true})
        .to_string()
}

#[tokio::test]
async fn test_chat_navigate_regenerate_flow() {
    let mut server = Server::new_async().await;
    let long_reply = "The first sentence is here. The second sentence follows it. \
                      A third one closes the paragraph. And a fourth adds a bit more.\n\
                      ```python\nprint('hi')\n```";
    let first = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3",
            "stream": false,
            "messages": [{"role": "user", "content": "Explain"}]
        })))
        .with_status(200)
        .with_body(reply_body(long_reply))
        .create_async()
        .await;

    let (ctx, _clock, _temp_dir) = create_test_context(&server.url()).await;
    let responder = BufferedResponder::new();

    let view = commands::chat(
        &ctx,
        ChatCommand {
            user_id: 77,
            message: "Explain".to_string(),
            model: Some("llama3".to_string()),
            system_prompt: None,
            temperature: None,
        },
        &responder,
    )
    .await
    .unwrap();
    first.assert_async().await;
    first.remove_async().await;

    // Two text pages of at most 100 characters, then the code page
    assert_eq!(view.total, 3);
    assert!(matches!(view.page, Page::Text { ref title, .. } if title == "AI Response (Part 1)"));

    let mut indexes = Vec::new();
    for direction in [Direction::Next, Direction::Next, Direction::Next, Direction::Previous] {
        let moved = commands::navigate(&ctx, view.pager_id, direction, &responder)
            .await
            .unwrap();
        indexes.push(moved.index);
    }
    assert_eq!(indexes, vec![1, 2, 2, 1]);

    let last = commands::navigate(&ctx, view.pager_id, Direction::Next, &responder)
        .await
        .unwrap();
    assert_eq!(
        last.page,
        Page::Code {
            language: "python".to_string(),
            body: "print('hi')".to_string()
        }
    );
    assert!(!last.controls.next_enabled);

    // Regenerate resends the same history minus the dropped exchange
    let second = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::PartialJson(json!({
            "messages": [{"role": "user", "content": "Explain"}]
        })))
        .with_status(200)
        .with_body(reply_body("Short answer."))
        .create_async()
        .await;

    let regenerated = commands::regenerate(&ctx, view.pager_id, &responder)
        .await
        .unwrap();
    second.assert_async().await;
    assert_eq!(regenerated.total, 1);
    assert_eq!(regenerated.index, 0);
    assert!(!regenerated.controls.previous_enabled);
    assert!(!regenerated.controls.next_enabled);

    let turns = ctx.history.fetch_conversation("llama3", 77).await.unwrap();
    let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["Explain", "Short answer."]);

    assert!(responder
        .events()
        .iter()
        .any(|event| matches!(event, ResponderEvent::Edited(reply)
            if reply.embeds[0].title.as_deref() == Some("Regenerating Response"))));
}

#[tokio::test]
async fn test_chat_uses_last_model_and_system_prompt() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::PartialJson(json!({
            "model": "mistral",
            "messages": [
                {"role": "system", "content": "Answer in French."},
                {"role": "user", "content": "old q"},
                {"role": "assistant", "content": "old a"},
                {"role": "user", "content": "Hello"}
            ],
            "options": {"temperature": 0.5}
        })))
        .with_status(200)
        .with_body(reply_body("Bonjour."))
        .create_async()
        .await;

    let (ctx, _clock, _temp_dir) = create_test_context(&server.url()).await;
    ctx.history
        .append_exchange("mistral", 77, "old q", "old a", 1)
        .await
        .unwrap();

    let responder = BufferedResponder::new();
    let view = commands::chat(
        &ctx,
        ChatCommand {
            user_id: 77,
            message: "Hello".to_string(),
            model: None,
            system_prompt: Some("Answer in French.".to_string()),
            temperature: Some(0.5),
        },
        &responder,
    )
    .await
    .unwrap();

    mock.assert_async().await;
    assert_eq!(view.model, "mistral");

    // The system prompt is sent but never stored
    let turns = ctx.history.fetch_conversation("mistral", 77).await.unwrap();
    assert_eq!(turns.len(), 4);
    assert!(turns.iter().all(|t| t.content != "Answer in French."));
}

#[tokio::test]
async fn test_failed_exchange_then_clear() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(500)
        .with_body("out of memory")
        .create_async()
        .await;

    let (ctx, _clock, _temp_dir) = create_test_context(&server.url()).await;
    ctx.history
        .append_exchange("llama3", 77, "q", "a", 1)
        .await
        .unwrap();

    let responder = BufferedResponder::new();
    let result = commands::chat(
        &ctx,
        ChatCommand {
            user_id: 77,
            message: "Hello".to_string(),
            model: Some("llama3".to_string()),
            system_prompt: None,
            temperature: None,
        },
        &responder,
    )
    .await;

    match result {
        Err(AppError::Server { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "out of memory");
        }
        other => panic!("Expected server error, got {:?}", other.map(|v| v.pager_id)),
    }
    let error_reply = responder.last_reply().unwrap();
    assert_eq!(error_reply.embeds[0].colour, EmbedColor::Red);
    assert_eq!(
        ctx.history.fetch_conversation("llama3", 77).await.unwrap().len(),
        2
    );

    let outcome = commands::clear_history(
        &ctx,
        ClearHistoryCommand {
            user_id: 77,
            model: None,
        },
        &responder,
    )
    .await
    .unwrap();
    assert_eq!(outcome.removed, 2);
}

#[tokio::test]
async fn test_idle_pager_is_swept() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(reply_body("Hi."))
        .create_async()
        .await;

    let (ctx, clock, _temp_dir) = create_test_context(&server.url()).await;
    let responder = BufferedResponder::new();
    let view = commands::chat(
        &ctx,
        ChatCommand {
            user_id: 1,
            message: "Hello".to_string(),
            model: Some("llama3".to_string()),
            system_prompt: None,
            temperature: None,
        },
        &responder,
    )
    .await
    .unwrap();

    clock.advance(Duration::from_secs(899));
    assert_eq!(ctx.pagers.sweep_expired().await, 0);
    clock.advance(Duration::from_secs(1));
    assert_eq!(ctx.pagers.sweep_expired().await, 1);

    let result = commands::regenerate(&ctx, view.pager_id, &responder).await;
    assert!(matches!(result, Err(AppError::Expired(_))));
}
