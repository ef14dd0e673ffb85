use anyhow::Result;
use colored::*;
use serde_json::json;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::output::{print_event, TestResult};
use crate::session::SessionUser;
use crate::ws_client::Connection;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn test_connection(
    user1: &SessionUser,
    user2: &SessionUser,
    api_client: &ApiClient,
    cookie_name: &str,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Connection & Presence ===".bright_cyan().bold());

    println!("{} Asking for User 2's presence as User 1...", "→".blue());
    let presence = api_client
        .presence(&user1.cookie(cookie_name), user2.user_id)
        .await?;
    println!(
        "{} User {} online={} connections={}",
        "✓".green(),
        presence.user_id,
        presence.online,
        presence.connections
    );

    if presence.online && presence.connections >= 1 {
        Ok(TestResult::pass("connection", start.elapsed()))
    } else {
        Ok(TestResult::fail(
            "connection",
            format!("Expected User {} to be online", user2.user_id),
            start.elapsed(),
        ))
    }
}

pub async fn test_direct_message(
    _user1: &SessionUser,
    user2: &SessionUser,
    ws1: &mut Connection,
    ws2: &mut Connection,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Direct Message ===".bright_cyan().bold());

    let content = format!("hello {}", Uuid::new_v4());
    println!("{} User 1 sending direct message...", "→".blue());
    ws1.send_json(json!({
        "type": "direct_message",
        "receiver_id": user2.user_id,
        "content": content,
        "request_id": Uuid::new_v4().to_string(),
    }))
    .await?;

    println!(
        "{} Waiting for User 2 to receive direct_message event...",
        "→".blue()
    );

    match ws2.wait_for_event("direct_message", EVENT_TIMEOUT).await {
        Ok(event) => {
            print_event(&ws2.user_label, &event);

            if event.data["content"] != content {
                println!("{} Event data mismatch!", "✗".red());
                return Ok(TestResult::fail(
                    "direct_message",
                    format!("Expected content {:?}, got {}", content, event.data["content"]),
                    start.elapsed(),
                ));
            }

            // Persistence failures come back to the sender as an error event
            if let Err(e) = ws1.expect_silence("error", Duration::from_secs(1)).await {
                return Ok(TestResult::fail(
                    "direct_message",
                    e.to_string(),
                    start.elapsed(),
                ));
            }

            println!("{} Event data verified correctly", "✓".green());
            Ok(TestResult::pass("direct_message", start.elapsed()))
        }
        Err(e) => {
            println!("{} Timeout waiting for event: {}", "✗".red(), e);
            Ok(TestResult::fail(
                "direct_message",
                format!("Timeout: {}", e),
                start.elapsed(),
            ))
        }
    }
}

pub async fn test_group_message(
    ws1: &mut Connection,
    ws2: &mut Connection,
    chat_id: i32,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Group Message ===".bright_cyan().bold());

    let content = format!("hi everyone {}", Uuid::new_v4());
    println!("{} User 1 sending group message to chat {}...", "→".blue(), chat_id);
    ws1.send_json(json!({
        "type": "group_message",
        "chat_id": chat_id,
        "content": content,
    }))
    .await?;

    // Room messages are broadcast, the sender included
    for ws in [ws1, ws2] {
        match ws.wait_for_event("group_message", EVENT_TIMEOUT).await {
            Ok(event) => {
                print_event(&ws.user_label, &event);
                if event.data["content"] != content || event.data["chat_id"] != chat_id {
                    return Ok(TestResult::fail(
                        "group_message",
                        format!("Unexpected payload for {}: {}", ws.user_label, event.data),
                        start.elapsed(),
                    ));
                }
            }
            Err(e) => {
                println!("{} Timeout waiting for event: {}", "✗".red(), e);
                return Ok(TestResult::fail(
                    "group_message",
                    format!("{}: {}", ws.user_label, e),
                    start.elapsed(),
                ));
            }
        }
    }

    println!("{} Both users received the group message", "✓".green());
    Ok(TestResult::pass("group_message", start.elapsed()))
}

pub async fn test_invalid_message(
    user1: &SessionUser,
    api_client: &ApiClient,
    cookie_name: &str,
    ws1: &mut Connection,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Invalid Message ===".bright_cyan().bold());

    println!("{} User 1 sending a frame that is not JSON...", "→".blue());
    ws1.send_raw("this is not a message").await?;

    let event = match ws1.wait_for_event("error", EVENT_TIMEOUT).await {
        Ok(event) => event,
        Err(e) => {
            return Ok(TestResult::fail(
                "invalid_message",
                format!("No error event: {}", e),
                start.elapsed(),
            ))
        }
    };
    print_event(&ws1.user_label, &event);

    if event.data["reason"] != "invalid_message" {
        return Ok(TestResult::fail(
            "invalid_message",
            format!("Unexpected reason {}", event.data["reason"]),
            start.elapsed(),
        ));
    }

    // The connection must survive a bad frame
    let presence = api_client
        .presence(&user1.cookie(cookie_name), user1.user_id)
        .await?;
    if !presence.online {
        return Ok(TestResult::fail(
            "invalid_message",
            "Connection was dropped after an invalid frame".to_string(),
            start.elapsed(),
        ));
    }

    println!("{} Error reported and connection kept open", "✓".green());
    Ok(TestResult::pass("invalid_message", start.elapsed()))
}

pub async fn test_multi_device(
    user2: &SessionUser,
    ws_url: &str,
    cookie_name: &str,
    ws1: &mut Connection,
    ws2: &mut Connection,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Multiple Devices ===".bright_cyan().bold());

    println!("{} Opening a second connection for User 2...", "→".blue());
    let mut second_device = Connection::establish(
        ws_url,
        &user2.cookie(cookie_name),
        "User 2 (second device)".to_string(),
    )
    .await?;

    // Give the server a moment to register the new connection
    tokio::time::sleep(Duration::from_millis(200)).await;

    let content = format!("to every device {}", Uuid::new_v4());
    ws1.send_json(json!({
        "type": "direct_message",
        "receiver_id": user2.user_id,
        "content": content,
    }))
    .await?;

    for ws in [ws2, &mut second_device] {
        match ws.wait_for_event("direct_message", EVENT_TIMEOUT).await {
            Ok(event) if event.data["content"] == content => {
                print_event(&ws.user_label, &event);
            }
            Ok(event) => {
                return Ok(TestResult::fail(
                    "multi_device",
                    format!("Unexpected payload for {}: {}", ws.user_label, event.data),
                    start.elapsed(),
                ))
            }
            Err(e) => {
                return Ok(TestResult::fail(
                    "multi_device",
                    format!("{}: {}", ws.user_label, e),
                    start.elapsed(),
                ))
            }
        }
    }

    second_device.close().await?;

    println!("{} Every device of User 2 received the message", "✓".green());
    Ok(TestResult::pass("multi_device", start.elapsed()))
}
