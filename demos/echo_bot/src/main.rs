//! Echo Bot
//!
//! A small bot showing handler ordering and short-circuiting:
//!
//! - every message is logged first and passed on
//! - `/ping`, `/echo <text>` and `/help` answer and stop the chain
//! - friend requests are accepted, new group members are greeted
//!
//! # Usage
//!
//! Put the server address and credentials in `mirai.toml`:
//!
//! ```toml
//! [connection]
//! base_url = "http://127.0.0.1:8080"
//! verify_key = "INITKEYxxxxxx"
//! qq = 123456789
//! ```
//!
//! or export `MIRAI_CONNECTION__VERIFY_KEY` and `MIRAI_CONNECTION__QQ`, then:
//!
//! ```bash
//! cargo run --package echo-bot
//! ```

use anyhow::Result;
use mirai::core::{MessageTarget, NewFriendRequestResponse};
use mirai::prelude::*;
use tracing::info;

const HELP: &str = "/echo <text> - Echo text\n/ping - Pong!\n/help - This help";

/// Logs every message and lets later handlers see it.
async fn log_message(event: Arc<Event>, _bot: Arc<Bot>) {
    match event.as_ref() {
        Event::FriendMessage(m) => {
            info!("[Friend] {} ({}): {}", m.sender.nickname, m.sender.id, m.message_chain);
        }
        Event::GroupMessage(m) | Event::TempMessage(m) => {
            info!(
                "[Group {}] {} ({}): {}",
                m.sender.group.id, m.sender.member_name, m.sender.id, m.message_chain
            );
        }
        _ => {}
    }
}

/// Answers the built-in commands; returns `true` when one matched.
async fn commands(event: Arc<Event>, bot: Arc<Bot>) -> Result<bool> {
    let text = event.plain_text();
    let text = text.trim();

    if text == "/ping" {
        bot.reply(&event, "Pong!", false).await?;
    } else if let Some(content) = text.strip_prefix("/echo ") {
        bot.reply(&event, content, true).await?;
    } else if text == "/help" {
        bot.reply(&event, HELP, false).await?;
    } else {
        return Ok(false);
    }
    Ok(true)
}

async fn accept_friends(event: Arc<Event>, bot: Arc<Bot>) -> Result<()> {
    if let Event::NewFriendRequestEvent(request) = event.as_ref() {
        info!(supplicant = request.supplicant, nickname = %request.nickname, "Accepting friend request");
        bot.respond_friend_request(request, NewFriendRequestResponse::Accept, "")
            .await?;
    }
    Ok(())
}

async fn greet_member(event: Arc<Event>, bot: Arc<Bot>) -> Result<()> {
    if let Event::MemberJoinEvent(joined) = event.as_ref() {
        let chain = MessageChain::new()
            .at(joined.member.id)
            .plain(format!(" Welcome to {}!", joined.member.group.name));
        bot.send_message(MessageTarget::Group(joined.member.group.id), chain, None)
            .await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut runtime = MiraiRuntime::builder().build()?;

    runtime
        .dispatcher_mut()
        .on_message(log_message)
        .on_message(commands)
        .on(EventKind::NewFriendRequestEvent, accept_friends)
        .on(EventKind::MemberJoinEvent, greet_member);

    runtime.run().await?;
    Ok(())
}
