mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tinyphone_backend::chat::ChatSession;
use tinyphone_backend::config::AppConfig;
use tinyphone_backend::conversation::ConversationEvent;
use tinyphone_backend::runtime::AppRuntime;
use tinyphone_backend::settings::AiConfigPatch;

use ui::chat::ChatPrinter;
use ui::commands::{Command, EndpointField, HELP};
use ui::contacts::print_contact_list;
use ui::manage::{edit_profile, render_profile, run_lore, run_sticker, run_worldbook};

/// Mirrors bus events onto the terminal: new messages for the open chat,
/// unread badges for the others, and failed replies.
fn spawn_event_printer(runtime: &AppRuntime, printer: Arc<ChatPrinter>) {
    let session = runtime.session.clone();
    let events = runtime.bus.subscribe(None);
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            let active = session.active_contact().await;
            let is_active = active.as_deref() == Some(event.contact_id());
            match event {
                ConversationEvent::Updated { .. } | ConversationEvent::PlaybackFinished { .. }
                    if is_active =>
                {
                    printer.flush(&session).await;
                }
                ConversationEvent::UnreadChanged { contact_id, count } if count > 0 && !is_active => {
                    let name = session.settings().contact(&contact_id).display_name;
                    println!("📩 {} 有 {} 条未读消息", name, count);
                }
                ConversationEvent::ReplyFailed { error, .. } => {
                    println!("⚠️ 发送失败: {}", error);
                }
                _ => {}
            }
        }
    });
}

async fn resolve_contact(session: &ChatSession, target: &str) -> Option<String> {
    let contacts = session.contact_list().await;
    if let Ok(index) = target.parse::<usize>() {
        return contacts
            .get(index.checked_sub(1)?)
            .map(|c| c.profile.id.clone());
    }
    contacts
        .iter()
        .find(|c| c.profile.id == target || c.profile.display_name == target)
        .map(|c| c.profile.id.clone())
}

/// The open contact, or a hint to open one first.
async fn open_contact(session: &ChatSession) -> Option<String> {
    let active = session.active_contact().await;
    if active.is_none() {
        println!("先用 /open 打开一个聊天");
    }
    active
}

async fn send(session: &ChatSession, extra: Option<&str>) {
    match session.trigger_reply(extra).await {
        Ok(Some(_)) => {}
        Ok(None) => println!("（没有要发送的消息）"),
        Err(e) if e.is_configuration() => {
            println!("⚠️ {}。用 /set url|key|model 配置 AI 接口。", e)
        }
        Err(e) => println!("⚠️ {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tinyphone=debug,tinyphone_backend=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Tinyphone starting...");

    let config = AppConfig::load();
    let runtime = AppRuntime::bootstrap(config).context("failed to bootstrap runtime")?;
    let _reconciler = runtime.spawn_reconciler();

    let printer = Arc::new(ChatPrinter::default());
    spawn_event_printer(&runtime, printer.clone());

    let session = runtime.session.clone();
    print_contact_list(&session.contact_list().await);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Contacts => print_contact_list(&session.contact_list().await),
            Command::Open(target) => match resolve_contact(&session, &target).await {
                Some(contact_id) => {
                    session.activate(&contact_id).await;
                    let name = session.settings().contact(&contact_id).display_name;
                    println!("==== {} ====", name);
                    printer.reset(&session).await;
                }
                None => println!("找不到联系人: {}", target),
            },
            Command::Back => {
                session.deactivate().await;
                printer.reset(&session).await;
                print_contact_list(&session.contact_list().await);
            }
            Command::New(input) => match session.settings().create_contact(input.into()) {
                Ok(profile) => println!("已添加 {} [{}]", profile.display_name, profile.id),
                Err(e) => println!("⚠️ {}", e),
            },
            Command::ShowProfile => {
                if let Some(contact_id) = open_contact(&session).await {
                    println!("{}", render_profile(&session.settings().contact(&contact_id)));
                }
            }
            Command::EditProfile(field, value) => {
                if let Some(contact_id) = open_contact(&session).await {
                    println!("{}", edit_profile(session.settings(), &contact_id, field, value));
                }
            }
            Command::Lore(command) => {
                if let Some(contact_id) = open_contact(&session).await {
                    println!("{}", run_lore(session.settings(), &contact_id, command));
                }
            }
            Command::Worldbook(command) => println!("{}", run_worldbook(session.settings(), command)),
            Command::Sticker(command) => println!("{}", run_sticker(session.settings(), command)),
            Command::Clear => {
                if open_contact(&session).await.is_none() {
                    continue;
                }
                session.clear_conversation().await;
                println!("（聊天记录已清空）");
                printer.reset(&session).await;
            }
            Command::Voice { seconds, text } => match session.enqueue_voice(&text, seconds).await {
                Ok(_) => printer.flush(&session).await,
                Err(e) => println!("⚠️ {}", e),
            },
            Command::Send(extra) => send(&session, extra.as_deref()).await,
            Command::Models => match session.list_models().await {
                Ok(models) => {
                    for model in models {
                        println!("  {}", model.id);
                    }
                }
                Err(e) => println!("⚠️ {}", e),
            },
            Command::Set(field, value) => {
                let patch = match field {
                    EndpointField::BaseUrl => AiConfigPatch {
                        base_url: Some(value),
                        ..Default::default()
                    },
                    EndpointField::ApiKey => AiConfigPatch {
                        api_key: Some(value),
                        ..Default::default()
                    },
                    EndpointField::Model => AiConfigPatch {
                        model: Some(value),
                        ..Default::default()
                    },
                };
                session.settings().update_ai_config(patch);
                println!("已保存");
            }
            Command::Say(text) => match session.enqueue(&text).await {
                Ok(_) => printer.flush(&session).await,
                Err(e) => println!("⚠️ {}", e),
            },
            Command::Invalid(message) => println!("{}", message),
        }
    }

    tracing::info!("Tinyphone exiting");
    Ok(())
}
