use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use super::session::ChatSession;
use crate::conversation::ConversationEvent;

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Keeps the active view in step with the stored log.
///
/// Reloads on every `Updated` event for the active contact, and on a fixed
/// poll for writers that do not publish on this bus. A zero interval turns
/// the poll off.
pub fn spawn_reconciler(session: ChatSession, poll_interval: Duration) -> JoinHandle<()> {
    let events = session.store().bus().subscribe(None);

    tokio::spawn(async move {
        let mut poll = (!poll_interval.is_zero()).then(|| {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                event = events.recv_async() => match event {
                    Ok(ConversationEvent::Updated { contact_id }) => {
                        if session.active_contact().await.as_deref() == Some(contact_id.as_str()) {
                            session.reconcile().await;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => {
                        tracing::debug!("Conversation bus closed; reconciler stopping");
                        break;
                    }
                },
                _ = next_tick(&mut poll) => {
                    session.reconcile().await;
                }
            }
        }
    })
}
