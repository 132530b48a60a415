use crate::config::settings::HookSettings;
use crate::events::bus::EventBus;
use crate::registry::types::RegistryEvent;

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Forwards lifecycle events to configured chat-style webhooks.
///
/// Consumes one bus subscription in a background task. Every event except
/// `info` maps to a human-readable line; each hook receives the events its
/// allow-list names. Delivery is fire-and-forget: failures are logged and
/// never retried, and can never stall the registry.
pub struct Notifier;

impl Notifier {
    pub fn start(bus: Arc<EventBus>, hooks: Vec<HookSettings>) -> JoinHandle<()> {
        let mut subscription = bus.subscribe();

        tokio::spawn(async move {
            let client = reqwest::Client::new();

            tracing::info!("Notifier started with {} hook(s)", hooks.len());

            while let Some(event) = subscription.recv().await {
                let Some(line) = describe(&event) else {
                    continue;
                };

                let name = event.name();
                for hook in hooks.iter() {
                    if hook.events.iter().any(|allowed| allowed == name) {
                        deliver(&client, &hook.url, &line).await;
                    }
                }
            }
        })
    }
}

/// Human-readable description of an event, or `None` for events that are
/// never forwarded.
pub fn describe(event: &RegistryEvent) -> Option<String> {
    match event {
        RegistryEvent::Register { id } => Some(format!("node {} registered", id)),
        RegistryEvent::Active { id, service, host } => Some(format!(
            "[{}] node {} on {} is active again",
            service, id, host
        )),
        RegistryEvent::Inactive { id, service, host } => Some(format!(
            "[{}] node {} on {} went inactive",
            service, id, host
        )),
        RegistryEvent::Reset { id, service, host } => {
            Some(format!("[{}] node {} on {} restarted", service, id, host))
        }
        RegistryEvent::Retire { id, service, host } => {
            Some(format!("[{}] node {} on {} was retired", service, id, host))
        }
        RegistryEvent::Info { .. } => None,
        RegistryEvent::Error { via, message } => {
            Some(format!("listener {} reported: {}", via, message))
        }
    }
}

async fn deliver(client: &reqwest::Client, url: &str, text: &str) {
    let payload = serde_json::json!({ "text": text });

    match client.post(url).json(&payload).send().await {
        Ok(response) if !response.status().is_success() => {
            tracing::warn!("Hook {} answered {}", url, response.status());
        }
        Ok(_) => {
            tracing::debug!("Delivered notification to {}", url);
        }
        Err(e) => {
            tracing::warn!("Hook {} delivery failed: {}", url, e);
        }
    }
}
