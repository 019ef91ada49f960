/// Inbound message log.
///
/// The bot does not answer messages; it drains the radio's queue whenever
/// the radio signals waiting messages and logs what arrived.
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use wxmesh_transport::{CompanionNode, InboundMessage, MessageOrigin};

/// Human-readable sender of a message.
pub fn describe_origin(origin: &MessageOrigin) -> String {
    match origin {
        MessageOrigin::Contact { pubkey_prefix } => {
            let hex: String = pubkey_prefix.iter().map(|b| format!("{b:02x}")).collect();
            format!("contact {hex}")
        }
        MessageOrigin::Channel { index } => format!("channel {index}"),
    }
}

fn log_message(message: &InboundMessage) {
    let hops = if message.path_len == 0xFF {
        "direct".to_string()
    } else {
        format!("{} hops", message.path_len)
    };
    tracing::info!(
        "inbox: {} ({hops}): {}",
        describe_origin(&message.origin),
        message.text
    );
}

async fn drain(node: &CompanionNode) {
    loop {
        match node.sync_next_message().await {
            Ok(Some(message)) => log_message(&message),
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("inbox: sync failed: {e}");
                return;
            }
        }
    }
}

/// Drain and log on every waiting-message signal until the link closes.
pub async fn run(node: Arc<CompanionNode>) {
    let mut waiting = node.subscribe_msg_waiting();
    // Messages may have queued up before we subscribed.
    drain(&node).await;
    loop {
        match waiting.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => drain(&node).await,
            Err(RecvError::Closed) => {
                tracing::warn!("inbox: radio link closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_origin() {
        let contact = MessageOrigin::Contact {
            pubkey_prefix: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01],
        };
        assert_eq!(describe_origin(&contact), "contact deadbeef0001");
        assert_eq!(describe_origin(&MessageOrigin::Channel { index: 2 }), "channel 2");
    }
}
