//! Message boxes over Nostr relays.
//!
//! A token message is a regular event of [`MESSAGE_KIND`] authored by the
//! sender, addressed with a `p` tag, routed by a hashtag carrying the message
//! box name and NIP-44 encrypted to the recipient. The sender's compressed
//! identity key travels in an `identity` tag and must match the event author.
//!
//! Acknowledgement is an [`ACK_KIND`] event authored by the recipient that
//! references the acknowledged message events with `e` tags. Listing skips
//! every message the recipient has acknowledged.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use nostr_sdk::secp256k1::PublicKey as IdentityKey;

use super::{Message, OutgoingMessage, SendReceipt, Transport};
use crate::error::{Error, Result};
use crate::keys::parse_public_key;
use crate::signer::LocalSigner;

pub const MESSAGE_KIND: Kind = Kind::Custom(4747);
pub const ACK_KIND: Kind = Kind::Custom(4748);

const IDENTITY_TAG: &str = "identity";
const ACK_TAG: &str = "tokenator-ack";

pub const DEFAULT_RELAYS: &[&str] = &["wss://relay.damus.io", "wss://nos.lol"];

#[derive(Debug, Clone)]
pub struct NostrTransportConfig {
    pub relays: Vec<String>,
    /// Timeout for one-shot fetch operations.
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for NostrTransportConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            fetch_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

pub struct NostrTransport {
    client: Client,
    keys: Keys,
    identity: IdentityKey,
    config: NostrTransportConfig,
}

/// Nostr (x-only) form of an identity key.
fn nostr_key(identity: &IdentityKey) -> Result<PublicKey> {
    let (xonly, _) = identity.x_only_public_key();
    PublicKey::from_slice(&xonly.serialize()).map_err(|e| Error::Transport(e.to_string()))
}

fn tag_values<'a>(event: &'a Event, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    event.tags.iter().filter_map(move |t| {
        let tag_vec = t.as_slice();
        if tag_vec.len() >= 2 && tag_vec[0] == name {
            Some(tag_vec[1].as_str())
        } else {
            None
        }
    })
}

impl NostrTransport {
    pub fn new(signer: &LocalSigner, config: NostrTransportConfig) -> Result<Self> {
        let secret = SecretKey::from_slice(&signer.secret_bytes())
            .map_err(|e| Error::Transport(format!("nostr key: {e}")))?;
        let keys = Keys::new(secret);
        Ok(Self {
            client: Client::new(keys.clone()),
            keys,
            identity: signer.identity(),
            config,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.client.relays().await.is_empty() {
            for url in &self.config.relays {
                self.client
                    .add_relay(url.as_str())
                    .await
                    .map_err(|e| Error::Transport(format!("failed to add relay {url}: {e}")))?;
            }
            self.client
                .connect_with_timeout(self.config.connect_timeout)
                .await;
        }
        Ok(())
    }

    async fn acknowledged_ids(&self) -> Result<HashSet<String>> {
        let filter = Filter::new()
            .kind(ACK_KIND)
            .author(self.keys.public_key())
            .hashtag(ACK_TAG);
        let events = self
            .client
            .fetch_events(vec![filter], self.config.fetch_timeout)
            .await
            .map_err(|e| Error::Transport(format!("failed to fetch acknowledgements: {e}")))?;
        Ok(events
            .iter()
            .flat_map(|event| tag_values(event, "e").map(str::to_string).collect::<Vec<_>>())
            .collect())
    }

    fn parse_message(&self, event: &Event, message_box: &str) -> Result<Message> {
        let identity_hex = tag_values(event, IDENTITY_TAG)
            .next()
            .ok_or_else(|| Error::Transport("message has no identity tag".into()))?;
        let sender = parse_public_key(identity_hex)?;
        if nostr_key(&sender)? != event.pubkey {
            return Err(Error::Transport(
                "identity tag does not match event author".into(),
            ));
        }
        let body = nip44::decrypt(self.keys.secret_key(), &event.pubkey, &event.content)
            .map_err(|e| Error::Transport(format!("cannot decrypt message: {e}")))?;
        Ok(Message {
            message_id: event.id.to_hex(),
            message_box: message_box.to_string(),
            sender,
            body,
        })
    }
}

#[async_trait]
impl Transport for NostrTransport {
    async fn send_message(&self, message: OutgoingMessage) -> Result<SendReceipt> {
        self.ensure_connected().await?;

        let recipient = nostr_key(&message.recipient)?;
        let content = nip44::encrypt(
            self.keys.secret_key(),
            &recipient,
            &message.body,
            nip44::Version::default(),
        )
        .map_err(|e| Error::Transport(format!("cannot encrypt message: {e}")))?;

        let tags = vec![
            Tag::public_key(recipient),
            Tag::hashtag(&message.message_box),
            Tag::custom(
                TagKind::custom(IDENTITY_TAG),
                vec![hex::encode(self.identity.serialize())],
            ),
        ];
        let event = EventBuilder::new(MESSAGE_KIND, content)
            .tags(tags)
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::Transport(format!("failed to sign message: {e}")))?;

        let output = self
            .client
            .send_event(event)
            .await
            .map_err(|e| Error::Transport(format!("failed to send message: {e}")))?;
        Ok(SendReceipt {
            message_id: output.id().to_hex(),
            status: "sent".into(),
        })
    }

    async fn list_messages(&self, message_box: &str) -> Result<Vec<Message>> {
        self.ensure_connected().await?;

        let filter = Filter::new()
            .kind(MESSAGE_KIND)
            .pubkey(self.keys.public_key())
            .hashtag(message_box);
        let events = self
            .client
            .fetch_events(vec![filter], self.config.fetch_timeout)
            .await
            .map_err(|e| Error::Transport(format!("failed to fetch messages: {e}")))?;
        let acknowledged = self.acknowledged_ids().await?;

        let mut pending: Vec<&Event> = events
            .iter()
            .filter(|event| !acknowledged.contains(&event.id.to_hex()))
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut messages = Vec::with_capacity(pending.len());
        for event in pending {
            match self.parse_message(event, message_box) {
                Ok(message) => messages.push(message),
                Err(e) => log::warn!("skipping message event {}: {e}", event.id),
            }
        }
        Ok(messages)
    }

    async fn acknowledge_messages(&self, message_ids: &[String]) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        self.ensure_connected().await?;

        let mut tags = vec![Tag::hashtag(ACK_TAG)];
        for id in message_ids {
            let event_id = EventId::from_hex(id)
                .map_err(|e| Error::Transport(format!("bad message id {id}: {e}")))?;
            tags.push(Tag::event(event_id));
        }
        let event = EventBuilder::new(ACK_KIND, "")
            .tags(tags)
            .sign_with_keys(&self.keys)
            .map_err(|e| Error::Transport(format!("failed to sign acknowledgement: {e}")))?;
        self.client
            .send_event(event)
            .await
            .map_err(|e| Error::Transport(format!("failed to send acknowledgement: {e}")))?;
        log::debug!("acknowledged {} messages", message_ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nostr_key_is_x_only_identity() {
        let signer = LocalSigner::generate();
        let transport = NostrTransport::new(&signer, NostrTransportConfig::default()).unwrap();
        assert_eq!(nostr_key(&signer.identity()).unwrap(), transport.public_key());
    }

    #[tokio::test]
    async fn acknowledging_nothing_is_noop() {
        let signer = LocalSigner::generate();
        let transport = NostrTransport::new(
            &signer,
            NostrTransportConfig {
                relays: vec![],
                ..Default::default()
            },
        )
        .unwrap();
        transport.acknowledge_messages(&[]).await.unwrap();
    }
}
