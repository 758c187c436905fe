//! Message transport capability and the token wrap/unwrap adapter.

pub mod nostr;

use async_trait::async_trait;
use nostr_sdk::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::custodian::Rejection;
use crate::error::{Error, Result};
use crate::keys::{Counterparty, Signer, public_key_hex};
use crate::token::{IncomingToken, Token, TokenBody};

pub use self::nostr::{NostrTransport, NostrTransportConfig};

/// A message waiting in a message box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub message_box: String,
    #[serde(with = "public_key_hex")]
    pub sender: PublicKey,
    /// JSON text.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub recipient: PublicKey,
    pub message_box: String,
    pub body: String,
}

/// Delivery result reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
    pub status: String,
}

/// Store-and-forward message boxes keyed by recipient identity.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, message: OutgoingMessage) -> Result<SendReceipt>;

    /// Unacknowledged messages addressed to this identity, in delivery order.
    async fn list_messages(&self, message_box: &str) -> Result<Vec<Message>>;

    /// Mark messages delivered so they no longer list.
    async fn acknowledge_messages(&self, message_ids: &[String]) -> Result<()>;
}

/// A received message after boundary decoding.
pub type Candidate = std::result::Result<IncomingToken, Rejection>;

/// Wrap a token into a message for `recipient`.
pub fn wrap(token: &Token, recipient: PublicKey) -> Result<OutgoingMessage> {
    Ok(OutgoingMessage {
        recipient,
        message_box: token.message_box.clone(),
        body: serde_json::to_string(&token.body)?,
    })
}

/// Decode a message body into an unvalidated token.
pub fn unwrap(message: Message) -> Result<IncomingToken> {
    let body: TokenBody = serde_json::from_str(&message.body)
        .map_err(|e| Error::MalformedMessage(format!("message {}: {e}", message.message_id)))?;
    Ok(IncomingToken {
        message_id: message.message_id,
        sender: message.sender,
        body,
    })
}

/// Deliver a token to its recipient. Tokens addressed to `Myself` go to the
/// signer's own identity.
pub async fn send<S, T>(signer: &S, transport: &T, token: &Token) -> Result<SendReceipt>
where
    S: Signer + ?Sized,
    T: Transport + ?Sized,
{
    let recipient = match token.recipient {
        Counterparty::Other(pk) => pk,
        Counterparty::Myself => signer.identity_key().await?,
        Counterparty::Anyone => {
            return Err(Error::Counterparty(
                "tokens cannot be delivered to \"anyone\"".into(),
            ));
        }
    };
    let receipt = transport.send_message(wrap(token, recipient)?).await?;
    log::info!(
        "sent token {} to {} as message {}",
        token.txid(),
        hex::encode(recipient.serialize()),
        receipt.message_id
    );
    Ok(receipt)
}

/// Every pending message in `message_box`, decoded. Undecodable bodies come
/// back as rejections so the caller can report them.
pub async fn receive<T: Transport + ?Sized>(transport: &T, message_box: &str) -> Result<Vec<Candidate>> {
    let messages = transport.list_messages(message_box).await?;
    log::debug!("{} pending messages in {message_box}", messages.len());
    Ok(messages
        .into_iter()
        .map(|message| {
            let message_id = message.message_id.clone();
            unwrap(message).map_err(|error| Rejection { message_id, error })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::secp256k1::{Secp256k1, SecretKey};

    fn sender() -> PublicKey {
        let sk = SecretKey::from_slice(&[0x05; 32]).unwrap();
        PublicKey::from_secret_key(&Secp256k1::new(), &sk)
    }

    #[test]
    fn unwrap_rejects_garbage_body() {
        let message = Message {
            message_id: "m1".into(),
            message_box: "todo_inbox".into(),
            sender: sender(),
            body: "{\"transaction\": 5}".into(),
        };
        let err = unwrap(message).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(ref m) if m.contains("m1")));
    }

    #[test]
    fn message_wire_names() {
        let message = Message {
            message_id: "m1".into(),
            message_box: "todo_inbox".into(),
            sender: sender(),
            body: "{}".into(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["messageId"], "m1");
        assert_eq!(json["messageBox"], "todo_inbox");
        assert_eq!(json["sender"], hex::encode(sender().serialize()));
    }
}
