use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default output value, in satoshis, locked into every new token.
pub const DEFAULT_TOKEN_VALUE: u64 = 1;

/// Immutable protocol parameters shared by every token operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolConfig {
    /// Protocol identifier used for key derivation and encryption.
    #[serde(rename = "protocolID")]
    pub protocol_id: String,
    /// Key identifier used alongside `protocol_id`.
    #[serde(rename = "keyID")]
    pub key_id: String,
    /// Basket the recipient's store files accepted tokens under.
    pub basket: String,
    /// Transport routing key for token messages.
    pub message_box: String,
    /// Opaque field pushed first into every token script.
    #[serde(with = "crate::hex_serde::bytes")]
    pub protocol_address: Vec<u8>,
    #[serde(default = "default_token_value")]
    pub default_token_value: u64,
}

fn default_token_value() -> u64 {
    DEFAULT_TOKEN_VALUE
}

impl ProtocolConfig {
    /// Build a config where basket and message box are derived from the
    /// protocol identifier, the common layout for single-protocol apps.
    pub fn new(
        protocol_id: impl Into<String>,
        key_id: impl Into<String>,
        protocol_address: impl Into<Vec<u8>>,
    ) -> Self {
        let protocol_id = protocol_id.into();
        let slug = protocol_id.trim().to_lowercase().replace(' ', "_");
        Self {
            basket: format!("{slug}_tokens"),
            message_box: format!("{slug}_inbox"),
            protocol_id,
            key_id: key_id.into(),
            protocol_address: protocol_address.into(),
            default_token_value: DEFAULT_TOKEN_VALUE,
        }
    }

    pub fn with_basket(mut self, basket: impl Into<String>) -> Self {
        self.basket = basket.into();
        self
    }

    pub fn with_message_box(mut self, message_box: impl Into<String>) -> Self {
        self.message_box = message_box.into();
        self
    }

    pub fn with_default_token_value(mut self, value: u64) -> Self {
        self.default_token_value = value;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol_id.trim().is_empty() {
            return Err(Error::Config("protocol identifier is empty".into()));
        }
        if self.key_id.is_empty() {
            return Err(Error::Config("key identifier is empty".into()));
        }
        if self.basket.trim().is_empty() {
            return Err(Error::Config("basket name is empty".into()));
        }
        if self.message_box.trim().is_empty() {
            return Err(Error::Config("message box name is empty".into()));
        }
        if self.protocol_address.is_empty() {
            return Err(Error::Config("protocol address is empty".into()));
        }
        if self.default_token_value == 0 {
            return Err(Error::Config("default token value must be positive".into()));
        }
        Ok(())
    }

    /// Note attached to direct submissions of received tokens.
    pub fn token_note(&self) -> String {
        format!("{} token", self.protocol_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_basket_and_box() {
        let config = ProtocolConfig::new("Todo List", "1", b"1TodoAddr".to_vec());
        assert_eq!(config.basket, "todo_list_tokens");
        assert_eq!(config.message_box, "todo_list_inbox");
        assert_eq!(config.default_token_value, 1);
        config.validate().unwrap();
    }

    #[test]
    fn zero_value_rejected() {
        let config = ProtocolConfig::new("todo", "1", b"addr".to_vec()).with_default_token_value(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn empty_address_rejected() {
        let config = ProtocolConfig::new("todo", "1", Vec::new());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn json_uses_wire_names() {
        let config = ProtocolConfig::new("todo", "1", b"ab".to_vec());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["protocolID"], "todo");
        assert_eq!(json["keyID"], "1");
        assert_eq!(json["protocolAddress"], "6162");

        let parsed: ProtocolConfig = serde_json::from_value(serde_json::json!({
            "protocolID": "todo",
            "keyID": "1",
            "basket": "todo_tokens",
            "messageBox": "todo_inbox",
            "protocolAddress": "6162",
        }))
        .unwrap();
        assert_eq!(parsed, config);
    }
}
