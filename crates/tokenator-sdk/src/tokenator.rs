use serde_json::Value;

use crate::basket::{self, TagFilter};
use crate::config::ProtocolConfig;
use crate::custodian::{self, ReceiptReport};
use crate::error::Result;
use crate::factory;
use crate::keys::{Counterparty, Signer};
use crate::ledger::{CreateActionResult, Ledger, SubmitDirectResult};
use crate::token::{IncomingToken, SpendableToken, Token, TokenBody};
use crate::transport::{self, Candidate, SendReceipt, Transport};
use crate::validator;

/// Token lifecycle for one protocol configuration.
///
/// Owns the configuration and the three capabilities it runs on. All
/// operations borrow `&self`; the configuration never changes after
/// construction.
pub struct Tokenator<S, L, T> {
    config: ProtocolConfig,
    signer: S,
    ledger: L,
    transport: T,
}

impl<S, L, T> Tokenator<S, L, T>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    pub fn new(config: ProtocolConfig, signer: S, ledger: L, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            signer,
            ledger,
            transport,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Creation and delivery
    // -----------------------------------------------------------------------

    /// Lock `payload` into a new token. `recipient` defaults to `Myself`.
    pub async fn create_token(
        &self,
        payload: Value,
        recipient: Option<Counterparty>,
        tags: Vec<String>,
    ) -> Result<Token> {
        factory::create_token(
            &self.signer,
            &self.ledger,
            &self.config,
            payload,
            recipient,
            tags,
        )
        .await
    }

    pub async fn send(&self, token: &Token) -> Result<SendReceipt> {
        transport::send(&self.signer, &self.transport, token).await
    }

    /// Create a token and deliver it in one step.
    pub async fn send_token(
        &self,
        payload: Value,
        recipient: Option<Counterparty>,
        tags: Vec<String>,
    ) -> Result<(Token, SendReceipt)> {
        let token = self.create_token(payload, recipient, tags).await?;
        let receipt = self.send(&token).await?;
        Ok((token, receipt))
    }

    // -----------------------------------------------------------------------
    // Receipt
    // -----------------------------------------------------------------------

    /// Pending token messages, decoded but not validated.
    pub async fn receive(&self) -> Result<Vec<Candidate>> {
        transport::receive(&self.transport, &self.config.message_box).await
    }

    pub async fn validate(&self, body: &TokenBody) -> Result<()> {
        validator::validate(&self.signer, body).await
    }

    /// Validate and take one incoming token into custody.
    pub async fn accept(&self, incoming: &IncomingToken) -> Result<SubmitDirectResult> {
        self.validate(&incoming.body).await?;
        custodian::accept(&self.ledger, &self.config, incoming).await
    }

    /// Process every pending message in delivery order and acknowledge the
    /// ones whose tokens were accepted. A failing message never stops the
    /// batch and is never acknowledged.
    ///
    /// Only listing the message box can fail the call. A failed
    /// acknowledgement is recorded in the report next to the tokens already
    /// taken into custody.
    pub async fn receive_tokens(&self) -> Result<ReceiptReport> {
        let candidates = self.receive().await?;

        let mut processed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let outcome = match candidate {
                Ok(incoming) => {
                    custodian::process(&self.signer, &self.ledger, &self.config, incoming).await
                }
                Err(rejection) => {
                    log::warn!(
                        "rejected token message {}: {}",
                        rejection.message_id,
                        rejection.error
                    );
                    custodian::Processed::Rejected(rejection)
                }
            };
            processed.push(outcome);
        }

        let mut report: ReceiptReport = processed.into_iter().collect();
        let accepted = report.accepted_ids();
        if !accepted.is_empty() {
            if let Err(e) = self.transport.acknowledge_messages(&accepted).await {
                log::warn!("could not acknowledge {} token messages: {e}", accepted.len());
                report.acknowledgement_error = Some(e);
            }
        }
        log::info!(
            "received {} tokens, rejected {}",
            report.accepted.len(),
            report.rejected.len()
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Held tokens
    // -----------------------------------------------------------------------

    pub async fn list_tokens(&self, filter: Option<TagFilter>) -> Result<Vec<SpendableToken>> {
        basket::list_tokens(&self.ledger, &self.config, filter).await
    }

    pub async fn redeem(
        &self,
        token: &SpendableToken,
        description: Option<String>,
    ) -> Result<CreateActionResult> {
        custodian::redeem(&self.signer, &self.ledger, &self.config, token, description).await
    }

    pub async fn decrypt_payload(&self, token: &SpendableToken) -> Result<Value> {
        custodian::decrypt_payload(&self.signer, token).await
    }
}
