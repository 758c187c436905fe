//! Command layer shared by the CLI. Errors cross this boundary as strings.

use nostr_sdk::prelude::{PublicKey, ToBech32};
use serde::Serialize;
use serde_json::Value;
use tokenator_sdk::{
    Counterparty, ErrorKind, Ledger, ReceiptReport, Signer, SpendableToken, TagFilter, Token,
    Tokenator, Transport,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub identity_key: String,
    pub npub: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub txid: String,
    pub vout: u32,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl TokenResponse {
    fn new(token: &Token, message_id: Option<String>) -> Self {
        Self {
            txid: token.txid().to_string(),
            vout: token
                .body
                .transaction
                .outputs
                .first()
                .map(|o| o.vout)
                .unwrap_or_default(),
            recipient: token.recipient.to_string(),
            message_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub message_id: String,
    pub sender: String,
    pub txid: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedResponse {
    pub message_id: String,
    pub reason: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiveResponse {
    pub accepted: Vec<AcceptedResponse>,
    pub rejected: Vec<RejectedResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledgement_error: Option<String>,
}

impl From<ReceiptReport> for ReceiveResponse {
    fn from(report: ReceiptReport) -> Self {
        Self {
            accepted: report
                .accepted
                .into_iter()
                .map(|a| AcceptedResponse {
                    message_id: a.message_id,
                    sender: hex::encode(a.sender.serialize()),
                    txid: a.txid.to_string(),
                })
                .collect(),
            rejected: report
                .rejected
                .into_iter()
                .map(|r| RejectedResponse {
                    message_id: r.message_id,
                    reason: reason(r.error.kind()),
                    error: r.error.to_string(),
                })
                .collect(),
            acknowledgement_error: report.acknowledgement_error.map(|e| e.to_string()),
        }
    }
}

fn reason(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidToken => "invalid_token",
        ErrorKind::InvalidOwnerKey => "invalid_owner_key",
        ErrorKind::Malformed => "malformed",
        ErrorKind::CollaboratorFailure => "collaborator_failure",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub txid: String,
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn parse_payload(payload: &str) -> Result<Value, String> {
    serde_json::from_str(payload).or_else(|_| Ok(Value::String(payload.to_string())))
}

fn parse_recipient(recipient: Option<&str>) -> Result<Option<Counterparty>, String> {
    recipient
        .map(|r| r.parse::<Counterparty>().map_err(|e| e.to_string()))
        .transpose()
}

fn tag_filter(tags: Vec<String>, match_all: bool) -> Option<TagFilter> {
    if tags.is_empty() {
        None
    } else if match_all {
        Some(TagFilter::all(tags))
    } else {
        Some(TagFilter::any(tags))
    }
}

async fn find_token<S, L, T>(
    app: &Tokenator<S, L, T>,
    txid: &str,
    vout: u32,
) -> Result<SpendableToken, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    app.list_tokens(None)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .find(|t| t.txid.to_string() == txid && t.vout == vout)
        .ok_or_else(|| format!("no held token {txid}:{vout}"))
}

// ============================================================================
// Commands
// ============================================================================

pub async fn identity<S, L, T>(app: &Tokenator<S, L, T>) -> Result<IdentityResponse, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    let identity = app.signer().identity_key().await.map_err(|e| e.to_string())?;
    let (xonly, _) = identity.x_only_public_key();
    let npub = PublicKey::from_slice(&xonly.serialize())
        .map_err(|e| format!("nostr key: {e}"))?
        .to_bech32()
        .map_err(|e| format!("bech32 error: {e}"))?;
    Ok(IdentityResponse {
        identity_key: hex::encode(identity.serialize()),
        npub,
    })
}

pub async fn create_token<S, L, T>(
    app: &Tokenator<S, L, T>,
    payload: &str,
    recipient: Option<&str>,
    tags: Vec<String>,
) -> Result<TokenResponse, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    let token = app
        .create_token(parse_payload(payload)?, parse_recipient(recipient)?, tags)
        .await
        .map_err(|e| e.to_string())?;
    Ok(TokenResponse::new(&token, None))
}

pub async fn send_token<S, L, T>(
    app: &Tokenator<S, L, T>,
    payload: &str,
    recipient: Option<&str>,
    tags: Vec<String>,
) -> Result<TokenResponse, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    let (token, receipt) = app
        .send_token(parse_payload(payload)?, parse_recipient(recipient)?, tags)
        .await
        .map_err(|e| e.to_string())?;
    Ok(TokenResponse::new(&token, Some(receipt.message_id)))
}

pub async fn receive_tokens<S, L, T>(app: &Tokenator<S, L, T>) -> Result<ReceiveResponse, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    let report = app.receive_tokens().await.map_err(|e| e.to_string())?;
    Ok(report.into())
}

pub async fn list_tokens<S, L, T>(
    app: &Tokenator<S, L, T>,
    tags: Vec<String>,
    match_all: bool,
) -> Result<Vec<SpendableToken>, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    app.list_tokens(tag_filter(tags, match_all))
        .await
        .map_err(|e| e.to_string())
}

pub async fn redeem_token<S, L, T>(
    app: &Tokenator<S, L, T>,
    txid: &str,
    vout: u32,
    description: Option<String>,
) -> Result<RedeemResponse, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    let token = find_token(app, txid, vout).await?;
    let result = app
        .redeem(&token, description)
        .await
        .map_err(|e| e.to_string())?;
    Ok(RedeemResponse {
        txid: result.txid.to_string(),
    })
}

pub async fn decrypt_token<S, L, T>(
    app: &Tokenator<S, L, T>,
    txid: &str,
    vout: u32,
) -> Result<Value, String>
where
    S: Signer,
    L: Ledger,
    T: Transport,
{
    let token = find_token(app, txid, vout).await?;
    app.decrypt_payload(&token).await.map_err(|e| e.to_string())
}
