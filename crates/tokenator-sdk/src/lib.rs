pub mod basket;
pub mod config;
pub mod custodian;
pub mod error;
pub mod factory;
mod hex_serde;
pub mod keys;
pub mod ledger;
pub mod pushdrop;
pub mod signer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod token;
mod tokenator;
pub mod transport;
pub mod validator;

// Core types
pub use basket::{TagFilter, TagMode};
pub use config::{DEFAULT_TOKEN_VALUE, ProtocolConfig};
pub use custodian::{AcceptedToken, Processed, ReceiptReport, Rejection};
pub use error::{Error, ErrorKind, Result};
pub use keys::{Counterparty, KeyPath, Signer};
pub use signer::LocalSigner;
pub use token::{
    CustodyMetadata, Envelope, IncomingToken, SpendableToken, Token, TokenBody, TokenOutput,
    TokenTransaction,
};
pub use tokenator::Tokenator;

// Collaborator seams
pub use ledger::{
    ActionInput, ActionOutput, CreateActionArgs, CreateActionResult, Ledger, ListOutputsArgs,
    OutPoint, OutputRecord, ScriptBuf, SubmitDirectArgs, SubmitDirectResult, Transaction, Txid,
};
pub use transport::{
    Candidate, Message, NostrTransport, NostrTransportConfig, OutgoingMessage, SendReceipt,
    Transport,
};

// Re-export for app-layer use
pub use bitcoin;
pub use nostr_sdk;
pub use nostr_sdk::secp256k1::PublicKey;
