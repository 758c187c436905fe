use chrono::NaiveDateTime;
use tokenator_sdk::bitcoin::consensus::encode::deserialize;
use tokenator_sdk::bitcoin::hashes::Hash;
use tokenator_sdk::{Envelope, OutPoint, OutputRecord, PublicKey, ScriptBuf, Txid};

use crate::error::StoreError;
use crate::models::{OutputRow, TransactionRow};
use crate::store::StoredTransaction;

/// Format SQLite's `datetime('now')` writes.
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

pub fn vec_to_array32(v: &[u8], field: &str) -> std::result::Result<[u8; 32], StoreError> {
    v.try_into().map_err(|_| {
        StoreError::InvalidData(format!("{field}: expected 32 bytes, got {}", v.len()))
    })
}

pub fn txid_from_row(v: &[u8]) -> crate::Result<Txid> {
    Ok(Txid::from_byte_array(vec_to_array32(v, "txid")?))
}

pub fn unix_seconds(datetime: &str) -> crate::Result<i64> {
    NaiveDateTime::parse_from_str(datetime, SQLITE_DATETIME)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| StoreError::InvalidData(format!("created_at {datetime:?}: {e}")))
}

pub fn satoshis_to_row(satoshis: u64) -> crate::Result<i64> {
    i64::try_from(satoshis)
        .map_err(|_| StoreError::InvalidData(format!("satoshis out of range: {satoshis}")))
}

pub fn satoshis_from_row(v: i64) -> crate::Result<u64> {
    u64::try_from(v).map_err(|_| StoreError::InvalidData(format!("negative satoshis: {v}")))
}

pub fn envelope_to_text(envelope: &Envelope) -> crate::Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

pub fn envelope_from_text(text: Option<&str>) -> crate::Result<Option<Envelope>> {
    text.map(serde_json::from_str::<Envelope>).transpose().map_err(Into::into)
}

// --- Rows -> SDK types ---

impl OutputRow {
    pub fn outpoint(&self) -> crate::Result<OutPoint> {
        Ok(OutPoint::new(txid_from_row(&self.txid)?, self.vout as u32))
    }

    pub fn is_spent(&self) -> bool {
        self.spent != 0
    }

    pub fn into_record(
        self,
        tags: Vec<String>,
        envelope: Option<Envelope>,
    ) -> crate::Result<OutputRecord> {
        Ok(OutputRecord {
            outpoint: self.outpoint()?,
            satoshis: satoshis_from_row(self.satoshis)?,
            created_at: unix_seconds(&self.created_at)?,
            locking_script: ScriptBuf::from_bytes(self.locking_script),
            basket: self.basket,
            tags,
            custom_instructions: self.custom_instructions,
            envelope,
        })
    }
}

impl TryFrom<TransactionRow> for StoredTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> std::result::Result<Self, Self::Error> {
        let sender = row
            .sender_identity
            .as_deref()
            .map(PublicKey::from_slice)
            .transpose()
            .map_err(|e| StoreError::InvalidData(format!("sender_identity: {e}")))?;
        Ok(StoredTransaction {
            txid: txid_from_row(&row.txid)?,
            transaction: deserialize(&row.raw_tx)
                .map_err(|e| StoreError::InvalidData(format!("raw_tx: {e}")))?,
            envelope: envelope_from_text(row.envelope.as_deref())?,
            description: row.description,
            sender,
            note: row.note,
            amount: row.amount.map(satoshis_from_row).transpose()?,
            created_at: unix_seconds(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_timestamps() {
        assert_eq!(unix_seconds("1970-01-01 00:01:40").unwrap(), 100);
        assert!(unix_seconds("yesterday").is_err());
    }

    #[test]
    fn rejects_short_txids() {
        assert!(txid_from_row(&[0u8; 31]).is_err());
        assert!(txid_from_row(&[0u8; 32]).is_ok());
    }
}
