//! Serde adapters that carry binary fields as lowercase hex strings.
//!
//! The `bitcoin` types are written in their display forms: txids
//! byte-reversed, scripts and transactions as consensus hex.

pub mod bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }
}

pub mod txid {
    use bitcoin::Txid;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(txid: &Txid, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(txid)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Txid, D::Error> {
        let s = String::deserialize(d)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}

/// `txid:vout`.
pub mod outpoint {
    use bitcoin::OutPoint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(outpoint: &OutPoint, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(outpoint)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OutPoint, D::Error> {
        let s = String::deserialize(d)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}

pub mod script {
    use bitcoin::ScriptBuf;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(script: &ScriptBuf, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(script.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ScriptBuf, D::Error> {
        let s = String::deserialize(d)?;
        crate::ledger::script_from_hex(&s).map_err(serde::de::Error::custom)
    }
}

pub mod transaction {
    use bitcoin::Transaction;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tx: &Transaction, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&crate::ledger::transaction_to_hex(tx))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Transaction, D::Error> {
        let s = String::deserialize(d)?;
        crate::ledger::transaction_from_hex(&s).map_err(serde::de::Error::custom)
    }
}
