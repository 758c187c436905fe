//! Byte-level PushDrop script layout.
//!
//! ```text
//! <locking key> OP_CHECKSIG <field_0> ... <field_n> <signature> OP_2DROP ... [OP_DROP]
//! ```
//!
//! The key and `OP_CHECKSIG` make the output spendable by whoever can sign
//! for the key; the pushed fields are dropped before the check runs, so they
//! ride along as data. The final push is the creator's signature over the
//! concatenated fields.

use bitcoin::{Script, ScriptBuf};
use nostr_sdk::secp256k1::PublicKey;

use crate::error::{Error, Result};

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_DROP: u8 = 0x75;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_CHECKSIG: u8 = 0xac;

/// Largest payload that fits a direct push opcode.
const MAX_DIRECT_PUSH: usize = 0x4b;

/// Fields recovered from a PushDrop locking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPushDrop {
    pub locking_public_key: PublicKey,
    /// Data fields in push order, signature excluded.
    pub fields: Vec<Vec<u8>>,
    /// Creator signature over the concatenated fields (DER).
    pub signature: Vec<u8>,
}

/// Append a minimally encoded push of `data`.
pub fn push_data(buf: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => buf.push(OP_0),
        1 if (1..=16).contains(&data[0]) => buf.push(OP_1 + data[0] - 1),
        1 if data[0] == 0x81 => buf.push(OP_1NEGATE),
        len if len <= MAX_DIRECT_PUSH => {
            buf.push(len as u8);
            buf.extend_from_slice(data);
        }
        len if len <= 0xff => {
            buf.push(OP_PUSHDATA1);
            buf.push(len as u8);
            buf.extend_from_slice(data);
        }
        len if len <= 0xffff => {
            buf.push(OP_PUSHDATA2);
            buf.extend_from_slice(&(len as u16).to_le_bytes());
            buf.extend_from_slice(data);
        }
        len => {
            buf.push(OP_PUSHDATA4);
            buf.extend_from_slice(&(len as u32).to_le_bytes());
            buf.extend_from_slice(data);
        }
    }
}

/// Assemble a locking script from an already derived key, the data fields and
/// the creator's signature over them.
pub fn build_locking_script(
    locking_key: &PublicKey,
    fields: &[Vec<u8>],
    signature: &[u8],
) -> ScriptBuf {
    let mut buf = Vec::new();
    push_data(&mut buf, &locking_key.serialize());
    buf.push(OP_CHECKSIG);

    for field in fields {
        push_data(&mut buf, field);
    }
    push_data(&mut buf, signature);

    let pushed = fields.len() + 1;
    for _ in 0..pushed / 2 {
        buf.push(OP_2DROP);
    }
    if pushed % 2 == 1 {
        buf.push(OP_DROP);
    }
    ScriptBuf::from_bytes(buf)
}

/// Single push of a DER signature with its sighash byte appended.
pub fn build_unlocking_script(der_signature: &[u8], sighash_type: u8) -> ScriptBuf {
    let mut sig = der_signature.to_vec();
    sig.push(sighash_type);
    let mut buf = Vec::new();
    push_data(&mut buf, &sig);
    ScriptBuf::from_bytes(buf)
}

enum Chunk<'a> {
    Push(std::borrow::Cow<'a, [u8]>),
    Op(u8),
}

struct ChunkReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::Script(format!(
                    "push of {n} bytes at offset {} runs past end of script",
                    self.pos
                ))
            })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>> {
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }
        let op = self.take(1)?[0];
        let chunk = match op {
            OP_0 => Chunk::Push(Vec::new().into()),
            1..=0x4b => Chunk::Push(self.take(op as usize)?.into()),
            OP_PUSHDATA1 => {
                let len = self.take(1)?[0] as usize;
                Chunk::Push(self.take(len)?.into())
            }
            OP_PUSHDATA2 => {
                let b = self.take(2)?;
                let len = u16::from_le_bytes([b[0], b[1]]) as usize;
                Chunk::Push(self.take(len)?.into())
            }
            OP_PUSHDATA4 => {
                let b = self.take(4)?;
                let len = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize;
                Chunk::Push(self.take(len)?.into())
            }
            OP_1NEGATE => Chunk::Push(vec![0x81].into()),
            OP_1..=OP_16 => Chunk::Push(vec![op - OP_1 + 1].into()),
            other => Chunk::Op(other),
        };
        Ok(Some(chunk))
    }
}

/// Parse a PushDrop locking script.
pub fn decode_locking_script(script: &Script) -> Result<DecodedPushDrop> {
    let mut reader = ChunkReader::new(script.as_bytes());

    let key_bytes = match reader.next_chunk()? {
        Some(Chunk::Push(bytes)) => bytes,
        _ => return Err(Error::Script("script does not start with a key push".into())),
    };
    let locking_public_key = PublicKey::from_slice(&key_bytes)
        .map_err(|e| Error::Script(format!("invalid locking key: {e}")))?;

    match reader.next_chunk()? {
        Some(Chunk::Op(OP_CHECKSIG)) => {}
        _ => return Err(Error::Script("expected OP_CHECKSIG after locking key".into())),
    }

    let mut pushes: Vec<Vec<u8>> = Vec::new();
    let mut dropped = 0usize;
    while let Some(chunk) = reader.next_chunk()? {
        match chunk {
            Chunk::Push(data) if dropped == 0 => pushes.push(data.into_owned()),
            Chunk::Op(OP_2DROP) => dropped += 2,
            Chunk::Op(OP_DROP) => dropped += 1,
            Chunk::Push(_) => {
                return Err(Error::Script("data push after drop opcodes".into()));
            }
            Chunk::Op(op) => {
                return Err(Error::Script(format!("unexpected opcode 0x{op:02x}")));
            }
        }
    }

    if dropped != pushes.len() {
        return Err(Error::Script(format!(
            "{} fields pushed but {dropped} dropped",
            pushes.len()
        )));
    }
    let signature = pushes
        .pop()
        .ok_or_else(|| Error::Script("script carries no signature field".into()))?;

    Ok(DecodedPushDrop {
        locking_public_key,
        fields: pushes,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::secp256k1::{Secp256k1, SecretKey};

    fn key() -> PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0x07; 32]).unwrap();
        PublicKey::from_secret_key(&secp, &sk)
    }

    fn pushed(data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        push_data(&mut buf, data);
        buf
    }

    #[test]
    fn push_encoding_boundaries() {
        assert_eq!(pushed(&[]), vec![OP_0]);
        assert_eq!(pushed(&[0x01]), vec![OP_1]);
        assert_eq!(pushed(&[0x10]), vec![OP_16]);
        assert_eq!(pushed(&[0x81]), vec![OP_1NEGATE]);
        assert_eq!(pushed(&[0x00]), vec![0x01, 0x00]);
        assert_eq!(pushed(&[0x11]), vec![0x01, 0x11]);

        assert_eq!(pushed(&[0xaa; 75])[0], 75);
        assert_eq!(&pushed(&[0xaa; 76])[..2], &[OP_PUSHDATA1, 76]);
        assert_eq!(&pushed(&[0xaa; 255])[..2], &[OP_PUSHDATA1, 255]);
        assert_eq!(&pushed(&[0xaa; 256])[..3], &[OP_PUSHDATA2, 0x00, 0x01]);
        assert_eq!(&pushed(&[0xaa; 65535])[..3], &[OP_PUSHDATA2, 0xff, 0xff]);
        assert_eq!(
            &pushed(&vec![0xaa; 65536])[..5],
            &[OP_PUSHDATA4, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn decode_recovers_fields_and_key() {
        let fields = vec![
            b"1TodoAddr".to_vec(),
            vec![0x01],
            Vec::new(),
            vec![0xcd; 300],
        ];
        let script = build_locking_script(&key(), &fields, &[0x30; 70]);
        let decoded = decode_locking_script(&script).unwrap();
        assert_eq!(decoded.locking_public_key, key());
        assert_eq!(decoded.fields, fields);
        assert_eq!(decoded.signature, vec![0x30; 70]);
    }

    #[test]
    fn drop_count_matches_push_count() {
        // two fields + signature = three pushes -> OP_2DROP OP_DROP
        let script = build_locking_script(&key(), &[vec![1, 2], vec![3, 4]], &[5, 6]);
        let bytes = script.as_bytes();
        assert_eq!(&bytes[bytes.len() - 2..], &[OP_2DROP, OP_DROP]);

        // one field + signature = two pushes -> OP_2DROP
        let script = build_locking_script(&key(), &[vec![1, 2]], &[5, 6]);
        assert_eq!(*script.as_bytes().last().unwrap(), OP_2DROP);
    }

    #[test]
    fn truncated_script_rejected() {
        let script = build_locking_script(&key(), &[vec![0xee; 100]], &[0x30; 70]);
        let cut = ScriptBuf::from_bytes(script.as_bytes()[..60].to_vec());
        assert!(matches!(
            decode_locking_script(&cut),
            Err(Error::Script(_))
        ));
    }

    #[test]
    fn mismatched_drops_rejected() {
        let mut bytes = build_locking_script(&key(), &[vec![1, 2]], &[5, 6]).into_bytes();
        bytes.push(OP_DROP);
        assert!(decode_locking_script(&ScriptBuf::from_bytes(bytes)).is_err());
    }

    #[test]
    fn non_pushdrop_script_rejected() {
        // P2PKH-shaped script
        let mut bytes = vec![0x76, 0xa9, 0x14];
        bytes.extend_from_slice(&[0u8; 20]);
        bytes.extend_from_slice(&[0x88, 0xac]);
        assert!(decode_locking_script(&ScriptBuf::from_bytes(bytes)).is_err());
    }

    #[test]
    fn unlocking_script_appends_sighash_byte() {
        let script = build_unlocking_script(&[0x30, 0x44], 0xc2);
        assert_eq!(script.as_bytes(), &[0x03, 0x30, 0x44, 0xc2]);
    }
}
