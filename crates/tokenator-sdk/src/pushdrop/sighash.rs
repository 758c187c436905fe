//! Signature digest for token unlocks.
//!
//! Tokens are redeemed with `SIGHASH_NONE | SIGHASH_ANYONECANPAY |
//! SIGHASH_FORKID`, so the digest commits to the spent outpoint, its locking
//! script and amount only. The other inputs and all outputs of the spending
//! transaction are left free for the ledger to fill in.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{Hash, sha256d};
use bitcoin::transaction::Version;
use bitcoin::{OutPoint, Script, Sequence};

pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_FORKID: u8 = 0x40;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Sighash flags used for every token unlock (`0xc2`).
pub const TOKEN_SIGHASH: u8 = SIGHASH_NONE | SIGHASH_FORKID | SIGHASH_ANYONECANPAY;

/// BIP143-layout preimage with prevouts, sequences and outputs zeroed.
///
/// `bitcoin`'s own segwit sighash cache cannot express the fork-id bit and
/// needs the finished spending transaction, so the layout is encoded here
/// field by field.
pub fn preimage(outpoint: &OutPoint, locking_script: &Script, amount: u64, sighash: u8) -> Vec<u8> {
    let zero = sha256d::Hash::all_zeros();
    let mut buf = Vec::with_capacity(160 + locking_script.len());

    buf.extend(serialize(&Version::ONE));
    buf.extend(serialize(&zero)); // hashPrevouts
    buf.extend(serialize(&zero)); // hashSequence
    buf.extend(serialize(outpoint));
    buf.extend(serialize(locking_script));
    buf.extend(serialize(&amount));
    buf.extend(serialize(&Sequence::MAX));
    buf.extend(serialize(&zero)); // hashOutputs
    buf.extend(serialize(&LockTime::ZERO));
    buf.extend(serialize(&(sighash as u32)));
    buf
}

pub fn digest(outpoint: &OutPoint, locking_script: &Script, amount: u64, sighash: u8) -> [u8; 32] {
    sha256d::Hash::hash(&preimage(outpoint, locking_script, amount, sighash)).to_byte_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{ScriptBuf, Txid};

    #[test]
    fn token_sighash_byte() {
        assert_eq!(TOKEN_SIGHASH, 0xc2);
    }

    #[test]
    fn preimage_layout() {
        let outpoint = OutPoint::new(Txid::from_byte_array([0x11; 32]), 2);
        let script = ScriptBuf::from_bytes(vec![0xac; 10]);
        let pre = preimage(&outpoint, &script, 1, TOKEN_SIGHASH);

        // version + 2 zero hashes + outpoint + varint + script + amount
        // + sequence + zero hash + locktime + sighash
        assert_eq!(pre.len(), 4 + 64 + 36 + 1 + 10 + 8 + 4 + 32 + 4 + 4);
        assert_eq!(&pre[68..100], &[0x11; 32]);
        assert_eq!(&pre[pre.len() - 4..], &[0xc2, 0, 0, 0]);
    }

    #[test]
    fn digest_commits_to_amount_and_outpoint() {
        let outpoint = OutPoint::new(Txid::from_byte_array([0x11; 32]), 0);
        let script = ScriptBuf::from_bytes(vec![0xac]);
        let base = digest(&outpoint, &script, 1, TOKEN_SIGHASH);
        assert_ne!(base, digest(&outpoint, &script, 2, TOKEN_SIGHASH));
        assert_ne!(
            base,
            digest(&OutPoint::new(outpoint.txid, 1), &script, 1, TOKEN_SIGHASH)
        );
    }
}
