//! Local signing of EIP-1559 (type 2) transactions.

use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};
use rlp::RlpStream;
use sha3::{Digest, Keccak256};
use std::fmt;

use super::models::Address;
use crate::error::LedgerError;

const EIP1559_TX_TYPE: u8 = 0x02;

/// Unsigned dynamic-fee transaction with an empty access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Tx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

struct Signature {
    y_parity: u8,
    r: Vec<u8>,
    s: Vec<u8>,
}

impl Eip1559Tx {
    /// `0x02 || rlp([chain_id, nonce, tip, max_fee, gas, to, value, data, [], (y, r, s)?])`
    fn encode(&self, signature: Option<&Signature>) -> Vec<u8> {
        let mut stream = RlpStream::new_list(if signature.is_some() { 12 } else { 9 });
        stream
            .append(&self.chain_id)
            .append(&self.nonce)
            .append(&uint(self.max_priority_fee_per_gas))
            .append(&uint(self.max_fee_per_gas))
            .append(&self.gas_limit)
            .append(&self.to.0.to_vec())
            .append(&uint(self.value))
            .append(&self.data);
        stream.begin_list(0);
        if let Some(sig) = signature {
            stream.append(&sig.y_parity).append(&sig.r).append(&sig.s);
        }

        let body = stream.out();
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(EIP1559_TX_TYPE);
        out.extend_from_slice(&body);
        out
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.encode(None))
    }
}

/// Raw signed transaction, ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Vec<u8>,
    pub hash: [u8; 32],
}

impl SignedTx {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }
}

/// secp256k1 key of the account that writes to the ledger.
#[derive(Clone)]
pub struct TxSigner {
    key: SigningKey,
    address: Address,
}

impl fmt::Debug for TxSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TxSigner {
    /// Load a hex private key, with or without the `0x` prefix.
    pub fn from_hex(raw: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(raw.trim().trim_start_matches("0x"))
            .map_err(|e| LedgerError::Signing(format!("private key is not hex: {}", e)))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| LedgerError::Signing("private key is not a valid secp256k1 scalar".into()))?;
        let address = address_of(key.verifying_key());

        Ok(Self { key, address })
    }

    /// Account derived from the key; its nonce sequences every write.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, tx: &Eip1559Tx) -> Result<SignedTx, LedgerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&tx.signing_hash())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;

        // Nodes only accept low-s signatures; flipping s flips the parity.
        let (signature, recovery_id) = match signature.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
            ),
            None => (signature, recovery_id),
        };

        let signature = Signature {
            y_parity: u8::from(recovery_id.is_y_odd()),
            r: trim_leading_zeros(&signature.r().to_bytes()),
            s: trim_leading_zeros(&signature.s().to_bytes()),
        };
        let raw = tx.encode(Some(&signature));

        Ok(SignedTx {
            hash: keccak256(&raw),
            raw,
        })
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Address(address)
}

/// Minimal big-endian form, which is how RLP encodes integers.
fn uint(value: u128) -> Vec<u8> {
    trim_leading_zeros(&value.to_be_bytes())
}

/// RLP integers carry no leading zero bytes.
fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlp::Rlp;

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn tx(nonce: u64) -> Eip1559Tx {
        Eip1559Tx {
            chain_id: 314159,
            nonce,
            max_priority_fee_per_gas: 50_000,
            max_fee_per_gas: 2_050_000,
            gas_limit: 400_000,
            to: "0x4b1f4d8100e51afe644b189d77784dec225e0596".parse().unwrap(),
            value: 0,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    fn padded(bytes: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        out
    }

    #[test]
    fn test_address_derived_from_key() {
        let signer = TxSigner::from_hex(KEY_ONE).unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );

        let signer =
            TxSigner::from_hex("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318").unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_bad_keys_rejected() {
        assert!(matches!(TxSigner::from_hex("0xnothex"), Err(LedgerError::Signing(_))));
        assert!(matches!(TxSigner::from_hex("0x"), Err(LedgerError::Signing(_))));
        assert!(matches!(
            TxSigner::from_hex(&format!("0x{}", "00".repeat(32))),
            Err(LedgerError::Signing(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = TxSigner::from_hex(KEY_ONE).unwrap();
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
        assert!(!rendered.contains("SigningKey"));
    }

    #[test]
    fn test_signed_tx_layout_and_recovery() {
        let signer = TxSigner::from_hex(KEY_ONE).unwrap();
        let unsigned = tx(42);
        let signed = signer.sign(&unsigned).unwrap();

        assert_eq!(signed.raw[0], EIP1559_TX_TYPE);
        assert_eq!(signed.hash, keccak256(&signed.raw));

        let fields = Rlp::new(&signed.raw[1..]);
        assert_eq!(fields.item_count().unwrap(), 12);
        assert_eq!(fields.val_at::<u64>(0).unwrap(), 314159);
        assert_eq!(fields.val_at::<u64>(1).unwrap(), 42);
        assert_eq!(fields.val_at::<u64>(4).unwrap(), 400_000);
        assert_eq!(fields.val_at::<Vec<u8>>(5).unwrap(), unsigned.to.0.to_vec());
        assert_eq!(fields.val_at::<Vec<u8>>(7).unwrap(), unsigned.data);
        assert_eq!(fields.at(8).unwrap().item_count().unwrap(), 0);

        let y_parity: u8 = fields.val_at(9).unwrap();
        let r: Vec<u8> = fields.val_at(10).unwrap();
        let s: Vec<u8> = fields.val_at(11).unwrap();
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&padded(&r));
        compact[32..].copy_from_slice(&padded(&s));

        let signature = k256::ecdsa::Signature::from_slice(&compact).unwrap();
        assert!(signature.normalize_s().is_none());
        let recovered = VerifyingKey::recover_from_prehash(
            &unsigned.signing_hash(),
            &signature,
            RecoveryId::new(y_parity == 1, false),
        )
        .unwrap();
        assert_eq!(address_of(&recovered), signer.address());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let signer = TxSigner::from_hex(KEY_ONE).unwrap();
        assert_eq!(signer.sign(&tx(7)).unwrap(), signer.sign(&tx(7)).unwrap());
        assert_ne!(signer.sign(&tx(7)).unwrap().hash, signer.sign(&tx(8)).unwrap().hash);
    }
}
