use lwk_wollet::elements::hashes::{Hash, HashEngine, sha256};
use lwk_wollet::elements::secp256k1_zkp::{Parity, Scalar, Secp256k1, XOnlyPublicKey};
use lwk_wollet::elements::{Address, AddressParams, Script, encode};

use crate::error::{Error, Result};
use crate::network::Network;

/// NUMS (Nothing Up My Sleeve) key, the x-only form of the point
/// `0250929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0`.
/// Nobody knows its discrete log, so the key path of a funding output is unspendable.
pub const NUMS_KEY_BYTES: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

/// Elements tapscript leaf version.
pub const TAPSCRIPT_LEAF_VERSION: u8 = 0xc4;

/// Compute a SHA256 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || data).
pub(crate) fn tagged_hash(tag: &[u8], data: &[u8]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag);
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_ref());
    engine.input(tag_hash.as_ref());
    engine.input(data);
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// The NUMS key as a parsed x-only public key.
pub fn nums_internal_key() -> Result<XOnlyPublicKey> {
    XOnlyPublicKey::from_slice(&NUMS_KEY_BYTES)
        .map_err(|e| Error::ScriptTree(format!("NUMS key: {e}")))
}

/// Compute the tapleaf hash of a tapscript.
///
/// Format: `TaggedHash("TapLeaf/elements", 0xc4 || compact_size(len) || script)`.
pub fn tapleaf_hash(script: &Script) -> [u8; 32] {
    // Consensus encoding of a script is its compact_size length followed by the bytes.
    let encoded = encode::serialize(script);
    let mut leaf_data = Vec::with_capacity(1 + encoded.len());
    leaf_data.push(TAPSCRIPT_LEAF_VERSION);
    leaf_data.extend_from_slice(&encoded);
    tagged_hash(b"TapLeaf/elements", &leaf_data)
}

/// Compute the tapbranch hash from two children (sorted lexicographically).
pub fn tapbranch_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let (a, b) = if left <= right {
        (left, right)
    } else {
        (right, left)
    };
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(a);
    data.extend_from_slice(b);
    tagged_hash(b"TapBranch/elements", &data)
}

/// Compute the taptweak hash. A key with no script tree commits to the key alone.
pub fn taptweak_hash(pubkey: &[u8; 32], merkle_root: Option<&[u8; 32]>) -> [u8; 32] {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(pubkey);
    if let Some(root) = merkle_root {
        data.extend_from_slice(root);
    }
    tagged_hash(b"TapTweak/elements", &data)
}

fn tweak_key(
    internal_key: &XOnlyPublicKey,
    merkle_root: Option<&[u8; 32]>,
) -> Result<(XOnlyPublicKey, Parity)> {
    let tweak = taptweak_hash(&internal_key.serialize(), merkle_root);
    let scalar = Scalar::from_be_bytes(tweak)
        .map_err(|_| Error::ScriptTree("tweak is not a valid scalar".into()))?;
    let secp = Secp256k1::verification_only();
    internal_key
        .add_tweak(&secp, &scalar)
        .map_err(|e| Error::ScriptTree(format!("key tweak failed: {e}")))
}

/// P2TR witness v1 script: `OP_1 <32-byte x-only key>`.
pub fn p2tr_script_pubkey(output_key: &XOnlyPublicKey) -> Script {
    let mut script_bytes = Vec::with_capacity(34);
    script_bytes.push(0x51); // OP_1 (witness version 1)
    script_bytes.push(0x20); // push 32 bytes
    script_bytes.extend_from_slice(&output_key.serialize());
    Script::from(script_bytes)
}

/// Script pubkey of a key-path-only Taproot output for `pubkey` (no script tree).
pub fn key_spend_script_pubkey(pubkey: &XOnlyPublicKey) -> Result<Script> {
    let (output_key, _parity) = tweak_key(pubkey, None)?;
    Ok(p2tr_script_pubkey(&output_key))
}

/// One leaf of a funding tree together with its Merkle path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafProof {
    pub script: Script,
    pub leaf_hash: [u8; 32],
    /// Sibling hashes from the leaf up to the root.
    pub merkle_path: Vec<[u8; 32]>,
}

impl LeafProof {
    /// BIP-341 control block: `(leaf_version | parity) || internal_key || path`.
    pub fn control_block(&self, internal_key: &XOnlyPublicKey, parity: Parity) -> Vec<u8> {
        let parity_bit: u8 = match parity {
            Parity::Even => 0,
            Parity::Odd => 1,
        };
        let mut cb = Vec::with_capacity(33 + 32 * self.merkle_path.len());
        cb.push(TAPSCRIPT_LEAF_VERSION | parity_bit);
        cb.extend_from_slice(&internal_key.serialize());
        for node in &self.merkle_path {
            cb.extend_from_slice(node);
        }
        cb
    }
}

/// A Taproot funding output committing to a fulfill leaf and a refund leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingOutput {
    internal_key: XOnlyPublicKey,
    leaves: [LeafProof; 2],
    merkle_root: [u8; 32],
    output_key: XOnlyPublicKey,
    parity: Parity,
    script_pubkey: Script,
    address: Address,
}

impl FundingOutput {
    /// Build the funding output for `network` under the NUMS internal key.
    pub fn build(fulfill: &Script, refund: &Script, network: Network) -> Result<Self> {
        let internal_key = nums_internal_key()?;
        Self::build_with_internal_key(fulfill, refund, &internal_key, network.address_params())
    }

    pub fn build_with_internal_key(
        fulfill: &Script,
        refund: &Script,
        internal_key: &XOnlyPublicKey,
        params: &'static AddressParams,
    ) -> Result<Self> {
        let fulfill_hash = tapleaf_hash(fulfill);
        let refund_hash = tapleaf_hash(refund);
        let merkle_root = tapbranch_hash(&fulfill_hash, &refund_hash);

        let (output_key, parity) = tweak_key(internal_key, Some(&merkle_root))?;
        let script_pubkey = p2tr_script_pubkey(&output_key);
        let address = Address::from_script(&script_pubkey, None, params)
            .ok_or_else(|| Error::ScriptTree("P2TR script has no address form".into()))?;

        Ok(Self {
            internal_key: *internal_key,
            leaves: [
                LeafProof {
                    script: fulfill.clone(),
                    leaf_hash: fulfill_hash,
                    merkle_path: vec![refund_hash],
                },
                LeafProof {
                    script: refund.clone(),
                    leaf_hash: refund_hash,
                    merkle_path: vec![fulfill_hash],
                },
            ],
            merkle_root,
            output_key,
            parity,
            script_pubkey,
            address,
        })
    }

    pub fn internal_key(&self) -> &XOnlyPublicKey {
        &self.internal_key
    }

    pub fn output_key(&self) -> &XOnlyPublicKey {
        &self.output_key
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn merkle_root(&self) -> &[u8; 32] {
        &self.merkle_root
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.script_pubkey
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Leaves in tree order: fulfill, then refund.
    pub fn leaves(&self) -> &[LeafProof] {
        &self.leaves
    }

    pub fn fulfill_leaf(&self) -> &LeafProof {
        &self.leaves[0]
    }

    pub fn refund_leaf(&self) -> &LeafProof {
        &self.leaves[1]
    }

    /// The proof for the leaf whose script equals `script`.
    pub fn leaf_proof(&self, script: &Script) -> Option<&LeafProof> {
        self.leaves.iter().find(|leaf| leaf.script == *script)
    }

    /// Control block for spending through the leaf whose script equals `script`.
    pub fn control_block(&self, script: &Script) -> Option<Vec<u8>> {
        self.leaf_proof(script)
            .map(|leaf| leaf.control_block(&self.internal_key, self.parity))
    }
}
