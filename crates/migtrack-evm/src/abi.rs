//! Minimal ABI helpers: signature hashing and 32-byte word handling.
//!
//! The topic of an EVM event is the keccak256 hash of its canonical
//! signature, e.g. `keccak256("Transfer(address,address,uint256)")`
//! → `0xddf252ad…b3ef`.

use tiny_keccak::{Hasher, Keccak};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// `topics[0]` of an event with the given canonical signature.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// First four bytes of `keccak256(signature)`: the function selector.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Left-pad a 20-byte address to a 32-byte topic (lower-case).
pub fn address_topic(address: &str) -> String {
    let bare = address.strip_prefix("0x").unwrap_or(address);
    format!("0x{:0>64}", bare.to_lowercase())
}

/// The address held in the low 20 bytes of a 32-byte word.
pub fn word_to_address(word: &[u8]) -> String {
    let start = word.len().saturating_sub(20);
    format!("0x{}", hex::encode(&word[start..]))
}
