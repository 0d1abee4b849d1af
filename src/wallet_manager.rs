//! In-memory signer built from the base58 `PRIVATE_KEY` env value.
//!
//! The key never leaves this struct; components borrow it for signing.

use anyhow::{anyhow, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Decode a 64-byte base58 secret key into a signer
    pub fn from_base58(private_key: &str) -> Result<Self> {
        let bytes = bs58::decode(private_key.trim())
            .into_vec()
            .map_err(|e| anyhow!("private key is not valid base58: {e}"))?;
        if bytes.len() != 64 {
            return Err(anyhow!(
                "private key decoded to {} bytes, expected 64",
                bytes.len()
            ));
        }
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| anyhow!("private key bytes rejected: {e}"))?;
        info!("🔑 Wallet loaded: {}", keypair.pubkey());
        Ok(Self {
            keypair: Arc::new(keypair),
        })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Arc<Keypair> {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_base58_key() {
        let source = Keypair::new();
        let manager = WalletManager::from_base58(&source.to_base58_string()).unwrap();
        assert_eq!(manager.pubkey(), source.pubkey());
    }

    #[test]
    fn test_rejects_short_key() {
        let short = bs58::encode([1u8; 32]).into_string();
        let err = WalletManager::from_base58(&short).unwrap_err().to_string();
        assert!(err.contains("expected 64"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(WalletManager::from_base58("not-base58-0OIl").is_err());
    }
}
