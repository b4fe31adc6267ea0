//! Connected-wallet capability.
//!
//! Discovery and position management need a live ledger and a known wallet.
//! They take a [`WalletSession`], and the only way to get one is
//! [`WalletSession::connect`], so nothing connection-dependent can be built
//! before a wallet is attached.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::ledger::Ledger;
use crate::errors::EngineError;
use crate::types::WalletAddress;

#[derive(Clone)]
pub struct WalletSession {
    address: WalletAddress,
    ledger: Arc<dyn Ledger>,
}

impl WalletSession {
    /// Attach a wallet address to a ledger connection.
    pub fn connect(address: &str, ledger: Arc<dyn Ledger>) -> Result<Self, EngineError> {
        let address = WalletAddress::parse(address)?;
        info!(wallet = %address.short(), "wallet session connected");
        Ok(Self { address, ledger })
    }

    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ledger::mock::MockLedger;

    #[test]
    fn test_connect_normalises_address() {
        let session = WalletSession::connect("0xABC", Arc::new(MockLedger::new())).unwrap();
        assert_eq!(
            session.address().as_str(),
            "0x0000000000000000000000000000000000000000000000000000000000000abc"
        );
    }

    #[test]
    fn test_connect_rejects_bad_address() {
        assert!(WalletSession::connect("not-an-address", Arc::new(MockLedger::new())).is_err());
        assert!(WalletSession::connect("", Arc::new(MockLedger::new())).is_err());
    }
}
