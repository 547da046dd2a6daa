//! Smart-contract query client abstraction.
//!
//! General CosmWasm pools have no on-host swap model; their quotes are
//! delegated to the pool contract through this client. The core depends
//! only on the trait, never on a concrete transport.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::errors::QuoterError;

/// Raw smart-contract query transport.
#[async_trait]
pub trait WasmClient: Send + Sync {
    /// Executes a smart query against `contract_address` with an
    /// already-serialized request and returns the raw response bytes.
    async fn query(&self, contract_address: &str, request: &[u8]) -> Result<Vec<u8>>;
}

/// Resolves per-pool scaling factors for CosmWasm pools that need them for
/// spot-price normalization.
pub type ScalingFactorGetter = Arc<dyn Fn(u64) -> Result<Vec<u64>, QuoterError> + Send + Sync>;

/// Getter used when no scaling factor source is wired up; always returns
/// the unset sentinel error.
pub fn unset_scaling_factor_getter() -> ScalingFactorGetter {
    Arc::new(|pool_id| Err(QuoterError::ScalingFactorGetterUnset { pool_id }))
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Canned-response client for adapter tests.
    #[derive(Default)]
    pub struct MockWasmClient {
        responses: Mutex<HashMap<String, Vec<u8>>>,
        pub fail_with: Option<String>,
    }

    impl MockWasmClient {
        pub fn with_response(contract_address: &str, response: &[u8]) -> Self {
            let mut responses = HashMap::new();
            responses.insert(contract_address.to_string(), response.to_vec());
            Self {
                responses: Mutex::new(responses),
                fail_with: None,
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                fail_with: Some(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl WasmClient for MockWasmClient {
        async fn query(&self, contract_address: &str, _request: &[u8]) -> Result<Vec<u8>> {
            if let Some(message) = &self.fail_with {
                anyhow::bail!("{message}");
            }
            self.responses
                .lock()
                .expect("mock lock poisoned")
                .get(contract_address)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no canned response for {contract_address}"))
        }
    }
}
