use serde::Serialize;
use solana_sdk::commitment_config::CommitmentConfig;
use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use crate::{
    config::{EndpointConfig, SolanaConfig},
    error::{ReclaimError, Result},
    solana::client::{LedgerClient, SolanaRpcClient},
};
use tracing::{debug, info, warn};

/// Read-only view of one endpoint's health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStatus {
    pub url: String,
    pub name: String,
    pub weight: u32,
    pub failure_count: u32,
    pub last_successful: bool,
}

struct Endpoint {
    url: String,
    name: String,
    weight: u32,
    client: Arc<dyn LedgerClient>,
}

struct GatewayState {
    cursor: usize,
    // Indexed like `EndpointGateway::endpoints`
    failure_counts: Vec<u32>,
    last_successful: Option<usize>,
}

/// A live endpoint handed out by the gateway
pub struct Connection {
    url: String,
    name: String,
    client: Arc<dyn LedgerClient>,
}

impl Connection {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("name", &self.name)
            .finish()
    }
}

impl Deref for Connection {
    type Target = dyn LedgerClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

/// Prioritized RPC endpoint list with sticky failover.
///
/// Endpoints are ordered once by descending weight. `acquire_connection` starts
/// at the cursor, which only moves past an endpoint when it fails, so traffic
/// stays on the last endpoint that answered.
pub struct EndpointGateway {
    endpoints: Vec<Endpoint>,
    state: Mutex<GatewayState>,
}

impl EndpointGateway {
    pub fn from_config(config: &SolanaConfig, commitment: CommitmentConfig) -> Result<Self> {
        Self::with_connector(&config.endpoints, |endpoint| {
            Arc::new(SolanaRpcClient::new(&endpoint.url, commitment)) as Arc<dyn LedgerClient>
        })
    }

    /// Build a gateway using `connect` to create the client for each endpoint
    pub fn with_connector<F>(configs: &[EndpointConfig], connect: F) -> Result<Self>
    where
        F: Fn(&EndpointConfig) -> Arc<dyn LedgerClient>,
    {
        if configs.is_empty() {
            return Err(ReclaimError::Config(
                "endpoint gateway requires at least one RPC endpoint".to_string(),
            ));
        }

        let mut ordered = configs.to_vec();
        // Stable: equal weights keep their configured order
        ordered.sort_by(|a, b| b.weight.cmp(&a.weight));

        let endpoints: Vec<Endpoint> = ordered
            .iter()
            .map(|config| Endpoint {
                url: config.url.clone(),
                name: config.display_name(),
                weight: config.weight,
                client: connect(config),
            })
            .collect();

        info!(
            "Endpoint gateway initialized with {} endpoint(s): {}",
            endpoints.len(),
            endpoints.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        let state = GatewayState {
            cursor: 0,
            failure_counts: vec![0; endpoints.len()],
            last_successful: None,
        };

        Ok(Self {
            endpoints,
            state: Mutex::new(state),
        })
    }

    /// Return a connection to the first endpoint, starting at the cursor, whose
    /// liveness probe answers within `timeout`. Fails after one full lap.
    pub async fn acquire_connection(&self, timeout: Duration) -> Result<Connection> {
        let mut tried = Vec::with_capacity(self.endpoints.len());

        for _ in 0..self.endpoints.len() {
            let index = self.state().cursor;
            let endpoint = &self.endpoints[index];

            let outcome = match tokio::time::timeout(timeout, endpoint.client.get_slot()).await {
                Ok(Ok(slot)) => Ok(slot),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("liveness probe timed out after {:?}", timeout)),
            };

            match outcome {
                Ok(slot) => {
                    debug!("Endpoint {} is live at slot {}", endpoint.name, slot);
                    self.record_success(index);
                    return Ok(Connection {
                        url: endpoint.url.clone(),
                        name: endpoint.name.clone(),
                        client: Arc::clone(&endpoint.client),
                    });
                }
                Err(reason) => {
                    warn!("Endpoint {} failed: {}", endpoint.name, reason);
                    tried.push(endpoint.name.clone());
                    self.record_failure(index);
                }
            }
        }

        Err(ReclaimError::AllEndpointsFailed { tried })
    }

    /// Report a failure observed after acquisition (e.g. an RPC call that errored)
    pub fn mark_failed(&self, url: &str) {
        match self.index_of(url) {
            Some(index) => self.record_failure(index),
            None => warn!("mark_failed for unknown endpoint {}", url),
        }
    }

    pub fn mark_successful(&self, url: &str) {
        match self.index_of(url) {
            Some(index) => self.record_success(index),
            None => warn!("mark_successful for unknown endpoint {}", url),
        }
    }

    /// Snapshot of every endpoint in priority order
    pub fn endpoints(&self) -> Vec<EndpointStatus> {
        let state = self.state();
        self.endpoints
            .iter()
            .enumerate()
            .map(|(i, e)| EndpointStatus {
                url: e.url.clone(),
                name: e.name.clone(),
                weight: e.weight,
                failure_count: state.failure_counts[i],
                last_successful: state.last_successful == Some(i),
            })
            .collect()
    }

    pub fn cursor(&self) -> usize {
        self.state().cursor
    }

    fn index_of(&self, url: &str) -> Option<usize> {
        self.endpoints.iter().position(|e| e.url == url)
    }

    fn record_success(&self, index: usize) {
        let mut state = self.state();
        state.failure_counts[index] = 0;
        state.last_successful = Some(index);
        state.cursor = index;
    }

    fn record_failure(&self, index: usize) {
        let len = self.endpoints.len();
        let mut state = self.state();
        state.failure_counts[index] = state.failure_counts[index].saturating_add(1);
        if state.last_successful == Some(index) {
            state.last_successful = None;
        }
        if state.cursor == index {
            state.cursor = (index + 1) % len;
        }
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        // Counters stay usable even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solana::client::MockLedgerClient;
    use std::collections::HashMap;

    fn live(slot: u64) -> Arc<dyn LedgerClient> {
        let mut mock = MockLedgerClient::new();
        mock.expect_get_slot().returning(move || Ok(slot));
        Arc::new(mock)
    }

    fn dead() -> Arc<dyn LedgerClient> {
        let mut mock = MockLedgerClient::new();
        mock.expect_get_slot()
            .returning(|| Err(ReclaimError::TransactionFailed("connection refused".to_string())));
        Arc::new(mock)
    }

    fn gateway(specs: Vec<(&str, u32, Arc<dyn LedgerClient>)>) -> EndpointGateway {
        let configs: Vec<EndpointConfig> = specs
            .iter()
            .map(|(name, weight, _)| EndpointConfig::new(format!("http://{}", name), *name, *weight))
            .collect();
        let clients: HashMap<String, Arc<dyn LedgerClient>> = specs
            .into_iter()
            .map(|(name, _, client)| (format!("http://{}", name), client))
            .collect();
        EndpointGateway::with_connector(&configs, |c| Arc::clone(&clients[&c.url])).unwrap()
    }

    fn failures(gateway: &EndpointGateway) -> Vec<u32> {
        gateway.endpoints().iter().map(|e| e.failure_count).collect()
    }

    #[test]
    fn test_empty_endpoint_list_is_config_error() {
        let result = EndpointGateway::with_connector(&[], |_| live(1));
        assert!(matches!(result, Err(ReclaimError::Config(_))));
    }

    #[test]
    fn test_endpoints_ordered_by_descending_weight() {
        let gw = gateway(vec![("low", 1, live(1)), ("high", 10, live(1)), ("mid", 5, live(1))]);
        let names: Vec<String> = gw.endpoints().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_rotates_past_failing_endpoints_and_sticks() {
        let gw = gateway(vec![("a", 3, dead()), ("b", 2, dead()), ("c", 1, live(42))]);

        let conn = gw.acquire_connection(Duration::from_secs(1)).await.unwrap();
        assert_eq!(conn.name(), "c");
        assert_eq!(conn.get_slot().await.unwrap(), 42);
        assert_eq!(failures(&gw), vec![1, 1, 0]);
        assert_eq!(gw.cursor(), 2);

        // Sticky: the next call goes straight to c without touching a or b
        let conn = gw.acquire_connection(Duration::from_secs(1)).await.unwrap();
        assert_eq!(conn.name(), "c");
        assert_eq!(failures(&gw), vec![1, 1, 0]);
        assert!(gw.endpoints()[2].last_successful);
    }

    #[tokio::test]
    async fn test_all_endpoints_failing_names_every_endpoint() {
        let gw = gateway(vec![("a", 3, dead()), ("b", 2, dead()), ("c", 1, dead())]);

        let err = gw.acquire_connection(Duration::from_secs(1)).await.unwrap_err();
        match err {
            ReclaimError::AllEndpointsFailed { tried } => {
                assert_eq!(tried, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(failures(&gw), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_probe_timeout_counts_as_failure() {
        struct Hanging;

        #[async_trait::async_trait]
        impl LedgerClient for Hanging {
            async fn get_slot(&self) -> Result<u64> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(0)
            }
            async fn get_account(&self, _: &solana_sdk::pubkey::Pubkey) -> Result<Option<solana_sdk::account::Account>> { unimplemented!() }
            async fn get_latest_blockhash(&self) -> Result<solana_sdk::hash::Hash> { unimplemented!() }
            async fn send_transaction(&self, _: &solana_sdk::transaction::Transaction) -> Result<solana_sdk::signature::Signature> { unimplemented!() }
            async fn get_signature_state(&self, _: &solana_sdk::signature::Signature) -> Result<crate::solana::client::SignatureState> { unimplemented!() }
            async fn get_signatures_for_address(
                &self,
                _: &solana_sdk::pubkey::Pubkey,
                _: Option<solana_sdk::signature::Signature>,
                _: usize,
            ) -> Result<Vec<solana_client::rpc_response::RpcConfirmedTransactionStatusWithSignature>> { unimplemented!() }
            async fn get_transaction(
                &self,
                _: &solana_sdk::signature::Signature,
            ) -> Result<Option<solana_transaction_status::EncodedConfirmedTransactionWithStatusMeta>> { unimplemented!() }
        }

        let gw = gateway(vec![("slow", 2, Arc::new(Hanging)), ("fast", 1, live(7))]);
        let conn = gw.acquire_connection(Duration::from_millis(20)).await.unwrap();
        assert_eq!(conn.name(), "fast");
        assert_eq!(failures(&gw), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_out_of_band_reports() {
        let gw = gateway(vec![("a", 2, live(1)), ("b", 1, live(1))]);
        let conn = gw.acquire_connection(Duration::from_secs(1)).await.unwrap();
        assert_eq!(conn.name(), "a");

        gw.mark_failed(conn.url());
        assert_eq!(failures(&gw), vec![1, 0]);
        assert_eq!(gw.cursor(), 1);

        gw.mark_successful("http://a");
        assert_eq!(failures(&gw), vec![0, 0]);
        assert_eq!(gw.cursor(), 0);

        // Unknown URLs are ignored
        gw.mark_failed("http://nowhere");
        assert_eq!(failures(&gw), vec![0, 0]);
    }
}
