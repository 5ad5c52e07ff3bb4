//! Client and database fixtures

use std::path::Path;
use std::time::Duration;
use wiremock::MockServer;
use xfsync::client::local_db::LocalDatabase;
use xfsync::client::offline::BackoffStrategy;
use xfsync::client::sync::{ConflictResolver, NetworkStatus};
use xfsync::client::{OfflineClient, OfflineClientBuilder};
use xfsync::shared::SyncConfig;

use super::mock_server::graphql_url;

/// Builder pointed at the mock server with retries that do not sleep
pub fn client_builder(server: &MockServer, database: LocalDatabase, status: NetworkStatus) -> OfflineClientBuilder {
    let config = SyncConfig::builder()
        .endpoint(graphql_url(server))
        .request_timeout_secs(5)
        .build()
        .expect("valid test config");
    OfflineClient::builder(config)
        .database(database)
        .backoff(BackoffStrategy::Fixed { interval_ms: 0 })
        .network_status(status)
}

/// Client backed by an in-memory database
pub async fn create_test_client(server: &MockServer, status: NetworkStatus) -> OfflineClient {
    let database = LocalDatabase::in_memory().await.expect("in-memory database");
    client_builder(server, database, status)
        .build()
        .await
        .expect("client builds")
}

/// Client backed by an in-memory database with a conflict resolver
pub async fn create_client_with_resolver(
    server: &MockServer,
    status: NetworkStatus,
    resolver: ConflictResolver,
) -> OfflineClient {
    let database = LocalDatabase::in_memory().await.expect("in-memory database");
    client_builder(server, database, status)
        .conflict_resolver(resolver)
        .build()
        .await
        .expect("client builds")
}

/// Client backed by a database file, for restart scenarios
pub async fn create_file_client(server: &MockServer, db_path: &Path, status: NetworkStatus) -> OfflineClient {
    let database = LocalDatabase::open(db_path).await.expect("database file opens");
    client_builder(server, database, status)
        .build()
        .await
        .expect("client builds")
}

/// Wait until the queue is empty
pub async fn wait_for_drain(client: &OfflineClient) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while client.pending_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained in time");
}
