//! Warehouse access.
//!
//! Redshift speaks the PostgreSQL wire protocol, so the pool is built on
//! tokio-postgres via deadpool-postgres. DDL, COPY and merge statements run
//! through `batch_execute`; each phase opens its own unit of work and
//! commits immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rustls::ClientConfig;
use tokio_postgres::Config as PgConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::config::TargetConfig;
use crate::core::traits::Liveness;
use crate::error::{Result, StageError};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Warehouse connection pool.
pub struct WarehousePool {
    pool: Pool,
    default_schema: String,
}

impl WarehousePool {
    /// Connect with the given pool size.
    pub async fn connect(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode = config.ssl_mode.to_lowercase();
        let pool = match ssl_mode.as_str() {
            "disable" => {
                warn!("Warehouse TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_conns)
                    .build()
                    .map_err(|e| StageError::pool(e, "creating warehouse pool"))?
            }
            _ => {
                let tls_config = build_tls_config(&ssl_mode)?;
                let tls_connector = MakeRustlsConnect::new(tls_config);
                let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_conns)
                    .build()
                    .map_err(|e| StageError::pool(e, "creating warehouse pool"))?
            }
        };

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| StageError::pool(e, "testing warehouse connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to warehouse: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            default_schema: config.schema.clone(),
        })
    }

    async fn get_client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StageError::pool(e, "getting warehouse connection from pool"))
    }

    /// Execute a statement batch in a single implicit transaction.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        let client = self.get_client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    /// Execute a sequence of statements inside one explicit transaction.
    pub async fn execute_in_transaction(&self, statements: &[String]) -> Result<()> {
        let mut client = self.get_client().await?;
        let tx = client.transaction().await?;
        for statement in statements {
            tx.batch_execute(statement).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Check if a table exists, resolving unqualified names against the
    /// configured target schema.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let (schema, name) = match table.split_once('.') {
            Some((s, n)) => (s.to_string(), n.to_string()),
            None => (self.default_schema.clone(), table.to_string()),
        };

        let client = self.get_client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = lower($1) AND table_name = lower($2)
                )",
                &[&schema, &name],
            )
            .await?;

        Ok(row.get::<_, bool>(0))
    }

    /// Exact row count for a target table.
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let client = self.get_client().await?;
        let row = client
            .query_one(&format!("SELECT COUNT(1) FROM {}", table), &[])
            .await?;
        Ok(row.get::<_, i64>(0))
    }
}

#[async_trait]
impl Liveness for WarehousePool {
    async fn ping(&self) -> Result<()> {
        let client = self.get_client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

/// Build the rustls client configuration for the requested ssl_mode.
fn build_tls_config(ssl_mode: &str) -> Result<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = match ssl_mode {
        "require" => {
            warn!("ssl_mode=require: TLS enabled but server certificate is not verified.");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        }
        "verify-ca" | "verify-full" => {
            info!("ssl_mode={}: certificate verification enabled", ssl_mode);
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
        other => {
            return Err(StageError::Config(format!(
                "Invalid ssl_mode '{}'. Valid options: disable, require, verify-ca, verify-full",
                other
            )));
        }
    };

    Ok(config)
}

/// Certificate verifier that accepts any server certificate (ssl_mode=require).
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tls_config_rejects_unknown_mode() {
        assert!(build_tls_config("sometimes").is_err());
        assert!(build_tls_config("require").is_ok());
        assert!(build_tls_config("verify-full").is_ok());
    }
}
