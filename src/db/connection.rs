use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, NoTls, Socket};
use tracing::{debug, error};

use super::query::SaConnection;
use crate::config::{PoolSettings, Settings};
use crate::dialect::Dialect;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub ssl_mode: SslMode,
    /// Accept invalid/self-signed certificates. Only honored for `prefer`
    /// and `require`.
    pub accept_invalid_certs: bool,
    /// Optional path to a custom CA certificate file (PEM format).
    pub ca_cert_path: Option<String>,
    pub connect_timeout_secs: u64,
}

/// libpq `sslmode` values, spelled the same way in settings files.
///
/// `verify-ca` and `verify-full` need a trusted chain; `prefer` and
/// `require` may skip verification with `accept_invalid_certs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    fn strict(&self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }

    /// The mode tokio-postgres understands. Certificate checks for the
    /// `verify-*` modes happen in the TLS connector.
    fn driver_mode(&self) -> &'static str {
        match self {
            SslMode::VerifyCa | SslMode::VerifyFull => "require",
            other => other.as_str(),
        }
    }
}

impl ConnectionConfig {
    /// libpq key=value connection string.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout={}",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            self.ssl_mode.driver_mode(),
            self.connect_timeout_secs
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }

    /// `None` when `connect_timeout_secs` is 0, which libpq reads as no limit.
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn pg_config(&self) -> Result<tokio_postgres::Config> {
        self.connection_string()
            .parse()
            .with_context(|| format!("Invalid connection settings for {}", self.display_string()))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
            connect_timeout_secs: 10,
        }
    }
}

/// Open a single connection and wrap it with `dialect`.
///
/// The driver's connection task is spawned onto the current tokio runtime.
pub async fn connect(
    config: &ConnectionConfig,
    dialect: Arc<Dialect>,
) -> Result<SaConnection<Client>> {
    let client = create_client(config).await?;
    Ok(SaConnection::new(client, dialect))
}

async fn create_client(config: &ConnectionConfig) -> Result<Client> {
    debug!(server = %config.display_string(), ssl_mode = config.ssl_mode.as_str(), "connecting");
    match config.ssl_mode {
        SslMode::Disable => spawn_client(config, NoTls).await,
        _ => spawn_client(config, build_tls_connector(config)?).await,
    }
}

/// Connect with `tls` and drive the connection on a background task.
async fn spawn_client<T>(config: &ConnectionConfig, tls: T) -> Result<Client>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let conn_string = config.connection_string();
    let connecting = tokio_postgres::connect(&conn_string, tls);
    let connected = match config.connect_timeout() {
        Some(timeout) => tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| anyhow::anyhow!("Connection timed out after {:?}", timeout))?,
        None => connecting.await,
    };
    let (client, connection) = connected
        .with_context(|| format!("Failed to connect to PostgreSQL at {}", config.display_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Connection error: {}", e);
        }
    });
    Ok(client)
}

/// Build a TLS connector with appropriate certificate configuration.
///
/// `verify-ca` and `verify-full` always verify, whatever
/// `accept_invalid_certs` says.
fn build_tls_connector(config: &ConnectionConfig) -> Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !config.ssl_mode.strict() {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &config.ca_cert_path {
        let ca_data = std::fs::read(ca_path)
            .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
        for cert in parse_pem_certificates(&ca_data)? {
            builder.add_root_certificate(cert);
        }
    }
    // No custom CA: the system store is used.

    let connector = builder.build().context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Split a PEM bundle into certificates.
fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<native_tls::Certificate>> {
    const END: &str = "-----END CERTIFICATE-----";

    let pem_str =
        std::str::from_utf8(pem_data).context("CA certificate file is not valid UTF-8")?;

    let mut certs = Vec::new();
    let mut rest = pem_str;
    while let Some(start) = rest.find("-----BEGIN CERTIFICATE-----") {
        let Some(end) = rest[start..].find(END) else {
            anyhow::bail!("Unterminated certificate in PEM data");
        };
        let block = &rest[start..start + end + END.len()];
        let cert = native_tls::Certificate::from_pem(block.as_bytes())
            .context("Failed to parse certificate")?;
        certs.push(cert);
        rest = &rest[start + end + END.len()..];
    }

    if certs.is_empty() {
        anyhow::bail!("No valid certificates found in PEM data");
    }
    Ok(certs)
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// A `deadpool-postgres` pool whose connections come out wrapped.
#[derive(Clone)]
pub struct SaPool {
    pool: Pool,
    dialect: Arc<Dialect>,
}

impl SaPool {
    /// Build the pool described by `settings`. No connection is opened
    /// until the first [`acquire`](Self::acquire).
    pub fn new(settings: &Settings) -> Result<Self> {
        let dialect = Arc::new(Dialect::from_config(&settings.dialect));
        Self::with_dialect(&settings.connection, &settings.pool, dialect)
    }

    pub fn with_dialect(
        connection: &ConnectionConfig,
        pool: &PoolSettings,
        dialect: Arc<Dialect>,
    ) -> Result<Self> {
        let pg_config = connection.pg_config()?;
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = if connection.ssl_mode == SslMode::Disable {
            Manager::from_config(pg_config, NoTls, mgr_config)
        } else {
            Manager::from_config(pg_config, build_tls_connector(connection)?, mgr_config)
        };

        let pool = Pool::builder(manager)
            .max_size(pool.max_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(pool.wait_timeout())
            .create_timeout(pool.create_timeout())
            .build()
            .context("Failed to build connection pool")?;
        debug!(
            server = %connection.display_string(),
            max_size = pool.status().max_size,
            "pool created"
        );

        Ok(Self { pool, dialect })
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    /// Check a connection out of the pool.
    pub async fn acquire(&self) -> crate::Result<SaConnection<Object>> {
        let object = self.pool.get().await?;
        Ok(SaConnection::new(object, Arc::clone(&self.dialect)))
    }

    pub fn inner(&self) -> &Pool {
        &self.pool
    }
}
