//! MQTT client construction with TLS support.
//!
//! `ClientBuilder` turns a validated `SourceConfig` (or ad-hoc settings) into
//! a rumqttc `AsyncClient` + `EventLoop` pair. It owns the only part of the
//! crate that touches the filesystem: loading certificate material.
//!
//! # Transport shapes
//!
//! - Plain TCP when no TLS block is configured.
//! - Verified TLS: rumqttc's `TlsConfiguration::Simple` with the CA bytes
//!   (and client cert/key bytes for mutual TLS) loaded from the configured
//!   paths. Parsing happens inside rumqttc at connect time.
//! - Insecure TLS: a rustls `ClientConfig` with a permissive certificate
//!   verifier, for self-signed brokers on a trusted network. Selecting this
//!   logs a warning at build time.

use std::{fs, sync::Arc, time::Duration};

use rumqttc::{AsyncClient, EventLoop, MqttOptions, TlsConfiguration, Transport};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, SignatureScheme,
};
use tracing::warn;

use super::{
    config::{SourceConfig, TlsConfig},
    error::SourceError,
};

/// Default capacity of the client's internal request channel.
const DEFAULT_REQUEST_CAP: usize = 64;

/// Fluent builder for an MQTT client and its event loop.
///
/// The returned `AsyncClient` is cheap to clone and thread-safe; the
/// `EventLoop` must be polled from a single task (the supervisor does this).
pub struct ClientBuilder {
    /// Protocol options: host, port, keep-alive, credentials.
    opts: MqttOptions,

    /// Request channel capacity (pending subscribes/publishes).
    cap: usize,

    /// Optional TLS settings; `None` means plain TCP.
    tls_config: Option<TlsConfig>,
}

impl ClientBuilder {
    /// Creates a builder with minimal settings and a plain TCP transport.
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            opts: MqttOptions::new(client_id, host, port),
            cap: DEFAULT_REQUEST_CAP,
            tls_config: None,
        }
    }

    /// Creates a builder from a validated `SourceConfig`.
    ///
    /// Runs the config's validation rules first, so a builder obtained this
    /// way can only fail later on TLS material problems.
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        use validator::Validate;
        config.validate()?;

        let mut opts = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        opts.set_keep_alive(Duration::from_secs(config.keep_alive));
        opts.set_clean_session(true);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            opts.set_credentials(user.clone(), pass.clone());
        }

        Ok(Self {
            opts,
            cap: DEFAULT_REQUEST_CAP,
            tls_config: config.tls.clone(),
        })
    }

    /// Sets the keep-alive interval in seconds.
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.opts.set_keep_alive(Duration::from_secs(secs));
        self
    }

    /// Sets broker credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    /// Attaches TLS settings.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls_config = Some(tls);
        self
    }

    /// Builds the client and event loop, loading TLS material if configured.
    pub fn build(self) -> Result<(AsyncClient, EventLoop), SourceError> {
        let transport = match &self.tls_config {
            Some(tls) => build_transport(tls)?,
            None => Transport::Tcp,
        };

        let mut opts = self.opts;
        opts.set_transport(transport);

        Ok(AsyncClient::new(opts, self.cap))
    }
}

/// Builds the TLS transport for the configured shape.
fn build_transport(tls: &TlsConfig) -> Result<Transport, SourceError> {
    if tls.insecure {
        warn!("TLS certificate verification is DISABLED for the broker connection");
        return build_insecure_transport(tls);
    }

    let ca_path = tls
        .ca_cert_path
        .as_ref()
        .ok_or_else(|| SourceError::ClientSetup("TLS requires a CA certificate path".into()))?;
    let ca = fs::read(ca_path)?;

    let client_auth = if tls.has_client_auth() {
        // has_client_auth guarantees both paths are present
        let cert = fs::read(tls.client_cert_path.as_ref().unwrap())?;
        let key = fs::read(tls.client_key_path.as_ref().unwrap())?;
        Some((cert, key))
    } else {
        None
    };

    Ok(Transport::Tls(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}

/// Builds a rustls transport that accepts any server certificate.
fn build_insecure_transport(tls: &TlsConfig) -> Result<Transport, SourceError> {
    let builder = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerification));

    let config = if tls.has_client_auth() {
        let certs = load_certs(tls.client_cert_path.as_ref().unwrap())?;
        let key = load_private_key(tls.client_key_path.as_ref().unwrap())?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| SourceError::TlsMaterial(format!("client auth rejected: {e}")))?
    } else {
        builder.with_no_client_auth()
    };

    Ok(Transport::Tls(TlsConfiguration::Rustls(Arc::new(config))))
}

/// Reads all certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, SourceError> {
    let bytes = fs::read(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| SourceError::TlsMaterial(format!("unreadable certificate {path}: {e}")))?;

    if certs.is_empty() {
        return Err(SourceError::TlsMaterial(format!(
            "no certificates found in {path}"
        )));
    }
    Ok(certs)
}

/// Reads the first private key from a PEM file.
fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, SourceError> {
    let bytes = fs::read(path)?;
    rustls_pemfile::private_key(&mut bytes.as_slice())
        .map_err(|e| SourceError::TlsMaterial(format!("unreadable key {path}: {e}")))?
        .ok_or_else(|| SourceError::TlsMaterial(format!("no private key found in {path}")))
}

/// Certificate verifier that accepts everything.
///
/// Only reachable through `TlsConfig { insecure: true }`, which is itself
/// a deliberate operator choice for self-signed LAN brokers.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::TempDir;

    use super::*;

    /// Helper for creating temporary certificate files (RAII cleanup).
    struct TestFiles {
        _temp_dir: TempDir,
        ca_cert: String,
        client_cert: String,
        client_key: String,
    }

    impl TestFiles {
        fn new() -> std::io::Result<Self> {
            let temp_dir = TempDir::new()?;

            let ca_cert = temp_dir.path().join("ca.crt");
            let client_cert = temp_dir.path().join("client.crt");
            let client_key = temp_dir.path().join("client.key");

            File::create(&ca_cert)?.write_all(b"ca certificate content")?;
            File::create(&client_cert)?.write_all(b"client certificate content")?;
            File::create(&client_key)?.write_all(b"client key content")?;

            Ok(TestFiles {
                _temp_dir: temp_dir,
                ca_cert: ca_cert.to_string_lossy().into_owned(),
                client_cert: client_cert.to_string_lossy().into_owned(),
                client_key: client_key.to_string_lossy().into_owned(),
            })
        }
    }

    #[test]
    fn test_build_tcp_client() {
        let result = ClientBuilder::new("test_client", "localhost", 1883).build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_builder_chain_methods() {
        let result = ClientBuilder::new("test_client", "localhost", 1883)
            .keep_alive(30)
            .credentials("user", "pass")
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_tls_client_ca_only() {
        let files = TestFiles::new().expect("Failed to create test files");

        let result = ClientBuilder::new("test_client", "localhost", 8883)
            .with_tls(TlsConfig::with_ca_only(&files.ca_cert))
            .build();

        // Simple transport carries raw bytes; parsing happens at connect
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_tls_client_with_client_auth() {
        let files = TestFiles::new().expect("Failed to create test files");

        let result = ClientBuilder::new("test_client", "localhost", 8883)
            .with_tls(TlsConfig::new(
                &files.ca_cert,
                &files.client_cert,
                &files.client_key,
            ))
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn test_build_tls_missing_ca_file() {
        let result = ClientBuilder::new("test_client", "localhost", 8883)
            .with_tls(TlsConfig::with_ca_only("/nonexistent/ca.crt"))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_build_insecure_tls_without_client_auth() {
        let result = ClientBuilder::new("test_client", "localhost", 8883)
            .with_tls(TlsConfig::insecure())
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn test_build_insecure_tls_with_unparsable_key() {
        let files = TestFiles::new().expect("Failed to create test files");
        let tls = TlsConfig {
            ca_cert_path: None,
            client_cert_path: Some(files.client_cert.clone()),
            client_key_path: Some(files.client_key.clone()),
            insecure: true,
        };

        let result = ClientBuilder::new("test_client", "localhost", 8883)
            .with_tls(tls)
            .build();

        // Dummy files hold no PEM blocks, so material loading must fail
        assert!(matches!(result, Err(SourceError::TlsMaterial(_))));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = SourceConfig {
            topics: vec![],
            ..SourceConfig::default()
        };
        assert!(matches!(
            ClientBuilder::from_config(&config),
            Err(SourceError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_builds() {
        let config = SourceConfig::default();
        let result = ClientBuilder::from_config(&config).unwrap().build();
        assert!(result.is_ok());
    }
}
