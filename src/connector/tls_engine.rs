use std::path::Path;

use native_tls::{Certificate, Identity};
use tracing::{debug, warn};

use crate::{
    options::TlsOptions,
    utils::{BoxedError, ConnStream, PBF},
};

/// Performs the TLS handshake over an already connected stream.
///
/// On success the stream's transport is replaced by the encrypted one. On
/// failure the stream is unusable and must be closed by the caller.
pub trait TlsEngine: Send + Sync {
    fn enable<'a>(
        &'a self,
        stream: &'a mut ConnStream,
        options: &'a TlsOptions,
    ) -> PBF<'a, Result<(), BoxedError>>;
}

/// Handshakes through the platform TLS library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTlsEngine;

fn is_pkcs12(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("p12" | "pfx")
    )
}

impl NativeTlsEngine {
    async fn build_connector(options: &TlsOptions) -> Result<native_tls::TlsConnector, BoxedError> {
        let mut builder = native_tls::TlsConnector::builder();

        builder.use_sni(options.sni_enabled());
        if !options.verify_peer() || options.allow_self_signed() {
            builder.danger_accept_invalid_certs(true);
        }
        if !options.verify_peer_name() {
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(ca_file) = &options.ca_file {
            let pem = tokio::fs::read(ca_file).await?;
            builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        if let Some(local_cert) = &options.local_cert {
            let cert = tokio::fs::read(local_cert).await?;
            let identity = if is_pkcs12(local_cert) {
                Identity::from_pkcs12(&cert, options.passphrase.as_deref().unwrap_or_default())?
            } else {
                // The key may live in the same PEM file as the certificate.
                let key = match &options.local_pk {
                    Some(local_pk) => tokio::fs::read(local_pk).await?,
                    None => cert.clone(),
                };
                Identity::from_pkcs8(&cert, &key)?
            };
            builder.identity(identity);
        }

        if !options.disable_compression() {
            warn!("TLS compression requested, but native-tls never negotiates it");
        }
        if !options.passthrough.is_empty() {
            debug!(keys = ?options.passthrough.keys().collect::<Vec<_>>(), "ignoring unsupported TLS options");
        }

        Ok(builder.build()?)
    }

    async fn handshake(stream: &mut ConnStream, options: &TlsOptions) -> Result<(), BoxedError> {
        let connector: tokio_native_tls::TlsConnector =
            Self::build_connector(options).await?.into();

        let domain = match &options.peer_name {
            Some(name) => name.clone(),
            None => stream.peer_name().to_string(),
        };
        if options.sni_enabled() && options.sni_server_name.as_deref() != Some(domain.as_str()) {
            warn!(
                domain = %domain,
                sni = ?options.sni_server_name,
                "native-tls sends the verification name as SNI"
            );
        }

        let io = stream.take_io().ok_or("stream already closed")?;
        let tls = connector.connect(&domain, io).await?;
        stream.upgrade(Box::new(tls));
        debug!(domain = %domain, "TLS established");
        Ok(())
    }
}

impl TlsEngine for NativeTlsEngine {
    fn enable<'a>(
        &'a self,
        stream: &'a mut ConnStream,
        options: &'a TlsOptions,
    ) -> PBF<'a, Result<(), BoxedError>> {
        Box::pin(Self::handshake(stream, options))
    }
}
