//! HTTP and HTTPS listeners.
//!
//! HTTPS requires a client certificate that chains to the configured CA.
//! The subject common names of the presented chain are attached to every
//! request as a [`PeerIdentity`] for the gate to check. A monitor task
//! re-reads the certificate files periodically and swaps the TLS
//! configuration when any of them changed; established connections keep
//! the configuration they were accepted with.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::extract::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use parking_lot::RwLock;
use rustls::pki_types::CertificateDer;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info, trace, warn};
use x509_parser::parse_x509_certificate;

use crate::config::TlsPaths;
use crate::gate::PeerIdentity;

/// Shutdown signal shared by the listeners; `true` means stop.
pub type ShutdownRx = watch::Receiver<bool>;

/// TLS acceptor that the certificate monitor can replace.
pub type SharedAcceptor = Arc<RwLock<TlsAcceptor>>;

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("couldn't open {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("couldn't parse {}", path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {}", path.display()));
    }
    Ok(certs)
}

/// Builds the server TLS configuration: TLS 1.2 and 1.3, mandatory client
/// certificates verified against `paths.client_ca`.
pub fn load_tls_config(paths: &TlsPaths) -> Result<ServerConfig> {
    let certs = read_certs(&paths.server_cert)?;
    let key_file = File::open(&paths.server_key)
        .with_context(|| format!("couldn't open {}", paths.server_key.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))?
        .ok_or_else(|| anyhow!("no private key found in {}", paths.server_key.display()))?;

    let mut roots = RootCertStore::empty();
    for ca in read_certs(&paths.client_ca)? {
        roots.add(ca)?;
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .context("failed to create client verifier")?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    info!(
        server_cert = %paths.server_cert.display(),
        client_ca = %paths.client_ca.display(),
        "Loaded TLS configuration"
    );
    Ok(config)
}

pub fn load_acceptor(paths: &TlsPaths) -> Result<SharedAcceptor> {
    let config = load_tls_config(paths)?;
    Ok(Arc::new(RwLock::new(TlsAcceptor::from(Arc::new(config)))))
}

/// Subject common names of a presented certificate chain, leaf first.
pub fn peer_identity(chain: &[CertificateDer<'_>]) -> PeerIdentity {
    let mut common_names = Vec::new();
    for der in chain {
        match parse_x509_certificate(der.as_ref()) {
            Ok((_, cert)) => common_names.extend(
                cert.subject()
                    .iter_common_name()
                    .filter_map(|cn| cn.as_str().ok())
                    .map(str::to_string),
            ),
            Err(e) => warn!(error = %e, "Failed to parse peer certificate"),
        }
    }
    PeerIdentity::new(common_names)
}

/// Serves plain HTTP until shutdown.
pub async fn serve_http(addr: SocketAddr, router: Router, mut shutdown: ShutdownRx) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("couldn't bind {}", addr))?;
    info!(%addr, "http endpoint started");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    info!("http endpoint stopped");
    Ok(())
}

/// Serves HTTPS until shutdown. Each connection takes the acceptor that is
/// current when it arrives.
pub async fn serve_https(
    addr: SocketAddr,
    router: Router,
    acceptor: SharedAcceptor,
    mut shutdown: ShutdownRx,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("couldn't bind {}", addr))?;
    info!(%addr, "https endpoint started");

    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let acceptor = acceptor.read().clone();
        let router = router.clone();
        tokio::spawn(async move {
            let tls = match acceptor.accept(stream).await {
                Ok(tls) => tls,
                Err(e) => {
                    debug!(%peer_addr, error = %e, "TLS handshake failed");
                    return;
                }
            };
            let identity = tls
                .get_ref()
                .1
                .peer_certificates()
                .map(peer_identity)
                .unwrap_or_default();
            trace!(%peer_addr, common_names = ?identity.common_names, "TLS peer accepted");

            let service = router.map_request(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(identity.clone());
                request
            });
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(tls), TowerToHyperService::new(service))
                .await
            {
                debug!(%peer_addr, error = %e, "Connection closed with error");
            }
        });
    }

    info!("https endpoint stopped");
    Ok(())
}

/// Contents of the TLS files at one point in time. Unreadable files are
/// recorded as `None`.
#[derive(Debug, PartialEq, Eq)]
struct CertSnapshot(Vec<Option<Vec<u8>>>);

impl CertSnapshot {
    async fn read(paths: &TlsPaths) -> Self {
        let mut contents = Vec::with_capacity(3);
        for path in [&paths.client_ca, &paths.server_cert, &paths.server_key] {
            contents.push(tokio::fs::read(path).await.ok());
        }
        Self(contents)
    }
}

/// Rebuilds the TLS acceptor whenever one of the certificate files
/// changes. A configuration that fails to load keeps the previous one.
pub async fn monitor_certs(
    paths: TlsPaths,
    interval: Duration,
    acceptor: SharedAcceptor,
    mut shutdown: ShutdownRx,
) {
    let mut previous = CertSnapshot::read(&paths).await;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => return,
        }

        let current = CertSnapshot::read(&paths).await;
        if current == previous {
            trace!("Certificates unchanged");
            continue;
        }
        previous = current;

        info!("Certificates have rolled, reloading TLS configuration");
        match load_tls_config(&paths) {
            Ok(config) => *acceptor.write() = TlsAcceptor::from(Arc::new(config)),
            Err(e) => error!(error = %e, "Failed to reload TLS configuration"),
        }
    }
}
