//! An in-memory certificate authority: one root keypair generated fresh at
//! startup, and a cache of per-SNI leaf certificates minted on demand as
//! the TLS handler terminates connections. Nothing here is written to
//! disk except the root certificate itself, and only if the caller asks
//! for it (see [`crate::trust_store`]).

use std::sync::Arc;

use dashmap::DashMap;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyUsagePurpose};
use rustls::sign::CertifiedKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaError {
    #[error("failed to generate certificate: {0}")]
    Generation(#[from] rcgen::RcgenError),
    #[error("failed to load signing key: {0}")]
    SigningKey(#[from] rustls::Error),
}

pub struct CertificateAuthority {
    root: Certificate,
    root_der: Vec<u8>,
    leaves: DashMap<String, Arc<CertifiedKey>>,
}

impl CertificateAuthority {
    /// Generates a fresh root keypair and self-signed certificate.
    pub fn generate() -> Result<Self, CaError> {
        let mut params = CertificateParams::default();
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, "interceptor local CA");
        name.push(DnType::OrganizationName, "interceptor");
        params.distinguished_name = name;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let root = Certificate::from_params(params)?;
        let root_der = root.serialize_der()?;
        Ok(Self {
            root,
            root_der,
            leaves: DashMap::new(),
        })
    }

    /// The root certificate, PEM-encoded, for installation into a trust
    /// store.
    pub fn root_cert_pem(&self) -> String {
        self.root.serialize_pem().unwrap_or_default()
    }

    /// Returns the leaf certificate for `sni`, minting and caching one
    /// signed by the root if this is the first request for that name.
    pub fn certificate_for(&self, sni: &str) -> Result<Arc<CertifiedKey>, CaError> {
        if let Some(existing) = self.leaves.get(sni) {
            return Ok(Arc::clone(existing.value()));
        }

        let mut params = CertificateParams::new(vec![sni.to_string()]);
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, sni);
        params.distinguished_name = name;

        let leaf = Certificate::from_params(params)?;
        let leaf_der = leaf.serialize_der_with_signer(&self.root)?;
        let key_der = leaf.serialize_private_key_der();

        let signing_key = rustls::sign::any_supported_type(&rustls::PrivateKey(key_der))?;
        let chain = vec![
            rustls::Certificate(leaf_der),
            rustls::Certificate(self.root_der.clone()),
        ];
        let certified = Arc::new(CertifiedKey::new(chain, signing_key));
        self.leaves.insert(sni.to_string(), Arc::clone(&certified));
        Ok(certified)
    }
}
