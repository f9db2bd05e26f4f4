// Copyright Istio Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use super::Error;
use super::metrics::{IssuanceOutcome, Metrics};
use crate::config::CaConfig;
use crate::metrics::IncrementRecorder;
use crate::tls::{self, Certificate, CertificateAuthority, CommonName};

/// CertificateProvider issues and tracks the leaf certificates handed to proxies.
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    /// Issues a new certificate for `common_name`, valid from now for `validity`. The result
    /// supersedes any previously issued certificate for the same name.
    async fn issue_certificate(
        &self,
        common_name: &CommonName,
        validity: Duration,
    ) -> Result<Certificate, Error>;

    /// Returns the most recent unexpired certificate issued for `common_name`.
    fn get_certificate(&self, common_name: &CommonName) -> Option<Certificate>;

    /// Returns the PEM encoded root of trust.
    fn get_root_certificate(&self) -> Bytes;
}

/// CertManager signs certificates with an in-process [CertificateAuthority].
#[derive(Clone)]
pub struct CertManager {
    ca: Arc<CertificateAuthority>,
    issued: Arc<RwLock<HashMap<CommonName, Certificate>>>,
    metrics: Arc<Metrics>,
}

impl CertManager {
    pub fn new(ca: CertificateAuthority, metrics: Arc<Metrics>) -> CertManager {
        CertManager {
            ca: Arc::new(ca),
            issued: Default::default(),
            metrics,
        }
    }

    /// Loads the root from disk if configured, otherwise creates a self-signed one.
    pub fn from_config(cfg: &CaConfig, metrics: Arc<Metrics>) -> Result<CertManager, Error> {
        let ca = match (&cfg.cert_path, &cfg.key_path) {
            (Some(cert_path), Some(key_path)) => {
                let load_root = |e: tls::Error| Error::LoadRoot(Arc::new(e));
                let read = |p: &std::path::Path| {
                    std::fs::read(p)
                        .map(Bytes::from)
                        .map_err(|e| load_root(tls::Error::Io(p.display().to_string(), e)))
                };
                let ca = CertificateAuthority::from_pem(
                    read(cert_path.as_path())?,
                    read(key_path.as_path())?,
                )
                .map_err(load_root)?;
                info!(path=%cert_path.display(), "loaded root certificate");
                ca
            }
            _ => {
                let ca =
                    CertificateAuthority::new(&cfg.common_name, &cfg.organization, cfg.validity)?;
                info!(
                    common_name = cfg.common_name,
                    validity = ?cfg.validity,
                    "created self-signed root certificate"
                );
                ca
            }
        };
        Ok(CertManager::new(ca, metrics))
    }
}

#[async_trait]
impl CertificateProvider for CertManager {
    #[instrument(skip_all, fields(common_name=%common_name))]
    async fn issue_certificate(
        &self,
        common_name: &CommonName,
        validity: Duration,
    ) -> Result<Certificate, Error> {
        let ca = self.ca.clone();
        let cn = common_name.clone();
        // Key generation and signing are CPU bound.
        let res = tokio::task::spawn_blocking(move || ca.sign(&cn, validity))
            .await
            .map_err(|e| Error::IssuanceTask(e.to_string()))
            .and_then(|r| r.map_err(Error::from));
        let cert = match res {
            Ok(cert) => cert,
            Err(e) => {
                warn!("failed to issue certificate: {e}");
                self.metrics.increment(&IssuanceOutcome::Failure);
                return Err(e);
            }
        };
        self.metrics.increment(&IssuanceOutcome::Success);
        debug!(serial=%cert.serial_number(), "issued certificate");

        let mut issued = self.issued.write().unwrap_or_else(PoisonError::into_inner);
        issued.insert(common_name.clone(), cert.clone());
        Ok(cert)
    }

    fn get_certificate(&self, common_name: &CommonName) -> Option<Certificate> {
        let issued = self.issued.read().unwrap_or_else(PoisonError::into_inner);
        issued
            .get(common_name)
            .filter(|c| !c.is_expired())
            .cloned()
    }

    fn get_root_certificate(&self) -> Bytes {
        self.ca.root().cert_chain().clone()
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Returns a manager signing with the shared test root.
    pub fn new_cert_manager() -> CertManager {
        let ca = tls::mock::test_ca();
        // Rebuild from PEM so each manager owns its own index but shares the root.
        let ca = CertificateAuthority::from_pem(
            ca.root().cert_chain().clone(),
            ca.root().private_key().clone(),
        )
        .expect("test root must load");
        CertManager::new(ca, Arc::new(Metrics::default()))
    }

    /// FailingCertManager fails every issuance and counts the attempts.
    #[derive(Default)]
    pub struct FailingCertManager {
        attempts: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FailingCertManager {
        /// Returns a manager whose issuance never completes before `delay` elapses.
        pub fn slow(delay: Duration) -> Self {
            FailingCertManager {
                attempts: AtomicUsize::new(0),
                delay: Some(delay),
            }
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CertificateProvider for FailingCertManager {
        async fn issue_certificate(
            &self,
            _: &CommonName,
            _: Duration,
        ) -> Result<Certificate, Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Err(Error::IssuanceTask("mock failure".to_string()))
        }

        fn get_certificate(&self, _: &CommonName) -> Option<Certificate> {
            None
        }

        fn get_root_certificate(&self) -> Bytes {
            Bytes::new()
        }
    }
}
