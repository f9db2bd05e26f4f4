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

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use super::metrics::{Metrics, ResourceType, ResponseLabels, ResponseOutcome, SkippedLabels};
use super::types::core::DataSource;
use super::types::matcher::StringMatcher;
use super::types::tls::{CertificateValidationContext, Secret, TlsCertificate, secret};
use super::{Error, Proxy, Resolution, SdsCert, SdsCertKind};
use crate::catalog::MeshCatalog;
use crate::config;
use crate::identity::{self, CertificateProvider, ServiceIdentity};
use crate::metrics::IncrementRecorder;
use crate::tls::{Certificate, CommonName};

/// SdsGenerator builds the TLS secrets a proxy asks for. Every build issues a fresh certificate
/// for the proxy's service identity; nothing is cached between requests.
pub struct SdsGenerator {
    catalog: Arc<MeshCatalog>,
    cert_manager: Arc<dyn CertificateProvider>,
    cfg: Arc<config::Config>,
    metrics: Arc<Metrics>,
}

impl SdsGenerator {
    pub fn new(
        catalog: Arc<MeshCatalog>,
        cert_manager: Arc<dyn CertificateProvider>,
        cfg: Arc<config::Config>,
        metrics: Arc<Metrics>,
    ) -> Self {
        SdsGenerator {
            catalog,
            cert_manager,
            cfg,
            metrics,
        }
    }

    /// Builds one secret per resolvable name in `resource_names`, in request order. Names that
    /// cannot be served are logged and left out; a failure to identify the proxy or to issue its
    /// certificate fails the whole response.
    #[instrument(name = "sds", skip_all, fields(proxy = %proxy.common_name))]
    pub async fn build(
        &self,
        proxy: &Proxy,
        resource_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Secret>, Error> {
        let res = self.build_inner(proxy, resource_names, cancel).await;
        let outcome = match &res {
            Ok(_) => ResponseOutcome::Success,
            Err(e) => {
                error!(code = ?e.code(), "failed to build secrets: {e}");
                ResponseOutcome::Failure
            }
        };
        self.metrics.increment(&ResponseLabels {
            resource_type: ResourceType::Secret,
            outcome,
        });
        res
    }

    async fn build_inner(
        &self,
        proxy: &Proxy,
        resource_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Secret>, Error> {
        let identity = proxy.identity()?.service_identity();
        let cert = self.issue(&identity).await?;
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }

        let mut secrets = Vec::with_capacity(resource_names.len());
        for name in resource_names {
            match self.resolve(name, &identity, &cert, cancel) {
                Resolution::Resolved(s) => secrets.push(s),
                Resolution::Skipped(e) => {
                    if matches!(e, Error::IdentityMismatch { .. }) {
                        error!(resource = %name, "skipping secret: {e}");
                    } else {
                        warn!(resource = %name, "skipping secret: {e}");
                    }
                    self.metrics.increment(&SkippedLabels {
                        resource_type: ResourceType::Secret,
                        code: e.code(),
                    });
                }
                Resolution::Fatal(e) => return Err(e),
            }
        }
        // A cancel racing the last resource still discards the partial response.
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }
        debug!(
            requested = resource_names.len(),
            built = secrets.len(),
            "built secrets"
        );
        Ok(secrets)
    }

    async fn issue(&self, id: &ServiceIdentity) -> Result<Certificate, Error> {
        let cn = CommonName::from(id);
        let timeout = self.cfg.cert_issuance_timeout;
        match tokio::time::timeout(
            timeout,
            self.cert_manager
                .issue_certificate(&cn, self.cfg.service_cert_validity),
        )
        .await
        {
            Ok(res) => res.map_err(Error::IssuanceFailed),
            Err(_) => Err(Error::IssuanceFailed(identity::Error::IssuanceTimeout(
                cn, timeout,
            ))),
        }
    }

    fn resolve(
        &self,
        name: &str,
        identity: &ServiceIdentity,
        cert: &Certificate,
        cancel: &CancellationToken,
    ) -> Resolution<Secret> {
        if cancel.is_cancelled() {
            return Resolution::Fatal(Error::Canceled);
        }
        let sds_cert = match name.parse::<SdsCert>() {
            Ok(c) => c,
            Err(e) => return Resolution::Skipped(e),
        };
        Resolution::skip_on_err(match sds_cert.kind {
            SdsCertKind::ServiceCert => Ok(service_cert_secret(name, cert)),
            SdsCertKind::RootCertForMtlsOutbound => self.outbound_root_secret(&sds_cert, cert),
            SdsCertKind::RootCertForMtlsInbound => {
                self.inbound_root_secret(&sds_cert, identity, cert)
            }
        })
    }

    /// Root certificate for validating upstreams: any of the identities backing the target
    /// service may be presented.
    fn outbound_root_secret(&self, sds_cert: &SdsCert, cert: &Certificate) -> Result<Secret, Error> {
        let svc = sds_cert.mesh_service();
        let identities = self.catalog.list_service_identities_for_service(&svc)?;
        Ok(validation_secret(
            sds_cert.to_string(),
            cert,
            san_matchers(&identities),
        ))
    }

    /// Root certificate for validating downstreams. A proxy may only ask for its own identity.
    fn inbound_root_secret(
        &self,
        sds_cert: &SdsCert,
        identity: &ServiceIdentity,
        cert: &Certificate,
    ) -> Result<Secret, Error> {
        let requested = sds_cert.service_account().to_service_identity();
        if &requested != identity {
            return Err(Error::IdentityMismatch {
                proxy: identity.clone(),
                requested,
            });
        }
        // Inbound peers are authorized by RBAC; SAN matching is opt in.
        let sans = if self.cfg.inbound_san_validation {
            san_matchers(&self.catalog.list_inbound_service_identities(identity)?)
        } else {
            Vec::new()
        };
        Ok(validation_secret(sds_cert.to_string(), cert, sans))
    }
}

fn service_cert_secret(name: &str, cert: &Certificate) -> Secret {
    Secret {
        name: name.to_string(),
        r#type: Some(secret::Type::TlsCertificate(TlsCertificate {
            certificate_chain: Some(DataSource::inline_bytes(cert.cert_chain().clone())),
            private_key: Some(DataSource::inline_bytes(cert.private_key().clone())),
        })),
    }
}

fn validation_secret(name: String, cert: &Certificate, sans: Vec<StringMatcher>) -> Secret {
    Secret {
        name,
        r#type: Some(secret::Type::ValidationContext(
            CertificateValidationContext {
                trusted_ca: Some(DataSource::inline_bytes(cert.issuing_ca().clone())),
                match_subject_alt_names: sans,
            },
        )),
    }
}

fn san_matchers(identities: &[ServiceIdentity]) -> Vec<StringMatcher> {
    identities
        .iter()
        .map(|id| StringMatcher::exact(id.as_str()))
        .collect()
}
