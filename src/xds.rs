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

//! Builders translating catalog answers into discovery protocol resources.

use std::fmt;

use prometheus_client::encoding::EncodeLabelValue;

use crate::identity::{self, ProxyIdentity};
use crate::tls::{CommonName, SerialNumber};
use crate::{catalog, identity::ServiceIdentity};

pub mod eds;
pub mod metrics;
pub mod sds;
mod secrets;
pub mod types;

pub use eds::EdsGenerator;
pub use sds::SdsGenerator;
pub use secrets::*;

/// Proxy is the peer a discovery request came from, as authenticated by the certificate it
/// presented on the stream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Proxy {
    pub common_name: CommonName,
    pub serial_number: SerialNumber,
}

impl Proxy {
    pub fn new(common_name: CommonName, serial_number: SerialNumber) -> Self {
        Proxy {
            common_name,
            serial_number,
        }
    }

    pub fn identity(&self) -> Result<ProxyIdentity, Error> {
        ProxyIdentity::try_from(&self.common_name).map_err(Error::IdentityExtractionFailed)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (serial {})", self.common_name, self.serial_number)
    }
}

/// Resolution is the outcome of building a single requested resource. A skipped resource is
/// left out of the response; a fatal one aborts it.
#[derive(Debug)]
pub enum Resolution<T> {
    Resolved(T),
    Skipped(Error),
    Fatal(Error),
}

impl<T> Resolution<T> {
    /// Maps a per resource failure to a skip.
    pub fn skip_on_err(res: Result<T, Error>) -> Self {
        match res {
            Ok(v) => Resolution::Resolved(v),
            Err(e) => Resolution::Skipped(e),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("failed to extract proxy identity: {0}")]
    IdentityExtractionFailed(#[source] identity::Error),
    #[error("failed to issue proxy certificate: {0}")]
    IssuanceFailed(#[source] identity::Error),
    #[error("malformed resource name {0:?}: {1}")]
    Malformed(String, &'static str),
    #[error("invalid cluster name {0:?}: expected <namespace>/<name>")]
    InvalidClusterName(String),
    #[error("proxy identity {proxy} does not own requested identity {requested}")]
    IdentityMismatch {
        proxy: ServiceIdentity,
        requested: ServiceIdentity,
    },
    #[error(transparent)]
    Catalog(#[from] catalog::Error),
    #[error("request canceled")]
    Canceled,
}

/// ErrorCode is the coarse classification of an [Error], used as a metric label.
#[derive(Copy, Clone, Hash, Debug, PartialEq, Eq, EncodeLabelValue)]
pub enum ErrorCode {
    NotFound,
    Inconsistent,
    Malformed,
    IdentityMismatch,
    IssuanceFailed,
    Canceled,
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::IdentityExtractionFailed(_)
            | Error::Malformed(..)
            | Error::InvalidClusterName(_) => ErrorCode::Malformed,
            Error::IssuanceFailed(_) => ErrorCode::IssuanceFailed,
            Error::IdentityMismatch { .. } => ErrorCode::IdentityMismatch,
            Error::Catalog(catalog::Error::ProviderMismatch { .. }) => ErrorCode::Inconsistent,
            Error::Catalog(_) => ErrorCode::NotFound,
            Error::Canceled => ErrorCode::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::state::MeshService;

    #[test]
    fn proxy_identity_from_common_name() {
        let sa = crate::test_helpers::bookbuyer_service_account();
        let proxy = Proxy::new(
            crate::test_helpers::proxy_common_name(&sa),
            SerialNumber::new("1234"),
        );
        assert_eq!(proxy.identity().unwrap().service_account, sa);

        let bad = Proxy::new(CommonName::new("not-a-proxy"), SerialNumber::new("1"));
        assert!(matches!(
            bad.identity(),
            Err(Error::IdentityExtractionFailed(_))
        ));
    }

    #[test_case(Error::InvalidClusterName("x".into()), ErrorCode::Malformed; "cluster name")]
    #[test_case(Error::Canceled, ErrorCode::Canceled; "canceled")]
    #[test_case(
        Error::Catalog(catalog::Error::ServiceNotFound(MeshService::new("a", "b"))),
        ErrorCode::NotFound;
        "not found"
    )]
    #[test_case(
        Error::Catalog(catalog::Error::ProviderMismatch {
            service: MeshService::new("a", "b"),
            port: 80,
            provider: "fake".to_string(),
        }),
        ErrorCode::Inconsistent;
        "mismatch"
    )]
    fn error_codes(err: Error, code: ErrorCode) {
        assert_eq!(err.code(), code);
    }
}
