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

mod ca;
mod certificate;
#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use crate::tls::ca::*;
pub use crate::tls::certificate::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid root certificate: {0}")]
    InvalidRootCert(String),

    #[error("key generation: {0}")]
    KeyGeneration(rcgen::Error),

    #[error("signing: {0}")]
    Signing(rcgen::Error),

    #[error("certificate parse: {0}")]
    CertificateParseNomError(#[from] x509_parser::nom::Err<x509_parser::error::X509Error>),

    #[error("certificate: {0}")]
    CertificateParseError(String),

    #[error("failed to read {0}: {1}")]
    Io(String, std::io::Error),
}
