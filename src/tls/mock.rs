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

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use once_cell::sync::Lazy;

use super::{Certificate, CertificateAuthority, CommonName, SerialNumber};

pub const TEST_ROOT_CN: &str = "test-root.mesh.local";
pub const TEST_ORG: &str = "mesh.local";

// Key generation dominates test time, so all tests share one root.
static TEST_CA: Lazy<CertificateAuthority> = Lazy::new(|| {
    CertificateAuthority::new(TEST_ROOT_CN, TEST_ORG, Duration::from_secs(24 * 60 * 60))
        .expect("test root must be valid")
});

pub fn test_ca() -> &'static CertificateAuthority {
    &TEST_CA
}

/// Returns a certificate with placeholder PEM contents. Useful where only the metadata matters.
pub fn new_fake_certificate() -> Certificate {
    Certificate::from_parts(
        CommonName::new("fake-cert-cn.default"),
        SerialNumber::new("0123456789"),
        Bytes::from_static(b"chain"),
        Bytes::from_static(b"key"),
        Bytes::from_static(b"ca"),
        SystemTime::now() + Duration::from_secs(60 * 60),
    )
}
