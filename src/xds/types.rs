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

//! Wire compatible subsets of the Envoy v3 messages served by this control plane. Only the
//! fields that are populated here are declared; decoders skip anything else.

use crate::strng;
use crate::strng::Strng;

pub const SECRET_TYPE: Strng =
    strng::literal!("type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret");
pub const CLUSTER_LOAD_ASSIGNMENT_TYPE: Strng =
    strng::literal!("type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment");

/// Packs `msg` into an `Any` with the given type URL.
pub fn to_any<M: prost::Message>(type_url: &Strng, msg: &M) -> prost_types::Any {
    prost_types::Any {
        type_url: type_url.to_string(),
        value: msg.encode_to_vec(),
    }
}

fn pem_as_str<S: serde::Serializer>(b: &bytes::Bytes, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(b))
}

/// envoy.config.core.v3
pub mod core {
    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct DataSource {
        #[prost(oneof = "data_source::Specifier", tags = "1, 2, 3")]
        pub specifier: Option<data_source::Specifier>,
    }

    pub mod data_source {
        #[derive(Clone, PartialEq, ::prost::Oneof, serde::Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Specifier {
            #[prost(string, tag = "1")]
            Filename(String),
            #[prost(bytes = "bytes", tag = "2")]
            InlineBytes(#[serde(serialize_with = "super::super::pem_as_str")] bytes::Bytes),
            #[prost(string, tag = "3")]
            InlineString(String),
        }
    }

    impl DataSource {
        pub fn inline_bytes(b: bytes::Bytes) -> Self {
            DataSource {
                specifier: Some(data_source::Specifier::InlineBytes(b)),
            }
        }

        pub fn as_inline_bytes(&self) -> Option<&bytes::Bytes> {
            match &self.specifier {
                Some(data_source::Specifier::InlineBytes(b)) => Some(b),
                _ => None,
            }
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct Locality {
        #[prost(string, tag = "1")]
        pub region: String,
        #[prost(string, tag = "2")]
        pub zone: String,
        #[prost(string, tag = "3")]
        pub sub_zone: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct SocketAddress {
        #[prost(enumeration = "socket_address::Protocol", tag = "1")]
        pub protocol: i32,
        #[prost(string, tag = "2")]
        pub address: String,
        #[prost(uint32, tag = "3")]
        pub port_value: u32,
    }

    pub mod socket_address {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Protocol {
            Tcp = 0,
            Udp = 1,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct Address {
        #[prost(message, optional, tag = "1")]
        pub socket_address: Option<SocketAddress>,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct Node {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub cluster: String,
    }
}

/// envoy.type.matcher.v3
pub mod matcher {
    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct StringMatcher {
        #[prost(oneof = "string_matcher::MatchPattern", tags = "1, 2, 3, 7")]
        pub match_pattern: Option<string_matcher::MatchPattern>,
        #[prost(bool, tag = "6")]
        pub ignore_case: bool,
    }

    pub mod string_matcher {
        #[derive(Clone, PartialEq, ::prost::Oneof, serde::Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum MatchPattern {
            #[prost(string, tag = "1")]
            Exact(String),
            #[prost(string, tag = "2")]
            Prefix(String),
            #[prost(string, tag = "3")]
            Suffix(String),
            #[prost(string, tag = "7")]
            Contains(String),
        }
    }

    impl StringMatcher {
        pub fn exact(s: impl Into<String>) -> Self {
            StringMatcher {
                match_pattern: Some(string_matcher::MatchPattern::Exact(s.into())),
                ignore_case: false,
            }
        }
    }
}

/// envoy.extensions.transport_sockets.tls.v3
pub mod tls {
    use super::core::DataSource;
    use super::matcher::StringMatcher;

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct TlsCertificate {
        #[prost(message, optional, tag = "1")]
        pub certificate_chain: Option<DataSource>,
        #[prost(message, optional, tag = "2")]
        #[serde(skip_serializing)]
        pub private_key: Option<DataSource>,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct CertificateValidationContext {
        #[prost(message, optional, tag = "1")]
        pub trusted_ca: Option<DataSource>,
        #[prost(message, repeated, tag = "9")]
        pub match_subject_alt_names: Vec<StringMatcher>,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct Secret {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(oneof = "secret::Type", tags = "2, 4")]
        pub r#type: Option<secret::Type>,
    }

    pub mod secret {
        #[derive(Clone, PartialEq, ::prost::Oneof, serde::Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Type {
            #[prost(message, tag = "2")]
            TlsCertificate(super::TlsCertificate),
            #[prost(message, tag = "4")]
            ValidationContext(super::CertificateValidationContext),
        }
    }

    impl Secret {
        pub fn tls_certificate(&self) -> Option<&TlsCertificate> {
            match &self.r#type {
                Some(secret::Type::TlsCertificate(t)) => Some(t),
                _ => None,
            }
        }

        pub fn validation_context(&self) -> Option<&CertificateValidationContext> {
            match &self.r#type {
                Some(secret::Type::ValidationContext(v)) => Some(v),
                _ => None,
            }
        }
    }
}

/// envoy.config.endpoint.v3
pub mod endpoint {
    use super::core::{Address, Locality};

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct Endpoint {
        #[prost(message, optional, tag = "1")]
        pub address: Option<Address>,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct LbEndpoint {
        #[prost(message, optional, tag = "1")]
        pub endpoint: Option<Endpoint>,
        #[prost(message, optional, tag = "4")]
        pub load_balancing_weight: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct LocalityLbEndpoints {
        #[prost(message, optional, tag = "1")]
        pub locality: Option<Locality>,
        #[prost(message, repeated, tag = "2")]
        pub lb_endpoints: Vec<LbEndpoint>,
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize)]
    pub struct ClusterLoadAssignment {
        #[prost(string, tag = "1")]
        pub cluster_name: String,
        #[prost(message, repeated, tag = "2")]
        pub endpoints: Vec<LocalityLbEndpoints>,
    }
}

/// envoy.service.discovery.v3
pub mod service {
    pub mod discovery {
        pub mod v3 {
            use crate::xds::types::core::Node;

            #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
            #[serde(rename_all = "camelCase", default)]
            pub struct DiscoveryRequest {
                #[prost(string, tag = "1")]
                pub version_info: String,
                #[prost(message, optional, tag = "2")]
                #[serde(skip)]
                pub node: Option<Node>,
                #[prost(string, repeated, tag = "3")]
                pub resource_names: Vec<String>,
                #[prost(string, tag = "4")]
                pub type_url: String,
                #[prost(string, tag = "5")]
                pub response_nonce: String,
            }

            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct DiscoveryResponse {
                #[prost(string, tag = "1")]
                pub version_info: String,
                #[prost(message, repeated, tag = "2")]
                pub resources: Vec<prost_types::Any>,
                #[prost(string, tag = "4")]
                pub type_url: String,
                #[prost(string, tag = "5")]
                pub nonce: String,
            }
        }
    }
}
