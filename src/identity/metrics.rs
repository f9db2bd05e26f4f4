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

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::metrics::Recorder;

#[derive(Clone, Hash, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct IssuanceLabels {
    pub outcome: IssuanceOutcome,
}

#[derive(Copy, Clone, Hash, Debug, PartialEq, Eq, EncodeLabelValue)]
pub enum IssuanceOutcome {
    Success,
    Failure,
}

#[derive(Default)]
pub struct Metrics {
    pub certificates_issued: Family<IssuanceLabels, Counter>,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let certificates_issued = Family::default();
        registry.register(
            "certificates_issued",
            "The total number of leaf certificate issuance attempts, by outcome",
            certificates_issued.clone(),
        );
        Self {
            certificates_issued,
        }
    }
}

impl Recorder<IssuanceOutcome, u64> for Metrics {
    fn record(&self, outcome: &IssuanceOutcome, count: u64) {
        self.certificates_issued
            .get_or_create(&IssuanceLabels { outcome: *outcome })
            .inc_by(count);
    }
}
