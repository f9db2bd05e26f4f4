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

use super::ErrorCode;
use crate::metrics::Recorder;

#[derive(Default)]
pub struct Metrics {
    pub responses: Family<ResponseLabels, Counter>,
    pub skipped_resources: Family<SkippedLabels, Counter>,
}

#[derive(Copy, Clone, Hash, Debug, PartialEq, Eq, EncodeLabelValue)]
pub enum ResourceType {
    Secret,
    ClusterLoadAssignment,
}

#[derive(Copy, Clone, Hash, Debug, PartialEq, Eq, EncodeLabelValue)]
pub enum ResponseOutcome {
    Success,
    Failure,
}

#[derive(Clone, Hash, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    pub resource_type: ResourceType,
    pub outcome: ResponseOutcome,
}

#[derive(Clone, Hash, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct SkippedLabels {
    pub resource_type: ResourceType,
    pub code: ErrorCode,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let responses = Family::default();
        registry.register(
            "xds_responses",
            "The total number of discovery responses built, by resource type and outcome",
            responses.clone(),
        );
        let skipped_resources = Family::default();
        registry.register(
            "xds_skipped_resources",
            "The total number of requested resources left out of a response, by error code",
            skipped_resources.clone(),
        );

        Self {
            responses,
            skipped_resources,
        }
    }
}

impl Recorder<ResponseLabels, u64> for Metrics {
    fn record(&self, labels: &ResponseLabels, count: u64) {
        self.responses.get_or_create(labels).inc_by(count);
    }
}

impl Recorder<SkippedLabels, u64> for Metrics {
    fn record(&self, labels: &SkippedLabels, count: u64) {
        self.skipped_resources.get_or_create(labels).inc_by(count);
    }
}
