// Copyright 2025 The Drasi Authors.
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

//! Fan-out of each point to every configured database target.

use log::{error, info, warn};

use crate::point::DataPoint;
use crate::sink::{PointSink, WriteError};
use crate::store::DatabaseTarget;

/// How a failed write affects the targets after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Every target is attempted regardless of earlier failures.
    #[default]
    Isolate,
    /// The first failure skips all remaining targets for this point.
    FailFast,
}

/// Result of writing one point to one target.
#[derive(Debug)]
pub enum TargetOutcome {
    Written,
    Failed(WriteError),
    /// Not attempted because an earlier target failed under
    /// [`FailurePolicy::FailFast`].
    Skipped,
}

/// Per-target outcomes of one fan-out, in target order.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub outcomes: Vec<(String, TargetOutcome)>,
}

impl WriteReport {
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Written))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Skipped))
    }

    pub fn is_ok(&self) -> bool {
        self.failed() == 0 && self.skipped() == 0
    }

    fn count(&self, pred: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Writes points to a list of targets through a [`PointSink`].
pub struct MultiWriter<S> {
    sink: S,
    policy: FailurePolicy,
}

impl<S: PointSink> MultiWriter<S> {
    pub fn new(sink: S, policy: FailurePolicy) -> Self {
        Self { sink, policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Write `point` to each target in order, one single-point batch per
    /// target.
    pub async fn write(&self, point: &DataPoint, targets: &[DatabaseTarget]) -> WriteReport {
        let mut report = WriteReport::default();
        let time = point.time();

        if targets.is_empty() {
            warn!("{time} No database targets configured, data not sent.");
            return report;
        }
        if point.fields.is_empty() {
            warn!("{time} No data sent: message on '{}' has no fields.", point.topic());
            return report;
        }

        let batch = std::slice::from_ref(point);
        let mut abort = false;

        for target in targets {
            if abort {
                report.outcomes.push((target.name.clone(), TargetOutcome::Skipped));
                continue;
            }

            match self.sink.write_points(target, batch).await {
                Ok(()) => {
                    info!("{time} Data written in {} ({} point).", target.name, batch.len());
                    report.outcomes.push((target.name.clone(), TargetOutcome::Written));
                }
                Err(e) => {
                    error!("Data not written in {} ({}:{}): {e}", target.name, target.host, target.port);
                    report.outcomes.push((target.name.clone(), TargetOutcome::Failed(e)));
                    abort = self.policy == FailurePolicy::FailFast;
                }
            }
        }

        if report.skipped() > 0 {
            warn!(
                "{time} Skipped {} remaining target(s) after a failed write.",
                report.skipped()
            );
        }

        report
    }
}
