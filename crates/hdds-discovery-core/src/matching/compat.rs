// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS compatibility checking (RxO - Request vs Offered).
//!
//! | Policy           | Rule                                           |
//! |------------------|------------------------------------------------|
//! | Reliability      | Writer >= Reader (Reliable > BestEffort)       |
//! | Durability       | Writer >= Reader (Persistent > ... > Volatile) |
//! | History          | Writer depth >= Reader depth                   |
//! | Deadline         | Writer period <= Reader period                 |
//! | Latency budget   | Writer budget <= Reader budget                 |
//! | Ownership        | Must match exactly                             |
//! | Liveliness       | Writer kind >= Reader kind, lease <=           |
//! | Destination ord. | Writer >= Reader (BySource > ByReception)      |
//! | Partition        | Must intersect (wildcards allowed)             |
//!
//! Type names must be equal before QoS is considered.

use super::{Receives, Transmits};
use crate::qos::{rxo, QosPolicyId};

/// Outcome of matching one writer against one reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    /// Failing policies, in policy-id order
    Incompatible(Vec<QosPolicyId>),
    /// Same topic, different type name
    InconsistentType,
}

impl Compatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible)
    }
}

/// Check a writer offer against a reader request.
///
/// Pure: the same inputs always give the same answer.
///
/// ```
/// use hdds_discovery_core::matching::{check, AsReader, AsWriter, Compatibility};
/// use hdds_discovery_core::qos::QosPolicyId;
/// use hdds_discovery_core::{GUID, LocalEndpoint, QoS};
///
/// let w = LocalEndpoint::writer(GUID::new([1; 12], [0, 0, 1, 2]), "T", "Ty", QoS::best_effort());
/// let r = LocalEndpoint::reader(GUID::new([2; 12], [0, 0, 1, 4]), "T", "Ty", QoS::reliable());
/// assert_eq!(
///     check(&AsWriter(&w), &AsReader(&r)),
///     Compatibility::Incompatible(vec![QosPolicyId::Reliability])
/// );
/// ```
pub fn check<W, R>(writer: &W, reader: &R) -> Compatibility
where
    W: Transmits + ?Sized,
    R: Receives + ?Sized,
{
    crate::trace_fn!("matching::check");
    if writer.type_name() != reader.type_name() {
        log::debug!(
            "[MATCH-QOS] Type mismatch on '{}' (writer={}, reader={})",
            writer.topic_name(),
            writer.type_name(),
            reader.type_name()
        );
        return Compatibility::InconsistentType;
    }

    let offered = writer.qos();
    let requested = reader.qos();
    let mut failed = Vec::new();

    if !rxo::durability(offered.durability, requested.durability) {
        failed.push(QosPolicyId::Durability);
    }
    if !rxo::deadline(offered.deadline, requested.deadline) {
        failed.push(QosPolicyId::Deadline);
    }
    if !rxo::latency_budget(offered.latency_budget, requested.latency_budget) {
        failed.push(QosPolicyId::LatencyBudget);
    }
    if !rxo::ownership(offered.ownership, requested.ownership) {
        failed.push(QosPolicyId::Ownership);
    }
    if !rxo::liveliness(offered.liveliness, requested.liveliness) {
        failed.push(QosPolicyId::Liveliness);
    }
    if !offered.partition.intersects(&requested.partition) {
        failed.push(QosPolicyId::Partition);
    }
    if !rxo::reliability(offered.reliability, requested.reliability) {
        failed.push(QosPolicyId::Reliability);
    }
    if !rxo::destination_order(offered.destination_order, requested.destination_order) {
        failed.push(QosPolicyId::DestinationOrder);
    }
    if !rxo::history(offered.history, requested.history) {
        failed.push(QosPolicyId::History);
    }

    if failed.is_empty() {
        Compatibility::Compatible
    } else {
        log::debug!(
            "[MATCH-QOS] {} -> {} incompatible: {:?}",
            writer.guid(),
            reader.guid(),
            failed
        );
        Compatibility::Incompatible(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::LocalEndpoint;
    use crate::guid::GUID;
    use crate::matching::{evaluate, AsReader, AsWriter};
    use crate::qos::{
        DestinationOrder, Durability, LivelinessKind, Ownership, Partition, QoS,
    };
    use std::time::Duration;

    fn writer(qos: QoS) -> LocalEndpoint {
        LocalEndpoint::writer(GUID::new([1; 12], [0, 0, 1, 0x02]), "T", "Ty", qos)
    }

    fn reader(qos: QoS) -> LocalEndpoint {
        LocalEndpoint::reader(GUID::new([2; 12], [0, 0, 1, 0x04]), "T", "Ty", qos)
    }

    fn run(w: QoS, r: QoS) -> Compatibility {
        check(&AsWriter(&writer(w)), &AsReader(&reader(r)))
    }

    #[test]
    fn test_reliability_ordering() {
        assert!(run(QoS::reliable(), QoS::best_effort()).is_compatible());
        assert_eq!(
            run(QoS::best_effort(), QoS::reliable()),
            Compatibility::Incompatible(vec![QosPolicyId::Reliability])
        );
    }

    #[test]
    fn test_deadline_and_budget() {
        let fast = QoS::default().deadline(Duration::from_millis(100));
        let slow = QoS::default().deadline(Duration::from_millis(200));
        assert!(run(fast.clone(), slow.clone()).is_compatible());
        assert_eq!(
            run(slow, fast),
            Compatibility::Incompatible(vec![QosPolicyId::Deadline])
        );

        let w = QoS::default().latency_budget(Duration::from_millis(50));
        let r = QoS::default().latency_budget(Duration::from_millis(10));
        assert_eq!(
            run(w, r),
            Compatibility::Incompatible(vec![QosPolicyId::LatencyBudget])
        );
    }

    #[test]
    fn test_collects_every_failing_policy() {
        let w = QoS::default().ownership(Ownership::Exclusive);
        let r = QoS::reliable()
            .durability(Durability::TransientLocal)
            .destination_order(DestinationOrder::BySourceTimestamp)
            .liveliness(LivelinessKind::ManualByTopic, Duration::from_secs(1));
        assert_eq!(
            run(w, r),
            Compatibility::Incompatible(vec![
                QosPolicyId::Durability,
                QosPolicyId::Ownership,
                QosPolicyId::Liveliness,
                QosPolicyId::Reliability,
                QosPolicyId::DestinationOrder,
            ])
        );
    }

    #[test]
    fn test_partition_wildcards() {
        let w = QoS::default().partition(Partition::new(["sensors/*"]));
        let r = QoS::default().partition(Partition::new(["sensors/temp"]));
        assert!(run(w.clone(), r).is_compatible());
        assert_eq!(
            run(w, QoS::default()),
            Compatibility::Incompatible(vec![QosPolicyId::Partition])
        );
    }

    #[test]
    fn test_type_mismatch() {
        let w = writer(QoS::default());
        let mut r = reader(QoS::default());
        r.type_name = "Other".to_string();
        assert_eq!(check(&AsWriter(&w), &AsReader(&r)), Compatibility::InconsistentType);
    }

    #[test]
    fn test_evaluate_picks_roles_and_is_stable() {
        let w = writer(QoS::reliable());
        let r = reader(QoS::reliable());
        let first = evaluate(&r, &w);
        assert_eq!(first, Some(Compatibility::Compatible));
        assert_eq!(evaluate(&r, &w), first);
        assert_eq!(evaluate(&w, &r), first);
        // Same kind or different topic: not a candidate
        assert_eq!(evaluate(&w, &w), None);
        let mut other = reader(QoS::reliable());
        other.topic_name = "U".to_string();
        assert_eq!(evaluate(&w, &other), None);
    }
}
