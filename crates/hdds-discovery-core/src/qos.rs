// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS policies that take part in endpoint matching.
//!
//! Only the request-vs-offered (RxO) policies are modelled here; purely local
//! policies (resource limits, time-based filter, lifespan) never influence
//! discovery and are left to the data path.
//!
//! # Examples
//!
//! ```
//! use hdds_discovery_core::qos::{Durability, QoS, Reliability};
//!
//! let writer = QoS::reliable().transient_local().keep_last(10);
//! assert_eq!(writer.reliability, Reliability::Reliable);
//! assert_eq!(writer.durability, Durability::TransientLocal);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Duration used for "infinite" deadlines, budgets and leases.
pub const DURATION_INFINITE: Duration = Duration::from_secs(u64::MAX);

/// Reliability policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reliability {
    /// Fire-and-forget (no ACKs, no retransmission)
    #[default]
    BestEffort,
    /// Reliable delivery with NACK-driven retransmission
    Reliable,
}

/// Durability policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Durability {
    #[default]
    Volatile,
    TransientLocal,
    Transient,
    Persistent,
}

impl Durability {
    /// Strength rank used by RxO comparison (Persistent strongest).
    pub fn rank(self) -> u8 {
        match self {
            Self::Volatile => 0,
            Self::TransientLocal => 1,
            Self::Transient => 2,
            Self::Persistent => 3,
        }
    }
}

/// History policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum History {
    KeepLast(u32),
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(1)
    }
}

/// Ownership kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ownership {
    #[default]
    Shared,
    Exclusive,
}

/// Liveliness kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LivelinessKind {
    #[default]
    Automatic,
    ManualByParticipant,
    ManualByTopic,
}

impl LivelinessKind {
    fn rank(self) -> u8 {
        match self {
            Self::Automatic => 0,
            Self::ManualByParticipant => 1,
            Self::ManualByTopic => 2,
        }
    }
}

/// Liveliness policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveliness {
    pub kind: LivelinessKind,
    pub lease_duration: Duration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: DURATION_INFINITE,
        }
    }
}

/// Destination order policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DestinationOrder {
    #[default]
    ByReceptionTimestamp,
    BySourceTimestamp,
}

impl DestinationOrder {
    fn rank(self) -> u8 {
        match self {
            Self::ByReceptionTimestamp => 0,
            Self::BySourceTimestamp => 1,
        }
    }
}

/// Partition policy
///
/// An empty name list is the default partition (equivalent to `[""]`).
/// Names may contain `*` and `?` wildcards.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Partition {
    pub names: Vec<String>,
}

impl Partition {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.names.is_empty()
    }

    /// True when at least one name of `self` matches one name of `other`.
    ///
    /// Two wildcard patterns never match each other (DDS v1.4 Sec.2.2.3.13).
    pub fn intersects(&self, other: &Partition) -> bool {
        let default = [String::new()];
        let ours: &[String] = if self.is_default() { &default } else { &self.names };
        let theirs: &[String] = if other.is_default() { &default } else { &other.names };

        ours.iter().any(|a| {
            theirs.iter().any(|b| match (is_pattern(a), is_pattern(b)) {
                (false, false) => a == b,
                (true, false) => glob_match(a, b),
                (false, true) => glob_match(b, a),
                (true, true) => false,
            })
        })
    }
}

fn is_pattern(name: &str) -> bool {
    name.contains(['*', '?'])
}

/// Minimal fnmatch: `*` matches any run, `?` any single character.
fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// QoS snapshot carried by local and discovered endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QoS {
    pub reliability: Reliability,
    pub durability: Durability,
    pub history: History,
    /// Deadline period (writer offers <= reader requests)
    pub deadline: Duration,
    /// Latency budget (writer offers <= reader requests)
    pub latency_budget: Duration,
    pub ownership: Ownership,
    pub liveliness: Liveliness,
    pub destination_order: DestinationOrder,
    pub partition: Partition,
}

impl Default for QoS {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            history: History::default(),
            deadline: DURATION_INFINITE,
            latency_budget: Duration::ZERO,
            ownership: Ownership::Shared,
            liveliness: Liveliness::default(),
            destination_order: DestinationOrder::ByReceptionTimestamp,
            partition: Partition::default(),
        }
    }
}

impl QoS {
    pub fn best_effort() -> Self {
        Self::default()
    }

    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = History::KeepLast(depth);
        self
    }

    #[must_use]
    pub fn keep_all(mut self) -> Self {
        self.history = History::KeepAll;
        self
    }

    #[must_use]
    pub fn transient_local(mut self) -> Self {
        self.durability = Durability::TransientLocal;
        self
    }

    #[must_use]
    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    #[must_use]
    pub fn deadline(mut self, period: Duration) -> Self {
        self.deadline = period;
        self
    }

    #[must_use]
    pub fn latency_budget(mut self, budget: Duration) -> Self {
        self.latency_budget = budget;
        self
    }

    #[must_use]
    pub fn ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    #[must_use]
    pub fn liveliness(mut self, kind: LivelinessKind, lease_duration: Duration) -> Self {
        self.liveliness = Liveliness {
            kind,
            lease_duration,
        };
        self
    }

    #[must_use]
    pub fn destination_order(mut self, order: DestinationOrder) -> Self {
        self.destination_order = order;
        self
    }

    #[must_use]
    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }
}

/// QoS policy identifiers used in incompatibility diagnostics.
///
/// Values follow the DDS `QosPolicyId_t` numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QosPolicyId {
    Durability = 2,
    Deadline = 4,
    LatencyBudget = 5,
    Ownership = 6,
    Liveliness = 8,
    Partition = 10,
    Reliability = 11,
    DestinationOrder = 12,
    History = 13,
}

impl fmt::Display for QosPolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Durability => "DURABILITY",
            Self::Deadline => "DEADLINE",
            Self::LatencyBudget => "LATENCY_BUDGET",
            Self::Ownership => "OWNERSHIP",
            Self::Liveliness => "LIVELINESS",
            Self::Partition => "PARTITION",
            Self::Reliability => "RELIABILITY",
            Self::DestinationOrder => "DESTINATION_ORDER",
            Self::History => "HISTORY",
        };
        f.write_str(name)
    }
}

/// Offered-vs-requested checks, one per policy.
///
/// Each returns `true` when the writer's offer satisfies the reader's request.
pub(crate) mod rxo {
    use super::*;

    pub fn reliability(offered: Reliability, requested: Reliability) -> bool {
        !matches!(
            (offered, requested),
            (Reliability::BestEffort, Reliability::Reliable)
        )
    }

    pub fn durability(offered: Durability, requested: Durability) -> bool {
        offered.rank() >= requested.rank()
    }

    pub fn history(offered: History, requested: History) -> bool {
        match (requested, offered) {
            (History::KeepLast(r_keep), History::KeepLast(w_keep)) => w_keep >= r_keep,
            (History::KeepLast(_), History::KeepAll) => true,
            (History::KeepAll, History::KeepAll) => true,
            (History::KeepAll, History::KeepLast(_)) => false,
        }
    }

    pub fn deadline(offered: Duration, requested: Duration) -> bool {
        offered <= requested
    }

    pub fn latency_budget(offered: Duration, requested: Duration) -> bool {
        offered <= requested
    }

    pub fn ownership(offered: Ownership, requested: Ownership) -> bool {
        offered == requested
    }

    pub fn liveliness(offered: Liveliness, requested: Liveliness) -> bool {
        offered.kind.rank() >= requested.kind.rank()
            && offered.lease_duration <= requested.lease_duration
    }

    pub fn destination_order(offered: DestinationOrder, requested: DestinationOrder) -> bool {
        offered.rank() >= requested.rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let qos = QoS::default();
        assert_eq!(qos.reliability, Reliability::BestEffort);
        assert_eq!(qos.deadline, DURATION_INFINITE);
        assert!(qos.partition.is_default());
    }

    #[test]
    fn test_builder_chain() {
        let qos = QoS::reliable()
            .keep_all()
            .deadline(Duration::from_millis(100))
            .partition(Partition::new(["sensors"]));
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.history, History::KeepAll);
        assert_eq!(qos.deadline, Duration::from_millis(100));
        assert_eq!(qos.partition.names, vec!["sensors".to_string()]);
    }

    #[test]
    fn test_partition_default_matches_default() {
        assert!(Partition::default().intersects(&Partition::default()));
        assert!(!Partition::default().intersects(&Partition::new(["a"])));
    }

    #[test]
    fn test_partition_wildcards() {
        let pattern = Partition::new(["sensor/*"]);
        assert!(pattern.intersects(&Partition::new(["sensor/imu"])));
        assert!(Partition::new(["sensor/gps"]).intersects(&pattern));
        assert!(!pattern.intersects(&Partition::new(["actuator/arm"])));
        // Patterns never match each other
        assert!(!pattern.intersects(&Partition::new(["sensor/*"])));
        // "*" covers the default partition
        assert!(Partition::new(["*"]).intersects(&Partition::default()));
        assert!(Partition::new(["a?c"]).intersects(&Partition::new(["abc"])));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "a-b--c"));
        assert!(!glob_match("a*b", "acd"));
        assert!(glob_match("??", "xy"));
        assert!(!glob_match("??", "xyz"));
    }

    #[test]
    fn test_rxo_orders() {
        assert!(rxo::reliability(Reliability::Reliable, Reliability::BestEffort));
        assert!(!rxo::reliability(Reliability::BestEffort, Reliability::Reliable));
        assert!(rxo::durability(Durability::Persistent, Durability::TransientLocal));
        assert!(!rxo::durability(Durability::Volatile, Durability::Transient));
        assert!(rxo::deadline(Duration::from_millis(100), Duration::from_millis(200)));
        assert!(!rxo::deadline(Duration::from_millis(200), Duration::from_millis(100)));
        assert!(rxo::liveliness(
            Liveliness {
                kind: LivelinessKind::ManualByTopic,
                lease_duration: Duration::from_secs(1),
            },
            Liveliness {
                kind: LivelinessKind::Automatic,
                lease_duration: Duration::from_secs(2),
            }
        ));
        assert!(!rxo::destination_order(
            DestinationOrder::ByReceptionTimestamp,
            DestinationOrder::BySourceTimestamp
        ));
    }

    #[test]
    fn test_policy_id_display() {
        assert_eq!(QosPolicyId::Reliability.to_string(), "RELIABILITY");
        assert_eq!(QosPolicyId::Reliability as u32, 11);
    }
}
