//! Replica fan-out.
//!
//! Every operation is broadcast to all replicas of a shard concurrently.
//! It succeeds if at least one replica succeeds; the caller's comparator
//! picks the best among several successful reads (replicas may lag).
//!
//! Each replica remembers the assignment (hash and state per target) it last
//! accepted so an unchanged assignment is not pushed again. That memory is dropped whenever the
//! replica fails a request or reports something other than what it was
//! given, and for all replicas at once when the whole group fails.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tracing::{debug, warn};

use scrapegrid_core::{ScrapeStatusMap, TargetHash, TargetState, TargetsByJob};

use crate::client::ShardClient;
use crate::error::{ShardError, ShardResult};

struct Replica {
    client: Arc<dyn ShardClient>,
    /// Assignment this replica last accepted.
    applied: Mutex<Option<AssignmentKeys>>,
}

type AssignmentKeys = BTreeSet<(TargetHash, TargetState)>;

impl Replica {
    fn applied(&self) -> MutexGuard<'_, Option<AssignmentKeys>> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The redundant replicas serving one logical shard.
pub struct ReplicaGroup {
    replicas: Vec<Replica>,
}

impl ReplicaGroup {
    pub fn new(clients: Vec<Arc<dyn ShardClient>>) -> Self {
        Self {
            replicas: clients
                .into_iter()
                .map(|client| Replica {
                    client,
                    applied: Mutex::new(None),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.replicas
            .iter()
            .map(|r| r.client.address().to_string())
            .collect()
    }

    /// Run `op` against every replica concurrently.
    ///
    /// Returns `(replica index, result)` for each success, or an error when
    /// no replica succeeded. Failed replicas forget their applied targets.
    pub async fn broadcast<T, F, Fut>(&self, op: F) -> ShardResult<Vec<(usize, T)>>
    where
        F: Fn(Arc<dyn ShardClient>) -> Fut,
        Fut: Future<Output = ShardResult<T>>,
    {
        if self.replicas.is_empty() {
            return Err(ShardError::NoReplicas);
        }

        let calls = self.replicas.iter().enumerate().map(|(idx, replica)| {
            let call = op(replica.client.clone());
            async move { (idx, call.await) }
        });

        let mut successes = Vec::with_capacity(self.replicas.len());
        let mut last_err = None;
        for (idx, result) in join_all(calls).await {
            match result {
                Ok(value) => successes.push((idx, value)),
                Err(e) => {
                    let replica = &self.replicas[idx];
                    warn!(replica = %replica.client.address(), error = %e, "replica request failed");
                    *replica.applied() = None;
                    last_err = Some(e);
                }
            }
        }

        if successes.is_empty() {
            self.invalidate();
            return Err(ShardError::AllReplicasFailed {
                count: self.replicas.len(),
                last: last_err.map(|e| e.to_string()).unwrap_or_default(),
            });
        }
        Ok(successes)
    }

    /// Broadcast a read and keep the best successful result.
    ///
    /// `better(a, b)` returns true when `a` should replace `b`.
    pub async fn read<T, F, Fut>(&self, op: F, better: impl Fn(&T, &T) -> bool) -> ShardResult<T>
    where
        F: Fn(Arc<dyn ShardClient>) -> Fut,
        Fut: Future<Output = ShardResult<T>>,
    {
        let successes = self.broadcast(op).await?;
        pick_best(successes.into_iter().map(|(_, v)| v), better).ok_or(ShardError::NoReplicas)
    }

    /// Broadcast a write; succeeds if any replica accepts it.
    pub async fn write<F, Fut>(&self, op: F) -> ShardResult<()>
    where
        F: Fn(Arc<dyn ShardClient>) -> Fut,
        Fut: Future<Output = ShardResult<()>>,
    {
        self.broadcast(op).await.map(|_| ())
    }

    /// Push a target assignment, skipping replicas that already hold it.
    /// Series estimates alone do not count as a change.
    ///
    /// Returns how many replicas were actually written to.
    pub async fn push_targets(&self, targets: &TargetsByJob) -> ShardResult<usize> {
        if self.replicas.is_empty() {
            return Err(ShardError::NoReplicas);
        }

        let keys = assignment_keys(targets);
        let calls = self.replicas.iter().enumerate().map(|(idx, replica)| {
            let unchanged = replica.applied().as_ref() == Some(&keys);
            let client = replica.client.clone();
            async move {
                if unchanged {
                    return (idx, Ok(false));
                }
                (idx, client.push_targets(targets).await.map(|()| true))
            }
        });

        let mut accepted = 0;
        let mut pushed = 0;
        let mut last_err = None;
        for (idx, result) in join_all(calls).await {
            let replica = &self.replicas[idx];
            match result {
                Ok(true) => {
                    *replica.applied() = Some(keys.clone());
                    accepted += 1;
                    pushed += 1;
                }
                Ok(false) => {
                    debug!(replica = %replica.client.address(), "assignment unchanged, push skipped");
                    accepted += 1;
                }
                Err(e) => {
                    warn!(replica = %replica.client.address(), error = %e, "target push failed");
                    *replica.applied() = None;
                    last_err = Some(e);
                }
            }
        }

        if accepted == 0 {
            self.invalidate();
            return Err(ShardError::AllReplicasFailed {
                count: self.replicas.len(),
                last: last_err.map(|e| e.to_string()).unwrap_or_default(),
            });
        }
        Ok(pushed)
    }

    /// Reconcile a replica's applied-targets memory with what it reports.
    pub fn observe_report(&self, idx: usize, reported: &ScrapeStatusMap) {
        let Some(replica) = self.replicas.get(idx) else {
            return;
        };
        let mut applied = replica.applied();
        let drifted = applied
            .as_ref()
            .is_some_and(|keys| *keys != report_keys(reported));
        if drifted {
            debug!(replica = %replica.client.address(), "replica drifted from last push");
            *applied = None;
        }
    }

    /// Forget every replica's applied targets.
    pub fn invalidate(&self) {
        for replica in &self.replicas {
            *replica.applied() = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn applied_for(&self, idx: usize) -> Option<AssignmentKeys> {
        self.replicas.get(idx).and_then(|r| r.applied().clone())
    }
}

fn pick_best<T>(values: impl Iterator<Item = T>, better: impl Fn(&T, &T) -> bool) -> Option<T> {
    values.fold(None, |best, candidate| match best {
        Some(current) if !better(&candidate, &current) => Some(current),
        _ => Some(candidate),
    })
}

fn assignment_keys(targets: &TargetsByJob) -> AssignmentKeys {
    targets
        .values()
        .flatten()
        .map(|t| (t.hash, t.state))
        .collect()
}

fn report_keys(reported: &ScrapeStatusMap) -> AssignmentKeys {
    reported.iter().map(|(h, s)| (*h, s.state)).collect()
}
