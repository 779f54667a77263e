use std::{collections::HashMap, future::Future, hash::Hash, pin::pin};

use futures::{stream, StreamExt};

/// Runs async work over a sequence with at most `limit` units in flight.
///
/// All units are polled from the calling task, so work interleaves at await points
/// but never runs in parallel. The first `limit` items start immediately, and each
/// completion admits the next item until the input is exhausted.
///
/// Failure policy: the first error is returned as soon as it is observed. Siblings
/// still in flight are dropped at that point, and items not yet started never start.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyPool {
    limit: usize,
}

impl ConcurrencyPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs `f` over every item, discarding the results. Completion order is unconstrained.
    pub async fn each<I, F, Fut, E>(&self, items: I, f: F) -> Result<(), E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut in_flight = pin!(stream::iter(items).map(f).buffer_unordered(self.limit));
        while let Some(result) = in_flight.next().await {
            result?;
        }
        Ok(())
    }

    /// Runs `f` over every item and folds the keyed contributions each call returns
    /// into one map. A call may contribute zero, one or many entries; later entries
    /// for a key replace earlier ones, in completion order.
    pub async fn map_to_object<I, F, Fut, C, K, V, E>(
        &self,
        items: I,
        f: F,
    ) -> Result<HashMap<K, V>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<C, E>>,
        C: IntoIterator<Item = (K, V)>,
        K: Eq + Hash,
    {
        let mut map = HashMap::new();
        let mut in_flight = pin!(stream::iter(items).map(f).buffer_unordered(self.limit));
        while let Some(contributions) = in_flight.next().await {
            map.extend(contributions?);
        }
        Ok(map)
    }

    /// Runs `f` with the same bound, but hands results to `consume` strictly in input
    /// order. `consume` runs synchronously between polls, so it may hold `&mut` state
    /// that the in-flight futures never see.
    pub async fn each_ordered<I, F, Fut, T, C, E>(
        &self,
        items: I,
        f: F,
        mut consume: C,
    ) -> Result<(), E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnMut(T) -> Result<(), E>,
    {
        let mut in_flight = pin!(stream::iter(items).map(f).buffered(self.limit));
        while let Some(result) = in_flight.next().await {
            consume(result?)?;
        }
        Ok(())
    }

    /// Collects results in input order.
    pub async fn map_ordered<I, F, Fut, T, E>(&self, items: I, f: F) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut results = Vec::new();
        self.each_ordered(items, f, |value| {
            results.push(value);
            Ok(())
        })
        .await?;
        Ok(results)
    }
}
