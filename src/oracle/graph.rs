//! Directed currency graph over the declared pairs of every provider.
//!
//! Nodes are currency symbols; an edge runs base -> quote for each declared
//! pair, tagged with the providers declaring it. The converter asks two
//! things of the graph: whether a symbol can reach the target numeraire at
//! all, and the order in which symbols become resolvable against it.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ProviderName, ProviderPairs};

#[derive(Debug, Default)]
pub struct CurrencyGraph {
    /// base -> quote -> providers declaring the pair.
    edges: BTreeMap<String, BTreeMap<String, BTreeSet<ProviderName>>>,
}

impl CurrencyGraph {
    pub fn from_provider_pairs(provider_pairs: &ProviderPairs) -> Self {
        let mut graph = CurrencyGraph::default();
        for (provider, pairs) in provider_pairs {
            for pair in pairs {
                graph
                    .edges
                    .entry(pair.base.clone())
                    .or_default()
                    .entry(pair.quote.clone())
                    .or_default()
                    .insert(*provider);
            }
        }
        graph
    }

    /// Quotes declared for `base`, in sorted order.
    pub fn quotes_of(&self, base: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(base)
            .into_iter()
            .flat_map(|quotes| quotes.keys().map(String::as_str))
    }

    /// Whether `to` can be reached from `from` along base -> quote edges.
    pub fn reachable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut queue = vec![from];
        while let Some(symbol) = queue.pop() {
            if !visited.insert(symbol) {
                continue;
            }
            for quote in self.quotes_of(symbol) {
                if quote == to {
                    return true;
                }
                queue.push(quote);
            }
        }
        false
    }

    /// Order in which symbols can be resolved against `target`.
    ///
    /// A symbol is emitted only once every dependency that can itself reach
    /// the target has been emitted, so multi-path symbols see all of their
    /// routes. When only cycles remain, the sorted-first symbol with at least
    /// one already-usable edge is admitted (its cycle edges contribute
    /// nothing); symbols whose every route runs through an unanchored cycle
    /// are never emitted.
    pub fn resolution_order(&self, target: &str) -> Vec<String> {
        let candidates: BTreeSet<&str> = self
            .edges
            .keys()
            .map(String::as_str)
            .filter(|base| *base != target && self.reachable(base, target))
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(candidates.len());
        let mut done: BTreeSet<&str> = BTreeSet::new();
        let mut remaining: BTreeSet<&str> = candidates.clone();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|base| {
                    self.quotes_of(base)
                        .filter(|q| *q != target && candidates.contains(q))
                        .all(|dep| done.contains(dep))
                })
                .collect();

            let admitted = if !ready.is_empty() {
                ready
            } else {
                // Every remaining symbol waits on a cycle. Admit the first
                // one that already has a resolvable edge.
                match remaining.iter().copied().find(|base| {
                    self.quotes_of(base)
                        .any(|q| q == target || done.contains(q))
                }) {
                    Some(base) => vec![base],
                    None => break,
                }
            };

            for base in admitted {
                remaining.remove(base);
                done.insert(base);
                order.push(base.to_string());
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CurrencyPair;

    fn pairs(declared: &[(ProviderName, &str, &str)]) -> ProviderPairs {
        let mut out = ProviderPairs::new();
        for (provider, base, quote) in declared {
            out.entry(*provider)
                .or_default()
                .push(CurrencyPair::new(*base, *quote));
        }
        out
    }

    #[test]
    fn test_reachability_follows_chains() {
        let graph = CurrencyGraph::from_provider_pairs(&pairs(&[
            (ProviderName::Osmosis, "STATOM", "ATOM"),
            (ProviderName::Binance, "ATOM", "USDT"),
            (ProviderName::Kraken, "USDT", "USD"),
        ]));
        assert!(graph.reachable("STATOM", "USD"));
        assert!(graph.reachable("ATOM", "USD"));
        assert!(!graph.reachable("USD", "ATOM"));
    }

    #[test]
    fn test_resolution_order_is_leaves_first() {
        let graph = CurrencyGraph::from_provider_pairs(&pairs(&[
            (ProviderName::Osmosis, "STATOM", "ATOM"),
            (ProviderName::Binance, "ATOM", "USDT"),
            (ProviderName::Kraken, "USDT", "USD"),
        ]));
        assert_eq!(graph.resolution_order("USD"), vec!["USDT", "ATOM", "STATOM"]);
    }

    #[test]
    fn test_resolution_waits_for_every_route() {
        // BTC is quoted both in USD directly and through USDT; USDT must
        // come first so both routes contribute.
        let graph = CurrencyGraph::from_provider_pairs(&pairs(&[
            (ProviderName::Binance, "ETH", "BTC"),
            (ProviderName::Binance, "BTC", "USD"),
            (ProviderName::Binance, "BTC", "USDT"),
            (ProviderName::Binance, "USDT", "USD"),
        ]));
        assert_eq!(graph.resolution_order("USD"), vec!["USDT", "BTC", "ETH"]);
    }

    #[test]
    fn test_unanchored_cycle_is_unresolved() {
        let graph = CurrencyGraph::from_provider_pairs(&pairs(&[
            (ProviderName::Binance, "AAA", "BBB"),
            (ProviderName::Kraken, "BBB", "AAA"),
        ]));
        assert!(graph.resolution_order("USD").is_empty());
    }

    #[test]
    fn test_anchored_cycle_resolves_through_the_anchor() {
        let graph = CurrencyGraph::from_provider_pairs(&pairs(&[
            (ProviderName::Binance, "AAA", "BBB"),
            (ProviderName::Kraken, "BBB", "AAA"),
            (ProviderName::Kraken, "BBB", "USD"),
        ]));
        assert_eq!(graph.resolution_order("USD"), vec!["BBB", "AAA"]);
    }

    #[test]
    fn test_unconvertible_symbol_is_absent() {
        let graph = CurrencyGraph::from_provider_pairs(&pairs(&[
            (ProviderName::Binance, "FOO", "BAR"),
            (ProviderName::Binance, "ATOM", "USD"),
        ]));
        assert_eq!(graph.resolution_order("USD"), vec!["ATOM"]);
    }
}
