//! Self time statistics over collapsed stacks.
//!
//! Hot paths rank whole call paths. The bottom-up view rolls self time up
//! by innermost function instead, so a helper reached from many call sites
//! shows up once with its combined cost.

use super::stack_builder::CollapsedStack;
use crate::parser::schema::HotPath;
use log::debug;
use std::collections::HashMap;

/// Share of total self time that `stacks_for_80_percent` covers
const COVERAGE_PERCENT: u64 = 80;

/// Rank call paths by self time
///
/// **Public** - main entry point for metrics calculation
///
/// # Arguments
/// * `stacks` - Collapsed stacks from stack_builder (any order)
/// * `total_self_time` - Denominator for percentages (µs)
/// * `top_n` - Number of paths to keep
///
/// # Returns
/// At most `top_n` paths with non-zero self time, heaviest first; ties are
/// broken by stack text so output is deterministic
pub fn calculate_hot_paths(
    stacks: &[CollapsedStack],
    total_self_time: u64,
    top_n: usize,
) -> Vec<HotPath> {
    let mut ranked: Vec<&CollapsedStack> = stacks.iter().filter(|s| s.weight > 0).collect();
    ranked.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.stack.cmp(&b.stack)));
    debug!("Ranked {} of {} stacks", ranked.len().min(top_n), stacks.len());

    ranked
        .into_iter()
        .take(top_n)
        .map(|stack| create_hot_path(stack, total_self_time))
        .collect()
}

pub fn create_hot_path(stack: &CollapsedStack, total_self_time: u64) -> HotPath {
    HotPath {
        stack: stack.stack.clone(),
        self_time_us: stack.weight,
        percentage: share_percent(stack.weight, total_self_time),
    }
}

/// Self time rolled up onto one function name
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSelfTime {
    pub name: String,
    pub self_time_us: u64,
    pub percentage: f64,
}

/// How self time spreads over call paths and functions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelfTimeDistribution {
    pub total_self_time_us: u64,
    pub stack_count: usize,

    /// Nearest-rank percentiles of per-stack self time
    pub p50_us: u64,
    pub p95_us: u64,
    pub max_us: u64,

    /// Fewest stacks whose combined self time reaches 80% of the total
    pub stacks_for_80_percent: usize,

    /// Innermost functions by combined self time, heaviest first
    pub bottom_up: Vec<FunctionSelfTime>,
}

/// Summarize self time over `stacks`
///
/// **Public** - feeds the process command's log output
pub fn calculate_self_time_distribution(stacks: &[CollapsedStack]) -> SelfTimeDistribution {
    let mut weights: Vec<u64> = stacks.iter().map(|s| s.weight).collect();
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return SelfTimeDistribution {
            stack_count: stacks.len(),
            ..Default::default()
        };
    }
    weights.sort_unstable();

    SelfTimeDistribution {
        total_self_time_us: total,
        stack_count: stacks.len(),
        p50_us: percentile(&weights, 50),
        p95_us: percentile(&weights, 95),
        max_us: weights.last().copied().unwrap_or(0),
        stacks_for_80_percent: stacks_to_cover(&weights, total),
        bottom_up: bottom_up(stacks, total),
    }
}

impl SelfTimeDistribution {
    /// True when the heaviest tenth of stacks (at least one) already holds
    /// 80% of self time
    pub fn is_concentrated(&self) -> bool {
        self.total_self_time_us > 0
            && self.stacks_for_80_percent <= self.stack_count.div_ceil(10)
    }

    pub fn summary(&self) -> String {
        let top = self
            .bottom_up
            .first()
            .map(|f| format!("{} ({:.1}%)", f.name, f.percentage))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "Total: {} µs | Stacks: {} | p50: {} µs | p95: {} µs | 80% in {} stacks | Top function: {}",
            self.total_self_time_us,
            self.stack_count,
            self.p50_us,
            self.p95_us,
            self.stacks_for_80_percent,
            top
        )
    }
}

/// **Private** - nearest-rank percentile of ascending, non-empty `sorted`
fn percentile(sorted: &[u64], p: usize) -> u64 {
    let rank = (sorted.len() * p).div_ceil(100).max(1);
    sorted[rank - 1]
}

/// **Private** - walks ascending `sorted` from the heavy end
fn stacks_to_cover(sorted: &[u64], total: u64) -> usize {
    let target = total * COVERAGE_PERCENT;
    let mut covered = 0u64;
    for (taken, weight) in sorted.iter().rev().enumerate() {
        covered += weight;
        if covered * 100 >= target {
            return taken + 1;
        }
    }
    sorted.len()
}

fn bottom_up(stacks: &[CollapsedStack], total: u64) -> Vec<FunctionSelfTime> {
    let mut by_function: HashMap<&str, u64> = HashMap::new();
    for stack in stacks.iter().filter(|s| s.weight > 0) {
        let leaf = stack.stack.rsplit(';').next().unwrap_or(&stack.stack);
        *by_function.entry(leaf).or_default() += stack.weight;
    }

    let mut functions: Vec<FunctionSelfTime> = by_function
        .into_iter()
        .map(|(name, self_time_us)| FunctionSelfTime {
            name: name.to_string(),
            self_time_us,
            percentage: share_percent(self_time_us, total),
        })
        .collect();
    functions.sort_by(|a, b| {
        b.self_time_us
            .cmp(&a.self_time_us)
            .then_with(|| a.name.cmp(&b.name))
    });
    functions
}

fn share_percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stack(text: &str, weight: u64) -> CollapsedStack {
        CollapsedStack::new(text.to_string(), weight)
    }

    fn page_stacks() -> Vec<CollapsedStack> {
        vec![
            stack("RunTask", 500),
            stack("RunTask;Paint", 3000),
            stack("RunTask;FunctionCall;Layout", 1500),
            stack("RunTask;Layout", 5000),
        ]
    }

    #[test]
    fn test_hot_paths_ranked_and_cut() {
        let hot_paths = calculate_hot_paths(&page_stacks(), 10000, 2);

        assert_eq!(hot_paths.len(), 2);
        assert_eq!(hot_paths[0].stack, "RunTask;Layout");
        assert_eq!(hot_paths[0].self_time_us, 5000);
        assert_eq!(hot_paths[0].percentage, 50.0);
        assert_eq!(hot_paths[1].stack, "RunTask;Paint");
    }

    #[test]
    fn test_hot_paths_skip_zero_and_break_ties_by_text() {
        let stacks = vec![stack("b", 10), stack("idle", 0), stack("a", 10)];
        let names: Vec<String> = calculate_hot_paths(&stacks, 20, 10)
            .into_iter()
            .map(|p| p.stack)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_distribution_percentiles_and_coverage() {
        let dist = calculate_self_time_distribution(&page_stacks());

        assert_eq!(dist.total_self_time_us, 10000);
        assert_eq!(dist.stack_count, 4);
        assert_eq!(dist.p50_us, 1500);
        assert_eq!(dist.p95_us, 5000);
        assert_eq!(dist.max_us, 5000);
        // 5000 + 3000 reaches 80%
        assert_eq!(dist.stacks_for_80_percent, 2);
        assert!(!dist.is_concentrated());
    }

    #[test]
    fn test_bottom_up_merges_leaf_functions() {
        let dist = calculate_self_time_distribution(&page_stacks());

        let rolled: Vec<(&str, u64)> = dist
            .bottom_up
            .iter()
            .map(|f| (f.name.as_str(), f.self_time_us))
            .collect();
        assert_eq!(
            rolled,
            vec![("Layout", 6500), ("Paint", 3000), ("RunTask", 500)]
        );
        assert_eq!(dist.bottom_up[0].percentage, 65.0);
        assert!(dist.summary().contains("Top function: Layout (65.0%)"));
    }

    #[test]
    fn test_single_heavy_stack_is_concentrated() {
        let stacks = vec![
            stack("a", 8500),
            stack("b", 1000),
            stack("c", 250),
            stack("d", 250),
        ];
        let dist = calculate_self_time_distribution(&stacks);
        assert_eq!(dist.stacks_for_80_percent, 1);
        assert!(dist.is_concentrated());
    }

    #[test]
    fn test_distribution_without_self_time() {
        let dist = calculate_self_time_distribution(&[]);
        assert_eq!(dist, SelfTimeDistribution::default());
        assert!(!dist.is_concentrated());

        let idle = calculate_self_time_distribution(&[stack("idle", 0)]);
        assert_eq!(idle.stack_count, 1);
        assert!(idle.bottom_up.is_empty());
        assert_eq!(create_hot_path(&stack("idle", 0), 0).percentage, 0.0);
    }
}
