//! Activity aggregation over parsed records: group totals, top-N tables and
//! time-bucketed series with `mean + k·std` spike flagging.
//!
//! Offsets are normalized to UTC here, not during extraction.

use crate::classify::AgentGroup;
use crate::record::ParsedRecord;
use ahash::AHashMap;
use chrono::{DateTime, TimeZone, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Minute,
    FiveMinutes,
    Hour,
}

impl Granularity {
    pub fn seconds(self) -> i64 {
        match self {
            Granularity::Minute => 60,
            Granularity::FiveMinutes => 300,
            Granularity::Hour => 3600,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateOpts {
    pub granularity: Granularity,
    /// k in `count > mean + k·std`.
    pub spike_multiplier: f64,
    /// Buckets a user-agent needs before it is checked for spikes.
    pub min_samples: usize,
    pub top_n: usize,
    /// Count `Other` / `Unknown` traffic in the path and IP tables.
    pub include_other: bool,
}

impl Default for AggregateOpts {
    fn default() -> Self {
        Self {
            granularity: Granularity::Minute,
            spike_multiplier: 3.0,
            min_samples: 10,
            top_n: 50,
            include_other: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountItem {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub bucket: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    pub key: String,
    pub bucket: DateTime<Utc>,
    pub count: usize,
    pub threshold: f64,
}

/// One user-agent with its own top paths and client IPs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDetail {
    pub agent: String,
    pub group: AgentGroup,
    pub count: usize,
    pub top_paths: Vec<CountItem>,
    pub top_ips: Vec<CountItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub total_requests: usize,
    pub timestamped_requests: usize,
    pub static_asset_requests: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub by_group: BTreeMap<AgentGroup, usize>,
    pub status_classes: BTreeMap<String, usize>,
    pub top_user_agents: Vec<CountItem>,
    pub top_paths: Vec<CountItem>,
    pub top_ips: Vec<CountItem>,
    pub top_sections: Vec<CountItem>,
    pub agents: Vec<AgentDetail>,
    pub group_series: BTreeMap<AgentGroup, Vec<SeriesPoint>>,
    pub group_spikes: Vec<Spike>,
    pub agent_spikes: Vec<Spike>,
}

/// Incremental aggregator; feed records in arrival order, then `finish`.
pub struct ActivityAggregator {
    opts: AggregateOpts,
    total: usize,
    timestamped: usize,
    static_assets: usize,
    min_ts: Option<DateTime<Utc>>,
    max_ts: Option<DateTime<Utc>>,
    by_group: BTreeMap<AgentGroup, usize>,
    status_classes: BTreeMap<String, usize>,
    agents: AHashMap<String, usize>,
    agent_groups: AHashMap<String, AgentGroup>,
    agent_paths: AHashMap<String, AHashMap<String, usize>>,
    agent_ips: AHashMap<String, AHashMap<String, usize>>,
    paths: AHashMap<String, usize>,
    ips: AHashMap<String, usize>,
    sections: AHashMap<String, usize>,
    group_buckets: BTreeMap<AgentGroup, BTreeMap<i64, usize>>,
    agent_buckets: AHashMap<String, BTreeMap<i64, usize>>,
}

impl ActivityAggregator {
    pub fn new(opts: AggregateOpts) -> Self {
        Self {
            opts,
            total: 0,
            timestamped: 0,
            static_assets: 0,
            min_ts: None,
            max_ts: None,
            by_group: BTreeMap::new(),
            status_classes: BTreeMap::new(),
            agents: AHashMap::new(),
            agent_groups: AHashMap::new(),
            agent_paths: AHashMap::new(),
            agent_ips: AHashMap::new(),
            paths: AHashMap::new(),
            ips: AHashMap::new(),
            sections: AHashMap::new(),
            group_buckets: BTreeMap::new(),
            agent_buckets: AHashMap::new(),
        }
    }

    pub fn push(&mut self, rec: &ParsedRecord) {
        self.total += 1;
        *self.by_group.entry(rec.agent_group).or_insert(0) += 1;
        *self.status_classes.entry(rec.status_class.clone()).or_insert(0) += 1;
        *self.agents.entry(rec.user_agent_canonical.clone()).or_insert(0) += 1;
        self.agent_groups
            .entry(rec.user_agent_canonical.clone())
            .or_insert(rec.agent_group);
        *self
            .agent_paths
            .entry(rec.user_agent_canonical.clone())
            .or_default()
            .entry(rec.path_clean.clone())
            .or_insert(0) += 1;
        *self
            .agent_ips
            .entry(rec.user_agent_canonical.clone())
            .or_default()
            .entry(rec.client_ip.clone())
            .or_insert(0) += 1;
        if rec.is_static_asset {
            self.static_assets += 1;
        }

        let counts_in_tables = self.opts.include_other
            || !matches!(rec.agent_group, AgentGroup::Other | AgentGroup::Unknown);
        if counts_in_tables {
            *self.paths.entry(rec.path_clean.clone()).or_insert(0) += 1;
            *self.ips.entry(rec.client_ip.clone()).or_insert(0) += 1;
            *self.sections.entry(rec.url_section.clone()).or_insert(0) += 1;
        }

        if let Some(ts) = rec.timestamp {
            let utc = ts.with_timezone(&Utc);
            self.timestamped += 1;
            self.min_ts = Some(self.min_ts.map_or(utc, |m| m.min(utc)));
            self.max_ts = Some(self.max_ts.map_or(utc, |m| m.max(utc)));
            let bucket = floor_epoch(utc.timestamp(), self.opts.granularity.seconds());
            *self
                .group_buckets
                .entry(rec.agent_group)
                .or_default()
                .entry(bucket)
                .or_insert(0) += 1;
            *self
                .agent_buckets
                .entry(rec.user_agent_canonical.clone())
                .or_default()
                .entry(bucket)
                .or_insert(0) += 1;
        }
    }

    pub fn finish(self) -> ActivitySummary {
        let k = self.opts.spike_multiplier;

        // Group series share one bucket axis; buckets a group never hit count as zero.
        let axis: BTreeSet<i64> = self
            .group_buckets
            .values()
            .flat_map(|m| m.keys().copied())
            .collect();
        let mut group_series = BTreeMap::new();
        let mut group_spikes = Vec::new();
        for (group, buckets) in &self.group_buckets {
            let series: Vec<(i64, usize)> = axis
                .iter()
                .map(|b| (*b, buckets.get(b).copied().unwrap_or(0)))
                .collect();
            group_spikes.extend(compute_spikes(group.as_str(), &series, k));
            group_series.insert(
                *group,
                series
                    .iter()
                    .filter_map(|(b, c)| bucket_time(*b).map(|t| SeriesPoint { bucket: t, count: *c }))
                    .collect(),
            );
        }

        let mut agent_spikes = Vec::new();
        for (agent, buckets) in self.agent_buckets.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            if buckets.len() < self.opts.min_samples {
                continue;
            }
            let series: Vec<(i64, usize)> = buckets.iter().map(|(b, c)| (*b, *c)).collect();
            agent_spikes.extend(compute_spikes(agent, &series, k));
        }
        group_spikes.sort_by(|a, b| b.bucket.cmp(&a.bucket).then_with(|| a.key.cmp(&b.key)));
        agent_spikes.sort_by(|a, b| b.bucket.cmp(&a.bucket).then_with(|| a.key.cmp(&b.key)));

        let n = self.opts.top_n;
        let top_user_agents = top_n(self.agents, n);
        let mut agent_paths = self.agent_paths;
        let mut agent_ips = self.agent_ips;
        let agents = top_user_agents
            .iter()
            .map(|item| AgentDetail {
                agent: item.name.clone(),
                group: self.agent_groups.get(&item.name).copied().unwrap_or(AgentGroup::Unknown),
                count: item.count,
                top_paths: top_n(agent_paths.remove(&item.name).unwrap_or_default(), n),
                top_ips: top_n(agent_ips.remove(&item.name).unwrap_or_default(), n),
            })
            .collect();
        ActivitySummary {
            total_requests: self.total,
            timestamped_requests: self.timestamped,
            static_asset_requests: self.static_assets,
            start: self.min_ts,
            end: self.max_ts,
            by_group: self.by_group,
            status_classes: self.status_classes,
            top_user_agents,
            top_paths: top_n(self.paths, n),
            top_ips: top_n(self.ips, n),
            top_sections: top_n(self.sections, n),
            agents,
            group_series,
            group_spikes,
            agent_spikes,
        }
    }
}

pub fn summarize(records: &[ParsedRecord], opts: AggregateOpts) -> ActivitySummary {
    let mut agg = ActivityAggregator::new(opts);
    for r in records {
        agg.push(r);
    }
    agg.finish()
}

fn top_n(counts: AHashMap<String, usize>, n: usize) -> Vec<CountItem> {
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(n)
        .map(|(name, count)| CountItem { name, count })
        .collect()
}

fn floor_epoch(secs: i64, width: i64) -> i64 {
    if width <= 0 { return secs; }
    secs - secs.rem_euclid(width)
}

fn bucket_time(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Buckets whose count exceeds `mean + k·std` (population std) of the series.
pub fn compute_spikes(key: &str, series: &[(i64, usize)], k: f64) -> Vec<Spike> {
    if series.is_empty() {
        return vec![];
    }
    let n = series.len() as f64;
    let mean = series.iter().map(|(_, c)| *c as f64).sum::<f64>() / n;
    let var = series
        .iter()
        .map(|(_, c)| {
            let x = *c as f64;
            (x - mean) * (x - mean)
        })
        .sum::<f64>()
        / n;
    let threshold = mean + k * var.sqrt();
    series
        .iter()
        .filter(|(_, c)| (*c as f64) > threshold)
        .filter_map(|(b, c)| {
            bucket_time(*b).map(|t| Spike { key: key.to_string(), bucket: t, count: *c, threshold })
        })
        .collect()
}
