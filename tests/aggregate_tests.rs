use botscope::aggregate::{compute_spikes, summarize, AggregateOpts, Granularity};
use botscope::{parse_reader, AgentGroup, ParsedRecord};
use std::io::Cursor;

fn line(ip: &str, minute: u32, path: &str, status: u16, ua: &str) -> String {
    format!(r#"{ip} - - [19/Sep/2025:10:{minute:02}:00 +0000] "GET {path} HTTP/1.1" {status} 100 "-" "{ua}""#)
}

fn records(lines: &[String]) -> Vec<ParsedRecord> {
    parse_reader(Cursor::new(lines.join("\n").into_bytes())).unwrap().records
}

#[test]
fn totals_by_group_and_status() {
    let recs = records(&[
        line("1.1.1.1", 0, "/a", 200, "GPTBot/1.0"),
        line("1.1.1.1", 0, "/b", 200, "GPTBot/1.0"),
        line("2.2.2.2", 1, "/a", 404, "Googlebot/2.1"),
        line("3.3.3.3", 2, "/style.css", 200, "Mozilla/5.0 Firefox"),
    ]);
    let s = summarize(&recs, AggregateOpts::default());
    assert_eq!(s.total_requests, 4);
    assert_eq!(s.timestamped_requests, 4);
    assert_eq!(s.static_asset_requests, 1);
    assert_eq!(s.by_group[&AgentGroup::AiAgent], 2);
    assert_eq!(s.by_group[&AgentGroup::SearchEngine], 1);
    assert_eq!(s.by_group[&AgentGroup::Other], 1);
    assert_eq!(s.status_classes["2xx"], 3);
    assert_eq!(s.status_classes["4xx"], 1);
    assert_eq!(s.start.unwrap().to_rfc3339(), "2025-09-19T10:00:00+00:00");
    assert_eq!(s.end.unwrap().to_rfc3339(), "2025-09-19T10:02:00+00:00");
}

#[test]
fn top_tables_sort_by_count_then_name() {
    let recs = records(&[
        line("1.1.1.1", 0, "/b", 200, "GPTBot/1.0"),
        line("1.1.1.1", 0, "/a", 200, "GPTBot/1.0"),
        line("2.2.2.2", 0, "/a", 200, "GPTBot/1.0"),
        line("3.3.3.3", 0, "/c", 200, "GPTBot/1.0"),
    ]);
    let s = summarize(&recs, AggregateOpts { top_n: 2, ..AggregateOpts::default() });
    let paths: Vec<(&str, usize)> = s.top_paths.iter().map(|c| (c.name.as_str(), c.count)).collect();
    assert_eq!(paths, vec![("/a", 2), ("/b", 1)]);
    assert_eq!(s.top_ips[0].name, "1.1.1.1");
    assert_eq!(s.top_user_agents[0].name, "GPTBot");
    assert_eq!(s.top_sections.len(), 2);
}

#[test]
fn per_agent_details_list_their_own_paths_and_ips() {
    let recs = records(&[
        line("1.1.1.1", 0, "/docs/x", 200, "GPTBot/1.0"),
        line("1.1.1.1", 0, "/docs/x", 200, "GPTBot/1.0"),
        line("9.9.9.9", 0, "/home", 200, "Googlebot/2.1"),
    ]);
    let s = summarize(&recs, AggregateOpts::default());
    let gpt = s.agents.iter().find(|a| a.agent == "GPTBot").unwrap();
    assert_eq!(gpt.group, AgentGroup::AiAgent);
    assert_eq!(gpt.count, 2);
    assert_eq!(gpt.top_paths[0].name, "/docs/x");
    assert_eq!(gpt.top_ips.len(), 1);
    let google = s.agents.iter().find(|a| a.agent == "Googlebot").unwrap();
    assert_eq!(google.top_ips[0].name, "9.9.9.9");
}

#[test]
fn other_traffic_can_be_left_out_of_tables() {
    let recs = records(&[
        line("1.1.1.1", 0, "/bot-page", 200, "GPTBot/1.0"),
        line("2.2.2.2", 0, "/human-page", 200, "Mozilla/5.0 Firefox"),
        line("3.3.3.3", 0, "/anon", 200, "-"),
    ]);
    let s = summarize(&recs, AggregateOpts { include_other: false, ..AggregateOpts::default() });
    assert_eq!(s.top_paths.len(), 1);
    assert_eq!(s.top_paths[0].name, "/bot-page");
    assert_eq!(s.top_ips.len(), 1);
    // group totals still see everything
    assert_eq!(s.total_requests, 3);
    assert_eq!(s.by_group[&AgentGroup::Unknown], 1);
}

#[test]
fn group_series_share_a_zero_filled_axis() {
    let recs = records(&[
        line("1.1.1.1", 0, "/", 200, "GPTBot/1.0"),
        line("2.2.2.2", 5, "/", 200, "Googlebot/2.1"),
    ]);
    let s = summarize(&recs, AggregateOpts::default());
    let ai = &s.group_series[&AgentGroup::AiAgent];
    let search = &s.group_series[&AgentGroup::SearchEngine];
    assert_eq!(ai.len(), 2);
    assert_eq!(search.len(), 2);
    assert_eq!(ai[0].count, 1);
    assert_eq!(ai[1].count, 0);
    assert_eq!(search[0].bucket, ai[0].bucket);
}

#[test]
fn coarser_granularity_merges_buckets() {
    let recs = records(&[
        line("1.1.1.1", 0, "/", 200, "GPTBot/1.0"),
        line("1.1.1.1", 4, "/", 200, "GPTBot/1.0"),
        line("1.1.1.1", 7, "/", 200, "GPTBot/1.0"),
    ]);
    let s = summarize(&recs, AggregateOpts { granularity: Granularity::FiveMinutes, ..AggregateOpts::default() });
    let counts: Vec<usize> = s.group_series[&AgentGroup::AiAgent].iter().map(|p| p.count).collect();
    assert_eq!(counts, vec![2, 1]);
    assert_eq!(Granularity::Hour.seconds(), 3600);
}

#[test]
fn spike_rule_flags_outliers_only() {
    let mut series: Vec<(i64, usize)> = (0..9).map(|i| (i * 60, 1)).collect();
    series.push((540, 20));
    let spikes = compute_spikes("GPTBot", &series, 2.0);
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].count, 20);
    assert_eq!(spikes[0].key, "GPTBot");
    assert_eq!(spikes[0].bucket.timestamp(), 540);

    let flat: Vec<(i64, usize)> = (0..10).map(|i| (i * 60, 4)).collect();
    assert!(compute_spikes("flat", &flat, 0.0).is_empty());
    assert!(compute_spikes("none", &[], 3.0).is_empty());
}

#[test]
fn agent_spikes_need_enough_buckets() {
    let mut lines: Vec<String> = (0..12).map(|m| line("1.1.1.1", m, "/", 200, "GPTBot/1.0")).collect();
    for _ in 0..30 {
        lines.push(line("1.1.1.1", 12, "/", 200, "GPTBot/1.0"));
    }
    let recs = records(&lines);

    let s = summarize(&recs, AggregateOpts { spike_multiplier: 2.0, ..AggregateOpts::default() });
    assert_eq!(s.agent_spikes.len(), 1);
    assert_eq!(s.agent_spikes[0].count, 30);

    let strict = summarize(&recs, AggregateOpts { spike_multiplier: 2.0, min_samples: 20, ..AggregateOpts::default() });
    assert!(strict.agent_spikes.is_empty());
}

#[test]
fn summary_serializes_group_keys_as_labels() {
    let recs = records(&[line("1.1.1.1", 0, "/", 200, "GPTBot/1.0")]);
    let v = serde_json::to_value(summarize(&recs, AggregateOpts::default())).unwrap();
    assert_eq!(v["by_group"]["AIAgent"], 1);
    assert_eq!(v["total_requests"], 1);
}
