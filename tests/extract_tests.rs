use botscope::extract::{extract_fields, is_static_asset, normalize_path, parse_query, url_section, PLACEHOLDER};

const COMBINED: &str = r#"66.249.66.1 - - [19/Sep/2025:00:00:39 +0530] "GET /blog/post?id=7 HTTP/1.1" 200 5120 "https://example.com/" "Mozilla/5.0 (compatible; GPTBot/1.2)""#;

#[test]
fn combined_line_fills_every_field() {
    let f = extract_fields(COMBINED);
    assert_eq!(f.client_ip, "66.249.66.1");
    assert_eq!(f.timestamp.unwrap().offset().local_minus_utc(), 19_800);
    assert_eq!(f.method, "GET");
    assert_eq!(f.path, "/blog/post?id=7");
    assert_eq!(f.http_version, "HTTP/1.1");
    assert_eq!(f.status_code, "200");
    assert_eq!(f.bytes_sent, "5120");
    assert_eq!(f.referer, "https://example.com/");
    assert_eq!(f.user_agent, "Mozilla/5.0 (compatible; GPTBot/1.2)");
    assert!(!f.is_failed());
}

#[test]
fn common_log_format_leaves_referer_and_agent_as_placeholders() {
    let f = extract_fields(r#"10.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326"#);
    assert_eq!(f.path, "/apache_pb.gif");
    assert_eq!(f.status_code, "200");
    assert_eq!(f.bytes_sent, "2326");
    assert_eq!(f.referer, PLACEHOLDER);
    assert_eq!(f.user_agent, PLACEHOLDER);
}

#[test]
fn unquoted_request_uses_the_relaxed_pattern() {
    let f = extract_fields("10.0.0.1 - - [10/Oct/2000:13:55:36 -0700] GET /x/y HTTP/1.1 301 -");
    assert_eq!(f.method, "GET");
    assert_eq!(f.path, "/x/y");
    assert_eq!(f.status_code, "301");
    assert_eq!(f.bytes_sent, "-");
}

#[test]
fn odd_request_falls_back_to_first_quoted_group() {
    let f = extract_fields(r#"10.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "get index.html" 400 0"#);
    assert_eq!(f.method, "get");
    assert_eq!(f.path, "index.html");
    assert_eq!(f.http_version, PLACEHOLDER);
    assert_eq!(f.status_code, "400");
}

#[test]
fn digits_inside_quotes_do_not_pose_as_status() {
    let f = extract_fields(r#"1.2.3.4 - - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 302 - "-" "Agent 500 12 (x)""#);
    assert_eq!(f.status_code, "302");
    assert_eq!(f.bytes_sent, "-");
}

#[test]
fn numeric_authuser_is_not_taken_as_status() {
    let f = extract_fields(r#"10.0.0.1 - 501 [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 200 5 "-" "curl/8""#);
    assert_eq!(f.status_code, "200");
    assert_eq!(f.bytes_sent, "5");
    assert_eq!(f.user_agent, "curl/8");
}

#[test]
fn numeric_ident_is_not_taken_as_status() {
    let f = extract_fields(r#"10.0.0.1 404 - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 200 5"#);
    assert_eq!(f.status_code, "200");
    assert_eq!(f.bytes_sent, "5");
}

#[test]
fn status_after_timestamp_when_request_is_missing() {
    let f = extract_fields("10.0.0.1 - 302 [19/Sep/2025:00:00:39 +0000] - 404 0");
    assert_eq!(f.method, PLACEHOLDER);
    assert_eq!(f.status_code, "404");
    assert_eq!(f.bytes_sent, "0");
}

#[test]
fn status_without_bytes_is_still_found() {
    let f = extract_fields(r#"1.2.3.4 - - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 499"#);
    assert_eq!(f.status_code, "499");
    assert_eq!(f.bytes_sent, PLACEHOLDER);
}

#[test]
fn unterminated_agent_runs_to_end_of_entry() {
    let f = extract_fields(r#"1.2.3.4 - - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 200 5 "-" "Mozilla/5.0 (cut"#);
    assert_eq!(f.user_agent, "Mozilla/5.0 (cut");
    assert_eq!(f.referer, "-");
}

#[test]
fn agent_without_referer_skips_the_request_group() {
    let f = extract_fields(r#"1.2.3.4 - - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 200 5 "curl/8.4""#);
    assert_eq!(f.user_agent, "curl/8.4");
    assert_eq!(f.referer, PLACEHOLDER);
}

#[test]
fn client_ip_falls_back_to_first_ipv4_before_timestamp() {
    let f = extract_fields(r#"edge-7 10.1.2.3 - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 200 5"#);
    assert_eq!(f.client_ip, "10.1.2.3");
    let v6 = extract_fields(r#"2001:db8::1 - - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 200 5"#);
    assert_eq!(v6.client_ip, "2001:db8::1");
    let none = extract_fields(r#"edge-7 - - [19/Sep/2025:00:00:39 +0000] "GET / HTTP/1.1" 200 5"#);
    assert_eq!(none.client_ip, PLACEHOLDER);
}

#[test]
fn garbage_is_failed_with_every_field_placeheld() {
    let f = extract_fields("%%% totally not a log line %%%");
    assert!(f.is_failed());
    for v in [&f.client_ip, &f.method, &f.path, &f.http_version, &f.status_code, &f.bytes_sent, &f.referer, &f.user_agent] {
        assert_eq!(v, PLACEHOLDER);
    }
    assert!(f.timestamp.is_none());
}

#[test]
fn partial_entry_is_not_failed() {
    // a status alone is enough to keep the entry
    let f = extract_fields("something 503 happened");
    assert!(!f.is_failed());
    assert_eq!(f.status_code, "503");
}

#[test]
fn path_normalization_splits_query_and_fragment() {
    let n = normalize_path("/a%20b/c.css?x=1&x=2&y=&z#frag");
    assert_eq!(n.path_clean, "/a b/c.css");
    assert_eq!(n.query_string, "x=1&x=2&y=&z");
    assert_eq!(n.query_params["x"], vec!["1", "2"]);
    assert_eq!(n.query_params["y"], vec![""]);
    assert_eq!(n.query_params["z"], vec![""]);
}

#[test]
fn absolute_urls_reduce_to_their_path() {
    assert_eq!(normalize_path("http://example.com/foo?q=1").path_clean, "/foo");
    assert_eq!(normalize_path("https://example.com").path_clean, "/");
}

#[test]
fn invalid_percent_utf8_keeps_raw_path() {
    let n = normalize_path("/bad%FF?q=1");
    assert_eq!(n.path_clean, "/bad%FF");
    assert_eq!(n.query_string, "q=1");
}

#[test]
fn missing_path_and_query_use_placeholders() {
    let n = normalize_path(PLACEHOLDER);
    assert_eq!(n.path_clean, PLACEHOLDER);
    assert_eq!(n.query_string, PLACEHOLDER);
    assert!(n.query_params.is_empty());
    assert_eq!(normalize_path("/plain?").query_string, PLACEHOLDER);
}

#[test]
fn query_values_decode_plus_and_percent() {
    let q = parse_query("q=hello+world&name=J%C3%BCrgen&=skipped");
    assert_eq!(q["q"], vec!["hello world"]);
    assert_eq!(q["name"], vec!["Jürgen"]);
    assert_eq!(q.len(), 2);
}

#[test]
fn static_assets_by_extension() {
    assert!(is_static_asset("/assets/app.CSS"));
    assert!(is_static_asset("/fonts/x.woff2"));
    assert!(is_static_asset("/img/logo.svg"));
    assert!(!is_static_asset("/v1.2/page"));
    assert!(!is_static_asset("/"));
    assert!(!is_static_asset("/index.html"));
}

#[test]
fn url_section_is_first_segment() {
    assert_eq!(url_section("/blog/2025/post"), "blog");
    assert_eq!(url_section("//docs"), "docs");
    assert_eq!(url_section("/"), PLACEHOLDER);
    assert_eq!(url_section(PLACEHOLDER), PLACEHOLDER);
}
