use assert_cmd::Command;
use once_cell::sync::Lazy;
use serde_json::json;
use std::fs;
use std::thread;
use tempfile::TempDir;

const FILTERS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:apps="http://schemas.google.com/apps/2006">
   <title>Mail Filters</title>
   <entry>
      <category term="filter"/>
      <title>Mail Filter</title>
      <id>tag:mail.google.com,2008:filter:1111</id>
      <updated>2023-01-01T00:00:00Z</updated>
      <content/>
      <apps:property name="from" value="Friend &lt;friend@example.com&gt;"/>
      <apps:property name="label" value="Friends"/>
   </entry>
</feed>
"#;

// A stub standing in for the Gmail API: two pages of ids, then
// per-message metadata. Started once and shared by every test.
static STUB_BASE: Lazy<String> = Lazy::new(|| {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let authorized = request.headers().iter().any(|header| {
                header.field.equiv("Authorization") && header.value.as_str() == "Bearer test-token"
            });
            let response = if authorized {
                tiny_http::Response::from_string(respond_to(request.url())).with_header(
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .unwrap(),
                )
            } else {
                tiny_http::Response::from_string("unauthorized").with_status_code(401)
            };
            let _ = request.respond(response);
        }
    });
    format!("http://127.0.0.1:{}/gmail/v1", port)
});

fn respond_to(url: &str) -> String {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    if path == "/gmail/v1/users/me/messages" {
        let page = if query.contains("pageToken=page-2") {
            json!({
                "messages": [{"id": "m4"}, {"id": "m5"}],
                "resultSizeEstimate": 5,
            })
        } else {
            json!({
                "messages": [{"id": "m1"}, {"id": "m2"}, {"id": "m3"}],
                "nextPageToken": "page-2",
                "resultSizeEstimate": 5,
            })
        };
        return page.to_string();
    }
    if let Some(id) = path.strip_prefix("/gmail/v1/users/me/messages/") {
        return message_json(id);
    }
    json!({}).to_string()
}

fn message_json(id: &str) -> String {
    let mut headers = vec![json!({"name": "Subject", "value": "hello"})];
    let from = match id {
        "m1" | "m2" => Some("News <news@example.com>"),
        "m3" => Some("Friend <friend@example.com>"),
        "m4" => Some("digest@example.org"),
        // m5 carries no From header at all.
        _ => None,
    };
    if let Some(value) = from {
        headers.push(json!({"name": "From", "value": value}));
    }
    json!({"id": id, "payload": {"headers": headers}}).to_string()
}

fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("mailFilters.xml"), FILTERS_XML).unwrap();
    let token = json!({
        "access_token": "test-token",
        "refresh_token": null,
        "expiry": "2099-01-01T00:00:00Z",
        "client_id": "id",
        "client_secret": "secret",
        "token_uri": "http://127.0.0.1:1/token",
    });
    fs::write(dir.path().join("token.json"), token.to_string()).unwrap();
    dir
}

fn run_scan(dir: &TempDir, count: &str) -> (bool, String) {
    let output = Command::cargo_bin("inbox-triage")
        .unwrap()
        .env("GMAIL_API_BASE", &*STUB_BASE)
        .arg("--dir")
        .arg(dir.path())
        .arg("--quiet")
        .arg("scan")
        .arg("-n")
        .arg(count)
        .output()
        .unwrap();
    (
        output.status.success(),
        String::from_utf8(output.stderr).unwrap(),
    )
}

#[test]
fn scan_counts_unfiltered_senders() {
    let dir = setup_workspace();
    let (success, stderr) = run_scan(&dir, "10");
    assert!(success, "scan failed: {}", stderr);

    // friend@example.com already has a rule, m5 has no From header:
    // only the news and digest senders are counted.
    let report = fs::read_to_string(dir.path().join("output.txt")).unwrap();
    let expected = "\
-----------------------------
BY ALPHABETICAL
digest@example.org || 1
news@example.com || 2
-----------------------------
BY FREQUENCY
news@example.com || 2
digest@example.org || 1
-----------------------------
";
    assert_eq!(report, expected);
}

#[test]
fn scan_honors_the_count_limit() {
    let dir = setup_workspace();
    let (success, stderr) = run_scan(&dir, "2");
    assert!(success, "scan failed: {}", stderr);

    // Only m1 and m2 are fetched.
    let report = fs::read_to_string(dir.path().join("output.txt")).unwrap();
    assert!(report.contains("news@example.com || 2"));
    assert!(!report.contains("digest@example.org"));
}
