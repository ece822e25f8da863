mod support;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use schwab_history::client::{AccountResolver, FetchOptions, TransactionFetcher};
use schwab_history::config::ResolvedConfig;
use schwab_history::models::DateRange;
use schwab_history::{ApiError, TransactionService, ValidationMode};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{credential_store, http_transport, mount_token_endpoint, TOKEN_PATH};

const ACCOUNTS_BODY: &str = r#"[
    {"accountNumber": "11112222", "hashValue": "HASH-A"},
    {"accountNumber": "33334444", "hashValue": "HASH-B"}
]"#;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn mount_accounts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/accounts/accountNumbers"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ACCOUNTS_BODY, "application/json"))
        .mount(server)
        .await;
}

async fn mount_window(server: &MockServer, start: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/accounts/HASH-A/transactions"))
        .and(query_param("startDate", start))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(server)
        .await;
}

fn trade(id: &str, day: &str) -> String {
    format!(
        r#"{{"activityId": "{id}", "time": "{day}T15:00:00+0000", "type": "TRADE", "netAmount": -100.5,
            "transferItems": [{{"instrument": {{"symbol": "MSFT", "assetType": "EQUITY"}}, "amount": 1, "price": 100.5}}]}}"#
    )
}

fn write_config(dir: &Path, server: &MockServer) -> Result<std::path::PathBuf> {
    let config_path = dir.join("schwab-history.toml");
    let mut file = std::fs::File::create(&config_path)?;
    writeln!(file, "api_base = \"{}\"", server.uri())?;
    writeln!(file, "token_url = \"{}{TOKEN_PATH}\"", server.uri())?;
    writeln!(file, "[client]")?;
    writeln!(file, "retry_base_delay = \"5ms\"")?;
    writeln!(file, "[fetch]")?;
    writeln!(file, "max_span_days = 30")?;
    writeln!(file, "[oauth]")?;
    writeln!(file, "client_id = \"app-key\"")?;
    writeln!(file, "client_secret = \"app-secret\"")?;

    // No expires_at: the first request has to refresh.
    std::fs::write(
        dir.join("token.json"),
        r#"{"access_token": "stale", "refresh_token": "refresh-1", "expires_in": 1800}"#,
    )?;
    Ok(config_path)
}

#[tokio::test]
async fn ninety_day_window_issues_three_ordered_requests() -> Result<()> {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "fresh", 1).await;
    mount_accounts(&server).await;
    mount_window(&server, "2024-01-01T00:00:00.000Z", format!("[{}]", trade("1", "2024-01-10"))).await;
    mount_window(&server, "2024-01-31T00:00:00.000Z", "[]".to_string()).await;
    mount_window(
        &server,
        "2024-03-01T00:00:00.000Z",
        format!("[{}, {}]", trade("2", "2024-03-02"), trade("3", "2024-03-29")),
    )
    .await;

    let dir = TempDir::new()?;
    let config_path = write_config(dir.path(), &server)?;
    let config = ResolvedConfig::load_or_default(&config_path)?;
    let service = TransactionService::connect(&config)?;

    let batch = service
        .get_transactions("11112222", date(2024, 1, 1), date(2024, 3, 30))
        .await?;

    let ids: Vec<_> = batch
        .records
        .iter()
        .map(|r| r.transaction_id.as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);

    let starts: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().ends_with("/transactions"))
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "startDate")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    assert_eq!(
        starts,
        vec![
            "2024-01-01T00:00:00.000Z",
            "2024-01-31T00:00:00.000Z",
            "2024-03-01T00:00:00.000Z"
        ]
    );

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("token.json"))?)?;
    assert_eq!(saved["access_token"], "fresh");
    assert_eq!(saved["refresh_token"], "rotated-refresh");
    assert!(saved.get("expires_at").is_some());
    Ok(())
}

#[tokio::test]
async fn refetching_the_same_window_yields_identical_records() -> Result<()> {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_window(
        &server,
        "2024-05-01T00:00:00.000Z",
        format!("[{}, {}]", trade("7", "2024-05-02"), trade("8", "2024-05-03")),
    )
    .await;

    let transport = Arc::new(http_transport(&server, credential_store(&server, "token")));
    let service = TransactionService::new(transport, FetchOptions::default(), ValidationMode::Strict);

    let first = service
        .get_transactions("11112222", date(2024, 5, 1), date(2024, 5, 31))
        .await?;
    let second = service
        .get_transactions("11112222", date(2024, 5, 1), date(2024, 5, 31))
        .await?;

    assert_eq!(first, second);
    assert_eq!(first.records.len(), 2);
    Ok(())
}

#[tokio::test]
async fn lenient_fetch_skips_records_without_id() -> Result<()> {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_window(
        &server,
        "2024-05-01T00:00:00.000Z",
        format!(
            r#"[{}, {{"type": "TRADE", "time": "2024-05-04T10:00:00+0000", "netAmount": 1}}]"#,
            trade("7", "2024-05-02")
        ),
    )
    .await;

    let transport = Arc::new(http_transport(&server, credential_store(&server, "token")));
    let strict = TransactionService::new(transport.clone(), FetchOptions::default(), ValidationMode::Strict);
    let lenient = TransactionService::new(transport, FetchOptions::default(), ValidationMode::Lenient);

    let err = strict
        .get_transactions("11112222", date(2024, 5, 1), date(2024, 5, 31))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(ref e) if e.field == "id"), "{err}");

    let batch = lenient
        .get_transactions("11112222", date(2024, 5, 1), date(2024, 5, 31))
        .await?;
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.skipped_count(), 1);
    Ok(())
}

#[tokio::test]
async fn failing_sub_range_is_named_in_the_error() -> Result<()> {
    let server = MockServer::start().await;
    mount_window(&server, "2024-01-01T00:00:00.000Z", "[]".to_string()).await;
    Mock::given(method("GET"))
        .and(path("/accounts/HASH-A/transactions"))
        .and(query_param("startDate", "2024-01-31T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(400).set_body_string("too many days"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = Arc::new(http_transport(&server, credential_store(&server, "token")));
    let options = FetchOptions {
        max_span_days: 30,
        ..FetchOptions::default()
    };
    let fetcher = TransactionFetcher::new(transport, options);
    let range = DateRange::new(date(2024, 1, 1), date(2024, 2, 15))?;

    let err = fetcher
        .fetch_transactions("HASH-A", range)
        .collect()
        .await
        .unwrap_err();

    match err {
        ApiError::SubRange { range, source } => {
            assert_eq!(range.start(), date(2024, 1, 31));
            assert_eq!(range.end(), date(2024, 2, 15));
            assert!(matches!(*source, ApiError::ClientRequest { status: 400, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn resolver_finds_accounts_by_number() -> Result<()> {
    let server = MockServer::start().await;
    mount_accounts(&server).await;

    let transport = Arc::new(http_transport(&server, credential_store(&server, "token")));
    let resolver = AccountResolver::new(transport);

    let accounts = resolver.list_accounts().await?;
    assert_eq!(accounts.len(), 2);
    assert_eq!(resolver.find_account("33334444").await?.account_hash, "HASH-B");

    let err = resolver.find_account("00000000").await.unwrap_err();
    assert!(matches!(err, ApiError::UnknownAccount(_)));
    Ok(())
}
