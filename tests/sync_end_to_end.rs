//! Sync and query against a mock GitHub

use countysync::sync::{Availability, FileSyncState, SyncCoordinator};
use countysync::{Config, QueryService, SyncStore};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COUNTIES_2020: &str = "\
date,geoid,county,state,cases,cases_avg,cases_avg_per_100k,deaths,deaths_avg,deaths_avg_per_100k
2020-12-30,USA-53033,King,Washington,410,402.5,17.9,3,4.1,0.18
2020-12-31,USA-53033,King,Washington,,398.0,17.7,,4.0,0.18
2020-12-31,USA-53061,Snohomish,Washington,190,185.2,22.5,2,1.4,0.17
2020-12-31,,King,Washington,1,1,1,1,1,1
";

const COUNTIES_2021: &str = "\
date,geoid,county,state,cases,cases_avg,cases_avg_per_100k,deaths,deaths_avg,deaths_avg_per_100k
2021-01-01,USA-53033,King,Washington,523,420.1,18.7,5,4.3,0.19
";

const RAW_2020: &str = "/nytimes/covid-19-data/raw/master/rolling-averages/us-counties-2020.csv";
const RAW_2021: &str = "/nytimes/covid-19-data/raw/master/rolling-averages/us-counties-2021.csv";

fn commits(date: &str) -> serde_json::Value {
    json!([{
        "sha": "8d1c3a",
        "commit": { "committer": { "name": "nyt", "date": date } }
    }])
}

async fn mount_revision(server: &MockServer, file: &str, date: &str) {
    Mock::given(method("GET"))
        .and(path("/repos/nytimes/covid-19-data/commits"))
        .and(query_param("path", format!("rolling-averages/{}.csv", file)))
        .respond_with(ResponseTemplate::new(200).set_body_json(commits(date)))
        .mount(server)
        .await;
}

async fn setup(server: &MockServer) -> (QueryService, TempDir) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.init_paths(Some(tmp.path().to_path_buf()));
    config.upstream.api_base_url = server.uri();
    config.upstream.raw_base_url = server.uri();
    config.upstream.timeout_secs = 5;

    let store = SyncStore::connect(&config.paths.db_file).await.unwrap();
    let coordinator = SyncCoordinator::from_config(&config, store).unwrap();
    (QueryService::new(Arc::new(coordinator)), tmp)
}

#[tokio::test]
async fn test_sync_then_query_without_refetch() {
    let server = MockServer::start().await;
    mount_revision(&server, "us-counties-2020", "2021-03-01T12:00:00Z").await;
    mount_revision(&server, "us-counties-2021", "2021-03-02T12:00:00Z").await;
    Mock::given(method("GET"))
        .and(path(RAW_2020))
        .respond_with(ResponseTemplate::new(200).set_body_string(COUNTIES_2020))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RAW_2021))
        .respond_with(ResponseTemplate::new(200).set_body_string(COUNTIES_2021))
        .expect(1)
        .mount(&server)
        .await;

    let (service, _tmp) = setup(&server).await;

    let set = service
        .get_records_with_status("King", "Washington", None)
        .await;
    assert_eq!(set.availability, Availability::Fresh);
    let dates: Vec<_> = set.records.iter().map(|r| r.date.as_str()).collect();
    assert_eq!(dates, ["2020-12-30", "2020-12-31", "2021-01-01"]);
    assert_eq!(set.records[1].primary_metric, None);
    assert_eq!(set.records[1].primary_metric_avg, Some(398.0));
    assert_eq!(set.records[2].id, "2021-01-01-USA-53033");

    let report = service.coordinator().last_report().unwrap();
    assert_eq!(report.count(FileSyncState::Synced), 2);
    assert_eq!(report.rows_skipped(), 1);
    assert_eq!(report.records_upserted(), 4);

    // Unchanged revisions: answered from the replica without a raw download
    let latest = service.get_records("King", "Washington", Some(1)).await;
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].date, "2021-01-01");

    let report = service.coordinator().last_report().unwrap();
    assert_eq!(report.count(FileSyncState::UpToDate), 2);

    server.verify().await;
}

#[tokio::test]
async fn test_unavailable_upstream_serves_stale_rows() {
    let server = MockServer::start().await;
    mount_revision(&server, "us-counties-2020", "2021-03-01T12:00:00Z").await;
    Mock::given(method("GET"))
        .and(path("/repos/nytimes/covid-19-data/commits"))
        .and(query_param("path", "rolling-averages/us-counties-2021.csv"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RAW_2020))
        .respond_with(ResponseTemplate::new(200).set_body_string(COUNTIES_2020))
        .mount(&server)
        .await;

    let (service, _tmp) = setup(&server).await;

    let set = service
        .get_records_with_status("Snohomish", "Washington", None)
        .await;
    assert_eq!(set.availability, Availability::Stale);
    assert_eq!(set.records.len(), 1);

    let report = service.coordinator().last_report().unwrap();
    let failed = report.file("us-counties-2021").unwrap();
    assert_eq!(failed.state, FileSyncState::Failed);
    assert!(failed.error.as_deref().unwrap().contains("503"));

    let stored = service
        .coordinator()
        .store()
        .get_file_state("us-counties-2021")
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_unknown_region_is_empty() {
    let server = MockServer::start().await;
    mount_revision(&server, "us-counties-2020", "2021-03-01T12:00:00Z").await;
    mount_revision(&server, "us-counties-2021", "2021-03-02T12:00:00Z").await;
    Mock::given(method("GET"))
        .and(path(RAW_2020))
        .respond_with(ResponseTemplate::new(200).set_body_string(COUNTIES_2020))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RAW_2021))
        .respond_with(ResponseTemplate::new(200).set_body_string(COUNTIES_2021))
        .mount(&server)
        .await;

    let (service, _tmp) = setup(&server).await;

    assert!(service.get_records("Atlantis", "Washington", None).await.is_empty());
    assert!(service.get_records("King", "Oregon", Some(7)).await.is_empty());
}
