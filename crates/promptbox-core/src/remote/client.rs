//! HTTP client for a Bitable-style records API.

use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::wire::{decode_item, encode_fields};
use super::{
    with_retry, RecordOutcome, RemoteConfig, RemoteError, RemoteResult, RemoteTable, RetryPolicy,
    TOKEN_EXPIRED_CODES,
};
use crate::models::{RemoteRecord, SyncRecord};
use crate::util::compact_text;

const PAGE_SIZE: &str = "500";
const FIELD_PAGE_SIZE: &str = "100";
/// Token lifetime the API documents, used when a response omits `expire`
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 7200;
/// Refresh the access token this long before the server says it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

pub struct BitableClient {
    config: RemoteConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    list_retry: RetryPolicy,
    write_retry: RetryPolicy,
}

impl std::fmt::Debug for BitableClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BitableClient")
            .field("config", &self.config)
            .field("list_retry", &self.list_retry)
            .field("write_retry", &self.write_retry)
            .finish_non_exhaustive()
    }
}

impl BitableClient {
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
            list_retry: RetryPolicy::idempotent(),
            write_retry: RetryPolicy::write(),
        })
    }

    #[must_use]
    pub fn with_retry_policies(mut self, list_retry: RetryPolicy, write_retry: RetryPolicy) -> Self {
        self.list_retry = list_retry;
        self.write_retry = write_retry;
        self
    }

    pub const fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn table_url(&self) -> String {
        format!(
            "{}/bitable/v1/apps/{}/tables/{}",
            self.config.api_base, self.config.table.app_token, self.config.table.table_id
        )
    }

    fn records_url(&self) -> String {
        format!("{}/records", self.table_url())
    }

    /// Return a cached tenant access token, fetching a new one when needed.
    ///
    /// The lock is held across the fetch so concurrent callers share one
    /// token request.
    async fn access_token(&self) -> RemoteResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.value.clone());
        }

        let url = format!(
            "{}/auth/v3/tenant_access_token/internal",
            self.config.api_base
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "app_id": self.config.credentials.app_id,
                "app_secret": self.config.credentials.app_secret,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let payload = response.json::<TokenResponse>().await?;
        if payload.code != 0 {
            return Err(RemoteError::Api {
                code: payload.code,
                msg: payload.msg,
            });
        }

        let value = payload
            .tenant_access_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                RemoteError::InvalidPayload(
                    "token response did not include tenant_access_token".to_string(),
                )
            })?;
        let lifetime = payload
            .expire
            .and_then(|expire| u64::try_from(expire).ok())
            .filter(|expire| *expire > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        tracing::debug!(expires_in = lifetime, "Fetched tenant access token");
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Send one authenticated API call and unwrap the `{code, msg, data}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> RemoteResult<Option<T>> {
        let token = self.access_token().await?;
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let envelope = response.json::<Envelope<T>>().await?;
        if envelope.code != 0 {
            if TOKEN_EXPIRED_CODES.contains(&envelope.code) {
                self.invalidate_token().await;
            }
            return Err(RemoteError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope.data)
    }

    async fn list_page(
        &self,
        url: &str,
        page_size: &str,
        page_token: Option<&str>,
    ) -> RemoteResult<ListPage> {
        let mut query = vec![("page_size", page_size)];
        if let Some(page_token) = page_token {
            query.push(("page_token", page_token));
        }
        Ok(self
            .call::<ListPage>(Method::GET, url, &query, None)
            .await?
            .unwrap_or_default())
    }

    /// Column names of the table, across all pages
    pub async fn list_fields(&self) -> RemoteResult<Vec<String>> {
        let url = format!("{}/fields", self.table_url());
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = with_retry(self.list_retry, "list_fields", || {
                self.list_page(&url, FIELD_PAGE_SIZE, page_token.as_deref())
            })
            .await?;

            names.extend(page.items.unwrap_or_default().iter().filter_map(|item| {
                item.get("field_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }));

            match page.page_token.filter(|token| page.has_more && !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(names)
    }

    async fn create_one(&self, record: &SyncRecord) -> RecordOutcome {
        let url = self.records_url();
        let body = json!({ "fields": encode_fields(record, false) });
        let result = with_retry(self.write_retry, "create_record", || {
            self.call::<Value>(Method::POST, &url, &[], Some(&body))
        })
        .await;
        outcome(record, result)
    }

    async fn update_one(&self, row_id: &str, record: &SyncRecord) -> RecordOutcome {
        let url = format!("{}/{row_id}", self.records_url());
        let body = json!({ "fields": encode_fields(record, true) });
        let result = with_retry(self.write_retry, "update_record", || {
            self.call::<Value>(Method::PUT, &url, &[], Some(&body))
        })
        .await;
        outcome(record, result)
    }
}

impl RemoteTable for BitableClient {
    async fn list_all(&self) -> RemoteResult<Vec<RemoteRecord>> {
        let url = self.records_url();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = with_retry(self.list_retry, "list_records", || {
                self.list_page(&url, PAGE_SIZE, page_token.as_deref())
            })
            .await?;
            pages += 1;

            for item in page.items.unwrap_or_default() {
                match decode_item(&item) {
                    Ok(record) => records.push(record),
                    Err(reason) => tracing::warn!("Skipping remote row: {reason}"),
                }
            }

            if !page.has_more {
                break;
            }
            match page.page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => {
                    tracing::warn!("Remote reported more pages without a page token");
                    break;
                }
            }
        }

        tracing::debug!(pages, rows = records.len(), "Listed remote table");
        Ok(records)
    }

    async fn batch_create(&self, records: &[SyncRecord]) -> Vec<RecordOutcome> {
        if records.is_empty() {
            return Vec::new();
        }

        let url = format!("{}/batch_create", self.records_url());
        let body = json!({
            "records": records
                .iter()
                .map(|record| json!({ "fields": encode_fields(record, false) }))
                .collect::<Vec<_>>(),
        });
        let result = with_retry(self.write_retry, "batch_create", || {
            self.call::<Value>(Method::POST, &url, &[], Some(&body))
        })
        .await;

        match result {
            Ok(_) => records
                .iter()
                .map(|record| RecordOutcome::Applied(record.id))
                .collect(),
            Err(error) if records.len() > 1 && is_record_rejection(&error) => {
                tracing::warn!(
                    count = records.len(),
                    "Batch create rejected, retrying records one by one: {error}"
                );
                let mut outcomes = Vec::with_capacity(records.len());
                for record in records {
                    outcomes.push(self.create_one(record).await);
                }
                outcomes
            }
            Err(error) => fail_all(records.iter(), &error),
        }
    }

    async fn batch_update(&self, records: &[(String, SyncRecord)]) -> Vec<RecordOutcome> {
        if records.is_empty() {
            return Vec::new();
        }

        let url = format!("{}/batch_update", self.records_url());
        let body = json!({
            "records": records
                .iter()
                .map(|(row_id, record)| json!({
                    "record_id": row_id,
                    "fields": encode_fields(record, true),
                }))
                .collect::<Vec<_>>(),
        });
        let result = with_retry(self.write_retry, "batch_update", || {
            self.call::<Value>(Method::POST, &url, &[], Some(&body))
        })
        .await;

        match result {
            Ok(_) => records
                .iter()
                .map(|(_, record)| RecordOutcome::Applied(record.id))
                .collect(),
            Err(error) if records.len() > 1 && is_record_rejection(&error) => {
                tracing::warn!(
                    count = records.len(),
                    "Batch update rejected, retrying records one by one: {error}"
                );
                let mut outcomes = Vec::with_capacity(records.len());
                for (row_id, record) in records {
                    outcomes.push(self.update_one(row_id, record).await);
                }
                outcomes
            }
            Err(error) => fail_all(records.iter().map(|(_, record)| record), &error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    expire: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ListPage {
    items: Option<Vec<Value>>,
    #[serde(default)]
    has_more: bool,
    page_token: Option<String>,
}

fn status_error(status: StatusCode, body: &str) -> RemoteError {
    RemoteError::Status {
        status: status.as_u16(),
        body: compact_text(body),
    }
}

/// The server understood the call but refused its content
fn is_record_rejection(error: &RemoteError) -> bool {
    matches!(error, RemoteError::Api { .. } | RemoteError::Status { .. }) && !error.is_transient()
}

fn outcome(record: &SyncRecord, result: RemoteResult<Option<Value>>) -> RecordOutcome {
    match result {
        Ok(_) => RecordOutcome::Applied(record.id),
        Err(error) => RecordOutcome::Failed {
            id: record.id,
            reason: error.to_string(),
        },
    }
}

fn fail_all<'a>(
    records: impl Iterator<Item = &'a SyncRecord>,
    error: &RemoteError,
) -> Vec<RecordOutcome> {
    let reason = error.to_string();
    records
        .map(|record| RecordOutcome::Failed {
            id: record.id,
            reason: reason.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PromptId;
    use crate::remote::{wire, Credentials};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECORDS_PATH: &str = "/open-apis/bitable/v1/apps/app/tables/tbl/records";
    const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

    fn client_for(server: &MockServer) -> BitableClient {
        let config = RemoteConfig::new(
            Credentials::new("cli_app", "secret"),
            "https://acme.feishu.cn/base/app?table=tbl",
        )
        .unwrap()
        .with_api_base(format!("{}/open-apis", server.uri()))
        .unwrap();
        let fast = |policy: RetryPolicy| policy.with_base_delay(Duration::from_millis(1));
        BitableClient::new(config)
            .unwrap()
            .with_retry_policies(fast(RetryPolicy::idempotent()), fast(RetryPolicy::write()))
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("cli_app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": "t-123",
                "expire": 7200,
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn record(title: &str) -> SyncRecord {
        SyncRecord {
            id: PromptId::new(),
            title: title.to_string(),
            content: format!("{title} body"),
            tags: vec!["a".to_string()],
            is_favorite: false,
            created_at: 1_000,
            updated_at: 2_000,
            last_used_at: None,
        }
    }

    fn item(row_id: &str, record: &SyncRecord) -> Value {
        json!({ "record_id": row_id, "fields": Value::Object(encode_fields(record, false)) })
    }

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "success", "data": data }))
    }

    #[tokio::test]
    async fn list_all_follows_pages_and_skips_bad_rows() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        let first = record("first");
        let second = record("second");

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .and(query_param("page_token", "p2"))
            .and(header("authorization", "Bearer t-123"))
            .respond_with(ok(json!({
                "items": [item("rec2", &second)],
                "has_more": false,
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .and(query_param("page_size", "500"))
            .respond_with(ok(json!({
                "items": [
                    item("rec1", &first),
                    { "record_id": "recX", "fields": { "title": "no id" } },
                ],
                "has_more": true,
                "page_token": "p2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client_for(&server).list_all().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_id, "rec1");
        assert_eq!(rows[0].record, first);
        assert_eq!(rows[1].record, second);
    }

    #[tokio::test]
    async fn list_all_retries_server_errors() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ok(json!({ "items": null, "has_more": false })))
            .mount(&server)
            .await;

        let rows = client_for(&server).list_all().await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn list_all_refreshes_expired_token() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 99_991_663,
                "msg": "invalid access token",
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ok(json!({ "items": [], "has_more": false })))
            .mount(&server)
            .await;

        assert!(client_for(&server).list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_all_reports_permanent_api_errors() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 91_402,
                "msg": "NOTEXIST",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let error = client_for(&server).list_all().await.unwrap_err();
        assert!(matches!(error, RemoteError::Api { code: 91_402, .. }));
    }

    #[tokio::test]
    async fn list_fields_collects_names_across_pages() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        let fields_path = "/open-apis/bitable/v1/apps/app/tables/tbl/fields";

        Mock::given(method("GET"))
            .and(path(fields_path))
            .and(query_param("page_token", "f2"))
            .respond_with(ok(json!({
                "items": [{ "field_id": "fld3", "field_name": "updatedAt", "type": 5 }],
                "has_more": false,
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(fields_path))
            .and(query_param("page_size", "100"))
            .respond_with(ok(json!({
                "items": [
                    { "field_id": "fld1", "field_name": "id", "type": 1 },
                    { "field_id": "fld2", "field_name": "title", "type": 1 },
                ],
                "has_more": true,
                "page_token": "f2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let names = client_for(&server).list_fields().await.unwrap();

        assert_eq!(names, vec!["id", "title", "updatedAt"]);
        assert_eq!(
            wire::missing_fields(&names),
            vec!["content", "tags", "isFavorite", "createdAt", "lastUsed"]
        );
    }

    #[tokio::test]
    async fn token_without_expiry_is_still_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": "t-123",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ok(json!({ "items": [], "has_more": false })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.list_all().await.unwrap();
        client.list_all().await.unwrap();
    }

    #[tokio::test]
    async fn batch_create_isolates_rejected_records() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        let good = record("good");
        let bad = record("bad");

        Mock::given(method("POST"))
            .and(path(format!("{RECORDS_PATH}/batch_create")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1_254_045,
                "msg": "FieldNameNotFound",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .and(body_string_contains(bad.id.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1_254_001,
                "msg": "WrongRequestBody",
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .respond_with(ok(json!({ "record": { "record_id": "recNew" } })))
            .mount(&server)
            .await;

        let outcomes = client_for(&server)
            .batch_create(&[good.clone(), bad.clone()])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], RecordOutcome::Applied(good.id));
        match &outcomes[1] {
            RecordOutcome::Failed { id, reason } => {
                assert_eq!(*id, bad.id);
                assert!(reason.contains("WrongRequestBody"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_update_sends_row_ids_and_clears_last_used() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path(format!("{RECORDS_PATH}/batch_update")))
            .and(body_string_contains("\"record_id\":\"rec9\""))
            .and(body_string_contains("\"lastUsed\":null"))
            .respond_with(ok(json!({ "records": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let updated = record("updated");
        let outcomes = client_for(&server)
            .batch_update(&[("rec9".to_string(), updated.clone())])
            .await;

        assert_eq!(outcomes, vec![RecordOutcome::Applied(updated.id)]);
    }

    #[tokio::test]
    async fn token_failure_fails_every_record() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 10_003,
                "msg": "invalid app_secret",
            })))
            .mount(&server)
            .await;

        let outcomes = client_for(&server)
            .batch_create(&[record("a"), record("b")])
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| !outcome.is_applied()));
    }
}
