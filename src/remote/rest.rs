use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::absence::AbsenceRequest;
use crate::config::RemoteConfig;
use crate::error::{Result, RosterError};
use crate::notify::activity::ActivityEntry;
use crate::notify::job::{JobUpdate, MailJob, NewMailJob};
use crate::notify::settings::NotificationSettings;
use crate::remote::{
    AbsenceRepository, EmployeeDirectory, MailJobQueue, NotificationLog, SettingsStore,
    ShiftRepository,
};
use crate::schedule::{CellKey, DateRange, Employee, ShiftEntry};

const SHIFT_COLUMNS: &str = "employee_id,work_date,type,hours";
const EMPLOYEE_COLUMNS: &str = "id,name,email,department,is_active";
const SETTINGS_ROW_ID: i64 = 1;

/// PostgREST client for the hosted data store.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl RestClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Map non-2xx responses to [`RosterError::Remote`] using the PostgREST
    /// `message` field when present.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                }
            });
        Err(RosterError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<()> {
        Self::check(request.send().await?).await?;
        Ok(())
    }
}

/// Ceiling for the encoded `or=` filter of one delete request. Gateways in
/// front of PostgREST commonly answer 414 above 8 KiB of URL.
const MAX_FILTER_BYTES: usize = 6 * 1024;
const MAX_DATES_PER_TERM: usize = 256;

/// Length of `s` once form-urlencoded into a query string.
fn encoded_len(s: &str) -> usize {
    s.bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'*' | b'-' | b'.' | b'_' | b' ' => 1,
            _ => 3,
        })
        .sum()
}

/// PostgREST `or=(...)` filters covering every key, one per request.
///
/// Keys are grouped per employee as
/// `and(employee_id.eq."X",work_date.in.(d1,d2))` and the terms are packed
/// so that no filter exceeds `max_bytes` once encoded. A single term larger
/// than the budget still gets a filter of its own.
pub(crate) fn delete_filters(keys: &[CellKey], max_bytes: usize) -> Vec<String> {
    let mut by_employee: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    for key in keys {
        by_employee
            .entry(key.employee_id.as_str())
            .or_default()
            .insert(key.work_date);
    }

    let empty = encoded_len("()");
    let mut filters = Vec::new();
    let mut terms: Vec<String> = Vec::new();
    let mut used = empty;
    for (id, dates) in by_employee {
        let id = id.replace('\\', "\\\\").replace('"', "\\\"");
        let dates: Vec<String> = dates.iter().map(NaiveDate::to_string).collect();
        for group in dates.chunks(MAX_DATES_PER_TERM) {
            let term = format!(
                "and(employee_id.eq.\"{}\",work_date.in.({}))",
                id,
                group.join(",")
            );
            let cost = encoded_len(&term) + encoded_len(",");
            if !terms.is_empty() && used + cost > max_bytes {
                filters.push(format!("({})", terms.join(",")));
                terms.clear();
                used = empty;
            }
            used += cost;
            terms.push(term);
        }
    }
    if !terms.is_empty() {
        filters.push(format!("({})", terms.join(",")));
    }
    filters
}

#[async_trait]
impl ShiftRepository for RestClient {
    async fn fetch_shifts(&self, range: &DateRange) -> Result<Vec<ShiftEntry>> {
        let request = self.request(Method::GET, "shifts").query(&[
            ("select", SHIFT_COLUMNS.to_string()),
            ("work_date", format!("gte.{}", range.start)),
            ("work_date", format!("lte.{}", range.end)),
            ("order", "work_date.asc".to_string()),
        ]);
        let rows: Vec<ShiftEntry> = self.fetch(request).await?;
        tracing::debug!(rows = rows.len(), start = %range.start, end = %range.end, "Fetched shifts");
        Ok(rows)
    }

    async fn upsert_shifts(&self, rows: &[ShiftEntry]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .request(Method::POST, "shifts")
            .query(&[("on_conflict", "employee_id,work_date")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.execute(request).await?;
        tracing::debug!(rows = rows.len(), "Upserted shifts");
        Ok(())
    }

    async fn delete_shifts(&self, keys: &[CellKey]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let filters = delete_filters(keys, MAX_FILTER_BYTES);
        for filter in &filters {
            let request = self
                .request(Method::DELETE, "shifts")
                .query(&[("or", filter)]);
            self.execute(request).await?;
        }
        tracing::debug!(rows = keys.len(), requests = filters.len(), "Deleted shifts");
        Ok(())
    }
}

#[async_trait]
impl EmployeeDirectory for RestClient {
    async fn list_employees(&self) -> Result<Vec<Employee>> {
        let request = self
            .request(Method::GET, "employees")
            .query(&[("select", EMPLOYEE_COLUMNS), ("order", "created_at.asc")]);
        self.fetch(request).await
    }

    async fn find_employee(&self, id: &str) -> Result<Option<Employee>> {
        let request = self.request(Method::GET, "employees").query(&[
            ("select", EMPLOYEE_COLUMNS.to_string()),
            ("id", format!("eq.{}", id)),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<Employee> = self.fetch(request).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl AbsenceRepository for RestClient {
    async fn insert_absence(&self, request: &AbsenceRequest) -> Result<()> {
        let req = self
            .request(Method::POST, "absences")
            .header("Prefer", "return=minimal")
            .json(request);
        self.execute(req).await
    }

    async fn update_absence(&self, request: &AbsenceRequest) -> Result<()> {
        let req = self
            .request(Method::PATCH, "absences")
            .query(&[("id", format!("eq.{}", request.id))])
            .header("Prefer", "return=minimal")
            .json(request);
        self.execute(req).await
    }

    async fn find_absence(&self, id: Uuid) -> Result<Option<AbsenceRequest>> {
        let req = self.request(Method::GET, "absences").query(&[
            ("select", "*".to_string()),
            ("id", format!("eq.{}", id)),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<AbsenceRequest> = self.fetch(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_absences(&self) -> Result<Vec<AbsenceRequest>> {
        let req = self
            .request(Method::GET, "absences")
            .query(&[("select", "*"), ("order", "submitted_at.desc")]);
        self.fetch(req).await
    }
}

#[async_trait]
impl MailJobQueue for RestClient {
    async fn enqueue(&self, job: &NewMailJob) -> Result<()> {
        let req = self
            .request(Method::POST, "mail_jobs")
            .header("Prefer", "return=minimal")
            .json(job);
        self.execute(req).await
    }

    async fn fetch_queued(&self, limit: usize) -> Result<Vec<MailJob>> {
        let req = self.request(Method::GET, "mail_jobs").query(&[
            ("select", "*".to_string()),
            ("status", "eq.queued".to_string()),
            ("order", "created_at.asc".to_string()),
            ("limit", limit.to_string()),
        ]);
        self.fetch(req).await
    }

    async fn record_attempt(&self, id: i64, update: &JobUpdate) -> Result<()> {
        let req = self
            .request(Method::PATCH, "mail_jobs")
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=minimal")
            .json(update);
        self.execute(req).await
    }
}

#[async_trait]
impl NotificationLog for RestClient {
    async fn insert_notification(&self, entry: &ActivityEntry) -> Result<()> {
        let req = self
            .request(Method::POST, "notifications")
            .header("Prefer", "return=minimal")
            .json(entry);
        self.execute(req).await
    }
}

#[async_trait]
impl SettingsStore for RestClient {
    async fn load_settings(&self) -> Result<NotificationSettings> {
        let req = self.request(Method::GET, "app_settings").query(&[
            ("select", "*".to_string()),
            ("id", format!("eq.{}", SETTINGS_ROW_ID)),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<NotificationSettings> = self.fetch(req).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn save_settings(&self, settings: &NotificationSettings) -> Result<()> {
        let mut row = serde_json::to_value(settings)?;
        if let Some(obj) = row.as_object_mut() {
            obj.insert("id".to_string(), SETTINGS_ROW_ID.into());
        }
        let req = self
            .request(Method::POST, "app_settings")
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        self.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn delete_filter_groups_dates_per_employee() {
        let keys = vec![
            CellKey::new("e1", date("2025-08-20")),
            CellKey::new("a\"b", date("2025-08-19")),
            CellKey::new("e1", date("2025-08-18")),
        ];
        assert_eq!(
            delete_filters(&keys, MAX_FILTER_BYTES),
            vec![
                r#"(and(employee_id.eq."a\"b",work_date.in.(2025-08-19)),and(employee_id.eq."e1",work_date.in.(2025-08-18,2025-08-20)))"#
            ]
        );
    }

    #[test]
    fn delete_filters_stay_under_budget() {
        let keys: Vec<CellKey> = (0..40)
            .map(|i| CellKey::new(format!("employee-{:02}", i), date("2025-08-18")))
            .collect();
        let filters = delete_filters(&keys, 512);
        assert!(filters.len() > 1);
        assert!(filters.iter().all(|f| encoded_len(f) <= 512));
        let terms: usize = filters.iter().map(|f| f.matches("employee_id.eq.").count()).sum();
        assert_eq!(terms, 40);
    }

    #[test]
    fn long_date_runs_are_split_into_terms() {
        let start = date("2025-01-01");
        let keys: Vec<CellKey> = (0..600)
            .map(|i| CellKey::new("e1", start + chrono::Duration::days(i)))
            .collect();
        let filters = delete_filters(&keys, MAX_FILTER_BYTES);
        let terms: usize = filters.iter().map(|f| f.matches("employee_id.eq.").count()).sum();
        assert_eq!(terms, 3);
        assert!(filters.iter().all(|f| encoded_len(f) <= MAX_FILTER_BYTES));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = RestClient::new(&RemoteConfig {
            base_url: "https://db.example.co/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url, "https://db.example.co");
    }
}
