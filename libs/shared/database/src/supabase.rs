use anyhow::{anyhow, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>, return_representation: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if return_representation {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }

        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request_inner(method, path, auth_token, body, false).await
    }

    async fn request_inner<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        return_representation: bool,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(auth_token, return_representation);

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Fetch all rows of `table` matching the PostgREST `filters` string.
    pub async fn select<T>(&self, table: &str, filters: &str, auth_token: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?{}", table, filters);
        self.request(Method::GET, &path, Some(auth_token), None).await
    }

    /// Fetch a single row, `None` when no row matches.
    pub async fn select_one<T>(
        &self,
        table: &str,
        filters: &str,
        auth_token: &str,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let mut rows: Vec<T> = self.select(table, filters, auth_token).await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.remove(0)))
        }
    }

    /// Insert a row and return the stored representation.
    pub async fn insert<T>(&self, table: &str, body: Value, auth_token: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        let mut rows: Vec<T> = self
            .request_inner(Method::POST, &path, Some(auth_token), Some(body), true)
            .await?;
        if rows.is_empty() {
            return Err(anyhow!("Insert into {} returned no representation", table));
        }
        Ok(rows.remove(0))
    }

    /// Insert a row without asking for the representation back. Used for
    /// fire-and-forget rows (audit events, notification outbox).
    pub async fn insert_only(&self, table: &str, body: Value, auth_token: &str) -> Result<()> {
        let path = format!("/rest/v1/{}", table);
        let _: Value = self
            .request_inner(Method::POST, &path, Some(auth_token), Some(body), false)
            .await
            .or_else(|e| {
                // PostgREST answers 201 with an empty body when no Prefer
                // header is set; treat a JSON decode miss as success.
                if e.to_string().contains("error decoding response body") {
                    Ok(Value::Null)
                } else {
                    Err(e)
                }
            })?;
        Ok(())
    }

    /// Patch the rows matching `filters` and return the first updated row.
    pub async fn update<T>(
        &self,
        table: &str,
        filters: &str,
        body: Value,
        auth_token: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?{}", table, filters);
        let mut rows: Vec<T> = self
            .request_inner(Method::PATCH, &path, Some(auth_token), Some(body), true)
            .await?;
        if rows.is_empty() {
            return Err(anyhow!("Update of {} matched no rows", table));
        }
        Ok(rows.remove(0))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
