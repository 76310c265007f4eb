//! Blocking Wiki.js GraphQL client implementing [`PageStore`].

use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::{ClientSettings, Credentials};
use crate::slug;
use crate::store::{PageDraft, PageKey, PageRecord, PageStore, PageUpdate};

const PAGE_FIELDS: &str =
    "id path title description content isPublished locale createdAt updatedAt";
const LIST_FIELDS: &str = "id path title description isPublished locale createdAt updatedAt";
const RESPONSE_RESULT_FIELDS: &str = "responseResult { succeeded errorCode slug message }";
/// Wiki.js `PageNotFound` error code.
const PAGE_NOT_FOUND_CODE: i64 = 6003;

pub struct WikiJsClient {
    client: Client,
    settings: ClientSettings,
    bearer: Option<String>,
    /// Credentials have been resolved, possibly to anonymous access.
    auth_resolved: bool,
}

impl WikiJsClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(concat!("wikibridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build Wiki.js HTTP client")?;

        Ok(Self {
            client,
            settings,
            bearer: None,
            auth_resolved: false,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> String {
        format!("{}/graphql", self.settings.api_url)
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }

    /// Resolve credentials into a bearer token. Session login happens at most once.
    pub fn ensure_authenticated(&mut self) -> Result<()> {
        if self.auth_resolved {
            return Ok(());
        }
        match self.settings.credentials.clone() {
            Credentials::Token(token) => {
                self.bearer = Some(token);
            }
            Credentials::Login { username, password } => {
                let body = json!({
                    "query": format!(
                        "mutation ($username: String!, $password: String!) {{ authentication {{ login(username: $username, password: $password, strategy: \"local\") {{ {RESPONSE_RESULT_FIELDS} jwt }} }} }}"
                    ),
                    "variables": { "username": username, "password": password },
                });
                let envelope = self.post_graphql("login", &body, 0)?;
                let data: AuthenticationData = envelope.into_data("login")?;
                data.authentication.login.response_result.ensure_succeeded("login")?;
                let jwt = data
                    .authentication
                    .login
                    .jwt
                    .filter(|jwt| !jwt.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("Wiki.js login returned no session token"))?;
                tracing::info!(username = %username, "authenticated against Wiki.js");
                self.bearer = Some(jwt);
            }
            Credentials::Anonymous => {
                tracing::warn!("no Wiki.js credentials configured; requests are anonymous");
            }
        }
        self.auth_resolved = true;
        Ok(())
    }

    fn query(&mut self, operation: &str, query: &str, variables: Value) -> Result<Envelope> {
        self.ensure_authenticated()?;
        let body = json!({ "query": query, "variables": variables });
        let retries = self.settings.max_retries;
        self.post_graphql(operation, &body, retries)
    }

    /// Mutations are sent exactly once.
    fn mutate(&mut self, operation: &str, query: &str, variables: Value) -> Result<Envelope> {
        self.ensure_authenticated()?;
        let body = json!({ "query": query, "variables": variables });
        self.post_graphql(operation, &body, 0)
    }

    fn post_graphql(&mut self, operation: &str, body: &Value, max_retries: usize) -> Result<Envelope> {
        let endpoint = self.endpoint();
        for attempt in 0..=max_retries {
            tracing::debug!(operation, attempt, "sending Wiki.js GraphQL request");
            let mut request = self.client.post(&endpoint).json(body);
            if let Some(token) = &self.bearer {
                request = request.bearer_auth(token);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("Wiki.js GraphQL {operation} failed with HTTP {status}");
                    }
                    return response
                        .json::<Envelope>()
                        .with_context(|| format!("failed to decode Wiki.js {operation} response"));
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        tracing::warn!(operation, attempt, error = %error, "retrying Wiki.js request");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("failed to call Wiki.js GraphQL API ({endpoint})"));
                }
            }
        }

        bail!("Wiki.js GraphQL {operation} exhausted retry budget")
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .settings
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl PageStore for WikiJsClient {
    fn create_page(&mut self, draft: &PageDraft) -> Result<PageRecord> {
        let query = format!(
            "mutation ($content: String!, $description: String!, $editor: String!, $isPublished: Boolean!, $isPrivate: Boolean!, $locale: String!, $path: String!, $tags: [String]!, $title: String!) {{ pages {{ create(content: $content, description: $description, editor: $editor, isPublished: $isPublished, isPrivate: $isPrivate, locale: $locale, path: $path, tags: $tags, title: $title) {{ {RESPONSE_RESULT_FIELDS} page {{ id path title }} }} }} }}"
        );
        let variables = json!({
            "content": draft.content,
            "description": draft.description,
            "editor": self.settings.editor,
            "isPublished": true,
            "isPrivate": false,
            "locale": self.settings.locale,
            "path": draft.path,
            "tags": Vec::<String>::new(),
            "title": draft.title,
        });
        let data: PagesData<CreateField> = self
            .mutate("create", &query, variables)?
            .into_data("create")?;
        let payload = data.pages.create;
        payload
            .response_result
            .ensure_succeeded(&format!("create {}", draft.path))?;
        let created = payload
            .page
            .ok_or_else(|| anyhow::anyhow!("Wiki.js create returned no page for {}", draft.path))?;
        tracing::debug!(id = created.id, path = %created.path, "Wiki.js page created");

        Ok(PageRecord {
            id: created.id,
            path: created.path,
            title: created.title,
            description: draft.description.clone(),
            content: draft.content.clone(),
            is_published: true,
            locale: self.settings.locale.clone(),
            created_at: None,
            updated_at: None,
        })
    }

    fn get_page(&mut self, key: &PageKey) -> Result<Option<PageRecord>> {
        match key {
            PageKey::Id(id) => {
                let query = format!(
                    "query ($id: Int!) {{ pages {{ single(id: $id) {{ {PAGE_FIELDS} }} }} }}"
                );
                let envelope = self.query("single", &query, json!({ "id": id }))?;
                if envelope.is_page_not_found() {
                    return Ok(None);
                }
                let data: PagesData<SingleField> = envelope.into_data("single")?;
                Ok(data.pages.single)
            }
            PageKey::Path(path) => {
                let query = format!(
                    "query ($path: String!, $locale: String!) {{ pages {{ singleByPath(path: $path, locale: $locale) {{ {PAGE_FIELDS} }} }} }}"
                );
                let locale = self.settings.locale.clone();
                let envelope = self.query(
                    "singleByPath",
                    &query,
                    json!({ "path": path, "locale": locale }),
                )?;
                if envelope.is_page_not_found() {
                    return Ok(None);
                }
                let data: PagesData<SingleByPathField> = envelope.into_data("singleByPath")?;
                Ok(data.pages.single_by_path)
            }
        }
    }

    fn list_children(&mut self, path: &str) -> Result<Vec<PageRecord>> {
        Ok(self
            .list_pages()?
            .into_iter()
            .filter(|page| slug::is_direct_child(path, &page.path))
            .collect())
    }

    fn list_pages(&mut self) -> Result<Vec<PageRecord>> {
        let query = format!("query {{ pages {{ list(orderBy: PATH) {{ {LIST_FIELDS} }} }} }}");
        let data: PagesData<ListField> = self.query("list", &query, json!({}))?.into_data("list")?;
        Ok(data.pages.list)
    }

    fn update_page(&mut self, id: i64, update: &PageUpdate) -> Result<PageRecord> {
        let mut current = self
            .get_page(&PageKey::Id(id))?
            .ok_or_else(|| anyhow::anyhow!("page {id} does not exist"))?;
        if let Some(title) = &update.title {
            current.title = title.clone();
        }
        if let Some(content) = &update.content {
            current.content = content.clone();
        }
        if let Some(description) = &update.description {
            current.description = description.clone();
        }

        let query = format!(
            "mutation ($id: Int!, $title: String, $content: String, $description: String) {{ pages {{ update(id: $id, title: $title, content: $content, description: $description) {{ {RESPONSE_RESULT_FIELDS} }} }} }}"
        );
        let variables = json!({
            "id": id,
            "title": current.title,
            "content": current.content,
            "description": current.description,
        });
        let data: PagesData<UpdateField> = self
            .mutate("update", &query, variables)?
            .into_data("update")?;
        data.pages
            .update
            .response_result
            .ensure_succeeded(&format!("update page {id}"))?;
        tracing::debug!(id, path = %current.path, "Wiki.js page updated");
        Ok(current)
    }

    fn delete_page(&mut self, id: i64) -> Result<()> {
        let query = format!(
            "mutation ($id: Int!) {{ pages {{ delete(id: $id) {{ {RESPONSE_RESULT_FIELDS} }} }} }}"
        );
        let data: PagesData<DeleteField> = self
            .mutate("delete", &query, json!({ "id": id }))?
            .into_data("delete")?;
        data.pages
            .delete
            .response_result
            .ensure_succeeded(&format!("delete page {id}"))?;
        tracing::debug!(id, "Wiki.js page deleted");
        Ok(())
    }

    fn search(&mut self, query: &str) -> Result<Vec<PageRecord>> {
        Ok(self
            .list_pages()?
            .into_iter()
            .filter(|page| matches_search(page, query))
            .collect())
    }
}

/// Case-insensitive substring match over title, path and description. `*` matches all.
pub fn matches_search(page: &PageRecord, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() || query == "*" {
        return true;
    }
    let needle = query.to_lowercase();
    page.title.to_lowercase().contains(&needle)
        || page.path.to_lowercase().contains(&needle)
        || page.description.to_lowercase().contains(&needle)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct Envelope {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

impl Envelope {
    fn is_page_not_found(&self) -> bool {
        self.errors.iter().any(GraphqlError::is_page_not_found)
    }

    fn into_data<T: DeserializeOwned>(self, operation: &str) -> Result<T> {
        if !self.errors.is_empty() {
            let messages = self
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            bail!("Wiki.js GraphQL {operation} error: {messages}");
        }
        let data = self
            .data
            .filter(|data| !data.is_null())
            .ok_or_else(|| anyhow::anyhow!("Wiki.js GraphQL {operation} returned no data"))?;
        serde_json::from_value(data)
            .with_context(|| format!("failed to decode Wiki.js {operation} payload"))
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphqlError {
    fn is_page_not_found(&self) -> bool {
        let code = self
            .extensions
            .as_ref()
            .and_then(|extensions| {
                extensions
                    .pointer("/exception/code")
                    .or_else(|| extensions.get("code"))
            })
            .and_then(Value::as_i64);
        if code == Some(PAGE_NOT_FOUND_CODE) {
            return true;
        }
        self.message.to_lowercase().contains("page does not exist")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseResult {
    succeeded: bool,
    error_code: Option<i64>,
    message: Option<String>,
}

impl ResponseResult {
    fn ensure_succeeded(&self, operation: &str) -> Result<()> {
        if self.succeeded {
            return Ok(());
        }
        bail!(
            "Wiki.js {operation} failed [{}]: {}",
            self.error_code.unwrap_or_default(),
            self.message.as_deref().unwrap_or("unknown error")
        )
    }
}

#[derive(Debug, Deserialize)]
struct PagesData<T> {
    pages: T,
}

#[derive(Debug, Deserialize)]
struct SingleField {
    single: Option<PageRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SingleByPathField {
    single_by_path: Option<PageRecord>,
}

#[derive(Debug, Deserialize)]
struct ListField {
    #[serde(default)]
    list: Vec<PageRecord>,
}

#[derive(Debug, Deserialize)]
struct CreateField {
    create: CreatePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayload {
    response_result: ResponseResult,
    page: Option<CreatedPage>,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: i64,
    path: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct UpdateField {
    update: MutationPayload,
}

#[derive(Debug, Deserialize)]
struct DeleteField {
    delete: MutationPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    response_result: ResponseResult,
}

#[derive(Debug, Deserialize)]
struct AuthenticationData {
    authentication: LoginField,
}

#[derive(Debug, Deserialize)]
struct LoginField {
    login: LoginPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    response_result: ResponseResult,
    jwt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).expect("envelope")
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            api_url: "http://wiki.local:3000".to_string(),
            credentials: Credentials::Token("token".to_string()),
            locale: "en".to_string(),
            editor: "markdown".to_string(),
            timeout_ms: 1_000,
            max_retries: 2,
            retry_delay_ms: 10,
        }
    }

    #[test]
    fn endpoint_appends_graphql() {
        let client = WikiJsClient::new(settings()).expect("client");
        assert_eq!(client.endpoint(), "http://wiki.local:3000/graphql");
        assert!(!client.is_authenticated());
    }

    #[test]
    fn token_credentials_authenticate_without_a_request() {
        let mut client = WikiJsClient::new(settings()).expect("client");
        client.ensure_authenticated().expect("authenticate");
        assert!(client.is_authenticated());
    }

    #[test]
    fn single_page_payload_decodes_into_record() {
        let data: PagesData<SingleField> = envelope(json!({
            "data": { "pages": { "single": {
                "id": 12,
                "path": "docs/api",
                "title": "API",
                "description": "Api docs",
                "content": "# API",
                "isPublished": true,
                "locale": "en",
                "createdAt": "2026-01-01T00:00:00Z",
                "updatedAt": "2026-01-02T00:00:00Z"
            } } }
        }))
        .into_data("single")
        .expect("decode");
        let page = data.pages.single.expect("page");
        assert_eq!(page.id, 12);
        assert_eq!(page.parent_path(), "docs");
        assert_eq!(page.updated_at.as_deref(), Some("2026-01-02T00:00:00Z"));
    }

    #[test]
    fn list_items_without_content_default_to_empty() {
        let data: PagesData<ListField> = envelope(json!({
            "data": { "pages": { "list": [
                { "id": 1, "path": "docs", "title": "Docs", "isPublished": true, "locale": "en" },
                { "id": 2, "path": "docs/api", "title": "API", "isPublished": false, "locale": "en" }
            ] } }
        }))
        .into_data("list")
        .expect("decode");
        assert_eq!(data.pages.list.len(), 2);
        assert!(data.pages.list[0].content.is_empty());
        assert!(!data.pages.list[1].is_published);
    }

    #[test]
    fn graphql_errors_surface_messages() {
        let error = envelope(json!({
            "data": null,
            "errors": [{ "message": "Forbidden" }, { "message": "Rate limited" }]
        }))
        .into_data::<Value>("list")
        .expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("Forbidden"));
        assert!(message.contains("Rate limited"));
    }

    #[test]
    fn page_not_found_is_detected_by_code_or_message() {
        let by_code = envelope(json!({
            "data": { "pages": { "single": null } },
            "errors": [{ "message": "whatever", "extensions": { "exception": { "code": 6003 } } }]
        }));
        assert!(by_code.is_page_not_found());

        let by_message = envelope(json!({
            "errors": [{ "message": "This page does not exist." }]
        }));
        assert!(by_message.is_page_not_found());

        let unrelated = envelope(json!({ "errors": [{ "message": "Forbidden" }] }));
        assert!(!unrelated.is_page_not_found());
    }

    #[test]
    fn failed_response_result_becomes_error() {
        let data: PagesData<DeleteField> = envelope(json!({
            "data": { "pages": { "delete": { "responseResult": {
                "succeeded": false, "errorCode": 6002, "slug": "PageDeleteForbidden",
                "message": "You are not authorized to delete this page."
            } } } }
        }))
        .into_data("delete")
        .expect("decode");
        let error = data
            .pages
            .delete
            .response_result
            .ensure_succeeded("delete page 4")
            .expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("6002"));
        assert!(message.contains("not authorized"));
    }

    #[test]
    fn search_matches_title_path_or_description() {
        let page = PageRecord {
            id: 1,
            path: "guides/install".to_string(),
            title: "Installation".to_string(),
            description: "Setting up the Server".to_string(),
            content: String::new(),
            is_published: true,
            locale: "en".to_string(),
            created_at: None,
            updated_at: None,
        };
        assert!(matches_search(&page, "install"));
        assert!(matches_search(&page, "GUIDES/"));
        assert!(matches_search(&page, "server"));
        assert!(matches_search(&page, "*"));
        assert!(!matches_search(&page, "deploy"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }
}
