//! [`PortalDriver`] over the W3C WebDriver protocol.
//!
//! Talks JSON to a running chromedriver (or any W3C-compliant endpoint).
//! Only the handful of commands the portal flow needs are implemented.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::driver::{
    BrowserSettings, DriverError, DriverFactory, Locator, PortalDriver, xpath_literal,
};

/// Default chromedriver endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:9515";

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Gap between two element lookups in [`PortalDriver::wait_for`].
const FIND_INTERVAL: Duration = Duration::from_millis(250);

const SCROLL_AND_CLICK: &str =
    "arguments[0].scrollIntoView({block: 'center'}); arguments[0].click();";

#[derive(Debug, Deserialize)]
struct NewSessionResponse {
    value: NewSessionValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionValue {
    session_id: String,
}

/// Opens WebDriver sessions against one endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    client: reqwest::Client,
    endpoint: String,
}

impl WebDriverFactory {
    /// Creates a factory for the WebDriver server at `endpoint`.
    #[must_use]
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    type Driver = WebDriverSession;

    async fn create(&self, settings: &BrowserSettings) -> Result<WebDriverSession, DriverError> {
        let url = format!("{}/session", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "capabilities": { "alwaysMatch": capabilities(settings) } }))
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            return Err(error_from_value(payload.get("value").unwrap_or(&Value::Null)));
        }

        let session: NewSessionResponse = serde_json::from_value(payload)
            .map_err(|e| DriverError::Protocol(format!("new session: {e}")))?;
        log::debug!("WebDriver session {} opened", session.value.session_id);

        Ok(WebDriverSession {
            client: self.client.clone(),
            base: format!("{url}/{}", session.value.session_id),
            active: true,
        })
    }
}

/// Chrome capabilities for `settings`.
fn capabilities(settings: &BrowserSettings) -> Value {
    let mut options = Map::new();
    options.insert("args".to_owned(), json!(settings.chrome_args()));
    options.insert(
        "prefs".to_owned(),
        json!({
            "download.default_directory": settings.download_dir.to_string_lossy(),
            "download.prompt_for_download": false,
            "download.directory_upgrade": true,
            "safebrowsing.enabled": true,
        }),
    );
    if let Some(binary) = &settings.binary {
        options.insert("binary".to_owned(), json!(binary.to_string_lossy()));
    }

    json!({
        "browserName": "chrome",
        "goog:chromeOptions": Value::Object(options),
    })
}

/// `(using, value)` pair for a locator.
fn strategy(locator: &Locator) -> (&'static str, String) {
    match locator {
        Locator::Id(id) => ("xpath", format!("//*[@id={}]", xpath_literal(id))),
        Locator::Name(name) => ("xpath", format!("//*[@name={}]", xpath_literal(name))),
        Locator::ClassName(class) => ("css selector", format!(".{class}")),
        Locator::LinkText(text) => ("link text", text.clone()),
        Locator::TagName(tag) => ("tag name", tag.clone()),
        Locator::XPath(xpath) => ("xpath", xpath.clone()),
    }
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY)?.as_str().map(str::to_owned)
}

fn element_ref(id: &str) -> Value {
    let mut map = Map::new();
    map.insert(ELEMENT_KEY.to_owned(), Value::String(id.to_owned()));
    Value::Object(map)
}

fn error_from_value(value: &Value) -> DriverError {
    match value.get("error").and_then(Value::as_str) {
        Some(error) => DriverError::WebDriver {
            error: error.to_owned(),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        },
        None => DriverError::Protocol(value.to_string()),
    }
}

/// One live browser session.
#[derive(Debug)]
pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
    active: bool,
}

impl WebDriverSession {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        if !self.active {
            return Err(DriverError::SessionClosed);
        }

        let mut request = self.client.request(method, format!("{}{path}", self.base));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let mut payload: Value = response.json().await?;
        let value = payload
            .get_mut("value")
            .map(Value::take)
            .unwrap_or_default();

        if status.is_success() {
            Ok(value)
        } else {
            Err(error_from_value(&value))
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<String>, DriverError> {
        let (using, value) = strategy(locator);
        let found = self
            .send(
                Method::POST,
                "/elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;

        let Value::Array(elements) = found else {
            return Err(DriverError::Protocol(format!("find elements: {found}")));
        };
        Ok(elements.iter().filter_map(element_id).collect())
    }

    async fn first(&self, locator: &Locator) -> Result<String, DriverError> {
        self.find_all(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::ElementNotFound(locator.clone()))
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.send(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }
}

#[async_trait]
impl PortalDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        log::debug!("navigate {url}");
        self.send(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> Result<(), DriverError> {
        let id = self.first(locator).await?;
        self.execute(SCROLL_AND_CLICK, vec![element_ref(&id)])
            .await?;
        Ok(())
    }

    async fn type_text(&mut self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let id = self.first(locator).await?;
        self.send(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.send(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn select_option(
        &mut self,
        locator: &Locator,
        visible_text: &str,
    ) -> Result<(), DriverError> {
        let select = self.first(locator).await?;
        let options = self
            .send(
                Method::POST,
                &format!("/element/{select}/elements"),
                Some(json!({
                    "using": "xpath",
                    "value": format!(
                        ".//option[normalize-space(.)={}]",
                        xpath_literal(visible_text)
                    ),
                })),
            )
            .await?;

        let option = options
            .as_array()
            .and_then(|found| found.iter().find_map(element_id))
            .ok_or_else(|| DriverError::OptionNotFound {
                locator: locator.clone(),
                option: visible_text.to_owned(),
            })?;

        self.send(Method::POST, &format!("/element/{option}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.find_all(locator).await?.is_empty() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                log::debug!("{locator} not present after {timeout:?}");
                return Ok(false);
            }
            tokio::time::sleep(FIND_INTERVAL).await;
        }
    }

    async fn scroll_to_top(&mut self) -> Result<(), DriverError> {
        self.execute("window.scrollTo(0, 0);", Vec::new()).await?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        if !self.active {
            return Ok(());
        }
        let result = self.send(Method::DELETE, "", None).await;
        self.active = false;
        result.map(|_| ())
    }
}
