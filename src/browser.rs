//! Thin wrapper over a fantoccini WebDriver session.
//!
//! Every browser command maps its error into [`ScraperError`] so callers can
//! tell a missing element from a stale one or a timeout.

use crate::config::BrowserConfig;
use crate::error::{Result, ScraperError};
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

pub struct BrowserSession {
    client: Client,
}

impl BrowserSession {
    /// Connect to the WebDriver server and open a Chrome session.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        info!("Connecting to WebDriver at {}", config.webdriver_url);
        let client = ClientBuilder::native()
            .capabilities(capabilities(config))
            .connect(&config.webdriver_url)
            .await?;
        debug!(headless = config.headless, "Browser session started");
        Ok(Self { client })
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.client.goto(url).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    pub async fn find_all(&self, css: &str) -> Result<Vec<Element>> {
        Ok(self.client.find_all(Locator::Css(css)).await?)
    }

    /// Matches of the first candidate selector that yields any elements.
    pub async fn find_first_of(&self, candidates: &[String]) -> Result<Option<(String, Vec<Element>)>> {
        for css in candidates {
            match self.find_all(css).await {
                Ok(found) if !found.is_empty() => return Ok(Some((css.clone(), found))),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// First descendant of `el` matching `css`, or `None`.
    pub async fn find_in(&self, el: &Element, css: &str) -> Result<Option<Element>> {
        match el.find(Locator::Css(css)).await {
            Ok(found) => Ok(Some(found)),
            Err(e) => match ScraperError::from(e) {
                ScraperError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    pub async fn find_in_xpath(&self, el: &Element, xpath: &str) -> Result<Option<Element>> {
        match el.find(Locator::XPath(xpath)).await {
            Ok(found) => Ok(Some(found)),
            Err(e) => match ScraperError::from(e) {
                ScraperError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    pub async fn text(&self, el: &Element) -> Result<String> {
        Ok(el.text().await?)
    }

    pub async fn attr(&self, el: &Element, name: &str) -> Result<Option<String>> {
        Ok(el.attr(name).await?)
    }

    pub async fn outer_html(&self, el: &Element) -> Result<String> {
        Ok(el.html(false).await?)
    }

    pub async fn is_displayed(&self, el: &Element) -> Result<bool> {
        Ok(el.is_displayed().await?)
    }

    /// Native click, falling back to a JavaScript click when intercepted.
    pub async fn click(&self, el: &Element) -> Result<()> {
        match el.click().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = ScraperError::from(e);
                if err.is_stale() {
                    return Err(err);
                }
                debug!("Native click failed ({}), retrying with JavaScript", err);
                self.js_click(el).await
            }
        }
    }

    pub async fn js_click(&self, el: &Element) -> Result<()> {
        self.execute("arguments[0].click();", vec![element_arg(el)?]).await?;
        Ok(())
    }

    pub async fn scroll_into_view(&self, el: &Element) -> Result<()> {
        self.execute(
            "arguments[0].scrollIntoView({block: 'center'});",
            vec![element_arg(el)?],
        )
        .await?;
        Ok(())
    }

    pub async fn scroll_to_bottom(&self) -> Result<()> {
        self.execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await?;
        Ok(())
    }

    /// Scroll a scrollable container to its end.
    pub async fn scroll_element(&self, el: &Element) -> Result<()> {
        self.execute(
            "arguments[0].scrollTop = arguments[0].scrollHeight;",
            vec![element_arg(el)?],
        )
        .await?;
        Ok(())
    }

    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.client.execute(script, args).await?)
    }

    pub async fn ready_state_complete(&self) -> Result<bool> {
        let state = self.execute("return document.readyState;", vec![]).await?;
        Ok(state.as_str() == Some("complete"))
    }

    pub async fn refresh(&self) -> Result<()> {
        self.client.refresh().await?;
        Ok(())
    }

    /// End the WebDriver session. Errors are logged, never propagated.
    pub async fn quit(self) {
        match self.client.close().await {
            Ok(()) => info!("Browser session closed"),
            Err(e) => warn!("Failed to close browser session cleanly: {}", e),
        }
    }
}

fn element_arg(el: &Element) -> Result<Value> {
    Ok(serde_json::to_value(el)?)
}

/// Chrome capabilities for the scraping session.
pub fn capabilities(config: &BrowserConfig) -> Map<String, Value> {
    let (width, height) = config.window_size;
    let mut args = Vec::new();
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(
        [
            format!("--window-size={},{}", width, height),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-extensions".to_string(),
            "--disable-gpu".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-features=PushMessaging".to_string(),
            "--disable-notifications".to_string(),
            "--log-level=3".to_string(),
            format!("user-agent={}", config.user_agent),
        ]
        .into_iter(),
    );

    let mut prefs = Map::new();
    if config.disable_images {
        args.push("--blink-settings=imagesEnabled=false".to_string());
        prefs.insert(
            "profile.managed_default_content_settings.images".to_string(),
            json!(2),
        );
        prefs.insert(
            "profile.default_content_setting_values.images".to_string(),
            json!(2),
        );
        prefs.insert(
            "profile.managed_default_content_settings.fonts".to_string(),
            json!(2),
        );
    }

    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert(
        "pageLoadStrategy".to_string(),
        json!(config.page_load_strategy),
    );
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": args,
            "prefs": prefs,
            "excludeSwitches": ["enable-automation", "enable-logging"],
        }),
    );
    caps
}
