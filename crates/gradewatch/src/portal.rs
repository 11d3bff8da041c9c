use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::parser::{PageTable, parse_page_tables};

use thirtyfour::ChromiumLikeCapabilities;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;

const SETTLE_DELAY: Duration = Duration::from_secs(2);
const USERNAME_FIELD: &str = "f_uid";
const PASSWORD_FIELD: &str = "f_pwd";
const GRADE_MENU_TEXT: &str = "ผลการศึกษา";

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Unexpected dialog is open: {0}")]
    Dialog(String),
    #[error("WebDriver error: {0}")]
    WebDriver(#[from] WebDriverError),
    #[error("Navigation failed: {0}")]
    Navigation(String),
}

/// A logged-in view of the registration portal.
pub trait Portal {
    fn login(&mut self) -> impl Future<Output = Result<(), PortalError>>;

    fn open_grades(&mut self) -> impl Future<Output = Result<(), PortalError>>;

    /// Tables on the current page. An open alert is reported as
    /// [`PortalError::Dialog`] instead of being read through.
    fn page_tables(&mut self) -> impl Future<Output = Result<Vec<PageTable>, PortalError>>;

    fn refresh(&mut self) -> impl Future<Output = Result<(), PortalError>>;

    /// Dismisses an open alert, returning whether there was one.
    fn dismiss_dialog(&mut self) -> impl Future<Output = Result<bool, PortalError>>;

    fn close(self) -> impl Future<Output = Result<(), PortalError>>;
}

/// Chrome session driven over WebDriver.
pub struct BrowserPortal {
    driver: WebDriver,
    login_url: String,
    username: String,
    password: String,
}

impl BrowserPortal {
    pub async fn connect(config: &Config) -> Result<Self, PortalError> {
        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.set_headless()?;
        }
        caps.add_arg("--window-size=1920,1080")?;
        caps.add_arg("--disable-dev-shm-usage")?;

        log::info!("Connecting to WebDriver at {}", config.webdriver_url);
        let driver = WebDriver::new(config.webdriver_url.as_str(), caps)
            .await
            .inspect_err(|e| log::error!("Failed to start browser: {e:?}"))?;

        Ok(Self {
            driver,
            login_url: config.login_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn fill(&self, field_id: &str, value: &str) -> Result<WebElement, PortalError> {
        let field = self.driver.find(By::Id(field_id)).await?;
        field.clear().await?;
        field.send_keys(value).await?;
        Ok(field)
    }
}

impl Portal for BrowserPortal {
    async fn login(&mut self) -> Result<(), PortalError> {
        log::info!("Logging in at {}", self.login_url);
        self.driver.goto(self.login_url.as_str()).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        self.fill(USERNAME_FIELD, &self.username).await?;
        let password = self.fill(PASSWORD_FIELD, &self.password).await?;
        password.send_keys(Key::Enter).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        // the portal may greet with a course evaluation prompt
        if self.dismiss_dialog().await? {
            log::info!("Dismissed evaluation prompt after login");
        }
        Ok(())
    }

    async fn open_grades(&mut self) -> Result<(), PortalError> {
        let link = match self.driver.find(By::LinkText(GRADE_MENU_TEXT)).await {
            Ok(link) => link,
            Err(_) => self
                .driver
                .find(By::PartialLinkText(GRADE_MENU_TEXT))
                .await
                .map_err(|e| {
                    PortalError::Navigation(format!("'{}' menu not found: {}", GRADE_MENU_TEXT, e))
                })?,
        };
        link.click().await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        log::info!("Opened grade page");
        Ok(())
    }

    async fn page_tables(&mut self) -> Result<Vec<PageTable>, PortalError> {
        if let Ok(text) = self.driver.get_alert_text().await {
            return Err(PortalError::Dialog(text));
        }

        let html = self
            .driver
            .source()
            .await
            .inspect_err(|e| log::error!("Failed to read page source: {e:?}"))?;
        Ok(parse_page_tables(&html))
    }

    async fn refresh(&mut self) -> Result<(), PortalError> {
        self.driver.refresh().await?;
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn dismiss_dialog(&mut self) -> Result<bool, PortalError> {
        match self.driver.dismiss_alert().await {
            Ok(()) => Ok(true),
            Err(e) => {
                log::trace!("No dialog to dismiss: {e}");
                Ok(false)
            }
        }
    }

    async fn close(self) -> Result<(), PortalError> {
        self.driver.quit().await?;
        log::info!("Browser closed");
        Ok(())
    }
}
