use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scraper::config::{AntiBotSettings, Viewport};

/// Cookie with its domain resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Complete anti-automation profile applied to every page of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StealthProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub locale: String,
    pub timezone: String,
    pub viewport: Viewport,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<ResolvedCookie>,
    pub headless: bool,
}

impl StealthProfile {
    /// Build a profile from anti-bot settings. Cookies without a domain fall
    /// back to `default_domain`, and are dropped when there is none.
    pub fn from_settings(settings: &AntiBotSettings, default_domain: Option<&str>) -> Self {
        let accept_language = accept_language_for(&settings.locale);

        let mut headers = HashMap::new();
        headers.insert("Accept-Language".to_string(), accept_language.clone());
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
        );
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());

        // Configured headers win over the defaults
        for (key, value) in &settings.headers {
            headers.insert(key.clone(), value.clone());
        }

        let cookies = settings
            .cookies
            .iter()
            .filter_map(|cookie| {
                let domain = cookie.domain.as_deref().or(default_domain)?;
                Some(ResolvedCookie {
                    name: cookie.name.clone(),
                    value: cookie.value.clone(),
                    domain: domain.to_string(),
                })
            })
            .collect::<Vec<_>>();

        if cookies.len() < settings.cookies.len() {
            debug!(
                "Dropped {} cookie(s) with no resolvable domain",
                settings.cookies.len() - cookies.len()
            );
        }

        Self {
            user_agent: settings.user_agent.clone(),
            accept_language,
            locale: settings.locale.clone(),
            timezone: settings.timezone.clone(),
            viewport: settings.viewport,
            headers,
            cookies,
            headless: settings.headless,
        }
    }

    /// Chrome command-line arguments for this profile
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--user-agent={}", self.user_agent),
            format!("--lang={}", self.locale),
            format!("--window-size={},{}", self.viewport.width, self.viewport.height),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--no-sandbox".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args
    }

    /// Script evaluated before any page script runs
    pub fn init_script(&self) -> String {
        let languages = self
            .accept_language
            .split(',')
            .map(|part| part.split(';').next().unwrap_or("").trim())
            .filter(|lang| !lang.is_empty())
            .collect::<Vec<_>>();
        let languages = serde_json::to_string(&languages).unwrap_or_else(|_| "[]".to_string());

        format!(
            r#"
Object.defineProperty(navigator, 'webdriver', {{ get: () => false }});
Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
window.chrome = window.chrome || {{ runtime: {{}} }};
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
  parameters.name === 'notifications'
    ? Promise.resolve({{ state: Notification.permission }})
    : originalQuery.call(window.navigator.permissions, parameters)
);
"#
        )
    }
}

/// Accept-Language value for a locale like `he-IL`
fn accept_language_for(locale: &str) -> String {
    let locale = locale.trim();
    if locale.is_empty() {
        return "en-US,en;q=0.9".to_string();
    }

    let primary = locale.split(['-', '_']).next().unwrap_or(locale);
    if primary == locale {
        format!("{},en;q=0.8", locale)
    } else if primary == "en" {
        format!("{},{};q=0.9", locale, primary)
    } else {
        format!("{},{};q=0.9,en;q=0.8", locale, primary)
    }
}
