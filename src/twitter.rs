// 🐦 API client
// Thin blocking wrapper over the three lookups the tracker needs.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::cell::RefCell;
use std::time::Duration;
use tracing::debug;

use crate::config::TwitterConfig;
use crate::error::{Result, TwackError};
use crate::temporal::AccountId;

/// Profile fields used to map a handle to its numeric id
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub id: AccountId,
    pub screen_name: String,
}

/// Remote source of profiles and relationship ID lists
pub trait SocialApi {
    fn fetch_profile(&self, screen_name: &str) -> Result<Profile>;

    /// IDs of the accounts following `screen_name`
    fn fetch_follower_ids(&self, screen_name: &str) -> Result<Vec<AccountId>>;

    /// IDs of the accounts `screen_name` follows
    fn fetch_friend_ids(&self, screen_name: &str) -> Result<Vec<AccountId>>;
}

impl<T: SocialApi + ?Sized> SocialApi for Box<T> {
    fn fetch_profile(&self, screen_name: &str) -> Result<Profile> {
        (**self).fetch_profile(screen_name)
    }

    fn fetch_follower_ids(&self, screen_name: &str) -> Result<Vec<AccountId>> {
        (**self).fetch_follower_ids(screen_name)
    }

    fn fetch_friend_ids(&self, screen_name: &str) -> Result<Vec<AccountId>> {
        (**self).fetch_friend_ids(screen_name)
    }
}

/// Stand-in for commands that only read or manage the database.
/// Every call fails with a configuration error.
pub struct Offline;

impl Offline {
    fn unavailable(screen_name: &str) -> TwackError {
        TwackError::Config(format!(
            "API access is not configured for this command (needed for @{})",
            screen_name
        ))
    }
}

impl SocialApi for Offline {
    fn fetch_profile(&self, screen_name: &str) -> Result<Profile> {
        Err(Offline::unavailable(screen_name))
    }

    fn fetch_follower_ids(&self, screen_name: &str) -> Result<Vec<AccountId>> {
        Err(Offline::unavailable(screen_name))
    }

    fn fetch_friend_ids(&self, screen_name: &str) -> Result<Vec<AccountId>> {
        Err(Offline::unavailable(screen_name))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct IdsPage {
    ids: Vec<AccountId>,
    #[serde(default)]
    next_cursor: i64,
}

/// App-only authenticated client. The bearer token is fetched on first use.
pub struct TwitterClient {
    config: TwitterConfig,
    agent: ureq::Agent,
    token: RefCell<Option<String>>,
}

impl TwitterClient {
    pub fn new(config: TwitterConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(60))
            .build();

        TwitterClient {
            config,
            agent,
            token: RefCell::new(None),
        }
    }

    fn basic_credentials(&self) -> String {
        basic_credentials(&self.config.consumer_key, &self.config.consumer_secret)
    }

    fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.token.borrow().as_ref() {
            return Ok(token.clone());
        }

        let url = format!("{}/oauth2/token", self.config.api_base);
        let response: TokenResponse = self
            .agent
            .post(&url)
            .set("Authorization", &self.basic_credentials())
            .send_form(&[("grant_type", "client_credentials")])?
            .into_json()
            .map_err(|e| TwackError::Api(format!("bad token response: {}", e)))?;

        if !response.token_type.eq_ignore_ascii_case("bearer") {
            return Err(TwackError::Api(format!(
                "unexpected token type '{}'",
                response.token_type
            )));
        }

        debug!("obtained bearer token");
        *self.token.borrow_mut() = Some(response.access_token.clone());
        Ok(response.access_token)
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let mut request = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.bearer_token()?));
        for (key, value) in query {
            request = request.query(key, value);
        }

        request
            .call()?
            .into_json()
            .map_err(|e| TwackError::Api(format!("bad response from {}: {}", path, e)))
    }

    /// Follow cursors until the listing is exhausted
    fn collect_ids(&self, path: &str, screen_name: &str) -> Result<Vec<AccountId>> {
        let mut ids = Vec::new();
        let mut cursor: i64 = -1;

        loop {
            let cursor_text = cursor.to_string();
            let page: IdsPage = self.get(
                path,
                &[
                    ("screen_name", screen_name),
                    ("cursor", &cursor_text),
                    ("count", "5000"),
                ],
            )?;
            ids.extend(page.ids);

            if page.next_cursor == 0 {
                break;
            }
            cursor = page.next_cursor;
        }

        debug!(path, screen_name, count = ids.len(), "fetched ids");
        Ok(ids)
    }
}

impl SocialApi for TwitterClient {
    fn fetch_profile(&self, screen_name: &str) -> Result<Profile> {
        self.get("/1.1/users/show.json", &[("screen_name", screen_name)])
    }

    fn fetch_follower_ids(&self, screen_name: &str) -> Result<Vec<AccountId>> {
        self.collect_ids("/1.1/followers/ids.json", screen_name)
    }

    fn fetch_friend_ids(&self, screen_name: &str) -> Result<Vec<AccountId>> {
        self.collect_ids("/1.1/friends/ids.json", screen_name)
    }
}

fn basic_credentials(key: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", key, secret)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_refuses_network() {
        let api: Box<dyn SocialApi> = Box::new(Offline);
        assert!(matches!(api.fetch_profile("anyone"), Err(TwackError::Config(_))));
    }

    #[test]
    fn test_basic_credentials() {
        assert_eq!(basic_credentials("key", "secret"), "Basic a2V5OnNlY3JldA==");
    }

    #[test]
    fn test_ids_page_parses_last_page() {
        let page: IdsPage =
            serde_json::from_str(r#"{"ids": [12, 1234567890123], "next_cursor": 0}"#).unwrap();

        assert_eq!(page.ids, vec![12, 1234567890123]);
        assert_eq!(page.next_cursor, 0);
    }

    #[test]
    fn test_profile_ignores_extra_fields() {
        let profile: Profile = serde_json::from_str(
            r#"{"id": 42, "id_str": "42", "screen_name": "judy2k", "followers_count": 10}"#,
        )
        .unwrap();

        assert_eq!(profile, Profile { id: 42, screen_name: "judy2k".to_string() });
    }
}
