use crewdeck_config::OAuthSettings;
use reqwest::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GoogleAuthError {
    #[error("Google API error: {0}")]
    Api(String),
    #[error("Malformed Google response: missing {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    pub verified_email: bool,
    pub name: String,
    pub picture: Option<String>,
}

pub struct GoogleOAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleOAuth {
    pub fn new(settings: &OAuthSettings, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            client_id: settings.google.client_id.clone(),
            client_secret: settings.google.client_secret.clone(),
            redirect_uri: format!("{}/oauth2callback", base_url.trim_end_matches('/')),
        }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.client_id,
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode("openid email profile"),
            state
        )
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, GoogleAuthError> {
        let resp: serde_json::Value = self
            .client
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| GoogleAuthError::Api(e.to_string()))?
            .json()
            .await
            .map_err(|e| GoogleAuthError::Api(e.to_string()))?;

        if let Some(err) = resp.get("error") {
            let message = resp["error_description"]
                .as_str()
                .or_else(|| err.as_str())
                .unwrap_or("Unknown Google error")
                .to_string();
            return Err(GoogleAuthError::Api(message));
        }

        resp["access_token"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or(GoogleAuthError::Malformed("access_token"))
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, GoogleAuthError> {
        let resp: serde_json::Value = self
            .client
            .get("https://www.googleapis.com/oauth2/v2/userinfo")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleAuthError::Api(e.to_string()))?
            .json()
            .await
            .map_err(|e| GoogleAuthError::Api(e.to_string()))?;

        Ok(GoogleProfile {
            id: resp["id"]
                .as_str()
                .ok_or(GoogleAuthError::Malformed("id"))?
                .to_string(),
            email: resp["email"]
                .as_str()
                .ok_or(GoogleAuthError::Malformed("email"))?
                .to_string(),
            verified_email: resp["verified_email"].as_bool().unwrap_or(false),
            name: resp["name"].as_str().unwrap_or("").to_string(),
            picture: resp["picture"].as_str().map(|s| s.to_string()),
        })
    }
}
