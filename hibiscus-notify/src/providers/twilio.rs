use async_trait::async_trait;
use hibiscus_core::notify::SmsSender;
use hibiscus_core::{CoreError, CoreResult};
use hibiscus_store::app_config::TwilioConfig;
use reqwest::Client;
use std::time::Duration;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Twilio Messages API over plain HTTPS.
#[derive(Clone)]
pub struct TwilioSmsSender {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    country_code: String,
}

impl TwilioSmsSender {
    pub fn new(config: &TwilioConfig, timeout: Duration) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CoreError::upstream)?;
        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            country_code: config.default_country_code.clone(),
        })
    }
}

/// International format: `021 555 123` becomes `+6421555123`.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if digits.starts_with('+') {
        return digits;
    }
    match digits.strip_prefix('0') {
        Some(local) => format!("{}{}", country_code, local),
        None => format!("{}{}", country_code, digits),
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> CoreResult<()> {
        let url = format!("{}/Accounts/{}/Messages.json", TWILIO_API_BASE, self.account_sid);
        let to = normalize_phone(to, &self.country_code);
        let params = [("To", to.as_str()), ("From", self.from_number.as_str()), ("Body", body)];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| CoreError::upstream(format!("Twilio request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::upstream(format!("Twilio returned {status}: {detail}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_local_number() {
        assert_eq!(normalize_phone("021 555 123", "+64"), "+6421555123");
        assert_eq!(normalize_phone("21555123", "+64"), "+6421555123");
    }

    #[test]
    fn test_normalize_keeps_international() {
        assert_eq!(normalize_phone("+61 400 111 222", "+64"), "+61400111222");
    }
}
