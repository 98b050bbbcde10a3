//! Twitch application configuration.

/// Credentials and reward settings for the Twitch integration.
#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered for the bot authorization flow.
    pub redirect_uri: String,
    /// Redirect URI registered for streamer sign-in.
    pub signin_redirect_uri: String,
    /// Shared secret for EventSub message signatures.
    pub webhook_secret: String,
    /// Public URL EventSub delivers notifications to.
    pub webhook_callback_url: String,
    /// Base64 secret the extension signs viewer JWTs with.
    pub extension_secret: String,
    /// Login the bot authorization must resolve to.
    pub bot_account: String,
    pub token_unit_name: String,
    pub reward_cost: u32,
    pub reward_token_amount: u32,
}

impl TwitchConfig {
    /// Title of the channel point reward, e.g. `"100 Smash Factory Tokens"`.
    ///
    /// Ingestion parses the token amount back out of this title.
    pub fn reward_title(&self) -> String {
        format!("{} {}s", self.reward_token_amount, self.token_unit_name)
    }

    pub fn reward_prompt(&self) -> String {
        format!("Redeem to get {} {}s!", self.reward_token_amount, self.token_unit_name)
    }
}
