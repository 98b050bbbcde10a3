pub mod bot_credentials;
pub mod master_items;
pub mod streamer_items;
pub mod streamers;
pub mod tokens;
pub mod viewers;

use itemdrop_sdk::objects::TokenSource as SdkTokenSource;

/// Token source for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `itemdrop_sdk::objects::TokenSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "token_source")]
pub enum TokenSource {
    ChannelPoints,
    Bits,
    Gifted,
}

impl From<TokenSource> for SdkTokenSource {
    fn from(value: TokenSource) -> Self {
        match value {
            TokenSource::ChannelPoints => SdkTokenSource::ChannelPoints,
            TokenSource::Bits => SdkTokenSource::Bits,
            TokenSource::Gifted => SdkTokenSource::Gifted,
        }
    }
}

impl From<SdkTokenSource> for TokenSource {
    fn from(value: SdkTokenSource) -> Self {
        match value {
            SdkTokenSource::ChannelPoints => TokenSource::ChannelPoints,
            SdkTokenSource::Bits => TokenSource::Bits,
            SdkTokenSource::Gifted => TokenSource::Gifted,
        }
    }
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkTokenSource::from(*self).fmt(f)
    }
}
