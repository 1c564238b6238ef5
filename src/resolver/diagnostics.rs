// Blocking diagnostics - classifies extractor and HTTP failures
//
// Analyzes error text to determine:
// - Type of blocking (403, signature rotation, rate limit, etc.)
// - Whether another strategy or a later retry might help
// - Whether the restriction is permanent for this content

use serde::{Deserialize, Serialize};

/// Reasons why the upstream might refuse a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// HTTP 403 Forbidden - expired or forged signed URL, general access denied
    Http403Forbidden,

    /// HTTP 404 or a vanished media URL
    NotFound,

    /// Player signature / nsig rotation broke the extractor
    SignatureRotation,

    /// PO Token (Proof of Origin) required
    PoTokenRequired,

    /// Extractor returned an empty or unusable format list
    NoFormats,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// Network timeout (soft IP block)
    NetworkTimeout,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection triggered
    BotDetection,

    /// Private track or video
    Private,

    /// Deleted or otherwise unavailable content
    Unavailable,

    /// DRM-protected content, no workaround exists
    DrmProtected,

    /// Generic/unknown blocking
    Unknown,
}

impl BlockingReason {
    /// Check if a different strategy or a later attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::SignatureRotation
                | Self::PoTokenRequired
                | Self::NoFormats
                | Self::NetworkTimeout
                | Self::RateLimited
                | Self::BotDetection
        )
    }

    /// Check if this is a permanent restriction (no workaround)
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DrmProtected | Self::Unavailable | Self::Private)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::NotFound => "Media not found (HTTP 404)",
            Self::SignatureRotation => "Player signature changed",
            Self::PoTokenRequired => "Proof of Origin token required",
            Self::NoFormats => "No playable formats returned",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::NetworkTimeout => "Network timeout (possible IP throttling)",
            Self::RateLimited => "Rate limited by upstream",
            Self::BotDetection => "Bot detection triggered",
            Self::Private => "Private content",
            Self::Unavailable => "Content unavailable",
            Self::DrmProtected => "DRM-protected content",
            Self::Unknown => "Unknown blocking reason",
        }
    }
}

/// Analyze error message and return blocking reason
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();

    // Check patterns in order of specificity

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("encrypted media")
        || lower.contains("requires purchase")
    {
        return Some(BlockingReason::DrmProtected);
    }

    if lower.contains("nsig")
        || lower.contains("signature extraction failed")
        || lower.contains("unable to extract signature")
        || lower.contains("cipher")
    {
        return Some(BlockingReason::SignatureRotation);
    }

    if lower.contains("po token") || lower.contains("proof of origin") {
        return Some(BlockingReason::PoTokenRequired);
    }

    if lower.contains("requested format is not available")
        || lower.contains("no video formats found")
        || lower.contains("no formats")
    {
        return Some(BlockingReason::NoFormats);
    }

    if lower.contains("age-restricted") || lower.contains("confirm your age") {
        return Some(BlockingReason::AgeRestricted);
    }

    if lower.contains("private video")
        || lower.contains("is private")
        || lower.contains("sign in if you've been granted access")
    {
        return Some(BlockingReason::Private);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("is unavailable")
    {
        return Some(BlockingReason::Unavailable);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restrict")
    {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        return Some(BlockingReason::RateLimited);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("404") || lower.contains("not found") {
        return Some(BlockingReason::NotFound);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
    {
        return Some(BlockingReason::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(BlockingReason::Unknown);
    }

    None
}
