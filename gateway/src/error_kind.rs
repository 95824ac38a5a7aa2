//! User-facing error classification and localized formatting (§4.B).
//!
//! This is distinct from the crate's internal `thiserror` error enums (see [`crate::GatewayError`]
//! and friends): an [`ErrorKind`] is derived from an internal error purely to pick a localized
//! string and log severity. It never replaces the internal error as the thing propagated with `?`.

use std::fmt;

/// Closed set of user-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    AccessDenied,
    InvalidMessage,
    AgentError,
    NetworkError,
    InternalError,
}

/// A language the formatter can render into. Unknown languages fall through to `En`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Zh,
    En,
}

impl Language {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "zh" => Language::Zh,
            _ => Language::En,
        }
    }
}

impl ErrorKind {
    /// Classifies an internal error: first by matching known substrings in its `Display` output
    /// (in the fixed order below), falling back to `InternalError`. Callers that hold a typed
    /// internal error should prefer matching on its variant directly and only fall back to this
    /// substring heuristic for errors crossing an SDK/FFI boundary as a bare message string.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            ErrorKind::Timeout
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            ErrorKind::RateLimit
        } else if lower.contains("access denied") || lower.contains("forbidden") || lower.contains("blacklist") {
            ErrorKind::AccessDenied
        } else if lower.contains("invalid message") || lower.contains("invalid input") {
            ErrorKind::InvalidMessage
        } else if lower.contains("agent") {
            ErrorKind::AgentError
        } else if lower.contains("network") || lower.contains("connection") {
            ErrorKind::NetworkError
        } else {
            ErrorKind::InternalError
        }
    }

    fn text(self, lang: Language) -> &'static str {
        match (self, lang) {
            (ErrorKind::Timeout, Language::Zh) => "请求超时，请稍后再试",
            (ErrorKind::Timeout, Language::En) => "Request timed out, please try again",
            (ErrorKind::RateLimit, Language::Zh) => "请求太频繁，请稍后再试",
            (ErrorKind::RateLimit, Language::En) => "Too many requests, please slow down",
            (ErrorKind::AccessDenied, Language::Zh) => "抱歉，您没有使用权限",
            (ErrorKind::AccessDenied, Language::En) => "Sorry, you don't have access",
            (ErrorKind::InvalidMessage, Language::Zh) => "消息内容无效",
            (ErrorKind::InvalidMessage, Language::En) => "Invalid message content",
            (ErrorKind::AgentError, Language::Zh) => "助手处理出错，请稍后再试",
            (ErrorKind::AgentError, Language::En) => "The assistant hit an error, please try again",
            (ErrorKind::NetworkError, Language::Zh) => "网络连接出现问题",
            (ErrorKind::NetworkError, Language::En) => "A network error occurred",
            (ErrorKind::InternalError, Language::Zh) => "内部错误，请联系管理员",
            (ErrorKind::InternalError, Language::En) => "An internal error occurred",
        }
    }

    /// `true` when the user-facing message should carry the "try again" retry glyph.
    pub fn retry_hint(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimit | ErrorKind::NetworkError
        )
    }

    pub fn log_severity(self) -> tracing::Level {
        match self {
            ErrorKind::AccessDenied | ErrorKind::InvalidMessage | ErrorKind::RateLimit => {
                tracing::Level::WARN
            }
            ErrorKind::Timeout | ErrorKind::AgentError | ErrorKind::NetworkError => {
                tracing::Level::WARN
            }
            ErrorKind::InternalError => tracing::Level::ERROR,
        }
    }
}

/// Renders `"⚠️ {text}{retry glyph if applicable}"` in the requested language.
pub fn format(kind: ErrorKind, lang: Language) -> String {
    let mut out = format!("⚠️ {}", kind.text(lang));
    if kind.retry_hint() {
        out.push_str(" 🔄");
    }
    out
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
