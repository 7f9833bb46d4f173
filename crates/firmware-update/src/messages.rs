//! Operator-facing message lookup.
//!
//! Device error codes are resolved through a [`MessageCatalog`]: a known
//! code maps to a localized message; otherwise the device's own message is
//! used; otherwise a generic "unknown error" text.

use std::fmt;
use std::str::FromStr;

use pendant_protocol::ErrorCode;
use serde::{Deserialize, Serialize};

/// Fixed, non-code messages the update flow shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    UnknownError,
    NetworkError,
    Unauthorized,
    NoImageSelected,
    InvalidImage,
    Uploading,
    Written,
    Rebooting,
    Reconnecting,
    ReconnectFailed,
    Reconnected,
    Cancelled,
    CurrentVersion,
}

/// Resolves error codes and fixed keys to display text.
pub trait MessageCatalog: Send + Sync {
    /// Message for a device error.
    ///
    /// `code` wins when it is known; otherwise a non-empty `fallback`;
    /// otherwise the unknown-error text.
    fn error_message(&self, code: Option<i32>, fallback: Option<&str>) -> String;

    /// Text for a fixed key.
    fn text(&self, key: MessageKey) -> String;
}

/// Display language of the built-in catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "en-us" | "english" => Ok(Self::En),
            "zh" | "zh-cn" | "chinese" => Ok(Self::Zh),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Built-in English/Chinese catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catalog {
    language: Language,
}

impl Catalog {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    fn code_text(&self, code: ErrorCode) -> Option<&'static str> {
        let text = match (self.language, code) {
            (Language::En, ErrorCode::InvalidParam) => "Invalid parameter",
            (Language::En, ErrorCode::Conflict) => "Resource conflict",
            (Language::En, ErrorCode::FlashErase) => "Firmware erase failed",
            (Language::En, ErrorCode::FlashWrite) => "Firmware write failed",
            (Language::Zh, ErrorCode::InvalidParam) => "参数校验失败",
            (Language::Zh, ErrorCode::Conflict) => "资源冲突",
            (Language::Zh, ErrorCode::FlashErase) => "固件擦除失败",
            (Language::Zh, ErrorCode::FlashWrite) => "固件写入失败",
            _ => return None,
        };
        Some(text)
    }

    fn key_text(&self, key: MessageKey) -> &'static str {
        use MessageKey::*;
        match self.language {
            Language::En => match key {
                UnknownError => "Unknown error",
                NetworkError => "Network connection failed",
                Unauthorized => "Session expired, please log in again",
                NoImageSelected => "Please select a firmware file",
                InvalidImage => "Invalid firmware file",
                Uploading => "Uploading...",
                Written => "Firmware written, reboot required to take effect",
                Rebooting => "Device is rebooting, please wait...",
                Reconnecting => "Trying to reconnect to device...",
                ReconnectFailed => "Unable to connect to device, please refresh manually",
                Reconnected => "Device is back online",
                Cancelled => "Upload cancelled",
                CurrentVersion => "Current Version",
            },
            Language::Zh => match key {
                UnknownError => "未知错误",
                NetworkError => "网络连接失败",
                Unauthorized => "登录已失效，请重新登录",
                NoImageSelected => "请选择固件文件",
                InvalidImage => "固件文件无效",
                Uploading => "上传中...",
                Written => "固件已写入，需要重启后生效",
                Rebooting => "设备正在重启，请稍等...",
                Reconnecting => "正在尝试重新连接设备...",
                ReconnectFailed => "无法连接到设备，请手动刷新页面",
                Reconnected => "设备已重新上线",
                Cancelled => "上传已取消",
                CurrentVersion => "当前版本",
            },
        }
    }
}

impl MessageCatalog for Catalog {
    fn error_message(&self, code: Option<i32>, fallback: Option<&str>) -> String {
        if let Some(text) = code
            .and_then(ErrorCode::from_code)
            .and_then(|known| self.code_text(known))
        {
            return text.to_string();
        }
        match fallback {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => self.text(MessageKey::UnknownError),
        }
    }

    fn text(&self, key: MessageKey) -> String {
        self.key_text(key).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_wins_over_fallback() {
        let en = Catalog::new(Language::En);
        assert_eq!(
            en.error_message(Some(2001), Some("flash write error")),
            "Firmware write failed"
        );
        let zh = Catalog::new(Language::Zh);
        assert_eq!(zh.error_message(Some(1001), None), "参数校验失败");
    }

    #[test]
    fn unknown_code_uses_device_message() {
        let en = Catalog::new(Language::En);
        assert_eq!(
            en.error_message(Some(4242), Some("busy flashing")),
            "busy flashing"
        );
    }

    #[test]
    fn falls_back_to_unknown_error() {
        let en = Catalog::new(Language::En);
        assert_eq!(en.error_message(Some(4242), None), "Unknown error");
        assert_eq!(en.error_message(None, Some("")), "Unknown error");
        assert_eq!(en.error_message(None, None), "Unknown error");

        let zh = Catalog::new(Language::Zh);
        assert_eq!(zh.error_message(None, None), "未知错误");
    }

    #[test]
    fn no_code_uses_fallback() {
        let en = Catalog::new(Language::En);
        assert_eq!(
            en.error_message(None, Some("connection reset")),
            "connection reset"
        );
    }

    #[test]
    fn every_key_has_text_in_both_languages() {
        use MessageKey::*;
        let keys = [
            UnknownError,
            NetworkError,
            Unauthorized,
            NoImageSelected,
            InvalidImage,
            Uploading,
            Written,
            Rebooting,
            Reconnecting,
            ReconnectFailed,
            Reconnected,
            Cancelled,
            CurrentVersion,
        ];
        for lang in [Language::En, Language::Zh] {
            let catalog = Catalog::new(lang);
            for key in keys {
                assert!(!catalog.text(key).is_empty(), "{lang} {key:?}");
            }
        }
    }

    #[test]
    fn language_parse_and_display() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!("zh-CN".parse::<Language>().unwrap(), Language::Zh);
        assert!("fr".parse::<Language>().is_err());
        assert_eq!(Language::Zh.to_string(), "zh");
    }
}
