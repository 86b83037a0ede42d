use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// 探測失敗的分類
///
/// 呼叫端只依這七種值分支，傳輸層的錯誤型別不會越過確認引擎。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionRefused,
    Dns,
    Ssl,
    HttpStatus,
    StringNotFound,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::Dns => "dns",
            ErrorKind::Ssl => "ssl",
            ErrorKind::HttpStatus => "http_status",
            ErrorKind::StringNotFound => "string_not_found",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 依傳輸錯誤文字分類
///
/// 啟發式比對小寫文字中的子字串，依序檢查逾時、拒絕連線、DNS、TLS。
pub fn classify_error(message: &str) -> ErrorKind {
    let text = message.to_lowercase();

    if text.contains("timed out") || text.contains("timeout") {
        ErrorKind::Timeout
    } else if text.contains("connection refused") {
        ErrorKind::ConnectionRefused
    } else if text.contains("could not resolve")
        || text.contains("name or service not known")
        || text.contains("failed to lookup address")
        || text.contains("nodename nor servname")
        || text.contains("dns error")
    {
        ErrorKind::Dns
    } else if text.contains("ssl") || text.contains("certificate") || text.contains("tls") {
        ErrorKind::Ssl
    } else {
        ErrorKind::Unknown
    }
}

/// TCP 連線錯誤分類：作業系統回報拒絕時為 connection_refused，其餘一律視為逾時
pub fn classify_connect_error(err: &io::Error) -> ErrorKind {
    match err.raw_os_error() {
        Some(110) | Some(111) => ErrorKind::ConnectionRefused,
        _ if err.kind() == io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
        _ => ErrorKind::Timeout,
    }
}

/// 將錯誤及其來源鏈串成一行文字
pub fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let inner_text = inner.to_string();
        if !text.contains(&inner_text) {
            text.push_str(": ");
            text.push_str(&inner_text);
        }
        source = inner.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cURL error 28: Operation timed out after 10001 milliseconds", ErrorKind::Timeout)]
    #[case("request TIMEOUT", ErrorKind::Timeout)]
    #[case("tcp connect error: Connection refused (os error 111)", ErrorKind::ConnectionRefused)]
    #[case("Could not resolve host: nope.invalid", ErrorKind::Dns)]
    #[case("dns error: failed to lookup address information: Name or service not known", ErrorKind::Dns)]
    #[case("SSL certificate problem: self signed certificate", ErrorKind::Ssl)]
    #[case("invalid peer certificate: UnknownIssuer", ErrorKind::Ssl)]
    #[case("connection reset by peer", ErrorKind::Unknown)]
    #[case("", ErrorKind::Unknown)]
    fn test_classify_error(#[case] message: &str, #[case] expected: ErrorKind) {
        assert_eq!(classify_error(message), expected);
    }

    #[test]
    fn test_classify_connect_error() {
        let refused = io::Error::from_raw_os_error(111);
        assert_eq!(classify_connect_error(&refused), ErrorKind::ConnectionRefused);

        let errno_110 = io::Error::from_raw_os_error(110);
        assert_eq!(classify_connect_error(&errno_110), ErrorKind::ConnectionRefused);

        let by_kind = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(classify_connect_error(&by_kind), ErrorKind::ConnectionRefused);

        let unreachable = io::Error::new(io::ErrorKind::Other, "network unreachable");
        assert_eq!(classify_connect_error(&unreachable), ErrorKind::Timeout);
    }

    #[test]
    fn test_error_chain_text_includes_sources() {
        #[derive(Debug)]
        struct Outer(io::Error);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("error sending request")
            }
        }
        impl StdError for Outer {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(io::Error::new(io::ErrorKind::Other, "operation timed out"));
        let text = error_chain_text(&err);
        assert_eq!(text, "error sending request: operation timed out");
        assert_eq!(classify_error(&text), ErrorKind::Timeout);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ConnectionRefused).unwrap(),
            "\"connection_refused\""
        );
        assert_eq!(ErrorKind::StringNotFound.to_string(), "string_not_found");
    }
}
