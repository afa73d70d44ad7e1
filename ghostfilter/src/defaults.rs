//! Built-in rule tables used when the configuration does not supply its own.

/// Path fragments that usually point at privileged or sensitive endpoints
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "admin", "login", "secure", "account", "auth", "backup", "config", "token", "password",
    "secret", "private", "internal", "debug", "test", "api", "manage", "db", "database", "user",
    "signup", "register", "payment", "billing", "key", "access",
];

/// Path segments that must end at a word boundary
pub const DEFAULT_REGEX_PATTERNS: &[&str] = &[
    r"(?i)/admin\b",
    r"(?i)/config\b",
    r"(?i)/debug\b",
    r"(?i)/backup\b",
    r"(?i)/auth\b",
    r"(?i)/token\b",
    r"(?i)/api\b",
    r"(?i)/private\b",
];

/// Static assets that are never reported, whatever their path contains
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "bmp", "css", "woff", "woff2", "ttf",
    "eot", "otf", "mp3", "mp4", "webm", "avi",
];

pub(crate) fn owned(table: &[&str]) -> Vec<String> {
    table.iter().map(|s| s.to_string()).collect()
}
