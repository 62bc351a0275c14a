//! Default values for configuration

/// Default GitHub API base URL
pub fn default_api_base_url() -> String {
    std::env::var("COUNTYSYNC_API_URL").unwrap_or_else(|_| "https://api.github.com".to_string())
}

/// Default base URL for raw file downloads
pub fn default_raw_base_url() -> String {
    std::env::var("COUNTYSYNC_RAW_URL").unwrap_or_else(|_| "https://github.com".to_string())
}

/// Default repository owner
pub fn default_owner() -> String {
    "nytimes".to_string()
}

/// Default repository name
pub fn default_repository() -> String {
    "covid-19-data".to_string()
}

/// Default branch to download raw files from
pub fn default_branch() -> String {
    "master".to_string()
}

/// Default directory holding the tracked CSV files
pub fn default_directory() -> String {
    "rolling-averages".to_string()
}

/// Default request timeout in seconds
pub fn default_timeout_secs() -> u64 {
    30
}

/// Default user agent (GitHub rejects API requests without one)
pub fn default_user_agent() -> String {
    format!("countysync/{}", env!("CARGO_PKG_VERSION"))
}

/// Default tracked files
pub fn default_files() -> Vec<String> {
    vec!["us-counties-2020".to_string(), "us-counties-2021".to_string()]
}

/// Default region for queries
pub fn default_region() -> String {
    "King".to_string()
}

/// Default parent region for queries
pub fn default_parent_region() -> String {
    "Washington".to_string()
}
