use super::AppConfig;

/// Apply environment overrides on top of file/default configuration.
///
/// Unset or empty variables leave the existing value untouched.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(v) = non_empty_var("UWB_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Some(v) = non_empty_var("UWB_DATABASE_URL") {
        config.zones.database_url = Some(v);
    }
    if let Some(v) = non_empty_var("UWB_DATABASE_TOKEN") {
        config.zones.auth_token = Some(v);
    }
    if let Some(v) = non_empty_var("UWB_SERVER_URL") {
        config.viewer.server_url = v;
    }
    if let Some(v) = non_empty_var("UWB_AUTH_ENABLED") {
        if let Ok(b) = v.parse::<bool>() {
            config.auth.enabled = b;
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
