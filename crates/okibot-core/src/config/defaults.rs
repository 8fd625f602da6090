//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "OkitakoyBot".to_string()
}

pub fn default_data_dir() -> String {
    "~/.okibot".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_welcome_text() -> String {
    "Bonjour, ici OkitakoyBot 🤖, votre assistant virtuel professionnel. \
     Tapez *help* pour voir les commandes disponibles."
        .to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_device_name() -> String {
    "OkitakoyBot".to_string()
}

pub fn default_reconnect_delay_secs() -> u64 {
    5
}

pub fn default_keep_alive_minutes() -> u64 {
    5
}

pub fn default_sponsor_code_ttl_minutes() -> u64 {
    10
}

pub fn default_provider() -> String {
    "openrouter".to_string()
}

pub fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

pub fn default_openrouter_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

pub fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

pub fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

pub fn default_flux_base_url() -> String {
    "https://api.flux.ai/v1".to_string()
}

pub fn default_help_aliases() -> Vec<String> {
    vec!["help".to_string(), "aide".to_string()]
}

pub fn default_summarize_prefixes() -> Vec<String> {
    vec![
        "summarize:".to_string(),
        "résume:".to_string(),
        "resumer:".to_string(),
    ]
}

pub fn default_image_prefixes() -> Vec<String> {
    vec!["image:".to_string()]
}

pub fn default_analyze_prefixes() -> Vec<String> {
    vec!["analyze:".to_string()]
}

pub fn default_snapshot_interval_minutes() -> u64 {
    60
}

pub fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_http_port() -> u16 {
    3000
}
