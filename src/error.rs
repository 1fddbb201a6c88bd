//! Error types for chatrelay.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Options error: {0}")]
    Options(#[from] OptionsError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Messaging surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Socket mode error: {0}")]
    Socket(#[from] SocketError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Option schema and resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("invalid value for \"{field}\": \"{value}\" is not a valid {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("no value for \"{field}\" on any tier and it has no built-in default")]
    Unresolved { field: String },

    #[error("unknown option field: \"{field}\"")]
    UnknownField { field: String },

    #[error("schema table mismatch for \"{field}\": {reason}")]
    SchemaMismatch { field: String, reason: String },
}

/// Channel option store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("bad row for channel {channel}: {reason}")]
    Decode { channel: String, reason: String },
}

/// Mention command parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown token: \"{token}\"")]
    UnknownFlag { token: String },

    #[error("flag \"{flag}\" is missing its value")]
    MissingValue { flag: String },

    #[error("unbalanced quote in command")]
    UnbalancedQuote,

    #[error("{0}")]
    Value(#[from] OptionsError),
}

/// Messaging surface (Slack Web API) errors.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack {method} failed: {reason}")]
    Api { method: String, reason: String },

    #[error("Slack {method} response missing field \"{field}\"")]
    MissingField { method: String, field: String },
}

/// Socket Mode transport errors.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection open refused: {reason}")]
    OpenRefused { reason: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {reason}")]
    Protocol { reason: String },
}

/// Completions backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("api_key environment variable \"{env_var}\" is not found")]
    MissingCredential { env_var: String },

    #[error("authentication failed for endpoint {endpoint}")]
    AuthFailed { endpoint: String },

    #[error("rate limited by endpoint {endpoint}")]
    RateLimited { endpoint: String },

    #[error("completion request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // --- ConfigError ---

    #[test]
    fn test_config_error_missing_env_var_display() {
        let err = ConfigError::MissingEnvVar("CHATRELAY_SLACK_BOT_TOKEN".to_string());
        assert!(err.to_string().contains("CHATRELAY_SLACK_BOT_TOKEN"));
        assert!(err
            .to_string()
            .contains("Missing required environment variable"));
    }

    // --- OptionsError ---

    #[test]
    fn test_options_error_invalid_value_display() {
        let err = OptionsError::InvalidValue {
            field: "temperature".to_string(),
            value: "hot".to_string(),
            expected: "float",
        };
        let msg = err.to_string();
        assert!(msg.contains("temperature"));
        assert!(msg.contains("hot"));
        assert!(msg.contains("float"));
    }

    #[test]
    fn test_options_error_unresolved_display() {
        let err = OptionsError::Unresolved {
            field: "base_url".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("base_url"));
        assert!(msg.contains("no built-in default"));
    }

    #[test]
    fn test_options_error_unknown_field_display() {
        let err = OptionsError::UnknownField {
            field: "frequency_penalty".to_string(),
        };
        assert!(err.to_string().contains("frequency_penalty"));
    }

    #[test]
    fn test_options_error_schema_mismatch_display() {
        let err = OptionsError::SchemaMismatch {
            field: "top_p".to_string(),
            reason: "duplicate field name".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("top_p"));
        assert!(msg.contains("duplicate field name"));
    }

    // --- StoreError ---

    #[test]
    fn test_store_error_decode_display() {
        let err = StoreError::Decode {
            channel: "C042".to_string(),
            reason: "upsert returned no row".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("C042"));
        assert!(msg.contains("upsert returned no row"));
    }

    // --- CommandError ---

    #[test]
    fn test_command_error_unknown_flag_display() {
        let err = CommandError::UnknownFlag {
            token: "--frequency-penalty".to_string(),
        };
        assert!(err.to_string().contains("--frequency-penalty"));
    }

    #[test]
    fn test_command_error_missing_value_display() {
        let err = CommandError::MissingValue {
            flag: "--model".to_string(),
        };
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn test_command_error_wraps_options_error() {
        let inner = OptionsError::InvalidValue {
            field: "top_p".to_string(),
            value: "high".to_string(),
            expected: "float",
        };
        let err = CommandError::from(inner);
        let msg = err.to_string();
        assert!(msg.contains("top_p"));
        assert!(msg.contains("high"));
    }

    // --- SurfaceError ---

    #[test]
    fn test_surface_error_api_display() {
        let err = SurfaceError::Api {
            method: "chat.postMessage".to_string(),
            reason: "channel_not_found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("chat.postMessage"));
        assert!(msg.contains("channel_not_found"));
    }

    #[test]
    fn test_surface_error_missing_field_display() {
        let err = SurfaceError::MissingField {
            method: "chat.postMessage".to_string(),
            field: "ts".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("chat.postMessage"));
        assert!(msg.contains("\"ts\""));
    }

    // --- SocketError ---

    #[test]
    fn test_socket_error_open_refused_display() {
        let err = SocketError::OpenRefused {
            reason: "invalid_auth".to_string(),
        };
        assert!(err.to_string().contains("invalid_auth"));
    }

    #[test]
    fn test_socket_error_protocol_display() {
        let err = SocketError::Protocol {
            reason: "envelope without envelope_id".to_string(),
        };
        assert!(err.to_string().contains("envelope_id"));
    }

    // --- LlmError ---

    #[test]
    fn test_llm_error_missing_credential_display() {
        let err = LlmError::MissingCredential {
            env_var: "OPENAI_API_KEY".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("api_key environment variable"));
        assert!(msg.contains("\"OPENAI_API_KEY\""));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_llm_error_request_failed_display() {
        let err = LlmError::RequestFailed {
            endpoint: "http://localhost:8000/v1".to_string(),
            reason: "server returned 500".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("http://localhost:8000/v1"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn test_llm_error_auth_failed_display() {
        let err = LlmError::AuthFailed {
            endpoint: "https://api.openai.com/v1".to_string(),
        };
        assert!(err.to_string().contains("https://api.openai.com/v1"));
    }

    // --- From conversions into top-level Error ---

    #[test]
    fn test_error_from_options_error() {
        let inner = OptionsError::Unresolved {
            field: "model".to_string(),
        };
        let err = Error::from(inner);
        assert!(err.to_string().contains("Options error"));
    }

    #[test]
    fn test_error_from_command_error() {
        let inner = CommandError::UnbalancedQuote;
        let err = Error::from(inner);
        assert!(err.to_string().contains("Command error"));
    }

    #[test]
    fn test_error_from_llm_error() {
        let inner = LlmError::MissingCredential {
            env_var: "X".to_string(),
        };
        let err = Error::from(inner);
        assert!(err.to_string().contains("LLM error"));
    }

    #[test]
    fn test_error_from_surface_error() {
        let inner = SurfaceError::Api {
            method: "chat.update".to_string(),
            reason: "message_not_found".to_string(),
        };
        let err = Error::from(inner);
        assert!(err.to_string().contains("Messaging surface error"));
    }

    // --- Debug trait ---

    #[test]
    fn test_error_debug_is_implemented() {
        let err = Error::Config(ConfigError::MissingEnvVar("X".to_string()));
        let debug = format!("{:?}", err);
        assert!(!debug.is_empty());
    }
}
