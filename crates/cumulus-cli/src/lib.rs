use anyhow::anyhow;
use cumulus_core::ProviderOptions;
use serde_json::Value;

/// Parse a `key=value` provider option.
///
/// Values that parse as JSON (`150`, `true`, `["a","b"]`) keep their type;
/// anything else is taken as a string.
pub fn parse_option(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("option must be key=value, got {:?}", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("option key is empty in {:?}", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Collect `key=value` pairs into provider options; later keys win.
pub fn parse_options(raw: &[String]) -> anyhow::Result<ProviderOptions> {
    raw.iter()
        .map(|pair| parse_option(pair))
        .collect::<anyhow::Result<ProviderOptions>>()
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_option_keeps_json_types() {
        assert_eq!(parse_option("width=150").unwrap(), ("width".to_string(), json!(150)));
        assert_eq!(parse_option("overwrite=true").unwrap().1, json!(true));
        assert_eq!(parse_option("tags=[\"a\",\"b\"]").unwrap().1, json!(["a", "b"]));
    }

    #[test]
    fn parse_option_falls_back_to_string() {
        assert_eq!(parse_option("crop=fit").unwrap().1, json!("fit"));
        assert_eq!(parse_option("folder=a=b").unwrap().1, json!("a=b"));
        assert_eq!(parse_option("empty=").unwrap().1, json!(""));
    }

    #[test]
    fn parse_option_rejects_malformed() {
        assert!(parse_option("width").is_err());
        assert!(parse_option("=150").is_err());
    }

    #[test]
    fn parse_options_later_keys_win() {
        let options = parse_options(&["crop=fit".to_string(), "crop=fill".to_string()]).unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options["crop"], json!("fill"));
    }
}
