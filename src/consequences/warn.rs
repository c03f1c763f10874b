use super::filter_message_params;
use crate::parameters::Parameters;
use crate::status::Message;

const DEFAULT_MESSAGE: &str = "abusefilter-warning";

/// Shows a warning the user can dismiss by resubmitting
pub struct Warn {
    params: Parameters,
    message_key: String,
}

impl Warn {
    pub fn new(params: Parameters, raw: &[String]) -> Self {
        Self {
            params,
            message_key: custom_message_key(raw, DEFAULT_MESSAGE),
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// The warning itself is the abort message
    pub fn execute(&self) -> bool {
        true
    }

    pub fn message(&self) -> Message {
        Message::new(self.message_key.clone(), filter_message_params(&self.params))
    }
}

/// `raw[0]` when it is a non-empty message key, otherwise `default`
pub(super) fn custom_message_key(raw: &[String], default: &str) -> String {
    raw.first()
        .map(|key| key.trim())
        .filter(|key| !key.is_empty())
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterKey};
    use crate::parameters::{ActionKind, UserIdentity};

    fn params(key: FilterKey) -> Parameters {
        Parameters::new(
            Filter::new(key, "Test filter"),
            key.global,
            UserIdentity::new(7, "Mallory"),
            "Sandbox",
            ActionKind::Edit,
        )
    }

    #[test]
    fn test_default_message() {
        let warn = Warn::new(params(FilterKey::local(1)), &[]);
        assert!(warn.execute());
        assert_eq!(
            warn.message(),
            Message::new("abusefilter-warning", vec!["Test filter".to_string(), "1".to_string()])
        );
    }

    #[test]
    fn test_custom_message_and_global_token() {
        let warn = Warn::new(params(FilterKey::global(1)), &["abusefilter-warning-spam".to_string()]);
        let message = warn.message();
        assert_eq!(message.key, "abusefilter-warning-spam");
        assert_eq!(message.params[1], "global-1");
    }

    #[test]
    fn test_blank_custom_key_falls_back() {
        assert_eq!(custom_message_key(&["  ".to_string()], "x"), "x");
    }
}
