use super::filter_message_params;
use super::warn::custom_message_key;
use crate::parameters::Parameters;
use crate::status::Message;

/// Rejects the action outright
pub struct Disallow {
    params: Parameters,
    message_key: String,
}

impl Disallow {
    pub fn new(params: Parameters, raw: &[String]) -> Self {
        Self {
            params,
            message_key: custom_message_key(raw, "abusefilter-disallowed"),
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn execute(&self) -> bool {
        true
    }

    pub fn message(&self) -> Message {
        Message::new(self.message_key.clone(), filter_message_params(&self.params))
    }
}
