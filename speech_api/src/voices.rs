use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceLanguage {
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceModel {
    pub name: String,
    #[serde(default)]
    pub languages: Vec<VoiceLanguage>,
}

/// A catalog entry. Fields the upstream adds beyond the ones used here are
/// kept in `extra` and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub models: Vec<VoiceModel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Move the first voice named `display_name` to the front.
///
/// Returns whether the order changed; a voice that is already first or
/// absent leaves the list alone.
pub fn promote_voice(voices: &mut Vec<Voice>, display_name: &str) -> bool {
    match voices.iter().position(|v| v.display_name == display_name) {
        Some(index) if index > 0 => {
            let voice = voices.remove(index);
            voices.insert(0, voice);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: &str, name: &str) -> Voice {
        Voice {
            id: id.to_string(),
            display_name: name.to_string(),
            models: Vec::new(),
            extra: Map::new(),
        }
    }

    fn ids(voices: &[Voice]) -> Vec<&str> {
        voices.iter().map(|v| v.id.as_str()).collect()
    }

    #[test]
    fn test_promote_moves_match_to_front() {
        let mut voices = vec![voice("a", "Henry"), voice("b", "Lisa"), voice("c", "SilkyJohnson2")];
        assert!(promote_voice(&mut voices, "SilkyJohnson2"));
        assert_eq!(ids(&voices), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_promote_keeps_order_when_first_or_missing() {
        let mut voices = vec![voice("a", "SilkyJohnson2"), voice("b", "Lisa")];
        assert!(!promote_voice(&mut voices, "SilkyJohnson2"));
        assert_eq!(ids(&voices), vec!["a", "b"]);

        assert!(!promote_voice(&mut voices, "Nobody"));
        assert_eq!(ids(&voices), vec!["a", "b"]);
    }

    #[test]
    fn test_promote_only_first_duplicate() {
        let mut voices = vec![voice("a", "Lisa"), voice("b", "Silky"), voice("c", "Silky")];
        promote_voice(&mut voices, "Silky");
        assert_eq!(ids(&voices), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_voice_keeps_unknown_fields() {
        let json = serde_json::json!({
            "id": "henry",
            "display_name": "Henry",
            "gender": "male",
            "models": [{ "name": "simba-english", "languages": [{ "locale": "en-US" }] }]
        });
        let parsed: Voice = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed.models[0].languages[0].locale, "en-US");
        assert_eq!(parsed.extra["gender"], "male");
        assert_eq!(serde_json::to_value(&parsed).unwrap(), json);
    }
}
