// SYNOID Narration Prompts
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Each rewrite call carries two system messages (house style + output
// contract) and one JSON user payload.

use crate::narration::budget::LanguageProfile;
use serde::{Deserialize, Serialize};

/// One chat-completion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

pub const SYSTEM_EN: &str = "You are a certified Audio-Description Writer.\n\
• Target audience: blind & low-vision viewers.\n\
• Follow WCAG 2.2 broadcast audio-description style.\n\
• Use present tense, third-person, neutral tone.\n\
• Describe ONLY what the viewer cannot hear.\n\
• Read on-screen text EXACTLY verbatim.\n\
• Never reveal future plot or character motives.\n\
• Never exceed the word cap provided in payload.";

pub const SYSTEM_AR: &str = "أنت كاتب وصف صوتي معتمد.\n\
• الجمهور المستهدف: المكفوفون وضعاف البصر.\n\
• اتبع WCAG 2.2 + أسلوب البث الاحترافي.\n\
• استخدم زمن المضارع، ضمير الغائب، نبرة محايدة.\n\
• صف فقط ما لا يمكن للمشاهد سماعه.\n\
• اقرأ النص الظاهر على الشاشة حرفياً.\n\
• لا تكشف أحداث المستقبل أو دوافع الشخصيات.\n\
• لا تتجاوز الحد الأقصى للكلمات المحدد في الطلب.";

pub const SYSTEM_ES: &str = "Eres un guionista de audiodescripción certificado.\n\
• Audiencia: personas ciegas o con baja visión.\n\
• Sigue WCAG 2.2 y el estilo de audiodescripción de emisión.\n\
• Usa presente, tercera persona, tono neutral.\n\
• Describe SOLO lo que no se puede oír.\n\
• Lee el texto en pantalla EXACTAMENTE como aparece.\n\
• Nunca reveles futuros eventos o motivos.\n\
• Nunca superes el límite de palabras del payload.";

pub const SYSTEM_FR: &str = "Vous êtes un rédacteur d'audiodescription certifié.\n\
• Public cible : personnes aveugles ou malvoyantes.\n\
• Respectez WCAG 2.2 et le style des diffuseurs professionnels.\n\
• Utilisez le présent, la troisième personne, un ton neutre.\n\
• Décrivez UNIQUEMENT ce que le spectateur n'entend pas.\n\
• Lisez le texte à l'écran EXACTEMENT tel quel.\n\
• Ne révélez jamais l'intrigue future ou les motifs.\n\
• Ne dépassez jamais le nombre de mots indiqué dans la requête.";

const CONTINUITY_RULE: &str = "[SCENE CONTINUITY]: Ensure the description flows naturally from the \
previous context. Avoid repeating details already mentioned in the last 2-3 segments. Focus on \
what is new, changed, or important for the listener to follow the scene. Use transitions or \
linking phrases if appropriate.";

const CONTRACT: &str = "Return **ONLY** valid JSON:\n\
{\n  \"text\": \"<string, about {{targetWords}} words, never more than {{maxWords}}>\",\n  \"wordCount\": <integer>\n}\n\n\
Rules:\n\
1. wordCount MUST equal the number of words in text.\n\
2. If on-screen text exists, embed it verbatim inside the flow.\n\
3. Do not repeat anything said in previousRewrites.\n\
4. Do not anticipate nextDraftText.";

/// House-style instruction carried by the language profile, English when
/// the profile has none.
pub fn system_instruction(profile: &LanguageProfile) -> String {
    let base = profile
        .system_instruction
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or(SYSTEM_EN);
    format!("{}\n\n{}", base, CONTINUITY_RULE)
}

/// Structured-output contract with the word targets filled in.
pub fn output_contract(target_words: u32, max_words: u32) -> String {
    CONTRACT
        .replace("{{targetWords}}", &target_words.to_string())
        .replace("{{maxWords}}", &max_words.to_string())
}

/// User payload for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    pub target_word_count: u32,
    pub max_words: u32,
    pub language: String,
    pub narration_style: String,
    pub title: String,
    pub context: String,
    pub previous_rewrites: Vec<String>,
    pub draft_text: String,
    pub next_draft_text: String,
}

impl RewriteRequest {
    /// The three messages sent for every attempt at this interval.
    pub fn to_messages(&self, profile: &LanguageProfile) -> Vec<ChatMessage> {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| self.draft_text.clone());
        vec![
            ChatMessage::system(system_instruction(profile)),
            ChatMessage::system(output_contract(self.target_word_count, self.max_words)),
            ChatMessage::user(payload),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::budget::{default_language_table, lookup_language};
    use crate::narration::config::NarrationConfig;

    fn request() -> RewriteRequest {
        RewriteRequest {
            target_word_count: 12,
            max_words: 50,
            language: "fr-FR".to_string(),
            narration_style: "calm".to_string(),
            title: "Jardin".to_string(),
            context: "documentary".to_string(),
            previous_rewrites: vec!["Une porte s'ouvre.".to_string()],
            draft_text: "A woman waters roses.".to_string(),
            next_draft_text: "A cat jumps.".to_string(),
        }
    }

    fn profile(code: &str) -> LanguageProfile {
        lookup_language(&default_language_table(), code).unwrap().clone()
    }

    #[test]
    fn test_localized_system_instruction() {
        assert!(system_instruction(&profile("fr-FR")).starts_with("Vous êtes"));
        assert!(system_instruction(&profile("ar-EG")).starts_with("أنت"));
        assert!(system_instruction(&profile("es-MX")).starts_with("Eres"));
        assert!(system_instruction(&profile("en-US")).contains("[SCENE CONTINUITY]"));
    }

    #[test]
    fn test_profile_without_instruction_falls_back_to_english() {
        let bare = LanguageProfile {
            system_instruction: None,
            ..profile("fr-FR")
        };
        assert!(system_instruction(&bare).starts_with("You are"));
    }

    #[test]
    fn test_configured_profile_instruction_reaches_first_message() {
        let config: NarrationConfig = serde_json::from_str(
            r#"{"languages": [{"code": "de-DE", "words_per_second": 2.7, "min_words": 3, "tolerance": 2,
                "system_instruction": "Sie sind ein zertifizierter Audiodeskriptor."}]}"#,
        )
        .unwrap();
        let german = lookup_language(&config.languages, "de-DE").unwrap();

        let messages = request().to_messages(german);
        assert!(messages[0].content.starts_with("Sie sind ein zertifizierter Audiodeskriptor."));
        assert!(messages[0].content.contains("[SCENE CONTINUITY]"));
    }

    #[test]
    fn test_contract_fills_word_targets() {
        let contract = output_contract(12, 50);
        assert!(contract.contains("about 12 words"));
        assert!(contract.contains("never more than 50"));
        assert!(!contract.contains("{{"));
    }

    #[test]
    fn test_messages_layout() {
        let messages = request().to_messages(&profile("fr-FR"));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "system");
        assert_eq!(messages[2].role, "user");

        let payload: serde_json::Value = serde_json::from_str(&messages[2].content).unwrap();
        assert_eq!(payload["targetWordCount"], 12);
        assert_eq!(payload["previousRewrites"][0], "Une porte s'ouvre.");
        assert_eq!(payload["nextDraftText"], "A cat jumps.");
    }
}
