//! Fixed user-facing reply texts.

pub const PONG: &str = "pong ✅";

pub const SUMMARIZE_USAGE: &str = "Format : summarize: [ton texte]";
pub const SUMMARIZE_WORKING: &str = "⏳ Résumé en cours...";
pub const SUMMARIZE_FAILED: &str = "Erreur lors du résumé.";
pub const SUMMARIZE_EMPTY: &str = "Aucun résumé reçu.";
pub const SUMMARIZE_DISABLED: &str = "❌ Clé OpenRouter manquante.";

pub const IMAGE_USAGE: &str = "Format : image: [ton prompt]";
pub const IMAGE_WORKING: &str = "🎨 Génération d'image...";
pub const IMAGE_FAILED: &str = "Erreur lors de la génération d'image.";
pub const IMAGE_DISABLED: &str = "❌ Clé Flux manquante.";

pub const ANALYZE_USAGE: &str = "Format : analyze: [URL de l'image] ou envoyez une image";
pub const ANALYZE_WORKING: &str = "🔍 Analyse en cours...";
pub const ANALYZE_FAILED: &str = "Erreur lors de l'analyse de l'image.";
pub const ANALYZE_DISABLED: &str = "❌ IA non disponible.";

pub const FALLBACK_DISABLED: &str = "Clé OpenRouter non configurée.";
pub const FALLBACK_FAILED: &str = "Je n’ai pas pu traiter votre message.";

pub const SPONSOR_INVALID: &str =
    "❌ Code invalide ou expiré. Obtenez un nouveau code sur notre site web.";

pub const QR_NOT_READY: &str = "QR non généré...";

pub fn image_ready(url: &str) -> String {
    format!("🖼️ Image générée : {url}")
}

pub fn sponsor_welcome(phone: &str) -> String {
    format!(
        "✅ *CONNEXION RÉUSSIE!*\n\nBienvenue {phone}!\n\n\
         Tapez *help* pour voir les commandes disponibles. 🤖"
    )
}

pub fn status_line(bot_name: &str) -> String {
    format!("{bot_name} en ligne ✅")
}
