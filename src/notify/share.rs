use std::fmt::Write as _;

use url::Url;

use crate::detect::Detection;
use crate::prefs::Language;

const APP_LINK: &str = "https://weed-vision-ai.lovable.app";

struct ShareLabels {
    header: &'static str,
    detected: &'static str,
    fertilizer: &'static str,
    quantity: &'static str,
    promo: &'static str,
}

fn labels(language: Language) -> ShareLabels {
    match language {
        Language::En => ShareLabels {
            header: "🌿 *Weed Detection Report* 🌿",
            detected: "Detected Weeds:",
            fertilizer: "Recommended Fertilizer:",
            quantity: "Quantity:",
            promo: "📱 Analyzed using Weed Vision AI",
        },
        Language::Hi => ShareLabels {
            header: "🌿 *खरपतवार पहचान रिपोर्ट* 🌿",
            detected: "पहचाने गए खरपतवार:",
            fertilizer: "अनुशंसित उर्वरक:",
            quantity: "मात्रा:",
            promo: "📱 Weed Vision AI द्वारा विश्लेषित",
        },
        Language::Mr => ShareLabels {
            header: "🌿 *तण ओळख अहवाल* 🌿",
            detected: "ओळखलेले तण:",
            fertilizer: "शिफारस केलेले खत:",
            quantity: "प्रमाण:",
            promo: "📱 Weed Vision AI द्वारे विश्लेषण",
        },
    }
}

/// Chat-friendly report in the given language.
pub fn share_text(detections: &[Detection], language: Language) -> String {
    let labels = labels(language);
    let mut text = format!("{}\n\n📊 {}\n\n", labels.header, labels.detected);
    for (i, detection) in detections.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. *{}* ({:.1}%)",
            i + 1,
            detection.label,
            detection.confidence.percent()
        );
        if let Some(treatment) = &detection.treatment {
            let _ = writeln!(text, "   💊 {} {}", labels.fertilizer, treatment.name);
            let _ = writeln!(text, "   📏 {} {}", labels.quantity, treatment.quantity);
        }
        text.push('\n');
    }
    let _ = write!(text, "\n{}\n🔗 {}", labels.promo, APP_LINK);
    text
}

/// `https://wa.me/?text=...` with the text percent-encoded.
pub fn whatsapp_url(text: &str) -> String {
    match Url::parse_with_params("https://wa.me/", &[("text", text)]) {
        Ok(url) => url.to_string(),
        // The base is a constant; parsing cannot fail.
        Err(_) => String::from("https://wa.me/"),
    }
}
